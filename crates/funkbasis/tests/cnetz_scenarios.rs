// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! End-to-end call flows on a single C-Netz channel.
//!
//! These tests drive the channel block-by-block through its public pump
//! and inject uplink telegrams the way the demodulator would, covering
//! attachment, both call directions, supervision loss and sync pull-in.

use crossbeam::channel::Receiver;
use funkbasis::call::{event_channel, CallEvent, Cause};
use funkbasis::cnetz::{ChannelState, CnetzBts, CnetzConfig, SysInfo, TransState};
use funkbasis::config::{N_AFV, OGK_KANAL};
use funkbasis::dsp::DspMode;
use funkbasis::protocol::telegramm::{Opcode, Telegramm};

const KANAL: u16 = OGK_KANAL;

fn make_bts() -> (CnetzBts, Receiver<CallEvent>) {
    let (sink, events) = event_channel();
    let mut bts = CnetzBts::new(sink);
    bts.add_channel(CnetzConfig::default(), SysInfo::default())
        .expect("add channel");
    (bts, events)
}

/// Uplink telegram carrying our cell identity plus a subscriber identity.
fn uplink(opcode: Opcode, nat: u8, fuvst: u8, rest: u16) -> Telegramm {
    let si = SysInfo::default();
    Telegramm {
        opcode,
        fuz_nationalitaet: si.fuz_nat,
        fuz_fuvst_nr: si.fuz_fuvst,
        fuz_rest_nr: si.fuz_rest,
        futln_nationalitaet: nat,
        futln_heimat_fuvst_nr: fuvst,
        futln_rest_nr: rest,
        ..Telegramm::default()
    }
}

/// Pump blocks until a telegram with the wanted opcode appears; panics
/// after `max` blocks.
fn pump_until(bts: &mut CnetzBts, opcode: Opcode, max: usize) -> Telegramm {
    let cnetz = bts.channel_mut(KANAL).expect("channel");
    for _ in 0..max {
        let (_, telegramm) = cnetz.pump_block();
        if let Some(telegramm) = telegramm {
            if telegramm.opcode == opcode {
                return telegramm;
            }
        }
    }
    panic!("no {} within {} blocks", opcode.name(), max);
}

fn pump_until_mode(bts: &mut CnetzBts, mode: DspMode, max: usize) {
    let cnetz = bts.channel_mut(KANAL).expect("channel");
    for _ in 0..max {
        if cnetz.dsp_mode() == mode {
            return;
        }
        let _ = cnetz.pump_block();
    }
    panic!("mode {} not reached within {} blocks", mode.name(), max);
}

#[test]
fn test_successful_attach() {
    let (mut bts, _events) = make_bts();

    let em = uplink(Opcode::EM_R, 2, 2, 22002);
    bts.channel_mut(KANAL).expect("channel").receive_telegramm(&em);
    {
        let cnetz = bts.channel(KANAL).expect("channel");
        assert_eq!(cnetz.transactions().len(), 1);
        assert_eq!(cnetz.transactions()[0].state, TransState::Em);
        // attachment does not occupy the channel
        assert_eq!(cnetz.state(), ChannelState::Idle);
    }

    // exactly one acknowledge on the next rufblock, with the identity
    let mut ebq = 0;
    let cnetz = bts.channel_mut(KANAL).expect("channel");
    for _ in 0..64 {
        let (_, telegramm) = cnetz.pump_block();
        if let Some(telegramm) = telegramm {
            if telegramm.opcode == Opcode::EBQ_R {
                assert_eq!(telegramm.rufnummer(), "2222002");
                ebq += 1;
            }
        }
    }
    assert_eq!(ebq, 1, "exactly one 'Einbuchquittung'");
    assert!(cnetz.transactions().is_empty());
    assert_eq!(cnetz.state(), ChannelState::Idle);
}

#[test]
fn test_mobile_originated_call() {
    let (mut bts, _events) = make_bts();

    // call request on the organisation channel
    let vwg = uplink(Opcode::VWG_R, 2, 2, 22002);
    bts.channel_mut(KANAL).expect("channel").receive_telegramm(&vwg);
    assert_eq!(
        bts.channel(KANAL).expect("channel").state(),
        ChannelState::Busy
    );

    // base prompts for digits on the meldeblock
    let waf = pump_until(&mut bts, Opcode::WAF_M, 8);
    assert_eq!(waf.rufnummer(), "2222002");

    // handset sends the dialed number
    let mut wue = uplink(Opcode::WUE_M, 0, 0, 0);
    wue.wahlziffern = "0101234567".to_string();
    bts.channel_mut(KANAL).expect("channel").receive_telegramm(&wue);
    assert_eq!(
        bts.channel(KANAL).expect("channel").transactions()[0].state,
        TransState::Wbp
    );

    // dialing accepted, then the channel assignment
    let _wbp = pump_until(&mut bts, Opcode::WBP_R, 8);
    let vag = pump_until(&mut bts, Opcode::VAG_R, 8);
    assert_eq!(vag.frequenz_nr, KANAL, "assignment carries our channel");
    assert_eq!(
        bts.channel(KANAL).expect("channel").transactions()[0].state,
        TransState::Bq
    );

    // mode switches to concentrated signalling exactly two rufblocks
    // after the assignment
    let cnetz = bts.channel_mut(KANAL).expect("channel");
    assert_eq!(cnetz.dsp_mode(), DspMode::Ogk);
    let (mode, _) = cnetz.pump_block(); // meldeblock of the same slot
    assert_eq!(mode, DspMode::Ogk);
    let (mode, _) = cnetz.pump_block(); // rufblock 1
    assert_eq!(mode, DspMode::Ogk);
    let (mode, _) = cnetz.pump_block(); // meldeblock
    assert_eq!(mode, DspMode::Ogk);
    let (mode, _) = cnetz.pump_block(); // rufblock 2: switch takes effect
    assert_eq!(mode, DspMode::SpkK);
}

/// Drive a network-originated call up to the concentrated speech channel
/// and answer it. Returns the callref.
fn establish_mt_call(bts: &mut CnetzBts, events: &Receiver<CallEvent>) -> funkbasis::CallRef {
    let callref = bts.setup("2222002").expect("setup accepted");
    assert_eq!(
        bts.channel(KANAL).expect("channel").transactions()[0].state,
        TransState::Vak
    );

    // paging goes out, the channel moves to concentrated signalling
    let vak = pump_until(bts, Opcode::VAK_R, 64);
    assert_eq!(vak.rufnummer(), "2222002");
    pump_until_mode(bts, DspMode::SpkK, 8);

    // handset seizes the channel
    let bel = uplink(Opcode::BEL_K, 2, 2, 22002);
    bts.channel_mut(KANAL).expect("channel").receive_telegramm(&bel);

    // eight seizure acknowledges, then holding
    let mut bq = 0;
    {
        let cnetz = bts.channel_mut(KANAL).expect("channel");
        for _ in 0..64 {
            let (_, telegramm) = cnetz.pump_block();
            let telegramm = telegramm.expect("concentrated blocks always signal");
            if telegramm.opcode == Opcode::BQ_K {
                bq += 1;
            } else {
                assert_eq!(telegramm.opcode, Opcode::VHQ_K);
                break;
            }
        }
    }
    assert_eq!(bq, 8, "eight 'Belegungsquittung' blocks");

    // the handset confirms holding, releasing the hold timer
    let vh = uplink(Opcode::VH_K, 2, 2, 22002);
    bts.channel_mut(KANAL).expect("channel").receive_telegramm(&vh);

    // ringing starts on the next sub-frame boundary
    let _rta = pump_until(bts, Opcode::RTA_K, 64);
    assert!(matches!(
        events.try_recv().expect("alerting event"),
        CallEvent::Alerting { callref: c } if c == callref
    ));

    // ringing acknowledged, then the handset answers
    let rtaq = uplink(Opcode::RTAQ_K, 2, 2, 22002);
    bts.channel_mut(KANAL).expect("channel").receive_telegramm(&rtaq);
    let ah = uplink(Opcode::AH_K, 2, 2, 22002);
    bts.channel_mut(KANAL).expect("channel").receive_telegramm(&ah);
    match events.try_recv().expect("answer event") {
        CallEvent::Answer { callref: c, connected } => {
            assert_eq!(c, callref);
            assert_eq!(connected, "2222002");
        }
        other => panic!("expected answer, got {:?}", other),
    }

    // off-hook acknowledge, then distributed signalling with voice
    let _ahq = pump_until(bts, Opcode::AHQ_K, 64);
    pump_until_mode(bts, DspMode::SpkV, 64);
    assert_eq!(
        bts.channel(KANAL).expect("channel").transactions()[0].state,
        TransState::Vhq
    );

    callref
}

#[test]
fn test_mobile_terminated_call_with_ring() {
    let (mut bts, events) = make_bts();
    let callref = establish_mt_call(&mut bts, &events);

    // holding acknowledges alternate between the two distributed opcodes
    let cnetz = bts.channel_mut(KANAL).expect("channel");
    let mut opcodes = Vec::new();
    for _ in 0..4 {
        let (mode, telegramm) = cnetz.pump_block();
        assert_eq!(mode, DspMode::SpkV);
        opcodes.push(telegramm.expect("holding telegram").opcode);
    }
    for opcode in &opcodes {
        assert!(matches!(opcode, Opcode::VHQ1_V | Opcode::VHQ2_V));
    }
    // the jump-by-8 slot policy alternates the two opcodes per block
    assert_ne!(opcodes[0], opcodes[1]);
    assert_eq!(opcodes[0], opcodes[2]);
    assert_eq!(opcodes[1], opcodes[3]);
    assert_eq!(cnetz.callref, Some(callref));
}

#[test]
fn test_supervision_loss_releases_call() {
    let (mut bts, events) = make_bts();
    let callref = establish_mt_call(&mut bts, &events);

    // no 'Verbindung halten' arrives: the supervision timer runs out
    let cnetz = bts.channel_mut(KANAL).expect("channel");
    cnetz.advance_time(48000 * 11);
    assert_eq!(cnetz.transactions()[0].state, TransState::Af);
    match events.try_recv().expect("release event") {
        CallEvent::Release { callref: c, cause } => {
            assert_eq!(c, callref);
            assert_eq!(cause, Cause::TempFail);
        }
        other => panic!("expected release, got {:?}", other),
    }

    // the release telegram repeats N_AFV times, then the channel is idle
    let mut af = 0;
    for _ in 0..(N_AFV + 2) {
        if cnetz.transactions().is_empty() {
            break;
        }
        let (mode, telegramm) = cnetz.pump_block();
        assert_eq!(mode, DspMode::SpkV);
        assert_eq!(telegramm.expect("release telegram").opcode, Opcode::AF_V);
        af += 1;
    }
    assert_eq!(af, N_AFV);
    assert!(cnetz.transactions().is_empty());
    assert_eq!(cnetz.state(), ChannelState::Idle);
    pump_until_mode(&mut bts, DspMode::Ogk, 4);
}

#[test]
fn test_release_is_idempotent() {
    let (mut bts, events) = make_bts();
    let callref = establish_mt_call(&mut bts, &events);

    bts.release(callref, Cause::Normal);
    assert_eq!(bts.channel(KANAL).expect("channel").callref, None);
    // the release telegrams toward the handset are still pending
    assert_eq!(
        bts.channel(KANAL).expect("channel").transactions()[0].state,
        TransState::Af
    );

    // releasing again is a no-op
    bts.release(callref, Cause::Normal);
    assert_eq!(
        bts.channel(KANAL).expect("channel").transactions()[0].state,
        TransState::Af
    );
}

#[test]
fn test_slot_clock_pull_in_converges_geometrically() {
    let (mut bts, events) = make_bts();
    let _callref = establish_mt_call(&mut bts, &events);

    // inject supervisory telegrams with a decaying sync-phase error and
    // watch the corrections halve
    let cnetz = bts.channel_mut(KANAL).expect("channel");
    let mut residual = 0.3;
    let mut corrections = Vec::new();
    for _ in 0..4 {
        let mut vh = uplink(Opcode::VH_V, 2, 2, 22002);
        vh.sync_time = residual;
        let before = cnetz.rx_bit_time();
        cnetz.receive_telegramm(&vh);
        let correction = before - cnetz.rx_bit_time();
        corrections.push(correction);
        residual -= correction;
    }
    assert!((corrections[0] - 0.15).abs() < 1e-9);
    assert!((corrections[1] - 0.075).abs() < 1e-9);
    assert!((corrections[2] - 0.0375).abs() < 1e-9);
    assert!((corrections[3] - 0.01875).abs() < 1e-9);
}

#[test]
fn test_setup_rejections() {
    let (mut bts, _events) = make_bts();

    // invalid formats
    assert_eq!(bts.setup("123456"), Err(Cause::InvalNumber)); // 6 digits
    assert_eq!(bts.setup("12345678"), Err(Cause::InvalNumber)); // 8 digits
    assert_eq!(bts.setup("2x22002"), Err(Cause::InvalNumber));
    // rest number boundary
    assert_eq!(bts.setup("2265536"), Err(Cause::InvalNumber));
    assert!(bts.setup("2265535").is_ok());

    bts.shutdown();
}

#[test]
fn test_prefixed_number_accepted() {
    let (mut bts, _events) = make_bts();
    // 11 digits with 0160 prefix strip down to the 7-digit identity
    let callref = bts.setup("01602222002").expect("prefixed number");
    let vak = pump_until(&mut bts, Opcode::VAK_R, 64);
    assert_eq!(vak.rufnummer(), "2222002");
    bts.release(callref, Cause::Normal);
}

#[test]
fn test_busy_subscriber_rejected() {
    let (mut bts, _events) = make_bts();
    let _callref = bts.setup("2222002").expect("first call");
    assert_eq!(bts.setup("2222002"), Err(Cause::Busy));
    // the single channel is occupied now
    assert_eq!(bts.setup("2222003"), Err(Cause::NoChannel));
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! C-Netz channel transceiver and transaction engine.
//!
//! One [`Cnetz`] instance drives one radio channel. In idle it broadcasts
//! on the organisation channel (rufblock/meldeblock); once a call is
//! accepted the same transceiver switches - with a two-block lookahead so
//! the phone can retune - into concentrated and later distributed speech
//! channel signalling. [`CnetzBts`] owns the ordered channel registry and
//! implements the call-control facade verbs.

mod dsp;
mod sysinfo;
mod transaction;

pub use sysinfo::SysInfo;
pub use transaction::{Timer, TransState, Transaction};

use crate::call::{CallOrigin, CallRef, Cause, EventSink, SharedCallRefGen, Upstream};
use crate::config::{
    BLOCK_SECONDS, DIST_FRAME_SECONDS, F_BQ, F_DS, F_RTA, F_VHQ, F_VHQK, MAX_WAF_TRIES, N_AFKT,
    N_AFV, N_BQ, OGK_KANAL, SLOT_SECONDS, T_WAF,
};
use crate::dsp::{
    ClockSpeed, Compander, DspMode, Emphasis, FskRx, FskTx, JitterBuffer, Resampler, Scrambler,
};
use crate::protocol::telegramm::{Opcode, Telegramm};
use crate::sched::{ModeScheduler, SlotClock, SubPhase};
use crate::sender::SenderRegistry;
use crate::{debug, info, notice, Error, Result};

/// Release causes of the C-Netz air interface ("Ausloesegrund").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReleaseCause {
    /// Operator initiated release.
    BetreiberGewollt = 0,
    /// Called party busy.
    TeilnehmerBesetzt = 1,
    /// All trunks busy.
    GassenBesetzt = 2,
    /// Radio link failure.
    Funktechnisch = 3,
}

impl ReleaseCause {
    /// Map a network-side cause onto the compact air-interface enumeration.
    pub fn from_cause(cause: Cause) -> Self {
        match cause {
            Cause::Normal | Cause::Busy | Cause::NoAnswer => ReleaseCause::TeilnehmerBesetzt,
            _ => ReleaseCause::GassenBesetzt,
        }
    }

    /// 2-bit wire value.
    pub fn wire(self) -> u8 {
        self as u8
    }
}

/// Convert a channel number to the base station frequency in MHz.
///
/// Set `unterband` to get the mobile station (uplink) frequency instead.
pub fn kanal2freq(kanal: u16, unterband: bool) -> f64 {
    let mut freq = 465.750;
    if kanal & 1 == 1 {
        freq -= f64::from(kanal + 1) / 2.0 * 0.010;
    } else {
        freq -= f64::from(kanal) / 2.0 * 0.0125;
    }
    if unterband {
        freq -= 10.0;
    }
    freq
}

/// Channel occupancy as seen by the call-control layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Broadcasting, accepts registrations and calls.
    Idle,
    /// A call transaction owns the channel.
    Busy,
}

/// Static configuration of one C-Netz channel.
#[derive(Debug, Clone)]
pub struct CnetzConfig {
    /// Channel number (odd 1..947, even 2..758).
    pub kanal: u16,
    /// Radio sample rate.
    pub samplerate: u32,
    /// Demand authentication (card identification) on attach.
    pub auth: bool,
    /// Power hint broadcast to mobiles.
    pub ms_power: u8,
    /// Apply pre-emphasis on the transmit voice path.
    pub pre_emphasis: bool,
    /// Apply de-emphasis on the receive voice path.
    pub de_emphasis: bool,
    /// Enable the per-second clock-speed (ppm) report.
    pub measure_speed: bool,
    /// RX/TX sample clock correction in ppm.
    pub clock_speed: [f64; 2],
    /// FSK peak deviation, 0..1 of full scale.
    pub deviation: f64,
    /// Idle-block noise amplitude for occupancy simulation (0 = silence).
    pub noise: f64,
}

impl Default for CnetzConfig {
    fn default() -> Self {
        Self {
            kanal: OGK_KANAL,
            samplerate: 48000,
            auth: false,
            ms_power: 1,
            pre_emphasis: false,
            de_emphasis: false,
            measure_speed: false,
            clock_speed: [0.0, 0.0],
            deviation: 1.0,
            noise: 0.0,
        }
    }
}

/// One C-Netz channel transceiver.
pub struct Cnetz<U: Upstream = EventSink> {
    kanal: u16,
    samplerate: u32,
    state: ChannelState,
    pub sysinfo: SysInfo,
    auth: u8,
    ms_power: u8,
    pre_emphasis: bool,
    de_emphasis: bool,
    /// Voice scrambling negotiated via the `betriebs_art` uplink bit.
    scrambler_active: bool,

    // scheduler
    slot: SlotClock,
    mode: ModeScheduler,
    last_tx_timeslot: u8,

    // transactions
    trans: Vec<Transaction>,
    next_trans_id: u64,
    /// Call reference of the active call, if any.
    pub callref: Option<CallRef>,
    callrefs: SharedCallRefGen,
    upstream: U,

    // sample clock (advanced by the TX pump)
    now: u64,

    // DSP state
    fsk_tx: FskTx,
    fsk_rx: FskRx,
    tx_buffer: Vec<i16>,
    tx_pos: usize,
    speech_buffer: Vec<i16>,
    speech_pos: usize,
    compander: Compander,
    scrambler_tx: Scrambler,
    scrambler_rx: Scrambler,
    upsampler: Resampler,
    downsampler: Resampler,
    jitter: JitterBuffer,
    emphasis: Emphasis,
    clock_speed: ClockSpeed,
}

impl<U: Upstream> Cnetz<U> {
    /// Create a channel transceiver and enter idle.
    pub fn new(
        config: CnetzConfig,
        sysinfo: SysInfo,
        callrefs: SharedCallRefGen,
        upstream: U,
    ) -> Result<Self> {
        let kanal = config.kanal;
        let valid = if kanal & 1 == 1 {
            (1..=947).contains(&kanal)
        } else {
            (2..=758).contains(&kanal)
        };
        if !valid {
            crate::error!("Channel ('Kanal') number {} invalid.", kanal);
            return Err(Error::InvalidChannel(kanal));
        }
        if kanal == 1 || kanal == 2 {
            notice!(
                "Channel ('Kanal') number {} is specified as 'unused', it might not work!",
                kanal
            );
        }
        if kanal == OGK_KANAL {
            notice!(
                "Channel {} ('Orga-Kanal') also carries speech. Some phones will reject this.",
                OGK_KANAL
            );
        }

        debug!(
            "Creating 'C-Netz' instance for 'Kanal' = {} (sample rate {}).",
            kanal, config.samplerate
        );

        let voice_rate = f64::from(config.samplerate) / 1.1;
        let mut cnetz = Self {
            kanal,
            samplerate: config.samplerate,
            state: ChannelState::Idle,
            sysinfo,
            auth: u8::from(config.auth),
            ms_power: config.ms_power,
            pre_emphasis: config.pre_emphasis,
            de_emphasis: config.de_emphasis,
            scrambler_active: false,
            slot: SlotClock::new(),
            mode: ModeScheduler::new(DspMode::Ogk),
            last_tx_timeslot: 0,
            trans: Vec::new(),
            next_trans_id: 0,
            callref: None,
            callrefs,
            upstream,
            now: 0,
            fsk_tx: FskTx::new(
                config.samplerate,
                crate::config::CNETZ_BITRATE,
                config.clock_speed[1],
                config.deviation,
                config.noise,
            )?,
            fsk_rx: FskRx::new(
                config.samplerate,
                crate::config::CNETZ_BITRATE,
                config.clock_speed[0],
            )?,
            tx_buffer: Vec::new(),
            tx_pos: 0,
            speech_buffer: Vec::new(),
            speech_pos: 0,
            compander: Compander::new(8000, 5.0, 22.5, 32767.0),
            scrambler_tx: Scrambler::new(voice_rate),
            scrambler_rx: Scrambler::new(voice_rate),
            upsampler: Resampler::new(8000.0, voice_rate),
            downsampler: Resampler::new(voice_rate, 8000.0),
            jitter: JitterBuffer::new(8000 / 5),
            emphasis: Emphasis::new(voice_rate, 300.0),
            clock_speed: ClockSpeed::new(config.samplerate, config.measure_speed),
        };
        cnetz.go_idle();
        Ok(cnetz)
    }

    /// Channel number.
    pub fn kanal(&self) -> u16 {
        self.kanal
    }

    /// Live DSP mode.
    pub fn dsp_mode(&self) -> DspMode {
        self.mode.live()
    }

    /// Channel occupancy.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Current slot clock position.
    pub fn slot(&self) -> SlotClock {
        self.slot
    }

    /// Pending transactions, insertion-ordered.
    pub fn transactions(&self) -> &[Transaction] {
        &self.trans
    }

    /// Sample time `secs` from now, for timer arming.
    fn after(&self, secs: f64) -> u64 {
        self.now + (secs * f64::from(self.samplerate)) as u64
    }

    // ===================================================================
    // Transaction handling
    // ===================================================================

    /// Create a transaction. An older transaction of the same subscriber
    /// is destroyed first.
    fn create_transaction(
        &mut self,
        state: TransState,
        futln_nat: u8,
        futln_fuvst: u8,
        futln_rest: u16,
    ) -> u64 {
        if let Some(idx) = self
            .trans
            .iter()
            .position(|t| t.matches(futln_nat, futln_fuvst, futln_rest))
        {
            let id = self.trans[idx].id;
            notice!(
                "Found already pending transaction for subscriber '{}', deleting!",
                self.trans[idx].rufnummer()
            );
            self.destroy_transaction(id);
        }

        self.next_trans_id += 1;
        let trans = Transaction::new(self.next_trans_id, state, futln_nat, futln_fuvst, futln_rest);
        info!("Created transaction for subscriber '{}'", trans.rufnummer());
        let id = trans.id;
        // attach to end of list, so first transaction is served first
        self.trans.push(trans);
        id
    }

    /// Destroy a transaction by id, disarming its timer and unlinking it.
    ///
    /// # Panics
    /// Panics when the id is not in the list; destroying twice is a
    /// programming error.
    fn destroy_transaction(&mut self, id: u64) {
        let idx = self
            .trans
            .iter()
            .position(|t| t.id == id)
            .unwrap_or_else(|| panic!("Transaction not in list, please fix!"));
        info!(
            "Destroying transaction for subscriber '{}'",
            self.trans[idx].rufnummer()
        );
        let mut trans = self.trans.remove(idx);
        trans.timer.stop();
    }

    /// First transaction whose state is in `state_mask`, insertion order.
    fn search_transaction(&self, state_mask: u32) -> Option<usize> {
        let idx = self
            .trans
            .iter()
            .position(|t| t.state.bit() & state_mask != 0)?;
        debug!(
            "Found transaction for subscriber '{}'",
            self.trans[idx].rufnummer()
        );
        Some(idx)
    }

    fn trans_new_state(&mut self, idx: usize, state: TransState) {
        info!(
            "Transaction state {} -> {}",
            self.trans[idx].state.name(),
            state.name()
        );
        self.trans[idx].state = state;
    }

    /// Destroy every transaction except the one given, oldest first.
    fn flush_other_transactions(&mut self, keep_id: u64) {
        let others: Vec<u64> = self
            .trans
            .iter()
            .map(|t| t.id)
            .filter(|&id| id != keep_id)
            .collect();
        for id in others {
            notice!("Kicking other pending transaction");
            self.destroy_transaction(id);
        }
    }

    // ===================================================================
    // Channel state
    // ===================================================================

    /// Abort any connection and return to the idle broadcast.
    fn go_idle(&mut self) {
        if let Some(callref) = self.callref.take() {
            crate::error!("Releasing missing callref, please fix!");
            self.upstream.release(callref, Cause::Normal);
        }

        info!(
            "Entering IDLE state, sending 'Funkzellenkennung' {},{},{}.",
            self.sysinfo.fuz_nat, self.sysinfo.fuz_fuvst, self.sysinfo.fuz_rest
        );
        self.state = ChannelState::Idle;
        if matches!(self.mode.live(), DspMode::SpkK | DspMode::SpkV) {
            // go idle after next frame/slot
            self.mode.schedule(DspMode::Ogk, 1);
        } else {
            self.mode.schedule(DspMode::Ogk, 0);
        }
    }

    /// Initiate release of a connection on the speech channel.
    fn release_spk(&mut self, idx: usize, cause: ReleaseCause) {
        self.trans_new_state(idx, TransState::Af);
        let trans = &mut self.trans[idx];
        trans.release_cause = cause;
        trans.count = 0;
        trans.timer.stop();
        self.mode.cancel();
    }

    // ===================================================================
    // Identity matching
    // ===================================================================

    fn match_fuz(&self, telegramm: &Telegramm) -> bool {
        if telegramm.fuz_nationalitaet != self.sysinfo.fuz_nat
            || telegramm.fuz_fuvst_nr != self.sysinfo.fuz_fuvst
            || telegramm.fuz_rest_nr != self.sysinfo.fuz_rest
        {
            notice!(
                "Telegramm for different 'Funkzelle' {},{},{}, ignoring.",
                telegramm.fuz_nationalitaet,
                telegramm.fuz_fuvst_nr,
                telegramm.fuz_rest_nr
            );
            return false;
        }
        true
    }

    fn match_futln(&self, telegramm: &Telegramm, idx: usize) -> bool {
        let trans = &self.trans[idx];
        if !trans.matches(
            telegramm.futln_nationalitaet,
            telegramm.futln_heimat_fuvst_nr,
            telegramm.futln_rest_nr,
        ) {
            notice!(
                "Telegramm for different subscriber '{}', ignoring.",
                telegramm.rufnummer()
            );
            return false;
        }
        true
    }

    // ===================================================================
    // Sync to phone
    //
    // Because the actual delay of the radio path is unknown, the base
    // station syncs to the phone, which is synced to us. With a known
    // block we can set sync to the absolute position in the super frame;
    // otherwise we sync to the nearest block.
    // ===================================================================

    fn sync_frame(&mut self, sync_time: f64, known_slot: Option<u8>) {
        let offset = crate::sched::sync_offset(sync_time, known_slot);
        let pull = crate::sched::sync_pull(offset);
        match pull {
            crate::sched::SyncPull::Full(o) => {
                notice!("Frame sync offset = {:.2}, correcting!", o);
            }
            crate::sched::SyncPull::Half(o) => {
                debug!("Frame sync offset = {:.2}, correcting.", o);
            }
        }
        self.fsk_rx.correct_sync(pull.correction());
    }

    // ===================================================================
    // OgK handling
    // ===================================================================

    /// Build the telegram for the next rufblock.
    fn transmit_rufblock(&mut self) -> Telegramm {
        let mut telegramm = Telegramm {
            opcode: Opcode::LR_R,
            max_sendeleistung: self.ms_power,
            bedingte_genauigkeit_der_fufst: self.sysinfo.genauigkeit,
            zeitschlitz_nr: self.slot.ts,
            grenzwert_fuer_einbuchen_und_umbuchen: self.sysinfo.grenz_einbuchen,
            authentifikationsbit: self.auth,
            vermittlungstechnische_sperren: self.sysinfo.sperre,
            ws_kennung: 0,
            reduzierungsfaktor: self.sysinfo.reduzierung,
            fuz_nationalitaet: self.sysinfo.fuz_nat,
            fuz_fuvst_nr: self.sysinfo.fuz_fuvst,
            fuz_rest_nr: self.sysinfo.fuz_rest,
            kennung_fufst: self.sysinfo.fufst_prio,
            nachbarschafts_prioritaets_bit: self.sysinfo.nachbar_prio,
            bewertung_nach_pegel_und_entfernung: self.sysinfo.bewertung,
            entfernungsangabe_der_fufst: self.sysinfo.entfernung,
            mittelungsfaktor_fuer_ausloesen: self.sysinfo.mittel_ausloesen,
            mittelungsfaktor_fuer_umschalten: self.sysinfo.mittel_umschalten,
            grenzwert_fuer_umschalten: self.sysinfo.grenz_umschalten,
            grenze_fuer_ausloesen: self.sysinfo.grenz_ausloesen,
            ..Telegramm::default()
        };

        let mask = TransState::Em.bit()
            | TransState::Um.bit()
            | TransState::Wbn.bit()
            | TransState::Wbp.bit()
            | TransState::Vag.bit()
            | TransState::Vak.bit();
        if let Some(idx) = self.search_transaction(mask) {
            let id = self.trans[idx].id;
            telegramm.futln_nationalitaet = self.trans[idx].futln_nat;
            telegramm.futln_heimat_fuvst_nr = self.trans[idx].futln_fuvst;
            telegramm.futln_rest_nr = self.trans[idx].futln_rest;
            match self.trans[idx].state {
                TransState::Em => {
                    info!("Sending acknowledgement 'Einbuchquittung' to Attachment request.");
                    telegramm.opcode = Opcode::EBQ_R;
                    self.destroy_transaction(id);
                }
                TransState::Um => {
                    info!("Sending acknowledgement 'Umbuchquittung' to Roaming request.");
                    telegramm.opcode = Opcode::UBQ_R;
                    self.destroy_transaction(id);
                }
                TransState::Wbn => {
                    info!("Sending call reject 'Wahlbestaetigung negativ'.");
                    telegramm.opcode = Opcode::WBN_R;
                    self.destroy_transaction(id);
                    self.go_idle();
                }
                TransState::Wbp => {
                    info!("Sending call accept 'Wahlbestaetigung positiv'.");
                    telegramm.opcode = Opcode::WBP_R;
                    self.trans_new_state(idx, TransState::Vag);
                }
                TransState::Vag | TransState::Vak => {
                    if self.trans[idx].state == TransState::Vag {
                        info!("Sending channel assignment 'Verbindungsaufbau gehend'.");
                        telegramm.opcode = Opcode::VAG_R;
                    } else {
                        info!("Sending channel assignment 'Verbindungsaufbau kommend'.");
                        telegramm.opcode = Opcode::VAK_R;
                    }
                    telegramm.frequenz_nr = self.kanal;
                    self.trans_new_state(idx, TransState::Bq);
                    self.trans[idx].count = 0;
                    // two slots + F_BQ frames
                    let at = self.after(2.0 * SLOT_SECONDS + BLOCK_SECONDS * f64::from(F_BQ));
                    self.trans[idx].timer.start(at);
                    // schedule switching two slots ahead
                    self.mode.schedule(DspMode::SpkK, 2);
                }
                _ => {} // LR
            }
        }

        telegramm
    }

    /// Build the telegram for the next meldeblock.
    fn transmit_meldeblock(&mut self) -> Telegramm {
        let mut telegramm = Telegramm {
            opcode: Opcode::MLR_M,
            max_sendeleistung: self.ms_power,
            // must be 0 or the phone may not respond in a different slot
            ogk_verkehrsanteil: 0,
            teilnehmersperre: 0,
            anzahl_gesperrter_teilnehmergruppen: 0,
            ogk_vorschlag: OGK_KANAL,
            fuz_rest_nr: self.sysinfo.fuz_rest,
            ..Telegramm::default()
        };

        if let Some(idx) = self.search_transaction(TransState::Vwg.bit()) {
            info!("Sending acknowledgement 'Wahlaufforderung' to outgoing call");
            telegramm.opcode = Opcode::WAF_M;
            telegramm.futln_nationalitaet = self.trans[idx].futln_nat;
            telegramm.futln_heimat_fuvst_nr = self.trans[idx].futln_fuvst;
            telegramm.futln_rest_nr = self.trans[idx].futln_rest;
            self.trans_new_state(idx, TransState::Waf);
            // wait two slot cycles until resending
            let at = self.after(T_WAF);
            self.trans[idx].timer.start(at);
        }

        telegramm
    }

    /// Handle an uplink telegram received on the organisation channel.
    fn receive_ogk(&mut self, telegramm: &Telegramm) {
        let mut valid_frame = false;

        match telegramm.opcode {
            Opcode::EM_R | Opcode::UM_R => {
                if !self.match_fuz(telegramm) {
                    return;
                }
                let rufnummer = telegramm.rufnummer();
                let attach = telegramm.opcode == Opcode::EM_R;
                let what = if attach {
                    "Attachment 'Einbuchen'"
                } else {
                    "Roaming 'Umbuchen'"
                };
                if self.auth != 0 && telegramm.chipkarten_futelg_bit != 0 {
                    info!(
                        "Received {} message from Subscriber '{}' with chip card's ID {} (vendor id {}, hardware version {}, software version {})",
                        what,
                        rufnummer,
                        telegramm.kartenkennung,
                        telegramm.herstellerkennung,
                        telegramm.hardware_des_futelg,
                        telegramm.software_des_futelg
                    );
                } else {
                    info!(
                        "Received {} message from Subscriber '{}' with {} card's security code {}",
                        what,
                        rufnummer,
                        if telegramm.chipkarten_futelg_bit != 0 {
                            "chip"
                        } else {
                            "magnet"
                        },
                        telegramm.sicherungs_code
                    );
                }
                if self.state != ChannelState::Idle {
                    notice!(
                        "Ignoring request from subscriber '{}', because we are busy.",
                        rufnummer
                    );
                    return;
                }
                self.create_transaction(
                    if attach { TransState::Em } else { TransState::Um },
                    telegramm.futln_nationalitaet,
                    telegramm.futln_heimat_fuvst_nr,
                    telegramm.futln_rest_nr,
                );
                valid_frame = true;
            }
            Opcode::VWG_R | Opcode::SRG_R => {
                if !self.match_fuz(telegramm) {
                    return;
                }
                let rufnummer = telegramm.rufnummer();
                info!(
                    "Received outgoing Call 'Verbindungswunsch gehend' message from Subscriber '{}'",
                    rufnummer
                );
                if self.state != ChannelState::Idle {
                    notice!(
                        "Ignoring Call from subscriber '{}', because we are busy.",
                        rufnummer
                    );
                    return;
                }
                let id = self.create_transaction(
                    TransState::Vwg,
                    telegramm.futln_nationalitaet,
                    telegramm.futln_heimat_fuvst_nr,
                    telegramm.futln_rest_nr,
                );
                self.state = ChannelState::Busy;
                // flush all other transactions, if any
                self.flush_other_transactions(id);
                valid_frame = true;
            }
            Opcode::WUE_M => {
                let mask =
                    TransState::Waf.bit() | TransState::Wbp.bit() | TransState::Vag.bit();
                let Some(idx) = self.search_transaction(mask) else {
                    notice!(
                        "Received dialing digits 'Wahluebertragung' message without transaction, ignoring!"
                    );
                    return;
                };
                self.trans[idx].dialing = telegramm.wahlziffern.clone();
                info!(
                    "Received dialing digits 'Wahluebertragung' message from Subscriber '{}' to Number '{}'",
                    self.trans[idx].rufnummer(),
                    self.trans[idx].dialing
                );
                self.trans[idx].timer.stop();
                self.trans_new_state(idx, TransState::Wbp);
                valid_frame = true;
            }
            opcode => {
                notice!(
                    "Received unexpected Telegramm (opcode {} = {})",
                    opcode as u8,
                    opcode.name()
                );
            }
        }

        if valid_frame {
            self.sync_frame(telegramm.sync_time, Some(self.last_tx_timeslot));
        }
    }

    // ===================================================================
    // SpK handling
    // ===================================================================

    /// Emit the release telegram on the concentrated speech channel and
    /// count down to transaction destruction.
    fn spk_k_release(&mut self, telegramm: &mut Telegramm, idx: usize, repeat: u32) {
        telegramm.opcode = Opcode::AF_K;
        telegramm.ausloesegrund = self.trans[idx].release_cause.wire();
        self.trans[idx].count += 1;
        if self.trans[idx].count == repeat {
            let id = self.trans[idx].id;
            self.destroy_transaction(id);
            self.go_idle();
        }
    }

    /// Build the next telegram of the concentrated signalling phase.
    fn transmit_spk_k(&mut self) -> Option<Telegramm> {
        if self.trans.is_empty() {
            return None;
        }
        let idx = 0;

        let mut telegramm = Telegramm {
            max_sendeleistung: self.ms_power,
            sendeleistungsanpassung: 1,
            entfernung: self.sysinfo.entfernung,
            fuz_nationalitaet: self.sysinfo.fuz_nat,
            fuz_fuvst_nr: self.sysinfo.fuz_fuvst,
            fuz_rest_nr: self.sysinfo.fuz_rest,
            futln_nationalitaet: self.trans[idx].futln_nat,
            futln_heimat_fuvst_nr: self.trans[idx].futln_fuvst,
            futln_rest_nr: self.trans[idx].futln_rest,
            frequenz_nr: self.kanal,
            bedingte_genauigkeit_der_fufst: self.sysinfo.genauigkeit,
            ..Telegramm::default()
        };

        // the VHQ/DS/AHQ transitions act on the last block of a sub frame
        let sub_frame_end = (self.slot.ts & 7) == 7 && self.slot.sub == SubPhase::M;

        match self.trans[idx].state {
            TransState::Bq => {
                info!("Sending 'Belegungsquittung' on traffic channel");
                telegramm.opcode = Opcode::BQ_K;
                self.trans[idx].count += 1;
                if self.trans[idx].count >= N_BQ && !self.trans[idx].timer.running() {
                    self.trans_new_state(idx, TransState::Vhq);
                    self.trans[idx].count = 0;
                    let at = self.after(BLOCK_SECONDS * f64::from(F_VHQK));
                    self.trans[idx].timer.start(at);
                }
            }
            TransState::Vhq => {
                info!("Sending 'Quittung Verbindung halten' on traffic channel");
                telegramm.opcode = Opcode::VHQ_K;
                if sub_frame_end && !self.trans[idx].timer.running() {
                    // next sub frame
                    if self.trans[idx].mo_call {
                        let callref = self.callrefs.next(CallOrigin::Mobile);
                        let rufnummer = self.trans[idx].rufnummer();
                        let dialing = self.trans[idx].dialing.clone();
                        if let Err(cause) = self.upstream.setup(callref, &rufnummer, &dialing) {
                            notice!("Call rejected (cause {}), releasing.", cause);
                            self.release_spk(idx, ReleaseCause::from_cause(cause));
                            // fall through to the release telegram at once
                            self.spk_k_release(&mut telegramm, idx, N_AFKT);
                            return Some(telegramm);
                        }
                        self.callref = Some(callref);
                        self.trans_new_state(idx, TransState::Ds);
                        self.trans[idx].count = 0;
                        let at = self.after(BLOCK_SECONDS * f64::from(F_DS));
                        self.trans[idx].timer.start(at);
                    }
                    if self.trans[idx].mt_call {
                        self.trans_new_state(idx, TransState::Rta);
                        let at = self.after(BLOCK_SECONDS * f64::from(F_RTA));
                        self.trans[idx].timer.start(at);
                        self.trans[idx].count = 0;
                        if let Some(callref) = self.callref {
                            self.upstream.alerting(callref);
                        }
                    }
                }
            }
            TransState::Ds => {
                info!("Sending 'Durchschalten' on traffic channel");
                telegramm.opcode = Opcode::DSB_K;
                if sub_frame_end && !self.trans[idx].timer.running() {
                    // next sub frame
                    self.trans_new_state(idx, TransState::Vhq);
                    self.trans[idx].count = 0;
                    self.mode.schedule(DspMode::SpkV, 1);
                    // one slot + F_VHQ distributed frames
                    let at = self.after(SLOT_SECONDS + DIST_FRAME_SECONDS * f64::from(F_VHQ));
                    self.trans[idx].timer.start(at);
                }
            }
            TransState::Rta => {
                info!("Sending 'Rufton anschalten' on traffic channel");
                telegramm.opcode = Opcode::RTA_K;
            }
            TransState::Ahq => {
                info!("Sending 'Abhebe Quittung' on traffic channel");
                telegramm.opcode = Opcode::AHQ_K;
                if sub_frame_end {
                    // next sub frame
                    self.trans_new_state(idx, TransState::Vhq);
                    self.trans[idx].count = 0;
                    self.mode.schedule(DspMode::SpkV, 1);
                    let at = self.after(SLOT_SECONDS + DIST_FRAME_SECONDS * f64::from(F_VHQ));
                    self.trans[idx].timer.start(at);
                }
            }
            TransState::Af => {
                info!("Sending 'Ausloesen durch FuFSt' on traffic channel");
                self.spk_k_release(&mut telegramm, idx, N_AFKT);
            }
            TransState::At => {
                info!("Sending 'Ausloesen durch FuTln' on traffic channel");
                self.spk_k_release(&mut telegramm, idx, 1);
            }
            _ => return None,
        }

        Some(telegramm)
    }

    /// Handle an uplink telegram in concentrated signalling.
    fn receive_spk_k(&mut self, telegramm: &Telegramm) {
        if self.trans.is_empty() {
            return;
        }
        let idx = 0;
        let mut valid_frame = false;

        match telegramm.opcode {
            Opcode::BEL_K => {
                if !self.match_fuz(telegramm) || !self.match_futln(telegramm, idx) {
                    return;
                }
                info!("Received allocation 'Belegung' message.");
                valid_frame = true;
                if self.trans[idx].state == TransState::Bq {
                    self.trans[idx].timer.stop();
                }
            }
            Opcode::DSQ_K => {
                if !self.match_fuz(telegramm) || !self.match_futln(telegramm, idx) {
                    return;
                }
                info!("Received assignment confirm 'Durchschaltung Quittung' message.");
                valid_frame = true;
                if self.trans[idx].state == TransState::Ds {
                    self.scrambler_active = telegramm.betriebs_art != 0;
                    self.trans[idx].timer.stop();
                }
            }
            Opcode::VH_K => {
                if !self.match_fuz(telegramm) || !self.match_futln(telegramm, idx) {
                    return;
                }
                info!("Received connection hold 'Verbindung halten' message.");
                valid_frame = true;
                if self.trans[idx].state == TransState::Vhq {
                    self.trans[idx].timer.stop();
                }
            }
            Opcode::RTAQ_K => {
                if !self.match_fuz(telegramm) || !self.match_futln(telegramm, idx) {
                    return;
                }
                valid_frame = true;
                info!("Received ringback 'Rufton anschalten Quittung' message.");
                if self.trans[idx].state == TransState::Rta {
                    let at = self.after(BLOCK_SECONDS * f64::from(F_RTA));
                    self.trans[idx].timer.start(at);
                }
            }
            Opcode::AH_K => {
                if !self.match_fuz(telegramm) || !self.match_futln(telegramm, idx) {
                    return;
                }
                info!("Received answer frame 'Abheben' message.");
                valid_frame = true;
                // ignore when already answered, held or releasing
                if matches!(
                    self.trans[idx].state,
                    TransState::Ahq | TransState::Vhq | TransState::Af
                ) {
                    // already received
                } else {
                    self.scrambler_active = telegramm.betriebs_art != 0;
                    self.trans_new_state(idx, TransState::Ahq);
                    self.trans[idx].count = 0;
                    self.trans[idx].timer.stop();
                    let rufnummer = self.trans[idx].rufnummer();
                    if let Some(callref) = self.callref {
                        self.upstream.answer(callref, &rufnummer);
                    }
                }
            }
            Opcode::AT_K => {
                if !self.match_fuz(telegramm) || !self.match_futln(telegramm, idx) {
                    return;
                }
                info!("Received release frame 'Ausloesen durch FuTln' message.");
                valid_frame = true;
                // ignore when already received or releasing ourselves
                if !matches!(self.trans[idx].state, TransState::At | TransState::Af) {
                    self.trans_new_state(idx, TransState::At);
                    self.trans[idx].count = 0;
                    self.trans[idx].timer.stop();
                    if let Some(callref) = self.callref.take() {
                        self.upstream.release(callref, Cause::TempFail);
                    }
                }
            }
            opcode => {
                notice!(
                    "Received unexpected Telegramm (opcode {} = {})",
                    opcode as u8,
                    opcode.name()
                );
            }
        }

        if valid_frame {
            self.sync_frame(telegramm.sync_time, None);
        }
    }

    /// Build the next telegram of the distributed signalling phase.
    fn transmit_spk_v(&mut self) -> Option<Telegramm> {
        if self.trans.is_empty() {
            return None;
        }
        let idx = 0;

        let mut telegramm = Telegramm {
            max_sendeleistung: self.ms_power,
            sendeleistungsanpassung: 1,
            ankuendigung_gespraechsende: 0,
            gebuehren_stand: 0,
            fuz_nationalitaet: self.sysinfo.fuz_nat,
            fuz_fuvst_nr: self.sysinfo.fuz_fuvst,
            fuz_rest_nr: self.sysinfo.fuz_rest,
            futln_nationalitaet: self.trans[idx].futln_nat,
            futln_heimat_fuvst_nr: self.trans[idx].futln_fuvst,
            futln_rest_nr: self.trans[idx].futln_rest,
            entfernung: self.sysinfo.entfernung,
            bedingte_genauigkeit_der_fufst: self.sysinfo.genauigkeit,
            gueltigkeit_des_gebuehrenstandes: 0,
            ausloesegrund: self.trans[idx].release_cause.wire(),
            ..Telegramm::default()
        };

        match self.trans[idx].state {
            TransState::Vhq => {
                info!("Sending 'Quittung Verbindung halten' on traffic channel");
                if self.slot.ts & 8 == 0 {
                    // sub frame 1 and 3
                    telegramm.opcode = Opcode::VHQ1_V;
                } else {
                    // sub frame 2 and 4
                    telegramm.opcode = Opcode::VHQ2_V;
                }
            }
            TransState::Af => {
                info!("Sending 'Ausloesen durch FuFSt' on traffic channel");
                telegramm.opcode = Opcode::AF_V;
                self.trans[idx].count += 1;
                if self.trans[idx].count == N_AFV {
                    let id = self.trans[idx].id;
                    self.destroy_transaction(id);
                    self.go_idle();
                }
            }
            TransState::At => {
                info!("Sending 'Ausloesen durch FuTln' on traffic channel");
                telegramm.opcode = Opcode::AF_V;
                self.trans[idx].count += 1;
                if self.trans[idx].count == 1 {
                    let id = self.trans[idx].id;
                    self.destroy_transaction(id);
                    self.go_idle();
                }
            }
            _ => return None,
        }

        Some(telegramm)
    }

    /// Handle an uplink telegram in distributed signalling.
    fn receive_spk_v(&mut self, telegramm: &Telegramm) {
        if self.trans.is_empty() {
            return;
        }
        let idx = 0;
        let mut valid_frame = false;

        match telegramm.opcode {
            Opcode::VH_V => {
                if !self.match_fuz(telegramm) || !self.match_futln(telegramm, idx) {
                    return;
                }
                if self.trans[idx].state != TransState::Vhq {
                    return;
                }
                let at = self.after(DIST_FRAME_SECONDS * f64::from(F_VHQ));
                self.trans[idx].timer.start(at);
                info!("Received supervisory frame 'Verbindung halten' message.");
                valid_frame = true;
                self.scrambler_active = telegramm.betriebs_art != 0;
            }
            Opcode::AT_V => {
                if !self.match_fuz(telegramm) || !self.match_futln(telegramm, idx) {
                    return;
                }
                info!("Received release frame 'Ausloesen durch FuTln' message.");
                valid_frame = true;
                // ignore when already received or releasing ourselves
                if !matches!(self.trans[idx].state, TransState::At | TransState::Af) {
                    self.scrambler_active = telegramm.betriebs_art != 0;
                    self.trans_new_state(idx, TransState::At);
                    self.trans[idx].count = 0;
                    self.trans[idx].timer.stop();
                    if let Some(callref) = self.callref.take() {
                        self.upstream.release(callref, Cause::TempFail);
                    }
                }
            }
            opcode => {
                notice!(
                    "Received unexpected Telegramm (opcode {} = {})",
                    opcode as u8,
                    opcode.name()
                );
            }
        }

        if valid_frame {
            self.sync_frame(telegramm.sync_time, None);
        }
    }

    /// Dispatch a decoded uplink telegram according to the live DSP mode.
    pub fn receive_telegramm(&mut self, telegramm: &Telegramm) {
        match self.mode.live() {
            DspMode::Ogk => self.receive_ogk(telegramm),
            DspMode::SpkK => self.receive_spk_k(telegramm),
            DspMode::SpkV => self.receive_spk_v(telegramm),
            mode => {
                notice!(
                    "Dropping telegramm {} received in mode {}",
                    telegramm.opcode.name(),
                    mode.name()
                );
            }
        }
    }

    // ===================================================================
    // Timeout handling
    // ===================================================================

    /// Service expired transaction timers against the sample clock.
    pub(crate) fn process_timers(&mut self) {
        loop {
            let now = self.now;
            let Some(idx) = self.trans.iter_mut().position(|t| t.timer.expired(now)) else {
                return;
            };
            self.transaction_timeout(idx);
        }
    }

    fn transaction_timeout(&mut self, idx: usize) {
        match self.trans[idx].state {
            TransState::Waf => {
                notice!("No response after dialing request 'Wahlaufforderung'");
                self.trans[idx].count += 1;
                if self.trans[idx].count == MAX_WAF_TRIES {
                    self.trans_new_state(idx, TransState::Wbn);
                } else {
                    self.trans_new_state(idx, TransState::Vwg);
                }
            }
            TransState::Bq => {
                notice!("No response after channel allocation 'Belegung Quittung'");
                if self.trans[idx].mt_call {
                    if let Some(callref) = self.callref.take() {
                        self.upstream.release(callref, Cause::OutOfOrder);
                    }
                }
                self.release_spk(idx, ReleaseCause::Funktechnisch);
            }
            TransState::Vhq => {
                if self.mode.live() != DspMode::SpkV {
                    notice!("No response while holding call 'Quittung Verbindung halten'");
                } else {
                    notice!("Lost signal from 'FuTln' (mobile station)");
                }
                if self.trans[idx].mo_call || self.trans[idx].mt_call {
                    if let Some(callref) = self.callref.take() {
                        self.upstream.release(callref, Cause::TempFail);
                    }
                }
                self.release_spk(idx, ReleaseCause::Funktechnisch);
            }
            TransState::Ds => {
                notice!("No response after connect 'Durchschalten'");
                if let Some(callref) = self.callref.take() {
                    self.upstream.release(callref, Cause::TempFail);
                }
                self.release_spk(idx, ReleaseCause::Funktechnisch);
            }
            TransState::Rta => {
                notice!("No response after ringing order 'Rufton anschalten'");
                if let Some(callref) = self.callref.take() {
                    self.upstream.release(callref, Cause::TempFail);
                }
                self.release_spk(idx, ReleaseCause::Funktechnisch);
            }
            TransState::Ahq => {
                notice!("No response after answer 'Abhebequittung'");
                if let Some(callref) = self.callref.take() {
                    self.upstream.release(callref, Cause::TempFail);
                }
                self.release_spk(idx, ReleaseCause::Funktechnisch);
            }
            state => {
                crate::error!("Timeout unhandled in state {}", state.name());
            }
        }
    }
}

// =======================================================================
// Call-control facade
// =======================================================================

/// C-Netz base station: the ordered channel registry plus the downward
/// call-control verbs.
pub struct CnetzBts<U: Upstream + Clone = EventSink> {
    channels: SenderRegistry<Cnetz<U>>,
    callrefs: SharedCallRefGen,
    upstream: U,
}

impl<U: Upstream + Clone> CnetzBts<U> {
    /// Create an empty base station emitting upward verbs into `upstream`.
    pub fn new(upstream: U) -> Self {
        Self {
            channels: SenderRegistry::new(),
            callrefs: SharedCallRefGen::new(),
            upstream,
        }
    }

    /// Create a channel transceiver and add it to the registry.
    pub fn add_channel(&mut self, config: CnetzConfig, sysinfo: SysInfo) -> Result<()> {
        let kanal = config.kanal;
        let cnetz = Cnetz::new(
            config,
            sysinfo,
            self.callrefs.clone(),
            self.upstream.clone(),
        )?;
        self.channels.insert(kanal, cnetz)
    }

    /// Access a channel by number.
    pub fn channel(&self, kanal: u16) -> Option<&Cnetz<U>> {
        self.channels.get(kanal)
    }

    /// Access a channel mutably by number.
    pub fn channel_mut(&mut self, kanal: u16) -> Option<&mut Cnetz<U>> {
        self.channels.get_mut(kanal)
    }

    /// Tear all channels down, destroying their transactions.
    pub fn shutdown(&mut self) {
        for cnetz in self.channels.iter_mut() {
            while let Some(trans) = cnetz.trans.first() {
                let id = trans.id;
                notice!(
                    "Removing pending transaction for subscriber '{}'",
                    trans.rufnummer()
                );
                cnetz.destroy_transaction(id);
            }
        }
        self.channels.shutdown();
    }

    fn parse_number(dialing: &str) -> std::result::Result<(u8, u8, u16), Cause> {
        let digits = if dialing.len() == 11 && dialing.starts_with("0160") {
            &dialing[4..]
        } else {
            dialing
        };
        if digits.len() != 7 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            notice!("Outgoing call to invalid number '{}', rejecting!", dialing);
            return Err(Cause::InvalNumber);
        }
        let rest: u32 = digits[2..].parse().map_err(|_| Cause::InvalNumber)?;
        if rest > 65535 {
            notice!(
                "Last 5 digits '{}' must not exceed '65535', but they do!",
                &digits[2..]
            );
            return Err(Cause::InvalNumber);
        }
        let bytes = digits.as_bytes();
        Ok((bytes[0] - b'0', bytes[1] - b'0', rest as u16))
    }

    /// Network-initiated call setup: page the mobile station.
    ///
    /// Rejects with a cause when the number is invalid, the subscriber is
    /// already in a call, or no channel is idle.
    pub fn setup(&mut self, dialing: &str) -> std::result::Result<CallRef, Cause> {
        // 1. check if number is invalid
        let (futln_nat, futln_fuvst, futln_rest) = Self::parse_number(dialing)?;

        // 2. check if given number is already in a call
        if self.channels.iter().any(|c| {
            c.trans
                .iter()
                .any(|t| t.matches(futln_nat, futln_fuvst, futln_rest))
        }) {
            notice!("Outgoing call to busy number, rejecting!");
            return Err(Cause::Busy);
        }

        // 3. check if all channels are busy
        let Some(cnetz) = self
            .channels
            .iter_mut()
            .find(|c| c.state == ChannelState::Idle)
        else {
            notice!("Outgoing call, but no free channel, rejecting!");
            return Err(Cause::NoChannel);
        };

        info!("Call to mobile station, paging station id '{}'", dialing);

        // 4. trying to page mobile station
        let callref = self.callrefs.next(CallOrigin::Network);
        cnetz.callref = Some(callref);
        let id = cnetz.create_transaction(TransState::Vak, futln_nat, futln_fuvst, futln_rest);
        cnetz.state = ChannelState::Busy;
        // flush all other transactions, if any
        cnetz.flush_other_transactions(id);

        Ok(callref)
    }

    /// Network answered a waiting call. The C-Netz call flow progresses on
    /// its own after through-connect, so this verb has nothing to do here.
    pub fn answer(&mut self, callref: CallRef) {
        debug!("Network answer for call {}; nothing pending on it.", callref);
    }

    /// Network disconnects (with tones). An active call stays active so
    /// tones and announcements can still be heard by the mobile station.
    pub fn disconnect(&mut self, callref: CallRef, cause: Cause) {
        info!("Call has been disconnected by network.");

        let Some(cnetz) = self
            .channels
            .iter_mut()
            .find(|c| c.callref == Some(callref))
        else {
            notice!("Outgoing disconnect, but no callref!");
            self.upstream.release(callref, Cause::InvalCallref);
            return;
        };

        if cnetz.state != ChannelState::Busy {
            notice!("Outgoing disconnect, but channel is not in busy state.");
            cnetz.callref = None;
            self.upstream.release(callref, cause);
            return;
        }
        if cnetz.trans.is_empty() {
            cnetz.callref = None;
            self.upstream.release(callref, cause);
            return;
        }

        // release when not active
        match cnetz.dsp_mode() {
            DspMode::SpkV => return,
            DspMode::SpkK => {
                info!("Call control disconnects on speech channel, releasing towards mobile station.");
                cnetz.release_spk(0, ReleaseCause::from_cause(cause));
                cnetz.callref = None;
            }
            _ => {
                info!("Call control disconnects on organisation channel, removing transaction.");
                let id = cnetz.trans[0].id;
                cnetz.destroy_transaction(id);
                cnetz.callref = None;
                cnetz.go_idle();
            }
        }

        self.upstream.release(callref, cause);
    }

    /// Network releases the call unconditionally. Release telegrams
    /// already in flight toward the handset are preserved; releasing an
    /// unknown callref is a no-op.
    pub fn release(&mut self, callref: CallRef, cause: Cause) {
        info!("Call has been released by network, releasing call.");

        let Some(cnetz) = self
            .channels
            .iter_mut()
            .find(|c| c.callref == Some(callref))
        else {
            notice!("Outgoing release, but no callref!");
            // don't report upward, the caller already released
            return;
        };

        cnetz.callref = None;

        if cnetz.state != ChannelState::Busy {
            notice!("Outgoing release, but channel is not in busy state.");
            return;
        }
        if cnetz.trans.is_empty() {
            return;
        }

        match cnetz.dsp_mode() {
            DspMode::SpkK | DspMode::SpkV => {
                info!("Call control releases on speech channel, releasing towards mobile station.");
                cnetz.release_spk(0, ReleaseCause::from_cause(cause));
            }
            _ => {
                info!("Call control releases on organisation channel, removing transaction.");
                let id = cnetz.trans[0].id;
                cnetz.destroy_transaction(id);
                cnetz.go_idle();
            }
        }
    }

    /// Push 20 ms of network audio toward the mobile station.
    pub fn audio_out(&mut self, callref: CallRef, pcm: &[i16]) {
        let Some(cnetz) = self
            .channels
            .iter_mut()
            .find(|c| c.callref == Some(callref))
        else {
            return;
        };
        if cnetz.dsp_mode() == DspMode::SpkV {
            // store as is; the rate is converted when inserting into
            // distributed blocks
            cnetz.jitter.save(pcm);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::event_channel;

    fn make_cnetz() -> (Cnetz, crossbeam::channel::Receiver<crate::call::CallEvent>) {
        let (sink, rx) = event_channel();
        let cnetz = Cnetz::new(
            CnetzConfig::default(),
            SysInfo::default(),
            SharedCallRefGen::new(),
            sink,
        )
        .expect("channel");
        (cnetz, rx)
    }

    #[test]
    fn test_kanal2freq() {
        // odd channels step 10 kHz below 465.750 MHz
        assert!((kanal2freq(1, false) - 465.740).abs() < 1e-9);
        assert!((kanal2freq(3, false) - 465.730).abs() < 1e-9);
        // even channels step 12.5 kHz
        assert!((kanal2freq(2, false) - 465.7375).abs() < 1e-9);
        // uplink is 10 MHz below downlink
        assert!((kanal2freq(131, false) - kanal2freq(131, true) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_channel_number_validation() {
        let (sink, _rx) = event_channel();
        let config = CnetzConfig {
            kanal: 949, // odd beyond 947
            ..CnetzConfig::default()
        };
        assert!(Cnetz::new(config, SysInfo::default(), SharedCallRefGen::new(), sink).is_err());

        let (sink, _rx) = event_channel();
        let config = CnetzConfig {
            kanal: 760, // even beyond 758
            ..CnetzConfig::default()
        };
        assert!(Cnetz::new(config, SysInfo::default(), SharedCallRefGen::new(), sink).is_err());
    }

    #[test]
    fn test_cause_mapping() {
        assert_eq!(
            ReleaseCause::from_cause(Cause::Normal),
            ReleaseCause::TeilnehmerBesetzt
        );
        assert_eq!(
            ReleaseCause::from_cause(Cause::Busy),
            ReleaseCause::TeilnehmerBesetzt
        );
        assert_eq!(
            ReleaseCause::from_cause(Cause::NoAnswer),
            ReleaseCause::TeilnehmerBesetzt
        );
        assert_eq!(
            ReleaseCause::from_cause(Cause::TempFail),
            ReleaseCause::GassenBesetzt
        );
        assert_eq!(
            ReleaseCause::from_cause(Cause::OutOfOrder),
            ReleaseCause::GassenBesetzt
        );
    }

    #[test]
    fn test_duplicate_subscriber_replaces_transaction() {
        let (mut cnetz, _events) = make_cnetz();
        let first = cnetz.create_transaction(TransState::Em, 2, 2, 22002);
        let second = cnetz.create_transaction(TransState::Vwg, 2, 2, 22002);
        assert_ne!(first, second);
        assert_eq!(cnetz.transactions().len(), 1);
        assert_eq!(cnetz.transactions()[0].state, TransState::Vwg);
    }

    #[test]
    #[should_panic(expected = "Transaction not in list")]
    fn test_double_destroy_panics() {
        let (mut cnetz, _events) = make_cnetz();
        let id = cnetz.create_transaction(TransState::Em, 2, 2, 22002);
        cnetz.destroy_transaction(id);
        cnetz.destroy_transaction(id);
    }

    #[test]
    fn test_flush_keeps_only_the_given_transaction() {
        let (mut cnetz, _events) = make_cnetz();
        cnetz.create_transaction(TransState::Em, 2, 2, 11111);
        let keep = cnetz.create_transaction(TransState::Vwg, 2, 2, 22222);
        cnetz.create_transaction(TransState::Um, 2, 2, 33333);
        cnetz.flush_other_transactions(keep);
        assert_eq!(cnetz.transactions().len(), 1);
        assert_eq!(cnetz.transactions()[0].id, keep);
    }

    #[test]
    fn test_search_in_insertion_order() {
        let (mut cnetz, _events) = make_cnetz();
        cnetz.create_transaction(TransState::Em, 2, 2, 11111);
        cnetz.create_transaction(TransState::Em, 2, 2, 22222);
        let mask = TransState::Em.bit();
        let idx = cnetz.search_transaction(mask).expect("found");
        assert_eq!(cnetz.transactions()[idx].futln_rest, 11111);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! Radiocom 2000 channel engine.
//!
//! Unlike C-Netz, Radiocom 2000 separates control channels (CC) from
//! traffic channels (TC): a call starts on a CC and is moved to a free TC
//! during assignment, and moves back for re-paging when the mobile goes
//! missing. A combined CC/TC channel type exists as a (non-standard)
//! single-channel fallback. Supervision during a call uses a scrambled
//! 7-bit supervisory digit instead of signalling frames.

use crate::call::{CallOrigin, CallRef, Cause, EventSink, SharedCallRefGen, Upstream};
use crate::config::{
    R2000_ALERT_TIME, R2000_BITRATE, R2000_CHANNEL_SPACING, R2000_DIAL1_TIME, R2000_DIAL2_TIME,
    R2000_IDENT_TIME, R2000_PAGE_TRIES, R2000_RELEASE_TIME, R2000_SUPER_TIME1, R2000_SUPER_TIME2,
    R2000_SUSPEND_TIME,
};
use crate::dsp::{Compander, DspMode, Emphasis, FskTx, JitterBuffer};
use crate::protocol::r2000::{self as frame_codec, Frame, FrameDirection, FRAME_BITS};
use crate::sched::Timer;
use crate::sender::SenderRegistry;
use crate::{debug, info, notice, Error, Result};

/// One frequency band of the Radiocom 2000 network.
#[derive(Debug, Clone, Copy)]
pub struct Band {
    /// Band number as dialed in configuration.
    pub number: u8,
    /// Display name.
    pub name: &'static str,
    /// First downlink channel frequency (channel 0), in MHz.
    pub dl_f0: f64,
    /// Number of channels (including 0).
    pub channels: u16,
    /// Duplex distance in MHz, uplink below downlink.
    pub duplex: f64,
}

/// Definition of bands and channels.
pub const BANDS: [Band; 11] = [
    Band { number: 1, name: "UHF", dl_f0: 424.8000, channels: 256, duplex: 10.0 },
    Band { number: 3, name: "VHF A/B", dl_f0: 169.8000, channels: 296, duplex: 4.6 },
    Band { number: 4, name: "VHF 5/6/1", dl_f0: 176.5000, channels: 176, duplex: -8.0 },
    Band { number: 5, name: "VHF 5/6/2", dl_f0: 178.7000, channels: 192, duplex: -8.0 },
    Band { number: 6, name: "VHF 5/6/3", dl_f0: 181.1000, channels: 192, duplex: -8.0 },
    Band { number: 7, name: "VHF 7/8/1", dl_f0: 200.5000, channels: 176, duplex: 8.0 },
    Band { number: 8, name: "VHF 7/8/2", dl_f0: 202.7000, channels: 192, duplex: 8.0 },
    Band { number: 9, name: "VHF 7/8/3", dl_f0: 205.1000, channels: 192, duplex: 8.0 },
    Band { number: 10, name: "VHF 9/10/1", dl_f0: 208.5000, channels: 176, duplex: -8.0 },
    Band { number: 11, name: "VHF 9/10/2", dl_f0: 210.7000, channels: 192, duplex: -8.0 },
    Band { number: 12, name: "VHF 9/10/3", dl_f0: 213.1000, channels: 192, duplex: -8.0 },
];

/// Convert band + channel number to the base station frequency in Hz.
///
/// Set `uplink` to get the mobile station frequency. Returns `None` for
/// unknown bands or out-of-range channels.
pub fn channel2freq(band: u8, channel: u16, uplink: bool) -> Option<f64> {
    let band = BANDS.iter().find(|b| b.number == band)?;
    if channel >= band.channels {
        notice!("Given channel number {} invalid!", channel);
        return None;
    }
    let mut freq = band.dl_f0 + R2000_CHANNEL_SPACING * f64::from(channel);
    if uplink {
        freq -= band.duplex;
    }
    Some(freq * 1e6)
}

/// Check whether a 9-digit number is a valid station mobile id.
///
/// Returns a description of the violated constraint, or `None` if valid.
pub fn number_invalid(number: &str) -> Option<&'static str> {
    let d = number.as_bytes();
    if number.len() != 9 || !d.iter().all(u8::is_ascii_digit) {
        return Some("Number must be 9 digits.");
    }
    if d[0] - b'0' > 7 {
        return Some("Digit 1 (station mobile type) exceeds 7.");
    }
    let relais = u16::from(d[1] - b'0') * 100 + u16::from(d[2] - b'0') * 10 + u16::from(d[3] - b'0');
    if relais > 511 {
        return Some("Digit 2 to 4 (relais number) exceeds 511.");
    }
    let mor: u32 = number[4..].parse().unwrap_or(u32::MAX);
    if mor > 65535 {
        return Some("Digit 5 to 9 (mobile number) exceeds 65535.");
    }
    None
}

/// Channel class of one transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanType {
    /// Control channel.
    Cc,
    /// Traffic channel.
    Tc,
    /// Combined control and traffic channel (non-standard).
    CcTc,
}

impl ChanType {
    /// Short configuration name.
    pub fn short_name(self) -> &'static str {
        match self {
            ChanType::Cc => "CC",
            ChanType::Tc => "TC",
            ChanType::CcTc => "CC/TC",
        }
    }

    /// Long display name.
    pub fn long_name(self) -> &'static str {
        match self {
            ChanType::Cc => "control channel",
            ChanType::Tc => "traffic channel",
            ChanType::CcTc => "combined control & traffic channel",
        }
    }

    /// True when the channel can carry control signalling.
    fn is_cc(self) -> bool {
        matches!(self, ChanType::Cc | ChanType::CcTc)
    }
}

/// Protocol states of one Radiocom 2000 channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Inscription,
    OutAssign,
    InAssign,
    RecallAssign,
    OutIdent,
    InIdent,
    RecallIdent,
    OutDial1,
    OutDial2,
    Suspend,
    RecallWait,
    InAlert,
    OutAlert,
    RecallAlert,
    Active,
    ReleaseCc,
    ReleaseTc,
}

impl State {
    /// Display name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            State::Idle => "IDLE",
            State::Inscription => "INSCRIPTION",
            State::OutAssign => "OUT ASSIGN",
            State::InAssign => "IN ASSIGN",
            State::RecallAssign => "RECALL ASSIGN",
            State::OutIdent => "OUT IDENT",
            State::InIdent => "IN IDENT",
            State::RecallIdent => "RECALL IDENT",
            State::OutDial1 => "OUT DIAL1",
            State::OutDial2 => "OUT DIAL2",
            State::Suspend => "SUSPEND",
            State::RecallWait => "RECALL WAIT",
            State::InAlert => "IN ALERT",
            State::OutAlert => "OUT ALERT",
            State::RecallAlert => "RECALL ALERT",
            State::Active => "ACTIVE",
            State::ReleaseCc => "RELEASE CC",
            State::ReleaseTc => "RELEASE TC",
        }
    }
}

/// Station mobile identity plus its dialed number.
#[derive(Debug, Clone, Default)]
pub struct Subscriber {
    /// Mobile type digit (0..7).
    pub mobile_type: u8,
    /// Home relais (0..511).
    pub relais: u16,
    /// Mobile id (0..65535).
    pub mor: u16,
    /// Digits dialed by the mobile.
    pub dialing: String,
}

impl Subscriber {
    /// 9-digit dial string of this identity.
    pub fn to_number(&self) -> String {
        format!("{}{:03}{:05}", self.mobile_type, self.relais, self.mor)
    }

    /// Display form "t,rrr,mmmmm".
    fn display(&self) -> String {
        format!("{},{:03},{:05}", self.mobile_type, self.relais, self.mor)
    }

    fn from_number(number: &str) -> Self {
        let d = number.as_bytes();
        Self {
            mobile_type: d[0] - b'0',
            relais: u16::from(d[1] - b'0') * 100 + u16::from(d[2] - b'0') * 10
                + u16::from(d[3] - b'0'),
            mor: number[4..].parse().unwrap_or(0),
            dialing: String::new(),
        }
    }
}

/// System information of one Radiocom 2000 channel.
#[derive(Debug, Clone)]
pub struct R2000SysInfo {
    /// Relais (base station) id, 0..511.
    pub relais: u16,
    /// Channel class.
    pub chan_type: ChanType,
    pub deport: u8,
    pub agi: u8,
    pub sm_power: u8,
    pub taxe: u8,
    /// Inscription acknowledge mode (3 = destructive, refused unless
    /// explicitly confirmed).
    pub crins: u8,
    /// Conversation scrambling parameter of the supervisory digit.
    pub nconv: u8,
    /// Suspend the call after dialing and recall once the remote answers.
    pub recall: bool,
}

impl Default for R2000SysInfo {
    fn default() -> Self {
        Self {
            relais: 1,
            chan_type: ChanType::CcTc,
            deport: 0,
            agi: 2,
            sm_power: 1,
            taxe: 0,
            crins: 0,
            nconv: 0,
            recall: false,
        }
    }
}

/// Static configuration of one Radiocom 2000 channel.
#[derive(Debug, Clone)]
pub struct R2000Config {
    /// Channel number within the band.
    pub kanal: u16,
    /// Radio sample rate.
    pub samplerate: u32,
    pub sysinfo: R2000SysInfo,
    /// Confirmation value required when `crins` is 3.
    pub destruction: u32,
    /// Apply pre-emphasis on the transmit voice path.
    pub pre_emphasis: bool,
    /// Apply de-emphasis on the receive voice path.
    pub de_emphasis: bool,
}

impl Default for R2000Config {
    fn default() -> Self {
        Self {
            kanal: 160,
            samplerate: 48000,
            sysinfo: R2000SysInfo::default(),
            destruction: 0,
            pre_emphasis: false,
            de_emphasis: false,
        }
    }
}

/// One Radiocom 2000 channel transceiver.
pub struct R2000 {
    kanal: u16,
    samplerate: u32,
    pub sysinfo: R2000SysInfo,
    subscriber: Subscriber,
    state: State,
    page_try: u32,
    tx_frame_count: u32,
    tx_last_frame_idle: bool,
    dsp_mode: DspMode,
    /// Supervisory digit handed to the modem in audio mode.
    tx_super: Option<u8>,
    pub callref: Option<CallRef>,
    timer: Timer,
    now: u64,
    pre_emphasis: bool,
    de_emphasis: bool,

    fsk_tx: FskTx,
    tx_buffer: Vec<i16>,
    tx_pos: usize,
    jitter: JitterBuffer,
    compander: Compander,
    emphasis: Emphasis,
}

impl R2000 {
    fn new(config: R2000Config) -> Result<Self> {
        Ok(Self {
            kanal: config.kanal,
            samplerate: config.samplerate,
            sysinfo: config.sysinfo,
            subscriber: Subscriber::default(),
            state: State::Idle,
            page_try: 0,
            tx_frame_count: 0,
            tx_last_frame_idle: false,
            dsp_mode: DspMode::Off,
            tx_super: None,
            callref: None,
            timer: Timer::default(),
            now: 0,
            pre_emphasis: config.pre_emphasis,
            de_emphasis: config.de_emphasis,
            fsk_tx: FskTx::new(config.samplerate, R2000_BITRATE, 0.0, 1.0, 0.0)?,
            tx_buffer: Vec::new(),
            tx_pos: 0,
            jitter: JitterBuffer::new(8000 / 5),
            compander: Compander::new(8000, 5.0, 22.5, 32767.0),
            emphasis: Emphasis::new(f64::from(config.samplerate), 300.0),
        })
    }

    /// Channel number.
    pub fn kanal(&self) -> u16 {
        self.kanal
    }

    /// Current protocol state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Live DSP mode.
    pub fn dsp_mode(&self) -> DspMode {
        self.dsp_mode
    }

    /// Supervisory digit currently handed to the modem, if any.
    pub fn tx_super(&self) -> Option<u8> {
        self.tx_super
    }

    fn after(&self, secs: f64) -> u64 {
        self.now + (secs * f64::from(self.samplerate)) as u64
    }

    fn new_state(&mut self, new_state: State) {
        if self.state == new_state {
            return;
        }
        debug!("State change: {} -> {}", self.state.name(), new_state.name());
        self.state = new_state;
        self.tx_frame_count = 0;
    }

    fn set_dsp_mode(&mut self, mode: DspMode, super_digit: Option<u8>) {
        if self.dsp_mode != mode {
            debug!("DSP mode {} -> {}", self.dsp_mode.name(), mode.name());
        }
        self.dsp_mode = mode;
        self.tx_super = super_digit;
        self.tx_buffer.clear();
        self.tx_pos = 0;
    }

    /// Encode nconv and the low relais bits into the supervisory digit
    /// transmitted to the phone (LSB first, inverted on air).
    fn encode_super(&self) -> u8 {
        let nconv = self.sysinfo.nconv;
        let relais = (self.sysinfo.relais & 0xF) as u8;

        let super_digit = ((nconv << 2) & 0x04)
            | (nconv & 0x02)
            | ((nconv >> 2) & 0x01)
            | ((relais << 6) & 0x40)
            | ((relais << 4) & 0x20)
            | ((relais << 2) & 0x10)
            | (relais & 0x08);

        info!(
            "TX Supervisory: NCONV: {} relais (4 lowest bits): {}",
            nconv, relais
        );

        super_digit ^ 0x7F
    }

    fn match_voie(&self, frame: &Frame, voie: u8) -> bool {
        if frame.voie == 0 && voie == 1 {
            notice!("Frame for control channel, but expecting traffic channel, ignoring. (maybe radio noise)");
            return false;
        }
        if frame.voie == 1 && voie == 0 {
            notice!("Frame for traffic channel, but expecting control channel, ignoring. (maybe radio noise)");
            return false;
        }
        true
    }

    fn match_channel(&self, frame: &Frame) -> bool {
        if frame.channel != self.kanal {
            notice!("Frame for different channel {} received, ignoring.", frame.channel);
            return false;
        }
        true
    }

    fn match_relais(&self, frame: &Frame) -> bool {
        if frame.relais != self.sysinfo.relais {
            notice!("Frame for different relais {} received, ignoring.", frame.relais);
            return false;
        }
        true
    }

    fn match_subscriber(&self, frame: &Frame) -> bool {
        // dialing messages carry no subscriber info
        if frame.message == 19 || frame.message == 20 {
            return true;
        }
        if self.subscriber.relais != frame.sm_relais || self.subscriber.mor != frame.sm_mor {
            notice!(
                "Frame for different subscriber '{},{:03},{:05}' received, ignoring.",
                frame.sm_type,
                frame.sm_relais,
                frame.sm_mor
            );
            return false;
        }
        true
    }

    /// Header fields common to every transmitted frame.
    fn frame_header(&self) -> Frame {
        Frame {
            channel: self.kanal,
            relais: self.sysinfo.relais,
            deport: self.sysinfo.deport,
            agi: self.sysinfo.agi,
            sm_power: self.sysinfo.sm_power,
            taxe: self.sysinfo.taxe,
            ..Frame::default()
        }
    }

    fn fill_subscriber(&self, frame: &mut Frame) {
        frame.sm_type = self.subscriber.mobile_type;
        frame.sm_relais = self.subscriber.relais;
        frame.sm_mor = self.subscriber.mor;
    }
}

/// Radiocom 2000 base station: band, channel registry and the downward
/// call-control verbs.
pub struct R2000Bts<U: Upstream = EventSink> {
    band: u8,
    channels: SenderRegistry<R2000>,
    callrefs: SharedCallRefGen,
    upstream: U,
}

impl<U: Upstream> R2000Bts<U> {
    /// Create an empty base station for the given band.
    pub fn new(band: u8, upstream: U) -> Result<Self> {
        if !BANDS.iter().any(|b| b.number == band) {
            notice!("Given band number is invalid!");
            return Err(Error::InvalidBand(band));
        }
        Ok(Self {
            band,
            channels: SenderRegistry::new(),
            callrefs: SharedCallRefGen::new(),
            upstream,
        })
    }

    /// Create a channel and add it to the registry.
    pub fn add_channel(&mut self, config: R2000Config) -> Result<()> {
        if channel2freq(self.band, config.kanal, false).is_none() {
            return Err(Error::InvalidChannel(config.kanal));
        }
        if config.sysinfo.chan_type.is_cc()
            && self.channels.iter().any(|c| c.sysinfo.chan_type.is_cc())
        {
            notice!("More than one control channel is not supported, please define other channels as traffic channels!");
            return Err(Error::DuplicateControlChannel);
        }
        if config.sysinfo.crins == 3 && config.destruction != 2342 {
            return Err(Error::Config(
                "Crins is 3, but destruction is not confirmed".to_string(),
            ));
        }

        debug!(
            "Creating 'Radiocom 2000' instance for channel = {} (sample rate {}).",
            config.kanal, config.samplerate
        );
        let kanal = config.kanal;
        let chan_type = config.sysinfo.chan_type;
        let mut r2000 = R2000::new(config)?;
        Self::go_idle_channel(&mut r2000, &mut self.upstream);
        self.channels.insert(kanal, r2000)?;

        notice!(
            "Created channel #{} of type '{}' = {}",
            kanal,
            chan_type.short_name(),
            chan_type.long_name()
        );
        Ok(())
    }

    /// Warn about channel combinations that cannot serve calls.
    pub fn check_channels(&self) {
        let cc = self.channels.iter().any(|c| c.sysinfo.chan_type.is_cc());
        let tc = self
            .channels
            .iter()
            .any(|c| matches!(c.sysinfo.chan_type, ChanType::Tc | ChanType::CcTc));
        let combined = self
            .channels
            .iter()
            .any(|c| c.sysinfo.chan_type == ChanType::CcTc);
        if cc && !tc {
            notice!("*** Selected channel(s) can be used for control only. No call is possible at all! Use combined 'CC/TC' instead!");
        }
        if tc && !cc {
            notice!("*** Selected channel(s) can be used for traffic only. No register/call is possible at all! Use combined 'CC/TC' instead!");
        }
        if combined {
            notice!("*** Selected (non standard) combined 'CC/TC'.");
        }
    }

    /// Access a channel by number.
    pub fn channel(&self, kanal: u16) -> Option<&R2000> {
        self.channels.get(kanal)
    }

    /// Tear all channels down.
    pub fn shutdown(&mut self) {
        self.channels.shutdown();
    }

    // ===================================================================
    // channel selection and movement
    // ===================================================================

    fn get_free_kanal(&self, chan_type: ChanType) -> Option<u16> {
        let mut combined = None;
        for r2000 in self.channels.iter() {
            // only search for idle channels
            if r2000.state != State::Idle {
                continue;
            }
            if r2000.sysinfo.chan_type == chan_type {
                return Some(r2000.kanal);
            }
            if combined.is_none() && r2000.sysinfo.chan_type == ChanType::CcTc {
                combined = Some(r2000.kanal);
            }
        }
        combined
    }

    /// Try to move a call to a channel of the given type; releases the
    /// call when no channel is free. Returns the channel now carrying the
    /// call.
    fn move_call_to_chan(&mut self, old_kanal: u16, chan_type: ChanType) -> Option<u16> {
        let new_kanal = self.get_free_kanal(chan_type);

        let old_type = self.channels.get(old_kanal)?.sysinfo.chan_type;
        let Some(new_kanal) = new_kanal else {
            // reuse a combined channel, if possible, or release the call
            if old_type == ChanType::CcTc {
                notice!(
                    "No {} found, staying on {}!",
                    chan_type.long_name(),
                    old_type.long_name()
                );
                return Some(old_kanal);
            }
            notice!(
                "Cannot move us to {}, because there is no free channel!",
                chan_type.long_name()
            );
            if let Some(callref) = self.channels.get_mut(old_kanal)?.callref.take() {
                notice!("Failed to assign channel, releasing towards network");
                self.upstream.release(callref, Cause::NoChannel);
            }
            self.release_sm(old_kanal);
            return None;
        };
        if new_kanal == old_kanal {
            return Some(old_kanal);
        }

        let (old, new) = self.channels.pair_mut(old_kanal, new_kanal)?;
        new.subscriber = old.subscriber.clone();
        new.callref = old.callref;
        new.page_try = old.page_try;
        let mode = old.dsp_mode;
        let super_digit = old.tx_super;
        new.set_dsp_mode(mode, super_digit);
        new.new_state(old.state);

        // cleanup old channel
        old.callref = None;
        self.go_idle(old_kanal);

        Some(new_kanal)
    }

    // ===================================================================
    // state helpers
    // ===================================================================

    fn go_idle_channel(r2000: &mut R2000, upstream: &mut U) {
        r2000.timer.stop();

        if let Some(callref) = r2000.callref.take() {
            crate::error!("Going idle, but still having callref, please fix!");
            upstream.release(callref, Cause::Normal);
        }

        if r2000.sysinfo.chan_type == ChanType::Tc {
            info!(
                "Entering IDLE state, no transmission at relais {} on {}.",
                r2000.sysinfo.relais,
                r2000.sysinfo.chan_type.long_name()
            );
            r2000.set_dsp_mode(DspMode::Off, None);
        } else {
            info!(
                "Entering IDLE state, sending idle frames at relais {} on {}.",
                r2000.sysinfo.relais,
                r2000.sysinfo.chan_type.long_name()
            );
            r2000.set_dsp_mode(DspMode::Frame, None);
        }
        r2000.new_state(State::Idle);
    }

    /// Go idle and return to frame mode.
    fn go_idle(&mut self, kanal: u16) {
        if let Some(r2000) = self.channels.get_mut(kanal) {
            // split borrow: the helper needs channel and upstream apart
            let upstream = &mut self.upstream;
            Self::go_idle_channel(r2000, upstream);
        }
    }

    /// Release towards the station mobile.
    fn release_sm(&mut self, kanal: u16) {
        let Some(r2000) = self.channels.get_mut(kanal) else {
            return;
        };
        let on_cc = matches!(
            r2000.state,
            State::Idle
                | State::OutAssign
                | State::InAssign
                | State::RecallAssign
                | State::RecallWait
        );
        if on_cc {
            r2000.new_state(State::ReleaseCc);
        } else {
            r2000.new_state(State::ReleaseTc);
        }
        let at = r2000.after(R2000_RELEASE_TIME);
        r2000.timer.start(at);
        r2000.set_dsp_mode(DspMode::Frame, None);
    }

    fn page(&mut self, kanal: u16, try_count: u32, state: State) {
        let Some(r2000) = self.channels.get_mut(kanal) else {
            return;
        };
        info!(
            "Entering paging state (try {}), sending 'Appel' to '{}'.",
            try_count,
            r2000.subscriber.display()
        );
        r2000.new_state(state);
        r2000.page_try = try_count;
    }

    /// Make the call toward the network (mobile-originated).
    fn setup_call(&mut self, kanal: u16) -> std::result::Result<(), Cause> {
        let callref = self.callrefs.next(CallOrigin::Mobile);
        let Some(r2000) = self.channels.get_mut(kanal) else {
            return Err(Cause::TempFail);
        };
        info!("Setup call to network.");
        let number = r2000.subscriber.to_number();
        let dialing = r2000.subscriber.dialing.clone();
        r2000.callref = Some(callref);
        if let Err(cause) = self.upstream.setup(callref, &number, &dialing) {
            notice!("Call rejected (cause {}), releasing.", cause);
            if let Some(r2000) = self.channels.get_mut(kanal) {
                r2000.callref = None;
            }
            self.release_sm(kanal);
            return Err(cause);
        }
        Ok(())
    }

    // ===================================================================
    // frame transmission
    // ===================================================================

    /// Build the next frame for a channel in frame mode.
    ///
    /// Returns the encoded frame bits, or `None` when the channel left
    /// frame mode (e.g. fell back to audio).
    pub fn get_frame(&mut self, kanal: u16) -> Option<[u8; FRAME_BITS]> {
        let r2000 = self.channels.get_mut(kanal)?;
        r2000.tx_frame_count += 1;

        let mut frame = r2000.frame_header();
        let last_frame_idle = r2000.tx_last_frame_idle;
        r2000.tx_last_frame_idle = false;
        let mut log_frame = true;

        match r2000.state {
            State::Idle | State::RecallWait => {
                // beacon
                frame.voie = 1;
                frame.message = 1;
                if last_frame_idle {
                    log_frame = false;
                }
                r2000.tx_last_frame_idle = true;
            }
            State::Inscription => {
                frame.voie = 1;
                frame.message = 0;
                r2000.fill_subscriber(&mut frame);
                frame.crins = r2000.sysinfo.crins;
                info!("Sending inscription acknowledge");
                self.go_idle(kanal);
            }
            State::OutAssign | State::RecallAssign => {
                return self.tx_assign(kanal, frame, false);
            }
            State::InAssign => {
                return self.tx_assign(kanal, frame, true);
            }
            State::OutIdent | State::RecallIdent | State::InIdent => {
                frame.voie = 0;
                frame.message = 16;
                r2000.fill_subscriber(&mut frame);
                if r2000.tx_frame_count == 1 {
                    info!("Sending identity request");
                }
            }
            State::OutDial1 | State::OutDial2 => {
                // dialing invitation
                frame.voie = 0;
                frame.message = 17;
                r2000.fill_subscriber(&mut frame);
                frame.invitation = 10;
                frame.nconv = 0;
                if r2000.tx_frame_count == 1 {
                    info!("Sending dialing invitation to station mobile");
                }
            }
            State::Suspend => {
                frame.voie = 0;
                frame.message = 26;
                r2000.fill_subscriber(&mut frame);
                if r2000.tx_frame_count == 1 {
                    info!("Sending suspend frame");
                }
            }
            State::InAlert | State::OutAlert | State::RecallAlert => {
                // answer invitation
                frame.voie = 0;
                frame.message = 17;
                r2000.fill_subscriber(&mut frame);
                frame.invitation = 3;
                frame.nconv = r2000.sysinfo.nconv;
                if r2000.tx_frame_count == 1 {
                    info!("Sending answer invitation to station mobile");
                }
            }
            State::ReleaseCc => {
                frame.voie = 1;
                frame.message = 9;
                r2000.fill_subscriber(&mut frame);
                if r2000.tx_frame_count == 1 {
                    info!("Sending release towards station mobile");
                }
            }
            State::ReleaseTc => {
                frame.voie = 0;
                frame.message = 24;
                r2000.fill_subscriber(&mut frame);
                if r2000.tx_frame_count == 1 {
                    info!("Sending release towards station mobile");
                }
            }
            State::Active => {
                // Active channels run in audio DSP mode, not frame mode;
                // the dsp_mode check below discards this frame.
            }
        }

        let r2000 = self.channels.get(kanal)?;
        // frame sending aborted (e.g. due to audio)
        if r2000.dsp_mode != DspMode::Frame {
            return None;
        }
        if log_frame {
            debug!(
                "Sending frame {}.",
                frame_codec::frame_name(frame.message, FrameDirection::RelToSm)
            );
        }
        Some(frame_codec::encode(&frame))
    }

    /// Assignment frames move the call to a traffic channel; they can be
    /// sent only once because afterwards we are on the new channel.
    fn tx_assign(&mut self, kanal: u16, mut frame: Frame, incoming: bool) -> Option<[u8; FRAME_BITS]> {
        let Some(tc_kanal) = self.move_call_to_chan(kanal, ChanType::Tc) else {
            // no traffic channel: the beacon keeps running
            frame.voie = 1;
            frame.message = 1;
            return Some(frame_codec::encode(&frame));
        };

        {
            let tc = self.channels.get(tc_kanal)?;
            frame.voie = 1;
            frame.message = if incoming { 3 } else { 5 };
            frame.sm_type = tc.subscriber.mobile_type;
            frame.sm_relais = tc.subscriber.relais;
            frame.sm_mor = tc.subscriber.mor;
            frame.chan_assign = tc_kanal;
        }

        info!(
            "Sending {} assignment from channel {} to {}",
            if incoming { "incoming" } else { "outgoing" },
            kanal,
            tc_kanal
        );

        let tc = self.channels.get_mut(tc_kanal)?;
        let next = if incoming {
            State::InIdent
        } else if tc.state == State::OutAssign {
            State::OutIdent
        } else {
            State::RecallIdent
        };
        tc.new_state(next);
        let at = tc.after(R2000_IDENT_TIME);
        tc.timer.start(at);

        Some(frame_codec::encode(&frame))
    }

    // ===================================================================
    // frame reception
    // ===================================================================

    /// A demodulated frame arrived on a channel: decode and dispatch.
    pub fn receive_frame_bits(&mut self, kanal: u16, bits: &[u8; FRAME_BITS]) {
        match frame_codec::decode(bits) {
            Ok(frame) => self.receive_frame(kanal, &frame),
            Err(err) => {
                debug!("Received invalid frame. ({})", err);
            }
        }
    }

    /// Handle a decoded uplink frame.
    pub fn receive_frame(&mut self, kanal: u16, frame: &Frame) {
        debug!(
            "Received frame {}",
            frame_codec::frame_name(frame.message, FrameDirection::SmToRel)
        );

        // release is handled in any state
        if frame.message == 6 || frame.message == 24 {
            let Some(r2000) = self.channels.get_mut(kanal) else {
                return;
            };
            if r2000.state == State::Idle {
                return;
            }
            let voie = u8::from(frame.message >= 16);
            if !r2000.match_voie(frame, voie)
                || !r2000.match_channel(frame)
                || !r2000.match_relais(frame)
                || !r2000.match_subscriber(frame)
            {
                return;
            }
            info!("Received release from station mobile");
            if let Some(callref) = r2000.callref.take() {
                self.upstream.release(callref, Cause::Normal);
            }
            self.go_idle(kanal);
            return;
        }

        let Some(r2000) = self.channels.get(kanal) else {
            return;
        };
        match r2000.state {
            State::Idle => self.rx_idle(kanal, frame),
            State::OutIdent | State::RecallIdent | State::InIdent => self.rx_ident(kanal, frame),
            State::OutDial1 => self.rx_out_dial1(kanal, frame),
            State::OutDial2 => self.rx_out_dial2(kanal, frame),
            State::Suspend => self.rx_suspend(kanal, frame),
            State::InAlert | State::OutAlert | State::RecallAlert => self.rx_alert(kanal, frame),
            state => {
                debug!(
                    "Dropping frame {} in state {}",
                    frame_codec::frame_name(frame.message, FrameDirection::SmToRel),
                    state.name()
                );
            }
        }
    }

    /// Registration and call requests on the idle control channel.
    fn rx_idle(&mut self, kanal: u16, frame: &Frame) {
        let Some(r2000) = self.channels.get_mut(kanal) else {
            return;
        };
        if !r2000.match_voie(frame, 0) || !r2000.match_channel(frame) || !r2000.match_relais(frame)
        {
            return;
        }

        match frame.message {
            0 => {
                // inscription
                r2000.subscriber.mobile_type = frame.sm_type;
                r2000.subscriber.relais = frame.sm_relais;
                r2000.subscriber.mor = frame.sm_mor;

                info!(
                    "Received inscription from station mobile '{}'",
                    r2000.subscriber.display()
                );
                info!(" -> Mobile Type: {}", r2000.subscriber.mobile_type);
                info!(" -> Home Relais: {}", r2000.subscriber.relais);
                info!(" -> Mobile ID: {}", r2000.subscriber.mor);
                info!(
                    " (Use '{}' as dial string to call the station mobile.)",
                    r2000.subscriber.to_number()
                );

                r2000.new_state(State::Inscription);
            }
            1 | 3 => {
                // call request
                r2000.subscriber.mobile_type = frame.sm_type;
                r2000.subscriber.relais = frame.sm_relais;
                r2000.subscriber.mor = frame.sm_mor;

                info!(
                    "Received outgoing call from station mobile '{}'",
                    r2000.subscriber.display()
                );

                if self.get_free_kanal(ChanType::Tc).is_none() {
                    notice!("Rejecting mobile originated call, no free traffic channel");
                    self.release_sm(kanal);
                    return;
                }
                if let Some(r2000) = self.channels.get_mut(kanal) {
                    r2000.new_state(State::OutAssign);
                }
            }
            message => {
                debug!(
                    "Dropping frame {} in state IDLE",
                    frame_codec::frame_name(message, FrameDirection::SmToRel)
                );
            }
        }
    }

    /// Identity response on the assigned channel.
    fn rx_ident(&mut self, kanal: u16, frame: &Frame) {
        let Some(r2000) = self.channels.get_mut(kanal) else {
            return;
        };
        if !r2000.match_voie(frame, 1)
            || !r2000.match_channel(frame)
            || !r2000.match_relais(frame)
            || !r2000.match_subscriber(frame)
        {
            return;
        }

        match frame.message {
            16 => {
                info!(
                    "Received identity response from station mobile '{},{:03},{:05}'",
                    frame.sm_type, frame.sm_relais, frame.sm_mor
                );

                match r2000.state {
                    State::InIdent => {
                        // alert the phone
                        r2000.new_state(State::InAlert);
                        let at = r2000.after(R2000_ALERT_TIME);
                        r2000.timer.start(at);
                        if let Some(callref) = r2000.callref {
                            self.upstream.alerting(callref);
                        }
                    }
                    State::RecallIdent => {
                        r2000.new_state(State::RecallAlert);
                        let at = r2000.after(R2000_ALERT_TIME);
                        r2000.timer.start(at);
                    }
                    State::OutIdent => {
                        // request dial string
                        r2000.new_state(State::OutDial1);
                        let at = r2000.after(R2000_DIAL1_TIME);
                        r2000.timer.start(at);
                    }
                    _ => {}
                }
            }
            message => {
                debug!(
                    "Dropping frame {} in state {}",
                    frame_codec::frame_name(message, FrameDirection::SmToRel),
                    r2000.state.name()
                );
            }
        }
    }

    /// First group of dialed digits.
    fn rx_out_dial1(&mut self, kanal: u16, frame: &Frame) {
        let Some(r2000) = self.channels.get_mut(kanal) else {
            return;
        };
        if !r2000.match_voie(frame, 1) || !r2000.match_channel(frame) || !r2000.match_relais(frame)
        {
            return;
        }

        match frame.message {
            19 => {
                r2000.subscriber.dialing = frame
                    .digits
                    .iter()
                    .map(|&d| char::from(b'0' + d.min(9)))
                    .collect();
                info!(
                    "Received digits 1..10 from station mobile: {}",
                    r2000.subscriber.dialing
                );
                r2000.new_state(State::OutDial2);
                let at = r2000.after(R2000_DIAL2_TIME);
                r2000.timer.start(at);
            }
            message => {
                debug!(
                    "Dropping frame {} in state {}",
                    frame_codec::frame_name(message, FrameDirection::SmToRel),
                    r2000.state.name()
                );
            }
        }
    }

    /// Second group of dialed digits.
    fn rx_out_dial2(&mut self, kanal: u16, frame: &Frame) {
        let Some(r2000) = self.channels.get_mut(kanal) else {
            return;
        };
        if !r2000.match_voie(frame, 1) || !r2000.match_channel(frame) || !r2000.match_relais(frame)
        {
            return;
        }

        match frame.message {
            20 => {
                let more: String = frame
                    .digits
                    .iter()
                    .map(|&d| char::from(b'0' + d.min(9)))
                    .collect();
                r2000.subscriber.dialing.push_str(&more);
                info!(
                    "Received digits 11..20 from station mobile: {}",
                    r2000.subscriber.dialing
                );
                self.dialing_complete(kanal);
            }
            message => {
                debug!(
                    "Dropping frame {} in state {}",
                    frame_codec::frame_name(message, FrameDirection::SmToRel),
                    r2000.state.name()
                );
            }
        }
    }

    /// Continue after dialing: suspend for recall, or alert right away.
    fn dialing_complete(&mut self, kanal: u16) {
        let Some(r2000) = self.channels.get_mut(kanal) else {
            return;
        };
        if r2000.sysinfo.recall {
            info!("Suspending call until called party has answered");
            r2000.new_state(State::Suspend);
            let at = r2000.after(R2000_SUSPEND_TIME);
            r2000.timer.start(at);
        } else {
            r2000.new_state(State::OutAlert);
            let at = r2000.after(R2000_ALERT_TIME);
            r2000.timer.start(at);
        }
    }

    /// Suspend acknowledge during the recall procedure.
    fn rx_suspend(&mut self, kanal: u16, frame: &Frame) {
        let Some(r2000) = self.channels.get_mut(kanal) else {
            return;
        };
        if !r2000.match_voie(frame, 1)
            || !r2000.match_channel(frame)
            || !r2000.match_relais(frame)
            || !r2000.match_subscriber(frame)
        {
            return;
        }

        match frame.message {
            26 => {
                info!(
                    "Received suspend response from station mobile '{},{:03},{:05}'",
                    frame.sm_type, frame.sm_relais, frame.sm_mor
                );
                r2000.timer.stop();
                // move us back to cc
                let Some(cc_kanal) = self.move_call_to_chan(kanal, ChanType::Cc) else {
                    return;
                };
                if let Some(cc) = self.channels.get_mut(cc_kanal) {
                    cc.new_state(State::RecallWait);
                }
                // setup toward the network; a failure already released
                let _ = self.setup_call(cc_kanal);
            }
            message => {
                debug!(
                    "Dropping frame {} in state {}",
                    frame_codec::frame_name(message, FrameDirection::SmToRel),
                    r2000.state.name()
                );
            }
        }
    }

    /// Answer from the mobile while it is ringing.
    fn rx_alert(&mut self, kanal: u16, frame: &Frame) {
        let Some(r2000) = self.channels.get_mut(kanal) else {
            return;
        };
        if !r2000.match_voie(frame, 1)
            || !r2000.match_channel(frame)
            || !r2000.match_relais(frame)
            || !r2000.match_subscriber(frame)
        {
            return;
        }

        match frame.message {
            17 => {
                info!(
                    "Received answer from station mobile '{},{:03},{:05}'",
                    frame.sm_type, frame.sm_relais, frame.sm_mor
                );

                match r2000.state {
                    State::InAlert => {
                        // answer incoming call
                        info!("Answer call to network.");
                        let number = r2000.subscriber.to_number();
                        if let Some(callref) = r2000.callref {
                            self.upstream.answer(callref, &number);
                        }
                    }
                    State::OutAlert => {
                        if self.setup_call(kanal).is_err() {
                            return;
                        }
                    }
                    _ => {
                        // answer after recall; the network side is already up
                        debug!("Recall answered by station mobile.");
                    }
                }
                // go active
                let Some(r2000) = self.channels.get_mut(kanal) else {
                    return;
                };
                r2000.timer.stop();
                r2000.new_state(State::Active);
                let super_digit = r2000.encode_super();
                r2000.set_dsp_mode(DspMode::AudioTx, Some(super_digit));
                // start supervisory timer
                let at = r2000.after(R2000_SUPER_TIME1);
                r2000.timer.start(at);
            }
            message => {
                debug!(
                    "Dropping frame {} in state {}",
                    frame_codec::frame_name(message, FrameDirection::SmToRel),
                    r2000.state.name()
                );
            }
        }
    }

    /// Supervisory digit received during a call.
    pub fn receive_super(&mut self, kanal: u16, super_digit: u8) {
        // nconv is LSB first, the digit inverted on air
        let nconv = ((super_digit >> 2) & 0x01) | (super_digit & 0x02) | ((super_digit << 2) & 0x04);
        let relais = ((super_digit >> 6) & 0x01)
            | ((super_digit >> 4) & 0x02)
            | ((super_digit >> 2) & 0x04)
            | (super_digit & 0x08);

        info!(
            "RX Supervisory: NCONV: {} Relais (4 lowest bits): {}",
            nconv, relais
        );

        let Some(r2000) = self.channels.get_mut(kanal) else {
            return;
        };
        if r2000.state != State::Active {
            return;
        }
        if u16::from(relais) != (r2000.sysinfo.relais & 0xF) || nconv != r2000.sysinfo.nconv {
            return;
        }

        // unmute RX audio if not already
        let super_digit = r2000.tx_super;
        r2000.set_dsp_mode(DspMode::AudioTxRx, super_digit);

        // reset supervisory timer
        let at = r2000.after(R2000_SUPER_TIME2);
        r2000.timer.start(at);
    }

    // ===================================================================
    // timeout handling
    // ===================================================================

    fn timeout(&mut self, kanal: u16) {
        let Some(r2000) = self.channels.get(kanal) else {
            return;
        };
        match r2000.state {
            State::OutIdent => {
                info!("Timeout receiving identity (outgoing call)");
                self.go_idle(kanal);
            }
            State::InIdent | State::RecallIdent => self.timeout_ident(kanal),
            State::OutDial1 => {
                info!("Timeout while receiving digits (outgoing call)");
                self.release_sm(kanal);
            }
            State::OutDial2 => {
                info!("Phone does not send digits 11..20");
                self.dialing_complete(kanal);
            }
            State::Suspend => {
                info!("Phone does not respond to suspend frame");
                self.release_sm(kanal);
            }
            State::InAlert | State::OutAlert | State::RecallAlert => {
                info!("Timeout while alerting");
                notice!("Phone does not respond, releasing towards network");
                if let Some(callref) = self
                    .channels
                    .get_mut(kanal)
                    .and_then(|c| c.callref.take())
                {
                    self.upstream.release(callref, Cause::NoAnswer);
                }
                self.release_sm(kanal);
            }
            State::Active => {
                info!("Timeout after losing supervisory signal, releasing call");
                if let Some(callref) = self
                    .channels
                    .get_mut(kanal)
                    .and_then(|c| c.callref.take())
                {
                    self.upstream.release(callref, Cause::TempFail);
                }
                self.release_sm(kanal);
            }
            State::ReleaseCc => {
                info!("Done sending release, going idle");
                self.go_idle(kanal);
            }
            State::ReleaseTc => {
                info!("Timeout while sending release, going idle");
                self.go_idle(kanal);
            }
            _ => {}
        }
    }

    /// Identity timed out on the traffic channel: move back to the
    /// control channel and page again, or give up.
    fn timeout_ident(&mut self, kanal: u16) {
        let incoming = self
            .channels
            .get(kanal)
            .map(|c| c.state == State::InIdent)
            .unwrap_or(false);
        if incoming {
            info!("Timeout receiving identity (incoming call)");
        } else {
            info!("Timeout receiving identity (recalling outgoing call)");
        }

        // move us back to cc
        let Some(cc_kanal) = self.move_call_to_chan(kanal, ChanType::Cc) else {
            return;
        };

        let page_try = self
            .channels
            .get_mut(cc_kanal)
            .map(|c| {
                c.page_try = c.page_try.saturating_sub(1);
                c.page_try
            })
            .unwrap_or(0);
        if page_try > 0 {
            // page again ...
            let state = if incoming {
                State::InAssign
            } else {
                State::RecallAssign
            };
            self.page(cc_kanal, page_try, state);
            return;
        }

        // ... or release
        notice!("Phone does not respond, releasing towards network");
        if let Some(callref) = self
            .channels
            .get_mut(cc_kanal)
            .and_then(|c| c.callref.take())
        {
            self.upstream.release(callref, Cause::OutOfOrder);
        }
        self.release_sm(cc_kanal);
    }

    // ===================================================================
    // call control (downward verbs)
    // ===================================================================

    /// Network-initiated call setup: page the station mobile.
    pub fn setup(&mut self, dialing: &str) -> std::result::Result<CallRef, Cause> {
        // 1. convert number to identity
        if let Some(reason) = number_invalid(dialing) {
            notice!(
                "Outgoing call to invalid number '{}', rejecting! ({})",
                dialing,
                reason
            );
            return Err(Cause::InvalNumber);
        }
        let subscr = Subscriber::from_number(dialing);

        // 2. check if the number is already in a call
        if self.channels.iter().any(|c| {
            c.state != State::Idle
                && c.subscriber.relais == subscr.relais
                && c.subscriber.mor == subscr.mor
        }) {
            notice!("Outgoing call to busy number, rejecting!");
            return Err(Cause::Busy);
        }

        // 3. check for free control and traffic channels
        let Some(cc_kanal) = self.get_free_kanal(ChanType::Cc) else {
            notice!("Outgoing call, but no free control channel, rejecting!");
            return Err(Cause::NoChannel);
        };
        if self.get_free_kanal(ChanType::Tc).is_none() {
            notice!("Outgoing call, but no free traffic channel, rejecting!");
            return Err(Cause::NoChannel);
        }

        info!(
            "Call to station mobile, paging station id '{}'",
            subscr.display()
        );

        // 4. trying to page the station mobile
        let callref = self.callrefs.next(CallOrigin::Network);
        if let Some(r2000) = self.channels.get_mut(cc_kanal) {
            r2000.subscriber = subscr;
            r2000.callref = Some(callref);
        }
        self.page(cc_kanal, R2000_PAGE_TRIES, State::InAssign);

        Ok(callref)
    }

    /// Network answered: recall the mobile suspended after dialing.
    pub fn answer(&mut self, callref: CallRef) {
        let Some(kanal) = self.find_callref(callref) else {
            notice!("Outgoing answer, but no callref!");
            self.upstream.release(callref, Cause::InvalCallref);
            return;
        };
        let state = self.channels.get(kanal).map(|c| c.state);
        if state == Some(State::RecallWait) {
            info!("Call has been answered by network, recalling station mobile.");
            self.page(kanal, R2000_PAGE_TRIES, State::RecallAssign);
        }
    }

    /// Network disconnects (with tones). An active call stays active so
    /// announcements can still be heard.
    pub fn disconnect(&mut self, callref: CallRef, cause: Cause) {
        info!("Call has been disconnected by network.");

        let Some(kanal) = self.find_callref(callref) else {
            notice!("Outgoing disconnect, but no callref!");
            self.upstream.release(callref, Cause::InvalCallref);
            return;
        };

        // keep an active call running
        if self.channels.get(kanal).map(|c| c.state) == Some(State::Active) {
            return;
        }
        notice!("Outgoing disconnect during call setup, releasing!");
        if let Some(r2000) = self.channels.get_mut(kanal) {
            r2000.callref = None;
        }
        self.release_sm(kanal);
        self.upstream.release(callref, cause);
    }

    /// Network releases the call unconditionally; unknown callrefs are a
    /// no-op.
    pub fn release(&mut self, callref: CallRef, _cause: Cause) {
        info!("Call has been released by network, releasing call.");

        let Some(kanal) = self.find_callref(callref) else {
            notice!("Outgoing release, but no callref!");
            // don't report upward, the caller already released
            return;
        };

        if let Some(r2000) = self.channels.get_mut(kanal) {
            r2000.callref = None;
        }
        notice!("Outgoing release, releasing!");
        self.release_sm(kanal);
    }

    /// Push 20 ms of network audio toward the station mobile.
    pub fn audio_out(&mut self, callref: CallRef, pcm: &[i16]) {
        let Some(kanal) = self.find_callref(callref) else {
            return;
        };
        if let Some(r2000) = self.channels.get_mut(kanal) {
            if matches!(r2000.dsp_mode, DspMode::AudioTx | DspMode::AudioTxRx) {
                r2000.jitter.save(pcm);
            }
        }
    }

    fn find_callref(&self, callref: CallRef) -> Option<u16> {
        self.channels
            .iter()
            .find(|c| c.callref == Some(callref))
            .map(|c| c.kanal)
    }

    // ===================================================================
    // sample pump
    // ===================================================================

    /// Provide the next transmit samples for one channel.
    pub fn fill_tx_samples(&mut self, kanal: u16, samples: &mut [i16]) {
        let expired = {
            let Some(r2000) = self.channels.get_mut(kanal) else {
                return;
            };
            r2000.now += samples.len() as u64;
            let now = r2000.now;
            r2000.timer.expired(now)
        };
        if expired {
            self.timeout(kanal);
        }

        let mode = match self.channels.get(kanal) {
            Some(c) => c.dsp_mode,
            None => return,
        };
        match mode {
            DspMode::Frame => self.fill_frames(kanal, samples),
            DspMode::AudioTx | DspMode::AudioTxRx => {
                let Some(r2000) = self.channels.get_mut(kanal) else {
                    return;
                };
                r2000.jitter.load(samples);
                r2000.compander.compress(samples);
                if r2000.pre_emphasis {
                    r2000.emphasis.pre_emphasis(samples);
                }
            }
            _ => samples.fill(0),
        }
    }

    fn fill_frames(&mut self, kanal: u16, samples: &mut [i16]) {
        let mut filled = 0;
        while filled < samples.len() {
            let need_frame = match self.channels.get(kanal) {
                Some(c) => c.tx_pos == 0 && c.tx_buffer.is_empty(),
                None => return,
            };
            if need_frame {
                match self.get_frame(kanal) {
                    Some(bits) => {
                        let Some(r2000) = self.channels.get_mut(kanal) else {
                            return;
                        };
                        let R2000 { fsk_tx, tx_buffer, .. } = r2000;
                        fsk_tx.encode_block(&bits, 2, tx_buffer);
                        r2000.tx_pos = 0;
                    }
                    None => {
                        // channel left frame mode mid-buffer
                        for s in &mut samples[filled..] {
                            *s = 0;
                        }
                        return;
                    }
                }
            }

            let Some(r2000) = self.channels.get_mut(kanal) else {
                return;
            };
            let copy = (r2000.tx_buffer.len() - r2000.tx_pos).min(samples.len() - filled);
            samples[filled..filled + copy]
                .copy_from_slice(&r2000.tx_buffer[r2000.tx_pos..r2000.tx_pos + copy]);
            r2000.tx_pos += copy;
            filled += copy;
            if r2000.tx_pos == r2000.tx_buffer.len() {
                r2000.tx_pos = 0;
                r2000.tx_buffer.clear();
            }
        }
    }

    /// Decoded uplink voice during a call.
    pub fn receive_audio(&mut self, kanal: u16, samples: &[i16]) {
        let Some(r2000) = self.channels.get_mut(kanal) else {
            return;
        };
        if r2000.dsp_mode != DspMode::AudioTxRx {
            return;
        }
        let Some(callref) = r2000.callref else {
            return;
        };
        let mut pcm = samples.to_vec();
        if r2000.de_emphasis {
            r2000.emphasis.de_emphasis(&mut pcm);
        }
        r2000.compander.expand(&mut pcm);
        self.upstream.audio(callref, &pcm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{event_channel, CallEvent};

    fn make_bts() -> (
        R2000Bts,
        crossbeam::channel::Receiver<CallEvent>,
    ) {
        let (sink, rx) = event_channel();
        let mut bts = R2000Bts::new(1, sink).expect("band 1");
        bts.add_channel(R2000Config {
            kanal: 100,
            sysinfo: R2000SysInfo {
                chan_type: ChanType::Cc,
                ..R2000SysInfo::default()
            },
            ..R2000Config::default()
        })
        .expect("cc");
        bts.add_channel(R2000Config {
            kanal: 120,
            sysinfo: R2000SysInfo {
                chan_type: ChanType::Tc,
                ..R2000SysInfo::default()
            },
            ..R2000Config::default()
        })
        .expect("tc");
        (bts, rx)
    }

    fn inscription_frame() -> Frame {
        Frame {
            voie: 0,
            channel: 100,
            relais: 1,
            message: 0,
            sm_type: 2,
            sm_relais: 123,
            sm_mor: 4567,
            ..Frame::default()
        }
    }

    #[test]
    fn test_band_table() {
        let f = channel2freq(1, 0, false).expect("channel 0");
        assert!((f - 424.8e6).abs() < 1.0);
        let f = channel2freq(1, 1, false).expect("channel 1");
        assert!((f - 424.8125e6).abs() < 1.0);
        // uplink is duplex below downlink
        let f = channel2freq(1, 0, true).expect("uplink");
        assert!((f - 414.8e6).abs() < 1.0);
        assert!(channel2freq(2, 0, false).is_none());
        assert!(channel2freq(1, 256, false).is_none());
    }

    #[test]
    fn test_number_validation() {
        assert!(number_invalid("212304567").is_none());
        assert!(number_invalid("812304567").is_some()); // type 8
        assert!(number_invalid("299904567").is_some()); // relais 999
        assert!(number_invalid("200065536").is_some()); // mor 65536
        assert!(number_invalid("200065535").is_none()); // mor boundary
        assert!(number_invalid("12345678").is_some()); // 8 digits
    }

    #[test]
    fn test_single_control_channel_enforced() {
        let (sink, _rx) = event_channel();
        let mut bts = R2000Bts::new(1, sink).expect("band");
        bts.add_channel(R2000Config {
            kanal: 10,
            sysinfo: R2000SysInfo {
                chan_type: ChanType::Cc,
                ..R2000SysInfo::default()
            },
            ..R2000Config::default()
        })
        .expect("first cc");
        let err = bts.add_channel(R2000Config {
            kanal: 11,
            sysinfo: R2000SysInfo {
                chan_type: ChanType::CcTc,
                ..R2000SysInfo::default()
            },
            ..R2000Config::default()
        });
        assert!(matches!(err, Err(Error::DuplicateControlChannel)));
    }

    #[test]
    fn test_inscription_acknowledged() {
        let (mut bts, _rx) = make_bts();
        bts.receive_frame(100, &inscription_frame());
        assert_eq!(bts.channel(100).expect("cc").state(), State::Inscription);

        // the acknowledge frame carries the subscriber and returns to idle
        let bits = bts.get_frame(100).expect("frame");
        let frame = frame_codec::decode(&bits).expect("decode");
        assert_eq!(frame.message, 0);
        assert_eq!(frame.sm_relais, 123);
        assert_eq!(frame.sm_mor, 4567);
        assert_eq!(bts.channel(100).expect("cc").state(), State::Idle);
    }

    #[test]
    fn test_network_setup_moves_to_traffic_channel() {
        let (mut bts, rx) = make_bts();
        let callref = bts.setup("212304567").expect("setup");
        assert_eq!(bts.channel(100).expect("cc").state(), State::InAssign);

        // assignment frame moves the call to the TC
        let bits = bts.get_frame(100).expect("frame");
        let frame = frame_codec::decode(&bits).expect("decode");
        assert_eq!(frame.message, 3);
        assert_eq!(frame.chan_assign, 120);
        assert_eq!(bts.channel(120).expect("tc").state(), State::InIdent);
        assert_eq!(bts.channel(100).expect("cc").state(), State::Idle);

        // identity response alerts the network
        let ident = Frame {
            voie: 1,
            channel: 120,
            relais: 1,
            message: 16,
            sm_type: 2,
            sm_relais: 123,
            sm_mor: 4567,
            ..Frame::default()
        };
        bts.receive_frame(120, &ident);
        assert_eq!(bts.channel(120).expect("tc").state(), State::InAlert);
        assert!(matches!(
            rx.try_recv().expect("event"),
            CallEvent::Alerting { callref: c } if c == callref
        ));

        // answer goes active and reports upward
        let answer = Frame {
            message: 17,
            ..ident
        };
        bts.receive_frame(120, &answer);
        assert_eq!(bts.channel(120).expect("tc").state(), State::Active);
        assert_eq!(bts.channel(120).expect("tc").dsp_mode(), DspMode::AudioTx);
        assert!(matches!(
            rx.try_recv().expect("event"),
            CallEvent::Answer { .. }
        ));
    }

    #[test]
    fn test_supervisory_unmutes_and_refreshes() {
        let (mut bts, _rx) = make_bts();
        bts.setup("212304567").expect("setup");
        let _ = bts.get_frame(100);
        let ident = Frame {
            voie: 1,
            channel: 120,
            relais: 1,
            message: 16,
            sm_type: 2,
            sm_relais: 123,
            sm_mor: 4567,
            ..Frame::default()
        };
        bts.receive_frame(120, &ident);
        bts.receive_frame(120, &Frame { message: 17, ..ident });

        // round-trip the supervisory digit the base station transmits
        let tx_super = bts.channel(120).expect("tc").tx_super().expect("digit");
        bts.receive_super(120, tx_super ^ 0x7F);
        assert_eq!(
            bts.channel(120).expect("tc").dsp_mode(),
            DspMode::AudioTxRx
        );
    }

    #[test]
    fn test_mobile_release_goes_idle() {
        let (mut bts, _rx) = make_bts();
        bts.receive_frame(100, &inscription_frame());
        let release = Frame {
            voie: 0,
            channel: 100,
            relais: 1,
            message: 6,
            sm_type: 2,
            sm_relais: 123,
            sm_mor: 4567,
            ..Frame::default()
        };
        bts.receive_frame(100, &release);
        assert_eq!(bts.channel(100).expect("cc").state(), State::Idle);
    }
}

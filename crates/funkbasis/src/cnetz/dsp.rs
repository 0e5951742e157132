// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! C-Netz sample pump.
//!
//! Runs on the SDR driver's callback thread. Each call to
//! [`Cnetz::fill_tx_samples`] drains the current block buffer and, on
//! block boundaries, asks the transaction engine for the next telegram,
//! applies pending mode switches and advances the slot clock. Voice is
//! spliced into distributed blocks where the encoder left its marker.

use super::Cnetz;
use crate::call::Upstream;
use crate::dsp::{ClockStream, DspMode, VOICE_MARKER};
use crate::protocol::telegramm::{self, Telegramm, TELEGRAMM_BITS};
use crate::sched::SubPhase;
use crate::{debug, notice};

impl<U: Upstream> Cnetz<U> {
    /// Provide the next transmit samples toward the radio.
    ///
    /// # Panics
    /// Panics if a block encoder ever produces an empty buffer; running
    /// dry mid-callback would desync every phone on the channel.
    pub fn fill_tx_samples(&mut self, samples: &mut [i16]) {
        self.clock_speed.record(ClockStream::Tx, samples.len() as u64);

        let mut filled = 0;
        while filled < samples.len() {
            if self.tx_pos == 0 {
                self.next_block();
                assert!(
                    !self.tx_buffer.is_empty(),
                    "block encoder produced no samples, please fix!"
                );
            }

            let remaining = self.tx_buffer.len() - self.tx_pos;
            let copy = remaining.min(samples.len() - filled);
            for _ in 0..copy {
                let spl = self.tx_buffer[self.tx_pos];
                self.tx_pos += 1;
                if spl == VOICE_MARKER {
                    // marker found: insert a new chunk of audio
                    self.refill_speech();
                }
                // copy speech as long as something is left in the buffer
                samples[filled] = if self.speech_pos < self.speech_buffer.len() {
                    let s = self.speech_buffer[self.speech_pos];
                    self.speech_pos += 1;
                    s
                } else if spl == VOICE_MARKER {
                    0
                } else {
                    spl
                };
                filled += 1;
            }

            if self.tx_pos == self.tx_buffer.len() {
                self.tx_pos = 0;
            }
            self.now += copy as u64;
            self.process_timers();
        }
    }

    /// Advance the scheduler by one block and build its telegram.
    ///
    /// This is the block-level entry the sample encoder sits on: it
    /// applies pending mode switches, asks the transaction engine for the
    /// telegram of this block (`None` for silence/idle blocks) and
    /// advances the slot clock. Returns the mode the block was built for
    /// along with the telegram.
    pub fn pump_block(&mut self) -> (DspMode, Option<Telegramm>) {
        // measure actual signal speed once per super frame
        if self.slot.ts == 0 && self.slot.sub == SubPhase::R {
            let superframe_samples = u64::from(self.samplerate) * 24 / 10;
            self.clock_speed
                .record(ClockStream::TxResult, superframe_samples);
        }

        // switch to the scheduled mode on rufblock boundaries
        if self.slot.sub == SubPhase::R {
            if let Some(mode) = self.mode.tick_r() {
                crate::info!("Switching channel (mode) to {}", mode.name());
            }
        }
        self.mode.assert_consistent();
        let mode = self.mode.live();

        let telegramm = match mode {
            DspMode::Ogk => {
                if (1u32 << self.slot.ts) & self.sysinfo.ogk_timeslot_mask != 0 {
                    if self.slot.sub == SubPhase::R {
                        // remember the slot, to match the mobile's answer
                        self.last_tx_timeslot = self.slot.ts;
                        debug!("Transmitting 'Rufblock' at timeslot {}", self.slot.ts);
                        Some(self.transmit_rufblock())
                    } else {
                        debug!("Transmitting 'Meldeblock' at timeslot {}", self.slot.ts);
                        Some(self.transmit_meldeblock())
                    }
                } else {
                    None
                }
            }
            DspMode::SpkK => {
                debug!("Transmitting 'Konzentrierte Signalisierung'");
                self.transmit_spk_k()
            }
            DspMode::SpkV => {
                debug!("Transmitting 'Verteilte Signalisierung'");
                self.transmit_spk_v()
            }
            _ => None,
        };

        self.slot.advance(mode == DspMode::SpkV);
        (mode, telegramm)
    }

    /// Start a new block: pump the scheduler and encode into samples.
    fn next_block(&mut self) {
        let (mode, telegramm) = self.pump_block();
        match mode {
            DspMode::SpkV => {
                let bits = match telegramm {
                    Some(telegramm) => telegramm::encode(&telegramm),
                    None => [0u8; TELEGRAMM_BITS],
                };
                self.fsk_tx.encode_distributed(&bits, &mut self.tx_buffer);
            }
            _ => match telegramm {
                Some(telegramm) => {
                    let bits = telegramm::encode(&telegramm);
                    self.fsk_tx.encode_block(&bits, 7, &mut self.tx_buffer);
                }
                None => self.fsk_tx.encode_idle(&mut self.tx_buffer),
            },
        }
    }

    /// Advance the sample clock without producing samples and service
    /// expired timers. Modems that pace themselves block-wise use this to
    /// keep timer time moving.
    pub fn advance_time(&mut self, samples: u64) {
        self.now += samples;
        self.process_timers();
    }

    /// Current RX bit time, as corrected by the slot clock.
    pub fn rx_bit_time(&self) -> f64 {
        self.fsk_rx.bit_time()
    }

    /// Pull, process and stage the next 100 voice samples.
    fn refill_speech(&mut self) {
        let mut pcm = [0i16; 100];
        self.jitter.load(&mut pcm);
        self.compander.compress(&mut pcm);
        self.speech_buffer.clear();
        self.upsampler.process(&pcm, &mut self.speech_buffer);
        if self.scrambler_active {
            self.scrambler_tx.process(&mut self.speech_buffer);
        }
        // pre-emphasis is done here, not by the common sender path, and
        // skipped with the scrambler: the combination sounds bad
        if self.pre_emphasis && !self.scrambler_active {
            self.emphasis.pre_emphasis(&mut self.speech_buffer);
        }
        self.speech_pos = 0;
    }

    /// Baseband samples arrived from the radio. Decoding happens in the
    /// modem layer; here only the RX clock and measurement advance.
    pub fn on_samples_received(&mut self, samples: &[i16]) {
        self.clock_speed.record(ClockStream::Rx, samples.len() as u64);
        self.fsk_rx.advance(samples.len());
    }

    /// A demodulated block arrived: decode and dispatch it.
    ///
    /// `sync_time` is the fractional position of the decoded barker
    /// against the block grid, in bit units.
    pub fn receive_bits(&mut self, bits: &[u8; TELEGRAMM_BITS], sync_time: f64) {
        match telegramm::decode(bits) {
            Ok(mut telegramm) => {
                telegramm.sync_time = sync_time;
                self.receive_telegramm(&telegramm);
            }
            Err(err) => {
                notice!("Dropping broken telegramm ({})", err);
            }
        }
    }

    /// Decoded uplink voice from a distributed block.
    ///
    /// The mirror image of the transmit path: descramble (or de-emphasise),
    /// convert back to 8 kHz and expand, then hand upward.
    pub fn receive_voice(&mut self, samples: &[i16]) {
        if self.mode.live() != DspMode::SpkV {
            return;
        }
        let Some(callref) = self.callref else {
            return;
        };

        let mut voice = samples.to_vec();
        if self.scrambler_active {
            self.scrambler_rx.process(&mut voice);
        } else if self.de_emphasis {
            self.emphasis.de_emphasis(&mut voice);
        }
        let mut pcm = Vec::with_capacity(voice.len());
        self.downsampler.process(&voice, &mut pcm);
        self.compander.expand(&mut pcm);
        self.upstream.audio(callref, &pcm);
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{event_channel, SharedCallRefGen};
    use crate::cnetz::{CnetzConfig, SysInfo, TransState};
    use crate::config::OGK_KANAL;

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
    fn test_fill_advances_slot_clock() {
        let (mut cnetz, _events) = make_cnetz();
        let mut samples = vec![0i16; 48000];
        cnetz.fill_tx_samples(&mut samples);
        // one second of samples covers 13+ slots
        let slot = cnetz.slot();
        assert!(slot.ts > 0, "slot clock did not advance");
    }

    #[test]
    fn test_masked_slots_transmit_silence() {
        let (mut cnetz, _events) = make_cnetz();
        cnetz.sysinfo.ogk_timeslot_mask = 0;
        let mut samples = vec![1i16; 9600];
        cnetz.fill_tx_samples(&mut samples);
        assert!(samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_broadcast_slots_carry_signal() {
        let (mut cnetz, _events) = make_cnetz();
        let mut samples = vec![0i16; 9600];
        cnetz.fill_tx_samples(&mut samples);
        assert!(samples.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_distributed_block_has_no_marker_leak() {
        let (mut cnetz, _events) = make_cnetz();
        // fake an ongoing call in distributed mode
        let id = cnetz.create_transaction(TransState::Vhq, 2, 2, 22002);
        let _ = id;
        cnetz.trans[0].mo_call = true;
        cnetz.state = crate::cnetz::ChannelState::Busy;
        cnetz.mode.schedule(DspMode::SpkV, 0);
        cnetz.jitter.save(&vec![4000i16; 4000]);

        let mut samples = vec![0i16; 28800]; // one distributed frame
        cnetz.fill_tx_samples(&mut samples);
        assert!(samples.iter().all(|&s| s != VOICE_MARKER));
        assert!(samples.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_ogk_channel_is_default() {
        let (cnetz, _events) = make_cnetz();
        assert_eq!(cnetz.kanal(), OGK_KANAL);
        assert_eq!(cnetz.dsp_mode(), DspMode::Ogk);
    }
}

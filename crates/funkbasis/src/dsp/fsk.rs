// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! FSK transmit encoder and receive bit clock.
//!
//! The transmitter keeps a floating-point phase accumulator so that the
//! integrated timing error over a block stays below one sample, whatever
//! the sample-rate/bit-rate ratio is. Bit transitions are smoothed with a
//! pre-tabulated half-cosine ramp to keep the transmit spectrum clean; at
//! block boundaries the first and last bits ramp from/to zero at half
//! amplitude so idle periods carry no DC.

use crate::{Error, Result};

/// Sentinel sample value marking "insert voice here" in distributed blocks.
///
/// The TX loop replaces the marker and the following window with samples
/// from the voice pipeline. i16::MIN never occurs as an encoded FSK sample
/// (deviation is clamped below full scale).
pub const VOICE_MARKER: i16 = i16::MIN;

/// Last emitted signal level, deciding how the next bit is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    /// Unmodulated pause (block boundary or distributed gap).
    Pause,
    /// Steady low (bit 0).
    Low,
    /// Steady high (bit 1).
    High,
}

/// FSK transmit encoder with phase-accurate bit clock.
pub struct FskTx {
    /// Samples per bit, including the TX clock-speed correction.
    bitduration: f64,
    /// Ramp-phase increment per sample (256 phase units per bit).
    bitstep: f64,
    /// Running ramp phase, 0..256.
    phase: f64,
    deviation: i16,
    ramp_up: [i16; 256],
    ramp_down: [i16; 256],
    /// Noise amplitude for idle blocks (0.0 = silence).
    noise: f64,
}

impl FskTx {
    /// Create a transmit encoder.
    ///
    /// `tx_ppm` corrects the sound card / SDR clock; values outside
    /// +-1000 ppm are refused. `deviation` is the peak level in 0..1 of
    /// full scale, `noise` the idle-block noise amplitude (0 disables).
    pub fn new(samplerate: u32, bitrate: f64, tx_ppm: f64, deviation: f64, noise: f64) -> Result<Self> {
        if !(-1000.0..=1000.0).contains(&tx_ppm) {
            return Err(Error::InvalidClockSpeed(tx_ppm));
        }

        let bitduration = f64::from(samplerate) / (bitrate * (1.0 + tx_ppm / 1e6));
        let deviation = (deviation.min(1.0) * 32766.9) as i16;

        let mut ramp_up = [0i16; 256];
        let mut ramp_down = [0i16; 256];
        for i in 0..256 {
            let c = (i as f64 / 256.0 * std::f64::consts::PI).cos();
            ramp_down[i] = (c * f64::from(deviation)) as i16;
            ramp_up[i] = -ramp_down[i];
        }

        Ok(Self {
            bitduration,
            bitstep: 256.0 / bitduration,
            phase: 0.0,
            deviation,
            ramp_up,
            ramp_down,
            noise,
        })
    }

    /// Samples per bit.
    pub fn bitduration(&self) -> f64 {
        self.bitduration
    }

    /// Emit one bit duration of samples produced by `sample_at(ramp_phase)`.
    fn span(&mut self, buf: &mut Vec<i16>, sample_at: impl Fn(&Self, usize) -> i16) {
        loop {
            let idx = (self.phase as usize) & 0xFF;
            buf.push(sample_at(self, idx));
            self.phase += self.bitstep;
            if self.phase >= 256.0 {
                self.phase -= 256.0;
                break;
            }
        }
    }

    /// Emit one data bit, shaped according to the previous level.
    fn bit(&mut self, buf: &mut Vec<i16>, value: u8, last: Level) {
        let dev = self.deviation;
        match (last, value) {
            (Level::Pause, 1) => {
                // ramp up from 0
                self.span(buf, |s, i| s.ramp_up[i] / 2 + dev / 2);
            }
            (Level::Pause, _) => {
                // ramp down from 0
                self.span(buf, |s, i| s.ramp_down[i] / 2 - dev / 2);
            }
            (Level::High, 1) => {
                self.span(buf, |_, _| dev);
            }
            (Level::High, _) => {
                self.span(buf, |s, i| s.ramp_down[i]);
            }
            (Level::Low, 1) => {
                self.span(buf, |s, i| s.ramp_up[i]);
            }
            (Level::Low, _) => {
                self.span(buf, |_, _| -dev);
            }
        }
    }

    /// Emit the half-amplitude ramp returning to zero after the last bit.
    fn bit_to_pause(&mut self, buf: &mut Vec<i16>, last: Level) {
        let dev = self.deviation;
        if last == Level::Low {
            self.span(buf, |s, i| s.ramp_up[i] / 2 - dev / 2);
        } else {
            self.span(buf, |s, i| s.ramp_down[i] / 2 + dev / 2);
        }
    }

    fn pause(&mut self, buf: &mut Vec<i16>) {
        self.span(buf, |_, _| 0);
    }

    /// Encode one plain block: `pause_bits` of silence, the data bits with
    /// ramping, `pause_bits` of silence again.
    pub fn encode_block(&mut self, bits: &[u8], pause_bits: usize, buf: &mut Vec<i16>) {
        buf.clear();

        for _ in 0..pause_bits {
            self.pause(buf);
        }

        let mut last = Level::Pause;
        for &b in bits {
            self.bit(buf, b, last);
            last = if b == 1 { Level::High } else { Level::Low };
        }

        if pause_bits > 0 {
            self.bit_to_pause(buf, last);
            for _ in 1..pause_bits {
                self.pause(buf);
            }
        }
    }

    /// Encode one distributed block: 46 four-bit signalling bursts, each
    /// followed by a 60-bit voice window, preceded by two voice-only
    /// windows. The first sample of every voice window is set to
    /// [`VOICE_MARKER`]; the TX loop recognises it and inserts 100 voice
    /// samples there.
    pub fn encode_distributed(&mut self, bits: &[u8], buf: &mut Vec<i16>) {
        debug_assert_eq!(bits.len(), 46 * 4);
        buf.clear();

        // two leading voice-only windows (6 gap bits + 60 bits of voice)
        for _ in 0..2 {
            for _ in 0..6 {
                self.pause(buf);
            }
            let marker = buf.len();
            for _ in 0..60 {
                self.pause(buf);
            }
            buf[marker] = VOICE_MARKER;
        }

        // 46 bursts of (1 gap + 4 data + 1 gap + 60 voice) bits
        for burst in bits.chunks(4) {
            self.pause(buf);
            let mut last = Level::Pause;
            for &b in burst {
                self.bit(buf, b, last);
                last = if b == 1 { Level::High } else { Level::Low };
            }
            self.bit_to_pause(buf, last);
            let marker = buf.len();
            for _ in 0..60 {
                self.pause(buf);
            }
            buf[marker] = VOICE_MARKER;
        }
    }

    /// Encode one idle block: 198 bits of silence, or of scaled noise when
    /// channel-occupancy simulation is configured.
    pub fn encode_idle(&mut self, buf: &mut Vec<i16>) {
        buf.clear();
        if self.noise > 0.0 {
            let r = self.noise;
            for _ in 0..crate::config::BLOCK_BITS {
                // clamp away from i16::MIN, which is the voice marker
                self.span(buf, |_, _| {
                    ((f64::from(fastrand::u16(..) as i16) * r) as i16).max(-32767)
                });
            }
        } else {
            for _ in 0..crate::config::BLOCK_BITS {
                self.pause(buf);
            }
        }
    }
}

/// Receive-side bit clock.
///
/// The demodulator itself lives in the SDR layer; this tracks the expected
/// bit time from the sample stream and applies sync corrections requested
/// by the slot clock.
pub struct FskRx {
    /// Samples per bit, including the RX clock-speed correction.
    bitduration: f64,
    /// Bit time of the next incoming sample, in bits since start.
    bit_time: f64,
}

impl FskRx {
    /// Create a receive bit clock. `rx_ppm` outside +-1000 is refused.
    pub fn new(samplerate: u32, bitrate: f64, rx_ppm: f64) -> Result<Self> {
        if !(-1000.0..=1000.0).contains(&rx_ppm) {
            return Err(Error::InvalidClockSpeed(rx_ppm));
        }
        Ok(Self {
            bitduration: f64::from(samplerate) / (bitrate * (1.0 + rx_ppm / 1e6)),
            bit_time: 0.0,
        })
    }

    /// Advance the clock by a number of received samples.
    pub fn advance(&mut self, samples: usize) {
        self.bit_time += samples as f64 / self.bitduration;
    }

    /// Current bit time.
    pub fn bit_time(&self) -> f64 {
        self.bit_time
    }

    /// Nudge the clock by the given offset in bits (positive = we are
    /// late). Called by the slot clock on every validly decoded block.
    pub fn correct_sync(&mut self, offset_bits: f64) {
        self.bit_time -= offset_bits;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BLOCK_BITS;

    fn tx(samplerate: u32) -> FskTx {
        FskTx::new(samplerate, 5280.0, 0.0, 1.0, 0.0).expect("fsk tx")
    }

    #[test]
    fn test_ppm_range_check() {
        assert!(FskTx::new(48000, 5280.0, 1000.1, 1.0, 0.0).is_err());
        assert!(FskTx::new(48000, 5280.0, -1000.1, 1.0, 0.0).is_err());
        assert!(FskRx::new(48000, 5280.0, 2000.0).is_err());
    }

    #[test]
    fn test_block_length_accumulates_no_drift() {
        // With a non-integer samples-per-bit ratio, the number of samples
        // per block may vary by one, but the average must match the bit
        // clock to within one sample over many blocks.
        let mut tx = tx(48000);
        let bits = [1u8; 184];
        let mut buf = Vec::new();
        let mut total = 0usize;
        let blocks = 50;
        for _ in 0..blocks {
            tx.encode_block(&bits, 7, &mut buf);
            total += buf.len();
        }
        let expected = 48000.0 / 5280.0 * BLOCK_BITS as f64 * blocks as f64;
        assert!(
            (total as f64 - expected).abs() <= 1.0,
            "drift: {} vs {}",
            total,
            expected
        );
    }

    #[test]
    fn test_block_starts_and_ends_at_zero() {
        let mut tx = tx(48000);
        let bits = [1u8; 184];
        let mut buf = Vec::new();
        tx.encode_block(&bits, 7, &mut buf);
        assert_eq!(buf[0], 0);
        assert_eq!(*buf.last().expect("nonempty"), 0);
    }

    #[test]
    fn test_steady_bits_hold_deviation() {
        let mut tx = tx(48000);
        let bits = [1u8; 184];
        let mut buf = Vec::new();
        tx.encode_block(&bits, 7, &mut buf);
        // Skip the pause and the ramp-in bit, then expect a plateau.
        let bit = tx.bitduration() as usize + 1;
        let plateau = &buf[9 * bit..20 * bit];
        assert!(plateau.iter().all(|&s| s > 30000));
    }

    #[test]
    fn test_distributed_markers() {
        let mut tx = tx(48000);
        let bits = [0u8; 184];
        let mut buf = Vec::new();
        tx.encode_distributed(&bits, &mut buf);
        let markers = buf.iter().filter(|&&s| s == VOICE_MARKER).count();
        assert_eq!(markers, 48, "2 leading + 46 interleaved voice windows");
        // 16 blocks of 198 bits worth of samples
        let expected = 48000.0 / 5280.0 * (16 * BLOCK_BITS) as f64;
        assert!((buf.len() as f64 - expected).abs() <= 1.0);
    }

    #[test]
    fn test_idle_block_silence() {
        let mut tx = tx(48000);
        let mut buf = Vec::new();
        tx.encode_idle(&mut buf);
        assert!(buf.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_idle_block_noise() {
        let mut tx = FskTx::new(48000, 5280.0, 0.0, 1.0, 0.2).expect("fsk tx");
        let mut buf = Vec::new();
        tx.encode_idle(&mut buf);
        assert!(buf.iter().any(|&s| s != 0));
        assert!(buf.iter().all(|&s| s != VOICE_MARKER));
    }

    #[test]
    fn test_rx_clock_correction() {
        let mut rx = FskRx::new(48000, 5280.0, 0.0).expect("fsk rx");
        rx.advance(48000);
        assert!((rx.bit_time() - 5280.0).abs() < 1e-6);
        rx.correct_sync(0.25);
        assert!((rx.bit_time() - 5279.75).abs() < 1e-6);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! 2:1 syllabic compander for the narrow-band voice path.
//!
//! The compressor halves the dynamic range (in dB) before the radio
//! channel, the expander restores it afterwards. Attack and recovery time
//! constants default to 5 ms / 22.5 ms; the envelope follower state
//! persists across blocks.

/// Paired compressor/expander state.
pub struct Compander {
    attack: f64,
    recovery: f64,
    peak: f64,
    env_compress: f64,
    env_expand: f64,
}

/// Envelope floor, limits the maximum gain applied to near-silence.
const ENVELOPE_FLOOR: f64 = 1e-4;

impl Compander {
    /// Create a compander for the given audio sample rate.
    ///
    /// `attack_ms`/`recovery_ms` are the envelope time constants, `peak`
    /// the full-scale reference level.
    pub fn new(samplerate: u32, attack_ms: f64, recovery_ms: f64, peak: f64) -> Self {
        let step = |ms: f64| 1.0 - (-1000.0 / (ms * f64::from(samplerate))).exp();
        Self {
            attack: step(attack_ms),
            recovery: step(recovery_ms),
            peak,
            env_compress: ENVELOPE_FLOOR,
            env_expand: ENVELOPE_FLOOR,
        }
    }

    fn follow(env: &mut f64, value: f64, attack: f64, recovery: f64) {
        let step = if value > *env { attack } else { recovery };
        *env += (value - *env) * step;
        if *env < ENVELOPE_FLOOR {
            *env = ENVELOPE_FLOOR;
        }
    }

    /// Compress the dynamic range 2:1 in place.
    pub fn compress(&mut self, samples: &mut [i16]) {
        for s in samples.iter_mut() {
            let value = f64::from(*s).abs() / self.peak;
            Self::follow(&mut self.env_compress, value, self.attack, self.recovery);
            let gain = 1.0 / self.env_compress.sqrt();
            let out = (f64::from(*s) * gain).clamp(-self.peak, self.peak);
            *s = out as i16;
        }
    }

    /// Expand the dynamic range 1:2 in place.
    pub fn expand(&mut self, samples: &mut [i16]) {
        for s in samples.iter_mut() {
            let value = f64::from(*s).abs() / self.peak;
            Self::follow(&mut self.env_expand, value, self.attack, self.recovery);
            let out = (f64::from(*s) * self.env_expand).clamp(-self.peak, self.peak);
            *s = out as i16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(amplitude: i16, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    fn level(samples: &[i16]) -> f64 {
        samples.iter().map(|&s| f64::from(s).abs()).sum::<f64>() / samples.len() as f64
    }

    #[test]
    fn test_compression_raises_quiet_signals() {
        let mut c = Compander::new(8000, 5.0, 22.5, 32767.0);
        let mut quiet = tone(1000, 4000);
        c.compress(&mut quiet);
        // After the envelope settles, a -30 dB signal sits near -15 dB.
        let settled = level(&quiet[2000..]);
        assert!(settled > 4000.0, "settled level {}", settled);
    }

    #[test]
    fn test_compress_then_expand_restores_level() {
        let mut c = Compander::new(8000, 5.0, 22.5, 32767.0);
        let mut signal = tone(8000, 8000);
        c.compress(&mut signal);
        c.expand(&mut signal);
        let restored = level(&signal[4000..]);
        assert!(
            (restored - 8000.0).abs() / 8000.0 < 0.25,
            "restored level {}",
            restored
        );
    }

    #[test]
    fn test_full_scale_not_exceeded() {
        let mut c = Compander::new(8000, 5.0, 22.5, 32767.0);
        let mut signal = tone(32767, 1000);
        c.compress(&mut signal);
        assert!(signal.iter().all(|&s| i32::from(s).abs() <= 32767));
    }
}

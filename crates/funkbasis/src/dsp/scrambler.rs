// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! Frequency-inverting voice scrambler.
//!
//! Mixes the audio band with a 3300 Hz carrier and low-pass filters the
//! result, turning speech at frequency f into 3300 - f. The treatment is
//! its own inverse: the same scrambler applied twice restores the audio.

/// Carrier frequency of the inversion (Hz).
const CARRIER_HZ: f64 = 3300.0;

/// One biquad low-pass section (RBJ cookbook, Q = 0.7071).
#[derive(Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    fn lowpass(samplerate: f64, cutoff: f64) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * cutoff / samplerate;
        let alpha = w0.sin() / (2.0 * std::f64::consts::FRAC_1_SQRT_2);
        let cos_w0 = w0.cos();
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn run(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// Voice scrambler state for one direction of one channel.
pub struct Scrambler {
    phase_step: f64,
    phase: f64,
    filter: [Biquad; 2],
}

impl Scrambler {
    /// Create a scrambler for the given audio sample rate.
    pub fn new(samplerate: f64) -> Self {
        let lp = Biquad::lowpass(samplerate, CARRIER_HZ - 300.0);
        Self {
            phase_step: 2.0 * std::f64::consts::PI * CARRIER_HZ / samplerate,
            phase: 0.0,
            filter: [lp, lp],
        }
    }

    /// Invert the spectrum of `samples` in place.
    pub fn process(&mut self, samples: &mut [i16]) {
        for s in samples.iter_mut() {
            // Mix with the carrier; doubling restores the original level
            // after the image is filtered away.
            let mixed = f64::from(*s) * self.phase.cos() * 2.0;
            self.phase += self.phase_step;
            if self.phase >= 2.0 * std::f64::consts::PI {
                self.phase -= 2.0 * std::f64::consts::PI;
            }
            let mut y = mixed;
            for f in self.filter.iter_mut() {
                y = f.run(y);
            }
            *s = y.clamp(-32767.0, 32767.0) as i16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(samplerate: f64, freq: f64, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                (8000.0 * (2.0 * std::f64::consts::PI * freq * i as f64 / samplerate).sin()) as i16
            })
            .collect()
    }

    /// Estimate the dominant frequency via zero crossings.
    fn dominant_freq(samples: &[i16], samplerate: f64) -> f64 {
        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] >= 0) != (w[1] >= 0))
            .count();
        crossings as f64 * samplerate / (2.0 * samples.len() as f64)
    }

    // The scrambler runs at the time-compressed voice rate
    // (radio samplerate / 1.1), far above the audio band.
    const SR: f64 = 48000.0 / 1.1;

    #[test]
    fn test_tone_inversion() {
        let mut samples = tone(SR, 1000.0, 48000);
        let mut scrambler = Scrambler::new(SR);
        scrambler.process(&mut samples);
        // 1000 Hz inverts to 3300 - 1000 = 2300 Hz
        let f = dominant_freq(&samples[4000..], SR);
        assert!((f - 2300.0).abs() < 150.0, "dominant frequency {}", f);
    }

    #[test]
    fn test_double_scramble_restores() {
        let mut samples = tone(SR, 800.0, 48000);
        let mut first = Scrambler::new(SR);
        let mut second = Scrambler::new(SR);
        first.process(&mut samples);
        second.process(&mut samples);
        let f = dominant_freq(&samples[4000..], SR);
        assert!((f - 800.0).abs() < 150.0, "dominant frequency {}", f);
    }
}

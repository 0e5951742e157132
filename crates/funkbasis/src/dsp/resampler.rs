// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! Sample-rate converter for the traffic-channel voice path.
//!
//! Distributed signalling interleaves 60-bit voice windows with 6 bits of
//! signalling, so 12.5 ms of audio must fit into 11.36 ms of air time:
//! voice is converted from the 8 kHz call-control rate to the
//! time-compressed rate `samplerate / 1.1` before insertion, and back on
//! receive. Linear interpolation; the fractional phase and the last input
//! sample persist across blocks so windows join without clicks.

/// Linear-interpolation rate converter.
pub struct Resampler {
    /// Input samples consumed per output sample.
    step: f64,
    /// Fractional position into the input stream.
    pos: f64,
    /// Last input sample of the previous block.
    last: i16,
}

impl Resampler {
    /// Create a converter from `in_rate` to `out_rate` (Hz).
    pub fn new(in_rate: f64, out_rate: f64) -> Self {
        Self {
            step: in_rate / out_rate,
            pos: 1.0,
            last: 0,
        }
    }

    /// Convert `input` and append the result to `out`.
    ///
    /// Returns the number of samples produced; for an upsampling converter
    /// this exceeds the input length by the rate ratio.
    pub fn process(&mut self, input: &[i16], out: &mut Vec<i16>) -> usize {
        let produced_before = out.len();

        // self.pos is relative to self.last at index 0, input[0] at 1.0
        while self.pos < input.len() as f64 + 1.0 {
            let before = if self.pos < 1.0 {
                self.last
            } else {
                input[self.pos as usize - 1]
            };
            let idx = self.pos as usize;
            let after = if idx < input.len() {
                input[idx]
            } else {
                *input.last().unwrap_or(&self.last)
            };
            let frac = self.pos.fract();
            let value = f64::from(before) + (f64::from(after) - f64::from(before)) * frac;
            out.push(value as i16);
            self.pos += self.step;
        }
        self.pos -= input.len() as f64;
        if let Some(&l) = input.last() {
            self.last = l;
        }

        out.len() - produced_before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsample_ratio() {
        // 8000 Hz to 8800 Hz: 100 samples in, 110 out
        let mut rs = Resampler::new(8000.0, 8800.0);
        let input = [100i16; 100];
        let mut out = Vec::new();
        let mut total = 0;
        for _ in 0..20 {
            out.clear();
            total += rs.process(&input, &mut out);
        }
        assert!((total as i64 - 2200).abs() <= 1, "total {}", total);
    }

    #[test]
    fn test_downsample_ratio() {
        let mut rs = Resampler::new(8800.0, 8000.0);
        let input = [0i16; 110];
        let mut out = Vec::new();
        let mut total = 0;
        for _ in 0..20 {
            out.clear();
            total += rs.process(&input, &mut out);
        }
        assert!((total as i64 - 2000).abs() <= 1, "total {}", total);
    }

    #[test]
    fn test_interpolation_is_monotonic_on_ramp() {
        let mut rs = Resampler::new(8000.0, 11000.0);
        let input: Vec<i16> = (0..100).map(|i| i * 100).collect();
        let mut out = Vec::new();
        rs.process(&input, &mut out);
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_state_persists_across_blocks() {
        // Feeding a constant in two halves must not glitch at the seam.
        let mut rs = Resampler::new(8000.0, 8800.0);
        let mut out = Vec::new();
        rs.process(&[5000i16; 50], &mut out);
        rs.process(&[5000i16; 50], &mut out);
        assert!(out[5..].iter().all(|&s| (i32::from(s) - 5000).abs() <= 1));
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! Pre-/de-emphasis filters for the FM voice path.
//!
//! First-order filters around the given cut-off frequency. Pre-emphasis is
//! applied by the channel code (not the common sender path) because it must
//! be skipped when the scrambler is active; the combination sounds bad.

/// Paired pre-/de-emphasis state for one channel.
pub struct Emphasis {
    factor: f64,
    pre_x1: f64,
    de_y1: f64,
    gain: f64,
}

impl Emphasis {
    /// Create emphasis filters for the given sample rate and cut-off (Hz).
    pub fn new(samplerate: f64, cutoff: f64) -> Self {
        let factor = (-2.0 * std::f64::consts::PI * cutoff / samplerate).exp();
        Self {
            factor,
            pre_x1: 0.0,
            de_y1: 0.0,
            // normalize the high-frequency gain of the pre-emphasis
            gain: 1.0 / (1.0 + factor),
        }
    }

    /// Apply pre-emphasis (high boost) in place.
    pub fn pre_emphasis(&mut self, samples: &mut [i16]) {
        for s in samples.iter_mut() {
            let x = f64::from(*s);
            let y = (x - self.factor * self.pre_x1) * self.gain * 2.0;
            self.pre_x1 = x;
            *s = y.clamp(-32767.0, 32767.0) as i16;
        }
    }

    /// Apply de-emphasis (high cut) in place.
    pub fn de_emphasis(&mut self, samples: &mut [i16]) {
        for s in samples.iter_mut() {
            let x = f64::from(*s);
            let y = x * (1.0 - self.factor) + self.factor * self.de_y1;
            self.de_y1 = y;
            *s = y.clamp(-32767.0, 32767.0) as i16;
        }
    }
}

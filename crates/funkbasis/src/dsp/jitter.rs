// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! Non-blocking jitter buffer for the traffic-channel audio path.
//!
//! Absorbs the delay between the call-control audio feed and the block
//! clock of the transmitter. Underflow emits silence, overflow drops the
//! oldest samples; the audio path never blocks and never errors.

use std::collections::VecDeque;

/// Jitter buffer of 16-bit PCM samples.
pub struct JitterBuffer {
    buf: VecDeque<i16>,
    capacity: usize,
}

impl JitterBuffer {
    /// Create a buffer holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Store received audio. If the buffer overflows, the oldest samples
    /// are dropped to keep latency bounded.
    pub fn save(&mut self, samples: &[i16]) {
        for &s in samples {
            if self.buf.len() == self.capacity {
                self.buf.pop_front();
            }
            self.buf.push_back(s);
        }
    }

    /// Load audio into `out`. Missing samples are zero-filled.
    pub fn load(&mut self, out: &mut [i16]) {
        for o in out.iter_mut() {
            *o = self.buf.pop_front().unwrap_or(0);
        }
    }

    /// Number of buffered samples.
    pub fn level(&self) -> usize {
        self.buf.len()
    }

    /// Drop all buffered audio.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underflow_fills_silence() {
        let mut jb = JitterBuffer::new(16);
        jb.save(&[1, 2, 3]);
        let mut out = [99i16; 5];
        jb.load(&mut out);
        assert_eq!(out, [1, 2, 3, 0, 0]);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut jb = JitterBuffer::new(4);
        jb.save(&[1, 2, 3, 4, 5, 6]);
        let mut out = [0i16; 4];
        jb.load(&mut out);
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn test_reset() {
        let mut jb = JitterBuffer::new(8);
        jb.save(&[7; 8]);
        jb.reset();
        assert_eq!(jb.level(), 0);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! Slot clock, scheduled mode switching and sync correction.
//!
//! The organisation channel runs a super-frame of 32 time slots, each with
//! a rufblock (R) and a meldeblock (M) sub-phase. In distributed
//! signalling the slot counter jumps by 8 per block so that the same
//! counter addresses the four sub-frames of a super-frame.
//!
//! Mode switches are never immediate: the transaction engine schedules the
//! next DSP mode with a countdown of sub-slots, and the scheduler applies
//! it on an R-phase block boundary. The two-block lookahead used for
//! traffic-channel allocation gives the handset time to retune.

use crate::config::{BLOCK_BITS, SLOT_BITS, SUPERFRAME_BITS, TIMESLOTS};
use crate::dsp::DspMode;

/// Sub-phase of an organisation-channel time slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubPhase {
    /// Rufblock (paging).
    R,
    /// Meldeblock (access).
    M,
}

/// The (time_slot, sub_phase) position within the super-frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotClock {
    /// Time slot 0..31.
    pub ts: u8,
    /// R/M sub-phase.
    pub sub: SubPhase,
}

impl SlotClock {
    /// Start at slot 0, rufblock.
    pub fn new() -> Self {
        Self {
            ts: 0,
            sub: SubPhase::R,
        }
    }

    /// Advance past one emitted block.
    ///
    /// In distributed mode each block spans a whole sub-frame, so the slot
    /// jumps by 8. Otherwise the sub-phase advances first and wraps into
    /// the next slot.
    pub fn advance(&mut self, distributed: bool) {
        if distributed {
            self.ts += 8;
        } else {
            match self.sub {
                SubPhase::R => {
                    self.sub = SubPhase::M;
                }
                SubPhase::M => {
                    self.sub = SubPhase::R;
                    self.ts += 1;
                }
            }
        }
        if self.ts == TIMESLOTS {
            self.ts = 0;
        }
        debug_assert!(self.ts < TIMESLOTS, "slot counter out of range");
    }
}

impl Default for SlotClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Live DSP mode plus the scheduled successor and its countdown.
#[derive(Debug)]
pub struct ModeScheduler {
    live: DspMode,
    scheduled: DspMode,
    countdown: u8,
}

impl ModeScheduler {
    /// Create a scheduler starting in the given mode.
    pub fn new(mode: DspMode) -> Self {
        Self {
            live: mode,
            scheduled: mode,
            countdown: 0,
        }
    }

    /// Current live mode.
    pub fn live(&self) -> DspMode {
        self.live
    }

    /// Schedule a switch `sub_slots` R-boundaries ahead (0 switches on the
    /// next boundary tick).
    pub fn schedule(&mut self, mode: DspMode, sub_slots: u8) {
        if sub_slots == 0 {
            self.live = mode;
            self.scheduled = mode;
            self.countdown = 0;
        } else {
            self.scheduled = mode;
            self.countdown = sub_slots;
        }
    }

    /// Clear any pending switch.
    pub fn cancel(&mut self) {
        self.scheduled = self.live;
        self.countdown = 0;
    }

    /// Tick on an R-phase block boundary. Returns the new mode when the
    /// countdown reaches zero and the switch takes effect.
    pub fn tick_r(&mut self) -> Option<DspMode> {
        if self.countdown == 0 {
            return None;
        }
        self.countdown -= 1;
        if self.countdown == 0 {
            self.live = self.scheduled;
            Some(self.live)
        } else {
            None
        }
    }

    /// Scheduler consistency check: live and scheduled mode may only
    /// differ during a controlled switch.
    pub fn assert_consistent(&self) {
        assert!(
            self.live == self.scheduled || self.countdown > 0,
            "scheduler mode inconsistency: live {:?} vs scheduled {:?} without countdown",
            self.live,
            self.scheduled
        );
    }
}

/// Single one-shot timer, armed against a channel's sample clock.
///
/// Timers are event sources serviced by the sample pump, never blocking
/// waits. Arming displaces any earlier arming; an owner holds at most one
/// pending expiry at any time.
#[derive(Debug, Default)]
pub struct Timer {
    deadline: Option<u64>,
}

impl Timer {
    /// Arm the timer to fire at the given sample time.
    pub fn start(&mut self, at: u64) {
        self.deadline = Some(at);
    }

    /// Disarm the timer.
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// True while armed.
    pub fn running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Fire once when the deadline has passed.
    pub fn expired(&mut self, now: u64) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// How hard to pull the receive clock toward the measured sync phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncPull {
    /// Offset within half a bit: pull halfway, residual error relaxes
    /// geometrically across blocks.
    Half(f64),
    /// Lock lost: pull the full offset at once.
    Full(f64),
}

impl SyncPull {
    /// The correction to apply to the RX bit clock.
    pub fn correction(self) -> f64 {
        match self {
            SyncPull::Half(offset) => offset / 2.0,
            SyncPull::Full(offset) => offset,
        }
    }
}

/// Fold the measured sync phase into a signed offset against the block
/// grid.
///
/// With a known absolute slot the offset is taken against that slot's
/// position in the super-frame; otherwise against the nearest block.
pub fn sync_offset(sync_phase: f64, known_slot: Option<u8>) -> f64 {
    match known_slot {
        Some(slot) => {
            let mut offset =
                (sync_phase - SLOT_BITS * f64::from(slot) + SUPERFRAME_BITS) % SUPERFRAME_BITS;
            if offset > SUPERFRAME_BITS / 2.0 {
                offset -= SUPERFRAME_BITS;
            }
            offset
        }
        None => {
            let block_bits = BLOCK_BITS as f64;
            let mut offset = sync_phase % block_bits;
            if offset > block_bits / 2.0 {
                offset -= block_bits;
            }
            offset
        }
    }
}

/// Decide between geometric pull-in and full correction.
///
/// Offsets beyond half a bit mean the lock is lost and the clock is pulled
/// to the full correction; exactly half a bit still relaxes geometrically.
pub fn sync_pull(offset: f64) -> SyncPull {
    if !(-0.5..=0.5).contains(&offset) {
        SyncPull::Full(offset)
    } else {
        SyncPull::Half(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_clock_advance() {
        let mut clock = SlotClock::new();
        clock.advance(false);
        assert_eq!((clock.ts, clock.sub), (0, SubPhase::M));
        clock.advance(false);
        assert_eq!((clock.ts, clock.sub), (1, SubPhase::R));
    }

    #[test]
    fn test_slot_clock_wraps() {
        let mut clock = SlotClock::new();
        for _ in 0..64 {
            clock.advance(false);
        }
        assert_eq!((clock.ts, clock.sub), (0, SubPhase::R));
    }

    #[test]
    fn test_distributed_jump_by_8_alternates_vhq_opcode() {
        // Entering distributed mode from a sub-frame boundary, ts & 8
        // alternates 0, 8, 0, 8 and selects VHQ1/VHQ2 per block.
        let mut clock = SlotClock {
            ts: 8,
            sub: SubPhase::R,
        };
        let mut pattern = Vec::new();
        for _ in 0..6 {
            pattern.push(clock.ts & 8);
            clock.advance(true);
        }
        assert_eq!(pattern, vec![8, 0, 8, 0, 8, 0]);
    }

    #[test]
    fn test_mode_scheduler_two_block_lookahead() {
        let mut sched = ModeScheduler::new(DspMode::Ogk);
        sched.schedule(DspMode::SpkK, 2);
        assert_eq!(sched.live(), DspMode::Ogk);
        assert_eq!(sched.tick_r(), None);
        assert_eq!(sched.live(), DspMode::Ogk);
        assert_eq!(sched.tick_r(), Some(DspMode::SpkK));
        assert_eq!(sched.live(), DspMode::SpkK);
        sched.assert_consistent();
    }

    #[test]
    fn test_mode_scheduler_immediate() {
        let mut sched = ModeScheduler::new(DspMode::SpkV);
        sched.schedule(DspMode::Ogk, 0);
        assert_eq!(sched.live(), DspMode::Ogk);
        assert_eq!(sched.tick_r(), None);
    }

    #[test]
    fn test_timer_one_shot() {
        let mut timer = Timer::default();
        assert!(!timer.expired(100));
        timer.start(50);
        assert!(timer.running());
        assert!(!timer.expired(49));
        assert!(timer.expired(50));
        // fires exactly once
        assert!(!timer.expired(51));
        assert!(!timer.running());
    }

    #[test]
    fn test_timer_rearm_displaces() {
        let mut timer = Timer::default();
        timer.start(50);
        timer.start(200);
        assert!(!timer.expired(100));
        assert!(timer.expired(200));
    }

    #[test]
    fn test_sync_offset_known_slot() {
        // A sync phase right on slot 3's position gives zero offset.
        let phase = SLOT_BITS * 3.0;
        assert!(sync_offset(phase, Some(3)).abs() < 1e-9);
        // Slightly late arrival gives a positive offset.
        assert!((sync_offset(phase + 0.3, Some(3)) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_sync_offset_folds_negative() {
        let phase = SLOT_BITS * 5.0 - 1.0;
        let offset = sync_offset(phase, Some(5));
        assert!((offset + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sync_offset_nearest_block() {
        let offset = sync_offset(197.0, None);
        assert!((offset + 1.0).abs() < 1e-9, "folds to -1, got {}", offset);
    }

    #[test]
    fn test_sync_pull_boundary() {
        // Exactly half a bit still pulls halfway...
        assert_eq!(sync_pull(0.5), SyncPull::Half(0.5));
        assert_eq!(sync_pull(-0.5), SyncPull::Half(-0.5));
        // ...anything beyond pulls fully.
        assert_eq!(sync_pull(0.500001), SyncPull::Full(0.500001));
        assert_eq!(sync_pull(-0.500001), SyncPull::Full(-0.500001));
    }

    #[test]
    fn test_geometric_pull_in() {
        // A constant +0.3 bit error halves with every correction.
        let mut residual: f64 = 0.3;
        let mut corrections = Vec::new();
        for _ in 0..4 {
            let pull = sync_pull(residual);
            let c = pull.correction();
            corrections.push(c);
            residual -= c;
        }
        assert!((corrections[0] - 0.15).abs() < 1e-9);
        assert!((corrections[1] - 0.075).abs() < 1e-9);
        assert!((corrections[2] - 0.0375).abs() < 1e-9);
    }
}

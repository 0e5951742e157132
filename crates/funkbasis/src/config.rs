// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! Protocol constants - single source of truth.
//!
//! Every timing, geometry and repeat-count constant of the three air
//! interfaces lives here. **Never hardcode these elsewhere!**

// =======================================================================
// C-Netz radio geometry
// =======================================================================

/// On-air bit rate of the C-Netz FSK channel (bit/s).
pub const CNETZ_BITRATE: f64 = 5280.0;

/// Bits of one R or M block including the 7-bit pause at each end.
pub const BLOCK_BITS: usize = 198;

/// Data bits of one block (without the leading/trailing pause).
pub const BLOCK_DATA_BITS: usize = 184;

/// Bits of one organisation-channel time slot (rufblock + meldeblock).
pub const SLOT_BITS: f64 = 2.0 * BLOCK_BITS as f64;

/// Number of time slots in one super-frame.
pub const TIMESLOTS: u8 = 32;

/// Bits of one super-frame (32 slots x R/M).
pub const SUPERFRAME_BITS: f64 = SLOT_BITS * TIMESLOTS as f64;

/// Duration of one block in seconds (198 bits at 5280 bit/s).
pub const BLOCK_SECONDS: f64 = BLOCK_BITS as f64 / CNETZ_BITRATE;

/// Duration of one time slot in seconds.
pub const SLOT_SECONDS: f64 = 2.0 * BLOCK_SECONDS;

/// Duration of one distributed frame (16 blocks interleaved with voice).
pub const DIST_FRAME_SECONDS: f64 = 16.0 * BLOCK_SECONDS;

/// The organisation channel number. Fixed by the network; speech on this
/// channel is rejected by some phones.
pub const OGK_KANAL: u16 = 131;

// =======================================================================
// C-Netz timer frame counts and repeat bounds
//
// Timers on the speech channel are expressed in frames of one block
// (37.5 ms); see the transaction engine for the slot offsets added on top.
// =======================================================================

/// Frames to wait for `BEL` after channel allocation acknowledge.
pub const F_BQ: u32 = 8;

/// Frames to wait for `VH` while holding in concentrated signalling.
pub const F_VHQK: u32 = 16;

/// Frames to wait for `VH` while holding in distributed signalling.
pub const F_VHQ: u32 = 16;

/// Frames to wait for `DSQ` after through-connect.
pub const F_DS: u32 = 16;

/// Frames to wait for `RTAQ` after ringing order.
pub const F_RTA: u32 = 16;

/// Times the dialing prompt is repeated before rejecting the call.
pub const MAX_WAF_TRIES: u32 = 3;

/// Seconds to wait for dial digits after `WAF` (two slot cycles).
pub const T_WAF: f64 = 4.0;

/// `AF` repeats when releasing on the concentrated speech channel.
pub const N_AFKT: u32 = 6;

/// `AF` repeats when releasing on the distributed speech channel.
pub const N_AFV: u32 = 4;

/// Minimum `BQ` emissions before moving on to `VHQ`.
pub const N_BQ: u32 = 8;

// =======================================================================
// POCSAG
// =======================================================================

/// Number of preamble codewords before the first batch.
pub const POCSAG_PREAMBLE_COUNT: u8 = 18;

/// Preamble bit pattern (alternating ones and zeroes).
pub const POCSAG_CODEWORD_PREAMBLE: u32 = 0xAAAAAAAA;

/// Synchronisation codeword delimiting each batch.
pub const POCSAG_CODEWORD_SYNC: u32 = 0x7CD215D8;

/// Idle codeword filling unused batch positions.
pub const POCSAG_CODEWORD_IDLE: u32 = 0x7A89C197;

/// Codewords per batch (8 slots of 2), excluding the sync word.
pub const POCSAG_BATCH_WORDS: u8 = 16;

/// Idle batches transmitted before the carrier is turned off.
pub const POCSAG_IDLE_BATCHES: u8 = 2;

// =======================================================================
// Radiocom 2000 timer table (seconds)
// =======================================================================

/// How many times paging is tried.
pub const R2000_PAGE_TRIES: u32 = 3;

/// Time to wait for identity response.
pub const R2000_IDENT_TIME: f64 = 3.0;

/// Time to wait for party to answer.
pub const R2000_ALERT_TIME: f64 = 60.0;

/// Time to wait for party to dial digits 1..10.
pub const R2000_DIAL1_TIME: f64 = 1.0;

/// Time to wait for party to dial digits 11..20.
pub const R2000_DIAL2_TIME: f64 = 0.5;

/// Time to wait for suspend response.
pub const R2000_SUSPEND_TIME: f64 = 1.0;

/// Time to release if the initial supervisory signal never arrives.
pub const R2000_SUPER_TIME1: f64 = 4.0;

/// Time to release after losing the supervisory signal.
pub const R2000_SUPER_TIME2: f64 = 20.0;

/// Time to wait for release response.
pub const R2000_RELEASE_TIME: f64 = 2.0;

/// Channel spacing of all Radiocom 2000 bands (MHz).
pub const R2000_CHANNEL_SPACING: f64 = 0.0125;

/// On-air bit rate of the Radiocom 2000 signalling channel (bit/s).
pub const R2000_BITRATE: f64 = 1200.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superframe_geometry() {
        // 32 slots x 2 blocks x 198 bits at 5280 bit/s = 2.4 s super-frame
        assert_eq!(SUPERFRAME_BITS, 12672.0);
        let superframe_seconds = SUPERFRAME_BITS / CNETZ_BITRATE;
        assert!((superframe_seconds - 2.4).abs() < 1e-9);
    }

    #[test]
    fn test_block_timing() {
        assert!((BLOCK_SECONDS - 0.0375).abs() < 1e-9);
        assert!((SLOT_SECONDS - 0.075).abs() < 1e-9);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! # funkbasis - analogue base station protocol core
//!
//! A software base station for legacy analogue/FSK cellular and paging
//! networks (C-Netz, Radiocom 2000, POCSAG), speaking the original
//! over-the-air protocols to real, unmodified handsets through an SDR.
//! This crate is the protocol core: per-channel transceiver state
//! machines, the transaction lifecycle, the bit-exact frame codecs, the
//! traffic-channel audio pipeline and the clock/slot synchroniser.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use funkbasis::call::{event_channel, CallEvent};
//! use funkbasis::cnetz::{CnetzBts, CnetzConfig, SysInfo};
//!
//! fn main() -> funkbasis::Result<()> {
//!     let (sink, events) = event_channel();
//!     let mut bts = CnetzBts::new(sink);
//!     bts.add_channel(CnetzConfig::default(), SysInfo::default())?;
//!
//!     // drive the channel from the SDR sample pump ...
//!     let mut tx = vec![0i16; 4096];
//!     bts.channel_mut(131).unwrap().fill_tx_samples(&mut tx);
//!
//!     // ... and consume upward call-control events
//!     while let Ok(event) = events.try_recv() {
//!         if let CallEvent::Setup { callref, dialed, .. } = event {
//!             println!("call {} to {}", callref, dialed);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                     Call-Control Facade (call)                     |
//! |      setup / answer / disconnect / release / audio, CallRef        |
//! +--------------------------------------------------------------------+
//! |                 Transaction Engines (cnetz, r2000, pocsag)         |
//! |   attach, call setup, supervision, release | timers, retries       |
//! +--------------------------------------------------------------------+
//! |               Scheduler & Slot Clock (sched)                       |
//! |   32 x R/M super-frame | mode switch countdown | sync pull-in      |
//! +--------------------------------------------------------------------+
//! |                      Frame Codecs (protocol)                       |
//! |   telegrams + BCH | POCSAG codewords | R2000 frames                |
//! +--------------------------------------------------------------------+
//! |                       DSP Front-End (dsp)                          |
//! |   FSK bit clock + ramps | compander | scrambler | jitter buffer    |
//! +--------------------------------------------------------------------+
//! ```
//!
//! The SDR driver, the FM modem primitives, the CLI and the external
//! call-control transport stay outside; they are consumed through the
//! [`sender::Sender`] pump callbacks and the [`call::Upstream`] trait.
//!
//! The whole protocol core is single-threaded and cooperative: every
//! operation runs to completion between sample callbacks, timers are
//! event sources serviced by the pump, and no locks are needed inside the
//! core.

/// Call-control facade types (causes, call references, upward events).
pub mod call;
/// C-Netz channel transceiver and transaction engine.
pub mod cnetz;
/// Protocol constants - single source of truth.
pub mod config;
/// DSP front-end (FSK, compander, scrambler, jitter, resampler).
pub mod dsp;
/// Compile-time configurable logging system (zero-cost when disabled).
pub mod logging;
/// POCSAG paging channel.
pub mod pocsag;
/// Wire codecs for all supported air interfaces.
pub mod protocol;
/// Radiocom 2000 channel engine.
pub mod r2000;
/// Slot clock, mode scheduling and sync correction.
pub mod sched;
/// Sender registry and sample-pump surface.
pub mod sender;

pub use call::{CallEvent, CallRef, Cause};
pub use cnetz::{Cnetz, CnetzBts, CnetzConfig};
pub use pocsag::{Pocsag, PocsagConfig};
pub use r2000::R2000Bts;
pub use sender::{Sender, SenderRegistry};

/// funkbasis version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors returned by channel creation and configuration.
///
/// Protocol errors (bad CRC, unexpected opcodes, identity mismatches) are
/// never surfaced here: they are logged at notice level and dropped, as
/// the air interface requires. This enum covers the conditions that make
/// a channel refuse to start.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Channel number outside the system's channel plan.
    InvalidChannel(u16),
    /// Band number not in the band table.
    InvalidBand(u8),
    /// Clock-speed correction outside +-1000 ppm.
    InvalidClockSpeed(f64),
    /// Channel number registered twice.
    DuplicateChannel(u16),
    /// A second control channel was configured.
    DuplicateControlChannel,
    /// Other invalid configuration.
    Config(String),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// I/O error with underlying cause.
    IoError(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidChannel(kanal) => write!(f, "Invalid channel number: {}", kanal),
            Error::InvalidBand(band) => write!(f, "Invalid band number: {}", band),
            Error::InvalidClockSpeed(ppm) => write!(
                f,
                "Clock speed {:.1} ppm out of range, use +-1000 ppm",
                ppm
            ),
            Error::DuplicateChannel(kanal) => {
                write!(f, "Channel number {} registered twice", kanal)
            }
            Error::DuplicateControlChannel => {
                write!(f, "More than one control channel is not supported")
            }
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", Error::InvalidChannel(999)),
            "Invalid channel number: 999"
        );
        assert_eq!(
            format!("{}", Error::DuplicateChannel(131)),
            "Channel number 131 registered twice"
        );
        let e = Error::InvalidClockSpeed(1500.0);
        assert!(format!("{}", e).contains("1500.0"));
    }

    #[test]
    fn test_version_present() {
        assert!(!VERSION.is_empty());
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! Call-control facade types.
//!
//! The telephony layer talks to a channel engine through five downward
//! verbs (setup, answer, disconnect, release, audio) implemented on the
//! per-system engines, and receives five upward verbs through the
//! [`Upstream`] trait. The provided [`EventSink`] implementation queues
//! [`CallEvent`]s on a crossbeam channel; any transport that preserves
//! ordering within a call reference works.

use crossbeam::channel::{unbounded, Receiver, Sender, TrySendError};

/// Release and rejection causes exchanged with the telephony layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// Normal call clearing.
    Normal,
    /// Called party busy.
    Busy,
    /// No answer from called party.
    NoAnswer,
    /// Subscriber out of order (lost, powered off).
    OutOfOrder,
    /// Dialed number invalid.
    InvalNumber,
    /// No radio channel available.
    NoChannel,
    /// Temporary failure (radio link lost).
    TempFail,
    /// Unknown call reference.
    InvalCallref,
}

impl Cause {
    /// Human-readable cause name.
    pub fn name(self) -> &'static str {
        match self {
            Cause::Normal => "normal",
            Cause::Busy => "busy",
            Cause::NoAnswer => "no answer",
            Cause::OutOfOrder => "out of order",
            Cause::InvalNumber => "invalid number",
            Cause::NoChannel => "no channel",
            Cause::TempFail => "temporary failure",
            Cause::InvalCallref => "invalid call reference",
        }
    }
}

impl std::fmt::Display for Cause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which side created a call reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallOrigin {
    /// Created for a call from the mobile station toward the network.
    Mobile,
    /// Created by the network toward the mobile station.
    Network,
}

/// Opaque call reference.
///
/// A generator-owned (origin, serial) pair; the raw counter is never
/// exposed as API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallRef {
    origin: CallOrigin,
    seq: u32,
}

impl CallRef {
    /// Which side created this reference.
    pub fn origin(self) -> CallOrigin {
        self.origin
    }
}

impl std::fmt::Display for CallRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.origin {
            CallOrigin::Mobile => 'M',
            CallOrigin::Network => 'N',
        };
        write!(f, "{}-{}", tag, self.seq)
    }
}

/// Call-reference generator, one per engine.
#[derive(Debug, Default)]
pub struct CallRefGen {
    next: u32,
}

impl CallRefGen {
    /// Create a generator starting at serial 1.
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Produce a fresh reference.
    pub fn next(&mut self, origin: CallOrigin) -> CallRef {
        self.next += 1;
        CallRef {
            origin,
            seq: self.next,
        }
    }
}

/// Shared call-reference generator handed to every channel of an engine.
///
/// The mutex is uncontended (the core is single-threaded); it only makes
/// the handle cloneable.
#[derive(Clone, Default)]
pub struct SharedCallRefGen {
    inner: std::sync::Arc<parking_lot::Mutex<CallRefGen>>,
}

impl SharedCallRefGen {
    /// Create a fresh generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce a fresh reference.
    pub fn next(&self, origin: CallOrigin) -> CallRef {
        self.inner.lock().next(origin)
    }
}

/// Upward verbs emitted by a channel engine toward the telephony layer.
pub trait Upstream {
    /// A mobile-originated call completed dialing. Err rejects the call
    /// with the given cause and the engine releases over the air.
    fn setup(&mut self, callref: CallRef, caller: &str, dialed: &str) -> Result<(), Cause>;

    /// The air interface reached ring state.
    fn alerting(&mut self, callref: CallRef);

    /// The mobile station answered.
    fn answer(&mut self, callref: CallRef, connected: &str);

    /// Fatal timeout or uplink release.
    fn release(&mut self, callref: CallRef, cause: Cause);

    /// Received voice, 20 ms of 8 kHz PCM.
    fn audio(&mut self, callref: CallRef, pcm: &[i16]);
}

/// Upward verb, queued form.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Setup {
        callref: CallRef,
        caller: String,
        dialed: String,
    },
    Alerting {
        callref: CallRef,
    },
    Answer {
        callref: CallRef,
        connected: String,
    },
    Release {
        callref: CallRef,
        cause: Cause,
    },
    Audio {
        callref: CallRef,
        pcm: Vec<i16>,
    },
}

/// Queueing [`Upstream`] implementation over a crossbeam channel.
///
/// Clones share the same queue, so every channel of an engine can hold its
/// own handle. Events keep their order per call reference because each
/// engine runs single-threaded on the sample pump.
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<CallEvent>,
}

/// Create an event queue: the sink goes to the engine, the receiver to the
/// telephony layer.
pub fn event_channel() -> (EventSink, Receiver<CallEvent>) {
    let (tx, rx) = unbounded();
    (EventSink { tx }, rx)
}

impl Upstream for EventSink {
    fn setup(&mut self, callref: CallRef, caller: &str, dialed: &str) -> Result<(), Cause> {
        match self.tx.try_send(CallEvent::Setup {
            callref,
            caller: caller.to_string(),
            dialed: dialed.to_string(),
        }) {
            Ok(()) => Ok(()),
            // The consumer is gone; reject so the engine releases cleanly.
            Err(TrySendError::Disconnected(_)) | Err(TrySendError::Full(_)) => {
                Err(Cause::TempFail)
            }
        }
    }

    fn alerting(&mut self, callref: CallRef) {
        let _ = self.tx.try_send(CallEvent::Alerting { callref });
    }

    fn answer(&mut self, callref: CallRef, connected: &str) {
        let _ = self.tx.try_send(CallEvent::Answer {
            callref,
            connected: connected.to_string(),
        });
    }

    fn release(&mut self, callref: CallRef, cause: Cause) {
        let _ = self.tx.try_send(CallEvent::Release { callref, cause });
    }

    fn audio(&mut self, callref: CallRef, pcm: &[i16]) {
        let _ = self.tx.try_send(CallEvent::Audio {
            callref,
            pcm: pcm.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callref_generator() {
        let mut gen = CallRefGen::new();
        let a = gen.next(CallOrigin::Mobile);
        let b = gen.next(CallOrigin::Network);
        assert_ne!(a, b);
        assert_eq!(a.origin(), CallOrigin::Mobile);
        assert_eq!(format!("{}", a), "M-1");
        assert_eq!(format!("{}", b), "N-2");
    }

    #[test]
    fn test_event_sink_roundtrip() {
        let (mut sink, rx) = event_channel();
        let mut gen = CallRefGen::new();
        let callref = gen.next(CallOrigin::Mobile);

        assert!(sink.setup(callref, "2222002", "0301234567").is_ok());
        sink.alerting(callref);
        sink.answer(callref, "2222002");
        sink.release(callref, Cause::Normal);

        assert!(matches!(rx.recv().expect("event"), CallEvent::Setup { .. }));
        assert!(matches!(
            rx.recv().expect("event"),
            CallEvent::Alerting { .. }
        ));
        assert!(matches!(rx.recv().expect("event"), CallEvent::Answer { .. }));
        assert_eq!(
            rx.recv().expect("event"),
            CallEvent::Release {
                callref,
                cause: Cause::Normal
            }
        );
    }

    #[test]
    fn test_setup_rejected_when_consumer_gone() {
        let (mut sink, rx) = event_channel();
        drop(rx);
        let mut gen = CallRefGen::new();
        let callref = gen.next(CallOrigin::Mobile);
        assert_eq!(
            sink.setup(callref, "a", "b"),
            Err(Cause::TempFail),
            "setup toward a dead consumer must reject"
        );
    }
}

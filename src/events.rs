//! Engine event stream.
//!
//! Observers (a control surface, the CLI logger, tests) subscribe to a
//! bounded channel instead of registering callbacks into the core. Emission
//! is non-blocking: when no one drains the channel fast enough, events are
//! dropped and counted rather than stalling the frame loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::repeater::Phase;

/// Everything the core reports outward.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    VoxChanged { active: bool },
    PttChanged { keyed: bool },
    PhaseChanged { from: Phase, to: Phase },
    DtmfDigit { digit: char },
    CommandAccepted { code: String, action: String },
    CommandUnknown { code: String },
    AnnouncementQueued { text: String },
    AnnouncementStarted,
    AnnouncementFinished,
    SynthesisFailed { text: String, reason: String },
    TransmitTimeout { limit_secs: f32 },
    RecordingStopped { samples: usize },
    RelayError { reason: String },
}

/// Sending half of the event stream. Cloneable across contexts; every clone
/// shares the drop counter.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: Sender<EngineEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    /// Build a bus and the receiver observers drain.
    pub fn new(capacity: usize) -> (Self, Receiver<EngineEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Non-blocking emit. A full or disconnected channel drops the event.
    pub fn emit(&self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(?event, total, "event channel full, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let (bus, rx) = EventBus::new(8);
        bus.emit(EngineEvent::VoxChanged { active: true });
        bus.emit(EngineEvent::PttChanged { keyed: true });
        assert_eq!(rx.recv().unwrap(), EngineEvent::VoxChanged { active: true });
        assert_eq!(rx.recv().unwrap(), EngineEvent::PttChanged { keyed: true });
    }

    #[test]
    fn full_channel_drops_and_counts() {
        let (bus, rx) = EventBus::new(1);
        bus.emit(EngineEvent::AnnouncementStarted);
        bus.emit(EngineEvent::AnnouncementFinished);
        assert_eq!(bus.dropped_events(), 1);
        assert_eq!(rx.recv().unwrap(), EngineEvent::AnnouncementStarted);
    }

    #[test]
    fn disconnected_receiver_is_harmless() {
        let (bus, rx) = EventBus::new(4);
        drop(rx);
        bus.emit(EngineEvent::AnnouncementStarted);
        assert_eq!(bus.dropped_events(), 0);
    }
}

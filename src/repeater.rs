//! Repeater transmission state machine and station-ID scheduling.
//!
//! One phase holds at a time and only the per-frame tick mutates it. The
//! normal life of a transmission is `Idle → Receiving → CourtesyTone →
//! TailSilence → Holdoff → Idle`; announcements preempt `Idle`/`Holdoff`
//! and finish through the same tail sequence.
//!
//! A carrier held past the configured timeout is reported once and forced
//! into the courtesy-tone teardown. An indefinitely keyed repeater is worse
//! than a clipped transmission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::audio::tone::sine_tone;
use crate::audio::{silence_frame, Frame, PlaybackCursor};
use crate::commands::AnnouncementTexts;
use crate::events::{EngineEvent, EventBus};
use crate::pipeline::ControlRequest;

/// Cadence of the auto-ID eligibility check.
const ID_TICK: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Receiving,
    Announcing,
    CourtesyTone,
    TailSilence,
    Holdoff,
}

#[derive(Debug, Clone)]
pub struct RepeaterConfig {
    pub sample_rate: u32,
    pub chunk: usize,
    pub courtesy_enabled: bool,
    pub courtesy_freq: f32,
    pub courtesy_duration_secs: f32,
    pub courtesy_volume: f32,
    pub tail_silence_secs: f32,
    pub feedback_protection: bool,
    pub holdoff_secs: f32,
    pub grace_secs: f32,
    pub timeout_secs: f32,
}

impl RepeaterConfig {
    fn frames(&self, secs: f32) -> usize {
        ((secs * self.sample_rate as f32 / self.chunk as f32).round() as usize).max(1)
    }
}

pub struct RepeaterMachine {
    cfg: RepeaterConfig,
    phase: Phase,
    cursor: Option<PlaybackCursor>,
    frames_left: usize,
    receive_frames: u64,
    grace_frames_left: usize,
    events: EventBus,
}

impl RepeaterMachine {
    pub fn new(cfg: RepeaterConfig, events: EventBus) -> Self {
        Self {
            cfg,
            phase: Phase::Idle,
            cursor: None,
            frames_left: 0,
            receive_frames: 0,
            grace_frames_left: 0,
            events,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// PTT policy: keyed in every phase that puts audio (or deliberate
    /// silence) on the air, never in `Holdoff` or `Idle`.
    pub fn is_keyed(&self) -> bool {
        matches!(
            self.phase,
            Phase::Receiving | Phase::Announcing | Phase::CourtesyTone | Phase::TailSilence
        )
    }

    /// VOX must not run while the system is busy with its own output, nor
    /// during the post-holdoff grace window. It stays live in `Receiving`,
    /// where it decides when the carrier has dropped.
    pub fn vox_suppressed(&self) -> bool {
        match self.phase {
            Phase::Idle => self.grace_frames_left > 0,
            Phase::Receiving => false,
            _ => true,
        }
    }

    /// Announcements start only from a quiet channel.
    pub fn can_start_announcement(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Holdoff)
    }

    /// Put a ready clip on the air. The caller checks
    /// [`can_start_announcement`](Self::can_start_announcement) first.
    pub fn start_announcement(&mut self, clip: Vec<i16>) {
        self.cursor = Some(PlaybackCursor::new(clip));
        self.frames_left = 0;
        self.set_phase(Phase::Announcing);
        self.events.emit(EngineEvent::AnnouncementStarted);
    }

    /// Advance one frame. `vox_active` is the post-suppression VOX decision;
    /// `input` is repeated live while receiving.
    pub fn tick(&mut self, vox_active: bool, input: &[i16]) -> Frame {
        let chunk = input.len();
        match self.phase {
            Phase::Idle => {
                self.grace_frames_left = self.grace_frames_left.saturating_sub(1);
                if vox_active {
                    self.receive_frames = 0;
                    self.set_phase(Phase::Receiving);
                    input.to_vec()
                } else {
                    silence_frame(chunk)
                }
            }
            Phase::Receiving => {
                if !vox_active {
                    return self.begin_teardown(chunk);
                }
                self.receive_frames += 1;
                let on_air = self.receive_frames as f64 * chunk as f64
                    / self.cfg.sample_rate as f64;
                if on_air >= self.cfg.timeout_secs as f64 {
                    tracing::warn!(limit = self.cfg.timeout_secs, "transmission timeout");
                    self.events.emit(EngineEvent::TransmitTimeout {
                        limit_secs: self.cfg.timeout_secs,
                    });
                    return self.begin_teardown(chunk);
                }
                input.to_vec()
            }
            Phase::Announcing => match self.next_cursor_frame(chunk) {
                Some(frame) => frame,
                None => {
                    self.events.emit(EngineEvent::AnnouncementFinished);
                    self.begin_teardown(chunk)
                }
            },
            Phase::CourtesyTone => match self.next_cursor_frame(chunk) {
                Some(frame) => frame,
                None => self.enter_tail(chunk),
            },
            Phase::TailSilence => {
                self.frames_left = self.frames_left.saturating_sub(1);
                if self.frames_left == 0 {
                    if self.cfg.feedback_protection {
                        self.frames_left = self.cfg.frames(self.cfg.holdoff_secs);
                        self.set_phase(Phase::Holdoff);
                    } else {
                        self.enter_idle();
                    }
                }
                silence_frame(chunk)
            }
            Phase::Holdoff => {
                self.frames_left = self.frames_left.saturating_sub(1);
                if self.frames_left == 0 {
                    self.enter_idle();
                }
                silence_frame(chunk)
            }
        }
    }

    pub fn reset(&mut self) {
        self.cursor = None;
        self.frames_left = 0;
        self.receive_frames = 0;
        self.grace_frames_left = 0;
        if self.phase != Phase::Idle {
            self.set_phase(Phase::Idle);
        }
    }

    fn begin_teardown(&mut self, chunk: usize) -> Frame {
        if self.cfg.courtesy_enabled {
            let tone = sine_tone(
                self.cfg.sample_rate,
                self.cfg.courtesy_freq,
                self.cfg.courtesy_duration_secs,
                self.cfg.courtesy_volume,
            );
            let mut cursor = PlaybackCursor::new(tone);
            let frame = cursor
                .next_frame(chunk)
                .unwrap_or_else(|| silence_frame(chunk));
            self.cursor = Some(cursor);
            self.set_phase(Phase::CourtesyTone);
            frame
        } else {
            self.enter_tail(chunk)
        }
    }

    fn enter_tail(&mut self, chunk: usize) -> Frame {
        self.cursor = None;
        self.frames_left = self.cfg.frames(self.cfg.tail_silence_secs);
        self.set_phase(Phase::TailSilence);
        // This call already emits the first tail frame.
        self.frames_left = self.frames_left.saturating_sub(1);
        if self.frames_left == 0 {
            if self.cfg.feedback_protection {
                self.frames_left = self.cfg.frames(self.cfg.holdoff_secs);
                self.set_phase(Phase::Holdoff);
            } else {
                self.enter_idle();
            }
        }
        silence_frame(chunk)
    }

    fn enter_idle(&mut self) {
        self.grace_frames_left = self.cfg.frames(self.cfg.grace_secs);
        self.set_phase(Phase::Idle);
    }

    fn next_cursor_frame(&mut self, chunk: usize) -> Option<Frame> {
        let frame = self.cursor.as_mut().and_then(|c| c.next_frame(chunk));
        if frame.is_none() {
            self.cursor = None;
        }
        frame
    }

    fn set_phase(&mut self, next: Phase) {
        if self.phase == next {
            return;
        }
        tracing::info!(from = ?self.phase, to = ?next, "phase change");
        self.events.emit(EngineEvent::PhaseChanged {
            from: self.phase,
            to: next,
        });
        self.phase = next;
    }
}

/// Interval bookkeeping for periodic station identification.
#[derive(Debug)]
pub struct IdScheduler {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl IdScheduler {
    pub fn new(interval_secs: f32) -> Self {
        Self {
            interval: Duration::from_secs_f32(interval_secs.max(1.0)),
            last_sent: None,
        }
    }

    /// Due immediately on a fresh scheduler, then once per interval.
    pub fn due(&self, now: Instant) -> bool {
        match self.last_sent {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        }
    }

    pub fn mark_sent(&mut self, now: Instant) {
        self.last_sent = Some(now);
    }
}

/// Handle to the auto-ID ticker thread. Stopping (or dropping) it cancels
/// the ticker.
pub struct IdTicker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl IdTicker {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IdTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Low-frequency ticker that enqueues a station-ID announcement whenever the
/// interval has elapsed and the channel is quiet. The ID request crosses
/// into the pipeline as a control message; nothing here touches pipeline
/// state directly.
pub fn spawn_id_ticker(
    interval_secs: f32,
    texts: AnnouncementTexts,
    vox_mirror: Arc<AtomicBool>,
    control_tx: Sender<ControlRequest>,
) -> IdTicker {
    let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = bounded(1);
    let handle = thread::Builder::new()
        .name("auto-id".into())
        .spawn(move || {
            let mut scheduler = IdScheduler::new(interval_secs);
            loop {
                match stop_rx.recv_timeout(ID_TICK) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                let now = Instant::now();
                if scheduler.due(now) && !vox_mirror.load(Ordering::Relaxed) {
                    let text = texts.station_id();
                    if control_tx.send(ControlRequest::Announce(text)).is_err() {
                        break;
                    }
                    scheduler.mark_sent(now);
                }
            }
            tracing::debug!("auto-id ticker stopped");
        })
        .expect("spawn auto-id ticker");
    IdTicker {
        stop_tx: Some(stop_tx),
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8_000;
    const CHUNK: usize = 80;

    fn config() -> RepeaterConfig {
        RepeaterConfig {
            sample_rate: RATE,
            chunk: CHUNK,
            courtesy_enabled: true,
            courtesy_freq: 1_000.0,
            courtesy_duration_secs: 0.05,
            courtesy_volume: 0.5,
            tail_silence_secs: 0.05,
            feedback_protection: true,
            holdoff_secs: 0.05,
            grace_secs: 0.03,
            timeout_secs: 180.0,
        }
    }

    fn machine(cfg: RepeaterConfig) -> RepeaterMachine {
        RepeaterMachine::new(cfg, EventBus::new(64).0)
    }

    fn loud() -> Vec<i16> {
        vec![4_000i16; CHUNK]
    }

    #[test]
    fn full_traversal_visits_every_phase_once() {
        let mut rpt = machine(config());
        let mut phases = vec![rpt.phase()];
        rpt.tick(true, &loud());
        phases.push(rpt.phase());
        rpt.tick(true, &loud());
        for _ in 0..40 {
            rpt.tick(false, &loud());
            if *phases.last().unwrap() != rpt.phase() {
                phases.push(rpt.phase());
            }
            if rpt.phase() == Phase::Idle {
                break;
            }
        }
        assert_eq!(
            phases,
            vec![
                Phase::Idle,
                Phase::Receiving,
                Phase::CourtesyTone,
                Phase::TailSilence,
                Phase::Holdoff,
                Phase::Idle,
            ]
        );
    }

    #[test]
    fn receiving_repeats_input_live() {
        let mut rpt = machine(config());
        let out = rpt.tick(true, &loud());
        assert_eq!(out, loud());
    }

    #[test]
    fn courtesy_disabled_skips_straight_to_tail() {
        let mut cfg = config();
        cfg.courtesy_enabled = false;
        let mut rpt = machine(cfg);
        rpt.tick(true, &loud());
        rpt.tick(false, &loud());
        assert_eq!(rpt.phase(), Phase::TailSilence);
    }

    #[test]
    fn feedback_protection_off_skips_holdoff() {
        let mut cfg = config();
        cfg.feedback_protection = false;
        let mut rpt = machine(cfg);
        rpt.tick(true, &loud());
        let mut saw_holdoff = false;
        for _ in 0..40 {
            rpt.tick(false, &loud());
            saw_holdoff |= rpt.phase() == Phase::Holdoff;
            if rpt.phase() == Phase::Idle {
                break;
            }
        }
        assert!(!saw_holdoff);
        assert_eq!(rpt.phase(), Phase::Idle);
    }

    #[test]
    fn keyed_exactly_in_on_air_phases() {
        let mut rpt = machine(config());
        assert!(!rpt.is_keyed());
        rpt.tick(true, &loud());
        for _ in 0..60 {
            let keyed = rpt.is_keyed();
            match rpt.phase() {
                Phase::Receiving
                | Phase::Announcing
                | Phase::CourtesyTone
                | Phase::TailSilence => assert!(keyed),
                Phase::Idle | Phase::Holdoff => assert!(!keyed),
            }
            rpt.tick(false, &loud());
        }
    }

    #[test]
    fn timeout_reports_once_and_forces_teardown() {
        let mut cfg = config();
        cfg.timeout_secs = 0.1;
        let (bus, rx) = EventBus::new(64);
        let mut rpt = RepeaterMachine::new(cfg, bus);
        for _ in 0..30 {
            rpt.tick(true, &loud());
            if rpt.phase() != Phase::Receiving && rpt.phase() != Phase::Idle {
                break;
            }
        }
        assert_eq!(rpt.phase(), Phase::CourtesyTone);
        let timeouts = rx
            .try_iter()
            .filter(|e| matches!(e, EngineEvent::TransmitTimeout { .. }))
            .count();
        assert_eq!(timeouts, 1);
    }

    #[test]
    fn announcement_preempts_idle_and_tears_down() {
        let mut rpt = machine(config());
        assert!(rpt.can_start_announcement());
        rpt.start_announcement(vec![2_500i16; CHUNK * 3]);
        assert_eq!(rpt.phase(), Phase::Announcing);
        assert!(!rpt.can_start_announcement());

        let out = rpt.tick(false, &silence_frame(CHUNK));
        assert_eq!(out, vec![2_500i16; CHUNK]);
        rpt.tick(false, &silence_frame(CHUNK));
        rpt.tick(false, &silence_frame(CHUNK));
        // Clip done; next tick starts the courtesy sequence.
        rpt.tick(false, &silence_frame(CHUNK));
        assert_eq!(rpt.phase(), Phase::CourtesyTone);
    }

    #[test]
    fn never_announces_over_receiving() {
        let mut rpt = machine(config());
        rpt.tick(true, &loud());
        assert_eq!(rpt.phase(), Phase::Receiving);
        assert!(!rpt.can_start_announcement());
    }

    #[test]
    fn grace_window_suppresses_vox_after_holdoff() {
        let mut rpt = machine(config());
        rpt.tick(true, &loud());
        for _ in 0..40 {
            rpt.tick(false, &loud());
            if rpt.phase() == Phase::Idle {
                break;
            }
        }
        assert_eq!(rpt.phase(), Phase::Idle);
        // grace_secs 0.03 at 8 kHz / 80 = 3 frames.
        assert!(rpt.vox_suppressed());
        rpt.tick(false, &loud());
        rpt.tick(false, &loud());
        rpt.tick(false, &loud());
        assert!(!rpt.vox_suppressed());
    }

    #[test]
    fn reset_returns_to_idle_from_any_phase() {
        let mut rpt = machine(config());
        rpt.tick(true, &loud());
        rpt.tick(false, &loud());
        assert_eq!(rpt.phase(), Phase::CourtesyTone);
        rpt.reset();
        assert_eq!(rpt.phase(), Phase::Idle);
        assert!(!rpt.is_keyed());
        assert!(!rpt.vox_suppressed());
    }

    #[test]
    fn scheduler_is_due_immediately_then_after_interval() {
        let mut sched = IdScheduler::new(600.0);
        let t0 = Instant::now();
        assert!(sched.due(t0));
        sched.mark_sent(t0);
        assert!(!sched.due(t0 + Duration::from_secs(599)));
        assert!(sched.due(t0 + Duration::from_secs(600)));
    }
}

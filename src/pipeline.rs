//! Per-frame pipeline orchestrator.
//!
//! `Pipeline::process` is the single entry point the audio driver calls, once
//! per frame, and must return before the next frame is due. Everything the
//! real-time path owns lives here: VOX, DTMF, the transmission machine, and
//! the mode buffers. Other contexts reach in only through the control channel
//! and the announcement queues; nothing mutates pipeline state directly.
//!
//! Per frame, in order: drain control requests, apply input gain, decode
//! DTMF, update VOX, dispatch on the recording mode, apply output gain,
//! drive the relay. Whatever happens inside, the returned frame has the
//! input's length.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::announce::Announcer;
use crate::audio::delay::{DelayLine, KEYED_OUTPUT_FLOOR};
use crate::audio::dtmf::DtmfDecoder;
use crate::audio::replay::{ManualSession, TimedReplay};
use crate::audio::vox::{VoxConfig, VoxDetector};
use crate::audio::{apply_gain, audio_level, silence_frame, Frame};
use crate::commands::{AnnouncementTexts, CommandTable};
use crate::config::{RecordingMode, RepeaterSettings};
use crate::events::{EngineEvent, EventBus};
use crate::relay::RelayController;
use crate::repeater::{RepeaterConfig, RepeaterMachine};

/// Capacity of the control channel; requests are rare and tiny.
const CONTROL_QUEUE_DEPTH: usize = 32;

/// Cross-context requests into the real-time pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    Announce(String),
    StartManualRecording,
    StopManualRecording,
    StartManualPlayback,
    StopManualPlayback,
    SetDelaySecs(f32),
    SetMode(RecordingMode),
    Reset,
}

/// Per-mode state, exactly one variant live at a time.
enum ModeState {
    Repeater,
    ContinuousDelay { line: DelayLine },
    TimedReplay { replay: TimedReplay },
    Manual { session: ManualSession },
}

pub struct Pipeline {
    settings: RepeaterSettings,
    machine: RepeaterMachine,
    vox: VoxDetector,
    dtmf: DtmfDecoder,
    commands: CommandTable,
    texts: AnnouncementTexts,
    announcer: Announcer,
    relay: RelayController,
    mode: ModeState,
    control_rx: Receiver<ControlRequest>,
    events: EventBus,
    vox_mirror: Arc<AtomicBool>,
    frame_index: u64,
    last_keyed: bool,
}

impl Pipeline {
    pub fn new(
        settings: RepeaterSettings,
        commands: CommandTable,
        announcer: Announcer,
        relay: RelayController,
        events: EventBus,
    ) -> (Self, Sender<ControlRequest>) {
        let (control_tx, control_rx) = bounded(CONTROL_QUEUE_DEPTH);
        let vox = VoxDetector::new(VoxConfig::from_times(
            settings.vox_threshold,
            settings.vox_attack_secs,
            settings.vox_release_secs,
            settings.sample_rate,
            settings.chunk_size,
        ));
        let dtmf = DtmfDecoder::new(settings.dtmf.clone());
        let machine = RepeaterMachine::new(repeater_config(&settings), events.clone());
        let mut texts = AnnouncementTexts::new(settings.callsign.clone());
        texts.weather_text = settings.weather_text.clone();
        texts.custom_messages = settings.custom_messages.clone();
        let mode = build_mode(settings.mode, &settings);
        let pipeline = Self {
            settings,
            machine,
            vox,
            dtmf,
            commands,
            texts,
            announcer,
            relay,
            mode,
            control_rx,
            events,
            vox_mirror: Arc::new(AtomicBool::new(false)),
            frame_index: 0,
            last_keyed: false,
        };
        (pipeline, control_tx)
    }

    /// Shared VOX flag for the auto-ID ticker. Written only here.
    pub fn vox_mirror(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.vox_mirror)
    }

    /// Process one input frame and produce one output frame of equal length.
    pub fn process(&mut self, input: &[i16]) -> Frame {
        let chunk = input.len();
        self.drain_control();

        // Sample-counter clock; deterministic under test.
        let now = self.frame_index as f64 * self.settings.chunk_size as f64
            / self.settings.sample_rate as f64;
        self.frame_index += 1;

        let mut frame = input.to_vec();
        apply_gain(&mut frame, self.settings.input_gain);
        let level = audio_level(&frame);

        if self.settings.dtmf_enabled && matches!(self.mode, ModeState::Repeater) {
            if let Some(symbol) = self.dtmf.feed(&frame, now) {
                tracing::debug!(%symbol, "dtmf digit");
                self.events.emit(EngineEvent::DtmfDigit { digit: symbol });
                if let Some(code) = self.dtmf.push_digit(symbol, now) {
                    self.dispatch_command(&code);
                }
                if let Some(code) = self.dtmf.take_command() {
                    self.dispatch_command(&code);
                }
            }
        }

        let suppressed = match &self.mode {
            ModeState::Repeater => self.machine.vox_suppressed(),
            ModeState::ContinuousDelay { .. } => false,
            ModeState::TimedReplay { replay } => replay.is_transmitting(),
            ModeState::Manual { session } => session.is_transmitting(),
        };
        let vox_active = if suppressed {
            self.vox.force_inactive();
            false
        } else {
            let was_active = self.vox.is_active();
            let active = self.vox.process(level);
            if active != was_active {
                self.events.emit(EngineEvent::VoxChanged { active });
            }
            active
        };
        self.vox_mirror.store(vox_active, Ordering::Relaxed);

        let mut output = match &mut self.mode {
            ModeState::Repeater => {
                if self.machine.can_start_announcement() && !vox_active {
                    if let Some(clip) = self.announcer.try_next_clip() {
                        self.machine.start_announcement(clip);
                    }
                }
                self.machine.tick(vox_active, &frame)
            }
            ModeState::ContinuousDelay { line } => line.process(frame),
            ModeState::TimedReplay { replay } => replay.process(&frame),
            ModeState::Manual { session } => {
                let (out, limit_hit) = session.process(&frame);
                if limit_hit {
                    self.events.emit(EngineEvent::RecordingStopped {
                        samples: session.recording().len(),
                    });
                }
                out
            }
        };
        apply_gain(&mut output, self.settings.output_gain);

        let keyed = match &self.mode {
            ModeState::Repeater => self.machine.is_keyed(),
            ModeState::ContinuousDelay { line } => {
                line.lookahead_level(self.prekey_frames()) > KEYED_OUTPUT_FLOOR
                    || audio_level(&output) > KEYED_OUTPUT_FLOOR
            }
            ModeState::TimedReplay { replay } => replay.is_transmitting(),
            ModeState::Manual { session } => session.is_transmitting(),
        };
        if keyed {
            self.relay.key();
        } else {
            self.relay.unkey();
        }
        if keyed != self.last_keyed {
            self.last_keyed = keyed;
            self.events.emit(EngineEvent::PttChanged { keyed });
        }

        // The frame contract holds no matter what a sub-step did.
        if output.len() != chunk {
            tracing::warn!(got = output.len(), want = chunk, "frame length mismatch");
            return silence_frame(chunk);
        }
        output
    }

    /// Return to the just-started state: phase idle, queues empty, relay
    /// unkeyed. A stop/start cycle behaves like a fresh start.
    pub fn reset(&mut self) {
        self.machine.reset();
        self.vox.reset();
        self.dtmf.reset();
        self.announcer.drain_ready();
        self.mode = build_mode(self.settings.mode, &self.settings);
        self.relay.unkey();
        self.vox_mirror.store(false, Ordering::Relaxed);
        self.frame_index = 0;
        if self.last_keyed {
            self.last_keyed = false;
            self.events.emit(EngineEvent::PttChanged { keyed: false });
        }
        tracing::info!("pipeline reset");
    }

    fn drain_control(&mut self) {
        while let Ok(request) = self.control_rx.try_recv() {
            match request {
                ControlRequest::Announce(text) => {
                    if self.announcer.enqueue(&text) {
                        self.events.emit(EngineEvent::AnnouncementQueued { text });
                    }
                }
                ControlRequest::StartManualRecording => {
                    if let ModeState::Manual { session } = &mut self.mode {
                        session.start_recording();
                    }
                }
                ControlRequest::StopManualRecording => {
                    if let ModeState::Manual { session } = &mut self.mode {
                        let samples = session.stop_recording();
                        self.events.emit(EngineEvent::RecordingStopped { samples });
                    }
                }
                ControlRequest::StartManualPlayback => {
                    if let ModeState::Manual { session } = &mut self.mode {
                        session.start_playback();
                    }
                }
                ControlRequest::StopManualPlayback => {
                    if let ModeState::Manual { session } = &mut self.mode {
                        session.stop_playback();
                    }
                }
                ControlRequest::SetDelaySecs(secs) => {
                    self.settings.delay_secs = secs.max(0.1);
                    if let ModeState::ContinuousDelay { line } = &mut self.mode {
                        let depth = (self.settings.delay_secs
                            * self.settings.sample_rate as f32
                            / self.settings.chunk_size as f32)
                            .round() as usize;
                        line.resize(depth.max(1));
                    }
                }
                ControlRequest::SetMode(mode) => {
                    if self.settings.mode != mode {
                        tracing::info!(mode = mode.label(), "recording mode changed");
                        self.settings.mode = mode;
                        self.machine.reset();
                        self.mode = build_mode(mode, &self.settings);
                    }
                }
                ControlRequest::Reset => self.reset(),
            }
        }
    }

    fn dispatch_command(&mut self, code: &str) {
        match self.commands.lookup(code) {
            Some(action) => {
                tracing::info!(code, action = %action.name(), "dtmf command");
                self.events.emit(EngineEvent::CommandAccepted {
                    code: code.to_owned(),
                    action: action.name(),
                });
                let text = self.texts.resolve(action);
                if self.announcer.enqueue(&text) {
                    self.events.emit(EngineEvent::AnnouncementQueued { text });
                }
            }
            None => {
                tracing::debug!(code, "unknown dtmf command");
                self.events.emit(EngineEvent::CommandUnknown {
                    code: code.to_owned(),
                });
            }
        }
    }

    fn prekey_frames(&self) -> usize {
        (self.settings.prekey_secs * self.settings.sample_rate as f32
            / self.settings.chunk_size as f32)
            .round() as usize
    }
}

fn build_mode(mode: RecordingMode, settings: &RepeaterSettings) -> ModeState {
    match mode {
        RecordingMode::Repeater => ModeState::Repeater,
        RecordingMode::ContinuousDelay => ModeState::ContinuousDelay {
            line: DelayLine::from_secs(
                settings.delay_secs,
                settings.sample_rate,
                settings.chunk_size,
            ),
        },
        RecordingMode::TimedReplay => ModeState::TimedReplay {
            replay: TimedReplay::new(
                settings.max_record_secs,
                settings.sample_rate,
                settings.chunk_size,
            ),
        },
        RecordingMode::Manual => ModeState::Manual {
            session: ManualSession::new(settings.max_record_secs, settings.sample_rate),
        },
    }
}

fn repeater_config(settings: &RepeaterSettings) -> RepeaterConfig {
    RepeaterConfig {
        sample_rate: settings.sample_rate,
        chunk: settings.chunk_size,
        courtesy_enabled: settings.courtesy_enabled,
        courtesy_freq: settings.courtesy_freq,
        courtesy_duration_secs: settings.courtesy_duration_secs,
        courtesy_volume: settings.courtesy_volume,
        tail_silence_secs: settings.tail_silence_secs,
        feedback_protection: settings.feedback_protection,
        holdoff_secs: settings.holdoff_secs,
        grace_secs: settings.grace_secs,
        timeout_secs: settings.timeout_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::{AnnounceConfig, Announcer, SilenceSynthesizer};
    use crate::relay::RelayProtocol;
    use crate::repeater::Phase;
    use std::time::{Duration, Instant};

    const RATE: u32 = 8_000;
    const CHUNK: usize = 80;

    fn settings(mode: RecordingMode) -> RepeaterSettings {
        RepeaterSettings {
            callsign: "W1AW".into(),
            sample_rate: RATE,
            chunk_size: CHUNK,
            input_gain: 1.0,
            output_gain: 1.0,
            mode,
            vox_threshold: 5.0,
            vox_attack_secs: 0.02,
            vox_release_secs: 0.03,
            dtmf_enabled: true,
            dtmf: crate::audio::dtmf::DtmfConfig {
                sample_rate: RATE,
                ..Default::default()
            },
            courtesy_enabled: true,
            courtesy_freq: 1_000.0,
            courtesy_duration_secs: 0.05,
            courtesy_volume: 0.5,
            tail_silence_secs: 0.05,
            feedback_protection: true,
            holdoff_secs: 0.05,
            grace_secs: 0.03,
            timeout_secs: 180.0,
            auto_id_enabled: false,
            id_interval_secs: 600.0,
            delay_secs: 0.2,
            prekey_secs: 0.1,
            max_record_secs: 0.1,
            ptt_pre_delay_secs: 0.1,
            weather_text: None,
            custom_messages: Vec::new(),
        }
    }

    fn pipeline(mode: RecordingMode) -> (Pipeline, Sender<ControlRequest>) {
        let (bus, _rx) = EventBus::new(256);
        let announcer = Announcer::start(
            Box::new(SilenceSynthesizer { sample_rate: RATE }),
            AnnounceConfig {
                engine_rate: RATE,
                pre_delay_secs: 0.1,
                queue_depth: 4,
            },
            bus.clone(),
        );
        let relay = RelayController::disconnected(RelayProtocol::CommandBytes, bus.clone());
        let config = settings(mode);
        let table = CommandTable::defaults();
        Pipeline::new(config, table, announcer, relay, bus)
    }

    fn loud() -> Vec<i16> {
        vec![8_000i16; CHUNK]
    }

    fn quiet() -> Vec<i16> {
        vec![0i16; CHUNK]
    }

    #[test]
    fn output_length_matches_input_in_every_mode() {
        for mode in [
            RecordingMode::Repeater,
            RecordingMode::ContinuousDelay,
            RecordingMode::TimedReplay,
            RecordingMode::Manual,
        ] {
            let (mut pipe, _ctl) = pipeline(mode);
            for _ in 0..10 {
                assert_eq!(pipe.process(&loud()).len(), CHUNK);
                assert_eq!(pipe.process(&quiet()).len(), CHUNK);
            }
        }
    }

    #[test]
    fn repeater_keys_on_speech_and_unkeys_through_holdoff() {
        let (mut pipe, _ctl) = pipeline(RecordingMode::Repeater);
        // Attack is 2 frames at these settings.
        pipe.process(&loud());
        pipe.process(&loud());
        pipe.process(&loud());
        assert_eq!(pipe.machine.phase(), Phase::Receiving);
        assert!(pipe.relay.is_keyed());

        let mut reached_idle = false;
        for _ in 0..80 {
            pipe.process(&quiet());
            if pipe.machine.phase() == Phase::Holdoff {
                assert!(!pipe.relay.is_keyed());
            }
            if pipe.machine.phase() == Phase::Idle {
                reached_idle = true;
                break;
            }
        }
        assert!(reached_idle);
        assert!(!pipe.relay.is_keyed());
    }

    #[test]
    fn repeater_passes_audio_through_while_receiving() {
        let (mut pipe, _ctl) = pipeline(RecordingMode::Repeater);
        pipe.process(&loud());
        pipe.process(&loud());
        let out = pipe.process(&loud());
        assert_eq!(out, loud());
    }

    #[test]
    fn delay_mode_keys_ahead_of_output() {
        let (mut pipe, _ctl) = pipeline(RecordingMode::ContinuousDelay);
        // Delay 0.2 s = 20 frames, lookahead 0.1 s = 10 frames. After 11
        // loud frames the lookahead sees audio while output is still silent.
        let mut keyed_before_output = false;
        for _ in 0..15 {
            let out = pipe.process(&loud());
            if pipe.relay.is_keyed() && audio_level(&out) < KEYED_OUTPUT_FLOOR {
                keyed_before_output = true;
            }
        }
        assert!(keyed_before_output);
    }

    #[test]
    fn delay_mode_emits_delayed_audio() {
        let (mut pipe, _ctl) = pipeline(RecordingMode::ContinuousDelay);
        let mut first_loud = None;
        for i in 0..30 {
            let out = pipe.process(&loud());
            if first_loud.is_none() && audio_level(&out) > KEYED_OUTPUT_FLOOR {
                first_loud = Some(i);
            }
        }
        assert_eq!(first_loud, Some(20));
    }

    #[test]
    fn manual_mode_records_and_replays_via_control_channel() {
        let (mut pipe, ctl) = pipeline(RecordingMode::Manual);
        ctl.send(ControlRequest::StartManualRecording).unwrap();
        pipe.process(&loud());
        pipe.process(&loud());
        ctl.send(ControlRequest::StopManualRecording).unwrap();
        ctl.send(ControlRequest::StartManualPlayback).unwrap();
        let mut keyed = false;
        for _ in 0..60 {
            pipe.process(&quiet());
            keyed |= pipe.relay.is_keyed();
        }
        assert!(keyed);
        // Playback over; back to silence and unkeyed.
        pipe.process(&quiet());
        assert!(!pipe.relay.is_keyed());
    }

    #[test]
    fn reset_clears_phase_and_pending_clips() {
        let (mut pipe, ctl) = pipeline(RecordingMode::Repeater);
        ctl.send(ControlRequest::Announce("station test".into()))
            .unwrap();
        // Keep the channel busy so the clip is never consumed for playback.
        pipe.process(&loud());
        pipe.process(&loud());
        pipe.process(&loud());
        assert_eq!(pipe.machine.phase(), Phase::Receiving);
        let deadline = Instant::now() + Duration::from_secs(5);
        while pipe.announcer.ready_len() == 0 {
            assert!(Instant::now() < deadline, "clip never became ready");
            std::thread::sleep(Duration::from_millis(5));
            pipe.process(&loud());
        }
        pipe.reset();
        assert_eq!(pipe.machine.phase(), Phase::Idle);
        assert_eq!(pipe.announcer.ready_len(), 0);
        assert!(pipe.announcer.try_next_clip().is_none());
        assert!(!pipe.relay.is_keyed());
    }

    #[test]
    fn announcement_plays_when_channel_is_idle() {
        let (mut pipe, ctl) = pipeline(RecordingMode::Repeater);
        ctl.send(ControlRequest::Announce("identify".into())).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut announced = false;
        while Instant::now() < deadline {
            pipe.process(&quiet());
            if pipe.machine.phase() == Phase::Announcing {
                announced = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(announced);
        assert!(pipe.relay.is_keyed());
    }

    #[test]
    fn mode_switch_rebuilds_state() {
        let (mut pipe, ctl) = pipeline(RecordingMode::Repeater);
        ctl.send(ControlRequest::SetMode(RecordingMode::TimedReplay))
            .unwrap();
        pipe.process(&quiet());
        assert!(matches!(pipe.mode, ModeState::TimedReplay { .. }));
    }
}

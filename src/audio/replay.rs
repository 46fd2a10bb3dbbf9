//! Record/replay buffering: the timed replay loop and operator-driven manual
//! sessions.
//!
//! Both produce playback as a pre-key tone followed by the captured audio.
//! Stage changes are frame-counted off the pipeline clock rather than timed
//! by a background thread, so the per-frame deadline is never at risk.

use super::tone::prekey_tone;
use super::{silence_frame, Frame, PlaybackCursor};

/// Gap between the end of playback and the next recording window, so the
/// loop does not capture its own playback tail.
const REPLAY_PAUSE_SECS: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStage {
    Recording,
    Playing,
    Pausing,
}

/// Continuous record-then-replay cycle.
#[derive(Debug)]
pub struct TimedReplay {
    sample_rate: u32,
    record_frames: usize,
    pause_frames: usize,
    stage: ReplayStage,
    frames_in_stage: usize,
    captured: Vec<i16>,
    cursor: Option<PlaybackCursor>,
}

impl TimedReplay {
    pub fn new(record_secs: f32, sample_rate: u32, chunk: usize) -> Self {
        let frames = |secs: f32| -> usize {
            ((secs * sample_rate as f32 / chunk as f32).round() as usize).max(1)
        };
        Self {
            sample_rate,
            record_frames: frames(record_secs),
            pause_frames: frames(REPLAY_PAUSE_SECS),
            stage: ReplayStage::Recording,
            frames_in_stage: 0,
            captured: Vec::new(),
            cursor: None,
        }
    }

    /// Feed the live frame and produce the frame to transmit. Output is
    /// silence except while replaying.
    pub fn process(&mut self, input: &[i16]) -> Frame {
        match self.stage {
            ReplayStage::Recording => {
                self.captured.extend_from_slice(input);
                self.frames_in_stage += 1;
                if self.frames_in_stage >= self.record_frames {
                    let mut clip = prekey_tone(self.sample_rate);
                    clip.append(&mut self.captured);
                    self.cursor = Some(PlaybackCursor::new(clip));
                    self.enter(ReplayStage::Playing);
                }
                silence_frame(input.len())
            }
            ReplayStage::Playing => {
                let frame = self
                    .cursor
                    .as_mut()
                    .and_then(|c| c.next_frame(input.len()));
                match frame {
                    Some(frame) => frame,
                    None => {
                        self.cursor = None;
                        self.enter(ReplayStage::Pausing);
                        silence_frame(input.len())
                    }
                }
            }
            ReplayStage::Pausing => {
                self.frames_in_stage += 1;
                if self.frames_in_stage >= self.pause_frames {
                    self.enter(ReplayStage::Recording);
                }
                silence_frame(input.len())
            }
        }
    }

    pub fn stage(&self) -> ReplayStage {
        self.stage
    }

    /// PTT policy: keyed only while the replayed clip is on the air.
    pub fn is_transmitting(&self) -> bool {
        self.stage == ReplayStage::Playing
    }

    pub fn reset(&mut self) {
        self.captured.clear();
        self.cursor = None;
        self.enter(ReplayStage::Recording);
    }

    fn enter(&mut self, stage: ReplayStage) {
        self.stage = stage;
        self.frames_in_stage = 0;
    }

    #[cfg(test)]
    fn record_frames(&self) -> usize {
        self.record_frames
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualStage {
    Idle,
    Recording,
    Playing,
}

/// Operator-driven record/playback, controlled from outside the frame loop.
#[derive(Debug)]
pub struct ManualSession {
    sample_rate: u32,
    max_samples: usize,
    stage: ManualStage,
    captured: Vec<i16>,
    cursor: Option<PlaybackCursor>,
}

impl ManualSession {
    pub fn new(max_record_secs: f32, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            max_samples: (max_record_secs.max(0.0) * sample_rate as f32) as usize,
            stage: ManualStage::Idle,
            captured: Vec::new(),
            cursor: None,
        }
    }

    pub fn start_recording(&mut self) {
        self.captured.clear();
        self.cursor = None;
        self.stage = ManualStage::Recording;
    }

    /// Stop capturing. Returns the number of samples held.
    pub fn stop_recording(&mut self) -> usize {
        if self.stage == ManualStage::Recording {
            self.stage = ManualStage::Idle;
        }
        self.captured.len()
    }

    /// Begin replaying the captured clip behind a pre-key tone. No-op when
    /// nothing has been recorded.
    pub fn start_playback(&mut self) -> bool {
        if self.captured.is_empty() {
            return false;
        }
        let mut clip = prekey_tone(self.sample_rate);
        clip.extend_from_slice(&self.captured);
        self.cursor = Some(PlaybackCursor::new(clip));
        self.stage = ManualStage::Playing;
        true
    }

    pub fn stop_playback(&mut self) {
        if self.stage == ManualStage::Playing {
            self.cursor = None;
            self.stage = ManualStage::Idle;
        }
    }

    /// Feed the live frame. Returns the output frame and whether the capture
    /// limit just forced recording to stop.
    pub fn process(&mut self, input: &[i16]) -> (Frame, bool) {
        match self.stage {
            ManualStage::Idle => (silence_frame(input.len()), false),
            ManualStage::Recording => {
                self.captured.extend_from_slice(input);
                if self.captured.len() >= self.max_samples {
                    self.captured.truncate(self.max_samples);
                    self.stage = ManualStage::Idle;
                    return (silence_frame(input.len()), true);
                }
                (silence_frame(input.len()), false)
            }
            ManualStage::Playing => {
                match self.cursor.as_mut().and_then(|c| c.next_frame(input.len())) {
                    Some(frame) => (frame, false),
                    None => {
                        self.cursor = None;
                        self.stage = ManualStage::Idle;
                        (silence_frame(input.len()), false)
                    }
                }
            }
        }
    }

    pub fn stage(&self) -> ManualStage {
        self.stage
    }

    pub fn is_transmitting(&self) -> bool {
        self.stage == ManualStage::Playing
    }

    /// The captured samples, for callers that persist recordings.
    pub fn recording(&self) -> &[i16] {
        &self.captured
    }

    pub fn reset(&mut self) {
        self.captured.clear();
        self.cursor = None;
        self.stage = ManualStage::Idle;
    }
}

//! Constant-lag delay line for continuous-delay repeat.
//!
//! Frames enter at the back and leave at the front, so output always trails
//! input by exactly the buffer depth. The buffer starts full of silence, which
//! means the first frames out are silent rather than stale or missing.

use std::collections::VecDeque;

use super::{audio_level, silence_frame, Frame};

/// Output below this level is treated as silence for keying purposes, so the
/// transmitter drops as soon as the delayed tail runs dry.
pub const KEYED_OUTPUT_FLOOR: f32 = 0.5;

#[derive(Debug)]
pub struct DelayLine {
    frames: VecDeque<Frame>,
    depth: usize,
    chunk: usize,
}

impl DelayLine {
    pub fn new(depth: usize, chunk: usize) -> Self {
        let depth = depth.max(1);
        let mut frames = VecDeque::with_capacity(depth);
        for _ in 0..depth {
            frames.push_back(silence_frame(chunk));
        }
        Self { frames, depth, chunk }
    }

    /// Derive depth from a delay in seconds at the engine's rate.
    pub fn from_secs(delay_secs: f32, sample_rate: u32, chunk: usize) -> Self {
        let depth = ((delay_secs * sample_rate as f32 / chunk as f32).round() as usize).max(1);
        Self::new(depth, chunk)
    }

    /// Push the live frame and take the frame delayed by the buffer depth.
    pub fn process(&mut self, frame: Frame) -> Frame {
        self.frames.push_back(frame);
        self.frames
            .pop_front()
            .unwrap_or_else(|| silence_frame(self.chunk))
    }

    /// True when anything still queued is loud enough to warrant keeping the
    /// transmitter keyed after the live carrier drops.
    pub fn has_pending_audio(&self) -> bool {
        self.frames
            .iter()
            .any(|f| audio_level(f) > KEYED_OUTPUT_FLOOR)
    }

    /// Level of the frame that will be emitted `frames_ahead` frames from
    /// now. Keying off this lookahead opens the transmitter before the
    /// delayed audio reaches output.
    pub fn lookahead_level(&self, frames_ahead: usize) -> f32 {
        self.frames
            .get(frames_ahead)
            .map(|f| audio_level(f))
            .unwrap_or(0.0)
    }

    /// Change the delay depth while running. Shrinking keeps the newest
    /// frames; growing pads the oldest end with silence so the lag extends
    /// without replaying anything twice.
    pub fn resize(&mut self, depth: usize) {
        let depth = depth.max(1);
        while self.frames.len() > depth {
            self.frames.pop_front();
        }
        while self.frames.len() < depth {
            self.frames.push_front(silence_frame(self.chunk));
        }
        self.depth = depth;
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        for _ in 0..self.depth {
            self.frames.push_back(silence_frame(self.chunk));
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

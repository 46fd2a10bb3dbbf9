//! Frame-level audio primitives shared by the detectors, buffers, and the
//! per-frame pipeline.
//!
//! The whole crate works on mono, signed 16-bit frames of a fixed chunk size.
//! Levels are expressed on a 0-100 scale derived from mean absolute amplitude,
//! matching the scale every VOX/PTT threshold in the configuration uses.

pub mod delay;
pub mod dtmf;
pub mod replay;
pub mod resample;
pub mod tone;
pub mod vox;

/// One fixed-size unit of mono 16-bit audio.
pub type Frame = Vec<i16>;

/// A frame of pure silence.
pub fn silence_frame(len: usize) -> Frame {
    vec![0i16; len]
}

/// Mean absolute amplitude normalized to 0-100.
pub fn audio_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: u64 = samples.iter().map(|s| s.unsigned_abs() as u64).sum();
    (sum as f32 / samples.len() as f32) / 32_768.0 * 100.0
}

/// Scale samples in place, saturating at the i16 bounds.
pub fn apply_gain(frame: &mut [i16], gain: f32) {
    if (gain - 1.0).abs() < f32::EPSILON {
        return;
    }
    for sample in frame.iter_mut() {
        let scaled = (*sample as f32 * gain).clamp(-32_768.0, 32_767.0);
        *sample = scaled as i16;
    }
}

/// Sequential reader over a finished clip, handing out chunk-sized frames and
/// zero-padding the final partial frame.
#[derive(Debug, Clone)]
pub struct PlaybackCursor {
    samples: Vec<i16>,
    pos: usize,
}

impl PlaybackCursor {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples, pos: 0 }
    }

    /// Next frame of the clip, or `None` once the clip is exhausted.
    pub fn next_frame(&mut self, chunk: usize) -> Option<Frame> {
        if self.pos >= self.samples.len() {
            return None;
        }
        let end = (self.pos + chunk).min(self.samples.len());
        let mut frame = self.samples[self.pos..end].to_vec();
        frame.resize(chunk, 0);
        self.pos = end;
        Some(frame)
    }

    pub fn is_finished(&self) -> bool {
        self.pos >= self.samples.len()
    }

    pub fn len_samples(&self) -> usize {
        self.samples.len()
    }
}

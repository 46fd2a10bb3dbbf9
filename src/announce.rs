//! Announcement synthesis pipeline.
//!
//! Text goes in on a bounded request queue; a worker thread turns it into
//! audio through a [`Synthesizer`] and deposits engine-rate clips on a ready
//! queue. The real-time side only ever does non-blocking pops, so synthesis
//! latency can never stall a frame.
//!
//! One worker means synthesis is serialized by construction; TTS backends are
//! not assumed thread-safe.

use std::process::Command;
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::audio::resample::resample_clip;
use crate::audio::tone::{prekey_tone, silence};
use crate::events::{EngineEvent, EventBus};

/// Substitute clip length when synthesis fails.
const FAILURE_SILENCE_SECS: f32 = 2.0;

/// A synthesized clip at whatever rate the backend produces.
pub struct SynthesizedClip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// External text-to-speech collaborator.
pub trait Synthesizer: Send {
    fn synthesize(&mut self, text: &str) -> Result<SynthesizedClip>;
}

/// Fallback/test synthesizer: silence roughly paced like speech.
pub struct SilenceSynthesizer {
    pub sample_rate: u32,
}

impl Synthesizer for SilenceSynthesizer {
    fn synthesize(&mut self, text: &str) -> Result<SynthesizedClip> {
        let words = text.split_whitespace().count().max(1);
        let duration = (words as f32 * 0.35).clamp(1.0, 10.0);
        Ok(SynthesizedClip {
            samples: silence(self.sample_rate, duration),
            sample_rate: self.sample_rate,
        })
    }
}

/// Shells out to an operator-configured command that writes raw signed
/// 16-bit little-endian PCM to stdout. The text is appended as the final
/// argument.
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
    output_rate: u32,
}

impl CommandSynthesizer {
    pub fn new(command_line: &str, output_rate: u32) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_owned);
        let Some(program) = parts.next() else {
            bail!("synthesizer command is empty");
        };
        Ok(Self {
            program,
            args: parts.collect(),
            output_rate,
        })
    }
}

impl Synthesizer for CommandSynthesizer {
    fn synthesize(&mut self, text: &str) -> Result<SynthesizedClip> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .output()
            .with_context(|| format!("failed to run synthesizer '{}'", self.program))?;
        if !output.status.success() {
            bail!("synthesizer exited with {}", output.status);
        }
        let samples = output
            .stdout
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Ok(SynthesizedClip {
            samples,
            sample_rate: self.output_rate,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AnnounceConfig {
    /// Rate every ready clip is delivered at.
    pub engine_rate: u32,
    /// Silence prepended so a serial relay can key before speech starts.
    pub pre_delay_secs: f32,
    pub queue_depth: usize,
}

/// Handle to the synthesis worker. Dropping or stopping it disconnects the
/// request queue, which ends the worker.
pub struct Announcer {
    request_tx: Option<Sender<String>>,
    ready_rx: Receiver<Vec<i16>>,
    worker: Option<JoinHandle<()>>,
}

impl Announcer {
    pub fn start(
        mut synthesizer: Box<dyn Synthesizer>,
        cfg: AnnounceConfig,
        events: EventBus,
    ) -> Self {
        let (request_tx, request_rx) = bounded::<String>(cfg.queue_depth.max(1));
        let (ready_tx, ready_rx) = bounded::<Vec<i16>>(cfg.queue_depth.max(1));
        let worker = thread::Builder::new()
            .name("announce-synth".into())
            .spawn(move || {
                while let Ok(text) = request_rx.recv() {
                    // Pre-delay silence lets the relay key, then the pre-key
                    // tone wakes the far radio's VOX before speech starts.
                    let mut ready = silence(cfg.engine_rate, cfg.pre_delay_secs);
                    match synthesizer.synthesize(&text) {
                        Ok(clip) => {
                            ready.extend(prekey_tone(cfg.engine_rate));
                            ready.extend(resample_clip(
                                &clip.samples,
                                clip.sample_rate,
                                cfg.engine_rate,
                            ));
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, %text, "synthesis failed");
                            events.emit(EngineEvent::SynthesisFailed {
                                text: text.clone(),
                                reason: err.to_string(),
                            });
                            ready.extend(silence(cfg.engine_rate, FAILURE_SILENCE_SECS));
                        }
                    }
                    if ready_tx.send(ready).is_err() {
                        break;
                    }
                }
                tracing::debug!("announcement worker stopped");
            })
            .expect("spawn announce worker");
        Self {
            request_tx: Some(request_tx),
            ready_rx,
            worker: Some(worker),
        }
    }

    /// Queue text for synthesis. Returns false when the request queue is
    /// full or the worker is gone.
    pub fn enqueue(&self, text: &str) -> bool {
        let Some(tx) = self.request_tx.as_ref() else {
            return false;
        };
        match tx.try_send(text.to_owned()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%text, "announcement request queue full");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Non-blocking pop of the next ready clip.
    pub fn try_next_clip(&self) -> Option<Vec<i16>> {
        self.ready_rx.try_recv().ok()
    }

    /// Clips synthesized and waiting for playback.
    pub fn ready_len(&self) -> usize {
        self.ready_rx.len()
    }

    /// Discard everything already synthesized.
    pub fn drain_ready(&self) {
        while self.ready_rx.try_recv().is_ok() {}
    }

    /// Disconnect the request queue, join the worker, and drain ready clips
    /// so a following start behaves like a fresh one.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.request_tx = None;
        if let Some(worker) = self.worker.take() {
            // The worker may still be flushing buffered requests; keep the
            // ready queue moving so it can finish and exit.
            while !worker.is_finished() {
                self.drain_ready();
                thread::sleep(std::time::Duration::from_millis(1));
            }
            let _ = worker.join();
        }
        self.drain_ready();
    }
}

impl Drop for Announcer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

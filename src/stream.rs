//! cpal duplex wiring.
//!
//! Receiver audio comes in on a cpal input stream, gets chunked into
//! engine-size mono i16 frames, crosses a bounded channel to the pipeline
//! thread, and the processed frames cross a second channel to the output
//! stream feeding the transmitter. Both callbacks are non-blocking; a full
//! queue drops frames and counts them, an empty one plays silence.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::audio::Frame;
use crate::pipeline::Pipeline;

const FRAME_QUEUE_DEPTH: usize = 64;
const PIPELINE_WAIT: Duration = Duration::from_millis(100);

/// Downmix interleaved input to mono i16 with the provided converter.
fn append_downmixed<T, F>(buf: &mut Vec<i16>, data: &[T], channels: usize, mut convert: F)
where
    T: Copy,
    F: FnMut(T) -> i16,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }
    let mut acc = 0i32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += i32::from(convert(sample));
        count += 1;
        if count == channels {
            buf.push((acc / channels as i32) as i16);
            acc = 0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push((acc / count as i32) as i16);
    }
}

/// Accumulates callback buffers into fixed engine frames and hands them to
/// the pipeline channel without blocking the audio thread.
struct FrameChunker {
    chunk: usize,
    pending: Vec<i16>,
    scratch: Vec<i16>,
    sender: Sender<Frame>,
    dropped: Arc<AtomicUsize>,
}

impl FrameChunker {
    fn new(chunk: usize, sender: Sender<Frame>, dropped: Arc<AtomicUsize>) -> Self {
        Self {
            chunk: chunk.max(1),
            pending: Vec::with_capacity(chunk),
            scratch: Vec::new(),
            sender,
            dropped,
        }
    }

    fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> i16,
    {
        self.scratch.clear();
        append_downmixed(&mut self.scratch, data, channels, convert);
        self.pending.extend_from_slice(&self.scratch);

        while self.pending.len() >= self.chunk {
            let frame: Frame = self.pending.drain(..self.chunk).collect();
            match self.sender.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    }
}

/// Feeds processed frames into the output callback, padding underruns with
/// silence.
struct OutputFeeder {
    rx: Receiver<Frame>,
    current: Frame,
    pos: usize,
}

impl OutputFeeder {
    fn new(rx: Receiver<Frame>) -> Self {
        Self {
            rx,
            current: Vec::new(),
            pos: 0,
        }
    }

    fn next_sample(&mut self) -> i16 {
        if self.pos >= self.current.len() {
            match self.rx.try_recv() {
                Ok(frame) => {
                    self.current = frame;
                    self.pos = 0;
                }
                Err(_) => return 0,
            }
        }
        let sample = self.current.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        sample
    }

    fn fill<T, F>(&mut self, data: &mut [T], channels: usize, mut convert: F)
    where
        F: FnMut(i16) -> T,
        T: Copy,
    {
        for frame in data.chunks_mut(channels.max(1)) {
            let sample = self.next_sample();
            for slot in frame.iter_mut() {
                *slot = convert(sample);
            }
        }
    }
}

/// Input and output device names visible to the host.
pub fn list_devices() -> Result<(Vec<String>, Vec<String>)> {
    let host = cpal::default_host();
    let mut inputs = Vec::new();
    for device in host.input_devices().context("no input devices available")? {
        if let Ok(name) = device.name() {
            inputs.push(name);
        }
    }
    let mut outputs = Vec::new();
    for device in host.output_devices().context("no output devices available")? {
        if let Ok(name) = device.name() {
            outputs.push(name);
        }
    }
    Ok((inputs, outputs))
}

fn find_input_device(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device> {
    match preferred {
        Some(name) => {
            let mut devices = host.input_devices().context("no input devices available")?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("input device '{name}' not found"))
        }
        None => host
            .default_input_device()
            .context("no default input device available"),
    }
}

fn find_output_device(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device> {
    match preferred {
        Some(name) => {
            let mut devices = host.output_devices().context("no output devices available")?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("output device '{name}' not found"))
        }
        None => host
            .default_output_device()
            .context("no default output device available"),
    }
}

/// Running duplex streams plus the channel endpoints the pipeline thread
/// uses. Dropping this stops the audio callbacks.
pub struct DuplexStreams {
    _input: cpal::Stream,
    _output: cpal::Stream,
    pub dropped_frames: Arc<AtomicUsize>,
}

pub struct DuplexConfig<'a> {
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub input_device: Option<&'a str>,
    pub output_device: Option<&'a str>,
}

/// Open both streams at the engine rate and start them.
pub fn start_duplex(
    cfg: &DuplexConfig<'_>,
    in_tx: Sender<Frame>,
    out_rx: Receiver<Frame>,
) -> Result<DuplexStreams> {
    let host = cpal::default_host();
    let input_device = find_input_device(&host, cfg.input_device)?;
    let output_device = find_output_device(&host, cfg.output_device)?;

    let input_default = input_device
        .default_input_config()
        .context("failed to query input device config")?;
    let output_default = output_device
        .default_output_config()
        .context("failed to query output device config")?;

    let in_channels = usize::from(input_default.channels().max(1));
    let out_channels = usize::from(output_default.channels().max(1));
    let input_config = StreamConfig {
        channels: input_default.channels().max(1),
        sample_rate: SampleRate(cfg.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let output_config = StreamConfig {
        channels: output_default.channels().max(1),
        sample_rate: SampleRate(cfg.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    tracing::info!(
        input = %input_device.name().unwrap_or_else(|_| "unknown".into()),
        output = %output_device.name().unwrap_or_else(|_| "unknown".into()),
        rate = cfg.sample_rate,
        chunk = cfg.chunk_size,
        "opening duplex streams"
    );

    let dropped = Arc::new(AtomicUsize::new(0));
    let chunker = Arc::new(Mutex::new(FrameChunker::new(
        cfg.chunk_size,
        in_tx,
        dropped.clone(),
    )));

    let err_fn = |err| tracing::warn!(error = %err, "audio stream error");

    let input = match input_default.sample_format() {
        SampleFormat::F32 => {
            let chunker = chunker.clone();
            let dropped = dropped.clone();
            input_device.build_input_stream(
                &input_config,
                move |data: &[f32], _| {
                    if let Ok(mut pump) = chunker.try_lock() {
                        pump.push(data, in_channels, |s| {
                            (s.clamp(-1.0, 1.0) * 32_767.0) as i16
                        });
                    } else {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::I16 => {
            let chunker = chunker.clone();
            let dropped = dropped.clone();
            input_device.build_input_stream(
                &input_config,
                move |data: &[i16], _| {
                    if let Ok(mut pump) = chunker.try_lock() {
                        pump.push(data, in_channels, |s| s);
                    } else {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::U16 => {
            let chunker = chunker.clone();
            let dropped = dropped.clone();
            input_device.build_input_stream(
                &input_config,
                move |data: &[u16], _| {
                    if let Ok(mut pump) = chunker.try_lock() {
                        pump.push(data, in_channels, |s| (s as i32 - 32_768) as i16);
                    } else {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                },
                err_fn,
                None,
            )?
        }
        other => return Err(anyhow!("unsupported input sample format: {other:?}")),
    };

    let feeder = Arc::new(Mutex::new(OutputFeeder::new(out_rx)));
    let output = match output_default.sample_format() {
        SampleFormat::F32 => {
            let feeder = feeder.clone();
            output_device.build_output_stream(
                &output_config,
                move |data: &mut [f32], _| {
                    if let Ok(mut feed) = feeder.try_lock() {
                        feed.fill(data, out_channels, |s| s as f32 / 32_768.0);
                    } else {
                        data.fill(0.0);
                    }
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::I16 => {
            let feeder = feeder.clone();
            output_device.build_output_stream(
                &output_config,
                move |data: &mut [i16], _| {
                    if let Ok(mut feed) = feeder.try_lock() {
                        feed.fill(data, out_channels, |s| s);
                    } else {
                        data.fill(0);
                    }
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::U16 => {
            let feeder = feeder.clone();
            output_device.build_output_stream(
                &output_config,
                move |data: &mut [u16], _| {
                    if let Ok(mut feed) = feeder.try_lock() {
                        feed.fill(data, out_channels, |s| (s as i32 + 32_768) as u16);
                    } else {
                        data.fill(32_768);
                    }
                },
                err_fn,
                None,
            )?
        }
        other => return Err(anyhow!("unsupported output sample format: {other:?}")),
    };

    input.play().context("failed to start input stream")?;
    output.play().context("failed to start output stream")?;

    Ok(DuplexStreams {
        _input: input,
        _output: output,
        dropped_frames: dropped,
    })
}

/// Channel pair between the audio callbacks and the pipeline thread.
pub fn frame_channels() -> (Sender<Frame>, Receiver<Frame>, Sender<Frame>, Receiver<Frame>) {
    let (in_tx, in_rx) = bounded(FRAME_QUEUE_DEPTH);
    let (out_tx, out_rx) = bounded(FRAME_QUEUE_DEPTH);
    (in_tx, in_rx, out_tx, out_rx)
}

/// Run the pipeline off the audio threads. Exits when the input channel
/// disconnects or the stop flag rises.
pub fn spawn_pipeline_thread(
    mut pipeline: Pipeline,
    in_rx: Receiver<Frame>,
    out_tx: Sender<Frame>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("frame-pipeline".into())
        .spawn(move || {
            loop {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                match in_rx.recv_timeout(PIPELINE_WAIT) {
                    Ok(frame) => {
                        let out = pipeline.process(&frame);
                        if let Err(TrySendError::Disconnected(_)) = out_tx.try_send(out) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            pipeline.reset();
            tracing::debug!("pipeline thread stopped");
        })
        .expect("spawn pipeline thread")
}

//! Command-line parsing and the settings snapshot the core consumes.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::audio::dtmf::DtmfConfig;
use crate::relay::RelayProtocol;

pub use defaults::{
    DEFAULT_ANNOUNCE_QUEUE_DEPTH, DEFAULT_CALLSIGN, DEFAULT_CHUNK_SIZE,
    DEFAULT_COURTESY_DURATION_SECS, DEFAULT_COURTESY_FREQ_HZ, DEFAULT_COURTESY_VOLUME,
    DEFAULT_DELAY_SECS, DEFAULT_DTMF_DEBOUNCE_MS, DEFAULT_DTMF_DIGIT_TIMEOUT_MS,
    DEFAULT_DTMF_MIN_TONE_MS, DEFAULT_DTMF_THRESHOLD, DEFAULT_DTMF_TONE_TIMEOUT_MS,
    DEFAULT_EVENT_CAPACITY, DEFAULT_GRACE_SECS, DEFAULT_HOLDOFF_SECS, DEFAULT_ID_INTERVAL_SECS,
    DEFAULT_INPUT_GAIN, DEFAULT_MAX_RECORD_SECS, DEFAULT_OUTPUT_GAIN, DEFAULT_PREKEY_SECS,
    DEFAULT_PTT_PRE_DELAY_SECS, DEFAULT_RELAY_BAUD, DEFAULT_SAMPLE_RATE, DEFAULT_SYNTH_RATE,
    DEFAULT_TAIL_SILENCE_SECS,
    DEFAULT_TIMEOUT_SECS, DEFAULT_VOX_ATTACK_SECS, DEFAULT_VOX_RELEASE_SECS,
    DEFAULT_VOX_THRESHOLD,
};

/// CLI options for the repeater controller core.
#[derive(Debug, Parser, Clone)]
#[command(about = "Half-duplex repeater controller", author, version)]
pub struct AppConfig {
    /// Station callsign announced by auto-ID
    #[arg(long, default_value = DEFAULT_CALLSIGN)]
    pub callsign: String,

    /// Engine sample rate (Hz)
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Samples per frame
    #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Input gain applied before detection
    #[arg(long = "input-gain", default_value_t = DEFAULT_INPUT_GAIN)]
    pub input_gain: f32,

    /// Output gain applied before transmission
    #[arg(long = "output-gain", default_value_t = DEFAULT_OUTPUT_GAIN)]
    pub output_gain: f32,

    /// Recording mode
    #[arg(long, value_enum, default_value_t = RecordingMode::Repeater)]
    pub mode: RecordingMode,

    /// VOX threshold on the 0-100 level scale
    #[arg(long = "vox-threshold", default_value_t = DEFAULT_VOX_THRESHOLD)]
    pub vox_threshold: f32,

    /// VOX attack time (seconds)
    #[arg(long = "vox-attack-secs", default_value_t = DEFAULT_VOX_ATTACK_SECS)]
    pub vox_attack_secs: f32,

    /// VOX release time (seconds)
    #[arg(long = "vox-release-secs", default_value_t = DEFAULT_VOX_RELEASE_SECS)]
    pub vox_release_secs: f32,

    /// Disable DTMF command decoding
    #[arg(long = "no-dtmf", default_value_t = false)]
    pub no_dtmf: bool,

    /// DTMF Goertzel detection threshold
    #[arg(long = "dtmf-threshold", default_value_t = DEFAULT_DTMF_THRESHOLD)]
    pub dtmf_threshold: f32,

    /// Minimum tone duration before a digit is reported (milliseconds)
    #[arg(long = "dtmf-min-tone-ms", default_value_t = DEFAULT_DTMF_MIN_TONE_MS)]
    pub dtmf_min_tone_ms: u64,

    /// Tone absence before the last symbol is forgotten (milliseconds)
    #[arg(long = "dtmf-tone-timeout-ms", default_value_t = DEFAULT_DTMF_TONE_TIMEOUT_MS)]
    pub dtmf_tone_timeout_ms: u64,

    /// Idle time before the digit buffer expires (milliseconds)
    #[arg(long = "dtmf-digit-timeout-ms", default_value_t = DEFAULT_DTMF_DIGIT_TIMEOUT_MS)]
    pub dtmf_digit_timeout_ms: u64,

    /// Re-press debounce window (milliseconds)
    #[arg(long = "dtmf-debounce-ms", default_value_t = DEFAULT_DTMF_DEBOUNCE_MS)]
    pub dtmf_debounce_ms: u64,

    /// JSON file overriding the DTMF command table
    #[arg(long = "command-table")]
    pub command_table: Option<PathBuf>,

    /// Disable the courtesy tone
    #[arg(long = "no-courtesy-tone", default_value_t = false)]
    pub no_courtesy_tone: bool,

    /// Courtesy tone frequency (Hz)
    #[arg(long = "courtesy-freq", default_value_t = DEFAULT_COURTESY_FREQ_HZ)]
    pub courtesy_freq: f32,

    /// Courtesy tone duration (seconds)
    #[arg(long = "courtesy-duration-secs", default_value_t = DEFAULT_COURTESY_DURATION_SECS)]
    pub courtesy_duration_secs: f32,

    /// Courtesy tone volume (0-1)
    #[arg(long = "courtesy-volume", default_value_t = DEFAULT_COURTESY_VOLUME)]
    pub courtesy_volume: f32,

    /// Silence after transmission to drop the far VOX (seconds)
    #[arg(long = "tail-silence-secs", default_value_t = DEFAULT_TAIL_SILENCE_SECS)]
    pub tail_silence_secs: f32,

    /// Disable the feedback holdoff period
    #[arg(long = "no-feedback-protection", default_value_t = false)]
    pub no_feedback_protection: bool,

    /// Feedback holdoff duration (seconds)
    #[arg(long = "holdoff-secs", default_value_t = DEFAULT_HOLDOFF_SECS)]
    pub holdoff_secs: f32,

    /// VOX grace window after holdoff (seconds)
    #[arg(long = "grace-secs", default_value_t = DEFAULT_GRACE_SECS)]
    pub grace_secs: f32,

    /// Maximum continuous transmission (seconds)
    #[arg(long = "timeout-secs", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: f32,

    /// Disable periodic station identification
    #[arg(long = "no-auto-id", default_value_t = false)]
    pub no_auto_id: bool,

    /// Station ID interval (seconds)
    #[arg(long = "id-interval-secs", default_value_t = DEFAULT_ID_INTERVAL_SECS)]
    pub id_interval_secs: f32,

    /// Delay-line lag for continuous-delay mode (seconds)
    #[arg(long = "delay-secs", default_value_t = DEFAULT_DELAY_SECS)]
    pub delay_secs: f32,

    /// Delay-mode PTT lookahead (seconds)
    #[arg(long = "prekey-secs", default_value_t = DEFAULT_PREKEY_SECS)]
    pub prekey_secs: f32,

    /// Recording window for timed replay and manual capture (seconds)
    #[arg(long = "max-record-secs", default_value_t = DEFAULT_MAX_RECORD_SECS)]
    pub max_record_secs: f32,

    /// Silence prepended to announcements so the relay keys first (seconds)
    #[arg(long = "ptt-pre-delay-secs", default_value_t = DEFAULT_PTT_PRE_DELAY_SECS)]
    pub ptt_pre_delay_secs: f32,

    /// Serial device for the PTT relay
    #[arg(long = "relay-port")]
    pub relay_port: Option<String>,

    /// Relay serial baud rate
    #[arg(long = "relay-baud", default_value_t = DEFAULT_RELAY_BAUD)]
    pub relay_baud: u32,

    /// Relay wire protocol
    #[arg(long = "relay-protocol", value_enum, default_value_t = RelayProtocol::CommandBytes)]
    pub relay_protocol: RelayProtocol,

    /// Print host serial ports and exit
    #[arg(long = "list-serial-ports", default_value_t = false)]
    pub list_serial_ports: bool,

    /// Preferred audio input device name
    #[arg(long = "input-device")]
    pub input_device: Option<String>,

    /// Preferred audio output device name
    #[arg(long = "output-device")]
    pub output_device: Option<String>,

    /// Print detected audio devices and exit
    #[arg(long = "list-audio-devices", default_value_t = false)]
    pub list_audio_devices: bool,

    /// External TTS command emitting raw s16le PCM on stdout
    #[arg(long = "synth-command")]
    pub synth_command: Option<String>,

    /// Sample rate of the TTS command's output (Hz)
    #[arg(long = "synth-rate", default_value_t = DEFAULT_SYNTH_RATE)]
    pub synth_rate: u32,

    /// Weather announcement text (the weather feed is external)
    #[arg(long = "weather-text")]
    pub weather_text: Option<String>,

    /// Custom message slots, in order (repeatable, max 8)
    #[arg(long = "custom-message", action = ArgAction::Append, value_name = "TEXT")]
    pub custom_messages: Vec<String>,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "REPEATERBOX_LOGS", default_value_t = false)]
    pub logs: bool,
}

/// The four mutually exclusive per-frame behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordingMode {
    /// Live repeat gated by VOX, with the full phase sequence.
    Repeater,
    /// Constant-lag tape delay.
    ContinuousDelay,
    /// Record a window, replay it, repeat.
    TimedReplay,
    /// Operator-driven record and playback.
    Manual,
}

impl RecordingMode {
    pub fn label(self) -> &'static str {
        match self {
            RecordingMode::Repeater => "repeater",
            RecordingMode::ContinuousDelay => "continuous-delay",
            RecordingMode::TimedReplay => "timed-replay",
            RecordingMode::Manual => "manual",
        }
    }
}

/// Validated snapshot consumed read-only by the pipeline.
#[derive(Debug, Clone)]
pub struct RepeaterSettings {
    pub callsign: String,
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub input_gain: f32,
    pub output_gain: f32,
    pub mode: RecordingMode,
    pub vox_threshold: f32,
    pub vox_attack_secs: f32,
    pub vox_release_secs: f32,
    pub dtmf_enabled: bool,
    pub dtmf: DtmfConfig,
    pub courtesy_enabled: bool,
    pub courtesy_freq: f32,
    pub courtesy_duration_secs: f32,
    pub courtesy_volume: f32,
    pub tail_silence_secs: f32,
    pub feedback_protection: bool,
    pub holdoff_secs: f32,
    pub grace_secs: f32,
    pub timeout_secs: f32,
    pub auto_id_enabled: bool,
    pub id_interval_secs: f32,
    pub delay_secs: f32,
    pub prekey_secs: f32,
    pub max_record_secs: f32,
    pub ptt_pre_delay_secs: f32,
    pub weather_text: Option<String>,
    pub custom_messages: Vec<String>,
}

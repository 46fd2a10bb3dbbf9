//! Stock values for every tunable. These mirror the settings the controller
//! ships with in the field; the CLI overrides any of them.

pub const DEFAULT_CALLSIGN: &str = "WRKC123";

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_CHUNK_SIZE: usize = 1_024;

pub const DEFAULT_INPUT_GAIN: f32 = 1.0;
pub const DEFAULT_OUTPUT_GAIN: f32 = 1.0;

pub const DEFAULT_VOX_THRESHOLD: f32 = 5.0;
pub const DEFAULT_VOX_ATTACK_SECS: f32 = 0.1;
pub const DEFAULT_VOX_RELEASE_SECS: f32 = 0.5;

pub const DEFAULT_DTMF_THRESHOLD: f32 = 0.15;
pub const DEFAULT_DTMF_MIN_TONE_MS: u64 = 80;
pub const DEFAULT_DTMF_TONE_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_DTMF_DIGIT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_DTMF_DEBOUNCE_MS: u64 = 150;

pub const DEFAULT_COURTESY_FREQ_HZ: f32 = 1_000.0;
pub const DEFAULT_COURTESY_DURATION_SECS: f32 = 0.5;
pub const DEFAULT_COURTESY_VOLUME: f32 = 0.5;

pub const DEFAULT_TAIL_SILENCE_SECS: f32 = 0.5;
pub const DEFAULT_HOLDOFF_SECS: f32 = 1.5;
pub const DEFAULT_GRACE_SECS: f32 = 0.3;
pub const DEFAULT_TIMEOUT_SECS: f32 = 180.0;

pub const DEFAULT_ID_INTERVAL_SECS: f32 = 600.0;

pub const DEFAULT_DELAY_SECS: f32 = 2.0;
pub const DEFAULT_PREKEY_SECS: f32 = 0.5;
pub const DEFAULT_MAX_RECORD_SECS: f32 = 30.0;
pub const DEFAULT_PTT_PRE_DELAY_SECS: f32 = 1.0;

pub const DEFAULT_RELAY_BAUD: u32 = 9_600;

/// Rate the external synthesizer command is assumed to emit PCM at.
pub const DEFAULT_SYNTH_RATE: u32 = 22_050;

pub const DEFAULT_ANNOUNCE_QUEUE_DEPTH: usize = 4;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 96_000;
pub const MIN_CHUNK_SIZE: usize = 64;
pub const MAX_CHUNK_SIZE: usize = 8_192;

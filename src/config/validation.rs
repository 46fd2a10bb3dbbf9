use anyhow::{bail, Result};
use clap::Parser;

use super::defaults::{MAX_CHUNK_SIZE, MAX_SAMPLE_RATE, MIN_CHUNK_SIZE, MIN_SAMPLE_RATE};
use super::{AppConfig, RepeaterSettings};
use crate::audio::dtmf::DtmfConfig;
use crate::commands::CUSTOM_SLOTS;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Range-check every numeric knob and normalize the callsign. Invalid
    /// values are rejected here so the core never sees them.
    pub fn validate(&mut self) -> Result<()> {
        self.callsign = self.callsign.trim().to_ascii_uppercase();
        if self.callsign.is_empty() {
            bail!("--callsign must not be empty");
        }
        if !self
            .callsign
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '/')
        {
            bail!("--callsign may only contain letters, digits, and '/'");
        }

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be between {MIN_SAMPLE_RATE} and {MAX_SAMPLE_RATE} Hz, got {}",
                self.sample_rate
            );
        }
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            bail!(
                "--chunk-size must be between {MIN_CHUNK_SIZE} and {MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            );
        }
        if !(0.0..=10.0).contains(&self.input_gain) {
            bail!("--input-gain must be between 0.0 and 10.0, got {}", self.input_gain);
        }
        if !(0.0..=10.0).contains(&self.output_gain) {
            bail!("--output-gain must be between 0.0 and 10.0, got {}", self.output_gain);
        }

        if !(0.0..=100.0).contains(&self.vox_threshold) {
            bail!(
                "--vox-threshold must be between 0.0 and 100.0, got {}",
                self.vox_threshold
            );
        }
        if !(0.0..=10.0).contains(&self.vox_attack_secs) {
            bail!("--vox-attack-secs must be between 0.0 and 10.0");
        }
        if !(0.0..=30.0).contains(&self.vox_release_secs) {
            bail!("--vox-release-secs must be between 0.0 and 30.0");
        }

        if self.dtmf_threshold <= 0.0 {
            bail!(
                "--dtmf-threshold must be positive, got {}",
                self.dtmf_threshold
            );
        }
        if !(10..=1_000).contains(&self.dtmf_min_tone_ms) {
            bail!("--dtmf-min-tone-ms must be between 10 and 1000");
        }
        if !(50..=5_000).contains(&self.dtmf_tone_timeout_ms) {
            bail!("--dtmf-tone-timeout-ms must be between 50 and 5000");
        }
        if !(500..=60_000).contains(&self.dtmf_digit_timeout_ms) {
            bail!("--dtmf-digit-timeout-ms must be between 500 and 60000");
        }
        if !(10..=2_000).contains(&self.dtmf_debounce_ms) {
            bail!("--dtmf-debounce-ms must be between 10 and 2000");
        }

        if !(50.0..=5_000.0).contains(&self.courtesy_freq) {
            bail!(
                "--courtesy-freq must be between 50 and 5000 Hz, got {}",
                self.courtesy_freq
            );
        }
        if !(0.05..=5.0).contains(&self.courtesy_duration_secs) {
            bail!("--courtesy-duration-secs must be between 0.05 and 5.0");
        }
        if !(0.0..=1.0).contains(&self.courtesy_volume) {
            bail!("--courtesy-volume must be between 0.0 and 1.0");
        }

        if !(0.0..=10.0).contains(&self.tail_silence_secs) {
            bail!("--tail-silence-secs must be between 0.0 and 10.0");
        }
        if !(0.0..=30.0).contains(&self.holdoff_secs) {
            bail!("--holdoff-secs must be between 0.0 and 30.0");
        }
        if !(0.0..=5.0).contains(&self.grace_secs) {
            bail!("--grace-secs must be between 0.0 and 5.0");
        }
        if !(10.0..=3_600.0).contains(&self.timeout_secs) {
            bail!(
                "--timeout-secs must be between 10 and 3600 seconds, got {}",
                self.timeout_secs
            );
        }
        if !(10.0..=7_200.0).contains(&self.id_interval_secs) {
            bail!("--id-interval-secs must be between 10 and 7200");
        }

        if !(0.1..=30.0).contains(&self.delay_secs) {
            bail!("--delay-secs must be between 0.1 and 30.0, got {}", self.delay_secs);
        }
        if !(0.0..=10.0).contains(&self.prekey_secs) {
            bail!("--prekey-secs must be between 0.0 and 10.0");
        }
        if self.prekey_secs > self.delay_secs {
            bail!(
                "--prekey-secs ({}) cannot exceed --delay-secs ({})",
                self.prekey_secs,
                self.delay_secs
            );
        }
        if !(1.0..=300.0).contains(&self.max_record_secs) {
            bail!("--max-record-secs must be between 1 and 300");
        }
        if !(0.0..=10.0).contains(&self.ptt_pre_delay_secs) {
            bail!("--ptt-pre-delay-secs must be between 0.0 and 10.0");
        }

        if !(1_200..=1_000_000).contains(&self.relay_baud) {
            bail!("--relay-baud must be between 1200 and 1000000, got {}", self.relay_baud);
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.synth_rate) {
            bail!("--synth-rate must be between {MIN_SAMPLE_RATE} and {MAX_SAMPLE_RATE} Hz");
        }
        if let Some(command) = &self.synth_command {
            if command.trim().is_empty() {
                bail!("--synth-command must not be empty");
            }
        }

        if self.custom_messages.len() > CUSTOM_SLOTS {
            bail!(
                "--custom-message repeated too many times (max {CUSTOM_SLOTS}, got {})",
                self.custom_messages.len()
            );
        }

        if let Some(table) = &self.command_table {
            if !table.exists() {
                bail!("command table '{}' does not exist", table.display());
            }
        }

        Ok(())
    }

    /// Snapshot the validated values for the core.
    pub fn settings(&self) -> RepeaterSettings {
        RepeaterSettings {
            callsign: self.callsign.clone(),
            sample_rate: self.sample_rate,
            chunk_size: self.chunk_size,
            input_gain: self.input_gain,
            output_gain: self.output_gain,
            mode: self.mode,
            vox_threshold: self.vox_threshold,
            vox_attack_secs: self.vox_attack_secs,
            vox_release_secs: self.vox_release_secs,
            dtmf_enabled: !self.no_dtmf,
            dtmf: DtmfConfig {
                sample_rate: self.sample_rate,
                detection_threshold: self.dtmf_threshold,
                min_tone_secs: self.dtmf_min_tone_ms as f32 / 1_000.0,
                tone_timeout_secs: self.dtmf_tone_timeout_ms as f32 / 1_000.0,
                digit_timeout_secs: self.dtmf_digit_timeout_ms as f32 / 1_000.0,
                repress_debounce_secs: self.dtmf_debounce_ms as f32 / 1_000.0,
            },
            courtesy_enabled: !self.no_courtesy_tone,
            courtesy_freq: self.courtesy_freq,
            courtesy_duration_secs: self.courtesy_duration_secs,
            courtesy_volume: self.courtesy_volume,
            tail_silence_secs: self.tail_silence_secs,
            feedback_protection: !self.no_feedback_protection,
            holdoff_secs: self.holdoff_secs,
            grace_secs: self.grace_secs,
            timeout_secs: self.timeout_secs,
            auto_id_enabled: !self.no_auto_id,
            id_interval_secs: self.id_interval_secs,
            delay_secs: self.delay_secs,
            prekey_secs: self.prekey_secs,
            max_record_secs: self.max_record_secs,
            ptt_pre_delay_secs: self.ptt_pre_delay_secs,
            weather_text: self.weather_text.clone(),
            custom_messages: self.custom_messages.clone(),
        }
    }
}

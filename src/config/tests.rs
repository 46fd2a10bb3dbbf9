use clap::Parser;

use super::{AppConfig, RecordingMode};

fn parse(args: &[&str]) -> AppConfig {
    let mut argv = vec!["repeaterbox"];
    argv.extend_from_slice(args);
    AppConfig::parse_from(argv)
}

#[test]
fn defaults_validate_cleanly() {
    let mut config = parse(&[]);
    config.validate().expect("default config should validate");
    let settings = config.settings();
    assert_eq!(settings.callsign, "WRKC123");
    assert_eq!(settings.sample_rate, 44_100);
    assert_eq!(settings.chunk_size, 1_024);
    assert_eq!(settings.mode, RecordingMode::Repeater);
    assert!(settings.dtmf_enabled);
    assert!(settings.courtesy_enabled);
    assert!(settings.feedback_protection);
    assert!(settings.auto_id_enabled);
}

#[test]
fn callsign_is_uppercased() {
    let mut config = parse(&["--callsign", "w1aw/r"]);
    config.validate().unwrap();
    assert_eq!(config.callsign, "W1AW/R");
}

#[test]
fn empty_callsign_is_rejected() {
    let mut config = parse(&["--callsign", "   "]);
    assert!(config.validate().is_err());
}

#[test]
fn out_of_range_sample_rate_is_rejected() {
    let mut config = parse(&["--sample-rate", "4000"]);
    assert!(config.validate().is_err());
    let mut config = parse(&["--sample-rate", "200000"]);
    assert!(config.validate().is_err());
}

#[test]
fn out_of_range_vox_threshold_is_rejected() {
    let mut config = parse(&["--vox-threshold", "150"]);
    assert!(config.validate().is_err());
}

#[test]
fn negative_dtmf_threshold_is_rejected() {
    // The `=` form carries the leading hyphen through clap so the value
    // reaches validate(), and try_parse keeps a parse error from aborting
    // the test binary.
    let mut config = AppConfig::try_parse_from(["repeaterbox", "--dtmf-threshold=-0.5"])
        .expect("negative value should parse");
    assert!(config.validate().is_err());
}

#[test]
fn timeout_below_floor_is_rejected() {
    let mut config = parse(&["--timeout-secs", "5"]);
    assert!(config.validate().is_err());
}

#[test]
fn dtmf_millis_convert_to_seconds() {
    let mut config = parse(&["--dtmf-debounce-ms", "250"]);
    config.validate().unwrap();
    let settings = config.settings();
    assert!((settings.dtmf.repress_debounce_secs - 0.25).abs() < 1e-6);
    assert!((settings.dtmf.min_tone_secs - 0.08).abs() < 1e-6);
}

#[test]
fn disable_flags_invert_into_settings() {
    let mut config = parse(&[
        "--no-dtmf",
        "--no-courtesy-tone",
        "--no-feedback-protection",
        "--no-auto-id",
    ]);
    config.validate().unwrap();
    let settings = config.settings();
    assert!(!settings.dtmf_enabled);
    assert!(!settings.courtesy_enabled);
    assert!(!settings.feedback_protection);
    assert!(!settings.auto_id_enabled);
}

#[test]
fn too_many_custom_messages_are_rejected() {
    let mut args = Vec::new();
    for _ in 0..9 {
        args.push("--custom-message");
        args.push("hello");
    }
    let mut config = parse(&args);
    assert!(config.validate().is_err());
}

#[test]
fn mode_parses_kebab_case() {
    let config = parse(&["--mode", "continuous-delay"]);
    assert_eq!(config.mode, RecordingMode::ContinuousDelay);
    let config = parse(&["--mode", "timed-replay"]);
    assert_eq!(config.mode, RecordingMode::TimedReplay);
}

#[test]
fn missing_command_table_is_rejected() {
    let mut config = parse(&["--command-table", "/nonexistent/table.json"]);
    assert!(config.validate().is_err());
}

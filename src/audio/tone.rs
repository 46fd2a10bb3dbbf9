//! Tone and silence synthesis for courtesy beeps and pre-key lead-ins.

use std::f32::consts::PI;

/// Linear fade applied to both ends of every tone to avoid clicks.
const FADE_SECONDS: f32 = 0.01;

/// Pre-key lead-in parameters. Radio VOX circuits need a few hundred
/// milliseconds to open fully; a 500 ms tone avoids clipped first syllables.
const PREKEY_FREQ_HZ: f32 = 1_500.0;
const PREKEY_SECONDS: f32 = 0.5;
const PREKEY_VOLUME: f32 = 0.45;

/// An enveloped sine tone at the given frequency, duration, and volume (0-1).
pub fn sine_tone(sample_rate: u32, freq: f32, duration: f32, volume: f32) -> Vec<i16> {
    let total = (sample_rate as f32 * duration.max(0.0)) as usize;
    let fade = ((sample_rate as f32 * FADE_SECONDS) as usize).min(total / 2);
    let volume = volume.clamp(0.0, 1.0);
    let mut samples = Vec::with_capacity(total);
    for n in 0..total {
        let t = n as f32 / sample_rate as f32;
        let mut amp = (2.0 * PI * freq * t).sin() * volume;
        if fade > 0 {
            if n < fade {
                amp *= n as f32 / fade as f32;
            } else if n >= total - fade {
                // Ends exactly at zero so playback cannot click.
                amp *= (total - 1 - n) as f32 / fade as f32;
            }
        }
        samples.push((amp * 32_767.0) as i16);
    }
    samples
}

/// Lead-in tone played before announcements and replays to wake the far
/// radio's VOX.
pub fn prekey_tone(sample_rate: u32) -> Vec<i16> {
    sine_tone(sample_rate, PREKEY_FREQ_HZ, PREKEY_SECONDS, PREKEY_VOLUME)
}

/// A run of silence with the given duration.
pub fn silence(sample_rate: u32, duration: f32) -> Vec<i16> {
    vec![0i16; (sample_rate as f32 * duration.max(0.0)) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_has_expected_length() {
        let tone = sine_tone(44_100, 1_000.0, 0.5, 0.5);
        assert_eq!(tone.len(), 22_050);
    }

    #[test]
    fn tone_fades_in_and_out() {
        let tone = sine_tone(44_100, 1_000.0, 0.5, 1.0);
        let fade = (44_100.0 * FADE_SECONDS) as usize;
        let head_peak = tone[..fade / 4].iter().map(|s| s.abs()).max().unwrap();
        let body_peak = tone[fade * 2..fade * 10].iter().map(|s| s.abs()).max().unwrap();
        assert!(head_peak < body_peak / 2, "fade-in missing: head={head_peak} body={body_peak}");
        assert_eq!(tone.first().copied(), Some(0));
        assert_eq!(tone.last().map(|s| s.abs()), Some(0));
    }

    #[test]
    fn volume_scales_peak() {
        let loud = sine_tone(8_000, 440.0, 0.2, 1.0);
        let quiet = sine_tone(8_000, 440.0, 0.2, 0.25);
        let loud_peak = loud.iter().map(|s| s.abs()).max().unwrap();
        let quiet_peak = quiet.iter().map(|s| s.abs()).max().unwrap();
        assert!(quiet_peak < loud_peak / 2);
    }

    #[test]
    fn silence_is_zeroed() {
        let out = silence(44_100, 0.5);
        assert_eq!(out.len(), 22_050);
        assert!(out.iter().all(|s| *s == 0));
    }
}

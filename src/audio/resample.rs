//! Sample-rate conversion for announcement clip ingestion.
//!
//! Synthesizers and recorded clips do not always arrive at the engine rate.
//! This path runs off the real-time thread, so a linear interpolator with an
//! anti-aliasing FIR when decimating is plenty for speech clips.

use std::f32::consts::PI;

const MIN_SOURCE_RATE: u32 = 2_000;
const MAX_SOURCE_RATE: u32 = 192_000;
const MAX_DECIMATION_TAPS: usize = 129;

/// Convert an i16 clip from `source_rate` to `target_rate`.
pub fn resample_clip(input: &[i16], source_rate: u32, target_rate: u32) -> Vec<i16> {
    if input.is_empty() || source_rate == target_rate {
        return input.to_vec();
    }
    if source_rate == 0
        || target_rate == 0
        || !(MIN_SOURCE_RATE..=MAX_SOURCE_RATE).contains(&source_rate)
    {
        return input.to_vec();
    }

    let as_f32: Vec<f32> = input.iter().map(|s| *s as f32 / 32_768.0).collect();
    let ratio = target_rate as f32 / source_rate as f32;
    let filtered = if source_rate > target_rate {
        // Decimation needs a low-pass first or high speech content aliases.
        let taps = decimation_tap_count(source_rate, target_rate);
        low_pass_fir(&as_f32, source_rate, target_rate, taps)
    } else {
        as_f32
    };
    resample_linear(&filtered, ratio)
        .into_iter()
        .map(|s| (s * 32_767.0).clamp(-32_768.0, 32_767.0) as i16)
        .collect()
}

fn resample_linear(input: &[f32], ratio: f32) -> Vec<f32> {
    let output_len = (input.len() as f32 * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_idx = i as f32 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = src_idx - idx as f32;
        if idx + 1 < input.len() {
            output.push(input[idx] * (1.0 - frac) + input[idx + 1] * frac);
        } else {
            output.push(input.last().copied().unwrap_or(0.0));
        }
    }
    output
}

/// Short taps for near-equal rates, longer when collapsing 48 kHz speech down
/// to a low engine rate.
fn decimation_tap_count(source_rate: u32, target_rate: u32) -> usize {
    let decimation_ratio = source_rate as f32 / target_rate as f32;
    let mut taps = (decimation_ratio * 4.0).ceil().max(11.0) as usize;
    if taps % 2 == 0 {
        taps += 1;
    }
    taps.min(MAX_DECIMATION_TAPS)
}

fn low_pass_fir(input: &[f32], source_rate: u32, target_rate: u32, taps: usize) -> Vec<f32> {
    if input.is_empty() || taps <= 1 {
        return input.to_vec();
    }
    let normalized_cutoff = (target_rate as f32 * 0.5 / source_rate as f32).min(0.499);
    let coeffs = design_low_pass(normalized_cutoff, taps);
    let half = taps / 2;
    let mut output = Vec::with_capacity(input.len());
    for n in 0..input.len() {
        let mut acc = 0.0;
        for (k, coeff) in coeffs.iter().enumerate() {
            if let Some(idx) = n.checked_add(k).and_then(|sum| sum.checked_sub(half)) {
                if let Some(sample) = input.get(idx) {
                    acc += *sample * coeff;
                }
            }
        }
        output.push(acc);
    }
    output
}

/// Normalized Hamming-windowed sinc taps.
fn design_low_pass(normalized_cutoff: f32, taps: usize) -> Vec<f32> {
    let mut coeffs = Vec::with_capacity(taps);
    let m = (taps - 1) as f32;
    for n in 0..taps {
        let centered = n as f32 - m / 2.0;
        let x = 2.0 * PI * normalized_cutoff * centered;
        let sinc = if centered == 0.0 {
            2.0 * normalized_cutoff
        } else {
            (2.0 * normalized_cutoff * x.sin()) / x
        };
        let window = if taps <= 1 {
            1.0
        } else {
            0.54 - 0.46 * ((2.0 * PI * n as f32) / m).cos()
        };
        coeffs.push(sinc * window);
    }
    let sum: f32 = coeffs.iter().sum();
    if sum != 0.0 {
        for coeff in coeffs.iter_mut() {
            *coeff /= sum;
        }
    }
    coeffs
}

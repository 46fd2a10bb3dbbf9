//! DTMF keypad decoding and command assembly.
//!
//! Each frame is appended to a short rolling buffer; the most recent ~50 ms
//! window is probed with the Goertzel estimator at the two defining
//! frequencies of every keypad symbol. A symbol counts as present only when
//! the weaker of its two tones clears the detection threshold, and the
//! strongest such candidate wins. Detected symbols feed a digit buffer with
//! `*` = clear, `#` = flush, and a re-press debounce so held keys register
//! once.
//!
//! All tuning values here were arrived at empirically against consumer radio
//! audio, so they live in [`DtmfConfig`] rather than as constants.

use std::collections::VecDeque;

/// The 16 keypad symbols with their low/high tone pairs in Hz.
const DTMF_SYMBOLS: [(char, f32, f32); 16] = [
    ('1', 697.0, 1209.0),
    ('2', 697.0, 1336.0),
    ('3', 697.0, 1477.0),
    ('A', 697.0, 1633.0),
    ('4', 770.0, 1209.0),
    ('5', 770.0, 1336.0),
    ('6', 770.0, 1477.0),
    ('B', 770.0, 1633.0),
    ('7', 852.0, 1209.0),
    ('8', 852.0, 1336.0),
    ('9', 852.0, 1477.0),
    ('C', 852.0, 1633.0),
    ('*', 941.0, 1209.0),
    ('0', 941.0, 1336.0),
    ('#', 941.0, 1477.0),
    ('D', 941.0, 1633.0),
];

/// Number of digits consumed per command extraction.
pub const COMMAND_DIGITS: usize = 4;

/// Rolling buffer length and analysis window, as fractions of a second.
const BUFFER_SECS: f32 = 0.1;
const WINDOW_SECS: f32 = 0.05;

/// Tunable decoder parameters. Defaults match field-tuned values.
#[derive(Debug, Clone)]
pub struct DtmfConfig {
    pub sample_rate: u32,
    /// Minimum min-of-pair Goertzel magnitude for a symbol to be a candidate.
    pub detection_threshold: f32,
    /// A symbol must persist this long before it is reported.
    pub min_tone_secs: f32,
    /// Silence longer than this forgets the last-seen symbol.
    pub tone_timeout_secs: f32,
    /// An idle digit buffer expires after this long.
    pub digit_timeout_secs: f32,
    /// Repeats of the same digit inside this window are a held key.
    pub repress_debounce_secs: f32,
}

impl Default for DtmfConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            detection_threshold: 0.15,
            min_tone_secs: 0.08,
            tone_timeout_secs: 0.5,
            digit_timeout_secs: 5.0,
            repress_debounce_secs: 0.15,
        }
    }
}

#[derive(Debug)]
pub struct DtmfDecoder {
    cfg: DtmfConfig,
    rolling: VecDeque<f32>,
    buffer_cap: usize,
    window: usize,
    last_tone: Option<char>,
    press_started_at: f64,
    last_seen_at: f64,
    reported: bool,
    digits: String,
    last_digit_at: f64,
}

impl DtmfDecoder {
    pub fn new(cfg: DtmfConfig) -> Self {
        let buffer_cap = ((cfg.sample_rate as f32 * BUFFER_SECS) as usize).max(1);
        let window = ((cfg.sample_rate as f32 * WINDOW_SECS) as usize).max(1);
        Self {
            cfg,
            rolling: VecDeque::with_capacity(buffer_cap),
            buffer_cap,
            window,
            last_tone: None,
            press_started_at: 0.0,
            last_seen_at: 0.0,
            reported: false,
            digits: String::new(),
            last_digit_at: 0.0,
        }
    }

    /// Feed one frame and return a symbol at most once per keypress.
    ///
    /// `now` is the pipeline's sample clock in seconds; using it instead of
    /// wall time keeps debounce behavior deterministic.
    pub fn feed(&mut self, frame: &[i16], now: f64) -> Option<char> {
        for sample in frame {
            self.rolling.push_back(*sample as f32 / 32_768.0);
        }
        while self.rolling.len() > self.buffer_cap {
            self.rolling.pop_front();
        }
        if self.rolling.len() < self.window {
            return None;
        }

        let start = self.rolling.len() - self.window;
        let window: Vec<f32> = self.rolling.iter().skip(start).copied().collect();

        let mut best: Option<(char, f32)> = None;
        for (symbol, low, high) in DTMF_SYMBOLS {
            let low_mag = goertzel(&window, self.cfg.sample_rate, low);
            let high_mag = goertzel(&window, self.cfg.sample_rate, high);
            let magnitude = low_mag.min(high_mag);
            if magnitude > self.cfg.detection_threshold
                && best.map(|(_, m)| magnitude > m).unwrap_or(true)
            {
                best = Some((symbol, magnitude));
            }
        }

        match best {
            Some((symbol, _)) => {
                if self.last_tone == Some(symbol) {
                    self.last_seen_at = now;
                    if !self.reported
                        && now - self.press_started_at >= self.cfg.min_tone_secs as f64
                    {
                        self.reported = true;
                        return Some(symbol);
                    }
                } else {
                    self.last_tone = Some(symbol);
                    self.press_started_at = now;
                    self.last_seen_at = now;
                    self.reported = false;
                }
            }
            None => {
                if now - self.last_seen_at > self.cfg.tone_timeout_secs as f64 {
                    self.last_tone = None;
                    self.reported = false;
                }
            }
        }
        None
    }

    /// Apply a detected symbol to the digit buffer.
    ///
    /// Returns `Some` when `#` flushes a non-empty buffer as an immediate
    /// command; ordinary digits accumulate and are extracted with
    /// [`take_command`](Self::take_command).
    pub fn push_digit(&mut self, digit: char, now: f64) -> Option<String> {
        if !self.digits.is_empty()
            && now - self.last_digit_at > self.cfg.digit_timeout_secs as f64
        {
            tracing::debug!(stale = %self.digits, "dtmf digit buffer expired");
            self.digits.clear();
        }

        match digit {
            '*' => {
                self.digits.clear();
                None
            }
            '#' => {
                if self.digits.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut self.digits))
                }
            }
            '0'..='9' => {
                let held = self.digits.ends_with(digit)
                    && now - self.last_digit_at <= self.cfg.repress_debounce_secs as f64;
                if !held {
                    self.digits.push(digit);
                    self.last_digit_at = now;
                }
                None
            }
            // A-D carry no command meaning here.
            _ => None,
        }
    }

    /// Extract a 4-digit command if one is ready, leaving any remainder.
    pub fn take_command(&mut self) -> Option<String> {
        if self.digits.len() < COMMAND_DIGITS {
            return None;
        }
        let rest = self.digits.split_off(COMMAND_DIGITS);
        Some(std::mem::replace(&mut self.digits, rest))
    }

    pub fn pending_digits(&self) -> &str {
        &self.digits
    }

    pub fn reset(&mut self) {
        self.rolling.clear();
        self.digits.clear();
        self.last_tone = None;
        self.reported = false;
        self.press_started_at = 0.0;
        self.last_seen_at = 0.0;
        self.last_digit_at = 0.0;
    }
}

/// Goertzel single-bin magnitude for `freq` over `samples`.
pub fn goertzel(samples: &[f32], sample_rate: u32, freq: f32) -> f32 {
    let n = samples.len();
    if n == 0 {
        return 0.0;
    }
    let k = (0.5 + n as f32 * freq / sample_rate as f32).floor();
    let omega = 2.0 * std::f32::consts::PI * k / n as f32;
    let coeff = 2.0 * omega.cos();
    let mut q1 = 0.0f32;
    let mut q2 = 0.0f32;
    for sample in samples {
        let q0 = coeff * q1 - q2 + sample;
        q2 = q1;
        q1 = q0;
    }
    (q1 * q1 + q2 * q2 - q1 * q2 * coeff).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> DtmfDecoder {
        DtmfDecoder::new(DtmfConfig::default())
    }

    #[test]
    fn repress_within_debounce_is_a_held_key() {
        let mut dec = decoder();
        dec.push_digit('5', 1.00);
        dec.push_digit('5', 1.10);
        assert_eq!(dec.pending_digits(), "5");
    }

    #[test]
    fn repress_after_debounce_is_a_new_press() {
        let mut dec = decoder();
        dec.push_digit('5', 1.00);
        dec.push_digit('5', 1.30);
        assert_eq!(dec.pending_digits(), "55");
    }

    #[test]
    fn different_digit_is_never_debounced() {
        let mut dec = decoder();
        dec.push_digit('5', 1.00);
        dec.push_digit('6', 1.01);
        assert_eq!(dec.pending_digits(), "56");
    }

    #[test]
    fn extraction_consumes_exactly_four_digits() {
        let mut dec = decoder();
        for (i, d) in ['0', '0', '0', '1'].iter().enumerate() {
            dec.push_digit(*d, 1.0 + i as f64);
        }
        assert_eq!(dec.take_command().as_deref(), Some("0001"));
        assert_eq!(dec.pending_digits(), "");
        assert_eq!(dec.take_command(), None);
    }

    #[test]
    fn eight_digits_yield_two_commands_in_order() {
        let mut dec = decoder();
        for (i, d) in ['0', '0', '0', '1', '0', '0', '0', '2'].iter().enumerate() {
            dec.push_digit(*d, 1.0 + i as f64);
        }
        assert_eq!(dec.take_command().as_deref(), Some("0001"));
        assert_eq!(dec.pending_digits(), "0002");
        assert_eq!(dec.take_command().as_deref(), Some("0002"));
    }

    #[test]
    fn star_clears_whatever_is_pending() {
        let mut dec = decoder();
        dec.push_digit('1', 1.0);
        dec.push_digit('2', 2.0);
        dec.push_digit('*', 3.0);
        assert_eq!(dec.pending_digits(), "");
    }

    #[test]
    fn hash_flushes_short_buffer_as_command() {
        let mut dec = decoder();
        dec.push_digit('4', 1.0);
        dec.push_digit('2', 2.0);
        assert_eq!(dec.push_digit('#', 3.0).as_deref(), Some("42"));
        assert_eq!(dec.pending_digits(), "");
    }

    #[test]
    fn hash_on_empty_buffer_flushes_nothing() {
        let mut dec = decoder();
        assert_eq!(dec.push_digit('#', 1.0), None);
    }

    #[test]
    fn idle_buffer_expires_before_next_digit() {
        let mut dec = decoder();
        dec.push_digit('1', 1.0);
        dec.push_digit('2', 10.0);
        assert_eq!(dec.pending_digits(), "2");
    }

    #[test]
    fn letter_symbols_are_ignored() {
        let mut dec = decoder();
        dec.push_digit('A', 1.0);
        dec.push_digit('D', 2.0);
        assert_eq!(dec.pending_digits(), "");
    }
}

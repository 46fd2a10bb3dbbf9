//! Voice-operated switch (VOX) with attack/release hysteresis.
//!
//! Converts the per-frame audio level into a debounced "carrier present"
//! signal. Hysteresis counters keep brief spikes and dips from chattering the
//! transmitter.

/// Configuration for the VOX detector, expressed in frames.
#[derive(Debug, Clone)]
pub struct VoxConfig {
    /// Level (0-100) a frame must exceed to count toward attack.
    pub threshold: f32,
    /// Consecutive frames above threshold before activating.
    pub attack_frames: u32,
    /// Consecutive frames at or below threshold before releasing.
    pub release_frames: u32,
}

impl VoxConfig {
    /// Derive frame counts from attack/release times in seconds.
    pub fn from_times(
        threshold: f32,
        attack_secs: f32,
        release_secs: f32,
        sample_rate: u32,
        chunk_size: usize,
    ) -> Self {
        let frames = |secs: f32| -> u32 {
            ((secs * sample_rate as f32 / chunk_size as f32).round() as u32).max(1)
        };
        Self {
            threshold,
            attack_frames: frames(attack_secs),
            release_frames: frames(release_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VoxDetector {
    cfg: VoxConfig,
    is_active: bool,
    consecutive_high: u32,
    consecutive_low: u32,
}

impl VoxDetector {
    pub fn new(cfg: VoxConfig) -> Self {
        Self {
            cfg,
            is_active: false,
            consecutive_high: 0,
            consecutive_low: 0,
        }
    }

    /// Feed one frame's level and return the updated activity state.
    pub fn process(&mut self, level: f32) -> bool {
        if level > self.cfg.threshold {
            self.consecutive_high += 1;
            self.consecutive_low = 0;
            if self.consecutive_high >= self.cfg.attack_frames {
                self.is_active = true;
            }
        } else {
            self.consecutive_low += 1;
            self.consecutive_high = 0;
            if self.consecutive_low >= self.cfg.release_frames {
                self.is_active = false;
            }
        }
        self.is_active
    }

    /// Drop the active state and both counters immediately. Used while the
    /// system is producing its own output so the loopback cannot re-trigger
    /// detection, and during the post-announcement grace window.
    pub fn force_inactive(&mut self) {
        self.is_active = false;
        self.consecutive_high = 0;
        self.consecutive_low = 0;
    }

    pub fn reset(&mut self) {
        self.force_inactive();
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(attack: u32, release: u32) -> VoxDetector {
        VoxDetector::new(VoxConfig {
            threshold: 5.0,
            attack_frames: attack,
            release_frames: release,
        })
    }

    #[test]
    fn stays_inactive_below_attack_count() {
        let mut vox = detector(4, 4);
        for _ in 0..3 {
            assert!(!vox.process(10.0));
        }
    }

    #[test]
    fn activates_exactly_at_attack_count() {
        let mut vox = detector(4, 4);
        assert!(!vox.process(10.0));
        assert!(!vox.process(10.0));
        assert!(!vox.process(10.0));
        assert!(vox.process(10.0));
    }

    #[test]
    fn releases_exactly_at_release_count() {
        let mut vox = detector(1, 3);
        assert!(vox.process(10.0));
        assert!(vox.process(2.0));
        assert!(vox.process(2.0));
        assert!(!vox.process(2.0));
    }

    #[test]
    fn dips_reset_attack_counter() {
        let mut vox = detector(3, 3);
        vox.process(10.0);
        vox.process(10.0);
        vox.process(1.0);
        vox.process(10.0);
        vox.process(10.0);
        assert!(!vox.is_active());
        assert!(vox.process(10.0));
    }

    #[test]
    fn level_equal_to_threshold_counts_as_low() {
        let mut vox = detector(1, 2);
        assert!(vox.process(10.0));
        vox.process(5.0);
        assert!(!vox.process(5.0));
    }

    #[test]
    fn force_inactive_clears_counters() {
        let mut vox = detector(2, 2);
        vox.process(10.0);
        vox.process(10.0);
        assert!(vox.is_active());
        vox.force_inactive();
        assert!(!vox.is_active());
        // One frame is not enough to reactivate after the forced drop.
        assert!(!vox.process(10.0));
        assert!(vox.process(10.0));
    }

    #[test]
    fn from_times_rounds_to_frames() {
        let cfg = VoxConfig::from_times(5.0, 0.1, 0.5, 44_100, 1_024);
        assert_eq!(cfg.attack_frames, 4);
        assert_eq!(cfg.release_frames, 22);
    }

    #[test]
    fn from_times_never_yields_zero_frames() {
        let cfg = VoxConfig::from_times(5.0, 0.0, 0.0, 44_100, 1_024);
        assert_eq!(cfg.attack_frames, 1);
        assert_eq!(cfg.release_frames, 1);
    }
}

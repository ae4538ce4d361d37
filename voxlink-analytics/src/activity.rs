//! Audio activity detection
//!
//! Level-threshold voice activity detection and dropout detection.
//! Detectors take explicit timestamps so behavior is deterministic and
//! independent of the wall clock.

/// Voice activity detection parameters
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Level above which a sample counts as active (0.0 to 1.0 scale)
    pub threshold: f32,
    /// Minimum contiguous active run before activity is reported
    pub min_duration_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            min_duration_ms: 100,
        }
    }
}

/// Transition reported by a [`VadDetector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    /// A qualified speech run began
    Started {
        /// Timestamp at which the run started
        at_ms: u64,
    },
    /// A previously reported speech run ended
    Stopped {
        /// Length of the run in milliseconds
        duration_ms: u64,
    },
}

/// Per-party voice activity detector
///
/// A run must stay above the threshold for the configured minimum
/// duration before it is reported; shorter blips are discarded
/// silently.
#[derive(Debug)]
pub struct VadDetector {
    config: VadConfig,
    run_started: Option<u64>,
    reported: bool,
}

impl VadDetector {
    /// Create a detector with the given parameters
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            run_started: None,
            reported: false,
        }
    }

    /// Feed one level sample; returns at most one transition
    pub fn process(&mut self, level: f32, now_ms: u64) -> Option<VadTransition> {
        if level > self.config.threshold {
            let started = *self.run_started.get_or_insert(now_ms);
            if !self.reported && now_ms.saturating_sub(started) >= self.config.min_duration_ms {
                self.reported = true;
                return Some(VadTransition::Started { at_ms: started });
            }
            None
        } else {
            let result = match (self.run_started, self.reported) {
                (Some(started), true) => Some(VadTransition::Stopped {
                    duration_ms: now_ms.saturating_sub(started),
                }),
                _ => None,
            };
            self.run_started = None;
            self.reported = false;
            result
        }
    }

    /// Whether a qualified run is currently in progress
    pub fn is_active(&self) -> bool {
        self.reported
    }
}

/// Dropout detection parameters
#[derive(Debug, Clone)]
pub struct DropoutConfig {
    /// Speech level that arms the detector
    pub vad_threshold: f32,
    /// Level below which audio counts as dropped
    pub dropout_threshold: f32,
    /// How long the level must stay below the dropout threshold
    pub min_duration_ms: u64,
}

impl Default for DropoutConfig {
    fn default() -> Self {
        Self {
            vad_threshold: 0.02,
            dropout_threshold: 0.001,
            min_duration_ms: 500,
        }
    }
}

/// Detects audio dropouts: speech-level audio falling to near silence
/// and staying there
#[derive(Debug)]
pub struct DropoutDetector {
    config: DropoutConfig,
    armed: bool,
    below_since: Option<u64>,
}

impl DropoutDetector {
    /// Create a detector with the given parameters
    pub fn new(config: DropoutConfig) -> Self {
        Self {
            config,
            armed: false,
            below_since: None,
        }
    }

    /// Feed one level sample; returns the measured dropout duration when
    /// a dropout is confirmed
    pub fn process(&mut self, level: f32, now_ms: u64) -> Option<u64> {
        if level > self.config.vad_threshold {
            self.armed = true;
            self.below_since = None;
            None
        } else if level > self.config.dropout_threshold {
            // Recovery above the dropout floor resets the pending timer
            // whether or not a dropout was confirmed.
            self.below_since = None;
            None
        } else {
            if !self.armed {
                return None;
            }
            let since = *self.below_since.get_or_insert(now_ms);
            let elapsed = now_ms.saturating_sub(since);
            if elapsed >= self.config.min_duration_ms {
                self.armed = false;
                self.below_since = None;
                Some(elapsed)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vad() -> VadDetector {
        VadDetector::new(VadConfig::default())
    }

    #[test]
    fn run_held_for_exactly_min_duration_emits_one_event() {
        let mut detector = vad();
        let mut events = Vec::new();
        // Active samples every 10 ms from t=0 to t=100 inclusive.
        for t in (0..=100).step_by(10) {
            if let Some(e) = detector.process(0.05, t) {
                events.push(e);
            }
        }
        assert_eq!(events, vec![VadTransition::Started { at_ms: 0 }]);
    }

    #[test]
    fn run_one_tick_short_of_min_duration_emits_nothing() {
        let mut detector = vad();
        for t in (0..=90).step_by(10) {
            assert!(detector.process(0.05, t).is_none());
        }
        // Falls silent before qualifying: the blip is discarded.
        assert!(detector.process(0.0, 100).is_none());
    }

    #[test]
    fn qualified_run_reports_stop_with_duration() {
        let mut detector = vad();
        for t in (0..=150).step_by(10) {
            detector.process(0.05, t);
        }
        assert!(detector.is_active());
        let stopped = detector.process(0.0, 160);
        assert_eq!(stopped, Some(VadTransition::Stopped { duration_ms: 160 }));
        assert!(!detector.is_active());
    }

    #[test]
    fn level_at_threshold_is_not_active() {
        let mut detector = vad();
        for t in (0..=200).step_by(10) {
            assert!(detector.process(0.02, t).is_none());
        }
    }

    #[test]
    fn dropout_confirmed_after_min_duration() {
        let mut detector = DropoutDetector::new(DropoutConfig::default());
        detector.process(0.05, 0); // speech arms the detector
        let mut confirmed = None;
        for t in (100..=600).step_by(50) {
            if let Some(d) = detector.process(0.0005, t) {
                confirmed = Some(d);
            }
        }
        assert_eq!(confirmed, Some(500));
        // Disarmed until speech resumes: continued silence is not a
        // second dropout.
        assert!(detector.process(0.0005, 1200).is_none());
    }

    #[test]
    fn recovery_before_confirmation_resets_the_timer() {
        let mut detector = DropoutDetector::new(DropoutConfig::default());
        detector.process(0.05, 0);
        assert!(detector.process(0.0005, 100).is_none());
        assert!(detector.process(0.0005, 400).is_none());
        // Level rises back above the dropout floor (but below speech).
        assert!(detector.process(0.01, 450).is_none());
        // Silence must last the full duration again from here.
        assert!(detector.process(0.0005, 500).is_none());
        assert!(detector.process(0.0005, 900).is_none());
        assert_eq!(detector.process(0.0005, 1000), Some(500));
    }

    #[test]
    fn unarmed_silence_is_not_a_dropout() {
        let mut detector = DropoutDetector::new(DropoutConfig::default());
        for t in (0..=2000).step_by(100) {
            assert!(detector.process(0.0, t).is_none());
        }
    }
}

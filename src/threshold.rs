use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SAFE_THRESHOLD: f64 = 75.0;
pub const DEFAULT_WARNING_THRESHOLD: f64 = 65.0;
pub const MIN_DEFAULTER_THRESHOLD: f64 = 50.0;
pub const MAX_DEFAULTER_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Safe,
    Warning,
    Defaulter,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Tier::Safe => "Safe",
            Tier::Warning => "Warning",
            Tier::Defaulter => "Defaulter",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("threshold {0} is outside {MIN_DEFAULTER_THRESHOLD}..={MAX_DEFAULTER_THRESHOLD}")]
    OutOfRange(f64),
    #[error("warning threshold {warning} is above safe threshold {safe}")]
    Inverted { safe: f64, warning: f64 },
    #[error("threshold {0} is not a finite percentage")]
    NotFinite(f64),
}

/// The two classification breakpoints. Both are inclusive lower bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub safe: f64,
    pub warning: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            safe: DEFAULT_SAFE_THRESHOLD,
            warning: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn new(safe: f64, warning: f64) -> Result<Self, ThresholdError> {
        for value in [safe, warning] {
            if !value.is_finite() {
                return Err(ThresholdError::NotFinite(value));
            }
        }
        if warning > safe {
            return Err(ThresholdError::Inverted { safe, warning });
        }
        Ok(Self { safe, warning })
    }

    pub fn classify(&self, percentage: f64) -> Tier {
        classify(percentage, self.safe, self.warning)
    }
}

/// Out-of-range percentages are classified as given, without clamping.
pub fn classify(percentage: f64, safe_threshold: f64, warning_threshold: f64) -> Tier {
    if percentage >= safe_threshold {
        Tier::Safe
    } else if percentage >= warning_threshold {
        Tier::Warning
    } else {
        Tier::Defaulter
    }
}

/// Share of attended classes, in percent. No classes held counts as 0%.
pub fn percentage(present: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        present as f64 / total as f64 * 100.0
    }
}

/// Defaulter cut-off chosen for a session, bounded to the range the
/// defaulter list accepts.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, ThresholdError> {
        if !value.is_finite() {
            return Err(ThresholdError::NotFinite(value));
        }
        if !(MIN_DEFAULTER_THRESHOLD..=MAX_DEFAULTER_THRESHOLD).contains(&value) {
            return Err(ThresholdError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn strictness(self) -> &'static str {
        strictness(self.0)
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_SAFE_THRESHOLD)
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

pub fn strictness(threshold: f64) -> &'static str {
    match classify(threshold, DEFAULT_SAFE_THRESHOLD, DEFAULT_WARNING_THRESHOLD) {
        Tier::Safe => "Standard",
        Tier::Warning => "Lenient",
        Tier::Defaulter => "Strict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_default_breakpoints() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.classify(80.0), Tier::Safe);
        assert_eq!(thresholds.classify(70.0), Tier::Warning);
        assert_eq!(thresholds.classify(50.0), Tier::Defaulter);
    }

    #[test]
    fn breakpoints_are_inclusive() {
        assert_eq!(classify(75.0, 75.0, 65.0), Tier::Safe);
        assert_eq!(classify(65.0, 75.0, 65.0), Tier::Warning);
        assert_eq!(classify(64.999, 75.0, 65.0), Tier::Defaulter);
    }

    #[test]
    fn out_of_range_percentages_still_classify() {
        assert_eq!(classify(130.0, 75.0, 65.0), Tier::Safe);
        assert_eq!(classify(-5.0, 75.0, 65.0), Tier::Defaulter);
    }

    #[test]
    fn breakpoints_are_configurable() {
        let thresholds = Thresholds::new(85.0, 80.0).unwrap();
        assert_eq!(thresholds.classify(82.0), Tier::Warning);
        assert_eq!(thresholds.classify(79.0), Tier::Defaulter);
        assert_eq!(
            Thresholds::new(60.0, 70.0),
            Err(ThresholdError::Inverted {
                safe: 60.0,
                warning: 70.0
            })
        );
    }

    #[test]
    fn percentage_guards_empty_totals() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(30, 40), 75.0);
        assert_eq!(percentage(20, 40), 50.0);
    }

    #[test]
    fn threshold_is_bounded() {
        assert!(Threshold::new(50.0).is_ok());
        assert!(Threshold::new(100.0).is_ok());
        assert_eq!(Threshold::new(45.0), Err(ThresholdError::OutOfRange(45.0)));
        assert!(Threshold::new(f64::NAN).is_err());
    }

    #[test]
    fn strictness_labels_match_breakpoints() {
        assert_eq!(strictness(80.0), "Standard");
        assert_eq!(strictness(70.0), "Lenient");
        assert_eq!(strictness(55.0), "Strict");
    }
}

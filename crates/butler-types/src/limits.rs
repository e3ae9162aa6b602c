//! Per-joint physical bounds for the desk arm.
//!
//! The [`LimitTable`] is built once at startup (defaults or the `[limits]`
//! section of the config file) and never mutated afterwards.  The gripper is a
//! binary actuator and has no entry here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ButlerError;

/// Inclusive millisecond range for `WAIT` durations.
pub const WAIT_MS_RANGE: (u32, u32) = (0, 5_000);

/// Inclusive millisecond range for `MOVE` durations.
pub const MOVE_MS_RANGE: (u32, u32) = (1_000, 20_000);

/// One angular degree of freedom of the arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Joint {
    Base,
    Shoulder,
    Elbow,
    Wrist,
}

impl Joint {
    /// All joints in `MOVE` tuple order.
    pub const ALL: [Joint; 4] = [Joint::Base, Joint::Shoulder, Joint::Elbow, Joint::Wrist];

    pub fn name(self) -> &'static str {
        match self {
            Joint::Base => "base",
            Joint::Shoulder => "shoulder",
            Joint::Elbow => "elbow",
            Joint::Wrist => "wrist",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Closed interval `[min, max]` in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointRange {
    pub min: f64,
    pub max: f64,
}

impl JointRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Saturate `value` to the nearest bound: `max(min, min(max, value))`.
    pub fn clamp(&self, value: f64) -> f64 {
        self.min.max(self.max.min(value))
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Joint name → allowed angular interval.
///
/// # Example
///
/// ```
/// use butler_types::limits::{Joint, LimitTable};
///
/// let limits = LimitTable::default();
/// assert_eq!(limits.range(Joint::Base).clamp(200.0), 150.0);
/// assert_eq!(limits.range(Joint::Elbow).clamp(-5.0), 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitTable {
    pub base: JointRange,
    pub shoulder: JointRange,
    pub elbow: JointRange,
    pub wrist: JointRange,
}

impl Default for LimitTable {
    fn default() -> Self {
        Self {
            base: JointRange::new(-150.0, 150.0),
            shoulder: JointRange::new(-10.0, 120.0),
            elbow: JointRange::new(0.0, 130.0),
            wrist: JointRange::new(-90.0, 90.0),
        }
    }
}

impl LimitTable {
    pub fn range(&self, joint: Joint) -> JointRange {
        match joint {
            Joint::Base => self.base,
            Joint::Shoulder => self.shoulder,
            Joint::Elbow => self.elbow,
            Joint::Wrist => self.wrist,
        }
    }

    /// Reject tables whose bounds are non-finite or inverted.
    ///
    /// # Errors
    ///
    /// Returns [`ButlerError::InvalidLimits`] naming the first bad joint.
    pub fn validate(&self) -> Result<(), ButlerError> {
        for joint in Joint::ALL {
            let r = self.range(joint);
            if !r.min.is_finite() || !r.max.is_finite() || r.min > r.max {
                return Err(ButlerError::InvalidLimits {
                    joint: joint.name().to_string(),
                    details: format!("[{}, {}] is not a valid closed interval", r.min, r.max),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for LimitTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = Joint::ALL
            .iter()
            .map(|j| {
                let r = self.range(*j);
                format!("{j}: [{}, {}]", r.min, r.max)
            })
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

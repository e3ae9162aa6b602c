//! [`CommandValidator`] – the safety boundary between the planning oracle and
//! the arm.
//!
//! The oracle's output is untrusted.  Each element of its `cmds` array is
//! matched against the six known tuple shapes and either becomes a
//! [`ValidatedCommand`] or is dropped.  Three rules apply:
//!
//! 1. **Structural acceptance** – the tag must be one of `HOME`, `STOP`,
//!    `STATUS`, `WAIT`, `GRIP`, `MOVE` and the tuple length must equal the
//!    tag's arity exactly.
//! 2. **Numeric clamping** – well-typed but out-of-range values are saturated
//!    to the nearest bound, never rejected.
//! 3. **Silent discard** – wrong arity, unknown tag, or a field that does not
//!    coerce to a finite number drops that element only.
//!
//! Validation never fails: an unusable plan is an empty plan, which leaves the
//! robot idle.
//!
//! # Example
//!
//! ```
//! use butler_kernel::CommandValidator;
//! use butler_types::{LimitTable, RawPlan};
//! use serde_json::json;
//!
//! let validator = CommandValidator::new(LimitTable::default()).unwrap();
//! let raw = RawPlan(json!({"cmds": [["MOVE", 200, 50, 60, 0, 1, 500], ["FOO"]]}));
//!
//! let plan = validator.validate(&raw);
//! assert_eq!(
//!     serde_json::to_value(&plan).unwrap(),
//!     json!([["MOVE", 150.0, 50.0, 60.0, 0.0, 1, 1000]])
//! );
//! ```

use std::fmt;

use butler_types::{
    ButlerError, CommandTag, GripState, JointAngles, LimitTable, MoveMillis, RawPlan, ValidatedCommand,
    ValidatedPlan, WaitMillis,
};
use serde_json::Value;
use tracing::debug;

/// Why a single command tuple was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discard {
    /// The element is not an array.
    NotATuple,
    /// The element is an empty array.
    Empty,
    /// The first element is not one of the six known tags.
    UnknownTag(String),
    /// Known tag, wrong tuple length (tag included).
    Arity {
        tag: CommandTag,
        expected: usize,
        found: usize,
    },
    /// A required field (1-based tuple position) is not numeric.
    NonNumeric { tag: CommandTag, position: usize },
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discard::NotATuple => f.write_str("not a command tuple"),
            Discard::Empty => f.write_str("empty command tuple"),
            Discard::UnknownTag(tag) => write!(f, "unknown tag {tag}"),
            Discard::Arity {
                tag,
                expected,
                found,
            } => write!(f, "{tag} expects {expected} elements, got {found}"),
            Discard::NonNumeric { tag, position } => {
                write!(f, "{tag} field at position {position} is not numeric")
            }
        }
    }
}

/// Converts a [`RawPlan`] into a bounded [`ValidatedPlan`].
#[derive(Debug, Clone, Default)]
pub struct CommandValidator {
    limits: LimitTable,
}

impl CommandValidator {
    /// Build a validator enforcing `limits`.
    ///
    /// # Errors
    ///
    /// Returns [`ButlerError::InvalidLimits`] when a bound is non-finite or a
    /// range is inverted; clamping against such a table cannot keep values in
    /// range.
    pub fn new(limits: LimitTable) -> Result<Self, ButlerError> {
        limits.validate()?;
        Ok(Self { limits })
    }

    pub fn limits(&self) -> &LimitTable {
        &self.limits
    }

    /// Validate every element of `raw.cmds` independently, preserving order.
    ///
    /// A top-level value that is not an object with a `cmds` array yields an
    /// empty plan.
    pub fn validate(&self, raw: &RawPlan) -> ValidatedPlan {
        let Some(cmds) = raw.0.get("cmds").and_then(Value::as_array) else {
            debug!("raw plan has no cmds array; returning empty plan");
            return ValidatedPlan::empty();
        };

        let plan: ValidatedPlan = cmds
            .iter()
            .enumerate()
            .filter_map(|(index, element)| match self.validate_command(element) {
                Ok(cmd) => Some(cmd),
                Err(reason) => {
                    debug!(index, %reason, "discarding command");
                    None
                }
            })
            .collect();

        debug!(received = cmds.len(), accepted = plan.len(), "plan validated");
        plan
    }

    /// Match one tuple against the known shapes.
    ///
    /// # Errors
    ///
    /// Returns the [`Discard`] reason when the tuple is structurally unusable.
    pub fn validate_command(&self, element: &Value) -> Result<ValidatedCommand, Discard> {
        let tuple = element.as_array().ok_or(Discard::NotATuple)?;
        let (head, fields) = tuple.split_first().ok_or(Discard::Empty)?;
        let tag = head
            .as_str()
            .and_then(CommandTag::parse)
            .ok_or_else(|| Discard::UnknownTag(head.to_string()))?;

        if tuple.len() != tag.arity() {
            return Err(Discard::Arity {
                tag,
                expected: tag.arity(),
                found: tuple.len(),
            });
        }

        let field = |i: usize| -> Result<f64, Discard> {
            coerce_number(&fields[i]).ok_or(Discard::NonNumeric {
                tag,
                position: i + 1,
            })
        };

        let cmd = match tag {
            CommandTag::Home => ValidatedCommand::Home,
            CommandTag::Stop => ValidatedCommand::Stop,
            CommandTag::Status => ValidatedCommand::Status,
            CommandTag::Wait => ValidatedCommand::Wait(WaitMillis::clamped(field(0)?)),
            CommandTag::Grip => ValidatedCommand::Grip(GripState::from_level(field(0)?)),
            CommandTag::Move => {
                let raw = [field(0)?, field(1)?, field(2)?, field(3)?];
                let angles = JointAngles::clamped(&self.limits, raw);
                if angles.as_array() != raw {
                    debug!(requested = ?raw, clamped = ?angles.as_array(), "MOVE angles saturated");
                }
                ValidatedCommand::Move {
                    angles,
                    gripper: GripState::from_level(field(4)?),
                    duration: MoveMillis::clamped(field(5)?),
                }
            }
        };
        Ok(cmd)
    }
}

/// JSON numbers and numeric strings coerce; everything else, and any
/// non-finite result, does not.
fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

//! Validated robot commands.
//!
//! Every numeric field of a [`ValidatedCommand`] lives in a newtype whose only
//! constructor saturates the value into its bound, so a command that exists is
//! a command the arm can execute.  The wire form is the positional tuple the
//! robot firmware understands:
//!
//! | Command | Wire form |
//! |---|---|
//! | `Home` | `["HOME"]` |
//! | `Stop` | `["STOP"]` |
//! | `Status` | `["STATUS"]` |
//! | `Wait` | `["WAIT", ms]` |
//! | `Grip` | `["GRIP", 0 \| 1]` |
//! | `Move` | `["MOVE", base, shoulder, elbow, wrist, gripper, ms]` |

use std::fmt;

use schemars::JsonSchema;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::limits::{Joint, LimitTable, MOVE_MS_RANGE, WAIT_MS_RANGE};

// ─────────────────────────────────────────────────────────────────────────────
// Tags
// ─────────────────────────────────────────────────────────────────────────────

/// Operation tag in the first slot of a command tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandTag {
    Home,
    Stop,
    Status,
    Wait,
    Grip,
    Move,
}

impl CommandTag {
    pub const ALL: [CommandTag; 6] = [
        CommandTag::Home,
        CommandTag::Stop,
        CommandTag::Status,
        CommandTag::Wait,
        CommandTag::Grip,
        CommandTag::Move,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandTag::Home => "HOME",
            CommandTag::Stop => "STOP",
            CommandTag::Status => "STATUS",
            CommandTag::Wait => "WAIT",
            CommandTag::Grip => "GRIP",
            CommandTag::Move => "MOVE",
        }
    }

    /// Exact, case-sensitive match against the six known tags.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// Tuple length including the tag itself.
    pub fn arity(self) -> usize {
        match self {
            CommandTag::Home | CommandTag::Stop | CommandTag::Status => 1,
            CommandTag::Wait | CommandTag::Grip => 2,
            CommandTag::Move => 7,
        }
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bounded fields
// ─────────────────────────────────────────────────────────────────────────────

fn clamp_ms(value: f64, (lo, hi): (u32, u32)) -> u32 {
    // Saturate in f64 first so oversized inputs never overflow the cast.
    f64::from(lo).max(f64::from(hi).min(value)).trunc() as u32
}

/// `WAIT` duration in milliseconds, always within [`WAIT_MS_RANGE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitMillis(u32);

impl WaitMillis {
    pub fn clamped(ms: f64) -> Self {
        Self(clamp_ms(ms, WAIT_MS_RANGE))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// `MOVE` duration in milliseconds, always within [`MOVE_MS_RANGE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveMillis(u32);

impl MoveMillis {
    pub fn clamped(ms: f64) -> Self {
        Self(clamp_ms(ms, MOVE_MS_RANGE))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Binary gripper state; wire value 0 (open) or 1 (closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripState {
    Open,
    Closed,
}

impl GripState {
    /// Integer-truncate `value`; nonzero closes, zero opens.
    pub fn from_level(value: f64) -> Self {
        if value.trunc() == 0.0 {
            GripState::Open
        } else {
            GripState::Closed
        }
    }

    pub fn wire_value(self) -> u8 {
        match self {
            GripState::Open => 0,
            GripState::Closed => 1,
        }
    }
}

/// Target angles (degrees) for the four angular joints, each saturated into
/// the [`LimitTable`] that built it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointAngles([f64; 4]);

impl JointAngles {
    /// `raw` is in [`Joint::ALL`] order.
    pub fn clamped(limits: &LimitTable, raw: [f64; 4]) -> Self {
        let mut out = [0.0; 4];
        for (i, joint) in Joint::ALL.into_iter().enumerate() {
            out[i] = limits.range(joint).clamp(raw[i]);
        }
        Self(out)
    }

    pub fn get(&self, joint: Joint) -> f64 {
        match joint {
            Joint::Base => self.0[0],
            Joint::Shoulder => self.0[1],
            Joint::Elbow => self.0[2],
            Joint::Wrist => self.0[3],
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        self.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ValidatedCommand / ValidatedPlan
// ─────────────────────────────────────────────────────────────────────────────

/// A command that has passed the safety validator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidatedCommand {
    Home,
    Stop,
    Status,
    Wait(WaitMillis),
    Grip(GripState),
    Move {
        angles: JointAngles,
        gripper: GripState,
        duration: MoveMillis,
    },
}

impl ValidatedCommand {
    pub fn tag(&self) -> CommandTag {
        match self {
            ValidatedCommand::Home => CommandTag::Home,
            ValidatedCommand::Stop => CommandTag::Stop,
            ValidatedCommand::Status => CommandTag::Status,
            ValidatedCommand::Wait(_) => CommandTag::Wait,
            ValidatedCommand::Grip(_) => CommandTag::Grip,
            ValidatedCommand::Move { .. } => CommandTag::Move,
        }
    }
}

impl Serialize for ValidatedCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.tag().arity()))?;
        seq.serialize_element(self.tag().as_str())?;
        match self {
            ValidatedCommand::Home | ValidatedCommand::Stop | ValidatedCommand::Status => {}
            ValidatedCommand::Wait(ms) => seq.serialize_element(&ms.get())?,
            ValidatedCommand::Grip(state) => seq.serialize_element(&state.wire_value())?,
            ValidatedCommand::Move {
                angles,
                gripper,
                duration,
            } => {
                for angle in angles.as_array() {
                    seq.serialize_element(&angle)?;
                }
                seq.serialize_element(&gripper.wire_value())?;
                seq.serialize_element(&duration.get())?;
            }
        }
        seq.end()
    }
}

/// Ordered, execution-order sequence of [`ValidatedCommand`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedPlan(Vec<ValidatedCommand>);

impl ValidatedPlan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[ValidatedCommand] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ValidatedCommand> for ValidatedPlan {
    fn from_iter<I: IntoIterator<Item = ValidatedCommand>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ValidatedPlan {
    type Item = &'a ValidatedCommand;
    type IntoIter = std::slice::Iter<'a, ValidatedCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

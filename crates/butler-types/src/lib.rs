//! Shared data model for the desk-butler relay.
//!
//! - [`limits`] – per-joint physical bounds ([`LimitTable`]).
//! - [`command`] – [`ValidatedCommand`] and [`ValidatedPlan`], whose numeric
//!   fields can only be built already clamped into their bounds.
//! - Snapshot and response envelopes shared by the store, the relay and the
//!   HTTP layer.

pub mod command;
pub mod limits;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use command::{
    CommandTag, GripState, JointAngles, MoveMillis, ValidatedCommand, ValidatedPlan, WaitMillis,
};
pub use limits::{Joint, JointRange, LimitTable, MOVE_MS_RANGE, WAIT_MS_RANGE};

/// Image formats accepted from the robot camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    Jpeg,
    Png,
}

impl ImageEncoding {
    /// Map an upload `Content-Type` to an encoding.  `image/jpg` is accepted
    /// as an alias because some camera firmwares send it.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageEncoding::Jpeg),
            "image/png" => Some(ImageEncoding::Png),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "image/jpeg",
            ImageEncoding::Png => "image/png",
        }
    }
}

/// Most recent camera frame uploaded by one robot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub payload: Bytes,
    pub encoding: ImageEncoding,
    pub captured_at: DateTime<Utc>,
}

/// Untrusted oracle output.  No structural guarantee of any kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPlan(pub serde_json::Value);

/// Body returned to the robot for a planning request.
///
/// `cmds` is always present (possibly empty); `error` only appears when the
/// oracle call failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanResponse {
    pub cmds: ValidatedPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlanResponse {
    pub fn commands(cmds: ValidatedPlan) -> Self {
        Self { cmds, error: None }
    }

    /// Empty plan: nothing fresh to plan from.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Empty plan with a diagnostic attached.
    pub fn degraded(error: impl Into<String>) -> Self {
        Self {
            cmds: ValidatedPlan::empty(),
            error: Some(error.into()),
        }
    }
}

/// Errors shared across the relay crates.
#[derive(Error, Debug)]
pub enum ButlerError {
    #[error("Invalid joint limits for {joint}: {details}")]
    InvalidLimits { joint: String, details: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

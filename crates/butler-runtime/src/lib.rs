//! `butler-runtime` – Planning Pipeline
//!
//! Wires the snapshot store, the external planner and the safety validator
//! into a single request path.
//!
//! # Modules
//!
//! - [`plan_oracle`] – [`PlanOracle`][plan_oracle::PlanOracle]: the narrow
//!   seam to the external vision planner, with
//!   [`OpenAiPlanOracle`][plan_oracle::OpenAiPlanOracle] as the production
//!   client (OpenAI-compatible `/v1/chat/completions`, strict JSON Schema
//!   output generated with `schemars`).
//! - [`plan_relay`] – [`PlanRelay`][plan_relay::PlanRelay]: snapshot read →
//!   freshness check → bounded oracle call → validation.  Never fails towards
//!   the robot.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.
//!
//! # Validation
//!
//! Oracle output reaches the caller only through
//! [`CommandValidator::validate`].  [`CommandValidator`] is re-exported so
//! the CLI can build one without depending on `butler-kernel` directly.

pub mod plan_oracle;
pub mod plan_relay;
pub mod telemetry;

pub use plan_oracle::{OpenAiPlanOracle, OracleError, PlanOracle};
pub use plan_relay::{DEFAULT_ORACLE_TIMEOUT, PlanRelay};
pub use telemetry::{TracerProviderGuard, init_tracing};

pub use butler_kernel::CommandValidator;

//! `butler-kernel` – Command Safety Validation
//!
//! The only component that stands between an external planning oracle and a
//! physical arm.  It does not plan; it enforces shape and bounds.
//!
//! # Modules
//!
//! - [`command_validator`] – [`CommandValidator`][command_validator::CommandValidator]:
//!   parses an untrusted [`RawPlan`][butler_types::RawPlan] into a
//!   [`ValidatedPlan`][butler_types::ValidatedPlan], saturating numeric fields
//!   into the [`LimitTable`][butler_types::LimitTable] and dropping malformed
//!   tuples one by one.

pub mod command_validator;

pub use command_validator::{CommandValidator, Discard};

//! `butler-memory` – Process-Lifetime State
//!
//! # Modules
//!
//! - [`snapshot_store`] – [`SnapshotStore`]: the most recent camera frame per
//!   robot, with age-based expiry on read.  Nothing is persisted; a restart
//!   starts empty.

pub mod snapshot_store;

pub use snapshot_store::{DEFAULT_FRESHNESS_WINDOW, SnapshotStore};

//! Latest-frame store keyed by robot identifier.
//!
//! Holds exactly one [`SnapshotEntry`] per robot.  A new upload replaces the
//! previous frame whole; nothing is ever merged or explicitly deleted.  Reads
//! are freshness-gated: an entry older than the freshness window is reported
//! as absent, which callers treat as "nothing to plan from" rather than an
//! error.
//!
//! # Locking
//!
//! The map of robot slots sits behind an [`RwLock`] that is only taken for
//! writing the first time a robot uploads.  Every other operation shares the
//! map lock and serialises on that robot's own [`Mutex`], so uploads from
//! different robots never wait on each other and a reader never observes a
//! half-replaced entry.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use chrono::{Duration, Utc};
//! use butler_memory::SnapshotStore;
//! use butler_types::ImageEncoding;
//!
//! let store = SnapshotStore::new();
//! let now = Utc::now();
//! store.put("desk-1", Bytes::from_static(b"\xff\xd8"), ImageEncoding::Jpeg, now);
//!
//! assert!(store.get_fresh("desk-1", now + Duration::seconds(60)).is_some());
//! assert!(store.get_fresh("desk-1", now + Duration::seconds(61)).is_none());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use bytes::Bytes;
use butler_types::{ImageEncoding, SnapshotEntry};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

/// Default maximum snapshot age accepted for planning.  Tunable through the
/// relay configuration.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::seconds(60);

type Slot = Arc<Mutex<SnapshotEntry>>;

/// Freshness-gated, per-robot snapshot store.
#[derive(Debug)]
pub struct SnapshotStore {
    slots: RwLock<HashMap<String, Slot>>,
    freshness_window: Duration,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// Empty store using [`DEFAULT_FRESHNESS_WINDOW`].
    pub fn new() -> Self {
        Self::with_freshness_window(DEFAULT_FRESHNESS_WINDOW)
    }

    pub fn with_freshness_window(freshness_window: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            freshness_window,
        }
    }

    pub fn freshness_window(&self) -> Duration {
        self.freshness_window
    }

    /// Replace the stored frame for `robot_id`.
    pub fn put(&self, robot_id: &str, payload: Bytes, encoding: ImageEncoding, now: DateTime<Utc>) {
        let size = payload.len();
        let entry = SnapshotEntry {
            payload,
            encoding,
            captured_at: now,
        };

        // Fast path: the robot already has a slot, so only its own lock is
        // held exclusively.
        let existing = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(robot_id)
            .cloned();

        match existing {
            Some(slot) => {
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = entry;
            }
            None => {
                let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
                // Another upload may have created the slot between the two locks.
                match slots.get(robot_id) {
                    Some(slot) => {
                        *slot.lock().unwrap_or_else(PoisonError::into_inner) = entry;
                    }
                    None => {
                        slots.insert(robot_id.to_string(), Arc::new(Mutex::new(entry)));
                    }
                }
            }
        }

        debug!(robot_id, size, encoding = encoding.mime(), "snapshot stored");
    }

    /// Latest frame for `robot_id` if it is no older than the configured
    /// freshness window.
    pub fn get_fresh(&self, robot_id: &str, now: DateTime<Utc>) -> Option<SnapshotEntry> {
        self.get_fresh_within(robot_id, now, self.freshness_window)
    }

    /// Latest frame for `robot_id` if `now - captured_at <= max_age`.
    ///
    /// A capture time in the future (clock skew between hosts) counts as age
    /// zero.
    pub fn get_fresh_within(
        &self,
        robot_id: &str,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Option<SnapshotEntry> {
        let slot = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(robot_id)
            .cloned()?;

        let entry = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let age = (now - entry.captured_at).max(Duration::zero());
        if age <= max_age {
            Some(entry)
        } else {
            trace!(robot_id, age_ms = age.num_milliseconds(), "snapshot is stale");
            None
        }
    }

    /// Identifiers that have uploaded at least once, fresh or not, sorted.
    pub fn robot_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

//! [`PlanRelay`] – the planning request pipeline.
//!
//! Each call to [`PlanRelay::plan_for`] runs:
//!
//! 1. **Read** – the freshest snapshot for the robot from the
//!    [`SnapshotStore`].  Nothing fresh → empty plan, oracle not called.
//! 2. **Ask** – the [`PlanOracle`] with that snapshot, bounded by the oracle
//!    timeout.  Any failure → empty plan plus a diagnostic string.
//! 3. **Validate** – the raw answer through the [`CommandValidator`].
//!
//! The relay never fails towards the robot; the worst outcome is "no commands
//! this cycle".  There are no retries: the robot polls again on its own
//! schedule.

use std::sync::Arc;
use std::time::Duration;

use butler_kernel::CommandValidator;
use butler_memory::SnapshotStore;
use butler_types::PlanResponse;
use chrono::{DateTime, Utc};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::plan_oracle::{OracleError, PlanOracle};

/// Default deadline for one oracle call.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Orchestrates snapshot lookup, oracle call and validation.
#[derive(Clone)]
pub struct PlanRelay {
    store: Arc<SnapshotStore>,
    oracle: Arc<dyn PlanOracle>,
    validator: Arc<CommandValidator>,
    oracle_timeout: Duration,
}

impl PlanRelay {
    pub fn new(
        store: Arc<SnapshotStore>,
        oracle: Arc<dyn PlanOracle>,
        validator: CommandValidator,
    ) -> Self {
        Self {
            store,
            oracle,
            validator: Arc::new(validator),
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }

    /// Override the oracle deadline (builder-style).
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub fn oracle_timeout(&self) -> Duration {
        self.oracle_timeout
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Produce the command list for `robot_id` as of `now`.
    ///
    /// `status` is the robot's self-reported state (e.g. `"idle"`); it is
    /// only recorded in the request span.
    pub async fn plan_for(
        &self,
        robot_id: &str,
        status: Option<&str>,
        now: DateTime<Utc>,
    ) -> PlanResponse {
        let span = info_span!(
            "plan_request",
            request_id = %Uuid::new_v4(),
            robot_id,
            status = status.unwrap_or("unknown"),
        );
        self.run(robot_id, now).instrument(span).await
    }

    async fn run(&self, robot_id: &str, now: DateTime<Utc>) -> PlanResponse {
        let Some(snapshot) = self.store.get_fresh(robot_id, now) else {
            info!("no fresh snapshot; returning idle plan");
            return PlanResponse::idle();
        };

        let raw = match tokio::time::timeout(self.oracle_timeout, self.oracle.plan(&snapshot)).await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(error = %e, "oracle call failed");
                return PlanResponse::degraded(e.to_string());
            }
            Err(_) => {
                let e = OracleError::Timeout(self.oracle_timeout);
                warn!(error = %e, "oracle call exceeded deadline");
                return PlanResponse::degraded(e.to_string());
            }
        };

        let plan = self.validator.validate(&raw);
        let proposed = raw
            .0
            .get("cmds")
            .and_then(|c| c.as_array())
            .map_or(0, Vec::len);
        info!(proposed, accepted = plan.len(), "plan validated");
        PlanResponse::commands(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use butler_types::{ImageEncoding, LimitTable, RawPlan, SnapshotEntry};
    use bytes::Bytes;
    use chrono::Duration as ChronoDuration;
    use serde_json::{Value, json};

    // ------------------------------------------------------------------ stubs

    enum Behaviour {
        Answer(Value),
        Fail,
        Hang,
    }

    struct StubOracle {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl StubOracle {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlanOracle for StubOracle {
        async fn plan(&self, _snapshot: &SnapshotEntry) -> Result<RawPlan, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Answer(v) => Ok(RawPlan(v.clone())),
                Behaviour::Fail => Err(OracleError::BadResponse("connection reset".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("timeout must fire first")
                }
            }
        }
    }

    fn relay_with(oracle: Arc<StubOracle>) -> PlanRelay {
        PlanRelay::new(
            Arc::new(SnapshotStore::new()),
            oracle,
            CommandValidator::new(LimitTable::default()).unwrap(),
        )
    }

    fn upload(relay: &PlanRelay, robot_id: &str, at: DateTime<Utc>) {
        relay
            .store()
            .put(robot_id, Bytes::from_static(b"\xff\xd8\xff"), ImageEncoding::Jpeg, at);
    }

    // ------------------------------------------------------------------ tests

    #[tokio::test]
    async fn empty_store_returns_idle_without_calling_oracle() {
        let oracle = StubOracle::new(Behaviour::Answer(json!({"cmds": [["HOME"]]})));
        let relay = relay_with(Arc::clone(&oracle));

        let response = relay.plan_for("desk-1", Some("idle"), Utc::now()).await;

        assert_eq!(serde_json::to_value(&response).unwrap(), json!({"cmds": []}));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn stale_snapshot_returns_idle_without_calling_oracle() {
        let oracle = StubOracle::new(Behaviour::Answer(json!({"cmds": [["HOME"]]})));
        let relay = relay_with(Arc::clone(&oracle));
        let now = Utc::now();
        upload(&relay, "desk-1", now - ChronoDuration::seconds(61));

        let response = relay.plan_for("desk-1", None, now).await;

        assert!(response.cmds.is_empty());
        assert!(response.error.is_none());
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn fresh_snapshot_is_planned_and_validated() {
        let oracle = StubOracle::new(Behaviour::Answer(json!({
            "cmds": [["MOVE", 200, 50, 60, 0, 1, 500], ["WAIT", 99999], ["FOO"], ["GRIP", 5]]
        })));
        let relay = relay_with(Arc::clone(&oracle));
        let now = Utc::now();
        upload(&relay, "desk-1", now - ChronoDuration::seconds(60));

        let response = relay.plan_for("desk-1", Some("idle"), now).await;

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"cmds": [
                ["MOVE", 150.0, 50.0, 60.0, 0.0, 1, 1000],
                ["WAIT", 5000],
                ["GRIP", 1]
            ]})
        );
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn oracle_failure_degrades_to_empty_plan_with_error() {
        let oracle = StubOracle::new(Behaviour::Fail);
        let relay = relay_with(Arc::clone(&oracle));
        let now = Utc::now();
        upload(&relay, "desk-1", now);

        let response = relay.plan_for("desk-1", None, now).await;

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["cmds"], json!([]));
        assert!(value["error"].as_str().unwrap().contains("connection reset"));
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn oracle_timeout_degrades_to_empty_plan_with_error() {
        let oracle = StubOracle::new(Behaviour::Hang);
        let relay = relay_with(Arc::clone(&oracle)).with_oracle_timeout(Duration::from_secs(5));
        let now = Utc::now();
        upload(&relay, "desk-1", now);

        let response = relay.plan_for("desk-1", None, now).await;

        assert!(response.cmds.is_empty());
        assert!(response.error.unwrap().contains("timed out"));
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn unusable_oracle_output_is_an_empty_plan_not_an_error() {
        let oracle = StubOracle::new(Behaviour::Answer(json!({"cmds": [["DANCE"], ["HOME", 1]]})));
        let relay = relay_with(oracle);
        let now = Utc::now();
        upload(&relay, "desk-1", now);

        let response = relay.plan_for("desk-1", None, now).await;

        assert!(response.cmds.is_empty());
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn robots_do_not_see_each_others_snapshots() {
        let oracle = StubOracle::new(Behaviour::Answer(json!({"cmds": [["HOME"]]})));
        let relay = relay_with(Arc::clone(&oracle));
        let now = Utc::now();
        upload(&relay, "desk-1", now);

        assert!(relay.plan_for("desk-2", None, now).await.cmds.is_empty());
        assert_eq!(relay.plan_for("desk-1", None, now).await.cmds.len(), 1);
        assert_eq!(oracle.calls(), 1);
    }

    #[test]
    fn default_timeout_is_applied() {
        let relay = relay_with(StubOracle::new(Behaviour::Fail));
        assert_eq!(relay.oracle_timeout(), DEFAULT_ORACLE_TIMEOUT);
        let relay = relay.with_oracle_timeout(Duration::from_secs(2));
        assert_eq!(relay.oracle_timeout(), Duration::from_secs(2));
    }
}

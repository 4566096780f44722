//! One remediation cycle.
//!
//! Order is fixed: select, reconcile, cooldown filter, actuate, record
//! attempts, persist. Reconciliation must see this cycle's raw candidates
//! before cooldown hides any of them, and persistence must see the whole
//! effect of the cycle.

use crate::context::RemedyContext;
use crate::metrics::cycle_result;
use crate::status::CycleSummary;
use chrono::{DateTime, Utc};
use remedy_common::{
    Actuator, BatchReport, ErrorCode, Oracle, OracleError, RecordMap, ReconcileSummary, StoreError,
    filter_recent, reconcile, record_attempts,
};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum CycleError {
    /// No information this cycle; nothing was touched.
    #[error("oracle unavailable: {0}")]
    Oracle(#[from] OracleError),

    /// The record store could not be written; the process must stop.
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl CycleError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Oracle(e) => e.code(),
            Self::Persistence(e) => e.code(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub candidates: usize,
    pub raw_candidates: usize,
    pub excluded: usize,
    pub reconciled: ReconcileSummary,
    pub eligible: usize,
    pub batch: BatchReport,
    pub persisted: bool,
    pub dry_run: bool,
}

/// Run one cycle against `records`, which the caller owns across cycles.
///
/// On an oracle failure `records` is left untouched and nothing is
/// actuated. Individual actuation failures are reported in
/// [`CycleReport::batch`] and still consume a cooldown slot.
pub async fn run_cycle<O: Oracle, A: Actuator>(
    ctx: &RemedyContext<O, A>,
    records: &mut RecordMap,
    now: DateTime<Utc>,
) -> Result<CycleReport, CycleError> {
    let selection = match ctx.selector.select(&ctx.oracle, now).await {
        Ok(selection) => selection,
        Err(e) => {
            error!(code = %e.code().code_string(), "Cannot select candidates, skipping this cycle: {}", e);
            ctx.metrics.observe_cycle(cycle_result::ORACLE_ERROR);
            ctx.status.publish(
                CycleSummary::failed(now, cycle_result::ORACLE_ERROR, ctx.dry_run, &e),
                None,
            );
            return Err(e.into());
        }
    };
    ctx.metrics.observe_selection(&selection);

    let reconciled = reconcile(&selection.candidates, records);
    let eligible = filter_recent(&selection.candidates, records, ctx.cooldown, now);

    let batch = if ctx.dry_run {
        let names: Vec<&str> = eligible.names().collect();
        if eligible.len() > ctx.actuator.threshold() {
            warn!(machines = ?names, "Dry run: this batch would be refused");
        } else if !eligible.is_empty() {
            info!(machines = ?names, "Dry run: would power-cycle");
        }
        BatchReport::default()
    } else {
        ctx.actuator.remediate(&eligible).await
    };

    record_attempts(&batch.attempted, records, now);
    ctx.metrics.observe_batch(&batch, now);

    let persisted = if ctx.dry_run {
        false
    } else {
        if let Err(e) = ctx.store.save(records) {
            error!(code = %e.code().code_string(), "Cannot persist remediation records: {}", e);
            ctx.metrics.observe_cycle(cycle_result::PERSISTENCE_ERROR);
            ctx.status.publish(
                CycleSummary::failed(now, cycle_result::PERSISTENCE_ERROR, ctx.dry_run, &e),
                None,
            );
            return Err(e.into());
        }
        true
    };

    ctx.metrics.observe_records(records);
    let result = if ctx.dry_run {
        cycle_result::DRY_RUN
    } else {
        cycle_result::OK
    };
    ctx.metrics.observe_cycle(result);

    let report = CycleReport {
        candidates: selection.candidates.len(),
        raw_candidates: selection.raw_count,
        excluded: selection.excluded.len(),
        reconciled,
        eligible: eligible.len(),
        batch,
        persisted,
        dry_run: ctx.dry_run,
    };
    ctx.status.publish(summarize(&report, now, result), Some(records));

    info!(
        candidates = report.candidates,
        eligible = report.eligible,
        attempted = report.batch.attempted.len(),
        failed = report.batch.failures.len(),
        refused = report.batch.refused,
        "Cycle complete"
    );
    Ok(report)
}

fn summarize(report: &CycleReport, started_at: DateTime<Utc>, result: &str) -> CycleSummary {
    CycleSummary {
        started_at,
        finished_at: Utc::now(),
        result: result.to_string(),
        dry_run: report.dry_run,
        candidates: report.candidates,
        excluded: report.excluded,
        eligible: report.eligible,
        attempted: report.batch.attempted.iter().map(|e| e.name.clone()).collect(),
        failed: report.batch.failures.keys().cloned().collect(),
        refused: report.batch.refused,
        recovered: report.reconciled.recovered.clone(),
        still_down: report.reconciled.still_down.clone(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use remedy_common::config::{ExclusionScope, ExclusionSpec, SignalSpec};
    use remedy_common::mock::{MockActuator, MockOracle};
    use remedy_common::testing::init_test_logging;
    use remedy_common::{ActuationError, Entity, Outcome, RemediationRecord, RemedyConfig, Sample};
    use tempfile::TempDir;

    const SIGNAL: &str = "unreachable";
    const EXCLUSION: &str = "maintenance";

    struct Harness {
        ctx: RemedyContext<MockOracle, MockActuator>,
        oracle: MockOracle,
        actuator: MockActuator,
        dir: TempDir,
    }

    fn harness(dry_run: bool) -> Harness {
        init_test_logging();
        let dir = TempDir::new().unwrap();
        let mut config = RemedyConfig::default();
        config.selection.signals = vec![SignalSpec {
            name: "unreachable".to_string(),
            query: SIGNAL.to_string(),
        }];
        config.selection.exclusions = vec![ExclusionSpec {
            name: "maintenance".to_string(),
            query: EXCLUSION.to_string(),
            scope: ExclusionScope::Entity,
        }];
        config.store.path = dir.path().join("records.json");
        config.general.dry_run = dry_run;

        let oracle = MockOracle::new();
        oracle.register(EXCLUSION, vec![]);
        let actuator = MockActuator::new();
        let ctx = RemedyContext::new(&config, oracle.clone(), actuator.clone()).unwrap();
        Harness {
            ctx,
            oracle,
            actuator,
            dir,
        }
    }

    fn report_down(oracle: &MockOracle, names: &[&str]) {
        let samples = names
            .iter()
            .map(|n| Sample::new(&[("machine", n), ("site", "abc01")], 0.0))
            .collect();
        oracle.register(SIGNAL, samples);
    }

    fn record(name: &str, at: DateTime<Utc>, outcome: Outcome) -> (String, RemediationRecord) {
        let mut r = RemediationRecord::unresolved(Entity::new(name, "abc01"), at);
        r.outcome = outcome;
        (name.to_string(), r)
    }

    #[tokio::test]
    async fn test_first_time_candidates_are_remediated() {
        let h = harness(false);
        report_down(&h.oracle, &["A", "B"]);
        let now = Utc::now();
        let mut records = RecordMap::new();

        let report = run_cycle(&h.ctx, &mut records, now).await.unwrap();

        assert_eq!(h.actuator.calls(), vec!["A", "B"]);
        assert_eq!(report.batch.attempted.len(), 2);
        assert!(report.persisted);
        for name in ["A", "B"] {
            assert_eq!(records[name].outcome, Outcome::Unresolved);
            assert_eq!(records[name].last_action, now);
        }
        assert_eq!(h.ctx.store.load(), records);
    }

    #[tokio::test]
    async fn test_recent_candidate_is_reconciled_but_not_remediated() {
        let h = harness(false);
        report_down(&h.oracle, &["A", "B"]);
        let now = Utc::now();
        let an_hour_ago = now - TimeDelta::hours(1);
        let mut records: RecordMap = [record("A", an_hour_ago, Outcome::Unresolved)].into();

        let report = run_cycle(&h.ctx, &mut records, now).await.unwrap();

        assert_eq!(h.actuator.calls(), vec!["B"]);
        assert_eq!(records["A"].outcome, Outcome::ConfirmedStillDown);
        assert_eq!(records["A"].last_action, an_hour_ago);
        assert_eq!(records["B"].outcome, Outcome::Unresolved);
        assert_eq!(report.reconciled.still_down, vec!["A".to_string()]);
        assert_eq!(report.eligible, 1);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_refused_after_reconciliation() {
        let h = harness(false);
        let names = ["A", "B", "C", "D", "E", "F"];
        report_down(&h.oracle, &names);
        let now = Utc::now();
        let long_ago = now - TimeDelta::hours(30);
        let mut records: RecordMap = names
            .iter()
            .map(|n| record(n, long_ago, Outcome::Unresolved))
            .collect();

        let report = run_cycle(&h.ctx, &mut records, now).await.unwrap();

        assert!(h.actuator.calls().is_empty());
        assert!(report.batch.refused);
        assert_eq!(records.len(), 6);
        for r in records.values() {
            assert_eq!(r.outcome, Outcome::ConfirmedStillDown);
            assert_eq!(r.last_action, long_ago);
        }
        assert_eq!(h.ctx.metrics.refused_batches.get(), 1);
    }

    #[tokio::test]
    async fn test_oracle_failure_touches_nothing() {
        let h = harness(false);
        h.oracle
            .register_error(SIGNAL, OracleError::Transport("connection refused".into()));
        let before: RecordMap = [record("A", Utc::now() - TimeDelta::hours(2), Outcome::Unresolved)].into();
        let mut records = before.clone();

        let err = run_cycle(&h.ctx, &mut records, Utc::now()).await.unwrap_err();

        assert!(matches!(err, CycleError::Oracle(_)));
        assert!(!err.is_fatal());
        assert_eq!(records, before);
        assert!(h.actuator.calls().is_empty());
        assert!(!h.ctx.store.path().exists());
        assert_eq!(
            h.ctx.status.snapshot().last_cycle.unwrap().result,
            cycle_result::ORACLE_ERROR
        );
    }

    #[tokio::test]
    async fn test_failed_actuation_still_consumes_cooldown() {
        let h = harness(false);
        report_down(&h.oracle, &["A", "B"]);
        h.actuator
            .fail_for("A", ActuationError::Rejected { status: 503, body: "busy".into() });
        let now = Utc::now();
        let mut records = RecordMap::new();

        let report = run_cycle(&h.ctx, &mut records, now).await.unwrap();
        assert_eq!(report.batch.failures.len(), 1);
        assert_eq!(records["A"].last_action, now);

        // Next cycle, A is still down but inside its cooldown.
        let later = now + TimeDelta::minutes(5);
        let report = run_cycle(&h.ctx, &mut records, later).await.unwrap();
        assert_eq!(report.eligible, 0);
        assert_eq!(h.actuator.calls(), vec!["A", "B"]);
        assert_eq!(records["A"].outcome, Outcome::ConfirmedStillDown);
    }

    #[tokio::test]
    async fn test_excluded_candidates_are_not_remediated() {
        let h = harness(false);
        report_down(&h.oracle, &["A", "B"]);
        h.oracle
            .register(EXCLUSION, vec![Sample::new(&[("machine", "A")], 1.0)]);
        let mut records = RecordMap::new();

        let report = run_cycle(&h.ctx, &mut records, Utc::now()).await.unwrap();
        assert_eq!(report.raw_candidates, 2);
        assert_eq!(report.excluded, 1);
        assert_eq!(h.actuator.calls(), vec!["B"]);
    }

    #[tokio::test]
    async fn test_dry_run_neither_actuates_nor_persists() {
        let h = harness(true);
        report_down(&h.oracle, &["A"]);
        let mut records: RecordMap =
            [record("B", Utc::now() - TimeDelta::hours(2), Outcome::Unresolved)].into();

        let report = run_cycle(&h.ctx, &mut records, Utc::now()).await.unwrap();

        assert!(h.actuator.calls().is_empty());
        assert!(!report.persisted);
        assert!(!h.ctx.store.path().exists());
        assert_eq!(records["B"].outcome, Outcome::ConfirmedRecovered);
        assert!(!records.contains_key("A"));
    }

    #[tokio::test]
    async fn test_persistence_failure_is_fatal() {
        let mut h = harness(false);
        let blocker = h.dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        h.ctx.store = remedy_common::RecordStore::new(blocker.join("records.json"));
        report_down(&h.oracle, &["A"]);
        let mut records = RecordMap::new();

        let err = run_cycle(&h.ctx, &mut records, Utc::now()).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.code(), ErrorCode::PersistenceFailed);
    }
}

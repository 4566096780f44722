//! Per-entity remediation outcome state machine.
//!
//! ```text
//!              remediated                 next cycle: absent
//!   (none) ─────────────────▶ Unresolved ───────────────────▶ ConfirmedRecovered
//!                                 │
//!                                 │ next cycle: still a candidate
//!                                 ▼
//!                          ConfirmedStillDown
//! ```
//!
//! Both confirmed states are terminal until the entity is remediated
//! again, which resets it to `Unresolved`.

use crate::types::{CandidateSet, Entity, Outcome, RecordMap, RemediationRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Names of the records resolved by one [`reconcile`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub recovered: Vec<String>,
    pub still_down: Vec<String>,
}

impl ReconcileSummary {
    pub fn is_empty(&self) -> bool {
        self.recovered.is_empty() && self.still_down.is_empty()
    }
}

/// Resolve every `Unresolved` record against this cycle's raw candidates.
///
/// Must run before cooldown filtering, against the candidate set as the
/// selector produced it. Records already confirmed are left untouched, so
/// running it twice with the same candidates is a no-op the second time.
pub fn reconcile(candidates: &CandidateSet, records: &mut RecordMap) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();

    for (name, record) in records.iter_mut() {
        if record.outcome != Outcome::Unresolved {
            continue;
        }

        if candidates.contains(name) {
            record.outcome = Outcome::ConfirmedStillDown;
            summary.still_down.push(name.clone());
            info!(
                machine = %name,
                last_action = %record.last_action,
                "Machine is still unreachable after remediation"
            );
        } else {
            record.outcome = Outcome::ConfirmedRecovered;
            summary.recovered.push(name.clone());
            info!(
                machine = %name,
                last_action = %record.last_action,
                "Machine recovered after remediation"
            );
        }
    }

    summary
}

/// Create or overwrite the record of every attempted entity.
///
/// Every attempt consumes a cooldown slot whether or not the power-cycle
/// request itself succeeded.
pub fn record_attempts<'a>(
    attempted: impl IntoIterator<Item = &'a Entity>,
    records: &mut RecordMap,
    now: DateTime<Utc>,
) {
    for entity in attempted {
        records.insert(
            entity.name.clone(),
            RemediationRecord::unresolved(entity.clone(), now),
        );
    }
}

/// Count records per outcome, for status and metrics.
pub fn outcome_counts(records: &RecordMap) -> [(Outcome, usize); 3] {
    Outcome::ALL.map(|outcome| {
        (
            outcome,
            records.values().filter(|r| r.outcome == outcome).count(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn record(name: &str, outcome: Outcome) -> (String, RemediationRecord) {
        let mut r = RemediationRecord::unresolved(Entity::new(name, "s"), now() - TimeDelta::hours(2));
        r.outcome = outcome;
        (name.to_string(), r)
    }

    fn candidates(names: &[&str]) -> CandidateSet {
        names.iter().map(|n| Entity::new(*n, "s")).collect()
    }

    #[test]
    fn test_unresolved_absent_becomes_recovered() {
        let mut records: RecordMap = [record("a", Outcome::Unresolved)].into();
        let summary = reconcile(&candidates(&[]), &mut records);
        assert_eq!(records["a"].outcome, Outcome::ConfirmedRecovered);
        assert_eq!(summary.recovered, vec!["a".to_string()]);
    }

    #[test]
    fn test_unresolved_present_becomes_still_down() {
        let mut records: RecordMap = [record("a", Outcome::Unresolved)].into();
        let summary = reconcile(&candidates(&["a"]), &mut records);
        assert_eq!(records["a"].outcome, Outcome::ConfirmedStillDown);
        assert_eq!(summary.still_down, vec!["a".to_string()]);
    }

    #[test]
    fn test_confirmed_records_are_terminal() {
        let mut records: RecordMap = [
            record("r", Outcome::ConfirmedRecovered),
            record("d", Outcome::ConfirmedStillDown),
        ]
        .into();
        let summary = reconcile(&candidates(&["r"]), &mut records);
        assert!(summary.is_empty());
        assert_eq!(records["r"].outcome, Outcome::ConfirmedRecovered);
        assert_eq!(records["d"].outcome, Outcome::ConfirmedStillDown);
    }

    #[test]
    fn test_reconcile_keeps_last_action() {
        let mut records: RecordMap = [record("a", Outcome::Unresolved)].into();
        let before = records["a"].last_action;
        reconcile(&candidates(&["a"]), &mut records);
        assert_eq!(records["a"].last_action, before);
    }

    #[test]
    fn test_record_attempts_resets_to_unresolved() {
        let mut records: RecordMap = [record("a", Outcome::ConfirmedStillDown)].into();
        let attempted = vec![Entity::new("a", "s"), Entity::new("b", "t")];
        record_attempts(&attempted, &mut records, now());

        assert_eq!(records.len(), 2);
        for name in ["a", "b"] {
            assert_eq!(records[name].outcome, Outcome::Unresolved);
            assert_eq!(records[name].last_action, now());
        }
        assert_eq!(records["b"].entity.site, "t");
    }

    #[test]
    fn test_outcome_counts() {
        let records: RecordMap = [
            record("a", Outcome::Unresolved),
            record("b", Outcome::ConfirmedStillDown),
            record("c", Outcome::ConfirmedStillDown),
        ]
        .into();
        let counts = outcome_counts(&records);
        assert_eq!(counts[0], (Outcome::Unresolved, 1));
        assert_eq!(counts[1], (Outcome::ConfirmedRecovered, 0));
        assert_eq!(counts[2], (Outcome::ConfirmedStillDown, 2));
    }

    fn arb_outcome() -> impl Strategy<Value = Outcome> {
        prop_oneof![
            Just(Outcome::Unresolved),
            Just(Outcome::ConfirmedRecovered),
            Just(Outcome::ConfirmedStillDown),
        ]
    }

    proptest! {
        #[test]
        fn prop_reconcile_is_idempotent(
            entries in proptest::collection::btree_map("[a-f]{1,3}", arb_outcome(), 0..12),
            present in proptest::collection::btree_set("[a-f]{1,3}", 0..12),
        ) {
            let mut records: RecordMap = entries.iter().map(|(n, o)| record(n, *o)).collect();
            let cands: CandidateSet = present.iter().map(|n| Entity::new(n.clone(), "s")).collect();

            reconcile(&cands, &mut records);
            let once = records.clone();
            let second = reconcile(&cands, &mut records);

            prop_assert!(second.is_empty());
            prop_assert_eq!(&records, &once);
            prop_assert!(records.values().all(|r| r.outcome.is_resolved()));
        }

        #[test]
        fn prop_reconcile_follows_candidacy(
            entries in proptest::collection::btree_set("[a-f]{1,3}", 0..12),
            present in proptest::collection::btree_set("[a-f]{1,3}", 0..12),
        ) {
            let mut records: RecordMap =
                entries.iter().map(|n| record(n, Outcome::Unresolved)).collect();
            let cands: CandidateSet = present.iter().map(|n| Entity::new(n.clone(), "s")).collect();

            reconcile(&cands, &mut records);
            for (name, r) in &records {
                let expected = if present.contains(name) {
                    Outcome::ConfirmedStillDown
                } else {
                    Outcome::ConfirmedRecovered
                };
                prop_assert_eq!(r.outcome, expected);
            }
        }
    }
}

//! Cooldown filter.
//!
//! Drops candidates that were remediated within the refractory window so a
//! machine that reboots, briefly reports healthy and drops again is not
//! power-cycled on every cycle.

use crate::types::{CandidateSet, RecordMap};
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tracing::info;

/// Default cooldown window.
pub const DEFAULT_COOLDOWN_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Return the candidates whose cooldown has expired.
///
/// A candidate passes if it has no record, or if strictly more than
/// `window` has elapsed since its last action. A remediation exactly at the
/// boundary is still recent. `records` is never modified.
pub fn filter_recent(
    candidates: &CandidateSet,
    records: &RecordMap,
    window: Duration,
    now: DateTime<Utc>,
) -> CandidateSet {
    let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);

    candidates
        .iter()
        .filter(|entity| match records.get(&entity.name) {
            None => true,
            Some(record) => {
                let expired = now.signed_duration_since(record.last_action) > window;
                if !expired {
                    info!(
                        machine = %entity.name,
                        last_action = %record.last_action,
                        "Machine was remediated recently, skipping it"
                    );
                }
                expired
            }
        })
        .cloned()
        .collect()
}

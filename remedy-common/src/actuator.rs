//! Actuation seam and the throttled batch actuator.

use crate::errors::ErrorCode;
use crate::types::{CandidateSet, Entity};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Default batch safety threshold.
pub const DEFAULT_BATCH_THRESHOLD: usize = 5;

/// Default per-call actuation timeout.
pub const DEFAULT_ACTUATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors raised by a single power-cycle request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuationError {
    #[error("command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("failed to spawn command: {0}")]
    Spawn(String),

    #[error("reboot API returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("reboot API unreachable: {0}")]
    Transport(String),

    #[error("power-cycle timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),
}

impl ActuationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::CommandFailed { .. } | Self::Rejected { .. } | Self::Transport(_) => {
                ErrorCode::ActuationFailed
            }
            Self::Spawn(_) => ErrorCode::ActuationSpawnFailed,
            Self::Timeout(_) => ErrorCode::ActuationTimeout,
        }
    }
}

/// Something that can power-cycle one entity.
pub trait Actuator: Send + Sync {
    fn power_cycle(&self, entity: &Entity) -> impl Future<Output = Result<(), ActuationError>> + Send;
}

/// Result of one [`ThrottledActuator::remediate`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Entities a power-cycle was requested for, in request order.
    pub attempted: Vec<Entity>,
    /// Failed requests keyed by entity name. Absent key means success.
    pub failures: BTreeMap<String, ActuationError>,
    /// Set when the batch exceeded the safety threshold and nothing was done.
    pub refused: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &Entity> {
        self.attempted
            .iter()
            .filter(|e| !self.failures.contains_key(&e.name))
    }

    pub fn success_count(&self) -> usize {
        self.attempted.len() - self.failures.len()
    }
}

/// Applies the batch policy over any [`Actuator`].
///
/// Empty batches do nothing. Batches larger than `threshold` are refused
/// whole. Otherwise every entity is power-cycled once, sequentially, each
/// request bounded by `timeout`; one failure never stops the others.
#[derive(Debug, Clone)]
pub struct ThrottledActuator<A> {
    inner: A,
    threshold: usize,
    timeout: Duration,
}

impl<A: Actuator> ThrottledActuator<A> {
    pub fn new(inner: A, threshold: usize, timeout: Duration) -> Self {
        Self {
            inner,
            threshold,
            timeout,
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub async fn remediate(&self, batch: &CandidateSet) -> BatchReport {
        let mut report = BatchReport::default();

        if batch.is_empty() {
            debug!("No machines to remediate");
            return report;
        }

        if batch.len() > self.threshold {
            warn!(
                code = %ErrorCode::ActuationBatchRefused.code_string(),
                batch = batch.len(),
                threshold = self.threshold,
                "Too many machines to remediate at once, refusing the whole batch"
            );
            report.refused = true;
            return report;
        }

        for entity in batch {
            info!(machine = %entity.name, site = %entity.site, "Power-cycling machine");
            report.attempted.push(entity.clone());

            let result = match tokio::time::timeout(self.timeout, self.inner.power_cycle(entity)).await {
                Ok(result) => result,
                Err(_) => Err(ActuationError::Timeout(self.timeout)),
            };

            if let Err(e) = result {
                error!(
                    machine = %entity.name,
                    site = %entity.site,
                    code = %e.code().code_string(),
                    "Power-cycle failed: {}", e
                );
                report.failures.insert(entity.name.clone(), e);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockActuator;

    fn batch(names: &[&str]) -> CandidateSet {
        names.iter().map(|n| Entity::new(*n, "site")).collect()
    }

    #[tokio::test]
    async fn test_empty_batch_does_nothing() {
        let mock = MockActuator::new();
        let throttled = ThrottledActuator::new(mock.clone(), 5, Duration::from_secs(1));
        let report = throttled.remediate(&CandidateSet::new()).await;
        assert_eq!(report, BatchReport::default());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_batch_is_refused() {
        let mock = MockActuator::new();
        let throttled = ThrottledActuator::new(mock.clone(), 5, Duration::from_secs(1));
        let report = throttled
            .remediate(&batch(&["a", "b", "c", "d", "e", "f"]))
            .await;
        assert!(report.refused);
        assert!(report.attempted.is_empty());
        assert!(report.failures.is_empty());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_batch_at_threshold_is_allowed() {
        let mock = MockActuator::new();
        let throttled = ThrottledActuator::new(mock.clone(), 3, Duration::from_secs(1));
        let report = throttled.remediate(&batch(&["a", "b", "c"])).await;
        assert!(!report.refused);
        assert_eq!(report.attempted.len(), 3);
        assert_eq!(mock.calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failures_are_independent() {
        let mock = MockActuator::new();
        mock.fail_for("b", ActuationError::Rejected { status: 500, body: "drac busy".into() });
        let throttled = ThrottledActuator::new(mock.clone(), 5, Duration::from_secs(1));

        let report = throttled.remediate(&batch(&["a", "b", "c"])).await;
        assert_eq!(mock.calls(), vec!["a", "b", "c"]);
        assert_eq!(report.attempted.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures["b"], ActuationError::Rejected { status: 500, .. }));
        assert_eq!(report.success_count(), 2);
        let ok: Vec<&str> = report.succeeded().map(|e| e.name.as_str()).collect();
        assert_eq!(ok, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_slow_call_times_out_per_entity() {
        let mock = MockActuator::new().with_delay(Duration::from_millis(500));
        let throttled = ThrottledActuator::new(mock.clone(), 5, Duration::from_millis(20));

        let report = throttled.remediate(&batch(&["a", "b"])).await;
        assert_eq!(report.attempted.len(), 2);
        assert_eq!(
            report.failures.get("a"),
            Some(&ActuationError::Timeout(Duration::from_millis(20)))
        );
        assert_eq!(report.failures["a"].code(), ErrorCode::ActuationTimeout);
    }
}

//! In-memory oracle and actuator for tests.
//!
//! Both mocks are cheap to clone; clones share state, so a test can hand
//! one clone to the code under test and inspect the other afterwards.

use crate::actuator::{ActuationError, Actuator};
use crate::oracle::{Oracle, OracleError, Sample};
use crate::types::Entity;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct OracleState {
    responses: HashMap<String, Result<Vec<Sample>, OracleError>>,
    calls: Vec<String>,
}

/// Oracle answering from a table of canned responses.
///
/// Queries with no registered response fail with
/// [`OracleError::Query`], so a test never silently gets an empty result.
#[derive(Debug, Clone, Default)]
pub struct MockOracle {
    state: Arc<Mutex<OracleState>>,
    delay: Option<Duration>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every evaluation, for timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn register(&self, query: impl Into<String>, samples: Vec<Sample>) {
        self.lock().responses.insert(query.into(), Ok(samples));
    }

    pub fn register_error(&self, query: impl Into<String>, error: OracleError) {
        self.lock().responses.insert(query.into(), Err(error));
    }

    pub fn unregister(&self, query: &str) {
        self.lock().responses.remove(query);
    }

    /// Queries evaluated so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OracleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Oracle for MockOracle {
    async fn evaluate(&self, query: &str, _at: DateTime<Utc>) -> Result<Vec<Sample>, OracleError> {
        let response = {
            let mut state = self.lock();
            state.calls.push(query.to_string());
            state.responses.get(query).cloned()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        response.unwrap_or_else(|| {
            Err(OracleError::Query {
                error_type: "mock".to_string(),
                message: format!("no response registered for {query:?}"),
            })
        })
    }
}

#[derive(Debug, Default)]
struct ActuatorState {
    calls: Vec<String>,
    failures: HashMap<String, ActuationError>,
}

/// Actuator that records requests and fails on demand.
#[derive(Debug, Clone, Default)]
pub struct MockActuator {
    state: Arc<Mutex<ActuatorState>>,
    delay: Option<Duration>,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every request for `name` fail with `error`.
    pub fn fail_for(&self, name: impl Into<String>, error: ActuationError) {
        self.lock().failures.insert(name.into(), error);
    }

    /// Entity names a power-cycle was requested for, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ActuatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Actuator for MockActuator {
    async fn power_cycle(&self, entity: &Entity) -> Result<(), ActuationError> {
        let failure = {
            let mut state = self.lock();
            state.calls.push(entity.name.clone());
            state.failures.get(&entity.name).cloned()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_oracle_answers_registered_queries() {
        let oracle = MockOracle::new();
        oracle.register("up == 0", vec![Sample::new(&[("machine", "a")], 0.0)]);

        let samples = oracle.evaluate("up == 0", Utc::now()).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(oracle.calls(), vec!["up == 0"]);
    }

    #[tokio::test]
    async fn test_mock_oracle_unknown_query_fails() {
        let oracle = MockOracle::new();
        let err = oracle.evaluate("unknown", Utc::now()).await.unwrap_err();
        assert!(matches!(err, OracleError::Query { .. }));
    }

    #[tokio::test]
    async fn test_mock_oracle_unregister() {
        let oracle = MockOracle::new();
        oracle.register("q", vec![]);
        oracle.unregister("q");
        assert!(oracle.evaluate("q", Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_actuator_clones_share_state() {
        let actuator = MockActuator::new();
        let handle = actuator.clone();
        handle.fail_for("b", ActuationError::Transport("down".into()));

        assert!(actuator.power_cycle(&Entity::new("a", "s")).await.is_ok());
        assert!(actuator.power_cycle(&Entity::new("b", "s")).await.is_err());
        assert_eq!(handle.calls(), vec!["a", "b"]);
    }
}

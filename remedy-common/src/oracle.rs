//! Telemetry oracle seam.
//!
//! The oracle evaluates an opaque query at a point in time and returns a
//! multiset of labelled samples. What the query language is, and how the
//! daemon talks to the backend, live behind [`Oracle`].

use crate::errors::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// One `(labelset, value)` element of a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn new(labels: &[(&str, &str)], value: f64) -> Self {
        Self {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// Errors raised while evaluating a query.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("oracle unreachable: {0}")]
    Transport(String),

    #[error("query rejected ({error_type}): {message}")]
    Query { error_type: String, message: String },

    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("query timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),
}

impl OracleError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::OracleUnavailable,
            Self::Query { .. } => ErrorCode::OracleQueryRejected,
            Self::MalformedResponse(_) => ErrorCode::OracleMalformedResponse,
            Self::Timeout(_) => ErrorCode::OracleTimeout,
        }
    }
}

/// A telemetry backend that can evaluate instant queries.
pub trait Oracle: Send + Sync {
    fn evaluate(
        &self,
        query: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Sample>, OracleError>> + Send;
}

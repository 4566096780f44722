//! Shared building blocks for the Remedy fleet remediation loop.
//!
//! This crate holds everything that does not talk to the network: the
//! entity model and record store, the cooldown and outcome decision logic,
//! the oracle and actuator seams with the throttled batch actuator, the
//! configuration system and the error catalog.

pub mod actuator;
pub mod config;
pub mod cooldown;
pub mod errors;
pub mod mock;
pub mod oracle;
pub mod outcome;
pub mod store;
pub mod testing;
pub mod types;

pub use actuator::{ActuationError, Actuator, BatchReport, ThrottledActuator};
pub use config::{ConfigError, RemedyConfig};
pub use cooldown::filter_recent;
pub use errors::{ErrorCategory, ErrorCode, ErrorEntry};
pub use oracle::{Oracle, OracleError, Sample};
pub use outcome::{ReconcileSummary, reconcile, record_attempts};
pub use store::{RecordStore, StoreError};
pub use types::{CandidateSet, Entity, Outcome, RecordMap, RemediationRecord};

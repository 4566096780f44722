//! Everything a cycle needs, passed explicitly.

use crate::metrics::RemedyMetrics;
use crate::selector::CandidateSelector;
use crate::status::StatusBoard;
use remedy_common::{Actuator, Oracle, RecordStore, RemedyConfig, ThrottledActuator};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid selection.site_pattern: {0}")]
    SitePattern(#[from] regex::Error),

    #[error("failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// The collaborators and policy of the remediation loop.
///
/// Built once at startup and borrowed by every cycle. Shared handles
/// (`metrics`, `status`) are the only parts other tasks see.
pub struct RemedyContext<O, A> {
    pub oracle: O,
    pub selector: CandidateSelector,
    pub actuator: ThrottledActuator<A>,
    pub store: RecordStore,
    pub cooldown: Duration,
    pub dry_run: bool,
    pub metrics: Arc<RemedyMetrics>,
    pub status: StatusBoard,
}

impl<O: Oracle, A: Actuator> RemedyContext<O, A> {
    pub fn new(config: &RemedyConfig, oracle: O, actuator: A) -> Result<Self, ContextError> {
        Ok(Self {
            oracle,
            selector: CandidateSelector::new(&config.selection, config.oracle.timeout)?,
            actuator: ThrottledActuator::new(
                actuator,
                config.actuation.batch_threshold,
                config.actuation.timeout,
            ),
            store: RecordStore::new(&config.store.path),
            cooldown: config.cooldown.window,
            dry_run: config.general.dry_run,
            metrics: Arc::new(RemedyMetrics::new()?),
            status: StatusBoard::new(),
        })
    }
}

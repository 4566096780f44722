//! Snapshot board shared between the scheduler and HTTP handlers.
//!
//! The scheduler owns the record map; handlers only ever see the copy
//! published here at the end of each cycle.

use chrono::{DateTime, Utc};
use remedy_common::RecordMap;
use serde::Serialize;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
    Sleeping,
    Stopped,
}

/// What happened in one cycle, as shown on `/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: String,
    pub dry_run: bool,
    pub candidates: usize,
    pub excluded: usize,
    pub eligible: usize,
    pub attempted: Vec<String>,
    pub failed: Vec<String>,
    pub refused: bool,
    pub recovered: Vec<String>,
    pub still_down: Vec<String>,
    pub error: Option<String>,
}

impl CycleSummary {
    /// A cycle that stopped on `error` before doing anything.
    pub fn failed(
        started_at: DateTime<Utc>,
        result: &str,
        dry_run: bool,
        error: impl ToString,
    ) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            result: result.to_string(),
            dry_run,
            candidates: 0,
            excluded: 0,
            eligible: 0,
            attempted: Vec::new(),
            failed: Vec::new(),
            refused: false,
            recovered: Vec::new(),
            still_down: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: SchedulerState,
    pub cycles: u64,
    pub last_cycle: Option<CycleSummary>,
    pub next_cycle_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub records: RecordMap,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            cycles: 0,
            last_cycle: None,
            next_cycle_at: None,
            records: RecordMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StatusSnapshot> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StatusSnapshot> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_state(&self, state: SchedulerState) {
        let mut snapshot = self.write();
        snapshot.state = state;
        if state != SchedulerState::Sleeping {
            snapshot.next_cycle_at = None;
        }
    }

    pub fn set_sleeping_until(&self, at: DateTime<Utc>) {
        let mut snapshot = self.write();
        snapshot.state = SchedulerState::Sleeping;
        snapshot.next_cycle_at = Some(at);
    }

    /// Record a finished cycle, with a copy of the record map when the
    /// cycle produced one.
    pub fn publish(&self, summary: CycleSummary, records: Option<&RecordMap>) {
        let mut snapshot = self.write();
        snapshot.cycles += 1;
        snapshot.last_cycle = Some(summary);
        if let Some(records) = records {
            snapshot.records = records.clone();
        }
    }

    /// Seed the record copy before the first cycle.
    pub fn set_records(&self, records: &RecordMap) {
        self.write().records = records.clone();
    }

    pub fn state(&self) -> SchedulerState {
        self.read().state
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.read().clone()
    }

    pub fn records(&self) -> RecordMap {
        self.read().records.clone()
    }
}

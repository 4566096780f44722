//! Cycle driver.
//!
//! Cycles run back to back with a jittered sleep in between. Shutdown
//! interrupts the sleep immediately; a cycle already running is always
//! allowed to finish so a batch is never abandoned half-issued.

use crate::context::RemedyContext;
use crate::cycle::{CycleError, CycleReport, run_cycle};
use crate::jitter::JitteredDelay;
use crate::status::SchedulerState;
use chrono::{TimeDelta, Utc};
use remedy_common::{Actuator, Oracle, RecordMap};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct Scheduler<O, A> {
    ctx: RemedyContext<O, A>,
    records: RecordMap,
    delay: JitteredDelay,
    shutdown: watch::Receiver<bool>,
}

impl<O: Oracle, A: Actuator> Scheduler<O, A> {
    /// `records` is the map loaded from the store at startup; the
    /// scheduler owns it from here on.
    pub fn new(
        ctx: RemedyContext<O, A>,
        records: RecordMap,
        delay: JitteredDelay,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        ctx.status.set_records(&records);
        ctx.metrics.observe_records(&records);
        Self {
            ctx,
            records,
            delay,
            shutdown,
        }
    }

    pub fn context(&self) -> &RemedyContext<O, A> {
        &self.ctx
    }

    pub fn records(&self) -> &RecordMap {
        &self.records
    }

    /// Run exactly one cycle and stop.
    pub async fn run_once(&mut self) -> Result<CycleReport, CycleError> {
        self.ctx.status.set_state(SchedulerState::Running);
        let result = run_cycle(&self.ctx, &mut self.records, Utc::now()).await;
        self.ctx.status.set_state(SchedulerState::Stopped);
        result
    }

    /// Run cycles until shutdown is signalled or persistence fails.
    pub async fn run(&mut self) -> Result<(), CycleError> {
        info!(dry_run = self.ctx.dry_run, "Scheduler started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            self.ctx.status.set_state(SchedulerState::Running);
            match run_cycle(&self.ctx, &mut self.records, Utc::now()).await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    error!(code = %e.code().code_string(), "Stopping scheduler: {}", e);
                    self.ctx.status.set_state(SchedulerState::Stopped);
                    return Err(e);
                }
                Err(e) => warn!("Cycle skipped: {}", e),
            }

            let delay = self.delay.next_delay();
            self.ctx.metrics.next_cycle_delay.set(delay.as_secs_f64());
            match TimeDelta::from_std(delay)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d))
            {
                Some(at) => self.ctx.status.set_sleeping_until(at),
                None => self.ctx.status.set_state(SchedulerState::Sleeping),
            }
            debug!("Next cycle in {}", humantime::format_duration(delay));

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut self.shutdown) => {
                    info!("Shutdown requested during sleep");
                    break;
                }
            }
        }

        self.ctx.status.set_state(SchedulerState::Stopped);
        info!("Scheduler stopped");
        Ok(())
    }
}

/// Resolves once `true` is sent. A dropped sender means nobody can ask
/// for shutdown any more, so this never resolves.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_common::config::SignalSpec;
    use remedy_common::mock::{MockActuator, MockOracle};
    use remedy_common::testing::init_test_logging;
    use remedy_common::{OracleError, RecordStore, RemedyConfig, Sample};
    use std::time::Duration;
    use tempfile::TempDir;

    const SIGNAL: &str = "unreachable";

    fn setup(dir: &TempDir) -> (RemedyContext<MockOracle, MockActuator>, MockOracle, MockActuator) {
        setup_with(dir, MockActuator::new())
    }

    fn setup_with(
        dir: &TempDir,
        actuator: MockActuator,
    ) -> (RemedyContext<MockOracle, MockActuator>, MockOracle, MockActuator) {
        init_test_logging();
        let mut config = RemedyConfig::default();
        config.selection.signals = vec![SignalSpec {
            name: "unreachable".to_string(),
            query: SIGNAL.to_string(),
        }];
        config.selection.exclusions.clear();
        config.store.path = dir.path().join("records.json");
        let oracle = MockOracle::new();
        let ctx = RemedyContext::new(&config, oracle.clone(), actuator.clone()).unwrap();
        (ctx, oracle, actuator)
    }

    fn fixed(delay: Duration) -> JitteredDelay {
        JitteredDelay::with_seed(delay, delay, delay, 7)
    }

    async fn wait_for_cycles(status: &crate::status::StatusBoard, n: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while status.snapshot().cycles < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("cycles did not run");
    }

    #[tokio::test]
    async fn test_run_once_returns_after_one_cycle() {
        let dir = TempDir::new().unwrap();
        let (ctx, oracle, actuator) = setup(&dir);
        oracle.register(SIGNAL, vec![Sample::new(&[("machine", "m1")], 0.0)]);
        let (_tx, rx) = watch::channel(false);
        let mut scheduler = Scheduler::new(ctx, RecordMap::new(), fixed(Duration::from_secs(3600)), rx);

        let report = scheduler.run_once().await.unwrap();

        assert_eq!(report.batch.attempted.len(), 1);
        assert_eq!(actuator.calls(), vec!["m1"]);
        assert!(scheduler.records().contains_key("m1"));
        assert_eq!(scheduler.context().status.state(), SchedulerState::Stopped);
        assert_eq!(RecordStore::new(dir.path().join("records.json")).load().len(), 1);
    }

    #[tokio::test]
    async fn test_run_once_surfaces_oracle_error() {
        let dir = TempDir::new().unwrap();
        let (ctx, oracle, _actuator) = setup(&dir);
        oracle.register_error(SIGNAL, OracleError::Transport("refused".into()));
        let (_tx, rx) = watch::channel(false);
        let mut scheduler = Scheduler::new(ctx, RecordMap::new(), fixed(Duration::from_secs(1)), rx);

        let err = scheduler.run_once().await.unwrap_err();
        assert!(matches!(err, CycleError::Oracle(_)));
        assert!(!dir.path().join("records.json").exists());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_sleep() {
        let dir = TempDir::new().unwrap();
        let (ctx, oracle, _actuator) = setup(&dir);
        oracle.register(SIGNAL, vec![]);
        let status = ctx.status.clone();
        let (tx, rx) = watch::channel(false);
        let mut scheduler = Scheduler::new(ctx, RecordMap::new(), fixed(Duration::from_secs(3600)), rx);
        let handle = tokio::spawn(async move { scheduler.run().await });

        wait_for_cycles(&status, 1).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(status.state(), SchedulerState::Stopped);
        assert_eq!(status.snapshot().cycles, 1);
    }

    #[tokio::test]
    async fn test_oracle_errors_do_not_stop_the_loop() {
        let dir = TempDir::new().unwrap();
        let (ctx, oracle, actuator) = setup(&dir);
        oracle.register_error(SIGNAL, OracleError::Timeout(Duration::from_secs(1)));
        let status = ctx.status.clone();
        let (tx, rx) = watch::channel(false);
        let mut scheduler = Scheduler::new(ctx, RecordMap::new(), fixed(Duration::from_millis(10)), rx);
        let handle = tokio::spawn(async move { scheduler.run().await });

        wait_for_cycles(&status, 3).await;
        tx.send(true).unwrap();

        assert!(handle.await.unwrap().is_ok());
        assert!(actuator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_stops_the_loop() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, oracle, _actuator) = setup(&dir);
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        ctx.store = RecordStore::new(blocker.join("records.json"));
        oracle.register(SIGNAL, vec![]);
        let (_tx, rx) = watch::channel(false);
        let mut scheduler = Scheduler::new(ctx, RecordMap::new(), fixed(Duration::from_millis(10)), rx);

        let result = tokio::time::timeout(Duration::from_secs(2), scheduler.run())
            .await
            .expect("scheduler kept running");
        assert!(result.unwrap_err().is_fatal());
        assert_eq!(scheduler.context().status.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_dropped_sender_keeps_running() {
        let dir = TempDir::new().unwrap();
        let (ctx, oracle, _actuator) = setup(&dir);
        oracle.register(SIGNAL, vec![]);
        let status = ctx.status.clone();
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let mut scheduler = Scheduler::new(ctx, RecordMap::new(), fixed(Duration::from_millis(5)), rx);
        let handle = tokio::spawn(async move { scheduler.run().await });

        wait_for_cycles(&status, 3).await;
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_pre_signalled_shutdown_runs_no_cycle() {
        let dir = TempDir::new().unwrap();
        let (ctx, oracle, _actuator) = setup(&dir);
        let (_tx, rx) = watch::channel(true);
        let mut scheduler = Scheduler::new(ctx, RecordMap::new(), fixed(Duration::from_millis(5)), rx);

        scheduler.run().await.unwrap();
        assert!(oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_during_batch_lets_the_cycle_finish() {
        let dir = TempDir::new().unwrap();
        let (ctx, oracle, actuator) =
            setup_with(&dir, MockActuator::new().with_delay(Duration::from_millis(150)));
        oracle.register(
            SIGNAL,
            vec![
                Sample::new(&[("machine", "m1")], 0.0),
                Sample::new(&[("machine", "m2")], 0.0),
            ],
        );
        let status = ctx.status.clone();
        let (tx, rx) = watch::channel(false);
        let mut scheduler = Scheduler::new(ctx, RecordMap::new(), fixed(Duration::from_secs(3600)), rx);
        let handle = tokio::spawn(async move { scheduler.run().await });

        // First power-cycle request is in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(status.state(), SchedulerState::Running);
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(actuator.calls(), vec!["m1", "m2"]);
        let stored = RecordStore::new(dir.path().join("records.json")).load();
        assert_eq!(stored.len(), 2);
        assert_eq!(status.snapshot().cycles, 1);
        assert_eq!(status.state(), SchedulerState::Stopped);
    }
}

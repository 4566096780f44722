//! Remedy - Fleet Remediation Daemon
//!
//! Watches Prometheus for machines that stopped answering, power-cycles
//! them through a bounded actuator, and remembers what it did so a flapping
//! machine is not rebooted again until its cooldown has passed.

#![forbid(unsafe_code)]

mod actuation;
mod context;
mod credentials;
mod cycle;
mod http_api;
mod jitter;
mod metrics;
mod prometheus_api;
mod scheduler;
mod selector;
mod status;

use anyhow::{Context, Result};
use clap::Parser;
use remedy_common::config::{ConfigSource, validate_config};
use remedy_common::{ConfigError, ErrorCode, RemedyConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use actuation::ActuatorBackend;
use context::RemedyContext;
use credentials::{CredentialScope, Credentials};
use http_api::HttpState;
use jitter::JitteredDelay;
use prometheus_api::PrometheusOracle;
use scheduler::Scheduler;

#[derive(Parser, Debug)]
#[command(name = "remedyd")]
#[command(author, version, about = "Remedy daemon - power-cycles unreachable fleet machines")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "REMEDY_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Select and reconcile, but never power-cycle or write the store
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Address for the metrics and status endpoints
    #[arg(long)]
    listen: Option<String>,

    /// Do not serve the metrics and status endpoints
    #[arg(long)]
    no_http: bool,

    /// Path to the remediation record store
    #[arg(long)]
    store: Option<PathBuf>,

    /// Prometheus base URL
    #[arg(long)]
    oracle_url: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

impl Cli {
    /// Apply command-line overrides and return the keys they set.
    fn apply(&self, config: &mut RemedyConfig) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.once {
            config.general.once = true;
            keys.push("general.once");
        }
        if self.dry_run {
            config.general.dry_run = true;
            keys.push("general.dry_run");
        }
        if let Some(listen) = &self.listen {
            config.http.listen = listen.clone();
            keys.push("http.listen");
        }
        if self.no_http {
            config.http.enabled = false;
            keys.push("http.enabled");
        }
        if let Some(store) = &self.store {
            config.store.path = store.clone();
            keys.push("store.path");
        }
        if let Some(url) = &self.oracle_url {
            config.oracle.url = url.clone();
            keys.push("oracle.url");
        }
        keys
    }
}

fn init_logging(level: &str, verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

/// Log a startup failure with its catalog code and remediation steps.
fn startup_error<E>(code: ErrorCode, err: E) -> anyhow::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let entry = code.entry();
    error!(code = %entry.code, category = %entry.category, "{}: {}", entry, err);
    for step in &entry.remediation {
        info!(code = %entry.code, "Remediation: {}", step);
    }
    err.into()
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received"),
        _ = terminate => info!("SIGTERM received"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, mut sources) = match RemedyConfig::load(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            // No configured level yet.
            init_logging("info", cli.verbose, cli.log_json);
            return Err(startup_error(e.code(), e));
        }
    };
    for key in cli.apply(&mut config) {
        sources.insert(key.to_string(), ConfigSource::CommandLine);
    }

    init_logging(&config.general.log_level, cli.verbose, cli.log_json);
    for (key, source) in &sources {
        debug!("{} set from {}", key, source);
    }

    let findings = validate_config(&config);
    let errors = findings.iter().filter(|f| f.is_error()).count();
    for finding in &findings {
        if finding.is_error() {
            error!("Invalid configuration: {}", finding);
        } else {
            warn!("Configuration: {}", finding);
        }
    }
    if errors > 0 {
        let e = ConfigError::Validation(
            findings
                .iter()
                .filter(|f| f.is_error())
                .map(ToString::to_string)
                .collect(),
        );
        return Err(startup_error(e.code(), e));
    }
    if cli.check_config {
        println!("Configuration OK ({} warning(s))", findings.len());
        return Ok(());
    }

    info!("Starting remedy daemon...");

    let oracle_credentials = Credentials::resolve(
        CredentialScope::Oracle,
        config.oracle.credentials_file.as_deref(),
    )
    .map_err(|e| startup_error(e.code(), e))?;
    let reboot_credentials = Credentials::resolve(
        CredentialScope::Reboot,
        config.actuation.http.credentials_file.as_deref(),
    )
    .map_err(|e| startup_error(e.code(), e))?;

    let oracle = PrometheusOracle::new(
        &config.oracle.url,
        config.oracle.timeout,
        oracle_credentials,
    )
    .map_err(|e| startup_error(e.code(), e))?;
    let actuator = ActuatorBackend::from_config(&config.actuation, reboot_credentials)
        .map_err(|e| startup_error(e.code(), e))?;
    info!(
        "Oracle {}, actuation backend {}, batch threshold {}",
        config.oracle.url,
        actuator.kind().as_str(),
        config.actuation.batch_threshold
    );
    if config.general.dry_run {
        info!("Dry run: no machine will be power-cycled and the store will not be written");
    }

    let ctx = RemedyContext::new(&config, oracle, actuator)?;
    let records = ctx.store.load();
    info!("Loaded {} remediation records from {:?}", records.len(), ctx.store.path());

    let http_state = HttpState {
        metrics: ctx.metrics.clone(),
        status: ctx.status.clone(),
        version: env!("CARGO_PKG_VERSION"),
        started_at: Instant::now(),
        pid: std::process::id(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut scheduler = Scheduler::new(
        ctx,
        records,
        JitteredDelay::from_config(&config.scheduler),
        shutdown_rx.clone(),
    );

    if config.general.once {
        let report = scheduler.run_once().await?;
        info!(
            "Single cycle done: {} candidates, {} eligible, {} power-cycled, {} failed{}",
            report.candidates,
            report.eligible,
            report.batch.success_count(),
            report.batch.failures.len(),
            if report.batch.refused { ", batch refused" } else { "" }
        );
        return Ok(());
    }

    let server = if config.http.enabled {
        let addr: SocketAddr = config
            .http
            .listen
            .parse()
            .with_context(|| format!("invalid http.listen address {:?}", config.http.listen))?;
        Some(http_api::start_server(addr, http_state, shutdown_rx).await?)
    } else {
        None
    };

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(true);
    });

    let result = scheduler.run().await;
    let _ = shutdown_tx.send(true);

    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("HTTP server error: {}", e),
            Err(e) => warn!("HTTP server task failed: {}", e),
        }
    }

    result?;
    info!("Remedy daemon stopped");
    Ok(())
}

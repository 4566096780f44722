//! Startup validation of a fully layered configuration.

use super::settings::{BackendKind, RemedyConfig};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    pub severity: Severity,
    pub field: String,
    pub message: String,
}

impl ConfigWarning {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            field: field.to_string(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const MIN_SANE_ACTUATION_TIMEOUT: Duration = Duration::from_secs(10);
const LARGE_BATCH_THRESHOLD: usize = 20;

fn human(d: Duration) -> humantime::FormattedDuration {
    humantime::format_duration(d)
}

/// Check a configuration. Findings with [`Severity::Error`] must stop
/// startup; warnings are only logged.
pub fn validate_config(config: &RemedyConfig) -> Vec<ConfigWarning> {
    let mut findings = Vec::new();
    let selection = &config.selection;
    let scheduler = &config.scheduler;

    if selection.lookback_minutes == 0 {
        findings.push(ConfigWarning::error(
            "selection.lookback_minutes",
            "must be at least 1",
        ));
    }
    if selection.signals.is_empty() {
        findings.push(ConfigWarning::error(
            "selection.signals",
            "at least one unreachability signal is required",
        ));
    }
    for signal in &selection.signals {
        if signal.query.trim().is_empty() {
            findings.push(ConfigWarning::error(
                "selection.signals",
                format!("signal '{}' has an empty query", signal.name),
            ));
        }
    }
    for exclusion in &selection.exclusions {
        if exclusion.query.trim().is_empty() {
            findings.push(ConfigWarning::error(
                "selection.exclusions",
                format!("exclusion '{}' has an empty query", exclusion.name),
            ));
        }
    }
    if selection.name_labels.is_empty() {
        findings.push(ConfigWarning::error(
            "selection.name_labels",
            "at least one label must identify the machine",
        ));
    }
    if let Err(e) = regex::Regex::new(&selection.site_pattern) {
        findings.push(ConfigWarning::error(
            "selection.site_pattern",
            format!("invalid regex: {e}"),
        ));
    }

    if config.actuation.batch_threshold == 0 {
        findings.push(ConfigWarning::error(
            "actuation.batch_threshold",
            "must be at least 1",
        ));
    } else if config.actuation.batch_threshold > LARGE_BATCH_THRESHOLD {
        findings.push(ConfigWarning::warning(
            "actuation.batch_threshold",
            format!(
                "{} machines may be power-cycled in a single cycle",
                config.actuation.batch_threshold
            ),
        ));
    }
    if config.actuation.timeout < MIN_SANE_ACTUATION_TIMEOUT {
        findings.push(ConfigWarning::warning(
            "actuation.timeout",
            format!(
                "{} is short for slow management controllers",
                human(config.actuation.timeout)
            ),
        ));
    }
    if config.actuation.backend == BackendKind::Http
        && config
            .actuation
            .http
            .base_url
            .as_deref()
            .is_none_or(|url| url.trim().is_empty())
    {
        findings.push(ConfigWarning::error(
            "actuation.http.base_url",
            "required when actuation.backend = \"http\"",
        ));
    }

    if scheduler.expected_delay.is_zero() {
        findings.push(ConfigWarning::error(
            "scheduler.expected_delay",
            "must be greater than zero",
        ));
    }
    if scheduler.min_delay > scheduler.expected_delay {
        findings.push(ConfigWarning::error(
            "scheduler.min_delay",
            format!(
                "{} exceeds expected_delay {}",
                human(scheduler.min_delay),
                human(scheduler.expected_delay)
            ),
        ));
    }
    if scheduler.expected_delay > scheduler.max_delay {
        findings.push(ConfigWarning::error(
            "scheduler.max_delay",
            format!(
                "{} is below expected_delay {}",
                human(scheduler.max_delay),
                human(scheduler.expected_delay)
            ),
        ));
    }

    if config.cooldown.window < scheduler.max_delay {
        findings.push(ConfigWarning::warning(
            "cooldown.window",
            format!(
                "{} is shorter than the longest cycle interval {}",
                human(config.cooldown.window),
                human(scheduler.max_delay)
            ),
        ));
    }

    findings
}

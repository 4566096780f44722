//! Error Catalog for Remedy
//!
//! Every failure the remediation loop can report carries a stable code
//! (REM-E001 through REM-E399) so that log records and operator runbooks
//! can refer to the same condition. Each entry has:
//! - A unique code
//! - A human-readable message
//! - Remediation steps
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                               |
//! |------------|-------------|-------------------------------------------|
//! | E001-E099  | Config      | Configuration, credentials and startup    |
//! | E100-E199  | Oracle      | Telemetry query evaluation                |
//! | E200-E299  | Actuation   | Power-cycle requests                      |
//! | E300-E399  | Persistence | Durable record store                      |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration covering all Remedy error scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// Configuration file not found
    ConfigNotFound,
    /// Configuration file could not be read
    ConfigReadError,
    /// Configuration file contains invalid TOML syntax
    ConfigParseError,
    /// Configuration contains invalid values
    ConfigValidationError,
    /// Environment variable has invalid value
    ConfigEnvError,
    /// Credentials file missing or malformed
    ConfigCredentialsError,

    // =========================================================================
    // Oracle Errors (E100-E199)
    // =========================================================================
    /// Telemetry oracle could not be reached
    OracleUnavailable,
    /// Telemetry oracle rejected the query
    OracleQueryRejected,
    /// Telemetry oracle answered with an unexpected payload
    OracleMalformedResponse,
    /// Telemetry query exceeded its deadline
    OracleTimeout,

    // =========================================================================
    // Actuation Errors (E200-E299)
    // =========================================================================
    /// Power-cycle request failed
    ActuationFailed,
    /// Power-cycle request exceeded its deadline
    ActuationTimeout,
    /// Batch exceeded the safety threshold and was refused
    ActuationBatchRefused,
    /// Actuation executable could not be started
    ActuationSpawnFailed,

    // =========================================================================
    // Persistence Errors (E300-E399)
    // =========================================================================
    /// Record store could not be written
    PersistenceFailed,
    /// Record store could not be parsed and was ignored
    PersistenceCorrupt,
}

impl ErrorCode {
    /// Returns the numeric error code (without prefix).
    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            // Config (001-099)
            Self::ConfigNotFound => 1,
            Self::ConfigReadError => 2,
            Self::ConfigParseError => 3,
            Self::ConfigValidationError => 4,
            Self::ConfigEnvError => 5,
            Self::ConfigCredentialsError => 6,

            // Oracle (100-199)
            Self::OracleUnavailable => 100,
            Self::OracleQueryRejected => 101,
            Self::OracleMalformedResponse => 102,
            Self::OracleTimeout => 103,

            // Actuation (200-299)
            Self::ActuationFailed => 200,
            Self::ActuationTimeout => 201,
            Self::ActuationBatchRefused => 202,
            Self::ActuationSpawnFailed => 203,

            // Persistence (300-399)
            Self::PersistenceFailed => 300,
            Self::PersistenceCorrupt => 301,
        }
    }

    /// All codes, in numeric order.
    pub fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigNotFound,
            Self::ConfigReadError,
            Self::ConfigParseError,
            Self::ConfigValidationError,
            Self::ConfigEnvError,
            Self::ConfigCredentialsError,
            Self::OracleUnavailable,
            Self::OracleQueryRejected,
            Self::OracleMalformedResponse,
            Self::OracleTimeout,
            Self::ActuationFailed,
            Self::ActuationTimeout,
            Self::ActuationBatchRefused,
            Self::ActuationSpawnFailed,
            Self::PersistenceFailed,
            Self::PersistenceCorrupt,
        ]
    }

    /// Returns the formatted error code string (e.g., "REM-E001").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("REM-E{:03}", self.code_number())
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Oracle,
            200..=299 => ErrorCategory::Actuation,
            _ => ErrorCategory::Persistence,
        }
    }

    /// Returns the full error entry with all metadata.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_string(),
            remediation: self
                .remediation()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigNotFound => "Configuration file not found",
            Self::ConfigReadError => "Failed to read configuration file",
            Self::ConfigParseError => "Configuration file contains invalid TOML syntax",
            Self::ConfigValidationError => "Configuration contains invalid values",
            Self::ConfigEnvError => "Environment variable has invalid value",
            Self::ConfigCredentialsError => "Credentials are missing or malformed",

            Self::OracleUnavailable => "Telemetry oracle is unreachable",
            Self::OracleQueryRejected => "Telemetry oracle rejected the query",
            Self::OracleMalformedResponse => "Telemetry oracle returned an unexpected payload",
            Self::OracleTimeout => "Telemetry query timed out",

            Self::ActuationFailed => "Power-cycle request failed",
            Self::ActuationTimeout => "Power-cycle request timed out",
            Self::ActuationBatchRefused => "Batch exceeds the safety threshold and was refused",
            Self::ActuationSpawnFailed => "Power-cycle command could not be started",

            Self::PersistenceFailed => "Record store could not be written",
            Self::PersistenceCorrupt => "Record store is unreadable and was ignored",
        }
    }

    /// Returns the remediation steps.
    #[must_use]
    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigNotFound => &[
                "Check the path passed to --config",
                "Run without --config to use built-in defaults",
            ],
            Self::ConfigReadError => &["Check file permissions on the configuration file"],
            Self::ConfigParseError => &[
                "Validate the TOML syntax of the configuration file",
                "Durations must be quoted strings such as \"24h\" or \"90s\"",
            ],
            Self::ConfigValidationError => &[
                "Ensure min_delay <= expected_delay <= max_delay",
                "Ensure lookback_minutes and batch_threshold are positive",
            ],
            Self::ConfigEnvError => &["Unset or correct the REMEDY_* variable named in the log"],
            Self::ConfigCredentialsError => &[
                "Credentials files hold the username on line 1 and the password on line 2",
                "Alternatively set the *_USERNAME and *_PASSWORD environment variables",
            ],

            Self::OracleUnavailable => &[
                "Check that the Prometheus URL is reachable from this host",
                "No remediation happens while the oracle is unavailable",
            ],
            Self::OracleQueryRejected => &[
                "Run the query shown in the log against the Prometheus UI",
                "Check selection.signals and selection.exclusions in the configuration",
            ],
            Self::OracleMalformedResponse => &[
                "Queries must return an instant vector",
                "Check that oracle.url points at a Prometheus-compatible API",
            ],
            Self::OracleTimeout => &["Raise oracle.timeout or simplify the query"],

            Self::ActuationFailed => &[
                "Inspect the reboot API or command output for the named machine",
                "The machine stays in cooldown; it will be retried after the window",
            ],
            Self::ActuationTimeout => &[
                "Management controllers can be slow; consider raising actuation.timeout",
            ],
            Self::ActuationBatchRefused => &[
                "Many machines look unreachable at once; check the oracle and the network first",
                "Raise actuation.batch_threshold only if mass reboots are intended",
            ],
            Self::ActuationSpawnFailed => &[
                "Check that actuation.command.program is installed and executable",
            ],

            Self::PersistenceFailed => &[
                "Check free space and permissions for store.path",
                "The daemon stops rather than run with an unsaved cooldown history",
            ],
            Self::PersistenceCorrupt => &[
                "The store was treated as empty; previous cooldowns are forgotten",
                "Inspect or remove the file named in the log",
            ],
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Configuration, credentials and startup errors (E001-E099)
    Config,
    /// Telemetry oracle errors (E100-E199)
    Oracle,
    /// Power-cycle request errors (E200-E299)
    Actuation,
    /// Record store errors (E300-E399)
    Persistence,
}

impl ErrorCategory {
    /// Returns a human-readable name for the category.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "Configuration",
            Self::Oracle => "Oracle",
            Self::Actuation => "Actuation",
            Self::Persistence => "Persistence",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Complete error entry with all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error code string (e.g., "REM-E001")
    pub code: String,
    /// Error category
    pub category: ErrorCategory,
    /// Human-readable error message
    pub message: String,
    /// Steps to remediate the error
    pub remediation: Vec<String>,
}

impl ErrorEntry {
    /// Formats the error as a single line.
    #[must_use]
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_brief())
    }
}

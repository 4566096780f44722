//! Typed daemon configuration.
//!
//! Values are layered: built-in defaults, then the TOML file, then
//! `REMEDY_*` environment variables. Command-line flags are applied by the
//! daemon on top of the result.

use super::env::{EnvError, EnvParser};
use super::source::ConfigSource;
use crate::errors::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while building the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid environment: {}", join_errors(.0))]
    Env(Vec<EnvError>),

    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}

fn join_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::ConfigNotFound,
            Self::Read { .. } => ErrorCode::ConfigReadError,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Env(_) => ErrorCode::ConfigEnvError,
            Self::Validation(_) => ErrorCode::ConfigValidationError,
        }
    }
}

/// Serde adapter for human-readable durations (`"90s"`, `"24h"`).
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemedyConfig {
    pub general: GeneralConfig,
    pub selection: SelectionConfig,
    pub cooldown: CooldownConfig,
    pub actuation: ActuationConfig,
    pub oracle: OracleConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Select and reconcile, but never actuate or persist.
    pub dry_run: bool,
    /// Run one cycle and exit.
    pub once: bool,
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            once: false,
            log_level: "info".to_string(),
        }
    }
}

/// A named telemetry query whose results are unreachability candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSpec {
    pub name: String,
    pub query: String,
}

/// What an exclusion query's results remove from the candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionScope {
    /// Remove candidates whose name is in the result.
    Entity,
    /// Remove every candidate whose site is in the result.
    Site,
}

impl ExclusionScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Site => "site",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionSpec {
    pub name: String,
    pub query: String,
    pub scope: ExclusionScope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Substituted for `{lookback}` in every query.
    pub lookback_minutes: u32,
    pub name_labels: Vec<String>,
    pub site_label: String,
    pub site_pattern: String,
    pub signals: Vec<SignalSpec>,
    pub exclusions: Vec<ExclusionSpec>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        let signal = |name: &str, query: &str| SignalSpec {
            name: name.to_string(),
            query: query.to_string(),
        };
        let exclusion = |name: &str, scope, query: &str| ExclusionSpec {
            name: name.to_string(),
            query: query.to_string(),
            scope,
        };

        Self {
            lookback_minutes: 15,
            name_labels: vec!["name".to_string(), "machine".to_string()],
            site_label: "site".to_string(),
            site_pattern: r"^mlab[1-4]-([a-z]{3}[0-9t]{2})\.".to_string(),
            signals: vec![
                signal(
                    "ssh_unreachable",
                    r#"sum_over_time(probe_success{service="ssh", module="ssh_v4_online"}[{lookback}m]) == 0 unless on(machine) epoxy_last_boot > time() - {lookback} * 60"#,
                ),
                signal(
                    "boot_stalled",
                    "epoxy_last_boot < time() - {lookback} * 60 and epoxy_last_success < epoxy_last_boot",
                ),
            ],
            exclusions: vec![
                exclusion(
                    "machine_maintenance",
                    ExclusionScope::Entity,
                    "gmx_machine_maintenance == 1",
                ),
                exclusion(
                    "site_maintenance",
                    ExclusionScope::Site,
                    "gmx_site_maintenance == 1",
                ),
                exclusion(
                    "lame_duck",
                    ExclusionScope::Entity,
                    r#"kube_node_spec_taint{key="lame-duck"} == 1"#,
                ),
                exclusion(
                    "switch_offline",
                    ExclusionScope::Site,
                    r#"sum_over_time(probe_success{instance=~"s1.*", module="icmp"}[{lookback}m]) == 0"#,
                ),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    #[serde(with = "duration_str")]
    pub window: Duration,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            window: crate::cooldown::DEFAULT_COOLDOWN_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Command,
    Http,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "command" => Ok(Self::Command),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown actuation backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuationConfig {
    pub batch_threshold: usize,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    pub backend: BackendKind,
    pub command: CommandBackendConfig,
    pub http: HttpBackendConfig,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            batch_threshold: crate::actuator::DEFAULT_BATCH_THRESHOLD,
            timeout: crate::actuator::DEFAULT_ACTUATION_TIMEOUT,
            backend: BackendKind::Command,
            command: CommandBackendConfig::default(),
            http: HttpBackendConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandBackendConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for CommandBackendConfig {
    fn default() -> Self {
        Self {
            program: "drac.py".to_string(),
            args: vec!["reboot".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBackendConfig {
    pub base_url: Option<String>,
    pub path: String,
    pub host_param: String,
    pub credentials_file: Option<PathBuf>,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            path: "/v1/reboot".to_string(),
            host_param: "host".to_string(),
            credentials_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub url: String,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    pub credentials_file: Option<PathBuf>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9090".to_string(),
            timeout: Duration::from_secs(30),
            credentials_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(with = "duration_str")]
    pub min_delay: Duration,
    #[serde(with = "duration_str")]
    pub expected_delay: Duration,
    #[serde(with = "duration_str")]
    pub max_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(60),
            expected_delay: Duration::from_secs(5 * 60),
            max_delay: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join("remedy").join("records.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "0.0.0.0:9990".to_string(),
        }
    }
}

impl Default for RemedyConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            selection: SelectionConfig::default(),
            cooldown: CooldownConfig::default(),
            actuation: ActuationConfig::default(),
            oracle: OracleConfig::default(),
            scheduler: SchedulerConfig::default(),
            store: StoreConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

/// Which layer supplied each overridden key (dotted path).
pub type ConfigSources = BTreeMap<String, ConfigSource>;

impl RemedyConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a TOML file. A missing file is an error: the operator asked
    /// for it explicitly.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Defaults, then the optional file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<(Self, ConfigSources), ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let mut sources = ConfigSources::new();
        if path.is_some() {
            sources.insert("file".to_string(), ConfigSource::File);
        }

        let mut parser = EnvParser::new();
        for key in config.apply_env(&mut parser) {
            sources.insert(key, ConfigSource::Environment);
        }
        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }

        Ok((config, sources))
    }

    /// Apply `REMEDY_*` overrides and return the keys they set.
    pub fn apply_env(&mut self, parser: &mut EnvParser) -> Vec<String> {
        let mut applied = Vec::new();
        let mut note = |key: &str, var: Option<String>| {
            if var.is_some() {
                applied.push(key.to_string());
            }
        };

        let lookback = parser.get_u32_range("LOOKBACK_MINUTES", self.selection.lookback_minutes, 1, 10_080);
        note("selection.lookback_minutes", lookback.apply_to(&mut self.selection.lookback_minutes));

        let name_labels = parser.get_string_list("NAME_LABELS", &self.selection.name_labels);
        note("selection.name_labels", name_labels.apply_to(&mut self.selection.name_labels));

        let cooldown = parser.get_duration("COOLDOWN", self.cooldown.window);
        note("cooldown.window", cooldown.apply_to(&mut self.cooldown.window));

        let threshold = parser.get_u32_range(
            "BATCH_THRESHOLD",
            u32::try_from(self.actuation.batch_threshold).unwrap_or(u32::MAX),
            1,
            10_000,
        );
        if threshold.is_from_env() {
            self.actuation.batch_threshold = threshold.value as usize;
            note("actuation.batch_threshold", threshold.env_var);
        }

        let timeout = parser.get_duration("ACTUATION_TIMEOUT", self.actuation.timeout);
        note("actuation.timeout", timeout.apply_to(&mut self.actuation.timeout));

        let backend = parser.get_string("BACKEND", self.actuation.backend.as_str());
        if let Some(var) = backend.env_var.clone() {
            match backend.value.parse::<BackendKind>() {
                Ok(kind) => {
                    self.actuation.backend = kind;
                    note("actuation.backend", Some(var));
                }
                Err(_) => parser.push_error(EnvError::InvalidValue {
                    var,
                    expected: "command or http",
                    value: backend.value,
                }),
            }
        }

        let program = parser.get_string("COMMAND_PROGRAM", &self.actuation.command.program);
        note("actuation.command.program", program.apply_to(&mut self.actuation.command.program));

        let reboot_url = parser.get_optional_string("REBOOT_URL");
        note("actuation.http.base_url", reboot_url.apply_to(&mut self.actuation.http.base_url));

        let oracle_url = parser.get_string("ORACLE_URL", &self.oracle.url);
        note("oracle.url", oracle_url.apply_to(&mut self.oracle.url));

        let oracle_timeout = parser.get_duration("ORACLE_TIMEOUT", self.oracle.timeout);
        note("oracle.timeout", oracle_timeout.apply_to(&mut self.oracle.timeout));

        let min = parser.get_duration("MIN_DELAY", self.scheduler.min_delay);
        note("scheduler.min_delay", min.apply_to(&mut self.scheduler.min_delay));
        let expected = parser.get_duration("EXPECTED_DELAY", self.scheduler.expected_delay);
        note("scheduler.expected_delay", expected.apply_to(&mut self.scheduler.expected_delay));
        let max = parser.get_duration("MAX_DELAY", self.scheduler.max_delay);
        note("scheduler.max_delay", max.apply_to(&mut self.scheduler.max_delay));

        let store = parser.get_path("STORE_PATH", self.store.path.clone());
        note("store.path", store.apply_to(&mut self.store.path));

        let http_enabled = parser.get_bool("HTTP_ENABLED", self.http.enabled);
        note("http.enabled", http_enabled.apply_to(&mut self.http.enabled));
        let listen = parser.get_string("HTTP_LISTEN", &self.http.listen);
        note("http.listen", listen.apply_to(&mut self.http.listen));

        let dry_run = parser.get_bool("DRY_RUN", self.general.dry_run);
        note("general.dry_run", dry_run.apply_to(&mut self.general.dry_run));
        let log_level = parser.get_log_level("LOG_LEVEL", &self.general.log_level);
        note("general.log_level", log_level.apply_to(&mut self.general.log_level));

        applied
    }
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Http => "http",
        }
    }
}

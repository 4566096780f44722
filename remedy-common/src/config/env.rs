//! `REMEDY_*` environment variable parsing.
//!
//! The parser never fails fast: every malformed variable is recorded and the
//! fallback value is kept, so startup can report all problems at once.

use super::source::Sourced;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A malformed environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: &'static str,
        value: String,
    },

    #[error("Invalid duration for {var}: '{value}' ({reason})")]
    InvalidDuration {
        var: String,
        value: String,
        reason: String,
    },

    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

pub const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Typed reader for prefixed environment variables.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    pub fn new() -> Self {
        Self::with_prefix("REMEDY_")
    }

    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Record a problem found by a caller interpreting a raw value.
    pub fn push_error(&mut self, error: EnvError) {
        self.errors.push(error);
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    pub fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn lookup(&self, name: &str) -> (String, Option<String>) {
        let var = self.var_name(name);
        let value = env::var(&var).ok();
        (var, value)
    }

    pub fn get_string(&mut self, name: &str, fallback: &str) -> Sourced<String> {
        match self.lookup(name) {
            (var, Some(value)) => Sourced::from_env(value, var),
            (_, None) => Sourced::default_value(fallback.to_string()),
        }
    }

    /// Accepts 1/true/yes/on and 0/false/no/off (case-insensitive). An
    /// empty value is false.
    pub fn get_bool(&mut self, name: &str, fallback: bool) -> Sourced<bool> {
        let (var, Some(value)) = self.lookup(name) else {
            return Sourced::default_value(fallback);
        };
        match parse_bool(&value) {
            Some(parsed) => Sourced::from_env(parsed, var),
            None => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "boolean (true/false/1/0/yes/no)",
                    value,
                });
                Sourced::default_value(fallback)
            }
        }
    }

    pub fn get_u32_range(&mut self, name: &str, fallback: u32, min: u32, max: u32) -> Sourced<u32> {
        let (var, Some(value)) = self.lookup(name) else {
            return Sourced::default_value(fallback);
        };
        match value.trim().parse::<u32>() {
            Ok(n) if (min..=max).contains(&n) => Sourced::from_env(n, var),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                Sourced::default_value(fallback)
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "unsigned 32-bit integer",
                    value,
                });
                Sourced::default_value(fallback)
            }
        }
    }

    /// Human-readable duration such as `90s`, `15m` or `24h`.
    pub fn get_duration(&mut self, name: &str, fallback: Duration) -> Sourced<Duration> {
        let (var, Some(value)) = self.lookup(name) else {
            return Sourced::default_value(fallback);
        };
        match humantime::parse_duration(value.trim()) {
            Ok(d) => Sourced::from_env(d, var),
            Err(e) => {
                self.errors.push(EnvError::InvalidDuration {
                    var,
                    value,
                    reason: e.to_string(),
                });
                Sourced::default_value(fallback)
            }
        }
    }

    pub fn get_log_level(&mut self, name: &str, fallback: &str) -> Sourced<String> {
        let (var, Some(value)) = self.lookup(name) else {
            return Sourced::default_value(fallback.to_string());
        };
        match parse_log_level(&value) {
            Some(level) => Sourced::from_env(level.to_string(), var),
            None => {
                self.errors.push(EnvError::InvalidLogLevel { var, value });
                Sourced::default_value(fallback.to_string())
            }
        }
    }

    /// Comma-separated list; blank items are dropped.
    pub fn get_string_list(&mut self, name: &str, fallback: &[String]) -> Sourced<Vec<String>> {
        match self.lookup(name) {
            (var, Some(value)) => Sourced::from_env(parse_string_list(&value), var),
            (_, None) => Sourced::default_value(fallback.to_vec()),
        }
    }

    /// `None` when unset or empty.
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        match self.lookup(name) {
            (var, Some(value)) if value.is_empty() => Sourced::from_env(None, var),
            (var, Some(value)) => Sourced::from_env(Some(value), var),
            (_, None) => Sourced::default_value(None),
        }
    }

    /// Path with a leading `~/` expanded to the home directory.
    pub fn get_path(&mut self, name: &str, fallback: PathBuf) -> Sourced<PathBuf> {
        match self.lookup(name) {
            (var, Some(value)) => Sourced::from_env(expand_home(&value), var),
            (_, None) => Sourced::default_value(fallback),
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

pub fn parse_log_level(value: &str) -> Option<&'static str> {
    let lower = value.trim().to_ascii_lowercase();
    LOG_LEVELS.into_iter().find(|level| *level == lower)
}

pub fn parse_string_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn expand_home(value: &str) -> PathBuf {
    match (value.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(value),
    }
}

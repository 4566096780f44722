//! Provenance of configuration values.

use serde::Serialize;
use std::fmt;

/// Layer a configuration value came from, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
    CommandLine,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::File => "config file",
            Self::Environment => "environment",
            Self::CommandLine => "command line",
        })
    }
}

/// A value together with the layer that supplied it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    /// Environment variable name when `source` is `Environment`.
    pub env_var: Option<String>,
}

impl<T> Sourced<T> {
    /// A value read from an environment variable.
    pub fn from_env(value: T, var: impl Into<String>) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            env_var: Some(var.into()),
        }
    }

    /// A value that fell through to the layer below.
    pub fn default_value(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Default,
            env_var: None,
        }
    }

    pub fn is_from_env(&self) -> bool {
        self.source == ConfigSource::Environment
    }

    /// Store the value into `slot` when it came from the environment and
    /// return the variable name that set it.
    pub fn apply_to(self, slot: &mut T) -> Option<String> {
        if self.is_from_env() {
            *slot = self.value;
            self.env_var
        } else {
            None
        }
    }
}

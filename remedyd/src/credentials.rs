//! Basic-auth credentials for the Prometheus API and the reboot API.
//!
//! Credentials come from a two-line file (username, then password) or from
//! `REMEDY_<SCOPE>_USERNAME` / `REMEDY_<SCOPE>_PASSWORD`. A configured file
//! wins over the environment.

use remedy_common::ErrorCode;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("cannot read credentials file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credentials file {path} must hold a username line and a password line")]
    Malformed { path: PathBuf },
}

impl CredentialsError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ConfigCredentialsError
    }
}

/// Which service a set of credentials is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialScope {
    Oracle,
    Reboot,
}

impl CredentialScope {
    fn env_prefix(self) -> &'static str {
        match self {
            Self::Oracle => "REMEDY_ORACLE",
            Self::Reboot => "REMEDY_REBOOT",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Parse the two-line format. Line endings are stripped; anything after
    /// the second line is ignored.
    pub fn parse(content: &str) -> Option<Self> {
        let mut lines = content.lines().map(|l| l.trim_end_matches('\r'));
        let username = lines.next()?.to_string();
        let password = lines.next()?.to_string();
        if username.is_empty() {
            return None;
        }
        Some(Self { username, password })
    }

    pub fn from_file(path: &Path) -> Result<Self, CredentialsError> {
        let content = std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).ok_or_else(|| CredentialsError::Malformed {
            path: path.to_path_buf(),
        })
    }

    /// Resolve credentials for `scope` from the process environment.
    pub fn resolve(
        scope: CredentialScope,
        file: Option<&Path>,
    ) -> Result<Option<Self>, CredentialsError> {
        Self::resolve_with(scope, file, |var| std::env::var(var).ok())
    }

    /// As [`Credentials::resolve`], reading variables through `lookup`.
    pub fn resolve_with(
        scope: CredentialScope,
        file: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, CredentialsError> {
        if let Some(path) = file {
            return Self::from_file(path).map(Some);
        }

        let prefix = scope.env_prefix();
        let username = lookup(&format!("{prefix}_USERNAME")).filter(|u| !u.is_empty());
        let password = lookup(&format!("{prefix}_PASSWORD"));
        Ok(match (username, password) {
            (Some(username), Some(password)) => Some(Self { username, password }),
            _ => None,
        })
    }
}

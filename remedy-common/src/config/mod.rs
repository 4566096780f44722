//! Configuration for Remedy.
//!
//! - Typed settings with built-in defaults and TOML file loading
//! - `REMEDY_*` environment overrides with error collection
//! - Source tracking for each overridden value
//! - Validation on startup

pub mod env;
pub mod settings;
pub mod source;
pub mod validate;

pub use env::{EnvError, EnvParser};
pub use settings::{
    ActuationConfig, BackendKind, CommandBackendConfig, ConfigError, ConfigSources, CooldownConfig,
    ExclusionScope, ExclusionSpec, GeneralConfig, HttpBackendConfig, HttpConfig, OracleConfig,
    RemedyConfig, SchedulerConfig, SelectionConfig, SignalSpec, StoreConfig,
};
pub use source::{ConfigSource, Sourced};
pub use validate::{ConfigWarning, Severity, validate_config};

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

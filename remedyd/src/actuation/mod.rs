//! Power-cycle backends.
//!
//! - [`CommandActuator`]: runs an external program with the machine name
//! - [`HttpActuator`]: calls the reboot API
//!
//! [`ActuatorBackend`] picks one of them at startup from configuration.

pub mod command;
pub mod http;

pub use command::CommandActuator;
pub use http::HttpActuator;

use crate::credentials::Credentials;
use remedy_common::config::{ActuationConfig, BackendKind};
use remedy_common::{ActuationError, Actuator, Entity};

#[derive(Debug, Clone)]
pub enum ActuatorBackend {
    Command(CommandActuator),
    Http(HttpActuator),
}

impl ActuatorBackend {
    /// Build the configured backend. `credentials` are only used by the
    /// HTTP backend.
    pub fn from_config(
        config: &ActuationConfig,
        credentials: Option<Credentials>,
    ) -> Result<Self, ActuationError> {
        match config.backend {
            BackendKind::Command => Ok(Self::Command(CommandActuator::new(
                config.command.program.clone(),
                config.command.args.clone(),
            ))),
            BackendKind::Http => {
                let base_url = config.http.base_url.as_deref().ok_or_else(|| {
                    ActuationError::Transport("actuation.http.base_url is not set".to_string())
                })?;
                Ok(Self::Http(HttpActuator::new(
                    base_url,
                    &config.http.path,
                    &config.http.host_param,
                    credentials,
                )?))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Command(_) => BackendKind::Command,
            Self::Http(_) => BackendKind::Http,
        }
    }
}

impl Actuator for ActuatorBackend {
    async fn power_cycle(&self, entity: &Entity) -> Result<(), ActuationError> {
        match self {
            Self::Command(inner) => inner.power_cycle(entity).await,
            Self::Http(inner) => inner.power_cycle(entity).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backend_is_command() {
        let backend = ActuatorBackend::from_config(&ActuationConfig::default(), None).unwrap();
        assert_eq!(backend.kind(), BackendKind::Command);
    }

    #[test]
    fn test_http_backend_needs_base_url() {
        let mut config = ActuationConfig::default();
        config.backend = BackendKind::Http;
        assert!(ActuatorBackend::from_config(&config, None).is_err());

        config.http.base_url = Some("https://reboot.example.org".to_string());
        let backend = ActuatorBackend::from_config(&config, None).unwrap();
        assert_eq!(backend.kind(), BackendKind::Http);
    }
}

//! Power-cycle through the reboot API.

use crate::credentials::Credentials;
use remedy_common::{ActuationError, Actuator, Entity};
use reqwest::{StatusCode, Url};
use tracing::debug;

/// Sends `POST {base_url}{path}?{host_param}=<machine>`; HTTP 200 is success.
#[derive(Debug, Clone)]
pub struct HttpActuator {
    client: reqwest::Client,
    endpoint: Url,
    host_param: String,
    credentials: Option<Credentials>,
}

impl HttpActuator {
    pub fn new(
        base_url: &str,
        path: &str,
        host_param: &str,
        credentials: Option<Credentials>,
    ) -> Result<Self, ActuationError> {
        let raw = format!("{}{}", base_url.trim_end_matches('/'), path);
        let endpoint = Url::parse(&raw)
            .map_err(|e| ActuationError::Transport(format!("invalid reboot API URL {raw}: {e}")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            host_param: host_param.to_string(),
            credentials,
        })
    }

    fn url_for(&self, entity: &Entity) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(&self.host_param, &entity.name);
        url
    }
}

impl Actuator for HttpActuator {
    async fn power_cycle(&self, entity: &Entity) -> Result<(), ActuationError> {
        let mut request = self.client.post(self.url_for(entity));
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(creds.password()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ActuationError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ActuationError::Transport(e.to_string()))?;

        if status == StatusCode::OK {
            debug!(machine = %entity.name, "{}", body.trim());
            Ok(())
        } else {
            Err(ActuationError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            })
        }
    }
}

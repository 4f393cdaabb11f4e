//! CREST hypermedia API access: shared HTTP client, endpoint discovery,
//! character documents and location polling.

pub mod character;
pub mod endpoints;
pub mod location;

pub use character::CharacterDocument;
pub use endpoints::{AuthenticatedEndpoints, EndpointResolver, EndpointTable, Link};
pub use location::{Location, LocationObservation, LocationPoller, LocationTracker};

use serde::de::DeserializeOwned;

use crate::config::SessionConfig;
use crate::error::SessionError;

/// Thin wrapper over `reqwest::Client` carrying the user agent and timeout.
#[derive(Debug, Clone)]
pub struct CrestHttp {
    client: reqwest::Client,
}

impl CrestHttp {
    pub fn new(config: &SessionConfig) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SessionError::Configuration(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// GET a JSON document, optionally with an `Authorization` header.
    ///
    /// Non-success statuses and undecodable bodies are protocol errors.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> Result<T, SessionError> {
        let mut request = self.client.get(url).header("Accept", "application/json");
        if let Some(value) = authorization {
            request = request.header("Authorization", value);
        }
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(SessionError::Protocol(format!(
                "GET {url} returned status {}",
                resp.status()
            )));
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// GET raw bytes without authentication (portrait images live on a CDN).
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SessionError> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(SessionError::Protocol(format!(
                "GET {url} returned status {}",
                resp.status()
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

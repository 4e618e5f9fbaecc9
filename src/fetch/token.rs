//! OAuth client-credentials token exchange with the OpenSky auth realm.
//!
//! A fresh token is requested once per ingestion cycle. Cycles are minutes
//! apart, so there is no caching or refresh logic here; retrying a failed
//! exchange is the scheduler's next tick.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::fetch::client::{CONNECT_TIMEOUT, REQUEST_TIMEOUT};

pub const TOKEN_URL: &str =
    "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("token response contained no access token")]
    MissingToken,
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<String, AuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
}

/// Exchanges a client id/secret pair for a bearer token via one
/// form-encoded POST.
pub struct ClientCredentials {
    client_id: String,
    client_secret: String,
    token_url: String,
    http: reqwest::Client,
}

impl ClientCredentials {
    pub fn new(client_id: String, client_secret: String) -> Result<Self, AuthError> {
        Self::with_token_url(client_id, client_secret, TOKEN_URL.to_string())
    }

    /// Same as [`ClientCredentials::new`] but against a custom token
    /// endpoint, used by tests.
    pub fn with_token_url(
        client_id: String,
        client_secret: String,
        token_url: String,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client_id,
            client_secret,
            token_url,
            http,
        })
    }
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    async fn fetch_token(&self) -> Result<String, AuthError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let resp = self.http.post(&self.token_url).form(&form).send().await?;

        if !resp.status().is_success() {
            return Err(AuthError::Status(resp.status()));
        }

        let body: TokenResponse = resp.json().await?;
        if body.access_token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        Ok(body.access_token)
    }
}

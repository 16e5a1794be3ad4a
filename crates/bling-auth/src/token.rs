//! OAuth token exchange and refresh
//!
//! Both grants POST a JSON body to `TOKEN_ENDPOINT` with the client's Basic
//! authorization header. Exactly one request is made per exchange; nothing is
//! retried here.

use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::TOKEN_ENDPOINT;
use crate::error::{Error, Result};
use crate::expiration::{Clock, SystemClock, compute_expiration};

/// Grant sent to the token endpoint. Serializes to the request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "grant_type")]
pub enum AuthorizationGrant {
    #[serde(rename = "authorization_code")]
    AuthorizationCode { code: String },
    #[serde(rename = "refresh_token")]
    RefreshGrant { refresh_token: String },
}

impl AuthorizationGrant {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshGrant { .. } => "refresh_token",
        }
    }
}

/// Token endpoint payload. `expires_in` is a delta in seconds.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub scope: String,
    pub refresh_token: String,
}

/// A freshly issued token pair with its absolute expiration.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub access_token: String,
    pub token_type: String,
    pub scope: String,
    pub expires_in: i64,
    pub refresh_token: String,
    pub expiration_instant: DateTime<Tz>,
}

impl Credential {
    fn from_response(token: TokenResponse, clock: &dyn Clock) -> Self {
        Self {
            expiration_instant: compute_expiration(token.expires_in, clock),
            access_token: token.access_token,
            token_type: token.token_type,
            scope: token.scope,
            expires_in: token.expires_in,
            refresh_token: token.refresh_token,
        }
    }
}

/// Client for the token endpoint.
#[derive(Clone)]
pub struct TokenExchanger {
    client: reqwest::Client,
    endpoint: String,
    clock: Arc<dyn Clock>,
}

impl TokenExchanger {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: TOKEN_ENDPOINT.to_owned(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Trade a grant for a credential.
    ///
    /// A 400 yields [`Error::Provider`] with the body exactly as received.
    /// Any other response that does not carry all five token fields is an
    /// [`Error::Protocol`].
    pub async fn exchange(
        &self,
        grant: &AuthorizationGrant,
        headers: &HeaderMap,
    ) -> Result<Credential> {
        debug!(grant_type = grant.kind(), endpoint = %self.endpoint, "requesting token");

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers.clone())
            .json(grant)
            .send()
            .await
            .map_err(|e| Error::Http(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading token response: {e}")))?;

        if status == StatusCode::BAD_REQUEST {
            warn!(grant_type = grant.kind(), "token endpoint rejected the grant");
            return Err(Error::Provider { body });
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| Error::Protocol {
            status: status.as_u16(),
            detail: e.to_string(),
        })?;
        if !status.is_success() {
            warn!(%status, "token endpoint returned a token payload with a non-success status");
        }

        let credential = Credential::from_response(token, self.clock.as_ref());
        info!(
            grant_type = grant.kind(),
            expires_in = credential.expires_in,
            expiration = %credential.expiration_instant.to_rfc3339(),
            "token issued"
        );
        Ok(credential)
    }
}

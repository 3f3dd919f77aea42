// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client-credentials token request with a JWT-bearer client assertion.

use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use super::error::DapsError;

pub const GRANT_TYPE: &str = "client_credentials";
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
pub const CONNECTOR_SCOPE: &str = "ids_connector";

/// Bytes of an error response body kept for logs and error messages.
pub const MAX_ERROR_BODY: usize = 512;

/// Parsed token endpoint response.
#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub raw: Value,
}

impl TokenResponse {
    /// Parse a token endpoint body.
    pub fn from_body(body: &str) -> Result<Self, DapsError> {
        let raw: Value = serde_json::from_str(body)
            .map_err(|e| DapsError::Protocol(format!("token response is not JSON: {e}")))?;

        let access_token = raw
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                DapsError::Protocol("token response did not include access_token".to_string())
            })?
            .to_string();

        Ok(Self { access_token, raw })
    }

    pub fn token_type(&self) -> Option<&str> {
        self.raw.get("token_type").and_then(Value::as_str)
    }

    pub fn expires_in(&self) -> Option<u64> {
        self.raw.get("expires_in").and_then(Value::as_u64)
    }
}

/// Posts client assertions to `{daps_url}/token`.
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    http: Client,
    scope: String,
}

impl TokenExchangeClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            scope: CONNECTOR_SCOPE.to_string(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Exchange a signed assertion for an access token. No retries.
    pub async fn exchange(&self, daps_url: &str, assertion: &str) -> Result<TokenResponse, DapsError> {
        let url = token_endpoint(daps_url);
        let form = [
            ("grant_type", GRANT_TYPE),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion),
            ("scope", self.scope.as_str()),
        ];

        info!(
            url = %url,
            scope = %self.scope,
            assertion_len = assertion.len(),
            "Requesting Dynamic Attribute Token"
        );

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| DapsError::network(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DapsError::network(format!("failed to read token response: {e}")))?;

        if !status.is_success() {
            let excerpt = truncate_body(&body, MAX_ERROR_BODY);
            warn!(
                status = %status,
                body = %excerpt,
                body_len = body.len(),
                "Token endpoint rejected the request"
            );
            return Err(DapsError::http_status(
                status.as_u16(),
                format!("token request returned {status}: {excerpt}"),
            ));
        }

        let token = TokenResponse::from_body(&body)?;
        info!(
            status = %status,
            token_len = token.access_token.len(),
            token_type = ?token.token_type(),
            "Token endpoint answered"
        );
        Ok(token)
    }
}

pub fn token_endpoint(daps_url: &str) -> String {
    format!("{}/token", daps_url.trim_end_matches('/'))
}

/// At most `max` bytes of `body`, cut on a character boundary.
fn truncate_body(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &body[..end], body.len())
}

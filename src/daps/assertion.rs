// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed JWT client assertion (JWT-bearer client authentication).

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::credentials::Identity;
use super::error::DapsError;

/// Default assertion lifetime (one day).
pub const DEFAULT_ASSERTION_TTL: Duration = Duration::from_secs(86_400);

/// Audience the DAPS expects in client assertions.
pub const DEFAULT_ASSERTION_AUDIENCE: &str = "api.Audience";

/// Claim set of a client assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAssertion {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
}

impl ClientAssertion {
    /// Claims valid from now for `ttl`.
    ///
    /// A lifetime whose expiry does not fit a JWT `NumericDate` is a
    /// configuration error.
    pub fn new(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        audience: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, DapsError> {
        let now = Utc::now().timestamp();
        let exp = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| now.checked_add(secs))
            .ok_or_else(|| {
                DapsError::Configuration(format!(
                    "assertion lifetime of {}s is out of range",
                    ttl.as_secs()
                ))
            })?;

        Ok(Self {
            iss: issuer.into(),
            sub: subject.into(),
            aud: audience.into(),
            iat: now,
            nbf: now,
            exp,
            jti: Uuid::new_v4().to_string(),
        })
    }

    /// Claims for a connector asserting its own identity (`iss == sub`).
    pub fn for_connector(connector_id: &str, audience: &str, ttl: Duration) -> Result<Self, DapsError> {
        Self::new(connector_id, connector_id, audience, ttl)
    }

    /// Sign with the identity's private key (RS256, `kid` = key id).
    pub fn sign(&self, identity: &Identity) -> Result<String, DapsError> {
        let key = identity.encoding_key()?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(identity.key_id());
        encode(&header, self, &key)
            .map_err(|e| DapsError::Crypto(format!("failed to sign client assertion: {e}")))
    }
}

/// Builds client assertions for one audience and lifetime.
#[derive(Debug, Clone)]
pub struct AssertionBuilder {
    audience: String,
    ttl: Duration,
}

impl Default for AssertionBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_ASSERTION_AUDIENCE, DEFAULT_ASSERTION_TTL)
    }
}

impl AssertionBuilder {
    pub fn new(audience: impl Into<String>, ttl: Duration) -> Self {
        Self {
            audience: audience.into(),
            ttl,
        }
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh signed assertion in which `connector_id` is both issuer and subject.
    pub fn build(&self, identity: &Identity, connector_id: &str) -> Result<String, DapsError> {
        ClientAssertion::for_connector(connector_id, &self.audience, self.ttl)?.sign(identity)
    }
}

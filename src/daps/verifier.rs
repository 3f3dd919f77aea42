// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Dynamic Attribute Token verification.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. algorithm is RS256
//! 2. `exp` present
//! 3. now within `[nbf - skew, exp + skew]`
//! 4. `sub` present
//! 5. `iss` and `aud` match
//! 6. signature verifies against the trust anchor key named by `kid`

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use tracing::{info, warn};

use super::claims::{RawClaims, VerifiedClaims};
use super::error::DapsError;
use super::jwks::KeySetCache;

/// Clock skew tolerance (30 seconds), applied to `exp` and `nbf`.
pub const CLOCK_SKEW_LEEWAY: u64 = 30;

/// Verifies tokens issued by one trust anchor.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    jwks_url: String,
    client: reqwest::Client,
    leeway: u64,
}

impl TokenVerifier {
    /// `client` is used for key set fetches and should be the restricted-trust client.
    pub fn new(keys: Arc<KeySetCache>, jwks_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            keys,
            jwks_url: jwks_url.into(),
            client,
            leeway: CLOCK_SKEW_LEEWAY,
        }
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway = leeway_secs;
        self
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Verify `token` and return its claims.
    pub async fn verify(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audience: &str,
    ) -> Result<VerifiedClaims, DapsError> {
        info!("Verifying Dynamic Attribute Token");
        match self.verify_token(token, expected_issuer, expected_audience).await {
            Ok(claims) => {
                info!(
                    issuer = %claims.issuer,
                    subject = %claims.subject,
                    expires_at = claims.expires_at,
                    "Token verification succeeded"
                );
                Ok(claims)
            }
            Err(e) => {
                warn!(reason = e.error_code(), error = %e, "Token verification failed");
                Err(e)
            }
        }
    }

    async fn verify_token(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audience: &str,
    ) -> Result<VerifiedClaims, DapsError> {
        let header = decode_header(token)
            .map_err(|e| DapsError::Verification(format!("malformed token header: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(DapsError::Verification(format!(
                "algorithm {:?} is not allowed (RS256 only)",
                header.alg
            )));
        }

        let raw = jsonwebtoken::dangerous::insecure_decode::<RawClaims>(token)
            .map_err(|e| DapsError::Verification(format!("malformed token claims: {e}")))?
            .claims;

        let verified = check_claims(
            raw,
            Utc::now().timestamp(),
            self.leeway,
            expected_issuer,
            expected_audience,
        )?;

        let kid = header
            .kid
            .ok_or_else(|| DapsError::Verification("token header carries no key id".to_string()))?;
        let key = self.keys.resolve(&kid, &self.jwks_url, &self.client).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.leeway;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.set_issuer(&[expected_issuer]);
        validation.set_audience(&[expected_audience]);

        decode::<RawClaims>(token, &key, &validation).map_err(|e| match e.kind() {
            JwtErrorKind::InvalidSignature => {
                DapsError::Verification(format!("signature does not verify with key '{kid}'"))
            }
            JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                DapsError::ExpiredToken(e.to_string())
            }
            JwtErrorKind::InvalidIssuer => DapsError::Issuer {
                expected: expected_issuer.to_string(),
                actual: verified.issuer.clone(),
            },
            JwtErrorKind::InvalidAudience => DapsError::Audience {
                expected: expected_audience.to_string(),
                actual: verified.audience.clone(),
            },
            _ => DapsError::Verification(e.to_string()),
        })?;

        Ok(verified)
    }
}

/// Claim checks 2 to 5, evaluated at `now` (seconds since the epoch).
pub fn check_claims(
    raw: RawClaims,
    now: i64,
    leeway: u64,
    expected_issuer: &str,
    expected_audience: &str,
) -> Result<VerifiedClaims, DapsError> {
    let leeway = i64::try_from(leeway).unwrap_or(i64::MAX);

    let expires_at = raw
        .exp
        .ok_or_else(|| DapsError::Verification("token carries no expiration claim".to_string()))?;

    if now > expires_at.saturating_add(leeway) {
        return Err(DapsError::ExpiredToken(format!(
            "expired at {expires_at}, now {now}"
        )));
    }
    if let Some(nbf) = raw.nbf {
        if now < nbf.saturating_sub(leeway) {
            return Err(DapsError::ExpiredToken(format!(
                "not valid before {nbf}, now {now}"
            )));
        }
    }

    let subject = raw
        .sub
        .ok_or_else(|| DapsError::Verification("token carries no subject claim".to_string()))?;

    let issuer = raw.iss.unwrap_or_default();
    if issuer != expected_issuer {
        return Err(DapsError::Issuer {
            expected: expected_issuer.to_string(),
            actual: issuer,
        });
    }

    match raw.aud {
        Some(aud) if aud.contains(expected_audience) => {}
        other => {
            return Err(DapsError::Audience {
                expected: expected_audience.to_string(),
                actual: other.map(|a| a.to_string()).unwrap_or_default(),
            })
        }
    }

    Ok(VerifiedClaims {
        issuer,
        subject,
        audience: expected_audience.to_string(),
        expires_at,
        not_before: raw.nbf,
        issued_at: raw.iat,
        attributes: raw.attributes,
    })
}

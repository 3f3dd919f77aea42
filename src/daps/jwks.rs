// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Behaviour
//!
//! - Keys are looked up by key id; a hit never touches the network
//! - A miss refetches the whole key set once and replaces the cache
//! - Concurrent misses share one refetch (single-flight)
//! - The key set is fetched with the same restricted-trust client used for
//!   the token exchange
//!
//! The cache lives for the whole process and is shared by every acquisition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::DecodingKey;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::error::DapsError;

/// Path of the key set document below the DAPS base URL.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// A verification key as fetched from the trust anchor.
#[derive(Clone)]
pub struct VerificationKeyEntry {
    pub key_id: String,
    pub key: DecodingKey,
    pub fetched_at: DateTime<Utc>,
    /// JWKS URL the key was published at.
    pub source: String,
}

/// Process-wide cache of trust anchor verification keys.
#[derive(Default)]
pub struct KeySetCache {
    keys: RwLock<HashMap<String, VerificationKeyEntry>>,
    /// Held for the duration of a refetch.
    refetch: Mutex<()>,
    /// Number of completed refetches.
    generation: AtomicU64,
    fetches: AtomicU64,
}

impl KeySetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the public key for `key_id`, refetching once on a miss.
    pub async fn resolve(
        &self,
        key_id: &str,
        jwks_url: &str,
        client: &reqwest::Client,
    ) -> Result<DecodingKey, DapsError> {
        // Read before the lookup so a refetch finishing in between is noticed.
        let seen = self.generation.load(Ordering::Acquire);
        if let Some(key) = self.lookup(key_id, jwks_url).await {
            return Ok(key);
        }

        {
            let _refetch = self.refetch.lock().await;
            // Someone else finished a refetch while we waited: use theirs.
            if self.generation.load(Ordering::Acquire) == seen {
                debug!(kid = %key_id, "Verification key not cached, refetching key set");
                self.fetch_and_replace(jwks_url, client).await?;
            }
        }

        self.lookup(key_id, jwks_url).await.ok_or_else(|| {
            warn!(kid = %key_id, jwks_url = %jwks_url, "Verification key not published by trust anchor");
            DapsError::Verification(format!(
                "no verification key with id '{key_id}' at {jwks_url}"
            ))
        })
    }

    /// Force a refetch regardless of cache contents.
    pub async fn refresh(&self, jwks_url: &str, client: &reqwest::Client) -> Result<usize, DapsError> {
        let _refetch = self.refetch.lock().await;
        self.fetch_and_replace(jwks_url, client).await
    }

    /// Whether `key_id` is cached (from any source).
    pub async fn contains(&self, key_id: &str) -> bool {
        self.keys.read().await.contains_key(key_id)
    }

    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }

    /// Number of key set fetches attempted so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    async fn lookup(&self, key_id: &str, jwks_url: &str) -> Option<DecodingKey> {
        let keys = self.keys.read().await;
        keys.get(key_id)
            .filter(|entry| entry.source == jwks_url)
            .map(|entry| entry.key.clone())
    }

    /// Must be called with `refetch` held.
    async fn fetch_and_replace(&self, jwks_url: &str, client: &reqwest::Client) -> Result<usize, DapsError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let jwks = fetch_jwks(jwks_url, client).await?;

        let fetched_at = Utc::now();
        let mut fresh = HashMap::new();
        for jwk in &jwks.keys {
            let Some(key_id) = jwk.common.key_id.clone() else {
                warn!("Skipping JWKS entry without key id");
                continue;
            };
            match jwk_to_decoding_key(jwk) {
                Ok(key) => {
                    fresh.insert(
                        key_id.clone(),
                        VerificationKeyEntry {
                            key_id,
                            key,
                            fetched_at,
                            source: jwks_url.to_string(),
                        },
                    );
                }
                Err(e) => warn!(kid = %key_id, error = %e, "Skipping unusable JWKS entry"),
            }
        }

        let count = fresh.len();
        *self.keys.write().await = fresh;
        self.generation.fetch_add(1, Ordering::Release);

        info!(jwks_url = %jwks_url, keys = count, "Key set refreshed");
        Ok(count)
    }
}

/// Key set URL for a DAPS base URL.
pub fn jwks_endpoint(daps_url: &str) -> String {
    format!("{}{JWKS_PATH}", daps_url.trim_end_matches('/'))
}

/// Fetch JWKS from the endpoint.
async fn fetch_jwks(jwks_url: &str, client: &reqwest::Client) -> Result<JwkSet, DapsError> {
    let response = client
        .get(jwks_url)
        .send()
        .await
        .map_err(|e| DapsError::network(format!("JWKS fetch failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        return Err(DapsError::http_status(
            status.as_u16(),
            format!("HTTP {status} from JWKS endpoint"),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| DapsError::Protocol(format!("invalid JWKS document: {e}")))
}

/// Convert an RSA JWK to a DecodingKey.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, DapsError> {
    if let Some(alg) = jwk.common.key_algorithm {
        if alg != KeyAlgorithm::RS256 {
            return Err(DapsError::Crypto(format!("key algorithm {alg:?} is not RS256")));
        }
    }
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|e| DapsError::Crypto(format!("failed to create RSA key: {e}"))),
        _ => Err(DapsError::Crypto("unsupported key type in JWKS".to_string())),
    }
}

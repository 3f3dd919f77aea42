// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client with trust narrowed to the DAPS root.
//!
//! The platform trust store is never consulted: only certificates from the
//! connector's trust store can anchor a server chain.

use std::sync::Arc;
use std::time::Duration;

use rustls::{ClientConfig, RootCertStore};
use tracing::debug;

use super::credentials::{Identity, TrustAnchorSet};
use super::error::DapsError;

/// Per-phase network timeout (connect, write, read).
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(15);

/// Builds restricted-trust HTTP clients.
#[derive(Debug, Clone)]
pub struct TlsClientFactory {
    timeout: Duration,
}

impl Default for TlsClientFactory {
    fn default() -> Self {
        Self {
            timeout: NETWORK_TIMEOUT,
        }
    }
}

impl TlsClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a custom per-phase timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Client that trusts only `anchors` and presents no client certificate.
    pub fn build(&self, anchors: &TrustAnchorSet) -> Result<reqwest::Client, DapsError> {
        self.build_client(anchors, None)
    }

    /// Client that trusts only `anchors` and authenticates with `identity`.
    pub fn build_mutual(
        &self,
        anchors: &TrustAnchorSet,
        identity: &Identity,
    ) -> Result<reqwest::Client, DapsError> {
        self.build_client(anchors, Some(identity))
    }

    fn build_client(
        &self,
        anchors: &TrustAnchorSet,
        identity: Option<&Identity>,
    ) -> Result<reqwest::Client, DapsError> {
        let tls = tls_config(anchors, identity)?;

        // reqwest has no separate write timeout; the overall deadline covers
        // connect + write + read at one timeout each.
        reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .connect_timeout(self.timeout)
            .read_timeout(self.timeout)
            .timeout(self.timeout * 3)
            .build()
            .map_err(|e| DapsError::Crypto(format!("failed to build HTTP client: {e}")))
    }
}

/// Root store built from the anchor set alone.
///
/// Exactly one usable root store must come out of the anchors: an empty set
/// or any certificate that cannot serve as an anchor is a misconfiguration.
pub fn root_store(anchors: &TrustAnchorSet) -> Result<RootCertStore, DapsError> {
    if anchors.is_empty() {
        return Err(DapsError::Crypto(
            "trust store holds no certificates".to_string(),
        ));
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(anchors.certificates().iter().cloned());
    if ignored > 0 || added == 0 {
        return Err(DapsError::Crypto(format!(
            "unexpected trust anchors: {added} usable, {ignored} rejected"
        )));
    }

    debug!(anchors = added, "Trust anchors installed");
    Ok(roots)
}

fn tls_config(anchors: &TrustAnchorSet, identity: Option<&Identity>) -> Result<ClientConfig, DapsError> {
    let roots = root_store(anchors)?;
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| DapsError::Crypto(format!("TLS protocol setup failed: {e}")))?
        .with_root_certificates(roots);

    match identity {
        Some(identity) => builder
            .with_client_auth_cert(identity.certificate_chain().to_vec(), identity.tls_private_key())
            .map_err(|e| DapsError::Crypto(format!("client certificate rejected: {e}"))),
        None => Ok(builder.with_no_client_auth()),
    }
}

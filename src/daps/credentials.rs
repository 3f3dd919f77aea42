// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Connector identity and trust anchors loaded from local stores.
//!
//! Credentials are reloaded on every acquisition so an identity rotated on
//! disk is picked up without restarting the service.

use std::fmt;
use std::path::{Path, PathBuf};

use jsonwebtoken::EncodingKey;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::error::DapsError;
use super::keystore::KeyStore;

const PKCS8_TAG: &str = "PRIVATE KEY";
const PKCS1_TAG: &str = "RSA PRIVATE KEY";
const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Encoding of the identity's private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Pkcs8,
    Pkcs1,
}

/// The connector's private key and certificate chain.
pub struct Identity {
    alias: String,
    key_pem: String,
    key_der: Vec<u8>,
    key_format: KeyFormat,
    certificate_chain: Vec<CertificateDer<'static>>,
}

impl Identity {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn key_format(&self) -> KeyFormat {
        self.key_format
    }

    /// Leaf certificate.
    pub fn certificate(&self) -> &CertificateDer<'static> {
        // Construction guarantees a non-empty chain.
        &self.certificate_chain[0]
    }

    pub fn certificate_chain(&self) -> &[CertificateDer<'static>] {
        &self.certificate_chain
    }

    /// Lowercase hex SHA-256 fingerprint of the leaf certificate.
    pub fn key_id(&self) -> String {
        Sha256::digest(self.certificate().as_ref())
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// RS256 signing key for client assertions.
    pub(crate) fn encoding_key(&self) -> Result<EncodingKey, DapsError> {
        EncodingKey::from_rsa_pem(self.key_pem.as_bytes())
            .map_err(|e| DapsError::Crypto(format!("identity key is not a usable RSA key: {e}")))
    }

    /// Private key in the form rustls expects for client authentication.
    pub(crate) fn tls_private_key(&self) -> PrivateKeyDer<'static> {
        match self.key_format {
            KeyFormat::Pkcs8 => PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_der.clone())),
            KeyFormat::Pkcs1 => PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(self.key_der.clone())),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("alias", &self.alias)
            .field("key_format", &self.key_format)
            .field("private_key", &"<redacted>")
            .field("certificates", &self.certificate_chain.len())
            .finish()
    }
}

/// Trusted root/intermediate certificates, in store order.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchorSet {
    certificates: Vec<CertificateDer<'static>>,
}

impl TrustAnchorSet {
    pub fn new(certificates: Vec<CertificateDer<'static>>) -> Self {
        let mut set = Self::default();
        for cert in certificates {
            set.push(cert);
        }
        set
    }

    /// Parse every certificate in a PEM bundle.
    pub fn from_pem(pem_bundle: &str) -> Result<Self, DapsError> {
        Ok(Self::new(parse_certificates(pem_bundle)?))
    }

    fn push(&mut self, cert: CertificateDer<'static>) {
        if !self.certificates.contains(&cert) {
            self.certificates.push(cert);
        }
    }

    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certificates
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

/// Loads identity and trust anchors from a credentials directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    directory: PathBuf,
}

impl CredentialStore {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Load the identity stored under `alias` and every trusted certificate.
    ///
    /// Both stores are protected by the same password.
    pub fn load(
        &self,
        key_store_file: &str,
        trust_store_file: &str,
        password: &str,
        alias: &str,
    ) -> Result<(Identity, TrustAnchorSet), DapsError> {
        let key_store_path = self.directory.join(key_store_file);
        let trust_store_path = self.directory.join(trust_store_file);

        info!(key_store = %key_store_path.display(), "Loading key store");
        let key_store = KeyStore::open(&key_store_path, password)?;
        info!(trust_store = %trust_store_path.display(), "Loading trust store");
        let trust_store = KeyStore::open(&trust_store_path, password)?;

        let identity = identity_from_store(&key_store, alias)?;
        let anchors = anchors_from_store(&trust_store)?;

        debug!(
            alias = %identity.alias,
            key_id = %identity.key_id(),
            chain_len = identity.certificate_chain.len(),
            anchors = anchors.len(),
            "Credentials loaded"
        );

        Ok((identity, anchors))
    }
}

fn identity_from_store(store: &KeyStore, alias: &str) -> Result<Identity, DapsError> {
    let entry = store.entry(alias).ok_or_else(|| {
        DapsError::Configuration(format!("key store has no entry for alias '{alias}'"))
    })?;

    let key_pem = entry.private_key.as_deref().ok_or_else(|| {
        DapsError::Crypto(format!("alias '{alias}' does not hold a private key"))
    })?;

    let parsed = pem::parse(key_pem)
        .map_err(|e| DapsError::Crypto(format!("invalid private key PEM for '{alias}': {e}")))?;
    let key_format = match parsed.tag() {
        PKCS8_TAG => KeyFormat::Pkcs8,
        PKCS1_TAG => KeyFormat::Pkcs1,
        other => {
            return Err(DapsError::Crypto(format!(
                "unsupported private key type '{other}' for '{alias}'"
            )))
        }
    };

    let mut certificate_chain = Vec::new();
    for pem_block in &entry.certificate_chain {
        certificate_chain.extend(parse_certificates(pem_block)?);
    }
    if certificate_chain.is_empty() {
        return Err(DapsError::Crypto(format!(
            "alias '{alias}' has no certificate"
        )));
    }

    Ok(Identity {
        alias: alias.to_string(),
        key_pem: key_pem.to_string(),
        key_der: parsed.contents().to_vec(),
        key_format,
        certificate_chain,
    })
}

fn anchors_from_store(store: &KeyStore) -> Result<TrustAnchorSet, DapsError> {
    let mut anchors = TrustAnchorSet::default();
    for (_, entry) in store.entries() {
        for pem_block in &entry.certificate_chain {
            for cert in parse_certificates(pem_block)? {
                anchors.push(cert);
            }
        }
    }
    Ok(anchors)
}

fn parse_certificates(pem_bundle: &str) -> Result<Vec<CertificateDer<'static>>, DapsError> {
    let blocks = pem::parse_many(pem_bundle)
        .map_err(|e| DapsError::Crypto(format!("invalid certificate PEM: {e}")))?;
    blocks
        .into_iter()
        .map(|block| {
            if block.tag() == CERTIFICATE_TAG {
                Ok(CertificateDer::from(block.contents().to_vec()))
            } else {
                Err(DapsError::Crypto(format!(
                    "expected CERTIFICATE block, found '{}'",
                    block.tag()
                )))
            }
        })
        .collect()
}

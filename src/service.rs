// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Token Acquisition Service
//!
//! Runs one acquisition attempt end to end:
//!
//! `Idle → LoadingCredentials → BuildingAssertion → Exchanging → Verifying → Succeeded | Failed`
//!
//! Every failure is caught here, logged once with the failing component and
//! error kind, and returned as a [`TokenOutcome`] carrying the
//! [`INVALID_TOKEN`] sentinel. Callers decide by looking at
//! [`TokenOutcome::error`], never at the token string.
//!
//! Attempts are independent of each other. The only state they share is the
//! process-wide [`KeySetCache`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info};

use crate::config::{ConnectorConfig, DapsSettings};
use crate::daps::{
    jwks_endpoint, AssertionBuilder, CredentialStore, DapsError, ErrorKind, Identity, KeySetCache,
    TlsClientFactory, TokenExchangeClient, TokenVerifier, TrustAnchorSet, VerifiedClaims,
};

/// Token string handed out when an attempt fails.
pub const INVALID_TOKEN: &str = "INVALID_TOKEN";

/// Parameters of one acquisition.
#[derive(Clone)]
pub struct TokenRequest {
    pub directory: PathBuf,
    pub daps_url: String,
    pub keystore_name: String,
    pub keystore_password: String,
    pub keystore_alias: String,
    pub truststore_name: String,
    pub connector_id: String,
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("directory", &self.directory)
            .field("daps_url", &self.daps_url)
            .field("keystore_name", &self.keystore_name)
            .field("keystore_password", &"<redacted>")
            .field("keystore_alias", &self.keystore_alias)
            .field("truststore_name", &self.truststore_name)
            .field("connector_id", &self.connector_id)
            .finish()
    }
}

/// Stage of an acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    LoadingCredentials,
    BuildingAssertion,
    Exchanging,
    Verifying,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::LoadingCredentials => "loading_credentials",
            Phase::BuildingAssertion => "building_assertion",
            Phase::Exchanging => "exchanging",
            Phase::Verifying => "verifying",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Succeeded,
    Failed { phase: Phase, kind: ErrorKind },
}

/// Result of [`TokenAcquisitionService::acquire_token`].
#[derive(Debug)]
pub struct TokenOutcome {
    /// The verified token, or [`INVALID_TOKEN`].
    pub token: String,
    pub error: Option<DapsError>,
    pub state: AttemptState,
    /// Present on success.
    pub claims: Option<VerifiedClaims>,
}

impl TokenOutcome {
    fn succeeded(token: String, claims: VerifiedClaims) -> Self {
        Self {
            token,
            error: None,
            state: AttemptState::Succeeded,
            claims: Some(claims),
        }
    }

    fn failed(phase: Phase, error: DapsError) -> Self {
        Self {
            token: INVALID_TOKEN.to_string(),
            state: AttemptState::Failed {
                phase,
                kind: error.kind(),
            },
            error: Some(error),
            claims: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<String, DapsError> {
        match self.error {
            None => Ok(self.token),
            Some(e) => Err(e),
        }
    }
}

/// Failure inside an attempt, tagged with where it happened.
struct AttemptError {
    phase: Phase,
    component: &'static str,
    error: DapsError,
}

trait AtPhase<T> {
    fn at(self, phase: Phase, component: &'static str) -> Result<T, AttemptError>;
}

impl<T> AtPhase<T> for Result<T, DapsError> {
    fn at(self, phase: Phase, component: &'static str) -> Result<T, AttemptError> {
        self.map_err(|error| AttemptError {
            phase,
            component,
            error,
        })
    }
}

/// Obtains verified Dynamic Attribute Tokens.
pub struct TokenAcquisitionService {
    settings: DapsSettings,
    keys: Arc<KeySetCache>,
    tls: TlsClientFactory,
    assertions: AssertionBuilder,
    config: RwLock<Option<ConnectorConfig>>,
}

impl TokenAcquisitionService {
    pub fn new(settings: DapsSettings) -> Self {
        Self::with_key_cache(settings, Arc::new(KeySetCache::new()))
    }

    /// Share an existing key cache, e.g. between several services in one process.
    pub fn with_key_cache(settings: DapsSettings, keys: Arc<KeySetCache>) -> Self {
        let tls = TlsClientFactory::new().with_timeout(settings.network_timeout);
        let assertions =
            AssertionBuilder::new(settings.assertion_audience.clone(), settings.assertion_ttl);
        Self {
            settings,
            keys,
            tls,
            assertions,
            config: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &DapsSettings {
        &self.settings
    }

    pub fn key_cache(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    /// Replace the connector configuration used by [`Self::renew`].
    pub async fn update_config(&self, config: ConnectorConfig) {
        info!(
            daps_url = %config.daps_url,
            connector = %config.connector_uuid,
            "Connector configuration updated"
        );
        *self.config.write().await = Some(config);
    }

    pub async fn config(&self) -> Option<ConnectorConfig> {
        self.config.read().await.clone()
    }

    /// Acquire a token with the latest connector configuration.
    pub async fn renew(&self) -> TokenOutcome {
        let Some(config) = self.config().await else {
            let error = DapsError::Configuration("no connector configuration available".to_string());
            error!(
                component = "TokenAcquisitionService",
                phase = %Phase::Idle,
                error_kind = error.error_code(),
                error = %error,
                "Token renewal failed"
            );
            return TokenOutcome::failed(Phase::Idle, error);
        };

        let request = config.token_request(&self.settings.credentials_dir);
        self.acquire_token(&request).await
    }

    /// Run one acquisition attempt.
    pub async fn acquire_token(&self, request: &TokenRequest) -> TokenOutcome {
        info!(
            connector = %request.connector_id,
            daps_url = %request.daps_url,
            "Acquiring Dynamic Attribute Token"
        );

        match self.attempt(request).await {
            Ok((token, claims)) => {
                info!(
                    connector = %request.connector_id,
                    token_len = token.len(),
                    expires_at = claims.expires_at,
                    "Dynamic Attribute Token acquired"
                );
                TokenOutcome::succeeded(token, claims)
            }
            Err(failure) => {
                error!(
                    connector = %request.connector_id,
                    component = failure.component,
                    phase = %failure.phase,
                    error_kind = failure.error.error_code(),
                    status = ?failure.error.status(),
                    error = %failure.error,
                    "Token acquisition failed"
                );
                TokenOutcome::failed(failure.phase, failure.error)
            }
        }
    }

    async fn attempt(&self, request: &TokenRequest) -> Result<(String, VerifiedClaims), AttemptError> {
        let (identity, anchors) = load_credentials(request)
            .await
            .at(Phase::LoadingCredentials, "CredentialStore")?;

        let client = self
            .tls
            .build_mutual(&anchors, &identity)
            .at(Phase::LoadingCredentials, "TlsClientFactory")?;

        let assertion = self
            .assertions
            .build(&identity, &request.connector_id)
            .at(Phase::BuildingAssertion, "AssertionBuilder")?;

        let response = TokenExchangeClient::new(client.clone())
            .with_scope(self.settings.scope.clone())
            .exchange(&request.daps_url, &assertion)
            .await
            .at(Phase::Exchanging, "TokenExchangeClient")?;

        let verifier = TokenVerifier::new(self.keys.clone(), jwks_endpoint(&request.daps_url), client)
            .with_leeway(self.settings.clock_skew_secs);
        let claims = verifier
            .verify(
                &response.access_token,
                self.settings.expected_issuer_for(&request.connector_id),
                &self.settings.expected_audience,
            )
            .await
            .at(Phase::Verifying, "TokenVerifier")?;

        Ok((response.access_token, claims))
    }
}

/// Read and decrypt both stores on the blocking pool.
async fn load_credentials(request: &TokenRequest) -> Result<(Identity, TrustAnchorSet), DapsError> {
    let store = CredentialStore::new(&request.directory);
    let keystore = request.keystore_name.clone();
    let truststore = request.truststore_name.clone();
    let password = request.keystore_password.clone();
    let alias = request.keystore_alias.clone();

    tokio::task::spawn_blocking(move || store.load(&keystore, &truststore, &password, &alias))
        .await
        .map_err(|e| DapsError::Crypto(format!("credential loading task failed: {e}")))?
}

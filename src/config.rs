// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Connector settings and fixed DAPS protocol values. Both can be loaded from
//! the environment at startup; the connector settings can also be replaced at
//! runtime through [`crate::settings`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DAPS_URL` | DAPS base URL (`/token` and `/.well-known/jwks.json` below it) | Required |
//! | `KEYSTORE_NAME` | Identity store file name inside the credentials directory | Required |
//! | `KEYSTORE_PASSWORD` | Password protecting both stores | Required |
//! | `KEYSTORE_ALIAS` | Alias of the connector key entry | `1` |
//! | `TRUSTSTORE_NAME` | Trust store file name inside the credentials directory | Required |
//! | `CONNECTOR_UUID` | Connector identifier registered at the DAPS | Required |
//! | `CREDENTIALS_DIR` | Directory holding both stores | `etc` |
//! | `DAPS_EXPECTED_ISSUER` | Required `iss` of returned tokens | connector identifier |
//! | `DAPS_EXPECTED_AUDIENCE` | Required `aud` of returned tokens | `api.Audience` |
//! | `TOKEN_RENEWAL_INTERVAL_SECS` | Seconds between renewals | `3600` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::daps::assertion::{DEFAULT_ASSERTION_AUDIENCE, DEFAULT_ASSERTION_TTL};
use crate::daps::exchange::CONNECTOR_SCOPE;
use crate::daps::tls::NETWORK_TIMEOUT;
use crate::daps::verifier::CLOCK_SKEW_LEEWAY;
use crate::daps::DapsError;
use crate::service::TokenRequest;

pub const DAPS_URL_ENV: &str = "DAPS_URL";
pub const KEYSTORE_NAME_ENV: &str = "KEYSTORE_NAME";
pub const KEYSTORE_PASSWORD_ENV: &str = "KEYSTORE_PASSWORD";
pub const KEYSTORE_ALIAS_ENV: &str = "KEYSTORE_ALIAS";
pub const TRUSTSTORE_NAME_ENV: &str = "TRUSTSTORE_NAME";
pub const CONNECTOR_UUID_ENV: &str = "CONNECTOR_UUID";
pub const CREDENTIALS_DIR_ENV: &str = "CREDENTIALS_DIR";
pub const EXPECTED_ISSUER_ENV: &str = "DAPS_EXPECTED_ISSUER";
pub const EXPECTED_AUDIENCE_ENV: &str = "DAPS_EXPECTED_AUDIENCE";
pub const RENEWAL_INTERVAL_ENV: &str = "TOKEN_RENEWAL_INTERVAL_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default credentials directory, relative to the working directory.
pub const DEFAULT_CREDENTIALS_DIR: &str = "etc";

/// Alias of the key entry in single-entry stores.
pub const DEFAULT_KEYSTORE_ALIAS: &str = "1";

pub const DEFAULT_RENEWAL_INTERVAL: Duration = Duration::from_secs(3600);

/// Connector settings as exchanged with the configuration API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    pub daps_url: String,
    pub keystore_name: String,
    pub keystore_password: String,
    #[serde(default = "default_alias")]
    pub keystore_alias_name: String,
    pub truststore_name: String,
    #[serde(rename = "connectorUUID")]
    pub connector_uuid: String,
}

fn default_alias() -> String {
    DEFAULT_KEYSTORE_ALIAS.to_string()
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("daps_url", &self.daps_url)
            .field("keystore_name", &self.keystore_name)
            .field("keystore_password", &"<redacted>")
            .field("keystore_alias_name", &self.keystore_alias_name)
            .field("truststore_name", &self.truststore_name)
            .field("connector_uuid", &self.connector_uuid)
            .finish()
    }
}

impl ConnectorConfig {
    /// Load from the environment.
    pub fn from_env() -> Result<Self, DapsError> {
        let config = Self {
            daps_url: env_required(DAPS_URL_ENV)?,
            keystore_name: env_required(KEYSTORE_NAME_ENV)?,
            keystore_password: env_required(KEYSTORE_PASSWORD_ENV)?,
            keystore_alias_name: env_or_default(KEYSTORE_ALIAS_ENV, DEFAULT_KEYSTORE_ALIAS),
            truststore_name: env_required(TRUSTSTORE_NAME_ENV)?,
            connector_uuid: env_required(CONNECTOR_UUID_ENV)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject blank fields and a DAPS URL that is not absolute http(s).
    pub fn validate(&self) -> Result<(), DapsError> {
        let required = [
            ("dapsUrl", &self.daps_url),
            ("keystoreName", &self.keystore_name),
            ("keystoreAliasName", &self.keystore_alias_name),
            ("truststoreName", &self.truststore_name),
            ("connectorUUID", &self.connector_uuid),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(DapsError::Configuration(format!("{name} must not be empty")));
            }
        }

        let url = Url::parse(&self.daps_url)
            .map_err(|e| DapsError::Configuration(format!("invalid dapsUrl '{}': {e}", self.daps_url)))?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(DapsError::Configuration(format!(
                "dapsUrl must use http or https, not '{other}'"
            ))),
        }
    }

    /// Acquisition parameters for stores kept in `directory`.
    pub fn token_request(&self, directory: impl AsRef<Path>) -> TokenRequest {
        TokenRequest {
            directory: directory.as_ref().to_path_buf(),
            daps_url: self.daps_url.clone(),
            keystore_name: self.keystore_name.clone(),
            keystore_password: self.keystore_password.clone(),
            keystore_alias: self.keystore_alias_name.clone(),
            truststore_name: self.truststore_name.clone(),
            connector_id: self.connector_uuid.clone(),
        }
    }
}

/// Fixed protocol values of the token exchange and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DapsSettings {
    pub credentials_dir: PathBuf,
    /// `aud` of the client assertion.
    pub assertion_audience: String,
    pub assertion_ttl: Duration,
    pub scope: String,
    pub network_timeout: Duration,
    pub clock_skew_secs: u64,
    /// `iss` required in returned tokens; `None` means the connector identifier.
    pub expected_issuer: Option<String>,
    /// `aud` required in returned tokens.
    pub expected_audience: String,
    pub renewal_interval: Duration,
}

impl Default for DapsSettings {
    fn default() -> Self {
        Self {
            credentials_dir: PathBuf::from(DEFAULT_CREDENTIALS_DIR),
            assertion_audience: DEFAULT_ASSERTION_AUDIENCE.to_string(),
            assertion_ttl: DEFAULT_ASSERTION_TTL,
            scope: CONNECTOR_SCOPE.to_string(),
            network_timeout: NETWORK_TIMEOUT,
            clock_skew_secs: CLOCK_SKEW_LEEWAY,
            expected_issuer: None,
            expected_audience: DEFAULT_ASSERTION_AUDIENCE.to_string(),
            renewal_interval: DEFAULT_RENEWAL_INTERVAL,
        }
    }
}

impl DapsSettings {
    /// Defaults overridden by whatever the environment provides.
    pub fn from_env() -> Result<Self, DapsError> {
        let mut settings = Self::default();
        if let Some(dir) = env_optional(CREDENTIALS_DIR_ENV) {
            settings.credentials_dir = PathBuf::from(dir);
        }
        settings.expected_issuer = env_optional(EXPECTED_ISSUER_ENV);
        if let Some(audience) = env_optional(EXPECTED_AUDIENCE_ENV) {
            settings.expected_audience = audience;
        }
        if let Some(raw) = env_optional(RENEWAL_INTERVAL_ENV) {
            let secs: u64 = raw.parse().map_err(|_| {
                DapsError::Configuration(format!("{RENEWAL_INTERVAL_ENV} must be a number of seconds, got '{raw}'"))
            })?;
            if secs == 0 {
                return Err(DapsError::Configuration(format!(
                    "{RENEWAL_INTERVAL_ENV} must be positive"
                )));
            }
            settings.renewal_interval = Duration::from_secs(secs);
        }
        Ok(settings)
    }

    pub fn with_credentials_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.credentials_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_expected_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    pub fn with_expected_audience(mut self, audience: impl Into<String>) -> Self {
        self.expected_audience = audience.into();
        self
    }

    pub fn with_renewal_interval(mut self, interval: Duration) -> Self {
        self.renewal_interval = interval;
        self
    }

    /// Issuer returned tokens must carry for `connector_id`.
    pub fn expected_issuer_for<'a>(&'a self, connector_id: &'a str) -> &'a str {
        self.expected_issuer.as_deref().unwrap_or(connector_id)
    }
}

fn env_required(name: &str) -> Result<String, DapsError> {
    env_optional(name)
        .ok_or_else(|| DapsError::Configuration(format!("environment variable {name} is not set")))
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

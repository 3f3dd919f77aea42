// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settings interface used by the configuration API.
//!
//! When an operator changes the connector settings, the new configuration is
//! stored, handed to the token service and a fresh token is acquired. The
//! caller gets back a [`ConfigUpdateStatus`].

use std::fmt;
use std::sync::RwLock;

use tracing::{info, warn};

use crate::config::ConnectorConfig;
use crate::daps::DapsError;
use crate::renewal::TokenRenewer;

/// Where connector settings live.
pub trait SettingsStore: Send + Sync {
    fn connector_config(&self) -> Option<ConnectorConfig>;

    fn set_connector_config(&self, config: ConnectorConfig) -> Result<(), DapsError>;
}

/// Process-local settings.
#[derive(Debug, Default)]
pub struct InMemorySettings {
    config: RwLock<Option<ConnectorConfig>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConnectorConfig) -> Self {
        Self {
            config: RwLock::new(Some(config)),
        }
    }
}

impl SettingsStore for InMemorySettings {
    fn connector_config(&self) -> Option<ConnectorConfig> {
        self.config.read().ok()?.clone()
    }

    fn set_connector_config(&self, config: ConnectorConfig) -> Result<(), DapsError> {
        let mut slot = self
            .config
            .write()
            .map_err(|_| DapsError::Configuration("settings lock poisoned".to_string()))?;
        *slot = Some(config);
        Ok(())
    }
}

/// Result reported to the configuration API.
#[derive(Debug)]
pub enum ConfigUpdateStatus {
    Ok,
    NoSettings,
    NoTokenService,
    Failed(DapsError),
}

impl ConfigUpdateStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ConfigUpdateStatus::Ok)
    }
}

impl fmt::Display for ConfigUpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigUpdateStatus::Ok => f.write_str("OK"),
            ConfigUpdateStatus::NoSettings => f.write_str("No settings available"),
            ConfigUpdateStatus::NoTokenService => f.write_str("No token service available"),
            ConfigUpdateStatus::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// Store `config`, pass it to the token service and re-acquire.
///
/// An invalid configuration is rejected before anything is stored. A failed
/// acquisition keeps the stored configuration and any previously held token.
pub async fn apply_connector_config(
    settings: Option<&dyn SettingsStore>,
    tokens: Option<&TokenRenewer>,
    config: ConnectorConfig,
) -> ConfigUpdateStatus {
    let Some(settings) = settings else {
        warn!("Connector configuration update without settings store");
        return ConfigUpdateStatus::NoSettings;
    };

    if let Err(e) = config.validate() {
        warn!(error = %e, "Rejected connector configuration");
        return ConfigUpdateStatus::Failed(e);
    }
    if let Err(e) = settings.set_connector_config(config.clone()) {
        return ConfigUpdateStatus::Failed(e);
    }

    let Some(tokens) = tokens else {
        warn!("Connector configuration stored but no token service to apply it");
        return ConfigUpdateStatus::NoTokenService;
    };

    tokens.service().update_config(config).await;
    match tokens.renew_now().await.into_result() {
        Ok(_) => {
            info!("Connector configuration applied");
            ConfigUpdateStatus::Ok
        }
        Err(e) => ConfigUpdateStatus::Failed(e),
    }
}

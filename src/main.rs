// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use daps_token_client::config::LOG_FORMAT_ENV;
use daps_token_client::{ConnectorConfig, DapsSettings, TokenAcquisitionService, TokenRenewer, TokenSlot};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let loaded = ConnectorConfig::from_env()
        .and_then(|config| DapsSettings::from_env().map(|settings| (config, settings)));
    let (config, settings) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        daps_url = %config.daps_url,
        connector = %config.connector_uuid,
        credentials_dir = %settings.credentials_dir.display(),
        renewal_interval_secs = settings.renewal_interval.as_secs(),
        "DAPS token daemon starting"
    );

    let service = Arc::new(TokenAcquisitionService::new(settings));
    service.update_config(config).await;

    let renewer = TokenRenewer::new(service, TokenSlot::new());
    if renewer.renew_now().await.is_success() {
        info!("Initial token acquired");
    } else {
        warn!("Initial token acquisition failed; retrying on the renewal schedule");
    }

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(renewer.run(shutdown.clone()));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown requested");
    shutdown.cancel();

    if let Err(e) = task.await {
        error!(error = %e, "Token renewer task failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).pretty().init();
    }
}

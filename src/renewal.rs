// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Token Renewer
//!
//! Background task that periodically re-acquires the Dynamic Attribute Token
//! with the latest connector configuration.
//!
//! ## Strategy
//!
//! Every `interval` (default 1 h) the renewer calls
//! [`TokenAcquisitionService::renew`]. A successful attempt replaces the token
//! held in the [`TokenSlot`]; a failed attempt is logged and leaves the
//! previous token in place. Failures never stop the loop.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::daps::VerifiedClaims;
use crate::service::{TokenAcquisitionService, TokenOutcome};

/// Last token obtained by a successful attempt.
#[derive(Clone)]
pub struct HeldToken {
    pub token: String,
    pub claims: VerifiedClaims,
    pub acquired_at: DateTime<Utc>,
}

impl fmt::Debug for HeldToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeldToken")
            .field("token_len", &self.token.len())
            .field("claims", &self.claims)
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

/// Shared holder of the current token.
#[derive(Debug, Clone, Default)]
pub struct TokenSlot {
    inner: Arc<RwLock<Option<HeldToken>>>,
}

impl TokenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token, if any attempt has succeeded yet.
    pub async fn token(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|held| held.token.clone())
    }

    pub async fn current(&self) -> Option<HeldToken> {
        self.inner.read().await.clone()
    }

    /// Store the token of a successful outcome. Failed outcomes are ignored.
    ///
    /// Returns whether the slot changed.
    pub async fn accept(&self, outcome: &TokenOutcome) -> bool {
        if !outcome.is_success() {
            return false;
        }
        let Some(claims) = outcome.claims.clone() else {
            return false;
        };
        *self.inner.write().await = Some(HeldToken {
            token: outcome.token.clone(),
            claims,
            acquired_at: Utc::now(),
        });
        true
    }
}

/// Periodic renewal driver. Clones share the service and the slot.
#[derive(Clone)]
pub struct TokenRenewer {
    service: Arc<TokenAcquisitionService>,
    slot: TokenSlot,
    interval: Duration,
}

impl TokenRenewer {
    pub fn new(service: Arc<TokenAcquisitionService>, slot: TokenSlot) -> Self {
        let interval = service.settings().renewal_interval;
        Self {
            service,
            slot,
            interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn slot(&self) -> &TokenSlot {
        &self.slot
    }

    /// Run the renewal loop until the cancellation token is triggered.
    ///
    /// The first renewal happens one interval after start. Should be spawned
    /// as a background task:
    /// ```rust,ignore
    /// tokio::spawn(renewer.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Token renewer starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Token renewer shutting down");
                    return;
                }
            }

            self.renew_step().await;
        }
    }

    pub fn service(&self) -> &Arc<TokenAcquisitionService> {
        &self.service
    }

    /// Execute one renewal attempt. Returns whether the slot was updated.
    pub async fn renew_step(&self) -> bool {
        self.renew_now().await.is_success()
    }

    /// Renew immediately, outside the schedule, and hand back the outcome.
    pub async fn renew_now(&self) -> TokenOutcome {
        let outcome = self.service.renew().await;
        if self.slot.accept(&outcome).await {
            info!("Token renewer: token replaced");
        } else {
            let kept = self.slot.current().await.is_some();
            warn!(
                error_kind = outcome.error.as_ref().map(|e| e.error_code()),
                previous_token_kept = kept,
                "Token renewer: renewal failed"
            );
        }
        outcome
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! DAPS Token Client - Dynamic Attribute Token acquisition
//!
//! This crate obtains short-lived access tokens from a Dynamic Attribute
//! Provisioning Service (DAPS) using the OAuth2 client-credentials grant with
//! a signed JWT client assertion, and verifies every returned token against
//! the DAPS key set before handing it out.
//!
//! ## Modules
//!
//! - `daps` - Credential loading, TLS, assertion, exchange and verification
//! - `service` - One acquisition attempt end to end
//! - `renewal` - Periodic renewal in the background
//! - `settings` - Connector settings updates from the configuration API
//! - `config` - Configuration structs and environment loading

pub mod config;
pub mod daps;
pub mod renewal;
pub mod service;
pub mod settings;

pub use config::{ConnectorConfig, DapsSettings};
pub use daps::{DapsError, ErrorKind, VerifiedClaims};
pub use renewal::{TokenRenewer, TokenSlot};
pub use service::{AttemptState, Phase, TokenAcquisitionService, TokenOutcome, TokenRequest, INVALID_TOKEN};
pub use settings::{apply_connector_config, ConfigUpdateStatus, InMemorySettings, SettingsStore};

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # DAPS Client Module
//!
//! Obtains a Dynamic Attribute Token (DAT) from a Dynamic Attribute
//! Provisioning Service (DAPS).
//!
//! ## Flow
//!
//! 1. Load the connector identity and the DAPS trust anchors from disk
//! 2. Build an HTTP client that trusts only those anchors
//! 3. Sign a JWT client assertion (`iss == sub == connector id`)
//! 4. `POST {daps}/token` with the client-credentials / JWT-bearer form
//! 5. Verify the returned token against `{daps}/.well-known/jwks.json`
//!
//! ## Security
//!
//! - No platform trust roots: the DAPS chain must end in the trust store
//! - RS256 only; `exp`, `sub`, issuer and audience are mandatory
//! - Clock skew tolerance is 30 seconds
//! - A token that fails verification is never handed out

pub mod assertion;
pub mod claims;
pub mod credentials;
pub mod error;
pub mod exchange;
pub mod jwks;
pub mod keystore;
pub mod tls;
pub mod verifier;

pub use assertion::{AssertionBuilder, ClientAssertion};
pub use claims::{Audience, VerifiedClaims};
pub use credentials::{CredentialStore, Identity, TrustAnchorSet};
pub use error::{DapsError, ErrorKind};
pub use exchange::{TokenExchangeClient, TokenResponse};
pub use jwks::{jwks_endpoint, KeySetCache};
pub use keystore::{KeyStore, StoreBuilder};
pub use tls::TlsClientFactory;
pub use verifier::TokenVerifier;

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared helpers: provisioned stores, a mock DAPS, signed tokens.

#![allow(dead_code)]

use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use daps_token_client::daps::{KeyStore, StoreBuilder, TrustAnchorSet};

pub const CONNECTOR_KEY: &str = include_str!("../fixtures/connector-key.pem");
pub const CONNECTOR_CERT: &str = include_str!("../fixtures/connector-cert.pem");
pub const CONNECTOR_JWKS: &str = include_str!("../fixtures/connector-jwks.json");
pub const DAPS_KEY: &str = include_str!("../fixtures/daps-key.pem");
pub const DAPS_JWKS: &str = include_str!("../fixtures/daps-jwks.json");
pub const DAPS_ROOT: &str = include_str!("../fixtures/daps-root-ca.pem");
pub const ROGUE_KEY: &str = include_str!("../fixtures/rogue-key.pem");

pub const DAPS_KID: &str = "daps-signing-1";
pub const PASSWORD: &str = "password";
pub const ALIAS: &str = "1";
pub const KEYSTORE: &str = "keystore.json";
pub const TRUSTSTORE: &str = "truststore.json";
pub const CONNECTOR_ID: &str = "connector-1";
pub const AUDIENCE: &str = "api.Audience";

/// Write an identity store and a trust store into `dir`.
pub fn provision_stores(dir: &Path) {
    StoreBuilder::new()
        .private_key_entry(ALIAS, CONNECTOR_KEY, vec![CONNECTOR_CERT.to_string()])
        .write(&dir.join(KEYSTORE), PASSWORD)
        .unwrap();
    StoreBuilder::new()
        .trusted_certificate("daps-root", DAPS_ROOT)
        .write(&dir.join(TRUSTSTORE), PASSWORD)
        .unwrap();
    assert!(KeyStore::open(&dir.join(KEYSTORE), PASSWORD).is_ok());
}

pub fn anchors() -> TrustAnchorSet {
    TrustAnchorSet::from_pem(DAPS_ROOT).unwrap()
}

/// Claims of a DAT that passes every check for `issuer`.
pub fn dat_claims(issuer: &str, expires_in: i64) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": issuer,
        "sub": CONNECTOR_ID,
        "aud": [AUDIENCE],
        "iat": now,
        "nbf": now,
        "exp": now + expires_in,
        "@type": "ids:DatPayload",
        "securityProfile": "idsc:BASE_SECURITY_PROFILE",
        "referringConnector": "http://connector-1.test"
    })
}

pub fn sign_with(claims: &Value, key_pem: &str, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(key_pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// A DAT signed by the DAPS key.
pub fn sign_dat(claims: &Value) -> String {
    sign_with(claims, DAPS_KEY, DAPS_KID)
}

pub async fn mount_token(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "bearer",
            "expires_in": 3600,
            "scope": "ids_connector"
        })))
        .expect(times)
        .mount(server)
        .await;
}

pub async fn mount_jwks(server: &MockServer, times: u64) {
    let jwks: Value = serde_json::from_str(DAPS_JWKS).unwrap();
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
        .expect(times)
        .mount(server)
        .await;
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Dynamic Attribute Token claims.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `aud` may be a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(value) => value == audience,
            Audience::Many(values) => values.iter().any(|v| v == audience),
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Audience::Single(value) => f.write_str(value),
            Audience::Many(values) => write!(f, "[{}]", values.join(", ")),
        }
    }
}

/// Claims as they appear in a token, before any checks.
///
/// Every registered claim is optional here so that a missing claim surfaces
/// as a verification failure instead of a parse error.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClaims {
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    /// Everything else: the attributes the DAPS asserts about the connector.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Claims of a token that passed verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedClaims {
    pub issuer: String,
    pub subject: String,
    /// The audience value that matched.
    pub audience: String,
    pub expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,
    pub attributes: Map<String, Value>,
}

impl VerifiedClaims {
    /// Look up a non-registered claim.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! DAPS client errors.

/// Error raised anywhere along the token acquisition pipeline.
///
/// Verification failures are split into several variants so callers can
/// tell an expired token from a token minted for somebody else.
#[derive(Debug, thiserror::Error)]
pub enum DapsError {
    /// Missing or unreadable store file, unknown alias, bad settings
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Store decoding, key extraction, signing or trust setup failed
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Connection failure, timeout or non-2xx response
    #[error("network error: {message}")]
    Network {
        status: Option<u16>,
        message: String,
    },

    /// The trust anchor answered with something we cannot use
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Token rejected (algorithm, missing claim, unknown key, bad signature)
    #[error("token verification failed: {0}")]
    Verification(String),

    /// Token outside its validity window, skew included
    #[error("token is outside its validity window: {0}")]
    ExpiredToken(String),

    #[error("token audience mismatch: expected {expected}, got {actual}")]
    Audience { expected: String, actual: String },

    #[error("token issuer mismatch: expected {expected}, got {actual}")]
    Issuer { expected: String, actual: String },
}

/// Fieldless view of [`DapsError`], convenient for matching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Crypto,
    Network,
    Protocol,
    Verification,
    ExpiredToken,
    Audience,
    Issuer,
}

impl DapsError {
    /// Network error for a transport failure (no HTTP status available).
    pub fn network(message: impl Into<String>) -> Self {
        DapsError::Network {
            status: None,
            message: message.into(),
        }
    }

    /// Network error for a non-success HTTP response.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        DapsError::Network {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DapsError::Configuration(_) => ErrorKind::Configuration,
            DapsError::Crypto(_) => ErrorKind::Crypto,
            DapsError::Network { .. } => ErrorKind::Network,
            DapsError::Protocol(_) => ErrorKind::Protocol,
            DapsError::Verification(_) => ErrorKind::Verification,
            DapsError::ExpiredToken(_) => ErrorKind::ExpiredToken,
            DapsError::Audience { .. } => ErrorKind::Audience,
            DapsError::Issuer { .. } => ErrorKind::Issuer,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        self.kind().as_str()
    }

    /// HTTP status carried by a `Network` error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            DapsError::Network { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the token itself was rejected (as opposed to the pipeline failing
    /// before a token was obtained).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Verification | ErrorKind::ExpiredToken | ErrorKind::Audience | ErrorKind::Issuer
        )
    }
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::Crypto => "crypto_error",
            ErrorKind::Network => "network_error",
            ErrorKind::Protocol => "protocol_error",
            ErrorKind::Verification => "verification_error",
            ErrorKind::ExpiredToken => "expired_token",
            ErrorKind::Audience => "audience_mismatch",
            ErrorKind::Issuer => "issuer_mismatch",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Restricted-trust TLS against a real rustls listener.

mod common;

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use common::*;
use daps_token_client::daps::{
    CredentialStore, Identity, KeySetCache, StoreBuilder, TlsClientFactory, TrustAnchorSet,
};
use daps_token_client::DapsError;

const TLS_CA: &str = include_str!("fixtures/tls-ca.pem");
const SERVER_CERT: &str = include_str!("fixtures/tls-server.pem");
const SERVER_KEY: &str = include_str!("fixtures/tls-server-key.pem");
const CLIENT_CERT: &str = include_str!("fixtures/tls-client.pem");
const CLIENT_KEY: &str = include_str!("fixtures/tls-client-key.pem");
const ROGUE_CERT: &str = include_str!("fixtures/tls-rogue.pem");
const ROGUE_SERVER_KEY: &str = include_str!("fixtures/tls-rogue-key.pem");

/// Certificates the server saw from the client (empty without client auth),
/// or `None` if no request made it through.
type PeerReport = oneshot::Receiver<Option<Vec<CertificateDer<'static>>>>;

fn certificates(pem: &str) -> Vec<CertificateDer<'static>> {
    TrustAnchorSet::from_pem(pem).unwrap().certificates().to_vec()
}

fn private_key(pem: &str) -> PrivateKeyDer<'static> {
    let parsed = pem::parse(pem).unwrap();
    PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(parsed.contents().to_vec()))
}

fn server_config(cert: &str, key: &str, client_ca: Option<&str>) -> ServerConfig {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .unwrap();

    let builder = match client_ca {
        Some(ca) => {
            let mut roots = RootCertStore::empty();
            roots.add_parsable_certificates(certificates(ca));
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .unwrap();
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    builder
        .with_single_cert(certificates(cert), private_key(key))
        .unwrap()
}

/// Serve the DAPS key set over TLS for exactly one connection.
async fn serve_once(config: ServerConfig) -> (String, PeerReport, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("https://127.0.0.1:{}/.well-known/jwks.json", listener.local_addr().unwrap().port());
    let acceptor = TlsAcceptor::from(Arc::new(config));
    let (report, peer) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut tls = match acceptor.accept(stream).await {
            Ok(tls) => tls,
            Err(_) => {
                let _ = report.send(None);
                return;
            }
        };

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match tls.read(&mut buf).await {
                Ok(0) | Err(_) => {
                    let _ = report.send(None);
                    return;
                }
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let presented = tls
            .get_ref()
            .1
            .peer_certificates()
            .map(<[_]>::to_vec)
            .unwrap_or_default();
        let _ = report.send(Some(presented));

        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            DAPS_JWKS.len(),
            DAPS_JWKS
        );
        let _ = tls.write_all(response.as_bytes()).await;
        let _ = tls.shutdown().await;
    });

    (url, peer, handle)
}

fn tls_anchors() -> TrustAnchorSet {
    TrustAnchorSet::from_pem(TLS_CA).unwrap()
}

/// Connector identity issued by the TLS test CA, loaded from provisioned stores.
fn client_identity(dir: &TempDir) -> Identity {
    StoreBuilder::new()
        .private_key_entry(ALIAS, CLIENT_KEY, vec![CLIENT_CERT.to_string()])
        .write(&dir.path().join(KEYSTORE), PASSWORD)
        .unwrap();
    StoreBuilder::new()
        .trusted_certificate("tls-root", TLS_CA)
        .write(&dir.path().join(TRUSTSTORE), PASSWORD)
        .unwrap();
    let (identity, anchors) = CredentialStore::new(dir.path())
        .load(KEYSTORE, TRUSTSTORE, PASSWORD, ALIAS)
        .unwrap();
    assert_eq!(anchors.len(), 1);
    identity
}

#[tokio::test]
async fn server_chained_to_a_trust_anchor_is_accepted() {
    let (url, peer, server) = serve_once(server_config(SERVER_CERT, SERVER_KEY, None)).await;
    let client = TlsClientFactory::new().build(&tls_anchors()).unwrap();

    let keys = KeySetCache::new();
    let count = keys.refresh(&url, &client).await.unwrap();

    assert_eq!(count, 1);
    assert!(keys.contains(DAPS_KID).await);
    assert_eq!(peer.await.unwrap(), Some(Vec::new()));
    server.await.unwrap();
}

#[tokio::test]
async fn server_outside_the_trust_store_is_a_network_error() {
    let (url, peer, server) = serve_once(server_config(ROGUE_CERT, ROGUE_SERVER_KEY, None)).await;
    let client = TlsClientFactory::new().build(&tls_anchors()).unwrap();

    let keys = KeySetCache::new();
    let result = keys.refresh(&url, &client).await;

    assert!(matches!(result, Err(DapsError::Network { status: None, .. })));
    assert!(keys.is_empty().await);
    assert!(peer.await.unwrap().is_none());
    server.await.unwrap();
}

#[tokio::test]
async fn anchors_for_another_root_reject_the_server() {
    let (url, _peer, server) = serve_once(server_config(SERVER_CERT, SERVER_KEY, None)).await;
    let client = TlsClientFactory::new().build(&anchors()).unwrap();

    let result = KeySetCache::new().refresh(&url, &client).await;

    assert!(matches!(result, Err(DapsError::Network { status: None, .. })));
    server.await.unwrap();
}

#[tokio::test]
async fn mutual_client_presents_the_connector_certificate() {
    let dir = TempDir::new().unwrap();
    let identity = client_identity(&dir);
    let (url, peer, server) = serve_once(server_config(SERVER_CERT, SERVER_KEY, Some(TLS_CA))).await;
    let client = TlsClientFactory::new()
        .build_mutual(&tls_anchors(), &identity)
        .unwrap();

    KeySetCache::new().refresh(&url, &client).await.unwrap();

    let presented = peer.await.unwrap().unwrap();
    assert_eq!(presented.first(), Some(identity.certificate()));
    server.await.unwrap();
}

#[tokio::test]
async fn server_requiring_client_auth_refuses_anonymous_client() {
    let (url, peer, server) = serve_once(server_config(SERVER_CERT, SERVER_KEY, Some(TLS_CA))).await;
    let client = TlsClientFactory::new().build(&tls_anchors()).unwrap();

    let result = KeySetCache::new().refresh(&url, &client).await;

    assert!(matches!(result, Err(DapsError::Network { status: None, .. })));
    assert!(peer.await.unwrap().is_none());
    server.await.unwrap();
}

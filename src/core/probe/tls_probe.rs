// src/core/probe/tls_probe.rs

use chrono::{DateTime, Utc};
use native_tls::{Protocol, TlsConnector as NativeConnector};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{AlertDescription, ClientConfig, DigitallySignedStruct, ProtocolVersion, RootCertStore, SignatureScheme};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::spawn_blocking;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info, warn};
use x509_parser::prelude::*;

use crate::core::analysis::tls_grade::days_until;
use crate::core::error::ProbeError;
use crate::core::models::{Target, TlsInfo};

/// Accepts any certificate. Only used for the second handshake that reads the
/// details of a certificate the trusted handshake already rejected.
#[derive(Debug)]
struct AcceptAnyCert {
    schemes: Vec<SignatureScheme>,
}

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn trusted_config() -> Result<ClientConfig, ProbeError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Ok(ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

fn inspecting_config() -> Result<ClientConfig, ProbeError> {
    let provider = provider();
    let schemes = provider.signature_verification_algorithms.supported_schemes();
    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { schemes }))
        .with_no_client_auth())
}

fn protocol_name(version: Option<ProtocolVersion>) -> String {
    match version {
        Some(ProtocolVersion::TLSv1_3) => "TLSv1.3".to_string(),
        Some(ProtocolVersion::TLSv1_2) => "TLSv1.2".to_string(),
        Some(ProtocolVersion::TLSv1_1) => "TLSv1.1".to_string(),
        Some(ProtocolVersion::TLSv1_0) => "TLSv1".to_string(),
        Some(other) => format!("{:?}", other),
        None => "unknown".to_string(),
    }
}

fn rustls_error(e: &std::io::Error) -> Option<&rustls::Error> {
    e.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>())
}

fn is_certificate_rejection(e: &std::io::Error) -> bool {
    matches!(rustls_error(e), Some(rustls::Error::InvalidCertificate(_)))
}

/// The server refused every version rustls offers (TLS 1.2 and 1.3).
fn is_protocol_mismatch(e: &std::io::Error) -> bool {
    matches!(
        rustls_error(e),
        Some(
            rustls::Error::PeerIncompatible(_)
                | rustls::Error::AlertReceived(AlertDescription::ProtocolVersion | AlertDescription::HandshakeFailure)
        )
    )
}

/// Certificate fields pulled from the leaf.
struct LeafDetails {
    issuer: String,
    subject: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    self_signed: bool,
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| name.to_string())
}

fn parse_leaf(der: &[u8]) -> Result<LeafDetails, ProbeError> {
    let (_, x509) = parse_x509_certificate(der).map_err(|e| {
        error!(error = %e, "Failed to parse X.509 certificate");
        ProbeError::Tls(format!("X.509 parse error: {}", e))
    })?;
    let validity = x509.validity();
    Ok(LeafDetails {
        issuer: common_name(x509.issuer()),
        subject: common_name(x509.subject()),
        not_before: asn1_time_to_chrono_utc(&validity.not_before),
        not_after: asn1_time_to_chrono_utc(&validity.not_after),
        self_signed: x509.issuer().to_string() == x509.subject().to_string(),
    })
}

/// One rustls handshake; returns the negotiated protocol and the leaf certificate.
async fn handshake(
    config: ClientConfig,
    addr: SocketAddr,
    server_name: ServerName<'static>,
    limit: Duration,
) -> Result<(String, Vec<u8>), std::io::Error> {
    let connector = TlsConnector::from(Arc::new(config));
    let stream = timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "TCP connect timed out"))??;
    let tls = timeout(limit, connector.connect(server_name, stream))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "TLS handshake timed out"))??;

    let (_, connection) = tls.get_ref();
    let protocol = protocol_name(connection.protocol_version());
    let leaf = connection
        .peer_certificates()
        .and_then(|certs| certs.first())
        .map(|cert| cert.as_ref().to_vec())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "server sent no certificate"))?;
    Ok((protocol, leaf))
}

/// A session negotiated over TLS 1.0 or 1.1 by native-tls.
struct LegacySession {
    protocol: &'static str,
    leaf: Vec<u8>,
    trusted: bool,
}

/// One blocking native-tls handshake pinned to `version`. Returns the leaf
/// certificate (empty if the server sent none) when the handshake succeeds.
fn legacy_connect(addr: SocketAddr, hostname: &str, limit: Duration, version: Protocol, verify: bool) -> Option<Vec<u8>> {
    let connector = NativeConnector::builder()
        .min_protocol_version(Some(version))
        .max_protocol_version(Some(version))
        .danger_accept_invalid_certs(!verify)
        .danger_accept_invalid_hostnames(!verify)
        .build()
        .map_err(|e| debug!(error = %e, "Legacy TLS connector unavailable."))
        .ok()?;
    let stream = std::net::TcpStream::connect_timeout(&addr, limit).ok()?;
    let _ = stream.set_read_timeout(Some(limit));
    let _ = stream.set_write_timeout(Some(limit));
    let tls = connector.connect(hostname, stream).ok()?;
    Some(
        tls.peer_certificate()
            .ok()
            .flatten()
            .and_then(|cert| cert.to_der().ok())
            .unwrap_or_default(),
    )
}

/// Tries TLS 1.1, then TLS 1.0, on the blocking pool. With `check_trust` a
/// second, verifying handshake decides `trusted`; otherwise it is `false`.
async fn legacy_handshake(addr: SocketAddr, hostname: String, limit: Duration, check_trust: bool) -> Option<LegacySession> {
    debug!(%addr, "Trying a legacy TLS handshake.");
    spawn_blocking(move || {
        for (version, protocol) in [(Protocol::Tlsv11, "TLSv1.1"), (Protocol::Tlsv10, "TLSv1")] {
            if let Some(leaf) = legacy_connect(addr, &hostname, limit, version, false) {
                let trusted = check_trust && legacy_connect(addr, &hostname, limit, version, true).is_some();
                return Some(LegacySession { protocol, leaf, trusted });
            }
        }
        None
    })
    .await
    .unwrap_or_else(|e| {
        error!(panic = %e, "Legacy TLS task panicked!");
        None
    })
}

/// Handshakes with the target and reports protocol and certificate details.
///
/// The first handshake validates against the webpki roots. If the certificate is
/// rejected, a second handshake reads it anyway so the grade can say why; such a
/// result carries `trusted: false`. A server that refuses TLS 1.2 and 1.3 is
/// retried over TLS 1.1/1.0 with native-tls and reported with that protocol.
pub(crate) async fn inspect(target: &Target, limit: Duration) -> Result<TlsInfo, ProbeError> {
    let port = if target.is_https() { target.port() } else { 443 };
    let addr = SocketAddr::new(target.resolved_ip(), port);
    info!(host = target.hostname(), %addr, "Starting TLS inspection.");

    let server_name = ServerName::try_from(target.hostname().to_string())
        .map_err(|e| ProbeError::Tls(format!("invalid server name: {}", e)))?;

    let hostname = target.hostname().to_string();
    let (protocol, leaf, trusted) = match handshake(trusted_config()?, addr, server_name.clone(), limit).await {
        Ok((protocol, leaf)) => (protocol, leaf, true),
        Err(e) if is_certificate_rejection(&e) => {
            warn!(host = target.hostname(), error = %e, "Certificate rejected, re-reading it untrusted.");
            let (protocol, leaf) = handshake(inspecting_config()?, addr, server_name, limit)
                .await
                .map_err(|e| ProbeError::Tls(e.to_string()))?;
            (protocol, leaf, false)
        }
        Err(e) if is_protocol_mismatch(&e) => {
            warn!(host = target.hostname(), error = %e, "No TLS 1.2/1.3, falling back to a legacy handshake.");
            let session = legacy_handshake(addr, hostname.clone(), limit, true)
                .await
                .ok_or_else(|| ProbeError::Tls(e.to_string()))?;
            (session.protocol.to_string(), session.leaf, session.trusted)
        }
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Err(ProbeError::Timeout(limit)),
        Err(e) => {
            error!(host = target.hostname(), error = %e, "TLS handshake failed");
            return Err(ProbeError::Tls(e.to_string()));
        }
    };

    let details = parse_leaf(&leaf)?;
    let legacy = match protocol.as_str() {
        "TLSv1.1" | "TLSv1" => true,
        _ => legacy_handshake(addr, hostname, limit, false).await.is_some(),
    };
    let days_remaining = days_until(details.not_after, Utc::now());
    info!(protocol = %protocol, issuer = %details.issuer, days_remaining, trusted, "TLS inspection finished.");

    Ok(TlsInfo {
        protocol,
        issuer: details.issuer,
        subject: details.subject,
        not_before: details.not_before,
        not_after: details.not_after,
        days_remaining,
        self_signed: details.self_signed,
        trusted,
        legacy_protocols_accepted: legacy,
    })
}

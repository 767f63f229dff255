//! TLS configuration
//!
//! Credentials are loaded with OpenSSL from PEM and handed to rustls as DER,
//! which is what the QUIC stack consumes. Both sides speak TLS 1.3 only and
//! negotiate the `h3` ALPN identifier.

use super::builtin_cert::BUILTIN_CERT;
use super::cert::CertInfo;
use crate::http::ALPN_H3;
use openssl::pkey::PKey;
use openssl::x509::X509;
use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("No initial cipher suite: {0}")]
    NoInitialCipherSuite(#[from] quinn::crypto::rustls::NoInitialCipherSuite),

    #[error("Certificate error: {0}")]
    Certificate(String),
}

/// Server certificate and private key
#[derive(Debug)]
pub struct Credentials {
    cert_der: CertificateDer<'static>,
    key_pkcs8: Vec<u8>,
    info: CertInfo,
}

impl Credentials {
    /// The built-in self-signed credentials
    pub fn builtin() -> Result<Self, TlsError> {
        Self::from_pem(BUILTIN_CERT.as_bytes())
    }

    /// Load a PEM bundle holding the certificate and its private key
    pub fn from_pem(pem: &[u8]) -> Result<Self, TlsError> {
        let cert = X509::from_pem(pem)
            .map_err(|e| TlsError::Certificate(format!("Failed to load certificate: {}", e)))?;
        let key = PKey::private_key_from_pem(pem)
            .map_err(|e| TlsError::Certificate(format!("Failed to load private key: {}", e)))?;

        if !cert.public_key()?.public_eq(&key) {
            return Err(TlsError::Certificate(
                "private key does not match certificate".to_string(),
            ));
        }

        Ok(Credentials {
            cert_der: CertificateDer::from(cert.to_der()?),
            key_pkcs8: key.private_key_to_pkcs8()?,
            info: CertInfo::from_x509(&cert),
        })
    }

    /// Identifying fields of the certificate
    pub fn info(&self) -> &CertInfo {
        &self.info
    }

    /// QUIC server configuration presenting these credentials
    pub fn server_config(&self) -> Result<quinn::ServerConfig, TlsError> {
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_pkcs8.clone()));

        let mut crypto = rustls::ServerConfig::builder_with_provider(provider())
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .with_no_client_auth()
            .with_single_cert(vec![self.cert_der.clone()], key)?;
        crypto.alpn_protocols = vec![ALPN_H3.to_vec()];

        Ok(quinn::ServerConfig::with_crypto(Arc::new(
            QuicServerConfig::try_from(crypto)?,
        )))
    }
}

/// QUIC client configuration for talking to the harness server
///
/// The server certificate is not verified: the harness exercises transport,
/// not PKI.
pub fn client_config() -> Result<quinn::ClientConfig, TlsError> {
    let mut crypto = rustls::ClientConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
        .with_no_client_auth();
    crypto.alpn_protocols = vec![ALPN_H3.to_vec()];

    Ok(quinn::ClientConfig::new(Arc::new(
        QuicClientConfig::try_from(crypto)?,
    )))
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(ring::default_provider())
}

/// Accepts any server certificate
#[derive(Debug)]
struct SkipServerVerification;

impl ServerCertVerifier for SkipServerVerification {
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
        ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

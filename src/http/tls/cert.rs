//! Certificate inspection
//!
//! Extracts the identifying fields of an X.509 certificate, either the one
//! the server loads or the one a client saw during the handshake.

use super::TlsError;
use openssl::nid::Nid;
use openssl::x509::{X509NameRef, X509Ref, X509};

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Certificate subject (Common Name)
    pub subject: String,
    /// Certificate issuer (Common Name)
    pub issuer: String,
    /// Subject Alternative Names (DNS names and IP addresses)
    pub subject_alt_names: Vec<String>,
}

impl CertInfo {
    /// Extract certificate information from an X.509 certificate
    pub fn from_x509(cert: &X509Ref) -> Self {
        CertInfo {
            subject: Self::get_cn(cert.subject_name()),
            issuer: Self::get_cn(cert.issuer_name()),
            subject_alt_names: Self::get_subject_alt_names(cert),
        }
    }

    /// Extract certificate information from DER bytes
    pub fn from_der(der: &[u8]) -> Result<Self, TlsError> {
        let cert = X509::from_der(der)
            .map_err(|e| TlsError::Certificate(format!("Failed to parse certificate: {}", e)))?;
        Ok(Self::from_x509(&cert))
    }

    /// Get Common Name from an X509 name
    fn get_cn(name: &X509NameRef) -> String {
        name.entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "<undef>".to_string())
    }

    /// Get Subject Alternative Names
    fn get_subject_alt_names(cert: &X509Ref) -> Vec<String> {
        let mut names = Vec::new();

        if let Some(san_ext) = cert.subject_alt_names() {
            for name in san_ext {
                if let Some(dns) = name.dnsname() {
                    names.push(format!("DNS:{}", dns));
                } else if let Some(ip) = name.ipaddress() {
                    if let Ok(octets) = <[u8; 4]>::try_from(ip) {
                        names.push(format!("IP:{}", std::net::Ipv4Addr::from(octets)));
                    } else if let Ok(octets) = <[u8; 16]>::try_from(ip) {
                        names.push(format!("IP:{}", std::net::Ipv6Addr::from(octets)));
                    }
                }
            }
        }

        names
    }
}

#[cfg(test)]
mod tests {
    use super::super::builtin_cert::BUILTIN_CERT;
    use super::*;

    #[test]
    fn test_cert_info_from_builtin() {
        let cert = X509::from_pem(BUILTIN_CERT.as_bytes()).unwrap();
        let info = CertInfo::from_x509(&cert);

        assert_eq!(info.subject, "example.com");
        assert_eq!(info.issuer, "example.com"); // Self-signed
        assert_eq!(info.subject_alt_names.len(), 2);
        assert!(info.subject_alt_names.contains(&"DNS:example.com".to_string()));
        assert!(info.subject_alt_names.contains(&"DNS:*.example.com".to_string()));
    }

    #[test]
    fn test_from_der_matches_pem() {
        let cert = X509::from_pem(BUILTIN_CERT.as_bytes()).unwrap();
        let der = cert.to_der().unwrap();

        assert_eq!(CertInfo::from_der(&der).unwrap(), CertInfo::from_x509(&cert));
        assert!(CertInfo::from_der(b"not a certificate").is_err());
    }
}

//! Certificate authority and leaf certificate issuance
//!
//! The cluster CA signs every control-plane certificate: the API server's
//! serving pair, kubelet and kubeconfig client pairs, and the etcd server,
//! client and peer pairs. Keys and certificates are exchanged as PEM
//! strings because that is how the certificate profile stores them.

mod bootstrap;

pub use bootstrap::{master_ip_addresses, set_default_certs, INTERNAL_LB_STATIC_IP_OFFSET};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use thiserror::Error;
use x509_parser::prelude::*;

/// Validity period for the cluster CA
pub const CA_VALIDITY_YEARS: i64 = 30;

/// Validity period for certificates signed by the cluster CA
pub const CERT_VALIDITY_YEARS: i64 = 30;

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// First master static IP is not an IPv4 literal
    #[error("invalid first master IP: {0:?}")]
    InvalidMasterIp(String),

    /// Service CIDR is not an IPv4 network
    #[error("invalid service CIDR: {0:?}")]
    InvalidServiceCidr(String),

    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Certificate generation failed
    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),

    /// Certificate parsing error
    #[error("certificate parsing error: {0}")]
    ParseError(String),
}

impl PkiError {
    /// Returns true when the caller supplied bad input rather than the
    /// cryptographic backend failing
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMasterIp(_) | Self::InvalidServiceCidr(_) | Self::ParseError(_)
        )
    }
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

fn compute_validity(years: i64) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    let not_after = now + ::time::Duration::days(years * 365);
    (now, not_after)
}

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// PEM certificate with its PEM private key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePair {
    /// PEM-encoded certificate
    pub certificate: String,
    /// PEM-encoded private key
    pub private_key: String,
}

/// What a leaf certificate authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateUsage {
    /// TLS server only
    Server,
    /// TLS client only
    Client,
    /// Both ends of a TLS connection, as etcd members are
    Peer,
}

impl CertificateUsage {
    fn extended_key_usages(self) -> Vec<rcgen::ExtendedKeyUsagePurpose> {
        match self {
            Self::Server => vec![rcgen::ExtendedKeyUsagePurpose::ServerAuth],
            Self::Client => vec![rcgen::ExtendedKeyUsagePurpose::ClientAuth],
            Self::Peer => vec![
                rcgen::ExtendedKeyUsagePurpose::ServerAuth,
                rcgen::ExtendedKeyUsagePurpose::ClientAuth,
            ],
        }
    }
}

/// Subject and SANs of a certificate to issue
#[derive(Debug, Clone, Copy)]
pub struct LeafRequest<'a> {
    /// Subject common name
    pub common_name: &'a str,
    /// Subject organization, used for group membership
    pub organization: Option<&'a str>,
    /// Extended key usage
    pub usage: CertificateUsage,
    /// DNS SANs
    pub dns_names: &'a [String],
    /// IP SANs
    pub ip_addresses: &'a [IpAddr],
}

impl<'a> LeafRequest<'a> {
    /// Request without SANs or organization
    pub fn new(common_name: &'a str, usage: CertificateUsage) -> Self {
        Self {
            common_name,
            organization: None,
            usage,
            dns_names: &[],
            ip_addresses: &[],
        }
    }

    /// Set the subject organization
    pub fn organization(mut self, organization: &'a str) -> Self {
        self.organization = Some(organization);
        self
    }

    /// Set DNS and IP SANs
    pub fn sans(mut self, dns_names: &'a [String], ip_addresses: &'a [IpAddr]) -> Self {
        self.dns_names = dns_names;
        self.ip_addresses = ip_addresses;
        self
    }

    fn subject_alt_names(&self) -> Result<Vec<SanType>> {
        let dns = self.dns_names.iter().map(|name| {
            Ia5String::try_from(name.clone())
                .map(SanType::DnsName)
                .map_err(|e| {
                    PkiError::CertificateGenerationFailed(format!(
                        "invalid DNS name '{}': {}",
                        name, e
                    ))
                })
        });
        let ips = self.ip_addresses.iter().map(|ip| Ok(SanType::IpAddress(*ip)));
        dns.chain(ips).collect()
    }
}

/// Cluster certificate authority
///
/// Keeps the key as PEM since `KeyPair` isn't Clone; it is reloaded for
/// each signing.
pub struct CertificateAuthority {
    ca_key_pem: String,
    ca_cert_pem: String,
}

impl CertificateAuthority {
    /// Create a new self-signed CA
    pub fn new(common_name: &str) -> Result<Self> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let (not_before, not_after) = compute_validity(CA_VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;

        let key_pair = KeyPair::generate().map_err(|e| {
            PkiError::KeyGenerationFailed(format!("failed to generate CA key: {}", e))
        })?;
        let ca_key_pem = key_pair.serialize_pem();

        let cert = params.self_signed(&key_pair).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to create CA cert: {}", e))
        })?;

        Ok(Self {
            ca_key_pem,
            ca_cert_pem: cert.pem(),
        })
    }

    /// Load a CA from its PEM certificate and key
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        KeyPair::from_pem(key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to parse CA key: {}", e)))?;
        parse_pem(cert_pem)?;

        Ok(Self {
            ca_key_pem: key_pem.to_string(),
            ca_cert_pem: cert_pem.to_string(),
        })
    }

    /// CA certificate in PEM format
    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// CA private key in PEM format
    pub fn ca_key_pem(&self) -> &str {
        &self.ca_key_pem
    }

    fn load_key_pair(&self) -> Result<KeyPair> {
        KeyPair::from_pem(&self.ca_key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to load CA key: {}", e)))
    }

    /// Generate a key pair and a certificate for it signed by this CA
    pub fn issue(&self, request: &LeafRequest<'_>) -> Result<CertificatePair> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(request.common_name.to_string()),
        );
        if let Some(organization) = request.organization {
            dn.push(
                DnType::OrganizationName,
                DnValue::Utf8String(organization.to_string()),
            );
        }
        params.distinguished_name = dn;

        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = request.usage.extended_key_usages();

        let (not_before, not_after) = compute_validity(CERT_VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;

        params.subject_alt_names = request.subject_alt_names()?;

        let key = KeyPair::generate().map_err(|e| {
            PkiError::KeyGenerationFailed(format!(
                "failed to generate key for {}: {}",
                request.common_name, e
            ))
        })?;

        let ca_key = self.load_key_pair()?;
        let issuer = Issuer::from_ca_cert_pem(&self.ca_cert_pem, &ca_key)
            .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {}", e)))?;

        let cert = params.signed_by(&key, &issuer).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!(
                "failed to sign {} cert: {}",
                request.common_name, e
            ))
        })?;

        Ok(CertificatePair {
            certificate: cert.pem(),
            private_key: key.serialize_pem(),
        })
    }
}

/// Subject, issuer, validity and SANs of a certificate
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,
    /// Subject common name
    pub common_name: String,
    /// Subject organizations
    pub organizations: Vec<String>,
    /// Issuer common name
    pub issuer_common_name: String,
    /// Whether basic constraints mark this as a CA
    pub is_ca: bool,
    /// DNS SANs
    pub dns_names: Vec<String>,
    /// IP SANs
    pub ip_addresses: Vec<IpAddr>,
}

impl CertificateInfo {
    /// Parse certificate info from a PEM-encoded certificate
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        Self::from_der(&der)
    }

    /// Parse certificate info from a DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

        let first_cn = |name: &X509Name<'_>| {
            name.iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .unwrap_or("")
                .to_string()
        };

        let organizations = cert
            .subject()
            .iter_organization()
            .filter_map(|o| o.as_str().ok())
            .map(str::to_string)
            .collect();

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        let san = cert
            .subject_alternative_name()
            .map_err(|e| PkiError::ParseError(format!("invalid SAN extension: {}", e)))?;
        if let Some(san) = san {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            ip_addresses.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(Self {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            common_name: first_cn(cert.subject()),
            organizations,
            issuer_common_name: first_cn(cert.issuer()),
            is_ca: cert.is_ca(),
            dns_names,
            ip_addresses,
        })
    }

    /// Total lifetime of the certificate in seconds
    pub fn lifetime_secs(&self) -> i64 {
        self.not_after - self.not_before
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

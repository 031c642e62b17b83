use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::rustls::crypto::{aws_lc_rs as provider, CryptoProvider, SupportedKxGroup};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::server::danger::ClientCertVerifier;
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::version::{TLS12, TLS13};
use tokio_rustls::rustls::{RootCertStore, ServerConfig, SupportedCipherSuite};

/// The TLS block of a server's configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// Perform the TLS handshake immediately on accept.
    pub always_on: bool,
    /// Advertise and honor STARTTLS.
    pub start_tls_on: bool,
    pub private_key_file: Option<PathBuf>,
    pub public_key_file: Option<PathBuf>,
    /// Minimum, and optionally maximum, protocol version by name
    /// ("tls1.2", "tls1.3").
    pub protocols: Vec<String>,
    /// Cipher suite names; empty means the provider defaults.
    pub ciphers: Vec<String>,
    /// Key exchange group names; empty means the provider defaults.
    pub curves: Vec<String>,
    pub client_auth_type: ClientAuthMode,
    /// Accepted for config compatibility; rustls always applies the
    /// server's cipher suite ordering.
    pub prefer_server_ciphers: bool,
    pub root_cas: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientAuthMode {
    #[default]
    None,
    Request,
    RequireAny,
    VerifyIfGiven,
    RequireAndVerify,
}

pub fn make_server_config(hostname: &str, tls: &TlsSettings) -> anyhow::Result<Arc<ServerConfig>> {
    let mut certificates = vec![];
    let private_key = match &tls.private_key_file {
        Some(path) => load_private_key(path)
            .with_context(|| format!("loading private key from {}", path.display()))?,
        None => {
            let self_signed = rcgen::generate_simple_self_signed(vec![hostname.to_string()])?;
            certificates.push(self_signed.cert.der().clone());
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                self_signed.key_pair.serialize_der(),
            ))
        }
    };

    if let Some(cert_file) = &tls.public_key_file {
        certificates = load_certs(cert_file)
            .with_context(|| format!("loading certificates from {}", cert_file.display()))?;
    }

    let provider = Arc::new(CryptoProvider {
        cipher_suites: select_cipher_suites(&tls.ciphers),
        kx_groups: select_kx_groups(&tls.curves),
        ..provider::default_provider()
    });

    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&select_protocol_versions(&tls.protocols))
        .context("inconsistent cipher-suite/protocol-version selection")?;

    let builder = match make_client_verifier(tls, provider)? {
        Some(verifier) => builder.with_client_cert_verifier(verifier),
        None => builder.with_no_client_auth(),
    };

    let config = builder
        .with_single_cert(certificates, private_key)
        .context("building TLS server config")?;

    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let data = std::fs::read(path)?;
    let mut reader = BufReader::new(data.as_slice());
    Ok(rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .context("reading PEM encoded certificates")?)
}

fn load_private_key(path: &Path) -> anyhow::Result<PrivateKeyDer<'static>> {
    let data = std::fs::read(path)?;
    let mut reader = BufReader::new(data.as_slice());
    rustls_pemfile::private_key(&mut reader)
        .context("parsing private key PEM")?
        .ok_or_else(|| anyhow::anyhow!("no keys found in key data (encrypted keys not supported)"))
}

fn select_protocol_versions(
    protocols: &[String],
) -> Vec<&'static tokio_rustls::rustls::SupportedProtocolVersion> {
    static ORDERED: [&tokio_rustls::rustls::SupportedProtocolVersion; 2] = [&TLS12, &TLS13];

    fn index_of(name: &str) -> Option<usize> {
        match name.to_ascii_lowercase().as_str() {
            "tls1.2" | "tlsv1.2" => Some(0),
            "tls1.3" | "tlsv1.3" => Some(1),
            _ => None,
        }
    }

    if protocols.is_empty() {
        return ORDERED.to_vec();
    }
    let min = index_of(&protocols[0]).unwrap_or_else(|| {
        tracing::warn!("unsupported minimum TLS protocol {:?}", protocols[0]);
        0
    });
    let max = protocols
        .get(1)
        .and_then(|name| index_of(name))
        .unwrap_or(ORDERED.len() - 1);
    if min > max {
        tracing::warn!("TLS protocol range {protocols:?} is inverted, using the full range");
        return ORDERED.to_vec();
    }
    ORDERED[min..=max].to_vec()
}

fn select_cipher_suites(names: &[String]) -> Vec<SupportedCipherSuite> {
    if names.is_empty() {
        return provider::DEFAULT_CIPHER_SUITES.to_vec();
    }
    let selected: Vec<SupportedCipherSuite> = provider::ALL_CIPHER_SUITES
        .iter()
        .filter(|suite| {
            let label = format!("{:?}", suite.suite());
            names.iter().any(|name| name.eq_ignore_ascii_case(&label))
        })
        .copied()
        .collect();
    if selected.is_empty() {
        tracing::warn!("no configured cipher suite matched {names:?}, using provider defaults");
        return provider::DEFAULT_CIPHER_SUITES.to_vec();
    }
    selected
}

fn select_kx_groups(names: &[String]) -> Vec<&'static dyn SupportedKxGroup> {
    if names.is_empty() {
        return provider::ALL_KX_GROUPS.to_vec();
    }
    let selected: Vec<&'static dyn SupportedKxGroup> = provider::ALL_KX_GROUPS
        .iter()
        .filter(|group| {
            let label = format!("{:?}", group.name());
            names.iter().any(|name| name.eq_ignore_ascii_case(&label))
        })
        .copied()
        .collect();
    if selected.is_empty() {
        tracing::warn!("no configured curve matched {names:?}, using provider defaults");
        return provider::ALL_KX_GROUPS.to_vec();
    }
    selected
}

fn make_client_verifier(
    tls: &TlsSettings,
    provider: Arc<CryptoProvider>,
) -> anyhow::Result<Option<Arc<dyn ClientCertVerifier>>> {
    if tls.client_auth_type == ClientAuthMode::None {
        return Ok(None);
    }

    let root_path = tls.root_cas.as_ref().with_context(|| {
        format!(
            "client_auth_type {:?} requires root_cas to be configured",
            tls.client_auth_type
        )
    })?;
    let mut roots = RootCertStore::empty();
    for cert in load_certs(root_path)
        .with_context(|| format!("loading root CAs from {}", root_path.display()))?
    {
        roots.add(cert)?;
    }

    let builder = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider);
    let verifier = match tls.client_auth_type {
        // rustls cannot require a certificate without also verifying it,
        // so require-any gets the full verifier too
        ClientAuthMode::RequireAny | ClientAuthMode::RequireAndVerify => builder.build()?,
        ClientAuthMode::Request | ClientAuthMode::VerifyIfGiven => {
            builder.allow_unauthenticated().build()?
        }
        ClientAuthMode::None => unreachable!(),
    };
    Ok(Some(verifier))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn self_signed_when_no_key_configured() {
        let config = make_server_config("mail.example.com", &TlsSettings::default()).unwrap();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn loads_pem_files() {
        let self_signed =
            rcgen::generate_simple_self_signed(vec!["mail.example.com".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, self_signed.cert.pem()).unwrap();
        std::fs::write(&key_path, self_signed.key_pair.serialize_pem()).unwrap();

        let tls = TlsSettings {
            private_key_file: Some(key_path),
            public_key_file: Some(cert_path),
            protocols: vec!["tls1.2".to_string(), "tls1.3".to_string()],
            ..TlsSettings::default()
        };
        make_server_config("mail.example.com", &tls).unwrap();
    }

    #[test]
    fn missing_key_file_is_an_error() {
        let tls = TlsSettings {
            private_key_file: Some("/nonexistent/key.pem".into()),
            ..TlsSettings::default()
        };
        assert!(make_server_config("mail.example.com", &tls).is_err());
    }

    #[test]
    fn client_auth_requires_roots() {
        let tls = TlsSettings {
            client_auth_type: ClientAuthMode::RequireAndVerify,
            ..TlsSettings::default()
        };
        let provider = Arc::new(provider::default_provider());
        assert!(make_client_verifier(&tls, provider).is_err());
    }

    #[test]
    fn protocol_range() {
        assert_eq!(select_protocol_versions(&[]).len(), 2);
        assert_eq!(
            select_protocol_versions(&["tls1.3".to_string()]).len(),
            1
        );
        assert_eq!(
            select_protocol_versions(&["tls1.2".to_string(), "tls1.2".to_string()]).len(),
            1
        );
    }
}

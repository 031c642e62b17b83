use crate::auth::AuthSettings;
use anyhow::Context;
use postino_server_common::tls_helpers::TlsSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(rename = "server")]
    pub servers: Vec<ServerConfig>,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Configuration for a single SMTP listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub is_enabled: bool,
    /// Address to listen on, eg: "0.0.0.0:25".
    pub listen_interface: String,
    /// Hostname advertised in the greeting and EHLO response, and used
    /// as the TLS server name.
    pub hostname: String,
    /// Upper bound on concurrently connected clients; also sizes the
    /// session and envelope pools.
    pub max_clients: usize,
    /// Maximum acceptable DATA payload in bytes.
    pub max_size: usize,
    /// Per-read/per-flush deadline in seconds.
    pub timeout: u64,
    pub tls: TlsSettings,
    /// Honor the XCLIENT extension from trusted proxies.
    pub xclient_on: bool,
    pub auth: AuthSettings,
    /// Hosts we accept mail for. A single "." accepts everything;
    /// entries may be host names, `*` globs, or `[ip]` literals.
    pub allowed_hosts: Vec<String>,
    /// Optional per-server log file name; empty means the process-wide
    /// diagnostic log.
    pub log_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            is_enabled: true,
            listen_interface: "127.0.0.1:2525".to_string(),
            hostname: "mail.example.com".to_string(),
            max_clients: 100,
            max_size: 10 * 1024 * 1024,
            timeout: 30,
            tls: TlsSettings::default(),
            xclient_on: false,
            auth: AuthSettings::default(),
            allowed_hosts: vec![],
            log_file: String::new(),
        }
    }
}

//! Configuration loading
//!
//! Sources, highest priority first:
//! 1. Environment variables (`PROVISIONER_*` prefix, `__` separates sections)
//! 2. The TOML file passed to [`Config::load`]
//! 3. Built-in defaults
//!
//! `PROVISIONER_PLATFORM__PASSWORD` maps to `platform.password`,
//! `PROVISIONER_DIRECTORY__BIND_PASSWORD` to `directory.bind_password`.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use url::{Host, Url};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::directory::DirectoryQuery;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Figment(Box::new(e))
    }
}

/// Process-wide configuration, loaded once at startup and passed by reference
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub platform: PlatformConfig,
    pub directory: DirectoryConfig,
    /// Directory group identity to platform role name
    #[serde(default)]
    pub role_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub oidc: OidcConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Platform management API connection and service identity
#[derive(Clone, Deserialize)]
pub struct PlatformConfig {
    /// Base endpoint, e.g. `https://platform-api.example.org/api`
    pub endpoint: String,
    #[serde(default)]
    pub tls: TlsProfile,
    /// Organization whose roles and members are managed
    pub org: String,
    /// User registry the subjects are created in
    pub registry: String,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
    pub realm: String,
}

impl fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("endpoint", &self.endpoint)
            .field("tls", &self.tls)
            .field("org", &self.org)
            .field("registry", &self.registry)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("realm", &self.realm)
            .finish()
    }
}

/// Transport-security profile for outbound platform calls
#[derive(Debug, Clone, Deserialize)]
pub struct TlsProfile {
    #[serde(default = "default_tls_profile_name")]
    pub name: String,
    /// Extra CA bundle (PEM) trusted in addition to the system roots
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    /// Client certificate and key (PEM) for mutual TLS
    #[serde(default)]
    pub client_identity: Option<PathBuf>,
}

impl Default for TlsProfile {
    fn default() -> Self {
        Self {
            name: default_tls_profile_name(),
            ca_cert: None,
            client_identity: None,
        }
    }
}

fn default_tls_profile_name() -> String {
    "default".to_string()
}

/// Directory server connection and group search parameters
#[derive(Clone, Deserialize)]
pub struct DirectoryConfig {
    pub server: String,
    #[serde(default = "default_directory_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub use_ssl: bool,
    #[serde(default)]
    pub use_starttls: bool,
    pub bind_dn: String,
    pub bind_password: String,
    /// Search base for the group entries
    pub target_dn: String,
    #[serde(default = "default_attribute_name")]
    pub attribute_name: String,
    pub filter: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Falls back to `platform.tls` when absent
    #[serde(default)]
    pub tls: Option<TlsProfile>,
}

impl DirectoryConfig {
    pub fn query(&self) -> DirectoryQuery {
        DirectoryQuery {
            target_dn: self.target_dn.clone(),
            filter: self.filter.clone(),
            attribute_name: self.attribute_name.clone(),
        }
    }

    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.server, self.port)
    }
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"<redacted>")
            .field("target_dn", &self.target_dn)
            .field("attribute_name", &self.attribute_name)
            .field("filter", &self.filter)
            .field("timeout_secs", &self.timeout_secs)
            .field("tls", &self.tls)
            .finish()
    }
}

fn default_directory_port() -> u16 {
    636
}

fn default_true() -> bool {
    true
}

fn default_attribute_name() -> String {
    "member".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Optional id token signature verification
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OidcConfig {
    /// When set, id tokens must verify against this key set
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

/// Inbound listener and upstream token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_token_path")]
    pub token_path: String,
    #[serde(default)]
    pub upstream_token_url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            token_path: default_token_path(),
            upstream_token_url: String::new(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_token_path() -> String {
    "/oauth2/token".to_string()
}

impl Config {
    /// Load and validate configuration from `path` plus the environment
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Build the provider chain without extracting
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PROVISIONER_").split("__"))
    }

    /// TLS profile for the directory connection
    pub fn directory_tls(&self) -> &TlsProfile {
        self.directory.tls.as_ref().unwrap_or(&self.platform.tls)
    }

    /// Check required fields and URL shapes
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_https_url("platform.endpoint", &self.platform.endpoint)?;

        let required = [
            ("platform.org", &self.platform.org),
            ("platform.registry", &self.platform.registry),
            ("platform.username", &self.platform.username),
            ("platform.client_id", &self.platform.client_id),
            ("directory.server", &self.directory.server),
            ("directory.target_dn", &self.directory.target_dn),
            ("directory.attribute_name", &self.directory.attribute_name),
            ("directory.filter", &self.directory.filter),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }

        for (group, role) in &self.role_mapping {
            if role.trim().is_empty() {
                return Err(ConfigError::invalid(
                    &format!("role_mapping.{}", group),
                    "role name must not be empty",
                ));
            }
        }

        if let Some(jwks_uri) = &self.oidc.jwks_uri {
            validate_https_url("oidc.jwks_uri", jwks_uri)?;
        }

        if !self.proxy.upstream_token_url.is_empty() {
            validate_https_url("proxy.upstream_token_url", &self.proxy.upstream_token_url)?;
        }

        if !self.proxy.token_path.starts_with('/') {
            return Err(ConfigError::invalid("proxy.token_path", "must start with '/'"));
        }

        Ok(())
    }
}

/// Accept https URLs, and plain http only for loopback hosts
fn validate_https_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::invalid(field, e.to_string()))?;

    let is_loopback = match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    };
    if url.scheme() != "https" && !is_loopback {
        return Err(ConfigError::invalid(field, "must use https"));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(ConfigError::invalid(field, "must not have a query or fragment"));
    }

    Ok(())
}

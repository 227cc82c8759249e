use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const PROXY_SCHEMES: [&str; 5] = ["http", "https", "socks4", "socks5", "socks5h"];

/// Environment variable consulted for the upstream key when none is configured.
pub const DEFAULT_API_KEY_ENV: &str = "GCOMPAT_UPSTREAM_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Final, merged configuration used by the running process.
///
/// Merge order: CLI > ENV > config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
    pub upstream: UpstreamConfig,
    /// Keys accepted on the provider alias routes. Empty means no key check.
    pub api_keys: Vec<String>,
}

/// Control-plane upstream settings. An empty `url` disables the feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_cache_ttl_secs: Option<u64>,
}

/// The subset of [`UpstreamConfig`] that determines which credential gets resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialFingerprint {
    pub api_key: String,
    pub api_key_env: String,
    pub api_key_file: Option<PathBuf>,
}

impl UpstreamConfig {
    pub fn trimmed_url(&self) -> &str {
        self.url.trim()
    }

    pub fn api_key_env_name(&self) -> &str {
        self.api_key_env
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_API_KEY_ENV)
    }

    /// `None` leaves the TTL to the secret source default.
    pub fn secret_cache_ttl(&self) -> Option<Duration> {
        self.secret_cache_ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn credential_fingerprint(&self) -> CredentialFingerprint {
        CredentialFingerprint {
            api_key: self.api_key.trim().to_string(),
            api_key_env: self.api_key_env_name().to_string(),
            api_key_file: self.api_key_file.clone(),
        }
    }
}

/// Optional layer used for merging gateway config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GatewayConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub proxy: Option<String>,
    pub upstream_url: Option<String>,
    pub upstream_api_key: Option<String>,
    pub upstream_api_key_env: Option<String>,
    pub upstream_api_key_file: Option<PathBuf>,
    pub secret_cache_ttl_secs: Option<u64>,
    pub api_keys: Option<Vec<String>>,
}

impl GatewayConfigPatch {
    pub fn overlay(&mut self, other: GatewayConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.upstream_url.is_some() {
            self.upstream_url = other.upstream_url;
        }
        if other.upstream_api_key.is_some() {
            self.upstream_api_key = other.upstream_api_key;
        }
        if other.upstream_api_key_env.is_some() {
            self.upstream_api_key_env = other.upstream_api_key_env;
        }
        if other.upstream_api_key_file.is_some() {
            self.upstream_api_key_file = other.upstream_api_key_file;
        }
        if other.secret_cache_ttl_secs.is_some() {
            self.secret_cache_ttl_secs = other.secret_cache_ttl_secs;
        }
        if other.api_keys.is_some() {
            self.api_keys = other.api_keys;
        }
    }

    pub fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        let host = self.host.unwrap_or_else(|| "127.0.0.1".to_string());
        if host.trim().is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        let proxy = self
            .proxy
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if let Some(proxy) = proxy.as_deref() {
            validate_proxy(proxy)?;
        }
        Ok(GatewayConfig {
            host,
            port: self.port.unwrap_or(8317),
            proxy,
            upstream: UpstreamConfig {
                url: self.upstream_url.unwrap_or_default(),
                api_key: self.upstream_api_key.unwrap_or_default(),
                api_key_env: self.upstream_api_key_env,
                api_key_file: self.upstream_api_key_file,
                secret_cache_ttl_secs: self.secret_cache_ttl_secs,
            },
            api_keys: self
                .api_keys
                .unwrap_or_default()
                .into_iter()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .collect(),
        })
    }
}

/// Egress proxies must be absolute URLs with a host and a scheme the upstream
/// client can dial.
fn validate_proxy(raw: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        field: "proxy",
        value: raw.to_string(),
    };
    let url = url::Url::parse(raw).map_err(|_| invalid())?;
    if !PROXY_SCHEMES.contains(&url.scheme()) || url.host_str().is_none_or(str::is_empty) {
        return Err(invalid());
    }
    Ok(())
}

impl From<GatewayConfig> for GatewayConfigPatch {
    fn from(value: GatewayConfig) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            proxy: value.proxy,
            upstream_url: Some(value.upstream.url),
            upstream_api_key: Some(value.upstream.api_key),
            upstream_api_key_env: value.upstream.api_key_env,
            upstream_api_key_file: value.upstream.api_key_file,
            secret_cache_ttl_secs: value.upstream.secret_cache_ttl_secs,
            api_keys: Some(value.api_keys),
        }
    }
}

use std::path::PathBuf;

use clap::Parser;
use gcompat_common::GatewayConfigPatch;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "gcompat",
    version,
    about = "Compatibility layer for a multi-provider LLM gateway"
)]
pub struct CliArgs {
    /// JSON config file. Re-read on SIGHUP.
    #[arg(long, env = "GCOMPAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind host.
    #[arg(long, env = "GCOMPAT_HOST")]
    pub host: Option<String>,

    /// Bind port.
    #[arg(long, env = "GCOMPAT_PORT")]
    pub port: Option<u16>,

    /// Optional outbound proxy for upstream requests.
    #[arg(long, env = "GCOMPAT_PROXY")]
    pub proxy: Option<String>,

    /// Control-plane base URL. Empty disables control-plane routing.
    #[arg(long, env = "GCOMPAT_UPSTREAM_URL")]
    pub upstream_url: Option<String>,

    /// Control-plane API key. Takes precedence over the env var and file sources.
    #[arg(long, env = "GCOMPAT_UPSTREAM_KEY")]
    pub upstream_api_key: Option<String>,

    /// Environment variable holding the control-plane key.
    #[arg(long, env = "GCOMPAT_UPSTREAM_KEY_ENV")]
    pub upstream_api_key_env: Option<String>,

    /// File holding the control-plane key.
    #[arg(long, env = "GCOMPAT_UPSTREAM_KEY_FILE")]
    pub upstream_api_key_file: Option<PathBuf>,

    #[arg(long, env = "GCOMPAT_SECRET_CACHE_TTL_SECS")]
    pub secret_cache_ttl_secs: Option<u64>,

    /// Comma-separated client keys for the provider alias routes.
    #[arg(long, env = "GCOMPAT_API_KEYS", value_delimiter = ',')]
    pub api_keys: Option<Vec<String>>,
}

impl CliArgs {
    /// CLI and ENV layer. clap already applies CLI > ENV per field.
    pub fn to_patch(&self) -> GatewayConfigPatch {
        GatewayConfigPatch {
            host: sanitize(self.host.clone()),
            port: self.port,
            proxy: sanitize(self.proxy.clone()),
            upstream_url: sanitize(self.upstream_url.clone()),
            upstream_api_key: sanitize(self.upstream_api_key.clone()),
            upstream_api_key_env: sanitize(self.upstream_api_key_env.clone()),
            upstream_api_key_file: self.upstream_api_key_file.clone(),
            secret_cache_ttl_secs: self.secret_cache_ttl_secs,
            api_keys: self.api_keys.clone(),
        }
    }
}

fn sanitize(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

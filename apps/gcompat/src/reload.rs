use std::sync::{Arc, Mutex, PoisonError};

use gcompat_common::GatewayConfig;
use gcompat_module::{ModuleSet, StaticKeyAuth};
use gcompat_registry::ModelRegistry;
use tracing::{error, info, warn};

use crate::cli::CliArgs;
use crate::config;

/// Re-reads configuration and pushes it to everything that follows reloads.
pub struct Reloader {
    args: CliArgs,
    current: Mutex<GatewayConfig>,
    registry: Arc<ModelRegistry>,
    auth: Arc<StaticKeyAuth>,
    modules: ModuleSet,
}

impl Reloader {
    pub fn new(
        args: CliArgs,
        current: GatewayConfig,
        registry: Arc<ModelRegistry>,
        auth: Arc<StaticKeyAuth>,
        modules: ModuleSet,
    ) -> Self {
        Self {
            args,
            current: Mutex::new(current),
            registry,
            auth,
            modules,
        }
    }

    /// A config that fails to load leaves the running state untouched.
    pub async fn reload(&self) {
        let loaded = match config::load(&self.args).await {
            Ok(loaded) => loaded,
            Err(err) => {
                error!(event = "config_reload_failed", error = %format!("{err:#}"));
                return;
            }
        };
        let next = loaded.gateway;

        {
            let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            if current.host != next.host || current.port != next.port {
                warn!(
                    event = "bind_change_ignored",
                    host = %next.host,
                    port = next.port,
                    "bind address changed, restart required to apply"
                );
            }
        }

        self.auth.replace_keys(next.api_keys.clone());
        let seeded = config::seed_registry(&self.registry, &loaded.models);
        self.modules.on_config_updated(&next);
        info!(
            event = "config_reloaded",
            models = seeded,
            api_keys = next.api_keys.len()
        );

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

use std::sync::Arc;

use axum::Router;
use gcompat_common::GatewayConfig;
use gcompat_proxy::ProxyError;
use tracing::{error, info};

use crate::handlers::BaseHandlers;

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("module {0} is already registered")]
    AlreadyRegistered(&'static str),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// An optional feature that contributes routes to the host router.
///
/// `register` is called once at startup, after the core routes exist.
/// `on_config_updated` is called on every configuration reload.
pub trait RouteModule: Send + Sync {
    fn name(&self) -> &'static str;

    fn register(
        &self,
        router: &mut Router,
        handlers: &BaseHandlers,
        config: &GatewayConfig,
    ) -> Result<(), ModuleError>;

    fn on_config_updated(&self, config: &GatewayConfig) -> Result<(), ModuleError>;
}

/// Ordered set of modules. A failing module is logged and skipped.
#[derive(Default, Clone)]
pub struct ModuleSet {
    modules: Vec<Arc<dyn RouteModule>>,
}

impl ModuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, module: Arc<dyn RouteModule>) -> Self {
        self.push(module);
        self
    }

    pub fn push(&mut self, module: Arc<dyn RouteModule>) {
        self.modules.push(module);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|module| module.name()).collect()
    }

    /// Registers every module in order and returns how many succeeded.
    pub fn register_all(
        &self,
        router: &mut Router,
        handlers: &BaseHandlers,
        config: &GatewayConfig,
    ) -> usize {
        let mut registered = 0;
        for module in &self.modules {
            match module.register(router, handlers, config) {
                Ok(()) => {
                    registered += 1;
                    info!(event = "module_registered", module = module.name());
                }
                Err(err) => {
                    error!(
                        event = "module_register_failed",
                        module = module.name(),
                        error = %err
                    );
                }
            }
        }
        registered
    }

    pub fn on_config_updated(&self, config: &GatewayConfig) {
        for module in &self.modules {
            if let Err(err) = module.on_config_updated(config) {
                error!(
                    event = "module_config_update_failed",
                    module = module.name(),
                    error = %err
                );
            }
        }
    }
}

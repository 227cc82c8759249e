//! Control-plane routing: forwards management API calls to the vendor
//! control plane and exposes `/api/provider/{provider}/...` aliases over the
//! host's own provider handlers.

mod routes;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::Router;
use gcompat_common::{CredentialFingerprint, GatewayConfig};
use gcompat_proxy::{DEFAULT_SECRET_TTL, MultiSourceSecret, UpstreamClientConfig, UpstreamProxy};
use gcompat_registry::ModelCatalog;
use tracing::{debug, info, warn};

use crate::auth::{AuthProvider, NoopAuth};
use crate::handlers::BaseHandlers;
use crate::module::{ModuleError, RouteModule};

pub use routes::MANAGEMENT_GROUPS;

pub const MODULE_NAME: &str = "control-plane-routing";

enum ModuleState {
    Unregistered,
    Registering,
    Enabled(EnabledState),
    Disabled,
}

struct EnabledState {
    upstream_url: String,
    secret: Arc<MultiSourceSecret>,
    /// Credential settings the secret source was built from.
    fingerprint: CredentialFingerprint,
    proxy: Arc<UpstreamProxy>,
}

pub struct ControlPlaneModule {
    catalog: Arc<dyn ModelCatalog>,
    auth: Option<Arc<dyn AuthProvider>>,
    state: Mutex<ModuleState>,
}

impl ControlPlaneModule {
    /// `auth` guards the provider alias routes. Without one every request is
    /// let through.
    pub fn new(catalog: Arc<dyn ModelCatalog>, auth: Option<Arc<dyn AuthProvider>>) -> Self {
        Self {
            catalog,
            auth,
            state: Mutex::new(ModuleState::Unregistered),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(*self.lock_state(), ModuleState::Enabled(_))
    }

    /// Secret source of the running module, if enabled.
    pub fn secret(&self) -> Option<Arc<MultiSourceSecret>> {
        match &*self.lock_state() {
            ModuleState::Enabled(enabled) => Some(enabled.secret.clone()),
            _ => None,
        }
    }

    pub fn proxy(&self) -> Option<Arc<UpstreamProxy>> {
        match &*self.lock_state() {
            ModuleState::Enabled(enabled) => Some(enabled.proxy.clone()),
            _ => None,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ModuleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enable(
        &self,
        router: &mut Router,
        handlers: &BaseHandlers,
        config: &GatewayConfig,
    ) -> Result<Option<EnabledState>, ModuleError> {
        let upstream_url = config.upstream.trimmed_url();
        if upstream_url.is_empty() {
            debug!(
                event = "module_disabled",
                module = MODULE_NAME,
                "upstream url not configured"
            );
            return Ok(None);
        }

        let secret = Arc::new(MultiSourceSecret::new(
            config.upstream.api_key.trim(),
            config.upstream.api_key_env_name(),
            config.upstream.api_key_file.clone(),
            config
                .upstream
                .secret_cache_ttl()
                .unwrap_or(DEFAULT_SECRET_TTL),
        ));
        let client_config = UpstreamClientConfig {
            proxy: config.proxy.clone(),
            ..UpstreamClientConfig::default()
        };
        let proxy = Arc::new(UpstreamProxy::with_client_config(
            upstream_url,
            secret.clone(),
            &client_config,
        )?);

        let auth = match &self.auth {
            Some(auth) => auth.clone(),
            None => {
                warn!(
                    event = "alias_auth_missing",
                    module = MODULE_NAME,
                    "no auth provider supplied, provider alias routes accept all requests"
                );
                Arc::new(NoopAuth) as Arc<dyn AuthProvider>
            }
        };

        let routes = routes::management_router(proxy.clone()).merge(routes::alias_router(
            routes::AliasState {
                handlers: handlers.clone(),
                catalog: self.catalog.clone(),
            },
            auth,
        ));
        *router = std::mem::take(router).merge(routes);

        info!(
            event = "module_enabled",
            module = MODULE_NAME,
            upstream = %upstream_url
        );
        Ok(Some(EnabledState {
            upstream_url: upstream_url.to_string(),
            secret,
            fingerprint: config.upstream.credential_fingerprint(),
            proxy,
        }))
    }
}

impl RouteModule for ControlPlaneModule {
    fn name(&self) -> &'static str {
        MODULE_NAME
    }

    fn register(
        &self,
        router: &mut Router,
        handlers: &BaseHandlers,
        config: &GatewayConfig,
    ) -> Result<(), ModuleError> {
        {
            let mut state = self.lock_state();
            if !matches!(*state, ModuleState::Unregistered) {
                return Err(ModuleError::AlreadyRegistered(MODULE_NAME));
            }
            *state = ModuleState::Registering;
        }

        let outcome = self.enable(router, handlers, config);
        let mut state = self.lock_state();
        match outcome {
            Ok(Some(enabled)) => {
                *state = ModuleState::Enabled(enabled);
                Ok(())
            }
            Ok(None) => {
                *state = ModuleState::Disabled;
                Ok(())
            }
            Err(err) => {
                *state = ModuleState::Disabled;
                Err(err)
            }
        }
    }

    fn on_config_updated(&self, config: &GatewayConfig) -> Result<(), ModuleError> {
        let mut state = self.lock_state();
        let ModuleState::Enabled(enabled) = &mut *state else {
            debug!(
                event = "module_config_update_skipped",
                module = MODULE_NAME,
                "module not enabled"
            );
            return Ok(());
        };

        let upstream_url = config.upstream.trimmed_url();
        if upstream_url.is_empty() {
            warn!(
                event = "module_restart_required",
                module = MODULE_NAME,
                "upstream url removed from config, restart required to disable"
            );
            return Ok(());
        }
        if upstream_url != enabled.upstream_url {
            warn!(
                event = "module_restart_required",
                module = MODULE_NAME,
                current = %enabled.upstream_url,
                configured = %upstream_url,
                "upstream url changed, restart required to apply"
            );
        }

        let fingerprint = config.upstream.credential_fingerprint();
        if fingerprint.api_key_env != enabled.fingerprint.api_key_env
            || fingerprint.api_key_file != enabled.fingerprint.api_key_file
        {
            enabled.secret.set_sources(
                fingerprint.api_key_env.clone(),
                fingerprint.api_key_file.clone(),
            );
            info!(
                event = "upstream_secret_sources_updated",
                module = MODULE_NAME,
                env = %fingerprint.api_key_env,
                file = ?fingerprint.api_key_file
            );
        }
        if fingerprint.api_key != enabled.fingerprint.api_key {
            enabled.secret.set_explicit_value(fingerprint.api_key.clone());
        }
        // The file or env value may have rotated without any config change.
        enabled.secret.invalidate_cache();
        enabled.fingerprint = fingerprint;
        debug!(
            event = "upstream_secret_invalidated",
            module = MODULE_NAME
        );
        Ok(())
    }
}

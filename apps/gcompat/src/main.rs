mod cli;
mod config;
mod handlers;
mod reload;

use std::sync::Arc;

use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use clap::Parser;
use gcompat_module::{AuthProvider, ControlPlaneModule, ModuleSet, StaticKeyAuth};
use gcompat_registry::ModelRegistry;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::cli::CliArgs;
use crate::handlers::LocalHandlers;
use crate::reload::Reloader;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        error!(event = "gcompat_failed", error = %format!("{err:#}"));
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let loaded = config::load(&args).await?;
    let gateway = loaded.gateway;
    info!(
        host = %gateway.host,
        port = gateway.port,
        upstream = %gateway.upstream.trimmed_url(),
        proxy = %gateway.proxy.as_deref().unwrap_or(""),
        api_keys = gateway.api_keys.len(),
        "config loaded"
    );

    let registry = Arc::new(ModelRegistry::new());
    let seeded = config::seed_registry(&registry, &loaded.models);
    info!(models = seeded, providers = registry.providers().len(), "registry seeded");

    let auth = Arc::new(StaticKeyAuth::new(gateway.api_keys.clone()));
    if auth.is_open() {
        info!("no client api keys configured, provider alias routes are open");
    }
    let alias_auth: Arc<dyn AuthProvider> = auth.clone();

    let modules = ModuleSet::new().with(Arc::new(ControlPlaneModule::new(
        registry.clone(),
        Some(alias_auth),
    )));
    let handlers = LocalHandlers::new(registry.clone()).into_base();

    let mut app = Router::new().route("/healthz", get(healthz).with_state(modules.clone()));
    let registered = modules.register_all(&mut app, &handlers, &gateway);
    info!(modules = registered, "modules registered");

    let bind = format!("{}:{}", gateway.host, gateway.port);
    let reloader = Arc::new(Reloader::new(args, gateway, registry, auth, modules));
    spawn_reload_listener(reloader);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(addr = %bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    info!("server stopped");
    Ok(())
}

async fn healthz(State(modules): State<ModuleSet>) -> Json<Value> {
    Json(json!({ "status": "ok", "modules": modules.names() }))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gcompat=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(unix)]
fn spawn_reload_listener(reloader: Arc<Reloader>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(err) => {
            error!(event = "reload_listener_failed", error = %err);
            return;
        }
    };
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            reloader.reload().await;
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_reloader: Arc<Reloader>) {
    info!("config reload on SIGHUP is not available on this platform");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(event = "shutdown_listener_failed", error = %err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                error!(event = "shutdown_listener_failed", error = %err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

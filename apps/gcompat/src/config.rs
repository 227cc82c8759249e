use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use gcompat_common::{GatewayConfig, GatewayConfigPatch};
use gcompat_registry::{ModelInfo, ModelRegistry};
use serde::Deserialize;

use crate::cli::CliArgs;

const CONFIG_CLIENT_PREFIX: &str = "config:";

/// On-disk config: the gateway settings plus the models the host seeds into
/// the registry.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(flatten)]
    pub gateway: GatewayConfigPatch,
    #[serde(default)]
    pub models: Vec<SeededModel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeededModel {
    pub provider: String,
    #[serde(flatten)]
    pub info: ModelInfo,
}

pub struct LoadedConfig {
    pub gateway: GatewayConfig,
    pub models: Vec<SeededModel>,
}

/// Merges CLI > ENV > config file.
pub async fn load(args: &CliArgs) -> anyhow::Result<LoadedConfig> {
    let file = match args.config.as_deref() {
        Some(path) => read_config_file(path).await?,
        None => ConfigFile::default(),
    };
    let mut merged = file.gateway;
    merged.overlay(args.to_patch());
    let gateway = merged
        .into_config()
        .context("finalize merged gateway config")?;
    Ok(LoadedConfig {
        gateway,
        models: file.models,
    })
}

async fn read_config_file(path: &Path) -> anyhow::Result<ConfigFile> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read config file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse config file {}", path.display()))
}

/// Publishes the seeded models, one registry client per provider, and drops
/// providers that are no longer listed. Returns the number of models seeded.
pub fn seed_registry(registry: &ModelRegistry, models: &[SeededModel]) -> usize {
    let mut by_provider: BTreeMap<&str, Vec<ModelInfo>> = BTreeMap::new();
    for model in models {
        by_provider
            .entry(model.provider.trim())
            .or_default()
            .push(model.info.clone());
    }

    for provider in registry.providers() {
        if !by_provider.contains_key(provider.as_str()) {
            registry.unregister_client(&format!("{CONFIG_CLIENT_PREFIX}{provider}"));
        }
    }
    for (provider, infos) in by_provider {
        registry.register_client(&format!("{CONFIG_CLIENT_PREFIX}{provider}"), provider, infos);
    }
    models.len()
}

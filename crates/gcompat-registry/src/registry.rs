use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::model::ModelInfo;

/// Read-only model lookup used by the endpoint resolver.
pub trait ModelCatalog: Send + Sync {
    fn model_info(&self, model_id: &str) -> Option<Arc<ModelInfo>>;
}

#[derive(Debug, Clone)]
struct ClientModels {
    client_id: String,
    provider: String,
    models: Vec<Arc<ModelInfo>>,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    /// Registration order; earlier clients win on duplicate model ids.
    clients: Vec<ClientModels>,
    by_id: HashMap<String, Arc<ModelInfo>>,
}

impl Snapshot {
    fn reindex(&mut self) {
        let mut by_id = HashMap::new();
        for client in &self.clients {
            for model in &client.models {
                by_id
                    .entry(model.id.clone())
                    .or_insert_with(|| model.clone());
            }
        }
        self.by_id = by_id;
    }
}

/// In-memory model registry keyed by the client that contributed the models.
///
/// Reads load an immutable snapshot and never block; writers publish a new
/// snapshot.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    snapshot: ArcSwap<Snapshot>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the model list for `client_id`. A replaced client
    /// keeps its original position in the precedence order.
    pub fn register_client(&self, client_id: &str, provider: &str, models: Vec<ModelInfo>) {
        let models: Vec<Arc<ModelInfo>> = models.into_iter().map(Arc::new).collect();
        self.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            let entry = ClientModels {
                client_id: client_id.to_string(),
                provider: provider.to_string(),
                models: models.clone(),
            };
            match next
                .clients
                .iter_mut()
                .find(|client| client.client_id == client_id)
            {
                Some(existing) => *existing = entry,
                None => next.clients.push(entry),
            }
            next.reindex();
            next
        });
    }

    pub fn unregister_client(&self, client_id: &str) {
        self.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            next.clients.retain(|client| client.client_id != client_id);
            next.reindex();
            next
        });
    }

    /// Distinct models in registration order, optionally limited to one provider
    /// (compared case-insensitively).
    pub fn list_models(&self, provider: Option<&str>) -> Vec<Arc<ModelInfo>> {
        let snapshot = self.snapshot.load();
        let mut seen = HashSet::new();
        snapshot
            .clients
            .iter()
            .filter(|client| {
                provider.is_none_or(|wanted| client.provider.eq_ignore_ascii_case(wanted))
            })
            .flat_map(|client| client.models.iter())
            .filter(|model| seen.insert(model.id.clone()))
            .cloned()
            .collect()
    }

    pub fn providers(&self) -> Vec<String> {
        let snapshot = self.snapshot.load();
        let mut out: Vec<String> = Vec::new();
        for client in &snapshot.clients {
            if !out.iter().any(|name| name == &client.provider) {
                out.push(client.provider.clone());
            }
        }
        out
    }
}

impl ModelCatalog for ModelRegistry {
    fn model_info(&self, model_id: &str) -> Option<Arc<ModelInfo>> {
        self.snapshot.load().by_id.get(model_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_wins_until_removed() {
        let registry = ModelRegistry::new();
        registry.register_client(
            "copilot",
            "github-copilot",
            vec![ModelInfo::new("gpt-x").with_endpoints(["/chat/completions"])],
        );
        registry.register_client(
            "codex",
            "codex",
            vec![ModelInfo::new("gpt-x").with_endpoints(["/responses"])],
        );

        let info = registry.model_info("gpt-x").unwrap();
        assert_eq!(info.supported_endpoints, vec!["/chat/completions"]);

        registry.unregister_client("copilot");
        let info = registry.model_info("gpt-x").unwrap();
        assert_eq!(info.supported_endpoints, vec!["/responses"]);
    }

    #[test]
    fn reregistering_replaces_models_in_place() {
        let registry = ModelRegistry::new();
        registry.register_client("a", "openai", vec![ModelInfo::new("one")]);
        registry.register_client("b", "openai", vec![ModelInfo::new("two")]);
        registry.register_client("a", "openai", vec![ModelInfo::new("three")]);

        assert!(registry.model_info("one").is_none());
        let ids: Vec<String> = registry
            .list_models(None)
            .iter()
            .map(|model| model.id.clone())
            .collect();
        assert_eq!(ids, vec!["three", "two"]);
    }

    #[test]
    fn list_models_filters_by_provider() {
        let registry = ModelRegistry::new();
        registry.register_client("a", "Anthropic", vec![ModelInfo::new("claude-x")]);
        registry.register_client("g", "google", vec![ModelInfo::new("gemini-x")]);

        let claude = registry.list_models(Some("anthropic"));
        assert_eq!(claude.len(), 1);
        assert_eq!(claude[0].id, "claude-x");
        assert_eq!(registry.providers(), vec!["Anthropic", "google"]);
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gcompat_module::{AliasRequest, BaseHandlers, ClaudeHandlers, GeminiHandlers, OpenAiHandlers};
use gcompat_registry::{ModelCatalog, ModelInfo, ModelRegistry};
use serde_json::{Value, json};

/// Built-in provider handlers. Model listings come from the registry; request
/// handling is left to the provider backends this host is deployed with.
pub struct LocalHandlers {
    registry: Arc<ModelRegistry>,
}

impl LocalHandlers {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn into_base(self) -> BaseHandlers {
        let handlers = Arc::new(self);
        BaseHandlers::new(handlers.clone(), handlers.clone(), handlers)
    }

    /// Models registered for `provider`, or every model when that provider
    /// has none.
    fn models_for(&self, provider: &str) -> Vec<Arc<ModelInfo>> {
        let scoped = self.registry.list_models(Some(provider));
        if scoped.is_empty() {
            self.registry.list_models(None)
        } else {
            scoped
        }
    }
}

fn not_implemented(operation: &str) -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "error": "not_implemented",
            "message": format!("{operation} is not served by this gateway"),
        })),
    )
        .into_response()
}

fn display_name(model: &ModelInfo) -> &str {
    model.display_name.as_deref().unwrap_or(&model.id)
}

fn gemini_model(model: &ModelInfo) -> Value {
    json!({
        "name": format!("models/{}", model.id),
        "displayName": display_name(model),
        "supportedGenerationMethods": ["generateContent", "streamGenerateContent", "countTokens"],
    })
}

#[async_trait]
impl OpenAiHandlers for LocalHandlers {
    async fn models(&self, req: AliasRequest) -> Response {
        let data: Vec<Value> = self
            .models_for(&req.provider)
            .iter()
            .map(|model| {
                json!({
                    "id": model.id,
                    "object": "model",
                    "created": 0,
                    "owned_by": model.owned_by.as_deref().unwrap_or(&req.provider),
                })
            })
            .collect();
        Json(json!({ "object": "list", "data": data })).into_response()
    }

    async fn chat_completions(&self, _req: AliasRequest) -> Response {
        not_implemented("chat completions")
    }

    async fn completions(&self, _req: AliasRequest) -> Response {
        not_implemented("completions")
    }

    async fn responses(&self, _req: AliasRequest) -> Response {
        not_implemented("responses")
    }
}

#[async_trait]
impl ClaudeHandlers for LocalHandlers {
    async fn models(&self, req: AliasRequest) -> Response {
        let models = self.models_for(&req.provider);
        let data: Vec<Value> = models
            .iter()
            .map(|model| {
                json!({
                    "type": "model",
                    "id": model.id,
                    "display_name": display_name(model),
                })
            })
            .collect();
        Json(json!({
            "data": data,
            "has_more": false,
            "first_id": models.first().map(|model| model.id.as_str()),
            "last_id": models.last().map(|model| model.id.as_str()),
        }))
        .into_response()
    }

    async fn messages(&self, _req: AliasRequest) -> Response {
        not_implemented("messages")
    }

    async fn count_tokens(&self, _req: AliasRequest) -> Response {
        not_implemented("count tokens")
    }
}

#[async_trait]
impl GeminiHandlers for LocalHandlers {
    async fn models(&self, req: AliasRequest) -> Response {
        let models: Vec<Value> = self
            .models_for(&req.provider)
            .iter()
            .map(|model| gemini_model(model))
            .collect();
        Json(json!({ "models": models })).into_response()
    }

    async fn action_post(&self, _req: AliasRequest) -> Response {
        not_implemented("generate content")
    }

    /// `GET models/{name}` answers from the registry.
    async fn action_get(&self, req: AliasRequest) -> Response {
        let name = req.action.as_deref().unwrap_or_default();
        match self.registry.model_info(name) {
            Some(model) => Json(gemini_model(&model)).into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "model_not_found",
                    "message": format!("model {name} is not registered"),
                })),
            )
                .into_response(),
        }
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

use crate::auth::AuthContext;

/// A request arriving on a provider alias route, handed to the host's
/// provider handlers.
#[derive(Debug, Clone)]
pub struct AliasRequest {
    /// Provider token from the path, as sent by the client.
    pub provider: String,
    /// Gemini `models/{action}` segment, e.g. `gemini-pro:generateContent`.
    pub action: Option<String>,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub auth: AuthContext,
    /// Endpoint shape the client called. Set on every chat-completion and
    /// responses request, whether or not capability lookup rerouted it.
    pub requested_endpoint: Option<&'static str>,
}

#[async_trait]
pub trait OpenAiHandlers: Send + Sync {
    async fn models(&self, req: AliasRequest) -> Response;
    async fn chat_completions(&self, req: AliasRequest) -> Response;
    async fn completions(&self, req: AliasRequest) -> Response;
    async fn responses(&self, req: AliasRequest) -> Response;
}

#[async_trait]
pub trait ClaudeHandlers: Send + Sync {
    async fn models(&self, req: AliasRequest) -> Response;
    async fn messages(&self, req: AliasRequest) -> Response;
    async fn count_tokens(&self, req: AliasRequest) -> Response;
}

#[async_trait]
pub trait GeminiHandlers: Send + Sync {
    async fn models(&self, req: AliasRequest) -> Response;
    async fn action_post(&self, req: AliasRequest) -> Response;
    async fn action_get(&self, req: AliasRequest) -> Response;
}

/// Provider handler sets the host already serves on its own routes.
#[derive(Clone)]
pub struct BaseHandlers {
    pub openai: Arc<dyn OpenAiHandlers>,
    pub claude: Arc<dyn ClaudeHandlers>,
    pub gemini: Arc<dyn GeminiHandlers>,
}

impl BaseHandlers {
    pub fn new(
        openai: Arc<dyn OpenAiHandlers>,
        claude: Arc<dyn ClaudeHandlers>,
        gemini: Arc<dyn GeminiHandlers>,
    ) -> Self {
        Self {
            openai,
            claude,
            gemini,
        }
    }
}

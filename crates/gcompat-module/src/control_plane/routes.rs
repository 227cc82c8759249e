use std::sync::Arc;

use axum::Router;
use axum::extract::{Extension, Path, Request, State};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use bytes::Bytes;
use gcompat_proxy::{UpstreamProxy, proxy_handler};
use gcompat_registry::{
    CHAT_COMPLETIONS_ENDPOINT, ModelCatalog, RESPONSES_ENDPOINT, resolve_endpoint_override,
};
use http::{HeaderMap, Method, StatusCode, Uri};
use serde::Deserialize;
use tracing::debug;

use crate::auth::{AuthContext, AuthProvider, require_auth};
use crate::handlers::{AliasRequest, BaseHandlers};

/// Management API groups forwarded to the control plane, each at the exact
/// path and every subpath.
pub const MANAGEMENT_GROUPS: [&str; 7] = [
    "internal",
    "user",
    "auth",
    "meta",
    "telemetry",
    "threads",
    "otel",
];

const NATIVE_GEMINI_PROVIDER: &str = "google";

#[derive(Clone)]
pub(crate) struct AliasState {
    pub(crate) handlers: BaseHandlers,
    pub(crate) catalog: Arc<dyn ModelCatalog>,
}

pub(crate) fn management_router(proxy: Arc<UpstreamProxy>) -> Router {
    let mut router = Router::new();
    for group in MANAGEMENT_GROUPS {
        router = router
            .route(&format!("/api/{group}"), any(proxy_handler))
            .route(&format!("/api/{group}/{{*path}}"), any(proxy_handler));
    }
    router
        .route("/api/ads", any(proxy_handler))
        .route(
            "/api/provider/{provider}/v1beta1/{*path}",
            any(native_gemini_passthrough),
        )
        .with_state(proxy)
}

/// Only `google` has a native v1beta1 surface on the control plane. The
/// provider segment is matched here so the route can share its prefix with
/// the alias routes.
async fn native_gemini_passthrough(
    State(proxy): State<Arc<UpstreamProxy>>,
    Path((provider, _path)): Path<(String, String)>,
    req: Request,
) -> Response {
    if provider != NATIVE_GEMINI_PROVIDER {
        return StatusCode::NOT_FOUND.into_response();
    }
    proxy.forward(req).await
}

pub(crate) fn alias_router(state: AliasState, auth: Arc<dyn AuthProvider>) -> Router {
    Router::new()
        // Root-level routes for providers whose clients omit `/v1`.
        .route("/api/provider/{provider}/models", get(models))
        .route(
            "/api/provider/{provider}/chat/completions",
            post(chat_completions),
        )
        .route("/api/provider/{provider}/completions", post(completions))
        .route("/api/provider/{provider}/responses", post(responses))
        .route("/api/provider/{provider}/v1/models", get(models))
        .route(
            "/api/provider/{provider}/v1/chat/completions",
            post(chat_completions),
        )
        .route("/api/provider/{provider}/v1/completions", post(completions))
        .route("/api/provider/{provider}/v1/responses", post(responses))
        .route("/api/provider/{provider}/v1/messages", post(claude_messages))
        .route(
            "/api/provider/{provider}/v1/messages/count_tokens",
            post(claude_count_tokens),
        )
        .route("/api/provider/{provider}/v1beta/models", get(gemini_models))
        .route(
            "/api/provider/{provider}/v1beta/models/{action}",
            post(gemini_action_post).get(gemini_action_get),
        )
        .route_layer(middleware::from_fn_with_state(auth, require_auth))
        .with_state(state)
}

fn alias_request(
    provider: String,
    action: Option<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    auth: AuthContext,
    body: Bytes,
) -> AliasRequest {
    AliasRequest {
        provider,
        action,
        method,
        uri,
        headers,
        body,
        auth,
        requested_endpoint: None,
    }
}

async fn models(
    State(state): State<AliasState>,
    Path(provider): Path<String>,
    Extension(auth): Extension<AuthContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let req = alias_request(provider, None, method, uri, headers, auth, Bytes::new());
    match req.provider.to_ascii_lowercase().as_str() {
        "anthropic" => state.handlers.claude.models(req).await,
        "google" => state.handlers.gemini.models(req).await,
        _ => state.handlers.openai.models(req).await,
    }
}

async fn chat_completions(
    State(state): State<AliasState>,
    Path(provider): Path<String>,
    Extension(auth): Extension<AuthContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req = alias_request(provider, None, method, uri, headers, auth, body);
    dispatch_interchangeable(&state, CHAT_COMPLETIONS_ENDPOINT, req).await
}

async fn responses(
    State(state): State<AliasState>,
    Path(provider): Path<String>,
    Extension(auth): Extension<AuthContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req = alias_request(provider, None, method, uri, headers, auth, body);
    dispatch_interchangeable(&state, RESPONSES_ENDPOINT, req).await
}

async fn completions(
    State(state): State<AliasState>,
    Path(provider): Path<String>,
    Extension(auth): Extension<AuthContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req = alias_request(provider, None, method, uri, headers, auth, body);
    state.handlers.openai.completions(req).await
}

async fn claude_messages(
    State(state): State<AliasState>,
    Path(provider): Path<String>,
    Extension(auth): Extension<AuthContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req = alias_request(provider, None, method, uri, headers, auth, body);
    state.handlers.claude.messages(req).await
}

async fn claude_count_tokens(
    State(state): State<AliasState>,
    Path(provider): Path<String>,
    Extension(auth): Extension<AuthContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req = alias_request(provider, None, method, uri, headers, auth, body);
    state.handlers.claude.count_tokens(req).await
}

async fn gemini_models(
    State(state): State<AliasState>,
    Path(provider): Path<String>,
    Extension(auth): Extension<AuthContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let req = alias_request(provider, None, method, uri, headers, auth, Bytes::new());
    state.handlers.gemini.models(req).await
}

async fn gemini_action_post(
    State(state): State<AliasState>,
    Path((provider, action)): Path<(String, String)>,
    Extension(auth): Extension<AuthContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req = alias_request(provider, Some(action), method, uri, headers, auth, body);
    state.handlers.gemini.action_post(req).await
}

async fn gemini_action_get(
    State(state): State<AliasState>,
    Path((provider, action)): Path<(String, String)>,
    Extension(auth): Extension<AuthContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let req = alias_request(provider, Some(action), method, uri, headers, auth, Bytes::new());
    state.handlers.gemini.action_get(req).await
}

/// Routes a chat-completions or responses request to whichever of the two the
/// requested model accepts. The handler always sees the shape the client asked
/// for in `requested_endpoint`.
async fn dispatch_interchangeable(
    state: &AliasState,
    requested: &'static str,
    mut req: AliasRequest,
) -> Response {
    let target = match request_model(&req.body) {
        Some(model) => {
            let target = resolve_endpoint_override(state.catalog.as_ref(), &model, requested);
            if let Some(target) = target {
                debug!(
                    event = "endpoint_override",
                    provider = %req.provider,
                    model = %model,
                    requested,
                    target
                );
            }
            target.unwrap_or(requested)
        }
        None => requested,
    };
    req.requested_endpoint = Some(requested);

    if target == RESPONSES_ENDPOINT {
        state.handlers.openai.responses(req).await
    } else {
        state.handlers.openai.chat_completions(req).await
    }
}

#[derive(Deserialize)]
struct ModelField {
    #[serde(default)]
    model: Option<String>,
}

fn request_model(body: &[u8]) -> Option<String> {
    let field: ModelField = serde_json::from_slice(body).ok()?;
    field
        .model
        .map(|model| model.trim().to_string())
        .filter(|model| !model.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_model_from_json_body() {
        assert_eq!(
            request_model(br#"{"model":" gpt-x ","messages":[]}"#).as_deref(),
            Some("gpt-x")
        );
        assert_eq!(request_model(br#"{"messages":[]}"#), None);
        assert_eq!(request_model(br#"{"model":""}"#), None);
        assert_eq!(request_model(br#"{"model":42}"#), None);
        assert_eq!(request_model(b"not json"), None);
        assert_eq!(request_model(b""), None);
    }
}

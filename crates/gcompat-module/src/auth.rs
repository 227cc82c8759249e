use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub key_id: Option<String>,
}

#[derive(Debug)]
pub struct AuthError {
    pub status: StatusCode,
    pub message: &'static str,
}

impl AuthError {
    pub fn new(status: StatusCode, message: &'static str) -> Self {
        Self { status, message }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": "unauthorized", "message": self.message });
        let mut resp = Response::new(Body::from(body.to_string()));
        *resp.status_mut() = self.status;
        resp.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        resp
    }
}

/// Host-supplied authentication for the provider alias routes.
pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError>;
}

/// Accepts every request.
#[derive(Debug, Default)]
pub struct NoopAuth;

impl AuthProvider for NoopAuth {
    fn authenticate(&self, _headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        Ok(AuthContext::default())
    }
}

/// Checks `X-Api-Key` or `Authorization: Bearer` against a fixed key set.
///
/// An empty set accepts every request. The set is swapped atomically on reload.
#[derive(Debug)]
pub struct StaticKeyAuth {
    keys: ArcSwap<HashMap<String, String>>,
}

impl StaticKeyAuth {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: ArcSwap::from_pointee(index_keys(keys)),
        }
    }

    pub fn replace_keys<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys.store(Arc::new(index_keys(keys)));
    }

    pub fn is_open(&self) -> bool {
        self.keys.load().is_empty()
    }
}

impl AuthProvider for StaticKeyAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let keys = self.keys.load();
        if keys.is_empty() {
            return Ok(AuthContext::default());
        }
        let api_key = extract_api_key(headers)
            .ok_or_else(|| AuthError::new(StatusCode::UNAUTHORIZED, "missing api key"))?;
        let key_id = keys
            .get(api_key.as_str())
            .ok_or_else(|| AuthError::new(StatusCode::UNAUTHORIZED, "invalid api key"))?;
        Ok(AuthContext {
            key_id: Some(key_id.clone()),
        })
    }
}

fn index_keys<I, S>(keys: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    keys.into_iter()
        .map(Into::into)
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .enumerate()
        .map(|(index, key)| (key, format!("key-{index}")))
        .collect()
}

fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = header_value(headers, "x-api-key") {
        return Some(value);
    }

    let auth = header_value(headers, AUTHORIZATION.as_str())?;
    let auth = auth.trim();
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Middleware that authenticates the request and stores the resulting
/// [`AuthContext`] as a request extension.
pub async fn require_auth(
    State(auth): State<Arc<dyn AuthProvider>>,
    mut req: Request,
    next: Next,
) -> Response {
    match auth.authenticate(req.headers()) {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(err) => {
            warn!(
                event = "alias_auth_rejected",
                method = %req.method(),
                path = %req.uri().path(),
                status = err.status.as_u16(),
                reason = err.message
            );
            err.into_response()
        }
    }
}

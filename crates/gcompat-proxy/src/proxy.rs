use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::Response;
use futures_util::StreamExt;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use http::{HeaderMap, HeaderValue, StatusCode, Uri};
use tracing::{error, warn};
use url::{Position, Url};
use wreq::{Client, Proxy};

use crate::body::body_from_stream;
use crate::error::ProxyError;
use crate::headers::strip_hop_by_hop;
use crate::normalize::{UpstreamResponse, normalize_response};
use crate::secret::SecretSource;

pub const PROXY_ERROR_BODY: &str =
    r#"{"error":"upstream_proxy_error","message":"Failed to reach upstream"}"#;
const REQUEST_TOO_LARGE_BODY: &str =
    r#"{"error":"request_body_too_large","message":"Request body exceeds the proxy limit"}"#;
const MAX_REQUEST_BODY_BYTES: usize = 32 * 1024 * 1024;
const X_API_KEY: &str = "x-api-key";

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(86400),
            read_timeout: Duration::from_secs(300),
        }
    }
}

/// Single-host reverse proxy: rewrites the target to the upstream, injects
/// credentials, and normalizes responses on the way back.
pub struct UpstreamProxy {
    target: Url,
    secret: Arc<dyn SecretSource>,
    client: Client,
}

impl UpstreamProxy {
    pub fn new(upstream_url: &str, secret: Arc<dyn SecretSource>) -> Result<Self, ProxyError> {
        Self::with_client_config(upstream_url, secret, &UpstreamClientConfig::default())
    }

    pub fn with_client_config(
        upstream_url: &str,
        secret: Arc<dyn SecretSource>,
        config: &UpstreamClientConfig,
    ) -> Result<Self, ProxyError> {
        let target = parse_upstream_url(upstream_url)?;
        let client = build_client(config)?;
        Ok(Self {
            target,
            secret,
            client,
        })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Joins the upstream base path with the request path and merges queries.
    /// The request path is copied as received: dot segments and percent
    /// escapes are never resolved.
    pub fn target_url(&self, uri: &Uri) -> Result<Uri, ProxyError> {
        let authority = &self.target[Position::BeforeHost..Position::AfterPort];
        let base = self.target.path().trim_end_matches('/');
        let path = uri.path().trim_start_matches('/');
        let mut target = format!("{}://{authority}{base}/{path}", self.target.scheme());

        let query = match (self.target.query(), uri.query()) {
            (Some(base), Some(extra)) if !base.is_empty() && !extra.is_empty() => {
                Some(format!("{base}&{extra}"))
            }
            (Some(base), _) if !base.is_empty() => Some(base.to_string()),
            (_, Some(extra)) if !extra.is_empty() => Some(extra.to_string()),
            _ => None,
        };
        if let Some(query) = query {
            target.push('?');
            target.push_str(&query);
        }
        Ok(Uri::try_from(target)?)
    }

    /// Outbound transform applied to every forwarded request.
    pub async fn direct(&self, uri: &Uri, headers: &mut HeaderMap) -> Result<Uri, ProxyError> {
        strip_hop_by_hop(headers);
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);
        self.apply_credentials(headers).await;
        self.target_url(uri)
    }

    /// Sets `X-Api-Key` and `Authorization: Bearer` when the secret source yields
    /// a non-empty value. Failures leave the request unauthenticated.
    pub async fn apply_credentials(&self, headers: &mut HeaderMap) {
        let key = match self.secret.get().await {
            Ok(key) => key,
            Err(err) => {
                warn!(
                    event = "upstream_secret_error",
                    error = %err,
                    "continuing without upstream credentials"
                );
                return;
            }
        };
        if key.is_empty() {
            return;
        }
        let (Ok(raw), Ok(bearer)) = (
            HeaderValue::from_str(&key),
            HeaderValue::from_str(&format!("Bearer {key}")),
        ) else {
            warn!(
                event = "upstream_secret_error",
                "secret is not a valid header value, continuing without upstream credentials"
            );
            return;
        };
        headers.insert(X_API_KEY, raw);
        headers.insert(AUTHORIZATION, bearer);
    }

    pub async fn forward(&self, req: Request) -> Response {
        let (parts, body) = req.into_parts();
        let method = parts.method;
        let path = parts.uri.path().to_string();

        let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
            Ok(body) => body,
            Err(err) => {
                warn!(
                    event = "upstream_request_body_rejected",
                    method = %method,
                    path = %path,
                    error = %err
                );
                return json_response(StatusCode::PAYLOAD_TOO_LARGE, REQUEST_TOO_LARGE_BODY);
            }
        };

        let mut headers = parts.headers;
        let target = match self.direct(&parts.uri, &mut headers).await {
            Ok(target) => target,
            Err(err) => {
                error!(
                    event = "upstream_target_invalid",
                    method = %method,
                    path = %path,
                    error = %err
                );
                return upstream_error_response();
            }
        };

        let sent = self
            .client
            .request(method.clone(), target)
            .headers(headers)
            .body(body)
            .send()
            .await;
        let resp = match sent {
            Ok(resp) => resp,
            Err(err) => {
                error!(
                    event = "upstream_proxy_error",
                    method = %method,
                    path = %path,
                    error = %err
                );
                return upstream_error_response();
            }
        };

        let upstream = UpstreamResponse {
            status: resp.status(),
            headers: resp.headers().clone(),
            body: body_from_stream(resp.bytes_stream().map(|item| item.map_err(io::Error::other))),
        };
        let mut normalized = normalize_response(upstream).await;
        strip_hop_by_hop(&mut normalized.headers);

        let mut out = Response::new(Body::from_stream(normalized.body));
        *out.status_mut() = normalized.status;
        *out.headers_mut() = normalized.headers;
        out
    }
}

/// Fixed 502 sent when the upstream cannot be reached. The transport error is
/// logged by the caller and never included here.
pub fn upstream_error_response() -> Response {
    json_response(StatusCode::BAD_GATEWAY, PROXY_ERROR_BODY)
}

pub async fn proxy_handler(State(proxy): State<Arc<UpstreamProxy>>, req: Request) -> Response {
    proxy.forward(req).await
}

fn json_response(status: StatusCode, body: &'static str) -> Response {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

fn parse_upstream_url(raw: &str) -> Result<Url, ProxyError> {
    let invalid = |reason: String| ProxyError::InvalidUpstreamUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

fn build_client(config: &UpstreamClientConfig) -> Result<Client, ProxyError> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .read_timeout(config.read_timeout)
        .redirect(wreq::redirect::Policy::none());

    if let Some(proxy) = config.proxy.as_deref() {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}

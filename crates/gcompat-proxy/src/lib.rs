//! Reverse proxy toward the control-plane upstream.
//!
//! Outbound requests get upstream credentials injected from a [`SecretSource`];
//! inbound responses go through [`normalize_response`], which repairs upstreams
//! that gzip a body without declaring `Content-Encoding`.

pub mod body;
pub mod error;
pub mod headers;
pub mod normalize;
pub mod proxy;
pub mod secret;

pub use body::{BodyStream, PeekedBody};
pub use error::{ProxyError, SecretError};
pub use normalize::{UpstreamResponse, is_streaming_response, normalize_response};
pub use proxy::{
    PROXY_ERROR_BODY, UpstreamClientConfig, UpstreamProxy, proxy_handler, upstream_error_response,
};
pub use secret::{DEFAULT_SECRET_TTL, MultiSourceSecret, SecretSource, StaticSecretSource};

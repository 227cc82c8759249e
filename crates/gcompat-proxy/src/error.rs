use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("read secret file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid upstream url {url:?}: {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },
    #[error("build upstream request uri: {0}")]
    TargetUri(#[from] http::uri::InvalidUri),
    #[error("build upstream client: {0}")]
    Client(#[from] wreq::Error),
}

//! Model capability lookup for gcompat.
//!
//! The registry is populated by the host; this crate only answers "which
//! endpoint shapes does this model accept" and derives endpoint overrides
//! from that answer.

pub mod endpoint;
pub mod model;
pub mod registry;
pub mod suffix;

pub use endpoint::{CHAT_COMPLETIONS_ENDPOINT, RESPONSES_ENDPOINT, resolve_endpoint_override};
pub use model::ModelInfo;
pub use registry::{ModelCatalog, ModelRegistry};
pub use suffix::{ModelSuffix, parse_suffix};

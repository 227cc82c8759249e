use std::sync::Arc;

use crate::model::ModelInfo;
use crate::registry::ModelCatalog;
use crate::suffix::parse_suffix;

pub const CHAT_COMPLETIONS_ENDPOINT: &str = "/chat/completions";
pub const RESPONSES_ENDPOINT: &str = "/responses";

/// Returns the endpoint a request for `requested` should be served by, when the
/// model does not accept `requested` but accepts its counterpart.
///
/// Only chat completions and responses are interchangeable. `None` means the
/// request proceeds unchanged.
pub fn resolve_endpoint_override(
    catalog: &dyn ModelCatalog,
    model: &str,
    requested: &str,
) -> Option<&'static str> {
    if model.is_empty() {
        return None;
    }
    let info = lookup(catalog, model)?;
    if info.supported_endpoints.is_empty() || info.supports(requested) {
        return None;
    }
    match requested {
        CHAT_COMPLETIONS_ENDPOINT if info.supports(RESPONSES_ENDPOINT) => Some(RESPONSES_ENDPOINT),
        RESPONSES_ENDPOINT if info.supports(CHAT_COMPLETIONS_ENDPOINT) => {
            Some(CHAT_COMPLETIONS_ENDPOINT)
        }
        _ => None,
    }
}

fn lookup(catalog: &dyn ModelCatalog, model: &str) -> Option<Arc<ModelInfo>> {
    if let Some(info) = catalog.model_info(model) {
        return Some(info);
    }
    let base = parse_suffix(model).model_name;
    if base.is_empty() || base == model {
        return None;
    }
    catalog.model_info(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelRegistry;

    fn registry() -> ModelRegistry {
        let registry = ModelRegistry::new();
        registry.register_client(
            "test-endpoint-compat",
            "github-copilot",
            vec![
                ModelInfo::new("gemini-chat-only").with_endpoints([CHAT_COMPLETIONS_ENDPOINT]),
                ModelInfo::new("codex-responses-only").with_endpoints([RESPONSES_ENDPOINT]),
                ModelInfo::new("both").with_endpoints([CHAT_COMPLETIONS_ENDPOINT, RESPONSES_ENDPOINT]),
                ModelInfo::new("messages-only").with_endpoints(["/messages"]),
                ModelInfo::new("undeclared"),
            ],
        );
        registry
    }

    #[test]
    fn responses_request_falls_back_to_chat() {
        let registry = registry();
        assert_eq!(
            resolve_endpoint_override(&registry, "gemini-chat-only", RESPONSES_ENDPOINT),
            Some(CHAT_COMPLETIONS_ENDPOINT)
        );
    }

    #[test]
    fn chat_request_moves_to_responses() {
        let registry = registry();
        assert_eq!(
            resolve_endpoint_override(&registry, "codex-responses-only", CHAT_COMPLETIONS_ENDPOINT),
            Some(RESPONSES_ENDPOINT)
        );
    }

    #[test]
    fn supported_endpoint_passes_through() {
        let registry = registry();
        assert_eq!(
            resolve_endpoint_override(&registry, "gemini-chat-only", CHAT_COMPLETIONS_ENDPOINT),
            None
        );
        assert_eq!(
            resolve_endpoint_override(&registry, "both", RESPONSES_ENDPOINT),
            None
        );
    }

    #[test]
    fn strips_thinking_suffix() {
        let registry = registry();
        assert_eq!(
            resolve_endpoint_override(&registry, "gemini-chat-only(high)", RESPONSES_ENDPOINT),
            Some(CHAT_COMPLETIONS_ENDPOINT)
        );
    }

    #[test]
    fn suffixed_id_registered_separately_wins() {
        let registry = registry();
        registry.register_client(
            "suffixed",
            "codex",
            vec![ModelInfo::new("gemini-chat-only(low)").with_endpoints([RESPONSES_ENDPOINT])],
        );
        assert_eq!(
            resolve_endpoint_override(&registry, "gemini-chat-only(low)", RESPONSES_ENDPOINT),
            None
        );
    }

    #[test]
    fn no_override_without_usable_descriptor() {
        let registry = registry();
        assert_eq!(resolve_endpoint_override(&registry, "", RESPONSES_ENDPOINT), None);
        assert_eq!(
            resolve_endpoint_override(&registry, "unknown-model", RESPONSES_ENDPOINT),
            None
        );
        assert_eq!(
            resolve_endpoint_override(&registry, "undeclared", RESPONSES_ENDPOINT),
            None
        );
        assert_eq!(
            resolve_endpoint_override(&registry, "messages-only", RESPONSES_ENDPOINT),
            None
        );
        assert_eq!(
            resolve_endpoint_override(&registry, "gemini-chat-only", "/completions"),
            None
        );
    }
}

/// A model id split into its base name and an optional trailing modifier,
/// e.g. `gemini-3-pro(high)` -> (`gemini-3-pro`, `high`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSuffix<'a> {
    pub model_name: &'a str,
    pub suffix: Option<&'a str>,
}

pub fn parse_suffix(model: &str) -> ModelSuffix<'_> {
    let unchanged = ModelSuffix {
        model_name: model,
        suffix: None,
    };
    let Some(without_close) = model.strip_suffix(')') else {
        return unchanged;
    };
    let Some(open) = without_close.rfind('(') else {
        return unchanged;
    };
    let base = &without_close[..open];
    let suffix = &without_close[open + 1..];
    if base.is_empty() || suffix.contains(')') {
        return unchanged;
    }
    ModelSuffix {
        model_name: base,
        suffix: Some(suffix),
    }
}

use serde::{Deserialize, Serialize};

/// Per-subscription asset selection policy.
///
/// `include`/`exclude` hold case-insensitive regular expressions; a pattern
/// that fails to compile is matched as a literal substring instead.
/// `prefer_extensions` and `prefer_arch` are in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetRuleSet {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub prefer_extensions: Vec<String>,
    pub prefer_arch: Vec<String>,
    pub prefer_keywords: Vec<String>,
}

impl Default for AssetRuleSet {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            prefer_extensions: [".msixbundle", ".msix", ".msi", ".exe"]
                .into_iter()
                .map(String::from)
                .collect(),
            prefer_arch: ["x64", "arm64"].into_iter().map(String::from).collect(),
            prefer_keywords: Vec::new(),
        }
    }
}

//! Stored platform labels → registry ids.
//!
//! Credentials saved by older front-ends carry vendor names such as
//! `"Alibaba"` or `"Google"` instead of registry ids.

use std::collections::HashMap;

use inkgate_core::config::default_aliases;

/// Configurable label → provider id table.
#[derive(Clone, Debug)]
pub struct PlatformAliases {
    map: HashMap<String, String>,
}

impl PlatformAliases {
    pub fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    /// Map a stored label to a registry id.
    ///
    /// Exact key first, then a case-insensitive key match. Unknown labels
    /// come back lower-cased so that plain ids pass through; the registry
    /// rejects anything else.
    pub fn canonical(&self, label: &str) -> String {
        let label = label.trim();
        if let Some(id) = self.map.get(label) {
            return id.clone();
        }
        self.map
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(label))
            .map(|(_, id)| id.clone())
            .unwrap_or_else(|| label.to_lowercase())
    }
}

impl Default for PlatformAliases {
    fn default() -> Self {
        Self::new(default_aliases())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_labels() {
        let aliases = PlatformAliases::default();
        assert_eq!(aliases.canonical("Alibaba"), "qwen");
        assert_eq!(aliases.canonical("Google"), "gemini");
        assert_eq!(aliases.canonical("iFlytek"), "spark");
    }

    #[test]
    fn test_case_insensitive_key() {
        let aliases = PlatformAliases::default();
        assert_eq!(aliases.canonical("BAIDU"), "ernie");
        assert_eq!(aliases.canonical(" zhipu "), "glm");
    }

    #[test]
    fn test_unknown_label_is_lowercased() {
        let aliases = PlatformAliases::default();
        assert_eq!(aliases.canonical("Qwen"), "qwen");
        assert_eq!(aliases.canonical("Mistral"), "mistral");
    }

    #[test]
    fn test_exact_key_wins() {
        let mut map = HashMap::new();
        map.insert("acme".to_string(), "openai".to_string());
        map.insert("ACME".to_string(), "anthropic".to_string());
        let aliases = PlatformAliases::new(map);
        assert_eq!(aliases.canonical("ACME"), "anthropic");
        assert_eq!(aliases.canonical("acme"), "openai");
    }
}

//! Legacy name resolution
//!
//! Model names and architecture identifiers have been renamed across
//! releases. The registry is an explicit table consulted once at load time;
//! repositories keep working under the old names without any global state.

use std::collections::HashMap;

/// Maps legacy identifiers to their current names
#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    aliases: HashMap<String, String>,
}

impl AliasRegistry {
    /// Empty registry (every name resolves to itself)
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the identifiers renamed in past releases
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        // model names
        registry.insert("demucs_extra", "demucs");
        registry.insert("demucs_quantized", "demucs");
        registry.insert("light", "demucs_light");
        registry.insert("light_extra", "demucs_light");
        registry.insert("tasnet_extra", "tasnet");
        // architecture identifiers
        registry.insert("hdemucs", "hybrid_demucs");
        registry.insert("htdemucs", "hybrid_transformer_demucs");
        registry
    }

    /// Register one alias
    pub fn insert(&mut self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_string(), target.to_string());
    }

    /// Resolve a possibly-legacy identifier to its current name.
    ///
    /// Resolution is a single table lookup, never chained: an alias must map
    /// directly to a current name.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        match self.aliases.get(name) {
            Some(target) => {
                log::debug!("resolved legacy name '{name}' to '{target}'");
                target
            }
            None => name,
        }
    }

    /// True if the identifier is a registered legacy alias
    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }
}

//! Runtime configuration

use serde::{Deserialize, Serialize};

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of prototype links followed by one walk before a
    /// RangeError is raised (cyclic proxy chains end up here)
    pub max_prototype_chain_length: usize,
    /// Maximum depth of nested native calls (traps calling traps, ...)
    pub max_call_depth: usize,
    /// Entries a polymorphic cache site may hold
    pub max_polymorphic_entries: usize,
    /// Slow-path resolutions after which a site stops caching
    pub megamorphic_miss_threshold: u32,
    /// Master switch for inline caching
    pub inline_caches_enabled: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_prototype_chain_length: 1000,
            max_call_depth: 10000,
            max_polymorphic_entries: 4,
            megamorphic_miss_threshold: 16,
            inline_caches_enabled: true,
        }
    }
}

impl RuntimeConfig {
    /// Default configuration with inline caching switched off.
    pub fn without_inline_caches() -> Self {
        Self {
            inline_caches_enabled: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_prototype_chain_length, 1000);
        assert_eq!(config.max_polymorphic_entries, 4);
        assert!(config.inline_caches_enabled);
        assert!(!RuntimeConfig::without_inline_caches().inline_caches_enabled);
    }

    #[test]
    fn test_partial_toml() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            max_prototype_chain_length = 8
            inline_caches_enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.max_prototype_chain_length, 8);
        assert!(!config.inline_caches_enabled);
        assert_eq!(config.max_call_depth, 10000);
    }
}

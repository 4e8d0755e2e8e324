//! Runtime configuration

use serde::Deserialize;
pub use skua_vm_gc::GcConfig;

/// Inline cache tuning knobs
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct InlineCacheConfig {
    /// Entries per site before the site goes megamorphic
    pub max_entries: usize,
    /// Deepest prototype hop a cached lookup may record
    pub max_chain_depth: usize,
    /// Misses tolerated before the site stops caching
    pub miss_limit: u32,
}

impl Default for InlineCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 4,
            max_chain_depth: 12,
            miss_limit: 32,
        }
    }
}

/// Configuration of a [`crate::Runtime`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Maximum number of active frames
    pub max_call_depth: usize,
    /// Frames recorded in a captured stack trace
    pub stack_trace_limit: usize,
    /// Inline cache settings
    pub inline_cache: InlineCacheConfig,
    /// Collector settings
    pub gc: GcConfig,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            stack_trace_limit: 10,
            inline_cache: InlineCacheConfig::default(),
            gc: GcConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VmConfig::default();
        assert_eq!(config.inline_cache.max_entries, 4);
        assert_eq!(config.stack_trace_limit, 10);
    }
}

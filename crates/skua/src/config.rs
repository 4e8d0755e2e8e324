//! Configuration file parsing for skua.toml.

use serde::Deserialize;
use skua_vm_core::{CompileOptions, VmConfig};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Runtime limits, inline cache and collector settings
    #[serde(default)]
    pub vm: VmConfig,

    /// Compiler settings
    #[serde(default)]
    pub compiler: CompilerConfig,
}

/// Compiler configuration.
#[derive(Debug, Default, Deserialize)]
pub struct CompilerConfig {
    /// Treat every script as strict mode code
    #[serde(default)]
    pub strict: bool,

    /// Operand register budget per function
    pub register_limit: Option<u16>,
}

impl CompilerConfig {
    /// Compile options for a script named `source_name`
    pub fn compile_options(&self, source_name: &str) -> CompileOptions {
        let defaults = CompileOptions::default();
        CompileOptions {
            source_name: source_name.to_string(),
            strict: self.strict,
            register_limit: self.register_limit.unwrap_or(defaults.register_limit),
        }
    }
}

/// Load configuration from a file or search for a default config file.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = path.map(PathBuf::from).or_else(find_config_file);

    match config_path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded configuration");
            Ok(config)
        }
        Some(path) => Err(anyhow::anyhow!("Config file {} does not exist", path.display())),
        None => Ok(Config::default()),
    }
}

/// Search for skua.toml in the current directory and its parents.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;

    const CONFIG_NAMES: &[&str] = &["skua.toml", ".skuarc.toml"];

    let mut dir = Some(cwd.as_path());
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.vm, VmConfig::default());
        assert!(!config.compiler.strict);
    }

    #[test]
    fn test_nested_sections() {
        let config: Config = toml::from_str(
            r#"
            [vm]
            max_call_depth = 256

            [vm.inline_cache]
            max_entries = 8

            [vm.gc]
            initial_threshold = 5000

            [compiler]
            strict = true
            register_limit = 512
            "#,
        )
        .unwrap();
        assert_eq!(config.vm.max_call_depth, 256);
        assert_eq!(config.vm.inline_cache.max_entries, 8);
        assert_eq!(config.vm.inline_cache.max_chain_depth, 12);
        assert_eq!(config.vm.gc.initial_threshold, 5000);

        let options = config.compiler.compile_options("main.js");
        assert!(options.strict);
        assert_eq!(options.register_limit, 512);
        assert_eq!(options.source_name, "main.js");
    }

    #[test]
    fn test_unknown_value_type_is_rejected() {
        assert!(toml::from_str::<Config>("[vm]\nmax_call_depth = \"deep\"").is_err());
    }
}

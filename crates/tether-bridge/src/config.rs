//! Bridge configuration
//!
//! Read from a `tether.toml` next to the embedding application. Every
//! section is optional; the defaults keep the historical behavior of the
//! enumerator reset and of the map JSON layout.

use std::path::Path;

use anyhow::Context;
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::{BridgeError, Result};

/// Largest delegate arity a trampoline can be bound to
pub const MAX_TRAMPOLINE_ARITY: usize = 16;

static DEFAULT_CONFIG: Lazy<BridgeConfig> = Lazy::new(BridgeConfig::default);

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub proxy: ProxyConfig,
    pub trampoline: TrampolineConfig,
    pub enumerator: EnumeratorConfig,
    pub serializer: SerializerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Properties whose name starts with this are left out of the JSON projection
    pub internal_prefix: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            internal_prefix: "$".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrampolineConfig {
    pub max_arity: usize,
    /// How many reference hops past the catalog roots are scanned; `None` walks the whole graph
    pub reference_depth: Option<usize>,
}

impl Default for TrampolineConfig {
    fn default() -> Self {
        Self {
            max_arity: MAX_TRAMPOLINE_ARITY,
            reference_depth: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnumeratorConfig {
    pub reset: ResetMode,
}

/// What `reset()` does on a foreign-backed enumerator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    /// Consume the rest of the iterator; `current` ends on the last element seen
    #[default]
    Drain,
    /// Pull a fresh iterator from the source object
    Rewind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerializerConfig {
    pub map_layout: MapLayout,
}

/// How a map adapter is written to JSON
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapLayout {
    /// `["k":v,...]`: name/value pairs inside array brackets
    #[default]
    PairsInArray,
    /// `{"k":v,...}`
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Render argument values in failure logs (otherwise only their count)
    pub include_arguments: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            include_arguments: true,
        }
    }
}

impl BridgeConfig {
    /// Shared instance of the default configuration
    pub fn shared_default() -> &'static BridgeConfig {
        &DEFAULT_CONFIG
    }

    pub fn from_toml_str(text: &str) -> Result<BridgeConfig> {
        let config: BridgeConfig =
            toml::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trampoline.max_arity > MAX_TRAMPOLINE_ARITY {
            return Err(BridgeError::Config(format!(
                "trampoline.max_arity is {}, the largest supported arity is {}",
                self.trampoline.max_arity, MAX_TRAMPOLINE_ARITY
            )));
        }
        if self.proxy.internal_prefix.is_empty() {
            return Err(BridgeError::Config(
                "proxy.internal_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load a `tether.toml` file
pub fn load_config(path: &Path) -> anyhow::Result<BridgeConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = BridgeConfig::from_toml_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    log::debug!("Loaded bridge configuration from {}", path.display());
    Ok(config)
}

//! Adapter and session configuration from YAML.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Offset of the greeting input buffer in the fixed-offset convention.
pub const GREET_INPUT_OFFSET: u32 = 1024;

/// Offset of the reversal input buffer in the fixed-offset convention.
pub const REVERSE_INPUT_OFFSET: u32 = 2048;

/// Result buffer offset used by modules that export no result accessor.
pub const COMPAT_RESULT_OFFSET: u32 = 3072;

/// Bytes available at each fixed offset before the next region starts.
pub const REGION_CAPACITY: u32 = 1024;

/// Addresses used by modules without an allocator.
///
/// Offsets are relative to the base returned by `getMemoryAddress` when
/// the module exports it, otherwise to the start of linear memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedOffsetLayout {
    /// Where `greet` reads its input.
    #[serde(default = "default_greet_input_offset")]
    pub greet_input_offset: u32,

    /// Where `reverseString` reads its input.
    #[serde(default = "default_reverse_input_offset")]
    pub reverse_input_offset: u32,

    /// Maximum input length written at either input offset.
    #[serde(default = "default_region_capacity")]
    pub region_capacity: u32,

    /// Constant result offset for modules with no result accessor.
    ///
    /// `None` means the accessor export is required.
    #[serde(default)]
    pub result_offset: Option<u32>,
}

fn default_greet_input_offset() -> u32 {
    GREET_INPUT_OFFSET
}
fn default_reverse_input_offset() -> u32 {
    REVERSE_INPUT_OFFSET
}
fn default_region_capacity() -> u32 {
    REGION_CAPACITY
}

impl Default for FixedOffsetLayout {
    fn default() -> Self {
        Self {
            greet_input_offset: default_greet_input_offset(),
            reverse_input_offset: default_reverse_input_offset(),
            region_capacity: default_region_capacity(),
            result_offset: None,
        }
    }
}

impl FixedOffsetLayout {
    /// Layout that reads results at the constant 3072 offset when the
    /// module exports no accessor.
    pub fn compat() -> Self {
        Self {
            result_offset: Some(COMPAT_RESULT_OFFSET),
            ..Self::default()
        }
    }
}

/// How result bytes are turned into a `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Utf8Policy {
    /// Substitute U+FFFD for invalid sequences.
    #[default]
    Lossy,
    /// Fail with a decode error.
    Strict,
}

/// When the page session answers with a local computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Propagate every error.
    Disabled,
    /// Substitute the local result when the export is missing.
    #[default]
    MissingExport,
    /// Substitute the local result on any per-call error.
    AnyCallError,
}

impl FallbackPolicy {
    /// Check if the policy covers this error.
    pub fn applies_to(self, err: &BridgeError) -> bool {
        match self {
            Self::Disabled => false,
            Self::MissingExport => err.is_missing_export(),
            Self::AnyCallError => err.is_call_error(),
        }
    }
}

/// Configuration for one adapter instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Directory that absolute module paths (`/demo.wasm`) resolve against.
    #[serde(default = "default_asset_root")]
    pub asset_root: PathBuf,

    /// Fixed-offset addresses.
    #[serde(default)]
    pub layout: FixedOffsetLayout,

    /// Result decoding policy.
    #[serde(default)]
    pub utf8: Utf8Policy,

    /// Fuel granted to each export call, if metering is wanted.
    #[serde(default)]
    pub fuel_per_call: Option<u64>,
}

fn default_asset_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            asset_root: default_asset_root(),
            layout: FixedOffsetLayout::default(),
            utf8: Utf8Policy::default(),
            fuel_per_call: None,
        }
    }
}

impl AdapterConfig {
    /// Resolve a module path the way a Mini Program package does:
    /// a leading `/` is relative to the asset root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        match path.strip_prefix('/') {
            Some(rest) => self.asset_root.join(rest),
            None => {
                let candidate = Path::new(path);
                if candidate.is_absolute() {
                    candidate.to_path_buf()
                } else {
                    self.asset_root.join(candidate)
                }
            }
        }
    }

    /// Set the asset root.
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    /// Set the fixed-offset layout.
    pub fn with_layout(mut self, layout: FixedOffsetLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the UTF-8 policy.
    pub fn with_utf8(mut self, policy: Utf8Policy) -> Self {
        self.utf8 = policy;
        self
    }

    /// Meter each export call with the given fuel.
    pub fn with_fuel_per_call(mut self, fuel: u64) -> Self {
        self.fuel_per_call = Some(fuel);
        self
    }
}

/// Configuration for a page session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Adapter settings.
    #[serde(default)]
    pub adapter: AdapterConfig,

    /// Fallback policy for string operations and `fibonacci`.
    #[serde(default)]
    pub fallback: FallbackPolicy,

    /// Load timeout in milliseconds.
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
}

fn default_load_timeout_ms() -> u64 {
    10_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            adapter: AdapterConfig::default(),
            fallback: FallbackPolicy::default(),
            load_timeout_ms: default_load_timeout_ms(),
        }
    }
}

impl SessionConfig {
    /// Get the load timeout as Duration.
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| BridgeError::Config {
            path: None,
            cause: e.to_string(),
        })
    }

    /// Read and parse a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| BridgeError::Io {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        serde_yaml::from_str(&text).map_err(|e| BridgeError::Config {
            path: Some(path.to_path_buf()),
            cause: e.to_string(),
        })
    }

    /// Set the fallback policy.
    pub fn with_fallback(mut self, policy: FallbackPolicy) -> Self {
        self.fallback = policy;
        self
    }

    /// Set the adapter configuration.
    pub fn with_adapter(mut self, adapter: AdapterConfig) -> Self {
        self.adapter = adapter;
        self
    }

    /// Set the load timeout.
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_uses_classic_offsets() {
        let layout = FixedOffsetLayout::default();
        assert_eq!(layout.greet_input_offset, 1024);
        assert_eq!(layout.reverse_input_offset, 2048);
        assert_eq!(layout.region_capacity, 1024);
        assert_eq!(layout.result_offset, None);
        assert_eq!(FixedOffsetLayout::compat().result_offset, Some(3072));
    }

    #[test]
    fn resolve_package_paths() {
        let config = AdapterConfig::default().with_asset_root("/srv/miniprogram");
        assert_eq!(
            config.resolve("/rustwasmdemo_bg.wasm"),
            PathBuf::from("/srv/miniprogram/rustwasmdemo_bg.wasm")
        );
        assert_eq!(
            config.resolve("wasm/zigwasm.wasm"),
            PathBuf::from("/srv/miniprogram/wasm/zigwasm.wasm")
        );
    }

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = SessionConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.load_timeout(), Duration::from_secs(10));
        assert_eq!(config.fallback, FallbackPolicy::MissingExport);
    }

    #[test]
    fn partial_yaml_overrides() {
        let yaml = r#"
fallback: any_call_error
load_timeout_ms: 250
adapter:
  utf8: strict
  layout:
    result_offset: 3072
"#;
        let config = SessionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.fallback, FallbackPolicy::AnyCallError);
        assert_eq!(config.load_timeout_ms, 250);
        assert_eq!(config.adapter.utf8, Utf8Policy::Strict);
        assert_eq!(config.adapter.layout.result_offset, Some(3072));
        assert_eq!(config.adapter.layout.greet_input_offset, 1024);
    }

    #[test]
    fn invalid_yaml_is_config_error() {
        let err = SessionConfig::from_yaml_str("fallback: sometimes").unwrap_err();
        assert_eq!(err.code(), "E601");
    }

    #[test]
    fn fallback_policy_scope() {
        let missing = BridgeError::MissingExport {
            export: "greet".into(),
            module: "m".into(),
        };
        let trap = BridgeError::Trap {
            function: "greet".into(),
            cause: "unreachable".into(),
        };
        let not_ready = BridgeError::NotReady {
            operation: crate::types::Operation::Greet,
            state: "unloaded".into(),
        };

        assert!(!FallbackPolicy::Disabled.applies_to(&missing));
        assert!(FallbackPolicy::MissingExport.applies_to(&missing));
        assert!(!FallbackPolicy::MissingExport.applies_to(&trap));
        assert!(FallbackPolicy::AnyCallError.applies_to(&trap));
        assert!(!FallbackPolicy::AnyCallError.applies_to(&not_ready));
    }
}

//! Error types for wxbridge.
//!
//! Every variant carries the export, offset or path involved so that a
//! failed call can be diagnosed from the log line alone.

use crate::types::Operation;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for wxbridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    // =========================================================================
    // Lifecycle Errors (E100-E199)
    // =========================================================================
    /// Reading, compiling or instantiating a module failed.
    #[error("E101: Failed to load WASM module '{module}': {cause}")]
    Load {
        /// The module path or name.
        module: String,
        /// Reason for the load failure.
        cause: String,
    },

    /// `load` was called on an adapter that is not in the `Unloaded` state.
    #[error("E102: Cannot {operation} while adapter is {state}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The current adapter state.
        state: String,
    },

    /// An export was called before the module finished loading.
    #[error("E103: WASM module is not ready (state: {state}), cannot call {operation}")]
    NotReady {
        /// The operation that was attempted.
        operation: Operation,
        /// The current adapter or session state.
        state: String,
    },

    // =========================================================================
    // Export Errors (E200-E299)
    // =========================================================================
    /// A required export is absent or not callable with the expected shape.
    #[error("E201: Export '{export}' is not available in module '{module}'")]
    MissingExport {
        /// The export name.
        export: String,
        /// The module that lacks it.
        module: String,
    },

    // =========================================================================
    // Memory Errors (E300-E399)
    // =========================================================================
    /// A read or write fell outside the current linear memory.
    #[error(
        "E301: Linear memory access out of bounds: offset={offset}, len={len}, memory size={memory_size}"
    )]
    MemoryBounds {
        /// Start of the attempted access.
        offset: u64,
        /// Length of the attempted access.
        len: u64,
        /// Size of linear memory at the time of the access.
        memory_size: u64,
    },

    /// A fixed-offset input does not fit in its region.
    #[error("E302: Input of {len} bytes exceeds fixed-offset region capacity of {capacity} bytes")]
    InputTooLarge {
        /// Encoded input length.
        len: usize,
        /// Region capacity.
        capacity: u32,
    },

    /// The module allocator failed.
    #[error("E303: WASM allocation of {requested} bytes failed: {cause}")]
    Allocation {
        /// Bytes requested.
        requested: u32,
        /// Reason for the failure.
        cause: String,
    },

    /// A byte range did not form valid UTF-8 under the strict policy.
    #[error("E304: Invalid UTF-8 at offset {offset}: {cause}")]
    Decode {
        /// Start of the decoded range.
        offset: u32,
        /// Decoder error.
        cause: String,
    },

    // =========================================================================
    // Execution Errors (E400-E499)
    // =========================================================================
    /// The export trapped or ran out of fuel.
    #[error("E401: Export '{function}' trapped: {cause}")]
    Trap {
        /// The export name.
        function: String,
        /// Trap description.
        cause: String,
    },

    // =========================================================================
    // Input Errors (E500-E599)
    // =========================================================================
    /// A page-level input failed validation.
    #[error("E501: Invalid input for {field}: {reason}")]
    InvalidInput {
        /// The input field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    // =========================================================================
    // Configuration Errors (E600-E699)
    // =========================================================================
    /// Configuration could not be parsed.
    #[error("E601: Invalid configuration{}: {cause}", path_suffix(.path))]
    Config {
        /// The configuration file, if any.
        path: Option<PathBuf>,
        /// Reason for the failure.
        cause: String,
    },

    /// A file could not be read.
    #[error("E602: I/O error at {path}: {cause}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// Reason for the failure.
        cause: String,
    },
}

impl BridgeError {
    /// Get the error code (e.g., "E201").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Load { .. } => "E101",
            Self::InvalidState { .. } => "E102",
            Self::NotReady { .. } => "E103",
            Self::MissingExport { .. } => "E201",
            Self::MemoryBounds { .. } => "E301",
            Self::InputTooLarge { .. } => "E302",
            Self::Allocation { .. } => "E303",
            Self::Decode { .. } => "E304",
            Self::Trap { .. } => "E401",
            Self::InvalidInput { .. } => "E501",
            Self::Config { .. } => "E601",
            Self::Io { .. } => "E602",
        }
    }

    /// Check if this error is a missing export.
    ///
    /// Callers that carry a local fallback key off this.
    #[must_use]
    pub fn is_missing_export(&self) -> bool {
        matches!(self, Self::MissingExport { .. })
    }

    /// Check if this error came from a single export call.
    ///
    /// The adapter stays usable after any of these.
    #[must_use]
    pub fn is_call_error(&self) -> bool {
        matches!(
            self,
            Self::MissingExport { .. }
                | Self::MemoryBounds { .. }
                | Self::InputTooLarge { .. }
                | Self::Allocation { .. }
                | Self::Decode { .. }
                | Self::Trap { .. }
        )
    }

    /// Check if this error is retriable.
    ///
    /// Nothing in the bridge retries on its own: a load failure needs a
    /// fresh adapter and a module never gains an export mid-session.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Check if this error is a configuration/validation error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::InvalidInput { .. })
    }
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" at {}", p.display()))
        .unwrap_or_default()
}

/// Result type alias using `BridgeError`.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        let err = BridgeError::Load {
            module: "demo.wasm".to_string(),
            cause: "bad magic".to_string(),
        };
        assert_eq!(err.code(), "E101");

        let err = BridgeError::MissingExport {
            export: "greet".to_string(),
            module: "demo.wasm".to_string(),
        };
        assert_eq!(err.code(), "E201");
        assert!(err.is_missing_export());
        assert!(err.is_call_error());
        assert!(!err.is_retriable());
    }

    #[test]
    fn error_display() {
        let err = BridgeError::MemoryBounds {
            offset: 65_530,
            len: 16,
            memory_size: 65_536,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("E301"));
        assert!(msg.contains("offset=65530"));
        assert!(msg.contains("memory size=65536"));

        let err = BridgeError::NotReady {
            operation: Operation::Add,
            state: "unloaded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "E103: WASM module is not ready (state: unloaded), cannot call add"
        );
    }

    #[test]
    fn config_error_display_with_and_without_path() {
        let err = BridgeError::Config {
            path: None,
            cause: "unknown field".to_string(),
        };
        assert_eq!(err.to_string(), "E601: Invalid configuration: unknown field");

        let err = BridgeError::Config {
            path: Some(PathBuf::from("page.yaml")),
            cause: "unknown field".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "E601: Invalid configuration at page.yaml: unknown field"
        );
        assert!(err.is_config_error());
    }

    #[test]
    fn lifecycle_errors_are_not_call_errors() {
        let err = BridgeError::InvalidState {
            operation: "load",
            state: "failed".to_string(),
        };
        assert!(!err.is_call_error());
        assert!(!err.is_missing_export());
    }
}

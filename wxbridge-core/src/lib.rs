//! wxbridge core library.
//!
//! Shared vocabulary for the wxbridge WASM host adapter: the error
//! taxonomy, operation identifiers and YAML configuration.
//!
//! # Key Components
//!
//! - **Error**: `BridgeError` with stable codes (E101 load, E201 missing
//!   export, E3xx memory, E401 trap)
//! - **Types**: `Operation`, `Computed`, `ValueSource`
//! - **Config**: `SessionConfig`, `AdapterConfig`, `FixedOffsetLayout`
//!
//! # Example
//!
//! ```ignore
//! use wxbridge_core::prelude::*;
//!
//! let config = SessionConfig::from_yaml_file("page.yaml")?;
//! assert_eq!(config.adapter.layout.greet_input_offset, 1024);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{AdapterConfig, FallbackPolicy, FixedOffsetLayout, SessionConfig, Utf8Policy};
pub use error::{BridgeError, Result};
pub use types::{Computed, Operation, ValueSource};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{
        AdapterConfig, FallbackPolicy, FixedOffsetLayout, SessionConfig, Utf8Policy,
    };
    pub use crate::error::{BridgeError, Result};
    pub use crate::types::{Computed, Operation, ValueSource};
}

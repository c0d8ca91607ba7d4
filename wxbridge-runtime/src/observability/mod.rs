//! Logging setup for wxbridge hosts.
//!
//! Library code only emits `tracing` events; a host installs a
//! subscriber once at startup with [`init_tracing`].
//!
//! # Configuration
//!
//! [`TracingConfig::from_env`] reads `WXBRIDGE_LOG_FORMAT` (`json`,
//! `pretty` or `compact`), `WXBRIDGE_LOG_LEVEL` (else `RUST_LOG`) and
//! `WXBRIDGE_LOG_LOCATION`.
//!
//! # Example
//!
//! ```ignore
//! use wxbridge_runtime::observability::{TracingConfig, init_tracing};
//!
//! let _guard = init_tracing(TracingConfig::from_env())?;
//! ```

mod config;
mod tracing_setup;

pub use config::{ENV_LOG_FORMAT, ENV_LOG_LEVEL, ENV_LOG_LOCATION, LogFormat, TracingConfig};
pub use tracing_setup::{TracingGuard, init_tracing};

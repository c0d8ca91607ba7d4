//! wxbridge runtime.
//!
//! Loads WebAssembly modules built for Mini Program pages and marshals
//! values across the WASM boundary.
//!
//! # Key Components
//!
//! - **wasm**: `WasmAdapter`, the memory marshaling adapter, plus the
//!   engine, memory bridge and capability descriptor it is built on
//! - **session**: `PageSession`, an explicitly owned adapter with load
//!   timeout, input validation, fallbacks and notices
//! - **observability**: `tracing-subscriber` setup for hosts
//!
//! # Example
//!
//! ```ignore
//! use wxbridge_runtime::prelude::*;
//!
//! let mut session = PageSession::with_defaults()?;
//! session.load("/rustwasmdemo_bg.wasm").await?;
//!
//! let sum = session.add(2, 3)?;
//! assert_eq!(sum.value, 5);
//! let greeting = session.greet("测试")?;
//! assert!(greeting.value.contains("测试"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod observability;
pub mod session;
pub mod wasm;

pub use session::{Notice, NoticeKind, PageSession, SessionStatus};
pub use wasm::{
    AdapterState, Capabilities, SharedAdapter, StringConvention, WasmAdapter, WasmRuntime,
    WasmRuntimeConfig,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::session::{Notice, NoticeKind, PageSession, SessionStatus};
    pub use crate::wasm::{
        AdapterState, Capabilities, StringConvention, WasmAdapter, WasmRuntime, WasmRuntimeConfig,
    };
    pub use wxbridge_core::prelude::*;
}

//! WASM host adapter.
//!
//! Loads one compiled module per adapter and marshals values across the
//! boundary: numbers pass directly, strings travel through linear memory.
//!
//! # Architecture
//!
//! - **WasmRuntime**: Manages the Wasmtime engine and compiled modules
//! - **WasmAdapter**: Lifecycle plus one typed wrapper per export
//! - **Capabilities**: What the loaded module supports, computed once at load
//! - **MemoryBridge**: Bounds-checked reads and writes of linear memory
//! - **HostState**: Per-instance state and limits for host functions
//!
//! # WASM Module ABI Contract
//!
//! Numeric exports (each optional):
//!
//! ```text
//! add(a: i32, b: i32) -> i32
//! multiply(a: i32, b: i32) -> i32
//! factorial(n: i32) -> i32 | i64
//! is_prime(n: i32) -> i32            // non-zero means prime
//! fibonacci(n: i32) -> i32 | i64
//! ```
//!
//! String exports, allocated convention (preferred when both allocator
//! functions are present):
//!
//! ```text
//! memory: Memory
//! __wbindgen_malloc(len[, align]) -> ptr
//! __wbindgen_free(ptr, len[, align])
//! greet(ptr, len) -> record_ptr          // record = {ptr: u32, len: u32} LE
//! reverseString(ptr, len) -> record_ptr
//! ```
//!
//! String exports, fixed-offset convention:
//!
//! ```text
//! memory: Memory
//! getMemoryAddress() -> base             // optional, base = 0 otherwise
//! greet(base + 1024, len) -> result_len  // output at getMemoryPtr()
//! reverseString(base + 2048, len) -> result_len  // output at getReversedPtr()
//! greet(age) -> result_len               // output at getMemoryPtr()
//! ```
//!
//! When an accessor is missing, `FixedOffsetLayout::result_offset` (3072
//! in compatibility mode) locates the output at `base + result_offset`.
//!
//! Modules may import `env.host_log(ptr, len)` to write to the host log.
//!
//! # Example
//!
//! ```ignore
//! use wxbridge_runtime::wasm::{WasmAdapter, WasmRuntime};
//! use wxbridge_core::AdapterConfig;
//! use std::sync::Arc;
//!
//! let runtime = Arc::new(WasmRuntime::with_defaults()?);
//! let mut adapter = WasmAdapter::new(runtime, AdapterConfig::default());
//! adapter.load("/wasm/rust_wasm_bg.wasm").await?;
//!
//! assert_eq!(adapter.add(2, 3)?, 5);
//! let greeting = adapter.greet("测试")?;
//! ```

mod adapter;
mod capability;
mod host;
mod marshal;
mod memory;
mod runtime;

// Re-export public types
pub use adapter::{AdapterState, SharedAdapter, WasmAdapter};
pub use capability::{Capabilities, StringConvention, exports, signature};
pub use host::{HOST_NAMESPACE, HostState, create_linker, register_host_functions};
pub use memory::{Allocator, MemoryBridge, RESULT_RECORD_SIZE, WasmPtr, decode_utf8};
pub use runtime::{CompiledModule, WASM_PAGE_SIZE, WasmRuntime, WasmRuntimeConfig};

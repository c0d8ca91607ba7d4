//! Engine setup and compiled-module cache.
//!
//! One [`WasmRuntime`] is shared by every page session in a process. It
//! owns the Wasmtime engine and keeps compiled modules keyed by their
//! content, so reopening the same page does not recompile its module.

use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use wasmtime::{Config, Engine, Module, Strategy};
use wxbridge_core::error::{BridgeError, Result};

/// Size of one WASM page in bytes.
pub const WASM_PAGE_SIZE: usize = 64 * 1024;

/// Mini Program modules rarely need more than a few pages; 16 MB is the
/// ceiling a page gets by default.
const DEFAULT_MAX_MEMORY_PAGES: u32 = 256;

/// Ceiling for trusted, host-side deployments.
const PRODUCTION_MAX_MEMORY_PAGES: u32 = 1024;

/// Engine settings.
#[derive(Debug, Clone)]
pub struct WasmRuntimeConfig {
    /// Pages a module's linear memory may grow to.
    pub max_memory_pages: u32,
    /// Meter execution with fuel. The adapter refills it before each call.
    pub fuel_enabled: bool,
    /// Reuse compiled modules across loads of identical bytes.
    pub cache_modules: bool,
    /// Emit DWARF for guest backtraces.
    pub debug_info: bool,
}

impl Default for WasmRuntimeConfig {
    fn default() -> Self {
        Self {
            max_memory_pages: DEFAULT_MAX_MEMORY_PAGES,
            fuel_enabled: false,
            cache_modules: true,
            debug_info: false,
        }
    }
}

impl WasmRuntimeConfig {
    /// Larger memory ceiling, everything else default.
    pub fn production() -> Self {
        Self {
            max_memory_pages: PRODUCTION_MAX_MEMORY_PAGES,
            ..Self::default()
        }
    }

    /// Fuel on, no cache, debug info on.
    pub fn testing() -> Self {
        Self {
            max_memory_pages: DEFAULT_MAX_MEMORY_PAGES,
            fuel_enabled: true,
            cache_modules: false,
            debug_info: true,
        }
    }

    /// Set the memory ceiling in pages.
    pub fn with_max_memory_pages(mut self, pages: u32) -> Self {
        self.max_memory_pages = pages;
        self
    }

    /// Turn fuel metering on or off.
    pub fn with_fuel(mut self, enabled: bool) -> Self {
        self.fuel_enabled = enabled;
        self
    }

    /// Turn the compiled-module cache on or off.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_modules = enabled;
        self
    }

    /// Memory ceiling in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_pages as usize * WASM_PAGE_SIZE
    }

    fn engine_config(&self) -> Config {
        let mut config = Config::new();
        config
            .strategy(Strategy::Cranelift)
            .consume_fuel(self.fuel_enabled)
            .debug_info(self.debug_info);
        config
    }
}

/// Cache key: content hash plus length, so a hash collision also has to
/// match in size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ModuleKey {
    digest: u64,
    len: usize,
}

impl ModuleKey {
    fn of(bytes: &[u8]) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        bytes.hash(&mut hasher);
        Self {
            digest: hasher.finish(),
            len: bytes.len(),
        }
    }
}

/// A module compiled for this runtime's engine.
pub struct CompiledModule {
    module: Module,
    name: String,
    key: ModuleKey,
}

impl CompiledModule {
    /// The Wasmtime module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Path or label the module was first compiled under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content hash of the module bytes.
    pub fn hash(&self) -> u64 {
        self.key.digest
    }
}

/// Engine plus compiled-module cache.
pub struct WasmRuntime {
    engine: Engine,
    config: WasmRuntimeConfig,
    modules: DashMap<ModuleKey, Arc<CompiledModule>>,
}

impl WasmRuntime {
    /// Build an engine for `config`.
    pub fn new(config: WasmRuntimeConfig) -> Result<Self> {
        let engine = Engine::new(&config.engine_config()).map_err(|e| BridgeError::Load {
            module: "<engine>".to_string(),
            cause: format!("Failed to create engine: {}", e),
        })?;
        tracing::debug!(
            max_memory_pages = config.max_memory_pages,
            fuel = config.fuel_enabled,
            cache = config.cache_modules,
            "WASM engine ready"
        );

        Ok(Self {
            engine,
            config,
            modules: DashMap::new(),
        })
    }

    /// Build an engine with [`WasmRuntimeConfig::default`].
    pub fn with_defaults() -> Result<Self> {
        Self::new(WasmRuntimeConfig::default())
    }

    /// The Wasmtime engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Engine settings.
    pub fn config(&self) -> &WasmRuntimeConfig {
        &self.config
    }

    /// Compile `bytes`, or return the cached module for identical bytes.
    ///
    /// Compilation is CPU-bound; async callers run this on a blocking task.
    pub fn compile(&self, name: &str, bytes: &[u8]) -> Result<Arc<CompiledModule>> {
        let key = ModuleKey::of(bytes);

        if self.config.cache_modules {
            if let Some(cached) = self.modules.get(&key) {
                tracing::debug!(module = %name, hash = key.digest, "Reusing compiled module");
                return Ok(Arc::clone(cached.value()));
            }
        }

        let started = Instant::now();
        let module = Module::new(&self.engine, bytes).map_err(|e| BridgeError::Load {
            module: name.to_string(),
            cause: format!("Failed to compile module: {}", e),
        })?;
        tracing::debug!(
            module = %name,
            size = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Compiled WASM module"
        );

        let compiled = Arc::new(CompiledModule {
            module,
            name: name.to_string(),
            key,
        });
        if self.config.cache_modules {
            self.modules.insert(key, Arc::clone(&compiled));
        }
        Ok(compiled)
    }

    /// Number of cached modules.
    pub fn cached_modules(&self) -> usize {
        self.modules.len()
    }

    /// Drop every cached module.
    pub fn clear_cache(&self) {
        self.modules.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_MODULE: &str = r#"(module (memory (export "memory") 1) (func (export "noop")))"#;

    #[test]
    fn presets() {
        let default = WasmRuntimeConfig::default();
        assert_eq!(default.max_memory_bytes(), 16 * 1024 * 1024);
        assert!(!default.fuel_enabled);
        assert!(default.cache_modules);

        assert_eq!(WasmRuntimeConfig::production().max_memory_pages, 1024);

        let testing = WasmRuntimeConfig::testing();
        assert!(testing.fuel_enabled);
        assert!(!testing.cache_modules);
    }

    #[test]
    fn identical_bytes_share_one_compile() {
        let runtime = WasmRuntime::with_defaults().expect("Failed to create runtime");
        let bytes = wat::parse_str(EMPTY_MODULE).expect("Failed to parse WAT");

        let first = runtime.compile("/a.wasm", &bytes).expect("Failed to compile");
        let second = runtime.compile("/b.wasm", &bytes).expect("Failed to compile");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.name(), "/a.wasm");
        assert_eq!(runtime.cached_modules(), 1);

        runtime.clear_cache();
        assert_eq!(runtime.cached_modules(), 0);
    }

    #[test]
    fn cache_can_be_disabled() {
        let runtime = WasmRuntime::new(WasmRuntimeConfig::default().with_cache(false))
            .expect("Failed to create runtime");
        let bytes = wat::parse_str(EMPTY_MODULE).expect("Failed to parse WAT");

        let first = runtime.compile("m", &bytes).expect("Failed to compile");
        let second = runtime.compile("m", &bytes).expect("Failed to compile");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(runtime.cached_modules(), 0);
    }

    #[test]
    fn garbage_is_a_load_error() {
        let runtime = WasmRuntime::with_defaults().expect("Failed to create runtime");
        let err = runtime.compile("junk.wasm", b"\0asm garbage").err().unwrap();
        assert_eq!(err.code(), "E101");
        assert_eq!(runtime.cached_modules(), 0);
    }

    #[test]
    fn module_key_includes_length() {
        let a = ModuleKey::of(b"abc");
        assert_eq!(a, ModuleKey::of(b"abc"));
        assert_ne!(a, ModuleKey::of(b"abcd"));
        assert_eq!(a.len, 3);
    }
}

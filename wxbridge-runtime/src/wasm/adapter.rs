//! The memory marshaling adapter.
//!
//! Owns one module instance and exposes a typed wrapper per supported
//! export. Every call takes `&mut self`, which serialises access to the
//! fixed-offset buffers: a string operation's input is written, the
//! export called and its output read before the next call can start.

use super::capability::{self, Capabilities, ResolvedExports, StringConvention};
use super::host::{HostState, create_linker};
use super::memory::MemoryBridge;
use super::runtime::{CompiledModule, WasmRuntime};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use wasmtime::{Instance, Store};
use wxbridge_core::config::AdapterConfig;
use wxbridge_core::error::{BridgeError, Result};
use wxbridge_core::types::Operation;

/// Fuel granted per call when the engine meters fuel and the adapter
/// configuration names no amount.
const DEFAULT_FUEL_PER_CALL: u64 = 10_000_000;

/// An adapter shared across threads.
///
/// The fixed-offset buffers are one shared region per instance, so a
/// multi-threaded host must hold the lock for the whole call.
pub type SharedAdapter = Arc<Mutex<WasmAdapter>>;

/// Lifecycle of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Constructed, `load` not called yet.
    Unloaded,
    /// `load` in progress (or abandoned mid-flight).
    Loading,
    /// Module instantiated, exports resolved.
    Ready,
    /// `load` failed. The adapter must be discarded.
    Failed,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A module instance with its resolved exports.
pub(crate) struct LoadedModule {
    pub(crate) name: String,
    pub(crate) store: Store<HostState>,
    // Kept so the instance outlives every typed handle taken from it.
    #[allow(dead_code)]
    pub(crate) instance: Instance,
    pub(crate) bridge: Option<MemoryBridge<HostState>>,
    pub(crate) exports: ResolvedExports,
    pub(crate) capabilities: Capabilities,
    pub(crate) fuel_per_call: Option<u64>,
}

impl LoadedModule {
    /// Top up fuel before an export call when metering is on.
    pub(crate) fn refuel(&mut self, function: &str) -> Result<()> {
        if let Some(fuel) = self.fuel_per_call {
            self.store.set_fuel(fuel).map_err(|e| BridgeError::Trap {
                function: function.to_string(),
                cause: format!("Failed to set fuel: {}", e),
            })?;
        }
        Ok(())
    }

    /// Map a wasmtime call error to a trap on `function`.
    pub(crate) fn trap(function: &str, err: anyhow::Error) -> BridgeError {
        BridgeError::Trap {
            function: function.to_string(),
            cause: err.to_string(),
        }
    }

    pub(crate) fn require(&self, op: Operation) -> Result<()> {
        self.capabilities.require(op, &self.name)
    }
}

/// Adapter around one WASM module instance.
pub struct WasmAdapter {
    runtime: Arc<WasmRuntime>,
    config: AdapterConfig,
    state: AdapterState,
    loaded: Option<LoadedModule>,
}

impl WasmAdapter {
    /// Create an unloaded adapter.
    pub fn new(runtime: Arc<WasmRuntime>, config: AdapterConfig) -> Self {
        Self {
            runtime,
            config,
            state: AdapterState::Unloaded,
            loaded: None,
        }
    }

    /// Create an unloaded adapter with its own default runtime.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(
            Arc::new(WasmRuntime::with_defaults()?),
            AdapterConfig::default(),
        ))
    }

    /// Wrap this adapter for use from several threads.
    pub fn into_shared(self) -> SharedAdapter {
        Arc::new(Mutex::new(self))
    }

    /// Get the adapter configuration.
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// Check if the module is loaded and its exports resolved.
    pub fn is_ready(&self) -> bool {
        self.state == AdapterState::Ready && self.loaded.is_some()
    }

    /// Name of the loaded module.
    pub fn module_name(&self) -> Option<&str> {
        self.loaded.as_ref().map(|m| m.name.as_str())
    }

    /// Capability descriptor of the loaded module.
    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.loaded.as_ref().map(|m| &m.capabilities)
    }

    /// Names of the module's callable exports, sorted.
    ///
    /// Empty before the module is loaded.
    pub fn available_functions(&self) -> Vec<String> {
        self.capabilities()
            .map(|caps| caps.functions().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Current linear memory size in bytes, if the module exports memory.
    pub fn memory_size(&self) -> Option<usize> {
        let loaded = self.loaded.as_ref()?;
        loaded.bridge.as_ref().map(|b| b.size(&loaded.store))
    }

    /// Load the module at `path`.
    ///
    /// A leading `/` resolves against the configured asset root. The
    /// file is read asynchronously and compiled on a blocking task.
    pub async fn load(&mut self, path: &str) -> Result<()> {
        self.begin_load()?;

        let resolved = self.config.resolve(path);
        tracing::info!(module = %path, file = %resolved.display(), "Loading WASM module");

        let bytes = match tokio::fs::read(&resolved).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return self.fail(BridgeError::Load {
                    module: path.to_string(),
                    cause: format!("Failed to read {}: {}", resolved.display(), e),
                });
            }
        };

        self.finish_load(path, bytes).await
    }

    /// Load a module from bytes already in memory.
    pub async fn load_bytes(&mut self, name: &str, bytes: Vec<u8>) -> Result<()> {
        self.begin_load()?;
        tracing::info!(module = %name, size = bytes.len(), "Loading WASM module from bytes");
        self.finish_load(name, bytes).await
    }

    fn begin_load(&mut self) -> Result<()> {
        if self.state != AdapterState::Unloaded {
            return Err(BridgeError::InvalidState {
                operation: "load",
                state: self.state.to_string(),
            });
        }
        self.state = AdapterState::Loading;
        Ok(())
    }

    async fn finish_load(&mut self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let runtime = Arc::clone(&self.runtime);
        let module_name = name.to_string();
        let compiled = tokio::task::spawn_blocking(move || runtime.compile(&module_name, &bytes))
            .await
            .map_err(|e| BridgeError::Load {
                module: name.to_string(),
                cause: format!("Compile task failed: {}", e),
            })
            .and_then(|result| result);

        let loaded = compiled.and_then(|module| self.instantiate(name, &module));
        match loaded {
            Ok(loaded) => {
                tracing::info!(
                    module = %name,
                    convention = ?loaded.capabilities.convention(),
                    operations = ?loaded.capabilities.operations().collect::<Vec<_>>(),
                    functions = ?loaded.capabilities.functions().collect::<Vec<_>>(),
                    "WASM module loaded"
                );
                self.loaded = Some(loaded);
                self.state = AdapterState::Ready;
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, err: BridgeError) -> Result<()> {
        tracing::error!(error = %err, code = err.code(), "WASM module load failed");
        self.loaded = None;
        self.state = AdapterState::Failed;
        Err(err)
    }

    /// Instantiate under the name this load was asked for; a cached
    /// module keeps the name it was first compiled under.
    fn instantiate(&self, name: &str, compiled: &CompiledModule) -> Result<LoadedModule> {
        let name = name.to_string();
        let runtime_config = self.runtime.config();
        tracing::debug!(
            module = %name,
            compiled_as = %compiled.name(),
            hash = compiled.hash(),
            "Instantiating WASM module"
        );

        let host_state = HostState::new(name.clone(), runtime_config.max_memory_bytes());
        let mut store = Store::new(self.runtime.engine(), host_state);
        store.limiter(|state| &mut state.limits);

        let fuel_per_call = match (runtime_config.fuel_enabled, self.config.fuel_per_call) {
            (true, fuel) => Some(fuel.unwrap_or(DEFAULT_FUEL_PER_CALL)),
            (false, Some(_)) => {
                tracing::warn!(module = %name, "fuel_per_call is set but the runtime does not meter fuel");
                None
            }
            (false, None) => None,
        };
        if let Some(fuel) = fuel_per_call {
            // Start functions run during instantiation and need fuel too.
            store.set_fuel(fuel).map_err(|e| BridgeError::Load {
                module: name.clone(),
                cause: format!("Failed to set fuel: {}", e),
            })?;
        }

        let linker = create_linker(self.runtime.engine())?;
        let instance = linker
            .instantiate(&mut store, compiled.module())
            .map_err(|e| BridgeError::Load {
                module: name.clone(),
                cause: format!("Failed to instantiate module: {}", e),
            })?;

        let (exports, capabilities) =
            capability::resolve(&mut store, &instance, &self.config.layout);
        let bridge = exports.memory.map(MemoryBridge::new);

        Ok(LoadedModule {
            name,
            store,
            instance,
            bridge,
            exports,
            capabilities,
            fuel_per_call,
        })
    }

    /// Borrow the loaded module, or fail with `NotReady`.
    pub(crate) fn ready(&mut self, op: Operation) -> Result<&mut LoadedModule> {
        let state = self.state;
        match self.loaded.as_mut() {
            Some(loaded) if state == AdapterState::Ready => Ok(loaded),
            _ => Err(BridgeError::NotReady {
                operation: op,
                state: state.to_string(),
            }),
        }
    }

    /// `add(a, b)`.
    pub fn add(&mut self, a: i32, b: i32) -> Result<i32> {
        let m = self.ready(Operation::Add)?;
        m.require(Operation::Add)?;
        let Some(f) = m.exports.add.clone() else {
            return Err(missing(m, "add"));
        };
        m.refuel("add")?;
        f.call(&mut m.store, (a, b))
            .map_err(|e| LoadedModule::trap("add", e))
    }

    /// `multiply(a, b)`.
    pub fn multiply(&mut self, a: i32, b: i32) -> Result<i32> {
        let m = self.ready(Operation::Multiply)?;
        m.require(Operation::Multiply)?;
        let Some(f) = m.exports.multiply.clone() else {
            return Err(missing(m, "multiply"));
        };
        m.refuel("multiply")?;
        f.call(&mut m.store, (a, b))
            .map_err(|e| LoadedModule::trap("multiply", e))
    }

    /// `factorial(n)`, widened to `i64`.
    pub fn factorial(&mut self, n: i32) -> Result<i64> {
        let m = self.ready(Operation::Factorial)?;
        m.require(Operation::Factorial)?;
        m.refuel("factorial")?;
        let result = match &m.exports.factorial {
            Some(f) => f.call(&mut m.store, n),
            None => return Err(missing(m, "factorial")),
        };
        result.map_err(|e| LoadedModule::trap("factorial", e))
    }

    /// `is_prime(n)`. Any non-zero result is `true`.
    pub fn is_prime(&mut self, n: i32) -> Result<bool> {
        let m = self.ready(Operation::IsPrime)?;
        m.require(Operation::IsPrime)?;
        let Some(f) = m.exports.is_prime.clone() else {
            return Err(missing(m, "is_prime"));
        };
        m.refuel("is_prime")?;
        f.call(&mut m.store, n)
            .map(|r| r != 0)
            .map_err(|e| LoadedModule::trap("is_prime", e))
    }

    /// `fibonacci(n)`, widened to `i64`.
    pub fn fibonacci(&mut self, n: i32) -> Result<i64> {
        let m = self.ready(Operation::Fibonacci)?;
        m.require(Operation::Fibonacci)?;
        m.refuel("fibonacci")?;
        let result = match &m.exports.fibonacci {
            Some(f) => f.call(&mut m.store, n),
            None => return Err(missing(m, "fibonacci")),
        };
        result.map_err(|e| LoadedModule::trap("fibonacci", e))
    }

    /// `greet(name)`: the name-based greeting contract.
    pub fn greet(&mut self, name: &str) -> Result<String> {
        let utf8 = self.config.utf8;
        let layout = self.config.layout.clone();
        let m = self.ready(Operation::Greet)?;
        m.require(Operation::Greet)?;
        m.greet_name(name, &layout, utf8)
    }

    /// `greet(age)`: the age-bracket greeting contract.
    pub fn greet_age(&mut self, age: u32) -> Result<String> {
        let utf8 = self.config.utf8;
        let layout = self.config.layout.clone();
        let m = self.ready(Operation::GreetAge)?;
        m.require(Operation::GreetAge)?;
        m.greet_age(age, &layout, utf8)
    }

    /// `reverseString(input)`.
    pub fn reverse_string(&mut self, input: &str) -> Result<String> {
        let utf8 = self.config.utf8;
        let layout = self.config.layout.clone();
        let m = self.ready(Operation::ReverseString)?;
        m.require(Operation::ReverseString)?;
        m.reverse_string(input, &layout, utf8)
    }

    /// The string convention in effect, if the module exports memory.
    pub fn string_convention(&self) -> Option<StringConvention> {
        self.capabilities().and_then(Capabilities::convention)
    }
}

impl fmt::Debug for WasmAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WasmAdapter")
            .field("state", &self.state)
            .field("module", &self.module_name())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

pub(crate) fn missing(m: &LoadedModule, export: &str) -> BridgeError {
    BridgeError::MissingExport {
        export: export.to_string(),
        module: m.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_adapter_is_unloaded() {
        let adapter = WasmAdapter::with_defaults().expect("Failed to create adapter");
        assert_eq!(adapter.state(), AdapterState::Unloaded);
        assert!(!adapter.is_ready());
        assert!(adapter.available_functions().is_empty());
        assert!(adapter.capabilities().is_none());
    }

    #[test]
    fn calls_before_load_are_not_ready() {
        let mut adapter = WasmAdapter::with_defaults().expect("Failed to create adapter");
        let err = adapter.add(2, 3).unwrap_err();
        assert_eq!(err.code(), "E103");
        assert!(adapter.greet("测试").is_err());
        assert!(adapter.reverse_string("abc").is_err());
        assert_eq!(adapter.state(), AdapterState::Unloaded);
    }

    #[test]
    fn state_display() {
        assert_eq!(AdapterState::Unloaded.to_string(), "unloaded");
        assert_eq!(AdapterState::Failed.to_string(), "failed");
    }
}

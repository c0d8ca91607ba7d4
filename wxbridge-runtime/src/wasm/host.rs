//! Host import environment for WASM modules.
//!
//! The supported modules need nothing from the host beyond an `env`
//! namespace. One optional import is offered so a module can emit
//! diagnostics through the host's log.

use wasmtime::{Caller, Engine, Linker, StoreLimits, StoreLimitsBuilder};
use wxbridge_core::error::{BridgeError, Result};

/// Import namespace offered to modules.
pub const HOST_NAMESPACE: &str = "env";

/// State stored alongside each module instance.
pub struct HostState {
    /// Name of the module, for log context.
    pub module: String,
    /// Resource limits enforced on the instance.
    pub limits: StoreLimits,
    /// Number of messages the module logged through `env.host_log`.
    pub log_count: u64,
}

impl HostState {
    /// Create host state limiting linear memory to `max_memory_bytes`.
    pub fn new(module: impl Into<String>, max_memory_bytes: usize) -> Self {
        Self {
            module: module.into(),
            limits: StoreLimitsBuilder::new()
                .memory_size(max_memory_bytes)
                .instances(1)
                .build(),
            log_count: 0,
        }
    }
}

/// Create a linker with the host functions registered.
pub fn create_linker(engine: &Engine) -> Result<Linker<HostState>> {
    let mut linker = Linker::new(engine);
    register_host_functions(&mut linker)?;
    Ok(linker)
}

/// Register all host functions with a Wasmtime Linker.
pub fn register_host_functions(linker: &mut Linker<HostState>) -> Result<()> {
    // env.host_log(ptr: u32, len: u32)
    // Reads a UTF-8 message from linear memory and logs it at debug level.
    linker
        .func_wrap(
            HOST_NAMESPACE,
            "host_log",
            |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| {
                let memory = match caller.get_export("memory") {
                    Some(wasmtime::Extern::Memory(m)) => m,
                    _ => return,
                };

                let mem_data = memory.data(&caller);
                let Some(bytes) = mem_data.get(ptr as usize..ptr as usize + len as usize) else {
                    tracing::warn!(ptr, len, "host_log called with out-of-bounds message");
                    return;
                };
                let message = String::from_utf8_lossy(bytes).into_owned();

                let state = caller.data_mut();
                state.log_count += 1;
                tracing::debug!(module = %state.module, "{}", message);
            },
        )
        .map_err(|e| BridgeError::Load {
            module: format!("{}::host_log", HOST_NAMESPACE),
            cause: e.to_string(),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmtime::Store;

    #[test]
    fn linker_registers_host_log() {
        let engine = Engine::default();
        let linker = create_linker(&engine).expect("Failed to create linker");
        let mut store = Store::new(&engine, HostState::new("test", 1 << 16));
        assert!(linker.get(&mut store, HOST_NAMESPACE, "host_log").is_some());
    }

    #[test]
    fn host_log_counts_messages() {
        let wat = r#"
            (module
                (import "env" "host_log" (func $log (param i32 i32)))
                (memory (export "memory") 1)
                (data (i32.const 16) "loaded")
                (func (export "run")
                    (call $log (i32.const 16) (i32.const 6))
                    (call $log (i32.const 70000) (i32.const 4))))
        "#;
        let engine = Engine::default();
        let module = wasmtime::Module::new(&engine, wat::parse_str(wat).unwrap()).unwrap();
        let linker = create_linker(&engine).unwrap();
        let mut store = Store::new(&engine, HostState::new("test", 1 << 20));
        store.limiter(|state| &mut state.limits);

        let instance = linker.instantiate(&mut store, &module).unwrap();
        let run = instance
            .get_typed_func::<(), ()>(&mut store, "run")
            .unwrap();
        run.call(&mut store, ()).unwrap();

        // The out-of-bounds message is dropped, not counted.
        assert_eq!(store.data().log_count, 1);
    }
}

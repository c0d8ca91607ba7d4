//! String marshaling protocols.
//!
//! Two conventions move strings across the boundary:
//!
//! - **allocated**: the module's allocator provides the input buffer and
//!   the export returns a pointer to a `{ptr, len}` record describing its
//!   output. The adapter frees both buffers once the output is decoded.
//! - **fixed offset**: the input is written at a pre-agreed offset and the
//!   export returns the output length. The output is found through an
//!   accessor export or a configured constant offset.

use super::adapter::{LoadedModule, missing};
use super::capability::{GreetFn, exports};
use super::host::HostState;
use super::memory::{Allocator, MemoryBridge, WasmPtr};
use wasmtime::{Store, TypedFunc};
use wxbridge_core::config::{FixedOffsetLayout, Utf8Policy};
use wxbridge_core::error::{BridgeError, Result};

/// Where a fixed-offset export leaves its output.
#[derive(Clone)]
enum ResultLocation {
    /// Address returned by an accessor export.
    Accessor(TypedFunc<(), u32>, &'static str),
    /// `base + offset`.
    Offset(u32),
}

impl LoadedModule {
    /// `greet(ptr, len)` under either convention.
    pub(crate) fn greet_name(
        &mut self,
        name: &str,
        layout: &FixedOffsetLayout,
        utf8: Utf8Policy,
    ) -> Result<String> {
        let Some(GreetFn::Name(f)) = self.exports.greet.clone() else {
            return Err(missing(self, "greet"));
        };
        let accessor = self.exports.memory_ptr.clone().map(|a| (a, exports::MEMORY_PTR));
        self.call_string(
            "greet",
            f,
            name,
            layout.greet_input_offset,
            accessor,
            layout,
            utf8,
        )
    }

    /// `reverseString(ptr, len)` under either convention.
    pub(crate) fn reverse_string(
        &mut self,
        input: &str,
        layout: &FixedOffsetLayout,
        utf8: Utf8Policy,
    ) -> Result<String> {
        let Some(f) = self.exports.reverse.clone() else {
            return Err(missing(self, "reverseString"));
        };
        let accessor = self.exports.reversed_ptr.clone().map(|a| (a, exports::REVERSED_PTR));
        self.call_string(
            "reverseString",
            f,
            input,
            layout.reverse_input_offset,
            accessor,
            layout,
            utf8,
        )
    }

    /// `greet(age) -> len`, output behind `getMemoryPtr` or the result offset.
    pub(crate) fn greet_age(
        &mut self,
        age: u32,
        layout: &FixedOffsetLayout,
        utf8: Utf8Policy,
    ) -> Result<String> {
        let Some(GreetFn::Age(f)) = self.exports.greet.clone() else {
            return Err(missing(self, "greet"));
        };
        let age = i32::try_from(age).map_err(|_| BridgeError::InvalidInput {
            field: "age",
            reason: format!("{} does not fit in i32", age),
        })?;
        let bridge = self.bridge()?;
        let location = self.result_location(
            self.exports.memory_ptr.clone().map(|a| (a, exports::MEMORY_PTR)),
            layout,
        )?;

        self.refuel("greet")?;
        let len = f
            .call(&mut self.store, age)
            .map_err(|e| LoadedModule::trap("greet", e))?;
        let offset = self.locate(location)?;

        tracing::trace!(module = %self.name, age, offset, len, "greet(age) returned");
        bridge.read_string(&self.store, WasmPtr::new(offset, len), utf8)
    }

    #[allow(clippy::too_many_arguments)]
    fn call_string(
        &mut self,
        function: &'static str,
        f: TypedFunc<(u32, u32), u32>,
        input: &str,
        input_offset: u32,
        accessor: Option<(TypedFunc<(), u32>, &'static str)>,
        layout: &FixedOffsetLayout,
        utf8: Utf8Policy,
    ) -> Result<String> {
        let bridge = self.bridge()?;
        if self.exports.allocator.is_some() {
            self.call_allocated(function, f, &bridge, input, utf8)
        } else {
            let location = self.result_location(accessor, layout)?;
            self.call_fixed(function, f, &bridge, input, input_offset, location, layout, utf8)
        }
    }

    fn call_allocated(
        &mut self,
        function: &'static str,
        f: TypedFunc<(u32, u32), u32>,
        bridge: &MemoryBridge<HostState>,
        input: &str,
        utf8: Utf8Policy,
    ) -> Result<String> {
        let Some(allocator) = self.exports.allocator.take() else {
            return Err(missing(self, exports::MALLOC));
        };
        let result = self.allocated_round_trip(function, f, bridge, &allocator, input, utf8);
        self.exports.allocator = Some(allocator);
        result
    }

    fn allocated_round_trip(
        &mut self,
        function: &'static str,
        f: TypedFunc<(u32, u32), u32>,
        bridge: &MemoryBridge<HostState>,
        allocator: &Allocator,
        input: &str,
        utf8: Utf8Policy,
    ) -> Result<String> {
        self.refuel(function)?;
        let input_ptr = bridge.copy_to_wasm(&mut self.store, allocator, input.as_bytes())?;

        let called = f
            .call(&mut self.store, (input_ptr.offset, input_ptr.size))
            .map_err(|e| LoadedModule::trap(function, e));
        let record_ptr = match called {
            Ok(ptr) => ptr,
            Err(e) => {
                release(&mut self.store, allocator, input_ptr, function);
                return Err(e);
            }
        };

        let output_ptr = match bridge.read_record(&self.store, record_ptr) {
            Ok(ptr) => ptr,
            Err(e) => {
                release(&mut self.store, allocator, input_ptr, function);
                return Err(e);
            }
        };
        tracing::trace!(
            module = %self.name,
            function,
            input = ?input_ptr,
            output = ?output_ptr,
            "Allocated call returned"
        );

        // Freed in reverse allocation order.
        let output = bridge.read_string(&self.store, output_ptr, utf8);
        release(&mut self.store, allocator, output_ptr, function);
        release(&mut self.store, allocator, input_ptr, function);
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn call_fixed(
        &mut self,
        function: &'static str,
        f: TypedFunc<(u32, u32), u32>,
        bridge: &MemoryBridge<HostState>,
        input: &str,
        input_offset: u32,
        location: ResultLocation,
        layout: &FixedOffsetLayout,
        utf8: Utf8Policy,
    ) -> Result<String> {
        let bytes = input.as_bytes();
        if bytes.len() > layout.region_capacity as usize {
            return Err(BridgeError::InputTooLarge {
                len: bytes.len(),
                capacity: layout.region_capacity,
            });
        }

        self.refuel(function)?;
        let base = self.base_address()?;
        let address = base
            .checked_add(input_offset)
            .ok_or(BridgeError::MemoryBounds {
                offset: base as u64 + input_offset as u64,
                len: bytes.len() as u64,
                memory_size: bridge.size(&self.store) as u64,
            })?;
        let input_ptr = bridge.write_at(&mut self.store, address, bytes)?;

        let len = f
            .call(&mut self.store, (input_ptr.offset, input_ptr.size))
            .map_err(|e| LoadedModule::trap(function, e))?;
        let offset = self.locate(location)?;

        tracing::trace!(
            module = %self.name,
            function,
            input = ?input_ptr,
            offset,
            len,
            "Fixed-offset call returned"
        );
        bridge.read_string(&self.store, WasmPtr::new(offset, len), utf8)
    }

    fn bridge(&self) -> Result<MemoryBridge<HostState>> {
        match self.bridge.as_ref() {
            Some(bridge) => Ok(MemoryBridge::new(*bridge.memory())),
            None => Err(missing(self, exports::MEMORY)),
        }
    }

    /// `getMemoryAddress()`, or 0 when the module does not export it.
    fn base_address(&mut self) -> Result<u32> {
        match self.exports.memory_address.clone() {
            Some(f) => f
                .call(&mut self.store, ())
                .map_err(|e| LoadedModule::trap(exports::MEMORY_ADDRESS, e)),
            None => Ok(0),
        }
    }

    fn result_location(
        &self,
        accessor: Option<(TypedFunc<(), u32>, &'static str)>,
        layout: &FixedOffsetLayout,
    ) -> Result<ResultLocation> {
        match (accessor, layout.result_offset) {
            (Some((f, name)), _) => Ok(ResultLocation::Accessor(f, name)),
            (None, Some(offset)) => Ok(ResultLocation::Offset(offset)),
            (None, None) => Err(missing(self, exports::MEMORY_PTR)),
        }
    }

    fn locate(&mut self, location: ResultLocation) -> Result<u32> {
        match location {
            ResultLocation::Accessor(f, name) => f
                .call(&mut self.store, ())
                .map_err(|e| LoadedModule::trap(name, e)),
            ResultLocation::Offset(offset) => {
                let base = self.base_address()?;
                Ok(base.wrapping_add(offset))
            }
        }
    }
}

/// Free an allocation, logging instead of failing the call.
fn release(
    store: &mut Store<HostState>,
    allocator: &Allocator,
    ptr: WasmPtr,
    function: &str,
) {
    if let Err(e) = allocator.free(store, ptr) {
        tracing::warn!(function, ptr = ?ptr, error = %e, "Failed to free allocation");
    }
}

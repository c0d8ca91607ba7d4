//! Memory bridge for WASM <-> host data transfer.
//!
//! Every access goes through `Memory::data`/`data_mut` on the store, so
//! the view is re-derived per call and stays valid across memory growth.

use super::host::HostState;
use std::ops::Range;
use wasmtime::{Memory, Store, TypedFunc};
use wxbridge_core::config::Utf8Policy;
use wxbridge_core::error::{BridgeError, Result};

/// Size of a `{ptr: u32, len: u32}` result record.
pub const RESULT_RECORD_SIZE: u32 = 8;

/// Alignment passed to allocators that take one. Strings are byte data.
const STRING_ALIGN: u32 = 1;

/// A pointer within WASM linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WasmPtr {
    /// Offset within WASM linear memory.
    pub offset: u32,
    /// Size of the data in bytes.
    pub size: u32,
}

impl WasmPtr {
    /// Create a new WASM pointer.
    pub const fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }

    /// Decode a little-endian `{ptr, len}` record.
    pub fn from_record(record: [u8; RESULT_RECORD_SIZE as usize]) -> Self {
        let offset = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let size = u32::from_le_bytes([record[4], record[5], record[6], record[7]]);
        Self { offset, size }
    }
}

pub(crate) enum MallocFn {
    /// `__wbindgen_malloc(len) -> ptr`
    Len(TypedFunc<u32, u32>),
    /// `__wbindgen_malloc(len, align) -> ptr`
    LenAlign(TypedFunc<(u32, u32), u32>),
}

pub(crate) enum FreeFn {
    /// `__wbindgen_free(ptr, len)`
    PtrLen(TypedFunc<(u32, u32), ()>),
    /// `__wbindgen_free(ptr, len, align)`
    PtrLenAlign(TypedFunc<(u32, u32, u32), ()>),
}

/// The module's exported allocator pair.
pub struct Allocator {
    malloc: MallocFn,
    free: FreeFn,
}

impl Allocator {
    pub(crate) fn new(malloc: MallocFn, free: FreeFn) -> Self {
        Self { malloc, free }
    }

    /// Allocate `size` bytes in linear memory.
    pub fn allocate(&self, store: &mut Store<HostState>, size: u32) -> Result<u32> {
        let result = match &self.malloc {
            MallocFn::Len(f) => f.call(store, size),
            MallocFn::LenAlign(f) => f.call(store, (size, STRING_ALIGN)),
        };
        result.map_err(|e| BridgeError::Allocation {
            requested: size,
            cause: e.to_string(),
        })
    }

    /// Return an allocation to the module.
    ///
    /// Zero-length allocations are freed too; only offset 0, which no
    /// allocator hands out, is skipped.
    pub fn free(&self, store: &mut Store<HostState>, ptr: WasmPtr) -> Result<()> {
        if ptr.offset == 0 {
            return Ok(());
        }

        let result = match &self.free {
            FreeFn::PtrLen(f) => f.call(store, (ptr.offset, ptr.size)),
            FreeFn::PtrLenAlign(f) => f.call(store, (ptr.offset, ptr.size, STRING_ALIGN)),
        };
        result.map_err(|e| BridgeError::Trap {
            function: "__wbindgen_free".to_string(),
            cause: e.to_string(),
        })
    }
}

/// Bridge for memory operations between host and WASM.
pub struct MemoryBridge<T> {
    /// WASM linear memory.
    memory: Memory,
    /// Phantom data for store type.
    _marker: std::marker::PhantomData<T>,
}

impl<T> MemoryBridge<T> {
    /// Create a new memory bridge.
    pub fn new(memory: Memory) -> Self {
        Self {
            memory,
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the WASM memory.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Get the current size of WASM linear memory in bytes.
    pub fn size(&self, store: &Store<T>) -> usize {
        self.memory.data_size(store)
    }

    /// Check `offset..offset + len` against the current memory size.
    pub fn check_range(&self, store: &Store<T>, offset: u32, len: usize) -> Result<Range<usize>> {
        let memory_size = self.size(store);
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= memory_size => Ok(start..end),
            _ => Err(BridgeError::MemoryBounds {
                offset: offset as u64,
                len: len as u64,
                memory_size: memory_size as u64,
            }),
        }
    }

    /// Write bytes to a specific location in WASM memory (without allocation).
    pub fn write_at(&self, store: &mut Store<T>, offset: u32, data: &[u8]) -> Result<WasmPtr> {
        let range = self.check_range(store, offset, data.len())?;
        self.memory.data_mut(store)[range].copy_from_slice(data);
        Ok(WasmPtr::new(offset, data.len() as u32))
    }

    /// Copy bytes from WASM linear memory to host.
    pub fn read_at(&self, store: &Store<T>, ptr: WasmPtr) -> Result<Vec<u8>> {
        if ptr.size == 0 {
            return Ok(Vec::new());
        }
        let range = self.check_range(store, ptr.offset, ptr.size as usize)?;
        Ok(self.memory.data(store)[range].to_vec())
    }

    /// Read a `{ptr, len}` result record.
    pub fn read_record(&self, store: &Store<T>, record_ptr: u32) -> Result<WasmPtr> {
        let range = self.check_range(store, record_ptr, RESULT_RECORD_SIZE as usize)?;
        let mut record = [0u8; RESULT_RECORD_SIZE as usize];
        record.copy_from_slice(&self.memory.data(store)[range]);
        Ok(WasmPtr::from_record(record))
    }

    /// Read a UTF-8 string.
    pub fn read_string(&self, store: &Store<T>, ptr: WasmPtr, policy: Utf8Policy) -> Result<String> {
        let bytes = self.read_at(store, ptr)?;
        decode_utf8(bytes, ptr.offset, policy)
    }
}

impl MemoryBridge<HostState> {
    /// Copy bytes into a fresh allocation from the module's allocator.
    ///
    /// Empty data is allocated as well: guests build slices from the
    /// pointer and must never see 0.
    pub fn copy_to_wasm(
        &self,
        store: &mut Store<HostState>,
        allocator: &Allocator,
        data: &[u8],
    ) -> Result<WasmPtr> {
        let size = u32::try_from(data.len()).map_err(|_| BridgeError::Allocation {
            requested: u32::MAX,
            cause: format!("{} bytes exceed 32-bit linear memory", data.len()),
        })?;
        let offset = allocator.allocate(store, size)?;

        // The allocator may have grown memory; write_at re-checks bounds
        // against the new size.
        match self.write_at(store, offset, data) {
            Ok(ptr) => Ok(ptr),
            Err(e) => {
                let ptr = WasmPtr::new(offset, size);
                if let Err(free_err) = allocator.free(store, ptr) {
                    tracing::warn!(ptr = ?ptr, error = %free_err, "Failed to free allocation");
                }
                Err(e)
            }
        }
    }
}

/// Decode bytes under the given policy.
pub fn decode_utf8(bytes: Vec<u8>, offset: u32, policy: Utf8Policy) -> Result<String> {
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => match policy {
            Utf8Policy::Lossy => Ok(String::from_utf8_lossy(e.as_bytes()).into_owned()),
            Utf8Policy::Strict => Err(BridgeError::Decode {
                offset,
                cause: e.utf8_error().to_string(),
            }),
        },
    }
}

//! Capability descriptor computed once per loaded module.
//!
//! Export probing happens here, at load time. Each known export is
//! looked up by name and accepted only if its signature matches one of
//! the supported shapes; the adapter then consults the descriptor
//! instead of re-checking exports on every call.

use super::host::HostState;
use super::memory::{Allocator, FreeFn, MallocFn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use wasmtime::{Extern, Func, FuncType, Instance, Memory, Store, TypedFunc, ValType};
use wxbridge_core::config::FixedOffsetLayout;
use wxbridge_core::error::{BridgeError, Result};
use wxbridge_core::types::Operation;

/// Export names consumed by the adapter.
pub mod exports {
    /// Linear memory.
    pub const MEMORY: &str = "memory";
    /// Allocator.
    pub const MALLOC: &str = "__wbindgen_malloc";
    /// Deallocator.
    pub const FREE: &str = "__wbindgen_free";
    /// Base address for fixed-offset buffers.
    pub const MEMORY_ADDRESS: &str = "getMemoryAddress";
    /// Result address of `greet`.
    pub const MEMORY_PTR: &str = "getMemoryPtr";
    /// Result address of `reverseString`.
    pub const REVERSED_PTR: &str = "getReversedPtr";
}

/// How strings cross the boundary for this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringConvention {
    /// `__wbindgen_malloc` / `__wbindgen_free`, results as `{ptr, len}` records.
    Allocated,
    /// Pre-agreed offsets, results located by accessor or constant offset.
    FixedOffset {
        /// Whether offsets are relative to `getMemoryAddress()`.
        relative_to_base: bool,
    },
}

impl fmt::Display for StringConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocated => f.write_str("allocated"),
            Self::FixedOffset {
                relative_to_base: true,
            } => f.write_str("fixed-offset (base-relative)"),
            Self::FixedOffset {
                relative_to_base: false,
            } => f.write_str("fixed-offset (absolute)"),
        }
    }
}

/// What a loaded module can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    supported: BTreeSet<Operation>,
    missing: BTreeMap<Operation, &'static str>,
    convention: Option<StringConvention>,
    functions: BTreeSet<String>,
}

impl Capabilities {
    /// Check if an operation can be called.
    pub fn supports(&self, op: Operation) -> bool {
        self.supported.contains(&op)
    }

    /// Supported operations.
    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.supported.iter().copied()
    }

    /// The first export an unsupported operation is missing.
    pub fn missing_export(&self, op: Operation) -> Option<&'static str> {
        self.missing.get(&op).copied()
    }

    /// String convention, or `None` when the module exports no memory.
    pub fn convention(&self) -> Option<StringConvention> {
        self.convention
    }

    /// Names of all callable exports, sorted.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(String::as_str)
    }

    /// Fail with `MissingExport` unless `op` is supported.
    pub fn require(&self, op: Operation, module: &str) -> Result<()> {
        match self.missing.get(&op) {
            None if self.supported.contains(&op) => Ok(()),
            missing => Err(BridgeError::MissingExport {
                export: missing.copied().unwrap_or(op.export_name()).to_string(),
                module: module.to_string(),
            }),
        }
    }
}

/// A numeric export that may return `i32` or `i64`.
#[derive(Clone)]
pub(crate) enum WideFn {
    I32(TypedFunc<i32, i32>),
    I64(TypedFunc<i32, i64>),
}

impl WideFn {
    pub(crate) fn call(&self, store: &mut Store<HostState>, n: i32) -> anyhow::Result<i64> {
        match self {
            Self::I32(f) => f.call(store, n).map(i64::from),
            Self::I64(f) => f.call(store, n),
        }
    }
}

/// The two `greet` contracts.
#[derive(Clone)]
pub(crate) enum GreetFn {
    /// `greet(ptr, len) -> record_ptr | len`
    Name(TypedFunc<(u32, u32), u32>),
    /// `greet(age) -> len`
    Age(TypedFunc<i32, u32>),
}

/// Typed handles to every export the adapter uses.
#[derive(Default)]
pub(crate) struct ResolvedExports {
    pub memory: Option<Memory>,
    pub add: Option<TypedFunc<(i32, i32), i32>>,
    pub multiply: Option<TypedFunc<(i32, i32), i32>>,
    pub factorial: Option<WideFn>,
    pub is_prime: Option<TypedFunc<i32, i32>>,
    pub fibonacci: Option<WideFn>,
    pub greet: Option<GreetFn>,
    pub reverse: Option<TypedFunc<(u32, u32), u32>>,
    pub memory_address: Option<TypedFunc<(), u32>>,
    pub memory_ptr: Option<TypedFunc<(), u32>>,
    pub reversed_ptr: Option<TypedFunc<(), u32>>,
    pub allocator: Option<Allocator>,
}

/// Render a function type as `(i32, i32) -> i32`.
pub fn signature(ty: &FuncType) -> String {
    fn name(v: ValType) -> &'static str {
        match v {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
            ValType::V128 => "v128",
            ValType::Ref(_) => "ref",
        }
    }

    let params: Vec<_> = ty.params().map(name).collect();
    let results: Vec<_> = ty.results().map(name).collect();
    match results.as_slice() {
        [] => format!("({})", params.join(", ")),
        [one] => format!("({}) -> {}", params.join(", "), one),
        many => format!("({}) -> ({})", params.join(", "), many.join(", ")),
    }
}

const SIG_BINARY: &str = "(i32, i32) -> i32";
const SIG_UNARY: &str = "(i32) -> i32";
const SIG_UNARY_WIDE: &str = "(i32) -> i64";
const SIG_ACCESSOR: &str = "() -> i32";
const SIG_FREE: &str = "(i32, i32)";
const SIG_FREE_ALIGN: &str = "(i32, i32, i32)";

/// Exported functions by name, with their rendered signatures.
struct ExportTable {
    module: String,
    funcs: HashMap<String, (Func, String)>,
}

impl ExportTable {
    /// Look up `name` and accept it only with one of the given signatures.
    fn lookup(&self, name: &str, accepted: &[&str]) -> Option<(&Func, &str)> {
        let (func, sig) = self.funcs.get(name)?;
        if accepted.contains(&sig.as_str()) {
            Some((func, sig.as_str()))
        } else {
            tracing::warn!(
                module = %self.module,
                export = name,
                signature = %sig,
                expected = ?accepted,
                "Export has an unsupported signature, treating it as absent"
            );
            None
        }
    }
}

/// Resolve typed exports and compute the capability descriptor.
pub(crate) fn resolve(
    store: &mut Store<HostState>,
    instance: &Instance,
    layout: &FixedOffsetLayout,
) -> (ResolvedExports, Capabilities) {
    let module = store.data().module.clone();
    let externs: Vec<(String, Extern)> = instance
        .exports(&mut *store)
        .map(|export| (export.name().to_string(), export.into_extern()))
        .collect();

    let mut resolved = ResolvedExports::default();
    let mut table = ExportTable {
        module,
        funcs: HashMap::new(),
    };
    for (name, ext) in externs {
        match ext {
            Extern::Func(func) => {
                let sig = signature(&func.ty(&*store));
                table.funcs.insert(name, (func, sig));
            }
            Extern::Memory(memory) if name == exports::MEMORY => resolved.memory = Some(memory),
            _ => {}
        }
    }

    // Signatures are checked by `lookup`, so `typed` cannot fail below.
    let s = &*store;
    resolved.add = table
        .lookup("add", &[SIG_BINARY])
        .and_then(|(f, _)| f.typed(s).ok());
    resolved.multiply = table
        .lookup("multiply", &[SIG_BINARY])
        .and_then(|(f, _)| f.typed(s).ok());
    resolved.is_prime = table
        .lookup("is_prime", &[SIG_UNARY])
        .and_then(|(f, _)| f.typed(s).ok());
    resolved.factorial = wide(s, &table, "factorial");
    resolved.fibonacci = wide(s, &table, "fibonacci");

    resolved.greet = match table.lookup("greet", &[SIG_BINARY, SIG_UNARY]) {
        Some((f, SIG_BINARY)) => f.typed(s).ok().map(GreetFn::Name),
        Some((f, _)) => f.typed(s).ok().map(GreetFn::Age),
        None => None,
    };
    resolved.reverse = table
        .lookup("reverseString", &[SIG_BINARY])
        .and_then(|(f, _)| f.typed(s).ok());

    resolved.memory_address = table
        .lookup(exports::MEMORY_ADDRESS, &[SIG_ACCESSOR])
        .and_then(|(f, _)| f.typed(s).ok());
    resolved.memory_ptr = table
        .lookup(exports::MEMORY_PTR, &[SIG_ACCESSOR])
        .and_then(|(f, _)| f.typed(s).ok());
    resolved.reversed_ptr = table
        .lookup(exports::REVERSED_PTR, &[SIG_ACCESSOR])
        .and_then(|(f, _)| f.typed(s).ok());

    let malloc = match table.lookup(exports::MALLOC, &[SIG_UNARY, SIG_BINARY]) {
        Some((f, SIG_UNARY)) => f.typed(s).ok().map(MallocFn::Len),
        Some((f, _)) => f.typed(s).ok().map(MallocFn::LenAlign),
        None => None,
    };
    let free = match table.lookup(exports::FREE, &[SIG_FREE, SIG_FREE_ALIGN]) {
        Some((f, SIG_FREE)) => f.typed(s).ok().map(FreeFn::PtrLen),
        Some((f, _)) => f.typed(s).ok().map(FreeFn::PtrLenAlign),
        None => None,
    };
    resolved.allocator = match (malloc, free) {
        (Some(malloc), Some(free)) => Some(Allocator::new(malloc, free)),
        (None, None) => None,
        _ => {
            tracing::warn!(
                module = %table.module,
                "Module exports only half of the allocator pair, using fixed offsets"
            );
            None
        }
    };

    let capabilities = describe(&resolved, layout, table.funcs.into_keys().collect());
    (resolved, capabilities)
}

fn wide(store: &Store<HostState>, table: &ExportTable, name: &str) -> Option<WideFn> {
    match table.lookup(name, &[SIG_UNARY, SIG_UNARY_WIDE])? {
        (f, SIG_UNARY) => f.typed(store).ok().map(WideFn::I32),
        (f, _) => f.typed(store).ok().map(WideFn::I64),
    }
}

/// Work out which operations are callable given the resolved exports.
fn describe(
    resolved: &ResolvedExports,
    layout: &FixedOffsetLayout,
    functions: BTreeSet<String>,
) -> Capabilities {
    let convention = resolved.memory.map(|_| {
        if resolved.allocator.is_some() {
            StringConvention::Allocated
        } else {
            StringConvention::FixedOffset {
                relative_to_base: resolved.memory_address.is_some(),
            }
        }
    });
    let constant_result = layout.result_offset.is_some();

    let mut caps = Capabilities {
        supported: BTreeSet::new(),
        missing: BTreeMap::new(),
        convention,
        functions,
    };

    for op in Operation::ALL {
        let missing = match op {
            Operation::Add => resolved.add.is_none().then_some("add"),
            Operation::Multiply => resolved.multiply.is_none().then_some("multiply"),
            Operation::Factorial => resolved.factorial.is_none().then_some("factorial"),
            Operation::IsPrime => resolved.is_prime.is_none().then_some("is_prime"),
            Operation::Fibonacci => resolved.fibonacci.is_none().then_some("fibonacci"),
            Operation::Greet => {
                if !matches!(resolved.greet, Some(GreetFn::Name(_))) {
                    Some("greet")
                } else {
                    string_requirement(
                        convention,
                        resolved.memory_ptr.is_some(),
                        constant_result,
                        exports::MEMORY_PTR,
                    )
                }
            }
            Operation::GreetAge => {
                // The age contract always returns a length; the text sits
                // behind the accessor whatever the string convention.
                if !matches!(resolved.greet, Some(GreetFn::Age(_))) {
                    Some("greet")
                } else if convention.is_none() {
                    Some(exports::MEMORY)
                } else if resolved.memory_ptr.is_none() && !constant_result {
                    Some(exports::MEMORY_PTR)
                } else {
                    None
                }
            }
            Operation::ReverseString => {
                if resolved.reverse.is_none() {
                    Some("reverseString")
                } else {
                    string_requirement(
                        convention,
                        resolved.reversed_ptr.is_some(),
                        constant_result,
                        exports::REVERSED_PTR,
                    )
                }
            }
        };

        match missing {
            Some(export) => {
                caps.missing.insert(op, export);
            }
            None => {
                caps.supported.insert(op);
            }
        }
    }

    caps
}

fn string_requirement(
    convention: Option<StringConvention>,
    has_accessor: bool,
    constant_result: bool,
    accessor: &'static str,
) -> Option<&'static str> {
    match convention {
        None => Some(exports::MEMORY),
        Some(StringConvention::Allocated) => None,
        Some(StringConvention::FixedOffset { .. }) if has_accessor || constant_result => None,
        Some(StringConvention::FixedOffset { .. }) => Some(accessor),
    }
}

//! Common test modules for integration tests.
//!
//! Each builder returns the bytes of a small WAT module that stands in
//! for one of the Mini Program demo builds.

#![allow(dead_code)]

use std::sync::Arc;
use wxbridge_core::config::{AdapterConfig, SessionConfig};
use wxbridge_runtime::wasm::{WasmAdapter, WasmRuntime};
use wxbridge_runtime::PageSession;

/// Reverse `len` UTF-8 bytes at `src` into `dst`, one scalar value at a time.
const REV_UTF8: &str = r#"
    (func $rev_utf8 (param $src i32) (param $len i32) (param $dst i32)
        (local $i i32)
        (local $w i32)
        (local $b i32)
        (block $done
            (loop $next
                (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
                (local.set $b (i32.load8_u (i32.add (local.get $src) (local.get $i))))
                (local.set $w
                    (if (result i32) (i32.lt_u (local.get $b) (i32.const 0x80))
                        (then (i32.const 1))
                        (else
                            (if (result i32) (i32.lt_u (local.get $b) (i32.const 0xE0))
                                (then (i32.const 2))
                                (else
                                    (if (result i32) (i32.lt_u (local.get $b) (i32.const 0xF0))
                                        (then (i32.const 3))
                                        (else (i32.const 4))))))))
                (memory.copy
                    (i32.sub
                        (i32.add (local.get $dst) (local.get $len))
                        (i32.add (local.get $i) (local.get $w)))
                    (i32.add (local.get $src) (local.get $i))
                    (local.get $w))
                (local.set $i (i32.add (local.get $i) (local.get $w)))
                (br $next))))
"#;

fn parse(wat: &str) -> Vec<u8> {
    wat::parse_str(wat).expect("Failed to parse WAT")
}

/// Numeric exports only: add, multiply, factorial (i64), is_prime, fibonacci (i32).
pub fn numeric_module() -> Vec<u8> {
    parse(
        r#"
        (module
            (func (export "add") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.add)
            (func (export "multiply") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.mul)
            (func (export "factorial") (param $n i32) (result i64)
                (local $acc i64)
                (local.set $acc (i64.const 1))
                (block $done
                    (loop $next
                        (br_if $done (i32.le_s (local.get $n) (i32.const 1)))
                        (local.set $acc
                            (i64.mul (local.get $acc) (i64.extend_i32_s (local.get $n))))
                        (local.set $n (i32.sub (local.get $n) (i32.const 1)))
                        (br $next)))
                (local.get $acc))
            (func (export "is_prime") (param $n i32) (result i32)
                (local $i i32)
                (if (i32.lt_s (local.get $n) (i32.const 2))
                    (then (return (i32.const 0))))
                (local.set $i (i32.const 2))
                (block $done
                    (loop $next
                        (br_if $done
                            (i32.gt_s (i32.mul (local.get $i) (local.get $i)) (local.get $n)))
                        (if (i32.eqz (i32.rem_s (local.get $n) (local.get $i)))
                            (then (return (i32.const 0))))
                        (local.set $i (i32.add (local.get $i) (i32.const 1)))
                        (br $next)))
                (i32.const 1))
            (func (export "fibonacci") (param $n i32) (result i32)
                (local $a i32)
                (local $b i32)
                (local $t i32)
                (local.set $b (i32.const 1))
                (block $done
                    (loop $next
                        (br_if $done (i32.le_s (local.get $n) (i32.const 0)))
                        (local.set $t (i32.add (local.get $a) (local.get $b)))
                        (local.set $a (local.get $b))
                        (local.set $b (local.get $t))
                        (local.set $n (i32.sub (local.get $n) (i32.const 1)))
                        (br $next)))
                (local.get $a)))
        "#,
    )
}

/// `add` plus string exports using `__wbindgen_malloc` / `__wbindgen_free`.
///
/// The allocator is a bump pointer that grows memory on demand and
/// rolls back when the most recent allocation is freed, so a host that
/// frees everything keeps memory at one page. Like a wasm-bindgen
/// guest, `greet` and `reverseString` trap on a null input pointer.
pub fn allocated_module() -> Vec<u8> {
    parse(&format!(
        r#"
        (module
            (memory (export "memory") 1)
            (global $heap (mut i32) (i32.const 1024))
            (data (i32.const 32) "Hello, ")
            (func $malloc (export "__wbindgen_malloc") (param $len i32) (param $align i32) (result i32)
                (local $ptr i32)
                (local $need i32)
                (local.set $ptr (global.get $heap))
                (global.set $heap (i32.add (global.get $heap) (local.get $len)))
                (local.set $need
                    (i32.sub (global.get $heap) (i32.mul (memory.size) (i32.const 65536))))
                (if (i32.gt_s (local.get $need) (i32.const 0))
                    (then
                        (if (i32.eq
                                (memory.grow
                                    (i32.add
                                        (i32.div_u (local.get $need) (i32.const 65536))
                                        (i32.const 1)))
                                (i32.const -1))
                            (then unreachable))))
                (local.get $ptr))
            (func (export "__wbindgen_free") (param $ptr i32) (param $len i32) (param $align i32)
                (if (i32.eq (i32.add (local.get $ptr) (local.get $len)) (global.get $heap))
                    (then (global.set $heap (local.get $ptr)))))
            (func $record (param $ptr i32) (param $len i32) (result i32)
                (i32.store (i32.const 16) (local.get $ptr))
                (i32.store (i32.const 20) (local.get $len))
                (i32.const 16))
            {rev}
            (func (export "greet") (param $ptr i32) (param $len i32) (result i32)
                (local $out i32)
                (local $out_len i32)
                (if (i32.eqz (local.get $ptr)) (then unreachable))
                (local.set $out_len (i32.add (local.get $len) (i32.const 8)))
                (local.set $out (call $malloc (local.get $out_len) (i32.const 1)))
                (memory.copy (local.get $out) (i32.const 32) (i32.const 7))
                (memory.copy
                    (i32.add (local.get $out) (i32.const 7))
                    (local.get $ptr)
                    (local.get $len))
                (i32.store8
                    (i32.add (local.get $out) (i32.add (local.get $len) (i32.const 7)))
                    (i32.const 33))
                (call $record (local.get $out) (local.get $out_len)))
            (func (export "add") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.add)
            (func (export "reverseString") (param $ptr i32) (param $len i32) (result i32)
                (local $out i32)
                (if (i32.eqz (local.get $ptr)) (then unreachable))
                (local.set $out (call $malloc (local.get $len) (i32.const 1)))
                (call $rev_utf8 (local.get $ptr) (local.get $len) (local.get $out))
                (call $record (local.get $out) (local.get $len))))
        "#,
        rev = REV_UTF8
    ))
}

/// Fixed-offset string exports, offsets relative to `getMemoryAddress() = 4096`.
///
/// `greet` and `reverseString` trap unless their input sits at
/// `base + 1024` and `base + 2048`.
pub fn fixed_offset_module() -> Vec<u8> {
    parse(&format!(
        r#"
        (module
            (memory (export "memory") 1)
            (data (i32.const 32) "Hello, ")
            (func (export "getMemoryAddress") (result i32) (i32.const 4096))
            (func (export "getMemoryPtr") (result i32) (i32.const 12288))
            (func (export "getReversedPtr") (result i32) (i32.const 16384))
            {rev}
            (func (export "greet") (param $ptr i32) (param $len i32) (result i32)
                (if (i32.ne (local.get $ptr) (i32.const 5120)) (then unreachable))
                (memory.copy (i32.const 12288) (i32.const 32) (i32.const 7))
                (memory.copy (i32.const 12295) (local.get $ptr) (local.get $len))
                (i32.store8 (i32.add (i32.const 12295) (local.get $len)) (i32.const 33))
                (i32.add (local.get $len) (i32.const 8)))
            (func (export "reverseString") (param $ptr i32) (param $len i32) (result i32)
                (if (i32.ne (local.get $ptr) (i32.const 6144)) (then unreachable))
                (call $rev_utf8 (local.get $ptr) (local.get $len) (i32.const 16384))
                (local.get $len)))
        "#,
        rev = REV_UTF8
    ))
}

/// Fixed-offset `reverseString` with absolute offsets and no accessor.
///
/// The output is left at 3072, so it needs a configured result offset.
pub fn compat_module() -> Vec<u8> {
    parse(&format!(
        r#"
        (module
            (memory (export "memory") 1)
            {rev}
            (func (export "reverseString") (param $ptr i32) (param $len i32) (result i32)
                (if (i32.ne (local.get $ptr) (i32.const 2048)) (then unreachable))
                (call $rev_utf8 (local.get $ptr) (local.get $len) (i32.const 3072))
                (local.get $len)))
        "#,
        rev = REV_UTF8
    ))
}

/// `greet(age) -> len` with the text behind `getMemoryPtr`, plus `add`.
pub fn age_greet_module() -> Vec<u8> {
    parse(
        r#"
        (module
            (memory (export "memory") 1)
            (data (i32.const 256) "你好，年轻人！未来属于你们！")
            (data (i32.const 320) "你好，青年朋友！正是拼搏的好时光！")
            (data (i32.const 384) "你好！事业有成，家庭幸福！")
            (data (i32.const 448) "您好！祝您身体健康，万事如意！")
            (func (export "getMemoryPtr") (result i32) (i32.const 3072))
            (func $emit (param $src i32) (param $len i32) (result i32)
                (memory.copy (i32.const 3072) (local.get $src) (local.get $len))
                (local.get $len))
            (func (export "greet") (param $age i32) (result i32)
                (if (i32.lt_s (local.get $age) (i32.const 18))
                    (then (return (call $emit (i32.const 256) (i32.const 42)))))
                (if (i32.lt_s (local.get $age) (i32.const 30))
                    (then (return (call $emit (i32.const 320) (i32.const 51)))))
                (if (i32.lt_s (local.get $age) (i32.const 60))
                    (then (return (call $emit (i32.const 384) (i32.const 39)))))
                (call $emit (i32.const 448) (i32.const 45)))
            (func (export "add") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.add))
        "#,
    )
}

/// Exports that trap, plus a `multiply` that never returns.
pub fn trapping_module() -> Vec<u8> {
    parse(
        r#"
        (module
            (memory (export "memory") 1)
            (func (export "getReversedPtr") (result i32) (i32.const 3072))
            (func (export "add") (param i32 i32) (result i32) unreachable)
            (func (export "fibonacci") (param i32) (result i32) unreachable)
            (func (export "reverseString") (param i32 i32) (result i32) unreachable)
            (func (export "multiply") (param i32 i32) (result i32)
                (loop $spin (br $spin))
                unreachable))
        "#,
    )
}

/// Allocated convention whose `greet` reports whether the heap is back at
/// its base.
///
/// `greet` answers "fresh" when its input landed at the heap base (1024)
/// and "leaked" otherwise. `reverseString` traps on input starting with
/// `!` and otherwise returns an out-of-bounds record.
pub fn heap_check_module() -> Vec<u8> {
    parse(
        r#"
        (module
            (memory (export "memory") 1)
            (global $heap (mut i32) (i32.const 1024))
            (data (i32.const 32) "fresh")
            (data (i32.const 48) "leaked")
            (func (export "__wbindgen_malloc") (param $len i32) (param $align i32) (result i32)
                (local $ptr i32)
                (local.set $ptr (global.get $heap))
                (global.set $heap (i32.add (global.get $heap) (local.get $len)))
                (local.get $ptr))
            (func (export "__wbindgen_free") (param $ptr i32) (param $len i32) (param $align i32)
                (if (i32.eq (i32.add (local.get $ptr) (local.get $len)) (global.get $heap))
                    (then (global.set $heap (local.get $ptr)))))
            (func (export "greet") (param $ptr i32) (param $len i32) (result i32)
                (if (i32.eq (local.get $ptr) (i32.const 1024))
                    (then
                        (i32.store (i32.const 16) (i32.const 32))
                        (i32.store (i32.const 20) (i32.const 5)))
                    (else
                        (i32.store (i32.const 16) (i32.const 48))
                        (i32.store (i32.const 20) (i32.const 6))))
                (i32.const 16))
            (func (export "reverseString") (param $ptr i32) (param $len i32) (result i32)
                (if (i32.eq (i32.load8_u (local.get $ptr)) (i32.const 33))
                    (then unreachable))
                (i32.const 65532)))
        "#,
    )
}

/// One-argument allocator pair and a `greet` returning an out-of-bounds record.
pub fn bad_record_module() -> Vec<u8> {
    parse(
        r#"
        (module
            (memory (export "memory") 1)
            (func (export "__wbindgen_malloc") (param i32) (result i32) (i32.const 1024))
            (func (export "__wbindgen_free") (param i32 i32))
            (func (export "greet") (param i32 i32) (result i32) (i32.const 65532))
            (func (export "add") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.add))
        "#,
    )
}

/// Load `bytes` into a fresh adapter.
pub async fn load_adapter(bytes: Vec<u8>, config: AdapterConfig) -> WasmAdapter {
    let runtime = Arc::new(WasmRuntime::with_defaults().expect("Failed to create runtime"));
    load_adapter_on(runtime, "test.wasm", bytes, config).await
}

/// Load `bytes` as `name` into a fresh adapter on a shared runtime.
pub async fn load_adapter_on(
    runtime: Arc<WasmRuntime>,
    name: &str,
    bytes: Vec<u8>,
    config: AdapterConfig,
) -> WasmAdapter {
    let mut adapter = WasmAdapter::new(runtime, config);
    adapter
        .load_bytes(name, bytes)
        .await
        .expect("Failed to load module");
    adapter
}

/// Load `bytes` into a fresh page session.
pub async fn load_session(bytes: Vec<u8>, config: SessionConfig) -> PageSession {
    let runtime = Arc::new(WasmRuntime::with_defaults().expect("Failed to create runtime"));
    let mut session = PageSession::new(runtime, config);
    session
        .load_bytes("test.wasm", bytes)
        .await
        .expect("Failed to load module");
    session
}

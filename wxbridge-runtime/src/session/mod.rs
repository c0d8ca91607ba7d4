//! Page session: one page's handle on one adapter.
//!
//! The session owns its adapter, bounds `load` with a timeout, validates
//! page input, applies the fallback policy and records the notice the
//! page would show.

pub mod fallback;
mod notice;

pub use notice::{Notice, NoticeKind, titles};

use crate::wasm::{WasmAdapter, WasmRuntime};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use wxbridge_core::config::SessionConfig;
use wxbridge_core::error::{BridgeError, Result};
use wxbridge_core::types::{Computed, Operation};

/// Load status of a page session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No load attempted.
    NotLoaded,
    /// Load in progress.
    Loading,
    /// Module ready.
    Ready,
    /// Load failed or timed out.
    LoadFailed(String),
}

impl SessionStatus {
    /// Status text as shown on the page.
    pub fn label(&self) -> String {
        match self {
            Self::NotLoaded => "未加载".to_string(),
            Self::Loading => "正在加载...".to_string(),
            Self::Ready => "加载成功".to_string(),
            Self::LoadFailed(message) => format!("加载失败: {}", message),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLoaded => f.write_str("not loaded"),
            Self::Loading => f.write_str("loading"),
            Self::Ready => f.write_str("ready"),
            Self::LoadFailed(message) => write!(f, "load failed: {}", message),
        }
    }
}

/// One page's adapter, status and notices.
pub struct PageSession {
    runtime: Arc<WasmRuntime>,
    config: SessionConfig,
    adapter: Option<WasmAdapter>,
    status: SessionStatus,
    degraded: BTreeSet<Operation>,
    last_notice: Option<Notice>,
}

impl PageSession {
    /// Create a session that has not loaded anything.
    pub fn new(runtime: Arc<WasmRuntime>, config: SessionConfig) -> Self {
        Self {
            runtime,
            config,
            adapter: None,
            status: SessionStatus::NotLoaded,
            degraded: BTreeSet::new(),
            last_notice: None,
        }
    }

    /// Create a session with a default runtime and configuration.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(
            Arc::new(WasmRuntime::with_defaults()?),
            SessionConfig::default(),
        ))
    }

    /// Get the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the load status.
    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Check if a ready adapter is available.
    pub fn is_ready(&self) -> bool {
        self.adapter.as_ref().is_some_and(WasmAdapter::is_ready)
    }

    /// The session's adapter, once loaded.
    pub fn adapter(&self) -> Option<&WasmAdapter> {
        self.adapter.as_ref()
    }

    /// Operations that were answered by the local fallback.
    pub fn degraded(&self) -> &BTreeSet<Operation> {
        &self.degraded
    }

    /// Check if an operation has been answered by the fallback.
    pub fn is_degraded(&self, op: Operation) -> bool {
        self.degraded.contains(&op)
    }

    /// The notice of the last action.
    pub fn last_notice(&self) -> Option<&Notice> {
        self.last_notice.as_ref()
    }

    /// Load the module at `path`, bounded by the configured timeout.
    ///
    /// Any previous adapter is replaced. On failure the new adapter is
    /// discarded and the status becomes `LoadFailed`.
    pub async fn load(&mut self, path: &str) -> Result<()> {
        let mut adapter = self.begin_load();
        let result = self.with_timeout(path, adapter.load(path)).await;
        self.finish_load(path, adapter, result)
    }

    /// Load a module from in-memory bytes, bounded by the configured timeout.
    pub async fn load_bytes(&mut self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let mut adapter = self.begin_load();
        let result = self.with_timeout(name, adapter.load_bytes(name, bytes)).await;
        self.finish_load(name, adapter, result)
    }

    fn begin_load(&mut self) -> WasmAdapter {
        self.adapter = None;
        self.degraded.clear();
        self.status = SessionStatus::Loading;
        WasmAdapter::new(Arc::clone(&self.runtime), self.config.adapter.clone())
    }

    async fn with_timeout(
        &self,
        module: &str,
        load: impl Future<Output = Result<()>>,
    ) -> Result<()> {
        let timeout = self.config.load_timeout();
        match tokio::time::timeout(timeout, load).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Load {
                module: module.to_string(),
                cause: format!("timed out after {} ms", timeout.as_millis()),
            }),
        }
    }

    fn finish_load(&mut self, module: &str, adapter: WasmAdapter, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                tracing::info!(
                    module,
                    functions = ?adapter.available_functions(),
                    "Page session ready"
                );
                self.adapter = Some(adapter);
                self.status = SessionStatus::Ready;
                Ok(())
            }
            Err(e) => {
                // A timed-out adapter is still `Loading` and cannot be reused.
                tracing::error!(module, state = %adapter.state(), error = %e, "Page session load failed");
                self.status = SessionStatus::LoadFailed(e.to_string());
                self.notify(Notice::error(titles::LOAD_FAILED));
                Err(e)
            }
        }
    }

    fn notify(&mut self, notice: Notice) {
        self.last_notice = Some(notice);
    }

    fn ready_adapter(&mut self, op: Operation) -> Result<&mut WasmAdapter> {
        if !self.is_ready() {
            self.notify(Notice::error(titles::NOT_LOADED));
            return Err(BridgeError::NotReady {
                operation: op,
                state: self.status.to_string(),
            });
        }
        self.adapter.as_mut().ok_or(BridgeError::NotReady {
            operation: op,
            state: SessionStatus::NotLoaded.to_string(),
        })
    }

    fn reject(&mut self, field: &'static str, reason: String, title: &str) -> BridgeError {
        self.notify(Notice::text(title));
        BridgeError::InvalidInput { field, reason }
    }

    fn call<T>(
        &mut self,
        op: Operation,
        title: &str,
        f: impl FnOnce(&mut WasmAdapter) -> Result<T>,
    ) -> Result<Computed<T>> {
        let adapter = self.ready_adapter(op)?;
        match f(adapter) {
            Ok(value) => {
                self.notify(Notice::success(title));
                Ok(Computed::module(value))
            }
            Err(e) => {
                tracing::warn!(operation = %op, code = e.code(), error = %e, "Call failed");
                self.notify(Notice::error(titles::FAILED));
                Err(e)
            }
        }
    }

    fn call_or_fallback<T>(
        &mut self,
        op: Operation,
        title: &str,
        f: impl FnOnce(&mut WasmAdapter) -> Result<T>,
        fallback: impl FnOnce(&BridgeError) -> T,
    ) -> Result<Computed<T>> {
        let adapter = self.ready_adapter(op)?;
        match f(adapter) {
            Ok(value) => {
                self.notify(Notice::success(title));
                Ok(Computed::module(value))
            }
            Err(e) if self.config.fallback.applies_to(&e) => {
                tracing::warn!(
                    operation = %op,
                    code = e.code(),
                    error = %e,
                    "Module could not answer, using local fallback"
                );
                self.degraded.insert(op);
                self.last_notice = None;
                Ok(Computed::fallback(fallback(&e)))
            }
            Err(e) => {
                tracing::warn!(operation = %op, code = e.code(), error = %e, "Call failed");
                self.notify(Notice::error(titles::FAILED));
                Err(e)
            }
        }
    }

    /// `add` handler.
    pub fn add(&mut self, a: i32, b: i32) -> Result<Computed<i32>> {
        self.call(Operation::Add, titles::COMPUTED, |adapter| adapter.add(a, b))
    }

    /// `multiply` handler.
    pub fn multiply(&mut self, a: i32, b: i32) -> Result<Computed<i32>> {
        self.call(Operation::Multiply, titles::COMPUTED, |adapter| {
            adapter.multiply(a, b)
        })
    }

    /// `factorial` handler. Accepts 0..=20.
    pub fn factorial(&mut self, n: i32) -> Result<Computed<i64>> {
        self.ready_adapter(Operation::Factorial)?;
        if !(0..=20).contains(&n) {
            return Err(self.reject(
                "n",
                format!("factorial input {} is outside 0..=20", n),
                titles::FACTORIAL_RANGE,
            ));
        }
        self.call(Operation::Factorial, titles::COMPUTED, |adapter| {
            adapter.factorial(n)
        })
    }

    /// `is_prime` handler.
    pub fn is_prime(&mut self, n: i32) -> Result<Computed<bool>> {
        self.call(Operation::IsPrime, titles::COMPUTED, |adapter| {
            adapter.is_prime(n)
        })
    }

    /// `fibonacci` handler. Accepts 0..=40.
    pub fn fibonacci(&mut self, n: i32) -> Result<Computed<i64>> {
        self.ready_adapter(Operation::Fibonacci)?;
        if !(0..=40).contains(&n) {
            return Err(self.reject(
                "n",
                format!("fibonacci input {} is outside 0..=40", n),
                titles::FIBONACCI_RANGE,
            ));
        }
        self.call_or_fallback(
            Operation::Fibonacci,
            titles::COMPUTED,
            |adapter| adapter.fibonacci(n),
            |_| fallback::fibonacci(n.unsigned_abs()),
        )
    }

    /// `greet` handler. Rejects a blank name.
    pub fn greet(&mut self, name: &str) -> Result<Computed<String>> {
        self.ready_adapter(Operation::Greet)?;
        if name.trim().is_empty() {
            return Err(self.reject(
                "name",
                "name is blank".to_string(),
                titles::NAME_REQUIRED,
            ));
        }
        self.call_or_fallback(
            Operation::Greet,
            titles::GENERATED,
            |adapter| adapter.greet(name),
            |_| fallback::greet(name),
        )
    }

    /// `greet(age)` handler.
    pub fn greet_age(&mut self, age: u32) -> Result<Computed<String>> {
        self.call_or_fallback(
            Operation::GreetAge,
            titles::GENERATED,
            |adapter| adapter.greet_age(age),
            |err| {
                if err.is_missing_export() {
                    fallback::greet_age(age).to_string()
                } else {
                    fallback::GREET_AGE_ON_ERROR.to_string()
                }
            },
        )
    }

    /// `reverseString` handler.
    pub fn reverse_string(&mut self, input: &str) -> Result<Computed<String>> {
        self.call_or_fallback(
            Operation::ReverseString,
            titles::GENERATED,
            |adapter| adapter.reverse_string(input),
            |_| fallback::reverse(input),
        )
    }
}

impl fmt::Debug for PageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSession")
            .field("status", &self.status)
            .field("adapter", &self.adapter)
            .field("degraded", &self.degraded)
            .field("last_notice", &self.last_notice)
            .finish()
    }
}

//! CLI command implementations.

pub mod call;
pub mod demo;
pub mod exports;
pub mod version;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wxbridge_core::config::SessionConfig;
use wxbridge_runtime::{PageSession, WasmRuntime};

/// Options shared by every command that loads a module.
pub struct SessionOptions {
    /// Session configuration file.
    pub config: Option<PathBuf>,
    /// Package root for `/`-prefixed module paths.
    pub asset_root: Option<PathBuf>,
}

impl SessionOptions {
    /// Read the session configuration, or use defaults.
    pub fn session_config(&self) -> Result<SessionConfig> {
        match &self.config {
            Some(path) => SessionConfig::from_yaml_file(path)
                .with_context(|| format!("Failed to load config {}", path.display())),
            None => Ok(SessionConfig::default()),
        }
    }

    /// Work out the asset root and the package path to load for `module`.
    ///
    /// With `--asset-root`, `module` is a package path. Otherwise it is a
    /// filesystem path and its directory becomes the asset root.
    pub fn locate(&self, config: &mut SessionConfig, module: &str) -> Result<String> {
        if let Some(root) = &self.asset_root {
            config.adapter.asset_root = root.clone();
            return Ok(module.to_string());
        }

        let path = Path::new(module);
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("Not a module file: {}", module))?;
        config.adapter.asset_root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(format!("/{}", file_name))
    }
}

/// Create a session and load `module` into it.
pub async fn open_session(options: &SessionOptions, module: &str) -> Result<PageSession> {
    let mut config = options.session_config()?;
    let package_path = options.locate(&mut config, module)?;

    tracing::info!(module = %module, package_path = %package_path, "Opening page session");

    let runtime = Arc::new(WasmRuntime::with_defaults()?);
    let mut session = PageSession::new(runtime, config);
    session
        .load(&package_path)
        .await
        .with_context(|| format!("Failed to load {}", module))?;
    Ok(session)
}

//! Exports command - list a module's exports and capabilities.

use super::{SessionOptions, open_session};
use anyhow::{Context, Result};
use wxbridge_core::types::Operation;

/// Run the exports command.
pub async fn run(options: &SessionOptions, module: &str) -> Result<()> {
    let session = open_session(options, module).await?;
    let adapter = session.adapter().context("Session has no adapter after load")?;
    let caps = adapter
        .capabilities()
        .context("Adapter has no capabilities after load")?;

    println!("Module: {}", module);
    println!("========={}", "=".repeat(module.len()));
    println!();

    match caps.convention() {
        Some(convention) => println!("String convention: {}", convention),
        None => println!("String convention: none (no exported memory)"),
    }
    if let Some(size) = adapter.memory_size() {
        println!("Linear memory:     {} bytes", size);
    }
    println!();

    println!("Exported functions:");
    for name in adapter.available_functions() {
        println!("  {}", name);
    }
    println!();

    println!("Operations:");
    for op in Operation::ALL {
        if caps.supports(op) {
            println!("  ✓ {}", op);
        } else {
            let missing = caps.missing_export(op).unwrap_or(op.export_name());
            println!("  ✗ {} (missing {})", op, missing);
        }
    }

    Ok(())
}

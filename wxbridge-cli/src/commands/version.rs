//! Version command - show version information.

use anyhow::Result;

/// Version information.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the version command.
pub fn run() -> Result<()> {
    println!("wxbridge - WASM host adapter for Mini Program modules");
    println!();
    println!("Version:     {}", VERSION);
    println!(
        "Platform:    {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    println!();
    println!("Components:");
    println!("  wxbridge-core     Errors, operations, configuration");
    println!("  wxbridge-runtime  Engine, memory marshaling adapter, page sessions");
    println!("  wxbridge-cli      Command-line host");

    Ok(())
}

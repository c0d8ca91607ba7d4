//! Demo command - the page's load-time smoke test.

use super::{SessionOptions, open_session};
use anyhow::{Result, bail};
use wxbridge_runtime::WasmAdapter;

const GREET_SAMPLE: &str = "测试";

/// Run the demo command.
pub async fn run(options: &SessionOptions, module: &str) -> Result<()> {
    let mut failures = 0;
    let mut check = |ok: bool, label: &str| {
        if ok {
            println!("✓ {}", label);
        } else {
            println!("✗ {}", label);
            failures += 1;
        }
    };

    let fresh = WasmAdapter::with_defaults()?;
    check(!fresh.is_ready(), "fresh adapter is not ready");

    let mut session = open_session(options, module).await?;
    check(session.is_ready(), "module loaded");
    println!("  status: {}", session.status().label());

    match session.add(2, 3) {
        Ok(sum) => check(sum.value == 5, &format!("add(2, 3) = {} ({})", sum.value, sum.source)),
        Err(e) => check(false, &format!("add(2, 3) failed: {}", e)),
    }

    match session.greet(GREET_SAMPLE) {
        Ok(greeting) => check(
            greeting.value.contains(GREET_SAMPLE),
            &format!("greet(\"{}\") = {} ({})", GREET_SAMPLE, greeting.value, greeting.source),
        ),
        Err(e) => check(false, &format!("greet(\"{}\") failed: {}", GREET_SAMPLE, e)),
    }

    if failures > 0 {
        bail!("{} demo check(s) failed", failures);
    }
    Ok(())
}

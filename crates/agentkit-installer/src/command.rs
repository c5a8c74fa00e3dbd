use std::process::Command;

use anyhow::{anyhow, Context, Result};
use tracing::info;

/// Runs `argv` to completion, failing with its status and output on a non-zero exit.
pub fn run_install_command(argv: &[String]) -> Result<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("install command must not be empty"))?;
    let context_message = format!("failed to run '{}'", argv.join(" "));

    info!(command = %argv.join(" "), "running install command");
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}

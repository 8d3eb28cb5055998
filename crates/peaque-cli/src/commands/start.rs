//! The `start` command: run a finished build, mirroring its exit code.

use tokio::process::Command;

use crate::cli::StartArgs;
use crate::error::{CliError, Result};
use crate::ui;

pub async fn execute(args: StartArgs) -> Result<()> {
    let base = args
        .base
        .canonicalize()
        .map_err(|_| CliError::FileNotFound(args.base.clone()))?;
    let entry = base.join("dist/main.cjs");
    if !entry.exists() {
        return Err(CliError::Custom(format!(
            "no production build at {} (run `peaque build` first)",
            entry.display()
        )));
    }

    ui::info(&format!("starting {}", entry.display()));
    let status = Command::new("node")
        .arg(&entry)
        .arg("--port")
        .arg(args.port.to_string())
        .current_dir(&base)
        .status()
        .await
        .map_err(|e| CliError::Server(format!("failed to start node: {e}")))?;

    match status.code() {
        Some(0) | None => Ok(()),
        Some(code) => {
            // Mirror the child's exit code.
            std::process::exit(code);
        }
    }
}

//! Post-operation command hooks.
//!
//! A site may configure a command per operation name (`create`, `upload`,
//! ...), typically a static site rebuild. It runs in the background once the
//! operation has succeeded; its output is captured to
//! `<command_output_dir>/<operation>.out` and `.err`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SiteConfig;
use crate::entry::Operation;

/// Start the hook configured for `operation`, if any.
///
/// The request does not wait for the command; the returned handle resolves
/// once it exits.
pub fn spawn_hook(site: &SiteConfig, operation: Operation) -> Option<JoinHandle<()>> {
    let argv = site.commands.get(operation.as_str())?;
    let Some((program, args)) = argv.split_first() else {
        warn!(%operation, "empty command configured, skipping");
        return None;
    };

    let program = program.clone();
    let args = args.to_vec();
    let output_dir = site.command_output_path();
    let working_dir = site.site_location.clone();

    Some(tokio::spawn(async move {
        match run(&program, &args, &working_dir, &output_dir, operation).await {
            Ok(status) if status.success() => {
                info!(%operation, command = %program, "command finished");
            }
            Ok(status) => {
                warn!(%operation, command = %program, %status, "command failed");
            }
            Err(e) => {
                warn!(%operation, command = %program, error = %e, "command could not run");
            }
        }
    }))
}

async fn run(
    program: &str,
    args: &[String],
    working_dir: &Path,
    output_dir: &Path,
    operation: Operation,
) -> Result<std::process::ExitStatus> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let stdout = capture_file(output_dir, operation, "out").await?;
    let stderr = capture_file(output_dir, operation, "err").await?;

    let mut child = tokio::process::Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;

    child.wait().await.context("failed to wait for command")
}

async fn capture_file(dir: &Path, operation: Operation, stream: &str) -> Result<Stdio> {
    let path: PathBuf = dir.join(format!("{operation}.{stream}"));
    let file = tokio::fs::File::create(&path)
        .await
        .with_context(|| format!("failed to create {}", path.display()))?;
    Ok(Stdio::from(file.into_std().await))
}

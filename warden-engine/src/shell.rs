//! External command execution
//!
//! Backend processes and OS teardown tools are run to completion with their
//! output captured, so a failure can be reported with the tool's own
//! diagnostics.

use std::ffi::OsStr;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Error, Result};

/// Result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Whether the command exited with status 0
    pub success: bool,
    /// Exit code, if the command was not killed by a signal
    pub code: Option<i32>,
    /// Stdout followed by stderr
    pub combined: String,
}

/// Run `program` with `args` and capture combined output
///
/// Only a failure to spawn the process is an error; a nonzero exit is
/// reported through [`CommandOutput::success`].
pub async fn exec<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    let args: Vec<S> = args.into_iter().collect();

    log::info!(
        "Shell exec: {} {}",
        program.to_string_lossy(),
        args.iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            Error::Shell(format!(
                "failed to execute {}: {}",
                program.to_string_lossy(),
                e
            ))
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        log::debug!(
            "{} exited with code {}: {}",
            program.to_string_lossy(),
            output.status.code().unwrap_or(-1),
            combined.trim()
        );
    }

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        combined,
    })
}

/// Run a command and turn a nonzero exit into [`Error::Shell`]
pub async fn exec_checked<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref().to_owned();
    let output = exec(&program, args).await?;
    if !output.success {
        return Err(Error::Shell(format!(
            "{} exited with code {}: {}",
            program.to_string_lossy(),
            output.code.unwrap_or(-1),
            output.combined.trim()
        )));
    }
    Ok(())
}

use std::process::{Command, Output, Stdio};

use miette::{Context, IntoDiagnostic, Result};
use tracing::{debug, trace, Level};

pub const YT_DL: &str = "youtube-dl";
pub const YT_DLP: &str = "yt-dlp";

/// Run a program to completion and return its output.
///
/// `stderr` is always kept since error messages are inspected afterwards.
/// `stdout` is thrown away unless debug logging is on, in which case both
/// streams end up in the logs.
///
/// Only failing to start the program is an error, the exit status is left
/// to the caller.
pub fn run_command<F>(program: &str, f: F) -> Result<Output>
where
    F: FnOnce(&mut Command) -> &mut Command,
{
    let verbose = tracing::enabled!(Level::DEBUG);

    let mut cmd = Command::new(program);
    f(&mut cmd)
        .stdin(Stdio::null())
        .stdout(if verbose { Stdio::piped() } else { Stdio::null() })
        .stderr(Stdio::piped());

    debug!("Executing command: {cmd:?}");
    let output = cmd
        .output()
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not run {program}"))?;

    if verbose {
        debug!("{program} exited with {}", output.status);
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            trace!("stdout: {line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            trace!("stderr: {line}");
        }
    }

    Ok(output)
}

/// Whether `<program> --version` runs and succeeds
pub fn is_installed(program: &str) -> bool {
    run_command(program, |cmd| cmd.arg("--version")).is_ok_and(|output| output.status.success())
}

//! Shell command execution in callback style.
//!
//! Each command runs on its own thread and reports back through the
//! completion callback, so `exec()` plugs into the graph through `nfunc`
//! like any other callback-based API.

use std::process::Command;
use std::thread;

use laziness::{nfunc, Callback, Error, Lifted};

/// What a finished command wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

/// A lifted function running its first argument as a shell command.
///
/// A non-zero exit status rejects.
pub fn exec() -> Lifted<String, Output> {
    nfunc(|args: Vec<String>, cb: Callback<Output>| {
        let command = args.into_iter().next().unwrap_or_default();
        tracing::debug!(%command, "spawning command");
        thread::spawn(move || cb.call(run(&command)));
    })
}

/// Run `command` through `sh -c` and collect its output.
fn run(command: &str) -> laziness::Result<Output> {
    let output = Command::new("sh").arg("-c").arg(command).output()?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        tracing::warn!(%command, status = %output.status, "command failed");
        return Err(Error::msg(format!(
            "command `{}` failed with {}: {}",
            command,
            output.status,
            stderr.trim()
        )));
    }

    Ok(Output { stdout, stderr })
}

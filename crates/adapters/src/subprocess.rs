// SPDX-License-Identifier: MIT

//! Subprocess execution helper shared by the git and docker input
//! adapters.

use scaorch_core::{InputFetchCause, SystemError};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Run `cmd` to completion, killing it if `timeout` elapses.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, SystemError> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(SystemError::InputFetchFailed {
            cause: InputFetchCause::NotFound,
            detail: format!("{description} failed: {io_err}"),
        }),
        Err(_elapsed) => Err(SystemError::InputFetchFailed {
            cause: InputFetchCause::Timeout,
            detail: format!("{description} timed out after {}s", timeout.as_secs()),
        }),
    }
}

/// Turn a non-zero exit status into an error, including captured stderr.
pub fn check_status(output: &Output, description: &str) -> Result<(), SystemError> {
    if output.status.success() {
        return Ok(());
    }
    Err(SystemError::InputFetchFailed {
        cause: InputFetchCause::NotFound,
        detail: format!(
            "{description} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
    })
}

// SPDX-License-Identifier: MIT

//! An error carrying a specific process exit code (§6/§7), so a single
//! top-level handler in `main.rs` can decide the process's exit status
//! without every command threading a code back by hand.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Map a daemon-reported error kind onto the exit codes §6 spells out
/// explicitly (`NameTaken` -> 2 on `create-project`, `RunInProgress` -> 3 on
/// `add-input`), falling back to 1 for every other kind.
pub fn exit_code_for(kind: scaorch_core::ErrorKind) -> i32 {
    use scaorch_core::ErrorKind;
    match kind {
        ErrorKind::NameTaken => 2,
        ErrorKind::RunInProgress => 3,
        _ => 1,
    }
}

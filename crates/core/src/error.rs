// SPDX-License-Identifier: MIT

//! The error taxonomy (§7).
//!
//! `ErrorKind` is the wire-level tag (`REST` returns `{"error": "<kind>"}`);
//! `SystemError` is the rich, typed error every component actually returns.
//! Every component-local error type converts into `SystemError` so the CLI
//! and REST/daemon boundary have one place to render a `(kind, detail)`
//! pair, matching §7's propagation policy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The sub-cause of an [`SystemError::InputFetchFailed`] (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFetchCause {
    NotFound,
    AuthRequired,
    Timeout,
    ChecksumMismatch,
}

impl std::fmt::Display for InputFetchCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InputFetchCause::NotFound => "not_found",
            InputFetchCause::AuthRequired => "auth_required",
            InputFetchCause::Timeout => "timeout",
            InputFetchCause::ChecksumMismatch => "checksum_mismatch",
        };
        write!(f, "{s}")
    }
}

/// Wire-level error kind tag (§7), used by REST (`400`/`409`/...) and CLI
/// (non-zero exit code) surfaces. Keep in sync with the taxonomy in §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Validation
    InvalidName,
    UnsafePath,
    UnknownPipeline,
    UnknownGroup,
    InvalidPolicy,
    BadConfig,
    // State
    NameTaken,
    RunInProgress,
    RunNotCancellable,
    IllegalTransition,
    // External
    InputFetchFailed,
    StepFailure,
    WebhookDeliveryFailed,
    ResultExportFailed,
    // Resource
    WorkspaceIoError,
    DatabaseError,
    // Operator
    TimeoutExceeded,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The rich typed error returned by core components.
///
/// Validation and State errors are surfaced synchronously to the caller
/// (§7). External errors are captured into the owning Run rather than
/// propagated as a live exception — components return them as `Result`
/// values so the scheduler can choose to record them instead of unwinding.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("invalid project name: {0}")]
    InvalidName(String),
    #[error("unsafe path component: {0}")]
    UnsafePath(String),
    #[error("unknown pipeline: {0}")]
    UnknownPipeline(String),
    #[error("unknown group {group} for pipeline {pipeline}")]
    UnknownGroup { pipeline: String, group: String },
    #[error("invalid policy document: {0}")]
    InvalidPolicy(String),
    #[error("invalid configuration: {0}")]
    BadConfig(String),

    #[error("project name already taken: {0}")]
    NameTaken(String),
    #[error("project has a run in progress")]
    RunInProgress,
    #[error("run is not cancellable in its current state")]
    RunNotCancellable,
    #[error("illegal run status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("input fetch failed ({cause}): {detail}")]
    InputFetchFailed {
        cause: InputFetchCause,
        detail: String,
    },
    #[error("step {step} failed: {detail}")]
    StepFailure { step: String, detail: String },
    #[error("webhook delivery failed after {attempts} attempts: {detail}")]
    WebhookDeliveryFailed { attempts: u32, detail: String },
    #[error("result export failed: {0}")]
    ResultExportFailed(String),

    #[error("workspace IO error: {0}")]
    WorkspaceIoError(String),
    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("operation timed out after {0:?}")]
    TimeoutExceeded(std::time::Duration),
    #[error("operation cancelled")]
    Cancelled,
}

impl SystemError {
    /// The wire-level tag for this error (§7).
    pub fn kind(&self) -> ErrorKind {
        match self {
            SystemError::InvalidName(_) => ErrorKind::InvalidName,
            SystemError::UnsafePath(_) => ErrorKind::UnsafePath,
            SystemError::UnknownPipeline(_) => ErrorKind::UnknownPipeline,
            SystemError::UnknownGroup { .. } => ErrorKind::UnknownGroup,
            SystemError::InvalidPolicy(_) => ErrorKind::InvalidPolicy,
            SystemError::BadConfig(_) => ErrorKind::BadConfig,
            SystemError::NameTaken(_) => ErrorKind::NameTaken,
            SystemError::RunInProgress => ErrorKind::RunInProgress,
            SystemError::RunNotCancellable => ErrorKind::RunNotCancellable,
            SystemError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            SystemError::InputFetchFailed { .. } => ErrorKind::InputFetchFailed,
            SystemError::StepFailure { .. } => ErrorKind::StepFailure,
            SystemError::WebhookDeliveryFailed { .. } => ErrorKind::WebhookDeliveryFailed,
            SystemError::ResultExportFailed(_) => ErrorKind::ResultExportFailed,
            SystemError::WorkspaceIoError(_) => ErrorKind::WorkspaceIoError,
            SystemError::DatabaseError(_) => ErrorKind::DatabaseError,
            SystemError::TimeoutExceeded(_) => ErrorKind::TimeoutExceeded,
            SystemError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// `{"error": "<kind>", "detail": "..."}` body for the REST surface (§7).
    pub fn to_wire(&self) -> WireError {
        WireError {
            error: self.kind(),
            detail: self.to_string(),
        }
    }
}

/// REST/daemon wire-level error body (§7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub error: ErrorKind,
    pub detail: String,
}

impl From<std::io::Error> for SystemError {
    fn from(e: std::io::Error) -> Self {
        SystemError::WorkspaceIoError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrips_through_wire() {
        let err = SystemError::NameTaken("scan-1".into());
        let wire = err.to_wire();
        assert_eq!(wire.error, ErrorKind::NameTaken);
        assert!(wire.detail.contains("scan-1"));
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RunInProgress).unwrap();
        assert_eq!(json, "\"run_in_progress\"");
    }

    #[test]
    fn io_error_converts_to_workspace_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SystemError = io_err.into();
        assert_eq!(err.kind(), ErrorKind::WorkspaceIoError);
    }
}

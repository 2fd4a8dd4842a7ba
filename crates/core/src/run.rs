// SPDX-License-Identifier: MIT

//! Run entity and its status state machine (§3).

use crate::error::SystemError;
use crate::id::{ProjectId, RunId};
use serde::{Deserialize, Serialize};

/// Status of a [`Run`] (§3).
///
/// Transitions are monotone: `NOT_STARTED -> QUEUED -> RUNNING ->
/// {SUCCESS|FAILURE|STOPPED}`; `STALE` is reachable from `QUEUED` or
/// `RUNNING` only via an explicit operator reset (`MarkStale`, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    NotStarted,
    Queued,
    Running,
    Success,
    Failure,
    Stopped,
    Stale,
}

impl RunStatus {
    /// Terminal statuses per §3: SUCCESS, FAILURE, STOPPED, STALE.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failure | RunStatus::Stopped | RunStatus::Stale
        )
    }

    /// Validate a transition against the monotonicity rule in §3.
    ///
    /// `MarkStale` is permitted from `QUEUED` or `RUNNING` (operator reset);
    /// no other transition out of a terminal state is ever valid — a
    /// terminal status always wins a race against a concurrent `Stop`
    /// (§9 open question, resolved here as "terminal wins").
    pub fn validate_transition(self, to: RunStatus) -> Result<(), SystemError> {
        let allowed = matches!(
            (self, to),
            (RunStatus::NotStarted, RunStatus::Queued)
                | (RunStatus::Queued, RunStatus::Running)
                | (RunStatus::Queued, RunStatus::Stopped)
                | (RunStatus::Queued, RunStatus::Stale)
                | (RunStatus::Running, RunStatus::Success)
                | (RunStatus::Running, RunStatus::Failure)
                | (RunStatus::Running, RunStatus::Stopped)
                | (RunStatus::Running, RunStatus::Stale)
        );
        if allowed {
            Ok(())
        } else {
            Err(SystemError::IllegalTransition {
                from: format!("{self:?}"),
                to: format!("{to:?}"),
            })
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::NotStarted => "NOT_STARTED",
            RunStatus::Queued => "QUEUED",
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failure => "FAILURE",
            RunStatus::Stopped => "STOPPED",
            RunStatus::Stale => "STALE",
        };
        write!(f, "{s}")
    }
}

/// A single execution of a pipeline against a project (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub project_id: ProjectId,
    pub pipeline_name: String,
    pub selected_groups: Vec<String>,
    pub description: String,
    pub status: RunStatus,
    pub task_id: Option<String>,
    pub created_at_ms: u64,
    pub task_start_date_ms: Option<u64>,
    pub task_end_date_ms: Option<u64>,
    pub task_exitcode: Option<i32>,
    pub task_output: Option<String>,
    pub log: String,
    pub current_step: Option<String>,
    pub progress: u8,
    pub resume_from_step: Option<String>,
    /// Set by `Stop(run)`; observed by the engine at step boundaries (§5).
    #[serde(default)]
    pub cancel_requested: bool,
}

impl Run {
    pub fn new(
        id: RunId,
        project_id: ProjectId,
        pipeline_name: impl Into<String>,
        description: impl Into<String>,
        selected_groups: Vec<String>,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id,
            project_id,
            pipeline_name: pipeline_name.into(),
            selected_groups,
            description: description.into(),
            status: RunStatus::NotStarted,
            task_id: None,
            created_at_ms,
            task_start_date_ms: None,
            task_end_date_ms: None,
            task_exitcode: None,
            task_output: None,
            log: String::new(),
            current_step: None,
            progress: 0,
            resume_from_step: None,
            cancel_requested: false,
        }
    }

    /// `execution_time = task_end_date - task_start_date` (§3), in seconds.
    pub fn execution_time_secs(&self) -> Option<u64> {
        match (self.task_start_date_ms, self.task_end_date_ms) {
            (Some(start), Some(end)) if end >= start => Some((end - start) / 1000),
            _ => None,
        }
    }

    pub fn transition(&mut self, to: RunStatus) -> Result<(), SystemError> {
        self.status.validate_transition(to)?;
        self.status = to;
        Ok(())
    }

    pub fn append_log(&mut self, line: &str) {
        if !self.log.is_empty() {
            self.log.push('\n');
        }
        self.log.push_str(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> Run {
        Run::new(
            RunId::new("r1"),
            ProjectId::new("p1"),
            "scan_codebase",
            "Scan codebase",
            vec![],
            1_000,
        )
    }

    #[test]
    fn valid_transitions_follow_the_happy_path() {
        let mut r = run();
        r.transition(RunStatus::Queued).unwrap();
        r.transition(RunStatus::Running).unwrap();
        r.transition(RunStatus::Success).unwrap();
        assert_eq!(r.status, RunStatus::Success);
    }

    #[test]
    fn queued_can_stop_directly() {
        let mut r = run();
        r.transition(RunStatus::Queued).unwrap();
        r.transition(RunStatus::Stopped).unwrap();
        assert_eq!(r.status, RunStatus::Stopped);
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut r = run();
        r.transition(RunStatus::Queued).unwrap();
        r.transition(RunStatus::Running).unwrap();
        r.transition(RunStatus::Failure).unwrap();
        let err = r.transition(RunStatus::Running).unwrap_err();
        assert!(matches!(err, SystemError::IllegalTransition { .. }));
    }

    #[test]
    fn skipping_queued_is_illegal() {
        let mut r = run();
        let err = r.transition(RunStatus::Running).unwrap_err();
        assert!(matches!(err, SystemError::IllegalTransition { .. }));
    }

    #[test]
    fn execution_time_is_none_until_both_timestamps_set() {
        let mut r = run();
        assert_eq!(r.execution_time_secs(), None);
        r.task_start_date_ms = Some(1_000);
        assert_eq!(r.execution_time_secs(), None);
        r.task_end_date_ms = Some(6_000);
        assert_eq!(r.execution_time_secs(), Some(5));
    }

    #[test]
    fn is_terminal_covers_all_four_terminal_statuses() {
        for s in [
            RunStatus::Success,
            RunStatus::Failure,
            RunStatus::Stopped,
            RunStatus::Stale,
        ] {
            assert!(s.is_terminal(), "{s} should be terminal");
        }
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::NotStarted.is_terminal());
    }

    #[test]
    fn mark_stale_allowed_from_queued_and_running() {
        let mut r = run();
        r.transition(RunStatus::Queued).unwrap();
        assert!(r.status.validate_transition(RunStatus::Stale).is_ok());
        r.transition(RunStatus::Running).unwrap();
        assert!(r.status.validate_transition(RunStatus::Stale).is_ok());
    }
}

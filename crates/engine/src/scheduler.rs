// SPDX-License-Identifier: MIT

//! Run Scheduler (C6, §4.5): owns the per-project FIFO queue of runs,
//! enforces at-most-one-RUNNING-per-project, timeouts, cancellation, and
//! notifies the webhook dispatcher on terminal transitions.

use crate::pipeline::{CancellationToken, PipelineEngine, RunOutcome};
use scaorch_core::{Clock, Event, Project, Run, RunStatus, SystemError, WorkspaceLayout};
use scaorch_policy::{PolicyDocument, ProjectAlertInputs};
use scaorch_storage::SharedRepository;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Extra time allowed past `task_timeout` before a run is force-failed
/// (§4.5, §5 grace period).
pub const TIMEOUT_GRACE: Duration = Duration::from_secs(30);

/// The two execution backends (§4.5). Selected process-wide; switching
/// mid-process is unsupported, so there is deliberately no setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionBackend {
    /// The caller's own request context runs the pipeline synchronously.
    Inline,
    /// The run is handed to an external worker pool via a [`JobQueue`].
    Queue,
}

/// Abstracts over the external task queue a `Queue`-backend deployment
/// uses (Redis in the reference deployment, per `rq_redis_*`
/// configuration, §4.8). No network client is implemented here — only
/// the dispatch contract the scheduler needs.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, run_id: &str) -> Result<(), SystemError>;
}

/// In-process stand-in for the queue backend: runs are handed to a
/// bounded channel a worker loop drains. Suitable for a single-process
/// deployment; a Redis-backed `JobQueue` would replace this without
/// changing the scheduler.
pub struct InProcessJobQueue {
    sender: tokio::sync::mpsc::UnboundedSender<String>,
}

impl InProcessJobQueue {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait::async_trait]
impl JobQueue for InProcessJobQueue {
    async fn enqueue(&self, run_id: &str) -> Result<(), SystemError> {
        self.sender
            .send(run_id.to_string())
            .map_err(|e| SystemError::StepFailure {
                step: "enqueue".to_string(),
                detail: e.to_string(),
            })
    }
}

/// Notified on run terminal transitions (§4.5 "webhook triggers"); the
/// real implementation lives in `scaorch-adapters::webhook`, kept
/// generic here so the scheduler doesn't depend on HTTP directly.
#[async_trait::async_trait]
pub trait TerminalNotifier: Send + Sync {
    async fn on_run_terminated(&self, project: &Project, run: &Run, outcome: &RunOutcome);
    async fn on_all_runs_completed(&self, project: &Project);
}

pub struct NoOpTerminalNotifier;

#[async_trait::async_trait]
impl TerminalNotifier for NoOpTerminalNotifier {
    async fn on_run_terminated(&self, _project: &Project, _run: &Run, _outcome: &RunOutcome) {}
    async fn on_all_runs_completed(&self, _project: &Project) {}
}

/// Owns the FIFO-per-project run queue and drives the pipeline engine.
pub struct RunScheduler<C> {
    repository: SharedRepository,
    engine: Arc<PipelineEngine<C>>,
    clock: C,
    backend: ExecutionBackend,
    notifier: Arc<dyn TerminalNotifier>,
    cancellations: parking_lot::Mutex<HashMap<String, CancellationToken>>,
}

impl<C: Clock + 'static> RunScheduler<C> {
    pub fn new(
        repository: SharedRepository,
        engine: Arc<PipelineEngine<C>>,
        clock: C,
        backend: ExecutionBackend,
        notifier: Arc<dyn TerminalNotifier>,
    ) -> Self {
        Self {
            repository,
            engine,
            clock,
            backend,
            notifier,
            cancellations: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> ExecutionBackend {
        self.backend
    }

    /// `Enqueue(run) -> void` (§4.5): transitions `NOT_STARTED -> QUEUED`.
    pub fn enqueue(&self, run_id: &str) -> Result<(), SystemError> {
        self.repository.append(Event::RunTransitioned {
            run_id: scaorch_core::id::RunId::new(run_id),
            to: RunStatus::Queued,
            at_ms: self.clock.epoch_ms(),
        })?;
        Ok(())
    }

    /// `Start(run) -> void` (§4.5): `QUEUED -> RUNNING`. Rejected if the
    /// project already has a `RUNNING` run (at-most-one-per-project,
    /// §4.5) or if `run` itself is not `QUEUED`.
    pub fn start(&self, run_id: &str) -> Result<Run, SystemError> {
        let snapshot = self.repository.snapshot();
        let run = snapshot
            .get_run(&scaorch_core::id::RunId::new(run_id))
            .ok_or_else(|| SystemError::StepFailure {
                step: "start".to_string(),
                detail: format!("unknown run {run_id}"),
            })?
            .clone();
        if run.status != RunStatus::Queued {
            return Err(SystemError::IllegalTransition {
                from: run.status.to_string(),
                to: RunStatus::Running.to_string(),
            });
        }
        let already_running = snapshot
            .runs_for_project(&run.project_id)
            .any(|r| r.id != run.id && r.status == RunStatus::Running);
        if already_running {
            return Err(SystemError::RunInProgress);
        }

        self.repository.append(Event::RunTransitioned {
            run_id: run.id.clone(),
            to: RunStatus::Running,
            at_ms: self.clock.epoch_ms(),
        })?;
        self.cancellations
            .lock()
            .insert(run_id.to_string(), CancellationToken::new());

        let mut started = run;
        started.status = RunStatus::Running;
        Ok(started)
    }

    /// `Stop(run) -> void` (§4.5): cooperative for `RUNNING` (sets the
    /// cancellation flag observed between steps); immediate for `QUEUED`.
    pub fn stop(&self, run_id: &str) -> Result<(), SystemError> {
        let snapshot = self.repository.snapshot();
        let run = snapshot
            .get_run(&scaorch_core::id::RunId::new(run_id))
            .ok_or_else(|| SystemError::StepFailure {
                step: "stop".to_string(),
                detail: format!("unknown run {run_id}"),
            })?;

        match run.status {
            RunStatus::Queued => {
                self.repository.append(Event::RunTransitioned {
                    run_id: run.id.clone(),
                    to: RunStatus::Stopped,
                    at_ms: self.clock.epoch_ms(),
                })?;
                Ok(())
            }
            RunStatus::Running => {
                self.repository.append(Event::RunCancelRequested {
                    run_id: run.id.clone(),
                })?;
                if let Some(token) = self.cancellations.lock().get(run_id) {
                    token.cancel();
                }
                Ok(())
            }
            _ => Err(SystemError::RunNotCancellable),
        }
    }

    /// `Delete(run) -> void` (§4.5): only `NOT_STARTED` or `QUEUED`.
    pub fn delete(&self, run_id: &str) -> Result<(), SystemError> {
        let snapshot = self.repository.snapshot();
        let run = snapshot
            .get_run(&scaorch_core::id::RunId::new(run_id))
            .ok_or_else(|| SystemError::StepFailure {
                step: "delete".to_string(),
                detail: format!("unknown run {run_id}"),
            })?;
        if !matches!(run.status, RunStatus::NotStarted | RunStatus::Queued) {
            return Err(SystemError::RunInProgress);
        }
        self.repository.append(Event::RunTransitioned {
            run_id: run.id.clone(),
            to: RunStatus::Stale,
            at_ms: self.clock.epoch_ms(),
        })?;
        Ok(())
    }

    /// `MarkStale(run) -> void` (§4.5): operator action for orphaned
    /// `RUNNING` rows with no live heartbeat for longer than `grace`.
    pub fn mark_stale_if_orphaned(&self, run_id: &str, last_heartbeat_age: Duration, grace: Duration) -> Result<bool, SystemError> {
        if last_heartbeat_age < grace {
            return Ok(false);
        }
        let snapshot = self.repository.snapshot();
        let run = snapshot
            .get_run(&scaorch_core::id::RunId::new(run_id))
            .ok_or_else(|| SystemError::StepFailure {
                step: "mark_stale".to_string(),
                detail: format!("unknown run {run_id}"),
            })?;
        if run.status != RunStatus::Running {
            return Ok(false);
        }
        self.repository.append(Event::RunTransitioned {
            run_id: run.id.clone(),
            to: RunStatus::Stale,
            at_ms: self.clock.epoch_ms(),
        })?;
        Ok(true)
    }

    /// Run the next `QUEUED` run of `project` (FIFO by `created_at_ms`),
    /// if none is already `RUNNING` (§4.5). No-op if the queue is empty
    /// or a run is already in flight.
    pub async fn drive_project(
        &self,
        project: &Project,
        workspace_location: &std::path::Path,
        policy_document: Option<&PolicyDocument>,
        task_timeout: Duration,
    ) -> Result<Option<RunOutcome>, SystemError> {
        let snapshot = self.repository.snapshot();
        if snapshot
            .runs_for_project(&project.id)
            .any(|r| r.status == RunStatus::Running)
        {
            return Ok(None);
        }
        let mut queued: Vec<Run> = snapshot
            .runs_for_project(&project.id)
            .filter(|r| r.status == RunStatus::Queued)
            .cloned()
            .collect();
        queued.sort_by_key(|r| r.created_at_ms);
        let Some(next) = queued.into_iter().next() else {
            return Ok(None);
        };

        let run = self.start(next.id.as_str())?;
        let layout = WorkspaceLayout::new(workspace_location, project);
        let cancellation = self
            .cancellations
            .lock()
            .get(run.id.as_str())
            .cloned()
            .unwrap_or_default();

        let outcome = tokio::time::timeout(
            task_timeout + TIMEOUT_GRACE,
            self.engine.run_pipeline(
                project,
                &run,
                &layout,
                policy_document,
                ProjectAlertInputs::default(),
                &cancellation,
            ),
        )
        .await;

        let outcome = match outcome {
            Ok(result) => result?,
            Err(_elapsed) => {
                cancellation.cancel();
                self.repository.append(Event::RunFinished {
                    run_id: run.id.clone(),
                    status: RunStatus::Failure,
                    task_exitcode: Some(1),
                    task_end_date_ms: self.clock.epoch_ms(),
                })?;
                RunOutcome {
                    status: RunStatus::Failure,
                    exit_code: Some(1),
                    project_alert: None,
                }
            }
        };

        self.cancellations.lock().remove(run.id.as_str());
        self.notifier.on_run_terminated(project, &run, &outcome).await;

        let still_active = self
            .repository
            .snapshot()
            .runs_for_project(&project.id)
            .any(|r| !r.status.is_terminal());
        if !still_active {
            self.notifier.on_all_runs_completed(project).await;
        }

        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StepRegistry;
    use scaorch_core::id::{ProjectId, RunId};
    use scaorch_core::{FakeClock, RunStatus};
    use scaorch_registry::PipelineRegistry;
    use scaorch_storage::InMemoryRepository;

    fn repo_with_queued_run(project_id: &str, run_id: &str, created_at_ms: u64) -> SharedRepository {
        let repository: SharedRepository = Arc::new(InMemoryRepository::new());
        repository
            .append(Event::ProjectCreated {
                project_id: ProjectId::new(project_id),
                name: "scan-1".to_string(),
                created_at_ms: 0,
            })
            .unwrap();
        repository
            .append(Event::RunCreated {
                run_id: RunId::new(run_id),
                project_id: ProjectId::new(project_id),
                pipeline_name: "scan_codebase".to_string(),
                selected_groups: vec![],
                description: String::new(),
                created_at_ms,
            })
            .unwrap();
        repository
            .append(Event::RunTransitioned {
                run_id: RunId::new(run_id),
                to: RunStatus::Queued,
                at_ms: created_at_ms,
            })
            .unwrap();
        repository
    }

    fn scheduler(repository: SharedRepository) -> RunScheduler<FakeClock> {
        let clock = FakeClock::new(1_000);
        let engine = Arc::new(PipelineEngine::new(
            PipelineRegistry::with_builtins(),
            StepRegistry::with_builtins(),
            repository.clone(),
            clock.clone(),
        ));
        RunScheduler::new(
            repository,
            engine,
            clock,
            ExecutionBackend::Inline,
            Arc::new(NoOpTerminalNotifier),
        )
    }

    #[test]
    fn start_rejects_a_second_running_run_in_the_same_project() {
        let repository = repo_with_queued_run("p1", "r1", 1);
        repository
            .append(Event::RunCreated {
                run_id: RunId::new("r2"),
                project_id: ProjectId::new("p1"),
                pipeline_name: "scan_codebase".to_string(),
                selected_groups: vec![],
                description: String::new(),
                created_at_ms: 2,
            })
            .unwrap();
        repository
            .append(Event::RunTransitioned {
                run_id: RunId::new("r2"),
                to: RunStatus::Queued,
                at_ms: 2,
            })
            .unwrap();

        let scheduler = scheduler(repository);
        scheduler.start("r1").unwrap();
        let err = scheduler.start("r2").unwrap_err();
        assert!(matches!(err, SystemError::RunInProgress));
    }

    #[test]
    fn stop_on_a_queued_run_transitions_immediately_to_stopped() {
        let repository = repo_with_queued_run("p1", "r1", 1);
        let scheduler = scheduler(repository.clone());
        scheduler.stop("r1").unwrap();
        let run = repository
            .snapshot()
            .get_run(&RunId::new("r1"))
            .unwrap()
            .clone();
        assert_eq!(run.status, RunStatus::Stopped);
    }

    #[test]
    fn delete_rejects_a_running_run() {
        let repository = repo_with_queued_run("p1", "r1", 1);
        let scheduler = scheduler(repository);
        scheduler.start("r1").unwrap();
        let err = scheduler.delete("r1").unwrap_err();
        assert!(matches!(err, SystemError::RunInProgress));
    }

    #[tokio::test]
    async fn drive_project_runs_the_oldest_queued_run_first() {
        let repository = repo_with_queued_run("p1", "r-old", 1);
        repository
            .append(Event::RunCreated {
                run_id: RunId::new("r-new"),
                project_id: ProjectId::new("p1"),
                pipeline_name: "scan_codebase".to_string(),
                selected_groups: vec![],
                description: String::new(),
                created_at_ms: 50,
            })
            .unwrap();
        repository
            .append(Event::RunTransitioned {
                run_id: RunId::new("r-new"),
                to: RunStatus::Queued,
                at_ms: 50,
            })
            .unwrap();

        let scheduler = scheduler(repository.clone());
        let project = Project::new(ProjectId::new("p1"), "scan-1", 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        crate::workspace::create_workspace(&WorkspaceLayout::new(dir.path(), &project)).unwrap();

        let outcome = scheduler
            .drive_project(&project, dir.path(), None, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(outcome.is_some());

        let snapshot = repository.snapshot();
        assert_eq!(
            snapshot.get_run(&RunId::new("r-old")).unwrap().status,
            RunStatus::Success
        );
        assert_eq!(
            snapshot.get_run(&RunId::new("r-new")).unwrap().status,
            RunStatus::Queued
        );
    }
}

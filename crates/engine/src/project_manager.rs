// SPDX-License-Identifier: MIT

//! Project Manager (C7, §4.1): the single writer for project-level
//! invariants. All mutation of a project's lifecycle goes through here —
//! composing the Workspace Manager (C1), Input Fetcher (C2), Pipeline
//! Registry (C4), and Run Scheduler (C6) — rather than through the
//! repository directly.

use crate::scheduler::{ExecutionBackend, JobQueue, RunScheduler};
use scaorch_adapters::InputFetcher;
use scaorch_core::id::{IdGen, InputSourceId, ProjectId, RunId};
use scaorch_core::workspace::WorkspaceSubdir;
use scaorch_core::{Clock, Event, FetchAuthConfig, Project, ProjectSettings, Run, RunStatus, SystemError};
use scaorch_policy::PolicyDocument;
use scaorch_registry::PipelineRegistry;
use scaorch_storage::SharedRepository;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One requested project input (§4.1 `CreateProject`/`AddInputs`).
pub enum InputSpec {
    /// A file already on disk (an uploaded file in REST/CLI terms).
    Upload {
        src_path: PathBuf,
        dst_name: String,
        tag: Option<String>,
    },
    /// A URI the Input Fetcher (C2) resolves: `pkg:`, `docker://`, a
    /// `.git` URL, or plain HTTP(S).
    Uri(String),
}

/// One pipeline to attach to a project (§4.1 `CreateProject`/`AddPipeline`).
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub pipeline_name: String,
    pub selected_groups: Vec<String>,
}

/// Everything `CreateProject` accepts beyond the name itself (§4.1).
#[derive(Default)]
pub struct NewProjectRequest {
    pub labels: BTreeSet<String>,
    pub notes: String,
    pub settings: ProjectSettings,
    pub inputs: Vec<InputSpec>,
    pub pipelines: Vec<PipelineRequest>,
    pub execute_now: bool,
}

/// Label/pipeline filters for `FlushProjects` (§4.1).
#[derive(Default)]
pub struct FlushFilters {
    pub labels: Vec<String>,
    pub pipeline_names: Vec<String>,
}

/// One entry of a `BatchCreate` request (§4.1): a CSV row or a directory
/// entry, already resolved to a project name and its inputs by the
/// front end — discovering entries from a `Directory` or `CSV` source and
/// expanding `name_template` is a REST/CLI concern, not this component's.
pub struct BatchEntry {
    pub name: String,
    pub inputs: Vec<InputSpec>,
}

pub struct BatchFailure {
    pub name: String,
    pub error: SystemError,
}

#[derive(Default)]
pub struct BatchCreateOutcome {
    pub created: Vec<Project>,
    pub failures: Vec<BatchFailure>,
}

/// Composes C1/C2/C4/C6 behind the high-level operations §4.1 names.
pub struct ProjectManager<C: Clock + 'static, I: IdGen> {
    repository: SharedRepository,
    registry: Arc<PipelineRegistry>,
    workspace_location: PathBuf,
    clock: C,
    id_gen: I,
    input_fetcher: Arc<dyn InputFetcher>,
    fetch_auth: FetchAuthConfig,
    scheduler: Arc<RunScheduler<C>>,
    job_queue: Option<Arc<dyn JobQueue>>,
    policy_document: Option<Arc<PolicyDocument>>,
    task_timeout: Duration,
}

impl<C: Clock + 'static, I: IdGen> ProjectManager<C, I> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: SharedRepository,
        registry: Arc<PipelineRegistry>,
        workspace_location: PathBuf,
        clock: C,
        id_gen: I,
        input_fetcher: Arc<dyn InputFetcher>,
        fetch_auth: FetchAuthConfig,
        scheduler: Arc<RunScheduler<C>>,
        job_queue: Option<Arc<dyn JobQueue>>,
        policy_document: Option<Arc<PolicyDocument>>,
        task_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            registry,
            workspace_location,
            clock,
            id_gen,
            input_fetcher,
            fetch_auth,
            scheduler,
            job_queue,
            policy_document,
            task_timeout,
        }
    }

    fn layout_for(&self, project: &Project) -> scaorch_core::WorkspaceLayout {
        crate::workspace::layout_for(&self.workspace_location, project)
    }

    fn name_taken(&self, name: &str) -> bool {
        self.repository
            .with_state(|s| s.projects.values().any(|p| p.name == name))
    }

    fn require_project(&self, project_id: &ProjectId) -> Result<Project, SystemError> {
        self.repository
            .snapshot()
            .get_project(project_id)
            .cloned()
            .ok_or_else(|| Self::unknown_project(project_id))
    }

    fn unknown_project(project_id: &ProjectId) -> SystemError {
        SystemError::StepFailure {
            step: "project_manager".to_string(),
            detail: format!("unknown project {project_id}"),
        }
    }

    /// `CreateProject` (§4.1): the project row, workspace directory, input
    /// sources, and pipeline runs are created or none are. Any failure
    /// after the project row is appended rolls the attempt back by
    /// deleting the workspace and appending `ProjectDeleted`, so no
    /// observer ever sees a half-built project.
    pub async fn create_project(
        &self,
        name: &str,
        request: NewProjectRequest,
    ) -> Result<Project, SystemError> {
        if self.name_taken(name) {
            return Err(SystemError::NameTaken(name.to_string()));
        }
        for pipeline in &request.pipelines {
            let descriptor = self.registry.resolve(&pipeline.pipeline_name)?;
            PipelineRegistry::effective_steps(descriptor, &pipeline.selected_groups)?;
        }

        let project_id = ProjectId::new(self.id_gen.next());
        let created_at_ms = self.clock.epoch_ms();
        self.repository.append(Event::ProjectCreated {
            project_id: project_id.clone(),
            name: name.to_string(),
            created_at_ms,
        })?;

        if let Err(e) = self.finish_create_project(&project_id, request).await {
            self.rollback_project(&project_id);
            return Err(e);
        }

        self.require_project(&project_id)
    }

    async fn finish_create_project(
        &self,
        project_id: &ProjectId,
        request: NewProjectRequest,
    ) -> Result<(), SystemError> {
        let project = self.require_project(project_id)?;
        let layout = self.layout_for(&project);
        crate::workspace::create_workspace(&layout)?;

        for input in request.inputs {
            self.apply_input(&project, &layout, input).await?;
        }

        for pipeline in &request.pipelines {
            self.create_run(
                &project,
                &pipeline.pipeline_name,
                pipeline.selected_groups.clone(),
                request.execute_now,
            )
            .await?;
        }

        if !request.labels.is_empty() || !request.notes.is_empty() || !request.settings.is_empty() {
            self.repository.append(Event::ProjectMetadataSet {
                project_id: project_id.clone(),
                labels: request.labels,
                notes: request.notes,
                settings: request.settings,
            })?;
        }
        Ok(())
    }

    fn rollback_project(&self, project_id: &ProjectId) {
        if let Some(project) = self.repository.snapshot().get_project(project_id).cloned() {
            let layout = self.layout_for(&project);
            let _ = crate::workspace::remove_workspace(&layout);
        }
        let _ = self.repository.append(Event::ProjectDeleted {
            project_id: project_id.clone(),
        });
    }

    async fn apply_input(
        &self,
        project: &Project,
        layout: &scaorch_core::WorkspaceLayout,
        input: InputSpec,
    ) -> Result<(), SystemError> {
        let source = match input {
            InputSpec::Upload {
                src_path,
                dst_name,
                tag,
            } => {
                let dest = crate::workspace::copy_file_to_input(layout, &src_path, &dst_name)?;
                let size = std::fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);
                scaorch_adapters::record_uploaded(&dst_name, tag.as_deref().unwrap_or("upload"), size)
            }
            InputSpec::Uri(uri) => {
                let dest_dir = layout.subdir(WorkspaceSubdir::Input);
                self.input_fetcher
                    .fetch(&uri, &dest_dir, &self.fetch_auth)
                    .await?
            }
        };
        self.repository.append(Event::InputAdded {
            project_id: project.id.clone(),
            input_id: InputSourceId::new(self.id_gen.next()),
            filename: source.filename,
            download_url: source.download_url,
            tag: source.tag,
            is_uploaded: source.is_uploaded,
            size: source.size,
        })?;
        Ok(())
    }

    async fn create_run(
        &self,
        project: &Project,
        pipeline_name: &str,
        selected_groups: Vec<String>,
        execute_now: bool,
    ) -> Result<Run, SystemError> {
        let run_id = RunId::new(self.id_gen.next());
        let created_at_ms = self.clock.epoch_ms();
        self.repository.append(Event::RunCreated {
            run_id: run_id.clone(),
            project_id: project.id.clone(),
            pipeline_name: pipeline_name.to_string(),
            selected_groups,
            description: String::new(),
            created_at_ms,
        })?;
        self.scheduler.enqueue(run_id.as_str())?;

        if execute_now {
            match self.scheduler.backend() {
                ExecutionBackend::Inline => {
                    self.scheduler
                        .drive_project(
                            project,
                            &self.workspace_location,
                            self.policy_document.as_deref(),
                            self.task_timeout,
                        )
                        .await?;
                }
                ExecutionBackend::Queue => {
                    if let Some(queue) = &self.job_queue {
                        queue.enqueue(run_id.as_str()).await?;
                    }
                }
            }
        }

        self.require_run(&run_id)
    }

    fn require_run(&self, run_id: &RunId) -> Result<Run, SystemError> {
        self.repository
            .snapshot()
            .get_run(run_id)
            .cloned()
            .ok_or_else(|| SystemError::StepFailure {
                step: "project_manager".to_string(),
                detail: format!("unknown run {run_id}"),
            })
    }

    /// `AddInputs` (§4.1): rejected while the project has any non-terminal
    /// run, to guarantee the codebase a running pipeline sees is stable.
    pub async fn add_inputs(
        &self,
        project_id: &ProjectId,
        inputs: Vec<InputSpec>,
        codebase_copy: bool,
    ) -> Result<(), SystemError> {
        let snapshot = self.repository.snapshot();
        let project = snapshot
            .get_project(project_id)
            .cloned()
            .ok_or_else(|| Self::unknown_project(project_id))?;
        if snapshot.runs_for_project(project_id).any(|r| !r.status.is_terminal()) {
            return Err(SystemError::RunInProgress);
        }
        let layout = self.layout_for(&project);
        for input in inputs {
            self.apply_input(&project, &layout, input).await?;
        }
        if codebase_copy {
            let input_dir = layout.subdir(WorkspaceSubdir::Input);
            if input_dir.exists() {
                crate::workspace::copy_tree_to_codebase(&layout, &input_dir)?;
            }
        }
        Ok(())
    }

    /// `AddPipeline` (§4.1): appended to the project's queue.
    pub async fn add_pipeline(
        &self,
        project_id: &ProjectId,
        pipeline_name: &str,
        selected_groups: Vec<String>,
        execute_now: bool,
    ) -> Result<Run, SystemError> {
        let project = self.require_project(project_id)?;
        let descriptor = self.registry.resolve(pipeline_name)?;
        PipelineRegistry::effective_steps(descriptor, &selected_groups)?;
        self.create_run(&project, pipeline_name, selected_groups, execute_now).await
    }

    /// `ArchiveProject` (§4.1): rejected if any run is `QUEUED` or
    /// `RUNNING`.
    pub fn archive_project(
        &self,
        project_id: &ProjectId,
        remove_input: bool,
        remove_codebase: bool,
        remove_output: bool,
    ) -> Result<(), SystemError> {
        let snapshot = self.repository.snapshot();
        let project = snapshot
            .get_project(project_id)
            .cloned()
            .ok_or_else(|| Self::unknown_project(project_id))?;
        if snapshot
            .runs_for_project(project_id)
            .any(|r| matches!(r.status, RunStatus::Queued | RunStatus::Running))
        {
            return Err(SystemError::RunInProgress);
        }
        self.repository.append(Event::ProjectArchived {
            project_id: project_id.clone(),
            archived_at_ms: self.clock.epoch_ms(),
        })?;
        let layout = self.layout_for(&project);
        if remove_input {
            crate::workspace::remove_subdir(&layout, WorkspaceSubdir::Input)?;
        }
        if remove_codebase {
            crate::workspace::remove_subdir(&layout, WorkspaceSubdir::Codebase)?;
        }
        if remove_output {
            crate::workspace::remove_subdir(&layout, WorkspaceSubdir::Output)?;
        }
        Ok(())
    }

    /// `ResetProject` (§4.1): drops all scan entities and Runs, preserves
    /// `input/` unless `remove_input` is set, and optionally re-creates
    /// the previously-attached pipelines as fresh runs. Rejected while a
    /// run is non-terminal, for the same reproducibility reason as
    /// `AddInputs`.
    pub async fn reset_project(
        &self,
        project_id: &ProjectId,
        remove_input: bool,
        remove_webhook: bool,
        restore_pipelines: bool,
        execute_now: bool,
    ) -> Result<Vec<Run>, SystemError> {
        let snapshot = self.repository.snapshot();
        let project = snapshot
            .get_project(project_id)
            .cloned()
            .ok_or_else(|| Self::unknown_project(project_id))?;
        if snapshot.runs_for_project(project_id).any(|r| !r.status.is_terminal()) {
            return Err(SystemError::RunInProgress);
        }

        let mut previous_pipelines = Vec::new();
        let mut seen = BTreeSet::new();
        for run in snapshot.runs_for_project(project_id) {
            let key = format!("{}|{}", run.pipeline_name, run.selected_groups.join(","));
            if seen.insert(key) {
                previous_pipelines.push((run.pipeline_name.clone(), run.selected_groups.clone()));
            }
        }

        self.repository.append(Event::ProjectReset {
            project_id: project_id.clone(),
        })?;

        let layout = self.layout_for(&project);
        if remove_input {
            crate::workspace::remove_subdir(&layout, WorkspaceSubdir::Input)?;
        }
        crate::workspace::remove_subdir(&layout, WorkspaceSubdir::Codebase)?;
        crate::workspace::remove_subdir(&layout, WorkspaceSubdir::Output)?;

        if remove_webhook {
            self.repository.append(Event::ProjectWebhooksCleared {
                project_id: project_id.clone(),
            })?;
        }

        let mut created_runs = Vec::new();
        if restore_pipelines {
            for (pipeline_name, selected_groups) in previous_pipelines {
                let run = self
                    .create_run(&project, &pipeline_name, selected_groups, execute_now)
                    .await?;
                created_runs.push(run);
            }
        }
        Ok(created_runs)
    }

    /// `DeleteProject` (§4.1): cascade delete of all rows and workspace.
    /// Rejected while a run is `QUEUED` or `RUNNING`.
    pub fn delete_project(&self, project_id: &ProjectId) -> Result<(), SystemError> {
        let snapshot = self.repository.snapshot();
        let project = snapshot
            .get_project(project_id)
            .cloned()
            .ok_or_else(|| Self::unknown_project(project_id))?;
        if snapshot
            .runs_for_project(project_id)
            .any(|r| matches!(r.status, RunStatus::Queued | RunStatus::Running))
        {
            return Err(SystemError::RunInProgress);
        }
        let layout = self.layout_for(&project);
        crate::workspace::remove_workspace(&layout)?;
        self.repository.append(Event::ProjectDeleted {
            project_id: project_id.clone(),
        })?;
        Ok(())
    }

    /// `FlushProjects` (§4.1): deletes every project at least `retain_days`
    /// old matching every label in `filters.labels` and, if
    /// `filters.pipeline_names` is non-empty, having run at least one of
    /// them. Returns the names of the deleted projects.
    pub fn flush_projects(
        &self,
        retain_days: u64,
        filters: &FlushFilters,
    ) -> Result<Vec<String>, SystemError> {
        let snapshot = self.repository.snapshot();
        let now_ms = self.clock.epoch_ms();
        let cutoff_age_ms = retain_days.saturating_mul(86_400_000);

        let candidates: Vec<Project> = snapshot
            .projects
            .values()
            .filter(|p| now_ms.saturating_sub(p.created_at_ms) >= cutoff_age_ms)
            .filter(|p| filters.labels.iter().all(|l| p.labels.contains(l)))
            .filter(|p| {
                filters.pipeline_names.is_empty()
                    || snapshot
                        .runs_for_project(&p.id)
                        .any(|r| filters.pipeline_names.contains(&r.pipeline_name))
            })
            .cloned()
            .collect();

        let mut flushed = Vec::with_capacity(candidates.len());
        for project in candidates {
            self.delete_project(&project.id)?;
            flushed.push(project.name.clone());
        }
        Ok(flushed)
    }

    /// `BatchCreate` (§4.1): one project per entry; partial failure
    /// returns the successful set alongside per-entry errors rather than
    /// aborting the whole batch.
    pub async fn batch_create(
        &self,
        entries: Vec<BatchEntry>,
        pipelines: Vec<PipelineRequest>,
        execute_now: bool,
    ) -> BatchCreateOutcome {
        let mut outcome = BatchCreateOutcome::default();
        for entry in entries {
            let request = NewProjectRequest {
                inputs: entry.inputs,
                pipelines: pipelines.clone(),
                execute_now,
                ..NewProjectRequest::default()
            };
            match self.create_project(&entry.name, request).await {
                Ok(project) => outcome.created.push(project),
                Err(error) => outcome.failures.push(BatchFailure {
                    name: entry.name,
                    error,
                }),
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineEngine, StepRegistry};
    use crate::scheduler::NoOpTerminalNotifier;
    use scaorch_core::{FakeClock, SequentialIdGen};
    use scaorch_storage::InMemoryRepository;

    fn manager(
        input_fetcher: Arc<dyn InputFetcher>,
    ) -> (ProjectManager<FakeClock, SequentialIdGen>, SharedRepository, tempfile::TempDir) {
        let repository: SharedRepository = Arc::new(InMemoryRepository::new());
        let clock = FakeClock::new(1_000);
        let registry = Arc::new(PipelineRegistry::with_builtins());
        let engine = Arc::new(PipelineEngine::new(
            PipelineRegistry::with_builtins(),
            StepRegistry::with_builtins(),
            repository.clone(),
            clock.clone(),
        ));
        let scheduler = Arc::new(RunScheduler::new(
            repository.clone(),
            engine,
            clock.clone(),
            ExecutionBackend::Inline,
            Arc::new(NoOpTerminalNotifier),
        ));
        let dir = tempfile::tempdir().unwrap();
        let manager = ProjectManager::new(
            repository.clone(),
            registry,
            dir.path().to_path_buf(),
            clock,
            SequentialIdGen::new("pm"),
            input_fetcher,
            FetchAuthConfig::default(),
            scheduler,
            None,
            None,
            Duration::from_secs(60),
        );
        (manager, repository, dir)
    }

    fn ok_fetcher() -> Arc<dyn InputFetcher> {
        Arc::new(scaorch_adapters::FakeInputFetcher {
            result: Ok(scaorch_adapters::record_uploaded("dep.json", "auto", 10)),
        })
    }

    fn failing_fetcher() -> Arc<dyn InputFetcher> {
        Arc::new(scaorch_adapters::FakeInputFetcher {
            result: Err("host unreachable".to_string()),
        })
    }

    #[tokio::test]
    async fn create_project_rejects_duplicate_names() {
        let (manager, _repo, _dir) = manager(ok_fetcher());
        manager
            .create_project("scan-1", NewProjectRequest::default())
            .await
            .unwrap();
        let err = manager
            .create_project("scan-1", NewProjectRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SystemError::NameTaken(_)));
    }

    #[tokio::test]
    async fn create_project_creates_the_workspace_directory() {
        let (manager, _repo, dir) = manager(ok_fetcher());
        let project = manager
            .create_project("scan-1", NewProjectRequest::default())
            .await
            .unwrap();
        let layout = crate::workspace::layout_for(dir.path(), &project);
        assert!(layout.subdir(WorkspaceSubdir::Input).is_dir());
    }

    #[tokio::test]
    async fn create_project_rolls_back_on_input_fetch_failure() {
        let (manager, repo, dir) = manager(failing_fetcher());
        let request = NewProjectRequest {
            inputs: vec![InputSpec::Uri("https://example.com/a.zip".to_string())],
            ..Default::default()
        };
        let err = manager.create_project("scan-1", request).await.unwrap_err();
        assert!(matches!(err, SystemError::InputFetchFailed { .. }));

        let snapshot = repo.snapshot();
        assert!(snapshot.projects.values().all(|p| p.name != "scan-1"));
        assert!(!dir.path().join("projects").exists() || std::fs::read_dir(dir.path().join("projects")).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn add_inputs_rejects_while_a_run_is_in_progress() {
        let (manager, _repo, _dir) = manager(ok_fetcher());
        let request = NewProjectRequest {
            pipelines: vec![PipelineRequest {
                pipeline_name: "scan_codebase".to_string(),
                selected_groups: vec![],
            }],
            ..Default::default()
        };
        let project = manager.create_project("scan-1", request).await.unwrap();

        let err = manager
            .add_inputs(&project.id, vec![], false)
            .await
            .unwrap_err();
        assert!(matches!(err, SystemError::RunInProgress));
    }

    #[tokio::test]
    async fn archive_project_rejects_a_queued_run() {
        let (manager, _repo, _dir) = manager(ok_fetcher());
        let project = manager
            .create_project("scan-1", NewProjectRequest::default())
            .await
            .unwrap();
        manager
            .add_pipeline(&project.id, "scan_codebase", vec![], false)
            .await
            .unwrap();

        let err = manager
            .archive_project(&project.id, false, false, false)
            .unwrap_err();
        assert!(matches!(err, SystemError::RunInProgress));
    }

    #[tokio::test]
    async fn delete_project_removes_the_workspace_directory() {
        let (manager, _repo, dir) = manager(ok_fetcher());
        let project = manager
            .create_project("scan-1", NewProjectRequest::default())
            .await
            .unwrap();
        let layout = crate::workspace::layout_for(dir.path(), &project);
        assert!(layout.root.exists());

        manager.delete_project(&project.id).unwrap();
        assert!(!layout.root.exists());
    }

    #[tokio::test]
    async fn flush_projects_deletes_only_projects_older_than_retain_days() {
        let (manager, _repo, _dir) = manager(ok_fetcher());
        manager
            .create_project("scan-old", NewProjectRequest::default())
            .await
            .unwrap();

        let flushed = manager
            .flush_projects(0, &FlushFilters::default())
            .unwrap();
        assert_eq!(flushed, vec!["scan-old".to_string()]);
    }

    #[tokio::test]
    async fn batch_create_reports_partial_failure() {
        let (manager, _repo, _dir) = manager(ok_fetcher());
        let entries = vec![
            BatchEntry {
                name: "scan-a".to_string(),
                inputs: vec![],
            },
            BatchEntry {
                name: "scan-a".to_string(),
                inputs: vec![],
            },
        ];
        let outcome = manager.batch_create(entries, vec![], false).await;
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(outcome.failures[0].error, SystemError::NameTaken(_)));
    }
}

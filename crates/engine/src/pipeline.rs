// SPDX-License-Identifier: MIT

//! Pipeline Engine (C5, §4.4): execute one pipeline instance against one
//! project, step by step, in the declared order.
//!
//! Step bodies are opaque per §1 ("the core treats each step body as an
//! opaque function `step(project_ctx) -> (ok, log_text)`; the scanner
//! library is an external dependency") — this crate supplies the
//! execution framework (ordering, logging, cancellation, failure capture)
//! and a [`StepRegistry`] of named bodies; only the two steps that are
//! genuinely orchestration concerns (copying inputs into the codebase
//! directory, evaluating compliance policy) have real implementations.
//! Everything scanner-shaped is a documented passthrough stub.

use async_trait::async_trait;
use scaorch_core::{Clock, Event, Project, Run, RunStatus, SystemError, WorkspaceLayout};
use scaorch_policy::{Alert, PolicyDocument, ProjectAlertInputs};
use scaorch_registry::{PipelineDescriptor, PipelineRegistry};
use scaorch_storage::SharedRepository;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything a step body needs: the project/run identity, the on-disk
/// workspace, and whatever compliance inputs earlier steps populated.
pub struct StepContext<'a> {
    pub project: &'a Project,
    pub run: &'a Run,
    pub layout: &'a WorkspaceLayout,
    pub policy_document: Option<&'a PolicyDocument>,
    pub policy_inputs: ProjectAlertInputs,
    pub last_project_alert: Option<Alert>,
}

/// One named, opaque pipeline step. Returns the log text to append on
/// success; an `Err` fails the run (§4.4 step 3).
#[async_trait]
pub trait StepBody: Send + Sync {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<String, SystemError>;
}

/// A step whose behavior is delegated to an external scanner/analysis
/// tool the core does not implement (§1 Non-goals). Always succeeds with
/// a log line documenting the delegation, so pipelines exercise the full
/// engine contract without a real scanner present.
pub struct OpaquePassthroughStep {
    pub note: &'static str,
}

#[async_trait]
impl StepBody for OpaquePassthroughStep {
    async fn run(&self, _ctx: &mut StepContext<'_>) -> Result<String, SystemError> {
        Ok(format!("delegated to external scanner: {}", self.note))
    }
}

/// Copies every file under the project's `input/` directory into
/// `codebase/` (a real Workspace Manager operation, unlike the scanner
/// steps around it).
pub struct CopyInputsToCodebaseStep;

#[async_trait]
impl StepBody for CopyInputsToCodebaseStep {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<String, SystemError> {
        let input_dir = ctx.layout.subdir(scaorch_core::workspace::WorkspaceSubdir::Input);
        if !input_dir.exists() {
            return Ok("no inputs to copy".to_string());
        }
        let dest = crate::workspace::copy_tree_to_codebase(ctx.layout, &input_dir)?;
        Ok(format!("copied inputs into {}", dest.display()))
    }
}

/// Evaluates the loaded policy document against whatever compliance
/// inputs (`ctx.policy_inputs`) earlier steps populated (§4.7).
pub struct EvaluatePoliciesStep;

#[async_trait]
impl StepBody for EvaluatePoliciesStep {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<String, SystemError> {
        let Some(policy) = ctx.policy_document else {
            return Ok("no policy document configured, skipping compliance evaluation".to_string());
        };
        let alert = policy.project_alert(&ctx.policy_inputs);
        ctx.last_project_alert = Some(alert);
        Ok(format!("project compliance alert: {alert}"))
    }
}

/// Maps step names (as referenced by [`PipelineDescriptor`]) to their
/// bodies.
pub struct StepRegistry {
    bodies: HashMap<String, Arc<dyn StepBody>>,
}

impl StepRegistry {
    pub fn empty() -> Self {
        Self {
            bodies: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, body: Arc<dyn StepBody>) {
        self.bodies.insert(name.into(), body);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn StepBody>> {
        self.bodies.get(name)
    }

    /// The step bodies for the two built-in pipelines (§4.4, `scan_codebase`
    /// and `load_inventory`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "copy_inputs_to_codebase_directory",
            Arc::new(CopyInputsToCodebaseStep),
        );
        registry.register(
            "extract_archives",
            Arc::new(OpaquePassthroughStep {
                note: "archive extraction",
            }),
        );
        registry.register(
            "collect_and_create_codebase_resources",
            Arc::new(OpaquePassthroughStep {
                note: "codebase resource collection",
            }),
        );
        registry.register(
            "scan_for_application_packages",
            Arc::new(OpaquePassthroughStep {
                note: "application package detection",
            }),
        );
        registry.register(
            "scan_for_vulnerabilities",
            Arc::new(OpaquePassthroughStep {
                note: "vulnerability scanning",
            }),
        );
        registry.register(
            "find_vulnerabilities_by_scorecard",
            Arc::new(OpaquePassthroughStep {
                note: "scorecard-based vulnerability discovery",
            }),
        );
        registry.register("evaluate_policies", Arc::new(EvaluatePoliciesStep));
        registry.register(
            "load_inventory_from_toolkit_scan",
            Arc::new(OpaquePassthroughStep {
                note: "toolkit scan inventory import",
            }),
        );
        registry
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Cooperative cancellation flag checked between steps (§4.4, §5). Cloned
/// and shared with whatever sets it (`Run Scheduler`'s `Stop`, §4.5).
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs one pipeline instance to completion (or failure/cancellation).
pub struct PipelineEngine<C> {
    registry: PipelineRegistry,
    steps: StepRegistry,
    repository: SharedRepository,
    clock: C,
}

impl<C: Clock> PipelineEngine<C> {
    pub fn new(
        registry: PipelineRegistry,
        steps: StepRegistry,
        repository: SharedRepository,
        clock: C,
    ) -> Self {
        Self {
            registry,
            steps,
            repository,
            clock,
        }
    }

    /// Execute `run` against `project`, appending progress/log/terminal
    /// events to the repository as it goes (§4.4). `resume_from_step`, if
    /// set on the run, skips every step before it (honored only on
    /// explicit retry per §4.4).
    pub async fn run_pipeline(
        &self,
        project: &Project,
        run: &Run,
        layout: &WorkspaceLayout,
        policy_document: Option<&PolicyDocument>,
        policy_inputs: ProjectAlertInputs,
        cancellation: &CancellationToken,
    ) -> Result<RunOutcome, SystemError> {
        let descriptor = self
            .registry
            .resolve(&run.pipeline_name)?
            .clone();
        let effective = PipelineRegistry::effective_steps(&descriptor, &run.selected_groups)?;

        let steps: Vec<_> = match &run.resume_from_step {
            Some(from) => {
                let start = effective
                    .iter()
                    .position(|s| s.name == *from)
                    .unwrap_or(0);
                effective[start..].to_vec()
            }
            None => effective,
        };
        let of_total = steps.len() as u32;

        let mut ctx = StepContext {
            project,
            run,
            layout,
            policy_document,
            policy_inputs,
            last_project_alert: None,
        };

        for (index, step) in steps.iter().enumerate() {
            if cancellation.is_cancelled() {
                self.repository.append(Event::RunFinished {
                    run_id: run.id.clone(),
                    status: RunStatus::Stopped,
                    task_exitcode: Some(1),
                    task_end_date_ms: self.clock.epoch_ms(),
                })?;
                return Ok(RunOutcome {
                    status: RunStatus::Stopped,
                    exit_code: Some(1),
                    project_alert: ctx.last_project_alert,
                });
            }

            self.repository.append(Event::RunStepStarted {
                run_id: run.id.clone(),
                step: step.name.clone(),
                index: index as u32,
                of_total,
            })?;

            let body = match self.steps.get(&step.name) {
                Some(body) => body.clone(),
                None => {
                    let detail = format!("no step body registered for {:?}", step.name);
                    self.repository.append(Event::RunLogAppended {
                        run_id: run.id.clone(),
                        line: detail.clone(),
                    })?;
                    self.repository.append(Event::RunFinished {
                        run_id: run.id.clone(),
                        status: RunStatus::Failure,
                        task_exitcode: Some(1),
                        task_end_date_ms: self.clock.epoch_ms(),
                    })?;
                    return Ok(RunOutcome {
                        status: RunStatus::Failure,
                        exit_code: Some(1),
                        project_alert: ctx.last_project_alert,
                    });
                }
            };

            match body.run(&mut ctx).await {
                Ok(log_text) => {
                    self.repository.append(Event::RunLogAppended {
                        run_id: run.id.clone(),
                        line: log_text,
                    })?;
                    self.repository.append(Event::RunStepCompleted {
                        run_id: run.id.clone(),
                        step: step.name.clone(),
                        elapsed_ms: 0,
                    })?;
                }
                Err(e) => {
                    self.repository.append(Event::RunLogAppended {
                        run_id: run.id.clone(),
                        line: format!("step {} failed: {e}", step.name),
                    })?;
                    self.repository.append(Event::RunFinished {
                        run_id: run.id.clone(),
                        status: RunStatus::Failure,
                        task_exitcode: Some(1),
                        task_end_date_ms: self.clock.epoch_ms(),
                    })?;
                    return Ok(RunOutcome {
                        status: RunStatus::Failure,
                        exit_code: Some(1),
                        project_alert: ctx.last_project_alert,
                    });
                }
            }
        }

        self.repository.append(Event::RunFinished {
            run_id: run.id.clone(),
            status: RunStatus::Success,
            task_exitcode: Some(0),
            task_end_date_ms: self.clock.epoch_ms(),
        })?;
        Ok(RunOutcome {
            status: RunStatus::Success,
            exit_code: Some(0),
            project_alert: ctx.last_project_alert,
        })
    }
}

/// What a pipeline run ended up doing (§4.4 step 4).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub project_alert: Option<Alert>,
}

// SPDX-License-Identifier: MIT

//! scaorch-engine: the Workspace Manager (C1), Pipeline Engine (C5), Run
//! Scheduler (C6), and Project Manager (C7) — everything that turns a
//! `Repository`-backed event log into running pipelines against an
//! on-disk workspace.

pub mod export;
pub mod pipeline;
pub mod project_manager;
pub mod scheduler;
pub mod workspace;

pub use export::{ExportDocument, ExportFormat, ExportRegistry, JsonResultExporter, ResultExporter};
pub use pipeline::{
    CancellationToken, CopyInputsToCodebaseStep, EvaluatePoliciesStep, OpaquePassthroughStep,
    PipelineEngine, RunOutcome, StepBody, StepContext, StepRegistry,
};
pub use project_manager::{
    BatchCreateOutcome, BatchEntry, BatchFailure, FlushFilters, InputSpec, NewProjectRequest,
    PipelineRequest, ProjectManager,
};
pub use scheduler::{
    ExecutionBackend, InProcessJobQueue, JobQueue, NoOpTerminalNotifier, RunScheduler,
    TerminalNotifier, TIMEOUT_GRACE,
};

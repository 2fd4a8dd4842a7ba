// SPDX-License-Identifier: MIT

//! The CLI <-> daemon request/response contract (§6): one `Request`
//! variant per operation the CLI surface or REST surface exposes, and
//! the matching `Response`. Only the wire shape lives here; argument
//! parsing and output rendering are `scaorch-cli` concerns.

use scaorch_core::{ErrorKind, Project, Run, WireError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpecWire {
    /// Absolute path to a file already on disk (uploaded input).
    pub upload_path: Option<String>,
    pub dst_name: Option<String>,
    pub tag: Option<String>,
    /// A `pkg:`/`docker://`/git/HTTP(S) URI the daemon's Input Fetcher resolves.
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRequestWire {
    pub pipeline_name: String,
    pub selected_groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NewProjectWire {
    pub labels: Vec<String>,
    pub notes: String,
    pub settings: BTreeMap<String, serde_json::Value>,
    pub inputs: Vec<InputSpecWire>,
    pub pipelines: Vec<PipelineRequestWire>,
    pub execute_now: bool,
    /// Subscribe the new project to the process-wide `global_webhook`
    /// (§4.8 `GlobalWebhookConfig`), unless the caller opted out (CLI
    /// `--no-global-webhook`).
    pub create_global_webhook: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlushFiltersWire {
    pub labels: Vec<String>,
    pub pipeline_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntryWire {
    pub name: String,
    pub inputs: Vec<InputSpecWire>,
}

/// One request the daemon accepts over the IPC socket (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Ping,
    CreateProject {
        name: String,
        request: NewProjectWire,
    },
    AddInputs {
        project_id: String,
        inputs: Vec<InputSpecWire>,
        codebase_copy: bool,
    },
    AddPipeline {
        project_id: String,
        pipeline_name: String,
        selected_groups: Vec<String>,
        execute_now: bool,
    },
    AddWebhook {
        project_id: String,
        target_url: String,
        trigger_on_each_run: bool,
        include_summary: bool,
        include_results: bool,
    },
    Execute {
        project_id: String,
    },
    ShowPipeline,
    Status {
        project_id: String,
    },
    ListProject,
    ListPipeline,
    Output {
        project_id: String,
        format: String,
    },
    Report {
        project_id: String,
    },
    CheckCompliance {
        project_id: String,
    },
    VerifyProject {
        project_id: String,
    },
    ArchiveProject {
        project_id: String,
        remove_input: bool,
        remove_codebase: bool,
        remove_output: bool,
    },
    ResetProject {
        project_id: String,
        remove_input: bool,
        remove_webhook: bool,
        restore_pipelines: bool,
        execute_now: bool,
    },
    DeleteProject {
        project_id: String,
    },
    FlushProjects {
        retain_days: u64,
        filters: FlushFiltersWire,
    },
    BatchCreate {
        entries: Vec<BatchEntryWire>,
        pipelines: Vec<PipelineRequestWire>,
        execute_now: bool,
        create_global_webhook: bool,
    },
    CreateUser {
        username: String,
    },
    Shutdown,
}

/// Summary of a project's runs, used by `Status` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub project: Project,
    pub runs: Vec<Run>,
}

/// Wire form of a [`scaorch_registry::StepDescriptor`] (§6 `show_pipeline`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepWire {
    pub name: String,
    pub group: Option<String>,
}

/// Wire form of a [`scaorch_registry::PipelineDescriptor`] (§6
/// `show_pipeline`/`list_pipeline`) — the descriptor itself only derives
/// `Deserialize` on its steps (manifests are read, not sent back out), so
/// the daemon re-shapes it here for the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInfoWire {
    pub name: String,
    pub summary: String,
    pub steps: Vec<StepWire>,
    pub is_addon: bool,
}

impl From<&scaorch_registry::PipelineDescriptor> for PipelineInfoWire {
    fn from(descriptor: &scaorch_registry::PipelineDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            summary: descriptor.summary.clone(),
            steps: descriptor
                .steps
                .iter()
                .map(|s| StepWire {
                    name: s.name.clone(),
                    group: s.group.clone(),
                })
                .collect(),
            is_addon: descriptor.is_addon,
        }
    }
}

/// A freshly minted API key, returned once by `create-user` (§6 CLI surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub api_key: String,
}

/// The daemon's response to a [`Request`] (§6, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Project(Project),
    Projects(Vec<Project>),
    Run(Run),
    Runs(Vec<Run>),
    Status(ProjectStatus),
    Pipelines(Vec<PipelineInfoWire>),
    /// An exported document (§6 `output`/`results_download`). Every
    /// exporter this crate implements produces UTF-8 text (JSON today);
    /// a binary format would need a different wire representation.
    Document {
        content_type: String,
        data: String,
    },
    Alert(scaorch_policy::Alert),
    Counts(scaorch_storage::ScanEntityCounts),
    Flushed(Vec<String>),
    BatchCreated {
        created: Vec<Project>,
        failures: Vec<BatchEntryFailureWire>,
    },
    User(NewUser),
    Ack,
    Error(WireError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntryFailureWire {
    pub name: String,
    pub error: ErrorKind,
    pub detail: String,
}

impl Response {
    pub fn from_error(error: &scaorch_core::SystemError) -> Self {
        Response::Error(error.to_wire())
    }
}

// SPDX-License-Identifier: MIT

//! Event types for the write-ahead log (§9 "event-sourced" design note).
//!
//! Serializes as `{"type": "domain:verb", ...fields}`. `MaterializedState`
//! (in `scaorch-storage`) replays these to derive current state; every
//! handler for these events must be idempotent since WAL replay may apply
//! the same event more than once after a crash.

use crate::id::{
    InputSourceId, ProjectId, RunId, WebhookDeliveryId, WebhookSubscriptionId,
};
use crate::run::RunStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "project:created")]
    ProjectCreated {
        project_id: ProjectId,
        name: String,
        created_at_ms: u64,
    },

    #[serde(rename = "project:archived")]
    ProjectArchived {
        project_id: ProjectId,
        archived_at_ms: u64,
    },

    #[serde(rename = "project:reset")]
    ProjectReset { project_id: ProjectId },

    #[serde(rename = "project:deleted")]
    ProjectDeleted { project_id: ProjectId },

    /// Labels/notes/settings supplied to `CreateProject` (§4.1), applied
    /// as a follow-up event rather than folded into `ProjectCreated` so
    /// existing readers of that event are unaffected.
    #[serde(rename = "project:metadata_set")]
    ProjectMetadataSet {
        project_id: ProjectId,
        labels: std::collections::BTreeSet<String>,
        notes: String,
        settings: crate::project::ProjectSettings,
    },

    /// Emitted by `ResetProject(remove_webhook = true)` (§4.1).
    #[serde(rename = "project:webhooks_cleared")]
    ProjectWebhooksCleared { project_id: ProjectId },

    #[serde(rename = "input:added")]
    InputAdded {
        project_id: ProjectId,
        input_id: InputSourceId,
        filename: String,
        download_url: Option<String>,
        tag: String,
        is_uploaded: bool,
        size: u64,
    },

    #[serde(rename = "run:created")]
    RunCreated {
        run_id: RunId,
        project_id: ProjectId,
        pipeline_name: String,
        selected_groups: Vec<String>,
        description: String,
        created_at_ms: u64,
    },

    #[serde(rename = "run:transitioned")]
    RunTransitioned {
        run_id: RunId,
        to: RunStatus,
        at_ms: u64,
    },

    #[serde(rename = "run:step_started")]
    RunStepStarted {
        run_id: RunId,
        step: String,
        index: u32,
        of_total: u32,
    },

    #[serde(rename = "run:step_completed")]
    RunStepCompleted {
        run_id: RunId,
        step: String,
        elapsed_ms: u64,
    },

    #[serde(rename = "run:log_appended")]
    RunLogAppended { run_id: RunId, line: String },

    #[serde(rename = "run:cancel_requested")]
    RunCancelRequested { run_id: RunId },

    #[serde(rename = "run:finished")]
    RunFinished {
        run_id: RunId,
        status: RunStatus,
        task_exitcode: Option<i32>,
        task_end_date_ms: u64,
    },

    #[serde(rename = "webhook:subscribed")]
    WebhookSubscribed {
        subscription_id: WebhookSubscriptionId,
        project_id: ProjectId,
        target_url: String,
        trigger_on_each_run: bool,
        include_summary: bool,
        include_results: bool,
        created_at_ms: u64,
    },

    #[serde(rename = "webhook:delivered")]
    WebhookDelivered {
        delivery_id: WebhookDeliveryId,
        subscription_id: WebhookSubscriptionId,
        run_id: Option<RunId>,
        sent_at_ms: u64,
        response_status: Option<u16>,
        response_body: String,
        attempt: u32,
        succeeded: bool,
    },
}

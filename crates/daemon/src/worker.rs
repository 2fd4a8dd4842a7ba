// SPDX-License-Identifier: MIT

//! Queue-mode worker loop (§4.5 `Queue` backend): drains run IDs enqueued
//! by `ProjectManager`/`JobQueue` and drives each run's project forward.
//!
//! `JobQueue::enqueue` only carries a run ID; `RunScheduler::drive_project`
//! picks the oldest `QUEUED` run of a project itself, so the worker's job
//! is just resolving run ID -> project and calling it.

use crate::runtime::Runtime;
use scaorch_core::id::RunId;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

pub async fn run(mut receiver: UnboundedReceiver<String>, runtime: Arc<Runtime>) {
    while let Some(run_id) = receiver.recv().await {
        let project = runtime.repository.with_state(|state| {
            state
                .get_run(&RunId::new(run_id.clone()))
                .and_then(|run| state.get_project(&run.project_id))
                .cloned()
        });
        let Some(project) = project else {
            tracing::warn!(run_id = %run_id, "queued run references an unknown project; dropping");
            continue;
        };
        let outcome = runtime
            .scheduler
            .drive_project(
                &project,
                &runtime.config.workspace_location,
                runtime.policy_document.as_deref(),
                runtime.config.task_timeout,
            )
            .await;
        if let Err(e) = outcome {
            tracing::error!(run_id = %run_id, error = %e, "queue worker failed to drive project");
        }
    }
    tracing::info!("queue worker loop exiting: sender dropped");
}

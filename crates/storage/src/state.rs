// SPDX-License-Identifier: MIT

//! Materialized state derived from WAL replay.

use scaorch_core::id::{ProjectId, RunId};
use scaorch_core::{Event, InputSource, Project, Run, WebhookDelivery, WebhookSubscription};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Scan-result aggregate counts for a project (§3 "bulk count queries for
/// summaries" over `CodebaseResource`/`DiscoveredPackage`/
/// `DiscoveredDependency`/`CodebaseRelation`), the minimal rollup a
/// report/output surface needs without interpreting row contents.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScanEntityCounts {
    pub package_count: u64,
    pub dependency_count: u64,
    pub resource_count: u64,
    pub relation_count: u64,
}

/// State derived by folding every WAL [`Event`] in sequence order.
///
/// # Idempotency
///
/// Every handler here must be idempotent: replaying the same event twice
/// (after a crash between "event flushed" and "processed_seq advanced")
/// must leave the state identical to applying it once. Handlers therefore
/// assign (`=`) rather than accumulate, and guard push-style mutations with
/// existence checks.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub projects: HashMap<String, Project>,
    pub runs: HashMap<String, Run>,
    pub input_sources: HashMap<String, Vec<InputSource>>,
    pub webhook_subscriptions: HashMap<String, WebhookSubscription>,
    pub webhook_deliveries: Vec<WebhookDelivery>,
    pub scan_entity_counts: HashMap<String, ScanEntityCounts>,
}

impl MaterializedState {
    pub fn get_project(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.get(id.as_str())
    }

    pub fn get_run(&self, id: &RunId) -> Option<&Run> {
        self.runs.get(id.as_str())
    }

    pub fn runs_for_project<'a>(&'a self, project_id: &'a ProjectId) -> impl Iterator<Item = &'a Run> {
        self.runs
            .values()
            .filter(move |r| r.project_id == *project_id)
    }

    /// Apply a single event, deriving the resulting state change.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::ProjectCreated {
                project_id,
                name,
                created_at_ms,
            } => {
                if !self.projects.contains_key(project_id.as_str()) {
                    if let Ok(project) = Project::new(project_id.clone(), name, *created_at_ms) {
                        self.projects.insert(project_id.as_str().to_string(), project);
                    }
                }
            }
            Event::ProjectArchived {
                project_id,
                archived_at_ms,
            } => {
                if let Some(p) = self.projects.get_mut(project_id.as_str()) {
                    p.is_archived = true;
                    p.archived_at_ms = Some(*archived_at_ms);
                }
            }
            Event::ProjectReset { project_id } => {
                self.runs.retain(|_, r| r.project_id != *project_id);
                self.input_sources.remove(project_id.as_str());
                self.scan_entity_counts.remove(project_id.as_str());
            }
            Event::ProjectDeleted { project_id } => {
                self.projects.remove(project_id.as_str());
                self.runs.retain(|_, r| r.project_id != *project_id);
                self.input_sources.remove(project_id.as_str());
                self.scan_entity_counts.remove(project_id.as_str());
                self.webhook_subscriptions
                    .retain(|_, s| s.project_id != *project_id);
            }
            Event::ProjectMetadataSet {
                project_id,
                labels,
                notes,
                settings,
            } => {
                if let Some(p) = self.projects.get_mut(project_id.as_str()) {
                    p.labels = labels.clone();
                    p.notes = notes.clone();
                    p.settings = settings.clone();
                }
            }
            Event::ProjectWebhooksCleared { project_id } => {
                self.webhook_subscriptions
                    .retain(|_, s| s.project_id != *project_id);
            }
            Event::InputAdded {
                project_id,
                filename,
                download_url,
                tag,
                is_uploaded,
                size,
                ..
            } => {
                let inputs = self
                    .input_sources
                    .entry(project_id.as_str().to_string())
                    .or_default();
                if !inputs.iter().any(|i| i.filename == *filename) {
                    inputs.push(InputSource {
                        filename: filename.clone(),
                        download_url: download_url.clone(),
                        tag: tag.clone(),
                        is_uploaded: *is_uploaded,
                        size: *size,
                    });
                }
            }
            Event::RunCreated {
                run_id,
                project_id,
                pipeline_name,
                selected_groups,
                description,
                created_at_ms,
            } => {
                if !self.runs.contains_key(run_id.as_str()) {
                    self.runs.insert(
                        run_id.as_str().to_string(),
                        Run::new(
                            run_id.clone(),
                            project_id.clone(),
                            pipeline_name.clone(),
                            description.clone(),
                            selected_groups.clone(),
                            *created_at_ms,
                        ),
                    );
                }
            }
            Event::RunTransitioned { run_id, to, at_ms } => {
                if let Some(run) = self.runs.get_mut(run_id.as_str()) {
                    if run.status != *to {
                        let _ = run.transition(*to);
                        match to {
                            scaorch_core::RunStatus::Running => {
                                run.task_start_date_ms.get_or_insert(*at_ms);
                            }
                            s if s.is_terminal() => {
                                run.task_end_date_ms.get_or_insert(*at_ms);
                            }
                            _ => {}
                        }
                    }
                }
            }
            Event::RunStepStarted {
                run_id,
                step,
                index,
                of_total,
            } => {
                if let Some(run) = self.runs.get_mut(run_id.as_str()) {
                    run.current_step = Some(step.clone());
                    run.progress = if *of_total == 0 {
                        0
                    } else {
                        ((*index as f64 / *of_total as f64) * 100.0) as u8
                    };
                }
            }
            Event::RunStepCompleted { run_id, step, .. } => {
                if let Some(run) = self.runs.get_mut(run_id.as_str()) {
                    run.append_log(&format!("step completed: {step}"));
                }
            }
            Event::RunLogAppended { run_id, line } => {
                if let Some(run) = self.runs.get_mut(run_id.as_str()) {
                    run.append_log(line);
                }
            }
            Event::RunCancelRequested { run_id } => {
                if let Some(run) = self.runs.get_mut(run_id.as_str()) {
                    run.cancel_requested = true;
                }
            }
            Event::RunFinished {
                run_id,
                status,
                task_exitcode,
                task_end_date_ms,
            } => {
                if let Some(run) = self.runs.get_mut(run_id.as_str()) {
                    if run.status != *status {
                        let _ = run.transition(*status);
                    }
                    run.task_exitcode = *task_exitcode;
                    run.task_end_date_ms.get_or_insert(*task_end_date_ms);
                    run.progress = 100;
                }
            }
            Event::WebhookSubscribed {
                subscription_id,
                project_id,
                target_url,
                trigger_on_each_run,
                include_summary,
                include_results,
                created_at_ms,
            } => {
                self.webhook_subscriptions
                    .entry(subscription_id.as_str().to_string())
                    .or_insert_with(|| WebhookSubscription {
                        id: subscription_id.clone(),
                        project_id: project_id.clone(),
                        target_url: target_url.clone(),
                        trigger_on_each_run: *trigger_on_each_run,
                        include_summary: *include_summary,
                        include_results: *include_results,
                        is_active: true,
                        created_at_ms: *created_at_ms,
                    });
            }
            Event::WebhookDelivered {
                delivery_id,
                subscription_id,
                run_id,
                sent_at_ms,
                response_status,
                response_body,
                attempt,
                succeeded,
            } => {
                if !self
                    .webhook_deliveries
                    .iter()
                    .any(|d| d.id == *delivery_id)
                {
                    self.webhook_deliveries.push(WebhookDelivery {
                        id: delivery_id.clone(),
                        subscription_id: subscription_id.clone(),
                        run_id: run_id.clone(),
                        sent_at_ms: *sent_at_ms,
                        response_status: *response_status,
                        response_body: WebhookDelivery::truncate_body(response_body),
                        attempt: *attempt,
                        succeeded: *succeeded,
                    });
                }
            }
        }
    }

    /// Fold a full event stream, in order, into a fresh state (startup
    /// recovery from a WAL with no prior checkpoint).
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut state = Self::default();
        for event in events {
            state.apply_event(event);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaorch_core::RunStatus;

    fn pid(n: u64) -> ProjectId {
        ProjectId::new(format!("p{n}"))
    }

    #[test]
    fn project_created_is_idempotent() {
        let mut state = MaterializedState::default();
        let event = Event::ProjectCreated {
            project_id: pid(1),
            name: "scan-1".to_string(),
            created_at_ms: 10,
        };
        state.apply_event(&event);
        state.apply_event(&event);
        assert_eq!(state.projects.len(), 1);
    }

    #[test]
    fn run_lifecycle_replays_in_order() {
        let mut state = MaterializedState::default();
        let run_id = RunId::new("r1");
        state.apply_event(&Event::ProjectCreated {
            project_id: pid(1),
            name: "scan-1".to_string(),
            created_at_ms: 0,
        });
        state.apply_event(&Event::RunCreated {
            run_id: run_id.clone(),
            project_id: pid(1),
            pipeline_name: "scan_codebase".to_string(),
            selected_groups: vec![],
            description: String::new(),
            created_at_ms: 1,
        });
        state.apply_event(&Event::RunTransitioned {
            run_id: run_id.clone(),
            to: RunStatus::Queued,
            at_ms: 2,
        });
        state.apply_event(&Event::RunTransitioned {
            run_id: run_id.clone(),
            to: RunStatus::Running,
            at_ms: 3,
        });
        state.apply_event(&Event::RunFinished {
            run_id: run_id.clone(),
            status: RunStatus::Success,
            task_exitcode: Some(0),
            task_end_date_ms: 9,
        });

        let run = state.get_run(&run_id).unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.task_start_date_ms, Some(3));
        assert_eq!(run.task_end_date_ms, Some(9));
        assert_eq!(run.progress, 100);
    }

    #[test]
    fn project_deleted_removes_its_runs_and_inputs() {
        let mut state = MaterializedState::default();
        state.apply_event(&Event::ProjectCreated {
            project_id: pid(1),
            name: "scan-1".to_string(),
            created_at_ms: 0,
        });
        state.apply_event(&Event::RunCreated {
            run_id: RunId::new("r1"),
            project_id: pid(1),
            pipeline_name: "scan_codebase".to_string(),
            selected_groups: vec![],
            description: String::new(),
            created_at_ms: 1,
        });
        state.apply_event(&Event::ProjectDeleted { project_id: pid(1) });

        assert!(state.get_project(&pid(1)).is_none());
        assert!(state.runs_for_project(&pid(1)).next().is_none());
    }

    #[test]
    fn webhook_delivery_is_deduplicated_by_id() {
        let mut state = MaterializedState::default();
        let event = Event::WebhookDelivered {
            delivery_id: scaorch_core::id::WebhookDeliveryId::new("d1"),
            subscription_id: scaorch_core::id::WebhookSubscriptionId::new("s1"),
            run_id: None,
            sent_at_ms: 1,
            response_status: Some(200),
            response_body: "ok".to_string(),
            attempt: 1,
            succeeded: true,
        };
        state.apply_event(&event);
        state.apply_event(&event);
        assert_eq!(state.webhook_deliveries.len(), 1);
    }

    #[test]
    fn replay_folds_an_event_stream_from_scratch() {
        let events = vec![
            Event::ProjectCreated {
                project_id: pid(1),
                name: "scan-1".to_string(),
                created_at_ms: 0,
            },
            Event::ProjectArchived {
                project_id: pid(1),
                archived_at_ms: 5,
            },
        ];
        let state = MaterializedState::replay(events.iter());
        assert!(state.get_project(&pid(1)).unwrap().is_archived);
    }
}

// SPDX-License-Identifier: MIT

//! Wires the Run Scheduler's terminal-transition hook to the webhook
//! dispatcher (C8, §4.6): looks up a project's active subscriptions,
//! builds the payload, sends it, then records every delivery attempt.

use async_trait::async_trait;
use scaorch_adapters::{WebhookPayload, WebhookSender};
use scaorch_core::{Event, Project, Run};
use scaorch_engine::{ExportRegistry, RunOutcome, TerminalNotifier};
use scaorch_storage::SharedRepository;
use std::sync::Arc;

/// Appends `Event::WebhookDelivered` for every attempt a [`WebhookSender`]
/// reports, so delivery history survives in the WAL the same way every
/// other mutation does (§4.6 "every attempt is recorded").
pub struct WebhookTerminalNotifier {
    repository: SharedRepository,
    sender: Arc<dyn WebhookSender>,
    exporters: Arc<ExportRegistry>,
}

impl WebhookTerminalNotifier {
    pub fn new(
        repository: SharedRepository,
        sender: Arc<dyn WebhookSender>,
        exporters: Arc<ExportRegistry>,
    ) -> Self {
        Self {
            repository,
            sender,
            exporters,
        }
    }

    async fn notify(&self, project: &Project, run: Option<&Run>, status: &str) {
        let subscriptions: Vec<_> = self.repository.with_state(|s| {
            s.webhook_subscriptions
                .values()
                .filter(|sub| sub.project_id == project.id && sub.is_active)
                .filter(|sub| run.is_none() || sub.trigger_on_each_run)
                .cloned()
                .collect()
        });
        if subscriptions.is_empty() {
            return;
        }

        let runs: Vec<Run> = run.cloned().into_iter().collect();
        let summary = serde_json::json!({
            "project": project.name,
            "status": status,
        });
        let results = self
            .exporters
            .resolve(&scaorch_engine::ExportFormat::Json)
            .ok()
            .and_then(|_| {
                scaorch_engine::JsonResultExporter
                    .export_value(project, &runs)
                    .ok()
            });

        let payload = WebhookPayload {
            run_id: run.map(|r| r.id.as_str().to_string()).unwrap_or_default(),
            project_id: project.id.as_str().to_string(),
            status: status.to_string(),
            summary: Some(summary),
            results,
        };

        for subscription in &subscriptions {
            let deliveries = self
                .sender
                .send(subscription, run.map(|r| r.id.as_str()), &payload)
                .await;
            for delivery in deliveries {
                let _ = self.repository.append(Event::WebhookDelivered {
                    delivery_id: delivery.id,
                    subscription_id: delivery.subscription_id,
                    run_id: delivery.run_id,
                    sent_at_ms: delivery.sent_at_ms,
                    response_status: delivery.response_status,
                    response_body: delivery.response_body,
                    attempt: delivery.attempt,
                    succeeded: delivery.succeeded,
                });
            }
        }
    }
}

#[async_trait]
impl TerminalNotifier for WebhookTerminalNotifier {
    async fn on_run_terminated(&self, project: &Project, run: &Run, _outcome: &RunOutcome) {
        self.notify(project, Some(run), &run.status.to_string()).await;
    }

    async fn on_all_runs_completed(&self, project: &Project) {
        self.notify(project, None, "ALL_RUNS_COMPLETED").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaorch_adapters::NoOpWebhookSender;
    use scaorch_core::id::{ProjectId, RunId};
    use scaorch_storage::InMemoryRepository;

    fn project() -> Project {
        Project::new(ProjectId::new("p1"), "scan-1", 0).unwrap()
    }

    #[tokio::test]
    async fn no_subscriptions_sends_nothing_and_does_not_panic() {
        let repository: SharedRepository = Arc::new(InMemoryRepository::new());
        let notifier = WebhookTerminalNotifier::new(
            repository,
            Arc::new(NoOpWebhookSender),
            Arc::new(ExportRegistry::with_builtins()),
        );
        notifier.on_all_runs_completed(&project()).await;
    }

    #[tokio::test]
    async fn subscribed_project_gets_a_delivery_recorded() {
        let repository: SharedRepository = Arc::new(InMemoryRepository::new());
        repository
            .append(Event::WebhookSubscribed {
                subscription_id: scaorch_core::id::WebhookSubscriptionId::new("sub-1"),
                project_id: ProjectId::new("p1"),
                target_url: "https://example.invalid/hook".to_string(),
                trigger_on_each_run: true,
                include_summary: true,
                include_results: false,
                created_at_ms: 0,
            })
            .unwrap();

        struct FakeSender;
        #[async_trait]
        impl WebhookSender for FakeSender {
            async fn send(
                &self,
                subscription: &scaorch_core::WebhookSubscription,
                run_id: Option<&str>,
                _payload: &WebhookPayload,
            ) -> Vec<scaorch_core::WebhookDelivery> {
                vec![scaorch_core::WebhookDelivery {
                    id: scaorch_core::id::WebhookDeliveryId::new("d1"),
                    subscription_id: subscription.id.clone(),
                    run_id: run_id.map(scaorch_core::id::RunId::new),
                    sent_at_ms: 5,
                    response_status: Some(200),
                    response_body: String::new(),
                    attempt: 1,
                    succeeded: true,
                }]
            }
        }

        let notifier = WebhookTerminalNotifier::new(
            repository.clone(),
            Arc::new(FakeSender),
            Arc::new(ExportRegistry::with_builtins()),
        );
        let run = Run::new(
            RunId::new("r1"),
            ProjectId::new("p1"),
            "scan_codebase",
            "",
            vec![],
            0,
        );
        notifier.on_run_terminated(&project(), &run, &RunOutcome {
            status: scaorch_core::RunStatus::Success,
            exit_code: Some(0),
            project_alert: None,
        }).await;

        assert_eq!(repository.snapshot().webhook_deliveries.len(), 1);
    }
}

// SPDX-License-Identifier: MIT

//! Webhook dispatch (C8, §4.6): POST a run summary to each active
//! subscription, retrying with exponential backoff.

use async_trait::async_trait;
use scaorch_core::id::{IdGen, WebhookDeliveryId};
use scaorch_core::{Clock, WebhookDelivery, WebhookSubscription};
use std::time::Duration;

/// Initial retry delay (§4.6).
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Multiplicative backoff factor (§4.6).
pub const BACKOFF_FACTOR: u32 = 2;
/// Backoff ceiling (§4.6).
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Maximum delivery attempts before giving up (§4.6).
pub const MAX_ATTEMPTS: u32 = 5;

/// The payload posted to a subscription's `target_url` (§4.6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct WebhookPayload {
    pub run_id: String,
    pub project_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
}

/// Delivers a webhook payload, recording every attempt.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(
        &self,
        subscription: &WebhookSubscription,
        run_id: Option<&str>,
        payload: &WebhookPayload,
    ) -> Vec<WebhookDelivery>;
}

/// Backoff delay before the given 1-indexed attempt number, per §4.6
/// (1s, 2s, 4s, 8s, 16s — capped at 60s).
pub fn backoff_before_attempt(attempt: u32) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    let exponent = attempt - 2;
    let millis = INITIAL_BACKOFF.as_millis() as u64 * BACKOFF_FACTOR.pow(exponent) as u64;
    Duration::from_millis(millis).min(MAX_BACKOFF)
}

/// POSTs the payload over HTTP, retrying up to [`MAX_ATTEMPTS`] times.
pub struct HttpWebhookSender<C, I> {
    client: reqwest::Client,
    clock: C,
    id_gen: I,
}

impl<C: Clock, I: IdGen> HttpWebhookSender<C, I> {
    pub fn new(client: reqwest::Client, clock: C, id_gen: I) -> Self {
        Self {
            client,
            clock,
            id_gen,
        }
    }
}

#[async_trait]
impl<C: Clock, I: IdGen> WebhookSender for HttpWebhookSender<C, I> {
    async fn send(
        &self,
        subscription: &WebhookSubscription,
        run_id: Option<&str>,
        payload: &WebhookPayload,
    ) -> Vec<WebhookDelivery> {
        let mut deliveries = Vec::new();
        let mut effective_payload = payload.clone();
        if !subscription.include_summary {
            effective_payload.summary = None;
        }
        if !subscription.include_results {
            effective_payload.results = None;
        }

        for attempt in 1..=MAX_ATTEMPTS {
            let delay = backoff_before_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let sent_at_ms = self.clock.epoch_ms();
            let outcome = self
                .client
                .post(&subscription.target_url)
                .json(&effective_payload)
                .send()
                .await;

            let (response_status, response_body, succeeded) = match outcome {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    (Some(status.as_u16()), body, status.is_success())
                }
                Err(e) => (None, e.to_string(), false),
            };

            let delivery = WebhookDelivery {
                id: WebhookDeliveryId::new(self.id_gen.next()),
                subscription_id: subscription.id.clone(),
                run_id: run_id.map(|r| scaorch_core::id::RunId::new(r)),
                sent_at_ms,
                response_status,
                response_body: WebhookDelivery::truncate_body(&response_body),
                attempt,
                succeeded,
            };
            let done = delivery.succeeded;
            deliveries.push(delivery);
            if done {
                break;
            }
        }
        deliveries
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct NoOpWebhookSender;

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl WebhookSender for NoOpWebhookSender {
    async fn send(
        &self,
        _subscription: &WebhookSubscription,
        _run_id: Option<&str>,
        _payload: &WebhookPayload,
    ) -> Vec<WebhookDelivery> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_follows_the_documented_sequence() {
        let expected = [0, 1000, 2000, 4000, 8000];
        for (i, &ms) in expected.iter().enumerate() {
            let attempt = (i + 1) as u32;
            assert_eq!(backoff_before_attempt(attempt).as_millis() as u64, ms);
        }
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_before_attempt(10), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn delivery_stops_retrying_once_server_returns_2xx() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let subscription = WebhookSubscription {
            id: scaorch_core::id::WebhookSubscriptionId::new("sub-1"),
            project_id: scaorch_core::id::ProjectId::new("proj-1"),
            target_url: server.uri(),
            trigger_on_each_run: true,
            include_summary: true,
            include_results: false,
            is_active: true,
            created_at_ms: 0,
        };
        let payload = WebhookPayload {
            run_id: "run-1".to_string(),
            project_id: "proj-1".to_string(),
            status: "succeeded".to_string(),
            summary: Some(serde_json::json!({"ok": true})),
            results: None,
        };
        let sender = HttpWebhookSender::new(
            reqwest::Client::new(),
            scaorch_core::FakeClock::new(0),
            scaorch_core::id::SequentialIdGen::new("delivery"),
        );
        let deliveries = sender.send(&subscription, Some("run-1"), &payload).await;
        assert_eq!(deliveries.len(), 1);
        assert!(deliveries[0].succeeded);
    }

    #[tokio::test]
    async fn delivery_records_every_failed_attempt_up_to_the_cap() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let subscription = WebhookSubscription {
            id: scaorch_core::id::WebhookSubscriptionId::new("sub-1"),
            project_id: scaorch_core::id::ProjectId::new("proj-1"),
            target_url: server.uri(),
            trigger_on_each_run: true,
            include_summary: false,
            include_results: false,
            is_active: true,
            created_at_ms: 0,
        };
        let payload = WebhookPayload {
            run_id: "run-1".to_string(),
            project_id: "proj-1".to_string(),
            status: "failed".to_string(),
            summary: None,
            results: None,
        };
        let sender = HttpWebhookSender::new(
            reqwest::Client::new(),
            scaorch_core::FakeClock::new(0),
            scaorch_core::id::SequentialIdGen::new("delivery"),
        );
        let deliveries = sender.send(&subscription, Some("run-1"), &payload).await;
        assert_eq!(deliveries.len(), MAX_ATTEMPTS as usize);
        assert!(deliveries.iter().all(|d| !d.succeeded));
    }
}

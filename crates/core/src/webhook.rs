// SPDX-License-Identifier: MIT

//! Webhook subscription and delivery records (§3, §4.6).

use crate::id::{ProjectId, RunId, WebhookDeliveryId, WebhookSubscriptionId};
use serde::{Deserialize, Serialize};

/// A per-project (or global-template-derived) webhook subscription (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: WebhookSubscriptionId,
    pub project_id: ProjectId,
    pub target_url: String,
    pub trigger_on_each_run: bool,
    pub include_summary: bool,
    pub include_results: bool,
    pub is_active: bool,
    pub created_at_ms: u64,
}

/// A single delivery attempt for a subscription (§3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: WebhookDeliveryId,
    pub subscription_id: WebhookSubscriptionId,
    pub run_id: Option<RunId>,
    pub sent_at_ms: u64,
    pub response_status: Option<u16>,
    /// Truncated to a bounded length before storage (§3).
    pub response_body: String,
    pub attempt: u32,
    pub succeeded: bool,
}

/// Maximum stored response body length (§3 "truncated").
pub const MAX_RESPONSE_BODY_LEN: usize = 2048;

impl WebhookDelivery {
    pub fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_RESPONSE_BODY_LEN {
            body.to_string()
        } else {
            let mut truncated = body.chars().take(MAX_RESPONSE_BODY_LEN).collect::<String>();
            truncated.push_str("...[truncated]");
            truncated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_body_leaves_short_bodies_untouched() {
        assert_eq!(WebhookDelivery::truncate_body("ok"), "ok");
    }

    #[test]
    fn truncate_body_bounds_long_bodies() {
        let body = "x".repeat(MAX_RESPONSE_BODY_LEN + 500);
        let truncated = WebhookDelivery::truncate_body(&body);
        assert!(truncated.len() < body.len());
        assert!(truncated.ends_with("...[truncated]"));
    }
}

//! Best-effort bridge to the external email/SMS dispatcher.
//!
//! Delivery is fire-and-forget from a spawned task: failures are logged and
//! swallowed, and the primary write that triggered the dispatch never blocks
//! on or fails because of it.

use serde_json::Value;
use std::time::Duration;

#[derive(Clone)]
pub struct Mailer {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Mailer {
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            webhook_url,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Hand a payload to the dispatcher webhook in the background.
    pub fn dispatch(&self, payload: Value) {
        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    tracing::warn!(status = %response.status(), "email dispatch rejected");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "email dispatch failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_webhook() {
        let mailer = Mailer::new(None);
        assert!(!mailer.is_enabled());
        // No task spawned, no panic
        mailer.dispatch(serde_json::json!({"kind": "system"}));
    }

    #[test]
    fn test_enabled_with_webhook() {
        let mailer = Mailer::new(Some("http://localhost:9/hook".into()));
        assert!(mailer.is_enabled());
    }
}

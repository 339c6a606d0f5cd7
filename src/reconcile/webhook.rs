//! Webhook notification.

use crate::core::Webhook;
use crate::error::{ReloadError, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Upper bound on a single webhook call.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Calls the configured webhook once per reconciliation.
///
/// Only `200 OK` counts as success. The response body is always read to the end so the
/// connection can be reused.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    target: Option<Webhook>,
}

impl Notifier {
    /// Create a notifier. With no target every call is a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(target: Option<Webhook>) -> Result<Self> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| ReloadError::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, target })
    }

    /// The configured webhook, if any.
    pub fn target(&self) -> Option<&Webhook> {
        self.target.as_ref()
    }

    /// Issue the webhook request with an empty body.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::NotificationFailure`] on a transport error, a timeout, or
    /// any status other than `200 OK`.
    pub async fn notify(&self) -> Result<()> {
        let Some(webhook) = &self.target else {
            return Ok(());
        };
        let failure = |reason: String| ReloadError::NotificationFailure {
            url: webhook.url.to_string(),
            reason,
        };

        let response = self
            .client
            .request(webhook.method.clone(), webhook.url.clone())
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;

        let status = response.status();
        // Drain the body whatever the status.
        let body = response.bytes().await;
        debug!(
            webhook_url = %webhook.url,
            webhook_method = %webhook.method,
            status = status.as_u16(),
            "webhook called"
        );

        if status != StatusCode::OK {
            return Err(failure(format!(
                "unexpected status {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }
        body.map_err(|e| failure(format!("failed to read response: {}", e)))?;
        Ok(())
    }
}

use super::traits::{AlertError, AlertSink};
use async_trait::async_trait;
use tracing::warn;

/// Alert sink that emits through the process log. Always configured, so an
/// escalation is visible even when no external channel is.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify(&self, lab_id: &str, message: &str) -> Result<(), AlertError> {
        warn!(lab = %lab_id, "{}", message);
        Ok(())
    }
}

/// Delivery deadline per webhook request. A hung endpoint must degrade to a
/// logged error, not stall the caller.
const WEBHOOK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Posts alerts as JSON to a webhook endpoint (chat integrations, pagers).
pub struct WebhookAlertSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookAlertSink {
    pub fn new(url: String) -> Self {
        Self::with_timeout(url, WEBHOOK_TIMEOUT)
    }

    pub fn with_timeout(url: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { url, client }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn notify(&self, lab_id: &str, message: &str) -> Result<(), AlertError> {
        let payload = serde_json::json!({
            "lab": lab_id,
            "text": message,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AlertError(e.to_string()))?;

        response
            .error_for_status()
            .map_err(|e| AlertError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sink_never_fails() {
        let sink = LogAlertSink;
        assert!(sink.notify("lab1", "[error] something broke").await.is_ok());
    }

    #[tokio::test]
    async fn test_hung_endpoint_fails_within_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections but never send a response
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let sink = WebhookAlertSink::with_timeout(
            format!("http://{}/hook", addr),
            std::time::Duration::from_millis(200),
        );

        let started = std::time::Instant::now();
        let result = sink.notify("lab1", "message").await;
        assert!(result.is_err());
        assert!(started.elapsed() < std::time::Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_webhook_sink_reports_unreachable_endpoint() {
        // Reserved TEST-NET address; connection should fail fast
        let sink = WebhookAlertSink::new("http://192.0.2.1:1/hook".to_string());
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            sink.notify("lab1", "message"),
        )
        .await;
        if let Ok(result) = result {
            assert!(result.is_err());
        }
    }
}

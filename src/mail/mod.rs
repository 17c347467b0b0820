//! Outbound email
//!
//! The scheduler only needs "send this HTML to this address", so mail sits
//! behind [`Mailer`]. Production posts to an HTTP mail relay; dev mode logs.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::types::{CadenceError, Result};

/// Deliver-an-email capability
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()>;

    /// Short label for startup logs
    fn describe(&self) -> String;
}

#[derive(Debug, Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts mail as JSON to an HTTP relay
pub struct HttpMailer {
    http_client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CadenceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_url: api_url.into(),
            api_key,
            from: from.into(),
        })
    }
}

#[async_trait::async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let mut request = self.http_client.post(&self.api_url).json(&OutgoingMail {
            from: &self.from,
            to,
            subject,
            html,
        });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CadenceError::Mail(format!(
                "relay returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        debug!(to = %to, subject = %subject, "Email accepted by relay");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("http relay {}", self.api_url)
    }
}

/// Logs instead of sending (dev mode)
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        info!(to = %to, subject = %subject, bytes = html.len(), "Email (not sent, log mailer)");
        Ok(())
    }

    fn describe(&self) -> String {
        "log only".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        let mailer = LogMailer;
        assert!(mailer.send("a@example.com", "Hi", "<p>x</p>").await.is_ok());
        assert_eq!(mailer.describe(), "log only");
    }

    #[test]
    fn test_outgoing_mail_shape() {
        let mail = OutgoingMail {
            from: "care@example.com",
            to: "a@example.com",
            subject: "Hi",
            html: "<p>x</p>",
        };
        let value = serde_json::to_value(&mail).unwrap();
        assert_eq!(value["from"], "care@example.com");
        assert_eq!(value["html"], "<p>x</p>");
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_mail_error() {
        let mailer = HttpMailer::new(
            "http://127.0.0.1:9/send",
            None,
            "care@example.com",
            Duration::from_millis(500),
        )
        .unwrap();
        let err = mailer.send("a@example.com", "Hi", "x").await.unwrap_err();
        assert!(matches!(err, CadenceError::Mail(_)));
        assert!(err.is_transient());
    }
}

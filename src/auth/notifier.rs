use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MailConfig;

/// Delivers the activation link for a freshly created account.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_activation(&self, email: &str, token: &str) -> anyhow::Result<()>;
}

pub fn activation_url(base_url: &str, token: &str) -> String {
    format!("{}/activate?token={}", base_url.trim_end_matches('/'), token)
}

fn activation_body(url: &str) -> String {
    format!("To activate your account, please click on the following link: {url}")
}

#[derive(Debug, Serialize)]
struct MailMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
}

/// Posts messages to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
    base_url: String,
}

impl HttpMailer {
    pub fn new(endpoint: &str, mail: &MailConfig, base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(mail.timeout_secs))
            .build()
            .context("build mail client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: mail.api_key.clone(),
            from: mail.from.clone(),
            base_url: base_url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn send_activation(&self, email: &str, token: &str) -> anyhow::Result<()> {
        let message = MailMessage {
            from: &self.from,
            to: email,
            subject: "Activate Your Account",
            text: activation_body(&activation_url(&self.base_url, token)),
        };
        let mut req = self.client.post(&self.endpoint).json(&message);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await.context("mail relay request")?;
        let status = res.status();
        if !status.is_success() {
            anyhow::bail!("mail relay returned {status}");
        }
        debug!(%email, "activation mail accepted by relay");
        Ok(())
    }
}

/// Development fallback when no relay is configured. Nothing is delivered and
/// the token stays out of the log.
#[derive(Clone)]
pub struct LogNotifier {
    base_url: String,
}

impl LogNotifier {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.to_string() }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_activation(&self, email: &str, _token: &str) -> anyhow::Result<()> {
        info!(%email, base_url = %self.base_url, "activation link generated; mail relay disabled");
        Ok(())
    }
}

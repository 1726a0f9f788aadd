use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use careline_core::{
    defaults, EmailPayload, EmailService, Error, Result, ScheduledMessage, ScheduledPayload,
    ScheduledPayloadKind,
};

use crate::handler::{unexpected_payload, Deliverer};

/// Hands queued emails to the email service.
pub struct EmailDeliverer {
    service: Arc<dyn EmailService>,
}

impl EmailDeliverer {
    pub fn new(service: Arc<dyn EmailService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Deliverer for EmailDeliverer {
    fn kind(&self) -> ScheduledPayloadKind {
        ScheduledPayloadKind::Email
    }

    async fn deliver(&self, msg: &ScheduledMessage) -> Result<()> {
        let ScheduledPayload::Email(email) = &msg.payload else {
            return Err(unexpected_payload(self.kind(), msg));
        };
        self.service.send(email).await?;
        info!(
            subsystem = "jobs",
            component = "email_deliverer",
            scheduled_message_id = msg.id,
            "Scheduled email handed off"
        );
        Ok(())
    }
}

/// Email service reached over HTTP with a JSON body.
pub struct HttpEmailService {
    client: reqwest::Client,
    url: String,
}

impl HttpEmailService {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(defaults::EMAIL_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Build from `EMAIL_SERVICE_URL`; `None` when unset or blank.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_setting(std::env::var("EMAIL_SERVICE_URL").ok().as_deref())
    }

    fn from_setting(url: Option<&str>) -> Result<Option<Self>> {
        match url.map(str::trim) {
            Some(url) if !url.is_empty() => Self::new(url).map(Some),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl EmailService for HttpEmailService {
    async fn send(&self, email: &EmailPayload) -> Result<()> {
        let response = self.client.post(&self.url).json(email).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "email service returned {}",
                status.as_u16()
            )));
        }
        debug!(subsystem = "jobs", component = "email", status = status.as_u16(), "Email accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_setting_disables_email() {
        assert!(HttpEmailService::from_setting(None).unwrap().is_none());
        assert!(HttpEmailService::from_setting(Some("")).unwrap().is_none());
        assert!(HttpEmailService::from_setting(Some("   ")).unwrap().is_none());
    }

    #[test]
    fn test_setting_is_trimmed() {
        let service = HttpEmailService::from_setting(Some(" http://mail.local/send "))
            .unwrap()
            .unwrap();
        assert_eq!(service.url, "http://mail.local/send");
    }
}

use async_trait::async_trait;
use lettre::{
    message::Mailbox,
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

use crate::services::smtp_mailer::Mailer;

use super::MailError;

#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    sender: Mailbox,
    frontend_origin: String,
}

impl SmtpMailer {
    pub fn new(frontend_origin: &str) -> Result<Self, anyhow::Error> {
        let host = std::env::var("SMTP_HOST")?;
        let from = std::env::var("SMTP_FROM")?.parse()?;
        let port: u16 = std::env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()?;

        let disabled_tls = std::env::var("SMTP_TLS_DISABLED")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        let transport = if disabled_tls {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host)
                .port(port)
                .build()
        } else {
            let username = std::env::var("SMTP_USERNAME")?;
            let password = std::env::var("SMTP_PASSWORD")?;
            let tls = TlsParameters::new(host.clone())?;

            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)?
                .port(port)
                .tls(Tls::Required(tls))
                .credentials(Credentials::new(username, password))
                .build()
        };

        Ok(Self {
            transport: Arc::new(transport),
            sender: from,
            frontend_origin: frontend_origin.trim_end_matches('/').to_string(),
        })
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let email = Message::builder()
            .from(self.sender.clone())
            .to(to.parse::<Mailbox>()?)
            .subject(subject)
            .body(body.to_string())?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| e.into())
    }
}

pub(crate) fn verification_body(code: &str) -> String {
    format!(
        "Welcome to DMify!\n\nYour verification code is: {code}\n\n\
         Enter it on the verification page to activate your account. \
         The code expires in 15 minutes.\n\n\
         If you did not create an account you can ignore this email."
    )
}

pub(crate) fn reset_body(frontend_origin: &str, token: &str) -> String {
    format!(
        "You requested to reset your DMify password.\n\nReset here:\n{frontend_origin}/reset-password?token={token}\n\n\
         This link will expire in 24 hours."
    )
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), MailError> {
        self.send_email(to, "Your DMify verification code", &verification_body(code))
            .await
    }

    async fn send_reset_email(&self, to: &str, token: &str) -> Result<(), MailError> {
        let body = reset_body(&self.frontend_origin, token);
        self.send_email(to, "Reset your DMify password", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_body_contains_code_and_expiry() {
        let body = verification_body("482913");
        assert!(body.contains("482913"));
        assert!(body.contains("15 minutes"));
    }

    #[test]
    fn reset_body_links_to_frontend() {
        let body = reset_body("https://app.dmify.test", "abc123");
        assert!(body.contains("https://app.dmify.test/reset-password?token=abc123"));
    }
}

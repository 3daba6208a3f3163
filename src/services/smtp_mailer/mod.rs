use async_trait::async_trait;
use lettre::address::AddressError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Error: {0}")]
    Other(String),
    #[error("Invalid Address: {0}")]
    InvalidEmailAddress(String),
    #[error("Send error: {0}")]
    SendError(String),
}

use lettre::transport::smtp::Error as SmtpError;

impl From<SmtpError> for MailError {
    fn from(err: SmtpError) -> Self {
        MailError::SendError(err.to_string())
    }
}

impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        MailError::SendError(err.to_string())
    }
}

impl From<AddressError> for MailError {
    fn from(e: AddressError) -> Self {
        MailError::InvalidEmailAddress(e.to_string())
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), MailError>;
    async fn send_reset_email(&self, to: &str, token: &str) -> Result<(), MailError>;
}

mod mock_mailer;
mod smtp_impl;

pub use mock_mailer::MockMailer;
pub use smtp_impl::SmtpMailer;

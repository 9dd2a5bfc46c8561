//! Email delivery abstraction for activation and password-reset mail.
//!
//! Delivery is fire-and-forget from the account flows: a failed send is
//! logged and never fails the operation that triggered it.

use anyhow::Result;
use serde_json::json;
use tracing::{error, info};

use crate::identity::UserAccount;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmailTemplate {
    Activation,
    PasswordReset,
}

impl EmailTemplate {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Activation => "account-activation",
            Self::PasswordReset => "password-reset",
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: EmailTemplate,
    pub payload_json: String,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error; the caller only logs it.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = message.template.as_str(),
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}

/// Send the activation mail carrying the one-time password-set token.
/// Failures are logged, never propagated.
pub fn send_activation_email(sender: &dyn EmailSender, account: &UserAccount, token: &str) {
    send_token_email(sender, account, token, EmailTemplate::Activation);
}

/// Send the password-reset mail carrying the one-time password-set token.
/// Failures are logged, never propagated.
pub fn send_password_reset_email(sender: &dyn EmailSender, account: &UserAccount, token: &str) {
    send_token_email(sender, account, token, EmailTemplate::PasswordReset);
}

fn send_token_email(
    sender: &dyn EmailSender,
    account: &UserAccount,
    token: &str,
    template: EmailTemplate,
) {
    let payload = json!({
        "userId": account.id,
        "token": token,
    });

    let message = EmailMessage {
        to_email: account.email.clone(),
        template,
        payload_json: payload.to_string(),
    };

    if let Err(err) = sender.send(&message) {
        error!(
            to_email = %message.to_email,
            template = template.as_str(),
            "email send failed: {err}"
        );
    }
}

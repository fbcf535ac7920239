//! Outbound email for one-time verification and reset codes.
//!
//! SMTP via lettre when enabled; otherwise messages are logged so the flows
//! stay exercisable in development and tests without a mail account.

use anyhow::{Context, Result};
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::EmailConfig;

pub struct Mailer {
    config: EmailConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Result<Self> {
        let transport = if config.enabled {
            let mut builder =
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                    .context("Failed to build SMTP transport")?
                    .port(config.smtp_port);

            if !config.smtp_username.is_empty() {
                builder = builder.credentials(Credentials::new(
                    config.smtp_username.clone(),
                    config.smtp_password.clone(),
                ));
            }

            Some(builder.build())
        } else {
            None
        };

        Ok(Self { config, transport })
    }

    pub async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let Some(transport) = &self.transport else {
            info!("Email disabled; would send \"{subject}\" to {to}");
            debug!("Email body: {html_body}");
            return Ok(());
        };

        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_address)
            .parse()
            .context("Invalid from address")?;
        let to: Mailbox = to.parse().context("Invalid recipient address")?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .context("Failed to build email message")?;

        transport
            .send(message)
            .await
            .context("Failed to send email")?;

        Ok(())
    }

    /// Code delivery for email verification.
    pub async fn send_verification_code(&self, to: &str, code: &str) -> Result<()> {
        let body = format!(
            "<h1>Verify Your Email</h1>\
             <p>Your verification code is: <strong>{code}</strong></p>\
             <p>This code will expire in 5 minutes.</p>"
        );
        self.send(to, "Email Verification", &body).await
    }

    /// Code delivery for password reset.
    pub async fn send_reset_code(&self, to: &str, code: &str) -> Result<()> {
        let body = format!(
            "<h1>Password Reset</h1>\
             <p>Your password reset code is: <strong>{code}</strong></p>\
             <p>This code will expire in 5 minutes.</p>\
             <p>If you didn't request this, please ignore this email.</p>"
        );
        self.send(to, "Password Reset Code", &body).await
    }
}

/// SMTP delivery of verification links using lettre.
use crate::config::MailConfig;
use crate::mail::MailDispatcher;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::SmtpTransport;
use lettre::{Message, Transport};
use tokio::task;

pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn create_transport(&self) -> Result<SmtpTransport> {
        let creds = Credentials::new(self.config.user.clone(), self.config.pass.clone());

        let mailer = SmtpTransport::builder_dangerous(&self.config.host)
            .port(self.config.port)
            .credentials(creds)
            .build();

        Ok(mailer)
    }

    fn verification_link(&self, key: &str) -> String {
        format!("{}/auth/verify?key={}", self.config.public_base(), key)
    }
}

#[async_trait]
impl MailDispatcher for SmtpMailer {
    async fn send_verification(
        &self,
        recipient: &str,
        firstname: &str,
        key: &str,
    ) -> Result<()> {
        let link = self.verification_link(key);

        let text_body = format!(
            "Hi {},\n\n\
             Thank you for signing up! To verify your email address, please visit:\n\n\
             {}\n\n\
             The link expires in 30 minutes. If you didn't create this account,\n\
             you can safely ignore this email.\n",
            firstname, link
        );

        let html_body = format!(
            "<p>Hi <strong>{}</strong>,</p>\
             <p>Thank you for signing up! To verify your email address, click the link below:</p>\
             <p><a href=\"{}\">Verify email address</a></p>\
             <p>The link expires in 30 minutes. If you didn't create this account, \
             you can safely ignore this email.</p>",
            firstname, link
        );

        let message = Message::builder()
            .from(
                format!("Identity <{}>", self.config.user)
                    .parse()
                    .map_err(|e| anyhow!("invalid sender address: {}", e))?,
            )
            .to(recipient
                .parse()
                .map_err(|e| anyhow!("invalid recipient address: {}", e))?)
            .subject("Verify your email address")
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| anyhow!("failed to build message: {}", e))?;

        let mailer = self.create_transport()?;

        // lettre's SMTP transport is synchronous; keep it off the request
        // tasks.
        task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| anyhow!("mail task failed: {}", e))?
            .map_err(|e| anyhow!("failed to send email: {}", e))?;

        Ok(())
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};

#[derive(Clone)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

impl std::fmt::Debug for OutgoingMail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Bodies carry confirmation links, which are bearer credentials
        f.debug_struct("OutgoingMail")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail(&self, mail: OutgoingMail) -> Result<()>;
}

/// Delivers through an SMTP relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(host: &str, username: Option<String>, password: Option<String>) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .with_context(|| format!("Invalid SMTP relay {}", host))?;
        
        if let (Some(username), Some(password)) = (username, password) {
            builder = builder.credentials(Credentials::new(username, password));
        }
        
        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_mail(&self, mail: OutgoingMail) -> Result<()> {
        let from: Mailbox = mail.from.parse().context("Invalid sender address")?;
        let to: Mailbox = mail.to.parse().context("Invalid recipient address")?;
        
        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(mail.subject)
            .header(ContentType::TEXT_HTML)
            .body(mail.html_body)
            .context("Failed to build email")?;
        
        self.transport
            .send(message)
            .await
            .context("SMTP delivery failed")?;
        
        Ok(())
    }
}

/// Used when no relay is configured. Only the envelope is logged.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_mail(&self, mail: OutgoingMail) -> Result<()> {
        tracing::warn!(
            to = %mail.to,
            subject = %mail.subject,
            "No SMTP relay configured, email not delivered"
        );
        Ok(())
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info};

use crate::config::EmailConfig;

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<()>;
}

/// One SMTP session per message: connect, STARTTLS, authenticate, send, close.
pub struct SmtpMailer {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl SmtpMailer {
    pub fn new(cfg: &EmailConfig) -> Self {
        Self {
            host: cfg.smtp_host.clone(),
            port: cfg.smtp_port,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
        }
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<()> {
        let from: Mailbox = email.from.parse().with_context(|| format!("invalid sender address {}", email.from))?;
        let to: Mailbox = email.to.parse().with_context(|| format!("invalid recipient address {}", email.to))?;
        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .context("build email")?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            .context("configure SMTP relay")?
            .port(self.port)
            .credentials(Credentials::new(self.username.clone(), self.password.clone()))
            .build();
        transport.send(message).await.context("smtp send")?;
        Ok(())
    }
}

pub struct Notifier {
    transport: Box<dyn MailTransport>,
    from: String,
    to: String,
}

impl Notifier {
    pub fn new(transport: Box<dyn MailTransport>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { transport, from: from.into(), to: to.into() }
    }

    pub fn smtp(cfg: &EmailConfig) -> Self {
        Self::new(Box::new(SmtpMailer::new(cfg)), cfg.username.clone(), cfg.recipient.clone())
    }

    pub fn compose(&self, subject: &str, body: &str, urls: &[String]) -> OutgoingEmail {
        OutgoingEmail {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: subject.to_string(),
            body: format_body(body, urls),
        }
    }

    /// Send and report whether it went out. Failures are logged, never returned.
    pub async fn send(&self, subject: &str, body: &str, urls: &[String]) -> bool {
        let email = self.compose(subject, body, urls);
        info!("Sending email...");
        match self.transport.deliver(&email).await {
            Ok(()) => {
                info!("Email sent!");
                true
            }
            Err(e) => {
                error!("Error sending email: {e:#}");
                false
            }
        }
    }
}

fn format_body(body: &str, urls: &[String]) -> String {
    format!("{}\n\n{}", urls.join("\n"), body)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub(crate) sent: Mutex<Vec<OutgoingEmail>>,
    }

    #[async_trait]
    impl MailTransport for std::sync::Arc<RecordingTransport> {
        async fn deliver(&self, email: &OutgoingEmail) -> Result<()> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    struct FailingLogin;

    #[async_trait]
    impl MailTransport for FailingLogin {
        async fn deliver(&self, _email: &OutgoingEmail) -> Result<()> {
            Err(anyhow!("535 5.7.8 Username and Password not accepted"))
        }
    }

    #[test]
    fn body_lists_urls_before_text() {
        let n = Notifier::new(Box::new(FailingLogin), "bot@example.com", "me@example.com");
        let email = n.compose("Subject", "insights", &["https://a/1".into(), "https://a/2".into()]);
        assert_eq!(email.body, "https://a/1\nhttps://a/2\n\ninsights");
        assert_eq!(email.to, "me@example.com");
    }

    #[tokio::test]
    async fn login_failure_is_swallowed() {
        let n = Notifier::new(Box::new(FailingLogin), "bot@example.com", "me@example.com");
        let delivered = n.send("Subject", "body", &[]).await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn unreachable_smtp_host_is_swallowed() {
        let cfg = EmailConfig {
            username: "bot@example.com".into(),
            password: "pw".into(),
            recipient: "me@example.com".into(),
            smtp_host: "127.0.0.1".into(),
            smtp_port: 1,
        };
        assert!(!Notifier::smtp(&cfg).send("Subject", "body", &[]).await);
    }

    #[tokio::test]
    async fn successful_delivery_is_reported() {
        let rec = std::sync::Arc::new(RecordingTransport::default());
        let n = Notifier::new(Box::new(rec.clone()), "bot@example.com", "me@example.com");
        assert!(n.send("S", "B", &["u".into()]).await);
        assert_eq!(rec.sent.lock().unwrap().len(), 1);
    }
}

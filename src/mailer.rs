use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::{AppConfig, SmtpConfig};

pub trait Mailer: Send {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;

    /// Short description for logs ("smtp host", "outbox dir").
    fn describe(&self) -> String;
}

pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.config.from.parse().context("invalid SMTP_FROM address")?)
            .to(to.parse().context("invalid recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("failed to build email")?;

        let transport = SmtpTransport::starttls_relay(&self.config.host)
            .context("failed to configure smtp relay")?
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.user.clone(),
                self.config.password.clone(),
            ))
            .build();
        transport.send(&message).context("smtp send failed")?;
        info!(to, subject, "email sent");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("smtp {}:{}", self.config.host, self.config.port)
    }
}

/// Writes messages as `.eml` files instead of sending them.
pub struct OutboxMailer {
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Mailer for OutboxMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create outbox {}", self.dir.display()))?;
        let safe_to: String = to
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let path = self.dir.join(format!(
            "{}_{}.eml",
            Utc::now().format("%Y%m%dT%H%M%S%.3f"),
            safe_to
        ));
        let eml = format!("To: {to}\r\nSubject: {subject}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{body}\r\n");
        fs::write(&path, eml).with_context(|| format!("failed to write {}", path.display()))?;
        info!(to, path = %path.display(), "email written to outbox");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("outbox {}", self.dir.display())
    }
}

pub fn mailer_from_config(cfg: &AppConfig) -> Box<dyn Mailer> {
    match &cfg.smtp {
        Some(smtp) => Box::new(SmtpMailer::new(smtp.clone())),
        None => Box::new(OutboxMailer::new(cfg.outbox_dir())),
    }
}

pub fn verification_email(name: &str, code: &str) -> (String, String) {
    let subject = "Your Footy Value verification code".to_string();
    let body = format!(
        "Hi {name},\n\nyour verification code is {code}.\n\nEnter it in the app to activate your account and claim your free credits.\n"
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_writes_eml() {
        let dir = std::env::temp_dir().join(format!("footy_value_outbox_{}", std::process::id()));
        let mailer = OutboxMailer::new(&dir);
        let (subject, body) = verification_email("Sam", "123456");
        mailer.send("sam@example.com", &subject, &body).unwrap();
        let files: Vec<_> = fs::read_dir(&dir).unwrap().flatten().collect();
        assert_eq!(files.len(), 1);
        let text = fs::read_to_string(files[0].path()).unwrap();
        assert!(text.contains("123456"));
        assert!(text.starts_with("To: sam@example.com"));
        let _ = fs::remove_dir_all(&dir);
    }
}

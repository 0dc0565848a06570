use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::parse_typed_config;
use crate::{Context, ExecutableTask, TaskError};

fn default_server() -> String {
    "smtp.gmail.com".into()
}

fn default_port() -> u16 {
    587
}

fn default_subject() -> String {
    "Automation Notification".into()
}

/// One address or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Default for Recipients {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl Recipients {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(address) if address.trim().is_empty() => Vec::new(),
            Self::One(address) => vec![address],
            Self::Many(addresses) => addresses,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmailConfig {
    #[serde(default = "default_server")]
    smtp_server: String,
    #[serde(default = "default_port")]
    smtp_port: u16,
    username: Option<String>,
    password: Option<String>,
    from_email: Option<String>,
    #[serde(default)]
    to_emails: Recipients,
    #[serde(default = "default_subject")]
    subject: String,
    #[serde(default)]
    body: String,
}

/// Send a plain-text mail over SMTP with STARTTLS.
///
/// `from_email` defaults to `username`. The result is a short confirmation
/// naming the recipients.
pub struct EmailTask {
    name: String,
    config: Value,
}

impl EmailTask {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self { name: name.into(), config }
    }
}

fn mailbox(address: &str, field: &str) -> Result<Mailbox, TaskError> {
    address
        .parse()
        .map_err(|e| TaskError::configuration(format!("invalid {field} address {address:?}: {e}")))
}

/// Validate the config and assemble the message, without touching the network.
fn build_message(config: &EmailConfig) -> Result<(Message, Credentials, Vec<String>), TaskError> {
    let (username, password) = match (&config.username, &config.password) {
        (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => (u.clone(), p.clone()),
        _ => return Err(TaskError::configuration("username and password are required")),
    };

    let recipients = config.to_emails.clone().into_vec();
    if recipients.is_empty() {
        return Err(TaskError::missing("to_emails"));
    }

    let from = config.from_email.as_deref().unwrap_or(&username);
    let mut builder = Message::builder()
        .from(mailbox(from, "from_email")?)
        .subject(config.subject.as_str())
        .header(ContentType::TEXT_PLAIN);
    for address in &recipients {
        builder = builder.to(mailbox(address, "to_emails")?);
    }
    let message = builder
        .body(config.body.clone())
        .map_err(|e| TaskError::configuration(format!("cannot build email: {e}")))?;

    Ok((message, Credentials::new(username, password), recipients))
}

#[async_trait]
impl ExecutableTask for EmailTask {
    async fn execute(&self, ctx: &Context) -> Result<Value, TaskError> {
        let config: EmailConfig =
            parse_typed_config(&self.config, ctx, &["to_emails", "smtp_port"])?;
        let (message, credentials, recipients) = build_message(&config)?;

        debug!(
            task = %self.name,
            server = %config.smtp_server,
            port = config.smtp_port,
            "connecting to SMTP relay"
        );
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
            .map_err(|e| TaskError::execution(format!("failed to send email: {e}")))?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        mailer
            .send(message)
            .await
            .map_err(|e| TaskError::execution(format!("failed to send email: {e}")))?;

        let recipients = recipients.join(", ");
        info!(task = %self.name, to = %recipients, "email sent");
        Ok(Value::String(format!("Email sent to {recipients}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(config: Value, ctx: Value) -> EmailConfig {
        let ctx = ctx.as_object().cloned().unwrap_or_default();
        parse_typed_config(&config, &ctx, &["to_emails", "smtp_port"]).unwrap()
    }

    #[test]
    fn defaults_follow_gmail_submission() {
        let config = parse(json!({}), json!({}));
        assert_eq!(config.smtp_server, "smtp.gmail.com");
        assert_eq!(config.smtp_port, 587);
        assert_eq!(config.subject, "Automation Notification");
        assert!(config.body.is_empty());
    }

    #[test]
    fn message_is_built_from_rendered_config() {
        let config = parse(
            json!({
                "username": "bot@example.com",
                "password": "secret",
                "to_emails": "${team}",
                "subject": "Report for ${day}",
                "body": "${count} rows processed",
            }),
            json!({ "team": ["a@example.com", "b@example.com"], "day": "monday", "count": 42 }),
        );
        let (message, _, recipients) = build_message(&config).unwrap();
        assert_eq!(recipients, ["a@example.com", "b@example.com"]);

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: bot@example.com"), "{raw}");
        assert!(raw.contains("Subject: Report for monday"), "{raw}");
        assert!(raw.contains("42 rows processed"), "{raw}");
    }

    #[test]
    fn single_recipient_string_is_accepted() {
        let config = parse(
            json!({ "username": "u@example.com", "password": "p", "to_emails": "ops@example.com" }),
            json!({}),
        );
        let (_, _, recipients) = build_message(&config).unwrap();
        assert_eq!(recipients, ["ops@example.com"]);
    }

    #[tokio::test]
    async fn credentials_are_required() {
        let task = EmailTask::new("notify", json!({ "to_emails": ["a@example.com"], "username": "u" }));
        assert_eq!(
            task.execute(&Context::new()).await.unwrap_err(),
            TaskError::configuration("username and password are required")
        );
    }

    #[tokio::test]
    async fn recipients_are_required() {
        let task = EmailTask::new("notify", json!({ "username": "u@example.com", "password": "p" }));
        assert_eq!(
            task.execute(&Context::new()).await.unwrap_err(),
            TaskError::missing("to_emails")
        );
    }

    #[tokio::test]
    async fn malformed_address_is_a_configuration_error() {
        let task = EmailTask::new("notify", json!({
            "username": "u@example.com",
            "password": "p",
            "to_emails": ["not an address"],
        }));
        assert!(matches!(
            task.execute(&Context::new()).await,
            Err(TaskError::Configuration(_))
        ));
    }
}

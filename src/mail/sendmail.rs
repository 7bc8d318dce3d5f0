use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{SinglePart, header},
    transport::smtp::authentication::Credentials,
};

use crate::config::SmtpConfig;

pub type MailError = Box<dyn std::error::Error + Send + Sync>;

/// Outgoing mail over SMTP with STARTTLS.
///
/// With no server configured the mailer is disabled: messages are logged
/// and dropped so development setups work without SMTP.
#[derive(Debug, Clone)]
pub struct Mailer {
    config: SmtpConfig,
}

/// Fill `{{key}}` placeholders in an HTML template.
pub fn render(template: &str, placeholders: &[(&str, &str)]) -> String {
    let mut html = template.to_string();
    for (key, value) in placeholders {
        html = html.replace(&format!("{{{{{}}}}}", key), value);
    }
    html
}

impl Mailer {
    pub fn new(config: SmtpConfig) -> Self {
        Mailer { config }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.server.is_empty()
    }

    pub async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html: String,
    ) -> Result<(), MailError> {
        if !self.is_enabled() {
            tracing::info!("SMTP not configured, skipping '{}' to {}", subject, to_email);
            return Ok(());
        }

        let from = if self.config.from.is_empty() {
            &self.config.username
        } else {
            &self.config.from
        };

        let email = Message::builder()
            .from(from.parse()?)
            .to(to_email.parse()?)
            .subject(subject)
            .singlepart(
                SinglePart::builder()
                    .header(header::ContentType::TEXT_HTML)
                    .body(html),
            )?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.server)?
            .credentials(creds)
            .port(self.config.port)
            .build();

        mailer.send(email).await?;
        tracing::info!("Email '{}' sent to {}", subject, to_email);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_replaced() {
        let html = render(
            "<p>Hi {{username}}, go to {{link}}. Bye {{username}}</p>",
            &[("username", "ana"), ("link", "http://x")],
        );
        assert_eq!(html, "<p>Hi ana, go to http://x. Bye ana</p>");
    }

    #[tokio::test]
    async fn disabled_mailer_is_a_no_op() {
        let mailer = Mailer::new(SmtpConfig::default());
        assert!(!mailer.is_enabled());
        mailer
            .send_email("someone@example.com", "Hello", "<p>x</p>".into())
            .await
            .unwrap();
    }
}

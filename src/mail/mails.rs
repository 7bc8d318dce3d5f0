use super::sendmail::{MailError, Mailer, render};

const CONFIRM_TEMPLATE: &str = include_str!("templates/Confirm-email.html");
const RESET_TEMPLATE: &str = include_str!("templates/ResetPassword-email.html");
const WELCOME_TEMPLATE: &str = include_str!("templates/Welcome-email.html");

pub fn confirm_link(frontend_url: &str, token: &str) -> String {
    format!("{}/confirm?token={}", frontend_url.trim_end_matches('/'), token)
}

pub fn reset_link(frontend_url: &str, token: &str) -> String {
    format!(
        "{}/reset-password?token={}",
        frontend_url.trim_end_matches('/'),
        token
    )
}

pub async fn send_confirmation_email(
    mailer: &Mailer,
    to_email: &str,
    username: &str,
    token: &str,
    frontend_url: &str,
) -> Result<(), MailError> {
    let link = confirm_link(frontend_url, token);
    let username = ammonia::clean_text(username);
    let html = render(
        CONFIRM_TEMPLATE,
        &[("username", username.as_str()), ("confirm_link", link.as_str())],
    );

    mailer.send_email(to_email, "Confirm Your Email", html).await
}

pub async fn send_reset_password_email(
    mailer: &Mailer,
    to_email: &str,
    username: &str,
    token: &str,
    frontend_url: &str,
) -> Result<(), MailError> {
    let link = reset_link(frontend_url, token);
    let username = ammonia::clean_text(username);
    let html = render(
        RESET_TEMPLATE,
        &[("username", username.as_str()), ("reset_link", link.as_str())],
    );

    mailer
        .send_email(to_email, "Password Reset Request", html)
        .await
}

/// Sent once the address is confirmed. `awaiting_approval` adjusts the
/// closing line for roles that still need an admin.
pub async fn send_welcome_email(
    mailer: &Mailer,
    to_email: &str,
    username: &str,
    awaiting_approval: bool,
) -> Result<(), MailError> {
    let next_step = if awaiting_approval {
        "An administrator will review your account shortly."
    } else {
        "You can now log in."
    };
    let username = ammonia::clean_text(username);
    let html = render(
        WELCOME_TEMPLATE,
        &[("username", username.as_str()), ("next_step", next_step)],
    );

    mailer.send_email(to_email, "Welcome to the Blog", html).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_point_at_frontend() {
        assert_eq!(
            confirm_link("http://localhost:3000/", "abc"),
            "http://localhost:3000/confirm?token=abc"
        );
        assert_eq!(
            reset_link("https://blog.example", "t"),
            "https://blog.example/reset-password?token=t"
        );
    }

    #[test]
    fn templates_have_their_placeholders() {
        assert!(CONFIRM_TEMPLATE.contains("{{confirm_link}}"));
        assert!(RESET_TEMPLATE.contains("{{reset_link}}"));
        assert!(WELCOME_TEMPLATE.contains("{{next_step}}"));
    }
}

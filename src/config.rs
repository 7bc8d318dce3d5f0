use std::env;

/// SMTP settings used by the mailer. All optional: when `server` is empty
/// outgoing mail is skipped and logged instead.
#[derive(Debug, Clone, Default)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub refresh_token_maxage: i64,
    pub port: u16,
    pub frontend_url: String,
    pub upload_folder: String,
    pub image_base_url: String,
    pub max_upload_bytes: usize,
    pub smtp: SmtpConfig,
    pub google: GoogleConfig,
}

fn required(key: &str) -> Result<String, String> {
    env::var(key).map_err(|_| format!("{} must be set", key))
}

fn or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| format!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn init() -> Result<Config, String> {
        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET_KEY")?;

        let smtp = SmtpConfig {
            server: or_default("SMTP_SERVER", ""),
            port: parsed("SMTP_PORT", 587)?,
            username: or_default("SMTP_USERNAME", ""),
            password: or_default("SMTP_PASSWORD", ""),
            from: or_default("MAIL_FROM", &or_default("SMTP_USERNAME", "")),
        };

        let google = GoogleConfig {
            client_id: or_default("GOOGLE_CLIENT_ID", ""),
            client_secret: or_default("GOOGLE_CLIENT_SECRET", ""),
            redirect_uri: or_default("REDIRECT_URI", ""),
            auth_url: or_default(
                "GOOGLE_AUTH_URL",
                "https://accounts.google.com/o/oauth2/v2/auth",
            ),
            token_url: or_default("GOOGLE_TOKEN_URL", "https://oauth2.googleapis.com/token"),
            userinfo_url: or_default(
                "GOOGLE_USERINFO_URL",
                "https://www.googleapis.com/oauth2/v3/userinfo",
            ),
        };

        Ok(Config {
            database_url,
            jwt_secret,
            jwt_maxage: parsed("JWT_MAXAGE", 3 * 60 * 60)?,
            refresh_token_maxage: parsed("REFRESH_TOKEN_MAXAGE", 7 * 24 * 60 * 60)?,
            port: parsed("PORT", 8000)?,
            frontend_url: or_default("FRONTEND_URL", "http://localhost:3000"),
            upload_folder: or_default("UPLOAD_FOLDER", "static/uploads"),
            image_base_url: or_default(
                "IMAGE_BASE_URL",
                "http://localhost:8000/static/uploads/",
            ),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", 1024 * 1024)?,
            smtp,
            google,
        })
    }
}

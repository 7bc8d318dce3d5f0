use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::{config::GoogleConfig, error::HttpError};

/// Timeout applied to every call made to Google.
pub const GOOGLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Subset of Google's OpenID userinfo we use.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Google OAuth 2.0 client for the authorization-code flow.
///
/// Cloning is cheap because reqwest::Client uses Arc internally.
#[derive(Clone)]
pub struct GoogleClient {
    conn: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleClient {
    pub fn new(conn: reqwest::Client, config: GoogleConfig) -> Self {
        Self { conn, config }
    }

    pub fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder().timeout(GOOGLE_TIMEOUT).build()
    }

    /// Consent page the browser is redirected to.
    pub fn authorize_url(&self) -> Result<String, HttpError> {
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| {
            tracing::error!("invalid GOOGLE_AUTH_URL: {}", e);
            HttpError::server_error("Google login is not configured")
        })?;

        Ok(url.to_string())
    }

    /// Trade the authorization code for a Google access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, HttpError> {
        let response = self
            .conn
            .post(&self.config.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!("google token exchange failed: {}", e);
                HttpError::server_error("Google token exchange failed")
            })?;

        let body: TokenResponse = response.json().await.map_err(|e| {
            tracing::error!("google token response unreadable: {}", e);
            HttpError::server_error("Google token exchange failed")
        })?;

        body.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| HttpError::bad_request("Failed to obtain Google access token"))
    }

    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<GoogleUserInfo, HttpError> {
        let response = self
            .conn
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("google userinfo request failed: {}", e);
                HttpError::server_error("Could not fetch Google profile")
            })?;

        response.json::<GoogleUserInfo>().await.map_err(|e| {
            tracing::error!("google userinfo unreadable: {}", e);
            HttpError::server_error("Could not fetch Google profile")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleClient {
        GoogleClient::new(
            reqwest::Client::new(),
            GoogleConfig {
                client_id: "cid".into(),
                client_secret: "secret".into(),
                redirect_uri: "http://localhost:8000/api/auth/google_callback".into(),
                auth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
                token_url: "https://oauth2.googleapis.com/token".into(),
                userinfo_url: "https://www.googleapis.com/oauth2/v3/userinfo".into(),
            },
        )
    }

    #[test]
    fn consent_url_carries_client_and_scope() {
        let url = client().authorize_url().unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid+email+profile"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8000"));
    }

    #[test]
    fn bad_auth_url_is_server_error() {
        let mut c = client();
        c.config.auth_url = "not a url".into();
        let err = c.authorize_url().unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}

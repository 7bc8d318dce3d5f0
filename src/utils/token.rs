// Access tokens are stateless on their own; revocation comes from the
// session marker they carry, which is compared with the stored value.
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ErrorMessage, HttpError},
    models::{User, UserRole},
};

/// Claims of a bearer access token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccessClaims {
    /// user id
    pub sub: String,
    pub role: UserRole,
    /// session marker of the user at issue time
    pub session_token: String,
    pub iat: usize,
    pub exp: usize,
}

/// What a signed email link is for. Tokens minted for one purpose are
/// rejected for the other.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EmailPurpose {
    EmailConfirm,
    PasswordReset,
}

#[derive(Debug, Serialize, Deserialize)]
struct EmailClaims {
    sub: String,
    purpose: EmailPurpose,
    iat: usize,
    exp: usize,
}

/// Lifetime of confirmation and reset links.
pub const EMAIL_TOKEN_MAXAGE: i64 = 60 * 60;

fn timestamps(expires_in_seconds: i64) -> (usize, usize) {
    let now = Utc::now();
    let iat = now.timestamp() as usize;
    let exp = (now + Duration::seconds(expires_in_seconds)).timestamp() as usize;
    (iat, exp)
}

pub fn create_access_token(
    user: &User,
    secret: &[u8],
    expires_in_seconds: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    // A token without a marker could never be revoked
    if user.session_token.is_empty() {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidSubject.into());
    }

    let (iat, exp) = timestamps(expires_in_seconds);
    let claims = AccessClaims {
        sub: user.id.to_string(),
        role: user.role,
        session_token: user.session_token.clone(),
        iat,
        exp,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

/// Verify signature and expiry, returning the claims.
pub fn decode_access_token<T: Into<String>>(
    token: T,
    secret: &[u8],
) -> Result<AccessClaims, HttpError> {
    decode::<AccessClaims>(
        &token.into(),
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256), // also rejects expired tokens
    )
    .map(|data| data.claims)
    .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))
}

pub fn create_email_token(
    email: &str,
    purpose: EmailPurpose,
    secret: &[u8],
) -> Result<String, jsonwebtoken::errors::Error> {
    if email.is_empty() {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidSubject.into());
    }

    let (iat, exp) = timestamps(EMAIL_TOKEN_MAXAGE);
    let claims = EmailClaims {
        sub: email.to_string(),
        purpose,
        iat,
        exp,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

/// Returns the email address the link was issued for.
pub fn decode_email_token(
    token: &str,
    purpose: EmailPurpose,
    secret: &[u8],
) -> Result<String, HttpError> {
    let invalid = || HttpError::bad_request("Invalid or expired token");

    let claims = decode::<EmailClaims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| invalid())?
    .claims;

    // A reset link must not confirm an address and vice versa
    if claims.purpose != purpose {
        return Err(invalid());
    }

    Ok(claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use uuid::Uuid;

    const SECRET: &[u8] = b"unit-test-secret";

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "author1".into(),
            email: "author1@example.com".into(),
            password: None,
            role: UserRole::Author,
            is_approved: true,
            is_blocked: false,
            is_confirmed: true,
            profile_picture: None,
            session_token: Uuid::new_v4().to_string(),
            auth_provider: "email".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn access_token_carries_role_and_marker() {
        let user = user();
        let token = create_access_token(&user, SECRET, 60).unwrap();
        let claims = decode_access_token(token, SECRET).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, UserRole::Author);
        assert_eq!(claims.session_token, user.session_token);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = create_access_token(&user(), SECRET, 60).unwrap();
        let err = decode_access_token(token, b"other").unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn expired_token_is_unauthorized() {
        // Well past the default 60s leeway.
        let token = create_access_token(&user(), SECRET, -600).unwrap();
        let err = decode_access_token(token, SECRET).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn missing_marker_refuses_to_issue() {
        let mut user = user();
        user.session_token.clear();
        assert!(create_access_token(&user, SECRET, 60).is_err());
    }

    #[test]
    fn email_token_is_bound_to_purpose() {
        let token =
            create_email_token("a@example.com", EmailPurpose::EmailConfirm, SECRET).unwrap();
        assert_eq!(
            decode_email_token(&token, EmailPurpose::EmailConfirm, SECRET).unwrap(),
            "a@example.com"
        );
        let err = decode_email_token(&token, EmailPurpose::PasswordReset, SECRET).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn access_token_is_not_an_email_token() {
        let token = create_access_token(&user(), SECRET, 60).unwrap();
        assert!(decode_email_token(&token, EmailPurpose::PasswordReset, SECRET).is_err());
    }
}

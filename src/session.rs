//! Session markers and refresh tokens.
//!
//! Each user row holds a `session_token`. Access tokens carry a copy, and a
//! token only counts while the copy matches the stored value, so replacing
//! the stored marker signs the user out of every device at once.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use data_encoding::{BASE64URL_NOPAD, HEXLOWER};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    models::User,
    utils::token::AccessClaims,
};

const REFRESH_TOKEN_BYTES: usize = 48;

pub fn new_marker() -> String {
    Uuid::new_v4().to_string()
}

/// Opaque refresh token handed to the client. Only its hash is stored.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    BASE64URL_NOPAD.encode(&bytes)
}

pub fn hash_refresh_token(raw: &str) -> String {
    HEXLOWER.encode(&Sha256::digest(raw.as_bytes()))
}

/// Checks every authenticated request runs after the token itself has been
/// decoded and the user loaded.
pub fn verify_session(user: &User, claims: &AccessClaims) -> Result<(), HttpError> {
    if user.is_blocked {
        return Err(HttpError::unauthorized(
            ErrorMessage::AccountBlocked.to_string(),
        ));
    }

    if user.session_token.is_empty() || user.session_token != claims.session_token {
        return Err(HttpError::unauthorized(
            ErrorMessage::TokenRevoked.to_string(),
        ));
    }

    Ok(())
}

/// Login gates, evaluated in order: credentials, confirmation, approval,
/// block status. `password_ok` is the outcome of the hash comparison; an
/// OAuth-only account has no hash and never passes.
pub fn login_gate(user: Option<&User>, password_ok: bool) -> Result<&User, HttpError> {
    let user = match user {
        Some(user) if user.password.is_some() && password_ok => user,
        _ => {
            return Err(HttpError::unauthorized(
                ErrorMessage::InvalidCredentials.to_string(),
            ));
        }
    };

    if !user.is_confirmed {
        return Err(HttpError::forbidden(
            "Please confirm your email before logging in",
        ));
    }

    if !user.is_approved {
        return Err(HttpError::forbidden("Your account is awaiting approval"));
    }

    if user.is_blocked {
        return Err(HttpError::forbidden("Your account has been blocked"));
    }

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::utils::token::{create_access_token, decode_access_token};
    use axum::http::StatusCode;
    use chrono::Utc;

    const SECRET: &[u8] = b"session-tests";

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "reader".into(),
            email: "reader@example.com".into(),
            password: Some("$argon2id$stub".into()),
            role: UserRole::Commentator,
            is_approved: true,
            is_blocked: false,
            is_confirmed: true,
            profile_picture: None,
            session_token: new_marker(),
            auth_provider: "email".into(),
            created_at: Utc::now(),
        }
    }

    fn claims_for(user: &User) -> AccessClaims {
        let token = create_access_token(user, SECRET, 60).unwrap();
        decode_access_token(token, SECRET).unwrap()
    }

    #[test]
    fn current_marker_passes() {
        let user = user();
        assert!(verify_session(&user, &claims_for(&user)).is_ok());
    }

    #[test]
    fn rotated_marker_revokes_earlier_tokens() {
        let mut user = user();
        let old = claims_for(&user);
        user.session_token = new_marker();

        let err = verify_session(&user, &old).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert!(verify_session(&user, &claims_for(&user)).is_ok());
    }

    #[test]
    fn blocked_user_never_authenticates() {
        let mut user = user();
        let claims = claims_for(&user);
        user.is_blocked = true;
        let err = verify_session(&user, &claims).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn refresh_tokens_are_random_and_hash_stably() {
        let a = generate_refresh_token();
        let b = generate_refresh_token();
        assert_ne!(a, b);
        assert_eq!(hash_refresh_token(&a), hash_refresh_token(&a));
        assert_eq!(hash_refresh_token(&a).len(), 64);
        assert_ne!(hash_refresh_token(&a), a);
    }

    #[test]
    fn login_gate_order() {
        // wrong password wins over every other flag
        let mut u = user();
        u.is_confirmed = false;
        u.is_approved = false;
        u.is_blocked = true;
        assert_eq!(
            login_gate(Some(&u), false).unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );

        // then confirmation
        let err = login_gate(Some(&u), true).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(err.message.contains("confirm"));

        // then approval
        u.is_confirmed = true;
        let err = login_gate(Some(&u), true).unwrap_err();
        assert!(err.message.contains("approval"));

        // then block
        u.is_approved = true;
        let err = login_gate(Some(&u), true).unwrap_err();
        assert!(err.message.contains("blocked"));

        u.is_blocked = false;
        assert!(login_gate(Some(&u), true).is_ok());
    }

    #[test]
    fn unknown_and_oauth_only_accounts_fail_credentials() {
        assert_eq!(
            login_gate(None, true).unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );
        let mut u = user();
        u.password = None;
        assert_eq!(
            login_gate(Some(&u), true).unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );
    }
}

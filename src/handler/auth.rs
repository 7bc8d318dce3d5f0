use crate::{
    AppState,
    db::{NewUser, RefreshTokenExt, UserExt},
    dtos::{
        FilterUserDto, LoginUserDto, RefreshRequestDto, RefreshResponseDto, RegisterUserDto,
        ResetPasswordConfirmDto, ResetPasswordRequestDto, Response, UserLoginResponseDto,
        UserResponseDto,
    },
    error::{ErrorMessage, HttpError, db_err},
    handler::google::google_handler,
    mail::mails::{send_confirmation_email, send_reset_password_email, send_welcome_email},
    middleware::{JWTAuthMiddleware, auth},
    models::{User, UserRole},
    session,
    utils::{
        multipart::MultipartForm,
        password, sanitize,
        storage::UploadKind,
        token::{self, EmailPurpose},
    },
};
use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{Duration, Utc};
use validator::Validate;

use tracing::instrument;

/// Router for authentication endpoints
pub fn auth_handler(app_state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/logout", post(logout))
        .route("/user/me", get(me))
        .route_layer(middleware::from_fn_with_state(app_state, auth));

    Router::new()
        .route("/register", post(register))
        .route("/confirm/{token}", get(confirm_email))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/reset-password/request", post(request_password_reset))
        .route("/reset-password/confirm", post(confirm_password_reset))
        .merge(protected)
        .merge(google_handler())
}

fn token_cookie(name: &'static str, value: String, max_age_seconds: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .max_age(time::Duration::seconds(max_age_seconds))
        .build()
}

/// Access + refresh cookies mirroring the JSON body, for browser clients.
fn with_session_cookies(
    jar: CookieJar,
    app_state: &AppState,
    access_token: &str,
    refresh_token: &str,
) -> CookieJar {
    jar.add(token_cookie(
        "access_token",
        access_token.to_string(),
        app_state.env.jwt_maxage,
    ))
    .add(token_cookie(
        "refresh_token",
        refresh_token.to_string(),
        app_state.env.refresh_token_maxage,
    ))
}

fn access_token_for(app_state: &AppState, user: &User) -> Result<String, HttpError> {
    token::create_access_token(
        user,
        app_state.env.jwt_secret.as_bytes(),
        app_state.env.jwt_maxage,
    )
    .map_err(|e| {
        tracing::error!(user_id = %user.id, "Access token creation error: {}", e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })
}

/// Mint a new access token and store a fresh refresh token for `user`.
/// Returns `(access_token, raw_refresh_token)`.
pub(crate) async fn issue_tokens(
    app_state: &AppState,
    user: &User,
) -> Result<(String, String), HttpError> {
    let access_token = access_token_for(app_state, user)?;

    let refresh_token = session::generate_refresh_token();
    let expires_at = Utc::now() + Duration::seconds(app_state.env.refresh_token_maxage);

    app_state
        .db_client
        .save_refresh_token(
            user.id,
            &session::hash_refresh_token(&refresh_token),
            expires_at,
        )
        .await
        .map_err(|e| {
            tracing::error!(user_id = %user.id, "DB error, saving refresh token: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    Ok((access_token, refresh_token))
}

fn check_new_password(password: &str) -> Result<(), HttpError> {
    if password.chars().count() < password::MIN_PASSWORD_LENGTH {
        return Err(HttpError::bad_request(format!(
            "Password must be at least {} characters",
            password::MIN_PASSWORD_LENGTH
        )));
    }
    if password.len() > password::MAX_PASSWORD_LENGTH {
        return Err(HttpError::bad_request(
            ErrorMessage::ExceededMaxPasswordLength(password::MAX_PASSWORD_LENGTH).to_string(),
        ));
    }
    Ok(())
}

/// Register a new account (multipart).
///
/// Every role except commentator must upload a profile picture and then
/// wait for approval. A confirmation link is mailed either way.
#[instrument(skip(app_state, multipart))]
pub async fn register(
    State(app_state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let form = MultipartForm::read(multipart, app_state.env.max_upload_bytes).await?;

    let fields = RegisterUserDto {
        username: sanitize::strip_tags(form.text("username").unwrap_or_default()),
        email: form.text("email").unwrap_or_default().trim().to_string(),
        password: form.text("password").unwrap_or_default().to_string(),
        role: form.text("role").unwrap_or_default().trim().to_string(),
    };
    fields.check().map_err(|msg| {
        tracing::error!(email = %fields.email, "Register rejected: {}", msg);
        HttpError::bad_request(msg)
    })?;
    let RegisterUserDto {
        username,
        email,
        password: raw_password,
        role: raw_role,
    } = fields;
    let email = email.as_str();

    check_new_password(&raw_password)?;

    let role: UserRole = raw_role.parse().map_err(|e: String| {
        tracing::error!("Register with invalid role: {}", e);
        HttpError::bad_request("Invalid role")
    })?;

    let username_taken = app_state
        .db_client
        .get_user_by_username(&username)
        .await
        .map_err(db_err("checking username"))?
        .is_some();
    let email_taken = app_state
        .db_client
        .get_user_by_email(email)
        .await
        .map_err(db_err("checking email"))?
        .is_some();
    if username_taken || email_taken {
        tracing::error!(username = %username, email = %email, "User already exists");
        return Err(HttpError::unique_constraint_violation("User already exists"));
    }

    let profile_picture = match form.file("profile_picture") {
        Some(file) => Some(
            app_state
                .storage
                .save(UploadKind::ProfilePics, &file.filename, &username, &file.bytes)
                .await?,
        ),
        None if role == UserRole::Commentator => None,
        None => {
            return Err(HttpError::bad_request("Valid profile picture required"));
        }
    };

    let hash_password = password::hash(&raw_password).map_err(|e| {
        tracing::error!("Password hashing error: {}", e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })?;

    let marker = session::new_marker();
    let saved = app_state
        .db_client
        .save_user(NewUser {
            username: &username,
            email,
            password: Some(&hash_password),
            role,
            is_approved: role == UserRole::Commentator,
            is_confirmed: false,
            profile_picture: profile_picture.as_deref(),
            auth_provider: "email",
            session_token: &marker,
        })
        .await;

    let user = match saved {
        Ok(user) => user,
        Err(e) => {
            if let Some(file) = &profile_picture {
                app_state.storage.remove(UploadKind::ProfilePics, file).await;
            }
            return Err(HttpError::from_db("saving user", e, "User already exists"));
        }
    };

    // Mail failures are logged, never surfaced.
    match token::create_email_token(
        &user.email,
        EmailPurpose::EmailConfirm,
        app_state.env.jwt_secret.as_bytes(),
    ) {
        Ok(confirm_token) => {
            if let Err(e) = send_confirmation_email(
                &app_state.mailer,
                &user.email,
                &user.username,
                &confirm_token,
                &app_state.env.frontend_url,
            )
            .await
            {
                tracing::error!(user_id = %user.id, "Failed to send confirmation email: {}", e);
            }
        }
        Err(e) => tracing::error!(user_id = %user.id, "Confirmation token error: {}", e),
    }

    tracing::info!(user_id = %user.id, role = %role.to_str(), "Register Successful");
    Ok((
        StatusCode::CREATED,
        Json(Response::success(
            "Registration successful! Please check your email to confirm your account.",
        )),
    ))
}

/// Confirm an email address through the signed link.
#[instrument(skip(app_state, confirm_token))]
pub async fn confirm_email(
    State(app_state): State<AppState>,
    Path(confirm_token): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let email = token::decode_email_token(
        &confirm_token,
        EmailPurpose::EmailConfirm,
        app_state.env.jwt_secret.as_bytes(),
    )?;

    let user = app_state
        .db_client
        .confirm_user(&email)
        .await
        .map_err(db_err("confirming user"))?
        .ok_or_else(|| {
            tracing::error!(email = %email, "Confirmation for unknown account");
            HttpError::not_found(ErrorMessage::UserNotFound.to_string())
        })?;

    if let Err(e) = send_welcome_email(
        &app_state.mailer,
        &user.email,
        &user.username,
        !user.is_approved,
    )
    .await
    {
        tracing::error!(user_id = %user.id, "Failed to send welcome email: {}", e);
    }

    tracing::info!(user_id = %user.id, "Email confirmation successful");
    Ok(Json(Response::success("Email confirmed successfully.")))
}

/// Password login. Gates run in order: credentials, confirmation,
/// approval, block.
#[instrument(skip(app_state, jar, body), fields(email = %body.email))]
pub async fn login(
    State(app_state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid login input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let user = app_state
        .db_client
        .get_user_by_email(body.email.trim())
        .await
        .map_err(db_err("getting user for login"))?;

    let password_ok = match user.as_ref().and_then(|u| u.password.as_deref()) {
        Some(hashed) => password::compare(&body.password, hashed).unwrap_or_else(|e| {
            tracing::warn!("Password compare failed: {}", e);
            false
        }),
        None => false,
    };

    let user = session::login_gate(user.as_ref(), password_ok).inspect_err(|e| {
        tracing::warn!(email = %body.email, "Login rejected: {}", e.message);
    })?;

    let (access_token, refresh_token) = issue_tokens(&app_state, user).await?;
    let jar = with_session_cookies(jar, &app_state, &access_token, &refresh_token);

    tracing::info!(user_id = %user.id, "Login Successful");
    Ok((
        jar,
        Json(UserLoginResponseDto {
            status: "success".to_string(),
            access_token,
            refresh_token,
            user: FilterUserDto::filter_user(user, &app_state.storage),
        }),
    ))
}

/// Sign the caller out on every device.
#[instrument(skip(app_state, jar, auth))]
pub async fn logout(
    State(app_state): State<AppState>,
    jar: CookieJar,
    Extension(auth): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .db_client
        .rotate_session(auth.user.id, &session::new_marker())
        .await
        .map_err(db_err("rotating session on logout"))?;

    let jar = jar
        .remove(Cookie::build("access_token").path("/"))
        .remove(Cookie::build("refresh_token").path("/"));

    tracing::info!(user_id = %auth.user.id, "Logout Successful");
    Ok((jar, Json(Response::success("Logged out successfully"))))
}

/// Exchange a refresh token for a new access/refresh pair. The presented
/// token is revoked.
#[instrument(skip(app_state, jar, body))]
pub async fn refresh(
    State(app_state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequestDto>(&body)
            .map_err(|e| {
                tracing::error!("Invalid refresh body: {}", e);
                HttpError::bad_request("Invalid request body")
            })?
            .refresh_token
    };

    let raw = from_body
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get("refresh_token").map(|c| c.value().to_string()))
        .ok_or_else(|| {
            tracing::error!("Refresh token not provided");
            HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string())
        })?;

    let stored = app_state
        .db_client
        .get_refresh_token(&session::hash_refresh_token(&raw))
        .await
        .map_err(db_err("getting refresh token"))?
        .filter(|t| t.is_valid_at(Utc::now()))
        .ok_or_else(|| {
            tracing::error!("Refresh token unknown, revoked or expired");
            HttpError::unauthorized(ErrorMessage::InvalidToken.to_string())
        })?;

    let user = app_state
        .db_client
        .get_user_by_id(stored.user_id)
        .await
        .map_err(db_err("getting user for refresh"))?
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))?;

    if user.is_blocked {
        tracing::error!(user_id = %user.id, "Refresh for blocked account");
        return Err(HttpError::unauthorized(
            ErrorMessage::AccountBlocked.to_string(),
        ));
    }

    let refresh_token = session::generate_refresh_token();
    let expires_at = Utc::now() + Duration::seconds(app_state.env.refresh_token_maxage);

    app_state
        .db_client
        .rotate_refresh_token(
            stored.id,
            user.id,
            &session::hash_refresh_token(&refresh_token),
            expires_at,
        )
        .await
        .map_err(|e| match e {
            // Someone else used the token first.
            sqlx::Error::RowNotFound => {
                tracing::error!(user_id = %user.id, "Refresh token reused");
                HttpError::unauthorized(ErrorMessage::TokenRevoked.to_string())
            }
            e => HttpError::from_db("rotating refresh token", e, "Refresh failed"),
        })?;

    let access_token = access_token_for(&app_state, &user)?;
    let jar = with_session_cookies(jar, &app_state, &access_token, &refresh_token);

    tracing::info!(user_id = %user.id, "Token refreshed");
    Ok((
        jar,
        Json(RefreshResponseDto {
            status: "success".to_string(),
            access_token,
            refresh_token,
        }),
    ))
}

const RESET_REQUEST_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent.";

/// Always answers the same way so account existence is not revealed.
#[instrument(skip(app_state, body))]
pub async fn request_password_reset(
    State(app_state): State<AppState>,
    Json(body): Json<ResetPasswordRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid reset request input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let user = app_state
        .db_client
        .get_user_by_email(body.email.trim())
        .await
        .map_err(db_err("getting user for reset"))?;

    if let Some(user) = user {
        match token::create_email_token(
            &user.email,
            EmailPurpose::PasswordReset,
            app_state.env.jwt_secret.as_bytes(),
        ) {
            Ok(reset_token) => {
                if let Err(e) = send_reset_password_email(
                    &app_state.mailer,
                    &user.email,
                    &user.username,
                    &reset_token,
                    &app_state.env.frontend_url,
                )
                .await
                {
                    tracing::error!(user_id = %user.id, "Failed to send reset email: {}", e);
                }
            }
            Err(e) => tracing::error!(user_id = %user.id, "Reset token error: {}", e),
        }
    } else {
        tracing::info!("Password reset requested for unknown email");
    }

    Ok(Json(Response::success(RESET_REQUEST_MESSAGE)))
}

/// Store a new password. Every existing session is signed out.
#[instrument(skip(app_state, body))]
pub async fn confirm_password_reset(
    State(app_state): State<AppState>,
    Json(body): Json<ResetPasswordConfirmDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid reset confirm input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;
    check_new_password(&body.new_password)?;

    let email = token::decode_email_token(
        &body.token,
        EmailPurpose::PasswordReset,
        app_state.env.jwt_secret.as_bytes(),
    )?;

    let user = app_state
        .db_client
        .get_user_by_email(&email)
        .await
        .map_err(db_err("getting user for reset confirm"))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::UserNotFound.to_string()))?;

    let hash_password = password::hash(&body.new_password).map_err(|e| {
        tracing::error!("Password hashing error: {}", e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })?;

    app_state
        .db_client
        .update_user_password(user.id, &hash_password, &session::new_marker())
        .await
        .map_err(db_err("updating user password"))?;

    tracing::info!(user_id = %user.id, "Password reset successfully");
    Ok(Json(Response::success(
        "Password has been successfully reset.",
    )))
}

#[instrument(skip(app_state, auth))]
pub async fn me(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(UserResponseDto {
        status: "success".to_string(),
        user: FilterUserDto::filter_user(&auth.user, &app_state.storage),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_rules() {
        assert!(check_new_password("12345").is_err());
        assert!(check_new_password("123456").is_ok());
        let long = "x".repeat(password::MAX_PASSWORD_LENGTH + 1);
        assert_eq!(
            check_new_password(&long).unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn cookies_are_http_only_and_scoped_to_root() {
        let cookie = token_cookie("access_token", "abc".into(), 60);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(60)));
    }
}

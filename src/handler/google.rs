use crate::{
    AppState,
    db::{NewUser, UserExt},
    dtos::GoogleCallbackQuery,
    error::{HttpError, db_err},
    handler::auth::issue_tokens,
    models::{User, UserRole},
    oauth::GoogleUserInfo,
    session,
    utils::sanitize,
};
use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    routing::get,
};
use reqwest::Url;
use tracing::instrument;

pub const GOOGLE_PROVIDER: &str = "google";

/// Attempts with a numeric suffix before falling back to a random one.
const MAX_USERNAME_SUFFIX: u32 = 50;

pub fn google_handler() -> Router<AppState> {
    Router::new()
        .route("/google_login", get(google_login))
        .route("/google_callback", get(google_callback))
}

/// 303 to Google's consent screen.
#[instrument(skip(app_state))]
pub async fn google_login(State(app_state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    let url = app_state.google_client.authorize_url()?;
    Ok(Redirect::to(&url))
}

#[instrument(skip(app_state, query))]
pub async fn google_callback(
    State(app_state): State<AppState>,
    Query(query): Query<GoogleCallbackQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| HttpError::bad_request("Authorization code not provided"))?;

    let google_token = app_state.google_client.exchange_code(&code).await?;
    let profile = app_state.google_client.fetch_userinfo(&google_token).await?;

    let email = profile
        .email
        .clone()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| HttpError::bad_request("Google account missing email"))?;

    let existing = app_state
        .db_client
        .get_user_by_email(&email)
        .await
        .map_err(db_err("getting user for google login"))?;

    let user = match existing {
        Some(user) => {
            if user.is_blocked {
                tracing::error!(user_id = %user.id, "Google login for blocked account");
                return Err(HttpError::forbidden("Account blocked"));
            }
            if user.auth_provider == GOOGLE_PROVIDER {
                user
            } else {
                app_state
                    .db_client
                    .set_auth_provider(user.id, GOOGLE_PROVIDER)
                    .await
                    .map_err(db_err("updating auth provider"))?
            }
        }
        None => create_social_user(&app_state, &email, &profile).await?,
    };

    let (access_token, refresh_token) = issue_tokens(&app_state, &user).await?;

    let callback = format!(
        "{}/google-callback",
        app_state.env.frontend_url.trim_end_matches('/')
    );
    let target = Url::parse_with_params(
        &callback,
        &[("token", access_token.as_str()), ("refresh", refresh_token.as_str())],
    )
    .map_err(|e| {
        tracing::error!("invalid FRONTEND_URL: {}", e);
        HttpError::server_error("Frontend URL is not configured")
    })?;

    tracing::info!(user_id = %user.id, "Google login successful");
    Ok(Redirect::to(target.as_str()))
}

/// First free username for `base`: `base`, `base1`, `base2`...
async fn unique_username(app_state: &AppState, base: &str) -> Result<String, HttpError> {
    for n in 0..=MAX_USERNAME_SUFFIX {
        let candidate = if n == 0 {
            base.to_string()
        } else {
            format!("{}{}", base, n)
        };
        let taken = app_state
            .db_client
            .get_user_by_username(&candidate)
            .await
            .map_err(db_err("checking username"))?
            .is_some();
        if !taken {
            return Ok(candidate);
        }
    }

    let id = uuid::Uuid::new_v4().simple().to_string();
    Ok(format!("{}{}", base, &id[..8]))
}

/// New accounts from Google are confirmed, approved commentators.
async fn create_social_user(
    app_state: &AppState,
    email: &str,
    profile: &GoogleUserInfo,
) -> Result<User, HttpError> {
    let base = sanitize::sanitize_username(profile.name.as_deref().unwrap_or_default());
    let username = unique_username(app_state, &base).await?;
    let marker = session::new_marker();

    let user = app_state
        .db_client
        .save_user(NewUser {
            username: &username,
            email,
            password: None,
            role: UserRole::Commentator,
            is_approved: true,
            is_confirmed: true,
            profile_picture: profile.picture.as_deref(),
            auth_provider: GOOGLE_PROVIDER,
            session_token: &marker,
        })
        .await
        .map_err(|e| HttpError::from_db("creating google user", e, "User already exists"))?;

    tracing::info!(user_id = %user.id, "Created account from Google profile");
    Ok(user)
}

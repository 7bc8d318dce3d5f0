use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::IntoResponse,
};

use axum_extra::extract::cookie::CookieJar;

use crate::{
    AppState,
    db::UserExt,
    error::{ErrorMessage, HttpError},
    models::{User, UserRole},
    session,
    utils::token::{self, AccessClaims},
};

/// Authenticated caller, inserted into the request extensions by `auth`
/// (and by `optional_auth` when a valid token is present).
///
/// ```ignore
/// async fn my_handler(Extension(auth): Extension<JWTAuthMiddleware>) {
///     // auth.user is the freshly loaded row
/// }
/// ```
#[derive(Debug, Clone)]
pub struct JWTAuthMiddleware {
    pub user: User,
    pub claims: AccessClaims,
}

/// Bearer header first, then the `access_token` cookie set at login.
pub fn extract_token(headers: &HeaderMap, cookie_jar: &CookieJar) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| {
            cookie_jar
                .get("access_token")
                .map(|cookie| cookie.value().to_string())
                .filter(|token| !token.is_empty())
        })
}

/// Decode the token, load its user and check the session marker.
async fn authenticate(app_state: &AppState, token: String) -> Result<JWTAuthMiddleware, HttpError> {
    // Signature, expiry and algorithm; any failure is a 401
    let claims = token::decode_access_token(token, app_state.env.jwt_secret.as_bytes())?;

    // `sub` holds the user id as a string
    let user_id = uuid::Uuid::parse_str(&claims.sub)
        .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))?;

    // Always load the current row: role, block flag and marker may have
    // changed since the token was issued. A failed query is a 500, a
    // missing row (user deleted) a 401.
    let user = app_state
        .db_client
        .get_user_by_id(user_id)
        .await
        .map_err(|e| {
            tracing::error!("auth lookup failed for {}: {}", user_id, e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))?;

    // Blocked accounts and rotated markers both end here.
    session::verify_session(&user, &claims)?;

    // Handlers read the fresh row from here, never the token's role claim
    Ok(JWTAuthMiddleware { user, claims })
}

/// Authentication middleware.
///
/// 1. Extracts the token (Authorization header, then cookie)
/// 2. Verifies signature and expiry
/// 3. Loads the user; a deleted user is a 401
/// 4. Rejects blocked users and tokens whose session marker is stale
///
/// Token and session failures are 401; a failed user lookup is a 500.
pub async fn auth(
    cookie_jar: CookieJar,
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    // Bearer header wins over the cookie when both are sent
    let token = extract_token(req.headers(), &cookie_jar)
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let auth = authenticate(&app_state, token).await?;
    tracing::debug!("authenticated {} as {}", auth.user.id, auth.user.role.to_str());

    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}

/// Like `auth` but never rejects: a missing or unusable token leaves the
/// request anonymous. Used by public pages that personalize their output.
pub async fn optional_auth(
    cookie_jar: CookieJar,
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> impl IntoResponse {
    if let Some(token) = extract_token(req.headers(), &cookie_jar) {
        match authenticate(&app_state, token).await {
            Ok(auth) => {
                req.extensions_mut().insert(auth);
            }
            Err(e) => tracing::debug!("ignoring token on public route: {}", e.message),
        }
    }

    next.run(req).await
}

/// Role gate. Must run after `auth`.
///
/// # Errors
/// 401 if the request was not authenticated, 403 if the caller's role is
/// not in `required_roles`.
pub async fn role_check(
    req: Request,
    next: Next,
    required_roles: Vec<UserRole>,
) -> Result<impl IntoResponse, HttpError> {
    let auth = req
        .extensions()
        .get::<JWTAuthMiddleware>()
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNotAuthenticated.to_string()))?;

    // Authenticated but not allowed: 403, not 401
    if !required_roles.contains(&auth.user.role) {
        return Err(HttpError::forbidden(
            ErrorMessage::PermissionDenied.to_string(),
        ));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum_extra::extract::cookie::Cookie;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        let jar = CookieJar::new().add(Cookie::new("access_token", "fromcookie"));

        assert_eq!(extract_token(&headers, &jar).as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_is_used_without_header() {
        let jar = CookieJar::new().add(Cookie::new("access_token", "fromcookie"));
        assert_eq!(
            extract_token(&HeaderMap::new(), &jar).as_deref(),
            Some("fromcookie")
        );
    }

    #[test]
    fn non_bearer_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(extract_token(&headers, &CookieJar::new()), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_token(&headers, &CookieJar::new()), None);
    }
}

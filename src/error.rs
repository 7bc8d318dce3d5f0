use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON body returned for every failed request.
///
/// ```json
/// { "status": "fail", "msg": "Invalid credentials" }
/// ```
///
/// Kept apart from `HttpError` so the wire format never leaks internal
/// context such as database error text.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub msg: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Canonical messages shared by several endpoints.
///
/// PartialEq lets tests compare variants directly.
#[derive(Debug, PartialEq)]
pub enum ErrorMessage {
    // Password validation
    EmptyPassword,
    ExceededMaxPasswordLength(usize),
    InvalidHashFormat,
    HashingError,

    // Authentication
    InvalidCredentials,
    InvalidToken,
    TokenNotProvided,
    TokenRevoked,
    AccountBlocked,
    UserNotAuthenticated,
    UserNoLongerExist,

    // Authorization
    PermissionDenied,

    // Lookups
    UserNotFound,
    PostNotFound,
    CommentNotFound,
    CategoryNotFound,
    MessageNotFound,

    ServerError,
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ErrorMessage::EmptyPassword => "Password cannot be empty".to_string(),
            ErrorMessage::ExceededMaxPasswordLength(max_length) => {
                format!("Password must not be more than {} characters", max_length)
            }
            ErrorMessage::InvalidHashFormat => "Invalid password hash format".to_string(),
            ErrorMessage::HashingError => "Error while hashing password".to_string(),
            ErrorMessage::InvalidCredentials => "Invalid credentials".to_string(),
            ErrorMessage::InvalidToken => "Token is invalid or expired".to_string(),
            ErrorMessage::TokenNotProvided => {
                "You are not logged in, please provide a token".to_string()
            }
            ErrorMessage::TokenRevoked => "Token has been revoked".to_string(),
            ErrorMessage::AccountBlocked => "Unauthorized or account blocked".to_string(),
            ErrorMessage::UserNotAuthenticated => {
                "Authentication required. Please log in.".to_string()
            }
            ErrorMessage::UserNoLongerExist => {
                "User belonging to this token no longer exists".to_string()
            }
            ErrorMessage::PermissionDenied => {
                "You are not allowed to perform this action".to_string()
            }
            ErrorMessage::UserNotFound => "User not found".to_string(),
            ErrorMessage::PostNotFound => "Post not found".to_string(),
            ErrorMessage::CommentNotFound => "Comment not found".to_string(),
            ErrorMessage::CategoryNotFound => "Category not found".to_string(),
            ErrorMessage::MessageNotFound => "Message not found".to_string(),
            ErrorMessage::ServerError => "Server Error. Please try again later".to_string(),
        };
        write!(f, "{}", message)
    }
}

/// Error type returned by handlers, middleware and helpers.
///
/// Handlers return `Result<T, HttpError>`; axum turns the error side into a
/// JSON response through the `IntoResponse` impl below.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
    pub message: String,
    pub status: StatusCode,
}

impl HttpError {
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        HttpError {
            message: message.into(),
            status,
        }
    }

    /// 500
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// 400
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::BAD_REQUEST)
    }

    /// 409, used for unique constraint violations (title, email, username...)
    pub fn unique_constraint_violation(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::CONFLICT)
    }

    /// 401: the caller is not authenticated, or its token no longer counts.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::UNAUTHORIZED)
    }

    /// 403: authenticated but not allowed.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::FORBIDDEN)
    }

    /// 404
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::NOT_FOUND)
    }

    /// 413
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::PAYLOAD_TOO_LARGE)
    }

    /// Log a database failure and turn it into a client-safe error.
    ///
    /// Unique violations become 409 with `conflict` as the message; every
    /// other failure is a generic 500.
    pub fn from_db(context: &str, err: sqlx::Error, conflict: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                tracing::warn!("DB unique violation, {}: {}", context, db_err);
                return HttpError::unique_constraint_violation(conflict);
            }
        }
        tracing::error!("DB error, {}: {}", context, err);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    }

    pub fn into_http_response(self) -> Response {
        let json_response = Json(ErrorResponse {
            status: "fail".to_string(),
            msg: self.message,
        });

        (self.status, json_response).into_response()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HttpError: message: {}, status: {}",
            self.message, self.status
        )
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        self.into_http_response()
    }
}

/// Shorthand for the `map_err` closure handlers use on plain lookups and
/// updates, where a unique violation cannot happen.
pub fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> HttpError {
    move |e| HttpError::from_db(context, e, "Resource already exists")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn error_body_carries_status_and_msg() {
        let response = HttpError::forbidden("nope").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.status, "fail");
        assert_eq!(body.msg, "nope");
    }

    #[test]
    fn row_not_found_is_a_server_error_when_mapped_generically() {
        let err = HttpError::from_db("test", sqlx::Error::RowNotFound, "dup");
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, ErrorMessage::ServerError.to_string());
    }

    #[test]
    fn password_length_message_mentions_limit() {
        let msg = ErrorMessage::ExceededMaxPasswordLength(64).to_string();
        assert!(msg.contains("64"));
    }
}

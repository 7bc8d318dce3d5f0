use axum::{Router, extract::DefaultBodyLimit};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    AppState,
    error::HttpError,
    handler::{
        auth::auth_handler, category::category_handler, comment::comment_handler,
        contact::contact_handler, post::post_handler, users::users_handler,
        watched::watched_handler,
    },
};

/// Upper bound for a whole request body, multipart uploads included.
/// Single files are additionally capped at `max_upload_bytes`.
pub const BODY_LIMIT: usize = 2 * 1024 * 1024;

pub fn create_router(app_state: AppState) -> Router {
    let api_route = Router::new()
        .nest("/auth", auth_handler(app_state.clone()))
        .nest("/users", users_handler(app_state.clone()))
        .nest("/posts", post_handler(app_state.clone()))
        .nest("/comments", comment_handler(app_state.clone()))
        .nest("/categories", category_handler(app_state.clone()))
        .nest("/contact", contact_handler(app_state.clone()))
        .nest("/watched", watched_handler(app_state.clone()));

    Router::new()
        .nest("/api", api_route)
        .nest_service(
            "/static/uploads",
            ServeDir::new(app_state.storage.root()),
        )
        .fallback(|| async { HttpError::not_found("Route not found") })
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

use crate::AppState;
use crate::db::{PostExt, PostFilter, WatchedExt, WatchedFilter};
use crate::dtos::{ListResponseDto, PageQuery, PostSummaryDto, Response, UnwatchedQuery};
use crate::error::{ErrorMessage, HttpError, db_err};
use crate::handler::post::list_page;
use crate::middleware::{JWTAuthMiddleware, auth};
use crate::policy;
use crate::utils::pagination::Page;
use axum::Extension;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::{Router, middleware};
use tracing::instrument;
use uuid::Uuid;

/// Every route needs a logged-in user.
pub fn watched_handler(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/posts/{post_id}/watch", post(watch_post))
        .route("/posts/{post_id}/unwatch", delete(unwatch_post))
        .route("/dashboard/watched", get(watched_posts))
        .route("/dashboard/unwatched", get(unwatched_posts))
        .route("/dashboard/all", get(all_posts))
        .route_layer(middleware::from_fn_with_state(app_state, auth))
}

async fn ensure_watchable(
    app_state: &AppState,
    jwt: &JWTAuthMiddleware,
    post_id: i32,
) -> Result<(), HttpError> {
    let post = app_state
        .db_client
        .get_post(post_id)
        .await
        .map_err(db_err("getting post"))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::PostNotFound.to_string()))?;

    if policy::can_view_post(Some(&jwt.user), post.author_id, post.is_published) {
        Ok(())
    } else {
        Err(HttpError::not_found(ErrorMessage::PostNotFound.to_string()))
    }
}

/// Idempotent.
#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn watch_post(
    Path(post_id): Path<i32>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    ensure_watchable(&app_state, &jwt, post_id).await?;

    app_state
        .db_client
        .watch_post(jwt.user.id, post_id)
        .await
        .map_err(db_err("watching post"))?;

    Ok(Json(Response::success("Post marked as watched")))
}

/// Idempotent.
#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn unwatch_post(
    Path(post_id): Path<i32>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    ensure_watchable(&app_state, &jwt, post_id).await?;

    app_state
        .db_client
        .unwatch_post(jwt.user.id, post_id)
        .await
        .map_err(db_err("unwatching post"))?;

    Ok(Json(Response::success("Post removed from watched")))
}

/// Published posts, each flagged with `is_watched` for `user_id`.
pub(crate) async fn dashboard(
    app_state: &AppState,
    user_id: Uuid,
    filter: PostFilter,
    page: Page,
) -> Result<Json<ListResponseDto<PostSummaryDto>>, HttpError> {
    let (mut data, pagination) = list_page(app_state, &filter, page).await?;

    let ids: Vec<i32> = data.iter().map(|p| p.id).collect();
    let watched = match filter.watched {
        Some((_, WatchedFilter::Watched)) => ids,
        Some((_, WatchedFilter::Unwatched)) => Vec::new(),
        None => app_state
            .db_client
            .get_watched_ids(user_id, &ids)
            .await
            .map_err(db_err("getting watched ids"))?,
    };

    for post in &mut data {
        post.is_watched = Some(watched.contains(&post.id));
    }

    Ok(Json(ListResponseDto::new(data, pagination)))
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn watched_posts(
    Query(params): Query<PageQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let filter = PostFilter {
        published: Some(true),
        watched: Some((jwt.user.id, WatchedFilter::Watched)),
        ..Default::default()
    };
    dashboard(
        &app_state,
        jwt.user.id,
        filter,
        Page::new(params.page, params.per_page),
    )
    .await
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn unwatched_posts(
    Query(params): Query<UnwatchedQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let filter = PostFilter {
        published: Some(true),
        category_id: params.category_id,
        watched: Some((jwt.user.id, WatchedFilter::Unwatched)),
        ..Default::default()
    };
    dashboard(
        &app_state,
        jwt.user.id,
        filter,
        Page::new(params.page, params.per_page),
    )
    .await
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn all_posts(
    Query(params): Query<PageQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let filter = PostFilter {
        published: Some(true),
        ..Default::default()
    };
    dashboard(
        &app_state,
        jwt.user.id,
        filter,
        Page::new(params.page, params.per_page),
    )
    .await
}

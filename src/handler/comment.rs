use std::collections::HashMap;

use crate::AppState;
use crate::db::{CommentExt, PostExt};
use crate::dtos::{
    CommentDto, CommentResponseDto, InputCommentDto, ListResponseDto, PageQuery, RateDto,
    RatingResponseDto, Response, round2,
};
use crate::error::{ErrorMessage, HttpError, db_err};
use crate::middleware::{JWTAuthMiddleware, auth, optional_auth};
use crate::models::{Comment, User};
use crate::policy;
use crate::utils::pagination::Page;
use crate::utils::sanitize;
use axum::Extension;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post, put};
use axum::{Router, middleware};
use tracing::instrument;
use validator::Validate;

/// Router for comment endpoints
pub fn comment_handler(app_state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/add_comment/{post_id}", post(add_comment))
        .route("/edit_comment/{comment_id}", put(edit_comment))
        .route("/delete_comment/{comment_id}", delete(delete_comment))
        .route("/rate/{comment_id}", post(rate_comment))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), auth));

    Router::new()
        // Public; a valid token adds the caller's ratings and edit rights
        .route(
            "/posts/{post_id}",
            get(get_comments).route_layer(middleware::from_fn_with_state(app_state, optional_auth)),
        )
        .merge(protected)
}

/// 404 unless the post exists and `viewer` may see it.
async fn ensure_post_visible(
    app_state: &AppState,
    post_id: i32,
    viewer: Option<&User>,
) -> Result<(), HttpError> {
    let post = app_state
        .db_client
        .get_post(post_id)
        .await
        .map_err(db_err("getting post"))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::PostNotFound.to_string()))?;

    if policy::can_view_post(viewer, post.author_id, post.is_published) {
        Ok(())
    } else {
        Err(HttpError::not_found(ErrorMessage::PostNotFound.to_string()))
    }
}

async fn load_comment(app_state: &AppState, comment_id: i32) -> Result<Comment, HttpError> {
    app_state
        .db_client
        .get_comment(comment_id)
        .await
        .map_err(db_err("getting comment"))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::CommentNotFound.to_string()))
}

/// Sanitized content; blank after cleaning is a 400.
fn clean_content(body: &InputCommentDto) -> Result<String, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid comment input: {}", e);
        HttpError::bad_request("Content is required")
    })?;

    let content = sanitize::sanitize_html(body.content.trim());
    if content.is_empty() {
        return Err(HttpError::bad_request("Content is required"));
    }
    Ok(content)
}

#[instrument(skip(app_state, jwt, body), fields(user_id = %jwt.user.id))]
pub async fn add_comment(
    Path(post_id): Path<i32>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    Json(body): Json<InputCommentDto>,
) -> Result<impl IntoResponse, HttpError> {
    ensure_post_visible(&app_state, post_id, Some(&jwt.user)).await?;
    let content = clean_content(&body)?;

    let comment = app_state
        .db_client
        .add_comment(post_id, jwt.user.id, &content)
        .await
        .map_err(db_err("adding comment"))?;

    tracing::info!(comment_id = comment.id, post_id, "Comment added");
    Ok((
        StatusCode::CREATED,
        Json(CommentResponseDto {
            status: "success".to_string(),
            message: "Comment added".to_string(),
            comment,
        }),
    ))
}

/// Newest first, with average ratings.
#[instrument(skip(app_state, auth))]
pub async fn get_comments(
    Path(post_id): Path<i32>,
    Query(params): Query<PageQuery>,
    State(app_state): State<AppState>,
    auth: Option<Extension<JWTAuthMiddleware>>,
) -> Result<impl IntoResponse, HttpError> {
    let viewer: Option<&User> = auth.as_ref().map(|Extension(a)| &a.user);
    ensure_post_visible(&app_state, post_id, viewer).await?;

    let page = Page::new(params.page, params.per_page);
    let (rows, total) = app_state
        .db_client
        .get_comments(post_id, page.limit(), page.offset())
        .await
        .map_err(db_err("getting comments"))?;

    let ratings: HashMap<i32, i32> = match viewer {
        Some(user) => {
            let ids: Vec<i32> = rows.iter().map(|c| c.id).collect();
            app_state
                .db_client
                .get_user_comment_ratings(user.id, &ids)
                .await
                .map_err(db_err("getting comment ratings"))?
                .into_iter()
                .collect()
        }
        None => HashMap::new(),
    };

    let data = rows
        .iter()
        .map(|c| {
            CommentDto::from_row(
                c,
                ratings.get(&c.id).copied(),
                viewer.is_some_and(|v| policy::can_modify_comment(v, c.user_id)),
            )
        })
        .collect();

    Ok(Json(ListResponseDto::new(data, page.meta(total))))
}

#[instrument(skip(app_state, jwt, body), fields(user_id = %jwt.user.id))]
pub async fn edit_comment(
    Path(comment_id): Path<i32>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    Json(body): Json<InputCommentDto>,
) -> Result<impl IntoResponse, HttpError> {
    let comment = load_comment(&app_state, comment_id).await?;
    if !policy::can_modify_comment(&jwt.user, comment.user_id) {
        return Err(HttpError::forbidden(
            ErrorMessage::PermissionDenied.to_string(),
        ));
    }

    let content = clean_content(&body)?;
    let comment = app_state
        .db_client
        .update_comment(comment_id, &content)
        .await
        .map_err(db_err("updating comment"))?;

    tracing::info!(comment_id, "Comment updated");
    Ok(Json(CommentResponseDto {
        status: "success".to_string(),
        message: "Comment updated".to_string(),
        comment,
    }))
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn delete_comment(
    Path(comment_id): Path<i32>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let comment = load_comment(&app_state, comment_id).await?;
    if !policy::can_modify_comment(&jwt.user, comment.user_id) {
        return Err(HttpError::forbidden(
            ErrorMessage::PermissionDenied.to_string(),
        ));
    }

    let deleted = app_state
        .db_client
        .delete_comment(comment_id)
        .await
        .map_err(db_err("deleting comment"))?;
    if !deleted {
        return Err(HttpError::not_found(
            ErrorMessage::CommentNotFound.to_string(),
        ));
    }

    tracing::info!(comment_id, "Comment deleted");
    Ok(Json(Response::success("Comment deleted")))
}

#[instrument(skip(app_state, jwt, body), fields(user_id = %jwt.user.id))]
pub async fn rate_comment(
    Path(comment_id): Path<i32>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    Json(body): Json<RateDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    load_comment(&app_state, comment_id).await?;

    let avg = app_state
        .db_client
        .rate_comment(comment_id, jwt.user.id, body.value)
        .await
        .map_err(db_err("rating comment"))?;

    Ok(Json(RatingResponseDto {
        status: "success".to_string(),
        user_rating: body.value,
        avg_rating: round2(avg),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_content_is_sanitized_and_required() {
        let body = InputCommentDto {
            content: "  <p>Nice <script>alert(1)</script>post</p> ".into(),
        };
        assert_eq!(clean_content(&body).unwrap(), "<p>Nice post</p>");

        let blank = InputCommentDto {
            content: "<script>x</script>".into(),
        };
        assert_eq!(
            clean_content(&blank).unwrap_err().status,
            StatusCode::BAD_REQUEST
        );

        let empty = InputCommentDto { content: String::new() };
        assert!(clean_content(&empty).is_err());
    }
}

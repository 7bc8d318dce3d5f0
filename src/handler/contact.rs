use crate::AppState;
use crate::db::{ContactExt, MessageFilter};
use crate::dtos::{ContactMessageDto, DataResponseDto, ListResponseDto, PageQuery, SearchPageQuery};
use crate::error::{ErrorMessage, HttpError, db_err};
use crate::middleware::{auth, role_check};
use crate::models::{ContactMessage, UserRole};
use crate::utils::pagination::Page;
use crate::utils::sanitize;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post, put};
use axum::{Router, middleware};
use tracing::instrument;
use validator::Validate;

pub fn contact_handler(app_state: AppState) -> Router<AppState> {
    let inbox = Router::new()
        .route("/messages", get(all_messages))
        .route("/messages/unread", get(unread_messages))
        .route("/messages/unactioned", get(unactioned_messages))
        .route("/messages/actioned", get(actioned_messages))
        .route("/messages/search", get(search_messages))
        .route("/mark_read/{msg_id}", put(mark_read))
        .route("/mark_unread/{msg_id}", put(mark_unread))
        .route("/mark_actioned/{msg_id}", put(mark_actioned))
        .route("/mark_unactioned/{msg_id}", put(mark_unactioned))
        .route_layer(middleware::from_fn(|req, next| {
            role_check(req, next, vec![UserRole::Admin, UserRole::Superadmin])
        }))
        .route_layer(middleware::from_fn_with_state(app_state, auth));

    Router::new()
        .route("/send_message", post(send_message))
        .merge(inbox)
}

/// Public contact form. Markup is stripped before the length checks.
#[instrument(skip(app_state, body))]
pub async fn send_message(
    State(app_state): State<AppState>,
    Json(body): Json<ContactMessageDto>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.cleaned();
    body.validate().map_err(|e| {
        tracing::error!("Invalid contact message: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let message = app_state
        .db_client
        .save_message(&body.email, &body.subject, &body.message)
        .await
        .map_err(db_err("saving contact message"))?;

    tracing::info!(message_id = message.id, "Contact message received");
    Ok((StatusCode::CREATED, Json(DataResponseDto::new(message))))
}

async fn list_messages(
    app_state: &AppState,
    filter: MessageFilter,
    params: PageQuery,
) -> Result<ListResponseDto<ContactMessage>, HttpError> {
    let page = Page::new(params.page, params.per_page);
    let (messages, total) = app_state
        .db_client
        .get_messages(filter, page.limit(), page.offset())
        .await
        .map_err(db_err("listing contact messages"))?;

    Ok(ListResponseDto::new(messages, page.meta(total)))
}

#[instrument(skip(app_state))]
pub async fn all_messages(
    Query(params): Query<PageQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(list_messages(&app_state, MessageFilter::All, params).await?))
}

#[instrument(skip(app_state))]
pub async fn unread_messages(
    Query(params): Query<PageQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(list_messages(&app_state, MessageFilter::Unread, params).await?))
}

#[instrument(skip(app_state))]
pub async fn unactioned_messages(
    Query(params): Query<PageQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(
        list_messages(&app_state, MessageFilter::Unactioned, params).await?,
    ))
}

#[instrument(skip(app_state))]
pub async fn actioned_messages(
    Query(params): Query<PageQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(
        list_messages(&app_state, MessageFilter::Actioned, params).await?,
    ))
}

/// Email, subject or body containing `q`, newest first.
#[instrument(skip(app_state))]
pub async fn search_messages(
    Query(params): Query<SearchPageQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let query = sanitize::strip_tags(params.q.as_deref().unwrap_or_default());
    if query.is_empty() {
        return Err(HttpError::bad_request("Search query cannot be empty"));
    }

    let page = Page::new(params.page, params.per_page);
    let (messages, total) = app_state
        .db_client
        .search_messages(&query, page.limit(), page.offset())
        .await
        .map_err(db_err("searching contact messages"))?;

    Ok(Json(ListResponseDto::new(messages, page.meta(total))))
}

fn found(message: Option<ContactMessage>) -> Result<Json<DataResponseDto<ContactMessage>>, HttpError> {
    message
        .map(|m| Json(DataResponseDto::new(m)))
        .ok_or_else(|| HttpError::not_found(ErrorMessage::MessageNotFound.to_string()))
}

#[instrument(skip(app_state))]
pub async fn mark_read(
    Path(msg_id): Path<i32>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    found(
        app_state
            .db_client
            .set_read(msg_id, true)
            .await
            .map_err(db_err("marking message read"))?,
    )
}

#[instrument(skip(app_state))]
pub async fn mark_unread(
    Path(msg_id): Path<i32>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    found(
        app_state
            .db_client
            .set_read(msg_id, false)
            .await
            .map_err(db_err("marking message unread"))?,
    )
}

#[instrument(skip(app_state))]
pub async fn mark_actioned(
    Path(msg_id): Path<i32>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    found(
        app_state
            .db_client
            .set_actioned(msg_id, true)
            .await
            .map_err(db_err("marking message actioned"))?,
    )
}

#[instrument(skip(app_state))]
pub async fn mark_unactioned(
    Path(msg_id): Path<i32>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    found(
        app_state
            .db_client
            .set_actioned(msg_id, false)
            .await
            .map_err(db_err("marking message unactioned"))?,
    )
}

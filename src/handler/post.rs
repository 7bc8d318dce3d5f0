use std::collections::HashMap;

use axum::http::StatusCode;
use axum::{Extension, Router, middleware};
use axum::extract::{Multipart, Path, Query, State};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post, put};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::db::{
    CommentExt, PostExt, PostFilter, PostRow, PostSort, RejectionExt, SortOrder, UserExt,
    WatchedFilter,
};
use crate::dtos::{
    AdminPostsQuery, AuthorDirectoryEntryDto, AuthorDirectoryQuery, AuthorNameQuery,
    AuthorPostsQuery, CategoryPostsQuery, CategoryRefDto, CheckTitleDto, CommentDto,
    DataResponseDto, ListResponseDto, PageQuery, PostDetailDto, PostDetailResponseDto,
    PostFilterQuery, PostResponseDto, PostSummaryDto, RateDto, RatingResponseDto,
    RejectionCheckDto, RejectionDto, Response, TitleExistsDto, UserDashboardQuery, round2,
};
use crate::error::{ErrorMessage, HttpError, db_err};
use crate::handler::watched::dashboard;
use crate::middleware::{JWTAuthMiddleware, auth, optional_auth, role_check};
use crate::models::{User, UserRole};
use crate::policy;
use crate::utils::multipart::{MultipartForm, category_ids};
use crate::utils::pagination::Page;
use crate::utils::sanitize;
use crate::utils::storage::UploadKind;

/// Comments shown per page on the post detail view.
pub const DETAIL_COMMENTS_PER_PAGE: u32 = 5;

pub fn post_handler(app_state: AppState) -> Router<AppState> {
    let writers = Router::new()
        .route("/create_post", post(create_post))
        .route("/check_existence", post(check_existence))
        .route("/reject", post(reject_request))
        .route_layer(middleware::from_fn(|req, next| {
            role_check(
                req,
                next,
                vec![UserRole::Author, UserRole::Admin, UserRole::Superadmin],
            )
        }));

    let protected = Router::new()
        .route("/user_dashboard", get(user_dashboard))
        .route("/edit_post/{post_id}", put(edit_post))
        .route("/{post_id}/publish", put(publish_post))
        .route("/{post_id}/unpublish", put(unpublish_post))
        .route("/{post_id}", delete(delete_post))
        .route("/rate/{post_id}", post(rate_post))
        .route("/author/posts", get(my_posts))
        .route(
            "/admin_list",
            get(admin_list).route_layer(middleware::from_fn(|req, next| {
                role_check(req, next, vec![UserRole::Admin, UserRole::Superadmin])
            })),
        )
        .merge(writers)
        .route_layer(middleware::from_fn_with_state(app_state.clone(), auth));

    Router::new()
        .route("/", get(list_posts))
        .route("/check-title", post(check_title))
        .route("/authors/{author_id}/posts", get(author_posts))
        .route("/posts_by_category", get(posts_by_category))
        .route("/authors/get_all_authors", get(author_directory))
        .route("/search_by_author", get(search_by_author))
        .route(
            "/filter",
            get(filter_posts)
                .route_layer(middleware::from_fn_with_state(app_state.clone(), optional_auth)),
        )
        .route(
            "/{post_id}",
            get(get_post_detail)
                .route_layer(middleware::from_fn_with_state(app_state, optional_auth)),
        )
        .merge(protected)
}

/// Attach categories and image URLs to a page of rows.
pub(crate) async fn build_summaries(
    app_state: &AppState,
    rows: &[PostRow],
) -> Result<Vec<PostSummaryDto>, HttpError> {
    let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let categories = app_state
        .db_client
        .get_post_categories(&ids)
        .await
        .map_err(db_err("getting post categories"))?;
    let images = app_state
        .db_client
        .get_post_images(&ids)
        .await
        .map_err(db_err("getting post images"))?;

    let mut categories_by_post: HashMap<i32, Vec<CategoryRefDto>> = HashMap::new();
    for c in &categories {
        categories_by_post
            .entry(c.post_id)
            .or_default()
            .push(CategoryRefDto::from(c));
    }

    let mut images_by_post: HashMap<i32, Vec<String>> = HashMap::new();
    for img in &images {
        images_by_post
            .entry(img.post_id)
            .or_default()
            .push(app_state.storage.url(UploadKind::PostPics, &img.file_path));
    }

    Ok(rows
        .iter()
        .map(|row| {
            PostSummaryDto::from_row(
                row,
                categories_by_post.remove(&row.id).unwrap_or_default(),
                images_by_post.remove(&row.id).unwrap_or_default(),
                &app_state.storage,
            )
        })
        .collect())
}

/// Run a listing query and wrap it with pagination.
pub(crate) async fn list_page(
    app_state: &AppState,
    filter: &PostFilter,
    page: Page,
) -> Result<(Vec<PostSummaryDto>, crate::utils::pagination::PageMeta), HttpError> {
    let (rows, total) = app_state
        .db_client
        .get_posts(filter, page.limit(), page.offset())
        .await
        .map_err(db_err("listing posts"))?;

    let data = build_summaries(app_state, &rows).await?;
    Ok((data, page.meta(total)))
}

async fn load_post(app_state: &AppState, post_id: i32) -> Result<PostRow, HttpError> {
    app_state
        .db_client
        .get_post(post_id)
        .await
        .map_err(db_err("getting post"))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::PostNotFound.to_string()))
}

async fn post_response(
    app_state: &AppState,
    post_id: i32,
    message: &str,
) -> Result<PostResponseDto, HttpError> {
    let row = load_post(app_state, post_id).await?;
    let post = build_summaries(app_state, std::slice::from_ref(&row))
        .await?
        .pop()
        .ok_or_else(|| HttpError::not_found(ErrorMessage::PostNotFound.to_string()))?;

    Ok(PostResponseDto {
        status: "success".to_string(),
        message: message.to_string(),
        post,
    })
}

fn parse_status(status: Option<&str>) -> Option<bool> {
    match status.map(str::trim) {
        Some("published") => Some(true),
        Some("draft") => Some(false),
        _ => None,
    }
}

fn parse_sort(sort_by: Option<&str>) -> PostSort {
    match sort_by.map(str::trim) {
        Some("title") => PostSort::Title,
        Some("updated_at") => PostSort::UpdatedAt,
        Some("rating" | "avg_rating") => PostSort::Rating,
        _ => PostSort::CreatedAt,
    }
}

/// Reader dashboard: best rated first unless asked otherwise.
fn parse_dashboard_sort(sort_by: Option<&str>) -> PostSort {
    match sort_by.map(str::trim).filter(|s| !s.is_empty()) {
        None => PostSort::Rating,
        other => parse_sort(other),
    }
}

fn parse_watch_status(status: Option<&str>) -> Option<WatchedFilter> {
    match status.map(str::trim) {
        Some("watched") => Some(WatchedFilter::Watched),
        Some("unwatched") => Some(WatchedFilter::Unwatched),
        _ => None,
    }
}

/// `watched=true|false`; anything else applies no filter.
fn parse_watched_flag(flag: &str) -> Option<WatchedFilter> {
    match flag.trim().to_ascii_lowercase().as_str() {
        "true" => Some(WatchedFilter::Watched),
        "false" => Some(WatchedFilter::Unwatched),
        _ => None,
    }
}

fn parse_order(order: Option<&str>) -> SortOrder {
    match order.map(str::trim) {
        Some("asc") => SortOrder::Asc,
        _ => SortOrder::Desc,
    }
}

/// Published posts, newest first.
#[instrument(skip(app_state))]
pub async fn list_posts(
    Query(params): Query<PageQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let filter = PostFilter {
        published: Some(true),
        ..Default::default()
    };
    let (data, pagination) =
        list_page(&app_state, &filter, Page::new(params.page, params.per_page)).await?;

    Ok(Json(ListResponseDto::new(data, pagination)))
}

#[instrument(skip(app_state, body))]
pub async fn check_title(
    State(app_state): State<AppState>,
    Json(body): Json<CheckTitleDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let title = sanitize::sanitize_html(body.title.trim());
    let exists = app_state
        .db_client
        .title_exists(&title, None)
        .await
        .map_err(db_err("checking title"))?;

    Ok(Json(TitleExistsDto {
        status: "success".to_string(),
        exists,
    }))
}

/// Post with a page of comments. Anonymous callers are welcome; a valid
/// token adds the caller's own ratings and edit rights.
#[instrument(skip(app_state, auth))]
pub async fn get_post_detail(
    Path(post_id): Path<i32>,
    Query(params): Query<PageQuery>,
    State(app_state): State<AppState>,
    auth: Option<Extension<JWTAuthMiddleware>>,
) -> Result<impl IntoResponse, HttpError> {
    let viewer: Option<&User> = auth.as_ref().map(|Extension(a)| &a.user);

    let row = load_post(&app_state, post_id).await?;
    if !policy::can_view_post(viewer, row.author_id, row.is_published) {
        return Err(HttpError::not_found(ErrorMessage::PostNotFound.to_string()));
    }

    let summary = build_summaries(&app_state, std::slice::from_ref(&row))
        .await?
        .pop()
        .ok_or_else(|| HttpError::not_found(ErrorMessage::PostNotFound.to_string()))?;

    let page = Page::with_default(params.page, params.per_page, DETAIL_COMMENTS_PER_PAGE);
    let (comment_rows, total_comments) = app_state
        .db_client
        .get_comments(post_id, page.limit(), page.offset())
        .await
        .map_err(db_err("getting comments"))?;

    let (user_rating, comment_ratings) = match viewer {
        Some(user) => {
            let rating = app_state
                .db_client
                .get_user_post_rating(post_id, user.id)
                .await
                .map_err(db_err("getting post rating"))?;
            let comment_ids: Vec<i32> = comment_rows.iter().map(|c| c.id).collect();
            let ratings: HashMap<i32, i32> = app_state
                .db_client
                .get_user_comment_ratings(user.id, &comment_ids)
                .await
                .map_err(db_err("getting comment ratings"))?
                .into_iter()
                .collect();
            (rating, ratings)
        }
        None => (None, HashMap::new()),
    };

    let comments = comment_rows
        .iter()
        .map(|c| {
            CommentDto::from_row(
                c,
                comment_ratings.get(&c.id).copied(),
                viewer.is_some_and(|v| policy::can_modify_comment(v, c.user_id)),
            )
        })
        .collect();

    let post = PostDetailDto {
        id: row.id,
        title: row.title.clone(),
        content: row.content.clone(),
        is_published: row.is_published,
        author: summary.author,
        categories: summary.categories,
        images: summary.images,
        avg_rating: round2(row.avg_rating),
        user_rating,
        can_edit: viewer.is_some_and(|v| policy::can_edit_post(v, row.author_id).is_ok()),
        can_delete: viewer.is_some_and(|v| policy::can_delete_post(v).is_ok()),
        comments,
        comments_pagination: page.meta(total_comments),
        created_at: row.created_at,
        updated_at: row.updated_at,
    };

    Ok(Json(PostDetailResponseDto {
        status: "success".to_string(),
        post,
    }))
}

/// Multipart: `title`, `content`, repeated `categories`, `main_image`.
#[instrument(skip(app_state, jwt, multipart), fields(user_id = %jwt.user.id))]
pub async fn create_post(
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    policy::can_create_post(&jwt.user)?;

    let form = MultipartForm::read(multipart, app_state.env.max_upload_bytes).await?;

    let title = sanitize::sanitize_html(form.text("title").unwrap_or_default());
    let content = sanitize::sanitize_html(form.text("content").unwrap_or_default());
    let main_image = form.file("main_image");

    let Some(main_image) = main_image.filter(|_| !title.is_empty() && !content.is_empty()) else {
        tracing::error!("Create post missing fields");
        return Err(HttpError::bad_request(
            "Title, content and one main image are required",
        ));
    };

    let duplicate = app_state
        .db_client
        .title_exists(&title, None)
        .await
        .map_err(db_err("checking title"))?;
    if duplicate {
        return Err(HttpError::unique_constraint_violation(
            "A post with this title already exists",
        ));
    }

    let categories = category_ids(&form);
    let filename = app_state
        .storage
        .save(
            UploadKind::PostPics,
            &main_image.filename,
            &main_image.filename,
            &main_image.bytes,
        )
        .await?;

    let created = app_state
        .db_client
        .create_post(jwt.user.id, &title, &content, &categories, &filename)
        .await;

    let post = match created {
        Ok(post) => post,
        Err(e) => {
            app_state.storage.remove(UploadKind::PostPics, &filename).await;
            return Err(HttpError::from_db(
                "creating post",
                e,
                "A post with this title already exists",
            ));
        }
    };

    tracing::info!(post_id = post.id, "Post created");
    let response = post_response(&app_state, post.id, "Post created").await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Same fields as create. Categories are replaced; a new `main_image`
/// replaces every existing image.
#[instrument(skip(app_state, jwt, multipart), fields(user_id = %jwt.user.id))]
pub async fn edit_post(
    Path(post_id): Path<i32>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let existing = load_post(&app_state, post_id).await?;
    policy::can_edit_post(&jwt.user, existing.author_id)?;

    let form = MultipartForm::read(multipart, app_state.env.max_upload_bytes).await?;

    let title = sanitize::sanitize_html(form.text("title").unwrap_or_default());
    if title.is_empty() {
        return Err(HttpError::bad_request("Title is required"));
    }
    let content = sanitize::sanitize_html(form.text("content").unwrap_or_default());

    let duplicate = app_state
        .db_client
        .title_exists(&title, Some(post_id))
        .await
        .map_err(db_err("checking title"))?;
    if duplicate {
        return Err(HttpError::unique_constraint_violation(
            "A post with this title already exists",
        ));
    }

    let categories = category_ids(&form);

    let new_image = match form.file("main_image") {
        Some(file) => Some(
            app_state
                .storage
                .save(UploadKind::PostPics, &file.filename, &file.filename, &file.bytes)
                .await?,
        ),
        None => None,
    };

    let updated = app_state
        .db_client
        .update_post(post_id, &title, &content, &categories, new_image.as_deref())
        .await;

    let removed = match updated {
        Ok((_, removed)) => removed,
        Err(e) => {
            if let Some(file) = &new_image {
                app_state.storage.remove(UploadKind::PostPics, file).await;
            }
            return Err(HttpError::from_db(
                "updating post",
                e,
                "A post with this title already exists",
            ));
        }
    };

    for path in &removed {
        app_state.storage.remove(UploadKind::PostPics, path).await;
    }

    tracing::info!(post_id, "Post updated");
    Ok(Json(
        post_response(&app_state, post_id, "Post updated successfully").await?,
    ))
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn publish_post(
    Path(post_id): Path<i32>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    policy::can_publish(&jwt.user)?;

    let row = load_post(&app_state, post_id).await?;
    if row.is_published {
        return Err(HttpError::bad_request("Post is already published"));
    }

    app_state
        .db_client
        .set_published(post_id, true)
        .await
        .map_err(db_err("publishing post"))?;

    tracing::info!(post_id, "Post published");
    Ok(Json(
        post_response(&app_state, post_id, "Post published successfully").await?,
    ))
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn unpublish_post(
    Path(post_id): Path<i32>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    policy::require_staff(&jwt.user)?;

    load_post(&app_state, post_id).await?;
    app_state
        .db_client
        .set_published(post_id, false)
        .await
        .map_err(db_err("unpublishing post"))?;

    tracing::info!(post_id, "Post reverted to draft");
    Ok(Json(
        post_response(&app_state, post_id, "Post reverted to draft").await?,
    ))
}

/// Removes the post, its image files, comments, ratings and watch links.
#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn delete_post(
    Path(post_id): Path<i32>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    policy::can_delete_post(&jwt.user)?;

    let image_paths = app_state
        .db_client
        .delete_post(post_id)
        .await
        .map_err(db_err("deleting post"))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::PostNotFound.to_string()))?;

    for path in &image_paths {
        app_state.storage.remove(UploadKind::PostPics, path).await;
    }

    tracing::info!(post_id, "Post deleted");
    Ok(Json(Response::success("Post deleted")))
}

#[instrument(skip(app_state, jwt, body), fields(user_id = %jwt.user.id))]
pub async fn rate_post(
    Path(post_id): Path<i32>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    Json(body): Json<RateDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let row = load_post(&app_state, post_id).await?;
    if !policy::can_view_post(Some(&jwt.user), row.author_id, row.is_published) {
        return Err(HttpError::not_found(ErrorMessage::PostNotFound.to_string()));
    }

    let avg = app_state
        .db_client
        .rate_post(post_id, jwt.user.id, body.value)
        .await
        .map_err(db_err("rating post"))?;

    Ok(Json(RatingResponseDto {
        status: "success".to_string(),
        user_rating: body.value,
        avg_rating: round2(avg),
    }))
}

/// The caller's own posts, drafts included.
#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn my_posts(
    Query(params): Query<AuthorPostsQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let filter = PostFilter {
        published: parse_status(params.status.as_deref()),
        author_id: Some(jwt.user.id),
        category_name: params.category.clone(),
        title_search: params.search.clone(),
        sort: parse_sort(params.sort_by.as_deref()),
        order: parse_order(params.order.as_deref()),
        ..Default::default()
    };
    let (data, pagination) =
        list_page(&app_state, &filter, Page::new(params.page, params.per_page)).await?;

    Ok(Json(ListResponseDto::new(data, pagination)))
}

/// Published posts of one author.
#[instrument(skip(app_state))]
pub async fn author_posts(
    Path(author_id): Path<Uuid>,
    Query(params): Query<PageQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let filter = PostFilter {
        published: Some(true),
        author_id: Some(author_id),
        ..Default::default()
    };
    let (data, pagination) =
        list_page(&app_state, &filter, Page::new(params.page, params.per_page)).await?;

    Ok(Json(ListResponseDto::new(data, pagination)))
}

#[instrument(skip(app_state))]
pub async fn posts_by_category(
    Query(params): Query<CategoryPostsQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let filter = PostFilter {
        published: Some(true),
        category_id: params.category_id,
        text_search: params.q.clone(),
        ..Default::default()
    };
    let (data, pagination) =
        list_page(&app_state, &filter, Page::new(params.page, params.per_page)).await?;

    Ok(Json(ListResponseDto::new(data, pagination)))
}

/// Every post, drafts included, for the moderation screen.
#[instrument(skip(app_state))]
pub async fn admin_list(
    Query(params): Query<AdminPostsQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let filter = PostFilter {
        published: parse_status(params.status.as_deref()),
        title_search: params.search.clone(),
        ..Default::default()
    };
    let (data, pagination) =
        list_page(&app_state, &filter, Page::new(params.page, params.per_page)).await?;

    Ok(Json(ListResponseDto::new(data, pagination)))
}

/// Authors with at least one published post, most prolific first.
#[instrument(skip(app_state))]
pub async fn author_directory(
    Query(params): Query<AuthorDirectoryQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let page = Page::new(params.page, params.per_page);
    let (authors, total) = app_state
        .db_client
        .get_author_directory(params.search.as_deref(), page.limit(), page.offset())
        .await
        .map_err(db_err("listing authors"))?;

    let data = authors
        .iter()
        .map(|a| AuthorDirectoryEntryDto::from_summary(a, &app_state.storage))
        .collect();

    Ok(Json(ListResponseDto::new(data, page.meta(total))))
}

/// Published posts of the author whose name matches, ignoring case.
#[instrument(skip(app_state))]
pub async fn search_by_author(
    Query(params): Query<AuthorNameQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let Some(name) = params
        .author_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    else {
        return Err(HttpError::bad_request("Author name is required"));
    };

    let author = app_state
        .db_client
        .find_user_by_name(name)
        .await
        .map_err(db_err("finding author"))?
        .ok_or_else(|| HttpError::not_found(format!("No author found with name '{}'", name)))?;

    let filter = PostFilter {
        published: Some(true),
        author_id: Some(author.id),
        ..Default::default()
    };
    let (data, pagination) =
        list_page(&app_state, &filter, Page::new(params.page, params.per_page)).await?;

    Ok(Json(ListResponseDto::new(data, pagination)))
}

/// Reader dashboard over published posts, each flagged `is_watched`.
#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn user_dashboard(
    Query(params): Query<UserDashboardQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let filter = PostFilter {
        published: Some(true),
        title_search: params.search.clone(),
        author_name: params.author.clone(),
        category_name: params.category.clone(),
        watched: parse_watch_status(params.watch_status.as_deref()).map(|w| (jwt.user.id, w)),
        sort: parse_dashboard_sort(params.sort_by.as_deref()),
        order: parse_order(params.order.as_deref()),
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

/// Published posts narrowed by exact author / category and, for a
/// logged-in caller, by watch state.
#[instrument(skip(app_state, auth))]
pub async fn filter_posts(
    Query(params): Query<PostFilterQuery>,
    State(app_state): State<AppState>,
    auth: Option<Extension<JWTAuthMiddleware>>,
) -> Result<Json<ListResponseDto<PostSummaryDto>>, HttpError> {
    let viewer = auth.as_ref().map(|Extension(a)| a.user.id);

    let watched = match (params.watched.as_deref(), viewer) {
        (None, _) => None,
        (Some(_), None) => {
            return Err(HttpError::unauthorized("Login required for watched filter"));
        }
        (Some(flag), Some(user_id)) => parse_watched_flag(flag).map(|w| (user_id, w)),
    };

    let filter = PostFilter {
        published: Some(true),
        author_id: params.author_id,
        author_exact: params.author_name.clone(),
        category_id: params.category_id,
        category_exact: params.category_name.clone(),
        watched,
        sort: parse_sort(params.sort_by.as_deref()),
        order: parse_order(params.sort_dir.as_deref()),
        ..Default::default()
    };
    let page = Page::new(params.page, params.per_page);

    match viewer {
        Some(user_id) => dashboard(&app_state, user_id, filter, page).await,
        None => {
            let (data, pagination) = list_page(&app_state, &filter, page).await?;
            Ok(Json(ListResponseDto::new(data, pagination)))
        }
    }
}

fn rejection_input(body: RejectionDto) -> Result<RejectionDto, HttpError> {
    let body = body.cleaned();
    body.validate().map_err(|e| {
        tracing::error!("Invalid rejection input: {}", e);
        HttpError::bad_request("Title is required")
    })?;
    Ok(body)
}

/// Whether a title is already in the rejection ledger.
#[instrument(skip(app_state, jwt, body), fields(user_id = %jwt.user.id))]
pub async fn check_existence(
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    Json(body): Json<RejectionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let body = rejection_input(body)?;

    let rejected = app_state
        .db_client
        .is_title_rejected(&body.title)
        .await
        .map_err(db_err("checking rejections"))?;

    Ok(Json(RejectionCheckDto {
        status: "success".to_string(),
        exists: rejected,
        rejected,
    }))
}

/// Record a declined post request under the caller's username.
#[instrument(skip(app_state, jwt, body), fields(user_id = %jwt.user.id))]
pub async fn reject_request(
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    Json(body): Json<RejectionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let body = rejection_input(body)?;
    let conflict = format!(
        "The title '{}' has already been recorded as rejected.",
        body.title
    );

    let already = app_state
        .db_client
        .is_title_rejected(&body.title)
        .await
        .map_err(db_err("checking rejections"))?;
    if already {
        return Err(HttpError::unique_constraint_violation(conflict));
    }

    let record = app_state
        .db_client
        .add_rejection(&body.title, &jwt.user.username, body.reason_or_default())
        .await
        .map_err(|e| HttpError::from_db("recording rejection", e, &conflict))?;

    tracing::info!(rejection_id = record.id, "Request rejection recorded");
    Ok((StatusCode::CREATED, Json(DataResponseDto::new(record))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_params_fall_back_to_defaults() {
        assert_eq!(parse_status(Some("published")), Some(true));
        assert_eq!(parse_status(Some("draft")), Some(false));
        assert_eq!(parse_status(Some("all")), None);
        assert_eq!(parse_status(None), None);

        assert_eq!(parse_sort(Some("title")), PostSort::Title);
        assert_eq!(parse_sort(Some("updated_at")), PostSort::UpdatedAt);
        assert_eq!(parse_sort(Some("author; DROP TABLE post")), PostSort::CreatedAt);

        assert_eq!(parse_order(Some("asc")), SortOrder::Asc);
        assert_eq!(parse_order(Some("sideways")), SortOrder::Desc);
    }

    #[test]
    fn dashboard_sorts_by_rating_by_default() {
        assert_eq!(parse_dashboard_sort(None), PostSort::Rating);
        assert_eq!(parse_dashboard_sort(Some("  ")), PostSort::Rating);
        assert_eq!(parse_dashboard_sort(Some("title")), PostSort::Title);
        assert_eq!(parse_dashboard_sort(Some("created_at")), PostSort::CreatedAt);
        assert_eq!(parse_sort(Some("avg_rating")), PostSort::Rating);
    }

    #[test]
    fn watch_filters() {
        assert_eq!(parse_watch_status(Some("watched")), Some(WatchedFilter::Watched));
        assert_eq!(parse_watch_status(Some("unwatched")), Some(WatchedFilter::Unwatched));
        assert_eq!(parse_watch_status(Some("all")), None);
        assert_eq!(parse_watch_status(None), None);

        assert_eq!(parse_watched_flag("TRUE"), Some(WatchedFilter::Watched));
        assert_eq!(parse_watched_flag("false"), Some(WatchedFilter::Unwatched));
        assert_eq!(parse_watched_flag("maybe"), None);
    }
}

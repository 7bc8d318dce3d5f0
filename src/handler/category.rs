use crate::AppState;
use crate::db::{CategoryExt, PostFilter, UserExt};
use crate::dtos::{
    AuthorDto, CategoryDto, CategoryNameQuery, DataResponseDto, ListResponseDto, Response,
    SearchPageQuery, SearchQuery,
};
use crate::error::{ErrorMessage, HttpError, db_err};
use crate::middleware::{auth, role_check};
use crate::handler::post::list_page;
use crate::models::{Category, UserRole};
use crate::utils::pagination::Page;
use crate::utils::multipart::MultipartForm;
use crate::utils::sanitize;
use crate::utils::storage::UploadKind;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post, put};
use axum::{Router, middleware};
use tracing::instrument;

pub fn category_handler(app_state: AppState) -> Router<AppState> {
    let staff_only = Router::new()
        .route("/create_category", post(create_category))
        .route("/update_category/{category_id}", put(update_category))
        .route("/delete_category/{category_id}", delete(delete_category))
        .route_layer(middleware::from_fn(|req, next| {
            role_check(req, next, vec![UserRole::Admin, UserRole::Superadmin])
        }))
        .route_layer(middleware::from_fn_with_state(app_state, auth));

    Router::new()
        .route("/list_categories", get(list_categories))
        .route("/with_post_count", get(with_post_count))
        .route("/category_by_id/{category_id}", get(category_by_id))
        .route("/search_categories", get(search_categories))
        .route("/search_by_category", get(search_by_category))
        .route("/list_authors", get(list_authors))
        .route("/search", get(search_posts))
        .merge(staff_only)
}

async fn load_category(app_state: &AppState, category_id: i32) -> Result<Category, HttpError> {
    app_state
        .db_client
        .get_category(category_id)
        .await
        .map_err(db_err("getting category"))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::CategoryNotFound.to_string()))
}

const DUPLICATE_NAME: &str = "A category with this name already exists";

#[instrument(skip(app_state))]
pub async fn list_categories(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let categories = app_state
        .db_client
        .get_categories()
        .await
        .map_err(db_err("listing categories"))?;

    let data: Vec<CategoryDto> = categories
        .iter()
        .map(|c| CategoryDto::from_category(c, &app_state.storage))
        .collect();

    Ok(Json(DataResponseDto::new(data)))
}

/// Post counts include published posts only.
#[instrument(skip(app_state))]
pub async fn with_post_count(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let categories = app_state
        .db_client
        .get_categories_with_count()
        .await
        .map_err(db_err("listing categories with count"))?;

    let data: Vec<CategoryDto> = categories
        .iter()
        .map(|c| CategoryDto::from_counted(c, &app_state.storage))
        .collect();

    Ok(Json(DataResponseDto::new(data)))
}

#[instrument(skip(app_state))]
pub async fn category_by_id(
    Path(category_id): Path<i32>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let category = load_category(&app_state, category_id).await?;
    Ok(Json(DataResponseDto::new(CategoryDto::from_category(
        &category,
        &app_state.storage,
    ))))
}

#[instrument(skip(app_state))]
pub async fn search_categories(
    Query(params): Query<SearchQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let q = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| HttpError::bad_request("Search query 'q' is required"))?;

    let categories = app_state
        .db_client
        .search_categories(q)
        .await
        .map_err(db_err("searching categories"))?;

    let data: Vec<CategoryDto> = categories
        .iter()
        .map(|c| CategoryDto::from_category(c, &app_state.storage))
        .collect();

    Ok(Json(DataResponseDto::new(data)))
}

/// Published posts of the category whose name matches, ignoring case.
#[instrument(skip(app_state))]
pub async fn search_by_category(
    Query(params): Query<CategoryNameQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let name = params
        .category_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| HttpError::bad_request("Category name is required."))?;

    let category = app_state
        .db_client
        .get_category_by_name(name)
        .await
        .map_err(db_err("getting category by name"))?
        .ok_or_else(|| HttpError::not_found(format!("No category found with name '{}'.", name)))?;

    let filter = PostFilter {
        published: Some(true),
        category_id: Some(category.id),
        ..Default::default()
    };
    let (data, pagination) =
        list_page(&app_state, &filter, Page::new(params.page, params.per_page)).await?;

    Ok(Json(ListResponseDto::new(data, pagination)))
}

/// Approved authors, alphabetical. Feeds the author pickers.
#[instrument(skip(app_state))]
pub async fn list_authors(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let authors = app_state
        .db_client
        .get_authors()
        .await
        .map_err(db_err("listing authors"))?;

    let data: Vec<AuthorDto> = authors
        .iter()
        .map(|a| AuthorDto {
            id: a.id,
            username: a.username.clone(),
            profile_picture: app_state
                .storage
                .url_opt(UploadKind::ProfilePics, a.profile_picture.as_deref()),
        })
        .collect();

    Ok(Json(DataResponseDto::new(data)))
}

/// Published posts whose title, body, author or a category name contains
/// `q`, newest first.
#[instrument(skip(app_state))]
pub async fn search_posts(
    Query(params): Query<SearchPageQuery>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let q = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| HttpError::bad_request("Search query 'q' is required."))?;

    let filter = PostFilter {
        published: Some(true),
        any_search: Some(q.to_string()),
        ..Default::default()
    };
    let (data, pagination) =
        list_page(&app_state, &filter, Page::new(params.page, params.per_page)).await?;

    Ok(Json(ListResponseDto::new(data, pagination)))
}

/// Multipart: `name` and `image`, both required.
#[instrument(skip(app_state, multipart))]
pub async fn create_category(
    State(app_state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let form = MultipartForm::read(multipart, app_state.env.max_upload_bytes).await?;

    let name = sanitize::strip_tags(form.text("name").unwrap_or_default());
    let (false, Some(image)) = (name.is_empty(), form.file("image")) else {
        return Err(HttpError::bad_request(
            "Category name and image are required",
        ));
    };

    let filename = app_state
        .storage
        .save(UploadKind::CategoryPics, &image.filename, &name, &image.bytes)
        .await?;

    let category = match app_state.db_client.create_category(&name, &filename).await {
        Ok(category) => category,
        Err(e) => {
            app_state
                .storage
                .remove(UploadKind::CategoryPics, &filename)
                .await;
            return Err(HttpError::from_db("creating category", e, DUPLICATE_NAME));
        }
    };

    tracing::info!(category_id = category.id, "Category created");
    Ok((
        StatusCode::CREATED,
        Json(DataResponseDto::new(CategoryDto::from_category(
            &category,
            &app_state.storage,
        ))),
    ))
}

/// Optional `name`, optional `image` replacing the old cover.
#[instrument(skip(app_state, multipart))]
pub async fn update_category(
    Path(category_id): Path<i32>,
    State(app_state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let existing = load_category(&app_state, category_id).await?;
    let form = MultipartForm::read(multipart, app_state.env.max_upload_bytes).await?;

    let name = form
        .text("name")
        .map(sanitize::strip_tags)
        .filter(|n| !n.is_empty());

    let new_image = match form.file("image") {
        Some(file) => {
            let stem = name.as_deref().unwrap_or(&existing.name);
            Some(
                app_state
                    .storage
                    .save(UploadKind::CategoryPics, &file.filename, stem, &file.bytes)
                    .await?,
            )
        }
        None => None,
    };

    let updated = app_state
        .db_client
        .update_category(category_id, name.as_deref(), new_image.as_deref())
        .await;

    let category = match updated {
        Ok(category) => category,
        Err(e) => {
            if let Some(file) = &new_image {
                app_state.storage.remove(UploadKind::CategoryPics, file).await;
            }
            return Err(HttpError::from_db("updating category", e, DUPLICATE_NAME));
        }
    };

    if new_image.is_some() {
        if let Some(old) = &existing.image_path {
            app_state.storage.remove(UploadKind::CategoryPics, old).await;
        }
    }

    tracing::info!(category_id, "Category updated");
    Ok(Json(DataResponseDto::new(CategoryDto::from_category(
        &category,
        &app_state.storage,
    ))))
}

/// Post links cascade; the cover file is removed.
#[instrument(skip(app_state))]
pub async fn delete_category(
    Path(category_id): Path<i32>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let category = app_state
        .db_client
        .delete_category(category_id)
        .await
        .map_err(db_err("deleting category"))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::CategoryNotFound.to_string()))?;

    if let Some(path) = &category.image_path {
        app_state.storage.remove(UploadKind::CategoryPics, path).await;
    }

    tracing::info!(category_id, "Category deleted");
    Ok(Json(Response::success("Category and its cover image deleted")))
}

use crate::{
    AppState,
    db::{UserExt, UserFilter},
    dtos::{FilterUserDto, ListResponseDto, Response, RoleUpdateDto, UserListQuery, UserResponseDto},
    error::{ErrorMessage, HttpError, db_err},
    middleware::{JWTAuthMiddleware, auth, role_check},
    models::{User, UserRole},
    policy, session,
    utils::pagination::Page,
};
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, put},
};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

/// Router for user administration.
///
/// Every route needs a logged-in admin or superadmin; the finer rules
/// (who may approve, block or delete whom) live in `policy`.
pub fn users_handler(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/approve/{role}/{user_id}", put(approve_user))
        .route("/block/{user_id}", put(block_user))
        .route("/unblock/{user_id}", put(unblock_user))
        .route("/update-role/{user_id}", patch(update_role))
        .route("/delete/{user_id}", delete(delete_user))
        .route("/all-users", get(all_users))
        .route("/commentators", get(commentators))
        .route("/authors", get(authors))
        .route("/admins", get(admins))
        .route("/superadmins", get(superadmins))
        .route("/approved", get(approved_users))
        .route("/awaiting-approval", get(awaiting_approval))
        .route("/blocked_users", get(blocked_users))
        .route("/blocked_admins", get(blocked_admins))
        .route("/stats", get(user_stats))
        .route("/dashboard-summary", get(dashboard_summary))
        .route_layer(middleware::from_fn(|req, next| {
            role_check(req, next, vec![UserRole::Admin, UserRole::Superadmin])
        }))
        .route_layer(middleware::from_fn_with_state(app_state, auth))
}

async fn load_user(app_state: &AppState, user_id: Uuid) -> Result<User, HttpError> {
    app_state
        .db_client
        .get_user_by_id(user_id)
        .await
        .map_err(db_err("getting user"))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::UserNotFound.to_string()))
}

fn user_response(app_state: &AppState, user: &User) -> Json<UserResponseDto> {
    Json(UserResponseDto {
        status: "success".to_string(),
        user: FilterUserDto::filter_user(user, &app_state.storage),
    })
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn approve_user(
    Path((role, target_id)): Path<(String, Uuid)>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let target = load_user(&app_state, target_id).await?;
    policy::can_approve(&jwt.user, &role, &target)?;

    if target.is_approved {
        return Ok(Json(Response::success(format!(
            "{} is already approved",
            target.username
        ))));
    }

    app_state
        .db_client
        .approve_user(target_id)
        .await
        .map_err(db_err("approving user"))?;

    tracing::info!(target_id = %target_id, role = %role, "User approved");
    Ok(Json(Response::success(format!(
        "{} has been approved",
        target.username
    ))))
}

/// Blocking signs the target out everywhere.
#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn block_user(
    Path(target_id): Path<Uuid>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let target = load_user(&app_state, target_id).await?;
    policy::can_block(&jwt.user, &target)?;

    let user = app_state
        .db_client
        .set_blocked(target_id, true, &session::new_marker())
        .await
        .map_err(db_err("blocking user"))?;

    tracing::info!(target_id = %target_id, "User blocked");
    Ok(user_response(&app_state, &user))
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn unblock_user(
    Path(target_id): Path<Uuid>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let target = load_user(&app_state, target_id).await?;
    policy::can_unblock(&jwt.user, &target)?;

    let user = app_state
        .db_client
        .set_blocked(target_id, false, &session::new_marker())
        .await
        .map_err(db_err("unblocking user"))?;

    tracing::info!(target_id = %target_id, "User unblocked");
    Ok(user_response(&app_state, &user))
}

#[instrument(skip(app_state, jwt, body), fields(user_id = %jwt.user.id))]
pub async fn update_role(
    Path(target_id): Path<Uuid>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    Json(body): Json<RoleUpdateDto>,
) -> Result<impl IntoResponse, HttpError> {
    let new_role: UserRole = body
        .role
        .parse()
        .map_err(|_| HttpError::bad_request("Invalid role"))?;
    policy::can_change_role(&jwt.user, new_role)?;

    load_user(&app_state, target_id).await?;

    let user = app_state
        .db_client
        .update_user_role(target_id, new_role, &session::new_marker())
        .await
        .map_err(db_err("updating role"))?;

    tracing::info!(target_id = %target_id, role = new_role.to_str(), "Role updated");
    Ok(user_response(&app_state, &user))
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn delete_user(
    Path(target_id): Path<Uuid>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    policy::can_delete_user(&jwt.user, target_id)?;

    let deleted = app_state
        .db_client
        .delete_user(target_id)
        .await
        .map_err(db_err("deleting user"))?;
    if !deleted {
        return Err(HttpError::not_found(ErrorMessage::UserNotFound.to_string()));
    }

    tracing::info!(target_id = %target_id, "User deleted");
    Ok(Json(Response::success("User deleted")))
}

/// Narrows `requested` roles to the ones `actor` may see. An empty result
/// means there is nothing to list, which is not the same as "no filter".
fn allowed_roles(actor: &User, requested: &[UserRole]) -> Vec<UserRole> {
    policy::visible_roles(actor)
        .iter()
        .copied()
        .filter(|r| requested.contains(r))
        .collect()
}

async fn list_users(
    app_state: &AppState,
    roles: Vec<UserRole>,
    approved: Option<bool>,
    blocked: Option<bool>,
    params: UserListQuery,
) -> Result<Json<ListResponseDto<FilterUserDto>>, HttpError> {
    let page = Page::new(params.page, params.per_page);
    if roles.is_empty() {
        return Ok(Json(ListResponseDto::new(Vec::new(), page.meta(0))));
    }

    let filter = UserFilter {
        roles,
        approved,
        blocked,
        search: params
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    };

    let (users, total) = app_state
        .db_client
        .get_users(&filter, page.limit(), page.offset())
        .await
        .map_err(db_err("listing users"))?;

    Ok(Json(ListResponseDto::new(
        FilterUserDto::filter_users(&users, &app_state.storage),
        page.meta(total),
    )))
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn all_users(
    Query(params): Query<UserListQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let requested = match params.role.as_deref().map(str::trim) {
        None | Some("") => UserRole::ALL.to_vec(),
        Some(role) => vec![
            role.parse::<UserRole>()
                .map_err(|_| HttpError::bad_request("Invalid role"))?,
        ],
    };

    let roles = allowed_roles(&jwt.user, &requested);
    list_users(&app_state, roles, None, None, params).await
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn commentators(
    Query(params): Query<UserListQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let roles = allowed_roles(&jwt.user, &[UserRole::Commentator]);
    list_users(&app_state, roles, None, None, params).await
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn authors(
    Query(params): Query<UserListQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let roles = allowed_roles(&jwt.user, &[UserRole::Author]);
    list_users(&app_state, roles, None, None, params).await
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn admins(
    Query(params): Query<UserListQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    policy::require_superadmin(&jwt.user)?;
    list_users(&app_state, vec![UserRole::Admin], None, None, params).await
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn superadmins(
    Query(params): Query<UserListQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    policy::require_superadmin(&jwt.user)?;
    list_users(&app_state, vec![UserRole::Superadmin], None, None, params).await
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn approved_users(
    Query(params): Query<UserListQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let roles = policy::visible_roles(&jwt.user).to_vec();
    list_users(&app_state, roles, Some(true), None, params).await
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn awaiting_approval(
    Query(params): Query<UserListQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let roles = policy::visible_roles(&jwt.user).to_vec();
    list_users(&app_state, roles, Some(false), None, params).await
}

/// Admins only see blocked commentators.
#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn blocked_users(
    Query(params): Query<UserListQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let roles = match jwt.user.role {
        UserRole::Superadmin => vec![UserRole::Commentator, UserRole::Author],
        _ => vec![UserRole::Commentator],
    };
    list_users(&app_state, roles, None, Some(true), params).await
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn blocked_admins(
    Query(params): Query<UserListQuery>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    policy::require_superadmin(&jwt.user)?;
    list_users(&app_state, vec![UserRole::Admin], None, Some(true), params).await
}

#[derive(Debug, Serialize)]
struct StatsResponse<T: Serialize> {
    status: &'static str,
    stats: T,
}

#[instrument(skip(app_state))]
pub async fn user_stats(State(app_state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    let stats = app_state
        .db_client
        .get_user_stats()
        .await
        .map_err(db_err("getting user stats"))?;

    Ok(Json(StatsResponse {
        status: "success",
        stats,
    }))
}

#[derive(Debug, Serialize)]
struct DashboardSummaryDto {
    total_users: i64,
    total_posts: i64,
    published_posts: i64,
    latest_users: Vec<FilterUserDto>,
    posts_per_month: Vec<crate::db::MonthCount>,
}

#[instrument(skip(app_state))]
pub async fn dashboard_summary(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let summary = app_state
        .db_client
        .get_dashboard_summary()
        .await
        .map_err(db_err("getting dashboard summary"))?;

    Ok(Json(StatsResponse {
        status: "success",
        stats: DashboardSummaryDto {
            total_users: summary.total_users,
            total_posts: summary.total_posts,
            published_posts: summary.published_posts,
            latest_users: FilterUserDto::filter_users(&summary.latest_users, &app_state.storage),
            posts_per_month: summary.posts_per_month,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            username: "someone".into(),
            email: "someone@example.com".into(),
            password: None,
            role,
            is_approved: true,
            is_blocked: false,
            is_confirmed: true,
            profile_picture: None,
            session_token: Uuid::new_v4().to_string(),
            auth_provider: "email".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn admins_cannot_list_other_staff() {
        let admin = user(UserRole::Admin);
        assert!(allowed_roles(&admin, &[UserRole::Admin]).is_empty());
        assert!(allowed_roles(&admin, &[UserRole::Superadmin]).is_empty());
        assert_eq!(
            allowed_roles(&admin, &UserRole::ALL),
            vec![UserRole::Author, UserRole::Commentator]
        );
    }

    #[test]
    fn superadmins_see_every_role() {
        let sa = user(UserRole::Superadmin);
        assert_eq!(allowed_roles(&sa, &UserRole::ALL).len(), UserRole::ALL.len());
        assert_eq!(
            allowed_roles(&sa, &[UserRole::Admin]),
            vec![UserRole::Admin]
        );
    }
}

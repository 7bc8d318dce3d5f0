use crate::{
    db::{AuthorSummary, CategoryWithCount, CommentRow, PostCategory, PostRow},
    models::{Category, Comment, User},
    utils::{
        pagination::PageMeta,
        sanitize,
        storage::{Storage, UploadKind},
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// Request bodies use `#[serde(default)]` so a missing field fails
// validation with a 400 rather than a deserialization error.

// ============================================================================
// Authentication DTOs
// ============================================================================

/// Text fields of the multipart registration form, after tag stripping.
#[derive(Validate, Debug, Default, Clone)]
pub struct RegisterUserDto {
    #[validate(length(min = 1, message = "All fields are required"))]
    pub username: String,

    #[validate(
        length(min = 1, message = "All fields are required"),
        email(message = "Invalid email address")
    )]
    pub email: String,

    #[validate(length(min = 1, message = "All fields are required"))]
    pub password: String,

    #[validate(length(min = 1, message = "All fields are required"))]
    pub role: String,
}

impl RegisterUserDto {
    /// The first failing rule's message, missing fields before a bad email.
    pub fn check(&self) -> Result<(), String> {
        let Err(errors) = self.validate() else {
            return Ok(());
        };
        let messages: Vec<String> = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .collect();
        Err(messages
            .iter()
            .find(|m| m.as_str() == "All fields are required")
            .or(messages.first())
            .cloned()
            .unwrap_or_else(|| "Invalid input".to_string()))
    }
}

#[derive(Validate, Debug, Default, Clone, Deserialize)]
pub struct LoginUserDto {
    #[serde(default)]
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Refresh token may come in the body or in the `refresh_token` cookie.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequestDto {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Validate, Debug, Default, Deserialize)]
pub struct ResetPasswordRequestDto {
    #[serde(default)]
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
}

#[derive(Validate, Debug, Default, Deserialize)]
pub struct ResetPasswordConfirmDto {
    #[serde(default)]
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: Option<String>,
}

// ============================================================================
// User DTOs
// ============================================================================

/// Client-safe view of a user; profile picture resolved to a URL.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FilterUserDto {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub is_approved: bool,
    pub is_blocked: bool,
    pub is_confirmed: bool,
    pub profile_picture: Option<String>,
    pub auth_provider: String,
    pub created_at: DateTime<Utc>,
}

impl FilterUserDto {
    pub fn filter_user(user: &User, storage: &Storage) -> Self {
        FilterUserDto {
            id: user.id,
            username: user.username.to_owned(),
            email: user.email.to_owned(),
            role: user.role.to_str().to_string(),
            is_approved: user.is_approved,
            is_blocked: user.is_blocked,
            is_confirmed: user.is_confirmed,
            profile_picture: storage
                .url_opt(UploadKind::ProfilePics, user.profile_picture.as_deref()),
            auth_provider: user.auth_provider.to_owned(),
            created_at: user.created_at,
        }
    }

    pub fn filter_users(users: &[User], storage: &Storage) -> Vec<FilterUserDto> {
        users
            .iter()
            .map(|u| FilterUserDto::filter_user(u, storage))
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponseDto {
    pub status: String,
    pub user: FilterUserDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserLoginResponseDto {
    pub status: String,
    pub access_token: String,
    pub refresh_token: String,
    pub user: FilterUserDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponseDto {
    pub status: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdateDto {
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub role: Option<String>,
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub status: &'static str,
    pub message: String,
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Response {
            status: "success",
            message: message.into(),
        }
    }
}

/// `{status, data}` wrapper for single objects and unpaginated lists.
#[derive(Debug, Serialize)]
pub struct DataResponseDto<T: Serialize> {
    pub status: &'static str,
    pub data: T,
}

impl<T: Serialize> DataResponseDto<T> {
    pub fn new(data: T) -> Self {
        DataResponseDto {
            status: "success",
            data,
        }
    }
}

/// Paginated list response used by every listing endpoint.
#[derive(Debug, Serialize)]
pub struct ListResponseDto<T: Serialize> {
    pub status: &'static str,
    pub data: Vec<T>,
    pub pagination: PageMeta,
}

impl<T: Serialize> ListResponseDto<T> {
    pub fn new(data: Vec<T>, pagination: PageMeta) -> Self {
        ListResponseDto {
            status: "success",
            data,
            pagination,
        }
    }
}

// ============================================================================
// Post DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AuthorPostsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CategoryPostsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub category_id: Option<i32>,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AdminPostsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
    pub search: Option<String>,
}

/// `/user_dashboard`: published posts with per-user watch flags.
#[derive(Debug, Deserialize, Default)]
pub struct UserDashboardQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    /// `rating` (default), `created_at` or `title`.
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    /// `all` (default), `watched` or `unwatched`.
    pub watch_status: Option<String>,
}

/// `/filter`: exact author / category matches and an optional watch filter.
#[derive(Debug, Deserialize, Default)]
pub struct PostFilterQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub author_name: Option<String>,
    pub author_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub category_id: Option<i32>,
    /// `true` or `false`; needs a logged-in caller.
    pub watched: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AuthorNameQuery {
    pub author_name: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CategoryNameQuery {
    pub category_name: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Free-text search with pagination.
#[derive(Debug, Deserialize, Default)]
pub struct SearchPageQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AuthorDirectoryQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorDirectoryEntryDto {
    pub id: Uuid,
    pub username: String,
    pub profile_picture: Option<String>,
    pub post_count: i64,
    pub latest_post: Option<String>,
    pub latest_post_date: Option<DateTime<Utc>>,
}

impl AuthorDirectoryEntryDto {
    pub fn from_summary(author: &AuthorSummary, storage: &Storage) -> Self {
        AuthorDirectoryEntryDto {
            id: author.id,
            username: author.username.clone(),
            profile_picture: storage
                .url_opt(UploadKind::ProfilePics, author.profile_picture.as_deref()),
            post_count: author.post_count,
            latest_post: author.latest_post.clone(),
            latest_post_date: author.latest_post_date,
        }
    }
}

/// Title of a declined post request.
#[derive(Debug, Deserialize, Validate, Default)]
pub struct RejectionDto {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,

    #[serde(default)]
    pub reason: Option<String>,
}

impl RejectionDto {
    pub const DEFAULT_REASON: &'static str = "No reason provided";

    pub fn cleaned(self) -> Self {
        RejectionDto {
            title: sanitize::strip_tags(&self.title),
            reason: self
                .reason
                .map(|r| sanitize::strip_tags(&r))
                .filter(|r| !r.is_empty()),
        }
    }

    pub fn reason_or_default(&self) -> &str {
        self.reason.as_deref().unwrap_or(Self::DEFAULT_REASON)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RejectionCheckDto {
    pub status: String,
    pub exists: bool,
    pub rejected: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckTitleDto {
    #[serde(default)]
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RateDto {
    #[serde(default)]
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub value: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthorDto {
    pub id: Uuid,
    pub username: String,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CategoryRefDto {
    pub id: i32,
    pub name: String,
}

impl From<&PostCategory> for CategoryRefDto {
    fn from(c: &PostCategory) -> Self {
        CategoryRefDto {
            id: c.id,
            name: c.name.clone(),
        }
    }
}

/// List-view post: plain-text excerpt instead of the body.
#[derive(Debug, Serialize, Deserialize)]
pub struct PostSummaryDto {
    pub id: i32,
    pub title: String,
    pub excerpt: String,
    pub is_published: bool,
    pub author: AuthorDto,
    pub categories: Vec<CategoryRefDto>,
    pub images: Vec<String>,
    pub avg_rating: f64,
    pub comment_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_watched: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostSummaryDto {
    pub fn from_row(
        row: &PostRow,
        categories: Vec<CategoryRefDto>,
        images: Vec<String>,
        storage: &Storage,
    ) -> Self {
        PostSummaryDto {
            id: row.id,
            title: row.title.clone(),
            excerpt: sanitize::excerpt(&row.content),
            is_published: row.is_published,
            author: AuthorDto {
                id: row.author_id,
                username: row.author_username.clone(),
                profile_picture: storage
                    .url_opt(UploadKind::ProfilePics, row.author_picture.as_deref()),
            },
            categories,
            images,
            avg_rating: round2(row.avg_rating),
            comment_count: row.comment_count,
            is_watched: None,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentDto {
    pub id: i32,
    pub content: String,
    pub post_id: i32,
    pub user_id: Uuid,
    pub username: String,
    pub avg_rating: f64,
    pub user_rating: Option<i32>,
    pub can_edit: bool,
    pub can_delete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentDto {
    pub fn from_row(row: &CommentRow, user_rating: Option<i32>, can_modify: bool) -> Self {
        CommentDto {
            id: row.id,
            content: row.content.clone(),
            post_id: row.post_id,
            user_id: row.user_id,
            username: row.username.clone(),
            avg_rating: round2(row.avg_rating),
            user_rating,
            can_edit: can_modify,
            can_delete: can_modify,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostDetailDto {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub is_published: bool,
    pub author: AuthorDto,
    pub categories: Vec<CategoryRefDto>,
    pub images: Vec<String>,
    pub avg_rating: f64,
    pub user_rating: Option<i32>,
    pub can_edit: bool,
    pub can_delete: bool,
    pub comments: Vec<CommentDto>,
    pub comments_pagination: PageMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostDetailResponseDto {
    pub status: String,
    pub post: PostDetailDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TitleExistsDto {
    pub status: String,
    pub exists: bool,
}

/// Returned by create / edit / publish.
#[derive(Debug, Serialize, Deserialize)]
pub struct PostResponseDto {
    pub status: String,
    pub message: String,
    pub post: PostSummaryDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RatingResponseDto {
    pub status: String,
    pub user_rating: i32,
    pub avg_rating: f64,
}

// ============================================================================
// Comment DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct InputCommentDto {
    #[serde(default)]
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentResponseDto {
    pub status: String,
    pub message: String,
    pub comment: Comment,
}

// ============================================================================
// Category DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryDto {
    pub id: i32,
    pub name: String,
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl CategoryDto {
    pub fn from_category(c: &Category, storage: &Storage) -> Self {
        CategoryDto {
            id: c.id,
            name: c.name.clone(),
            image_url: storage.url_opt(UploadKind::CategoryPics, c.image_path.as_deref()),
            post_count: None,
            created_at: c.created_at,
        }
    }

    pub fn from_counted(c: &CategoryWithCount, storage: &Storage) -> Self {
        CategoryDto {
            id: c.id,
            name: c.name.clone(),
            image_url: storage.url_opt(UploadKind::CategoryPics, c.image_path.as_deref()),
            post_count: Some(c.post_count),
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

// ============================================================================
// Contact DTOs
// ============================================================================

pub const MAX_SUBJECT_LENGTH: u64 = 200;
pub const MAX_MESSAGE_LENGTH: u64 = 2000;

/// Validated after tags are stripped, see `ContactMessageDto::cleaned`.
#[derive(Debug, Deserialize, Validate, Default)]
pub struct ContactMessageDto {
    #[serde(default)]
    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 200,
        message = "Subject is required and must be at most 200 characters"
    ))]
    pub subject: String,

    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 2000,
        message = "Message is required and must be at most 2000 characters"
    ))]
    pub message: String,
}

impl ContactMessageDto {
    pub fn cleaned(self) -> Self {
        ContactMessageDto {
            email: sanitize::strip_tags(&self.email),
            subject: sanitize::strip_tags(&self.subject),
            message: sanitize::strip_tags(&self.message),
        }
    }
}

// ============================================================================
// Watched DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct UnwatchedQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub category_id: Option<i32>,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(4.0), 4.0);
        assert_eq!(round2(2.675_1), 2.68);
    }

    #[test]
    fn contact_cleaning_and_limits() {
        let dto = ContactMessageDto {
            email: " a@example.com ".into(),
            subject: "<b>Hi</b>".into(),
            message: "<p>hello</p>".into(),
        }
        .cleaned();
        assert_eq!(dto.email, "a@example.com");
        assert_eq!(dto.subject, "Hi");
        assert_eq!(dto.message, "hello");
        assert!(dto.validate().is_ok());

        let long = ContactMessageDto {
            email: "a@example.com".into(),
            subject: "s".repeat(MAX_SUBJECT_LENGTH as usize + 1),
            message: "m".into(),
        };
        assert!(long.validate().is_err());

        let blank = ContactMessageDto::default().cleaned();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn ampersand_counts_as_one_subject_character() {
        let subject = format!("{}&", "a".repeat(MAX_SUBJECT_LENGTH as usize - 1));
        let dto = ContactMessageDto {
            email: "a@example.com".into(),
            subject: subject.clone(),
            message: "Tom & Jerry".into(),
        }
        .cleaned();
        assert_eq!(dto.subject, subject);
        assert_eq!(dto.message, "Tom & Jerry");
        assert!(dto.validate().is_ok());
    }

    fn registration(email: &str) -> RegisterUserDto {
        RegisterUserDto {
            username: "jane".into(),
            email: email.into(),
            password: "secret1".into(),
            role: "author".into(),
        }
    }

    #[test]
    fn registration_email_must_be_well_formed() {
        assert!(registration("jane@example.com").check().is_ok());
        for bad in ["a b@x.io", "a@x..io", "\"@x.io", "a@-x.io", "plain", "a@@x.io"] {
            assert_eq!(
                registration(bad).check(),
                Err("Invalid email address".to_string()),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn missing_registration_field_reported_first() {
        let mut dto = registration("not-an-email");
        dto.role = String::new();
        assert_eq!(dto.check(), Err("All fields are required".to_string()));
    }

    #[test]
    fn rejection_reason_defaults_when_blank() {
        let dto = RejectionDto {
            title: " <b>Spam & Eggs</b> ".into(),
            reason: Some("<i></i>".into()),
        }
        .cleaned();
        assert_eq!(dto.title, "Spam & Eggs");
        assert_eq!(dto.reason_or_default(), RejectionDto::DEFAULT_REASON);
        assert!(dto.validate().is_ok());

        let blank = RejectionDto::default().cleaned();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn rating_range() {
        assert!(RateDto { value: 0 }.validate().is_err());
        assert!(RateDto { value: 6 }.validate().is_err());
        assert!(RateDto { value: 5 }.validate().is_ok());
    }
}

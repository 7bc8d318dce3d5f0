use sqlx::{Pool, Postgres};

mod user;
pub use user::{DashboardSummary, MonthCount, NewUser, UserExt, UserFilter, UserStats};

mod refresh_token;
pub use refresh_token::RefreshTokenExt;

mod post;
pub use post::{AuthorSummary, PostCategory, PostExt, PostFilter, PostRow, PostSort, SortOrder};

mod comment;
pub use comment::{CommentExt, CommentRow};

mod category;
pub use category::{CategoryExt, CategoryWithCount};

mod contact;
pub use contact::{ContactExt, MessageFilter};

mod watched;
pub use watched::{WatchedExt, WatchedFilter};

mod rejection;
pub use rejection::RejectionExt;

/// Columns selected for every `users` query.
pub(crate) const USER_COLUMNS: &str = "id, username, email, password, role, is_approved, is_blocked, \
     is_confirmed, profile_picture, session_token, auth_provider, created_at";

#[derive(Debug, Clone)]
pub struct DBClient {
    pool: Pool<Postgres>,
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }
}

/// `%term%` for ILIKE filters, or `None` for a blank term.
pub(crate) fn like_pattern(term: Option<&str>) -> Option<String> {
    term.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("%{}%", t))
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn blank_search_is_no_filter() {
        assert_eq!(like_pattern(None), None);
        assert_eq!(like_pattern(Some("   ")), None);
        assert_eq!(like_pattern(Some(" rust ")).as_deref(), Some("%rust%"));
    }
}

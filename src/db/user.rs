use super::{DBClient, USER_COLUMNS, like_pattern};
use crate::models::{User, UserRole};
use serde::Serialize;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

/// Fields of a freshly registered account.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    /// Argon2 hash; `None` for accounts created through Google.
    pub password: Option<&'a str>,
    pub role: UserRole,
    pub is_approved: bool,
    pub is_confirmed: bool,
    pub profile_picture: Option<&'a str>,
    pub auth_provider: &'a str,
    pub session_token: &'a str,
}

/// Filters for the user listings. Empty `roles` means no role filter.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub roles: Vec<UserRole>,
    pub approved: Option<bool>,
    pub blocked: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserStats {
    pub total: i64,
    pub superadmins: i64,
    pub admins: i64,
    pub authors: i64,
    pub commentators: i64,
    pub awaiting_approval: i64,
    pub blocked: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct MonthCount {
    pub month: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total_users: i64,
    pub total_posts: i64,
    pub published_posts: i64,
    pub latest_users: Vec<User>,
    pub posts_per_month: Vec<MonthCount>,
}

/// User database operations
pub trait UserExt {
    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error>;

    /// Username match ignoring case, for lookups typed by readers.
    async fn find_user_by_name(&self, username: &str) -> Result<Option<User>, sqlx::Error>;

    /// Approved, unblocked authors by username.
    async fn get_authors(&self) -> Result<Vec<User>, sqlx::Error>;

    /// Unique violations on username or email surface as database errors.
    async fn save_user(&self, new_user: NewUser<'_>) -> Result<User, sqlx::Error>;

    /// Marks the account behind `email` confirmed. `None` if no such account.
    async fn confirm_user(&self, email: &str) -> Result<Option<User>, sqlx::Error>;

    async fn approve_user(&self, user_id: Uuid) -> Result<User, sqlx::Error>;

    /// Blocking also replaces the session marker and revokes refresh tokens.
    async fn set_blocked(
        &self,
        user_id: Uuid,
        blocked: bool,
        new_marker: &str,
    ) -> Result<User, sqlx::Error>;

    /// Replace the session marker and revoke every refresh token.
    async fn rotate_session(&self, user_id: Uuid, new_marker: &str) -> Result<(), sqlx::Error>;

    /// New password hash; signs the user out everywhere.
    async fn update_user_password(
        &self,
        user_id: Uuid,
        password: &str,
        new_marker: &str,
    ) -> Result<User, sqlx::Error>;

    /// New role; signs the user out everywhere so the next token carries it.
    async fn update_user_role(
        &self,
        user_id: Uuid,
        role: UserRole,
        new_marker: &str,
    ) -> Result<User, sqlx::Error>;

    async fn set_auth_provider(&self, user_id: Uuid, provider: &str) -> Result<User, sqlx::Error>;

    /// Promote or refresh a bootstrap admin account.
    async fn sync_admin(
        &self,
        user_id: Uuid,
        username: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User, sqlx::Error>;

    /// `false` when nothing was deleted.
    async fn delete_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn get_users(
        &self,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), sqlx::Error>;

    async fn get_user_stats(&self) -> Result<UserStats, sqlx::Error>;

    async fn get_dashboard_summary(&self) -> Result<DashboardSummary, sqlx::Error>;
}

/// Appends the WHERE clause shared by the listing and its count.
fn push_user_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    builder.push(" WHERE TRUE");

    if !filter.roles.is_empty() {
        let roles: Vec<String> = filter.roles.iter().map(|r| r.to_str().to_string()).collect();
        builder.push(" AND role::text = ANY(");
        builder.push_bind(roles);
        builder.push(")");
    }

    if let Some(approved) = filter.approved {
        builder.push(" AND is_approved = ");
        builder.push_bind(approved);
    }

    if let Some(blocked) = filter.blocked {
        builder.push(" AND is_blocked = ");
        builder.push_bind(blocked);
    }

    if let Some(pattern) = like_pattern(filter.search.as_deref()) {
        builder.push(" AND (username ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR email ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

impl UserExt for DBClient {
    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {} FROM users WHERE LOWER(email) = LOWER($1)", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM users WHERE LOWER(username) = LOWER($1) ORDER BY created_at LIMIT 1",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_authors(&self) -> Result<Vec<User>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM users WHERE role = 'author' AND is_approved AND NOT is_blocked \
             ORDER BY username",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await
    }

    async fn save_user(&self, new_user: NewUser<'_>) -> Result<User, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO users
                (username, email, password, role, is_approved, is_confirmed,
                 profile_picture, auth_provider, session_token)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(new_user.username)
            .bind(new_user.email)
            .bind(new_user.password)
            .bind(new_user.role)
            .bind(new_user.is_approved)
            .bind(new_user.is_confirmed)
            .bind(new_user.profile_picture)
            .bind(new_user.auth_provider)
            .bind(new_user.session_token)
            .fetch_one(&self.pool)
            .await
    }

    async fn confirm_user(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!(
            "UPDATE users SET is_confirmed = TRUE WHERE LOWER(email) = LOWER($1) RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    async fn approve_user(&self, user_id: Uuid) -> Result<User, sqlx::Error> {
        let sql = format!(
            "UPDATE users SET is_approved = TRUE WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
    }

    async fn set_blocked(
        &self,
        user_id: Uuid,
        blocked: bool,
        new_marker: &str,
    ) -> Result<User, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let user = if blocked {
            let sql = format!(
                "UPDATE users SET is_blocked = TRUE, session_token = $2 WHERE id = $1 RETURNING {}",
                USER_COLUMNS
            );
            let user = sqlx::query_as::<_, User>(&sql)
                .bind(user_id)
                .bind(new_marker)
                .fetch_one(&mut *tx)
                .await?;

            sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

            user
        } else {
            let sql = format!(
                "UPDATE users SET is_blocked = FALSE WHERE id = $1 RETURNING {}",
                USER_COLUMNS
            );
            sqlx::query_as::<_, User>(&sql)
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?
        };

        tx.commit().await?;
        Ok(user)
    }

    async fn rotate_session(&self, user_id: Uuid, new_marker: &str) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET session_token = $2 WHERE id = $1")
            .bind(user_id)
            .bind(new_marker)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password: &str,
        new_marker: &str,
    ) -> Result<User, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE users SET password = $2, session_token = $3 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(password)
            .bind(new_marker)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn update_user_role(
        &self,
        user_id: Uuid,
        role: UserRole,
        new_marker: &str,
    ) -> Result<User, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE users SET role = $2, session_token = $3 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(role)
            .bind(new_marker)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn set_auth_provider(&self, user_id: Uuid, provider: &str) -> Result<User, sqlx::Error> {
        let sql = format!(
            "UPDATE users SET auth_provider = $2 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(provider)
            .fetch_one(&self.pool)
            .await
    }

    async fn sync_admin(
        &self,
        user_id: Uuid,
        username: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE users
            SET username = $2, password = $3, role = $4,
                is_approved = TRUE, is_confirmed = TRUE, is_blocked = FALSE
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(username)
            .bind(password)
            .bind(role)
            .fetch_one(&self.pool)
            .await
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_users(
        &self,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM users", USER_COLUMNS));
        push_user_filter(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let users = builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?;

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_user_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok((users, total))
    }

    async fn get_user_stats(&self) -> Result<UserStats, sqlx::Error> {
        sqlx::query_as::<_, UserStats>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE role = 'superadmin') AS superadmins,
                COUNT(*) FILTER (WHERE role = 'admin') AS admins,
                COUNT(*) FILTER (WHERE role = 'author') AS authors,
                COUNT(*) FILTER (WHERE role = 'commentator') AS commentators,
                COUNT(*) FILTER (WHERE NOT is_approved) AS awaiting_approval,
                COUNT(*) FILTER (WHERE is_blocked) AS blocked
            FROM users
            "#,
        )
        .fetch_one(&self.pool)
        .await
    }

    async fn get_dashboard_summary(&self) -> Result<DashboardSummary, sqlx::Error> {
        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let (total_posts, published_posts): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_published) FROM post",
        )
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            "SELECT {} FROM users ORDER BY created_at DESC LIMIT 5",
            USER_COLUMNS
        );
        let latest_users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let posts_per_month = sqlx::query_as::<_, MonthCount>(
            r#"
            SELECT to_char(date_trunc('month', created_at), 'YYYY-MM') AS month,
                   COUNT(*) AS count
            FROM post
            WHERE created_at >= date_trunc('month', NOW()) - INTERVAL '5 months'
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(DashboardSummary {
            total_users,
            total_posts,
            published_posts,
            latest_users,
            posts_per_month,
        })
    }
}


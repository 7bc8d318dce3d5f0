use super::DBClient;
use crate::models::Comment;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Comment joined with its author and average rating.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentRow {
    pub id: i32,
    pub content: String,
    pub post_id: i32,
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub avg_rating: f64,
}

const COMMENT_COLUMNS: &str = "id, content, post_id, user_id, created_at, updated_at";

pub trait CommentExt {
    async fn add_comment(
        &self,
        post_id: i32,
        user_id: Uuid,
        content: &str,
    ) -> Result<Comment, sqlx::Error>;

    async fn get_comment(&self, comment_id: i32) -> Result<Option<Comment>, sqlx::Error>;

    /// Newest first.
    async fn get_comments(
        &self,
        post_id: i32,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<CommentRow>, i64), sqlx::Error>;

    async fn update_comment(&self, comment_id: i32, content: &str)
    -> Result<Comment, sqlx::Error>;

    async fn delete_comment(&self, comment_id: i32) -> Result<bool, sqlx::Error>;

    /// Insert or overwrite the caller's rating; returns the new average.
    async fn rate_comment(
        &self,
        comment_id: i32,
        user_id: Uuid,
        value: i32,
    ) -> Result<f64, sqlx::Error>;

    /// `(comment_id, value)` for the comments in `comment_ids` the user rated.
    async fn get_user_comment_ratings(
        &self,
        user_id: Uuid,
        comment_ids: &[i32],
    ) -> Result<Vec<(i32, i32)>, sqlx::Error>;
}

impl CommentExt for DBClient {
    async fn add_comment(
        &self,
        post_id: i32,
        user_id: Uuid,
        content: &str,
    ) -> Result<Comment, sqlx::Error> {
        let sql = format!(
            "INSERT INTO comment (content, post_id, user_id) VALUES ($1, $2, $3) RETURNING {}",
            COMMENT_COLUMNS
        );
        sqlx::query_as::<_, Comment>(&sql)
            .bind(content)
            .bind(post_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
    }

    async fn get_comment(&self, comment_id: i32) -> Result<Option<Comment>, sqlx::Error> {
        let sql = format!("SELECT {} FROM comment WHERE id = $1", COMMENT_COLUMNS);
        sqlx::query_as::<_, Comment>(&sql)
            .bind(comment_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_comments(
        &self,
        post_id: i32,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<CommentRow>, i64), sqlx::Error> {
        let comments = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT c.id, c.content, c.post_id, c.user_id, u.username,
                   c.created_at, c.updated_at,
                   COALESCE((SELECT AVG(r.value) FROM comment_rating r WHERE r.comment_id = c.id), 0)::float8
                       AS avg_rating
            FROM comment c
            JOIN users u ON u.id = c.user_id
            WHERE c.post_id = $1
            ORDER BY c.created_at DESC, c.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(post_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comment WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((comments, total))
    }

    async fn update_comment(
        &self,
        comment_id: i32,
        content: &str,
    ) -> Result<Comment, sqlx::Error> {
        let sql = format!(
            "UPDATE comment SET content = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            COMMENT_COLUMNS
        );
        sqlx::query_as::<_, Comment>(&sql)
            .bind(comment_id)
            .bind(content)
            .fetch_one(&self.pool)
            .await
    }

    async fn delete_comment(&self, comment_id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM comment WHERE id = $1")
            .bind(comment_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn rate_comment(
        &self,
        comment_id: i32,
        user_id: Uuid,
        value: i32,
    ) -> Result<f64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO comment_rating (value, comment_id, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (comment_id, user_id) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(value)
        .bind(comment_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let average: f64 = sqlx::query_scalar(
            "SELECT COALESCE(AVG(value), 0)::float8 FROM comment_rating WHERE comment_id = $1",
        )
        .bind(comment_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(average)
    }

    async fn get_user_comment_ratings(
        &self,
        user_id: Uuid,
        comment_ids: &[i32],
    ) -> Result<Vec<(i32, i32)>, sqlx::Error> {
        if comment_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, (i32, i32)>(
            "SELECT comment_id, value FROM comment_rating WHERE user_id = $1 AND comment_id = ANY($2)",
        )
        .bind(user_id)
        .bind(comment_ids.to_vec())
        .fetch_all(&self.pool)
        .await
    }
}

use super::DBClient;
use uuid::Uuid;

/// Used as a post listing filter, see `PostFilter::watched`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedFilter {
    Watched,
    Unwatched,
}

pub trait WatchedExt {
    /// Idempotent.
    async fn watch_post(&self, user_id: Uuid, post_id: i32) -> Result<(), sqlx::Error>;

    /// Idempotent.
    async fn unwatch_post(&self, user_id: Uuid, post_id: i32) -> Result<(), sqlx::Error>;

    /// Subset of `post_ids` the user watches.
    async fn get_watched_ids(
        &self,
        user_id: Uuid,
        post_ids: &[i32],
    ) -> Result<Vec<i32>, sqlx::Error>;
}

impl WatchedExt for DBClient {
    async fn watch_post(&self, user_id: Uuid, post_id: i32) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO watched_posts (user_id, post_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(post_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unwatch_post(&self, user_id: Uuid, post_id: i32) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM watched_posts WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_watched_ids(
        &self,
        user_id: Uuid,
        post_ids: &[i32],
    ) -> Result<Vec<i32>, sqlx::Error> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_scalar(
            "SELECT post_id FROM watched_posts WHERE user_id = $1 AND post_id = ANY($2)",
        )
        .bind(user_id)
        .bind(post_ids.to_vec())
        .fetch_all(&self.pool)
        .await
    }
}

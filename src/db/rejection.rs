use super::DBClient;
use crate::models::RejectedRequest;

pub trait RejectionExt {
    /// Case-insensitive exact match on the title.
    async fn is_title_rejected(&self, title: &str) -> Result<bool, sqlx::Error>;

    /// A title recorded twice (in any case) is a unique violation.
    async fn add_rejection(
        &self,
        title: &str,
        rejected_by: &str,
        reason: &str,
    ) -> Result<RejectedRequest, sqlx::Error>;
}

impl RejectionExt for DBClient {
    async fn is_title_rejected(&self, title: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM rejected_requests WHERE LOWER(title) = LOWER($1))",
        )
        .bind(title)
        .fetch_one(&self.pool)
        .await
    }

    async fn add_rejection(
        &self,
        title: &str,
        rejected_by: &str,
        reason: &str,
    ) -> Result<RejectedRequest, sqlx::Error> {
        sqlx::query_as::<_, RejectedRequest>(
            r#"
            INSERT INTO rejected_requests (title, rejected_by, reason)
            VALUES ($1, $2, $3)
            RETURNING id, title, rejected_by, reason, created_at
            "#,
        )
        .bind(title)
        .bind(rejected_by)
        .bind(reason)
        .fetch_one(&self.pool)
        .await
    }
}

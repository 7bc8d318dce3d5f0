use super::DBClient;
use crate::models::RefreshToken;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub trait RefreshTokenExt {
    async fn save_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, sqlx::Error>;

    async fn get_refresh_token(&self, token_hash: &str)
    -> Result<Option<RefreshToken>, sqlx::Error>;

    /// Revoke `old_id` and store its replacement in one transaction.
    async fn rotate_refresh_token(
        &self,
        old_id: i32,
        user_id: Uuid,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, sqlx::Error>;
}

impl RefreshTokenExt for DBClient {
    async fn save_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, created_at, expires_at, revoked
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, user_id, token_hash, created_at, expires_at, revoked
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
    }

    async fn rotate_refresh_token(
        &self,
        old_id: i32,
        user_id: Uuid,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Losing a race against a concurrent refresh of the same token
        // leaves zero rows here; treat it as not found.
        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1 AND revoked = FALSE",
        )
        .bind(old_id)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, created_at, expires_at, revoked
            "#,
        )
        .bind(user_id)
        .bind(new_hash)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(token)
    }
}

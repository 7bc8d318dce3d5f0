use super::{DBClient, like_pattern};
use crate::models::ContactMessage;

/// Which slice of the inbox to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFilter {
    All,
    Unread,
    Unactioned,
    Actioned,
}

impl MessageFilter {
    fn condition(&self) -> &'static str {
        match self {
            MessageFilter::All => "TRUE",
            MessageFilter::Unread => "NOT is_read",
            MessageFilter::Unactioned => "NOT is_actioned",
            MessageFilter::Actioned => "is_actioned",
        }
    }
}

const MESSAGE_COLUMNS: &str = "id, email, subject, message, is_read, is_actioned, created_at";

pub trait ContactExt {
    async fn save_message(
        &self,
        email: &str,
        subject: &str,
        message: &str,
    ) -> Result<ContactMessage, sqlx::Error>;

    /// Newest first.
    async fn get_messages(
        &self,
        filter: MessageFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ContactMessage>, i64), sqlx::Error>;

    /// Substring of email, subject or body, newest first. A blank query
    /// matches everything.
    async fn search_messages(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ContactMessage>, i64), sqlx::Error>;

    async fn set_read(&self, id: i32, read: bool) -> Result<Option<ContactMessage>, sqlx::Error>;

    async fn set_actioned(
        &self,
        id: i32,
        actioned: bool,
    ) -> Result<Option<ContactMessage>, sqlx::Error>;
}

impl ContactExt for DBClient {
    async fn save_message(
        &self,
        email: &str,
        subject: &str,
        message: &str,
    ) -> Result<ContactMessage, sqlx::Error> {
        let sql = format!(
            "INSERT INTO contact_message (email, subject, message) VALUES ($1, $2, $3) RETURNING {}",
            MESSAGE_COLUMNS
        );
        sqlx::query_as::<_, ContactMessage>(&sql)
            .bind(email)
            .bind(subject)
            .bind(message)
            .fetch_one(&self.pool)
            .await
    }

    async fn get_messages(
        &self,
        filter: MessageFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ContactMessage>, i64), sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM contact_message WHERE {} ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
            MESSAGE_COLUMNS,
            filter.condition()
        );
        let messages = sqlx::query_as::<_, ContactMessage>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!(
            "SELECT COUNT(*) FROM contact_message WHERE {}",
            filter.condition()
        );
        let total: i64 = sqlx::query_scalar(&count_sql)
            .fetch_one(&self.pool)
            .await?;

        Ok((messages, total))
    }

    async fn search_messages(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ContactMessage>, i64), sqlx::Error> {
        let pattern = like_pattern(Some(query)).unwrap_or_else(|| "%".to_string());
        let condition = "email ILIKE $1 OR subject ILIKE $1 OR message ILIKE $1";

        let sql = format!(
            "SELECT {} FROM contact_message WHERE {} ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            MESSAGE_COLUMNS, condition
        );
        let messages = sqlx::query_as::<_, ContactMessage>(&sql)
            .bind(&pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM contact_message WHERE {}", condition);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;

        Ok((messages, total))
    }

    async fn set_read(&self, id: i32, read: bool) -> Result<Option<ContactMessage>, sqlx::Error> {
        let sql = format!(
            "UPDATE contact_message SET is_read = $2 WHERE id = $1 RETURNING {}",
            MESSAGE_COLUMNS
        );
        sqlx::query_as::<_, ContactMessage>(&sql)
            .bind(id)
            .bind(read)
            .fetch_optional(&self.pool)
            .await
    }

    async fn set_actioned(
        &self,
        id: i32,
        actioned: bool,
    ) -> Result<Option<ContactMessage>, sqlx::Error> {
        let sql = format!(
            "UPDATE contact_message SET is_actioned = $2 WHERE id = $1 RETURNING {}",
            MESSAGE_COLUMNS
        );
        sqlx::query_as::<_, ContactMessage>(&sql)
            .bind(id)
            .bind(actioned)
            .fetch_optional(&self.pool)
            .await
    }
}

use super::{DBClient, like_pattern};
use crate::models::Category;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryWithCount {
    pub id: i32,
    pub name: String,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub post_count: i64,
}

pub trait CategoryExt {
    async fn get_categories(&self) -> Result<Vec<Category>, sqlx::Error>;

    /// Counts published posts only.
    async fn get_categories_with_count(&self) -> Result<Vec<CategoryWithCount>, sqlx::Error>;

    async fn get_category(&self, category_id: i32) -> Result<Option<Category>, sqlx::Error>;

    /// Whole name, any case.
    async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>, sqlx::Error>;

    async fn search_categories(&self, query: &str) -> Result<Vec<Category>, sqlx::Error>;

    async fn create_category(&self, name: &str, image_path: &str)
    -> Result<Category, sqlx::Error>;

    /// `None` fields are left untouched.
    async fn update_category(
        &self,
        category_id: i32,
        name: Option<&str>,
        image_path: Option<&str>,
    ) -> Result<Category, sqlx::Error>;

    /// Returns the deleted row so its cover file can be removed.
    async fn delete_category(&self, category_id: i32) -> Result<Option<Category>, sqlx::Error>;
}

impl CategoryExt for DBClient {
    async fn get_categories(&self) -> Result<Vec<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            "SELECT id, name, image_path, created_at FROM category ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn get_categories_with_count(&self) -> Result<Vec<CategoryWithCount>, sqlx::Error> {
        sqlx::query_as::<_, CategoryWithCount>(
            r#"
            SELECT c.id, c.name, c.image_path, c.created_at,
                   COUNT(p.id) AS post_count
            FROM category c
            LEFT JOIN post_categories pc ON pc.category_id = c.id
            LEFT JOIN post p ON p.id = pc.post_id AND p.is_published
            GROUP BY c.id
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn get_category(&self, category_id: i32) -> Result<Option<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            "SELECT id, name, image_path, created_at FROM category WHERE id = $1",
        )
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            "SELECT id, name, image_path, created_at FROM category WHERE LOWER(name) = LOWER($1)",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await
    }

    async fn search_categories(&self, query: &str) -> Result<Vec<Category>, sqlx::Error> {
        let pattern = like_pattern(Some(query)).unwrap_or_else(|| "%".to_string());
        sqlx::query_as::<_, Category>(
            "SELECT id, name, image_path, created_at FROM category WHERE name ILIKE $1 ORDER BY name",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
    }

    async fn create_category(
        &self,
        name: &str,
        image_path: &str,
    ) -> Result<Category, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO category (name, image_path) VALUES ($1, $2)
            RETURNING id, name, image_path, created_at
            "#,
        )
        .bind(name)
        .bind(image_path)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_category(
        &self,
        category_id: i32,
        name: Option<&str>,
        image_path: Option<&str>,
    ) -> Result<Category, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            r#"
            UPDATE category
            SET name = COALESCE($2, name), image_path = COALESCE($3, image_path)
            WHERE id = $1
            RETURNING id, name, image_path, created_at
            "#,
        )
        .bind(category_id)
        .bind(name)
        .bind(image_path)
        .fetch_one(&self.pool)
        .await
    }

    async fn delete_category(&self, category_id: i32) -> Result<Option<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            "DELETE FROM category WHERE id = $1 RETURNING id, name, image_path, created_at",
        )
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await
    }
}

use super::{DBClient, WatchedFilter, like_pattern};
use crate::models::{Image, Post};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

/// Post joined with its author and aggregate counters.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub is_published: bool,
    pub author_id: Uuid,
    pub author_username: String,
    pub author_picture: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub avg_rating: f64,
    pub comment_count: i64,
}

/// Category attached to a post, as returned for a batch of posts.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostCategory {
    pub post_id: i32,
    pub id: i32,
    pub name: String,
}

/// One row of the public authors directory.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub username: String,
    pub profile_picture: Option<String>,
    pub post_count: i64,
    pub latest_post: Option<String>,
    pub latest_post_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PostSort {
    #[default]
    CreatedAt,
    Title,
    UpdatedAt,
    Rating,
}

impl PostSort {
    fn column(&self) -> &'static str {
        match self {
            PostSort::CreatedAt => "p.created_at",
            PostSort::Title => "p.title",
            PostSort::UpdatedAt => "p.updated_at",
            // output alias of POST_ROW_SELECT, unrated posts count as 0
            PostSort::Rating => "avg_rating",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub published: Option<bool>,
    pub author_id: Option<Uuid>,
    pub category_id: Option<i32>,
    /// Substring of a category name.
    pub category_name: Option<String>,
    /// Whole category name, any case.
    pub category_exact: Option<String>,
    /// Substring of the author's username.
    pub author_name: Option<String>,
    /// Whole author username, any case.
    pub author_exact: Option<String>,
    /// Substring of the title.
    pub title_search: Option<String>,
    /// Substring of title or content.
    pub text_search: Option<String>,
    /// Substring of title, content, author username or a category name.
    pub any_search: Option<String>,
    pub watched: Option<(Uuid, WatchedFilter)>,
    pub sort: PostSort,
    pub order: SortOrder,
}

const POST_ROW_SELECT: &str = r#"
    SELECT p.id, p.title, p.content, p.is_published, p.author_id,
           u.username AS author_username, u.profile_picture AS author_picture,
           p.created_at, p.updated_at,
           COALESCE((SELECT AVG(r.value) FROM post_rating r WHERE r.post_id = p.id), 0)::float8
               AS avg_rating,
           (SELECT COUNT(*) FROM comment c WHERE c.post_id = p.id) AS comment_count
    FROM post p
    JOIN users u ON u.id = p.author_id
"#;

/// Authors with at least one published post.
fn push_author_directory_filter(builder: &mut QueryBuilder<'_, Postgres>, search: Option<&str>) {
    builder.push(
        " FROM users u JOIN post p ON p.author_id = u.id AND p.is_published \
         WHERE u.role = 'author'",
    );
    if let Some(pattern) = like_pattern(search) {
        builder.push(" AND u.username ILIKE ");
        builder.push_bind(pattern);
    }
}

const POST_COLUMNS: &str = "id, title, content, is_published, author_id, created_at, updated_at";

fn trimmed(term: Option<&str>) -> Option<&str> {
    term.map(str::trim).filter(|t| !t.is_empty())
}

fn push_post_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
    builder.push(" WHERE TRUE");

    if let Some(published) = filter.published {
        builder.push(" AND p.is_published = ");
        builder.push_bind(published);
    }

    if let Some(author_id) = filter.author_id {
        builder.push(" AND p.author_id = ");
        builder.push_bind(author_id);
    }

    if let Some(category_id) = filter.category_id {
        builder.push(
            " AND EXISTS (SELECT 1 FROM post_categories pc \
             WHERE pc.post_id = p.id AND pc.category_id = ",
        );
        builder.push_bind(category_id);
        builder.push(")");
    }

    if let Some(pattern) = like_pattern(filter.category_name.as_deref()) {
        builder.push(
            " AND EXISTS (SELECT 1 FROM post_categories pc \
             JOIN category cat ON cat.id = pc.category_id \
             WHERE pc.post_id = p.id AND cat.name ILIKE ",
        );
        builder.push_bind(pattern);
        builder.push(")");
    }

    if let Some(name) = trimmed(filter.category_exact.as_deref()) {
        builder.push(
            " AND EXISTS (SELECT 1 FROM post_categories pc \
             JOIN category cat ON cat.id = pc.category_id \
             WHERE pc.post_id = p.id AND LOWER(cat.name) = LOWER(",
        );
        builder.push_bind(name.to_string());
        builder.push("))");
    }

    if let Some(pattern) = like_pattern(filter.author_name.as_deref()) {
        builder.push(" AND u.username ILIKE ");
        builder.push_bind(pattern);
    }

    if let Some(name) = trimmed(filter.author_exact.as_deref()) {
        builder.push(" AND LOWER(u.username) = LOWER(");
        builder.push_bind(name.to_string());
        builder.push(")");
    }

    if let Some(pattern) = like_pattern(filter.title_search.as_deref()) {
        builder.push(" AND p.title ILIKE ");
        builder.push_bind(pattern);
    }

    if let Some(pattern) = like_pattern(filter.text_search.as_deref()) {
        builder.push(" AND (p.title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR p.content ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }

    if let Some(pattern) = like_pattern(filter.any_search.as_deref()) {
        builder.push(" AND (p.title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR p.content ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR u.username ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(
            " OR EXISTS (SELECT 1 FROM post_categories pc \
             JOIN category cat ON cat.id = pc.category_id \
             WHERE pc.post_id = p.id AND cat.name ILIKE ",
        );
        builder.push_bind(pattern);
        builder.push("))");
    }

    if let Some((user_id, which)) = filter.watched {
        builder.push(match which {
            WatchedFilter::Watched => " AND EXISTS",
            WatchedFilter::Unwatched => " AND NOT EXISTS",
        });
        builder.push(" (SELECT 1 FROM watched_posts w WHERE w.post_id = p.id AND w.user_id = ");
        builder.push_bind(user_id);
        builder.push(")");
    }
}

pub trait PostExt {
    async fn get_posts(
        &self,
        filter: &PostFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<PostRow>, i64), sqlx::Error>;

    async fn get_post(&self, post_id: i32) -> Result<Option<PostRow>, sqlx::Error>;

    /// Most prolific first.
    async fn get_author_directory(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuthorSummary>, i64), sqlx::Error>;

    async fn get_post_categories(&self, post_ids: &[i32])
    -> Result<Vec<PostCategory>, sqlx::Error>;

    async fn get_post_images(&self, post_ids: &[i32]) -> Result<Vec<Image>, sqlx::Error>;

    /// Case-insensitive; `exclude` skips the post being edited.
    async fn title_exists(&self, title: &str, exclude: Option<i32>) -> Result<bool, sqlx::Error>;

    /// Unknown category ids are ignored.
    async fn create_post(
        &self,
        author_id: Uuid,
        title: &str,
        content: &str,
        category_ids: &[i32],
        image_path: &str,
    ) -> Result<Post, sqlx::Error>;

    /// Replaces the category set. With `new_image`, every existing image row
    /// is replaced and the old file paths are returned for removal.
    async fn update_post(
        &self,
        post_id: i32,
        title: &str,
        content: &str,
        category_ids: &[i32],
        new_image: Option<&str>,
    ) -> Result<(Post, Vec<String>), sqlx::Error>;

    async fn set_published(&self, post_id: i32, published: bool) -> Result<Post, sqlx::Error>;

    /// Returns the image paths of the deleted post, `None` if it did not
    /// exist. Comments, ratings and watch links go with it.
    async fn delete_post(&self, post_id: i32) -> Result<Option<Vec<String>>, sqlx::Error>;

    /// Insert or overwrite the caller's rating; returns the new average.
    async fn rate_post(&self, post_id: i32, user_id: Uuid, value: i32)
    -> Result<f64, sqlx::Error>;

    async fn get_user_post_rating(
        &self,
        post_id: i32,
        user_id: Uuid,
    ) -> Result<Option<i32>, sqlx::Error>;
}

impl PostExt for DBClient {
    async fn get_posts(
        &self,
        filter: &PostFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<PostRow>, i64), sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(POST_ROW_SELECT);
        push_post_filter(&mut builder, filter);
        builder.push(format!(
            " ORDER BY {} {}, p.id DESC LIMIT ",
            filter.sort.column(),
            filter.order.keyword()
        ));
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let posts = builder
            .build_query_as::<PostRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM post p JOIN users u ON u.id = p.author_id");
        push_post_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((posts, total))
    }

    async fn get_post(&self, post_id: i32) -> Result<Option<PostRow>, sqlx::Error> {
        let sql = format!("{} WHERE p.id = $1", POST_ROW_SELECT);
        sqlx::query_as::<_, PostRow>(&sql)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_author_directory(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuthorSummary>, i64), sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT u.id, u.username, u.profile_picture,
                   COUNT(p.id) AS post_count,
                   MAX(p.created_at) AS latest_post_date,
                   (SELECT lp.title FROM post lp
                    WHERE lp.author_id = u.id AND lp.is_published
                    ORDER BY lp.created_at DESC, lp.id DESC LIMIT 1) AS latest_post
            "#,
        );
        push_author_directory_filter(&mut builder, search);
        builder.push(" GROUP BY u.id ORDER BY post_count DESC, u.username LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let authors = builder
            .build_query_as::<AuthorSummary>()
            .fetch_all(&self.pool)
            .await?;

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(DISTINCT u.id)");
        push_author_directory_filter(&mut count, search);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((authors, total))
    }

    async fn get_post_categories(
        &self,
        post_ids: &[i32],
    ) -> Result<Vec<PostCategory>, sqlx::Error> {
        sqlx::query_as::<_, PostCategory>(
            r#"
            SELECT pc.post_id, c.id, c.name
            FROM post_categories pc
            JOIN category c ON c.id = pc.category_id
            WHERE pc.post_id = ANY($1)
            ORDER BY c.name
            "#,
        )
        .bind(post_ids.to_vec())
        .fetch_all(&self.pool)
        .await
    }

    async fn get_post_images(&self, post_ids: &[i32]) -> Result<Vec<Image>, sqlx::Error> {
        sqlx::query_as::<_, Image>(
            r#"
            SELECT id, post_id, file_path, created_at
            FROM image
            WHERE post_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(post_ids.to_vec())
        .fetch_all(&self.pool)
        .await
    }

    async fn title_exists(&self, title: &str, exclude: Option<i32>) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM post
                WHERE LOWER(title) = LOWER($1) AND ($2::int IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(title)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await
    }

    async fn create_post(
        &self,
        author_id: Uuid,
        title: &str,
        content: &str,
        category_ids: &[i32],
        image_path: &str,
    ) -> Result<Post, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO post (title, content, author_id) VALUES ($1, $2, $3) RETURNING {}",
            POST_COLUMNS
        );
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(title)
            .bind(content)
            .bind(author_id)
            .fetch_one(&mut *tx)
            .await?;

        if !category_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO post_categories (post_id, category_id)
                SELECT $1, id FROM category WHERE id = ANY($2)
                "#,
            )
            .bind(post.id)
            .bind(category_ids.to_vec())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("INSERT INTO image (post_id, file_path) VALUES ($1, $2)")
            .bind(post.id)
            .bind(image_path)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(post)
    }

    async fn update_post(
        &self,
        post_id: i32,
        title: &str,
        content: &str,
        category_ids: &[i32],
        new_image: Option<&str>,
    ) -> Result<(Post, Vec<String>), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE post SET title = $2, content = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            POST_COLUMNS
        );
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(post_id)
            .bind(title)
            .bind(content)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM post_categories WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        if !category_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO post_categories (post_id, category_id)
                SELECT $1, id FROM category WHERE id = ANY($2)
                "#,
            )
            .bind(post_id)
            .bind(category_ids.to_vec())
            .execute(&mut *tx)
            .await?;
        }

        let mut removed = Vec::new();
        if let Some(path) = new_image {
            removed = sqlx::query_scalar("DELETE FROM image WHERE post_id = $1 RETURNING file_path")
                .bind(post_id)
                .fetch_all(&mut *tx)
                .await?;

            sqlx::query("INSERT INTO image (post_id, file_path) VALUES ($1, $2)")
                .bind(post_id)
                .bind(path)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok((post, removed))
    }

    async fn set_published(&self, post_id: i32, published: bool) -> Result<Post, sqlx::Error> {
        let sql = format!(
            "UPDATE post SET is_published = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            POST_COLUMNS
        );
        sqlx::query_as::<_, Post>(&sql)
            .bind(post_id)
            .bind(published)
            .fetch_one(&self.pool)
            .await
    }

    async fn delete_post(&self, post_id: i32) -> Result<Option<Vec<String>>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let images: Vec<String> =
            sqlx::query_scalar("SELECT file_path FROM image WHERE post_id = $1")
                .bind(post_id)
                .fetch_all(&mut *tx)
                .await?;

        let result = sqlx::query("DELETE FROM post WHERE id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(images))
    }

    async fn rate_post(
        &self,
        post_id: i32,
        user_id: Uuid,
        value: i32,
    ) -> Result<f64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO post_rating (value, post_id, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (post_id, user_id) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(value)
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let average: f64 = sqlx::query_scalar(
            "SELECT COALESCE(AVG(value), 0)::float8 FROM post_rating WHERE post_id = $1",
        )
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(average)
    }

    async fn get_user_post_rating(
        &self,
        post_id: i32,
        user_id: Uuid,
    ) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar("SELECT value FROM post_rating WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }
}

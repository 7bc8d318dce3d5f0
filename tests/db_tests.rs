//! Storage-level checks against a real Postgres.
//!
//! Runs only when `DATABASE_URL` is set; migrations are applied first and
//! every test works on rows with unique names, so a shared database is fine.

use blog_platform::{
    db::{
        CategoryExt, CommentExt, DBClient, NewUser, PostExt, RefreshTokenExt, RejectionExt,
        UserExt, WatchedExt,
    },
    models::{Post, User, UserRole},
    session,
};
use chrono::{Duration, Utc};
use sqlx::{PgPool, postgres::PgPoolOptions};
use uuid::Uuid;

async fn setup() -> Option<(DBClient, PgPool)> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to database for integration tests.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations.");

    Some((DBClient::new(pool.clone()), pool))
}

fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}

async fn create_user(db: &DBClient, role: UserRole) -> User {
    let username = unique("user");
    let email = format!("{}@example.com", username);
    db.save_user(NewUser {
        username: &username,
        email: &email,
        password: Some("not-a-real-hash"),
        role,
        is_approved: true,
        is_confirmed: true,
        profile_picture: None,
        auth_provider: "email",
        session_token: &session::new_marker(),
    })
    .await
    .expect("save user")
}

async fn create_post(db: &DBClient, author: &User) -> Post {
    let category = db
        .create_category(&unique("cat"), "cover.png")
        .await
        .expect("create category");
    db.create_post(
        author.id,
        &unique("Post title"),
        "<p>Body</p>",
        &[category.id],
        "main.png",
    )
    .await
    .expect("create post")
}

async fn count(pool: &PgPool, table: &str, column: &str, post_id: i32) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE {} = $1", table, column);
    sqlx::query_scalar(&sql)
        .bind(post_id)
        .fetch_one(pool)
        .await
        .expect("count rows")
}

async fn give_refresh_tokens(db: &DBClient, user: &User) {
    for _ in 0..2 {
        let hash = session::hash_refresh_token(&session::generate_refresh_token());
        db.save_refresh_token(user.id, &hash, Utc::now() + Duration::days(7))
            .await
            .expect("save refresh token");
    }
}

async fn live_refresh_tokens(pool: &PgPool, user: &User) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM refresh_tokens WHERE user_id = $1 AND NOT revoked")
        .bind(user.id)
        .fetch_one(pool)
        .await
        .expect("count refresh tokens")
}

async fn marker_of(db: &DBClient, user: &User) -> String {
    db.get_user_by_id(user.id)
        .await
        .expect("load user")
        .expect("user exists")
        .session_token
}

#[tokio::test]
async fn deleting_a_post_removes_everything_attached() {
    let Some((db, pool)) = setup().await else {
        return;
    };
    let author = create_user(&db, UserRole::Author).await;
    let reader = create_user(&db, UserRole::Commentator).await;
    let post = create_post(&db, &author).await;

    let comment = db
        .add_comment(post.id, reader.id, "Nice")
        .await
        .expect("add comment");
    db.rate_comment(comment.id, author.id, 5)
        .await
        .expect("rate comment");
    db.rate_post(post.id, reader.id, 4).await.expect("rate post");
    db.watch_post(reader.id, post.id).await.expect("watch post");

    let images = db.delete_post(post.id).await.expect("delete post");
    assert_eq!(images, Some(vec!["main.png".to_string()]));

    for (table, column) in [
        ("post", "id"),
        ("image", "post_id"),
        ("comment", "post_id"),
        ("post_rating", "post_id"),
        ("post_categories", "post_id"),
        ("watched_posts", "post_id"),
    ] {
        assert_eq!(count(&pool, table, column, post.id).await, 0, "{table} left behind");
    }
    assert_eq!(count(&pool, "comment_rating", "comment_id", comment.id).await, 0);

    assert_eq!(db.delete_post(post.id).await.expect("delete again"), None);
}

#[tokio::test]
async fn rating_twice_overwrites_the_first_rating() {
    let Some((db, pool)) = setup().await else {
        return;
    };
    let author = create_user(&db, UserRole::Author).await;
    let reader = create_user(&db, UserRole::Commentator).await;
    let other = create_user(&db, UserRole::Commentator).await;
    let post = create_post(&db, &author).await;

    assert_eq!(db.rate_post(post.id, reader.id, 2).await.expect("rate"), 2.0);
    assert_eq!(db.rate_post(post.id, reader.id, 4).await.expect("re-rate"), 4.0);
    assert_eq!(count(&pool, "post_rating", "post_id", post.id).await, 1);
    assert_eq!(
        db.get_user_post_rating(post.id, reader.id).await.expect("read rating"),
        Some(4)
    );

    assert_eq!(db.rate_post(post.id, other.id, 1).await.expect("rate"), 2.5);
    assert_eq!(count(&pool, "post_rating", "post_id", post.id).await, 2);
}

#[tokio::test]
async fn logout_rotates_the_marker_and_revokes_refresh_tokens() {
    let Some((db, pool)) = setup().await else {
        return;
    };
    let user = create_user(&db, UserRole::Commentator).await;
    give_refresh_tokens(&db, &user).await;
    assert_eq!(live_refresh_tokens(&pool, &user).await, 2);

    let marker = session::new_marker();
    db.rotate_session(user.id, &marker).await.expect("rotate");

    assert_eq!(marker_of(&db, &user).await, marker);
    assert_ne!(marker, user.session_token);
    assert_eq!(live_refresh_tokens(&pool, &user).await, 0);
}

#[tokio::test]
async fn blocking_rotates_the_marker_and_unblocking_keeps_it() {
    let Some((db, pool)) = setup().await else {
        return;
    };
    let user = create_user(&db, UserRole::Author).await;
    give_refresh_tokens(&db, &user).await;

    let marker = session::new_marker();
    let blocked = db.set_blocked(user.id, true, &marker).await.expect("block");
    assert!(blocked.is_blocked);
    assert_eq!(blocked.session_token, marker);
    assert_eq!(live_refresh_tokens(&pool, &user).await, 0);

    let unblocked = db
        .set_blocked(user.id, false, &session::new_marker())
        .await
        .expect("unblock");
    assert!(!unblocked.is_blocked);
    assert_eq!(unblocked.session_token, marker);
}

#[tokio::test]
async fn password_reset_rotates_the_marker_and_revokes_refresh_tokens() {
    let Some((db, pool)) = setup().await else {
        return;
    };
    let user = create_user(&db, UserRole::Commentator).await;
    give_refresh_tokens(&db, &user).await;

    let marker = session::new_marker();
    let updated = db
        .update_user_password(user.id, "another-hash", &marker)
        .await
        .expect("reset password");

    assert_eq!(updated.password.as_deref(), Some("another-hash"));
    assert_eq!(updated.session_token, marker);
    assert_eq!(live_refresh_tokens(&pool, &user).await, 0);
}

#[tokio::test]
async fn a_title_is_rejected_only_once_whatever_its_case() {
    let Some((db, _pool)) = setup().await else {
        return;
    };
    let title = unique("Spam offer");

    assert!(!db.is_title_rejected(&title).await.expect("check"));
    let record = db
        .add_rejection(&title, "moderator", "Off topic")
        .await
        .expect("record rejection");
    assert_eq!(record.reason.as_deref(), Some("Off topic"));

    assert!(db.is_title_rejected(&title.to_uppercase()).await.expect("check"));

    let err = db
        .add_rejection(&title.to_uppercase(), "moderator", "Again")
        .await
        .unwrap_err();
    assert!(
        err.as_database_error()
            .is_some_and(|e| e.is_unique_violation())
    );
}

#[tokio::test]
async fn author_directory_counts_published_posts_only() {
    let Some((db, _pool)) = setup().await else {
        return;
    };
    let author = create_user(&db, UserRole::Author).await;
    let draft = create_post(&db, &author).await;
    let published = create_post(&db, &author).await;
    db.set_published(published.id, true).await.expect("publish");

    let (authors, total) = db
        .get_author_directory(Some(author.username.as_str()), 10, 0)
        .await
        .expect("directory");
    assert_eq!(total, 1);
    assert_eq!(authors[0].id, author.id);
    assert_eq!(authors[0].post_count, 1);
    assert_eq!(authors[0].latest_post.as_deref(), Some(published.title.as_str()));

    db.delete_post(draft.id).await.expect("delete draft");
}

use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Account type. Stored as the PostgreSQL ENUM `user_role`.
///
/// The hierarchy is superadmin > admin > author / commentator; authors and
/// commentators share a rank and differ only in what content they may
/// create.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Superadmin,
    Admin,
    Author,
    Commentator,
}

impl UserRole {
    pub const ALL: [UserRole; 4] = [
        UserRole::Superadmin,
        UserRole::Admin,
        UserRole::Author,
        UserRole::Commentator,
    ];

    pub fn to_str(&self) -> &'static str {
        match self {
            UserRole::Superadmin => "superadmin",
            UserRole::Admin => "admin",
            UserRole::Author => "author",
            UserRole::Commentator => "commentator",
        }
    }

    /// Admin or superadmin.
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Superadmin)
    }

    /// Roles that are allowed to write posts.
    pub fn can_author(&self) -> bool {
        !matches!(self, UserRole::Commentator)
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superadmin" => Ok(UserRole::Superadmin),
            "admin" => Ok(UserRole::Admin),
            "author" => Ok(UserRole::Author),
            "commentator" => Ok(UserRole::Commentator),
            other => Err(format!("Invalid role: {}", other)),
        }
    }
}

/// Row of the `users` table.
///
/// `password` is `None` for accounts created through Google sign-in.
/// `session_token` is the session marker embedded in every access token;
/// replacing it logs the user out everywhere.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub role: UserRole,
    pub is_approved: bool,
    pub is_blocked: bool,
    pub is_confirmed: bool,
    pub profile_picture: Option<String>,
    #[serde(skip_serializing)]
    pub session_token: String,
    pub auth_provider: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub is_published: bool,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Uploaded image attached to a post. `file_path` is relative to the
/// PostPics upload directory.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Image {
    pub id: i32,
    pub post_id: i32,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Comment {
    pub id: i32,
    pub content: String,
    pub post_id: i32,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct ContactMessage {
    pub id: i32,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub is_read: bool,
    pub is_actioned: bool,
    pub created_at: DateTime<Utc>,
}

/// A post title an author or admin declined, kept so the same request is
/// not reviewed twice.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct RejectedRequest {
    pub id: i32,
    pub title: String,
    pub rejected_by: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Opaque refresh token. Only the SHA-256 of the raw value is stored.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct RefreshToken {
    pub id: i32,
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Admin".parse::<UserRole>(), Ok(UserRole::Admin));
        assert_eq!(" superadmin ".parse::<UserRole>(), Ok(UserRole::Superadmin));
        assert!("moderator".parse::<UserRole>().is_err());
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in UserRole::ALL {
            assert_eq!(role.to_str().parse::<UserRole>(), Ok(role));
        }
    }

    #[test]
    fn refresh_token_validity() {
        let now = Utc::now();
        let mut token = RefreshToken {
            id: 1,
            user_id: Uuid::new_v4(),
            token_hash: "h".into(),
            created_at: now,
            expires_at: now + Duration::days(1),
            revoked: false,
        };
        assert!(token.is_valid_at(now));
        assert!(!token.is_valid_at(now + Duration::days(2)));
        token.revoked = true;
        assert!(!token.is_valid_at(now));
    }

    #[test]
    fn user_serialization_hides_secrets() {
        let user = User {
            id: Uuid::new_v4(),
            username: "jane".into(),
            email: "jane@example.com".into(),
            password: Some("hash".into()),
            role: UserRole::Author,
            is_approved: true,
            is_blocked: false,
            is_confirmed: true,
            profile_picture: None,
            session_token: "marker".into(),
            auth_provider: "email".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("session_token").is_none());
        assert_eq!(json["role"], "author");
    }
}

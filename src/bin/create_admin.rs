//! Create or refresh an approved admin account.
//!
//! ```text
//! create-admin <username> <email> <password> [--role admin|superadmin]
//! ```

use blog_platform::{
    db::{DBClient, NewUser, UserExt},
    models::UserRole,
    session,
    utils::password,
};
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;

const USAGE: &str = "usage: create-admin <username> <email> <password> [--role admin|superadmin]";

#[derive(Debug, PartialEq)]
struct AdminArgs {
    username: String,
    email: String,
    password: String,
    role: UserRole,
}

fn parse_args(args: &[String]) -> Result<AdminArgs, String> {
    let mut positional = Vec::new();
    let mut role = UserRole::Admin;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--role" {
            let value = iter.next().ok_or("--role needs a value")?;
            role = match value.parse::<UserRole>() {
                Ok(r @ (UserRole::Admin | UserRole::Superadmin)) => r,
                _ => return Err(format!("role must be admin or superadmin, got {}", value)),
            };
        } else {
            positional.push(arg.trim().to_string());
        }
    }

    let [username, email, password] = <[String; 3]>::try_from(positional)
        .map_err(|_| USAGE.to_string())?;

    if username.is_empty() || email.is_empty() || password.is_empty() {
        return Err(USAGE.to_string());
    }

    Ok(AdminArgs {
        username,
        email: email.to_lowercase(),
        password,
        role,
    })
}

async fn run(args: AdminArgs) -> Result<(), String> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL is not set".to_string())?;

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .map_err(|e| format!("Failed to connect to the database: {}", e))?;
    let db = DBClient::new(pool);

    let hashed = password::hash(&args.password).map_err(|e| e.to_string())?;

    let by_email = db
        .get_user_by_email(&args.email)
        .await
        .map_err(|e| e.to_string())?;

    if let Some(owner) = db
        .get_user_by_username(&args.username)
        .await
        .map_err(|e| e.to_string())?
    {
        if by_email.as_ref().is_none_or(|u| u.id != owner.id) {
            return Err(format!(
                "Username {} already belongs to another account",
                args.username
            ));
        }
    }

    let user = match by_email {
        Some(existing) => {
            let user = db
                .sync_admin(existing.id, &args.username, &hashed, args.role)
                .await
                .map_err(|e| e.to_string())?;
            db.rotate_session(user.id, &session::new_marker())
                .await
                .map_err(|e| e.to_string())?;
            tracing::info!(user_id = %user.id, "Existing account updated");
            user
        }
        None => {
            let marker = session::new_marker();
            let user = db
                .save_user(NewUser {
                    username: &args.username,
                    email: &args.email,
                    password: Some(&hashed),
                    role: args.role,
                    is_approved: true,
                    is_confirmed: true,
                    profile_picture: None,
                    auth_provider: "email",
                    session_token: &marker,
                })
                .await
                .map_err(|e| e.to_string())?;
            tracing::info!(user_id = %user.id, "Account created");
            user
        }
    };

    println!("{} <{}> is now {}", user.username, user.email, user.role.to_str());
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt().with_target(false).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(2);
        }
    };

    if let Err(msg) = run(parsed).await {
        tracing::error!("{}", msg);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_to_admin_role() {
        let parsed = parse_args(&args(&["root", "Root@Example.com", "secret1"])).unwrap();
        assert_eq!(parsed.role, UserRole::Admin);
        assert_eq!(parsed.email, "root@example.com");
    }

    #[test]
    fn role_flag_anywhere() {
        let parsed =
            parse_args(&args(&["--role", "superadmin", "root", "r@x.io", "secret1"])).unwrap();
        assert_eq!(parsed.role, UserRole::Superadmin);
        assert_eq!(parsed.username, "root");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(&args(&["root", "r@x.io"])).is_err());
        assert!(parse_args(&args(&["root", "r@x.io", "pw", "extra"])).is_err());
        assert!(parse_args(&args(&["root", "r@x.io", "pw", "--role", "author"])).is_err());
        assert!(parse_args(&args(&["root", "r@x.io", "pw", "--role"])).is_err());
    }
}

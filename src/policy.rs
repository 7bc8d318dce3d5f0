//! Who may do what to whom.
//!
//! Every rule is a plain function over the acting user and the target so
//! handlers stay thin and the whole table is unit tested in one place.
//! Each returns `Ok(())` or the `HttpError` the endpoint should answer with.

use crate::{
    error::{ErrorMessage, HttpError},
    models::{User, UserRole},
};
use uuid::Uuid;

fn denied(msg: impl Into<String>) -> HttpError {
    HttpError::forbidden(msg)
}

/// Approving an account of `path_role`. Commentators never need approval,
/// so naming them here is a bad request.
pub fn can_approve(actor: &User, path_role: &str, target: &User) -> Result<(), HttpError> {
    let role: UserRole = path_role
        .parse()
        .map_err(|_| HttpError::bad_request("Invalid role"))?;

    if role == UserRole::Commentator {
        return Err(HttpError::bad_request("Invalid role"));
    }

    if target.role != role {
        return Err(HttpError::bad_request(format!(
            "User is not a {}",
            role.to_str()
        )));
    }

    match role {
        UserRole::Superadmin if actor.role != UserRole::Superadmin => Err(denied(
            "Only superadmins can approve other superadmins",
        )),
        UserRole::Admin if actor.role != UserRole::Superadmin => {
            Err(denied("Only superadmins can approve admins"))
        }
        UserRole::Author if !actor.role.is_staff() => Err(denied(
            "Only admins or superadmins can approve authors",
        )),
        _ => Ok(()),
    }
}

pub fn can_block(actor: &User, target: &User) -> Result<(), HttpError> {
    if actor.id == target.id {
        return Err(HttpError::bad_request("You cannot block yourself"));
    }

    match actor.role {
        UserRole::Admin if target.role != UserRole::Commentator => {
            Err(denied("Admins can only block commentators"))
        }
        UserRole::Superadmin if target.role == UserRole::Superadmin => {
            Err(denied("You cannot block another superadmin"))
        }
        UserRole::Admin | UserRole::Superadmin => Ok(()),
        _ => Err(denied(ErrorMessage::PermissionDenied.to_string())),
    }
}

pub fn can_unblock(actor: &User, target: &User) -> Result<(), HttpError> {
    if !target.is_blocked {
        return Err(HttpError::bad_request("User is not currently blocked"));
    }

    match actor.role {
        UserRole::Admin if target.role != UserRole::Commentator => {
            Err(denied("Admins can only unblock commentators"))
        }
        UserRole::Admin | UserRole::Superadmin => Ok(()),
        _ => Err(denied(ErrorMessage::PermissionDenied.to_string())),
    }
}

/// Roles a superadmin may assign through the role-change endpoint.
pub const ASSIGNABLE_ROLES: [UserRole; 3] =
    [UserRole::Commentator, UserRole::Author, UserRole::Admin];

pub fn can_change_role(actor: &User, new_role: UserRole) -> Result<(), HttpError> {
    if actor.role != UserRole::Superadmin {
        return Err(denied("Only superadmins can change roles"));
    }
    if !ASSIGNABLE_ROLES.contains(&new_role) {
        return Err(HttpError::bad_request("Invalid role"));
    }
    Ok(())
}

pub fn can_delete_user(actor: &User, target_id: Uuid) -> Result<(), HttpError> {
    if actor.role != UserRole::Superadmin {
        return Err(denied("Only superadmins can delete users"));
    }
    if actor.id == target_id {
        return Err(HttpError::bad_request("You cannot delete yourself"));
    }
    Ok(())
}

pub fn can_create_post(actor: &User) -> Result<(), HttpError> {
    if !actor.role.can_author() {
        return Err(denied("Only authors and admins can create posts"));
    }
    if !actor.is_approved {
        return Err(denied("Your account is awaiting approval"));
    }
    Ok(())
}

pub fn can_publish(actor: &User) -> Result<(), HttpError> {
    if !actor.role.is_staff() {
        return Err(denied("Only admins can publish or unpublish posts"));
    }
    if !actor.is_approved {
        return Err(denied("Your account is awaiting approval"));
    }
    Ok(())
}

pub fn can_edit_post(actor: &User, author_id: Uuid) -> Result<(), HttpError> {
    if actor.id == author_id || actor.role.is_staff() {
        Ok(())
    } else {
        Err(denied("You can only edit your own posts"))
    }
}

pub fn can_delete_post(actor: &User) -> Result<(), HttpError> {
    if actor.role.is_staff() {
        Ok(())
    } else {
        Err(denied("Only admins can delete posts"))
    }
}

/// Drafts are hidden, as not found, from everyone except their author and
/// staff.
pub fn can_view_post(viewer: Option<&User>, author_id: Uuid, is_published: bool) -> bool {
    is_published
        || viewer.is_some_and(|v| v.id == author_id || v.role.is_staff())
}

/// Edit or delete a comment.
pub fn can_modify_comment(actor: &User, owner_id: Uuid) -> bool {
    actor.id == owner_id || actor.role.is_staff()
}

pub fn require_staff(actor: &User) -> Result<(), HttpError> {
    if actor.role.is_staff() {
        Ok(())
    } else {
        Err(denied(ErrorMessage::PermissionDenied.to_string()))
    }
}

pub fn require_superadmin(actor: &User) -> Result<(), HttpError> {
    if actor.role == UserRole::Superadmin {
        Ok(())
    } else {
        Err(denied(ErrorMessage::PermissionDenied.to_string()))
    }
}

/// Roles an actor may see in user listings. Admins only see the accounts
/// they manage.
pub fn visible_roles(actor: &User) -> &'static [UserRole] {
    match actor.role {
        UserRole::Superadmin => &UserRole::ALL,
        UserRole::Admin => &[UserRole::Author, UserRole::Commentator],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use chrono::Utc;

    fn user(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            username: format!("{}-user", role.to_str()),
            email: format!("{}@example.com", Uuid::new_v4()),
            password: None,
            role,
            is_approved: true,
            is_blocked: false,
            is_confirmed: true,
            profile_picture: None,
            session_token: Uuid::new_v4().to_string(),
            auth_provider: "email".into(),
            created_at: Utc::now(),
        }
    }

    fn status(r: Result<(), HttpError>) -> StatusCode {
        match r {
            Ok(()) => StatusCode::OK,
            Err(e) => e.status,
        }
    }

    use UserRole::*;

    #[test]
    fn approve_table() {
        // (actor, target, expected)
        let cases = [
            (Superadmin, Superadmin, StatusCode::OK),
            (Admin, Superadmin, StatusCode::FORBIDDEN),
            (Superadmin, Admin, StatusCode::OK),
            (Admin, Admin, StatusCode::FORBIDDEN),
            (Superadmin, Author, StatusCode::OK),
            (Admin, Author, StatusCode::OK),
            (Author, Author, StatusCode::FORBIDDEN),
            (Commentator, Author, StatusCode::FORBIDDEN),
        ];
        for (actor, target, expected) in cases {
            let got = status(can_approve(&user(actor), target.to_str(), &user(target)));
            assert_eq!(got, expected, "{:?} approving {:?}", actor, target);
        }
    }

    #[test]
    fn approve_rejects_commentator_and_mismatch() {
        let admin = user(Superadmin);
        let c = user(Commentator);
        assert_eq!(
            status(can_approve(&admin, "commentator", &c)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(can_approve(&admin, "author", &user(Admin))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(can_approve(&admin, "editor", &c)),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn block_table() {
        let cases = [
            (Admin, Commentator, StatusCode::OK),
            (Admin, Author, StatusCode::FORBIDDEN),
            (Admin, Admin, StatusCode::FORBIDDEN),
            (Superadmin, Admin, StatusCode::OK),
            (Superadmin, Author, StatusCode::OK),
            (Superadmin, Superadmin, StatusCode::FORBIDDEN),
            (Author, Commentator, StatusCode::FORBIDDEN),
            (Commentator, Commentator, StatusCode::FORBIDDEN),
        ];
        for (actor, target, expected) in cases {
            let got = status(can_block(&user(actor), &user(target)));
            assert_eq!(got, expected, "{:?} blocking {:?}", actor, target);
        }
    }

    #[test]
    fn cannot_block_self() {
        let me = user(Superadmin);
        assert_eq!(status(can_block(&me, &me)), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unblock_table() {
        let blocked = |role| {
            let mut u = user(role);
            u.is_blocked = true;
            u
        };
        assert_eq!(
            status(can_unblock(&user(Admin), &blocked(Commentator))),
            StatusCode::OK
        );
        assert_eq!(
            status(can_unblock(&user(Admin), &blocked(Author))),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(can_unblock(&user(Superadmin), &blocked(Superadmin))),
            StatusCode::OK
        );
        assert_eq!(
            status(can_unblock(&user(Author), &blocked(Commentator))),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(can_unblock(&user(Superadmin), &user(Commentator))),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn role_change_is_superadmin_only() {
        assert_eq!(
            status(can_change_role(&user(Superadmin), Admin)),
            StatusCode::OK
        );
        assert_eq!(
            status(can_change_role(&user(Superadmin), Superadmin)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(can_change_role(&user(Admin), Author)),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn delete_user_rules() {
        let sa = user(Superadmin);
        assert_eq!(status(can_delete_user(&sa, sa.id)), StatusCode::BAD_REQUEST);
        assert_eq!(status(can_delete_user(&sa, Uuid::new_v4())), StatusCode::OK);
        assert_eq!(
            status(can_delete_user(&user(Admin), Uuid::new_v4())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn only_staff_publish() {
        for role in [Author, Commentator] {
            assert_eq!(status(can_publish(&user(role))), StatusCode::FORBIDDEN);
        }
        for role in [Admin, Superadmin] {
            assert_eq!(status(can_publish(&user(role))), StatusCode::OK);
        }
        let mut pending = user(Admin);
        pending.is_approved = false;
        assert_eq!(status(can_publish(&pending)), StatusCode::FORBIDDEN);
    }

    #[test]
    fn post_create_and_edit() {
        assert_eq!(status(can_create_post(&user(Commentator))), StatusCode::FORBIDDEN);
        let mut pending = user(Author);
        pending.is_approved = false;
        assert_eq!(status(can_create_post(&pending)), StatusCode::FORBIDDEN);
        assert_eq!(status(can_create_post(&user(Author))), StatusCode::OK);

        let author = user(Author);
        assert_eq!(status(can_edit_post(&author, author.id)), StatusCode::OK);
        assert_eq!(
            status(can_edit_post(&user(Author), author.id)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status(can_edit_post(&user(Admin), author.id)), StatusCode::OK);

        assert_eq!(status(can_delete_post(&author)), StatusCode::FORBIDDEN);
        assert_eq!(status(can_delete_post(&user(Superadmin))), StatusCode::OK);
    }

    #[test]
    fn drafts_are_private() {
        let author = user(Author);
        assert!(can_view_post(None, author.id, true));
        assert!(!can_view_post(None, author.id, false));
        assert!(can_view_post(Some(&author), author.id, false));
        assert!(!can_view_post(Some(&user(Commentator)), author.id, false));
        assert!(can_view_post(Some(&user(Admin)), author.id, false));
    }

    #[test]
    fn comment_ownership() {
        let owner = user(Commentator);
        assert!(can_modify_comment(&owner, owner.id));
        assert!(!can_modify_comment(&user(Author), owner.id));
        assert!(can_modify_comment(&user(Admin), owner.id));
    }

    #[test]
    fn listing_visibility() {
        assert_eq!(visible_roles(&user(Superadmin)).len(), 4);
        assert!(!visible_roles(&user(Admin)).contains(&Admin));
        assert!(visible_roles(&user(Author)).is_empty());
    }
}

pub mod auth;
pub mod category;
pub mod comment;
pub mod contact;
pub mod google;
pub mod post;
pub mod users;
pub mod watched;

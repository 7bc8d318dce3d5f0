pub mod multipart;
pub mod pagination;
pub mod password;
pub mod sanitize;
pub mod storage;
pub mod token;

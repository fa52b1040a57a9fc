pub mod rbac;
pub mod reset_token;
pub mod user;

pub mod admin_handler;
pub mod auth_handler;

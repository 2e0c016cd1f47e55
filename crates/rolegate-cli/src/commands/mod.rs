pub mod auth;
pub mod check;

pub mod auth;
pub mod deals;

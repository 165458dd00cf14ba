pub mod auth;
pub mod commission;
pub mod deals_service;
pub mod workflow;

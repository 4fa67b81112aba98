//! API handlers.

pub mod accounts;
pub mod admin;
pub mod balance;
pub mod deposits;
pub mod health;
pub mod keys;
pub mod operations;
pub mod webhooks;

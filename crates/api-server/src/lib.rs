#![warn(clippy::unwrap_used)]

pub mod loyalty_rest;
pub mod rest;
pub mod server;

pub use rest::{ApiError, AppState};
pub use server::ApiServer;

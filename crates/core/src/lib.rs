#![warn(clippy::unwrap_used)]

pub mod account;
pub mod config;
pub mod error;
pub mod events;
pub mod program;

pub use account::Account;
pub use config::AppConfig;
pub use error::{LoyaltyError, LoyaltyResult};
pub use program::Program;

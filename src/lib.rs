#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod logging;
pub mod login;
pub mod models;
pub mod orchestrator;
pub mod sentinel;
pub mod shutdown;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};

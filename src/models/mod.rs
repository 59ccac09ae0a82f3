//! Domain models shared by the supervisor, the login stage, and the CLI.

pub mod event;
pub mod identity;
pub mod state;

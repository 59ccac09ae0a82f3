//! Process orchestration.
//!
//! Covers ownership of spawned child processes, the supervising control
//! loop, and the fire-and-forget classification job launcher.

pub mod child;
pub mod jobs;
pub mod supervisor;

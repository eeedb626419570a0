//! Deployment module

pub mod compose;
pub mod docker;
pub mod executor;
pub mod git;
pub mod process;
pub mod state;
pub mod systemd;

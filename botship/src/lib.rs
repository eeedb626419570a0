//! botship library
//!
//! Deployment lifecycle for a chat bot running on a single remote host:
//! encrypted secrets, versioned deployments with rollback, backups of
//! persistent state and pre-deployment conflict detection.

pub mod app;
pub mod backup;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod prompt;
pub mod remote;
pub mod secrets;
pub mod storage;
pub mod utils;
pub mod version;

//! Backup and restore of persistent deployment state

pub mod manager;

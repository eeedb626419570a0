//! Encrypted secret storage on the remote host

pub mod cipher;
pub mod format;
pub mod store;

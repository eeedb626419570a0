//! Deployment versions and their history

pub mod status;
pub mod tag;
pub mod tracker;

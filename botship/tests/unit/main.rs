//! Unit tests for botship components, run against an in-memory remote

#[path = "../common/mod.rs"]
mod common;

mod test_deployer;
mod test_lock;
mod test_state;

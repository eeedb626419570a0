//! Remote lock unit tests

use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use botship::errors::DeployError;
use botship::remote::lock::RemoteLock;
use botship::remote::CommandOutput;
use botship::utils::CooldownOptions;

use crate::common::FakeRemote;

const LOCK: &str = "/root/mybot/.botship.lock";
const ACQUIRE: &str = "mkdir /root/mybot/.botship.lock";
const STALE_CHECK: &str = "find /root/mybot/.botship.lock";
const RELEASE: &str = "rm -rf /root/mybot/.botship.lock";

fn lock(remote: &Arc<FakeRemote>) -> RemoteLock {
    RemoteLock::new(remote.clone(), LOCK, Duration::from_millis(50)).with_cooldown(
        CooldownOptions {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        },
    )
}

#[tokio::test]
async fn test_acquire_and_release() {
    let remote = FakeRemote::new();
    let lock = lock(&remote);

    assert_ok!(lock.acquire().await);
    lock.release().await;

    assert_eq!(remote.count(ACQUIRE), 1);
    assert!(remote.position(ACQUIRE) < remote.position(RELEASE));
}

#[tokio::test]
async fn test_times_out_when_held() {
    let remote = FakeRemote::new();
    remote.respond(ACQUIRE, CommandOutput::failed(1, ""));
    let lock = lock(&remote);

    let err = assert_err!(lock.acquire().await);
    assert!(matches!(err, DeployError::Lock(_)));
    assert!(remote.count(ACQUIRE) > 1);
    assert!(!remote.ran(RELEASE));
}

#[tokio::test]
async fn test_breaks_stale_lock() {
    let remote = FakeRemote::new();
    remote.respond_once(ACQUIRE, CommandOutput::failed(1, ""));
    remote.respond_once(STALE_CHECK, CommandOutput::ok(format!("{}\n", LOCK)));
    let lock = lock(&remote);

    assert_ok!(lock.acquire().await);
    assert_eq!(remote.count(ACQUIRE), 2);
    let broken = remote.position(RELEASE).unwrap();
    assert!(broken < remote.commands().iter().rposition(|c| c.contains(ACQUIRE)).unwrap());
}

#[tokio::test]
async fn test_run_releases_on_error() {
    let remote = FakeRemote::new();
    let lock = lock(&remote);

    let result: Result<(), DeployError> = lock
        .run(async { Err(DeployError::Command("boom".to_string())) })
        .await;
    assert!(matches!(result, Err(DeployError::Command(_))));
    assert!(remote.ran(RELEASE));
}

#[tokio::test]
async fn test_run_skips_operation_without_lock() {
    let remote = FakeRemote::new();
    remote.respond(ACQUIRE, CommandOutput::failed(1, ""));
    let lock = lock(&remote);

    let mut ran = false;
    let result = lock
        .run(async {
            ran = true;
            Ok(())
        })
        .await;
    assert!(matches!(result, Err(DeployError::Lock(_))));
    assert!(!ran);
    assert!(!remote.ran(RELEASE));
}

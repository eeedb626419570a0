//! Deployment flow unit tests

use secrecy::SecretString;

use botship::errors::DeployError;
use botship::remote::CommandOutput;
use botship::storage::settings::DeploymentMethod;
use botship::version::status::VersionStatus;
use botship::version::tag::BuildTag;

use crate::common::{
    deployer, deployer_with, docker_status_pattern, local_dir, running_container, settings,
    FakeRemote, ScriptedPrompt, BOT, ROOT,
};

fn env_file() -> String {
    format!("{}/.env", ROOT)
}

#[tokio::test]
async fn test_clean_deploy() {
    let remote = FakeRemote::new();
    let deployer = deployer(&remote);
    deployer
        .secrets()
        .set_secret("BOT_TOKEN", &SecretString::from("t0k3n".to_string()))
        .await
        .unwrap();

    let dir = local_dir();
    std::fs::write(dir.path().join(".env"), "FOO=bar\nBOT_TOKEN=placeholder\n").unwrap();
    let prompt = ScriptedPrompt::answering(false);

    let outcome = deployer
        .deploy(dir.path(), false, &prompt)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(prompt.asked(), 0);
    assert_eq!(outcome.build_tag.name, BOT);
    assert_eq!(outcome.build_tag.source_revision, "unknown");
    assert!(outcome.backup.is_none());

    // Files first, then the env, then the build and compose startup
    let transfer = remote.position("transfer_files").unwrap();
    let env = remote.position(&format!("write_file {}", env_file())).unwrap();
    let build = remote.position("docker build -t").unwrap();
    let compose = remote.position("docker compose up -d").unwrap();
    assert!(transfer < env && env < build && build < compose);
    assert!(remote.ran(&format!("-t {}:latest", BOT)));

    let content = remote.file(&env_file()).unwrap();
    assert!(content.contains("FOO=\"bar\""));
    assert!(content.contains("BOT_TOKEN=\"t0k3n\""));
    assert!(!content.contains("placeholder"));
    assert_eq!(remote.mode(&env_file()), Some(0o600));

    let history = deployer.versions().load_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].build_tag, outcome.build_tag.to_string());
    assert_eq!(history[0].status, VersionStatus::Active);
}

#[tokio::test]
async fn test_deploy_without_env_skips_env_file() {
    let remote = FakeRemote::new();
    let deployer = deployer(&remote);
    let dir = local_dir();

    assert!(deployer
        .deploy(dir.path(), false, &ScriptedPrompt::answering(true))
        .await
        .unwrap()
        .is_some());
    assert!(remote.file(&env_file()).is_none());
}

#[tokio::test]
async fn test_deploy_missing_dir_fails() {
    let remote = FakeRemote::new();
    let deployer = deployer(&remote);
    let dir = local_dir();

    let err = deployer
        .deploy(&dir.path().join("absent"), false, &ScriptedPrompt::answering(true))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::NotFound(_)));
    assert!(remote.commands().is_empty());
}

#[tokio::test]
async fn test_failed_build_is_recorded() {
    let remote = FakeRemote::new();
    remote.respond("docker build", CommandOutput::failed(1, "Dockerfile not found"));
    let deployer = deployer(&remote);
    let dir = local_dir();

    let err = deployer
        .deploy(dir.path(), false, &ScriptedPrompt::answering(true))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Command(_)));
    assert!(!remote.ran("docker compose up"));

    let history = deployer.versions().load_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, VersionStatus::Failed);
    assert!(deployer.versions().active_version().await.is_none());
}

#[tokio::test]
async fn test_declined_replacement_aborts() {
    let remote = FakeRemote::new();
    remote.respond(&docker_status_pattern(), running_container());
    let deployer = deployer(&remote);
    let dir = local_dir();
    let prompt = ScriptedPrompt::answering(false);

    let outcome = deployer.deploy(dir.path(), false, &prompt).await.unwrap();
    assert!(outcome.is_none());
    assert_eq!(prompt.asked(), 1);
    assert!(!remote.ran("docker rm -f"));
    assert!(!remote.ran("transfer_files"));
    assert!(deployer.versions().load_history().await.is_empty());
}

#[tokio::test]
async fn test_forced_deploy_replaces_running_instance() {
    let remote = FakeRemote::new();
    remote.respond(&docker_status_pattern(), running_container());
    remote.respond("for p in", CommandOutput::ok("data\n"));
    let deployer = deployer(&remote);
    let dir = local_dir();
    let prompt = ScriptedPrompt::answering(false);

    let outcome = deployer
        .deploy(dir.path(), true, &prompt)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(prompt.asked(), 0);
    assert!(outcome.backup.is_some());
    assert!(remote.position("docker rm -f mybot") < remote.position("transfer_files"));
}

async fn seed_history(deployer: &botship::deploy::executor::Deployer) {
    let versions = deployer.versions();
    versions
        .add_deployment(&BuildTag::new(BOT, 1, "a"), VersionStatus::Active)
        .await
        .unwrap();
    versions
        .add_deployment(&BuildTag::new(BOT, 2, "b"), VersionStatus::Active)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rollback_to_previous() {
    let remote = FakeRemote::new();
    let deployer = deployer(&remote);
    seed_history(&deployer).await;
    remote.clear_log();

    let restored = deployer
        .rollback(None, &ScriptedPrompt::answering(true))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.build_tag, "mybot:v1-a");
    assert_eq!(restored.status, VersionStatus::Active);
    assert!(remote.ran("docker tag mybot:v1-a mybot:latest"));
    assert!(remote.ran("docker compose up -d"));

    let history = deployer.versions().load_history().await;
    assert_eq!(history[0].build_tag, "mybot:v2-b");
    assert_eq!(history[0].status, VersionStatus::RolledBack);
    assert_eq!(history[1].status, VersionStatus::Active);
}

#[tokio::test]
async fn test_rollback_to_explicit_tag() {
    let remote = FakeRemote::new();
    let deployer = deployer(&remote);
    seed_history(&deployer).await;

    let err = deployer
        .rollback(Some("mybot:v9-z"), &ScriptedPrompt::answering(true))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::NotFound(_)));

    // The active version cannot be restored onto itself
    let err = deployer
        .rollback(Some("mybot:v2-b"), &ScriptedPrompt::answering(true))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Validation(_)));
    assert!(!remote.ran("docker tag"));
}

#[tokio::test]
async fn test_rollback_declined() {
    let remote = FakeRemote::new();
    let deployer = deployer(&remote);
    seed_history(&deployer).await;

    let result = deployer
        .rollback(None, &ScriptedPrompt::answering(false))
        .await
        .unwrap();
    assert!(result.is_none());
    assert!(!remote.ran("docker tag"));
    assert_eq!(
        deployer.versions().active_version().await.unwrap().build_tag,
        "mybot:v2-b"
    );
}

#[tokio::test]
async fn test_rollback_without_history() {
    let remote = FakeRemote::new();
    let deployer = deployer(&remote);
    let err = deployer
        .rollback(None, &ScriptedPrompt::answering(true))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::NotFound(_)));
}

#[tokio::test]
async fn test_systemd_rollback_is_rejected() {
    let remote = FakeRemote::new();
    let deployer = deployer_with(&remote, settings(DeploymentMethod::Systemd));
    let prompt = ScriptedPrompt::answering(true);

    let err = deployer.rollback(None, &prompt).await.unwrap_err();
    assert!(matches!(err, DeployError::Validation(_)));
    assert_eq!(prompt.asked(), 0);
}

#[tokio::test]
async fn test_teardown_removes_files_but_keeps_backups() {
    let remote = FakeRemote::new();
    remote.respond(&docker_status_pattern(), running_container());
    let deployer = deployer(&remote);

    assert!(deployer
        .teardown(true, &ScriptedPrompt::answering(true))
        .await
        .unwrap());
    let remove = remote.position("docker rm -f mybot").unwrap();
    let wipe = remote
        .position("cd /root/mybot && find . -mindepth 1 -maxdepth 1 ! -name backups")
        .unwrap();
    assert!(remove < wipe);
}

#[tokio::test]
async fn test_teardown_declined() {
    let remote = FakeRemote::new();
    remote.respond(&docker_status_pattern(), running_container());
    let deployer = deployer(&remote);

    assert!(!deployer
        .teardown(true, &ScriptedPrompt::answering(false))
        .await
        .unwrap());
    assert!(remote.commands().is_empty());
}

#[tokio::test]
async fn test_teardown_keeps_files_by_default() {
    let remote = FakeRemote::new();
    let deployer = deployer(&remote);

    assert!(deployer
        .teardown(false, &ScriptedPrompt::answering(true))
        .await
        .unwrap());
    assert!(!remote.ran("docker rm -f"));
    assert!(!remote.ran("find ."));
}

#[tokio::test]
async fn test_status() {
    let remote = FakeRemote::new();
    remote.respond(&docker_status_pattern(), running_container());
    let deployer = deployer(&remote);
    seed_history(&deployer).await;

    let status = deployer.status().await.unwrap();
    assert_eq!(status.bot_name, BOT);
    assert_eq!(status.method, DeploymentMethod::Docker);
    assert_eq!(status.remote_dir, ROOT);
    assert!(status.process.running);
    assert_eq!(status.process.uptime.as_deref(), Some("2 hours"));
    assert_eq!(status.active.unwrap().build_tag, "mybot:v2-b");
}

#[tokio::test]
async fn test_rollback_after_failed_deploy() {
    let remote = FakeRemote::new();
    let deployer = deployer(&remote);
    let versions = deployer.versions();
    versions
        .add_deployment(&BuildTag::new(BOT, 1, "a"), VersionStatus::Active)
        .await
        .unwrap();
    versions
        .add_deployment(&BuildTag::new(BOT, 2, "b"), VersionStatus::Failed)
        .await
        .unwrap();
    assert!(versions.active_version().await.is_none());
    assert_eq!(
        versions.get_previous_version().await.unwrap().build_tag,
        "mybot:v1-a"
    );

    let restored = deployer
        .rollback(None, &ScriptedPrompt::answering(true))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.build_tag, "mybot:v1-a");
    assert!(remote.ran("docker tag mybot:v1-a mybot:latest"));

    let history = versions.load_history().await;
    assert_eq!(history[0].status, VersionStatus::Failed);
    assert_eq!(history[1].status, VersionStatus::Active);
}

#[tokio::test]
async fn test_removed_secret_leaves_runtime_env() {
    let remote = FakeRemote::new();
    let deployer = deployer(&remote);
    let dir = local_dir();
    let prompt = ScriptedPrompt::answering(true);

    deployer
        .secrets()
        .set_secret("BOT_TOKEN", &SecretString::from("t0k3n".to_string()))
        .await
        .unwrap();
    deployer.deploy(dir.path(), true, &prompt).await.unwrap().unwrap();
    assert!(remote.file(&env_file()).unwrap().contains("t0k3n"));

    assert!(deployer.secrets().remove_secret("BOT_TOKEN").await.unwrap());
    deployer.deploy(dir.path(), true, &prompt).await.unwrap().unwrap();
    assert!(remote.ran(&format!("rm -f {}", env_file())));
    assert!(remote.file(&env_file()).is_none());
}

#[tokio::test]
async fn test_failed_backup_does_not_abort_forced_deploy() {
    let remote = FakeRemote::new();
    remote.respond(&docker_status_pattern(), running_container());
    remote.respond("for p in", CommandOutput::ok("data\n"));
    remote.respond("tar -czf", CommandOutput::failed(2, "No space left on device"));
    let deployer = deployer(&remote);
    let dir = local_dir();

    let outcome = deployer
        .deploy(dir.path(), true, &ScriptedPrompt::answering(false))
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.backup.is_none());
    assert!(remote.position("tar -czf") < remote.position("docker build -t"));
    assert!(remote.ran("docker compose up -d"));

    let history = deployer.versions().load_history().await;
    assert_eq!(history[0].status, VersionStatus::Active);
}

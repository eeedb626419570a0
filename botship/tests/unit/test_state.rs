//! Deployment state detector unit tests

use botship::deploy::state::{DeployDecision, Health};
use botship::remote::CommandOutput;
use botship::storage::settings::DeploymentMethod;

use crate::common::{
    deployer, deployer_with, docker_status_pattern, exited_container, running_container,
    settings, FakeRemote, ScriptedPrompt,
};

#[tokio::test]
async fn test_no_process_proceeds_immediately() {
    let remote = FakeRemote::new();
    let deployer = deployer(&remote);
    let prompt = ScriptedPrompt::answering(false);

    let proceed = deployer
        .detector()
        .check_before_deploy(false, &prompt)
        .await
        .unwrap();
    assert!(proceed);
    assert_eq!(prompt.asked(), 0);
    assert!(!remote.ran("docker rm -f"));
}

#[tokio::test]
async fn test_running_process_and_declined_aborts() {
    let remote = FakeRemote::new();
    remote.respond(&docker_status_pattern(), running_container());
    let deployer = deployer(&remote);
    let prompt = ScriptedPrompt::answering(false);

    let proceed = deployer
        .detector()
        .check_before_deploy(false, &prompt)
        .await
        .unwrap();
    assert!(!proceed);
    assert_eq!(prompt.asked(), 1);
    assert!(!remote.ran("docker rm -f mybot"));
}

#[tokio::test]
async fn test_running_process_and_confirmed_is_replaced() {
    let remote = FakeRemote::new();
    remote.respond(&docker_status_pattern(), running_container());
    let deployer = deployer(&remote);
    let prompt = ScriptedPrompt::answering(true);

    assert!(deployer
        .detector()
        .check_before_deploy(false, &prompt)
        .await
        .unwrap());
    assert_eq!(prompt.asked(), 1);
    assert!(remote.ran("docker rm -f mybot"));
}

#[tokio::test]
async fn test_force_replaces_without_prompting() {
    let remote = FakeRemote::new();
    remote.respond(&docker_status_pattern(), running_container());
    let deployer = deployer(&remote);
    let prompt = ScriptedPrompt::answering(false);

    let proceed = deployer
        .detector()
        .check_before_deploy(true, &prompt)
        .await
        .unwrap();
    assert!(proceed);
    assert_eq!(prompt.asked(), 0);
    assert!(remote.ran("docker rm -f mybot"));
}

#[tokio::test]
async fn test_assess_decisions() {
    let remote = FakeRemote::new();
    let deployer = deployer(&remote);
    let detector = deployer.detector();

    assert_eq!(detector.assess(false).await.unwrap(), DeployDecision::ProceedClean);

    remote.respond(&docker_status_pattern(), exited_container());
    assert_eq!(
        detector.assess(false).await.unwrap(),
        DeployDecision::ProceedAfterStop
    );

    remote.respond(&docker_status_pattern(), running_container());
    let decision = detector.assess(false).await.unwrap();
    let DeployDecision::NeedsConfirmation { state } = &decision else {
        panic!("expected NeedsConfirmation, got {:?}", decision);
    };
    assert_eq!(state.health, Health::Healthy);
    assert_eq!(state.uptime.as_deref(), Some("2 hours"));
    assert!(!decision.proceeds());

    assert_eq!(detector.resolve(decision.clone(), false).await, DeployDecision::Abort);
    assert_eq!(
        detector.resolve(decision, true).await,
        DeployDecision::ProceedAfterStop
    );
}

#[tokio::test]
async fn test_dead_instance_is_removed() {
    let remote = FakeRemote::new();
    remote.respond(&docker_status_pattern(), exited_container());
    let deployer = deployer(&remote);
    let prompt = ScriptedPrompt::answering(false);

    assert!(deployer
        .detector()
        .check_before_deploy(false, &prompt)
        .await
        .unwrap());
    assert_eq!(prompt.asked(), 0);
    assert!(remote.ran("docker rm -f mybot"));
}

#[tokio::test]
async fn test_stale_instances_cleaned_first() {
    let remote = FakeRemote::new();
    remote.respond(
        "--filter status=exited",
        CommandOutput::ok("mybot_old\nother-app\nmybot-worker-1\n"),
    );
    let deployer = deployer(&remote);
    let detector = deployer.detector();

    let stale = detector.detect_stale_instances().await.unwrap();
    assert_eq!(stale, vec!["mybot_old".to_string(), "mybot-worker-1".to_string()]);

    remote.clear_log();
    remote.respond("docker rm mybot-worker-1", CommandOutput::failed(1, "in use"));
    assert!(detector
        .check_before_deploy(false, &ScriptedPrompt::answering(false))
        .await
        .unwrap());

    let cleanup = remote.position("docker rm mybot_old").unwrap();
    let status = remote.position(&docker_status_pattern()).unwrap();
    assert!(cleanup < status);
    assert!(!remote.ran("docker rm other-app"));
}

#[tokio::test]
async fn test_remove_failures_are_not_fatal() {
    let remote = FakeRemote::new();
    remote.respond(&docker_status_pattern(), running_container());
    remote.respond("docker rm -f mybot", CommandOutput::failed(1, "daemon busy"));
    let deployer = deployer(&remote);

    assert!(deployer
        .detector()
        .check_before_deploy(true, &ScriptedPrompt::answering(false))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_systemd_state() {
    let remote = FakeRemote::new();
    remote.respond(
        "systemctl show mybot.service",
        CommandOutput::ok(
            "LoadState=loaded\nActiveState=active\nSubState=running\nActiveEnterTimestamp=Mon 2025-01-06 10:00:00 UTC\n",
        ),
    );
    let deployer = deployer_with(&remote, settings(DeploymentMethod::Systemd));

    let state = deployer.detector().get_process_state().await.unwrap();
    assert!(state.exists);
    assert!(state.running);
    assert_eq!(deployer.process().instance_name(), "mybot.service");

    assert!(deployer
        .detector()
        .check_before_deploy(true, &ScriptedPrompt::answering(false))
        .await
        .unwrap());
    assert!(remote.ran("systemctl stop mybot.service"));
}

//! In-memory remote host for tests

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use botship::deploy::executor::Deployer;
use botship::errors::{DeployError, DeployResult};
use botship::prompt::Prompt;
use botship::remote::{CommandOutput, RemoteChannel};
use botship::secrets::cipher::SecretCipher;
use botship::storage::settings::{DeploymentMethod, Settings};
use secrecy::ExposeSecret;

pub const ROOT: &str = "/root/mybot";
pub const BOT: &str = "mybot";

struct Rule {
    pattern: String,
    output: CommandOutput,
    once: bool,
}

/// Remote channel backed by scripted command responses and a file map.
///
/// Commands are answered by the most recently added rule whose pattern is a
/// substring of the command; unmatched commands succeed with empty output.
#[derive(Default)]
pub struct FakeRemote {
    rules: Mutex<Vec<Rule>>,
    files: Mutex<HashMap<String, (Vec<u8>, u32)>>,
    failing_writes: Mutex<Vec<String>>,
    log: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, pattern: &str, output: CommandOutput) {
        self.push_rule(pattern, output, false);
    }

    pub fn respond_once(&self, pattern: &str, output: CommandOutput) {
        self.push_rule(pattern, output, true);
    }

    fn push_rule(&self, pattern: &str, output: CommandOutput, once: bool) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            output,
            once,
        });
    }

    pub fn put_file(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), (content.as_bytes().to_vec(), 0o644));
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|(content, _)| String::from_utf8_lossy(content).to_string())
    }

    pub fn mode(&self, path: &str) -> Option<u32> {
        self.files.lock().unwrap().get(path).map(|(_, mode)| *mode)
    }

    pub fn fail_writes_to(&self, path: &str) {
        self.failing_writes.lock().unwrap().push(path.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.position(pattern).is_some()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }

    /// Index of the first logged command containing `pattern`
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .position(|c| c.contains(pattern))
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl RemoteChannel for FakeRemote {
    async fn exec(&self, command: &str) -> DeployResult<CommandOutput> {
        self.record(command.to_string());
        if let Some(path) = command.strip_prefix("rm -f ") {
            self.files.lock().unwrap().remove(path.trim());
        }

        let mut rules = self.rules.lock().unwrap();
        let Some(index) = rules.iter().rposition(|r| command.contains(&r.pattern)) else {
            return Ok(CommandOutput::ok(""));
        };
        let output = rules[index].output.clone();
        if rules[index].once {
            rules.remove(index);
        }
        Ok(output)
    }

    async fn write_file(&self, content: &[u8], remote_path: &str, mode: u32) -> DeployResult<()> {
        self.record(format!("write_file {}", remote_path));
        if self.failing_writes.lock().unwrap().iter().any(|p| p == remote_path) {
            return Err(DeployError::Command(format!("Failed to write {}", remote_path)));
        }
        self.files
            .lock()
            .unwrap()
            .insert(remote_path.to_string(), (content.to_vec(), mode));
        Ok(())
    }

    async fn transfer_files(&self, local_dir: &Path, remote_dir: &str) -> DeployResult<()> {
        self.record(format!("transfer_files {} {}", local_dir.display(), remote_dir));
        Ok(())
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> DeployResult<()> {
        self.record(format!("download_file {}", remote_path));
        let content = self
            .files
            .lock()
            .unwrap()
            .get(remote_path)
            .map(|(content, _)| content.clone())
            .ok_or_else(|| DeployError::NotFound(remote_path.to_string()))?;
        std::fs::write(local_path, content)?;
        Ok(())
    }

    async fn read_file(&self, remote_path: &str) -> DeployResult<Option<String>> {
        self.record(format!("read_file {}", remote_path));
        Ok(self.file(remote_path))
    }

    async fn path_exists(&self, remote_path: &str) -> DeployResult<bool> {
        self.record(format!("path_exists {}", remote_path));
        let prefix = format!("{}/", remote_path);
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .any(|p| p == remote_path || p.starts_with(&prefix)))
    }
}

/// Answers every question the same way and counts how often it was asked
pub struct ScriptedPrompt {
    answer: bool,
    asked: Cell<usize>,
}

impl ScriptedPrompt {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: Cell::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.get()
    }
}

impl Prompt for ScriptedPrompt {
    fn confirm(&self, _question: &str) -> bool {
        self.asked.set(self.asked.get() + 1);
        self.answer
    }
}

pub fn settings(method: DeploymentMethod) -> Settings {
    let mut settings = Settings::default();
    settings.vps.host = "bot.example.com".to_string();
    settings.vps.user = "root".to_string();
    settings.bot.name = BOT.to_string();
    settings.secrets.encryption_key =
        Some(SecretCipher::generate_key().expose_secret().to_string());
    settings.deployment.method = method;
    settings.deployment.lock_timeout_secs = 1;
    settings
}

pub fn deployer(remote: &Arc<FakeRemote>) -> Deployer {
    deployer_with(remote, settings(DeploymentMethod::Docker))
}

pub fn deployer_with(remote: &Arc<FakeRemote>, settings: Settings) -> Deployer {
    Deployer::new(&settings, remote.clone()).unwrap()
}

/// `docker ps` status line for the bot container
pub fn docker_status_pattern() -> String {
    format!("docker ps -a --filter 'name=^{}$'", BOT)
}

pub fn running_container() -> CommandOutput {
    CommandOutput::ok(format!("Up 2 hours (healthy)|running|{}:latest\n", BOT))
}

pub fn exited_container() -> CommandOutput {
    CommandOutput::ok(format!("Exited (0) 5 minutes ago|exited|{}:latest\n", BOT))
}

pub fn local_dir() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

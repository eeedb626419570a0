//! Command dispatch

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::app::options::{AppOptions, BackupCommand, Command, SecretsCommand, USAGE};
use crate::deploy::executor::Deployer;
use crate::filesys::file::File;
use crate::logs::{init_logging, LogOptions};
use crate::prompt::{AssumeYes, Prompt, TerminalPrompt};
use crate::remote::ssh::{SshChannel, SshOptions};
use crate::secrets::cipher::SecretCipher;
use crate::storage::settings::Settings;
use crate::utils::version_info;
use crate::version::status::VersionStatus;

/// Run one CLI invocation
pub async fn run(options: AppOptions) -> anyhow::Result<()> {
    if !options.command.needs_remote() {
        return run_local(&options.command);
    }

    let settings = Settings::load(&File::new(&options.config_file))
        .await
        .with_context(|| format!("Failed to load {}", options.config_file.display()))?;

    let _log_guard = init_logging(LogOptions {
        log_level: options.log_level.unwrap_or(settings.log_level),
        log_dir: options.log_dir.clone(),
        json_format: options.json_logs,
        ..Default::default()
    })?;
    debug!("Loaded settings from {}", options.config_file.display());

    let channel = Arc::new(SshChannel::new(SshOptions::from_settings(&settings)));
    let deployer = Deployer::new(&settings, channel)?;

    let prompt: Box<dyn Prompt> = if options.assume_yes {
        Box::new(AssumeYes)
    } else {
        Box::new(TerminalPrompt)
    };

    dispatch(&options.command, &deployer, &settings, prompt.as_ref()).await
}

/// Commands that need neither the config file nor the remote host
fn run_local(command: &Command) -> anyhow::Result<()> {
    match command {
        Command::Version => println!("{}", serde_json::to_string_pretty(&version_info())?),
        Command::Secrets(SecretsCommand::GenerateKey) => {
            let key = SecretCipher::generate_key();
            println!("{}", key.expose_secret());
            eprintln!(
                "{}",
                "Store this as secrets.encryption_key or BOTSHIP_ENCRYPTION_KEY. Losing it makes stored secrets unreadable."
                    .yellow()
            );
        }
        _ => print!("{}", USAGE),
    }
    Ok(())
}

async fn dispatch(
    command: &Command,
    deployer: &Deployer,
    settings: &Settings,
    prompt: &dyn Prompt,
) -> anyhow::Result<()> {
    match command {
        Command::Deploy { dir, force } => match deployer.deploy(dir, *force, prompt).await? {
            Some(outcome) => {
                if let Some(backup) = &outcome.backup {
                    println!("Backup: {}", backup);
                }
                println!("{} {}", "Deployed".green().bold(), outcome.build_tag);
            }
            None => println!("{}", "Deployment aborted".yellow()),
        },

        Command::Rollback { target } => match deployer.rollback(target.as_deref(), prompt).await? {
            Some(version) => println!("{} {}", "Rolled back to".green().bold(), version.build_tag),
            None => println!("{}", "Rollback cancelled".yellow()),
        },

        Command::Status => {
            let status = deployer.status().await?;
            println!("{}  {} ({})", "Bot".bold(), status.bot_name, status.method);
            println!("{}  {}", "Dir".bold(), status.remote_dir);
            let process = &status.process;
            if !process.exists {
                println!("{}  {}", "State".bold(), "not deployed".yellow());
            } else if process.running {
                println!(
                    "{}  {} (up {}, {})",
                    "State".bold(),
                    "running".green(),
                    process.uptime.as_deref().unwrap_or("?"),
                    process.health
                );
            } else {
                println!("{}  {} ({})", "State".bold(), "stopped".red(), process.status);
            }
            match &status.active {
                Some(active) => println!(
                    "{}  {} (deployed {})",
                    "Version".bold(),
                    active.build_tag,
                    active.deployed_at
                ),
                None => println!("{}  {}", "Version".bold(), "none recorded".yellow()),
            }
        }

        Command::Teardown { remove_files } => {
            if deployer.teardown(*remove_files, prompt).await? {
                println!("{}", "Teardown complete".green().bold());
            } else {
                println!("{}", "Teardown cancelled".yellow());
            }
        }

        Command::History => {
            let versions = deployer.versions().load_history().await;
            if versions.is_empty() {
                println!("No deployments recorded");
            }
            for version in versions {
                let status = version.status.to_string();
                let status = match version.status {
                    VersionStatus::Active => status.green(),
                    VersionStatus::Failed => status.red(),
                    _ => status.normal(),
                };
                println!("{:<12} {}  {}", status, version.deployed_at, version.build_tag);
            }
        }

        Command::CleanupImages => {
            let removed = deployer.versions().cleanup_old_images(deployer.bot_name()).await?;
            println!("Removed {} image(s)", removed);
        }

        Command::Secrets(command) => run_secrets(command, deployer).await?,
        Command::Backup(command) => run_backup(command, deployer, settings, prompt).await?,

        Command::Version | Command::Help => run_local(command)?,
    }
    Ok(())
}

async fn run_secrets(command: &SecretsCommand, deployer: &Deployer) -> anyhow::Result<()> {
    let store = deployer.secrets();
    match command {
        SecretsCommand::GenerateKey => {}
        SecretsCommand::Set { name, value } => {
            let value = match value {
                Some(value) => SecretString::from(value.clone()),
                None => read_secret_from_stdin(name)?,
            };
            store.set_secret(name, &value).await?;
            println!("{} {}", "Stored".green(), name);
        }
        SecretsCommand::Get { name } => match store.get_secret(name).await? {
            Some(value) => println!("{}", value.expose_secret()),
            None => bail!("Secret {} not found", name),
        },
        SecretsCommand::List => {
            let secrets = store.list_secrets(false).await?;
            if secrets.is_empty() {
                println!("No secrets stored");
            }
            for (name, masked) in secrets {
                println!("{} = {}", name, masked);
            }
        }
        SecretsCommand::Remove { name } => {
            if store.remove_secret(name).await? {
                println!("{} {}", "Removed".green(), name);
            } else {
                bail!("Secret {} not found", name);
            }
        }
        SecretsCommand::Import { file } => {
            let contents = File::new(file)
                .read_string()
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let count = store.import_env(&contents).await?;
            println!("Imported {} secret(s)", count);
        }
    }
    Ok(())
}

async fn run_backup(
    command: &BackupCommand,
    deployer: &Deployer,
    settings: &Settings,
    prompt: &dyn Prompt,
) -> anyhow::Result<()> {
    let backups = deployer.backups();
    match command {
        BackupCommand::Create => match backups.create_backup(false).await? {
            Some(filename) => println!("{} {}", "Created".green(), filename),
            None => println!("Nothing to back up"),
        },
        BackupCommand::List => {
            let list = backups.list_backups().await?;
            if list.is_empty() {
                println!("No backups");
            }
            for backup in list {
                let created = backup
                    .created_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "unknown date".to_string());
                println!("{:<34} {:>8}  {}", backup.filename, backup.size, created);
            }
        }
        BackupCommand::Restore { filename } => {
            if backups.restore_backup(filename, Some(prompt)).await? {
                println!("{} {}", "Restored".green(), filename);
            } else {
                println!("{}", "Restore cancelled".yellow());
            }
        }
        BackupCommand::Download { filename, dest } => {
            let path = backups.download_backup(filename, dest).await?;
            println!("Saved {}", path.display());
        }
        BackupCommand::Cleanup {
            retention_days,
            max_backups,
        } => {
            let deleted = backups
                .cleanup_old_backups(
                    retention_days.unwrap_or(settings.backup.retention_days),
                    max_backups.unwrap_or(settings.backup.max_backups),
                )
                .await?;
            println!("Deleted {} backup(s)", deleted);
        }
    }
    Ok(())
}

fn read_secret_from_stdin(name: &str) -> anyhow::Result<SecretString> {
    eprint!("Value for {}: ", name);
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read secret value from stdin")?;
    let value = line.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        bail!("Empty value for {}", name);
    }
    Ok(SecretString::from(value))
}

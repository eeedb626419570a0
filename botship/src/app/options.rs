//! Command line options
//!
//! Flags use the `--key=value` form, bare `--flag` meaning `true`. Anything
//! not starting with `--` is a positional word (command, subcommand and
//! their arguments).

use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::DeployError;
use crate::logs::LogLevel;

pub const DEFAULT_CONFIG_FILE: &str = "botship.json";
pub const DEFAULT_DOWNLOAD_DIR: &str = "backups";

pub const USAGE: &str = "\
Usage: botship <command> [options]

Commands:
  deploy [--dir=PATH] [--force]        Deploy PATH (default: current directory)
  rollback [--to=TAG]                  Roll back to TAG or the previous version
  status                               Show process state and active version
  teardown [--remove-files]            Stop and remove the bot
  history                              List recorded deployments
  cleanup-images                       Remove images no deployment references
  secrets generate-key                 Print a new encryption key
  secrets set NAME [VALUE]             Store a secret (VALUE read from stdin if omitted)
  secrets get NAME                     Print a decrypted secret
  secrets list                         List secret names
  secrets remove NAME                  Delete a secret
  secrets import FILE                  Store every variable of a dotenv file
  backup create                        Back up data, env and secrets
  backup list                          List backups, newest first
  backup restore FILE                  Restore a backup
  backup download FILE [--dest=DIR]    Copy a backup to DIR (default: ./backups)
  backup cleanup [--retention-days=N] [--max-backups=N]

Options:
  --config=PATH      Config file (default: botship.json)
  --yes              Answer yes to every confirmation
  --log-level=LEVEL  trace, debug, info, warn or error
  --log-dir=DIR      Also write daily log files to DIR
  --json-logs        Log as JSON
  --version          Print version information
";

/// Raw split of the command line
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    positionals: Vec<String>,
    flags: HashMap<String, String>,
}

impl CliArgs {
    /// Parse arguments, excluding the program name
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cli = CliArgs::default();
        for arg in args {
            let arg: String = arg.into();
            match arg.strip_prefix("--") {
                Some(flag) => match flag.split_once('=') {
                    Some((key, value)) => {
                        cli.flags.insert(key.to_string(), value.to_string());
                    }
                    None => {
                        cli.flags.insert(flag.to_string(), "true".to_string());
                    }
                },
                None => cli.positionals.push(arg),
            }
        }
        cli
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.value(key), Some("true") | Some("1") | Some("yes"))
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.flags.get(key).map(String::as_str)
    }

    pub fn positional(&self, index: usize) -> Option<&str> {
        self.positionals.get(index).map(String::as_str)
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, DeployError> {
        self.value(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|_| {
                    DeployError::Validation(format!("Invalid value for --{}: {}", key, raw))
                })
            })
            .transpose()
    }

    fn required(&self, index: usize, what: &str) -> Result<String, DeployError> {
        self.positional(index)
            .map(str::to_string)
            .ok_or_else(|| DeployError::Validation(format!("Missing {}", what)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Deploy { dir: PathBuf, force: bool },
    Rollback { target: Option<String> },
    Status,
    Teardown { remove_files: bool },
    History,
    CleanupImages,
    Secrets(SecretsCommand),
    Backup(BackupCommand),
    Version,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretsCommand {
    GenerateKey,
    Set { name: String, value: Option<String> },
    Get { name: String },
    List,
    Remove { name: String },
    Import { file: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupCommand {
    Create,
    List,
    Restore { filename: String },
    Download { filename: String, dest: PathBuf },
    Cleanup { retention_days: Option<u32>, max_backups: Option<usize> },
}

impl Command {
    /// Whether the command needs the config file and a remote connection
    pub fn needs_remote(&self) -> bool {
        !matches!(
            self,
            Command::Version | Command::Help | Command::Secrets(SecretsCommand::GenerateKey)
        )
    }
}

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub command: Command,
    pub config_file: PathBuf,

    /// Skip every confirmation prompt
    pub assume_yes: bool,

    /// Overrides the configured log level
    pub log_level: Option<LogLevel>,
    pub log_dir: Option<PathBuf>,
    pub json_logs: bool,
}

impl AppOptions {
    pub fn from_args<I, S>(args: I) -> Result<Self, DeployError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cli = CliArgs::parse(args);
        let log_level = cli
            .value("log-level")
            .map(|raw| raw.parse::<LogLevel>().map_err(DeployError::Validation))
            .transpose()?;

        Ok(Self {
            command: parse_command(&cli)?,
            config_file: PathBuf::from(cli.value("config").unwrap_or(DEFAULT_CONFIG_FILE)),
            assume_yes: cli.flag("yes") || cli.flag("y"),
            log_level,
            log_dir: cli.value("log-dir").map(PathBuf::from),
            json_logs: cli.flag("json-logs"),
        })
    }
}

fn parse_command(cli: &CliArgs) -> Result<Command, DeployError> {
    if cli.flag("version") {
        return Ok(Command::Version);
    }
    if cli.flag("help") {
        return Ok(Command::Help);
    }

    let Some(command) = cli.positional(0) else {
        return Ok(Command::Help);
    };
    let command = match command {
        "deploy" => Command::Deploy {
            dir: PathBuf::from(cli.value("dir").or(cli.positional(1)).unwrap_or(".")),
            force: cli.flag("force"),
        },
        "rollback" => Command::Rollback {
            target: cli
                .value("to")
                .or(cli.positional(1))
                .map(str::to_string),
        },
        "status" => Command::Status,
        "teardown" => Command::Teardown {
            remove_files: cli.flag("remove-files"),
        },
        "history" => Command::History,
        "cleanup-images" => Command::CleanupImages,
        "secrets" => Command::Secrets(parse_secrets(cli)?),
        "backup" => Command::Backup(parse_backup(cli)?),
        "version" => Command::Version,
        "help" => Command::Help,
        other => {
            return Err(DeployError::Validation(format!("Unknown command: {}", other)));
        }
    };
    Ok(command)
}

fn parse_secrets(cli: &CliArgs) -> Result<SecretsCommand, DeployError> {
    let sub = cli.required(1, "secrets subcommand")?;
    let command = match sub.as_str() {
        "generate-key" => SecretsCommand::GenerateKey,
        "set" => SecretsCommand::Set {
            name: cli.required(2, "secret name")?,
            value: cli.positional(3).map(str::to_string),
        },
        "get" => SecretsCommand::Get {
            name: cli.required(2, "secret name")?,
        },
        "list" => SecretsCommand::List,
        "remove" | "rm" => SecretsCommand::Remove {
            name: cli.required(2, "secret name")?,
        },
        "import" => SecretsCommand::Import {
            file: PathBuf::from(cli.required(2, "dotenv file")?),
        },
        other => {
            return Err(DeployError::Validation(format!(
                "Unknown secrets subcommand: {}",
                other
            )));
        }
    };
    Ok(command)
}

fn parse_backup(cli: &CliArgs) -> Result<BackupCommand, DeployError> {
    let sub = cli.required(1, "backup subcommand")?;
    let command = match sub.as_str() {
        "create" => BackupCommand::Create,
        "list" => BackupCommand::List,
        "restore" => BackupCommand::Restore {
            filename: cli.required(2, "backup file name")?,
        },
        "download" => BackupCommand::Download {
            filename: cli.required(2, "backup file name")?,
            dest: PathBuf::from(cli.value("dest").unwrap_or(DEFAULT_DOWNLOAD_DIR)),
        },
        "cleanup" => BackupCommand::Cleanup {
            retention_days: cli.parsed("retention-days")?,
            max_backups: cli.parsed("max-backups")?,
        },
        other => {
            return Err(DeployError::Validation(format!(
                "Unknown backup subcommand: {}",
                other
            )));
        }
    };
    Ok(command)
}

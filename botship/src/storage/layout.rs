//! Remote deployment directory layout

/// File names inside the deployment root
pub const HISTORY_FILE: &str = ".deploy-history.json";
pub const SECRETS_FILE: &str = ".secrets.env.encrypted";
pub const ENV_FILE: &str = ".env";
pub const DATA_DIR: &str = "data";
pub const BACKUPS_DIR: &str = "backups";
pub const LOCK_DIR: &str = ".botship.lock";

/// Paths of the single deployment directory on the remote host.
///
/// Remote paths are always POSIX, so they are kept as strings rather than
/// `PathBuf`, which would follow the local platform's conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    root: String,
}

impl RemoteLayout {
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        let trimmed = root.trim_end_matches('/');
        Self {
            root: if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() },
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Join a relative path onto the deployment root
    pub fn join(&self, relative: &str) -> String {
        if self.root == "/" {
            format!("/{}", relative)
        } else {
            format!("{}/{}", self.root, relative)
        }
    }

    pub fn history_file(&self) -> String {
        self.join(HISTORY_FILE)
    }

    pub fn secrets_file(&self) -> String {
        self.join(SECRETS_FILE)
    }

    pub fn env_file(&self) -> String {
        self.join(ENV_FILE)
    }

    pub fn backups_dir(&self) -> String {
        self.join(BACKUPS_DIR)
    }

    pub fn backup_file(&self, filename: &str) -> String {
        format!("{}/{}", self.backups_dir(), filename)
    }

    pub fn lock_dir(&self) -> String {
        self.join(LOCK_DIR)
    }

    /// Candidates captured by a backup, relative to the root
    pub fn backup_candidates(&self) -> [&'static str; 3] {
        [DATA_DIR, ENV_FILE, SECRETS_FILE]
    }
}

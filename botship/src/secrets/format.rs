//! Text formats for secret and environment files
//!
//! The encrypted secret file is a comment header followed by one
//! `NAME=<token>` line per secret. Names cannot contain `=`, so a line is
//! split at its first `=` and the token keeps any base64 padding.

use crate::errors::{DeployError, DeployResult};

/// Ordered name/value pairs with unique names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entries {
    items: Vec<(String, String)>,
}

impl Entries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Replace the value of `name`, or append it
    pub fn upsert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.items.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.items.push((name, value)),
        }
    }

    /// `false` if `name` was not present
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|(n, _)| n != name);
        self.items.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Entries {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut entries = Entries::new();
        for (name, value) in iter {
            entries.upsert(name, value);
        }
        entries
    }
}

/// Secret and environment variable names: `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate_name(name: &str) -> DeployResult<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(DeployError::Validation(format!(
            "Invalid secret name '{}': use letters, digits and underscores, not starting with a digit",
            name
        )))
    }
}

/// Parse the encrypted secret file. Values are left encrypted.
pub fn parse_secret_file(content: &str) -> Entries {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_once('='))
        .map(|(name, token)| (name.trim().to_string(), token.trim().to_string()))
        .filter(|(name, token)| is_valid_name(name) && !token.is_empty())
        .collect()
}

pub fn render_secret_file(bot_name: &str, entries: &Entries) -> String {
    let mut out = format!(
        "# Encrypted secrets for {}\n# Managed by botship; values are Fernet tokens. Do not edit.\n",
        bot_name
    );
    for (name, token) in entries.iter() {
        out.push_str(name);
        out.push('=');
        out.push_str(token);
        out.push('\n');
    }
    out
}

/// Parse a dotenv file: `KEY=VALUE` lines, optional `export ` prefix,
/// optional single or double quotes. Lines with invalid names are skipped.
pub fn parse_dotenv(content: &str) -> Entries {
    let mut entries = Entries::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if !is_valid_name(name) {
            continue;
        }
        entries.upsert(name, unquote(value.trim()));
    }
    entries
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        return out;
    }
    // Unquoted values end at an inline comment
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}

/// Render a runtime environment file with every value double-quoted
pub fn render_env<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = String::new();
    for (name, value) in entries {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n");
        out.push_str(&format!("{}=\"{}\"\n", name, escaped));
    }
    out
}

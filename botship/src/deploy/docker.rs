//! Docker commands and output parsing

use crate::deploy::state::{Health, ProcessState};
use crate::utils::shell_quote;

const STATUS_FORMAT: &str = "'{{.Status}}|{{.State}}|{{.Image}}'";
const NAMES_FORMAT: &str = "'{{.Names}}'";
const IMAGE_FORMAT: &str = "'{{.Repository}}:{{.Tag}}'";

/// One-line status query for the container named exactly `name`
pub fn status_command(name: &str) -> String {
    format!(
        "docker ps -a --filter {} --format {}",
        shell_quote(&format!("name=^{}$", name)),
        STATUS_FORMAT
    )
}

/// Containers that exited or were created but never started
pub fn stale_command() -> String {
    format!(
        "docker ps -a --filter status=exited --filter status=created --format {}",
        NAMES_FORMAT
    )
}

pub fn stop_command(name: &str) -> String {
    format!("docker stop {}", shell_quote(name))
}

pub fn start_command(name: &str) -> String {
    format!("docker start {}", shell_quote(name))
}

pub fn remove_command(name: &str) -> String {
    format!("docker rm -f {}", shell_quote(name))
}

pub fn remove_stale_command(container: &str) -> String {
    format!("docker rm {}", shell_quote(container))
}

pub fn images_command(repository: &str) -> String {
    format!(
        "docker images {} --format {}",
        shell_quote(repository),
        IMAGE_FORMAT
    )
}

pub fn remove_image_command(tag: &str) -> String {
    format!("docker rmi {}", shell_quote(tag))
}

/// Build the release image in the deployment root and alias it as `latest`
pub fn build_command(root: &str, tag: &str, latest: &str) -> String {
    format!(
        "cd {} && docker build -t {} -t {} .",
        shell_quote(root),
        shell_quote(tag),
        shell_quote(latest)
    )
}

pub fn retag_command(tag: &str, latest: &str) -> String {
    format!("docker tag {} {}", shell_quote(tag), shell_quote(latest))
}

/// Container names, one per line
pub fn parse_name_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse the output of [`status_command`].
///
/// Expected shape: `Up 2 hours (healthy)|running|mybot:latest`. Empty output
/// means no such container.
pub fn parse_status(output: &str) -> ProcessState {
    let Some(line) = output.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return ProcessState::absent();
    };

    let mut fields = line.splitn(3, '|');
    let status = fields.next().unwrap_or_default().trim().to_string();
    let state = fields.next().unwrap_or_default().trim().to_lowercase();
    let image = fields
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let running = state == "running" || (state.is_empty() && status.starts_with("Up "));
    let health = if !running {
        Health::NotRunning
    } else if status.contains("(healthy)") {
        Health::Healthy
    } else if status.contains("(unhealthy)") {
        Health::Unhealthy
    } else if status.contains("(health: starting)") {
        Health::Starting
    } else {
        Health::NoHealthcheck
    };

    let uptime = if running {
        status
            .strip_prefix("Up ")
            .map(|rest| rest.split(" (").next().unwrap_or(rest).trim().to_string())
            .filter(|s| !s.is_empty())
    } else {
        None
    };

    ProcessState {
        exists: true,
        running,
        status,
        uptime,
        health,
        image,
    }
}

//! systemd commands and output parsing

use std::collections::HashMap;

use crate::deploy::state::{Health, ProcessState};
use crate::utils::shell_quote;

pub fn unit_name(name: &str) -> String {
    format!("{}.service", name)
}

/// `sudo -n ` unless the remote user is root
pub fn privilege_prefix(user: &str) -> &'static str {
    if user == "root" {
        ""
    } else {
        "sudo -n "
    }
}

pub fn status_command(unit: &str) -> String {
    format!(
        "systemctl show {} --property=LoadState,ActiveState,SubState,ActiveEnterTimestamp --no-pager",
        shell_quote(unit)
    )
}

pub fn stale_command() -> String {
    "systemctl list-units --all --type=service --state=failed --no-legend --plain --no-pager"
        .to_string()
}

pub fn stop_command(sudo: &str, unit: &str) -> String {
    format!("{}systemctl stop {}", sudo, shell_quote(unit))
}

pub fn start_command(sudo: &str, unit: &str) -> String {
    format!("{}systemctl start {}", sudo, shell_quote(unit))
}

/// Stop the unit and clear any failed state so the next start is clean
pub fn remove_command(sudo: &str, unit: &str) -> String {
    let unit = shell_quote(unit);
    format!(
        "{sudo}systemctl stop {unit}; {sudo}systemctl reset-failed {unit} 2>/dev/null; true"
    )
}

pub fn reset_failed_command(sudo: &str, unit: &str) -> String {
    format!("{}systemctl reset-failed {}", sudo, shell_quote(unit))
}

/// Install the unit file shipped in the deployment root and restart it
pub fn install_command(sudo: &str, root: &str, unit: &str) -> String {
    let source = shell_quote(&format!("{}/{}", root.trim_end_matches('/'), unit));
    let target = shell_quote(&format!("/etc/systemd/system/{}", unit));
    let unit = shell_quote(unit);
    format!(
        "{sudo}install -m 0644 {source} {target} && {sudo}systemctl daemon-reload && \
         {sudo}systemctl enable {unit} && {sudo}systemctl restart {unit}"
    )
}

/// Parse `systemctl show` output (`Key=Value` lines)
pub fn parse_status(output: &str, unit: &str) -> ProcessState {
    let props: HashMap<&str, &str> = output
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .collect();

    let load = props.get("LoadState").copied().unwrap_or("not-found");
    if load != "loaded" {
        return ProcessState::absent();
    }

    let active = props.get("ActiveState").copied().unwrap_or("unknown");
    let sub = props.get("SubState").copied().unwrap_or("unknown");
    let running = matches!(active, "active" | "reloading");
    let health = match active {
        "active" | "reloading" => Health::NoHealthcheck,
        "activating" => Health::Starting,
        _ => Health::NotRunning,
    };
    let uptime = props
        .get("ActiveEnterTimestamp")
        .filter(|ts| running && !ts.is_empty())
        .map(|ts| format!("since {}", ts));

    ProcessState {
        exists: true,
        running,
        status: format!("{} ({})", active, sub),
        uptime,
        health,
        image: Some(unit.to_string()),
    }
}

/// Unit names from `systemctl list-units --plain --no-legend`
pub fn parse_unit_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

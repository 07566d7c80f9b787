//! Process inspection for pane enrichment via `ps`.

use crate::executor::CommandRunner;
use execmux_core::PaneDetails;
use execmux_core::prompt::normalize_shell_name;
use std::collections::HashMap;

/// Known interactive shells.
pub const SHELL_CMDS: &[&str] = &[
    "zsh", "bash", "fish", "sh", "csh", "tcsh", "ksh", "dash", "nu", "pwsh",
];

pub fn is_shell(command: &str) -> bool {
    let name = normalize_shell_name(command);
    SHELL_CMDS.contains(&name)
}

/// Parse `ps -o pid=,<field>=` output into `pid -> rest of line`.
fn parse_ps_output(output: &str) -> HashMap<u32, String> {
    output.lines().filter_map(parse_ps_line).collect()
}

fn parse_ps_line(line: &str) -> Option<(u32, String)> {
    let s = line.trim();
    if s.is_empty() {
        return None;
    }
    let ws = s.find(|c: char| c.is_ascii_whitespace()).unwrap_or(s.len());
    let pid: u32 = s[..ws].parse().ok()?;
    Some((pid, s[ws..].trim().to_string()))
}

/// Fill `shell`, `command_args` and `is_sub_shell` from the pane's root
/// process. Failures leave the fields empty; enrichment is best-effort.
pub fn enrich_panes(runner: &impl CommandRunner, panes: &mut [PaneDetails]) {
    let pids: Vec<String> = panes
        .iter()
        .filter_map(|p| p.pid)
        .map(|pid| pid.to_string())
        .collect();
    if pids.is_empty() {
        return;
    }
    let pid_list = pids.join(",");

    let comms = query(runner, &["-o", "pid=,comm=", "-p", &pid_list]);
    let args = query(runner, &["-o", "pid=,args=", "-p", &pid_list]);

    for pane in panes.iter_mut() {
        let Some(pid) = pane.pid else { continue };
        if let Some(comm) = comms.get(&pid) {
            pane.shell = normalize_shell_name(comm).to_string();
        }
        if let Some(argv) = args.get(&pid) {
            pane.command_args = argv.split_whitespace().map(String::from).collect();
        }
        pane.is_sub_shell = is_shell(&pane.command)
            && !pane.shell.is_empty()
            && normalize_shell_name(&pane.command) != pane.shell;
    }
}

fn query(runner: &impl CommandRunner, args: &[&str]) -> HashMap<u32, String> {
    match runner.run("ps", args) {
        Ok(out) => parse_ps_output(&out),
        Err(e) => {
            tracing::debug!("ps {args:?} failed: {e}");
            HashMap::new()
        }
    }
}

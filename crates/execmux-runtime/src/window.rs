//! Snapshot of the agent's window, rendered for the AI collaborator.

use crate::exec_pane::pick_exec_pane;
use execmux_core::prompt::is_ready_prompt;
use execmux_core::{ChatMessage, PaneDetails};
use execmux_mux::{Multiplexer, MuxError};
use serde::Serialize;
use std::fmt::Write;

const EXEC_TAG: &str = "exec_pane";
const READ_ONLY_TAG: &str = "read_only_pane";

pub const AGENT_SYSTEM_PROMPT: &str = "You operate a terminal through the pane tagged exec_pane. \
Other panes are read-only context. Propose one shell command at a time and wait for its result \
before the next.";

#[derive(Debug, Clone, Serialize)]
pub struct PaneView {
    #[serde(flatten)]
    pub pane: PaneDetails,
    pub capture_error: Option<String>,
}

/// List every pane of `window` except the agent's and capture each one.
/// Without `exec_pane_id` the pane discovery would pick is tagged.
/// A failed capture is kept on the view instead of failing the snapshot.
pub fn collect_window(
    mux: &dyn Multiplexer,
    window: &str,
    agent_pane_id: &str,
    exec_pane_id: Option<&str>,
    max_lines: usize,
) -> Result<Vec<PaneView>, MuxError> {
    let panes = mux.list_panes(window)?;
    let exec_id = match exec_pane_id {
        Some(id) => Some(id.to_string()),
        None => pick_exec_pane(&panes, agent_pane_id).map(|p| p.id.clone()),
    };
    let mut views = Vec::new();
    for mut pane in panes {
        if pane.id == agent_pane_id {
            continue;
        }
        pane.is_exec_pane = exec_id.as_deref() == Some(pane.id.as_str());
        let capture_error = match mux.capture_pane(&pane.id, max_lines) {
            Ok(content) => {
                pane.set_content(content);
                pane.is_prepared = is_ready_prompt(&pane.last_line);
                None
            }
            Err(e) => {
                tracing::warn!(pane = %pane.id, "capture failed: {e}");
                Some(e.to_string())
            }
        };
        views.push(PaneView {
            pane,
            capture_error,
        });
    }
    Ok(views)
}

/// Render panes as tagged blocks. The exec pane gets its own tag so the
/// reader knows which pane accepts commands.
pub fn render_window_state(views: &[PaneView]) -> String {
    let mut out = String::from("<current_window_state>\n");
    for view in views {
        let pane = &view.pane;
        let tag = if pane.is_exec_pane { EXEC_TAG } else { READ_ONLY_TAG };
        let pid = pane.pid.map(|p| p.to_string()).unwrap_or_default();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "<{tag}>");
        let _ = writeln!(out, " - Id: {}", pane.id);
        let _ = writeln!(out, " - Pid: {pid}");
        let _ = writeln!(out, " - Command: {}", pane.command);
        let _ = writeln!(out, " - CommandArgs: {}", pane.command_args.join(" "));
        let _ = writeln!(out, " - Shell: {}", pane.shell);
        let _ = writeln!(out, " - LastLine: {}", pane.last_line);
        let _ = writeln!(out, " - IsActive: {}", pane.is_active);
        let _ = writeln!(out, " - IsPrepared: {}", pane.is_prepared);
        let _ = writeln!(out, " - IsSubShell: {}", pane.is_sub_shell);
        let _ = writeln!(out, " - HistorySize: {}", pane.history_size);
        let _ = writeln!(out, " - HistoryLimit: {}", pane.history_limit);
        if let Some(err) = &view.capture_error {
            let _ = writeln!(out, "<error>could not capture pane: {err}</error>");
        } else if !pane.content.is_empty() {
            let _ = writeln!(out, "<pane_content>\n{}\n</pane_content>", pane.content);
        }
        let _ = writeln!(out, "</{tag}>\n");
    }
    out.push_str("</current_window_state>\n");
    out
}

/// Error variant of the snapshot, for when the window cannot be listed.
pub fn render_window_error(err: &MuxError) -> String {
    format!("<current_window_state>\n<error>could not list panes: {err}</error>\n</current_window_state>\n")
}

/// Conversation prefix handed to a chat completer: instructions, then the
/// window snapshot as the latest user turn.
pub fn agent_messages(system_prompt: &str, window_state: &str, request: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(format!("{window_state}\n{request}")),
    ]
}

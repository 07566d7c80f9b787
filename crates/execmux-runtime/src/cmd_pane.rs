//! Pane inspection and session passthrough subcommands.

use crate::cli::{AttachOpts, CaptureOpts, NewSessionOpts, PaneOpts, WindowOpts};
use crate::cmd_exec::controller;
use crate::config::Config;
use crate::exec_pane::run_blocking;
use crate::window;
use execmux_core::PaneDetails;
use execmux_mux::{ClearOutcome, Multiplexer};
use std::sync::Arc;

pub async fn cmd_capture(
    mux: Arc<dyn Multiplexer>,
    config: &Config,
    opts: CaptureOpts,
    json: bool,
) -> anyhow::Result<()> {
    let lines = opts.lines.unwrap_or(config.max_capture_lines);
    let (id, content) = match opts.target.pane {
        Some(id) => {
            let target = id.clone();
            let content = run_blocking(&mux, move |m| m.capture_pane(&target, lines)).await?;
            (id, content)
        }
        None => {
            let mut ctl = controller(mux, config, None).await?;
            let pane = ctl.refresh().await?;
            let content = execmux_mux::capture::tail_lines(&pane.content, lines);
            (pane.id.clone(), content)
        }
    };
    if json {
        let value = serde_json::json!({ "pane_id": id, "content": content });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{content}");
    }
    Ok(())
}

pub async fn cmd_panes(mux: Arc<dyn Multiplexer>, json: bool) -> anyhow::Result<()> {
    let panes = run_blocking(&mux, |m| {
        let agent = m.current_pane_id()?;
        let window = m.current_window_target()?;
        let mut panes = m.list_panes(&window)?;
        for pane in &mut panes {
            pane.is_agent_pane = pane.id == agent;
        }
        Ok(panes)
    })
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&panes)?);
    } else {
        print!("{}", format_pane_table(&panes));
    }
    Ok(())
}

pub fn format_pane_table(panes: &[PaneDetails]) -> String {
    let mut out = format!("{:<14} {:<6} {:<8} {:<16} {:<8} {}\n", "PANE", "ACTIVE", "PID", "COMMAND", "SHELL", "ROLE");
    for pane in panes {
        let role = if pane.is_agent_pane { "agent" } else { "" };
        let pid = pane.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        let active = if pane.is_active { "*" } else { "" };
        out.push_str(&format!(
            "{:<14} {:<6} {:<8} {:<16} {:<8} {}\n",
            pane.id, active, pid, pane.command, pane.shell, role
        ));
    }
    out
}

pub async fn cmd_window(
    mux: Arc<dyn Multiplexer>,
    config: &Config,
    opts: WindowOpts,
    json: bool,
) -> anyhow::Result<()> {
    let max_lines = config.max_capture_lines;
    let views = run_blocking(&mux, move |m| {
        let agent = m.current_pane_id()?;
        let target = m.current_window_target()?;
        window::collect_window(m, &target, &agent, None, max_lines)
    })
    .await;

    let views = match views {
        Ok(views) => views,
        Err(crate::exec_pane::ExecError::Backend { source, .. }) if !json => {
            print!("{}", window::render_window_error(&source));
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(request) = opts.messages {
        let state = window::render_window_state(&views);
        let messages = window::agent_messages(window::AGENT_SYSTEM_PROMPT, &state, &request);
        println!("{}", serde_json::to_string_pretty(&messages)?);
    } else if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        print!("{}", window::render_window_state(&views));
    }
    Ok(())
}

pub async fn cmd_clear(
    mux: Arc<dyn Multiplexer>,
    config: &Config,
    opts: PaneOpts,
    json: bool,
) -> anyhow::Result<()> {
    let id = match opts.pane {
        Some(id) => id,
        None => controller(Arc::clone(&mux), config, None).await?.ensure_pane().await?,
    };
    let target = id.clone();
    let outcome = run_blocking(&mux, move |m| m.clear_pane(&target)).await?;
    if json {
        let value = serde_json::json!({ "pane_id": id, "clear": outcome });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{id}: {}", describe_clear(outcome));
    }
    Ok(())
}

fn describe_clear(outcome: ClearOutcome) -> &'static str {
    match (outcome.screen_cleared, outcome.history_cleared) {
        (true, true) => "screen and history cleared",
        (true, false) => "screen cleared; history clearing not supported",
        (false, true) => "history cleared; screen clear failed",
        (false, false) => "nothing cleared",
    }
}

pub async fn cmd_new_session(mux: Arc<dyn Multiplexer>, opts: NewSessionOpts, json: bool) -> anyhow::Result<()> {
    let id = run_blocking(&mux, move |m| m.create_session(opts.command.as_deref())).await?;
    if json {
        println!("{}", serde_json::json!({ "id": id }));
    } else {
        println!("{id}");
    }
    Ok(())
}

pub async fn cmd_attach(mux: Arc<dyn Multiplexer>, opts: AttachOpts) -> anyhow::Result<()> {
    run_blocking(&mux, move |m| m.attach_session(&opts.id)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pane_table_marks_the_agent() {
        let mut agent = PaneDetails::new("%0");
        agent.is_agent_pane = true;
        agent.is_active = true;
        agent.pid = Some(42);
        agent.command = "claude".into();
        let mut other = PaneDetails::new("%1");
        other.command = "zsh".into();
        other.shell = "zsh".into();

        let table = format_pane_table(&[agent, other]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("PANE"));
        assert!(lines[1].starts_with("%0") && lines[1].trim_end().ends_with("agent"));
        assert!(lines[1].contains("42"));
        assert!(lines[2].contains(" - "));
        assert!(!lines[2].contains("agent"));
    }

    #[test]
    fn clear_descriptions() {
        let both = ClearOutcome {
            screen_cleared: true,
            history_cleared: true,
        };
        assert_eq!(describe_clear(both), "screen and history cleared");
        let screen_only = ClearOutcome {
            screen_cleared: true,
            history_cleared: false,
        };
        assert!(describe_clear(screen_only).contains("not supported"));
    }
}

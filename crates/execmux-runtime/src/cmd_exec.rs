//! Subcommands that drive the exec pane: exec, send-keys, prepare, history.

use crate::cli::{ExecOpts, HistoryOpts, PrepareOpts, SendKeysOpts};
use crate::config::Config;
use crate::exec_pane::{ExecError, ExecOptions, ExecOutcome, ExecPaneController, PrepareOutcome};
use execmux_core::{ApprovalDecision, CommandExecHistory};
use execmux_mux::Multiplexer;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const EXIT_REFUSED: i32 = 3;
pub const EXIT_TIMEOUT: i32 = 124;
pub const EXIT_CANCELLED: i32 = 130;

pub async fn controller(
    mux: Arc<dyn Multiplexer>,
    config: &Config,
    pane: Option<String>,
) -> anyhow::Result<ExecPaneController> {
    let policy = config.approval_policy()?;
    let ctl = ExecPaneController::for_current_pane(mux, config.exec_pane_config(), policy).await?;
    Ok(match pane {
        Some(id) => ctl.with_exec_pane(id),
        None => ctl,
    })
}

/// Run a command and print its record. Returns the process exit code.
pub async fn cmd_exec(
    mux: Arc<dyn Multiplexer>,
    config: &Config,
    opts: ExecOpts,
    json: bool,
) -> anyhow::Result<i32> {
    let command = opts.command.join(" ");
    let mut ctl = controller(mux, config, opts.target.pane).await?;

    let decision = ctl.policy().decide(&command);
    if !decision.is_approved() && !opts.force {
        print_refusal(&command, &decision, json)?;
        return Ok(EXIT_REFUSED);
    }

    let prepared = ctl.prepare(None).await?;
    match &prepared {
        PrepareOutcome::Busy { command: running } if !opts.force => {
            anyhow::bail!("exec pane is running {running}; pass --force to type into it anyway");
        }
        PrepareOutcome::Unsupported { shell } if opts.require_prepared => {
            return Err(ExecError::PromptPreparationUnsupported { shell: shell.clone() }.into());
        }
        outcome if opts.require_prepared && !outcome.is_prepared() => {
            anyhow::bail!("sentinel prompt could not be installed: {outcome:?}");
        }
        _ => {}
    }

    let token = CancellationToken::new();
    let listener = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        })
    };
    let exec_opts = ExecOptions {
        timeout: opts.timeout.map(Duration::from_secs),
        auto_enter: !opts.no_enter,
        approved: true,
    };
    let result = ctl.execute(&command, exec_opts, &token).await;
    listener.abort();
    tracing::debug!(state = ?ctl.state(), ok = result.is_ok(), "exec finished");

    let e = match result {
        Ok(outcome) => {
            print_outcome(&outcome, json)?;
            return Ok(exit_code_for(&outcome.record));
        }
        Err(e) => e,
    };
    let code = match &e {
        ExecError::Timeout { .. } => Some(EXIT_TIMEOUT),
        ExecError::Cancelled { .. } => Some(EXIT_CANCELLED),
        _ => None,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&failure_json(&e))?);
    } else {
        if code.is_some() {
            eprintln!("execmux: {e}");
            if let Some(partial) = e.partial() {
                print_records(std::slice::from_ref(partial), false)?;
            }
        }
        if let Some(report) = capture_report(&e) {
            eprint!("{report}");
        }
    }
    match code {
        Some(code) => Ok(code),
        None => Err(e.into()),
    }
}

/// The pane text a failure carries, framed for stderr.
fn capture_report(e: &ExecError) -> Option<String> {
    let capture = e.last_capture()?;
    Some(format!(
        "execmux: exec pane at failure:\n{}\n",
        capture.trim_end_matches('\n')
    ))
}

fn failure_json(e: &ExecError) -> serde_json::Value {
    serde_json::json!({
        "error": e.to_string(),
        "partial": e.partial(),
        "last_capture": e.last_capture(),
    })
}

/// Exit code mirroring the command's status; unknown statuses map to 0.
pub fn exit_code_for(record: &CommandExecHistory) -> i32 {
    if record.is_terminated() { record.code.clamp(0, 255) } else { 0 }
}

fn print_refusal(command: &str, decision: &ApprovalDecision, json: bool) -> anyhow::Result<()> {
    if json {
        let value = serde_json::json!({
            "command": command,
            "refused": true,
            "decision": decision,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        eprintln!(
            "execmux: not running {command:?}: risk {} ({:?}); pass --force to run it",
            decision.assessment.level, decision.verdict
        );
        for flag in &decision.assessment.flags {
            eprintln!("  {flag}");
        }
    }
    Ok(())
}

fn print_outcome(outcome: &ExecOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    if !outcome.submitted {
        eprintln!("execmux: typed into {} without Enter", outcome.pane_id);
        return Ok(());
    }
    if !outcome.structured {
        eprintln!("execmux: pane {} has no sentinel prompt; exit status unknown", outcome.pane_id);
    }
    if !outcome.record.output.is_empty() {
        println!("{}", outcome.record.output);
    }
    Ok(())
}

fn print_records(records: &[CommandExecHistory], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    for record in records {
        let status = if record.is_terminated() {
            record.code.to_string()
        } else {
            "running".to_string()
        };
        println!("[{status}] {}", record.command);
        if !record.output.is_empty() {
            println!("{}", record.output);
        }
    }
    Ok(())
}

pub async fn cmd_send_keys(
    mux: Arc<dyn Multiplexer>,
    config: &Config,
    opts: SendKeysOpts,
) -> anyhow::Result<()> {
    let mut ctl = controller(mux, config, opts.target.pane).await?;
    let id = ctl.send_keys(&opts.keys.join(" "), opts.enter).await?;
    tracing::debug!(pane = %id, "keys sent");
    Ok(())
}

pub async fn cmd_prepare(
    mux: Arc<dyn Multiplexer>,
    config: &Config,
    opts: PrepareOpts,
    json: bool,
) -> anyhow::Result<i32> {
    let mut ctl = controller(mux, config, opts.target.pane).await?;
    let outcome = ctl.prepare(opts.shell.map(Into::into)).await?;
    let pane = ctl.exec_pane().map(|p| p.id.as_str()).unwrap_or_default();
    if json {
        let value = serde_json::json!({
            "pane_id": pane,
            "agent_pane_id": ctl.agent_pane_id(),
            "prepare": outcome,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        match &outcome {
            PrepareOutcome::Prepared { dialect } => println!("{pane}: prepared ({dialect})"),
            PrepareOutcome::AlreadyPrepared => println!("{pane}: already prepared"),
            PrepareOutcome::Unsupported { shell } => println!("{pane}: shell {shell:?} not supported"),
            PrepareOutcome::Busy { command } => println!("{pane}: busy running {command}"),
            PrepareOutcome::Unconfirmed { last_line } => {
                println!("{pane}: prompt not confirmed (last line: {last_line:?})")
            }
        }
    }
    Ok(if outcome.is_prepared() { 0 } else { 1 })
}

pub async fn cmd_history(
    mux: Arc<dyn Multiplexer>,
    config: &Config,
    opts: HistoryOpts,
    json: bool,
) -> anyhow::Result<()> {
    let mut ctl = controller(mux, config, opts.target.pane).await?;
    let mut records = ctl.history().await?;
    if opts.last && records.len() > 1 {
        records.drain(..records.len() - 1);
    }
    print_records(&records, json)
}

//! Exec-pane controller: discovers (or creates) the pane commands run in,
//! installs the sentinel prompt, sends commands and polls the capture until
//! the shell is back at a ready prompt.
//!
//! The multiplexer is blocking, so every backend call goes through
//! `spawn_blocking`. The wait loop `select!`s on a `CancellationToken` so a
//! Ctrl-C in the caller ends the wait without killing the pane's command.

use chrono::{DateTime, Utc};
use execmux_core::prompt::{count_boundaries, is_ready_prompt};
use execmux_core::{
    ApprovalDecision, ApprovalPolicy, CommandExecHistory, PaneDetails, ShellDialect, parse_history,
};
use execmux_mux::process::is_shell;
use execmux_mux::{Multiplexer, MuxError};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ExecPaneConfig {
    pub max_capture_lines: usize,
    pub poll_interval: Duration,
    pub command_timeout: Duration,
    /// How long to wait for the sentinel prompt after installing it.
    pub prepare_timeout: Duration,
    /// Consecutive failed captures tolerated while waiting.
    pub max_capture_failures: u32,
}

impl Default for ExecPaneConfig {
    fn default() -> Self {
        Self {
            max_capture_lines: 8000,
            poll_interval: Duration::from_millis(500),
            command_timeout: Duration::from_secs(300),
            prepare_timeout: Duration::from_secs(5),
            max_capture_failures: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Uninitialized,
    Discovering,
    Preparing,
    Idle,
    Sending,
    Polling,
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("exec pane not initialized")]
    PaneNotInitialized,
    #[error("{source}")]
    Backend {
        #[source]
        source: MuxError,
        last_capture: String,
    },
    #[error("command {command:?} did not finish within {elapsed:?}")]
    Timeout {
        command: String,
        elapsed: Duration,
        last_capture: String,
        partial: Option<CommandExecHistory>,
    },
    #[error("cancelled while waiting for the command to finish")]
    Cancelled {
        partial: Option<CommandExecHistory>,
        last_capture: String,
    },
    #[error("no command records found in the pane after running {command:?}")]
    ParseYieldedNoRecords { command: String, last_capture: String },
    #[error("shell {shell:?} cannot show an exit status in its prompt")]
    PromptPreparationUnsupported { shell: String },
    #[error("command {command:?} needs confirmation (risk: {})", decision.assessment.level)]
    ApprovalRequired {
        command: String,
        decision: ApprovalDecision,
    },
    #[error("a command is already running in the exec pane")]
    AlreadyInFlight,
    #[error("blocking task failed: {0}")]
    Join(String),
}

impl ExecError {
    /// Pane content at the time of failure, when any was captured.
    pub fn last_capture(&self) -> Option<&str> {
        match self {
            Self::Backend { last_capture, .. }
            | Self::Timeout { last_capture, .. }
            | Self::Cancelled { last_capture, .. }
            | Self::ParseYieldedNoRecords { last_capture, .. } => {
                Some(last_capture.as_str()).filter(|c| !c.is_empty())
            }
            _ => None,
        }
    }

    pub fn partial(&self) -> Option<&CommandExecHistory> {
        match self {
            Self::Timeout { partial, .. } | Self::Cancelled { partial, .. } => partial.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PrepareOutcome {
    Prepared { dialect: ShellDialect },
    AlreadyPrepared,
    /// The pane's shell has no dialect; commands still run, unstructured.
    Unsupported { shell: String },
    /// A non-shell program owns the pane, so nothing was typed into it.
    Busy { command: String },
    /// The prompt command was sent but no sentinel appeared in time.
    Unconfirmed { last_line: String },
}

impl PrepareOutcome {
    pub fn is_prepared(&self) -> bool {
        matches!(self, Self::Prepared { .. } | Self::AlreadyPrepared)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecOptions {
    /// Overrides the configured command timeout.
    pub timeout: Option<Duration>,
    pub auto_enter: bool,
    /// Skip the approval gate; the caller already asked.
    pub approved: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            auto_enter: true,
            approved: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecOutcome {
    pub pane_id: String,
    pub record: CommandExecHistory,
    /// False when the pane shows no sentinel prompt; `record.output` is then
    /// the raw text after the command and the code is unknown.
    pub structured: bool,
    /// False when the text was typed without Enter and nothing was awaited.
    pub submitted: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

pub struct ExecPaneController {
    mux: Arc<dyn Multiplexer>,
    config: ExecPaneConfig,
    policy: ApprovalPolicy,
    agent_pane_id: String,
    window_target: String,
    exec_pane: Option<PaneDetails>,
    /// Set when the caller named the exec pane; it is never swapped out.
    pinned: bool,
    state: ControllerState,
}

impl ExecPaneController {
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        config: ExecPaneConfig,
        policy: ApprovalPolicy,
        agent_pane_id: impl Into<String>,
        window_target: impl Into<String>,
    ) -> Self {
        Self {
            mux,
            config,
            policy,
            agent_pane_id: agent_pane_id.into(),
            window_target: window_target.into(),
            exec_pane: None,
            pinned: false,
            state: ControllerState::Uninitialized,
        }
    }

    /// Controller for the pane this process runs in.
    pub async fn for_current_pane(
        mux: Arc<dyn Multiplexer>,
        config: ExecPaneConfig,
        policy: ApprovalPolicy,
    ) -> Result<Self, ExecError> {
        let (agent, window) =
            run_blocking(&mux, |m| Ok((m.current_pane_id()?, m.current_window_target()?))).await?;
        tracing::debug!(agent = %agent, window = %window, "controller attached");
        Ok(Self::new(mux, config, policy, agent, window))
    }

    /// Use `pane_id` as the exec pane instead of discovering one.
    #[must_use]
    pub fn with_exec_pane(mut self, pane_id: impl Into<String>) -> Self {
        let mut pane = PaneDetails::new(pane_id);
        pane.is_exec_pane = true;
        self.exec_pane = Some(pane);
        self.pinned = true;
        self.state = ControllerState::Idle;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn exec_pane(&self) -> Option<&PaneDetails> {
        self.exec_pane.as_ref()
    }

    pub fn agent_pane_id(&self) -> &str {
        &self.agent_pane_id
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    // ─── Discovery ────────────────────────────────────────────────

    /// Return the exec pane id, discovering or creating the pane when it
    /// is unknown or has disappeared. A pinned pane that cannot be listed
    /// is used as given; later captures report whether it exists.
    pub async fn ensure_pane(&mut self) -> Result<String, ExecError> {
        if let Some(id) = self.exec_pane.as_ref().map(|p| p.id.clone()) {
            let target = id.clone();
            match self.call(move |m| m.list_panes(&target)).await {
                Ok(fresh) => {
                    if let (Some(fresh), Some(pane)) = (fresh.into_iter().next(), self.exec_pane.as_mut()) {
                        pane.merge_metadata(fresh);
                        return Ok(id);
                    }
                }
                Err(ExecError::Backend { source, .. }) if source.is_pane_gone() => {}
                Err(e) => return Err(e),
            }
            if self.pinned {
                tracing::debug!(pane = %id, "pinned exec pane not listed; using it as given");
                return Ok(id);
            }
            tracing::warn!(pane = %id, "exec pane disappeared; rediscovering");
            self.exec_pane = None;
        }

        self.state = ControllerState::Discovering;
        let result = self.discover().await;
        self.state = if result.is_ok() {
            ControllerState::Idle
        } else {
            ControllerState::Uninitialized
        };
        result
    }

    async fn discover(&mut self) -> Result<String, ExecError> {
        let window = self.window_target.clone();
        let panes = self.call(move |m| m.list_panes(&window)).await?;
        let agent = self.agent_pane_id.clone();

        let mut pane = match pick_exec_pane(&panes, &agent).cloned() {
            Some(p) => {
                tracing::info!(pane = %p.id, "using existing pane as exec pane");
                p
            }
            None => {
                let pane = self
                    .call(move |m| {
                        let id = m.create_pane(&agent, None)?;
                        m.list_panes(&id)?
                            .into_iter()
                            .next()
                            .ok_or(MuxError::PaneNotFound(id))
                    })
                    .await?;
                tracing::info!(pane = %pane.id, "created exec pane");
                pane
            }
        };
        pane.is_exec_pane = true;
        pane.is_agent_pane = false;
        let id = pane.id.clone();
        self.exec_pane = Some(pane);
        Ok(id)
    }

    /// Re-read the exec pane's metadata and capture.
    pub async fn refresh(&mut self) -> Result<&PaneDetails, ExecError> {
        self.ensure_pane().await?;
        self.capture().await?;
        self.exec_pane.as_ref().ok_or(ExecError::PaneNotInitialized)
    }

    async fn capture(&mut self) -> Result<(), ExecError> {
        let id = self.pane_id()?;
        let max = self.config.max_capture_lines;
        let content = self.call(move |m| m.capture_pane(&id, max)).await?;
        let pane = self.exec_pane.as_mut().ok_or(ExecError::PaneNotInitialized)?;
        pane.set_content(content);
        if is_ready_prompt(&pane.last_line) {
            pane.is_prepared = true;
        }
        Ok(())
    }

    fn pane_id(&self) -> Result<String, ExecError> {
        self.exec_pane
            .as_ref()
            .map(|p| p.id.clone())
            .ok_or(ExecError::PaneNotInitialized)
    }

    // ─── Prompt preparation ───────────────────────────────────────

    /// Install the sentinel prompt in the exec pane. `shell` overrides the
    /// dialect detected from the pane's process.
    pub async fn prepare(&mut self, shell: Option<ShellDialect>) -> Result<PrepareOutcome, ExecError> {
        let pane = self.refresh().await?;
        if is_ready_prompt(&pane.last_line) {
            return Ok(PrepareOutcome::AlreadyPrepared);
        }
        if !pane.command.is_empty() && !is_shell(&pane.command) {
            tracing::warn!(pane = %pane.id, command = %pane.command, "exec pane is running a program; not preparing");
            return Ok(PrepareOutcome::Busy {
                command: pane.command.clone(),
            });
        }
        let detected = shell
            .or_else(|| ShellDialect::from_shell_name(&pane.shell))
            .or_else(|| ShellDialect::from_shell_name(&pane.command));
        let Some(dialect) = detected else {
            let shell = if pane.shell.is_empty() { &pane.command } else { &pane.shell };
            tracing::warn!(pane = %pane.id, shell = %shell, "no prompt dialect for shell; output will be unstructured");
            return Ok(PrepareOutcome::Unsupported {
                shell: shell.clone(),
            });
        };

        let id = pane.id.clone();
        self.state = ControllerState::Preparing;
        let result = self.install_prompt(&id, dialect).await;
        self.state = ControllerState::Idle;
        result
    }

    async fn install_prompt(&mut self, id: &str, dialect: ShellDialect) -> Result<PrepareOutcome, ExecError> {
        tracing::info!(pane = %id, %dialect, "installing sentinel prompt");
        let target = id.to_string();
        self.call(move |m| m.send_text(&target, dialect.prompt_command(), true))
            .await?;

        let target = id.to_string();
        if let Err(e) = self.call(move |m| m.clear_screen(&target)).await {
            tracing::warn!(pane = %id, "clearing screen after prepare failed: {e}");
        }

        let deadline = Instant::now() + self.config.prepare_timeout;
        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            self.capture().await?;
            let pane = self.exec_pane.as_ref().ok_or(ExecError::PaneNotInitialized)?;
            if pane.is_prepared {
                return Ok(PrepareOutcome::Prepared { dialect });
            }
            if Instant::now() >= deadline {
                tracing::warn!(pane = %id, last_line = %pane.last_line, "sentinel prompt not seen after prepare");
                return Ok(PrepareOutcome::Unconfirmed {
                    last_line: pane.last_line.clone(),
                });
            }
        }
    }

    // ─── Execution ────────────────────────────────────────────────

    /// Send text to the exec pane without waiting for anything.
    pub async fn send_keys(&mut self, keys: &str, enter: bool) -> Result<String, ExecError> {
        if matches!(self.state, ControllerState::Sending | ControllerState::Polling) {
            return Err(ExecError::AlreadyInFlight);
        }
        let id = self.ensure_pane().await?;
        let target = id.clone();
        let text = keys.to_string();
        self.call(move |m| m.send_text(&target, &text, enter)).await?;
        Ok(id)
    }

    /// Run `command` in the exec pane and wait for it to finish.
    pub async fn execute(
        &mut self,
        command: &str,
        opts: ExecOptions,
        cancel: &CancellationToken,
    ) -> Result<ExecOutcome, ExecError> {
        if matches!(self.state, ControllerState::Sending | ControllerState::Polling) {
            return Err(ExecError::AlreadyInFlight);
        }
        let decision = self.policy.decide(command);
        if !opts.approved && !decision.is_approved() {
            return Err(ExecError::ApprovalRequired {
                command: command.to_string(),
                decision,
            });
        }

        let pane = self.refresh().await?;
        let pane_id = pane.id.clone();
        let structured = pane.is_prepared;
        let baseline = count_boundaries(&pane.content);
        let baseline_content = pane.content.clone();
        if !structured {
            tracing::warn!(pane = %pane_id, "exec pane has no sentinel prompt; output will be unstructured");
        }

        let started_at = Utc::now();
        let started = Instant::now();
        self.state = ControllerState::Sending;
        tracing::info!(pane = %pane_id, command, "sending command");
        let target = pane_id.clone();
        let text = command.to_string();
        let enter = opts.auto_enter;
        if let Err(e) = self.call(move |m| m.send_text(&target, &text, enter)).await {
            self.state = ControllerState::Idle;
            return Err(e);
        }

        if !opts.auto_enter {
            self.state = ControllerState::Idle;
            return Ok(ExecOutcome {
                pane_id,
                record: CommandExecHistory {
                    command: command.to_string(),
                    output: String::new(),
                    code: CommandExecHistory::UNTERMINATED,
                },
                structured,
                submitted: false,
                started_at,
                elapsed_ms: 0,
            });
        }

        self.state = ControllerState::Polling;
        let timeout = opts.timeout.unwrap_or(self.config.command_timeout);
        let waited = self
            .wait_for_completion(command, baseline, &baseline_content, structured, started, timeout, cancel)
            .await;
        self.state = ControllerState::Idle;
        waited?;

        let pane = self.exec_pane.as_ref().ok_or(ExecError::PaneNotInitialized)?;
        let record = if structured {
            let Some(record) = parse_history(&pane.content).pop() else {
                return Err(ExecError::ParseYieldedNoRecords {
                    command: command.to_string(),
                    last_capture: pane.content.clone(),
                });
            };
            if record.command != command {
                tracing::debug!(expected = command, found = %record.command, "newest record has different command text");
            }
            record
        } else {
            CommandExecHistory {
                command: command.to_string(),
                output: output_after(&pane.content, command),
                code: CommandExecHistory::UNTERMINATED,
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(pane = %pane_id, code = record.code, elapsed_ms, "command finished");
        Ok(ExecOutcome {
            pane_id,
            record,
            structured,
            submitted: true,
            started_at,
            elapsed_ms,
        })
    }

    /// Poll until the pane is back at a ready prompt that was not there
    /// before the command was sent. Unstructured panes finish once two
    /// consecutive captures are identical.
    #[allow(clippy::too_many_arguments)]
    async fn wait_for_completion(
        &mut self,
        command: &str,
        mut baseline: usize,
        baseline_content: &str,
        structured: bool,
        started: Instant,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ExecError> {
        let mut failures = 0u32;
        let mut previous: Option<String> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(command, "wait cancelled");
                    self.final_capture().await;
                    return Err(ExecError::Cancelled {
                        partial: self.newest_record(),
                        last_capture: self.last_capture(),
                    });
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            if started.elapsed() >= timeout {
                tracing::warn!(command, timeout_secs = timeout.as_secs(), "command timed out");
                self.final_capture().await;
                return Err(ExecError::Timeout {
                    command: command.to_string(),
                    elapsed: started.elapsed(),
                    last_capture: self.last_capture(),
                    partial: self.newest_record(),
                });
            }

            match self.capture().await {
                Ok(()) => failures = 0,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        "capture failed ({failures}/{}): {e}",
                        self.config.max_capture_failures
                    );
                    if failures >= self.config.max_capture_failures {
                        return Err(e);
                    }
                    continue;
                }
            }

            let pane = self.exec_pane.as_ref().ok_or(ExecError::PaneNotInitialized)?;
            if structured {
                let count = count_boundaries(&pane.content);
                if count < baseline {
                    // Scrollback rotated or was cleared; the newest prompt
                    // still has to show up after the command line.
                    tracing::debug!(baseline, count, "boundary count dropped; rebaselining");
                    baseline = count.saturating_sub(1);
                }
                if is_ready_prompt(&pane.last_line)
                    && (count > baseline
                        || (pane.content != baseline_content && closes_command(&pane.content, command)))
                {
                    return Ok(());
                }
            } else {
                if previous.as_deref() == Some(pane.content.as_str()) {
                    return Ok(());
                }
                previous = Some(pane.content.clone());
            }
        }
    }

    async fn final_capture(&mut self) {
        if let Err(e) = self.capture().await {
            tracing::debug!("final capture failed: {e}");
        }
    }

    fn newest_record(&self) -> Option<CommandExecHistory> {
        self.exec_pane
            .as_ref()
            .and_then(|p| parse_history(&p.content).pop())
    }

    fn last_capture(&self) -> String {
        self.exec_pane
            .as_ref()
            .map(|p| p.content.clone())
            .unwrap_or_default()
    }

    /// Parsed records of the exec pane's current scrollback.
    pub async fn history(&mut self) -> Result<Vec<CommandExecHistory>, ExecError> {
        let pane = self.refresh().await?;
        Ok(parse_history(&pane.content))
    }

    async fn call<T, F>(&self, f: F) -> Result<T, ExecError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Multiplexer) -> Result<T, MuxError> + Send + 'static,
    {
        run_blocking(&self.mux, f).await.map_err(|e| match e {
            ExecError::Backend { source, .. } => ExecError::Backend {
                source,
                last_capture: self.last_capture(),
            },
            other => other,
        })
    }
}

/// The pane commands run in: the first pane of the window that is not
/// the agent's own.
pub fn pick_exec_pane<'a>(panes: &'a [PaneDetails], agent_pane_id: &str) -> Option<&'a PaneDetails> {
    panes.iter().find(|p| p.id != agent_pane_id)
}

pub(crate) async fn run_blocking<T, F>(mux: &Arc<dyn Multiplexer>, f: F) -> Result<T, ExecError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Multiplexer) -> Result<T, MuxError> + Send + 'static,
{
    let mux = Arc::clone(mux);
    match tokio::task::spawn_blocking(move || f(mux.as_ref())).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(ExecError::Backend {
            source,
            last_capture: String::new(),
        }),
        Err(e) => Err(ExecError::Join(e.to_string())),
    }
}

/// True when the newest record in `content` is `command` with a status.
/// Covers a capture where the new prompt pushed an old one out of the
/// scrollback, leaving the boundary count unchanged.
fn closes_command(content: &str, command: &str) -> bool {
    parse_history(content)
        .last()
        .is_some_and(|r| r.is_terminated() && r.command == command.trim())
}

/// Text after the last line that echoes `command`, minus the trailing
/// prompt line. Falls back to the whole capture.
fn output_after(content: &str, command: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let Some(start) = lines.iter().rposition(|l| l.contains(command)) else {
        return content.to_string();
    };
    let end = if lines.len() > start + 1 { lines.len() - 1 } else { lines.len() };
    lines[start + 1..end].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use execmux_mux::MultiplexerKind;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted multiplexer: a fixed window listing and a queue of
    /// captures whose last entry repeats forever.
    #[derive(Default)]
    struct FakeMux {
        panes: Mutex<Vec<PaneDetails>>,
        captures: Mutex<VecDeque<Result<String, MuxError>>>,
        sent: Mutex<Vec<(String, String, bool)>>,
        cleared: Mutex<Vec<String>>,
        created: Mutex<Vec<String>>,
    }

    impl FakeMux {
        fn with_panes(self, panes: &[(&str, &str, &str)]) -> Self {
            *self.panes.lock().unwrap() = panes
                .iter()
                .map(|(id, command, shell)| {
                    let mut p = PaneDetails::new(*id);
                    p.command = command.to_string();
                    p.shell = shell.to_string();
                    p
                })
                .collect();
            self
        }

        fn with_captures(self, captures: &[&str]) -> Self {
            self.captures
                .lock()
                .unwrap()
                .extend(captures.iter().map(|c| Ok(c.to_string())));
            self
        }

        fn with_capture_error(self) -> Self {
            self.captures
                .lock()
                .unwrap()
                .push_back(Err(MuxError::PaneNotFound("%1".into())));
            self
        }

        fn sent(&self) -> Vec<(String, String, bool)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Multiplexer for FakeMux {
        fn kind(&self) -> MultiplexerKind {
            MultiplexerKind::Tmux
        }
        fn is_inside_session(&self) -> bool {
            true
        }
        fn current_pane_id(&self) -> Result<String, MuxError> {
            Ok("%0".into())
        }
        fn current_window_target(&self) -> Result<String, MuxError> {
            Ok("$0:0".into())
        }
        fn create_session(&self, _: Option<&str>) -> Result<String, MuxError> {
            Ok("%9".into())
        }
        fn attach_session(&self, _: &str) -> Result<(), MuxError> {
            Ok(())
        }
        fn list_panes(&self, target: &str) -> Result<Vec<PaneDetails>, MuxError> {
            let panes = self.panes.lock().unwrap();
            if target.starts_with('%') {
                return Ok(panes.iter().filter(|p| p.id == target).cloned().collect());
            }
            Ok(panes.clone())
        }
        fn create_pane(&self, _: &str, _: Option<&str>) -> Result<String, MuxError> {
            let id = format!("%{}", 10 + self.created.lock().unwrap().len());
            self.created.lock().unwrap().push(id.clone());
            let mut pane = PaneDetails::new(&id);
            pane.command = "zsh".into();
            pane.shell = "zsh".into();
            self.panes.lock().unwrap().push(pane);
            Ok(id)
        }
        fn capture_pane(&self, _: &str, _: usize) -> Result<String, MuxError> {
            let mut captures = self.captures.lock().unwrap();
            if captures.len() > 1 {
                return captures.pop_front().unwrap_or_else(|| Ok(String::new()));
            }
            match captures.front() {
                Some(Ok(c)) => Ok(c.clone()),
                Some(Err(_)) => Err(MuxError::PaneNotFound("%1".into())),
                None => Ok(String::new()),
            }
        }
        fn send_text(&self, id: &str, text: &str, auto_enter: bool) -> Result<(), MuxError> {
            self.sent
                .lock()
                .unwrap()
                .push((id.to_string(), text.to_string(), auto_enter));
            Ok(())
        }
        fn clear_screen(&self, id: &str) -> Result<(), MuxError> {
            self.cleared.lock().unwrap().push(id.to_string());
            Ok(())
        }
        fn clear_history(&self, _: &str) -> Result<(), MuxError> {
            Ok(())
        }
    }

    fn fast_config() -> ExecPaneConfig {
        ExecPaneConfig {
            poll_interval: Duration::from_millis(5),
            command_timeout: Duration::from_secs(5),
            prepare_timeout: Duration::from_millis(50),
            ..ExecPaneConfig::default()
        }
    }

    fn controller(mux: &Arc<FakeMux>) -> ExecPaneController {
        let mux: Arc<dyn Multiplexer> = mux.clone();
        ExecPaneController::new(mux, fast_config(), ApprovalPolicy::yolo(), "%0", "$0:0")
    }

    fn two_panes() -> FakeMux {
        FakeMux::default().with_panes(&[("%0", "claude", "zsh"), ("%1", "zsh", "zsh")])
    }

    #[tokio::test]
    async fn discovers_first_non_agent_pane() {
        let mux = Arc::new(two_panes());
        let mut ctl = controller(&mux);
        assert_eq!(ctl.state(), ControllerState::Uninitialized);
        assert_eq!(ctl.ensure_pane().await.unwrap(), "%1");
        assert_eq!(ctl.state(), ControllerState::Idle);
        assert!(ctl.exec_pane().unwrap().is_exec_pane);
        assert!(mux.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn creates_a_pane_when_the_agent_is_alone() {
        let mux = Arc::new(FakeMux::default().with_panes(&[("%0", "claude", "zsh")]));
        let mut ctl = controller(&mux);
        assert_eq!(ctl.ensure_pane().await.unwrap(), "%10");
        assert_eq!(*mux.created.lock().unwrap(), vec!["%10".to_string()]);
    }

    #[tokio::test]
    async fn rediscovers_when_the_pane_vanishes() {
        let mux = Arc::new(
            FakeMux::default().with_panes(&[("%0", "claude", "zsh"), ("%1", "zsh", "zsh"), ("%2", "zsh", "zsh")]),
        );
        let mut ctl = controller(&mux);
        assert_eq!(ctl.ensure_pane().await.unwrap(), "%1");
        mux.panes.lock().unwrap().retain(|p| p.id != "%1");
        assert_eq!(ctl.ensure_pane().await.unwrap(), "%2");
    }

    #[tokio::test]
    async fn pinned_pane_is_never_swapped() {
        let mux = Arc::new(two_panes());
        let mut ctl = controller(&mux).with_exec_pane("%7");
        assert_eq!(ctl.ensure_pane().await.unwrap(), "%7");
        assert!(mux.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_keeps_capture_state() {
        let mux = Arc::new(two_panes().with_captures(&["execmux[0]» "]));
        let mut ctl = controller(&mux);
        let pane = ctl.refresh().await.unwrap();
        assert!(pane.is_prepared);
        assert_eq!(pane.last_line, "execmux[0]»");

        mux.panes.lock().unwrap()[1].command = "bash".into();
        ctl.ensure_pane().await.unwrap();
        let pane = ctl.exec_pane().unwrap();
        assert_eq!(pane.command, "bash");
        assert!(pane.is_prepared);
        assert_eq!(pane.last_line, "execmux[0]»");
    }

    #[tokio::test]
    async fn prepare_installs_the_dialect_prompt() {
        let mux = Arc::new(two_panes().with_captures(&["me@host ~ % ", "execmux[0]» "]));
        let mut ctl = controller(&mux);
        let outcome = ctl.prepare(None).await.unwrap();
        assert_eq!(
            outcome,
            PrepareOutcome::Prepared {
                dialect: ShellDialect::Zsh
            }
        );
        let sent = mux.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, ShellDialect::Zsh.prompt_command());
        assert!(sent[0].2);
        assert_eq!(*mux.cleared.lock().unwrap(), vec!["%1".to_string()]);
        assert!(ctl.exec_pane().unwrap().is_prepared);
    }

    #[tokio::test]
    async fn prepare_is_a_no_op_on_a_ready_pane() {
        let mux = Arc::new(two_panes().with_captures(&["execmux[0]» "]));
        let mut ctl = controller(&mux);
        assert_eq!(ctl.prepare(None).await.unwrap(), PrepareOutcome::AlreadyPrepared);
        assert!(mux.sent().is_empty());
    }

    #[tokio::test]
    async fn prepare_degrades_for_unknown_shells() {
        let mux = Arc::new(
            FakeMux::default()
                .with_panes(&[("%0", "claude", "zsh"), ("%1", "dash", "dash")])
                .with_captures(&["$ "]),
        );
        let mut ctl = controller(&mux);
        assert_eq!(
            ctl.prepare(None).await.unwrap(),
            PrepareOutcome::Unsupported {
                shell: "dash".into()
            }
        );
        assert!(mux.sent().is_empty());
    }

    #[tokio::test]
    async fn prepare_leaves_busy_panes_alone() {
        let mux = Arc::new(
            FakeMux::default()
                .with_panes(&[("%0", "claude", "zsh"), ("%1", "vim", "zsh")])
                .with_captures(&["~"]),
        );
        let mut ctl = controller(&mux);
        assert_eq!(
            ctl.prepare(None).await.unwrap(),
            PrepareOutcome::Busy {
                command: "vim".into()
            }
        );
        assert!(mux.sent().is_empty());
    }

    #[tokio::test]
    async fn prepare_reports_a_missing_sentinel() {
        let mux = Arc::new(two_panes().with_captures(&["% "]));
        let mut ctl = controller(&mux);
        let outcome = ctl.prepare(Some(ShellDialect::Bash)).await.unwrap();
        assert_eq!(
            outcome,
            PrepareOutcome::Unconfirmed {
                last_line: "%".into()
            }
        );
        assert_eq!(mux.sent()[0].1, ShellDialect::Bash.prompt_command());
    }

    #[tokio::test]
    async fn execute_returns_the_newest_record() {
        let mux = Arc::new(two_panes().with_captures(&[
            "execmux[0]» ",
            "execmux[0]» ls\na.txt",
            "execmux[0]» ls\na.txt\nb.txt\nexecmux[0]» ",
        ]));
        let mut ctl = controller(&mux);
        let outcome = ctl
            .execute("ls", ExecOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.pane_id, "%1");
        assert!(outcome.structured && outcome.submitted);
        assert_eq!(
            outcome.record,
            CommandExecHistory {
                command: "ls".into(),
                output: "a.txt\nb.txt".into(),
                code: 0,
            }
        );
        assert_eq!(mux.sent(), vec![("%1".into(), "ls".into(), true)]);
        assert_eq!(ctl.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn execute_reports_nonzero_status() {
        let mux = Arc::new(two_panes().with_captures(&[
            "execmux[0]» ",
            "execmux[0]» false\nexecmux[1]» ",
        ]));
        let mut ctl = controller(&mux);
        let outcome = ctl
            .execute("false", ExecOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.record.code, 1);
        assert_eq!(outcome.record.output, "");
    }

    #[tokio::test]
    async fn old_prompts_do_not_end_the_wait() {
        // The capture before sending already ends on a ready prompt; only a
        // prompt beyond the baseline counts.
        let mux = Arc::new(two_panes().with_captures(&[
            "execmux[0]» true\nexecmux[0]» ",
            "execmux[0]» true\nexecmux[0]» ",
            "execmux[0]» true\nexecmux[0]» sleep 1",
            "execmux[0]» true\nexecmux[0]» sleep 1\nexecmux[0]» ",
        ]));
        let mut ctl = controller(&mux);
        let outcome = ctl
            .execute("sleep 1", ExecOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.record.command, "sleep 1");
        assert_eq!(mux.captures.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn finishes_when_an_old_prompt_scrolls_away() {
        // Same boundary count before and after: the first prompt line fell
        // off the top as the new one arrived.
        let mux = Arc::new(two_panes().with_captures(&[
            "execmux[0]» true\nold\nexecmux[0]» ",
            "old\nexecmux[0]» ls\nfile\nexecmux[0]» ",
        ]));
        let mut ctl = controller(&mux);
        let opts = ExecOptions {
            timeout: Some(Duration::from_millis(300)),
            ..ExecOptions::default()
        };
        let outcome = ctl.execute("ls", opts, &CancellationToken::new()).await.unwrap();
        assert_eq!(
            outcome.record,
            CommandExecHistory {
                command: "ls".into(),
                output: "file".into(),
                code: 0,
            }
        );
    }

    #[tokio::test]
    async fn rerun_waits_for_fresh_output() {
        // The previous `ls` is already the newest record; an unchanged
        // capture must not be taken as the rerun finishing.
        let mux = Arc::new(two_panes().with_captures(&[
            "execmux[0]» ls\nold\nexecmux[0]» ",
            "execmux[0]» ls\nold\nexecmux[0]» ",
        ]));
        let mut ctl = controller(&mux);
        let opts = ExecOptions {
            timeout: Some(Duration::from_millis(40)),
            ..ExecOptions::default()
        };
        let err = ctl.execute("ls", opts, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }), "{err:?}");
    }

    #[test]
    fn timeout_message_keeps_sub_second_precision() {
        let err = ExecError::Timeout {
            command: "ls".into(),
            elapsed: Duration::from_millis(300),
            last_capture: String::new(),
            partial: None,
        };
        assert_eq!(err.to_string(), "command \"ls\" did not finish within 300ms");
    }

    #[tokio::test]
    async fn execute_times_out_with_partial_output() {
        let mux = Arc::new(two_panes().with_captures(&[
            "execmux[0]» ",
            "execmux[0]» tail -f log\nline 1",
        ]));
        let mut ctl = controller(&mux);
        let opts = ExecOptions {
            timeout: Some(Duration::from_millis(30)),
            ..ExecOptions::default()
        };
        let err = ctl
            .execute("tail -f log", opts, &CancellationToken::new())
            .await
            .unwrap_err();
        let ExecError::Timeout { partial, last_capture, .. } = &err else {
            panic!("expected timeout, got {err:?}");
        };
        let partial = partial.as_ref().unwrap();
        assert_eq!(partial.output, "line 1");
        assert!(!partial.is_terminated());
        assert!(last_capture.ends_with("line 1"));
        assert_eq!(ctl.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn cancellation_ends_the_wait() {
        let mux = Arc::new(two_panes().with_captures(&["execmux[0]» ", "execmux[0]» make\nbuilding"]));
        let mut ctl = controller(&mux);
        let token = CancellationToken::new();
        token.cancel();
        let err = ctl
            .execute("make", ExecOptions::default(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Cancelled { .. }), "{err:?}");
        assert_eq!(err.partial().unwrap().command, "make");
        assert_eq!(ctl.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn unapproved_commands_are_not_sent() {
        let mux = Arc::new(two_panes().with_captures(&["execmux[0]» "]));
        let mux_dyn: Arc<dyn Multiplexer> = mux.clone();
        let policy = ApprovalPolicy::new(&[], &[], true, false).unwrap();
        let mut ctl = ExecPaneController::new(mux_dyn, fast_config(), policy, "%0", "$0:0");
        let err = ctl
            .execute("rm -rf build", ExecOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::ApprovalRequired { .. }));
        assert!(mux.sent().is_empty());

        let opts = ExecOptions {
            approved: true,
            auto_enter: false,
            ..ExecOptions::default()
        };
        let outcome = ctl
            .execute("rm -rf build", opts, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.submitted);
        assert_eq!(mux.sent(), vec![("%1".into(), "rm -rf build".into(), false)]);
    }

    #[tokio::test]
    async fn empty_prompts_yield_no_record() {
        let mux = Arc::new(two_panes().with_captures(&["execmux[0]» ", "execmux[0]» \nexecmux[0]» "]));
        let mut ctl = controller(&mux);
        let err = ctl
            .execute("", ExecOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::ParseYieldedNoRecords { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn one_command_at_a_time() {
        let mux = Arc::new(two_panes());
        let mut ctl = controller(&mux);
        ctl.state = ControllerState::Polling;
        let err = ctl
            .execute("ls", ExecOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::AlreadyInFlight));
        assert!(matches!(ctl.send_keys("q", false).await, Err(ExecError::AlreadyInFlight)));
    }

    #[tokio::test]
    async fn unstructured_panes_wait_for_stable_output() {
        let mux = Arc::new(
            FakeMux::default()
                .with_panes(&[("%0", "claude", "zsh"), ("%1", "dash", "dash")])
                .with_captures(&["$ ", "$ uptime", "$ uptime\n up 3 days\n$ "]),
        );
        let mut ctl = controller(&mux);
        let outcome = ctl
            .execute("uptime", ExecOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.structured);
        assert_eq!(outcome.record.output, " up 3 days");
        assert_eq!(outcome.record.code, CommandExecHistory::UNTERMINATED);
    }

    #[tokio::test]
    async fn repeated_capture_failures_abort() {
        let mux = Arc::new(two_panes().with_captures(&["execmux[0]» "]).with_capture_error());
        let mut ctl = controller(&mux);
        let err = ctl
            .execute("ls", ExecOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        let ExecError::Backend { last_capture, .. } = &err else {
            panic!("expected backend error, got {err:?}");
        };
        assert_eq!(last_capture, "execmux[0]» ");
    }

    #[test]
    fn output_after_the_echoed_command() {
        assert_eq!(output_after("$ ls\na\nb\n$ ", "ls"), "a\nb");
        assert_eq!(output_after("$ ls", "ls"), "");
        assert_eq!(output_after("no echo", "ls"), "no echo");
    }
}

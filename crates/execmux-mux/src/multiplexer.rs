use crate::error::MuxError;
use crate::executor::ProcessRunner;
use crate::tmux::TmuxBackend;
use crate::zellij::ZellijBackend;
use execmux_core::PaneDetails;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiplexerKind {
    Tmux,
    Zellij,
}

impl MultiplexerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tmux => "tmux",
            Self::Zellij => "zellij",
        }
    }
}

impl fmt::Display for MultiplexerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MultiplexerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tmux" => Ok(Self::Tmux),
            "zellij" => Ok(Self::Zellij),
            _ => Err(format!("unknown multiplexer: {s}")),
        }
    }
}

/// Which halves of a pane clear actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClearOutcome {
    pub screen_cleared: bool,
    pub history_cleared: bool,
}

/// Capability interface over a terminal multiplexer.
///
/// Implementations are synchronous and may block on subprocesses; async
/// callers wrap them in `spawn_blocking`.
pub trait Multiplexer: Send + Sync {
    fn kind(&self) -> MultiplexerKind;

    /// True when the caller runs inside a live session of this product.
    fn is_inside_session(&self) -> bool;

    /// Id of the pane the caller runs in.
    fn current_pane_id(&self) -> Result<String, MuxError>;

    /// Target naming the window that contains the caller's pane.
    fn current_window_target(&self) -> Result<String, MuxError>;

    /// Start a detached session, returning the id of its first pane.
    fn create_session(&self, command: Option<&str>) -> Result<String, MuxError>;

    /// Attach the caller's terminal to a session. Blocks until detach.
    fn attach_session(&self, id: &str) -> Result<(), MuxError>;

    /// Panes under `target`: a window target lists its panes, a pane id
    /// lists only that pane. Capture fields are left empty.
    fn list_panes(&self, target: &str) -> Result<Vec<PaneDetails>, MuxError>;

    /// Split a new pane next to `target` without taking focus.
    fn create_pane(&self, target: &str, command: Option<&str>) -> Result<String, MuxError>;

    /// Text of the pane's scrollback, at most the last `max_lines` lines.
    fn capture_pane(&self, id: &str, max_lines: usize) -> Result<String, MuxError>;

    /// Send text, with special-key words sent as key presses. With
    /// `auto_enter`, every line is followed by Enter.
    fn send_text(&self, id: &str, text: &str, auto_enter: bool) -> Result<(), MuxError>;

    /// Cosmetic clear of the visible screen.
    fn clear_screen(&self, id: &str) -> Result<(), MuxError>;

    /// Discard the pane's scrollback.
    fn clear_history(&self, id: &str) -> Result<(), MuxError>;

    /// Clear screen, then history where supported. A screen failure is
    /// only logged when history clearing succeeds.
    fn clear_pane(&self, id: &str) -> Result<ClearOutcome, MuxError> {
        let mut outcome = ClearOutcome::default();
        let screen = self.clear_screen(id);
        match &screen {
            Ok(()) => outcome.screen_cleared = true,
            Err(e) => tracing::warn!(pane = id, "clear screen failed: {e}"),
        }
        match self.clear_history(id) {
            Ok(()) => outcome.history_cleared = true,
            Err(MuxError::Unsupported { .. }) => screen?,
            Err(e) => return Err(e),
        }
        Ok(outcome)
    }
}

// ─── Factory ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub tmux_bin: Option<String>,
    pub tmux_socket_path: Option<String>,
}

/// Pick a multiplexer from session environment variables.
/// tmux wins when both look present, matching how nesting usually works
/// (a zellij client started inside tmux still reports `TMUX`).
pub fn detect_kind(env: impl Fn(&str) -> Option<String>) -> Option<MultiplexerKind> {
    if env("TMUX").is_some_and(|v| !v.is_empty()) || env("TMUX_PANE").is_some() {
        return Some(MultiplexerKind::Tmux);
    }
    if env("ZELLIJ").is_some() || env("ZELLIJ_PANE_ID").is_some() {
        return Some(MultiplexerKind::Zellij);
    }
    None
}

pub fn backend_for(kind: MultiplexerKind, options: &BackendOptions) -> Box<dyn Multiplexer> {
    match kind {
        MultiplexerKind::Tmux => {
            let mut backend = TmuxBackend::from_env(ProcessRunner);
            if let Some(bin) = &options.tmux_bin {
                backend = backend.with_tmux_bin(bin.clone());
            }
            if let Some(path) = &options.tmux_socket_path {
                backend = backend.with_socket_path(path.clone());
            }
            Box::new(backend)
        }
        MultiplexerKind::Zellij => Box::new(ZellijBackend::from_env(ProcessRunner)),
    }
}

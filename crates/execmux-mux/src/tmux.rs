//! tmux backend.

use crate::capture::tail_lines;
use crate::error::MuxError;
use crate::executor::CommandRunner;
use crate::keys::{KeySegment, SpecialKey, tokenize_line};
use crate::multiplexer::{Multiplexer, MultiplexerKind};
use crate::pane_info::{LIST_PANES_FORMAT, WINDOW_TARGET_FORMAT, parse_list_panes_output};
use crate::process::enrich_panes;
use execmux_core::PaneDetails;

pub struct TmuxBackend<R> {
    runner: R,
    tmux_bin: String,
    socket_path: Option<String>,
    socket_name: Option<String>,
    /// `$TMUX_PANE` of the calling process.
    env_pane: Option<String>,
    /// Whether `$TMUX` was set for the calling process.
    env_session: bool,
}

impl<R: CommandRunner> TmuxBackend<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            tmux_bin: "tmux".to_string(),
            socket_path: None,
            socket_name: None,
            env_pane: None,
            env_session: false,
        }
    }

    /// Backend seeded from `$TMUX` and `$TMUX_PANE`.
    pub fn from_env(runner: R) -> Self {
        let env_pane = std::env::var("TMUX_PANE").ok().filter(|v| !v.is_empty());
        let env_session = std::env::var("TMUX").is_ok_and(|v| !v.is_empty());
        Self::new(runner).with_session_env(env_session, env_pane)
    }

    #[must_use]
    pub fn with_tmux_bin(mut self, bin: impl Into<String>) -> Self {
        self.tmux_bin = bin.into();
        self
    }

    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_socket_name(mut self, name: impl Into<String>) -> Self {
        self.socket_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_session_env(mut self, in_session: bool, pane: Option<String>) -> Self {
        self.env_session = in_session;
        self.env_pane = pane;
        self
    }

    fn argv<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut argv = Vec::with_capacity(args.len() + 2);
        // Socket path takes precedence over socket name
        if let Some(path) = &self.socket_path {
            argv.extend(["-S", path.as_str()]);
        } else if let Some(name) = &self.socket_name {
            argv.extend(["-L", name.as_str()]);
        }
        argv.extend_from_slice(args);
        argv
    }

    fn tmux(&self, args: &[&str]) -> Result<String, MuxError> {
        self.runner.run(&self.tmux_bin, &self.argv(args))
    }

    fn send_keys(&self, id: &str, keys: &[&str]) -> Result<(), MuxError> {
        let mut args = vec!["send-keys", "-t", id];
        args.extend_from_slice(keys);
        self.tmux(&args).map(|_| ())
    }

    fn send_line(&self, id: &str, line: &str) -> Result<(), MuxError> {
        let segments = tokenize_line(line);
        match segments.as_slice() {
            [] => Ok(()),
            [KeySegment::Literal(text)] => {
                let text = escape_semicolon(text);
                self.send_keys(id, &["-l", &text])
            }
            _ => {
                let words: Vec<String> = segments
                    .iter()
                    .map(|s| match s {
                        KeySegment::Literal(text) => escape_semicolon(text),
                        KeySegment::Key(key) => key.tmux_name(),
                    })
                    .collect();
                let refs: Vec<&str> = words.iter().map(String::as_str).collect();
                self.send_keys(id, &refs)
            }
        }
    }
}

/// tmux reads a trailing `;` as its own command separator.
fn escape_semicolon(text: &str) -> String {
    match text.strip_suffix(';') {
        Some(head) if !head.ends_with('\\') => format!("{head}\\;"),
        _ => text.to_string(),
    }
}

fn new_pane_id(output: &str) -> Result<String, MuxError> {
    let id = output.trim();
    if id.starts_with('%') {
        Ok(id.to_string())
    } else {
        Err(MuxError::Parse {
            line_num: 1,
            detail: format!("expected a pane id, got {id:?}"),
        })
    }
}

impl<R: CommandRunner> Multiplexer for TmuxBackend<R> {
    fn kind(&self) -> MultiplexerKind {
        MultiplexerKind::Tmux
    }

    fn is_inside_session(&self) -> bool {
        (self.env_session || self.env_pane.is_some()) && self.tmux(&["list-sessions"]).is_ok()
    }

    fn current_pane_id(&self) -> Result<String, MuxError> {
        if let Some(pane) = &self.env_pane {
            return Ok(pane.clone());
        }
        if !self.env_session {
            return Err(MuxError::NotInSession);
        }
        let out = self.tmux(&["display-message", "-p", "#{pane_id}"])?;
        new_pane_id(&out)
    }

    fn current_window_target(&self) -> Result<String, MuxError> {
        let pane = self.current_pane_id()?;
        let out = self.tmux(&["display-message", "-p", "-t", &pane, WINDOW_TARGET_FORMAT])?;
        let target = out.trim();
        if target.is_empty() {
            return Err(MuxError::PaneNotFound(pane));
        }
        Ok(target.to_string())
    }

    fn create_session(&self, command: Option<&str>) -> Result<String, MuxError> {
        let mut args = vec!["new-session", "-d", "-P", "-F", "#{pane_id}"];
        if let Some(cmd) = command {
            args.push(cmd);
        }
        new_pane_id(&self.tmux(&args)?)
    }

    fn attach_session(&self, id: &str) -> Result<(), MuxError> {
        self.runner
            .run_interactive(&self.tmux_bin, &self.argv(&["attach-session", "-t", id]))
    }

    fn list_panes(&self, target: &str) -> Result<Vec<PaneDetails>, MuxError> {
        let out = self
            .tmux(&["list-panes", "-t", target, "-F", LIST_PANES_FORMAT])
            .map_err(|e| if e.is_pane_gone() { MuxError::PaneNotFound(target.into()) } else { e })?;
        let mut panes = parse_list_panes_output(&out)?;
        // `-t %N` lists the whole window containing %N
        if target.starts_with('%') {
            panes.retain(|p| p.id == target);
            if panes.is_empty() {
                return Err(MuxError::PaneNotFound(target.to_string()));
            }
        }
        enrich_panes(&self.runner, &mut panes);
        Ok(panes)
    }

    fn create_pane(&self, target: &str, command: Option<&str>) -> Result<String, MuxError> {
        let mut args = vec!["split-window", "-d", "-h", "-t", target, "-P", "-F", "#{pane_id}"];
        if let Some(cmd) = command {
            args.push(cmd);
        }
        let id = new_pane_id(&self.tmux(&args)?)?;
        tracing::info!(pane = %id, target, "created pane");
        Ok(id)
    }

    fn capture_pane(&self, id: &str, max_lines: usize) -> Result<String, MuxError> {
        let start = format!("-{max_lines}");
        let out = self
            .tmux(&["capture-pane", "-p", "-t", id, "-S", &start])
            .map_err(|e| if e.is_pane_gone() { MuxError::PaneNotFound(id.into()) } else { e })?;
        Ok(tail_lines(&out, max_lines))
    }

    fn send_text(&self, id: &str, text: &str, auto_enter: bool) -> Result<(), MuxError> {
        let lines: Vec<&str> = text.split('\n').collect();
        let last = lines.len() - 1;
        for (i, line) in lines.iter().enumerate() {
            self.send_line(id, line)?;
            // A trailing newline already ended the previous line.
            if auto_enter && (i < last || !line.is_empty()) {
                self.send_keys(id, &[SpecialKey::Enter.tmux_name().as_str()])?;
            }
        }
        Ok(())
    }

    fn clear_screen(&self, id: &str) -> Result<(), MuxError> {
        self.send_keys(id, &[SpecialKey::Ctrl('l').tmux_name().as_str()])
    }

    fn clear_history(&self, id: &str) -> Result<(), MuxError> {
        self.tmux(&["clear-history", "-t", id]).map(|_| ())
    }
}

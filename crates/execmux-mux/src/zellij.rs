//! zellij backend.
//!
//! The zellij CLI acts on the focused pane only and has no pane listing,
//! so this backend knows the caller's own pane (from `$ZELLIJ_PANE_ID`)
//! plus the panes it created itself. Operations on another pane move
//! focus there, verify the move through `list-clients`, and move back.

use crate::capture::tail_lines;
use crate::error::MuxError;
use crate::executor::CommandRunner;
use crate::keys::{KeySegment, SpecialKey, tokenize_line};
use crate::multiplexer::{Multiplexer, MultiplexerKind};
use execmux_core::PaneDetails;
use execmux_core::prompt::normalize_shell_name;
use std::sync::Mutex;

const BACKEND: &str = "zellij";

pub struct ZellijBackend<R> {
    runner: R,
    zellij_bin: String,
    in_session: bool,
    env_pane: Option<String>,
    session_name: Option<String>,
    default_shell: String,
    created: Mutex<Vec<String>>,
}

/// `3` -> `terminal_3`; ids that already carry a kind are kept.
pub fn pane_id_from_env(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains('_') {
        raw.to_string()
    } else {
        format!("terminal_{raw}")
    }
}

fn is_pane_id(target: &str) -> bool {
    target.starts_with("terminal_") || target.starts_with("plugin_")
}

/// Focused pane of the first client in `zellij action list-clients` output.
fn parse_list_clients(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("CLIENT_ID"))
        .find_map(|l| l.split_whitespace().nth(1))
        .map(String::from)
}

impl<R: CommandRunner> ZellijBackend<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            zellij_bin: "zellij".to_string(),
            in_session: false,
            env_pane: None,
            session_name: None,
            default_shell: String::new(),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Backend seeded from `$ZELLIJ`, `$ZELLIJ_PANE_ID`,
    /// `$ZELLIJ_SESSION_NAME` and `$SHELL`.
    pub fn from_env(runner: R) -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        let mut backend = Self::new(runner).with_session_env(
            var("ZELLIJ").is_some(),
            var("ZELLIJ_PANE_ID").map(|p| pane_id_from_env(&p)),
            var("ZELLIJ_SESSION_NAME"),
        );
        if let Some(shell) = var("SHELL") {
            backend.default_shell = normalize_shell_name(&shell).to_string();
        }
        backend
    }

    #[must_use]
    pub fn with_session_env(
        mut self,
        in_session: bool,
        pane: Option<String>,
        session_name: Option<String>,
    ) -> Self {
        self.in_session = in_session;
        self.env_pane = pane;
        self.session_name = session_name;
        self
    }

    #[must_use]
    pub fn with_default_shell(mut self, shell: impl Into<String>) -> Self {
        self.default_shell = shell.into();
        self
    }

    fn action(&self, args: &[&str]) -> Result<String, MuxError> {
        let mut argv = vec!["action"];
        argv.extend_from_slice(args);
        self.runner.run(&self.zellij_bin, &argv)
    }

    fn focused_pane(&self) -> Option<String> {
        match self.action(&["list-clients"]) {
            Ok(out) => parse_list_clients(&out),
            Err(e) => {
                tracing::debug!("zellij list-clients failed: {e}");
                None
            }
        }
    }

    fn known_panes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.env_pane.iter().cloned().collect();
        if let Ok(created) = self.created.lock() {
            for id in created.iter() {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    /// Zellij cannot report a pane's foreground process, so `command`
    /// stays empty. Only the login shell is known.
    fn details(&self, id: &str) -> PaneDetails {
        let mut pane = PaneDetails::new(id);
        pane.is_active = self.env_pane.as_deref() == Some(id);
        pane.shell = self.default_shell.clone();
        pane
    }

    /// Run `f` with `id` focused, restoring focus afterwards.
    fn with_focus<T>(
        &self,
        id: &str,
        f: impl FnOnce() -> Result<T, MuxError>,
    ) -> Result<T, MuxError> {
        let focused = self.focused_pane().or_else(|| self.env_pane.clone());
        if focused.as_deref() == Some(id) {
            return f();
        }

        self.action(&["focus-next-pane"])?;
        let result = if self.focused_pane().as_deref() == Some(id) {
            f()
        } else {
            // Never type into a pane we could not confirm.
            Err(MuxError::PaneNotFound(id.to_string()))
        };
        if let Err(e) = self.action(&["focus-previous-pane"]) {
            tracing::warn!("zellij focus restore failed: {e}");
        }
        result
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<(), MuxError> {
        let decimal: Vec<String> = bytes.iter().map(u8::to_string).collect();
        let mut args = vec!["write"];
        args.extend(decimal.iter().map(String::as_str));
        self.action(&args).map(|_| ())
    }
}

impl<R: CommandRunner> Multiplexer for ZellijBackend<R> {
    fn kind(&self) -> MultiplexerKind {
        MultiplexerKind::Zellij
    }

    fn is_inside_session(&self) -> bool {
        self.in_session && self.env_pane.is_some()
    }

    fn current_pane_id(&self) -> Result<String, MuxError> {
        self.env_pane.clone().ok_or(MuxError::NotInSession)
    }

    fn current_window_target(&self) -> Result<String, MuxError> {
        if !self.is_inside_session() {
            return Err(MuxError::NotInSession);
        }
        Ok(self
            .session_name
            .clone()
            .unwrap_or_else(|| "current".to_string()))
    }

    /// Starts a background session and returns its name; zellij assigns
    /// pane ids only once a client attaches.
    fn create_session(&self, command: Option<&str>) -> Result<String, MuxError> {
        if command.is_some() {
            return Err(MuxError::Unsupported {
                backend: BACKEND,
                operation: "create_session with a command",
            });
        }
        let name = format!("execmux-{}", std::process::id());
        self.runner
            .run(&self.zellij_bin, &["attach", "--create-background", &name])?;
        Ok(name)
    }

    fn attach_session(&self, id: &str) -> Result<(), MuxError> {
        self.runner.run_interactive(&self.zellij_bin, &["attach", id])
    }

    fn list_panes(&self, target: &str) -> Result<Vec<PaneDetails>, MuxError> {
        let known = self.known_panes();
        if is_pane_id(target) {
            return if known.iter().any(|id| id == target) {
                Ok(vec![self.details(target)])
            } else {
                Err(MuxError::PaneNotFound(target.to_string()))
            };
        }
        Ok(known.iter().map(|id| self.details(id)).collect())
    }

    fn create_pane(&self, target: &str, command: Option<&str>) -> Result<String, MuxError> {
        let mut args = vec!["new-pane", "--direction", "right"];
        if let Some(cmd) = command {
            args.extend(["--", "sh", "-c", cmd]);
        }
        let out = self.action(&args)?;

        // Newer releases print the id; older ones leave the new pane focused.
        let printed = out.trim();
        let id = if is_pane_id(printed) {
            printed.to_string()
        } else {
            let focused = self.focused_pane().ok_or(MuxError::Unsupported {
                backend: BACKEND,
                operation: "identifying a new pane",
            })?;
            if focused == target {
                return Err(MuxError::Parse {
                    line_num: 1,
                    detail: "new pane did not take focus".to_string(),
                });
            }
            if let Err(e) = self.action(&["focus-previous-pane"]) {
                tracing::warn!("zellij focus restore failed: {e}");
            }
            focused
        };

        if let Ok(mut created) = self.created.lock() {
            created.push(id.clone());
        }
        tracing::info!(pane = %id, target, "created pane");
        Ok(id)
    }

    fn capture_pane(&self, id: &str, max_lines: usize) -> Result<String, MuxError> {
        let file = tempfile::NamedTempFile::new()?;
        let path = file.path().to_string_lossy().into_owned();
        self.with_focus(id, || self.action(&["dump-screen", &path, "--full"]))?;
        let content = std::fs::read_to_string(file.path())?;
        Ok(tail_lines(&content, max_lines))
    }

    fn send_text(&self, id: &str, text: &str, auto_enter: bool) -> Result<(), MuxError> {
        self.with_focus(id, || {
            let lines: Vec<&str> = text.split('\n').collect();
            let last = lines.len() - 1;
            for (i, line) in lines.iter().enumerate() {
                for segment in tokenize_line(line) {
                    match segment {
                        KeySegment::Literal(chars) => {
                            self.action(&["write-chars", &chars])?;
                        }
                        KeySegment::Key(key) => self.write_bytes(&key.terminal_bytes())?,
                    }
                }
                if auto_enter && (i < last || !line.is_empty()) {
                    self.write_bytes(&SpecialKey::Enter.terminal_bytes())?;
                }
            }
            Ok(())
        })
    }

    fn clear_screen(&self, id: &str) -> Result<(), MuxError> {
        self.with_focus(id, || {
            self.write_bytes(&SpecialKey::Ctrl('l').terminal_bytes())
        })
    }

    fn clear_history(&self, id: &str) -> Result<(), MuxError> {
        self.with_focus(id, || self.action(&["clear"]).map(|_| ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::ScriptedRunner;

    const CLIENTS_SELF: &str = "CLIENT_ID ZELLIJ_PANE_ID RUNNING_COMMAND\n1         terminal_1     zsh\n";
    const CLIENTS_OTHER: &str = "CLIENT_ID ZELLIJ_PANE_ID RUNNING_COMMAND\n1         terminal_2     zsh\n";

    fn backend(runner: &ScriptedRunner) -> ZellijBackend<&ScriptedRunner> {
        ZellijBackend::new(runner)
            .with_session_env(true, Some("terminal_1".into()), Some("dev".into()))
            .with_default_shell("zsh")
    }

    fn argv(call: &[String]) -> Vec<&str> {
        call.iter().map(String::as_str).collect()
    }

    #[test]
    fn env_pane_ids_are_normalized() {
        assert_eq!(pane_id_from_env("3"), "terminal_3");
        assert_eq!(pane_id_from_env("plugin_2"), "plugin_2");
    }

    #[test]
    fn list_clients_parsing() {
        assert_eq!(parse_list_clients(CLIENTS_OTHER).as_deref(), Some("terminal_2"));
        assert_eq!(parse_list_clients("CLIENT_ID ZELLIJ_PANE_ID RUNNING_COMMAND\n"), None);
    }

    #[test]
    fn session_identity() {
        let runner = ScriptedRunner::new();
        let z = backend(&runner);
        assert!(z.is_inside_session());
        assert_eq!(z.current_pane_id().expect("pane"), "terminal_1");
        assert_eq!(z.current_window_target().expect("target"), "dev");

        let outside = ZellijBackend::new(&runner);
        assert!(!outside.is_inside_session());
        assert!(matches!(outside.current_pane_id(), Err(MuxError::NotInSession)));
    }

    #[test]
    fn list_panes_only_knows_own_pane_at_first() {
        let runner = ScriptedRunner::new();
        let z = backend(&runner);
        let panes = z.list_panes("dev").expect("panes");
        assert_eq!(panes.len(), 1);
        assert_eq!(panes[0].id, "terminal_1");
        assert_eq!(panes[0].shell, "zsh");
        assert!(matches!(z.list_panes("terminal_9"), Err(MuxError::PaneNotFound(_))));
    }

    #[test]
    fn pane_command_is_left_unknown() {
        let runner = ScriptedRunner::new();
        let panes = backend(&runner).list_panes("terminal_1").expect("panes");
        assert_eq!(panes[0].command, "");
        assert!(panes[0].command_args.is_empty());
        assert!(!panes[0].is_sub_shell);
    }

    #[test]
    fn created_pane_is_tracked() {
        let runner = ScriptedRunner::new().ok("").ok(CLIENTS_OTHER).ok("");
        let z = backend(&runner);
        let id = z.create_pane("terminal_1", None).expect("pane");
        assert_eq!(id, "terminal_2");
        let calls = runner.calls();
        assert_eq!(argv(&calls[0]), ["zellij", "action", "new-pane", "--direction", "right"]);
        assert_eq!(argv(&calls[2]), ["zellij", "action", "focus-previous-pane"]);

        let panes = z.list_panes("dev").expect("panes");
        assert_eq!(panes.len(), 2);
        assert_eq!(z.list_panes("terminal_2").expect("pane")[0].id, "terminal_2");
    }

    #[test]
    fn created_pane_id_from_output() {
        let runner = ScriptedRunner::new().ok("terminal_5\n");
        let z = backend(&runner);
        assert_eq!(z.create_pane("terminal_1", Some("htop")).expect("pane"), "terminal_5");
        assert_eq!(
            argv(&runner.calls()[0]),
            ["zellij", "action", "new-pane", "--direction", "right", "--", "sh", "-c", "htop"]
        );
    }

    #[test]
    fn send_to_focused_pane_writes_directly() {
        let runner = ScriptedRunner::new().ok(CLIENTS_SELF);
        let z = backend(&runner);
        z.send_text("terminal_1", "C-c ls", true).expect("send");
        let calls = runner.calls();
        assert_eq!(argv(&calls[1]), ["zellij", "action", "write", "3"]);
        assert_eq!(argv(&calls[2]), ["zellij", "action", "write-chars", "ls"]);
        assert_eq!(argv(&calls[3]), ["zellij", "action", "write", "13"]);
        assert_eq!(calls.len(), 4);
    }

    #[test]
    fn send_to_other_pane_moves_focus_and_back() {
        let runner = ScriptedRunner::new().ok(CLIENTS_SELF).ok("").ok(CLIENTS_OTHER);
        let z = backend(&runner);
        z.send_text("terminal_2", "pwd", false).expect("send");
        let calls = runner.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(argv(&calls[1]), ["zellij", "action", "focus-next-pane"]);
        assert_eq!(argv(&calls[3]), ["zellij", "action", "write-chars", "pwd"]);
        assert_eq!(argv(&calls[4]), ["zellij", "action", "focus-previous-pane"]);
    }

    #[test]
    fn unverified_focus_refuses_to_type() {
        // Focus moved somewhere other than the requested pane.
        let runner = ScriptedRunner::new().ok(CLIENTS_SELF).ok("").ok(CLIENTS_SELF);
        let z = backend(&runner);
        assert!(matches!(
            z.send_text("terminal_7", "rm -rf build", true),
            Err(MuxError::PaneNotFound(_))
        ));
        let calls = runner.calls();
        assert!(calls.iter().all(|c| !c.contains(&"write-chars".to_string())));
        assert_eq!(argv(calls.last().expect("restore")), ["zellij", "action", "focus-previous-pane"]);
    }

    #[test]
    fn capture_dumps_full_screen_to_a_file() {
        let runner = ScriptedRunner::new().ok(CLIENTS_SELF);
        let text = backend(&runner).capture_pane("terminal_1", 100).expect("capture");
        assert_eq!(text, "");
        let calls = runner.calls();
        let dump = argv(&calls[1]);
        assert_eq!(dump[..3], ["zellij", "action", "dump-screen"]);
        assert_eq!(dump[4], "--full");
    }

    #[test]
    fn create_session_with_command_is_unsupported() {
        let runner = ScriptedRunner::new();
        assert!(matches!(
            backend(&runner).create_session(Some("htop")),
            Err(MuxError::Unsupported { .. })
        ));
    }

    #[test]
    fn clear_history_uses_clear_action() {
        let runner = ScriptedRunner::new().ok(CLIENTS_SELF);
        backend(&runner).clear_history("terminal_1").expect("clear");
        assert_eq!(argv(&runner.calls()[1]), ["zellij", "action", "clear"]);
    }
}

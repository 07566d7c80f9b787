//! Multiplexer selection: `--backend`, then the config file, then the
//! session environment.

use crate::cli::BackendChoice;
use crate::config::Config;
use execmux_mux::{BackendOptions, Multiplexer, MultiplexerKind, MuxError, backend_for, detect_kind};
use std::sync::Arc;

/// Resolve which multiplexer to drive. `None` means auto-detect.
pub fn resolve_kind(choice: Option<BackendChoice>, config: &Config) -> anyhow::Result<Option<MultiplexerKind>> {
    match choice {
        Some(BackendChoice::Tmux) => Ok(Some(MultiplexerKind::Tmux)),
        Some(BackendChoice::Zellij) => Ok(Some(MultiplexerKind::Zellij)),
        Some(BackendChoice::Auto) => Ok(None),
        None => match config.backend.as_deref() {
            None | Some("auto") => Ok(None),
            Some(name) => name
                .parse()
                .map(Some)
                .map_err(|e: String| anyhow::anyhow!("config backend: {e}")),
        },
    }
}

/// Open a backend. Outside any session, `require_session` fails and
/// otherwise falls back to tmux so sessions can be started.
pub fn open(
    choice: Option<BackendChoice>,
    config: &Config,
    tmux_socket: Option<String>,
    require_session: bool,
) -> anyhow::Result<Arc<dyn Multiplexer>> {
    let options = BackendOptions {
        tmux_bin: None,
        tmux_socket_path: tmux_socket.or_else(|| config.tmux_socket_path.clone()),
    };
    let kind = match resolve_kind(choice, config)? {
        Some(kind) => kind,
        None => match detect_kind(|k| std::env::var(k).ok()) {
            Some(kind) => kind,
            None if require_session => {
                return Err(anyhow::Error::new(MuxError::NotInSession)
                    .context("run execmux inside tmux or zellij, or pass --backend"));
            }
            None => MultiplexerKind::Tmux,
        },
    };
    tracing::debug!(%kind, "using multiplexer");
    Ok(Arc::from(backend_for(kind, &options)))
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("not inside a terminal multiplexer session")]
    NotInSession,

    #[error("{program} failed (exit {code}): {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{0} not found in PATH")]
    NotFound(String),

    #[error("pane not found: {0}")]
    PaneNotFound(String),

    #[error("{backend} does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("parse error at line {line_num}: {detail}")]
    Parse { line_num: usize, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MuxError {
    /// True when the failure means the target pane no longer exists.
    pub fn is_pane_gone(&self) -> bool {
        match self {
            Self::PaneNotFound(_) => true,
            Self::CommandFailed { stderr, .. } => {
                stderr.contains("can't find pane") || stderr.contains("can't find window")
            }
            _ => false,
        }
    }
}

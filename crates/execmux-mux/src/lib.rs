//! execmux-mux: terminal multiplexer IO boundary.
//!
//! One [`Multiplexer`] implementation per product (tmux, zellij), all
//! driven through a [`CommandRunner`] so tests can script the CLI.

pub mod capture;
pub mod error;
pub mod executor;
pub mod keys;
pub mod multiplexer;
pub mod pane_info;
pub mod process;
pub mod tmux;
pub mod zellij;

pub use error::MuxError;
pub use executor::{CommandRunner, ProcessRunner};
pub use keys::{KeySegment, SpecialKey};
pub use multiplexer::{
    BackendOptions, ClearOutcome, Multiplexer, MultiplexerKind, backend_for, detect_kind,
};
pub use tmux::TmuxBackend;
pub use zellij::ZellijBackend;

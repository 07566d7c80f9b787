//! CLI definition using clap derive.

use clap::{Parser, Subcommand, ValueEnum};
use execmux_core::ShellDialect;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "execmux", version, about = "Run commands in a multiplexer pane for an AI agent")]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/execmux/config.toml)
    #[arg(long, global = true, env = "EXECMUX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Multiplexer to drive
    #[arg(long, global = true, env = "EXECMUX_BACKEND", value_enum)]
    pub backend: Option<BackendChoice>,

    /// tmux server socket path
    #[arg(long, global = true, env = "EXECMUX_TMUX_SOCKET_PATH")]
    pub tmux_socket: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    Auto,
    Tmux,
    Zellij,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShellChoice {
    Bash,
    Zsh,
    Fish,
}

impl From<ShellChoice> for ShellDialect {
    fn from(choice: ShellChoice) -> Self {
        match choice {
            ShellChoice::Bash => ShellDialect::Bash,
            ShellChoice::Zsh => ShellDialect::Zsh,
            ShellChoice::Fish => ShellDialect::Fish,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a command in the exec pane and print its record
    Exec(ExecOpts),
    /// Type text and key names (Enter, C-c, Up, ...) into the exec pane
    SendKeys(SendKeysOpts),
    /// Print a pane's scrollback
    Capture(CaptureOpts),
    /// Parse the exec pane's scrollback into command records
    History(HistoryOpts),
    /// Classify a command's risk without running it
    Classify(ClassifyOpts),
    /// List panes in the current window
    Panes,
    /// Render the current window for an AI collaborator
    Window(WindowOpts),
    /// Install the sentinel prompt in the exec pane
    Prepare(PrepareOpts),
    /// Clear a pane's screen and scrollback
    Clear(PaneOpts),
    /// Start a detached session
    NewSession(NewSessionOpts),
    /// Attach this terminal to a session
    Attach(AttachOpts),
}

#[derive(clap::Args)]
pub struct PaneOpts {
    /// Pane id (default: discover the exec pane)
    #[arg(long)]
    pub pane: Option<String>,
}

#[derive(clap::Args)]
pub struct ExecOpts {
    /// Seconds to wait for the command (default: config `command_timeout_secs`)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Type the command without pressing Enter
    #[arg(long)]
    pub no_enter: bool,

    /// Run even if the approval policy would ask first
    #[arg(long)]
    pub force: bool,

    /// Fail instead of running unstructured when no sentinel prompt can be installed
    #[arg(long)]
    pub require_prepared: bool,

    #[command(flatten)]
    pub target: PaneOpts,

    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(clap::Args)]
pub struct SendKeysOpts {
    /// Press Enter after each line
    #[arg(long)]
    pub enter: bool,

    #[command(flatten)]
    pub target: PaneOpts,

    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub keys: Vec<String>,
}

#[derive(clap::Args)]
pub struct CaptureOpts {
    #[command(flatten)]
    pub target: PaneOpts,

    /// Lines of scrollback to keep (default: config `max_capture_lines`)
    #[arg(long)]
    pub lines: Option<usize>,
}

#[derive(clap::Args)]
pub struct HistoryOpts {
    #[command(flatten)]
    pub target: PaneOpts,

    /// Only print the newest record
    #[arg(long)]
    pub last: bool,
}

#[derive(clap::Args)]
pub struct ClassifyOpts {
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(clap::Args)]
pub struct WindowOpts {
    /// Print chat messages (system prompt + snapshot + REQUEST) as JSON
    #[arg(long, value_name = "REQUEST")]
    pub messages: Option<String>,
}

#[derive(clap::Args)]
pub struct PrepareOpts {
    /// Shell dialect (default: detected from the pane's process)
    #[arg(long, value_enum)]
    pub shell: Option<ShellChoice>,

    #[command(flatten)]
    pub target: PaneOpts,
}

#[derive(clap::Args)]
pub struct NewSessionOpts {
    /// Command for the session's first pane
    pub command: Option<String>,
}

#[derive(clap::Args)]
pub struct AttachOpts {
    pub id: String,
}

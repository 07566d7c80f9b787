//! execmux: lets an AI agent run commands in a neighbouring terminal
//! multiplexer pane and read back structured results.

use clap::Parser;

mod backend;
mod cli;
mod cmd_classify;
mod cmd_exec;
mod cmd_pane;
mod config;
mod exec_pane;
mod window;

/// Filter precedence: `EXECMUX_LOG`, `RUST_LOG`, the config file, then warn.
fn init_tracing(config_level: &str) {
    let filter = std::env::var("EXECMUX_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| config_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let config = config::Config::load(args.config.as_deref())?;
    init_tracing(&config.log_level);

    let json = args.json;
    let open = |require_session: bool| {
        backend::open(args.backend, &config, args.tmux_socket.clone(), require_session)
    };

    let exit_code = match args.command {
        cli::Command::Exec(opts) => cmd_exec::cmd_exec(open(true)?, &config, opts, json).await?,
        cli::Command::SendKeys(opts) => {
            cmd_exec::cmd_send_keys(open(true)?, &config, opts).await?;
            0
        }
        cli::Command::Capture(opts) => {
            cmd_pane::cmd_capture(open(true)?, &config, opts, json).await?;
            0
        }
        cli::Command::History(opts) => {
            cmd_exec::cmd_history(open(true)?, &config, opts, json).await?;
            0
        }
        cli::Command::Classify(opts) => cmd_classify::cmd_classify(&config, opts, json)?,
        cli::Command::Panes => {
            cmd_pane::cmd_panes(open(true)?, json).await?;
            0
        }
        cli::Command::Window(opts) => {
            cmd_pane::cmd_window(open(true)?, &config, opts, json).await?;
            0
        }
        cli::Command::Prepare(opts) => cmd_exec::cmd_prepare(open(true)?, &config, opts, json).await?,
        cli::Command::Clear(opts) => {
            cmd_pane::cmd_clear(open(true)?, &config, opts, json).await?;
            0
        }
        cli::Command::NewSession(opts) => {
            cmd_pane::cmd_new_session(open(false)?, opts, json).await?;
            0
        }
        cli::Command::Attach(opts) => {
            cmd_pane::cmd_attach(open(false)?, opts).await?;
            0
        }
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

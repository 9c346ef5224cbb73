mod logging;
mod serve;

use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hookrun",
    about = "Receive push hooks and run the matching per-repository update action",
    version,
    disable_version_flag = true
)]
struct Cli {
    /// Address to listen on (`:8080` listens on all interfaces)
    #[arg(short = 'l', long, env = "HOOKRUN_LISTEN")]
    listen: Option<String>,

    /// Directory of update actions, one executable per `<owner>/<repo>`
    #[arg(short = 'g', long, env = "HOOKRUN_ACTIONS_DIR")]
    actions_dir: Option<PathBuf>,

    /// Kill an action after this many seconds (0 = never)
    #[arg(long, env = "HOOKRUN_ACTION_TIMEOUT", value_name = "SECS")]
    action_timeout: Option<u64>,

    /// Seconds to wait for running updates on shutdown (0 = abandon them)
    #[arg(long, env = "HOOKRUN_SHUTDOWN_GRACE", value_name = "SECS")]
    shutdown_grace: Option<u64>,

    /// YAML config file; flags and environment override its values
    #[arg(long, env = "HOOKRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (RUST_LOG replaces it when set)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Print version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(logging::env_filter(
            std::env::var("RUST_LOG").ok().as_deref(),
            cli.log_level,
        ))
        .with_target(false)
        .init();

    let overrides = serve::Overrides {
        listen: cli.listen,
        actions_dir: cli.actions_dir,
        action_timeout_secs: cli.action_timeout,
        shutdown_grace_secs: cli.shutdown_grace,
    };

    let result = serve::resolve_config(cli.config.as_deref(), overrides).and_then(serve::run);

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

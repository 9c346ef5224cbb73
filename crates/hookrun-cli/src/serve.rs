use anyhow::{bail, Context, Result};
use hookrun_core::config::{Config, WarnLevel};
use hookrun_server::AppState;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Values given on the command line or through the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub actions_dir: Option<PathBuf>,
    pub action_timeout_secs: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
}

/// Defaults, then the config file if given, then overrides.
pub fn resolve_config(path: Option<&Path>, overrides: Overrides) -> Result<Config> {
    let mut config = match path {
        Some(p) => Config::load(p).with_context(|| format!("loading {}", p.display()))?,
        None => Config::default(),
    };

    if let Some(listen) = overrides.listen {
        config.listen = listen;
    }
    if let Some(dir) = overrides.actions_dir {
        config.actions_dir = dir;
    }
    if let Some(secs) = overrides.action_timeout_secs {
        config.action_timeout_secs = Some(secs);
    }
    if let Some(secs) = overrides.shutdown_grace_secs {
        config.shutdown_grace_secs = secs;
    }

    Ok(config)
}

pub fn run(config: Config) -> Result<()> {
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Error => bail!("{}", warning.message),
            WarnLevel::Warning => warn!("{}", warning.message),
        }
    }
    let addr = config.listen_addr()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        info!(
            version = VERSION,
            actions_dir = %config.actions_dir.display(),
            "started"
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot listen on {addr}"))?;

        let shutdown = CancellationToken::new();
        tokio::spawn(cancel_on_signal(shutdown.clone()));

        let state = AppState::from_config(&config);
        hookrun_server::serve_on(
            listener,
            state,
            async move { shutdown.cancelled().await },
            config.shutdown_grace(),
        )
        .await?;

        info!(version = VERSION, "finished");
        Ok(())
    })
}

async fn cancel_on_signal(token: CancellationToken) {
    match wait_for_signal().await {
        Ok(name) => info!(signal = name, "got signal, shutting down"),
        Err(e) => {
            warn!(error = %e, "cannot install signal handlers, falling back to ctrl-c");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for ctrl-c");
                return;
            }
        }
    }
    token.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = hangup.recv() => "SIGHUP",
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

//! Execution of the per-repository update action.
//!
//! An action is an executable at `<actions_dir>/<owner>/<name>`. It runs
//! with no arguments, a null stdin and the inherited environment. Its working
//! directory is the actions directory itself, so relative paths inside the
//! action resolve against `<actions_dir>`, not against the directory hookrun
//! was started from. Output is forwarded line by line to the log at debug
//! level; only the exit status decides success.
//!
//! On unix each action leads its own process group. A timed-out or cancelled
//! run kills the whole group, so nothing the action started outlives it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::error::{HookError, Result};

/// What a finished action run looked like.
#[derive(Debug, Clone)]
pub struct ActionReport {
    pub path: PathBuf,
    pub elapsed: Duration,
}

/// Something that can perform the update for a repository.
///
/// Errors are [`HookError::ActionNotFound`] when nothing is configured for the
/// repository, and [`HookError::ExecutionFailed`] or
/// [`HookError::ActionTimedOut`] when the run itself failed.
pub trait ActionRunner: Send + Sync + 'static {
    fn run<'a>(&'a self, repository_id: &'a str) -> BoxFuture<'a, Result<ActionReport>>;
}

// ---------------------------------------------------------------------------
// ScriptRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScriptRunner {
    actions_dir: PathBuf,
    timeout: Option<Duration>,
}

impl ScriptRunner {
    pub fn new(actions_dir: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            actions_dir: actions_dir.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.actions_dir.clone(), config.action_timeout())
    }

    pub fn actions_dir(&self) -> &Path {
        &self.actions_dir
    }

    pub fn action_path(&self, repository_id: &str) -> PathBuf {
        self.actions_dir.join(repository_id)
    }

    async fn execute(&self, repository_id: &str) -> Result<ActionReport> {
        let path = self.action_path(repository_id);

        match tokio::fs::metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HookError::ActionNotFound(path));
            }
            Err(e) => {
                return Err(HookError::ExecutionFailed {
                    path,
                    reason: format!("cannot stat action: {e}"),
                });
            }
        }

        let start = Instant::now();
        let mut cmd = Command::new(&path);
        cmd.current_dir(&self.actions_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| HookError::ExecutionFailed {
            path: path.clone(),
            reason: format!("failed to spawn: {e}"),
        })?;
        let group = ProcessGroup {
            leader: child.id(),
        };

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, repository_id.to_string(), "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, repository_id.to_string(), "stderr");
        }

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    drop(group);
                    if let Err(e) = child.kill().await {
                        debug!(error = %e, "kill after timeout failed");
                    }
                    return Err(HookError::ActionTimedOut {
                        path,
                        timeout: limit,
                    });
                }
            },
            None => child.wait().await,
        };
        group.disarm();

        let status = waited.map_err(|e| HookError::ExecutionFailed {
            path: path.clone(),
            reason: format!("wait failed: {e}"),
        })?;

        if !status.success() {
            return Err(HookError::ExecutionFailed {
                path,
                reason: format!("exited with {status}"),
            });
        }

        Ok(ActionReport {
            path,
            elapsed: start.elapsed(),
        })
    }
}

impl ActionRunner for ScriptRunner {
    fn run<'a>(&'a self, repository_id: &'a str) -> BoxFuture<'a, Result<ActionReport>> {
        Box::pin(self.execute(repository_id))
    }
}

/// Kills the action's process group when dropped, unless disarmed after the
/// action exited on its own.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    leader: Option<u32>,
}

impl ProcessGroup {
    fn disarm(mut self) {
        self.leader = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(leader) = self.leader.take() {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Err(e) = killpg(Pid::from_raw(leader as i32), Signal::SIGKILL) {
                debug!(pgid = leader, error = %e, "killing process group failed");
            }
        }
    }
}

/// Log each line of a child pipe until it closes. Not awaited: a script that
/// backgrounds a process holding the pipe open must not stall the run.
fn forward_lines<R>(pipe: R, repository_id: String, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(repository = %repository_id, stream, "{line}");
        }
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_action(dir: &TempDir, repository_id: &str, script: &str) -> PathBuf {
        let path = dir.path().join(repository_id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn successful_action_reports_path() {
        let dir = TempDir::new().unwrap();
        let expected = write_action(&dir, "org/repo", "echo updated");
        let runner = ScriptRunner::new(dir.path(), None);

        let report = runner.run("org/repo").await.unwrap();
        assert_eq!(report.path, expected);
    }

    #[tokio::test]
    async fn action_runs_in_actions_dir() {
        let dir = TempDir::new().unwrap();
        write_action(&dir, "org/repo", "pwd > ran-here");
        let runner = ScriptRunner::new(dir.path(), None);

        runner.run("org/repo").await.unwrap();
        assert!(dir.path().join("ran-here").exists());
    }

    #[tokio::test]
    async fn missing_action_is_not_found() {
        let dir = TempDir::new().unwrap();
        let runner = ScriptRunner::new(dir.path(), None);

        let err = runner.run("org/absent").await.unwrap_err();
        assert!(
            matches!(err, HookError::ActionNotFound(ref p) if p == &dir.path().join("org/absent"))
        );
    }

    #[tokio::test]
    async fn non_zero_exit_is_execution_failure() {
        let dir = TempDir::new().unwrap();
        write_action(&dir, "org/repo", "exit 3");
        let runner = ScriptRunner::new(dir.path(), None);

        let err = runner.run("org/repo").await.unwrap_err();
        match err {
            HookError::ExecutionFailed { reason, .. } => {
                assert!(reason.contains('3'), "unexpected reason: {reason}")
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_executable_action_fails_to_spawn() {
        let dir = TempDir::new().unwrap();
        let path = write_action(&dir, "org/repo", "true");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        let runner = ScriptRunner::new(dir.path(), None);

        let err = runner.run("org/repo").await.unwrap_err();
        assert!(matches!(err, HookError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn hung_action_is_killed_after_timeout() {
        let dir = TempDir::new().unwrap();
        write_action(&dir, "org/repo", "sleep 30");
        let runner = ScriptRunner::new(dir.path(), Some(Duration::from_millis(200)));

        let started = Instant::now();
        let err = runner.run("org/repo").await.unwrap_err();
        assert!(matches!(err, HookError::ActionTimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn timeout_kills_processes_started_by_the_action() {
        let dir = TempDir::new().unwrap();
        write_action(
            &dir,
            "org/repo",
            "sh -c 'sleep 1; echo still-running > late.log'",
        );
        let runner = ScriptRunner::new(dir.path(), Some(Duration::from_millis(200)));

        let err = runner.run("org/repo").await.unwrap_err();
        assert!(matches!(err, HookError::ActionTimedOut { .. }));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("late.log").exists());
    }

    #[tokio::test]
    async fn timeout_kills_backgrounded_processes() {
        let dir = TempDir::new().unwrap();
        write_action(
            &dir,
            "org/repo",
            "(sleep 1; echo still-running > late.log) &\nsleep 30",
        );
        let runner = ScriptRunner::new(dir.path(), Some(Duration::from_millis(200)));

        let err = runner.run("org/repo").await.unwrap_err();
        assert!(matches!(err, HookError::ActionTimedOut { .. }));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("late.log").exists());
    }

    #[tokio::test]
    async fn cancelled_run_kills_the_action() {
        let dir = TempDir::new().unwrap();
        write_action(&dir, "org/repo", "sleep 1\necho still-running > late.log");
        let runner = ScriptRunner::new(dir.path(), None);

        let cancelled =
            tokio::time::timeout(Duration::from_millis(200), runner.run("org/repo")).await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("late.log").exists());
    }
}

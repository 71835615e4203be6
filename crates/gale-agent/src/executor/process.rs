//! Process management for the exec build command.
//!
//! Spawns the child with the OS environment overlaid by the job's exported
//! variables, pipes stdout and stderr line-by-line into the console, and
//! honors cancellation with a terminate-then-kill sequence.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::console::Console;

/// Grace period between the terminate signal and the hard kill when a job is
/// cancelled.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One subprocess invocation.
#[derive(Debug)]
pub struct ExecRequest<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    /// Variables layered on top of the OS environment.
    pub env: &'a HashMap<String, String>,
    pub working_dir: &'a Path,
}

/// Run a subprocess, streaming its combined stdout/stderr into `console`.
///
/// Returns `Ok(true)` iff the child exits with status zero. A cancellation
/// terminates the child and reports failure.
pub async fn run(
    request: ExecRequest<'_>,
    console: &Console,
    cancel: &CancellationToken,
) -> Result<bool, ExecError> {
    debug!("spawning '{}' in {:?}", request.program, request.working_dir);

    let mut child = Command::new(request.program)
        .args(request.args)
        .envs(request.env)
        .current_dir(request.working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ExecError::Spawn {
            program: request.program.to_string(),
            source,
        })?;

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(stdout, console.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(stderr, console.clone())));
    }

    let success = tokio::select! {
        status = child.wait() => status?.success(),
        _ = cancel.cancelled() => {
            terminate(&mut child).await;
            false
        }
    };

    // The readers finish once the pipes close.
    for reader in readers {
        let _ = reader.await;
    }

    Ok(success)
}

async fn forward_lines<R>(stream: R, console: Console)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        console.write(&line);
    }
}

/// Ask the child to exit, then kill it if it ignores the request.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        debug!("sending SIGTERM to pid {pid}");
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!("SIGTERM failed: {e}");
        }
        if tokio::time::timeout(TERMINATE_GRACE, child.wait())
            .await
            .is_ok()
        {
            return;
        }
        warn!("child ignored SIGTERM, killing");
    }

    if let Err(e) = child.kill().await {
        warn!("kill failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ConsoleConfig;

    fn test_console() -> Console {
        // Flush target is unreachable; delivery is best-effort and these
        // tests only assert exit semantics.
        Console::new(
            reqwest::Client::new(),
            ConsoleConfig::new("http://127.0.0.1:1/console"),
        )
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let env = HashMap::new();
        let request = ExecRequest {
            program: "true",
            args: &[],
            env: &env,
            working_dir: Path::new("/"),
        };
        let ok = run(request, &test_console(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let env = HashMap::new();
        let request = ExecRequest {
            program: "false",
            args: &[],
            env: &env,
            working_dir: Path::new("/"),
        };
        let ok = run(request, &test_console(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let env = HashMap::new();
        let request = ExecRequest {
            program: "definitely-not-a-real-program",
            args: &[],
            env: &env,
            working_dir: Path::new("/"),
        };
        let result = run(request, &test_console(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(ExecError::Spawn { .. })));
    }

    #[tokio::test]
    async fn cancellation_terminates_the_child() {
        let env = HashMap::new();
        let args = vec!["30".to_string()];
        let request = ExecRequest {
            program: "sleep",
            args: &args,
            env: &env,
            working_dir: Path::new("/"),
        };
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let ok = run(request, &test_console(), &cancel).await.unwrap();
        assert!(!ok);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn environment_overlay_reaches_the_child() {
        let mut env = HashMap::new();
        env.insert("GALE_EXEC_TEST_VAR".to_string(), "overlay".to_string());
        let args = vec!["-c".to_string(), "test \"$GALE_EXEC_TEST_VAR\" = overlay".to_string()];
        let request = ExecRequest {
            program: "sh",
            args: &args,
            env: &env,
            working_dir: Path::new("/"),
        };
        let ok = run(request, &test_console(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(ok);
    }
}

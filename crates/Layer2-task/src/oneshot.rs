//! One-shot external commands
//!
//! For commands with no lifecycle to manage (driver queries, media inspection,
//! archive tools): run to completion with a deadline, capture stdout and
//! stderr separately. Nothing is registered and nothing can be cancelled,
//! so nothing the command spawned is allowed to outlive the call.

use crate::error::{SupervisorError, SupervisorResult};
use crate::process::launcher::build_command;
use crate::process::{exit_code_of, resolve_program, signal_group, CommandSpec};
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Captured result of a one-shot command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneShotOutput {
    pub exit_code: i32,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Run `spec` to completion, killing its process group after `timeout`
pub async fn run_oneshot(spec: &CommandSpec, timeout: Duration) -> SupervisorResult<OneShotOutput> {
    let program = resolve_program(spec)?;

    let mut cmd = build_command(&program, spec);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let started = Instant::now();
    let child = cmd
        .spawn()
        .map_err(|e| SupervisorError::from_spawn(e, &spec.program))?;
    let pid = child.id();

    debug!("Running one-shot {} (pid {:?})", spec.display(), pid);

    let result = tokio::time::timeout(timeout, child.wait_with_output()).await;

    // background leftovers of a finished command, or the whole group on timeout
    if let Some(pid) = pid {
        if let Ok(true) = signal_group(pid, Signal::SIGKILL) {
            debug!("Killed leftover processes of one-shot {}", spec.display());
        }
    }

    match result {
        Ok(Ok(output)) => {
            let exit_code = exit_code_of(output.status);
            Ok(OneShotOutput {
                exit_code,
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration: started.elapsed(),
            })
        }
        Ok(Err(e)) => Err(SupervisorError::Io(e)),
        Err(_) => {
            warn!(
                "One-shot {} exceeded {:.1}s, killed",
                spec.display(),
                timeout.as_secs_f64()
            );
            Err(SupervisorError::Timeout(timeout.as_secs_f64()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StartErrorKind;
    use crate::process::process_exists;

    #[tokio::test]
    async fn test_separate_streams() {
        let spec = CommandSpec::shell("echo hi; echo oops 1>&2; exit 2");
        let output = run_oneshot(&spec, Duration::from_secs(5)).await.unwrap();

        assert_eq!(output.exit_code, 2);
        assert!(!output.success);
        assert_eq!(output.stdout, "hi\n");
        assert_eq!(output.stderr, "oops\n");
    }

    #[tokio::test]
    async fn test_timeout() {
        let spec = CommandSpec::shell("sleep 5");
        let started = Instant::now();
        let err = run_oneshot(&spec, Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(matches!(err, SupervisorError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_background_leftovers_are_killed() {
        let spec = CommandSpec::shell("sleep 30 >/dev/null 2>&1 & echo $!");
        let output = run_oneshot(&spec, Duration::from_secs(5)).await.unwrap();
        let leftover: u32 = output.stdout.trim().parse().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while process_exists(leftover) {
            assert!(Instant::now() < deadline, "pid {} survived", leftover);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_oneshot(&CommandSpec::new("/no/such/tool"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.start_kind(), Some(StartErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.txt"), "payload").unwrap();

        let spec = CommandSpec::shell("cat input.txt; printf \" $STAGE\"")
            .working_dir(dir.path())
            .env("STAGE", "inspect");
        let output = run_oneshot(&spec, Duration::from_secs(5)).await.unwrap();

        assert!(output.success);
        assert_eq!(output.stdout, "payload inspect");
    }
}

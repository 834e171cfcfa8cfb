//! Job commands: run-and-watch and one-shot execution

use anyhow::Result;
use overseer_task::{
    run_oneshot, CommandSpec, Supervisor, SupervisorError, TaskId, TaskSnapshot, TaskState,
};
use std::io::Write;
use std::time::Duration;
use tracing::info;

/// Exit code reported for a job cancelled from the terminal
const INTERRUPTED_EXIT: i32 = 130;

/// Exit code reported when a one-shot command hits its deadline
const TIMEOUT_EXIT: i32 = 124;

/// Start a job and poll it until it ends, streaming new output.
///
/// Ctrl-C cancels the job. Returns the exit code the process should use.
pub async fn run_job(
    supervisor: &Supervisor,
    category: &str,
    command: Option<CommandSpec>,
    json: bool,
) -> Result<i32> {
    let id = match command {
        Some(command) => supervisor.start(category, command).await?,
        None => supervisor.start_configured(category).await?,
    };

    let interval = supervisor.config().poll_interval();
    let mut written = 0;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let snapshot = loop {
        let snapshot = supervisor.status(id).await?;
        if !json {
            written += stream_output(supervisor, id, written, snapshot.is_terminal()).await?;
        }
        if snapshot.is_terminal() {
            break snapshot;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = &mut ctrl_c => {
                result?;
                info!("Interrupted, cancelling task {}", id);
                let snapshot = supervisor.cancel(id).await?;
                if !json {
                    stream_output(supervisor, id, written, true).await?;
                }
                break snapshot;
            }
        }
    };

    let code = exit_code_for(&snapshot);
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        eprintln!(
            "{} {} {} (exit code {})",
            snapshot.state.symbol(),
            snapshot.id,
            snapshot.state,
            code
        );
    }

    Ok(code)
}

/// Run a one-shot command and relay its streams
pub async fn exec(command: &CommandSpec, timeout: Duration, json: bool) -> Result<i32> {
    let output = match run_oneshot(command, timeout).await {
        Ok(output) => output,
        Err(SupervisorError::Timeout(secs)) => {
            eprintln!("{} timed out after {:.1}s", command.display(), secs);
            return Ok(TIMEOUT_EXIT);
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        std::io::stdout().write_all(output.stdout.as_bytes())?;
        std::io::stderr().write_all(output.stderr.as_bytes())?;
    }

    Ok(output.exit_code)
}

/// Copy output appended since byte `written` to stdout; returns bytes copied
async fn stream_output(
    supervisor: &Supervisor,
    id: TaskId,
    written: usize,
    finished: bool,
) -> Result<usize> {
    let fresh = supervisor.output_since(id, written).await?;
    let mut stdout = std::io::stdout().lock();
    Ok(write_complete(&mut stdout, &fresh, finished)?)
}

/// Write `fresh` up to its last complete UTF-8 character.
///
/// A character split across two drains is held back until its remaining
/// bytes arrive; once `finished`, everything is written. Bytes that can
/// never form valid UTF-8 are passed through as they are.
fn write_complete(out: &mut impl Write, fresh: &[u8], finished: bool) -> std::io::Result<usize> {
    let len = match std::str::from_utf8(fresh) {
        Err(e) if !finished && e.error_len().is_none() => e.valid_up_to(),
        _ => fresh.len(),
    };
    if len == 0 {
        return Ok(0);
    }

    out.write_all(&fresh[..len])?;
    out.flush()?;
    Ok(len)
}

fn exit_code_for(snapshot: &TaskSnapshot) -> i32 {
    match snapshot.state {
        TaskState::Cancelled => INTERRUPTED_EXIT,
        TaskState::Completed => 0,
        _ => snapshot.exit_code.filter(|code| *code != 0).unwrap_or(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overseer_foundation::SupervisorConfig;

    async fn finished(script: &str) -> TaskSnapshot {
        let supervisor = Supervisor::new(SupervisorConfig::default().with_poll_interval_ms(10));
        let id = supervisor
            .start("generation", CommandSpec::shell(script))
            .await
            .unwrap();
        for _ in 0..500 {
            let snapshot = supervisor.status(id).await.unwrap();
            if snapshot.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task did not finish");
    }

    #[tokio::test]
    async fn test_exit_codes() {
        assert_eq!(exit_code_for(&finished("exit 0").await), 0);
        assert_eq!(exit_code_for(&finished("exit 4").await), 4);
    }

    #[tokio::test]
    async fn test_cancelled_exit_code() {
        let supervisor = Supervisor::default();
        let id = supervisor
            .start("training", CommandSpec::shell("sleep 30"))
            .await
            .unwrap();
        let snapshot = supervisor.cancel(id).await.unwrap();
        assert_eq!(exit_code_for(&snapshot), INTERRUPTED_EXIT);
    }

    #[test]
    fn test_split_character_is_held_back() {
        // successive views of one growing output buffer
        let polls: [&[u8]; 3] = [b"x\xC3", b"x\xC3\xA9y", b"x\xC3\xA9yz"];
        let mut sink = Vec::new();
        let mut written = 0;

        for output in polls {
            written += write_complete(&mut sink, &output[written..], false).unwrap();
        }

        assert_eq!(written, 5);
        assert_eq!(String::from_utf8(sink).unwrap(), "xéyz");
    }

    #[test]
    fn test_finished_output_is_flushed_whole() {
        let mut sink = Vec::new();
        assert_eq!(write_complete(&mut sink, b"tail\xC3", false).unwrap(), 4);
        assert_eq!(write_complete(&mut sink, b"\xC3", true).unwrap(), 1);
        assert_eq!(sink, b"tail\xC3");
    }

    #[test]
    fn test_invalid_bytes_pass_through() {
        let mut sink = Vec::new();
        assert_eq!(write_complete(&mut sink, b"a\xFFb", false).unwrap(), 3);
        assert_eq!(sink, b"a\xFFb");
    }

    #[tokio::test]
    async fn test_stream_output_follows_the_buffer() {
        let supervisor = Supervisor::new(SupervisorConfig::default().with_poll_interval_ms(10));
        let id = supervisor
            .start("generation", CommandSpec::shell("printf abc"))
            .await
            .unwrap();
        loop {
            if supervisor.status(id).await.unwrap().is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(stream_output(&supervisor, id, 0, true).await.unwrap(), 3);
        // nothing new past the end
        assert_eq!(stream_output(&supervisor, id, 3, true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exec_timeout_exit_code() {
        let code = exec(&CommandSpec::shell("sleep 5"), Duration::from_millis(100), false)
            .await
            .unwrap();
        assert_eq!(code, TIMEOUT_EXIT);
    }
}

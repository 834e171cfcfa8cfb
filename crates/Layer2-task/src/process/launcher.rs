//! Process launcher - spawns a command in its own process group
//!
//! Features:
//! - Preflight checks (program exists, is executable, working dir exists)
//! - New process group so one signal reaches every descendant
//! - stdout and stderr merged into a single ordered stream

use crate::error::{StartErrorKind, SupervisorError, SupervisorResult};
use crate::process::command::CommandSpec;
use crate::process::output::{combined_pipe, OutputStream};
use crate::process::signal::{group_exists, signal_group};
use nix::sys::signal::Signal;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::debug;

/// A spawned process, owned by exactly one task
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,

    /// OS pid; also the process group id
    pid: u32,

    output: OutputStream,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn output_mut(&mut self) -> &mut OutputStream {
        &mut self.output
    }

    /// Non-blocking exit check; reaps the process when it has exited
    pub fn try_exit(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for exit without bound
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Signal the whole process group; `Ok(false)` if it is already gone
    pub fn signal_group(&self, signal: Signal) -> nix::Result<bool> {
        signal_group(self.pid, signal)
    }

    /// Whether anything is left in the process group, leader or descendants
    pub fn group_alive(&self) -> bool {
        group_exists(self.pid)
    }
}

/// Resolve and validate the program without spawning anything
pub fn resolve_program(spec: &CommandSpec) -> SupervisorResult<PathBuf> {
    if let Some(dir) = &spec.working_dir {
        if !dir.is_dir() {
            return Err(SupervisorError::start(
                StartErrorKind::NotFound,
                format!("working directory {} does not exist", dir.display()),
            ));
        }
    }

    if spec.program.contains('/') {
        let path = Path::new(&spec.program);
        let metadata = std::fs::metadata(path)
            .map_err(|e| SupervisorError::from_spawn(e, &spec.program))?;

        if metadata.is_dir() || metadata.permissions().mode() & 0o111 == 0 {
            return Err(SupervisorError::start(
                StartErrorKind::PermissionDenied,
                format!("{} is not executable", spec.program),
            ));
        }
        return Ok(path.to_path_buf());
    }

    let cwd = match &spec.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let search_path = spec
        .env
        .get("PATH")
        .cloned()
        .or_else(|| std::env::var("PATH").ok());

    which::which_in(&spec.program, search_path, cwd).map_err(|_| {
        SupervisorError::start(
            StartErrorKind::NotFound,
            format!("{} not found in PATH", spec.program),
        )
    })
}

/// Build a `Command` with the spec's arguments, directory and environment,
/// placed in a new process group
pub(crate) fn build_command(program: &Path, spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .process_group(0)
        .kill_on_drop(true);

    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }
    cmd
}

/// Spawn `spec` with stdout and stderr merged into one stream
pub fn launch(spec: &CommandSpec) -> SupervisorResult<ProcessHandle> {
    let program = resolve_program(spec)?;

    let (read_end, write_end) = combined_pipe()
        .map_err(|e| SupervisorError::start(StartErrorKind::SpawnFailed, e.to_string()))?;
    let stderr_end = write_end
        .try_clone()
        .map_err(|e| SupervisorError::start(StartErrorKind::SpawnFailed, e.to_string()))?;
    let output = OutputStream::new(read_end)
        .map_err(|e| SupervisorError::start(StartErrorKind::SpawnFailed, e.to_string()))?;

    let child = {
        let mut cmd = build_command(&program, spec);
        cmd.stdout(Stdio::from(write_end))
            .stderr(Stdio::from(stderr_end));
        cmd.spawn()
            .map_err(|e| SupervisorError::from_spawn(e, &spec.program))?
        // `cmd` drops here, closing our copies of the write end so that
        // EOF arrives once the process group is gone
    };

    let pid = child.id().ok_or_else(|| {
        SupervisorError::start(StartErrorKind::SpawnFailed, "process exited before it got a pid")
    })?;

    debug!("Launched {} as pid {}", spec.display(), pid);

    Ok(ProcessHandle { child, pid, output })
}

//! Overseer CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use overseer_foundation::SupervisorConfig;
use overseer_task::{CommandSpec, Supervisor, SupervisorError};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code for requests the supervisor refused (busy category, unknown id...)
const USAGE_EXIT: i32 = 2;

/// Overseer - run long-running jobs in the background and keep an eye on them
#[derive(Parser, Debug)]
#[command(name = "overseer")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Print the final task snapshot as JSON instead of streaming output
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a command as the job of a category
    Run {
        /// Category the job belongs to (e.g. generation, training)
        category: String,

        /// Working directory for the job
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Extra environment variable, KEY=VALUE (repeatable)
        #[arg(long = "env", value_parser = parse_env)]
        env: Vec<(String, String)>,

        /// Program and arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Run the command configured for a category
    Job {
        /// Configured category
        category: String,
    },
    /// Run a short command to completion with a deadline
    Exec {
        /// Seconds before the command is killed
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Program and arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout belongs to job output
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Load configuration
    let config = SupervisorConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        SupervisorConfig::default()
    });

    let code = match run(args, config).await {
        Ok(code) => code,
        Err(e) => match usage_exit_code(&e) {
            Some(code) => {
                eprintln!("overseer: {}", e);
                code
            }
            None => return Err(e),
        },
    };

    std::process::exit(code);
}

async fn run(args: Args, config: SupervisorConfig) -> anyhow::Result<i32> {
    let code = match args.command {
        Command::Run {
            category,
            cwd,
            env,
            command,
        } => {
            let spec = build_spec(command, cwd, env);
            let supervisor = Supervisor::new(config);
            cli::run_job(&supervisor, &category, Some(spec), args.json).await?
        }
        Command::Job { category } => {
            let supervisor = Supervisor::new(config);
            cli::run_job(&supervisor, &category, None, args.json).await?
        }
        Command::Exec { timeout, command } => {
            let spec = build_spec(command, None, Vec::new());
            cli::exec(&spec, Duration::from_secs(timeout), args.json).await?
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            0
        }
    };

    Ok(code)
}

/// Short exit for errors the caller can fix; others get the full report
fn usage_exit_code(err: &anyhow::Error) -> Option<i32> {
    err.downcast_ref::<SupervisorError>()
        .filter(|e| e.is_user_facing())
        .map(|_| USAGE_EXIT)
}

/// Turn `program arg...` plus options into a command spec
fn build_spec(
    command: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
) -> CommandSpec {
    let mut parts = command.into_iter();
    let program = parts.next().unwrap_or_default();
    let mut spec = CommandSpec::new(program).args(parts);
    if let Some(dir) = cwd {
        spec = spec.working_dir(dir);
    }
    for (key, value) in env {
        spec = spec.env(key, value);
    }
    spec
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

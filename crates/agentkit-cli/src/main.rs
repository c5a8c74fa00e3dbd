use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod completion;
mod dispatch;
mod render;

use completion::CliCompletionShell;
use dispatch::{run_cli, CommandOutcome};

#[derive(Parser, Debug)]
#[command(name = "agentkit")]
#[command(about = "Transactional installer for AI coding-agent configuration", long_about = None)]
struct Cli {
    /// Directory agent configuration paths are resolved against.
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,
    /// Where snapshots are kept.
    #[arg(long, global = true, value_name = "DIR")]
    state_dir: Option<PathBuf>,
    /// TOML catalog used instead of the built-in one.
    #[arg(long, global = true, value_name = "FILE")]
    catalog: Option<PathBuf>,
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve a selection and print what install would do.
    Plan {
        #[command(flatten)]
        selection: SelectionArgs,
        #[arg(long)]
        json: bool,
    },
    /// Snapshot the affected files, apply the selection, roll back on failure.
    Install {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Print the plan and exit without touching disk.
        #[arg(long)]
        dry_run: bool,
        /// Leave partial changes in place when a step fails.
        #[arg(long)]
        no_rollback: bool,
        /// Run every apply step and report all failures together.
        #[arg(long)]
        keep_going: bool,
        #[arg(long)]
        json: bool,
    },
    /// Put files back the way a stored snapshot captured them.
    Restore {
        /// Snapshot id; defaults to the newest.
        #[arg(long)]
        snapshot: Option<String>,
    },
    /// List stored snapshots, oldest first.
    Snapshots {
        #[arg(long)]
        json: bool,
    },
    /// Print a shell completion script.
    Completions {
        /// Defaults to the shell named by $SHELL.
        #[arg(value_enum)]
        shell: Option<CliCompletionShell>,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct SelectionArgs {
    #[arg(long = "agent", value_name = "AGENT", value_delimiter = ',')]
    agents: Vec<String>,
    #[arg(long = "component", value_name = "COMPONENT", value_delimiter = ',')]
    components: Vec<String>,
    /// Package manager to install agents with instead of the detected one.
    #[arg(long, value_name = "NAME")]
    package_manager: Option<String>,
    /// Only touch configuration files; leave agent binaries alone.
    #[arg(long)]
    skip_install: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_cli(cli) {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            eprintln!("error: {err:#}");
            CommandOutcome::Failed.exit_code()
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn default_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

#[cfg(test)]
mod tests;

//! Command-line interface
//!
//! - `run`: execute a pipeline definition for a trigger event
//! - `check`: validate a definition without executing it
//! - `plan`: print the execution waves of a definition
//! - `completions`: generate shell completions
//!
//! Exit codes of `run`: 0 when the pipeline succeeded (or the trigger
//! did not match and there was nothing to do), 1 when a job failed or
//! the run was cancelled, 2 for definition errors.

pub mod check;
pub mod completions;
pub mod plan;
pub mod run;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

use conveyor::pipeline::{PipelineStatus, TriggerEvent};

/// CLI arguments for conveyor
#[derive(Parser, Debug)]
#[command(name = "conveyor")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a pipeline definition for a trigger event
    Run {
        /// Definition file to execute
        definition: PathBuf,
        /// Event kind that triggered the run
        #[arg(long, value_enum)]
        event: EventArg,
        /// Branch the event refers to
        #[arg(long)]
        branch: String,
        /// Worker pool size
        #[arg(long)]
        workers: Option<usize>,
        /// Default step timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Workspace root directory
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Validate a pipeline definition
    Check {
        /// Definition file to validate
        definition: PathBuf,
    },

    /// Show the execution waves of a definition
    Plan {
        /// Definition file to plan
        definition: PathBuf,
        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<PlanFormat>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
enum EventArg {
    Push,
    PullRequest,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum PlanFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Maps the run outcome to the process exit code
fn exit_code_for(status: PipelineStatus) -> u8 {
    match status {
        PipelineStatus::Succeeded | PipelineStatus::NotTriggered => 0,
        PipelineStatus::Failed | PipelineStatus::Cancelled => 1,
    }
}

/// Parse and execute CLI arguments
pub fn run() -> Result<ExitCode> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            definition,
            event,
            branch,
            workers,
            timeout,
            workspace,
        } => {
            let event = match event {
                EventArg::Push => TriggerEvent::push(branch),
                EventArg::PullRequest => TriggerEvent::pull_request(branch),
            };
            run::execute(&definition, &event, workers, timeout, workspace)
        }
        Command::Check { definition } => check::execute(&definition),
        Command::Plan { definition, format } => {
            let format = match format {
                Some(PlanFormat::Json) => plan::OutputFormat::Json,
                Some(PlanFormat::Text) | None => plan::OutputFormat::Text,
            };
            plan::execute(&definition, format)
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell, &mut Args::command());
            if let Some(path) = output {
                std::fs::write(&path, completions)?;
            } else {
                println!("{completions}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code_for(PipelineStatus::Succeeded), 0);
        assert_eq!(exit_code_for(PipelineStatus::NotTriggered), 0);
        assert_eq!(exit_code_for(PipelineStatus::Failed), 1);
        assert_eq!(exit_code_for(PipelineStatus::Cancelled), 1);
    }

    #[test]
    fn test_args_parse_run() {
        let args = Args::try_parse_from([
            "conveyor",
            "run",
            "pipeline.yml",
            "--event",
            "push",
            "--branch",
            "main",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::Run { event: EventArg::Push, ref branch, .. } if branch == "main"
        ));
    }

    #[test]
    fn test_args_require_event_and_branch() {
        assert!(Args::try_parse_from(["conveyor", "run", "pipeline.yml"]).is_err());
    }

    #[test]
    fn test_verify_cli() {
        Args::command().debug_assert();
    }
}

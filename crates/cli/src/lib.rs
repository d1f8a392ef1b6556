pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "hrdesk",
    about = "Hrdesk operator CLI",
    long_about = "Inspect configuration, run readiness checks, and manage policy documents \
                  for a running hrdesk-server.",
    after_help = "Examples:\n  hrdesk doctor --json\n  hrdesk config\n  hrdesk ingest --file leave-policy.md --document-id leave-policy.md --policy-id leave-policy --version 2 --effective-date 2026-01-01"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and check reachability of the backing services")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Ingest a policy document into a running hrdesk-server")]
    Ingest(commands::ingest::IngestArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Ingest(args) => commands::ingest::run(args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

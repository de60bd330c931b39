pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "eapproval",
    about = "e-Approval operator CLI",
    long_about = "Operate the e-Approval service: migrations, demo data, config inspection, \
                  readiness checks and offline approval chain evaluation.",
    after_help = "Examples:\n  eapproval doctor --json\n  eapproval seed\n  \
                  eapproval evaluate chain.json --approver hr-mei"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load (or with --clean remove) the demo requests covering every status")]
    Seed {
        #[arg(long, help = "Remove the demo requests instead of loading them")]
        clean: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, DB connectivity and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Evaluate an approval chain from a JSON file without touching the database")]
    Evaluate {
        #[arg(help = "JSON file holding an `approvals` array")]
        file: PathBuf,
        #[arg(long, help = "Report which level this approver may decide")]
        approver: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { clean } => commands::seed::run(clean),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Evaluate { file, approver } => {
            commands::evaluate::run(&file, approver.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "signoff",
    about = "Signoff operator CLI",
    long_about = "Operate the approval workflow: migrations, intake, decisions, dashboards, \
                  the weekly digest, config inspection and readiness checks.",
    after_help = "Examples:\n  signoff doctor --json\n  signoff dashboard --email vp.sales@example.com\n  \
                  signoff approve 3f2c9d0e8b1a4c5d --comments \"ok\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Record an intake event; a known response id edits the existing request")]
    Submit {
        #[arg(long, help = "Form response id; stable across edits of the same response")]
        response_id: String,
        #[arg(long, help = "Employee name")]
        employee: String,
        #[arg(long, help = "Submitter email, receives progress and resolution mail")]
        email: String,
        #[arg(long)]
        department: String,
        #[arg(long)]
        team: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, help = "Request cost, e.g. 1250.00")]
        cost: Decimal,
    },
    #[command(about = "Approve the pending step identified by its task id")]
    Approve {
        task_id: String,
        #[arg(long)]
        comments: Option<String>,
    },
    #[command(about = "Reject the pending step identified by its task id")]
    Reject {
        task_id: String,
        #[arg(long)]
        comments: Option<String>,
    },
    #[command(about = "Print the pending, approved and rejected work of one approver")]
    Dashboard {
        #[arg(long)]
        email: String,
    },
    #[command(about = "Send the weekly digest to high-level approvers with pending work")]
    Digest,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config {
        #[arg(long, help = "Read this config file instead of signoff.toml")]
        path: Option<PathBuf>,
    },
    #[command(about = "Validate config, routing table, mail transport and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

/// Logs go to stderr so stdout stays a single JSON payload. `SIGNOFF_CLI_LOG` takes an
/// env-filter directive and defaults to `warn`.
fn init_logging() {
    let filter =
        EnvFilter::try_from_env("SIGNOFF_CLI_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .compact()
        .try_init();
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Submit { response_id, employee, email, department, team, description, cost } => {
            commands::submit::run(commands::submit::SubmitArgs {
                response_id,
                employee_name: employee,
                submitter_email: email,
                department,
                team,
                description,
                cost,
            })
        }
        Command::Approve { task_id, comments } => commands::decide::approve(&task_id, comments),
        Command::Reject { task_id, comments } => commands::decide::reject(&task_id, comments),
        Command::Dashboard { email } => commands::dashboard::run(&email),
        Command::Digest => commands::digest::run(),
        Command::Config { path } => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(path) }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

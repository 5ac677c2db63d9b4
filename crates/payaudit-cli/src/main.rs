//! # payaudit CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use payaudit_cli::client::AdminClient;
use payaudit_cli::output::Format;
use payaudit_cli::reconcile::{run_missing_reports, run_undelivered, ReconcileArgs};
use payaudit_cli::requests::{
    run_correct_email, run_find, run_resend, run_show, CorrectEmailArgs, FindArgs, ResendArgs,
    ShowArgs,
};

/// Payroll audit portal operator CLI.
///
/// Lists and repairs requests that were paid but never got a report, or
/// whose report never reached the customer.
#[derive(Parser, Debug)]
#[command(name = "payaudit", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Base URL of the payaudit API.
    #[arg(long, env = "PAYAUDIT_URL", default_value = "http://localhost:8080", global = true)]
    url: String,

    /// Admin bearer token.
    #[arg(long, env = "PAYAUDIT_ADMIN_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Print raw JSON responses.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Paid requests with no report; --apply re-queues failed and stalled ones.
    MissingReports(ReconcileArgs),

    /// Reports not yet delivered; --apply resends them.
    Undelivered(ReconcileArgs),

    /// Show one request.
    Show(ShowArgs),

    /// Resend the report for one request.
    Resend(ResendArgs),

    /// Correct the customer's email and resend the report.
    CorrectEmail(CorrectEmailArgs),

    /// Find requests by customer email.
    Find(FindArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level.
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let client = AdminClient::new(&cli.url, cli.token)?;
    tracing::debug!(?client, "admin client configured");
    let format = if cli.json { Format::Json } else { Format::Text };

    match cli.command {
        Commands::MissingReports(args) => run_missing_reports(&client, &args, format).await,
        Commands::Undelivered(args) => run_undelivered(&client, &args, format).await,
        Commands::Show(args) => run_show(&client, &args, format).await,
        Commands::Resend(args) => run_resend(&client, &args, format).await,
        Commands::CorrectEmail(args) => run_correct_email(&client, &args, format).await,
        Commands::Find(args) => run_find(&client, &args, format).await,
    }
}

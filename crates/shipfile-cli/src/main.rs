//! Shipfile CLI - declarative helm release orchestration

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::{RunArgs, StateArgs};
use shipfile_exec::Operation;

#[derive(Parser)]
#[command(name = "shipfile")]
#[command(author = "Shipfile Contributors")]
#[command(version)]
#[command(about = "Declarative helm release orchestration with Jinja2 manifests", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    state: StateArgs,

    /// Log filter (e.g. `info`, `shipfile_state=debug`)
    #[arg(long, env = "SHIPFILE_LOG", default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List the selected releases
    List {
        /// Print releases as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved state of every manifest
    Build,

    /// Install or upgrade the selected releases
    Sync(RunArgs),

    /// Show what a sync would change
    Diff(RunArgs),

    /// Uninstall the selected releases, in reverse order
    #[command(alias = "destroy")]
    Delete(RunArgs),

    /// Run the tests of the selected releases
    Test(RunArgs),

    /// Show the status of the selected releases
    Status(RunArgs),
}

fn main() -> ExitCode {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || match &cli.command {
        Commands::List { json } => commands::list::run(&cli.state, *json),
        Commands::Build => commands::build::run(&cli.state),
        Commands::Sync(args) => commands::release::run(&cli.state, Operation::Sync, args),
        Commands::Diff(args) => commands::release::run(&cli.state, Operation::Diff, args),
        Commands::Delete(args) => commands::release::run(&cli.state, Operation::Delete, args),
        Commands::Test(args) => commands::release::run(&cli.state, Operation::Test, args),
        Commands::Status(args) => commands::release::run(&cli.state, Operation::Status, args),
    });

    match result {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(code)
        }
    }
}

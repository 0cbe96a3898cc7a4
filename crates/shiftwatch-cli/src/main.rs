use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "shiftwatch", version, about = "Staff shift and break tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clock in, clock out, explain a late arrival
    Clock {
        #[command(subcommand)]
        action: commands::clock::ClockAction,
    },
    /// Break control
    Break {
        #[command(subcommand)]
        action: commands::breaks::BreakAction,
    },
    /// Plan the day's scheduled breaks
    Plan {
        #[command(subcommand)]
        action: commands::plan::PlanAction,
    },
    /// Print a staff member's current state as JSON
    Status(commands::status::StatusArgs),
    /// Run auto-start and shift countdown, streaming events as JSON lines
    Watch(commands::watch::WatchArgs),
    /// Weekly schedule management
    Schedule {
        #[command(subcommand)]
        action: commands::schedule::ScheduleAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SHIFTWATCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Clock { action } => commands::clock::run(action).await,
        Commands::Break { action } => commands::breaks::run(action).await,
        Commands::Plan { action } => commands::plan::run(action).await,
        Commands::Status(args) => commands::status::run(args).await,
        Commands::Watch(args) => commands::watch::run(args).await,
        Commands::Schedule { action } => commands::schedule::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "xcooldown", version, about = "xcooldown engagement gate CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Current gate status and lifetime/today counters
    Status {
        /// Print as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Raw counters
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Most recent reflections, newest first
    Reflections {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Erase all cooldown state, counters and reflections
    Reset {
        /// Skip the confirmation guard
        #[arg(long)]
        yes: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Walk one click through the ritual against a headless page
    Simulate(commands::simulate::SimulateArgs),
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("XCOOLDOWN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Status { json } => commands::status::run(json),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Reflections { limit } => commands::status::reflections(limit),
        Commands::Reset { yes } => commands::reset::run(yes),
        Commands::Config { action } => commands::config::run(action),
        Commands::Simulate(args) => commands::simulate::run(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

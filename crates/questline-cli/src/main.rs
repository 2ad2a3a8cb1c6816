use clap::{Parser, Subcommand};
use questline_core::Config;

mod commands;

#[derive(Parser)]
#[command(name = "questline-cli", version, about = "Questline progression CLI")]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Quest progression
    Quest {
        #[command(subcommand)]
        action: commands::quest::QuestAction,
    },
    /// XP and levels
    Xp {
        #[command(subcommand)]
        action: commands::xp::XpAction,
    },
    /// Achievement registry and unlocks
    Achievements {
        #[command(subcommand)]
        action: commands::achievements::AchievementsAction,
    },
    /// Submit a progress event
    Event(commands::event::EventArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Outbox delivery to the progress store
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
}

fn init_logging(verbose: bool) {
    let log_level = if verbose {
        "debug".to_string()
    } else {
        Config::load_or_default().logging.level
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Quest { action } => commands::quest::run(action),
        Commands::Xp { action } => commands::xp::run(action),
        Commands::Achievements { action } => commands::achievements::run(action),
        Commands::Event(args) => commands::event::run(args),
        Commands::Config { action } => commands::config::run(action),
        Commands::Sync { action } => commands::sync::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

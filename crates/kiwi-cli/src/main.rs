use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::EnvFilter;

use kiwi_core::Config;

mod commands;
mod context;

use commands::config::ConfigAction;

#[derive(Parser)]
#[command(name = "kiwi", version, about = "Kiwi: recurring tasks, streaks and XP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Generate due occurrences of recurring templates
    Materialize(commands::daily::MaterializeArgs),
    /// Record missed occurrences and break their streaks
    Rollover(commands::daily::RolloverArgs),
    /// Materialize every template, then roll the day over
    Daily(commands::daily::DailyArgs),
    /// Habit streaks
    Streak {
        #[command(subcommand)]
        action: commands::streak::StreakAction,
    },
    /// XP, level and badges
    Profile,
    /// Task statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the daily pass periodically until interrupted
    Daemon(commands::daemon::DaemonArgs),
    /// Generate shell completion script
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    // a broken config file must not block `config reset`
    let config = if matches!(
        cli.command,
        Commands::Config {
            action: ConfigAction::Reset
        }
    ) {
        Ok(Config::default())
    } else {
        Config::load()
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging.level);

    let result = match cli.command {
        Commands::Task { action } => commands::task::run(action, &config),
        Commands::Materialize(args) => commands::daily::materialize(args, &config),
        Commands::Rollover(args) => commands::daily::rollover(args, &config),
        Commands::Daily(args) => commands::daily::daily(args, &config),
        Commands::Streak { action } => commands::streak::run(action, &config),
        Commands::Profile => commands::streak::profile(&config),
        Commands::Stats { action } => commands::stats::run(action, &config),
        Commands::Config { action } => commands::config::run(action, config),
        Commands::Daemon(args) => commands::daemon::run(args, &config),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "kiwi", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

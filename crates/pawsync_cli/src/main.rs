//! Pawsync CLI
//!
//! Command-line tools for looking inside a Pawsync client cache directory.
//!
//! # Commands
//!
//! - `inspect` - Show the cached snapshot and buffered writes
//! - `roster` - Print the pet roster for a suburb and day
//! - `threads` - Print a user's message threads

mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use commands::OutputFormat;
use pawsync_engine::ViewDay;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Pawsync client cache tools.
#[derive(Parser)]
#[command(name = "pawsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the cache directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the cached snapshot and buffered writes
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the pet roster
    Roster {
        /// Suburb to scope the roster to (all suburbs if omitted)
        #[arg(short, long)]
        scope: Option<String>,

        /// Day to rotate for, as YYYY-MM-DD (today if omitted)
        #[arg(short, long)]
        day: Option<NaiveDate>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print message threads
    Threads {
        /// Viewing user
        #[arg(short, long)]
        user: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Cache path required for inspect")?;
            let report = commands::inspect::run(&path)?;
            commands::emit(&report, format, commands::inspect::print_text)?;
        }
        Commands::Roster { scope, day, format } => {
            let path = cli.path.ok_or("Cache path required for roster")?;
            let today = commands::today();
            let day = day.map_or(today, |date| ViewDay { date, ..today });
            let report = commands::roster::run(&path, scope.as_deref(), day)?;
            commands::emit(&report, format, commands::roster::print_text)?;
        }
        Commands::Threads { user, format } => {
            let path = cli.path.ok_or("Cache path required for threads")?;
            let report = commands::threads::run(&path, &user)?;
            commands::emit(&report, format, commands::threads::print_text)?;
        }
        Commands::Version => {
            println!("Pawsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Cache format v{}", pawsync_engine::FORMAT_VERSION);
        }
    }

    Ok(())
}

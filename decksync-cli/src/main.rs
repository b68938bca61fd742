use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{
    ConfigCommand, CursorCommand, SelectCommand, ShowCommand, SlideCommand, StatusCommand,
    UpdateCommand, WatchCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "deck")]
#[command(version)]
#[command(about = "Edit and follow shared presentations from the terminal", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log sync activity to stderr (-v for debug, -vv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a presentation
    Show(ShowCommand),

    /// Follow a presentation live
    Watch(WatchCommand),

    /// Create, change, delete and reorder slides
    Slide(SlideCommand),

    /// Change presentation-level fields
    Update(UpdateCommand),

    /// Broadcast a cursor position
    Cursor(CursorCommand),

    /// Broadcast a selection
    Select(SelectCommand),

    /// Show sync configuration and server status
    Status(StatusCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn filter_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "decksync_core=debug,deck=debug",
        _ => "decksync_core=trace,deck=trace",
    }
}

fn init_tracing(verbose: u8) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter_for(verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Save config path for init command
    let cli_config_path = cli.config.clone();

    let config = Config::load(cli.config)?;

    match &cli.command {
        Some(Commands::Show(cmd)) => cmd.run(&config)?,
        Some(Commands::Watch(cmd)) => cmd.run(&config)?,
        Some(Commands::Slide(cmd)) => cmd.run(&config)?,
        Some(Commands::Update(cmd)) => cmd.run(&config)?,
        Some(Commands::Cursor(cmd)) => cmd.run(&config)?,
        Some(Commands::Select(cmd)) => cmd.run(&config)?,
        Some(Commands::Status(cmd)) => cmd.run(&config)?,
        Some(Commands::Config(cmd)) => cmd.run(&config, cli_config_path)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_slide_update() {
        let cli = Cli::try_parse_from([
            "deck", "slide", "update", "d1", "s1", "--title", "Intro", "--content", "a",
            "--content", "b",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Slide(_))));
    }

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(filter_for(0), "warn");
        assert!(filter_for(1).contains("debug"));
        assert!(filter_for(3).contains("trace"));
    }
}

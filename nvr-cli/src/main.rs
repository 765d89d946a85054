use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod daemon;
mod logging;

use logging::LogFormat;

#[derive(Parser)]
#[command(name = "nvr", about = "Plugin orchestration daemon for network video recorders")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Config file (defaults to the XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon and its management server
    Serve(commands::serve::ServeArgs),
    /// Work with plugin manifests
    Manifest(commands::manifest::ManifestArgs),
    /// Inspect installed plugins
    Plugins(commands::plugins::PluginsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format);

    let config_path = cli.config.unwrap_or_else(nvr_paths::config_file);
    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, &config_path).await,
        Commands::Manifest(args) => commands::manifest::run(args),
        Commands::Plugins(args) => commands::plugins::run(args, &config_path).await,
    }
}

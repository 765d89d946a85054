//! nvr plugins - inspect what the daemon would load

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use nvr_core::{NvrConfig, PluginStatus};

use crate::daemon::build_manager;

#[derive(Args)]
pub struct PluginsArgs {
    #[command(subcommand)]
    pub command: PluginsCommands,
}

#[derive(Subcommand)]
pub enum PluginsCommands {
    /// List builtin and installed plugins
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(args: PluginsArgs, config_path: &Path) -> Result<()> {
    match args.command {
        PluginsCommands::List { json } => list(config_path, json).await,
    }
}

async fn list(config_path: &Path, json: bool) -> Result<()> {
    let config = NvrConfig::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let manager = build_manager(&config).await?;
    let plugins = manager.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&plugins)?);
        return Ok(());
    }
    if plugins.is_empty() {
        println!("No plugins installed");
        return Ok(());
    }
    println!("{}", render(&plugins));
    println!();
    println!("Plugin directory: {}", config.plugins.dir.display());
    Ok(())
}

fn render(plugins: &[PluginStatus]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Plugin").fg(Color::Cyan),
        Cell::new("Version").fg(Color::Cyan),
        Cell::new("Source").fg(Color::Cyan),
        Cell::new("Enabled").fg(Color::Cyan),
        Cell::new("Depends on").fg(Color::Cyan),
        Cell::new("Capabilities").fg(Color::Cyan),
    ]);

    for p in plugins {
        let id = if p.critical {
            format!("{} (critical)", p.id)
        } else {
            p.id.clone()
        };
        let caps: Vec<&str> = p.capabilities.iter().map(|c| c.as_str()).collect();
        table.add_row(vec![
            Cell::new(id),
            Cell::new(&p.version),
            Cell::new(p.source),
            Cell::new(if p.enabled { "yes" } else { "no" }),
            Cell::new(p.dependencies.join(", ")),
            Cell::new(caps.join(", ")),
        ]);
    }
    table
}

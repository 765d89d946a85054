//! nvr manifest - manifest tooling

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use nvr_core::plugins::{find_manifest, load_manifest};
use nvr_plugin_api::PluginManifest;

#[derive(Args)]
pub struct ManifestArgs {
    #[command(subcommand)]
    pub command: ManifestCommands,
}

#[derive(Subcommand)]
pub enum ManifestCommands {
    /// Parse and check a manifest file or plugin directory
    Validate {
        /// manifest.yaml / manifest.json, or a directory containing one
        path: PathBuf,
    },
}

pub fn run(args: ManifestArgs) -> Result<()> {
    match args.command {
        ManifestCommands::Validate { path } => {
            let manifest = validate(&path)?;
            print_summary(&manifest);
            Ok(())
        }
    }
}

fn validate(path: &Path) -> Result<PluginManifest> {
    let file = if path.is_dir() {
        find_manifest(path)?
    } else {
        path.to_path_buf()
    };
    if !file.is_file() {
        bail!("{} does not exist", file.display());
    }
    Ok(load_manifest(&file)?)
}

fn print_summary(m: &PluginManifest) {
    println!("✓ {} v{} is valid", m.id, m.version);
    if !m.name.is_empty() {
        println!("Name:         {}", m.name);
    }
    if !m.category.is_empty() {
        println!("Category:     {}", m.category);
    }
    println!("Critical:     {}", if m.critical { "yes" } else { "no" });
    if !m.dependencies.is_empty() {
        println!("Dependencies: {}", m.dependencies.join(", "));
    }
    if !m.capabilities.is_empty() {
        let caps: Vec<&str> = m.capabilities.iter().map(|c| c.as_str()).collect();
        println!("Capabilities: {}", caps.join(", "));
    }
}

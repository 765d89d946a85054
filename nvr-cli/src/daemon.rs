//! Assembles a plugin manager from the daemon config

use anyhow::{Context, Result};
use nvr_core::{NvrConfig, PluginManager, open_store};
use nvr_events::EventArchivePlugin;
use nvr_plugin_api::PluginKind;

/// Open the store, register builtin plugins and install the plugin directory.
///
/// Plugins that fail to install are logged and skipped.
pub async fn build_manager(config: &NvrConfig) -> Result<PluginManager> {
    let store = open_store(config)
        .await
        .context("Failed to open the state store")?;
    let manager = PluginManager::new(config.manager_config(), store);

    manager
        .register_builtin(|| PluginKind::Service(Box::new(EventArchivePlugin::default())))
        .await
        .context("Failed to register builtin plugins")?;

    let report = manager.discover(&config.plugins.dir).await;
    for outcome in &report.installed {
        for issue in &outcome.issues {
            tracing::warn!(plugin = %outcome.id, kind = %issue.kind(), error = %issue, "Plugin installed with issues");
        }
    }
    for (path, error) in &report.failed {
        tracing::warn!(path = %path.display(), kind = %error.kind(), error = %error, "Skipping plugin");
    }
    tracing::info!(
        dir = %config.plugins.dir.display(),
        installed = report.installed.len(),
        failed = report.failed.len(),
        "Plugin discovery finished"
    );

    Ok(manager)
}

//! nvr-events - event archive plugin
//!
//! Keeps a bounded history of detection, motion and camera events in the
//! plugin's scoped store and serves it over RPC:
//!
//! - `recent` `{limit?, type?, camera_id?}`: newest events first
//! - `count`: totals per event type
//!
//! Ships compiled into the `nvr` daemon and can also be built as a
//! loadable library.

pub mod archive;
pub mod plugin;

pub use archive::{ArchiveCounts, DEFAULT_MAX_EVENTS, EventArchive, RecentQuery};
pub use plugin::{DEFAULT_PATTERNS, EventArchivePlugin, PLUGIN_ID};

nvr_plugin_api::export_plugin!(Service, EventArchivePlugin);

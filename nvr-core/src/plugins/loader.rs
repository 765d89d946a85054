//! Plugin sources: compiled-in factories and dynamic libraries

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use nvr_plugin_api::{API_VERSION, PluginKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Plugin library not found in {dir}")]
    LibraryNotFound { dir: PathBuf },

    #[error("API version mismatch: host expects {expected}, plugin has {found}")]
    ApiVersionMismatch { expected: u32, found: u32 },

    #[error("Failed to load plugin library: {0}")]
    Library(#[from] libloading::Error),

    #[error("Plugin library returned no instance")]
    NullInstance,
}

/// Builds a fresh plugin instance
pub type PluginFactory = Arc<dyn Fn() -> PluginKind + Send + Sync>;

/// Where a plugin's code comes from
#[derive(Clone)]
pub enum PluginSource {
    /// Compiled into the daemon
    Builtin(PluginFactory),
    /// Dynamic library inside a plugin directory
    Library { dir: PathBuf },
}

impl PluginSource {
    pub fn builtin<F>(factory: F) -> Self
    where
        F: Fn() -> PluginKind + Send + Sync + 'static,
    {
        Self::Builtin(Arc::new(factory))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Builtin(_) => "builtin",
            Self::Library { .. } => "library",
        }
    }

    /// Create an instance. Library plugins also hand back the library,
    /// which must outlive the instance.
    pub(crate) fn instantiate(&self, id: &str) -> Result<(PluginKind, Option<Library>), LoadError> {
        match self {
            Self::Builtin(factory) => Ok((factory(), None)),
            Self::Library { dir } => {
                let path = find_library(dir, id)?;
                let (library, kind) = load_library(&path)?;
                Ok((kind, Some(library)))
            }
        }
    }
}

impl fmt::Debug for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(_) => f.write_str("Builtin"),
            Self::Library { dir } => f.debug_struct("Library").field("dir", dir).finish(),
        }
    }
}

/// Find the library file in a plugin directory
pub fn find_library(dir: &Path, id: &str) -> Result<PathBuf, LoadError> {
    // <id>.so, or .dylib on macOS, .dll on Windows
    let extensions: &[&str] = if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else if cfg!(target_os = "windows") {
        &["dll"]
    } else {
        &["so"]
    };

    // cargo names cdylibs with underscores
    let crate_name = id.replace('-', "_");
    for ext in extensions {
        for stem in [id, crate_name.as_str()] {
            let path = dir.join(format!("{stem}.{ext}"));
            if path.exists() {
                return Ok(path);
            }
            let path = dir.join(format!("lib{stem}.{ext}"));
            if path.exists() {
                return Ok(path);
            }
        }
    }

    Err(LoadError::LibraryNotFound {
        dir: dir.to_path_buf(),
    })
}

/// Open a plugin library, check its API version and create the instance
pub fn load_library(path: &Path) -> Result<(Library, PluginKind), LoadError> {
    // SAFETY: the library sits in a plugin directory the operator installed;
    // it is expected to have been built with `export_plugin!`.
    let library = unsafe { Library::new(path)? };

    // SAFETY: signature matches the `_nvr_plugin_api_version` export.
    let api_version_fn: libloading::Symbol<extern "C" fn() -> u32> =
        unsafe { library.get(b"_nvr_plugin_api_version")? };
    let found = api_version_fn();
    if found != API_VERSION {
        return Err(LoadError::ApiVersionMismatch {
            expected: API_VERSION,
            found,
        });
    }

    // SAFETY: signature matches the `_nvr_plugin_create` export, which
    // returns `Box::into_raw(Box<PluginKind>)`.
    let create_fn: libloading::Symbol<extern "C" fn() -> *mut PluginKind> =
        unsafe { library.get(b"_nvr_plugin_create")? };
    let raw = create_fn();
    if raw.is_null() {
        return Err(LoadError::NullInstance);
    }
    // SAFETY: non-null pointer produced by Box::into_raw in the plugin.
    let kind = unsafe { *Box::from_raw(raw) };

    Ok((library, kind))
}

//! Loader settings.
//!
//! The switches the surrounding scheduler hands to this crate: where the
//! allocation file lives, how eagerly to poll it, and the two flags that
//! shape the implicit placement chain. All fields have defaults so a
//! minimal embedding works out of the box.

use std::path::PathBuf;
use std::time::Duration;

/// How often the background loop checks the file for changes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How long a modification must sit undisturbed before it is read, so a
/// file is never loaded mid-write.
pub const DEFAULT_RELOAD_DEBOUNCE: Duration = Duration::from_secs(5);

/// Configuration switches consumed by the allocation file loader.
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    /// Path of the allocation file. When unset, the loader serves the
    /// bundled default document and never reloads.
    pub allocation_file: Option<PathBuf>,

    /// Background poll period.
    pub poll_interval: Duration,

    /// Minimum quiet period after a modification before reloading.
    pub reload_debounce: Duration,

    /// May placement rules route into queues the file never declared?
    pub allow_undeclared_pools: bool,

    /// Should the implicit placement chain group apps into per-user
    /// queues when the app did not name one?
    pub user_as_default_queue: bool,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            allocation_file: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reload_debounce: DEFAULT_RELOAD_DEBOUNCE,
            allow_undeclared_pools: true,
            user_as_default_queue: true,
        }
    }
}

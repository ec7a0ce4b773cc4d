//! Allocation file loading and hot reload.
//!
//! # Responsibilities
//! - Run the parse → resolve → compile pipeline on demand and on change
//! - Poll the file's modification time, debounced so a file is never
//!   read mid-write
//! - Publish each new snapshot atomically and notify the listener
//! - Keep the previous snapshot live when a reload fails
//!
//! # Design Decisions
//! - Manual reloads and the background loop serialize through one mutex
//!   held for the pipeline run only, so concurrent triggers can never
//!   publish a torn snapshot
//! - Publication goes through an `ArcSwapOption`; readers never lock
//! - Failure streaks log once, not once per poll tick

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use arc_swap::ArcSwapOption;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::allocation::{resolve, AllocationConfiguration, AllocationDocument};
use crate::error::AllocResult;
use crate::reload::clock::{Clock, SystemClock};
use crate::settings::LoaderSettings;

/// The document served when no allocation file is configured: the
/// equivalent of a bundled default resource.
const BUNDLED_ALLOCATIONS: &str = "<allocations/>\n";

/// Callback handed each successfully loaded snapshot.
pub type ReloadListener = Box<dyn Fn(Arc<AllocationConfiguration>) + Send + Sync>;

/// Lifecycle of the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Stopped,
    Initialized,
    Running,
}

enum AllocationSource {
    File(PathBuf),
    Bundled,
}

/// Bookkeeping owned by the reload mutex. The poll loop is the only
/// long-lived writer; manual reloads briefly join it.
struct ReloadProgress {
    /// Modification time of the file as of the last successful load; a
    /// newer mtime means the published snapshot is stale.
    last_loaded_mtime: Option<SystemTime>,
    last_attempt_failed: bool,
    missing_file_warned: bool,
}

/// Watches the allocation file and republishes validated snapshots.
pub struct AllocationFileLoader {
    source: AllocationSource,
    settings: LoaderSettings,
    clock: Arc<dyn Clock>,
    listener: Mutex<Option<ReloadListener>>,
    current: ArcSwapOption<AllocationConfiguration>,
    progress: Mutex<ReloadProgress>,
    state: Mutex<LoaderState>,
    shutdown: broadcast::Sender<()>,
}

impl AllocationFileLoader {
    /// Create a loader over the real system clock.
    pub fn new(settings: LoaderSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Create a loader with an injected clock (tests drive a
    /// [`ManualClock`](crate::reload::ManualClock) through this).
    pub fn with_clock(settings: LoaderSettings, clock: Arc<dyn Clock>) -> Self {
        let source = match &settings.allocation_file {
            Some(path) => AllocationSource::File(path.clone()),
            None => AllocationSource::Bundled,
        };
        let (shutdown, _) = broadcast::channel(1);
        Self {
            source,
            settings,
            clock,
            listener: Mutex::new(None),
            current: ArcSwapOption::const_empty(),
            progress: Mutex::new(ReloadProgress {
                last_loaded_mtime: None,
                last_attempt_failed: false,
                missing_file_warned: false,
            }),
            state: Mutex::new(LoaderState::Initialized),
            shutdown,
        }
    }

    /// Register the reload listener. One listener at a time; the last
    /// registration wins.
    pub fn set_reload_listener(
        &self,
        listener: impl Fn(Arc<AllocationConfiguration>) + Send + Sync + 'static,
    ) {
        *self.listener.lock().unwrap() = Some(Box::new(listener));
    }

    pub fn state(&self) -> LoaderState {
        *self.state.lock().unwrap()
    }

    /// The most recently published snapshot, if any load has succeeded.
    pub fn current(&self) -> Option<Arc<AllocationConfiguration>> {
        self.current.load_full()
    }

    /// Run one full parse → resolve → compile pass right now, publish the
    /// snapshot, and deliver it to the listener. Errors propagate to the
    /// caller; the previously published snapshot stays in place.
    pub fn reload_allocations(&self) -> AllocResult<Arc<AllocationConfiguration>> {
        let (snapshot, listener) = {
            let mut progress = self.progress.lock().unwrap();
            // Mtime is taken before the read: a write racing the read only
            // makes the next poll reload once more.
            let (text, mtime) = match &self.source {
                AllocationSource::File(path) => {
                    let mtime = fs::metadata(path)?.modified()?;
                    (fs::read_to_string(path)?, Some(mtime))
                }
                AllocationSource::Bundled => (BUNDLED_ALLOCATIONS.to_string(), None),
            };
            let document = AllocationDocument::parse(&text)?;
            let configuration = Arc::new(resolve(&document, &self.settings)?);

            self.current.store(Some(Arc::clone(&configuration)));
            progress.last_loaded_mtime = mtime;
            progress.last_attempt_failed = false;

            // The listener lock is taken before the pipeline lock drops,
            // so concurrent reloads deliver snapshots in publication
            // order. A blocking listener still never holds up the
            // pipeline lock itself.
            (configuration, self.listener.lock().unwrap())
        };

        tracing::info!(
            queues = snapshot.configured_queues().leaf.len()
                + snapshot.configured_queues().parent.len(),
            rules = snapshot.placement_policy().rules().len(),
            "Allocation configuration loaded"
        );

        if let Some(listener) = listener.as_ref() {
            listener(Arc::clone(&snapshot));
        }
        Ok(snapshot)
    }

    /// Start the background poll loop. Returns the task handle; the loop
    /// runs until [`stop`](Self::stop) fires.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let loader = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        *self.state.lock().unwrap() = LoaderState::Running;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(loader.settings.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => loader.poll_once(),
                }
            }
            *loader.state.lock().unwrap() = LoaderState::Stopped;
            tracing::debug!("Allocation file poll loop stopped");
        })
    }

    /// Signal the poll loop to exit. Idempotent; an in-flight reload
    /// finishes normally.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    /// One poll tick: reload when the file changed after the last
    /// successful load and the debounce window has passed.
    fn poll_once(&self) {
        let path = match &self.source {
            AllocationSource::File(path) => path,
            // The bundled document never changes.
            AllocationSource::Bundled => return,
        };

        let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => {
                self.progress.lock().unwrap().missing_file_warned = false;
                modified
            }
            Err(error) => {
                let mut progress = self.progress.lock().unwrap();
                if !progress.missing_file_warned {
                    tracing::warn!(path = %path.display(), %error,
                        "Allocation file is not readable; keeping current configuration");
                    progress.missing_file_warned = true;
                }
                return;
            }
        };

        let changed = {
            let progress = self.progress.lock().unwrap();
            match progress.last_loaded_mtime {
                Some(loaded) => modified > loaded,
                None => true,
            }
        };
        if !changed {
            return;
        }

        let now = self.clock.now();
        if now < modified + self.settings.reload_debounce {
            // Possibly still being written; check again next tick.
            return;
        }

        if let Err(error) = self.reload_allocations() {
            let mut progress = self.progress.lock().unwrap();
            if !progress.last_attempt_failed {
                tracing::error!(path = %path.display(), %error,
                    "Failed to reload allocation file; keeping current configuration");
                progress.last_attempt_failed = true;
            }
        }
    }
}

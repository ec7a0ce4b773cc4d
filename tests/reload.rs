//! Hot reload behavior: change detection, debouncing, listener delivery,
//! failure handling, and shutdown. A manual clock drives the debounce
//! decision so no test ever sleeps through a real debounce window.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

use fairshare_alloc::allocation::AllocationConfiguration;
use fairshare_alloc::reload::{AllocationFileLoader, LoaderState, ManualClock};
use fairshare_alloc::settings::LoaderSettings;

const RECV_DEADLINE: Duration = Duration::from_secs(5);

fn single_queue_file(max_apps: u32) -> String {
    format!(
        "<allocations><queue name=\"queueA\">\
         <maxRunningApps>{max_apps}</maxRunningApps>\
         </queue></allocations>"
    )
}

struct Harness {
    _dir: TempDir,
    path: PathBuf,
    clock: Arc<ManualClock>,
    loader: Arc<AllocationFileLoader>,
    snapshots: mpsc::UnboundedReceiver<Arc<AllocationConfiguration>>,
}

/// Build a loader over a fresh temp file, polling fast, with the manual
/// clock started well behind real time so any real file mtime registers
/// as "changed" until the clock is moved past it.
fn harness(initial: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fair-scheduler.xml");
    fs::write(&path, initial).unwrap();

    let clock = Arc::new(ManualClock::new(
        SystemTime::now() - Duration::from_secs(3600),
    ));
    let settings = LoaderSettings {
        allocation_file: Some(path.clone()),
        poll_interval: Duration::from_millis(10),
        reload_debounce: Duration::from_secs(5),
        ..LoaderSettings::default()
    };
    let loader = Arc::new(AllocationFileLoader::with_clock(settings, clock.clone()));

    let (tx, snapshots) = mpsc::unbounded_channel();
    loader.set_reload_listener(move |snapshot| {
        let _ = tx.send(snapshot);
    });

    Harness {
        _dir: dir,
        path,
        clock,
        loader,
        snapshots,
    }
}

impl Harness {
    /// Move the manual clock far past real time, so every pending file
    /// modification has aged out of the debounce window.
    fn expire_debounce(&self) {
        self.clock.set(SystemTime::now() + Duration::from_secs(3600));
    }

    async fn next_snapshot(&mut self) -> Arc<AllocationConfiguration> {
        timeout(RECV_DEADLINE, self.snapshots.recv())
            .await
            .expect("timed out waiting for a reload")
            .expect("listener channel closed")
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn poll_loop_reloads_a_changed_file() {
    let mut h = harness(&single_queue_file(1));
    h.expire_debounce();
    let handle = h.loader.spawn();
    assert_eq!(h.loader.state(), LoaderState::Running);

    let first = h.next_snapshot().await;
    assert_eq!(first.queue_max_apps("root.queueA"), 1);

    fs::write(&h.path, single_queue_file(2)).unwrap();
    h.expire_debounce();
    let second = h.next_snapshot().await;
    assert_eq!(second.queue_max_apps("root.queueA"), 2);
    assert_eq!(h.loader.current().unwrap().queue_max_apps("root.queueA"), 2);

    h.loader.stop();
    handle.await.unwrap();
    assert_eq!(h.loader.state(), LoaderState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn unchanged_file_is_loaded_exactly_once() {
    let mut h = harness(&single_queue_file(1));
    h.expire_debounce();
    let handle = h.loader.spawn();

    h.next_snapshot().await;
    // Many poll ticks pass; the unchanged file must not reload.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.snapshots.try_recv().is_err());

    h.loader.stop();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn recent_modification_is_debounced() {
    let mut h = harness(&single_queue_file(1));
    h.expire_debounce();
    let handle = h.loader.spawn();
    h.next_snapshot().await;

    // The rewrite's mtime is "now"; the manual clock sits an hour in the
    // past, so the quiet period has not elapsed.
    h.clock.set(SystemTime::now() - Duration::from_secs(3600));
    fs::write(&h.path, single_queue_file(2)).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.snapshots.try_recv().is_err());
    assert_eq!(h.loader.current().unwrap().queue_max_apps("root.queueA"), 1);

    // Once the quiet period passes, the pending change loads.
    h.expire_debounce();
    let snapshot = h.next_snapshot().await;
    assert_eq!(snapshot.queue_max_apps("root.queueA"), 2);

    h.loader.stop();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_reload_keeps_the_previous_snapshot() {
    let mut h = harness(&single_queue_file(1));
    h.expire_debounce();
    let handle = h.loader.spawn();
    h.next_snapshot().await;

    fs::write(&h.path, "<allocations><queue name=\"a.b\"/></allocations>").unwrap();
    h.expire_debounce();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.snapshots.try_recv().is_err());
    assert_eq!(h.loader.current().unwrap().queue_max_apps("root.queueA"), 1);

    // A corrected file recovers on the next poll.
    fs::write(&h.path, single_queue_file(3)).unwrap();
    h.expire_debounce();
    let snapshot = h.next_snapshot().await;
    assert_eq!(snapshot.queue_max_apps("root.queueA"), 3);

    h.loader.stop();
    handle.await.unwrap();
}

#[test]
fn concurrent_manual_reloads_deliver_in_publication_order() {
    use std::sync::Mutex;

    let loader = Arc::new(AllocationFileLoader::new(LoaderSettings::default()));
    let delivered: Arc<Mutex<Vec<Arc<AllocationConfiguration>>>> =
        Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&delivered);
    loader.set_reload_listener(move |snapshot| {
        sink.lock().unwrap().push(snapshot);
    });

    let reloads_per_thread = 25;
    let workers: Vec<_> = (0..2)
        .map(|_| {
            let loader = Arc::clone(&loader);
            std::thread::spawn(move || {
                for _ in 0..reloads_per_thread {
                    loader.reload_allocations().unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len(), 2 * reloads_per_thread);
    // The last delivery is the last published snapshot.
    let last = delivered.last().unwrap();
    assert!(Arc::ptr_eq(last, &loader.current().unwrap()));
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_reload_notifies_the_listener() {
    let mut h = harness(&single_queue_file(7));

    let snapshot = h.loader.reload_allocations().unwrap();
    assert_eq!(snapshot.queue_max_apps("root.queueA"), 7);

    let delivered = h.next_snapshot().await;
    assert!(Arc::ptr_eq(&snapshot, &delivered));
}

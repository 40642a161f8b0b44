//! Debounced filesystem change notification.
//!
//! A dedicated worker thread owns the native watch primitive exclusively.
//! Registration and deregistration go through a synchronous request/response
//! channel; change notifications are fire-and-forget. Bursts of native
//! events for one path (remove + recreate during an atomic save) coalesce
//! into a single notification, and after each flush the worker re-registers
//! the native watch in case the OS dropped it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::device_path::DevicePath;
use crate::error::{FsError, FsResult};

/// Debounce window: events for one path arriving closer together than this
/// collapse into one notification.
const DEBOUNCE: Duration = Duration::from_millis(50);
/// A path continuously producing events is flushed at least this often.
const MAX_RESCHEDULE: Duration = Duration::from_millis(400);
/// Worker wake-up granularity while events are pending.
const TICK: Duration = Duration::from_millis(20);

/// A coalesced change notification for one watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: DevicePath,
}

struct Subscriber {
    id: u64,
    tx: Sender<ChangeEvent>,
}

type SubscriberMap = Arc<Mutex<HashMap<PathBuf, Vec<Subscriber>>>>;

enum Request {
    Watch {
        path: PathBuf,
        reply: Sender<FsResult<(u64, Receiver<ChangeEvent>)>>,
    },
    Unwatch {
        path: PathBuf,
        id: u64,
    },
}

/// Live registration between a path and the watch service. Dropping the
/// handle deregisters the native watch when no other subscriber remains on
/// the same path.
pub struct WatchHandle {
    path: PathBuf,
    id: u64,
    rx: Receiver<ChangeEvent>,
    service: Sender<Request>,
}

impl WatchHandle {
    /// Drain notifications that have already been delivered.
    pub fn pending_events(&self) -> Vec<ChangeEvent> {
        self.rx.try_iter().collect()
    }

    /// Block for the next notification, up to `timeout`.
    pub fn wait_for_event(&self, timeout: Duration) -> Option<ChangeEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("path", &self.path)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let _ = self.service.send(Request::Unwatch {
            path: self.path.clone(),
            id: self.id,
        });
    }
}

/// The change-notification service. One per process; obtain it through
/// [`FileWatcher::global`].
pub struct FileWatcher {
    requests: Sender<Request>,
}

static GLOBAL: Lazy<FileWatcher> = Lazy::new(FileWatcher::spawn);

impl FileWatcher {
    pub fn global() -> &'static FileWatcher {
        &GLOBAL
    }

    /// Register a watch on a local path. The path must exist for the native
    /// primitive to accept it.
    pub fn watch(&self, path: &DevicePath) -> FsResult<WatchHandle> {
        if !path.is_local() {
            return Err(FsError::assertion(format!(
                "the watch service only handles local paths (got {})",
                path.to_display_string(false)
            )));
        }
        let native = PathBuf::from(path.path());
        let (reply_tx, reply_rx) = bounded(1);
        self.requests
            .send(Request::Watch {
                path: native.clone(),
                reply: reply_tx,
            })
            .map_err(|_| FsError::other("watch service worker is gone"))?;
        let (id, rx) = reply_rx
            .recv()
            .map_err(|_| FsError::other("watch service worker is gone"))??;
        Ok(WatchHandle {
            path: native,
            id,
            rx,
            service: self.requests.clone(),
        })
    }

    fn spawn() -> FileWatcher {
        let (request_tx, request_rx) = unbounded();
        thread::Builder::new()
            .name("devicefs-watcher".to_string())
            .spawn(move || worker(request_rx))
            .expect("failed to spawn watcher thread");
        FileWatcher {
            requests: request_tx,
        }
    }
}

fn worker(requests: Receiver<Request>) {
    let (raw_tx, raw_rx) = unbounded::<notify::Result<notify::Event>>();
    let mut watcher = match RecommendedWatcher::new(
        move |res| {
            let _ = raw_tx.send(res);
        },
        Config::default(),
    ) {
        Ok(watcher) => watcher,
        Err(err) => {
            log::warn!("native watcher unavailable: {err}");
            // Answer all registrations with an error; nothing else to do.
            while let Ok(request) = requests.recv() {
                if let Request::Watch { reply, .. } = request {
                    let _ = reply.send(Err(FsError::other(format!(
                        "native watcher unavailable: {err}"
                    ))));
                }
            }
            return;
        }
    };

    let subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));
    let mut next_id: u64 = 1;
    // Per-path (first seen, last seen) timestamps of unflushed events.
    let mut pending: HashMap<PathBuf, (Instant, Instant)> = HashMap::new();

    loop {
        crossbeam_channel::select! {
            recv(requests) -> msg => match msg {
                Ok(Request::Watch { path, reply }) => {
                    let result = register(&mut watcher, &subscribers, &path, next_id);
                    if result.is_ok() {
                        next_id += 1;
                    }
                    let _ = reply.send(result);
                }
                Ok(Request::Unwatch { path, id }) => {
                    deregister(&mut watcher, &subscribers, &path, id);
                }
                Err(_) => break,
            },
            recv(raw_rx) -> msg => {
                if let Ok(Ok(event)) = msg {
                    let now = Instant::now();
                    for path in event.paths {
                        pending
                            .entry(path)
                            .and_modify(|(_, last)| *last = now)
                            .or_insert((now, now));
                    }
                }
            }
            default(TICK) => {}
        }
        flush_due(&mut watcher, &subscribers, &mut pending);
    }
}

fn register(
    watcher: &mut RecommendedWatcher,
    subscribers: &SubscriberMap,
    path: &Path,
    id: u64,
) -> FsResult<(u64, Receiver<ChangeEvent>)> {
    let mut map = subscribers.lock();
    if !map.contains_key(path) {
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|err| FsError::other(format!("cannot watch {}: {err}", path.display())))?;
    }
    let (tx, rx) = unbounded();
    map.entry(path.to_path_buf())
        .or_default()
        .push(Subscriber { id, tx });
    Ok((id, rx))
}

fn deregister(
    watcher: &mut RecommendedWatcher,
    subscribers: &SubscriberMap,
    path: &Path,
    id: u64,
) {
    let mut map = subscribers.lock();
    let Some(list) = map.get_mut(path) else {
        return;
    };
    list.retain(|sub| sub.id != id);
    if list.is_empty() {
        map.remove(path);
        if let Err(err) = watcher.unwatch(path) {
            log::debug!("unwatch {} failed: {err}", path.display());
        }
    }
}

/// Deliver coalesced notifications whose debounce window has elapsed.
/// Watched ancestors receive events for changes inside them, so each
/// changed path is matched against the subscriber map by prefix.
fn flush_due(
    watcher: &mut RecommendedWatcher,
    subscribers: &SubscriberMap,
    pending: &mut HashMap<PathBuf, (Instant, Instant)>,
) {
    if pending.is_empty() {
        return;
    }
    let now = Instant::now();
    let due: Vec<PathBuf> = pending
        .iter()
        .filter(|(_, (first, last))| {
            now.duration_since(*last) >= DEBOUNCE || now.duration_since(*first) >= MAX_RESCHEDULE
        })
        .map(|(path, _)| path.clone())
        .collect();

    for changed in due {
        pending.remove(&changed);
        let map = subscribers.lock();
        for (watched, list) in map.iter() {
            if changed != *watched && !changed.starts_with(watched) {
                continue;
            }
            let event = ChangeEvent {
                path: DevicePath::local(changed.to_string_lossy().into_owned()),
            };
            for sub in list {
                let _ = sub.tx.send(event.clone());
            }
        }
        // The OS drops watches on delete + recreate; re-arm registered paths
        // that took a direct hit.
        let rearm = map.contains_key(&changed);
        drop(map);
        if rearm {
            let _ = watcher.unwatch(&changed);
            if let Err(err) = watcher.watch(&changed, RecursiveMode::NonRecursive) {
                log::debug!("re-watching {} failed: {err}", changed.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn delivers_a_coalesced_event_for_a_burst() {
        let dir = tempfile::tempdir().unwrap();
        let watched = DevicePath::local(dir.path().to_string_lossy().into_owned());
        let handle = FileWatcher::global().watch(&watched).unwrap();

        let file = dir.path().join("scene.qml");
        for round in 0..3 {
            fs::write(&file, format!("content {round}")).unwrap();
        }

        let event = handle.wait_for_event(Duration::from_secs(5));
        assert!(event.is_some(), "no change event arrived");
    }

    #[test]
    fn dropping_the_handle_deregisters() {
        let dir = tempfile::tempdir().unwrap();
        let watched = DevicePath::local(dir.path().to_string_lossy().into_owned());
        let handle = FileWatcher::global().watch(&watched).unwrap();
        drop(handle);

        // A second registration on the same path must succeed afterwards.
        let handle = FileWatcher::global().watch(&watched).unwrap();
        assert_eq!(handle.path(), dir.path());
    }

    #[test]
    fn rejects_device_paths() {
        let err = FileWatcher::global()
            .watch(&DevicePath::parse("docker://1/tmp"))
            .unwrap_err();
        assert!(err.to_string().contains("local paths"));
    }
}

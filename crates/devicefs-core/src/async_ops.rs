//! Background execution of blocking file operations.
//!
//! UI callers must not block on a remote round-trip. Each helper runs one
//! capability operation on a named worker thread and hands the result to a
//! completion callback on that thread; the caller decides how to marshal the
//! result back to its own loop. The returned join handle is mainly useful in
//! tests and shutdown paths.

use std::thread::{self, JoinHandle};

use crate::device_path::DevicePath;
use crate::error::FsResult;

fn spawn_op(
    name: &str,
    op: impl FnOnce() + Send + 'static,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("devicefs-{name}"))
        .spawn(op)
        .expect("failed to spawn file operation thread")
}

/// Read `path` in the background; `done` receives the contents or the error.
pub fn read_file_async(
    path: DevicePath,
    limit: Option<u64>,
    offset: u64,
    done: impl FnOnce(FsResult<Vec<u8>>) + Send + 'static,
) -> JoinHandle<()> {
    spawn_op("read", move || done(path.file_contents(limit, offset)))
}

/// Write `data` to `path` in the background; `done` receives the byte count
/// written or the error.
pub fn write_file_async(
    path: DevicePath,
    data: Vec<u8>,
    done: impl FnOnce(FsResult<u64>) + Send + 'static,
) -> JoinHandle<()> {
    spawn_op("write", move || done(path.write_file_contents(&data)))
}

/// Copy `source` to `target` in the background, crossing devices when the
/// two paths live on different ones.
pub fn copy_file_async(
    source: DevicePath,
    target: DevicePath,
    done: impl FnOnce(FsResult<()>) + Send + 'static,
) -> JoinHandle<()> {
    spawn_op("copy", move || done(source.copy_file(&target)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::time::Duration;

    #[test]
    fn read_completes_with_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.qml");
        std::fs::write(&file, b"import QtQuick").unwrap();

        let (tx, rx) = bounded(1);
        read_file_async(
            DevicePath::local(file.to_string_lossy().into_owned()),
            None,
            0,
            move |result| {
                let _ = tx.send(result);
            },
        );
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.unwrap(), b"import QtQuick");
    }

    #[test]
    fn write_then_copy_chain() {
        let dir = tempfile::tempdir().unwrap();
        let original = DevicePath::local(dir.path().join("a").to_string_lossy().into_owned());
        let copy = DevicePath::local(dir.path().join("b").to_string_lossy().into_owned());

        let (tx, rx) = bounded(1);
        write_file_async(original.clone(), b"payload".to_vec(), move |result| {
            let _ = tx.send(result);
        })
        .join()
        .unwrap();
        assert_eq!(rx.recv().unwrap().unwrap(), 7);

        let (tx, rx) = bounded(1);
        copy_file_async(original, copy.clone(), move |result| {
            let _ = tx.send(result);
        })
        .join()
        .unwrap();
        rx.recv().unwrap().unwrap();
        assert_eq!(copy.file_contents(None, 0).unwrap(), b"payload");
    }

    #[test]
    fn errors_reach_the_callback() {
        let (tx, rx) = bounded(1);
        read_file_async(
            DevicePath::parse("/definitely/not/here"),
            None,
            0,
            move |result| {
                let _ = tx.send(result.is_err());
            },
        );
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
}

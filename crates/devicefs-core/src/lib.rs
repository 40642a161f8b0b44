pub mod access;
pub mod async_ops;
pub mod cache_store;
pub mod command;
pub mod device_path;
pub mod error;
pub mod hooks;
pub mod os_kind;
pub mod watcher;

pub use access::{
    DeviceFileAccess, DirVisitor, FileFilter, FileId, FileKind, FilePathInfo, IterationControl,
    KindFilter, Permissions,
};
pub use access::{DesktopFileAccess, ShellDeviceFileAccess};
pub use cache_store::PersistentCacheStore;
pub use command::{CommandOutput, CommandRunner, LocalCommandRunner};
pub use device_path::{DevicePath, DEVICE_ROOT};
pub use error::{FsError, FsResult};
pub use hooks::{set_device_hooks, DeviceHooks};
pub use os_kind::{CaseSensitivity, OsKind};
pub use watcher::{ChangeEvent, FileWatcher, WatchHandle};

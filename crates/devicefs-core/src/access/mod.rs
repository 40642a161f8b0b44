//! File-access capability interface.
//!
//! [`DeviceFileAccess`] is the polymorphic surface every backend implements,
//! one method per filesystem primitive. Every default method body fails with
//! an `Unimplemented` error, so adding a backend can never silently omit an
//! operation; concrete backends override what they support. The few
//! composed operations (`ensure_writable_directory`, `copy_recursively`,
//! `is_same_file`) are provided here once so all backends share their
//! semantics.

pub mod desktop;
pub mod shell;

use std::ops::{BitOr, BitOrAssign};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use globset::{GlobSet, GlobSetBuilder};
use once_cell::sync::OnceCell;

use crate::device_path::DevicePath;
use crate::error::{FsError, FsResult};
use crate::watcher::WatchHandle;

pub use desktop::DesktopFileAccess;
pub use shell::ShellDeviceFileAccess;

/// POSIX-style permission bits for owner/group/other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Permissions(u32);

impl Permissions {
    pub const OWNER_READ: Permissions = Permissions(0o400);
    pub const OWNER_WRITE: Permissions = Permissions(0o200);
    pub const OWNER_EXEC: Permissions = Permissions(0o100);
    pub const GROUP_READ: Permissions = Permissions(0o040);
    pub const GROUP_WRITE: Permissions = Permissions(0o020);
    pub const GROUP_EXEC: Permissions = Permissions(0o010);
    pub const OTHER_READ: Permissions = Permissions(0o004);
    pub const OTHER_WRITE: Permissions = Permissions(0o002);
    pub const OTHER_EXEC: Permissions = Permissions(0o001);

    /// Keep only the nine rwx bits of a raw mode word.
    pub fn from_unix_mode(mode: u32) -> Self {
        Self(mode & 0o777)
    }

    pub fn to_unix_mode(self) -> u32 {
        self.0
    }

    pub fn has(self, bits: Permissions) -> bool {
        self.0 & bits.0 == bits.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Octal text as `chmod` expects it.
    pub fn to_octal_string(self) -> String {
        format!("{:03o}", self.0)
    }
}

impl BitOr for Permissions {
    type Output = Permissions;
    fn bitor(self, rhs: Self) -> Self {
        Permissions(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Kind of filesystem object, as reported without following the final
/// symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl FileKind {
    /// Decode the type nibble of a raw Unix mode word.
    pub fn from_unix_mode(mode: u32) -> Self {
        match mode & 0o170000 {
            0o100000 => Self::File,
            0o040000 => Self::Directory,
            0o120000 => Self::Symlink,
            _ => Self::Other,
        }
    }
}

/// Batched stat-like metadata for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePathInfo {
    pub file_size: u64,
    pub modified_secs: i64,
    pub kind: FileKind,
    pub permissions: Permissions,
}

impl FilePathInfo {
    pub fn last_modified(&self) -> SystemTime {
        if self.modified_secs >= 0 {
            UNIX_EPOCH + Duration::from_secs(self.modified_secs as u64)
        } else {
            UNIX_EPOCH
        }
    }
}

/// Backend-specific unique-identity token used for same-file detection.
/// Two different paths naming the same file (hard links, mounts) yield the
/// same token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId(String);

impl FileId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Which entry kinds a directory iteration yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    All,
    FilesOnly,
    DirectoriesOnly,
}

/// Filter for directory iteration. Name patterns are shell wildcards
/// matched against the entry file name; the compiled matcher is cached per
/// filter instance.
#[derive(Debug, Default)]
pub struct FileFilter {
    pub kind: KindFilter,
    pub name_patterns: Vec<String>,
    pub case_insensitive: bool,
    pub recursive: bool,
    pub follow_symlinks: bool,
    /// Request per-entry metadata alongside each path.
    pub with_info: bool,
    compiled: OnceCell<GlobSet>,
}

impl FileFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patterns(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.name_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Shallow clone that drops the compiled glob cache so helpers can reuse
    /// filters without sharing compilation state.
    pub fn clone_without_cache(&self) -> Self {
        Self {
            kind: self.kind,
            name_patterns: self.name_patterns.clone(),
            case_insensitive: self.case_insensitive,
            recursive: self.recursive,
            follow_symlinks: self.follow_symlinks,
            with_info: self.with_info,
            compiled: OnceCell::new(),
        }
    }

    fn globs(&self) -> &GlobSet {
        self.compiled.get_or_init(|| {
            let mut builder = GlobSetBuilder::new();
            for pattern in &self.name_patterns {
                let mut glob = globset::GlobBuilder::new(pattern);
                glob.case_insensitive(self.case_insensitive);
                if let Ok(glob) = glob.build() {
                    builder.add(glob);
                }
            }
            builder
                .build()
                .unwrap_or_else(|_| GlobSetBuilder::new().build().expect("empty globset"))
        })
    }

    pub fn matches_name(&self, name: &str) -> bool {
        if self.name_patterns.is_empty() {
            return true;
        }
        self.globs().is_match(name)
    }

    pub fn accepts_kind(&self, kind: FileKind) -> bool {
        match self.kind {
            KindFilter::All => true,
            KindFilter::FilesOnly => kind == FileKind::File,
            KindFilter::DirectoriesOnly => kind == FileKind::Directory,
        }
    }
}

impl Clone for FileFilter {
    fn clone(&self) -> Self {
        self.clone_without_cache()
    }
}

/// Callback verdict during directory iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationControl {
    Continue,
    Stop,
}

/// Directory-iteration callback: receives each entry's path and, when the
/// filter requested it, the entry's metadata.
pub type DirVisitor<'a> = dyn FnMut(&DevicePath, Option<&FilePathInfo>) -> IterationControl + 'a;

/// Abstract surface of filesystem primitives.
///
/// Implementations are process-wide singletons (one local instance, one per
/// distinct remote device); paths borrow them for the duration of one
/// operation and backends hold no per-path state.
pub trait DeviceFileAccess: Send + Sync {
    /// Short name used in unimplemented-error logging.
    fn backend_name(&self) -> &'static str;

    fn exists(&self, path: &DevicePath) -> FsResult<bool> {
        Err(self.unsupported("exists", path))
    }

    fn is_file(&self, path: &DevicePath) -> FsResult<bool> {
        Err(self.unsupported("is_file", path))
    }

    fn is_directory(&self, path: &DevicePath) -> FsResult<bool> {
        Err(self.unsupported("is_directory", path))
    }

    fn is_symlink(&self, path: &DevicePath) -> FsResult<bool> {
        Err(self.unsupported("is_symlink", path))
    }

    fn is_readable_file(&self, path: &DevicePath) -> FsResult<bool> {
        Err(self.unsupported("is_readable_file", path))
    }

    fn is_readable_directory(&self, path: &DevicePath) -> FsResult<bool> {
        Err(self.unsupported("is_readable_directory", path))
    }

    fn is_writable_file(&self, path: &DevicePath) -> FsResult<bool> {
        Err(self.unsupported("is_writable_file", path))
    }

    fn is_writable_directory(&self, path: &DevicePath) -> FsResult<bool> {
        Err(self.unsupported("is_writable_directory", path))
    }

    fn is_executable_file(&self, path: &DevicePath) -> FsResult<bool> {
        Err(self.unsupported("is_executable_file", path))
    }

    fn create_directory(&self, path: &DevicePath) -> FsResult<()> {
        Err(self.unsupported("create_directory", path))
    }

    /// Succeed if `path` is already a writable directory, create it if it is
    /// missing, and fail if it exists in any other state. Implemented once
    /// here so every backend shares the exact composition.
    fn ensure_writable_directory(&self, path: &DevicePath) -> FsResult<()> {
        if self.is_writable_directory(path)? {
            return Ok(());
        }
        if !self.exists(path)? {
            return self.create_directory(path);
        }
        Err(FsError::other(format!(
            "{} exists but is not a writable directory",
            path.to_display_string(false)
        )))
    }

    /// Create an empty file if nothing exists at `path`; succeed if a file
    /// is already there.
    fn ensure_existing_file(&self, path: &DevicePath) -> FsResult<()> {
        Err(self.unsupported("ensure_existing_file", path))
    }

    fn remove_file(&self, path: &DevicePath) -> FsResult<()> {
        Err(self.unsupported("remove_file", path))
    }

    fn remove_recursively(&self, path: &DevicePath) -> FsResult<()> {
        Err(self.unsupported("remove_recursively", path))
    }

    fn copy_file(&self, source: &DevicePath, target: &DevicePath) -> FsResult<()> {
        let _ = target;
        Err(self.unsupported("copy_file", source))
    }

    /// Default recursive copy composed from iteration plus per-file copies.
    /// Backends with a faster native strategy override this.
    fn copy_recursively(&self, source: &DevicePath, target: &DevicePath) -> FsResult<()> {
        if !self.is_directory(source)? {
            return Err(FsError::other(format!(
                "{} is not a directory",
                source.to_display_string(false)
            )));
        }
        self.ensure_writable_directory(target)?;

        let mut filter = FileFilter::new();
        filter.recursive = true;
        let mut failure: Option<FsError> = None;
        self.iterate_directory(source, &filter, &mut |entry, _info| {
            let Some(rel) = entry.relative_child_path(source) else {
                return IterationControl::Continue;
            };
            let dest = target.resolved_against(&rel);
            let step = (|| -> FsResult<()> {
                if self.is_directory(entry)? {
                    self.ensure_writable_directory(&dest)
                } else {
                    self.ensure_writable_directory(&dest.parent_directory())?;
                    self.copy_file(entry, &dest)
                }
            })();
            match step {
                Ok(()) => IterationControl::Continue,
                Err(err) => {
                    failure = Some(err.with_context(format!(
                        "copying {} to {}",
                        entry.to_display_string(false),
                        dest.to_display_string(false)
                    )));
                    IterationControl::Stop
                }
            }
        })?;
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn create_symlink(&self, target: &DevicePath, link: &DevicePath) -> FsResult<()> {
        let _ = target;
        Err(self.unsupported("create_symlink", link))
    }

    fn rename_file(&self, source: &DevicePath, target: &DevicePath) -> FsResult<()> {
        let _ = target;
        Err(self.unsupported("rename_file", source))
    }

    fn sym_link_target(&self, path: &DevicePath) -> FsResult<DevicePath> {
        Err(self.unsupported("sym_link_target", path))
    }

    /// Lazy, interruption-capable directory traversal. The callback's return
    /// value controls early termination; metadata is only gathered when the
    /// filter asks for it.
    fn iterate_directory(
        &self,
        path: &DevicePath,
        filter: &FileFilter,
        visit: &mut DirVisitor<'_>,
    ) -> FsResult<()> {
        let _ = (filter, visit);
        Err(self.unsupported("iterate_directory", path))
    }

    /// Read up to `limit` bytes starting at `offset`; the whole file when
    /// `limit` is `None`.
    fn file_contents(
        &self,
        path: &DevicePath,
        limit: Option<u64>,
        offset: u64,
    ) -> FsResult<Vec<u8>> {
        let _ = (limit, offset);
        Err(self.unsupported("file_contents", path))
    }

    /// Returns the number of bytes written.
    fn write_file_contents(&self, path: &DevicePath, data: &[u8]) -> FsResult<u64> {
        let _ = data;
        Err(self.unsupported("write_file_contents", path))
    }

    fn file_path_info(&self, path: &DevicePath) -> FsResult<FilePathInfo> {
        Err(self.unsupported("file_path_info", path))
    }

    fn last_modified(&self, path: &DevicePath) -> FsResult<SystemTime> {
        Ok(self.file_path_info(path)?.last_modified())
    }

    fn permissions(&self, path: &DevicePath) -> FsResult<Permissions> {
        Ok(self.file_path_info(path)?.permissions)
    }

    fn set_permissions(&self, path: &DevicePath, permissions: Permissions) -> FsResult<()> {
        let _ = permissions;
        Err(self.unsupported("set_permissions", path))
    }

    fn file_size(&self, path: &DevicePath) -> FsResult<u64> {
        Ok(self.file_path_info(path)?.file_size)
    }

    fn owner(&self, path: &DevicePath) -> FsResult<String> {
        Err(self.unsupported("owner", path))
    }

    fn owner_id(&self, path: &DevicePath) -> FsResult<u32> {
        Err(self.unsupported("owner_id", path))
    }

    fn group(&self, path: &DevicePath) -> FsResult<String> {
        Err(self.unsupported("group", path))
    }

    fn group_id(&self, path: &DevicePath) -> FsResult<u32> {
        Err(self.unsupported("group_id", path))
    }

    /// Free space on the filesystem holding `path`.
    fn bytes_available(&self, path: &DevicePath) -> FsResult<u64> {
        Err(self.unsupported("bytes_available", path))
    }

    fn file_id(&self, path: &DevicePath) -> FsResult<FileId> {
        Err(self.unsupported("file_id", path))
    }

    fn is_same_device(&self, a: &DevicePath, b: &DevicePath) -> FsResult<bool> {
        let _ = b;
        Err(self.unsupported("is_same_device", a))
    }

    /// Identity comparison through [`file_id`](Self::file_id), so hard links
    /// and differently spelled paths to one file compare equal.
    fn is_same_file(&self, a: &DevicePath, b: &DevicePath) -> FsResult<bool> {
        Ok(self.file_id(a)? == self.file_id(b)?)
    }

    fn is_same_executable(&self, a: &DevicePath, b: &DevicePath) -> FsResult<bool> {
        self.is_same_file(a, b)
    }

    /// Resolve `path` to the executable file it names, applying the OS's
    /// executable-suffix rules when the path has no suffix.
    fn refers_to_executable_file(&self, path: &DevicePath) -> FsResult<Option<DevicePath>> {
        Err(self.unsupported("refers_to_executable_file", path))
    }

    /// Create a unique file from a template path whose name ends in a run of
    /// `X` characters (extended with `XXXXXX` if it does not).
    fn create_temp_file(&self, template: &DevicePath) -> FsResult<DevicePath> {
        Err(self.unsupported("create_temp_file", template))
    }

    fn create_temp_dir(&self, template: &DevicePath) -> FsResult<DevicePath> {
        Err(self.unsupported("create_temp_dir", template))
    }

    /// Register change watches; one handle or error per requested path.
    fn watch(&self, paths: &[DevicePath]) -> Vec<FsResult<WatchHandle>> {
        paths
            .iter()
            .map(|path| Err(self.unsupported("watch", path)))
            .collect()
    }

    /// The process environment of the device.
    fn device_environment(&self) -> FsResult<Vec<(String, String)>> {
        log::debug!(
            "operation 'device_environment' not implemented by backend {}",
            self.backend_name()
        );
        Err(FsError::unimplemented("device_environment"))
    }

    /// Translate a host-native path fragment into this backend's path
    /// representation.
    fn map_to_device_path(&self, host_path: &str) -> FsResult<String> {
        Ok(host_path.to_string())
    }

    /// Atomic-replace saving breaks hard links and misbehaves on some
    /// filesystems; backends answer per path.
    fn supports_atomic_save_file(&self, path: &DevicePath) -> FsResult<bool> {
        Err(self.unsupported("supports_atomic_save_file", path))
    }

    #[doc(hidden)]
    fn unsupported(&self, operation: &'static str, path: &DevicePath) -> FsError {
        log::debug!(
            "operation '{}' not implemented by backend {} (path {})",
            operation,
            self.backend_name(),
            path.to_display_string(false)
        );
        FsError::unimplemented(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BareBackend;

    impl DeviceFileAccess for BareBackend {
        fn backend_name(&self) -> &'static str {
            "bare"
        }
    }

    struct DirBackend {
        dir: DevicePath,
        writable: bool,
    }

    impl DeviceFileAccess for DirBackend {
        fn backend_name(&self) -> &'static str {
            "dir"
        }

        fn exists(&self, path: &DevicePath) -> FsResult<bool> {
            Ok(*path == self.dir)
        }

        fn is_writable_directory(&self, path: &DevicePath) -> FsResult<bool> {
            Ok(*path == self.dir && self.writable)
        }

        fn create_directory(&self, _path: &DevicePath) -> FsResult<()> {
            Ok(())
        }
    }

    #[test]
    fn every_primitive_defaults_to_unimplemented() {
        let backend = BareBackend;
        let path = DevicePath::parse("/x");
        assert!(backend.exists(&path).unwrap_err().is_unimplemented());
        assert!(backend.remove_recursively(&path).unwrap_err().is_unimplemented());
        assert!(backend
            .file_contents(&path, None, 0)
            .unwrap_err()
            .is_unimplemented());
        let handles = backend.watch(&[path]);
        assert_eq!(handles.len(), 1);
        assert!(handles[0].as_ref().unwrap_err().is_unimplemented());
    }

    #[test]
    fn ensure_writable_directory_composition() {
        let dir = DevicePath::parse("/work");
        let ok = DirBackend {
            dir: dir.clone(),
            writable: true,
        };
        assert!(ok.ensure_writable_directory(&dir).is_ok());

        // Missing path: created.
        assert!(ok.ensure_writable_directory(&DevicePath::parse("/gone")).is_ok());

        // Exists but not writable: surfaced, not silently created.
        let bad = DirBackend {
            dir: dir.clone(),
            writable: false,
        };
        let err = bad.ensure_writable_directory(&dir).unwrap_err();
        assert!(err.to_string().contains("not a writable directory"));
    }

    #[test]
    fn permissions_octal_round_trip() {
        for mode in 0..=0o777u32 {
            let perms = Permissions::from_unix_mode(mode);
            assert_eq!(perms.to_unix_mode(), mode);
            let octal = perms.to_octal_string();
            let back = u32::from_str_radix(&octal, 8).unwrap();
            assert_eq!(back, mode);
        }
    }

    #[test]
    fn permissions_bit_queries() {
        let perms = Permissions::from_unix_mode(0o640);
        assert!(perms.has(Permissions::OWNER_READ));
        assert!(perms.has(Permissions::OWNER_WRITE));
        assert!(perms.has(Permissions::GROUP_READ));
        assert!(!perms.has(Permissions::GROUP_WRITE));
        assert!(!perms.has(Permissions::OTHER_READ));
    }

    #[test]
    fn file_kind_from_mode() {
        assert_eq!(FileKind::from_unix_mode(0o100644), FileKind::File);
        assert_eq!(FileKind::from_unix_mode(0o040755), FileKind::Directory);
        assert_eq!(FileKind::from_unix_mode(0o120777), FileKind::Symlink);
    }

    #[test]
    fn filter_matches_wildcards() {
        let filter = FileFilter::new().with_patterns(["*.qml", "*.ui"]);
        assert!(filter.matches_name("scene.qml"));
        assert!(filter.matches_name("form.ui"));
        assert!(!filter.matches_name("notes.txt"));

        let open = FileFilter::new();
        assert!(open.matches_name("anything"));
    }

    #[test]
    fn filter_case_insensitive_patterns() {
        let mut filter = FileFilter::new().with_patterns(["*.QML"]);
        filter.case_insensitive = true;
        assert!(filter.matches_name("scene.qml"));
    }
}

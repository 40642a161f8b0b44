//! Filesystem operations on [`DevicePath`] values.
//!
//! Each method resolves the backend for this path through the registered
//! device hooks and forwards one capability call. The path itself stays a
//! plain value; backends are borrowed for the duration of a single call.

use std::time::SystemTime;

use crate::access::{
    DirVisitor, FileFilter, FileId, FilePathInfo, Permissions,
};
use crate::device_path::DevicePath;
use crate::error::FsResult;
use crate::hooks;
use crate::watcher::WatchHandle;

impl DevicePath {
    pub fn exists(&self) -> FsResult<bool> {
        hooks::file_access_for(self).exists(self)
    }

    pub fn is_file(&self) -> FsResult<bool> {
        hooks::file_access_for(self).is_file(self)
    }

    pub fn is_directory(&self) -> FsResult<bool> {
        hooks::file_access_for(self).is_directory(self)
    }

    pub fn is_symlink(&self) -> FsResult<bool> {
        hooks::file_access_for(self).is_symlink(self)
    }

    pub fn is_readable_file(&self) -> FsResult<bool> {
        hooks::file_access_for(self).is_readable_file(self)
    }

    pub fn is_writable_directory(&self) -> FsResult<bool> {
        hooks::file_access_for(self).is_writable_directory(self)
    }

    pub fn is_executable_file(&self) -> FsResult<bool> {
        hooks::file_access_for(self).is_executable_file(self)
    }

    pub fn create_directory(&self) -> FsResult<()> {
        hooks::file_access_for(self).create_directory(self)
    }

    pub fn ensure_writable_directory(&self) -> FsResult<()> {
        hooks::file_access_for(self).ensure_writable_directory(self)
    }

    pub fn ensure_existing_file(&self) -> FsResult<()> {
        hooks::file_access_for(self).ensure_existing_file(self)
    }

    pub fn remove_file(&self) -> FsResult<()> {
        hooks::file_access_for(self).remove_file(self)
    }

    pub fn remove_recursively(&self) -> FsResult<()> {
        hooks::file_access_for(self).remove_recursively(self)
    }

    /// Copy to `target`, which may live on a different device. Same-device
    /// copies go through the backend's native copy; cross-device copies are
    /// sequenced as a read from the source backend followed by a write
    /// through the target's.
    pub fn copy_file(&self, target: &DevicePath) -> FsResult<()> {
        if self.scheme() == target.scheme() && self.host() == target.host() {
            return hooks::file_access_for(self).copy_file(self, target);
        }
        let contents = self.file_contents(None, 0).map_err(|err| {
            err.with_context(format!("copying {}", self.to_display_string(false)))
        })?;
        target.write_file_contents(&contents).map_err(|err| {
            err.with_context(format!("writing {}", target.to_display_string(false)))
        })?;
        Ok(())
    }

    pub fn copy_recursively(&self, target: &DevicePath) -> FsResult<()> {
        hooks::file_access_for(self).copy_recursively(self, target)
    }

    pub fn create_symlink(&self, link: &DevicePath) -> FsResult<()> {
        hooks::file_access_for(self).create_symlink(self, link)
    }

    pub fn rename_file(&self, target: &DevicePath) -> FsResult<()> {
        hooks::file_access_for(self).rename_file(self, target)
    }

    pub fn sym_link_target(&self) -> FsResult<DevicePath> {
        hooks::file_access_for(self).sym_link_target(self)
    }

    pub fn iterate_directory(&self, filter: &FileFilter, visit: &mut DirVisitor<'_>) -> FsResult<()> {
        hooks::file_access_for(self).iterate_directory(self, filter, visit)
    }

    /// Collect matching entries eagerly. Prefer
    /// [`iterate_directory`](Self::iterate_directory) for large trees.
    pub fn dir_entries(&self, filter: &FileFilter) -> FsResult<Vec<DevicePath>> {
        let mut entries = Vec::new();
        self.iterate_directory(filter, &mut |entry, _info| {
            entries.push(entry.clone());
            crate::access::IterationControl::Continue
        })?;
        Ok(entries)
    }

    pub fn file_contents(&self, limit: Option<u64>, offset: u64) -> FsResult<Vec<u8>> {
        hooks::file_access_for(self).file_contents(self, limit, offset)
    }

    pub fn write_file_contents(&self, data: &[u8]) -> FsResult<u64> {
        hooks::file_access_for(self).write_file_contents(self, data)
    }

    pub fn file_path_info(&self) -> FsResult<FilePathInfo> {
        hooks::file_access_for(self).file_path_info(self)
    }

    pub fn last_modified(&self) -> FsResult<SystemTime> {
        hooks::file_access_for(self).last_modified(self)
    }

    pub fn permissions(&self) -> FsResult<Permissions> {
        hooks::file_access_for(self).permissions(self)
    }

    pub fn set_permissions(&self, permissions: Permissions) -> FsResult<()> {
        hooks::file_access_for(self).set_permissions(self, permissions)
    }

    pub fn file_size(&self) -> FsResult<u64> {
        hooks::file_access_for(self).file_size(self)
    }

    pub fn owner(&self) -> FsResult<String> {
        hooks::file_access_for(self).owner(self)
    }

    pub fn group(&self) -> FsResult<String> {
        hooks::file_access_for(self).group(self)
    }

    pub fn bytes_available(&self) -> FsResult<u64> {
        hooks::file_access_for(self).bytes_available(self)
    }

    pub fn file_id(&self) -> FsResult<FileId> {
        hooks::file_access_for(self).file_id(self)
    }

    pub fn is_same_file_as(&self, other: &DevicePath) -> FsResult<bool> {
        hooks::file_access_for(self).is_same_file(self, other)
    }

    pub fn is_same_executable_as(&self, other: &DevicePath) -> FsResult<bool> {
        hooks::file_access_for(self).is_same_executable(self, other)
    }

    pub fn refers_to_executable_file(&self) -> FsResult<Option<DevicePath>> {
        hooks::file_access_for(self).refers_to_executable_file(self)
    }

    pub fn create_temp_file(&self) -> FsResult<DevicePath> {
        hooks::file_access_for(self).create_temp_file(self)
    }

    pub fn create_temp_dir(&self) -> FsResult<DevicePath> {
        hooks::file_access_for(self).create_temp_dir(self)
    }

    pub fn watch(&self) -> FsResult<WatchHandle> {
        hooks::file_access_for(self)
            .watch(std::slice::from_ref(self))
            .remove(0)
    }

    pub fn device_environment(&self) -> FsResult<Vec<(String, String)>> {
        if !self.is_local() {
            if let Some(env) = hooks::device_environment(self) {
                return Ok(env);
            }
        }
        hooks::file_access_for(self).device_environment()
    }

    pub fn supports_atomic_save_file(&self) -> FsResult<bool> {
        hooks::file_access_for(self).supports_atomic_save_file(self)
    }
}

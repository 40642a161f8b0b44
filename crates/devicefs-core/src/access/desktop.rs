//! Local filesystem backend.
//!
//! Maps every capability primitive onto native OS calls on the machine
//! running the process. Identity queries use device+inode tokens (volume
//! serial + file index on Windows) rather than path comparison, so hard
//! links and differently spelled paths to one file compare equal. Recursive
//! copy streams through an in-process tar pack/unpack pair and falls back
//! to a parallel walk+copy when the stream fails or is disabled.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::UNIX_EPOCH;

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::device_path::DevicePath;
use crate::error::{FsError, FsResult};
use crate::os_kind::OsKind;
use crate::watcher::{FileWatcher, WatchHandle};

use super::{
    DeviceFileAccess, DirVisitor, FileFilter, FileId, FileKind, FilePathInfo, IterationControl,
    Permissions,
};

/// Set to `1` to force the walk+copy strategy for recursive copies.
const DISABLE_TAR_ENV: &str = "DEVICEFS_DISABLE_TAR_COPY";

/// Chunk size of the in-process tar stream.
const TAR_CHUNK: usize = 1024 * 1024;

/// Backend for the local machine. Stateless; one shared instance serves the
/// whole process.
#[derive(Debug, Default)]
pub struct DesktopFileAccess;

impl DesktopFileAccess {
    pub fn new() -> Self {
        Self
    }
}

fn native(path: &DevicePath) -> PathBuf {
    PathBuf::from(path.path())
}

fn io_err(path: &DevicePath, err: &std::io::Error) -> FsError {
    if err.kind() == std::io::ErrorKind::NotFound {
        FsError::not_found(path.to_display_string(false))
    } else {
        FsError::io(err, Some(path.to_display_string(false)))
    }
}

fn metadata_to_info(meta: &fs::Metadata) -> FilePathInfo {
    let modified_secs = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let kind = if meta.file_type().is_symlink() {
        FileKind::Symlink
    } else if meta.is_dir() {
        FileKind::Directory
    } else if meta.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    };
    FilePathInfo {
        file_size: meta.len(),
        modified_secs,
        kind,
        permissions: native_permissions(meta),
    }
}

#[cfg(unix)]
fn native_permissions(meta: &fs::Metadata) -> Permissions {
    use std::os::unix::fs::PermissionsExt;
    Permissions::from_unix_mode(meta.permissions().mode())
}

#[cfg(not(unix))]
fn native_permissions(meta: &fs::Metadata) -> Permissions {
    if meta.permissions().readonly() {
        Permissions::from_unix_mode(0o555)
    } else {
        Permissions::from_unix_mode(0o755)
    }
}

#[cfg(unix)]
fn access_ok(path: &Path, mode: libc::c_int) -> bool {
    use std::os::unix::ffi::OsStrExt;
    let Ok(cpath) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: cpath is a valid NUL-terminated string for the duration of
    // the call.
    unsafe { libc::access(cpath.as_ptr(), mode) == 0 }
}

#[cfg(not(unix))]
fn access_ok(path: &Path, _mode: i32) -> bool {
    path.exists()
}

#[cfg(unix)]
const READ_OK: libc::c_int = libc::R_OK;
#[cfg(unix)]
const WRITE_OK: libc::c_int = libc::W_OK;
#[cfg(unix)]
const EXEC_OK: libc::c_int = libc::X_OK;
#[cfg(not(unix))]
const READ_OK: i32 = 0;
#[cfg(not(unix))]
const WRITE_OK: i32 = 0;
#[cfg(not(unix))]
const EXEC_OK: i32 = 0;

/// Directories that recursive removal refuses to touch, resolved once per
/// call: the filesystem root, the user's home, and the OS-standard document
/// and application-data locations.
fn protected_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    dirs.push(PathBuf::from("/"));
    if let Some(base) = directories::BaseDirs::new() {
        dirs.push(base.home_dir().to_path_buf());
        dirs.push(base.config_dir().to_path_buf());
        dirs.push(base.data_dir().to_path_buf());
        dirs.push(base.cache_dir().to_path_buf());
    }
    if let Some(user) = directories::UserDirs::new() {
        for candidate in [user.document_dir(), user.download_dir(), user.desktop_dir()] {
            if let Some(dir) = candidate {
                dirs.push(dir.to_path_buf());
            }
        }
    }
    if cfg!(windows) {
        for drive in ["c:\\", "c:/"] {
            dirs.push(PathBuf::from(drive));
        }
    }
    dirs
}

/// Candidate spellings of an executable path under the OS's suffix rules:
/// the path itself plus, when it has no suffix, every suffixed variant.
fn executable_candidates(path: &DevicePath) -> Vec<DevicePath> {
    let mut candidates = vec![path.clone()];
    if !path.suffix().is_empty() {
        return candidates;
    }
    let suffixes: Vec<String> = if OsKind::host() == OsKind::Windows {
        match env::var("PATHEXT") {
            Ok(pathext) => pathext
                .split(';')
                .filter(|s| !s.is_empty())
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            Err(_) => OsKind::Windows
                .exec_suffixes()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    } else {
        Vec::new()
    };
    for suffix in suffixes {
        candidates.push(path.with_new_path(format!("{}{}", path.path(), suffix)));
    }
    candidates
}

impl DeviceFileAccess for DesktopFileAccess {
    fn backend_name(&self) -> &'static str {
        "desktop"
    }

    fn exists(&self, path: &DevicePath) -> FsResult<bool> {
        Ok(fs::symlink_metadata(native(path)).is_ok())
    }

    fn is_file(&self, path: &DevicePath) -> FsResult<bool> {
        Ok(fs::metadata(native(path)).map(|m| m.is_file()).unwrap_or(false))
    }

    fn is_directory(&self, path: &DevicePath) -> FsResult<bool> {
        Ok(fs::metadata(native(path)).map(|m| m.is_dir()).unwrap_or(false))
    }

    fn is_symlink(&self, path: &DevicePath) -> FsResult<bool> {
        Ok(fs::symlink_metadata(native(path))
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false))
    }

    fn is_readable_file(&self, path: &DevicePath) -> FsResult<bool> {
        let native = native(path);
        Ok(native.is_file() && access_ok(&native, READ_OK))
    }

    fn is_readable_directory(&self, path: &DevicePath) -> FsResult<bool> {
        let native = native(path);
        Ok(native.is_dir() && access_ok(&native, READ_OK))
    }

    fn is_writable_file(&self, path: &DevicePath) -> FsResult<bool> {
        let native = native(path);
        Ok(native.is_file() && access_ok(&native, WRITE_OK))
    }

    fn is_writable_directory(&self, path: &DevicePath) -> FsResult<bool> {
        let native = native(path);
        Ok(native.is_dir() && access_ok(&native, WRITE_OK))
    }

    fn is_executable_file(&self, path: &DevicePath) -> FsResult<bool> {
        let native = native(path);
        Ok(native.is_file() && access_ok(&native, EXEC_OK))
    }

    fn create_directory(&self, path: &DevicePath) -> FsResult<()> {
        fs::create_dir_all(native(path)).map_err(|err| io_err(path, &err))
    }

    fn ensure_existing_file(&self, path: &DevicePath) -> FsResult<()> {
        let native = native(path);
        match fs::metadata(&native) {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(FsError::other(format!(
                "{} exists but is not a file",
                path.to_display_string(false)
            ))),
            Err(_) => {
                if let Some(parent) = native.parent() {
                    fs::create_dir_all(parent).map_err(|err| io_err(path, &err))?;
                }
                OpenOptions::new()
                    .create_new(true)
                    .write(true)
                    .open(&native)
                    .map(|_| ())
                    .map_err(|err| io_err(path, &err))
            }
        }
    }

    fn remove_file(&self, path: &DevicePath) -> FsResult<()> {
        fs::remove_file(native(path)).map_err(|err| io_err(path, &err))
    }

    fn remove_recursively(&self, path: &DevicePath) -> FsResult<()> {
        let native = native(path);
        if !path.is_absolute_path() {
            return Err(FsError::refused(
                "recursive removal requires an absolute path",
                Some(path.to_display_string(false)),
            ));
        }
        // The guard must run before any deletion and abort the whole
        // operation when it trips.
        let resolved = fs::canonicalize(&native).unwrap_or_else(|_| native.clone());
        for protected in protected_dirs() {
            let protected = fs::canonicalize(&protected).unwrap_or(protected);
            if resolved == protected {
                return Err(FsError::refused(
                    "refusing to delete a protected directory",
                    Some(path.to_display_string(false)),
                ));
            }
        }
        let meta = fs::symlink_metadata(&native).map_err(|err| io_err(path, &err))?;
        if meta.is_dir() {
            fs::remove_dir_all(&native).map_err(|err| io_err(path, &err))
        } else {
            fs::remove_file(&native).map_err(|err| io_err(path, &err))
        }
    }

    fn copy_file(&self, source: &DevicePath, target: &DevicePath) -> FsResult<()> {
        let src = native(source);
        let dst = native(target);
        fs::copy(&src, &dst).map_err(|err| io_err(source, &err))?;
        // Keep mtimes comparable across copies; failure here is harmless.
        if let Ok(meta) = fs::metadata(&src) {
            if let Ok(modified) = meta.modified() {
                let _ = filetime::set_file_mtime(&dst, filetime::FileTime::from_system_time(modified));
            }
        }
        Ok(())
    }

    fn copy_recursively(&self, source: &DevicePath, target: &DevicePath) -> FsResult<()> {
        if !self.is_directory(source)? {
            return Err(FsError::other(format!(
                "{} is not a directory",
                source.to_display_string(false)
            )));
        }
        self.ensure_writable_directory(target)?;

        let tar_disabled = env::var(DISABLE_TAR_ENV)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if !tar_disabled {
            match tar_stream_copy(&native(source), &native(target)) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    log::warn!(
                        "tar stream copy {} -> {} failed ({err}); falling back to walk copy",
                        source.to_display_string(false),
                        target.to_display_string(false)
                    );
                }
            }
        }
        walk_copy(&native(source), &native(target))
            .map_err(|err| err.with_context(format!(
                "copying {} to {}",
                source.to_display_string(false),
                target.to_display_string(false)
            )))
    }

    fn create_symlink(&self, target: &DevicePath, link: &DevicePath) -> FsResult<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(native(target), native(link))
                .map_err(|err| io_err(link, &err))
        }
        #[cfg(windows)]
        {
            let target_native = native(target);
            let result = if target_native.is_dir() {
                std::os::windows::fs::symlink_dir(&target_native, native(link))
            } else {
                std::os::windows::fs::symlink_file(&target_native, native(link))
            };
            result.map_err(|err| io_err(link, &err))
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = target;
            Err(self.unsupported("create_symlink", link))
        }
    }

    fn rename_file(&self, source: &DevicePath, target: &DevicePath) -> FsResult<()> {
        fs::rename(native(source), native(target)).map_err(|err| io_err(source, &err))
    }

    fn sym_link_target(&self, path: &DevicePath) -> FsResult<DevicePath> {
        let target = fs::read_link(native(path)).map_err(|err| io_err(path, &err))?;
        Ok(path.with_new_path(target.to_string_lossy().into_owned()))
    }

    fn iterate_directory(
        &self,
        path: &DevicePath,
        filter: &FileFilter,
        visit: &mut DirVisitor<'_>,
    ) -> FsResult<()> {
        let root = native(path);
        if !root.is_dir() {
            return Err(FsError::not_found(path.to_display_string(false)));
        }
        let max_depth = if filter.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(&root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(filter.follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::debug!("skipping unreadable entry under {}: {err}", root.display());
                    continue;
                }
            };
            let kind = if entry.file_type().is_dir() {
                FileKind::Directory
            } else if entry.file_type().is_file() {
                FileKind::File
            } else if entry.file_type().is_symlink() {
                FileKind::Symlink
            } else {
                FileKind::Other
            };
            if !filter.accepts_kind(kind) {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !filter.matches_name(&name) {
                continue;
            }
            let entry_path =
                path.with_new_path(entry.path().to_string_lossy().replace('\\', "/"));
            let info = if filter.with_info {
                entry.metadata().ok().map(|meta| metadata_to_info(&meta))
            } else {
                None
            };
            if visit(&entry_path, info.as_ref()) == IterationControl::Stop {
                break;
            }
        }
        Ok(())
    }

    fn file_contents(
        &self,
        path: &DevicePath,
        limit: Option<u64>,
        offset: u64,
    ) -> FsResult<Vec<u8>> {
        let mut file = File::open(native(path)).map_err(|err| io_err(path, &err))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))
                .map_err(|err| io_err(path, &err))?;
        }
        let mut data = Vec::new();
        match limit {
            Some(limit) => {
                file.take(limit)
                    .read_to_end(&mut data)
                    .map_err(|err| io_err(path, &err))?;
            }
            None => {
                file.read_to_end(&mut data).map_err(|err| io_err(path, &err))?;
            }
        }
        Ok(data)
    }

    fn write_file_contents(&self, path: &DevicePath, data: &[u8]) -> FsResult<u64> {
        fs::write(native(path), data).map_err(|err| io_err(path, &err))?;
        Ok(data.len() as u64)
    }

    fn file_path_info(&self, path: &DevicePath) -> FsResult<FilePathInfo> {
        let native = native(path);
        let meta = fs::metadata(&native)
            .or_else(|_| fs::symlink_metadata(&native))
            .map_err(|err| io_err(path, &err))?;
        Ok(metadata_to_info(&meta))
    }

    fn set_permissions(&self, path: &DevicePath, permissions: Permissions) -> FsResult<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(
                native(path),
                fs::Permissions::from_mode(permissions.to_unix_mode()),
            )
            .map_err(|err| io_err(path, &err))
        }
        #[cfg(not(unix))]
        {
            let native = native(path);
            let meta = fs::metadata(&native).map_err(|err| io_err(path, &err))?;
            let mut perms = meta.permissions();
            perms.set_readonly(!permissions.has(Permissions::OWNER_WRITE));
            fs::set_permissions(&native, perms).map_err(|err| io_err(path, &err))
        }
    }

    #[cfg(unix)]
    fn owner(&self, path: &DevicePath) -> FsResult<String> {
        let uid = self.owner_id(path)?;
        user_name_for(uid).ok_or_else(|| {
            FsError::other(format!("no user database entry for uid {uid}"))
        })
    }

    #[cfg(unix)]
    fn owner_id(&self, path: &DevicePath) -> FsResult<u32> {
        use std::os::unix::fs::MetadataExt;
        let meta = fs::metadata(native(path)).map_err(|err| io_err(path, &err))?;
        Ok(meta.uid())
    }

    #[cfg(unix)]
    fn group(&self, path: &DevicePath) -> FsResult<String> {
        let gid = self.group_id(path)?;
        group_name_for(gid).ok_or_else(|| {
            FsError::other(format!("no group database entry for gid {gid}"))
        })
    }

    #[cfg(unix)]
    fn group_id(&self, path: &DevicePath) -> FsResult<u32> {
        use std::os::unix::fs::MetadataExt;
        let meta = fs::metadata(native(path)).map_err(|err| io_err(path, &err))?;
        Ok(meta.gid())
    }

    fn bytes_available(&self, path: &DevicePath) -> FsResult<u64> {
        bytes_available_native(&native(path)).ok_or_else(|| {
            FsError::other(format!(
                "cannot determine free space for {}",
                path.to_display_string(false)
            ))
        })
    }

    fn file_id(&self, path: &DevicePath) -> FsResult<FileId> {
        file_id_native(&native(path))
            .ok_or_else(|| FsError::not_found(path.to_display_string(false)))
    }

    fn is_same_device(&self, a: &DevicePath, b: &DevicePath) -> FsResult<bool> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let dev_a = fs::metadata(native(a)).map_err(|err| io_err(a, &err))?.dev();
            let dev_b = fs::metadata(native(b)).map_err(|err| io_err(b, &err))?.dev();
            Ok(dev_a == dev_b)
        }
        #[cfg(not(unix))]
        {
            let root = |p: &DevicePath| {
                p.path()
                    .chars()
                    .take_while(|c| *c != '/')
                    .collect::<String>()
                    .to_ascii_lowercase()
            };
            Ok(root(a) == root(b))
        }
    }

    fn is_same_executable(&self, a: &DevicePath, b: &DevicePath) -> FsResult<bool> {
        for candidate_a in executable_candidates(a) {
            let Ok(id_a) = self.file_id(&candidate_a) else {
                continue;
            };
            for candidate_b in executable_candidates(b) {
                if let Ok(id_b) = self.file_id(&candidate_b) {
                    if id_a == id_b {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    fn refers_to_executable_file(&self, path: &DevicePath) -> FsResult<Option<DevicePath>> {
        for candidate in executable_candidates(path) {
            if self.is_executable_file(&candidate)? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn create_temp_file(&self, template: &DevicePath) -> FsResult<DevicePath> {
        let (dir, prefix) = split_template(template)?;
        let file = tempfile::Builder::new()
            .prefix(&prefix)
            .tempfile_in(&dir)
            .map_err(|err| io_err(template, &err))?;
        let (_, path) = file.keep().map_err(|err| {
            FsError::other(format!("cannot keep temporary file: {err}"))
        })?;
        Ok(template.with_new_path(path.to_string_lossy().replace('\\', "/")))
    }

    fn create_temp_dir(&self, template: &DevicePath) -> FsResult<DevicePath> {
        let (dir, prefix) = split_template(template)?;
        let tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&dir)
            .map_err(|err| io_err(template, &err))?;
        let path = tmp.keep();
        Ok(template.with_new_path(path.to_string_lossy().replace('\\', "/")))
    }

    fn watch(&self, paths: &[DevicePath]) -> Vec<FsResult<WatchHandle>> {
        paths
            .iter()
            .map(|path| FileWatcher::global().watch(path))
            .collect()
    }

    fn device_environment(&self) -> FsResult<Vec<(String, String)>> {
        Ok(env::vars().collect())
    }

    fn supports_atomic_save_file(&self, path: &DevicePath) -> FsResult<bool> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            // Atomic replace would sever the other names of a hard-linked
            // file.
            if let Ok(meta) = fs::metadata(native(path)) {
                if meta.nlink() > 1 {
                    return Ok(false);
                }
            }
        }
        #[cfg(target_os = "linux")]
        {
            if let Some(fs_type) = filesystem_type(&native(path)) {
                // msdos / exfat rename is not reliably atomic.
                const MSDOS_SUPER_MAGIC: i64 = 0x4d44;
                const EXFAT_SUPER_MAGIC: i64 = 0x2011_bab0;
                if fs_type == MSDOS_SUPER_MAGIC || fs_type == EXFAT_SUPER_MAGIC {
                    return Ok(false);
                }
            }
        }
        let _ = path;
        Ok(true)
    }
}

/// Directory and name prefix of a temp-file template; the trailing run of
/// `X` characters is dropped (the OS generator supplies the unique part).
fn split_template(template: &DevicePath) -> FsResult<(PathBuf, String)> {
    let parent = template.parent_directory();
    let dir = if parent.path().is_empty() {
        env::temp_dir()
    } else {
        PathBuf::from(parent.path())
    };
    let name = template.file_name();
    let prefix = name.trim_end_matches('X');
    let prefix = if prefix.is_empty() { "tmp" } else { prefix };
    Ok((dir, prefix.to_string()))
}

#[cfg(unix)]
fn file_id_native(path: &Path) -> Option<FileId> {
    use std::os::unix::fs::MetadataExt;
    let meta = fs::metadata(path).ok()?;
    Some(FileId::new(format!("{}:{}", meta.dev(), meta.ino())))
}

#[cfg(windows)]
fn file_id_native(path: &Path) -> Option<FileId> {
    use std::os::windows::io::AsRawHandle;
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::Storage::FileSystem::{
        GetFileInformationByHandle, BY_HANDLE_FILE_INFORMATION,
    };

    let file = OpenOptions::new().read(true).open(path).ok()?;
    let handle = HANDLE(file.as_raw_handle());
    let mut info = BY_HANDLE_FILE_INFORMATION::default();
    // SAFETY: the handle is open for the duration of the call and the
    // struct is a plain output buffer.
    unsafe { GetFileInformationByHandle(handle, &mut info).ok()? };
    Some(FileId::new(format!(
        "{}:{}:{}",
        info.dwVolumeSerialNumber, info.nFileIndexHigh, info.nFileIndexLow
    )))
}

#[cfg(not(any(unix, windows)))]
fn file_id_native(_path: &Path) -> Option<FileId> {
    None
}

#[cfg(unix)]
fn bytes_available_native(path: &Path) -> Option<u64> {
    use std::os::unix::ffi::OsStrExt;
    let cpath = std::ffi::CString::new(path.as_os_str().as_bytes()).ok()?;
    // SAFETY: statvfs only writes into the zeroed output struct.
    unsafe {
        let mut stats: libc::statvfs = std::mem::zeroed();
        if libc::statvfs(cpath.as_ptr(), &mut stats) != 0 {
            return None;
        }
        Some(stats.f_bavail as u64 * stats.f_frsize as u64)
    }
}

#[cfg(not(unix))]
fn bytes_available_native(path: &Path) -> Option<u64> {
    let _ = path;
    None
}

#[cfg(target_os = "linux")]
fn filesystem_type(path: &Path) -> Option<i64> {
    use std::os::unix::ffi::OsStrExt;
    let probe = if path.exists() {
        path.to_path_buf()
    } else {
        path.parent()?.to_path_buf()
    };
    let cpath = std::ffi::CString::new(probe.as_os_str().as_bytes()).ok()?;
    // SAFETY: statfs only writes into the zeroed output struct.
    unsafe {
        let mut stats: libc::statfs = std::mem::zeroed();
        if libc::statfs(cpath.as_ptr(), &mut stats) != 0 {
            return None;
        }
        Some(stats.f_type as i64)
    }
}

#[cfg(unix)]
fn user_name_for(uid: u32) -> Option<String> {
    // SAFETY: getpwuid_r writes the result into caller-owned buffers; the
    // name is copied out before the buffers go away.
    unsafe {
        let mut passwd: libc::passwd = std::mem::zeroed();
        let mut buf = vec![0u8; 4096];
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        if libc::getpwuid_r(
            uid,
            &mut passwd,
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            &mut result,
        ) != 0
            || result.is_null()
        {
            return None;
        }
        Some(
            std::ffi::CStr::from_ptr(passwd.pw_name)
                .to_string_lossy()
                .into_owned(),
        )
    }
}

#[cfg(unix)]
fn group_name_for(gid: u32) -> Option<String> {
    // SAFETY: as for user_name_for.
    unsafe {
        let mut group: libc::group = std::mem::zeroed();
        let mut buf = vec![0u8; 4096];
        let mut result: *mut libc::group = std::ptr::null_mut();
        if libc::getgrgid_r(
            gid,
            &mut group,
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            &mut result,
        ) != 0
            || result.is_null()
        {
            return None;
        }
        Some(
            std::ffi::CStr::from_ptr(group.gr_name)
                .to_string_lossy()
                .into_owned(),
        )
    }
}

struct ChannelWriter {
    tx: Sender<Vec<u8>>,
    buffer: Vec<u8>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= TAR_CHUNK {
            self.flush()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(TAR_CHUNK));
            self.tx
                .send(chunk)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))?;
        }
        Ok(())
    }
}

struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    buffer: Vec<u8>,
    pos: usize,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.buffer.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.buffer = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let available = &self.buffer[self.pos..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.pos += count;
        Ok(count)
    }
}

/// Copy a directory tree by packing it into an in-process tar stream on one
/// thread and unpacking on another, so no intermediate archive touches disk.
fn tar_stream_copy(source: &Path, dest: &Path) -> FsResult<()> {
    let (tx, rx) = bounded::<Vec<u8>>(64);
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();

    let packer = thread::spawn(move || -> std::io::Result<()> {
        let mut writer = ChannelWriter {
            tx,
            buffer: Vec::with_capacity(TAR_CHUNK),
        };
        {
            let mut builder = tar::Builder::new(&mut writer);
            builder.follow_symlinks(false);
            builder.append_dir_all(".", &source)?;
            builder.finish()?;
        }
        writer.flush()
    });

    let unpacker = thread::spawn(move || -> std::io::Result<()> {
        let reader = ChannelReader {
            rx,
            buffer: Vec::new(),
            pos: 0,
        };
        let mut archive = tar::Archive::new(reader);
        archive.set_preserve_permissions(true);
        archive.unpack(&dest)
    });

    let pack_result = packer
        .join()
        .map_err(|_| FsError::other("tar packer thread panicked"))?;
    let unpack_result = unpacker
        .join()
        .map_err(|_| FsError::other("tar unpacker thread panicked"))?;
    pack_result.map_err(|err| FsError::io(&err, None))?;
    unpack_result.map_err(|err| FsError::io(&err, None))?;
    Ok(())
}

/// Manual fallback: replicate the directory structure, then copy the files
/// in parallel.
fn walk_copy(source: &Path, dest: &Path) -> FsResult<()> {
    let mut files: Vec<(PathBuf, PathBuf)> = Vec::new();
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(|err| FsError::other(err.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| FsError::other("walked entry escaped the source root"))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|err| FsError::io(&err, None))?;
        } else if entry.file_type().is_file() {
            files.push((entry.path().to_path_buf(), target));
        }
    }
    files
        .par_iter()
        .try_for_each(|(src, dst)| -> FsResult<()> {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent).map_err(|err| FsError::io(&err, None))?;
            }
            fs::copy(src, dst).map_err(|err| FsError::io(&err, None))?;
            Ok(())
        })
}

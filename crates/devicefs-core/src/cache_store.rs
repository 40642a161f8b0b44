//! Persistent key/value cache under the user's config directory.
//!
//! Expensive per-device facts (probed tool availability, device OS details)
//! survive restarts as one JSON file per cache key. The file name is a
//! sanitized rendition of the key, so two keys can collide on disk; every
//! file embeds its full key and a read that finds a different key fails with
//! a `Mismatch` instead of returning a stranger's data. The cache stays
//! on-device and can be disabled via `DEVICEFS_DISABLE_CACHE=1`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FsError, FsResult};

const DISABLE_ENV: &str = "DEVICEFS_DISABLE_CACHE";

/// On-disk shape of one cache file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    key: String,
    values: Map<String, Value>,
}

/// File-backed cache of JSON maps, one file per key.
#[derive(Debug, Clone)]
pub struct PersistentCacheStore {
    base: PathBuf,
}

impl PersistentCacheStore {
    /// Store under the OS-standard config location for this tool.
    pub fn new() -> FsResult<Self> {
        Ok(Self { base: cache_dir()? })
    }

    /// Store rooted at an explicit directory.
    pub fn with_base_dir(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The cached map for `key`, `None` when nothing was stored.
    pub fn read(&self, key: &str) -> FsResult<Option<Map<String, Value>>> {
        if cache_disabled() {
            return Ok(None);
        }
        let path = self.file_for(key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(FsError::io(&err, Some(path.display().to_string()))),
        };
        let file: CacheFile = serde_json::from_str(&text)
            .map_err(|err| FsError::other(format!("corrupt cache file {}: {err}", path.display())))?;
        if file.key != key {
            return Err(FsError::mismatch(format!(
                "cache file {} belongs to key '{}', not '{key}'",
                path.display(),
                file.key
            )));
        }
        Ok(Some(file.values))
    }

    pub fn write(&self, key: &str, values: Map<String, Value>) -> FsResult<()> {
        if cache_disabled() {
            return Ok(());
        }
        let path = self.file_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| FsError::io(&err, Some(parent.display().to_string())))?;
        }
        let file = CacheFile {
            key: key.to_string(),
            values,
        };
        let text = serde_json::to_string_pretty(&file)
            .map_err(|err| FsError::other(format!("serialize cache entry: {err}")))?;
        fs::write(&path, text).map_err(|err| FsError::io(&err, Some(path.display().to_string())))
    }

    /// Drop the stored map for `key`. Removing an absent entry succeeds.
    pub fn remove(&self, key: &str) -> FsResult<()> {
        let path = self.file_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FsError::io(&err, Some(path.display().to_string()))),
        }
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{}.json", sanitized_file_name(key)))
    }
}

fn cache_disabled() -> bool {
    env::var(DISABLE_ENV)
        .map(|val| val == "1" || val.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn cache_dir() -> FsResult<PathBuf> {
    if let Some(proj) = ProjectDirs::from("", "", "devicefs") {
        return Ok(proj.config_dir().join("caches"));
    }
    let home = env::var_os("HOME")
        .ok_or_else(|| FsError::other("cannot determine HOME directory for the cache store"))?;
    Ok(Path::new(&home).join(".config").join("devicefs").join("caches"))
}

/// A filesystem-friendly rendition of the key. Collisions are possible and
/// harmless; the embedded key check catches them on read.
fn sanitized_file_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        name.push('_');
    }
    name.truncate(120);
    name
}

//! Process-wide backend resolution hooks.
//!
//! Embedding code registers one [`DeviceHooks`] value at startup to route
//! device-qualified paths to their backends without this crate depending on
//! any transport implementation. Registration is single-assignment: a second
//! call is rejected. Before hooks are registered, a path with a non-empty
//! scheme resolves to the desktop backend after a logged assertion rather
//! than crashing.

use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};

use crate::access::{DesktopFileAccess, DeviceFileAccess};
use crate::device_path::DevicePath;
use crate::error::{FsError, FsResult};
use crate::os_kind::OsKind;

type ResolveFn = dyn Fn(&DevicePath) -> Option<Arc<dyn DeviceFileAccess>> + Send + Sync;
type SameDeviceFn = dyn Fn(&DevicePath, &DevicePath) -> bool + Send + Sync;
type OsKindFn = dyn Fn(&DevicePath) -> OsKind + Send + Sync;
type EnvironmentFn = dyn Fn(&DevicePath) -> Option<Vec<(String, String)>> + Send + Sync;
type DisplayNameFn = dyn Fn(&DevicePath) -> Option<String> + Send + Sync;

/// Injectable strategy object mapping a path's (scheme, host) to backend
/// behavior. One per process, assigned once at startup.
pub struct DeviceHooks {
    /// Backend instance for a device path; `None` when the device is unknown.
    pub resolve: Box<ResolveFn>,
    /// Whether two device paths share a storage device.
    pub is_same_device: Box<SameDeviceFn>,
    /// OS family of the device a path lives on.
    pub os_kind: Box<OsKindFn>,
    /// Cached process environment of the device; `None` defers to the
    /// backend's own query.
    pub environment: Box<EnvironmentFn>,
    /// User-facing name of the device, for display strings.
    pub display_name: Box<DisplayNameFn>,
}

impl DeviceHooks {
    /// Hooks that know no devices; every query falls back to local behavior.
    pub fn unregistered() -> Self {
        Self {
            resolve: Box::new(|_| None),
            is_same_device: Box::new(|a, b| a.scheme() == b.scheme() && a.host() == b.host()),
            os_kind: Box::new(|_| OsKind::Linux),
            environment: Box::new(|_| None),
            display_name: Box::new(|_| None),
        }
    }
}

static HOOKS: OnceCell<DeviceHooks> = OnceCell::new();

// Served while nothing is registered yet; must stay out of HOOKS so an
// early query does not block a later registration.
static UNREGISTERED: Lazy<DeviceHooks> = Lazy::new(DeviceHooks::unregistered);

static DESKTOP: Lazy<Arc<DesktopFileAccess>> = Lazy::new(|| Arc::new(DesktopFileAccess::new()));

/// Register the process-wide hooks. Fails if hooks were already registered;
/// the original registration stays in effect.
pub fn set_device_hooks(hooks: DeviceHooks) -> FsResult<()> {
    HOOKS
        .set(hooks)
        .map_err(|_| FsError::assertion("device hooks are already registered"))
}

fn hooks() -> &'static DeviceHooks {
    HOOKS.get().unwrap_or(&UNREGISTERED)
}

/// The shared local backend instance.
pub fn desktop_access() -> Arc<DesktopFileAccess> {
    DESKTOP.clone()
}

/// Resolve the backend for `path`. Local paths use the desktop singleton;
/// unresolvable device paths fall back to it with a logged assertion, which
/// flags a missing registration rather than a runtime condition.
pub fn file_access_for(path: &DevicePath) -> Arc<dyn DeviceFileAccess> {
    if path.is_local() {
        return DESKTOP.clone();
    }
    match (hooks().resolve)(path) {
        Some(backend) => backend,
        None => {
            log::warn!(
                "no backend registered for scheme '{}' (path {}); falling back to desktop",
                path.scheme(),
                path.to_display_string(false)
            );
            DESKTOP.clone()
        }
    }
}

/// OS family reported for a device path; local paths never reach here.
pub fn device_os_kind(path: &DevicePath) -> OsKind {
    (hooks().os_kind)(path)
}

pub fn is_same_device(a: &DevicePath, b: &DevicePath) -> bool {
    if a.is_local() && b.is_local() {
        return true;
    }
    (hooks().is_same_device)(a, b)
}

/// Device environment known to the embedding, when it registered one.
pub fn device_environment(path: &DevicePath) -> Option<Vec<(String, String)>> {
    (hooks().environment)(path)
}

/// User-facing device name, when the embedding registered one.
pub fn device_display_name(path: &DevicePath) -> Option<String> {
    (hooks().display_name)(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_scheme_falls_back_to_desktop() {
        let path = DevicePath::parse("nosuch://dev/x");
        let backend = file_access_for(&path);
        assert_eq!(backend.backend_name(), "desktop");
    }

    #[test]
    fn local_paths_use_the_desktop_singleton() {
        let backend = file_access_for(&DevicePath::parse("/tmp"));
        assert_eq!(backend.backend_name(), "desktop");
    }

    #[test]
    fn queries_before_registration_do_not_claim_the_slot() {
        // Hooks are process-global, so the registered value must keep the
        // unregistered defaults for the other tests in this binary.
        let early = DevicePath::parse("docker://1/x");
        assert_eq!(device_os_kind(&early), OsKind::Linux);
        set_device_hooks(DeviceHooks::unregistered())
            .expect("registration after a query must still succeed");
        assert!(set_device_hooks(DeviceHooks::unregistered()).is_err());
        assert_eq!(device_os_kind(&early), OsKind::Linux);
    }
}

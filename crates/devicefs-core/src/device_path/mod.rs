//! Device-qualified path value type.
//!
//! A [`DevicePath`] addresses a location on the local filesystem or on a
//! remote device as a (scheme, host, path) triple. Values are cheap to clone
//! and compare; no filesystem access happens in this module. Operations that
//! do touch a filesystem live in [`ops`] and dispatch through the backend
//! resolved for the path's scheme and host.
//!
//! Accepted input syntaxes:
//! - a bare local path (`/usr/bin/ls`, `c:/temp`, `rel/file`)
//! - `scheme://host/path` for an absolute device path
//! - `scheme://host/./path` where `./` marks a path relative to the
//!   device's working directory
//! - the special-root form `/__devices__/scheme/host/path`, which lets a
//!   device path round-trip through APIs that only accept one plain string
//!
//! Backslashes are normalized to forward slashes on input so native Windows
//! separators and portable slash paths parse the same way.

pub mod clean;
mod ops;

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::hooks;
use crate::os_kind::{CaseSensitivity, OsKind};

pub use clean::{clean_path, is_absolute, root_length};

/// Prefix of the special-root encoding for device paths.
pub const DEVICE_ROOT: &str = "/__devices__";

/// A location in a possibly remote filesystem.
///
/// Empty `scheme` means the local filesystem; `host` identifies the remote
/// endpoint and is empty for local paths. `path` is forward-slash
/// normalized and may be relative (stored without a leading `./`).
#[derive(Debug, Clone, Default, Eq)]
pub struct DevicePath {
    scheme: String,
    host: String,
    path: String,
}

impl DevicePath {
    /// Build a path from explicit components. `path` is separator-normalized
    /// and a leading `./` relative marker is stripped.
    pub fn from_parts(
        scheme: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let mut path: String = path.into();
        if path.contains('\\') {
            path = path.replace('\\', "/");
        }
        if let Some(rest) = path.strip_prefix("./") {
            path = rest.to_string();
        }
        Self {
            scheme: scheme.into(),
            host: host.into(),
            path,
        }
    }

    /// Build a local path.
    pub fn local(path: impl Into<String>) -> Self {
        Self::from_parts("", "", path)
    }

    /// Parse any of the accepted syntaxes. Parsing never fails: malformed
    /// scheme syntax falls back to treating the whole input as a local path.
    pub fn parse(text: &str) -> Self {
        let text = if text.contains('\\') {
            text.replace('\\', "/")
        } else {
            text.to_string()
        };

        if let Some(rest) = text.strip_prefix(DEVICE_ROOT) {
            if let Some(parsed) = Self::parse_device_root(rest) {
                return parsed;
            }
        }

        if let Some((scheme, rest)) = text.split_once("://") {
            if is_valid_scheme(scheme) {
                let (host, tail) = match rest.find('/') {
                    Some(pos) => (&rest[..pos], &rest[pos..]),
                    None => (rest, ""),
                };
                let path = tail_to_path(tail);
                return Self {
                    scheme: scheme.to_string(),
                    host: decode_host(host),
                    path,
                };
            }
        }

        Self {
            scheme: String::new(),
            host: String::new(),
            path: text,
        }
    }

    /// Parse the remainder of a `/__devices__/scheme/host/path` string
    /// (with the marker already stripped, leading slash still present).
    fn parse_device_root(rest: &str) -> Option<Self> {
        let rest = rest.strip_prefix('/')?;
        let (scheme, rest) = rest.split_once('/')?;
        if !is_valid_scheme(scheme) {
            return None;
        }
        let (host, tail) = match rest.find('/') {
            Some(pos) => (&rest[..pos], &rest[pos..]),
            None => (rest, ""),
        };
        Some(Self {
            scheme: scheme.to_string(),
            host: decode_host(host),
            path: tail_to_path(tail),
        })
    }

    /// Parse user-typed text: like [`parse`](Self::parse), but the path is
    /// lexically cleaned and a leading `~` expands to the home directory.
    /// Home expansion for device paths requires the device environment and
    /// is left to the embedding code; the `~` is preserved there.
    pub fn parse_user_input(text: &str) -> Self {
        let mut parsed = Self::parse(text);
        if parsed.is_local() {
            if let Some(rest) = parsed
                .path
                .strip_prefix("~/")
                .or_else(|| (parsed.path == "~").then_some(""))
            {
                if let Some(base) = directories::BaseDirs::new() {
                    let home = base.home_dir().to_string_lossy().replace('\\', "/");
                    parsed.path = if rest.is_empty() {
                        home
                    } else {
                        format!("{home}/{rest}")
                    };
                }
            }
        }
        if !parsed.path.is_empty() {
            parsed.path = clean_path(&parsed.path);
            if parsed.path == "." {
                parsed.path.clear();
            }
        }
        parsed
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_local(&self) -> bool {
        self.scheme.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.scheme.is_empty() && self.host.is_empty() && self.path.is_empty()
    }

    pub fn is_absolute_path(&self) -> bool {
        is_absolute(&self.path)
    }

    pub fn is_relative_path(&self) -> bool {
        !self.path.is_empty() && !self.is_absolute_path()
    }

    /// OS family of the machine this path lives on. Local paths use the
    /// host OS; device paths ask the registered hooks and default to Linux.
    pub fn os_kind(&self) -> OsKind {
        if self.is_local() {
            OsKind::host()
        } else {
            hooks::device_os_kind(self)
        }
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.os_kind().case_sensitivity()
    }

    /// Reconstruct the `scheme://host/path` form; the bare path for local
    /// paths. A relative device path gets its `/./` marker back so the
    /// round trip preserves relativity.
    pub fn to_canonical_string(&self) -> String {
        if self.is_local() {
            return self.path.clone();
        }
        format!(
            "{}://{}{}",
            self.scheme,
            encode_host(&self.host),
            self.path_tail()
        )
    }

    /// The special-root form usable by string-only APIs.
    pub fn to_device_rooted_string(&self) -> String {
        if self.is_local() {
            return self.path.clone();
        }
        format!(
            "{DEVICE_ROOT}/{}/{}{}",
            self.scheme,
            encode_host(&self.host),
            self.path_tail()
        )
    }

    /// Scheme/host-qualified form for user-facing messages. The host is not
    /// percent-encoded here; with `native_separators` a local path uses the
    /// separator convention of the host OS.
    pub fn to_display_string(&self, native_separators: bool) -> String {
        if self.is_local() {
            return if native_separators && self.os_kind() == OsKind::Windows {
                self.path.replace('/', "\\")
            } else {
                self.path.clone()
            };
        }
        // Device paths render with the same tail as the canonical form, so
        // an empty host still reads `scheme://<tail>`.
        format!("{}://{}{}", self.scheme, self.host, self.path_tail())
    }

    fn path_tail(&self) -> String {
        if self.path.is_empty() {
            String::new()
        } else if self.is_relative_path() {
            format!("/./{}", self.path)
        } else if self.path.starts_with('/') {
            self.path.clone()
        } else {
            // Drive-letter absolute path on a device.
            format!("/{}", self.path)
        }
    }

    /// Final path segment.
    pub fn file_name(&self) -> &str {
        let path = self.path.trim_end_matches('/');
        match path.rfind('/') {
            Some(pos) => &path[pos + 1..],
            None => path,
        }
    }

    /// Text after the last dot of the file name; `.ui.qml` is treated as a
    /// single two-part suffix.
    pub fn suffix(&self) -> &str {
        let name = self.file_name();
        if has_two_part_suffix(name) {
            return &name[name.len() - "ui.qml".len()..];
        }
        match name.rfind('.') {
            Some(pos) => &name[pos + 1..],
            None => "",
        }
    }

    /// Text after the first dot of the file name.
    pub fn complete_suffix(&self) -> &str {
        let name = self.file_name();
        match name.find('.') {
            Some(pos) => &name[pos + 1..],
            None => "",
        }
    }

    /// File name up to the first dot.
    pub fn base_name(&self) -> &str {
        let name = self.file_name();
        match name.find('.') {
            Some(pos) => &name[..pos],
            None => name,
        }
    }

    /// File name up to the last dot; up to the first dot of the two-part
    /// `.ui.qml` suffix.
    pub fn complete_base_name(&self) -> &str {
        let name = self.file_name();
        if has_two_part_suffix(name) {
            return &name[..name.len() - ".ui.qml".len()];
        }
        match name.rfind('.') {
            Some(pos) => &name[..pos],
            None => name,
        }
    }

    /// Replace only the path component, preserving scheme and host.
    pub fn with_new_path(&self, path: impl Into<String>) -> Self {
        Self::from_parts(self.scheme.clone(), self.host.clone(), path)
    }

    /// Lexical parent, computed by appending `/..` and re-cleaning. At the
    /// root the result has an empty path component.
    pub fn parent_directory(&self) -> Self {
        if self.path.is_empty() {
            return self.with_new_path("");
        }
        // Clean first so a trailing slash cannot turn `/` + `/..` into a
        // string that reads as a `//host` prefix.
        let base = clean_path(&self.path);
        if root_length(&base) == base.len() {
            return self.with_new_path("");
        }
        let cleaned = clean_path(&format!("{base}/.."));
        if cleaned == base {
            return self.with_new_path("");
        }
        self.with_new_path(cleaned)
    }

    /// Resolve `tail` against this path: an absolute tail wins unchanged, a
    /// relative tail is concatenated and cleaned.
    pub fn resolved_against(&self, tail: &DevicePath) -> Self {
        if tail.is_absolute_path() {
            return tail.clone();
        }
        if tail.path.is_empty() {
            return self.clone();
        }
        let joined = if self.path.is_empty() {
            tail.path.clone()
        } else {
            format!("{}/{}", self.path, tail.path)
        };
        self.with_new_path(clean_path(&joined))
    }

    /// Append one or more relative segments.
    pub fn join(&self, segments: &str) -> Self {
        self.resolved_against(&DevicePath::local(segments))
    }

    /// Whether `self` lies strictly below `parent`. `/tmpdir` is not a
    /// child of `/tmp`; the boundary must fall on a separator.
    pub fn is_child_of(&self, parent: &DevicePath) -> bool {
        if self.scheme != parent.scheme || self.host != parent.host {
            return false;
        }
        if parent.path.is_empty() || self.path.len() <= parent.path.len() {
            return false;
        }
        let cs = self.case_sensitivity();
        let head = &self.path[..parent.path.len()];
        if !str_eq(head, &parent.path, cs) {
            return false;
        }
        parent.path.ends_with('/') || self.path.as_bytes()[parent.path.len()] == b'/'
    }

    /// The path of `self` relative to `parent`, when `self` is its child.
    /// The result carries no scheme or host.
    pub fn relative_child_path(&self, parent: &DevicePath) -> Option<DevicePath> {
        if !self.is_child_of(parent) {
            return None;
        }
        let rest = self.path[parent.path.len()..].trim_start_matches('/');
        Some(DevicePath::local(rest))
    }

    /// Lexical relative path from `anchor` to `self`: one `..` per anchor
    /// component past the common prefix, then the remaining target
    /// components. Identical paths yield `.`.
    pub fn relative_path_from(&self, anchor: &DevicePath) -> DevicePath {
        let target = clean_path(&self.path);
        let base = clean_path(&anchor.path);
        let cs = self.case_sensitivity();

        let target_parts: Vec<&str> = split_segments(&target);
        let base_parts: Vec<&str> = split_segments(&base);

        let mut common = 0usize;
        while common < target_parts.len()
            && common < base_parts.len()
            && str_eq(target_parts[common], base_parts[common], cs)
        {
            common += 1;
        }

        let ups = base_parts.len() - common;
        let mut out = String::new();
        for _ in 0..ups {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str("..");
        }
        for part in &target_parts[common..] {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(part);
        }
        if out.is_empty() {
            out.push('.');
        }
        DevicePath::local(out)
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

fn has_two_part_suffix(name: &str) -> bool {
    name.len() > ".ui.qml".len()
        && name[name.len() - ".ui.qml".len()..].eq_ignore_ascii_case(".ui.qml")
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Convert the text after the host (leading slash included) to the stored
/// path form, consuming the `/./` relative marker.
fn tail_to_path(tail: &str) -> String {
    if let Some(rest) = tail.strip_prefix("/./") {
        rest.to_string()
    } else if tail == "/." {
        String::new()
    } else {
        tail.to_string()
    }
}

/// Percent-decode the host segment; only `%25` and `%2f` are meaningful.
fn decode_host(host: &str) -> String {
    let mut out = String::with_capacity(host.len());
    let bytes = host.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 3 <= bytes.len() {
            match &host[i + 1..i + 3] {
                "25" => {
                    out.push('%');
                    i += 3;
                    continue;
                }
                "2f" | "2F" => {
                    out.push('/');
                    i += 3;
                    continue;
                }
                _ => {}
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

fn encode_host(host: &str) -> String {
    let mut out = String::with_capacity(host.len());
    for c in host.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2f"),
            other => out.push(other),
        }
    }
    out
}

fn str_eq(a: &str, b: &str, cs: CaseSensitivity) -> bool {
    match cs {
        CaseSensitivity::Sensitive => a == b,
        CaseSensitivity::Insensitive => a.eq_ignore_ascii_case(b),
    }
}

fn str_cmp(a: &str, b: &str, cs: CaseSensitivity) -> std::cmp::Ordering {
    match cs {
        CaseSensitivity::Sensitive => a.cmp(b),
        CaseSensitivity::Insensitive => a
            .chars()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.chars().map(|c| c.to_ascii_lowercase())),
    }
}

impl PartialEq for DevicePath {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.host == other.host
            && str_eq(&self.path, &other.path, self.case_sensitivity())
    }
}

impl PartialOrd for DevicePath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DevicePath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.scheme
            .cmp(&other.scheme)
            .then_with(|| self.host.cmp(&other.host))
            .then_with(|| str_cmp(&self.path, &other.path, self.case_sensitivity()))
    }
}

impl Hash for DevicePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.hash(state);
        self.host.hash(state);
        match self.case_sensitivity() {
            CaseSensitivity::Sensitive => self.path.hash(state),
            CaseSensitivity::Insensitive => self.path.to_ascii_lowercase().hash(state),
        }
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string(false))
    }
}

impl From<&str> for DevicePath {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<&std::path::Path> for DevicePath {
    fn from(path: &std::path::Path) -> Self {
        Self::local(path.to_string_lossy().into_owned())
    }
}

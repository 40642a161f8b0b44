//! Lexical path cleanup.
//!
//! Resolves `.` and `..` segments without touching the filesystem, scanning
//! from the rightmost segment leftward while carrying an up-count for `..`
//! segments that cannot be resolved inside the path itself. The non-path
//! prefix (leading slash, drive letter, UNC host) is detected separately and
//! reapplied untouched.

/// Length of the absolute-root prefix of `path`, or 0 for relative paths.
///
/// Recognized roots: `/`, a drive letter followed by `:/` (or a bare `X:`),
/// and UNC-style `//host/` prefixes. Drive letters are accepted regardless
/// of the local OS because the path may belong to a Windows-tagged device.
pub fn root_length(path: &str) -> usize {
    let bytes = path.as_bytes();
    if bytes.starts_with(b"//") {
        // UNC: the root spans the host segment and its trailing slash.
        match path[2..].find('/') {
            Some(pos) => 2 + pos + 1,
            None => path.len(),
        }
    } else if bytes.first() == Some(&b'/') {
        1
    } else if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        if bytes.get(2) == Some(&b'/') {
            3
        } else {
            2
        }
    } else {
        0
    }
}

/// Whether `path` denotes an absolute location.
pub fn is_absolute(path: &str) -> bool {
    root_length(path) > 0
}

/// Normalize separators and resolve `.`/`..` segments lexically.
///
/// Duplicate slashes collapse, a trailing slash is dropped (except on the
/// root itself), unresolved `..` segments survive only in relative paths,
/// and an empty relative result collapses to `.`.
pub fn clean_path(path: &str) -> String {
    let normalized: String = path.replace('\\', "/");
    let root = root_length(&normalized);
    let (prefix, rest) = normalized.split_at(root);

    // Scan backward, emit forward: segments are collected right-to-left so a
    // `..` can swallow the next real segment we encounter to its left.
    let mut kept: Vec<&str> = Vec::new();
    let mut up_count = 0usize;
    for segment in rest.split('/').rev() {
        match segment {
            "" | "." => {}
            ".." => up_count += 1,
            real => {
                if up_count > 0 {
                    up_count -= 1;
                } else {
                    kept.push(real);
                }
            }
        }
    }
    kept.reverse();

    let mut out = String::with_capacity(normalized.len());
    out.push_str(prefix);
    if root == 0 {
        // Unresolved `..` at the start of a relative path survives.
        for _ in 0..up_count {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str("..");
        }
    }
    for segment in &kept {
        if !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(segment);
    }

    if out.is_empty() {
        ".".to_string()
    } else {
        out
    }
}

//! Host OS tag attached to device paths.
//!
//! A path's OS tag drives case sensitivity for comparisons, executable
//! suffix matching, and which `stat` format family the shell backend uses.
//! It describes the OS of the machine the path lives on, which for remote
//! paths is not the local host.

/// Operating-system family a path is associated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsKind {
    Linux,
    MacOs,
    Windows,
}

/// Whether path comparison on a given OS honors character case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}

impl OsKind {
    /// The OS running this process.
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    pub fn case_sensitivity(self) -> CaseSensitivity {
        match self {
            Self::Linux => CaseSensitivity::Sensitive,
            Self::MacOs | Self::Windows => CaseSensitivity::Insensitive,
        }
    }

    /// Suffixes appended to a suffixless candidate when matching
    /// executables. Mirrors the PATHEXT convention on Windows; empty on
    /// POSIX systems where executables carry no mandatory suffix.
    pub fn exec_suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Windows => &[".exe", ".cmd", ".bat", ".com"],
            Self::Linux | Self::MacOs => &[],
        }
    }

    pub fn is_unix(self) -> bool {
        matches!(self, Self::Linux | Self::MacOs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_and_macos_compare_case_insensitively() {
        assert_eq!(OsKind::Windows.case_sensitivity(), CaseSensitivity::Insensitive);
        assert_eq!(OsKind::MacOs.case_sensitivity(), CaseSensitivity::Insensitive);
        assert_eq!(OsKind::Linux.case_sensitivity(), CaseSensitivity::Sensitive);
    }

    #[test]
    fn only_windows_carries_exec_suffixes() {
        assert!(OsKind::Windows.exec_suffixes().contains(&".exe"));
        assert!(OsKind::Linux.exec_suffixes().is_empty());
    }
}

//! Failure taxonomy for file-access operations.
//!
//! Every capability primitive returns [`FsResult`]; callers branch on the
//! error kind instead of inspecting sentinel values:
//! - Unimplemented: the backend does not support this primitive at all
//! - Assertion: an internal precondition was violated (programming error)
//! - CommandFailed: a shell command exited non-zero; carries its stderr
//! - Refused: a deliberate safety guard tripped; never downgraded to a no-op
//! - NotFound / Mismatch: missing resource or failed key validation

use std::io;

/// A failed file-access operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// The backend does not implement this primitive.
    Unimplemented { operation: &'static str },
    /// Internal precondition violated; a bug in the embedding code.
    Assertion { message: String },
    /// A shell command exited non-zero.
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    /// A safety guard refused to perform a destructive operation.
    Refused {
        message: String,
        path: Option<String>,
    },
    /// The requested resource does not exist.
    NotFound { path: String },
    /// A stored key or cached value failed validation.
    Mismatch { message: String },
    /// An OS-level I/O failure, with the offending path when known.
    Io {
        message: String,
        path: Option<String>,
    },
    /// Free-text failure that fits no other category.
    Other { message: String },
}

impl FsError {
    pub fn unimplemented(operation: &'static str) -> Self {
        Self::Unimplemented { operation }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }

    pub fn command_failed(
        command: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    pub fn refused(message: impl Into<String>, path: Option<String>) -> Self {
        Self::Refused {
            message: message.into(),
            path,
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::Mismatch {
            message: message.into(),
        }
    }

    pub fn io(err: &io::Error, path: Option<String>) -> Self {
        Self::Io {
            message: err.to_string(),
            path,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Wrap the error with additional context text. Used by composed
    /// operations at the outermost call only.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        match self {
            Self::Other { message } => Self::Other {
                message: format!("{context}: {message}"),
            },
            other => Self::Other {
                message: format!("{context}: {other}"),
            },
        }
    }

    pub fn is_unimplemented(&self) -> bool {
        matches!(self, Self::Unimplemented { .. })
    }

    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Refused { .. })
    }
}

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unimplemented { operation } => {
                write!(f, "operation '{operation}' is not implemented by this backend")
            }
            Self::Assertion { message } => write!(f, "internal assertion failed: {message}"),
            Self::CommandFailed {
                command,
                exit_code,
                stderr,
            } => {
                let code = exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    write!(f, "command '{command}' failed (exit {code})")
                } else {
                    write!(f, "command '{command}' failed (exit {code}): {stderr}")
                }
            }
            Self::Refused { message, path } => match path {
                Some(path) => write!(f, "refusing unsafe operation on {path}: {message}"),
                None => write!(f, "refusing unsafe operation: {message}"),
            },
            Self::NotFound { path } => write!(f, "{path}: not found"),
            Self::Mismatch { message } => write!(f, "{message}"),
            Self::Io { message, path } => match path {
                Some(path) => write!(f, "{path}: {message}"),
                None => write!(f, "{message}"),
            },
            Self::Other { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for FsError {}

/// Result type for all capability-interface operations.
pub type FsResult<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failure_carries_stderr() {
        let err = FsError::command_failed("stat /x", Some(1), "stat: cannot stat '/x'\n");
        let rendered = err.to_string();
        assert!(rendered.contains("exit 1"));
        assert!(rendered.contains("cannot stat"));
    }

    #[test]
    fn refusal_is_detectable() {
        let err = FsError::refused("path too shallow", Some("/a/b".to_string()));
        assert!(err.is_refusal());
        assert!(err.to_string().contains("/a/b"));
    }

    #[test]
    fn unimplemented_names_the_operation() {
        let err = FsError::unimplemented("watch");
        assert!(err.is_unimplemented());
        assert!(err.to_string().contains("watch"));
    }
}

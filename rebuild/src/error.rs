//! Error types and result definitions for rebuild operations.
//!
//! [`RebuildError`] carries a classification, a static description, optional dynamic detail, the
//! originating error and the callsite where it was raised. Any error reaching the pipeline fails
//! the run.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for rebuild operations using [`RebuildError`] as the error type.
pub type RebuildResult<T> = Result<T, RebuildError>;

/// Main error type of the rebuild.
#[derive(Debug, Clone)]
pub struct RebuildError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Categories of errors that can occur while rebuilding.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Discovery Errors
    DiscoveryError,
    MissingTableDescriptor,

    // Command Errors
    CommandFailed,
    CommandSpawnFailed,
    GatherOutputInvalid,

    // State & Workflow Errors
    InvalidState,
    RunAborted,
}

impl RebuildError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
    ) -> Self {
        RebuildError {
            kind,
            description,
            detail,
            source: None,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }
}

impl fmt::Display for RebuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        write_detail(self.detail.as_deref(), f, 1)?;
        write_backtrace(self.backtrace.as_ref(), f, 1)?;

        Ok(())
    }
}

impl error::Error for RebuildError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            if line.trim().is_empty() {
                write!(f, "\n{indent_str}  ")?;
            } else {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    let indent_str = "  ".repeat(indent);
    if detail.trim().is_empty() {
        return write!(f, "\n{indent_str}Detail: <empty>");
    }

    write!(f, "\n{indent_str}Detail:")?;
    for line in detail.lines() {
        if line.trim().is_empty() {
            write!(f, "\n{indent_str}  ")?;
        } else {
            write!(f, "\n{indent_str}  {line}")?;
        }
    }

    Ok(())
}

/// Creates a [`RebuildError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for RebuildError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> RebuildError {
        RebuildError::from_components(kind, Cow::Borrowed(desc), None)
    }
}

/// Creates a [`RebuildError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for RebuildError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> RebuildError {
        RebuildError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, rebuild_error};

    #[test]
    fn macro_attaches_detail_and_location() {
        let err = rebuild_error!(
            ErrorKind::CommandFailed,
            "Command exited with a non-zero status",
            format!("table marker, exit code {}", 3)
        );

        assert_eq!(err.kind(), ErrorKind::CommandFailed);
        assert_eq!(err.detail(), Some("table marker, exit code 3"));

        let rendered = err.to_string();
        assert!(rendered.starts_with("[CommandFailed] Command exited with a non-zero status @ "));
        assert!(rendered.contains(file!()));
        assert!(rendered.contains("Detail:\n    table marker, exit code 3"));
    }

    #[test]
    fn source_is_exposed() {
        let io = std::io::Error::other("pipe closed");
        let err = rebuild_error!(ErrorKind::CommandSpawnFailed, "Spawn failed", source: io);

        assert_eq!(err.detail(), None);
        assert_eq!(
            error::Error::source(&err).map(ToString::to_string),
            Some("pipe closed".to_string())
        );
    }

    #[test]
    fn bail_returns_early() {
        fn fails() -> RebuildResult<()> {
            bail!(ErrorKind::InvalidState, "Invalid state", "stage went backwards");
        }

        let err = fails().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.detail(), Some("stage went backwards"));
    }
}

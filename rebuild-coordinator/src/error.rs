use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for coordinator setup.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors preventing a rebuild from running at all.
///
/// Failures of the rebuild itself are not errors of the binary, they are reported by the run
/// summary.
#[derive(Debug)]
pub enum CoordinatorError {
    /// Configuration or telemetry setup error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error, for example while building the runtime.
    Io(std::io::Error, CapturedBacktrace),
}

impl CoordinatorError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            CoordinatorError::Config(_, _) => "configuration error",
            CoordinatorError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> &Backtrace {
        match self {
            CoordinatorError::Config(_, cb) => &cb.0,
            CoordinatorError::Io(_, cb) => &cb.0,
        }
    }

    /// Creates a configuration error from any error.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        CoordinatorError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("rebuild could not start\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        // The direct source is already part of the error line.
        let mut source = Error::source(self).and_then(|err| err.source());
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace() {
            out.push_str("backtrace:\n");
            out.push_str(&self.backtrace().to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorError::Config(source, _) => write!(f, "configuration error: {source}"),
            CoordinatorError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CoordinatorError::Config(source, _) => Some(source.as_ref()),
            CoordinatorError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for CoordinatorError {
    fn from(err: std::io::Error) -> Self {
        CoordinatorError::Io(err, CapturedBacktrace::capture())
    }
}

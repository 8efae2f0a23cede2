use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Variable selecting the environment configuration layer.
pub const ENVIRONMENT_VARIABLE: &str = "APP_ENVIRONMENT";

/// Deployment the coordinator runs in. Each has its own `dev.yaml` or `prod.yaml` layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    /// Local rebuilds with small ceilings and frequent progress reports.
    #[default]
    Dev,
    /// Rebuilds of the public database, which also export metrics.
    Prod,
}

/// An [`ENVIRONMENT_VARIABLE`] value naming no known environment.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown environment `{0}`, expected `dev` or `prod`")]
pub struct UnknownEnvironment(pub String);

impl Environment {
    /// Reads [`ENVIRONMENT_VARIABLE`], falling back to [`Environment::Dev`] when it is unset.
    pub fn from_env() -> Result<Self, UnknownEnvironment> {
        match std::env::var(ENVIRONMENT_VARIABLE) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Stem of the configuration file holding this environment's layer.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(UnknownEnvironment(value.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_and_short_names_are_accepted() {
        assert_eq!("PROD".parse(), Ok(Environment::Prod));
        assert_eq!(" production ".parse(), Ok(Environment::Prod));
        assert_eq!("dev".parse(), Ok(Environment::Dev));
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let err = "staging".parse::<Environment>().unwrap_err();

        assert_eq!(err, UnknownEnvironment("staging".to_string()));
        assert!(err.to_string().contains("`staging`"));
    }
}

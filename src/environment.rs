//! The environment selects which `config/<environment>.yaml` gets loaded.
//!
//! ```rust,no_run
//! use durastore::environment::{resolve_from_env, Environment};
//!
//! # fn run() -> durastore::Result<()> {
//! let config = Environment::from(resolve_from_env()).load()?;
//! # Ok(())
//! # }
//! ```
use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_variant::to_variant_name;

use crate::{config::Config, Result};

pub const DEFAULT_ENVIRONMENT: &str = "development";
/// Variable naming the environment to boot.
pub const DURASTORE_ENV: &str = "DURASTORE_ENV";

/// The environment named by `DURASTORE_ENV`, `development` when unset.
#[must_use]
pub fn resolve_from_env() -> String {
    std::env::var(DURASTORE_ENV).unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string())
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub enum Environment {
    #[serde(rename = "production")]
    Production,
    #[serde(rename = "development")]
    Development,
    #[serde(rename = "test")]
    Test,
    /// Any other name, loaded from a config file of the same name.
    Any(String),
}

impl Environment {
    /// Loads this environment's configuration from the `config` folder.
    ///
    /// # Errors
    ///
    /// Returns an error when no configuration file exists for the
    /// environment or it does not parse.
    pub fn load(&self) -> Result<Config> {
        Config::new(self)
    }

    /// Loads this environment's configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when no configuration file exists in `path` or it
    /// does not parse.
    pub fn load_from_folder<P: AsRef<Path>>(&self, path: P) -> Result<Config> {
        Config::from_folder(self, path.as_ref())
    }
}

impl From<String> for Environment {
    fn from(name: String) -> Self {
        match name.parse() {
            Ok(env) => env,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Self::Any(name) = self {
            return f.write_str(name);
        }
        f.write_str(to_variant_name(self).map_err(|_| fmt::Error)?)
    }
}

impl FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match name {
            "production" => Self::Production,
            "development" => Self::Development,
            "test" => Self::Test,
            other => Self::Any(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use rstest::rstest;
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_resolve_env() {
        let original = env::var(DURASTORE_ENV);

        env::remove_var(DURASTORE_ENV);
        assert_eq!(resolve_from_env(), "development");
        env::set_var(DURASTORE_ENV, "custom");
        assert_eq!(resolve_from_env(), "custom");

        match original {
            Ok(v) => env::set_var(DURASTORE_ENV, v),
            Err(_) => env::remove_var(DURASTORE_ENV),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!("production", Environment::Production.to_string());
        assert_eq!("custom", Environment::Any("custom".to_string()).to_string());
    }

    #[rstest]
    #[case("production", Environment::Production)]
    #[case("test", Environment::Test)]
    #[case("staging", Environment::Any("staging".to_string()))]
    fn test_into(#[case] input: &str, #[case] expected: Environment) {
        let e: Environment = input.to_string().into();
        assert_eq!(e, expected);
    }
}

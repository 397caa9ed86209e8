//! # Configuration Management
//!
//! This module defines the configuration structures and functions to manage and
//! load configuration settings for the storage layer.

/***
When adding a configuration value:

* Add the field with a rustdoc comment and a serde default where one applies
* Add it, commented, to `config/development.yaml`
* Production has no defaults for account options; every account lists them

***/

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use fs_err as fs;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    duplication::{DuplicationConfig, DuplicationRetry},
    environment::Environment,
    logger,
    storage::stateless::StatelessConfig,
    Error, Result,
};

lazy_static! {
    static ref DEFAULT_FOLDER: PathBuf = PathBuf::from("config");
}

/// Main configuration structure.
///
/// The configuration can be customized through YAML files for different
/// environments.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logger: Logger,
    pub storage: Storage,
    /// Checksum, mimetype and space creation behavior of every provider.
    #[serde(default)]
    pub stateless: StatelessConfig,
    pub duplication: Option<Duplication>,
}

/// Logger configuration
///
/// Example (development):
/// ```yaml
/// # config/development.yaml
/// logger:
///   enable: true
///   level: debug
///   format: compact
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Logger {
    /// Install a stdout subscriber at boot.
    pub enable: bool,

    /// `off` | `trace` | `debug` | `info` | `warn` | `error`
    #[serde(default)]
    pub level: logger::LogLevel,

    /// `compact` | `pretty` | `json`
    #[serde(default)]
    pub format: logger::Format,

    /// A full `EnvFilter` directive string replacing the module whitelist,
    /// e.g. `durastore=trace,opendal=debug`.
    pub override_filter: Option<String>,
}

/// Storage accounts
///
/// Example:
/// ```yaml
/// storage:
///   accounts:
///     - id: "1"
///       provider: MEMORY
///       primary: true
///     - id: "2"
///       provider: FILESYSTEM
///       options:
///         root: /var/lib/durastore
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Storage {
    pub accounts: Vec<Account>,
}

/// A configured storage account, identified by its store id.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Account {
    /// The store id callers use to address this account.
    pub id: String,

    pub provider: ProviderType,

    /// Exactly one account is primary. It serves calls that name no store.
    #[serde(default)]
    pub primary: bool,

    /// Provider specific options, such as `root` for `FILESYSTEM` or
    /// `bucket`/`region` for `AMAZON_S3`.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Backend kind of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ProviderType {
    #[serde(rename = "MEMORY")]
    Memory,
    #[serde(rename = "FILESYSTEM")]
    Filesystem,
    #[serde(rename = "AMAZON_S3")]
    AmazonS3,
    #[serde(rename = "AZURE")]
    Azure,
    #[serde(rename = "GCS")]
    Gcs,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(serde_variant::to_variant_name(self).map_err(|_| fmt::Error)?)
    }
}

/// Duplication configuration
///
/// Example:
/// ```yaml
/// duplication:
///   # space id to comma separated destination store ids
///   spaces:
///     space1: "1,2"
///   # destinations of spaces created after startup
///   new_space_default: "1"
///   retry:
///     create: { attempts: 3, delay_ms: 1000 }
///     update: { attempts: 3, delay_ms: 1000 }
///     delete: { attempts: 5, delay_ms: 1000 }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Duplication {
    #[serde(default)]
    pub spaces: BTreeMap<String, String>,
    pub new_space_default: Option<String>,
    #[serde(default)]
    pub retry: DuplicationRetry,
}

impl Duplication {
    /// The dispatch mapping described by this section.
    #[must_use]
    pub fn mapping(&self) -> DuplicationConfig {
        DuplicationConfig::from_entries(
            self.spaces.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            self.new_space_default.as_deref(),
        )
    }
}

impl Config {
    /// Creates a new configuration instance based on the specified environment.
    ///
    /// # Errors
    ///
    /// Returns an error when no file exists for the environment or it does
    /// not parse.
    pub fn new(env: &Environment) -> Result<Self> {
        Self::from_folder(env, DEFAULT_FOLDER.as_path())
    }

    /// Loads `<env>.local.yaml` from `path`, falling back to `<env>.yaml`.
    ///
    /// # Errors
    ///
    /// Returns an error when neither file exists or the chosen one does not
    /// parse.
    pub fn from_folder(env: &Environment, path: &Path) -> Result<Self> {
        // by order of precedence
        let files = [
            path.join(format!("{env}.local.yaml")),
            path.join(format!("{env}.yaml")),
        ];

        let selected_path = files
            .iter()
            .find(|p| p.exists())
            .ok_or_else(|| Error::Message("no configuration file found".to_string()))?;

        info!(selected_path =? selected_path, "loading environment from");

        let content = fs::read_to_string(selected_path)?;
        serde_yaml::from_str(&content)
            .map_err(|err| Error::YAMLFile(err, selected_path.to_string_lossy().to_string()))
    }

    /// The single primary account.
    ///
    /// # Errors
    /// return an error when there is no primary account or more than one
    pub fn primary_account(&self) -> Result<&Account> {
        let mut primaries = self.storage.accounts.iter().filter(|a| a.primary);
        match (primaries.next(), primaries.next()) {
            (Some(account), None) => Ok(account),
            (None, _) => Err(Error::string("no primary storage account configured")),
            (Some(_), Some(_)) => Err(Error::string(
                "more than one primary storage account configured",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::*;

    const CONFIG: &str = r#"
logger:
  enable: true
  level: debug
  format: json
storage:
  accounts:
    - id: "1"
      provider: MEMORY
      primary: true
    - id: "2"
      provider: FILESYSTEM
      options:
        root: /tmp/durastore
stateless:
  create_space_attempts: 5
  create_space_delay_ms: 100
duplication:
  spaces:
    space1: "1,2"
  new_space_default: "1"
  retry:
    delete:
      attempts: 7
      delay_ms: 10
"#;

    #[test]
    fn can_load_from_folder() {
        let tree_fs = tree_fs::TreeBuilder::default()
            .drop(true)
            .add("config/test.yaml", CONFIG)
            .create()
            .expect("create temp folder");

        let config =
            Config::from_folder(&Environment::Test, &tree_fs.root.join("config")).unwrap();

        assert_eq!(config.storage.accounts.len(), 2);
        assert_eq!(config.primary_account().unwrap().id, "1");
        assert_eq!(config.storage.accounts[1].provider, ProviderType::Filesystem);
        assert_eq!(config.stateless.create_space_attempts, 5);

        let duplication = config.duplication.unwrap();
        assert_eq!(duplication.retry.delete.attempts, 7);
        assert_eq!(duplication.retry.create, DuplicationRetry::default().create);
        assert_debug_snapshot!(duplication.mapping().destinations("space1"), @r###"
        [
            "1",
            "2",
        ]
        "###);
    }

    #[test]
    fn local_file_takes_precedence() {
        let local = CONFIG.replace("id: \"1\"", "id: \"local\"");
        let tree_fs = tree_fs::TreeBuilder::default()
            .drop(true)
            .add("config/development.yaml", CONFIG)
            .add("config/development.local.yaml", local.as_str())
            .create()
            .expect("create temp folder");

        let config = Environment::Development
            .load_from_folder(tree_fs.root.join("config"))
            .unwrap();
        assert_eq!(config.primary_account().unwrap().id, "local");
    }

    #[test]
    fn missing_folder_is_an_error() {
        let tree_fs = tree_fs::TreeBuilder::default()
            .drop(true)
            .create()
            .expect("create temp folder");

        assert!(Config::from_folder(&Environment::Production, &tree_fs.root).is_err());
    }

    #[test]
    fn requires_a_single_primary_account() {
        let config: Config = serde_yaml::from_str(
            r#"
storage:
  accounts:
    - id: "1"
      provider: MEMORY
    - id: "2"
      provider: MEMORY
"#,
        )
        .unwrap();
        assert!(config.primary_account().is_err());
    }

    #[test]
    fn provider_type_displays_config_name() {
        assert_eq!(ProviderType::AmazonS3.to_string(), "AMAZON_S3");
    }
}

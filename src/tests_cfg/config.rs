use std::{collections::BTreeMap, time::Duration};

use crate::{
    config::{self, Account, Config, ProviderType},
    duplication::DuplicationRetry,
    logger,
    storage::{retry::Retrier, stateless::StatelessConfig},
};

#[must_use]
pub fn memory_account(id: &str, primary: bool) -> Account {
    Account {
        id: id.to_string(),
        provider: ProviderType::Memory,
        primary,
        options: BTreeMap::new(),
    }
}

/// Retry policy that keeps the attempt counts but never sleeps.
#[must_use]
pub fn fast_retry() -> DuplicationRetry {
    let defaults = DuplicationRetry::default();
    DuplicationRetry {
        create: Retrier::new(defaults.create.attempts, Duration::ZERO),
        update: Retrier::new(defaults.update.attempts, Duration::ZERO),
        delete: Retrier::new(defaults.delete.attempts, Duration::ZERO),
    }
}

/// Primary store `"0"` and secondary stores `"1"` and `"2"`, all in memory.
#[must_use]
pub fn test_config() -> Config {
    Config {
        logger: config::Logger {
            enable: false,
            level: logger::LogLevel::Off,
            format: logger::Format::Json,
            override_filter: None,
        },
        storage: config::Storage {
            accounts: vec![
                memory_account("0", true),
                memory_account("1", false),
                memory_account("2", false),
            ],
        },
        stateless: StatelessConfig {
            create_space_attempts: 3,
            create_space_delay: Duration::from_millis(10),
            ..StatelessConfig::default()
        },
        duplication: Some(config::Duplication {
            spaces: BTreeMap::from([("space1".to_string(), "1,2".to_string())]),
            new_space_default: Some("1".to_string()),
            retry: fast_retry(),
        }),
    }
}

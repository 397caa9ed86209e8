//! # Boot
//!
//! Loads the configuration of an environment, starts logging and builds the
//! [`AppContext`].
use tracing::info;

use crate::{app::AppContext, environment::Environment, logger, Result};

/// Creates the application context of the given environment.
///
/// # Errors
///
/// When the configuration cannot be loaded, the logger cannot be
/// initialized, or a storage driver cannot be built.
pub fn create_context(environment: &Environment) -> Result<AppContext> {
    let config = environment.load()?;
    logger::init(&config.logger)?;

    let ctx = AppContext::create(environment.clone(), config)?;
    info!(
        environment = %environment,
        primary = ctx.storage.primary_store_id(),
        accounts = ctx.storage.get_storage_accounts().len(),
        duplication = ctx.duplication.is_some(),
        "storage context created"
    );
    Ok(ctx)
}

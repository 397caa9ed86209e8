use opendal::{services::Azblob, Operator};

use super::{opendal_adapter::OpendalAdapter, StorageProvider};
use crate::storage::StorageResult;

/// Create new Azure storage.
///
/// # Errors
///
/// When could not initialize the client instance
pub fn new(
    container_name: &str,
    account_name: &str,
    access_key: &str,
    endpoint: &str,
) -> StorageResult<Box<dyn StorageProvider>> {
    Ok(Box::new(OpendalAdapter::new(operator(
        container_name,
        account_name,
        access_key,
        endpoint,
    )?)))
}

pub(super) fn operator(
    container_name: &str,
    account_name: &str,
    access_key: &str,
    endpoint: &str,
) -> StorageResult<Operator> {
    let azure = Azblob::default()
        .container(container_name)
        .account_name(account_name)
        .account_key(access_key)
        .endpoint(endpoint);
    Ok(Operator::new(azure)?.finish())
}

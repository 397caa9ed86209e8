use opendal::{services::Gcs, Operator};

use super::{opendal_adapter::OpendalAdapter, StorageProvider};
use crate::storage::StorageResult;

/// Create new GCP storage.
///
/// # Errors
///
/// When could not initialize the client instance
pub fn new(bucket_name: &str, credential_path: &str) -> StorageResult<Box<dyn StorageProvider>> {
    Ok(Box::new(OpendalAdapter::new(operator(
        bucket_name,
        credential_path,
    )?)))
}

pub(super) fn operator(bucket_name: &str, credential_path: &str) -> StorageResult<Operator> {
    let gcs = Gcs::default()
        .bucket(bucket_name)
        .credential_path(credential_path);
    Ok(Operator::new(gcs)?.finish())
}

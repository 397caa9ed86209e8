//! # Storage Drivers
//!
//! Raw [`StorageProvider`] implementations. Every driver is an
//! [`opendal_adapter::OpendalAdapter`] over a different `OpenDAL` service;
//! cloud services are gated behind the `storage_*` features.
#[cfg(feature = "storage_aws_s3")]
pub mod aws;
#[cfg(feature = "storage_azure")]
pub mod azure;
#[cfg(feature = "storage_gcp")]
pub mod gcp;
pub mod local;
pub mod mem;
pub mod opendal_adapter;

use opendal::Operator;

use self::opendal_adapter::OpendalAdapter;
use super::{checksum::Algorithm, provider::StorageProvider, StorageError, StorageResult};
use crate::config::{Account, ProviderType};

/// Builds the raw driver configured for an account, computing checksums
/// with `algorithm`.
///
/// # Errors
///
/// Returns a [`StorageError`] when the driver cannot be initialized or its
/// feature was not compiled in.
pub fn from_account(
    account: &Account,
    algorithm: Algorithm,
) -> StorageResult<Box<dyn StorageProvider>> {
    let operator = operator(account)?;
    Ok(Box::new(
        OpendalAdapter::new(operator).with_algorithm(algorithm),
    ))
}

fn operator(account: &Account) -> StorageResult<Operator> {
    let option = |key: &str| {
        account.options.get(key).map(String::as_str).ok_or_else(|| {
            StorageError::msg(format!(
                "account '{}' is missing option '{key}'",
                account.id
            ))
        })
    };

    match account.provider {
        ProviderType::Memory => mem::operator(),
        ProviderType::Filesystem => local::operator(option("root")?),
        #[cfg(feature = "storage_aws_s3")]
        ProviderType::AmazonS3 => {
            let credentials = match (option("access_key_id"), option("secret_access_key")) {
                (Ok(key_id), Ok(secret_key)) => Some(aws::Credential {
                    key_id: key_id.to_string(),
                    secret_key: secret_key.to_string(),
                    token: account.options.get("session_token").cloned(),
                }),
                _ => None,
            };
            aws::operator(option("bucket")?, option("region")?, credentials)
        }
        #[cfg(feature = "storage_azure")]
        ProviderType::Azure => azure::operator(
            option("container")?,
            option("account_name")?,
            option("access_key")?,
            option("endpoint")?,
        ),
        #[cfg(feature = "storage_gcp")]
        ProviderType::Gcs => gcp::operator(option("bucket")?, option("credential_path")?),
        #[allow(unreachable_patterns)]
        other => Err(StorageError::msg(format!(
            "provider {other} was configured for account '{}' but its storage feature is not \
             compiled in",
            account.id
        ))),
    }
}

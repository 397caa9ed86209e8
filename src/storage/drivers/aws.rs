use opendal::{services::S3, Operator};

use super::{opendal_adapter::OpendalAdapter, StorageProvider};
use crate::storage::StorageResult;

/// A set of AWS security credentials
pub struct Credential {
    /// AWS_ACCESS_KEY_ID
    pub key_id: String,
    /// AWS_SECRET_ACCESS_KEY
    pub secret_key: String,
    /// AWS_SESSION_TOKEN
    pub token: Option<String>,
}

/// Create new AWS s3 storage with bucket and region. Credentials are taken
/// from the environment.
///
/// # Errors
///
/// When could not initialize the client instance
pub fn new(bucket_name: &str, region: &str) -> StorageResult<Box<dyn StorageProvider>> {
    Ok(Box::new(OpendalAdapter::new(operator(
        bucket_name,
        region,
        None,
    )?)))
}

/// Create new AWS s3 storage with bucket, region and credentials.
///
/// # Errors
///
/// When could not initialize the client instance
pub fn with_credentials(
    bucket_name: &str,
    region: &str,
    credentials: Credential,
) -> StorageResult<Box<dyn StorageProvider>> {
    Ok(Box::new(OpendalAdapter::new(operator(
        bucket_name,
        region,
        Some(credentials),
    )?)))
}

pub(super) fn operator(
    bucket_name: &str,
    region: &str,
    credentials: Option<Credential>,
) -> StorageResult<Operator> {
    let mut s3 = S3::default().bucket(bucket_name).region(region);
    if let Some(credentials) = credentials {
        s3 = s3
            .access_key_id(&credentials.key_id)
            .secret_access_key(&credentials.secret_key);
        if let Some(token) = credentials.token {
            s3 = s3.session_token(&token);
        }
    }
    Ok(Operator::new(s3)?.finish())
}

use opendal::{services::Memory, Operator};

use super::{opendal_adapter::OpendalAdapter, StorageProvider};
use crate::storage::StorageResult;

/// Create new in-memory storage.
#[must_use]
pub fn new() -> Box<dyn StorageProvider> {
    Box::new(OpendalAdapter::new(
        Operator::new(Memory::default())
            .expect("memory operator")
            .finish(),
    ))
}

pub(super) fn operator() -> StorageResult<Operator> {
    Ok(Operator::new(Memory::default())?.finish())
}

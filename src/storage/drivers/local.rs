use opendal::{services::Fs, Operator};

use super::{opendal_adapter::OpendalAdapter, StorageProvider};
use crate::storage::StorageResult;

/// Create new filesystem storage rooted at `root`.
///
/// # Errors
///
/// When could not initialize the operator
pub fn new(root: &str) -> StorageResult<Box<dyn StorageProvider>> {
    Ok(Box::new(OpendalAdapter::new(operator(root)?)))
}

pub(super) fn operator(root: &str) -> StorageResult<Operator> {
    Ok(Operator::new(Fs::default().root(root))?.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn can_store_content_on_disk() {
        let tree = tree_fs::TreeBuilder::default()
            .drop(true)
            .create()
            .expect("create temp folder");
        let store = new(&tree.root.display().to_string()).unwrap();

        store.create_space("space1").await.unwrap();
        store
            .add_content("space1", "docs/a.txt", None, None, None, None, "hello".into())
            .await
            .unwrap();

        assert!(tree.root.join("space1").join("docs").join("a.txt").exists());
        assert_eq!(store.get_spaces().await.unwrap(), vec!["space1".to_string()]);
    }
}

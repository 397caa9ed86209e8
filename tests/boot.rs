use durastore::{boot, environment::Environment, storage::StorageProvider};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn boots_from_test_configuration() {
    let ctx = boot::create_context(&Environment::Test).unwrap();

    assert_eq!(ctx.storage.primary_store_id(), "0");
    assert_eq!(ctx.storage.get_storage_accounts().len(), 3);
    assert!(ctx.duplication.is_some());

    let primary = ctx.storage.get_storage_provider(None).unwrap();
    primary.create_space("space1").await.unwrap();
    assert!(primary.space_exists("space1").await.unwrap());
}

#[test]
#[serial]
fn fails_without_configuration() {
    assert!(boot::create_context(&Environment::Any("missing".to_string())).is_err());
}

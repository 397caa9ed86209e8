use std::sync::Arc;

use durastore::{
    app::AppContext,
    duplication::{DuplicationConfig, DuplicationMessage, DuplicationService, DuplicationTopic},
    environment::Environment,
    storage::{
        broker::{BrokeredStorageProvider, StorageProviderFactory},
        model::{AccessType, Metadata, METADATA_CONTENT_CHECKSUM},
        StorageProvider,
    },
    tests_cfg::config::test_config,
};

struct Stores {
    ctx: AppContext,
}

impl Stores {
    fn new() -> Self {
        Self {
            ctx: AppContext::create(Environment::Test, test_config()).unwrap(),
        }
    }

    fn store(&self, id: &str) -> BrokeredStorageProvider {
        self.ctx.storage.get_storage_provider(Some(id)).unwrap()
    }

    fn primary(&self) -> BrokeredStorageProvider {
        self.ctx.storage.get_storage_provider(None).unwrap()
    }

    fn service(&self) -> Arc<DuplicationService> {
        self.ctx.duplication.clone().unwrap()
    }
}

async fn content_ids(provider: &BrokeredStorageProvider, space_id: &str) -> Vec<String> {
    provider
        .get_space_contents_chunk(space_id, None, 100, None)
        .await
        .unwrap_or_default()
}

#[tokio::test]
async fn mirrors_configured_space_to_every_destination() {
    let stores = Stores::new();
    let primary = stores.primary();
    let service = stores.service();

    primary.create_space("space1").await.unwrap();
    primary.set_space_access("space1", AccessType::Open).await.unwrap();
    service
        .process_duplication(DuplicationTopic::SpaceCreate, "space1", None)
        .await
        .unwrap();

    let checksum = primary
        .add_content(
            "space1",
            "report.csv",
            Some("text/csv"),
            Some(&Metadata::from([("Year".to_string(), "2024".to_string())])),
            None,
            None,
            "a,b\n1,2\n".into(),
        )
        .await
        .unwrap();
    service
        .process_duplication(DuplicationTopic::ContentCreate, "space1", Some("report.csv"))
        .await
        .unwrap();

    for id in ["1", "2"] {
        let store = stores.store(id);
        assert_eq!(
            store.get_space_access("space1").await.unwrap(),
            AccessType::Open
        );
        let metadata = store
            .get_content_metadata("space1", "report.csv")
            .await
            .unwrap();
        assert_eq!(metadata.get(METADATA_CONTENT_CHECKSUM).unwrap(), &checksum);
        assert_eq!(metadata.get("year").unwrap(), "2024");
    }
}

#[tokio::test]
async fn new_space_goes_to_default_store_only() {
    let stores = Stores::new();
    let primary = stores.primary();
    let service = stores.service();

    primary.create_space("space3").await.unwrap();
    service
        .process_duplication(DuplicationTopic::SpaceCreate, "space3", None)
        .await
        .unwrap();
    primary
        .add_content("space3", "b", None, None, None, None, "bytes".into())
        .await
        .unwrap();
    service
        .process_duplication(DuplicationTopic::ContentCreate, "space3", Some("b"))
        .await
        .unwrap();

    assert_eq!(content_ids(&stores.store("1"), "space3").await, vec!["b"]);
    assert!(!stores.store("2").space_exists("space3").await.unwrap());
}

#[tokio::test]
async fn unconfigured_space_is_not_mirrored() {
    let stores = Stores::new();
    let primary = stores.primary();
    let service = stores.service();

    primary.create_space("space2").await.unwrap();
    primary
        .add_content("space2", "a", None, None, None, None, "bytes".into())
        .await
        .unwrap();
    service
        .process_duplication(DuplicationTopic::ContentCreate, "space2", Some("a"))
        .await
        .unwrap();

    for id in ["1", "2"] {
        assert!(!stores.store(id).space_exists("space2").await.unwrap());
    }
}

#[tokio::test]
async fn replays_events_from_messages() {
    let stores = Stores::new();
    let primary = stores.primary();
    let service = stores.service();

    primary.create_space("space1").await.unwrap();
    primary
        .add_content("space1", "a", None, None, None, None, "v1".into())
        .await
        .unwrap();

    for message in [
        r#"{"topic": "space-create", "space_id": "space1"}"#,
        r#"{"topic": "content-create", "space_id": "space1", "content_id": "a"}"#,
        r#"{"topic": "content-create", "space_id": "space1", "content_id": "a"}"#,
    ] {
        let message = DuplicationMessage::from_json(message).unwrap();
        service.handle_duplication_message(&message).await.unwrap();
    }
    assert_eq!(content_ids(&stores.store("2"), "space1").await, vec!["a"]);

    primary.delete_content("space1", "a").await.unwrap();
    let message = DuplicationMessage::from_json(
        r#"{"topic": "content-delete", "space_id": "space1", "content_id": "a"}"#,
    )
    .unwrap();
    service.handle_duplication_message(&message).await.unwrap();
    service.handle_duplication_message(&message).await.unwrap();

    assert!(content_ids(&stores.store("1"), "space1").await.is_empty());
    assert!(content_ids(&stores.store("2"), "space1").await.is_empty());
}

#[tokio::test]
async fn deleting_space_reaches_every_destination() {
    let stores = Stores::new();
    let primary = stores.primary();
    let service = stores.service();

    primary.create_space("space1").await.unwrap();
    service
        .process_duplication(DuplicationTopic::SpaceCreate, "space1", None)
        .await
        .unwrap();
    primary.delete_space("space1").await.unwrap();
    service
        .process_duplication(DuplicationTopic::SpaceDelete, "space1", None)
        .await
        .unwrap();

    for id in ["1", "2"] {
        assert!(!stores.store(id).space_exists("space1").await.unwrap());
    }
}

#[tokio::test]
async fn primary_store_is_never_a_destination() {
    let config = test_config();
    let factory =
        StorageProviderFactory::from_config(&config.storage, &config.stateless).unwrap();
    let service = DuplicationService::from_factory(
        &factory,
        DuplicationConfig::from_entries([("space1", "0")], None),
        &config.duplication.unwrap().retry,
    )
    .unwrap();

    let primary = factory.get_storage_provider(None).unwrap();
    primary.create_space("space1").await.unwrap();
    service
        .process_duplication(DuplicationTopic::SpaceCreate, "space1", None)
        .await
        .unwrap();
    assert_eq!(primary.get_spaces().await.unwrap(), vec!["space1"]);
    for id in ["1", "2"] {
        let store = factory.get_storage_provider(Some(id)).unwrap();
        assert!(store.get_spaces().await.unwrap().is_empty());
    }
}

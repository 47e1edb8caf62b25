use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use chrono::DateTime;
use proven_announcement::{Bucket, BucketCategory, EventBucketCategories, Metadata};
use proven_blob_store::BlobStore;
use proven_blob_store_memory::MemoryBlobStore;
use proven_log_store::{ConnectionSupervisor, SupervisorOptions};
use proven_log_store_memory::{MemoryConnector, MemoryLogStore};
use proven_resilience::{ResiliencePolicy, RetryPolicy};
use proven_storage_strategy::{
    BlobPointer, BlobStorageStrategy, Error, HashStorageOptions, HashStorageStrategy,
    StorageStrategy, StrategyChain, StrategyRegistration,
};

fn metadata() -> Metadata {
    Metadata::new("Register", 1)
        .with_message_id("m-1")
        .with_environment("dev")
        .with_uri("users")
        .with_produced_at(DateTime::from_timestamp(1_700_000_000, 0).unwrap())
        .with_storage_types(EventBucketCategories::SEGMENTS)
}

fn hash_strategy(
    store: &MemoryLogStore,
    ttl: Option<Duration>,
) -> Arc<HashStorageStrategy<MemoryConnector>> {
    let supervisor = Arc::new(ConnectionSupervisor::new(
        store.connector(),
        SupervisorOptions::default(),
    ));

    Arc::new(HashStorageStrategy::new(
        supervisor,
        ResiliencePolicy::default(),
        HashStorageOptions {
            ttl,
            ..HashStorageOptions::default()
        },
    ))
}

#[tokio::test]
async fn test_hash_strategy_round_trip() {
    let store = MemoryLogStore::new();
    let strategy = hash_strategy(&store, None);
    let bucket = Bucket::new().with("message", "Hi");

    let pointer = strategy
        .save("m-1", &bucket, BucketCategory::Segments, &metadata())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(pointer, Bytes::from("dev:users:Segments:m-1"));

    let loaded = strategy
        .load(&metadata(), BucketCategory::Segments, &pointer)
        .await
        .unwrap();

    assert_eq!(loaded, bucket);
}

#[tokio::test(start_paused = true)]
async fn test_hash_strategy_ttl_expires() {
    let store = MemoryLogStore::new();
    let strategy = hash_strategy(&store, Some(Duration::from_secs(10)));

    let pointer = strategy
        .save(
            "m-1",
            &Bucket::new().with("message", "Hi"),
            BucketCategory::Segments,
            &metadata(),
        )
        .await
        .unwrap()
        .unwrap();

    tokio::time::advance(Duration::from_secs(10)).await;

    let loaded = strategy
        .load(&metadata(), BucketCategory::Segments, &pointer)
        .await
        .unwrap();
    assert!(loaded.is_empty());
}

#[tokio::test]
async fn test_blob_strategy_paths_and_pointer() {
    let blobs = MemoryBlobStore::new();
    let strategy = BlobStorageStrategy::new("blob", blobs.clone(), ResiliencePolicy::default());
    let bucket = Bucket::new().with("a", "1").with("b", "2");

    let pointer = strategy
        .save("m-1", &bucket, BucketCategory::Segments, &metadata())
        .await
        .unwrap()
        .unwrap();

    let pointers: Vec<BlobPointer> = serde_json::from_slice(&pointer).unwrap();
    assert_eq!(
        pointers,
        vec![
            BlobPointer {
                key: "a".to_string(),
                external_path: "dev/users/2023-11-14/Register/m-1/blob/Segments/0".to_string(),
            },
            BlobPointer {
                key: "b".to_string(),
                external_path: "dev/users/2023-11-14/Register/m-1/blob/Segments/1".to_string(),
            },
        ]
    );
    assert!(
        std::str::from_utf8(&pointer)
            .unwrap()
            .contains("externalPath")
    );

    let loaded = strategy
        .load(&metadata(), BucketCategory::Segments, &pointer)
        .await
        .unwrap();
    assert_eq!(loaded, bucket);
}

#[tokio::test]
async fn test_blob_strategy_keeps_categories_apart() {
    let blobs = MemoryBlobStore::new();
    let strategy = BlobStorageStrategy::new("blob", blobs.clone(), ResiliencePolicy::default());
    let segments = Bucket::new().with("message", "Hi");
    let interceptions = Bucket::new().with("trace", "T");

    let segments_pointer = strategy
        .save("m-1", &segments, BucketCategory::Segments, &metadata())
        .await
        .unwrap()
        .unwrap();
    let interceptions_pointer = strategy
        .save(
            "m-1",
            &interceptions,
            BucketCategory::Interceptions,
            &metadata(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(blobs.object_count().await, 2);
    assert_eq!(
        strategy
            .load(&metadata(), BucketCategory::Segments, &segments_pointer)
            .await
            .unwrap(),
        segments
    );
    assert_eq!(
        strategy
            .load(
                &metadata(),
                BucketCategory::Interceptions,
                &interceptions_pointer
            )
            .await
            .unwrap(),
        interceptions
    );
}

#[tokio::test]
async fn test_blob_strategies_sharing_a_store_keep_providers_apart() {
    let blobs = MemoryBlobStore::new();
    let first = BlobStorageStrategy::new("first", blobs.clone(), ResiliencePolicy::default());
    let second = BlobStorageStrategy::new("second", blobs.clone(), ResiliencePolicy::default());

    let first_pointer = first
        .save(
            "m-1",
            &Bucket::new().with("a", "1"),
            BucketCategory::Segments,
            &metadata(),
        )
        .await
        .unwrap()
        .unwrap();
    second
        .save(
            "m-1",
            &Bucket::new().with("b", "2"),
            BucketCategory::Segments,
            &metadata(),
        )
        .await
        .unwrap();

    assert_eq!(
        first
            .load(&metadata(), BucketCategory::Segments, &first_pointer)
            .await
            .unwrap(),
        Bucket::new().with("a", "1")
    );
}

#[tokio::test]
async fn test_blob_strategy_discards_partial_save() {
    let blobs = MemoryBlobStore::new();
    let strategy = BlobStorageStrategy::new(
        "blob",
        blobs.clone(),
        ResiliencePolicy::default().with_retry(RetryPolicy::no_retry()),
    );
    let bucket = Bucket::new().with("a", "1").with("b", "2").with("c", "3");
    blobs.fail_writes_after(2, 1);

    assert_matches!(
        strategy
            .save("m-1", &bucket, BucketCategory::Segments, &metadata())
            .await,
        Err(Error::Blob(_))
    );
    assert_eq!(blobs.object_count().await, 0);
}

#[tokio::test]
async fn test_blob_strategy_missing_object() {
    let blobs = MemoryBlobStore::new();
    let strategy = BlobStorageStrategy::new("blob", blobs.clone(), ResiliencePolicy::default());

    let pointer = strategy
        .save(
            "m-1",
            &Bucket::new().with("a", "1"),
            BucketCategory::Segments,
            &metadata(),
        )
        .await
        .unwrap()
        .unwrap();
    blobs
        .del("dev/users/2023-11-14/Register/m-1/blob/Segments/0")
        .await
        .unwrap();

    assert_matches!(
        strategy
            .load(&metadata(), BucketCategory::Segments, &pointer)
            .await,
        Err(Error::MissingObject { .. })
    );
}

#[tokio::test(start_paused = true)]
async fn test_blob_write_failure_is_retried() {
    let blobs = MemoryBlobStore::new();
    let policy = ResiliencePolicy::default().with_retry(RetryPolicy {
        jitter: false,
        ..RetryPolicy::default()
    });
    let strategy = BlobStorageStrategy::new("blob", blobs.clone(), policy);
    blobs.fail_next_writes(2);

    strategy
        .save(
            "m-1",
            &Bucket::new().with("a", "1"),
            BucketCategory::Segments,
            &metadata(),
        )
        .await
        .unwrap();

    assert_eq!(blobs.object_count().await, 1);
}

#[tokio::test]
async fn test_chain_splits_personal_data_into_blob_store() {
    let store = MemoryLogStore::new();
    let blobs = MemoryBlobStore::new();
    let chain = StrategyChain::new(hash_strategy(&store, None)).with_strategy(
        StrategyRegistration::new(
            Arc::new(BlobStorageStrategy::new(
                "eu-blob",
                blobs.scope("eu"),
                ResiliencePolicy::default(),
            )),
            EventBucketCategories::SEGMENTS,
        )
        .with_key_filter(|key| key.starts_with("user.")),
    );
    let bucket = Bucket::new()
        .with("user.email", "ada@example.com")
        .with("plan", "pro");

    let fields = chain
        .save("m-1", &bucket, BucketCategory::Segments, &metadata())
        .await
        .unwrap();

    assert_eq!(blobs.object_count().await, 1);
    assert_eq!(
        blobs.keys_with_prefix("eu/").await,
        vec!["eu/dev/users/2023-11-14/Register/m-1/eu-blob/Segments/0"]
    );

    let loaded = chain
        .load(&metadata(), &Bucket::new(), BucketCategory::Segments, &fields)
        .await
        .unwrap();

    assert_eq!(loaded, bucket);
}

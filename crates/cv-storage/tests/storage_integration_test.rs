//! Integration tests for storage backends.
//!
//! These tests require live instances of MinIO, PostgreSQL, and Qdrant.
//! Start services with: `docker-compose up -d`
//!
//! Run with: `cargo test --package cv-storage --test storage_integration_test -- --ignored --nocapture`
//!
//! All tests are marked `#[ignore]` to prevent running in CI without live services.

use std::collections::HashMap;

use cv_common::model::Identity;
use cv_common::CandidateProfile;
use cv_storage::*;
use uuid::Uuid;

async fn is_minio_available() -> bool {
    tokio::net::TcpStream::connect("127.0.0.1:9000").await.is_ok()
}

async fn is_postgres_available() -> bool {
    tokio::net::TcpStream::connect("127.0.0.1:5432").await.is_ok()
}

async fn is_qdrant_available() -> bool {
    tokio::net::TcpStream::connect("127.0.0.1:6334").await.is_ok()
}

// ============================================================================
// MinIO object storage
// ============================================================================

fn minio_config(prefix: &str) -> S3Config {
    S3Config {
        bucket: "cv-intake".to_string(),
        region: "us-east-1".to_string(),
        endpoint: Some("http://localhost:9000".to_string()),
        access_key_id: "minioadmin".to_string(),
        secret_access_key: "minioadmin".to_string(),
        prefix: prefix.to_string(),
    }
}

#[tokio::test]
#[ignore] // requires MinIO on localhost:9000
async fn test_minio_store_and_retrieve() {
    if !is_minio_available().await {
        eprintln!("MinIO not available on 127.0.0.1:9000, skipping test_minio_store_and_retrieve");
        return;
    }

    let storage = S3ObjectStorage::new(minio_config("test/")).await.expect("failed to create S3 storage client");

    let test_key = "resume.pdf";
    let test_data = b"%PDF-1.4 fake resume bytes";

    let stored_key = storage.store_file(test_key, test_data).await.expect("failed to store file");
    assert_eq!(stored_key, format!("test/{test_key}"));

    let retrieved = storage.retrieve_file(test_key).await.expect("failed to retrieve file");
    assert_eq!(retrieved, test_data);

    assert!(storage.file_exists(test_key).await.expect("failed to check file existence"));
    assert_eq!(storage.get_file_size(test_key).await.expect("failed to get file size"), test_data.len() as u64);

    storage.delete_file(test_key).await.expect("failed to delete file");
    assert!(!storage.file_exists(test_key).await.expect("failed to check file existence"));
}

#[tokio::test]
#[ignore] // requires MinIO on localhost:9000
async fn test_minio_list_files() {
    if !is_minio_available().await {
        eprintln!("MinIO not available on 127.0.0.1:9000, skipping test_minio_list_files");
        return;
    }

    let storage = S3ObjectStorage::new(minio_config("test-list/")).await.expect("failed to create S3 storage client");

    let files: Vec<(&str, &[u8])> =
        vec![("a.txt", b"content a" as &[u8]), ("b.txt", b"content b"), ("c.txt", b"content c")];
    for (key, data) in &files {
        storage.store_file(key, data).await.expect("failed to store file");
    }

    let listed = storage.list_files("test-list/").await.expect("failed to list files");
    assert_eq!(listed.len(), 3);
    for (key, _) in &files {
        assert!(listed.contains(&format!("test-list/{key}")));
    }

    for (key, _) in &files {
        storage.delete_file(key).await.expect("failed to delete file");
    }
}

#[tokio::test]
#[ignore] // requires MinIO on localhost:9000
async fn test_minio_store_from_path() {
    if !is_minio_available().await {
        eprintln!("MinIO not available on 127.0.0.1:9000, skipping test_minio_store_from_path");
        return;
    }

    let storage = S3ObjectStorage::new(minio_config("test-path/")).await.expect("failed to create S3 storage client");

    let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
    let temp_path = temp_dir.path().join("uploaded.txt");
    let data = b"intake file uploaded from path";
    std::fs::write(&temp_path, data).expect("failed to write temp file");

    let stored_key = storage.store_file_from_path("uploaded.txt", &temp_path).await.expect("failed to store from path");
    assert_eq!(stored_key, "test-path/uploaded.txt");

    let retrieved = storage.retrieve_file("uploaded.txt").await.expect("failed to retrieve file");
    assert_eq!(retrieved, data);

    storage.delete_file("uploaded.txt").await.expect("failed to delete file");
}

// ============================================================================
// PostgreSQL metadata storage
// ============================================================================

fn postgres_config() -> PostgresConfig {
    PostgresConfig {
        host: "localhost".to_string(),
        port: 5432,
        database: "cv_intake".to_string(),
        user: "postgres".to_string(),
        password: "postgres".to_string(),
    }
}

fn sample_profile(full_name: &str, email: &str) -> CandidateProfile {
    let mut identity = Identity::new(full_name);
    identity.email = Some(email.to_string());
    CandidateProfile::new(identity)
}

#[tokio::test]
#[ignore] // requires PostgreSQL on localhost:5432
async fn test_postgres_schema_init() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432, skipping test_postgres_schema_init");
        return;
    }

    let storage = PostgresMetadataStorage::new(postgres_config());
    storage.init_schema().await.expect("failed to initialize schema");
    storage.init_schema().await.expect("schema initialization should be idempotent");
}

#[tokio::test]
#[ignore] // requires PostgreSQL on localhost:5432
async fn test_postgres_write_and_get_candidate() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432, skipping test_postgres_write_and_get_candidate");
        return;
    }

    let storage = PostgresMetadataStorage::new(postgres_config());
    storage.init_schema().await.expect("failed to initialize schema");

    let profile = sample_profile("Jane Doe", "jane.doe@example.com");
    let candidate_id = profile.id;

    let verification = storage.write_candidate(&profile).await.expect("failed to write candidate");
    assert_eq!(verification.candidate_id, candidate_id);
    assert!(!verification.has_errors());

    let retrieved = storage.get_candidate(candidate_id).await.expect("failed to retrieve candidate");
    assert_eq!(retrieved.identity.full_name, "Jane Doe");
    assert_eq!(retrieved.identity.email.as_deref(), Some("jane.doe@example.com"));
}

#[tokio::test]
#[ignore] // requires PostgreSQL on localhost:5432
async fn test_postgres_find_duplicate_by_email() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432, skipping test_postgres_find_duplicate_by_email");
        return;
    }

    let storage = PostgresMetadataStorage::new(postgres_config());
    storage.init_schema().await.expect("failed to initialize schema");

    let profile = sample_profile("Duplicate Target", "dup.target@example.com");
    storage.write_candidate(&profile).await.expect("failed to write candidate");

    let found = storage
        .find_duplicate(Some("dup.target@example.com"), None)
        .await
        .expect("failed to search for duplicate");
    assert_eq!(found, Some(profile.id));

    let not_found =
        storage.find_duplicate(Some("nobody@example.com"), None).await.expect("failed to search for duplicate");
    assert_eq!(not_found, None);
}

// ============================================================================
// Qdrant vector storage
// ============================================================================

fn qdrant_config(collection: &str, vector_dim: u64) -> QdrantConfig {
    QdrantConfig {
        url: "http://localhost:6334".to_string(),
        api_key: None,
        collection: collection.to_string(),
        vector_dim,
        distance: vector_storage::VectorDistance::Cosine,
    }
}

#[tokio::test]
#[ignore] // requires Qdrant on localhost:6334
async fn test_qdrant_collection_init() {
    if !is_qdrant_available().await {
        eprintln!("Qdrant not available on 127.0.0.1:6334, skipping test_qdrant_collection_init");
        return;
    }

    let storage = QdrantVectorStorage::new(qdrant_config("test_candidates", 128)).await.expect("failed to create Qdrant client");

    storage.init_collection().await.expect("failed to initialize collection");
    storage.init_collection().await.expect("collection initialization should be idempotent");
}

#[tokio::test]
#[ignore] // requires Qdrant on localhost:6334
async fn test_qdrant_store_and_search() {
    if !is_qdrant_available().await {
        eprintln!("Qdrant not available on 127.0.0.1:6334, skipping test_qdrant_store_and_search");
        return;
    }

    let storage =
        QdrantVectorStorage::new(qdrant_config("test_candidates_search", 32)).await.expect("failed to create Qdrant client");
    storage.init_collection().await.expect("failed to initialize collection");

    let mut metadata_a = HashMap::new();
    metadata_a.insert("quality_level".to_string(), "good".to_string());
    let candidate_a = CandidateEmbedding { candidate_id: Uuid::new_v4(), vector: vec![1.0; 32], metadata: metadata_a };

    let mut metadata_b = HashMap::new();
    metadata_b.insert("quality_level".to_string(), "fair".to_string());
    let candidate_b = CandidateEmbedding { candidate_id: Uuid::new_v4(), vector: vec![0.2; 32], metadata: metadata_b };

    storage.store_embedding(&candidate_a).await.expect("failed to store embedding a");
    storage.store_embedding(&candidate_b).await.expect("failed to store embedding b");

    tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;

    let query_vector = vec![1.0; 32];
    let results = storage.search_similar(&query_vector, 2, None).await.expect("failed to search similar vectors");
    assert!(!results.is_empty());
    assert!(results[0].score > 0.9, "closest result should score highly against an identical vector");

    let mut filter = HashMap::new();
    filter.insert("quality_level".to_string(), "good".to_string());
    let filtered = storage.search_similar(&query_vector, 2, Some(filter)).await.expect("failed to search with filter");
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].candidate_id, candidate_a.candidate_id);

    storage.delete_embedding(candidate_a.candidate_id).await.expect("failed to delete embedding a");
    storage.delete_embedding(candidate_b.candidate_id).await.expect("failed to delete embedding b");
}

#[tokio::test]
#[ignore] // requires Qdrant on localhost:6334
async fn test_qdrant_batch_store() {
    if !is_qdrant_available().await {
        eprintln!("Qdrant not available on 127.0.0.1:6334, skipping test_qdrant_batch_store");
        return;
    }

    let storage =
        QdrantVectorStorage::new(qdrant_config("test_candidates_batch", 16)).await.expect("failed to create Qdrant client");
    storage.init_collection().await.expect("failed to initialize collection");

    let embeddings: Vec<CandidateEmbedding> = (0..10)
        .map(|i| CandidateEmbedding { candidate_id: Uuid::new_v4(), vector: vec![i as f32 / 10.0; 16], metadata: HashMap::new() })
        .collect();

    let stored_count = storage.store_embeddings(&embeddings).await.expect("failed to store batch embeddings");
    assert_eq!(stored_count, 10);

    for embedding in &embeddings {
        storage.delete_embedding(embedding.candidate_id).await.expect("failed to delete embedding");
    }
}

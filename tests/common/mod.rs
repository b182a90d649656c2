use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use diecast_tracker::config::{AppConfig, StorageConfig};
use diecast_tracker::db::{self, PgPool};
use diecast_tracker::images::ImageStore;
use diecast_tracker::routes;
use diecast_tracker::state::AppState;
use diecast_tracker::storage::{BucketPolicy, ObjectStorage, StorageError};
use diesel::connection::SimpleConnection;
use diesel::PgConnection;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const FAKE_BUCKET: &str = "test-images";
pub const FAKE_PUBLIC_BASE: &str = "https://fake-storage/test-images";

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Bytes,
    pub content_type: String,
}

/// In-memory bucket that records every call made to it.
#[derive(Default)]
pub struct FakeStorage {
    bucket_created: Mutex<bool>,
    created_policy: Mutex<Option<BucketPolicy>>,
    objects: Mutex<HashMap<String, StoredObject>>,
    calls: Mutex<Vec<String>>,
}

impl FakeStorage {
    async fn record(&self, call: impl Into<String>) {
        self.calls.lock().await.push(call.into());
    }

    #[allow(dead_code)]
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    #[allow(dead_code)]
    pub async fn created_policy(&self) -> Option<BucketPolicy> {
        self.created_policy.lock().await.clone()
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    fn bucket(&self) -> &str {
        FAKE_BUCKET
    }

    async fn bucket_exists(&self) -> Result<bool, StorageError> {
        self.record("bucket_exists").await;
        Ok(*self.bucket_created.lock().await)
    }

    async fn create_bucket(&self, policy: &BucketPolicy) -> Result<(), StorageError> {
        self.record("create_bucket").await;
        let mut created = self.bucket_created.lock().await;
        if *created {
            return Err(StorageError::BucketAlreadyExists(FAKE_BUCKET.to_string()));
        }
        *created = true;
        *self.created_policy.lock().await = Some(policy.clone());
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.record(format!("put_object {key}")).await;
        let mut objects = self.objects.lock().await;
        if objects.contains_key(key) {
            return Err(StorageError::ObjectAlreadyExists(key.to_string()));
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                key: key.to_string(),
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{FAKE_PUBLIC_BASE}/{key}")
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.record(format!("delete_object {key}")).await;
        self.objects
            .lock()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::Backend(anyhow!("object {key} missing")))
    }
}

/// Envelope returned by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let storage = Arc::new(FakeStorage::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        Self::build(ImageStore::new(storage_for_state), storage).await
    }

    /// App whose image store has no credentials.
    #[allow(dead_code)]
    pub async fn without_storage() -> Result<Self> {
        Self::build(ImageStore::Unconfigured, Arc::new(FakeStorage::default())).await
    }

    async fn build(images: ImageStore, storage: Arc<FakeStorage>) -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            cors_allowed_origin: None,
            storage_bucket: FAKE_BUCKET.to_string(),
            storage: StorageConfig::Unconfigured,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let state = AppState::new(pool, config, images);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body))?;
        self.send(request).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload).await
    }

    #[allow(dead_code)]
    pub async fn post_raw(
        &self,
        path: &str,
        content_type: &str,
        body: &'static [u8],
    ) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", content_type)
            .body(Body::from(body))?;
        self.send(request).await
    }

    pub async fn get(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    #[allow(dead_code)]
    pub async fn upload_file(
        &self,
        filename: Option<&str>,
        content_type: &str,
        data: &[u8],
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        match filename {
            Some(filename) => body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend(b"Content-Disposition: form-data; name=\"file\"\r\n"),
        }
        body.extend(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend(data);
        body.extend(b"\r\n");
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))?;
        self.send(request).await
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

/// Asserts the status and decodes the `{success, data, error}` envelope.
pub async fn read_envelope<T: DeserializeOwned>(
    response: hyper::Response<Body>,
    expected: StatusCode,
) -> Result<Envelope<T>> {
    let status = response.status();
    let body = body_to_vec(response.into_body()).await?;
    if status != expected {
        panic!(
            "expected {expected}, got {status}: {}",
            String::from_utf8_lossy(&body)
        );
    }
    Ok(serde_json::from_slice(&body)?)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    db::migrate_pool(pool).await?;
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        truncate_all(&mut conn)
    })
    .await
    .context("truncate task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute("TRUNCATE TABLE diecasts, brands RESTART IDENTITY CASCADE;")
        .context("failed to truncate tables")?;
    Ok(())
}

//! Supabase Storage backend, spoken over its REST API.

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::{encode_key, BucketPolicy, ObjectStorage, StorageError};

pub struct SupabaseStorage {
    http: Client,
    base_url: String,
    service_role_key: String,
    bucket: String,
}

#[derive(Deserialize)]
struct BucketEntry {
    id: String,
}

#[derive(Serialize)]
struct CreateBucketRequest<'a> {
    id: &'a str,
    name: &'a str,
    public: bool,
    file_size_limit: u64,
    allowed_mime_types: &'a [&'a str],
}

#[derive(Serialize)]
struct RemoveObjectsRequest<'a> {
    prefixes: [&'a str; 1],
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "statusCode", default)]
    status_code: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn parse(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    fn status_code(&self) -> Option<u16> {
        match self.status_code.as_ref()? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            _ => None,
        }
    }

    fn describe(&self, raw: &str) -> String {
        self.message
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| raw.trim().to_string())
    }
}

/// Supabase answers a duplicate bucket or object with HTTP 409, or with a 400
/// whose body carries `statusCode: "409"` / `error: "Duplicate"`.
fn is_duplicate(status: StatusCode, body: &ErrorBody) -> bool {
    status == StatusCode::CONFLICT
        || body.status_code() == Some(409)
        || body
            .error
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case("duplicate"))
        || body
            .message
            .as_deref()
            .is_some_and(|m| m.to_ascii_lowercase().contains("already exists"))
}

impl SupabaseStorage {
    pub fn new(
        http: Client,
        project_url: &str,
        service_role_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: format!("{}/storage/v1", project_url.trim_end_matches('/')),
            service_role_key: service_role_key.into(),
            bucket: bucket.into(),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.service_role_key)
            .header("apikey", &self.service_role_key)
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/object/{}/{}",
            self.base_url,
            encode_key(&self.bucket),
            encode_key(key)
        )
    }

    async fn failure(response: Response, action: &str) -> (StatusCode, ErrorBody, String) {
        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        let body = ErrorBody::parse(&raw);
        let message = format!("{action} failed ({status}): {}", body.describe(&raw));
        (status, body, message)
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool, StorageError> {
        let response = self
            .authorized(self.http.get(format!("{}/bucket", self.base_url)))
            .send()
            .await
            .context("failed to list storage buckets")?;

        if !response.status().is_success() {
            let (_, _, message) = Self::failure(response, "list buckets").await;
            return Err(anyhow::anyhow!(message).into());
        }

        let buckets: Vec<BucketEntry> = response
            .json()
            .await
            .context("failed to decode bucket list")?;
        Ok(buckets.iter().any(|bucket| bucket.id == self.bucket))
    }

    async fn create_bucket(&self, policy: &BucketPolicy) -> Result<(), StorageError> {
        let payload = CreateBucketRequest {
            id: &self.bucket,
            name: &self.bucket,
            public: policy.public,
            file_size_limit: policy.file_size_limit,
            allowed_mime_types: policy.allowed_mime_types,
        };
        let response = self
            .authorized(self.http.post(format!("{}/bucket", self.base_url)))
            .json(&payload)
            .send()
            .await
            .context("failed to create storage bucket")?;

        if response.status().is_success() {
            return Ok(());
        }

        let (status, body, message) = Self::failure(response, "create bucket").await;
        if is_duplicate(status, &body) {
            return Err(StorageError::BucketAlreadyExists(self.bucket.clone()));
        }
        Err(anyhow::anyhow!(message).into())
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let response = self
            .authorized(self.http.post(self.object_url(key)))
            .header("content-type", content_type)
            .header("cache-control", "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .context("failed to upload object to storage")?;

        if response.status().is_success() {
            return Ok(());
        }

        let (status, body, message) = Self::failure(response, "upload").await;
        if is_duplicate(status, &body) {
            return Err(StorageError::ObjectAlreadyExists(key.to_string()));
        }
        Err(anyhow::anyhow!(message).into())
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.base_url,
            encode_key(&self.bucket),
            encode_key(key)
        )
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let response = self
            .authorized(self.http.delete(format!(
                "{}/object/{}",
                self.base_url,
                encode_key(&self.bucket)
            )))
            .json(&RemoveObjectsRequest { prefixes: [key] })
            .send()
            .await
            .context("failed to delete object from storage")?;

        if !response.status().is_success() {
            let (_, _, message) = Self::failure(response, "delete").await;
            return Err(anyhow::anyhow!(message).into());
        }
        Ok(())
    }
}

use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::json;

/// Largest object accepted by the image bucket.
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

pub const IMAGE_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(
        "Storage not configured. Please set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY, \
         or AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY"
    )]
    NotConfigured,
    #[error("bucket {0} already exists")]
    BucketAlreadyExists(String),
    #[error("object {0} already exists")]
    ObjectAlreadyExists(String),
    #[error("{0}")]
    Rejected(String),
    #[error("{0:#}")]
    Backend(#[from] anyhow::Error),
}

/// Settings applied when the image bucket has to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPolicy {
    pub public: bool,
    pub file_size_limit: u64,
    pub allowed_mime_types: &'static [&'static str],
}

impl BucketPolicy {
    pub fn images() -> Self {
        Self {
            public: true,
            file_size_limit: MAX_IMAGE_BYTES,
            allowed_mime_types: IMAGE_MIME_TYPES,
        }
    }

    pub fn allows(&self, content_type: &str) -> bool {
        self.allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    fn bucket(&self) -> &str;

    async fn bucket_exists(&self) -> Result<bool, StorageError>;

    /// Creates the bucket. Backends report an existing bucket as
    /// [`StorageError::BucketAlreadyExists`].
    async fn create_bucket(&self, policy: &BucketPolicy) -> Result<(), StorageError>;

    /// Stores `bytes` at `key`, failing with
    /// [`StorageError::ObjectAlreadyExists`] instead of replacing an object.
    async fn put_object(&self, key: &str, bytes: Bytes, content_type: &str)
        -> Result<(), StorageError>;

    fn public_url(&self, key: &str) -> String;

    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
}

pub(crate) fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    public_base_url: Option<String>,
}

impl S3Storage {
    pub fn new(
        client: S3Client,
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint_url: Option<String>,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            region: region.into(),
            endpoint_url,
            public_base_url,
        }
    }

    fn public_read_policy(&self) -> String {
        json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Sid": "PublicRead",
                "Effect": "Allow",
                "Principal": "*",
                "Action": ["s3:GetObject"],
                "Resource": [format!("arn:aws:s3:::{}/*", self.bucket)],
            }]
        })
        .to_string()
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to look up S3 bucket")
                .into()),
        }
    }

    async fn create_bucket(&self, policy: &BucketPolicy) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        if let Err(err) = request.send().await {
            let exists = err.as_service_error().is_some_and(|e| {
                e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()
            });
            if exists {
                return Err(StorageError::BucketAlreadyExists(self.bucket.clone()));
            }
            return Err(anyhow::Error::new(err)
                .context("failed to create S3 bucket")
                .into());
        }

        // S3 has no bucket-level size or MIME limits; ImageStore checks those before each put.
        if policy.public {
            self.client
                .put_bucket_policy()
                .bucket(&self.bucket)
                .policy(self.public_read_policy())
                .send()
                .await
                .context("failed to apply public-read bucket policy")?;
        }

        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .if_none_match("*")
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if matches!(
                    err.as_service_error().and_then(|e| e.code()),
                    Some("PreconditionFailed") | Some("ConditionalRequestConflict")
                ) =>
            {
                Err(StorageError::ObjectAlreadyExists(key.to_string()))
            }
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to upload object to S3")
                .into()),
        }
    }

    fn public_url(&self, key: &str) -> String {
        let key = encode_key(key);
        match (&self.public_base_url, &self.endpoint_url) {
            (Some(base), _) => format!("{}/{key}", base.trim_end_matches('/')),
            (None, Some(endpoint)) => {
                format!("{}/{}/{key}", endpoint.trim_end_matches('/'), self.bucket)
            }
            (None, None) => format!(
                "https://{}.s3.{}.amazonaws.com/{key}",
                self.bucket, self.region
            ),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to delete object from S3")?;
        Ok(())
    }
}

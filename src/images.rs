use std::path::Path as FsPath;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use percent_encoding::percent_decode_str;
use rand::Rng;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{AppConfig, StorageConfig};
use crate::s3::{self, S3Settings};
use crate::storage::{BucketPolicy, ObjectStorage, StorageError};
use crate::supabase::SupabaseStorage;

pub const DEFAULT_FOLDER: &str = "diecasts";

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

/// An inbound image ready to be stored.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Image storage on top of an [`ObjectStorage`] backend.
///
/// The bucket is provisioned lazily on the first upload. Without credentials the
/// store is [`ImageStore::Unconfigured`] and every call fails with
/// [`StorageError::NotConfigured`].
#[derive(Clone)]
pub enum ImageStore {
    Unconfigured,
    Ready(Arc<ReadyStore>),
}

pub struct ReadyStore {
    storage: Arc<dyn ObjectStorage>,
    policy: BucketPolicy,
    provisioned: OnceCell<()>,
}

impl ImageStore {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        ImageStore::Ready(Arc::new(ReadyStore {
            storage,
            policy: BucketPolicy::images(),
            provisioned: OnceCell::new(),
        }))
    }

    pub async fn from_config(config: &AppConfig) -> Self {
        let bucket = config.storage_bucket.as_str();
        match &config.storage {
            StorageConfig::Unconfigured => ImageStore::Unconfigured,
            StorageConfig::Supabase {
                url,
                service_role_key,
            } => ImageStore::new(Arc::new(SupabaseStorage::new(
                reqwest::Client::new(),
                url,
                service_role_key.clone(),
                bucket,
            ))),
            StorageConfig::S3 {
                endpoint_url,
                access_key_id,
                secret_access_key,
                region,
                public_base_url,
            } => {
                let settings = S3Settings {
                    endpoint_url: endpoint_url.as_deref(),
                    access_key_id,
                    secret_access_key,
                    region,
                };
                let storage = s3::build_storage(&settings, bucket, public_base_url.clone()).await;
                ImageStore::new(Arc::new(storage))
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, ImageStore::Ready(_))
    }

    fn ready(&self) -> Result<&ReadyStore, StorageError> {
        match self {
            ImageStore::Unconfigured => Err(StorageError::NotConfigured),
            ImageStore::Ready(store) => Ok(store),
        }
    }

    /// Makes sure the bucket exists, creating it with the image policy when absent.
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        let store = self.ready()?;
        store
            .provisioned
            .get_or_try_init(|| store.provision())
            .await?;
        Ok(())
    }

    /// Stores the image under `folder` with a fresh name and returns its public URL.
    pub async fn upload_image(
        &self,
        upload: ImageUpload,
        folder: &str,
    ) -> Result<String, StorageError> {
        let store = self.ready()?;

        let size = upload.bytes.len() as u64;
        if size > store.policy.file_size_limit {
            return Err(StorageError::Rejected(format!(
                "file is {size} bytes, limit is {}",
                store.policy.file_size_limit
            )));
        }
        if !store.policy.allows(&upload.content_type) {
            return Err(StorageError::Rejected(format!(
                "content type {} is not allowed",
                upload.content_type
            )));
        }

        self.ensure_bucket().await?;

        let object_name = generate_object_name(
            &upload.file_name,
            &upload.content_type,
            Utc::now().timestamp_millis(),
            &mut rand::thread_rng(),
        );
        let folder = folder.trim_matches('/');
        let key = if folder.is_empty() {
            object_name
        } else {
            format!("{folder}/{object_name}")
        };

        store
            .storage
            .put_object(&key, upload.bytes, &upload.content_type)
            .await?;
        info!(key = %key, size, bucket = %store.storage.bucket(), "stored image");

        Ok(store.storage.public_url(&key))
    }

    pub async fn delete_image(&self, path: &str) -> Result<(), StorageError> {
        let store = self.ready()?;
        store.storage.delete_object(path).await?;
        info!(key = %path, bucket = %store.storage.bucket(), "deleted image");
        Ok(())
    }

    /// Recovers the storage path from a URL previously returned by [`Self::upload_image`].
    pub fn path_from_public_url(&self, url: &str) -> Option<String> {
        let store = self.ready().ok()?;
        let prefix = store.storage.public_url("");
        let encoded = url.strip_prefix(prefix.as_str())?;
        let path = percent_decode_str(encoded).decode_utf8().ok()?;
        (!path.is_empty()).then(|| path.into_owned())
    }
}

impl ReadyStore {
    async fn provision(&self) -> Result<(), StorageError> {
        if self.storage.bucket_exists().await? {
            debug!(bucket = %self.storage.bucket(), "storage bucket present");
            return Ok(());
        }

        match self.storage.create_bucket(&self.policy).await {
            Ok(()) => {
                info!(bucket = %self.storage.bucket(), "created storage bucket");
                Ok(())
            }
            Err(StorageError::BucketAlreadyExists(bucket)) => {
                debug!(bucket = %bucket, "storage bucket created concurrently");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

/// `{millis}-{random}.{ext}`, keeping the original extension when there is one.
pub fn generate_object_name(
    file_name: &str,
    content_type: &str,
    now_millis: i64,
    rng: &mut impl Rng,
) -> String {
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| char::from(SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())]))
        .collect();

    match file_extension(file_name, content_type) {
        Some(ext) => format!("{now_millis}-{suffix}.{ext}"),
        None => format!("{now_millis}-{suffix}"),
    }
}

fn file_extension(file_name: &str, content_type: &str) -> Option<String> {
    let from_name = FsPath::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase());

    from_name.or_else(|| {
        let mime = content_type.to_ascii_lowercase();
        let ext = match mime.as_str() {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            other => mime_guess::get_mime_extensions_str(other)?.first().copied()?,
        };
        Some(ext.to_string())
    })
}

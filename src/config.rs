use std::env;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_STORAGE_BUCKET: &str = "images";

/// Database URL variables, in order of preference.
const DATABASE_URL_VARS: &[&str] = &["POSTGRES_URL_NON_POOLING", "POSTGRES_URL", "DATABASE_URL"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origin: Option<String>,
    pub storage_bucket: String,
    pub storage: StorageConfig,
}

/// Which object-storage backend holds uploaded images.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageConfig {
    /// No credentials were supplied; uploads fail with a configuration error.
    Unconfigured,
    Supabase {
        url: String,
        service_role_key: String,
    },
    S3 {
        endpoint_url: Option<String>,
        access_key_id: String,
        secret_access_key: String,
        region: String,
        public_base_url: Option<String>,
    },
}

impl StorageConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageConfig::Unconfigured => "none",
            StorageConfig::Supabase { .. } => "supabase",
            StorageConfig::S3 { .. } => "s3",
        }
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let (Some(url), Some(service_role_key)) =
            (lookup("SUPABASE_URL"), lookup("SUPABASE_SERVICE_ROLE_KEY"))
        {
            return StorageConfig::Supabase {
                url,
                service_role_key,
            };
        }

        if let (Some(access_key_id), Some(secret_access_key)) =
            (lookup("AWS_ACCESS_KEY_ID"), lookup("AWS_SECRET_ACCESS_KEY"))
        {
            return StorageConfig::S3 {
                endpoint_url: lookup("AWS_ENDPOINT_URL"),
                access_key_id,
                secret_access_key,
                region: lookup("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                public_base_url: lookup("STORAGE_PUBLIC_BASE_URL"),
            };
        }

        StorageConfig::Unconfigured
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = database_url_from(non_empty_var).with_context(|| {
            format!(
                "database connection string not found, set one of: {}",
                DATABASE_URL_VARS.join(", ")
            )
        })?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let storage_bucket =
            non_empty_var("STORAGE_BUCKET").unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string());
        let storage = StorageConfig::from_lookup(non_empty_var);

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            cors_allowed_origin,
            storage_bucket,
            storage,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn database_url_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    DATABASE_URL_VARS.iter().find_map(|key| lookup(key))
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}

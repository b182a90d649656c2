use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};

use crate::storage::S3Storage;

pub struct S3Settings<'a> {
    pub endpoint_url: Option<&'a str>,
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub region: &'a str,
}

pub async fn build_client(settings: &S3Settings<'_>) -> S3Client {
    let region_provider = RegionProviderChain::first_try(Some(Region::new(
        settings.region.to_string(),
    )))
    .or_else("us-east-1");

    let credentials = Credentials::new(
        settings.access_key_id,
        settings.secret_access_key,
        None,
        None,
        "static",
    );

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .credentials_provider(credentials);

    if let Some(endpoint) = settings.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    let base_config = loader.load().await;
    // Path-style addressing keeps MinIO and other S3-compatible endpoints working.
    let s3_config = S3ConfigBuilder::from(&base_config)
        .force_path_style(settings.endpoint_url.is_some())
        .build();

    S3Client::from_conf(s3_config)
}

/// Builds the S3 image backend for `bucket`.
pub async fn build_storage(
    settings: &S3Settings<'_>,
    bucket: &str,
    public_base_url: Option<String>,
) -> S3Storage {
    let client = build_client(settings).await;
    S3Storage::new(
        client,
        bucket,
        settings.region,
        settings.endpoint_url.map(str::to_string),
        public_base_url,
    )
}

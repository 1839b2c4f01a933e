use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use uuid::Uuid;

const PRESIGN_TTL_SECS: u64 = 30 * 60;

/// Raw photo storage. Only jpeg/png pass the upload boundary; callers validate
/// content types before calling `save`.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Stores the bytes and returns the image id (storage key).
    async fn save(&self, body: Bytes, content_type: &str) -> anyhow::Result<String>;
    async fn load(&self, image_id: &str) -> anyhow::Result<Option<Bytes>>;
    async fn get_url(&self, image_id: &str) -> anyhow::Result<Option<String>>;
    async fn delete(&self, image_id: &str) -> anyhow::Result<bool>;
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

#[derive(Clone)]
pub struct S3ImageStore {
    client: Client,
    bucket: String,
}

impl S3ImageStore {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn save(&self, body: Bytes, content_type: &str) -> anyhow::Result<String> {
        let ext = ext_from_mime(content_type)
            .ok_or_else(|| anyhow::anyhow!("unsupported content type: {content_type}"))?;
        let key = format!("meals/{}.{}", Uuid::new_v4(), ext);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("s3 put_object {key}"))?;
        Ok(key)
    }

    async fn load(&self, image_id: &str) -> anyhow::Result<Option<Bytes>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(image_id)
            .send()
            .await;
        match result {
            Ok(out) => {
                let data = out
                    .body
                    .collect()
                    .await
                    .with_context(|| format!("s3 read body {image_id}"))?;
                Ok(Some(data.into_bytes()))
            }
            Err(e) if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) => {
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("s3 get_object {image_id}")),
        }
    }

    async fn get_url(&self, image_id: &str) -> anyhow::Result<Option<String>> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(image_id)
            .presigned(PresigningConfig::expires_in(
                std::time::Duration::from_secs(PRESIGN_TTL_SECS),
            )?)
            .await
            .with_context(|| format!("s3 presign {image_id}"))?;
        Ok(Some(presigned.uri().to_string()))
    }

    async fn delete(&self, image_id: &str) -> anyhow::Result<bool> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(image_id)
            .send()
            .await
            .with_context(|| format!("s3 delete_object {image_id}"))?;
        Ok(true)
    }
}

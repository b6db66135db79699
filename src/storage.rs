// ABOUTME: Blob store access for source media and generated thumbnails
// ABOUTME: BlobStore trait with a Google Cloud Storage implementation

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use google_cloud_storage::{
    client::{Client as GcsClient, ClientConfig},
    http::{
        self,
        objects::{
            download::Range as DownloadRange,
            get::GetObjectRequest,
            upload::{UploadObjectRequest, UploadType},
            Object,
        },
    },
};
use thiserror::Error;
use tracing::{debug, info};

/// Chunks of an object as they arrive from the store
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("gs://{container}/{key} does not exist")]
    NotFound { container: String, key: String },
    #[error("GCS request failed: {0}")]
    Gcs(#[from] http::Error),
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Object store addressed by (container, key)
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Start a streamed read. Missing objects fail with `StoreError::NotFound`.
    async fn open_read(&self, container: &str, key: &str) -> Result<ByteStream, StoreError>;

    /// Custom metadata attached to an object
    async fn metadata(&self, container: &str, key: &str)
        -> Result<HashMap<String, String>, StoreError>;

    /// Store `data` under `key` with the given metadata attached in the same write
    async fn write(
        &self,
        container: &str,
        key: &str,
        metadata: HashMap<String, String>,
        content_type: &str,
        data: Bytes,
    ) -> Result<(), StoreError>;
}

pub struct GcsStore {
    client: GcsClient,
}

impl GcsStore {
    /// Build a client from ambient credentials (metadata server or GOOGLE_APPLICATION_CREDENTIALS)
    pub async fn from_env() -> anyhow::Result<Self> {
        let config = ClientConfig::default().with_auth().await?;
        info!("GCS client initialized");
        Ok(Self {
            client: GcsClient::new(config),
        })
    }
}

fn classify_gcs_error(err: http::Error, container: &str, key: &str) -> StoreError {
    match &err {
        http::Error::Response(resp) if resp.code == 404 => StoreError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        },
        _ => StoreError::Gcs(err),
    }
}

fn get_request(container: &str, key: &str) -> GetObjectRequest {
    GetObjectRequest {
        bucket: container.to_string(),
        object: key.to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl BlobStore for GcsStore {
    async fn open_read(&self, container: &str, key: &str) -> Result<ByteStream, StoreError> {
        debug!("Opening gs://{}/{}", container, key);
        let data = self
            .client
            .download_object(&get_request(container, key), &DownloadRange::default())
            .await
            .map_err(|e| classify_gcs_error(e, container, key))?;

        debug!("Downloaded {} bytes from gs://{}/{}", data.len(), container, key);
        Ok(futures::stream::once(async move { Ok::<_, StoreError>(Bytes::from(data)) }).boxed())
    }

    async fn metadata(
        &self,
        container: &str,
        key: &str,
    ) -> Result<HashMap<String, String>, StoreError> {
        let obj = self
            .client
            .get_object(&get_request(container, key))
            .await
            .map_err(|e| classify_gcs_error(e, container, key))?;

        Ok(obj.metadata.unwrap_or_default())
    }

    async fn write(
        &self,
        container: &str,
        key: &str,
        metadata: HashMap<String, String>,
        content_type: &str,
        data: Bytes,
    ) -> Result<(), StoreError> {
        let size = data.len();
        // Multipart upload so the metadata lands with the object rather than in a later patch
        let object = Object {
            name: key.to_string(),
            bucket: container.to_string(),
            content_type: Some(content_type.to_string()),
            metadata: Some(metadata),
            ..Default::default()
        };
        let req = UploadObjectRequest {
            bucket: container.to_string(),
            ..Default::default()
        };

        self.client
            .upload_object(&req, data, &UploadType::Multipart(Box::new(object)))
            .await?;

        info!("Uploaded {} bytes to gs://{}/{}", size, container, key);
        Ok(())
    }
}

use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Errors raised by the file store
#[derive(Error, Debug)]
pub enum FileStoreError {
    #[error("failed to upload {file_id}: {message}")]
    Upload { file_id: String, message: String },

    #[error("failed to delete {file_id}: {message}")]
    Delete { file_id: String, message: String },
}

/// A file persisted in the bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_id: String,
    /// Durable public URL of the file
    pub url: String,
}

/// Binary object storage for uploaded media
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store a file under the given id and return its public URL
    async fn create_file(
        &self,
        file_id: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredFile, FileStoreError>;

    async fn delete_file(&self, file_id: &str) -> Result<(), FileStoreError>;

    /// Parse a public URL produced by this store back into its file id
    fn file_id_from_url(&self, url: &str) -> Option<String>;
}

/// Public URL layout: `{public_base_url}/{bucket}/media/{file_id}`
#[derive(Debug, Clone)]
pub struct StorageUrls {
    prefix: String,
}

impl StorageUrls {
    pub fn new(public_base_url: &str, bucket: &str) -> Self {
        Self {
            prefix: format!("{}/{}/media/", public_base_url.trim_end_matches('/'), bucket),
        }
    }

    /// Object key of a file within the bucket
    pub fn object_key(file_id: &str) -> String {
        format!("media/{}", file_id)
    }

    pub fn public_url(&self, file_id: &str) -> String {
        format!("{}{}", self.prefix, file_id)
    }

    pub fn file_id_from_url(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(&self.prefix)?;
        let file_id = rest.split(['?', '#']).next().unwrap_or_default();

        if file_id.is_empty() || sanitize_path_component(file_id) != file_id {
            return None;
        }
        Some(file_id.to_string())
    }
}

/// Generate a fresh file id carrying the extension for a content type
pub fn generate_file_id(content_type: &str) -> String {
    format!("{}.{}", Uuid::new_v4(), get_extension(content_type))
}

/// S3-compatible file store
pub struct S3FileStore {
    client: S3Client,
    bucket: String,
    urls: StorageUrls,
    public_read: bool,
}

impl S3FileStore {
    /// Create a new S3 file store
    pub async fn new(config: &StorageConfig) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 file store initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
            urls: StorageUrls::new(&config.public_base_url, &config.bucket),
            public_read: config.public_read,
        }
    }

    /// Check the bucket is reachable
    pub async fn ping(&self) -> bool {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
    }
}

#[async_trait]
impl FileStore for S3FileStore {
    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn create_file(
        &self,
        file_id: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredFile, FileStoreError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(StorageUrls::object_key(file_id))
            .body(ByteStream::from(data))
            .content_type(content_type);

        if self.public_read {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }

        request.send().await.map_err(|e| FileStoreError::Upload {
            file_id: file_id.to_string(),
            message: e.to_string(),
        })?;

        debug!(file_id = %file_id, "File uploaded");

        Ok(StoredFile {
            file_id: file_id.to_string(),
            url: self.urls.public_url(file_id),
        })
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, file_id: &str) -> Result<(), FileStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(StorageUrls::object_key(file_id))
            .send()
            .await
            .map_err(|e| FileStoreError::Delete {
                file_id: file_id.to_string(),
                message: e.to_string(),
            })?;

        debug!(file_id = %file_id, "File deleted");
        Ok(())
    }

    fn file_id_from_url(&self, url: &str) -> Option<String> {
        self.urls.file_id_from_url(url)
    }
}

/// In-process file store, used by tests and local tooling
pub struct MemoryFileStore {
    urls: StorageUrls,
    files: Mutex<HashMap<String, (String, usize)>>,
}

impl MemoryFileStore {
    pub fn new(urls: StorageUrls) -> Self {
        Self {
            urls,
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.files
            .lock()
            .map(|files| files.contains_key(file_id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|files| files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn create_file(
        &self,
        file_id: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredFile, FileStoreError> {
        let mut files = self.files.lock().map_err(|_| FileStoreError::Upload {
            file_id: file_id.to_string(),
            message: "memory store poisoned".to_string(),
        })?;
        files.insert(file_id.to_string(), (content_type.to_string(), data.len()));

        Ok(StoredFile {
            file_id: file_id.to_string(),
            url: self.urls.public_url(file_id),
        })
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), FileStoreError> {
        let mut files = self.files.lock().map_err(|_| FileStoreError::Delete {
            file_id: file_id.to_string(),
            message: "memory store poisoned".to_string(),
        })?;

        match files.remove(file_id) {
            Some(_) => Ok(()),
            None => Err(FileStoreError::Delete {
                file_id: file_id.to_string(),
                message: "no such file".to_string(),
            }),
        }
    }

    fn file_id_from_url(&self, url: &str) -> Option<String> {
        self.urls.file_id_from_url(url)
    }
}

/// Sanitize a path component to prevent path traversal
fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect::<String>()
        .replace("..", "__")
}

/// Get file extension for a content type
fn get_extension(content_type: &str) -> &'static str {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/avif" => "avif",
        "image/svg+xml" => "svg",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls() -> StorageUrls {
        StorageUrls::new("https://cdn.atelier.test/", "atelier-media")
    }

    #[test]
    fn test_public_url_round_trips_to_file_id() {
        let urls = urls();
        let url = urls.public_url("abc-123.jpg");
        assert_eq!(url, "https://cdn.atelier.test/atelier-media/media/abc-123.jpg");
        assert_eq!(urls.file_id_from_url(&url).as_deref(), Some("abc-123.jpg"));
    }

    #[test]
    fn test_file_id_from_url_rejects_foreign_urls() {
        let urls = urls();
        assert_eq!(urls.file_id_from_url("https://example.com/x.jpg"), None);
        assert_eq!(
            urls.file_id_from_url("https://cdn.atelier.test/other-bucket/media/a.jpg"),
            None
        );
        assert_eq!(
            urls.file_id_from_url("https://cdn.atelier.test/atelier-media/media/"),
            None
        );
        assert_eq!(
            urls.file_id_from_url("https://cdn.atelier.test/atelier-media/media/../secret"),
            None
        );
    }

    #[test]
    fn test_file_id_from_url_ignores_query() {
        let urls = urls();
        assert_eq!(
            urls.file_id_from_url("https://cdn.atelier.test/atelier-media/media/a.png?w=200")
                .as_deref(),
            Some("a.png")
        );
    }

    #[test]
    fn test_sanitize_path_component() {
        assert_eq!(sanitize_path_component("photo-001.jpg"), "photo-001.jpg");
        assert_eq!(sanitize_path_component("dir/path"), "dir_path");
        assert_eq!(sanitize_path_component("dev..ice"), "dev__ice");
        assert_eq!(sanitize_path_component("hello world"), "hello_world");
    }

    #[test]
    fn test_generate_file_id_uses_extension() {
        assert!(generate_file_id("image/png").ends_with(".png"));
        assert!(generate_file_id("VIDEO/MP4").ends_with(".mp4"));
        assert!(generate_file_id("application/x-unknown").ends_with(".bin"));
    }

    #[tokio::test]
    async fn test_memory_file_store_create_and_delete() {
        let store = MemoryFileStore::new(urls());
        let stored = store
            .create_file("a.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();

        assert!(store.contains("a.jpg"));
        assert_eq!(store.file_id_from_url(&stored.url).as_deref(), Some("a.jpg"));

        store.delete_file("a.jpg").await.unwrap();
        assert!(store.is_empty());
        assert!(store.delete_file("a.jpg").await.is_err());
    }
}

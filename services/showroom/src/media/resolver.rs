use super::{
    kind_for_content_type, kind_for_path, validate_url_length_with, MediaAccept, MediaError,
    MediaKind, MediaReference, UploadSession,
};
use crate::config::MediaConfig;
use crate::file_store::FileStore;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// A file field received in a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Raw input for one media slot: a new file or a new URL
#[derive(Debug, Default)]
pub struct MediaInput {
    pub file: Option<UploadedFile>,
    pub url: Option<String>,
}

impl MediaInput {
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.url.as_deref().map_or(true, |u| u.trim().is_empty())
    }
}

/// Reference a form keeps from the entity's previous state. Either the
/// tagged JSON form or a bare URL string is accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeptReference {
    Tagged(MediaReference),
    Bare(String),
}

impl KeptReference {
    pub fn url(&self) -> &str {
        match self {
            KeptReference::Tagged(r) => r.url(),
            KeptReference::Bare(url) => url,
        }
    }
}

/// A media reference together with the kind of media behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub reference: MediaReference,
    pub kind: MediaKind,
}

/// Performs the load test for an external URL
#[async_trait]
pub trait UrlProbe: Send + Sync {
    /// Load the URL and report what kind of media it serves, or why it
    /// could not be loaded
    async fn probe(&self, url: &Url, accept: MediaAccept) -> Result<MediaKind, String>;
}

/// Turns form input into media references
pub struct MediaResolver {
    file_store: Arc<dyn FileStore>,
    probe: Arc<dyn UrlProbe>,
    limits: MediaConfig,
}

impl MediaResolver {
    pub fn new(
        file_store: Arc<dyn FileStore>,
        probe: Arc<dyn UrlProbe>,
        limits: MediaConfig,
    ) -> Self {
        Self {
            file_store,
            probe,
            limits,
        }
    }

    /// Start tracking the uploads of one request
    pub fn session(&self) -> UploadSession {
        UploadSession::new(self.file_store.clone())
    }

    /// Resolve a slot that must receive exactly one of a file or a URL
    #[instrument(skip(self, input, session))]
    pub async fn resolve_media_input(
        &self,
        slot: &str,
        input: MediaInput,
        accept: MediaAccept,
        session: &mut UploadSession,
    ) -> Result<ResolvedMedia, MediaError> {
        self.resolve_optional(slot, input, accept, session)
            .await?
            .ok_or_else(|| MediaError::MissingMediaInput {
                slot: slot.to_string(),
            })
    }

    /// Resolve a slot that may be left empty
    pub async fn resolve_optional(
        &self,
        slot: &str,
        input: MediaInput,
        accept: MediaAccept,
        session: &mut UploadSession,
    ) -> Result<Option<ResolvedMedia>, MediaError> {
        let url = input.url.filter(|u| !u.trim().is_empty());

        match (input.file, url) {
            (Some(_), Some(_)) => Err(MediaError::AmbiguousMediaInput {
                slot: slot.to_string(),
            }),
            (Some(file), None) => {
                let kind = self.validate_file(slot, &file, accept)?;
                let stored = session.upload(file.data, &file.content_type).await?;
                Ok(Some(ResolvedMedia {
                    reference: MediaReference::Uploaded {
                        url: stored.url,
                        stored_file_id: stored.file_id,
                    },
                    kind,
                }))
            }
            (None, Some(url)) => {
                let (url, kind) = self.check_external_url(&url, accept).await?;
                Ok(Some(ResolvedMedia {
                    reference: MediaReference::External { url },
                    kind,
                }))
            }
            (None, None) => Ok(None),
        }
    }

    /// Check MIME type and size of an upload before anything is stored
    pub fn validate_file(
        &self,
        slot: &str,
        file: &UploadedFile,
        accept: MediaAccept,
    ) -> Result<MediaKind, MediaError> {
        let kind = kind_for_content_type(&file.content_type)
            .filter(|kind| accept.allows(*kind))
            .ok_or_else(|| MediaError::UnsupportedFileType {
                slot: slot.to_string(),
                content_type: file.content_type.clone(),
            })?;

        let limit = self.size_limit(kind);
        if file.data.len() > limit {
            return Err(MediaError::FileTooLarge {
                slot: slot.to_string(),
                size: file.data.len(),
                limit,
            });
        }

        Ok(kind)
    }

    /// Validate an external URL and load-test it within the probe timeout
    #[instrument(skip(self))]
    pub async fn check_external_url(
        &self,
        raw: &str,
        accept: MediaAccept,
    ) -> Result<(String, MediaKind), MediaError> {
        let url = raw.trim();
        let invalid = |reason: &str| MediaError::InvalidMediaUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        if url.is_empty() {
            return Err(invalid("URL is empty"));
        }
        validate_url_length_with(url, self.limits.max_url_len)?;

        let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("only http and https URLs are supported"));
        }

        let timeout = self.limits.probe_timeout();
        let outcome = tokio::time::timeout(timeout, self.probe.probe(&parsed, accept)).await;

        match outcome {
            Ok(Ok(kind)) => {
                debug!(kind = ?kind, "Media URL passed load test");
                Ok((url.to_string(), kind))
            }
            Ok(Err(reason)) => {
                metrics::counter!("showroom.media.probe_failed").increment(1);
                Err(invalid(&reason))
            }
            Err(_) => {
                metrics::counter!("showroom.media.probe_failed").increment(1);
                Err(invalid(&format!(
                    "did not load within {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    /// Re-derive a kept reference from its URL. Client-supplied file ids
    /// are never trusted: only URLs under our bucket become `uploaded`.
    pub fn classify_kept(&self, kept: &KeptReference) -> Result<MediaReference, MediaError> {
        let url = kept.url().trim();
        validate_url_length_with(url, self.limits.max_url_len)?;
        if url.is_empty() {
            return Err(MediaError::InvalidMediaUrl {
                url: String::new(),
                reason: "URL is empty".to_string(),
            });
        }

        Ok(match self.file_store.file_id_from_url(url) {
            Some(stored_file_id) => MediaReference::Uploaded {
                url: url.to_string(),
                stored_file_id,
            },
            None => MediaReference::External {
                url: url.to_string(),
            },
        })
    }

    /// Resolve a reference the form keeps. External URLs the entity did not
    /// already have are load-tested like new input.
    pub async fn resolve_kept(
        &self,
        slot: &str,
        kept: &KeptReference,
        previous: &[MediaReference],
        accept: MediaAccept,
    ) -> Result<ResolvedMedia, MediaError> {
        let reference = self.classify_kept(kept)?;

        if let MediaReference::External { url } = &reference {
            if !previous.contains(&reference) {
                let (url, kind) = self.check_external_url(url, accept).await?;
                return Ok(ResolvedMedia {
                    reference: MediaReference::External { url },
                    kind,
                });
            }
        }

        let kind = kind_for_path(reference.url());
        if !accept.allows(kind) {
            return Err(MediaError::UnsupportedFileType {
                slot: slot.to_string(),
                content_type: format!("{:?}", kind).to_lowercase(),
            });
        }
        Ok(ResolvedMedia { reference, kind })
    }

    fn size_limit(&self, kind: MediaKind) -> usize {
        match kind {
            MediaKind::Image => self.limits.max_image_bytes,
            MediaKind::Video => self.limits.max_video_bytes,
        }
    }
}

/// Load test over HTTP: the URL must answer with a success status and a
/// Content-Type of an accepted kind. Images must also decode.
pub struct HttpUrlProbe {
    client: reqwest::Client,
    limits: MediaConfig,
}

impl HttpUrlProbe {
    pub fn new(limits: MediaConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(limits.probe_timeout() + Duration::from_secs(1))
            .user_agent("atelier-showroom/0.1")
            .build()?;

        Ok(Self::with_client(client, limits))
    }

    pub fn with_client(client: reqwest::Client, limits: MediaConfig) -> Self {
        Self { client, limits }
    }
}

#[async_trait]
impl UrlProbe for HttpUrlProbe {
    async fn probe(&self, url: &Url, accept: MediaAccept) -> Result<MediaKind, String> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("server answered {}", response.status()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let declared = kind_for_content_type(&content_type).ok_or_else(|| {
            format!("URL does not serve a supported media type: {content_type:?}")
        })?;

        match declared {
            MediaKind::Video if accept.allows(MediaKind::Video) => return Ok(MediaKind::Video),
            MediaKind::Video => return Err("URL serves a video, expected an image".to_string()),
            MediaKind::Image if !accept.allows(MediaKind::Image) => {
                return Err("URL serves an image, expected a video".to_string());
            }
            MediaKind::Image => {}
        }

        let is_svg = content_type.to_ascii_lowercase().starts_with("image/svg+xml");

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| format!("download failed: {e}"))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > self.limits.max_image_bytes {
                return Err("image exceeds the size limit".to_string());
            }
        }

        if is_svg {
            return Ok(MediaKind::Image);
        }

        let decoded = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&body).map(|_| ())
        })
        .await
        .map_err(|e| format!("decode task failed: {e}"))?;

        decoded.map(|_| MediaKind::Image).map_err(|e| {
            warn!(url = %url, error = %e, "Media URL did not decode as an image");
            format!("not a decodable image: {e}")
        })
    }
}

//! Media references and their lifecycle.
//!
//! An entity acquires an image or video either by upload (the binary goes
//! to the [`FileStore`] and the reference is tagged `uploaded`) or by an
//! external URL that has passed a real load test (tagged `external`).
//! When an entity is edited or deleted, [`diff_references`] computes what
//! it no longer points at and [`reclaim_orphaned`] deletes the backing
//! files. Cleanup never fails the mutation that triggered it.

mod resolver;
mod uploads;

pub use resolver::{
    HttpUrlProbe, KeptReference, MediaInput, MediaResolver, ResolvedMedia, UploadedFile,
    UrlProbe,
};
pub use uploads::UploadSession;

use crate::file_store::{FileStore, FileStoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum length of a media URL
pub const MAX_URL_LEN: usize = 512;

/// Errors raised while accepting media input
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("invalid media URL {url:?}: {reason}")]
    InvalidMediaUrl { url: String, reason: String },

    #[error("URL is {len} characters long, the limit is {max}")]
    UrlTooLong { len: usize, max: usize },

    #[error("unsupported file type {content_type} for {slot}")]
    UnsupportedFileType { slot: String, content_type: String },

    #[error("file for {slot} is {size} bytes, the limit is {limit}")]
    FileTooLarge {
        slot: String,
        size: usize,
        limit: usize,
    },

    #[error("{slot} requires a file or a URL")]
    MissingMediaInput { slot: String },

    #[error("{slot} accepts a file or a URL, not both")]
    AmbiguousMediaInput { slot: String },

    #[error("upload failed: {0}")]
    Upload(#[from] FileStoreError),
}

/// Pointer to an image or video attached to an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaReference {
    /// Binary stored in our bucket
    Uploaded {
        url: String,
        #[serde(rename = "storedFileId")]
        stored_file_id: String,
    },
    /// Externally hosted media that passed a load test
    External { url: String },
}

impl MediaReference {
    pub fn url(&self) -> &str {
        match self {
            MediaReference::Uploaded { url, .. } | MediaReference::External { url } => url,
        }
    }

    /// Stored file id, for uploaded references only
    pub fn stored_file_id(&self) -> Option<&str> {
        match self {
            MediaReference::Uploaded { stored_file_id, .. } => Some(stored_file_id),
            MediaReference::External { .. } => None,
        }
    }

    fn identity(&self) -> (bool, &str) {
        match self {
            MediaReference::Uploaded { stored_file_id, .. } => (true, stored_file_id),
            MediaReference::External { url } => (false, url),
        }
    }
}

/// Whether a media item is an image or a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
}

/// Media kinds a slot accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAccept {
    Image,
    Video,
    ImageOrVideo,
}

impl MediaAccept {
    pub fn allows(self, kind: MediaKind) -> bool {
        matches!(
            (self, kind),
            (MediaAccept::Image, MediaKind::Image)
                | (MediaAccept::Video, MediaKind::Video)
                | (MediaAccept::ImageOrVideo, _)
        )
    }
}

/// Map a MIME type onto the media kind it carries, if it is one we accept
pub fn kind_for_content_type(content_type: &str) -> Option<MediaKind> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/png" | "image/webp" | "image/gif" | "image/avif"
        | "image/svg+xml" => Some(MediaKind::Image),
        "video/mp4" | "video/webm" | "video/quicktime" => Some(MediaKind::Video),
        _ => None,
    }
}

/// Guess the media kind from the extension of a URL path
pub fn kind_for_path(url: &str) -> MediaKind {
    let path = url.split(['?', '#']).next().unwrap_or_default().to_lowercase();
    if [".mp4", ".webm", ".mov"].iter().any(|ext| path.ends_with(ext)) {
        MediaKind::Video
    } else {
        MediaKind::Image
    }
}

/// Reject URLs longer than [`MAX_URL_LEN`] characters
pub fn validate_url_length(url: &str) -> Result<(), MediaError> {
    validate_url_length_with(url, MAX_URL_LEN)
}

pub(crate) fn validate_url_length_with(url: &str, max: usize) -> Result<(), MediaError> {
    let len = url.chars().count();
    if len > max {
        return Err(MediaError::UrlTooLong { len, max });
    }
    Ok(())
}

/// References present in `previous` but absent from `next`, in the order
/// of `previous`. Uploaded references compare by stored file id and
/// external references by URL.
pub fn diff_references(previous: &[MediaReference], next: &[MediaReference]) -> Vec<MediaReference> {
    let kept: HashSet<_> = next.iter().map(MediaReference::identity).collect();
    let mut seen = HashSet::new();

    previous
        .iter()
        .filter(|r| !kept.contains(&r.identity()) && seen.insert(r.identity()))
        .cloned()
        .collect()
}

/// Outcome of a reclaim pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReclaimReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Delete the stored file behind every uploaded reference in `removed`.
///
/// Callers pass only references that no entity uses any more. Failures are
/// logged and reported, never returned as errors.
pub async fn reclaim_orphaned(store: &dyn FileStore, removed: &[MediaReference]) -> ReclaimReport {
    let mut report = ReclaimReport::default();
    let mut seen = HashSet::new();

    for file_id in removed.iter().filter_map(MediaReference::stored_file_id) {
        if !seen.insert(file_id) {
            continue;
        }

        match store.delete_file(file_id).await {
            Ok(()) => {
                debug!(file_id = %file_id, "Reclaimed orphaned file");
                metrics::counter!("showroom.media.reclaimed").increment(1);
                report.deleted.push(file_id.to_string());
            }
            Err(e) => {
                warn!(file_id = %file_id, error = %e, "Orphan cleanup failed");
                metrics::counter!("showroom.media.reclaim_failed").increment(1);
                report.failed.push(file_id.to_string());
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_store::MockFileStore;
    use mockall::predicate::eq;

    fn uploaded(id: &str) -> MediaReference {
        MediaReference::Uploaded {
            url: format!("https://cdn.test/bucket/media/{id}"),
            stored_file_id: id.to_string(),
        }
    }

    fn external(url: &str) -> MediaReference {
        MediaReference::External {
            url: url.to_string(),
        }
    }

    #[test]
    fn test_validate_url_length_boundary() {
        let at_limit = "a".repeat(512);
        let over_limit = "a".repeat(513);

        assert!(validate_url_length(&at_limit).is_ok());
        assert!(matches!(
            validate_url_length(&over_limit),
            Err(MediaError::UrlTooLong { len: 513, max: 512 })
        ));
    }

    #[test]
    fn test_diff_references_reports_removed() {
        let (a, b, c) = (uploaded("a"), external("https://x.test/b.jpg"), uploaded("c"));

        let removed = diff_references(&[a.clone(), b.clone(), c.clone()], &[a.clone(), c]);
        assert_eq!(removed, vec![b.clone()]);

        let removed = diff_references(&[a.clone()], &[a, b]);
        assert!(removed.is_empty());
    }

    #[test]
    fn test_diff_references_matches_uploaded_by_file_id() {
        let old = uploaded("a");
        let same_file_new_url = MediaReference::Uploaded {
            url: "https://other-cdn.test/a".to_string(),
            stored_file_id: "a".to_string(),
        };

        assert!(diff_references(&[old], &[same_file_new_url]).is_empty());
    }

    #[test]
    fn test_media_reference_wire_format() {
        let json = serde_json::to_value(uploaded("f1")).unwrap();
        assert_eq!(json["kind"], "uploaded");
        assert_eq!(json["storedFileId"], "f1");

        let parsed: MediaReference =
            serde_json::from_str(r#"{"kind":"external","url":"https://x.test/a.png"}"#).unwrap();
        assert_eq!(parsed, external("https://x.test/a.png"));
    }

    #[test]
    fn test_kind_for_content_type() {
        assert_eq!(kind_for_content_type("image/JPEG"), Some(MediaKind::Image));
        assert_eq!(kind_for_content_type("video/mp4; codecs=avc1"), Some(MediaKind::Video));
        assert_eq!(kind_for_content_type("application/pdf"), None);
        assert!(MediaAccept::ImageOrVideo.allows(MediaKind::Video));
        assert!(!MediaAccept::Image.allows(MediaKind::Video));
        assert_eq!(kind_for_path("https://cdn.test/m/a.MP4?t=1"), MediaKind::Video);
        assert_eq!(kind_for_path("https://cdn.test/m/a.jpg"), MediaKind::Image);
    }

    #[tokio::test]
    async fn test_reclaim_deletes_each_uploaded_file_once() {
        let mut store = MockFileStore::new();
        store
            .expect_delete_file()
            .with(eq("a"))
            .times(1)
            .returning(|_| Ok(()));

        let removed = vec![uploaded("a"), external("https://x.test/b.jpg"), uploaded("a")];
        let report = reclaim_orphaned(&store, &removed).await;

        assert_eq!(report.deleted, vec!["a".to_string()]);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_reclaim_swallows_delete_failures() {
        let mut store = MockFileStore::new();
        store.expect_delete_file().times(2).returning(|id| {
            if id == "bad" {
                Err(FileStoreError::Delete {
                    file_id: id.to_string(),
                    message: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        });

        let report = reclaim_orphaned(&store, &[uploaded("bad"), uploaded("good")]).await;

        assert_eq!(report.deleted, vec!["good".to_string()]);
        assert_eq!(report.failed, vec!["bad".to_string()]);
    }

    #[tokio::test]
    async fn test_reclaim_ignores_external_references() {
        let mut store = MockFileStore::new();
        store.expect_delete_file().never();

        let report = reclaim_orphaned(&store, &[external("https://x.test/a.jpg")]).await;
        assert_eq!(report, ReclaimReport::default());
    }
}

use crate::file_store::{generate_file_id, FileStore, FileStoreError, StoredFile};
use std::sync::Arc;
use tracing::{debug, warn};

/// Tracks the files uploaded while handling one request.
///
/// A session ends in exactly one of three ways: [`commit`](Self::commit)
/// keeps the files, [`discard`](Self::discard) deletes them, and dropping an
/// unfinished session schedules the deletion on the runtime.
pub struct UploadSession {
    store: Arc<dyn FileStore>,
    uploaded: Vec<String>,
}

impl UploadSession {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self {
            store,
            uploaded: Vec::new(),
        }
    }

    /// Upload a file under a freshly generated id
    pub async fn upload(
        &mut self,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredFile, FileStoreError> {
        let file_id = generate_file_id(content_type);
        let stored = self.store.create_file(&file_id, data, content_type).await?;

        metrics::counter!("showroom.media.uploaded").increment(1);
        self.uploaded.push(stored.file_id.clone());
        Ok(stored)
    }

    /// File ids uploaded so far
    pub fn uploaded(&self) -> &[String] {
        &self.uploaded
    }

    /// Keep every uploaded file
    pub fn commit(mut self) {
        self.uploaded.clear();
    }

    /// End the session, handing its file ids to the caller
    pub fn into_file_ids(mut self) -> Vec<String> {
        std::mem::take(&mut self.uploaded)
    }

    /// Delete every file uploaded by this session
    pub async fn discard(mut self) {
        let file_ids = std::mem::take(&mut self.uploaded);
        delete_all(self.store.as_ref(), &file_ids).await;
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if self.uploaded.is_empty() {
            return;
        }

        let file_ids = std::mem::take(&mut self.uploaded);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                handle.spawn(async move {
                    delete_all(store.as_ref(), &file_ids).await;
                });
            }
            Err(_) => {
                warn!(
                    count = file_ids.len(),
                    "Upload session dropped outside a runtime, files leaked"
                );
            }
        }
    }
}

async fn delete_all(store: &dyn FileStore, file_ids: &[String]) {
    for file_id in file_ids {
        match store.delete_file(file_id).await {
            Ok(()) => debug!(file_id = %file_id, "Discarded pending upload"),
            Err(e) => warn!(file_id = %file_id, error = %e, "Failed to discard pending upload"),
        }
    }
}

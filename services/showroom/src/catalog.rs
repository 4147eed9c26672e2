use crate::config::CollectionsConfig;
use crate::document_store::{DocumentStore, StoreError};
use crate::file_store::FileStore;
use crate::media::{
    diff_references, reclaim_orphaned, MediaReference, ReclaimReport, UploadSession,
};
use crate::models::{
    CompanyInfo, Entity, FeaturedEntry, HeroMediaItem, PortfolioProject, Product, TeamMember,
    Testimonial,
};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Typed access to one collection of the document store
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    /// Configured collection id, if any
    collection: Option<String>,
    /// Logical name, used when the collection is not configured
    name: &'static str,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            collection: self.collection.clone(),
            name: self.name,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        name: &'static str,
        collection: Option<String>,
    ) -> Self {
        Self {
            store,
            collection,
            name,
            _entity: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn collection(&self) -> Result<&str, StoreError> {
        self.collection
            .as_deref()
            .ok_or(StoreError::Unconfigured(self.name))
    }

    /// All entities in insertion order. Documents that fail to decode are
    /// logged and skipped.
    pub async fn list(&self) -> Result<Vec<T>, StoreError> {
        let collection = self.collection()?;
        let documents = self.store.list_documents(collection).await?;

        Ok(documents
            .into_iter()
            .filter_map(|doc| match serde_json::from_value(doc.data) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!(
                        collection = %collection,
                        id = %doc.id,
                        error = %e,
                        "Skipping malformed document"
                    );
                    None
                }
            })
            .collect())
    }

    pub async fn get(&self, key: &str) -> Result<Option<T>, StoreError> {
        let collection = self.collection()?;
        match self.store.get_document(collection, key).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc.data)?)),
            None => Ok(None),
        }
    }

    pub async fn create(&self, entity: &T) -> Result<(), StoreError> {
        let collection = self.collection()?;
        let data = serde_json::to_value(entity)?;
        self.store
            .create_document(collection, &entity.key(), &data)
            .await?;
        Ok(())
    }

    pub async fn update(&self, entity: &T) -> Result<(), StoreError> {
        let collection = self.collection()?;
        let data = serde_json::to_value(entity)?;
        self.store
            .update_document(collection, &entity.key(), &data)
            .await?;
        Ok(())
    }

    /// Delete by key. Returns whether the entity existed.
    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let collection = self.collection()?;
        self.store.delete_document(collection, key).await
    }

    /// Stored file id of every uploaded reference in the raw documents,
    /// including ones that no longer decode as `T`
    async fn stored_file_ids(&self) -> Result<HashSet<String>, StoreError> {
        let mut ids = HashSet::new();
        let Some(collection) = self.collection.as_deref() else {
            return Ok(ids);
        };

        for doc in self.store.list_documents(collection).await? {
            collect_from_value(&doc.data, &mut ids);
        }
        Ok(ids)
    }
}

fn collect_from_value(value: &serde_json::Value, into: &mut HashSet<String>) {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("kind").and_then(|k| k.as_str()) == Some("uploaded") {
                if let Some(id) = map.get("storedFileId").and_then(|v| v.as_str()) {
                    into.insert(id.to_string());
                }
            }
            map.values().for_each(|v| collect_from_value(v, into));
        }
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_from_value(v, into)),
        _ => {}
    }
}

/// Every collection of the showroom, plus media cleanup across them
pub struct Catalog {
    pub products: Repository<Product>,
    pub portfolio: Repository<PortfolioProject>,
    pub testimonials: Repository<Testimonial>,
    pub hero_media: Repository<HeroMediaItem>,
    pub company_info: Repository<CompanyInfo>,
    pub team_members: Repository<TeamMember>,
    pub featured: Repository<FeaturedEntry>,
    store: Arc<dyn DocumentStore>,
    file_store: Arc<dyn FileStore>,
}

impl Catalog {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        file_store: Arc<dyn FileStore>,
        collections: &CollectionsConfig,
    ) -> Self {
        let products = Repository::new(store.clone(), "products", collections.products.clone());
        let portfolio = Repository::new(store.clone(), "portfolio", collections.portfolio.clone());
        let testimonials =
            Repository::new(store.clone(), "testimonials", collections.testimonials.clone());
        let hero_media = Repository::new(store.clone(), "hero_media", collections.hero_media.clone());
        let company_info =
            Repository::new(store.clone(), "company_info", collections.company_info.clone());
        let team_members =
            Repository::new(store.clone(), "team_members", collections.team_members.clone());
        let featured = Repository::new(store.clone(), "featured", collections.featured.clone());

        info!(
            unconfigured = ?unconfigured(collections),
            "Catalog initialized"
        );

        Self {
            products,
            portfolio,
            testimonials,
            hero_media,
            company_info,
            team_members,
            featured,
            store,
            file_store,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Stored file ids referenced by any entity in any collection
    pub async fn stored_files_in_use(&self) -> Result<HashSet<String>, StoreError> {
        let scans = futures::try_join!(
            self.products.stored_file_ids(),
            self.portfolio.stored_file_ids(),
            self.testimonials.stored_file_ids(),
            self.hero_media.stored_file_ids(),
            self.company_info.stored_file_ids(),
            self.team_members.stored_file_ids()
        )?;

        let (products, portfolio, testimonials, hero_media, company_info, team_members) = scans;
        Ok([portfolio, testimonials, hero_media, company_info, team_members]
            .into_iter()
            .fold(products, |mut in_use, ids| {
                in_use.extend(ids);
                in_use
            }))
    }

    /// Reclaim the stored files behind `removed` that no entity uses any
    /// more. Must run after the mutation that dropped them has been written.
    pub async fn release_media(&self, removed: Vec<MediaReference>) -> ReclaimReport {
        let file_ids = removed
            .iter()
            .filter_map(|r| r.stored_file_id().map(str::to_string))
            .collect();
        self.release_files(file_ids).await
    }

    /// Give up on the uploads of a failed request. Files that a partial
    /// write already references are kept, the rest are reclaimed.
    pub async fn abandon_uploads(&self, uploads: UploadSession) -> ReclaimReport {
        self.release_files(uploads.into_file_ids()).await
    }

    #[instrument(skip(self, file_ids), fields(candidates = file_ids.len()))]
    async fn release_files(&self, file_ids: Vec<String>) -> ReclaimReport {
        if file_ids.is_empty() {
            return ReclaimReport::default();
        }

        let Some(in_use) = self.scan_in_use().await else {
            return ReclaimReport::default();
        };
        let candidates: Vec<String> = file_ids
            .into_iter()
            .filter(|id| !in_use.contains(id))
            .collect();
        if candidates.is_empty() {
            return ReclaimReport::default();
        }

        // A concurrent write to another entity may reference a candidate by now
        let Some(in_use) = self.scan_in_use().await else {
            return ReclaimReport::default();
        };
        let orphaned: Vec<_> = candidates
            .into_iter()
            .filter(|id| !in_use.contains(id))
            .map(|stored_file_id| MediaReference::Uploaded {
                url: String::new(),
                stored_file_id,
            })
            .collect();

        debug!(orphaned = orphaned.len(), "Reclaiming orphaned media");
        reclaim_orphaned(self.file_store.as_ref(), &orphaned).await
    }

    async fn scan_in_use(&self) -> Option<HashSet<String>> {
        match self.stored_files_in_use().await {
            Ok(in_use) => Some(in_use),
            Err(e) => {
                // Without a full reference scan nothing is provably orphaned
                warn!(error = %e, "Skipping orphan cleanup, reference scan failed");
                None
            }
        }
    }

    /// Persist a new entity, keeping the uploads only if the write succeeds
    pub async fn save_new<T: Entity>(
        &self,
        repo: &Repository<T>,
        entity: &T,
        uploads: UploadSession,
    ) -> Result<(), StoreError> {
        match repo.create(entity).await {
            Ok(()) => {
                uploads.commit();
                info!(collection = repo.name(), id = %entity.key(), "Entity created");
                Ok(())
            }
            Err(e) => {
                error!(collection = repo.name(), error = %e, "Entity create failed");
                uploads.discard().await;
                Err(e)
            }
        }
    }

    /// Persist a new version of an entity, then reclaim the media the
    /// previous version referenced and the new one does not
    pub async fn save_update<T: Entity>(
        &self,
        repo: &Repository<T>,
        previous: &T,
        next: &T,
        uploads: UploadSession,
    ) -> Result<ReclaimReport, StoreError> {
        if let Err(e) = repo.update(next).await {
            error!(collection = repo.name(), id = %next.key(), error = %e, "Entity update failed");
            uploads.discard().await;
            return Err(e);
        }
        uploads.commit();
        info!(collection = repo.name(), id = %next.key(), "Entity updated");

        let removed = diff_references(&previous.media(), &next.media());
        Ok(self.release_media(removed).await)
    }

    /// Delete an entity, then reclaim all media it referenced
    pub async fn remove<T: Entity>(
        &self,
        repo: &Repository<T>,
        entity: &T,
    ) -> Result<ReclaimReport, StoreError> {
        repo.delete(&entity.key()).await?;
        info!(collection = repo.name(), id = %entity.key(), "Entity deleted");

        Ok(self.release_media(entity.media()).await)
    }
}

fn unconfigured(collections: &CollectionsConfig) -> Vec<&'static str> {
    [
        ("products", &collections.products),
        ("portfolio", &collections.portfolio),
        ("testimonials", &collections.testimonials),
        ("hero_media", &collections.hero_media),
        ("featured", &collections.featured),
        ("company_info", &collections.company_info),
        ("team_members", &collections.team_members),
    ]
    .into_iter()
    .filter(|(_, id)| id.is_none())
    .map(|(name, _)| name)
    .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::document_store::MemoryDocumentStore;
    use crate::file_store::{MemoryFileStore, StorageUrls};
    use chrono::Utc;
    use uuid::Uuid;

    pub fn all_collections() -> CollectionsConfig {
        CollectionsConfig {
            products: Some("products".to_string()),
            portfolio: Some("portfolio".to_string()),
            testimonials: Some("testimonials".to_string()),
            hero_media: Some("hero_media".to_string()),
            featured: Some("featured".to_string()),
            company_info: Some("company_info".to_string()),
            team_members: Some("team_members".to_string()),
        }
    }

    pub fn memory_catalog() -> (Catalog, Arc<MemoryFileStore>) {
        let files = Arc::new(MemoryFileStore::new(StorageUrls::new(
            "https://cdn.atelier.test",
            "media",
        )));
        let catalog = Catalog::new(
            Arc::new(MemoryDocumentStore::new()),
            files.clone(),
            &all_collections(),
        );
        (catalog, files)
    }

    pub fn product(name: &str, images: Vec<MediaReference>) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            category: None,
            price: None,
            materials: vec![],
            dimensions: None,
            images,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn uploaded(files: &MemoryFileStore, id: &str) -> MediaReference {
        let stored = files.create_file(id, vec![0u8; 8], "image/jpeg").await.unwrap();
        MediaReference::Uploaded {
            url: stored.url,
            stored_file_id: stored.file_id,
        }
    }
}

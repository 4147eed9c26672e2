//! Featured products: a bounded selection of catalog products shown on the
//! home page.
//!
//! The manager is the authority on capacity. All mutations in this process
//! are serialized and a failed batch leaves no partial additions behind.
//!
//! Writers in other processes can still commit concurrently. Readers only
//! ever see the first [`FEATURED_CAPACITY`] live entries in insertion order,
//! and after committing an addition re-reads the persisted set: if any of
//! its entries landed past capacity the whole batch is rolled back, so the
//! earliest writers keep their slots.

use crate::catalog::Repository;
use crate::document_store::StoreError;
use crate::models::{FeaturedEntry, Product};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Maximum number of featured products
pub const FEATURED_CAPACITY: usize = 4;

/// Errors raised by featured-set mutations
#[derive(Error, Debug)]
pub enum FeaturedError {
    #[error(
        "featured set is full: {current} featured, {requested} requested, capacity {capacity}"
    )]
    CapacityExceeded {
        current: usize,
        requested: usize,
        capacity: usize,
    },

    #[error("product {0} does not exist")]
    UnknownProduct(Uuid),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// Authoritative state of the featured set after a read or mutation
#[derive(Debug, Clone, Serialize)]
pub struct FeaturedSnapshot {
    pub products: Vec<Product>,
    pub capacity: usize,
    pub remaining: usize,
}

/// Manager for the featured set
pub struct FeaturedSet {
    products: Repository<Product>,
    entries: Repository<FeaturedEntry>,
    /// Serializes mutations within this process
    write_lock: Mutex<()>,
}

impl FeaturedSet {
    pub fn new(products: Repository<Product>, entries: Repository<FeaturedEntry>) -> Self {
        Self {
            products,
            entries,
            write_lock: Mutex::new(()),
        }
    }

    /// Featured products in insertion order
    pub async fn list_featured(&self) -> Result<Vec<Product>, FeaturedError> {
        Ok(self.snapshot().await?.products)
    }

    /// Number of products that can still be added
    pub async fn remaining_slots(&self) -> Result<usize, FeaturedError> {
        Ok(self.snapshot().await?.remaining)
    }

    pub async fn snapshot(&self) -> Result<FeaturedSnapshot, FeaturedError> {
        let entries = self.entries.list().await?;
        let catalog = self.catalog().await?;
        Ok(resolve(entries, catalog))
    }

    /// Feature every product in `product_ids`.
    ///
    /// Already-featured and repeated ids are no-ops and do not count
    /// against capacity. The batch is applied completely or not at all.
    #[instrument(skip(self), fields(requested = product_ids.len()))]
    pub async fn add_featured(
        &self,
        product_ids: &[Uuid],
    ) -> Result<FeaturedSnapshot, FeaturedError> {
        let _guard = self.write_lock.lock().await;

        let catalog = self.catalog().await?;
        let entries = self.prune_dangling(self.entries.list().await?, &catalog).await;
        let featured: HashSet<Uuid> = entries.iter().map(|e| e.product_id).collect();

        let mut additions = Vec::new();
        for id in product_ids {
            if !catalog.contains_key(id) {
                return Err(FeaturedError::UnknownProduct(*id));
            }
            if !featured.contains(id) && !additions.contains(id) {
                additions.push(*id);
            }
        }

        if additions.is_empty() {
            debug!("Nothing new to feature");
            return Ok(resolve(entries, catalog));
        }

        if featured.len() + additions.len() > FEATURED_CAPACITY {
            return Err(FeaturedError::CapacityExceeded {
                current: featured.len(),
                requested: additions.len(),
                capacity: FEATURED_CAPACITY,
            });
        }

        // One write at a time, in request order
        let mut created = Vec::with_capacity(additions.len());
        for id in &additions {
            let entry = FeaturedEntry {
                product_id: *id,
                created_at: Utc::now(),
            };

            match self.entries.create(&entry).await {
                Ok(()) => created.push(*id),
                // Featured concurrently by another writer
                Err(StoreError::AlreadyExists { .. }) => {}
                Err(e) => {
                    self.rollback(&created).await;
                    return Err(e.into());
                }
            }
        }

        let (entries, catalog) = match self.reread().await {
            Ok(state) => state,
            Err(e) => {
                self.rollback(&created).await;
                return Err(e.into());
            }
        };

        let live: Vec<Uuid> = entries
            .iter()
            .map(|e| e.product_id)
            .filter(|id| catalog.contains_key(id))
            .collect();
        let overflow = live
            .iter()
            .skip(FEATURED_CAPACITY)
            .any(|id| created.contains(id));
        if overflow {
            warn!(
                live = live.len(),
                "Concurrent writer filled the featured set first, rolling back"
            );
            self.rollback(&created).await;
            let current = live.iter().filter(|id| !created.contains(id)).count();
            return Err(FeaturedError::CapacityExceeded {
                current: current.min(FEATURED_CAPACITY),
                requested: additions.len(),
                capacity: FEATURED_CAPACITY,
            });
        }

        metrics::counter!("showroom.featured.added").increment(created.len() as u64);
        info!(
            added = created.len(),
            total = live.len().min(FEATURED_CAPACITY),
            "Featured products added"
        );

        Ok(resolve(entries, catalog))
    }

    /// Stop featuring a product. Removing a product that is not featured
    /// succeeds.
    #[instrument(skip(self))]
    pub async fn remove_featured(
        &self,
        product_id: Uuid,
    ) -> Result<FeaturedSnapshot, FeaturedError> {
        let guard = self.write_lock.lock().await;

        if self.entries.delete(&product_id.to_string()).await? {
            metrics::counter!("showroom.featured.removed").increment(1);
            info!(product_id = %product_id, "Featured product removed");
        } else {
            debug!(product_id = %product_id, "Product was not featured");
        }
        drop(guard);

        self.snapshot().await
    }

    async fn catalog(&self) -> Result<HashMap<Uuid, Product>, StoreError> {
        Ok(self
            .products
            .list()
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect())
    }

    /// Entries and catalog as persisted right now
    async fn reread(&self) -> Result<(Vec<FeaturedEntry>, HashMap<Uuid, Product>), StoreError> {
        let entries = self.entries.list().await?;
        let catalog = self.catalog().await?;
        Ok((entries, catalog))
    }

    /// Delete entries whose product no longer exists
    async fn prune_dangling(
        &self,
        entries: Vec<FeaturedEntry>,
        catalog: &HashMap<Uuid, Product>,
    ) -> Vec<FeaturedEntry> {
        let (live, dangling): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|e| catalog.contains_key(&e.product_id));

        for entry in dangling {
            warn!(product_id = %entry.product_id, "Pruning featured entry for missing product");
            if let Err(e) = self.entries.delete(&entry.product_id.to_string()).await {
                warn!(
                    product_id = %entry.product_id,
                    error = %e,
                    "Failed to prune featured entry"
                );
            }
        }

        live
    }

    async fn rollback(&self, created: &[Uuid]) {
        for id in created {
            if let Err(e) = self.entries.delete(&id.to_string()).await {
                warn!(product_id = %id, error = %e, "Failed to roll back featured entry");
            }
        }
    }
}

/// Resolve entries against the catalog, skipping dangling ones.
///
/// Entries past capacity belong to a writer that is about to roll back and
/// are never shown.
fn resolve(entries: Vec<FeaturedEntry>, mut catalog: HashMap<Uuid, Product>) -> FeaturedSnapshot {
    let products: Vec<Product> = entries
        .into_iter()
        .filter_map(|entry| {
            let product = catalog.remove(&entry.product_id);
            if product.is_none() {
                warn!(
                    product_id = %entry.product_id,
                    "Featured entry references a missing product"
                );
            }
            product
        })
        .take(FEATURED_CAPACITY)
        .collect();

    FeaturedSnapshot {
        remaining: FEATURED_CAPACITY.saturating_sub(products.len()),
        capacity: FEATURED_CAPACITY,
        products,
    }
}

//! Atelier Showroom Service
//!
//! Backend for the Atelier furniture showroom: the public catalog read by
//! the marketing site and the admin API used by the dashboard.
//!
//! ## Features
//!
//! - **Featured Products**: a home page selection capped at
//!   [`FEATURED_CAPACITY`], enforced server-side
//! - **Media Lifecycle**: images and videos are uploaded to an
//!   S3-compatible bucket or linked by load-tested URL, and stored files
//!   no entity references any more are reclaimed
//! - **Document Store**: every entity is a JSON document in PostgreSQL
//!
//! ## Architecture
//!
//! ```text
//!  Dashboard / Site          API                      Storage
//! ┌──────────────┐     ┌──────────────┐        ┌──────────────┐
//! │ multipart    │────▶│ Media        │───────▶│ File Store   │
//! │ forms, JSON  │     │ Resolver     │        │ (S3 bucket)  │
//! └──────────────┘     └──────────────┘        └──────────────┘
//!                             │                        ▲
//!                             ▼                        │ reclaim
//!                      ┌──────────────┐        ┌──────────────┐
//!                      │ Catalog /    │───────▶│ Document     │
//!                      │ Featured Set │        │ Store (PG)   │
//!                      └──────────────┘        └──────────────┘
//! ```

pub mod api;
pub mod catalog;
pub mod config;
pub mod document_store;
pub mod featured;
pub mod file_store;
pub mod locks;
pub mod media;
pub mod models;
pub mod team;

pub use api::{create_router, start_api_server, AppState};
pub use catalog::{Catalog, Repository};
pub use config::Config;
pub use document_store::{DocumentStore, PgDocumentStore, StoreError};
pub use featured::{FeaturedError, FeaturedSet, FeaturedSnapshot, FEATURED_CAPACITY};
pub use file_store::{FileStore, S3FileStore};
pub use media::{MediaError, MediaReference, MediaResolver};

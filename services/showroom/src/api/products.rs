use super::error::ApiError;
use super::form::{resolve_list_slot, FormData};
use super::extract::PathParam;
use super::AppState;
use crate::media::MediaAccept;
use crate::models::Product;
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::{instrument, warn};
use uuid::Uuid;

const LOCK_SCOPE: &str = "products";

/// Non-media fields of a product form
struct ProductFields {
    name: String,
    description: String,
    category: Option<String>,
    price: Option<f64>,
    materials: Vec<String>,
    dimensions: Option<String>,
}

impl ProductFields {
    fn parse(form: &FormData) -> Result<Self, ApiError> {
        let price: Option<f64> = form.parse("price")?;
        if price.is_some_and(|p| !p.is_finite() || p < 0.0) {
            return Err(ApiError::validation("price must be a non-negative number"));
        }

        Ok(Self {
            name: form.required_text("name")?,
            description: form.optional_text("description").unwrap_or_default(),
            category: form.optional_text("category"),
            price,
            materials: form.list("materials")?,
            dimensions: form.optional_text("dimensions"),
        })
    }
}

pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.catalog.products.list().await?))
}

pub async fn get_product(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Product>, ApiError> {
    state
        .catalog
        .products
        .get(&id.to_string())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("product {id}")))
}

#[instrument(skip_all)]
pub async fn create_product(
    State(state): State<AppState>,
    mut form: FormData,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let fields = ProductFields::parse(&form)?;

    let mut uploads = state.media.session();
    let images = resolve_list_slot(
        &mut form,
        &state.media,
        "images",
        MediaAccept::Image,
        &[],
        &mut uploads,
    )
    .await?;

    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4(),
        name: fields.name,
        description: fields.description,
        category: fields.category,
        price: fields.price,
        materials: fields.materials,
        dimensions: fields.dimensions,
        images,
        created_at: now,
        updated_at: now,
    };

    let repo = &state.catalog.products;
    state.catalog.save_new(repo, &product, uploads).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[instrument(skip(state, form))]
pub async fn update_product(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    mut form: FormData,
) -> Result<Json<Product>, ApiError> {
    let fields = ProductFields::parse(&form)?;

    let _guard = state.locks.acquire(LOCK_SCOPE, &id.to_string()).await;
    let repo = &state.catalog.products;
    let previous = repo
        .get(&id.to_string())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("product {id}")))?;

    let mut uploads = state.media.session();
    let images = resolve_list_slot(
        &mut form,
        &state.media,
        "images",
        MediaAccept::Image,
        &previous.images,
        &mut uploads,
    )
    .await?;

    let next = Product {
        id,
        name: fields.name,
        description: fields.description,
        category: fields.category,
        price: fields.price,
        materials: fields.materials,
        dimensions: fields.dimensions,
        images,
        created_at: previous.created_at,
        updated_at: Utc::now(),
    };

    state
        .catalog
        .save_update(repo, &previous, &next, uploads)
        .await?;
    Ok(Json(next))
}

#[instrument(skip(state))]
pub async fn delete_product(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<StatusCode, ApiError> {
    let _guard = state.locks.acquire(LOCK_SCOPE, &id.to_string()).await;
    let repo = &state.catalog.products;
    let previous = repo
        .get(&id.to_string())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("product {id}")))?;

    state.catalog.remove(repo, &previous).await?;

    // A leftover entry is pruned on the next featured mutation
    if let Err(e) = state.featured.remove_featured(id).await {
        warn!(product_id = %id, error = %e, "Failed to unfeature deleted product");
    }

    Ok(StatusCode::NO_CONTENT)
}

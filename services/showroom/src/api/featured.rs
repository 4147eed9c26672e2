use super::{error::ApiError, extract::JsonBody, AppState};
use crate::featured::FeaturedSnapshot;
use crate::models::Product;
use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

/// Body of a featured-set mutation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedRequest {
    pub product_id: Option<Uuid>,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}

impl FeaturedRequest {
    fn ids(&self) -> Vec<Uuid> {
        self.product_id
            .iter()
            .chain(self.product_ids.iter())
            .copied()
            .collect()
    }
}

/// Featured products for the home page
pub async fn list_featured(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.featured.list_featured().await?))
}

/// Featured products with the remaining capacity, for the dashboard
pub async fn featured_snapshot(
    State(state): State<AppState>,
) -> Result<Json<FeaturedSnapshot>, ApiError> {
    Ok(Json(state.featured.snapshot().await?))
}

#[instrument(skip(state))]
pub async fn add_featured(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<FeaturedRequest>,
) -> Result<Json<FeaturedSnapshot>, ApiError> {
    let ids = request.ids();
    if ids.is_empty() {
        return Err(ApiError::validation("productId or productIds is required"));
    }

    Ok(Json(state.featured.add_featured(&ids).await?))
}

#[instrument(skip(state))]
pub async fn remove_featured(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<FeaturedRequest>,
) -> Result<Json<FeaturedSnapshot>, ApiError> {
    if !request.product_ids.is_empty() {
        return Err(ApiError::validation(
            "productIds is not accepted here, send a single productId",
        ));
    }
    let product_id = request
        .product_id
        .ok_or_else(|| ApiError::validation("productId is required"))?;

    Ok(Json(state.featured.remove_featured(product_id).await?))
}

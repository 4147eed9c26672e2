use super::error::ApiError;
use super::form::{resolve_single_slot, FormData};
use super::extract::PathParam;
use super::AppState;
use crate::media::{MediaAccept, MediaError, ResolvedMedia};
use crate::models::HeroMediaItem;
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

const LOCK_SCOPE: &str = "hero_media";

fn require_media(resolved: Option<ResolvedMedia>) -> Result<ResolvedMedia, ApiError> {
    resolved.ok_or_else(|| {
        MediaError::MissingMediaInput {
            slot: "media".to_string(),
        }
        .into()
    })
}

/// Hero slides sorted by display order
pub async fn list_hero_media(
    State(state): State<AppState>,
) -> Result<Json<Vec<HeroMediaItem>>, ApiError> {
    let mut items = state.catalog.hero_media.list().await?;
    items.sort_by_key(|item| item.order);
    Ok(Json(items))
}

#[instrument(skip_all)]
pub async fn create_hero_media(
    State(state): State<AppState>,
    mut form: FormData,
) -> Result<(StatusCode, Json<HeroMediaItem>), ApiError> {
    let order: Option<i32> = form.parse("order")?;

    let mut uploads = state.media.session();
    let media = require_media(
        resolve_single_slot(
            &mut form,
            &state.media,
            "media",
            MediaAccept::ImageOrVideo,
            &[],
            &mut uploads,
        )
        .await?,
    )?;

    let now = Utc::now();
    let item = HeroMediaItem {
        id: Uuid::new_v4(),
        title: form.optional_text("title"),
        subtitle: form.optional_text("subtitle"),
        order: order.unwrap_or_default(),
        media: media.reference,
        media_type: media.kind,
        created_at: now,
        updated_at: now,
    };

    let repo = &state.catalog.hero_media;
    state.catalog.save_new(repo, &item, uploads).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[instrument(skip(state, form))]
pub async fn update_hero_media(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    mut form: FormData,
) -> Result<Json<HeroMediaItem>, ApiError> {
    let order: Option<i32> = form.parse("order")?;

    let _guard = state.locks.acquire(LOCK_SCOPE, &id.to_string()).await;
    let repo = &state.catalog.hero_media;
    let previous = repo
        .get(&id.to_string())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("hero media {id}")))?;

    let mut uploads = state.media.session();
    let media = require_media(
        resolve_single_slot(
            &mut form,
            &state.media,
            "media",
            MediaAccept::ImageOrVideo,
            std::slice::from_ref(&previous.media),
            &mut uploads,
        )
        .await?,
    )?;

    // The kind of a kept slide is what was recorded when it was added
    let media_type = if media.reference == previous.media {
        previous.media_type
    } else {
        media.kind
    };

    let next = HeroMediaItem {
        id,
        title: form.optional_text("title"),
        subtitle: form.optional_text("subtitle"),
        order: order.unwrap_or(previous.order),
        media: media.reference,
        media_type,
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
pub async fn delete_hero_media(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<StatusCode, ApiError> {
    let _guard = state.locks.acquire(LOCK_SCOPE, &id.to_string()).await;
    let repo = &state.catalog.hero_media;
    let previous = repo
        .get(&id.to_string())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("hero media {id}")))?;

    state.catalog.remove(repo, &previous).await?;
    Ok(StatusCode::NO_CONTENT)
}

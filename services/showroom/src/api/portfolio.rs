use super::error::ApiError;
use super::form::{resolve_list_slot, resolve_single_slot, FormData};
use super::extract::PathParam;
use super::AppState;
use crate::media::{MediaAccept, MediaError, MediaReference, UploadSession};
use crate::models::{Entity, PortfolioProject};
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

const LOCK_SCOPE: &str = "portfolio";

struct ProjectFields {
    title: String,
    description: String,
    location: Option<String>,
    year: Option<i32>,
}

impl ProjectFields {
    fn parse(form: &FormData) -> Result<Self, ApiError> {
        Ok(Self {
            title: form.required_text("title")?,
            description: form.optional_text("description").unwrap_or_default(),
            location: form.optional_text("location"),
            year: form.parse("year")?,
        })
    }
}

/// Thumbnail and gallery of a project form
async fn resolve_media(
    state: &AppState,
    form: &mut FormData,
    previous: &[MediaReference],
    uploads: &mut UploadSession,
) -> Result<(MediaReference, Vec<MediaReference>), ApiError> {
    let thumbnail = resolve_single_slot(
        form,
        &state.media,
        "thumbnail",
        MediaAccept::Image,
        previous,
        uploads,
    )
    .await?
    .ok_or_else(|| MediaError::MissingMediaInput {
        slot: "thumbnail".to_string(),
    })?;

    let gallery = resolve_list_slot(
        form,
        &state.media,
        "gallery",
        MediaAccept::Image,
        previous,
        uploads,
    )
    .await?;

    Ok((thumbnail.reference, gallery))
}

pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<PortfolioProject>>, ApiError> {
    Ok(Json(state.catalog.portfolio.list().await?))
}

pub async fn get_project(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<PortfolioProject>, ApiError> {
    state
        .catalog
        .portfolio
        .get(&id.to_string())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("portfolio project {id}")))
}

#[instrument(skip_all)]
pub async fn create_project(
    State(state): State<AppState>,
    mut form: FormData,
) -> Result<(StatusCode, Json<PortfolioProject>), ApiError> {
    let fields = ProjectFields::parse(&form)?;

    let mut uploads = state.media.session();
    let (thumbnail, gallery) = resolve_media(&state, &mut form, &[], &mut uploads).await?;

    let now = Utc::now();
    let project = PortfolioProject {
        id: Uuid::new_v4(),
        title: fields.title,
        description: fields.description,
        location: fields.location,
        year: fields.year,
        thumbnail,
        gallery,
        created_at: now,
        updated_at: now,
    };

    let repo = &state.catalog.portfolio;
    state.catalog.save_new(repo, &project, uploads).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[instrument(skip(state, form))]
pub async fn update_project(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    mut form: FormData,
) -> Result<Json<PortfolioProject>, ApiError> {
    let fields = ProjectFields::parse(&form)?;

    let _guard = state.locks.acquire(LOCK_SCOPE, &id.to_string()).await;
    let repo = &state.catalog.portfolio;
    let previous = repo
        .get(&id.to_string())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("portfolio project {id}")))?;

    let mut uploads = state.media.session();
    let (thumbnail, gallery) =
        resolve_media(&state, &mut form, &previous.media(), &mut uploads).await?;

    let next = PortfolioProject {
        id,
        title: fields.title,
        description: fields.description,
        location: fields.location,
        year: fields.year,
        thumbnail,
        gallery,
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
pub async fn delete_project(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<StatusCode, ApiError> {
    let _guard = state.locks.acquire(LOCK_SCOPE, &id.to_string()).await;
    let repo = &state.catalog.portfolio;
    let previous = repo
        .get(&id.to_string())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("portfolio project {id}")))?;

    state.catalog.remove(repo, &previous).await?;
    Ok(StatusCode::NO_CONTENT)
}

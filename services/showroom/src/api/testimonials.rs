use super::error::ApiError;
use super::form::{resolve_single_slot, FormData};
use super::extract::PathParam;
use super::AppState;
use crate::media::MediaAccept;
use crate::models::{Entity, Testimonial};
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

const LOCK_SCOPE: &str = "testimonials";

struct TestimonialFields {
    name: String,
    quote: String,
    role: Option<String>,
    company: Option<String>,
    rating: Option<u8>,
}

impl TestimonialFields {
    fn parse(form: &FormData) -> Result<Self, ApiError> {
        let rating: Option<u8> = form.parse("rating")?;
        if rating.is_some_and(|r| !(1..=5).contains(&r)) {
            return Err(ApiError::validation("rating must be between 1 and 5"));
        }

        Ok(Self {
            name: form.required_text("name")?,
            quote: form.required_text("quote")?,
            role: form.optional_text("role"),
            company: form.optional_text("company"),
            rating,
        })
    }
}

pub async fn list_testimonials(
    State(state): State<AppState>,
) -> Result<Json<Vec<Testimonial>>, ApiError> {
    Ok(Json(state.catalog.testimonials.list().await?))
}

#[instrument(skip_all)]
pub async fn create_testimonial(
    State(state): State<AppState>,
    mut form: FormData,
) -> Result<(StatusCode, Json<Testimonial>), ApiError> {
    let fields = TestimonialFields::parse(&form)?;

    let mut uploads = state.media.session();
    let avatar = resolve_single_slot(
        &mut form,
        &state.media,
        "avatar",
        MediaAccept::Image,
        &[],
        &mut uploads,
    )
    .await?;

    let now = Utc::now();
    let testimonial = Testimonial {
        id: Uuid::new_v4(),
        name: fields.name,
        quote: fields.quote,
        role: fields.role,
        company: fields.company,
        rating: fields.rating,
        avatar: avatar.map(|a| a.reference),
        created_at: now,
        updated_at: now,
    };

    let repo = &state.catalog.testimonials;
    state.catalog.save_new(repo, &testimonial, uploads).await?;
    Ok((StatusCode::CREATED, Json(testimonial)))
}

#[instrument(skip(state, form))]
pub async fn update_testimonial(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    mut form: FormData,
) -> Result<Json<Testimonial>, ApiError> {
    let fields = TestimonialFields::parse(&form)?;

    let _guard = state.locks.acquire(LOCK_SCOPE, &id.to_string()).await;
    let repo = &state.catalog.testimonials;
    let previous = repo
        .get(&id.to_string())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("testimonial {id}")))?;

    let mut uploads = state.media.session();
    let avatar = resolve_single_slot(
        &mut form,
        &state.media,
        "avatar",
        MediaAccept::Image,
        &previous.media(),
        &mut uploads,
    )
    .await?;

    let next = Testimonial {
        id,
        name: fields.name,
        quote: fields.quote,
        role: fields.role,
        company: fields.company,
        rating: fields.rating,
        avatar: avatar.map(|a| a.reference),
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
pub async fn delete_testimonial(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<StatusCode, ApiError> {
    let _guard = state.locks.acquire(LOCK_SCOPE, &id.to_string()).await;
    let repo = &state.catalog.testimonials;
    let previous = repo
        .get(&id.to_string())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("testimonial {id}")))?;

    state.catalog.remove(repo, &previous).await?;
    Ok(StatusCode::NO_CONTENT)
}

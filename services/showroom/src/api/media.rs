use super::{error::ApiError, extract::JsonBody, AppState};
use crate::media::{MediaAccept, MediaKind};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Media kinds a probe may ask for
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[default]
    Image,
    Video,
    Any,
}

impl From<ProbeKind> for MediaAccept {
    fn from(kind: ProbeKind) -> Self {
        match kind {
            ProbeKind::Image => MediaAccept::Image,
            ProbeKind::Video => MediaAccept::Video,
            ProbeKind::Any => MediaAccept::ImageOrVideo,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProbeRequest {
    pub url: String,
    #[serde(default)]
    pub kind: ProbeKind,
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub url: String,
    pub kind: MediaKind,
}

/// Load-test a URL without saving anything
#[instrument(skip(state))]
pub async fn probe_media_url(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ProbeRequest>,
) -> Result<Json<ProbeResponse>, ApiError> {
    let (url, kind) = state
        .media
        .check_external_url(&request.url, request.kind.into())
        .await?;

    Ok(Json(ProbeResponse { url, kind }))
}

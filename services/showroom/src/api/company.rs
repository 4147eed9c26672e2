use super::error::ApiError;
use super::form::{resolve_single_slot, FormData};
use super::AppState;
use crate::document_store::StoreError;
use crate::media::{diff_references, KeptReference, MediaAccept, MediaInput, MediaReference};
use crate::models::{CompanyInfo, Entity, TeamMember, COMPANY_INFO_ID};
use crate::team::reconcile_team;
use axum::{
    extract::State,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info, instrument};
use uuid::Uuid;

const LOCK_SCOPE: &str = "company_info";

/// Company details together with the team, as shown on the about page
#[derive(Debug, Serialize)]
pub struct CompanyResponse {
    pub info: Option<CompanyInfo>,
    pub team: Vec<TeamMember>,
}

/// Editable company fields, submitted as the `info` JSON field
#[derive(Debug, Deserialize)]
struct CompanyInfoInput {
    name: String,
    #[serde(default)]
    tagline: Option<String>,
    #[serde(default)]
    about: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    socials: BTreeMap<String, String>,
}

/// One entry of the `team` JSON array
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamMemberInput {
    #[serde(default)]
    id: Option<Uuid>,
    name: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    order: Option<i32>,
    #[serde(default)]
    photo: Option<KeptReference>,
    #[serde(default)]
    photo_url: Option<String>,
}

fn sorted_team(mut team: Vec<TeamMember>) -> Vec<TeamMember> {
    team.sort_by_key(|m| m.order);
    team
}

pub async fn get_company_info(
    State(state): State<AppState>,
) -> Result<Json<CompanyResponse>, ApiError> {
    let info = state.catalog.company_info.get(COMPANY_INFO_ID).await?;
    let team = state.catalog.team_members.list().await?;

    Ok(Json(CompanyResponse {
        info,
        team: sorted_team(team),
    }))
}

/// Replace the company details and, when `team` is submitted, the team.
///
/// Team members are reconciled one by one against the stored team, and
/// photos or logos the update drops are reclaimed once everything is
/// written.
#[instrument(skip_all)]
pub async fn update_company_info(
    State(state): State<AppState>,
    mut form: FormData,
) -> Result<Json<CompanyResponse>, ApiError> {
    let input: CompanyInfoInput = form
        .json("info")?
        .ok_or_else(|| ApiError::validation("info is required"))?;
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("info.name is required"));
    }
    let team_input: Option<Vec<TeamMemberInput>> = form.json("team")?;
    if let Some(members) = &team_input {
        if members.iter().any(|m| m.name.trim().is_empty()) {
            return Err(ApiError::validation("every team member needs a name"));
        }
        let mut ids = std::collections::HashSet::new();
        if members.iter().filter_map(|m| m.id).any(|id| !ids.insert(id)) {
            return Err(ApiError::validation("team member ids must be unique"));
        }
    }

    let _guard = state.locks.acquire(LOCK_SCOPE, COMPANY_INFO_ID).await;
    let catalog = &state.catalog;
    let previous_info = catalog.company_info.get(COMPANY_INFO_ID).await?;
    let previous_team = catalog.team_members.list().await?;

    let mut uploads = state.media.session();
    let previous_logo: Vec<_> = previous_info.iter().flat_map(|e| e.media()).collect();
    let logo = resolve_single_slot(
        &mut form,
        &state.media,
        "logo",
        MediaAccept::Image,
        &previous_logo,
        &mut uploads,
    )
    .await?;

    let now = Utc::now();
    let next_info = CompanyInfo {
        name: input.name.trim().to_string(),
        tagline: input.tagline,
        about: input.about,
        email: input.email,
        phone: input.phone,
        address: input.address,
        socials: input.socials,
        logo: logo.map(|l| l.reference),
        updated_at: now,
    };

    let next_team = match team_input {
        Some(members) => {
            let existing: HashMap<Uuid, &TeamMember> =
                previous_team.iter().map(|m| (m.id, m)).collect();
            let mut team = Vec::with_capacity(members.len());

            for (index, member) in members.into_iter().enumerate() {
                let slot = format!("teamPhoto.{index}");
                let current = member.id.and_then(|id| existing.get(&id).copied());
                let previous_photo: Vec<MediaReference> =
                    current.iter().flat_map(|m| m.media()).collect();

                let new_input = MediaInput {
                    file: form.take_file(&slot),
                    url: member.photo_url,
                };
                let photo = if !new_input.is_empty() {
                    state
                        .media
                        .resolve_optional(&slot, new_input, MediaAccept::Image, &mut uploads)
                        .await?
                } else if let Some(kept) = &member.photo {
                    Some(
                        state
                            .media
                            .resolve_kept(&slot, kept, &previous_photo, MediaAccept::Image)
                            .await?,
                    )
                } else {
                    None
                };

                let mut next = TeamMember {
                    id: member.id.unwrap_or_else(Uuid::new_v4),
                    name: member.name.trim().to_string(),
                    role: member.role,
                    bio: member.bio,
                    order: member.order.unwrap_or(index as i32),
                    photo: photo.map(|p| p.reference),
                    created_at: current.map_or(now, |m| m.created_at),
                    updated_at: now,
                };
                if let Some(current) = current.filter(|c| c.same_content(&next)) {
                    next.updated_at = current.updated_at;
                }
                team.push(next);
            }
            Some(team)
        }
        None => None,
    };

    let written: Result<(), StoreError> = async {
        match &previous_info {
            Some(_) => catalog.company_info.update(&next_info).await?,
            None => catalog.company_info.create(&next_info).await?,
        }
        if let Some(team) = &next_team {
            reconcile_team(&catalog.team_members, &previous_team, team).await?;
        }
        Ok(())
    }
    .await;

    if let Err(e) = written {
        error!(error = %e, "Company info update failed");
        // Part of the update may be written already
        catalog.abandon_uploads(uploads).await;
        return Err(e.into());
    }
    uploads.commit();

    let team = next_team.unwrap_or_else(|| previous_team.clone());
    let previous_media: Vec<_> = previous_info
        .iter()
        .flat_map(|e| e.media())
        .chain(previous_team.iter().flat_map(|e| e.media()))
        .collect();
    let next_media: Vec<_> = next_info
        .media()
        .into_iter()
        .chain(team.iter().flat_map(|e| e.media()))
        .collect();
    let report = catalog
        .release_media(diff_references(&previous_media, &next_media))
        .await;

    info!(
        team = team.len(),
        reclaimed = report.deleted.len(),
        "Company info updated"
    );

    Ok(Json(CompanyResponse {
        info: Some(next_info),
        team: sorted_team(team),
    }))
}

//! Multipart form handling for the admin mutations.
//!
//! A media slot named `images` may carry the kept references as `images`
//! (JSON), new URLs as `imagesUrls` (JSON array) and new files as repeated
//! `imagesFiles` parts. A single slot named `thumbnail` takes a new file as
//! `thumbnailFile`, a new URL as `thumbnailUrl` or the kept reference as
//! `thumbnail`.

use super::error::ApiError;
use crate::media::{
    KeptReference, MediaAccept, MediaInput, MediaReference, MediaResolver, ResolvedMedia,
    UploadSession, UploadedFile,
};
use axum::async_trait;
use axum::extract::{FromRequest, Multipart, Request};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::str::FromStr;

/// Text fields and files of one multipart request
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, Vec<UploadedFile>>,
}

#[async_trait]
impl<S> FromRequest<S> for FormData
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state).await?;
        Self::from_multipart(multipart).await
    }
}

impl FormData {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = FormData::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);

            if file_name.is_some() {
                let data = field.bytes().await?.to_vec();
                // An empty file input is submitted as a nameless empty part
                if data.is_empty() && file_name.as_deref() == Some("") {
                    continue;
                }
                form.files.entry(name).or_default().push(UploadedFile {
                    file_name,
                    content_type: content_type
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                    data,
                });
            } else {
                form.fields.insert(name, field.text().await?);
            }
        }

        Ok(form)
    }

    /// Trimmed value of a text field, `None` when absent or blank
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn optional_text(&self, name: &str) -> Option<String> {
        self.text(name).map(str::to_string)
    }

    pub fn required_text(&self, name: &str) -> Result<String, ApiError> {
        self.optional_text(name)
            .ok_or_else(|| ApiError::validation(format!("{name} is required")))
    }

    /// Parse a text field with `FromStr`
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ApiError> {
        self.text(name)
            .map(|v| {
                v.parse()
                    .map_err(|_| ApiError::validation(format!("{name} is not valid: {v:?}")))
            })
            .transpose()
    }

    /// Decode a JSON-encoded text field
    pub fn json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ApiError> {
        self.text(name)
            .map(|v| {
                serde_json::from_str(v)
                    .map_err(|e| ApiError::validation(format!("{name} is not valid JSON: {e}")))
            })
            .transpose()
    }

    /// A string list given as a JSON array or as comma separated values
    pub fn list(&self, name: &str) -> Result<Vec<String>, ApiError> {
        match self.text(name) {
            None => Ok(Vec::new()),
            Some(v) if v.starts_with('[') => Ok(self.json(name)?.unwrap_or_default()),
            Some(v) => Ok(v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()),
        }
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        let files = self.files.get_mut(name)?;
        if files.is_empty() {
            None
        } else {
            Some(files.remove(0))
        }
    }

    pub fn take_files(&mut self, name: &str) -> Vec<UploadedFile> {
        self.files.remove(name).unwrap_or_default()
    }

    /// New input for a single slot
    pub fn media_input(&mut self, slot: &str) -> MediaInput {
        MediaInput {
            file: self.take_file(&format!("{slot}File")),
            url: self.optional_text(&format!("{slot}Url")),
        }
    }

    /// Kept reference of a single slot. Accepts the tagged JSON form or a
    /// plain URL.
    pub fn kept_reference(&self, slot: &str) -> Option<KeptReference> {
        let raw = self.text(slot)?;
        Some(
            serde_json::from_str(raw).unwrap_or_else(|_| KeptReference::Bare(raw.to_string())),
        )
    }

    /// Kept references of a list slot
    pub fn kept_references(&self, slot: &str) -> Result<Vec<KeptReference>, ApiError> {
        Ok(self.json(slot)?.unwrap_or_default())
    }
}

/// Resolve a single media slot: a new file, or a new URL, or the kept
/// reference, in that priority. `previous` holds the references the entity
/// had before this request.
pub async fn resolve_single_slot(
    form: &mut FormData,
    media: &MediaResolver,
    slot: &str,
    accept: MediaAccept,
    previous: &[MediaReference],
    session: &mut UploadSession,
) -> Result<Option<ResolvedMedia>, ApiError> {
    let input = form.media_input(slot);
    if !input.is_empty() {
        return Ok(media.resolve_optional(slot, input, accept, session).await?);
    }

    match form.kept_reference(slot) {
        Some(kept) => Ok(Some(media.resolve_kept(slot, &kept, previous, accept).await?)),
        None => Ok(None),
    }
}

/// Resolve a list media slot into kept references, then new URLs, then new
/// files. Every new file is validated before the first one is uploaded.
pub async fn resolve_list_slot(
    form: &mut FormData,
    media: &MediaResolver,
    slot: &str,
    accept: MediaAccept,
    previous: &[MediaReference],
    session: &mut UploadSession,
) -> Result<Vec<MediaReference>, ApiError> {
    let mut references = Vec::new();

    for kept in form.kept_references(slot)? {
        let resolved = media.resolve_kept(slot, &kept, previous, accept).await?;
        references.push(resolved.reference);
    }

    let urls: Vec<String> = form.json(&format!("{slot}Urls"))?.unwrap_or_default();
    for url in urls.iter().filter(|u| !u.trim().is_empty()) {
        let (url, _) = media.check_external_url(url, accept).await?;
        references.push(MediaReference::External { url });
    }

    let files = form.take_files(&format!("{slot}Files"));
    for file in &files {
        media.validate_file(slot, file, accept)?;
    }
    for file in files {
        let input = MediaInput {
            file: Some(file),
            url: None,
        };
        let resolved = media.resolve_media_input(slot, input, accept, session).await?;
        references.push(resolved.reference);
    }

    Ok(references)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> FormData {
        FormData {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files: HashMap::new(),
        }
    }

    #[test]
    fn test_text_fields() {
        let form = form(&[("name", "  Oak chair "), ("blank", "   "), ("price", "abc")]);

        assert_eq!(form.text("name"), Some("Oak chair"));
        assert_eq!(form.text("blank"), None);
        assert!(form.required_text("blank").is_err());
        assert!(form.parse::<f64>("price").is_err());
        assert_eq!(form.parse::<f64>("missing").unwrap(), None);
    }

    #[test]
    fn test_list_accepts_json_and_commas() {
        let form = form(&[("a", r#"["oak","linen"]"#), ("b", "oak, linen ,")]);
        assert_eq!(form.list("a").unwrap(), vec!["oak", "linen"]);
        assert_eq!(form.list("b").unwrap(), vec!["oak", "linen"]);
    }

    #[test]
    fn test_kept_reference_forms() {
        let form = form(&[
            ("plain", "https://example.com/a.jpg"),
            ("tagged", r#"{"kind":"external","url":"https://example.com/b.jpg"}"#),
        ]);

        assert_eq!(
            form.kept_reference("plain").unwrap().url(),
            "https://example.com/a.jpg"
        );
        assert!(matches!(
            form.kept_reference("tagged").unwrap(),
            KeptReference::Tagged(MediaReference::External { .. })
        ));
        assert!(form.kept_reference("absent").is_none());
    }
}

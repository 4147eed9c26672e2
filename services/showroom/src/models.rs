use crate::media::{MediaKind, MediaReference};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Id of the single company info document
pub const COMPANY_INFO_ID: &str = "company";

/// A stored entity
pub trait Entity: Serialize + for<'de> Deserialize<'de> + Send + Sync {
    /// Document id within the entity's collection
    fn key(&self) -> String;

    /// Every media reference this entity owns
    fn media(&self) -> Vec<MediaReference>;
}

/// Catalog product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub dimensions: Option<String>,
    #[serde(default)]
    pub images: Vec<MediaReference>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Completed interior project shown in the portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioProject {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    pub thumbnail: MediaReference,
    #[serde(default)]
    pub gallery: Vec<MediaReference>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer testimonial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Testimonial {
    pub id: Uuid,
    pub name: String,
    pub quote: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub avatar: Option<MediaReference>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Slide of the home page hero carousel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroMediaItem {
    pub id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub order: i32,
    pub media: MediaReference,
    pub media_type: MediaKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Company details shown across the site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInfo {
    pub name: String,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub socials: BTreeMap<String, String>,
    #[serde(default)]
    pub logo: Option<MediaReference>,
    pub updated_at: DateTime<Utc>,
}

/// Member of the team section on the about page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub photo: Option<MediaReference>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TeamMember {
    /// Whether two versions differ in anything but timestamps
    pub fn same_content(&self, other: &TeamMember) -> bool {
        self.name == other.name
            && self.role == other.role
            && self.bio == other.bio
            && self.order == other.order
            && self.photo == other.photo
    }
}

/// Marks a product as featured on the home page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedEntry {
    pub product_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Entity for Product {
    fn key(&self) -> String {
        self.id.to_string()
    }

    fn media(&self) -> Vec<MediaReference> {
        self.images.clone()
    }
}

impl Entity for PortfolioProject {
    fn key(&self) -> String {
        self.id.to_string()
    }

    fn media(&self) -> Vec<MediaReference> {
        std::iter::once(self.thumbnail.clone())
            .chain(self.gallery.iter().cloned())
            .collect()
    }
}

impl Entity for Testimonial {
    fn key(&self) -> String {
        self.id.to_string()
    }

    fn media(&self) -> Vec<MediaReference> {
        self.avatar.iter().cloned().collect()
    }
}

impl Entity for HeroMediaItem {
    fn key(&self) -> String {
        self.id.to_string()
    }

    fn media(&self) -> Vec<MediaReference> {
        vec![self.media.clone()]
    }
}

impl Entity for CompanyInfo {
    fn key(&self) -> String {
        COMPANY_INFO_ID.to_string()
    }

    fn media(&self) -> Vec<MediaReference> {
        self.logo.iter().cloned().collect()
    }
}

impl Entity for TeamMember {
    fn key(&self) -> String {
        self.id.to_string()
    }

    fn media(&self) -> Vec<MediaReference> {
        self.photo.iter().cloned().collect()
    }
}

impl Entity for FeaturedEntry {
    fn key(&self) -> String {
        self.product_id.to_string()
    }

    fn media(&self) -> Vec<MediaReference> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portfolio_media_includes_thumbnail_and_gallery() {
        let now = Utc::now();
        let project = PortfolioProject {
            id: Uuid::new_v4(),
            title: "Loft".to_string(),
            description: String::new(),
            location: None,
            year: Some(2023),
            thumbnail: MediaReference::External {
                url: "https://x.test/t.jpg".to_string(),
            },
            gallery: vec![MediaReference::Uploaded {
                url: "https://cdn.test/m/g.jpg".to_string(),
                stored_file_id: "g.jpg".to_string(),
            }],
            created_at: now,
            updated_at: now,
        };

        let media = project.media();
        assert_eq!(media.len(), 2);
        assert_eq!(media[0].url(), "https://x.test/t.jpg");
    }

    #[test]
    fn test_product_wire_format_is_camel_case() {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: "Oak chair".to_string(),
            description: String::new(),
            category: Some("chairs".to_string()),
            price: Some(240.0),
            materials: vec!["oak".to_string()],
            dimensions: None,
            images: vec![],
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&product).unwrap();
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["name"], "Oak chair");

        let back: Product = serde_json::from_value(json).unwrap();
        assert_eq!(back, product);
    }
}

//! External collaborators consumed by the library.
//!
//! The catalog and personal library expose raw records; conversion into
//! [`Element`]s (and the derivation of their registration state) happens
//! here so every source is interpreted the same way.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use element_core::{AssetRef, AssetType, Element, ElementKind, Result};
use serde::{Deserialize, Serialize};

/// Raw project asset record (character, product or location).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Id issued by the provider once registration finished
    pub remote_element_id: Option<String>,
    /// Token of a registration job that has not finished yet
    pub registration_job: Option<String>,
}

impl AssetRecord {
    pub fn into_element(self, asset_type: AssetType) -> Element {
        let asset = AssetRef::new(asset_type, self.id);
        let mut element = Element::catalog(&asset, self.name).with_remote_state(
            self.remote_element_id.as_deref(),
            self.registration_job.as_deref(),
        );
        element.description = self.description;
        element.image_url = self.image_url;
        element
    }
}

/// Assets of one project, grouped by type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectAssets {
    pub characters: Vec<AssetRecord>,
    pub products: Vec<AssetRecord>,
    pub locations: Vec<AssetRecord>,
}

impl ProjectAssets {
    /// Convert to elements: characters, then products, then locations.
    pub fn into_elements(self) -> Vec<Element> {
        let Self {
            characters,
            products,
            locations,
        } = self;

        [
            (AssetType::Character, characters),
            (AssetType::Product, products),
            (AssetType::Location, locations),
        ]
        .into_iter()
        .flat_map(|(asset_type, records)| {
            records
                .into_iter()
                .map(move |record| record.into_element(asset_type))
        })
        .collect()
    }

    pub fn len(&self) -> usize {
        self.characters.len() + self.products.len() + self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw standalone library record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub reference_urls: Vec<String>,
    pub kind: ElementKind,
    pub remote_element_id: Option<String>,
    pub registration_job: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl ElementRecord {
    pub fn into_element(self) -> Element {
        let mut element = Element::personal(self.id, self.name)
            .with_reference_urls(self.reference_urls)
            .with_kind(self.kind)
            .with_remote_state(
                self.remote_element_id.as_deref(),
                self.registration_job.as_deref(),
            );
        element.description = self.description;
        element.image_url = self.image_url;
        element.created_at = self.created_at;
        element
    }
}

/// Request to create a standalone library element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewElement {
    pub name: String,
    pub description: String,
    pub frontal_image_url: String,
    pub reference_urls: Vec<String>,
}

impl NewElement {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        frontal_image_url: impl Into<String>,
        reference_urls: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            frontal_image_url: frontal_image_url.into(),
            reference_urls,
        }
    }
}

/// File handed to object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// Source of per-project asset records.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_project_assets(&self, project_id: &str) -> Result<ProjectAssets>;
}

/// CRUD over the user's standalone element library.
#[async_trait]
pub trait PersonalLibrary: Send + Sync {
    async fn list(&self) -> Result<Vec<ElementRecord>>;

    async fn create(&self, element: &NewElement) -> Result<ElementRecord>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Object storage returning publicly fetchable URLs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, file: UploadFile) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use element_core::{Origin, RegistrationStatus};

    fn record(id: &str) -> AssetRecord {
        AssetRecord {
            id: id.to_string(),
            name: format!("Asset {}", id),
            ..Default::default()
        }
    }

    #[test]
    fn test_asset_record_without_registration_fields() {
        let element = record("a1").into_element(AssetType::Character);
        assert_eq!(element.status(), RegistrationStatus::Unregistered);
        assert_eq!(element.identity, "a1");
        assert_eq!(element.local_asset_id.as_deref(), Some("a1"));
        assert_eq!(element.origin, Origin::Catalog);
    }

    #[test]
    fn test_asset_record_with_job_only_is_pending() {
        let element = AssetRecord {
            registration_job: Some("task_5".to_string()),
            ..record("p1")
        }
        .into_element(AssetType::Product);

        assert_eq!(element.status(), RegistrationStatus::Pending);
        assert_eq!(element.pending_job_token(), Some("task_5"));
        assert_eq!(element.identity, "p1");
    }

    #[test]
    fn test_asset_record_with_remote_id_is_registered() {
        let element = AssetRecord {
            remote_element_id: Some("rk_42".to_string()),
            registration_job: Some("task_5".to_string()),
            ..record("l1")
        }
        .into_element(AssetType::Location);

        assert_eq!(element.status(), RegistrationStatus::Registered);
        assert_eq!(element.identity, "rk_42");
        assert_eq!(element.pending_job_token(), None);
    }

    #[test]
    fn test_project_assets_order() {
        let assets = ProjectAssets {
            characters: vec![record("c1")],
            products: vec![record("p1")],
            locations: vec![record("l1"), record("l2")],
        };
        assert_eq!(assets.len(), 4);

        let types: Vec<_> = assets
            .into_elements()
            .into_iter()
            .map(|e| e.asset_type.unwrap())
            .collect();
        assert_eq!(
            types,
            vec![
                AssetType::Character,
                AssetType::Product,
                AssetType::Location,
                AssetType::Location
            ]
        );
    }

    #[test]
    fn test_element_record_deserializes_with_missing_fields() {
        let record: ElementRecord =
            serde_json::from_str(r#"{"id":"el_1","name":"Hero","kind":"video-reference"}"#)
                .unwrap();
        let element = record.into_element();

        assert_eq!(element.origin, Origin::Personal);
        assert_eq!(element.kind, ElementKind::VideoReference);
        assert!(element.reference_urls.is_empty());
        assert!(element.local_asset_id.is_none());
    }
}

//! Data model for library elements.
//!
//! An [`Element`] is a visual reference (character, product, location or a
//! standalone library item) that the video generation pipeline can use once
//! it has been registered with the external provider.

use crate::error::{ElementError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Project asset types that can be registered with the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Character,
    Product,
    Location,
}

impl AssetType {
    /// All asset types, in catalog order.
    pub const ALL: [AssetType; 3] = [Self::Character, Self::Product, Self::Location];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Product => "product",
            Self::Location => "location",
        }
    }
}

impl std::str::FromStr for AssetType {
    type Err = ElementError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "character" => Ok(Self::Character),
            "product" => Ok(Self::Product),
            "location" => Ok(Self::Location),
            other => Err(ElementError::invalid_input(format!(
                "Unknown asset type '{}'. Must be one of: character, product, location",
                other
            ))),
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a project asset, as sent to the registration endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub asset_type: AssetType,
    pub asset_id: String,
}

impl AssetRef {
    pub fn new(asset_type: AssetType, asset_id: impl Into<String>) -> Self {
        Self {
            asset_type,
            asset_id: asset_id.into(),
        }
    }

    /// Key of the element that represents this asset in a store.
    pub fn key(&self) -> ElementKey {
        ElementKey::Asset(self.asset_id.clone())
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.asset_type, self.asset_id)
    }
}

/// Kind of reference material an element carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    #[default]
    ImageReference,
    VideoReference,
}

/// Where an element comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Belongs to a project catalog (character, product, location)
    Catalog,
    /// Belongs to the user's standalone library
    Personal,
}

/// Registration status as seen by UI consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Unregistered,
    Pending,
    Registered,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Pending => "pending",
            Self::Registered => "registered",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration state of an element.
///
/// The job token of an in-flight registration only exists inside
/// [`Registration::Pending`], so an element carries a token exactly when it
/// is pending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Registration {
    #[default]
    Unregistered,
    Pending { job_token: String },
    Registered,
}

impl Registration {
    /// Derive the state from raw source fields.
    ///
    /// A remote id wins over a job token; blank strings count as absent.
    pub fn derive(remote_id: Option<&str>, job_token: Option<&str>) -> Self {
        if non_blank(remote_id).is_some() {
            Self::Registered
        } else if let Some(token) = non_blank(job_token) {
            Self::Pending {
                job_token: token.to_string(),
            }
        } else {
            Self::Unregistered
        }
    }

    pub fn pending(job_token: impl Into<String>) -> Self {
        Self::Pending {
            job_token: job_token.into(),
        }
    }

    pub fn status(&self) -> RegistrationStatus {
        match self {
            Self::Unregistered => RegistrationStatus::Unregistered,
            Self::Pending { .. } => RegistrationStatus::Pending,
            Self::Registered => RegistrationStatus::Registered,
        }
    }

    pub fn pending_job_token(&self) -> Option<&str> {
        match self {
            Self::Pending { job_token } => Some(job_token),
            _ => None,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resolved identity used to match elements across views.
///
/// Elements backed by a project asset are matched by their local asset id,
/// everything else by its identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKey {
    Asset(String),
    Identity(String),
}

impl ElementKey {
    pub fn resolve(local_asset_id: Option<&str>, identity: &str) -> Self {
        match local_asset_id {
            Some(asset_id) => Self::Asset(asset_id.to_string()),
            None => Self::Identity(identity.to_string()),
        }
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asset(id) => write!(f, "asset:{}", id),
            Self::Identity(id) => write!(f, "identity:{}", id),
        }
    }
}

/// A visual reference asset usable by the generation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// Provider-issued registration id, or the local id while unregistered
    pub identity: String,
    /// Owning project asset; absent for library-only elements
    pub local_asset_id: Option<String>,
    /// Asset type of the owning project asset
    pub asset_type: Option<AssetType>,
    pub display_name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub reference_urls: Vec<String>,
    #[serde(default)]
    pub kind: ElementKind,
    pub origin: Origin,
    #[serde(default)]
    pub registration: Registration,
    pub created_at: Option<DateTime<Utc>>,
}

impl Element {
    /// Create an unregistered element for a project asset.
    pub fn catalog(asset: &AssetRef, display_name: impl Into<String>) -> Self {
        Self {
            identity: asset.asset_id.clone(),
            local_asset_id: Some(asset.asset_id.clone()),
            asset_type: Some(asset.asset_type),
            display_name: display_name.into(),
            description: None,
            image_url: None,
            reference_urls: Vec::new(),
            kind: ElementKind::ImageReference,
            origin: Origin::Catalog,
            registration: Registration::Unregistered,
            created_at: None,
        }
    }

    /// Create an unregistered standalone library element.
    pub fn personal(identity: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            local_asset_id: None,
            asset_type: None,
            display_name: display_name.into(),
            description: None,
            image_url: None,
            reference_urls: Vec::new(),
            kind: ElementKind::ImageReference,
            origin: Origin::Personal,
            registration: Registration::Unregistered,
            created_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_reference_urls(mut self, reference_urls: Vec<String>) -> Self {
        self.reference_urls = reference_urls;
        self
    }

    pub fn with_kind(mut self, kind: ElementKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Apply raw registration fields from a source record.
    ///
    /// When a remote id is present it becomes the element's identity.
    pub fn with_remote_state(mut self, remote_id: Option<&str>, job_token: Option<&str>) -> Self {
        self.registration = Registration::derive(remote_id, job_token);
        if let Some(remote_id) = non_blank(remote_id) {
            self.identity = remote_id.to_string();
        }
        self
    }

    pub fn key(&self) -> ElementKey {
        ElementKey::resolve(self.local_asset_id.as_deref(), &self.identity)
    }

    /// Reference used to register this element, if it belongs to a project asset.
    pub fn asset_ref(&self) -> Option<AssetRef> {
        match (self.asset_type, &self.local_asset_id) {
            (Some(asset_type), Some(asset_id)) => Some(AssetRef::new(asset_type, asset_id.clone())),
            _ => None,
        }
    }

    pub fn status(&self) -> RegistrationStatus {
        self.registration.status()
    }

    pub fn pending_job_token(&self) -> Option<&str> {
        self.registration.pending_job_token()
    }

    /// Whether this element resolves to `key`, without building the key.
    pub fn matches(&self, key: &ElementKey) -> bool {
        match (key, &self.local_asset_id) {
            (ElementKey::Asset(id), Some(asset_id)) => asset_id == id,
            (ElementKey::Identity(id), None) => &self.identity == id,
            _ => false,
        }
    }
}

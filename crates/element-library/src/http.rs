//! HTTP adapters for the studio backend.
//!
//! [`HttpBackend`] implements every collaborator trait against the backend's
//! JSON API:
//!
//! | Operation            | Request                                   |
//! |----------------------|-------------------------------------------|
//! | register-or-check    | `POST /api/elements/register`             |
//! | project assets       | `GET /api/projects/{project_id}/assets`   |
//! | list library         | `GET /api/elements`                       |
//! | create element       | `POST /api/elements`                      |
//! | delete element       | `DELETE /api/elements/{id}`               |
//! | upload image         | `POST /api/uploads?filename=...`          |
//!
//! Caller-supplied ids become single percent-encoded path segments, so an id
//! can never reach a different route or carry a query.

use crate::client::{RegisterOptions, RegistrationClient, RegistrationResult};
use crate::sources::{
    CatalogSource, ElementRecord, NewElement, ObjectStorage, PersonalLibrary, ProjectAssets,
    UploadFile,
};
use async_trait::async_trait;
use element_core::{ApiConfig, AssetRef, AssetType, ElementError, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    asset_type: AssetType,
    asset_id: &'a str,
    force: bool,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum RegisterResponse {
    Completed {
        #[serde(rename = "elementId")]
        element_id: String,
    },
    Processing {
        #[serde(rename = "taskId", default)]
        task_id: Option<String>,
    },
    Failed {
        #[serde(default)]
        error: Option<String>,
    },
}

impl From<RegisterResponse> for RegistrationResult {
    fn from(response: RegisterResponse) -> Self {
        match response {
            RegisterResponse::Completed { element_id } => Self::Completed { id: element_id },
            RegisterResponse::Processing { task_id } => Self::Processing { job_token: task_id },
            RegisterResponse::Failed { error } => Self::Failed {
                reason: error.unwrap_or_else(|| "unknown error".to_string()),
            },
        }
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

/// Client for the studio backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ElementError::config(format!("Invalid API token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(ElementError::transport)?;

        let base_url = Url::parse(config.base_url.trim()).map_err(|e| {
            ElementError::config(format!("Invalid api.base_url '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ElementError::config(format!(
                "api.base_url '{}' cannot carry a path",
                config.base_url
            )));
        }
        info!("Initialized studio backend client for {}", base_url);

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Append `segments` to the base path, encoding each one on its own.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ElementError::config("api.base_url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Turn a non-success response into [`ElementError::Remote`].
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), %url, body = %body, "Backend request failed");
        Err(ElementError::remote(status.as_u16(), body))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response.text().await.map_err(ElementError::transport)?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RegistrationClient for HttpBackend {
    async fn register(
        &self,
        asset: &AssetRef,
        options: RegisterOptions,
    ) -> Result<RegistrationResult> {
        debug!(%asset, force = options.force, "Calling register endpoint");

        let request = RegisterRequest {
            asset_type: asset.asset_type,
            asset_id: &asset.asset_id,
            force: options.force,
        };

        let response = self
            .client
            .post(self.endpoint(&["api", "elements", "register"])?)
            .json(&request)
            .send()
            .await
            .map_err(ElementError::transport)?;

        let status = response.status();
        let body = response.text().await.map_err(ElementError::transport)?;

        if status.is_success() {
            let parsed: RegisterResponse = serde_json::from_str(&body)?;
            return Ok(parsed.into());
        }

        // Provider rejections may come with an error status and a failure body
        match serde_json::from_str::<RegisterResponse>(&body) {
            Ok(failed @ RegisterResponse::Failed { .. }) => Ok(failed.into()),
            _ => {
                warn!(%asset, status = status.as_u16(), body = %body, "Register endpoint failed");
                Err(ElementError::remote(status.as_u16(), body))
            }
        }
    }
}

#[async_trait]
impl CatalogSource for HttpBackend {
    async fn fetch_project_assets(&self, project_id: &str) -> Result<ProjectAssets> {
        let response = self
            .client
            .get(self.endpoint(&["api", "projects", project_id, "assets"])?)
            .send()
            .await
            .map_err(ElementError::transport)?;

        let assets: ProjectAssets = Self::read_json(Self::check(response).await?).await?;
        debug!(project_id, count = assets.len(), "Fetched project assets");
        Ok(assets)
    }
}

#[async_trait]
impl PersonalLibrary for HttpBackend {
    async fn list(&self) -> Result<Vec<ElementRecord>> {
        let response = self
            .client
            .get(self.endpoint(&["api", "elements"])?)
            .send()
            .await
            .map_err(ElementError::transport)?;

        Self::read_json(Self::check(response).await?).await
    }

    async fn create(&self, element: &NewElement) -> Result<ElementRecord> {
        let response = self
            .client
            .post(self.endpoint(&["api", "elements"])?)
            .json(element)
            .send()
            .await
            .map_err(ElementError::transport)?;

        Self::read_json(Self::check(response).await?).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&["api", "elements", id])?)
            .send()
            .await
            .map_err(ElementError::transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ElementError::not_found("element", id));
        }
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for HttpBackend {
    async fn upload(&self, file: UploadFile) -> Result<String> {
        debug!(file_name = %file.file_name, size = file.bytes.len(), "Uploading file");

        let response = self
            .client
            .post(self.endpoint(&["api", "uploads"])?)
            .query(&[("filename", file.file_name.as_str())])
            .header(CONTENT_TYPE, file.content_type.as_str())
            .body(file.bytes)
            .send()
            .await
            .map_err(ElementError::transport)?;

        let uploaded: UploadResponse = Self::read_json(Self::check(response).await?).await?;
        Ok(uploaded.url)
    }
}

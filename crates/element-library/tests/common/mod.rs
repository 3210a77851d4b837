//! In-memory backend shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use element_core::{AssetRef, ElementError, Result};
use element_library::{
    AssetRecord, CatalogSource, ElementRecord, LibraryFacade, NewElement, ObjectStorage,
    PersonalLibrary, PollPolicy, ProjectAssets, RegisterOptions, RegistrationClient,
    RegistrationResult, UploadFile,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

/// Install a test subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "element_library=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Backend double implementing every collaborator.
#[derive(Default)]
pub struct FakeBackend {
    pub assets: Mutex<ProjectAssets>,
    pub catalog_down: AtomicBool,
    pub library: Mutex<Vec<ElementRecord>>,
    pub library_down: AtomicBool,
    script: Mutex<VecDeque<RegistrationResult>>,
    fallback: Mutex<Option<RegistrationResult>>,
    pub register_delay: Mutex<Duration>,
    pub register_calls: AtomicU32,
    pub forced: Mutex<Vec<bool>>,
    pub uploads: Mutex<Vec<UploadFile>>,
    next_id: AtomicU32,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_characters(ids: &[&str]) -> Arc<Self> {
        let backend = Self::new();
        backend.set_characters(ids.iter().map(|id| character(id)).collect());
        backend
    }

    pub fn set_characters(&self, records: Vec<AssetRecord>) {
        self.assets.lock().unwrap().characters = records;
    }

    /// Answers returned by successive register calls.
    pub fn script(&self, results: impl IntoIterator<Item = RegistrationResult>) {
        self.script.lock().unwrap().extend(results);
    }

    /// Answer returned once the script is exhausted.
    pub fn always(&self, result: RegistrationResult) {
        *self.fallback.lock().unwrap() = Some(result);
    }

    pub fn delay_register(&self, delay: Duration) {
        *self.register_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> u32 {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn forced_flags(&self) -> Vec<bool> {
        self.forced.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistrationClient for FakeBackend {
    async fn register(
        &self,
        _asset: &AssetRef,
        options: RegisterOptions,
    ) -> Result<RegistrationResult> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.forced.lock().unwrap().push(options.force);

        let delay = *self.register_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted.or_else(|| self.fallback.lock().unwrap().clone()) {
            Some(result) => Ok(result),
            None => Err(ElementError::transport("no scripted answer")),
        }
    }
}

#[async_trait]
impl CatalogSource for FakeBackend {
    async fn fetch_project_assets(&self, _project_id: &str) -> Result<ProjectAssets> {
        if self.catalog_down.load(Ordering::SeqCst) {
            return Err(ElementError::remote(503, "catalog unavailable"));
        }
        Ok(self.assets.lock().unwrap().clone())
    }
}

#[async_trait]
impl PersonalLibrary for FakeBackend {
    async fn list(&self) -> Result<Vec<ElementRecord>> {
        if self.library_down.load(Ordering::SeqCst) {
            return Err(ElementError::transport("connection refused"));
        }
        Ok(self.library.lock().unwrap().clone())
    }

    async fn create(&self, element: &NewElement) -> Result<ElementRecord> {
        if self.library_down.load(Ordering::SeqCst) {
            return Err(ElementError::remote(500, "create failed"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = ElementRecord {
            id: format!("el_{}", id),
            name: element.name.clone(),
            description: Some(element.description.clone()),
            image_url: Some(element.frontal_image_url.clone()),
            reference_urls: element.reference_urls.clone(),
            created_at: Some(chrono::Utc::now()),
            ..Default::default()
        };
        self.library.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        if self.library_down.load(Ordering::SeqCst) {
            return Err(ElementError::remote(500, "delete failed"));
        }
        self.library.lock().unwrap().retain(|record| record.id != id);
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for FakeBackend {
    async fn upload(&self, file: UploadFile) -> Result<String> {
        let url = format!("https://cdn.test/{}", file.file_name);
        self.uploads.lock().unwrap().push(file);
        Ok(url)
    }
}

pub fn character(id: &str) -> AssetRecord {
    AssetRecord {
        id: id.to_string(),
        name: format!("Character {}", id),
        ..Default::default()
    }
}

pub fn processing() -> RegistrationResult {
    RegistrationResult::Processing { job_token: None }
}

pub fn completed(id: &str) -> RegistrationResult {
    RegistrationResult::Completed { id: id.to_string() }
}

pub fn fast_policy(max_attempts: u32) -> PollPolicy {
    PollPolicy::fixed(max_attempts, Duration::from_millis(100))
}

pub fn facade(backend: &Arc<FakeBackend>, policy: PollPolicy) -> LibraryFacade {
    init_tracing();
    LibraryFacade::builder()
        .registration_client(backend.clone())
        .catalog(backend.clone())
        .personal_library(backend.clone())
        .storage(backend.clone())
        .poll_policy(policy)
        .build()
        .unwrap()
}

//! Entry point used by the UI layer.
//!
//! [`LibraryFacade`] wires the store, the registration machinery and the
//! backend collaborators together. It is cheap to clone; clones share the
//! same store and the same set of in-flight registrations.

use crate::client::{RegisterOptions, RegistrationClient};
use crate::http::HttpBackend;
use crate::poll::{PollLoop, PollOutcome, PollPolicy};
use crate::single_flight::{FlightRole, InFlightRegistry};
use crate::sources::{
    CatalogSource, ElementRecord, NewElement, ObjectStorage, PersonalLibrary, UploadFile,
};
use crate::store::{ElementStore, Snapshot};
use element_core::{
    AssetRef, AssetType, Element, ElementError, ElementKey, LibraryConfig, RegistrationStatus,
    Result,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Result of [`LibraryFacade::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The provider issued `id`; the element is registered
    Registered { id: String },
    /// Attempts ran out while the job was still running; retry later
    StillProcessing,
    /// The registration was rejected or the backend was unreachable
    Failed { message: String },
    /// The registration was stopped before it finished
    Cancelled,
}

impl RegisterOutcome {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Registered { id } => Some(id),
            _ => None,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered { .. })
    }

    /// Message to show the user, if the outcome needs one.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Registered { .. } | Self::Cancelled => None,
            Self::StillProcessing => Some(
                "Registration is still processing. Try again in a moment.".to_string(),
            ),
            Self::Failed { message } => Some(message.clone()),
        }
    }
}

struct Inner {
    store: ElementStore,
    registrations: InFlightRegistry<RegisterOutcome>,
    poll: PollLoop,
    client: Arc<dyn RegistrationClient>,
    catalog: Arc<dyn CatalogSource>,
    personal: Arc<dyn PersonalLibrary>,
    storage: Arc<dyn ObjectStorage>,
}

impl Inner {
    /// Run one registration flight and turn a panic inside it into a failure.
    ///
    /// The pending state written under `job_token` is reverted on panic, so
    /// the element never stays pending without a flight behind it.
    async fn run_flight(
        self: Arc<Self>,
        asset: AssetRef,
        job_token: String,
        cancel: CancellationToken,
    ) -> RegisterOutcome {
        let key = asset.key();
        let attempt = AssertUnwindSafe(Arc::clone(&self).run_registration(
            asset,
            job_token.clone(),
            cancel,
        ))
        .catch_unwind()
        .await;

        match attempt {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(%key, "Registration task panicked");
                self.store.revert_registration(&key, &job_token);
                RegisterOutcome::Failed {
                    message: ElementError::internal("registration task panicked").user_message(),
                }
            }
        }
    }

    async fn run_registration(
        self: Arc<Self>,
        asset: AssetRef,
        job_token: String,
        cancel: CancellationToken,
    ) -> RegisterOutcome {
        if cancel.is_cancelled() {
            debug!(%asset, "Library shut down, not starting registration");
            return RegisterOutcome::Cancelled;
        }

        let key = asset.key();
        let force = self.store.status_of(&key) == Some(RegistrationStatus::Registered);

        if !self.store.mark_pending(&key, &job_token) {
            debug!(%asset, "Registering an asset that is not in the library");
        }
        info!(%asset, force, "Starting registration");

        let options = RegisterOptions { force };
        let result = self
            .poll
            .run(self.client.as_ref(), &asset, options, &cancel)
            .await;

        if cancel.is_cancelled() {
            debug!(%asset, "Registration cancelled, leaving library untouched");
            return RegisterOutcome::Cancelled;
        }

        match result {
            Ok(PollOutcome::Completed { id, attempts }) => {
                info!(%asset, registration_id = %id, attempts, "Asset registered");
                self.store.complete_registration(&key, &job_token, &id);
                RegisterOutcome::Registered { id }
            }
            Ok(PollOutcome::Indeterminate { attempts }) => {
                warn!(%asset, attempts, "Registration did not finish in time");
                self.store.revert_registration(&key, &job_token);
                RegisterOutcome::StillProcessing
            }
            Ok(PollOutcome::Cancelled { .. }) => RegisterOutcome::Cancelled,
            Err(e) => {
                error!(%asset, error = %e, "Registration failed");
                self.store.revert_registration(&key, &job_token);
                RegisterOutcome::Failed {
                    message: e.user_message(),
                }
            }
        }
    }
}

/// Element library shared by the UI.
#[derive(Clone)]
pub struct LibraryFacade {
    inner: Arc<Inner>,
}

impl LibraryFacade {
    pub fn builder() -> LibraryFacadeBuilder {
        LibraryFacadeBuilder::default()
    }

    /// Build a facade talking to the backend described by `config`.
    pub fn from_config(config: &LibraryConfig) -> Result<Self> {
        config.validate()?;
        let backend = Arc::new(HttpBackend::new(&config.api)?);

        Self::builder()
            .registration_client(backend.clone())
            .catalog(backend.clone())
            .personal_library(backend.clone())
            .storage(backend)
            .poll_policy(PollPolicy::from(&config.registration))
            .build()
    }

    /// Refresh the library from the personal library and the project catalog.
    ///
    /// Both sources are queried concurrently. A source that fails is logged
    /// and contributes nothing; the refresh itself never fails. Personal
    /// elements come first, newest first, followed by characters, products
    /// and locations.
    #[instrument(skip(self))]
    pub async fn fetch_all(&self, project_id: &str) -> Snapshot {
        let inner = &self.inner;
        let _loading = inner.store.begin_loading();

        let (personal, catalog) = tokio::join!(
            inner.personal.list(),
            inner.catalog.fetch_project_assets(project_id)
        );

        let mut incoming: Vec<Element> = match personal {
            Ok(records) => records.into_iter().map(ElementRecord::into_element).collect(),
            Err(e) => {
                warn!(error = %e, "Personal library unavailable, continuing without it");
                Vec::new()
            }
        };
        incoming.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        match catalog {
            Ok(assets) => incoming.extend(assets.into_elements()),
            Err(e) => warn!(error = %e, "Project assets unavailable, continuing without them"),
        }

        let registrations = &inner.registrations;
        let count = inner
            .store
            .apply_fetch(incoming, |key| registrations.contains_key(key));
        info!(count, "Element library refreshed");

        inner.store.snapshot()
    }

    /// Register the project asset, or wait for its running registration.
    ///
    /// An asset that is already registered is registered again with `force`.
    /// Concurrent calls for the same element share one remote job and all
    /// receive its outcome. The element shows as pending until the outcome
    /// is known; failures and timeouts roll it back to unregistered.
    ///
    /// A request naming a different asset type than the element held in
    /// the library is rejected without calling the backend.
    #[instrument(skip(self))]
    pub async fn register(&self, asset_type: AssetType, asset_id: &str) -> RegisterOutcome {
        let asset = AssetRef::new(asset_type, asset_id);
        let key = asset.key();

        let known_type = self.inner.store.find(&key).and_then(|element| element.asset_type);
        if let Some(known) = known_type.filter(|known| *known != asset_type) {
            warn!(%asset, %known, "Asset type does not match the library element");
            return RegisterOutcome::Failed {
                message: ElementError::invalid_input(format!(
                    "This element is a {}, not a {}.",
                    known, asset_type
                ))
                .user_message(),
            };
        }

        let inner = Arc::clone(&self.inner);
        let job_asset = asset.clone();
        let (flight, role) = self.inner.registrations.join_or_start(&key, move |cancel| {
            let job_token = Uuid::new_v4().to_string();
            inner.run_flight(job_asset, job_token, cancel)
        });

        if role == FlightRole::Joined {
            debug!(%asset, "Waiting for running registration");
        }

        match flight.await {
            Some(outcome) => outcome,
            None => {
                error!(%asset, "Registration task stopped unexpectedly");
                RegisterOutcome::Failed {
                    message: ElementError::internal("registration task stopped").user_message(),
                }
            }
        }
    }

    /// Create a standalone element and put it at the head of the library.
    #[instrument(skip(self, element), fields(name = %element.name))]
    pub async fn create(&self, element: NewElement) -> Result<Element> {
        if element.name.trim().is_empty() {
            return Err(ElementError::invalid_input("Element name is required"));
        }
        if element.frontal_image_url.trim().is_empty() {
            return Err(ElementError::invalid_input("A frontal image is required"));
        }

        let record = self.inner.personal.create(&element).await.map_err(|e| {
            error!(error = %e, "Failed to create element");
            e
        })?;

        let created = record.into_element();
        self.inner.store.insert_front(created.clone());
        info!(identity = %created.identity, "Element created");
        Ok(created)
    }

    /// Delete the element with identity `id`.
    ///
    /// A registration still running for the element is cancelled and its
    /// result discarded.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.inner.personal.delete(id).await.map_err(|e| {
            error!(error = %e, "Failed to delete element");
            e
        })?;

        if let Some(element) = self.inner.store.find_by_identity(id) {
            self.inner.registrations.cancel(&element.key());
        }

        if self.inner.store.remove_by_identity(id).is_none() {
            debug!("Deleted element was not in the library");
        }
        info!("Element deleted");
        Ok(())
    }

    /// Upload an image and return its public URL.
    #[instrument(skip(self, file), fields(file_name = %file.file_name))]
    pub async fn upload_image(&self, file: UploadFile) -> Result<String> {
        if file.bytes.is_empty() {
            return Err(ElementError::invalid_input("The image file is empty"));
        }

        let url = self.inner.storage.upload(file).await.map_err(|e| {
            error!(error = %e, "Image upload failed");
            e
        })?;
        debug!(%url, "Image uploaded");
        Ok(url)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.store.subscribe()
    }

    pub fn find(&self, key: &ElementKey) -> Option<Element> {
        self.inner.store.find(key)
    }

    pub fn status_of(&self, key: &ElementKey) -> Option<RegistrationStatus> {
        self.inner.store.status_of(key)
    }

    pub fn is_loading(&self) -> bool {
        self.inner.store.is_loading()
    }

    pub fn is_registering(&self, asset: &AssetRef) -> bool {
        self.inner.registrations.contains_key(&asset.key())
    }

    /// Cancel every running registration and refuse to finish new ones.
    ///
    /// Call this when the view is torn down. Elements whose registration
    /// was stopped stay pending: refreshes never move `pending` back to
    /// `unregistered`, and the discarded flight can no longer finish them.
    pub fn shutdown(&self) {
        info!(
            in_flight = self.inner.registrations.len(),
            "Shutting down element library"
        );
        self.inner.registrations.shutdown();
    }
}

/// Builder for [`LibraryFacade`].
#[derive(Default)]
pub struct LibraryFacadeBuilder {
    client: Option<Arc<dyn RegistrationClient>>,
    catalog: Option<Arc<dyn CatalogSource>>,
    personal: Option<Arc<dyn PersonalLibrary>>,
    storage: Option<Arc<dyn ObjectStorage>>,
    policy: PollPolicy,
    initial: Vec<Element>,
}

impl LibraryFacadeBuilder {
    pub fn registration_client(mut self, client: Arc<dyn RegistrationClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn CatalogSource>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn personal_library(mut self, personal: Arc<dyn PersonalLibrary>) -> Self {
        self.personal = Some(personal);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Seed the library before the first refresh.
    pub fn elements(mut self, elements: Vec<Element>) -> Self {
        self.initial = elements;
        self
    }

    pub fn build(self) -> Result<LibraryFacade> {
        let missing = |name: &str| ElementError::config(format!("{} is required", name));

        let inner = Inner {
            store: ElementStore::with_elements(self.initial),
            registrations: InFlightRegistry::new(),
            poll: PollLoop::new(self.policy),
            client: self.client.ok_or_else(|| missing("registration client"))?,
            catalog: self.catalog.ok_or_else(|| missing("catalog source"))?,
            personal: self.personal.ok_or_else(|| missing("personal library"))?,
            storage: self.storage.ok_or_else(|| missing("object storage"))?,
        };

        Ok(LibraryFacade {
            inner: Arc::new(inner),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_messages() {
        let registered = RegisterOutcome::Registered {
            id: "rk_1".to_string(),
        };
        assert_eq!(registered.id(), Some("rk_1"));
        assert!(registered.user_message().is_none());

        assert!(RegisterOutcome::StillProcessing.user_message().is_some());
        assert_eq!(
            RegisterOutcome::Failed {
                message: "quota".to_string()
            }
            .user_message()
            .as_deref(),
            Some("quota")
        );
        assert!(RegisterOutcome::Cancelled.id().is_none());
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = LibraryFacade::builder().build().err().unwrap();
        assert!(matches!(err, ElementError::Config(_)));
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let mut config = LibraryConfig::default();
        config.registration.max_attempts = 0;
        assert!(LibraryFacade::from_config(&config).is_err());
    }
}

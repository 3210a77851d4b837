//! Element library for the studio.
//!
//! Keeps a local view of reusable visual elements (project characters,
//! products and locations plus the user's standalone library) and drives
//! their registration with the remote video-generation provider.
//!
//! # Architecture
//!
//! - **Store**: immutable snapshots published over a watch channel
//! - **Reconciliation**: refreshes never roll back registration progress
//! - **Registration**: bounded, cancellable polling of an idempotent
//!   register-or-check endpoint, one flight per asset
//! - **Backend**: HTTP adapters for the catalog, the personal library,
//!   object storage and the registration endpoint
//!
//! # Example
//!
//! ```no_run
//! use element_library::prelude::*;
//!
//! # async fn run() -> element_core::Result<()> {
//! let config = LibraryConfig::default();
//! let library = LibraryFacade::from_config(&config)?;
//!
//! library.fetch_all("project-1").await;
//! let outcome = library.register(AssetType::Character, "a1").await;
//! if let Some(message) = outcome.user_message() {
//!     eprintln!("{}", message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod facade;
pub mod http;
pub mod poll;
pub mod reconcile;
pub mod single_flight;
pub mod sources;
pub mod store;

pub use client::{RegisterOptions, RegistrationClient, RegistrationResult};
pub use facade::{LibraryFacade, LibraryFacadeBuilder, RegisterOutcome};
pub use http::HttpBackend;
pub use poll::{Backoff, PollLoop, PollOutcome, PollPolicy};
pub use single_flight::{Flight, FlightRole, InFlightRegistry};
pub use sources::{
    AssetRecord, CatalogSource, ElementRecord, NewElement, ObjectStorage, PersonalLibrary,
    ProjectAssets, UploadFile,
};
pub use store::{ElementStore, Snapshot};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{RegisterOptions, RegistrationClient, RegistrationResult};
    pub use crate::facade::{LibraryFacade, RegisterOutcome};
    pub use crate::sources::{
        CatalogSource, NewElement, ObjectStorage, PersonalLibrary, ProjectAssets, UploadFile,
    };
    pub use crate::store::Snapshot;
    pub use element_core::prelude::*;
}

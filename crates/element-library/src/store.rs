//! Authoritative in-memory collection of elements.
//!
//! The store publishes immutable snapshots through a watch channel. Readers
//! hold an `Arc<Vec<Element>>` that never changes under them; every mutation
//! goes through the methods below and replaces the published snapshot.

use crate::reconcile;
use element_core::{Element, ElementKey, Registration, RegistrationStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tracing::debug;

/// Read-only view of the store at one point in time.
pub type Snapshot = Arc<Vec<Element>>;

/// In-memory element collection with a defined mutation API.
pub struct ElementStore {
    elements: watch::Sender<Snapshot>,
    /// Number of fetches currently running.
    loading: AtomicUsize,
}

/// Keeps the store's loading flag raised until dropped.
pub(crate) struct LoadingGuard<'a> {
    store: &'a ElementStore,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.store.loading.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for ElementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementStore {
    pub fn new() -> Self {
        let (elements, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            elements,
            loading: AtomicUsize::new(0),
        }
    }

    /// Create a store seeded with `elements`; duplicate keys keep the first entry.
    pub fn with_elements(elements: Vec<Element>) -> Self {
        let store = Self::new();
        store.apply_fetch(elements, |_| false);
        store
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.elements.borrow().clone()
    }

    /// Receiver notified whenever the snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.elements.subscribe()
    }

    pub fn len(&self) -> usize {
        self.elements.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.borrow().is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire) > 0
    }

    /// Raise the loading flag for as long as the guard lives.
    pub(crate) fn begin_loading(&self) -> LoadingGuard<'_> {
        self.loading.fetch_add(1, Ordering::AcqRel);
        LoadingGuard { store: self }
    }

    pub fn find(&self, key: &ElementKey) -> Option<Element> {
        self.elements
            .borrow()
            .iter()
            .find(|element| element.matches(key))
            .cloned()
    }

    pub fn find_by_identity(&self, identity: &str) -> Option<Element> {
        self.elements
            .borrow()
            .iter()
            .find(|element| element.identity == identity)
            .cloned()
    }

    pub fn status_of(&self, key: &ElementKey) -> Option<RegistrationStatus> {
        self.elements
            .borrow()
            .iter()
            .find(|element| element.matches(key))
            .map(Element::status)
    }

    /// Replace the collection with the merge of the current snapshot and `incoming`.
    ///
    /// `is_pinned` is evaluated while the store is locked, so a registration
    /// that marks an element pending cannot interleave with the merge.
    /// Returns the number of elements after the merge.
    pub fn apply_fetch<P>(&self, incoming: Vec<Element>, is_pinned: P) -> usize
    where
        P: Fn(&ElementKey) -> bool,
    {
        let mut count = 0;
        self.elements.send_modify(|snapshot| {
            let merged = reconcile::merge_pinned(snapshot, incoming, is_pinned);
            count = merged.len();
            *snapshot = Arc::new(merged);
        });
        debug!(count, "Applied fetched elements");
        count
    }

    /// Insert `element` at the head of the collection.
    ///
    /// An existing entry with the same key is replaced.
    pub fn insert_front(&self, element: Element) {
        self.elements.send_modify(|snapshot| {
            let key = element.key();
            let elements = Arc::make_mut(snapshot);
            elements.retain(|existing| !existing.matches(&key));
            elements.insert(0, element);
        });
    }

    /// Remove the element whose identity is `identity`.
    pub fn remove_by_identity(&self, identity: &str) -> Option<Element> {
        let mut removed = None;
        self.elements.send_if_modified(|snapshot| {
            let Some(index) = snapshot.iter().position(|e| e.identity == identity) else {
                return false;
            };
            removed = Some(Arc::make_mut(snapshot).remove(index));
            true
        });
        removed
    }

    /// Mark the element as pending under `job_token`.
    ///
    /// This is the user-initiated transition into `pending`; it replaces any
    /// previous state, including `registered` for a forced re-registration.
    pub fn mark_pending(&self, key: &ElementKey, job_token: &str) -> bool {
        self.update(key, |element| {
            element.registration = Registration::pending(job_token);
            true
        })
    }

    /// Finish the registration started under `job_token`.
    ///
    /// Ignored unless the element is still pending under the same token.
    pub fn complete_registration(&self, key: &ElementKey, job_token: &str, id: &str) -> bool {
        self.update(key, |element| {
            if element.pending_job_token() != Some(job_token) {
                debug!(%key, "Ignoring completion for superseded registration");
                return false;
            }
            element.identity = id.to_string();
            element.registration = Registration::Registered;
            true
        })
    }

    /// Roll the registration started under `job_token` back to `unregistered`.
    ///
    /// Ignored unless the element is still pending under the same token.
    pub fn revert_registration(&self, key: &ElementKey, job_token: &str) -> bool {
        self.update(key, |element| {
            if element.pending_job_token() != Some(job_token) {
                debug!(%key, "Ignoring revert for superseded registration");
                return false;
            }
            if let Some(local) = &element.local_asset_id {
                element.identity = local.clone();
            }
            element.registration = Registration::Unregistered;
            true
        })
    }

    fn update<F>(&self, key: &ElementKey, f: F) -> bool
    where
        F: FnOnce(&mut Element) -> bool,
    {
        self.elements.send_if_modified(|snapshot| {
            let Some(index) = snapshot.iter().position(|e| e.matches(key)) else {
                return false;
            };
            let mut element = snapshot[index].clone();
            if !f(&mut element) {
                return false;
            }
            Arc::make_mut(snapshot)[index] = element;
            true
        })
    }
}

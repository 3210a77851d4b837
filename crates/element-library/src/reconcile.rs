//! Merge of freshly fetched elements into the currently held view.
//!
//! The incoming list is the source of truth for which elements exist and for
//! their descriptive fields. Registration state only moves forward through a
//! refresh: when the incoming entry reports less progress than the current
//! one (`registered` > `pending` > `unregistered`), the current identity and
//! registration are kept.

use element_core::{Element, ElementKey, RegistrationStatus};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Merge `incoming` into `current`.
///
/// Entries are matched by [`Element::key`]. The result follows the order of
/// `incoming`; entries of `current` missing from `incoming` are dropped.
pub fn merge(current: &[Element], incoming: Vec<Element>) -> Vec<Element> {
    merge_pinned(current, incoming, |_| false)
}

/// Merge like [`merge`], keeping the registration state of pinned entries.
///
/// A pinned entry has a registration in flight. It keeps its current
/// identity and registration state whatever the incoming entry says, and
/// takes every other field from the incoming entry.
pub fn merge_pinned<P>(current: &[Element], incoming: Vec<Element>, is_pinned: P) -> Vec<Element>
where
    P: Fn(&ElementKey) -> bool,
{
    let by_key: HashMap<ElementKey, &Element> =
        current.iter().map(|element| (element.key(), element)).collect();

    let mut seen = HashSet::with_capacity(incoming.len());
    let mut merged = Vec::with_capacity(incoming.len());

    for element in incoming {
        let key = element.key();
        if !seen.insert(key.clone()) {
            debug!(%key, "Dropping duplicate incoming element");
            continue;
        }

        let resolved = match by_key.get(&key) {
            Some(existing) => resolve(existing, element, is_pinned(&key)),
            None => element,
        };
        merged.push(resolved);
    }

    merged
}

fn resolve(current: &Element, incoming: Element, pinned: bool) -> Element {
    if !pinned && !regresses(current.status(), incoming.status()) {
        return incoming;
    }

    if !pinned {
        debug!(
            key = %current.key(),
            status = %current.status(),
            incoming = %incoming.status(),
            "Keeping known registration over stale source"
        );
    }

    Element {
        identity: current.identity.clone(),
        registration: current.registration.clone(),
        ..incoming
    }
}

fn regresses(current: RegistrationStatus, incoming: RegistrationStatus) -> bool {
    use RegistrationStatus::*;

    matches!(
        (current, incoming),
        (Registered, Pending) | (Registered, Unregistered) | (Pending, Unregistered)
    )
}

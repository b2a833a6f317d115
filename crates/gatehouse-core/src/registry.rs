//! Predicate registry: the ordered set of checks per event kind.
//!
//! Populated once at startup, read-only afterwards, and passed into the
//! engine explicitly so tests can build their own. Lower priority numbers
//! evaluate first (cheap fail-fast checks ahead of expensive ones); ties
//! keep registration order.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::event::EventKind;
use crate::predicate::Predicate;

/// A predicate plus its declared evaluation priority.
#[derive(Clone)]
pub struct Registration {
    pub predicate: Arc<dyn Predicate>,
    pub priority: i32,
}

#[derive(Default)]
pub struct PredicateRegistry {
    by_event: HashMap<EventKind, Vec<Registration>>,
    ordered: Vec<Registration>,
    names: BTreeSet<String>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate for every event kind it declares applicable.
    /// Fails if the name is already taken.
    pub fn register(
        &mut self,
        predicate: Arc<dyn Predicate>,
        priority: i32,
    ) -> Result<(), RegistryError> {
        let name = predicate.name().to_string();
        if !self.names.insert(name.clone()) {
            return Err(RegistryError::DuplicateName(name));
        }

        let registration = Registration {
            predicate: Arc::clone(&predicate),
            priority,
        };
        for kind in predicate.events() {
            let slot = self.by_event.entry(*kind).or_default();
            slot.push(registration.clone());
            // Stable sort: equal priorities keep registration order
            slot.sort_by_key(|r| r.priority);
        }
        self.ordered.push(registration);
        self.ordered.sort_by_key(|r| r.priority);
        Ok(())
    }

    /// Predicates applicable to an event kind, sorted by priority ascending.
    pub fn predicates_for(&self, kind: EventKind) -> &[Registration] {
        self.by_event.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every registration, priority order, for operator listing.
    pub fn registrations(&self) -> &[Registration] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

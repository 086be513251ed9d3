//! PipeNameRegistry - live operation identities grouped by pipe name
//!
//! Shared by every adapter created for one scope. An identity stays listed
//! from its dispatch until `take` clears the whole name; completion does not
//! remove it.
//!
//! Each listing carries a generation ticket. Registering an identity again
//! after `take` gives it a new generation, so work dispatched before the
//! reset never matches the fresh listing.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::identity::OperationId;
use crate::idgen::{IdGen, Ticket};

struct Listing {
    name: String,
    generation: Ticket,
}

#[derive(Default)]
struct InnerState {
    by_name: HashMap<String, Vec<OperationId>>,
    owner: HashMap<OperationId, Listing>,
}

/// Mapping from pipe name to the identities registered under it
#[derive(Default)]
pub struct PipeNameRegistry {
    inner: Mutex<InnerState>,
    generations: IdGen,
}

impl PipeNameRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` under `name` and return the generation it is listed with
    ///
    /// An identity already listed under `name` keeps its generation. Returns
    /// `None` if another name owns it.
    pub fn register(&self, name: &str, id: OperationId) -> Option<Ticket> {
        let mut state = self.inner.lock();
        if let Some(listing) = state.owner.get(&id) {
            if listing.name != name {
                log::warn!(
                    "registry.register: id {id} for '{name}' already registered under '{}'",
                    listing.name
                );
                return None;
            }
            return Some(listing.generation);
        }
        let generation = self.generations.next_ticket();
        state.owner.insert(
            id,
            Listing {
                name: name.to_string(),
                generation,
            },
        );
        state.by_name.entry(name.to_string()).or_default().push(id);
        Some(generation)
    }

    #[must_use]
    pub fn contains(&self, name: &str, id: OperationId) -> bool {
        self.inner
            .lock()
            .owner
            .get(&id)
            .is_some_and(|listing| listing.name == name)
    }

    /// Whether `id` is still listed under `name` with the given generation
    #[must_use]
    pub fn is_current(&self, name: &str, id: OperationId, generation: Ticket) -> bool {
        self.inner
            .lock()
            .owner
            .get(&id)
            .is_some_and(|listing| listing.name == name && listing.generation == generation)
    }

    /// Identities under `name`, in registration order
    #[must_use]
    pub fn ids(&self, name: &str) -> Vec<OperationId> {
        self.inner
            .lock()
            .by_name
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove and return every identity under `name`
    pub fn take(&self, name: &str) -> Vec<OperationId> {
        let mut state = self.inner.lock();
        let ids = state.by_name.remove(name).unwrap_or_default();
        for id in &ids {
            state.owner.remove(id);
        }
        ids
    }

    /// Remove and return everything, grouped by name
    pub fn take_all(&self) -> Vec<(String, Vec<OperationId>)> {
        let mut state = self.inner.lock();
        state.owner.clear();
        state.by_name.drain().collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.inner.lock().by_name.keys().cloned().collect()
    }

    /// Total number of registered identities
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().owner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> OperationId {
        OperationId::new(n)
    }

    #[test]
    fn register_is_idempotent_per_name() {
        let registry = PipeNameRegistry::new();
        let first = registry.register("widgets", id(1));
        assert!(first.is_some());
        assert_eq!(registry.register("widgets", id(1)), first);
        assert_eq!(registry.ids("widgets"), vec![id(1)]);
    }

    #[test]
    fn an_id_never_sits_under_two_names() {
        let registry = PipeNameRegistry::new();
        registry.register("widgets", id(1));
        assert_eq!(registry.register("gadgets", id(1)), None);
        assert!(registry.contains("widgets", id(1)));
        assert!(!registry.contains("gadgets", id(1)));
        assert!(registry.ids("gadgets").is_empty());
    }

    #[test]
    fn take_clears_only_the_given_name() {
        let registry = PipeNameRegistry::new();
        registry.register("widgets", id(1));
        registry.register("widgets", id(2));
        registry.register("gadgets", id(3));

        assert_eq!(registry.take("widgets"), vec![id(1), id(2)]);
        assert!(registry.ids("widgets").is_empty());
        assert_eq!(registry.ids("gadgets"), vec![id(3)]);

        assert!(registry.take("widgets").is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registering_again_after_take_starts_a_new_generation() {
        let registry = PipeNameRegistry::new();
        let before = registry.register("widgets", id(1)).unwrap();
        assert!(registry.is_current("widgets", id(1), before));

        registry.take("widgets");
        assert!(!registry.is_current("widgets", id(1), before));

        let after = registry.register("widgets", id(1)).unwrap();
        assert_ne!(before, after);
        assert!(!registry.is_current("widgets", id(1), before));
        assert!(registry.is_current("widgets", id(1), after));
        assert!(!registry.is_current("gadgets", id(1), after));
    }

    #[test]
    fn take_all_empties_the_registry() {
        let registry = PipeNameRegistry::new();
        registry.register("widgets", id(1));
        registry.register("gadgets", id(2));

        let mut drained = registry.take_all();
        drained.sort();
        assert_eq!(
            drained,
            vec![
                ("gadgets".to_string(), vec![id(2)]),
                ("widgets".to_string(), vec![id(1)]),
            ]
        );
        assert!(registry.is_empty());
        assert!(registry.names().is_empty());
    }
}

//! Compute-once caches for compiled metadata, plus derive-time entity discovery.

use std::any::TypeId;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::{Lazy, OnceCell};

use crate::entity::{EntityDeclaration, EntityDetails, EntityMetadata};
use crate::errors::{MetadataError, MetadataResult};

/// Read-mostly cache that computes each value at most once per key.
///
/// The map lock is only held while the per-key cell is fetched or inserted; concurrent first
/// access to the same key blocks on that key's cell instead. Failed computations are not
/// stored, so the next caller retries.
pub struct OnceCache<K, V> {
    cells: RwLock<HashMap<K, Arc<OnceCell<Arc<V>>>>>,
}

impl<K, V> Default for OnceCache<K, V> {
    fn default() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> OnceCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<Arc<V>>> {
        if let Some(cell) = self.cells.read().unwrap_or_else(PoisonError::into_inner).get(key) {
            return Arc::clone(cell);
        }
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(key.clone()).or_default())
    }

    pub fn get_or_try_init<F>(&self, key: K, init: F) -> MetadataResult<Arc<V>>
    where
        F: FnOnce() -> MetadataResult<V>,
    {
        let cell = self.cell(&key);
        cell.get_or_try_init(|| init().map(Arc::new)).map(Arc::clone)
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of published values.
    pub fn len(&self) -> usize {
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        cells.values().filter(|cell| cell.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry of compiled entity metadata, keyed by Rust type or by declared name.
#[derive(Default)]
pub struct EntityRegistry {
    by_type: OnceCache<TypeId, String>,
    by_name: OnceCache<String, EntityDetails>,
}

static GLOBAL_REGISTRY: Lazy<EntityRegistry> = Lazy::new(EntityRegistry::new);

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by derived entities.
    pub fn global() -> &'static EntityRegistry {
        &GLOBAL_REGISTRY
    }

    /// Compiled metadata for a derived entity type.
    pub fn details<T: EntityMetadata>(&self) -> MetadataResult<Arc<EntityDetails>> {
        let name = self.by_type.get_or_try_init(TypeId::of::<T>(), || {
            let declaration = T::entity_declaration();
            self.register(&declaration)?;
            Ok(declaration.name)
        })?;
        self.lookup(&name).ok_or_else(|| {
            MetadataError::state(format!("entity {name} was registered but is not published"))
        })
    }

    /// Compiles and publishes a declaration under its entity name.
    pub fn register(&self, declaration: &EntityDeclaration) -> MetadataResult<Arc<EntityDetails>> {
        self.by_name
            .get_or_try_init(declaration.name.clone(), || EntityDetails::from_declaration(declaration))
    }

    /// Previously registered metadata by entity name.
    pub fn lookup(&self, name: &str) -> Option<Arc<EntityDetails>> {
        self.by_name.get(&name.to_string())
    }

    /// Compiles every entity discovered through `#[derive(Entity)]`.
    pub fn register_discovered(&self) -> MetadataResult<Vec<Arc<EntityDetails>>> {
        registered_entities()
            .map(|registration| self.register(&(registration.declaration_fn)()))
            .collect()
    }
}

/// Submitted to `inventory` by `#[derive(Entity)]`.
pub struct EntityRegistration {
    pub type_id: fn() -> TypeId,
    pub type_name: &'static str,
    pub declaration_fn: fn() -> EntityDeclaration,
}

inventory::collect!(EntityRegistration);

pub fn registered_entities() -> impl Iterator<Item = &'static EntityRegistration> {
    inventory::iter::<EntityRegistration>()
}

pub fn get_entity_by_name(type_name: &str) -> Option<&'static EntityRegistration> {
    registered_entities().find(|entity| entity.type_name == type_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::FieldDeclaration;
    use crate::types::ValueType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn computes_each_key_once_under_contention() {
        let cache: Arc<OnceCache<&'static str, usize>> = Arc::new(OnceCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache
                        .get_or_try_init("employee", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(42)
                        })
                        .expect("init")
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(*handle.join().expect("thread"), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache: OnceCache<u8, u8> = OnceCache::new();
        assert!(cache.get_or_try_init(1, || Err(MetadataError::state("boom"))).is_err());
        assert!(cache.get(&1).is_none());
        assert_eq!(*cache.get_or_try_init(1, || Ok(7)).expect("retry"), 7);
    }

    #[test]
    fn registry_returns_shared_instance() {
        let registry = EntityRegistry::new();
        let declaration = EntityDeclaration::new("Tag").field(FieldDeclaration::new("label", ValueType::Text));

        let first = registry.register(&declaration).expect("register");
        let second = registry.register(&declaration).expect("register again");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.lookup("Tag").is_some());
        assert!(registry.lookup("Missing").is_none());
    }
}

//! Read/write front end over a store, an environment provider, and the
//! property codec.
//!
//! [`AtomsDataset`] is what a training loop consumes: `len()` and
//! `get_item(id)` on the read side, `add_systems` on the write side. Each
//! item combines the decoded geometry, the neighbor data computed by the
//! configured [`EnvironmentProvider`], and the decoded reference
//! properties.
//!
//! Geometry and neighbor data live in fixed fields of [`AtomsItem`] rather
//! than in the property map, so user property names can never collide with
//! them; the conventional underscore-prefixed key strings are still
//! exported in [`keys`] for consumers that want one uniform key/array view
//! via [`AtomsItem::tensor`].

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use thiserror::Error;

use crate::environment::{Environment, EnvironmentProvider, GeometryError};
use crate::model::property::{PropertyData, PropertyValue};
use crate::model::structure::Structure;
use crate::store::{AtomsStore, PropertyMap, StoreError};

/// Reserved key names for geometry and neighbor tensors.
///
/// These keys are never user-settable: the store rejects any appended
/// property whose name is not in its available set, and the available set
/// describes user properties only.
pub mod keys {
    pub const ATOMIC_NUMBERS: &str = "_atomic_numbers";
    pub const POSITIONS: &str = "_positions";
    pub const CELL: &str = "_cell";
    pub const INDEX: &str = "_idx";
    pub const NEIGHBORS: &str = "_neighbors";
    pub const CELL_OFFSET: &str = "_cell_offset";

    pub(super) const ALL: [&str; 6] = [
        ATOMIC_NUMBERS,
        POSITIONS,
        CELL,
        INDEX,
        NEIGHBORS,
        CELL_OFFSET,
    ];
}

/// Errors surfaced by dataset reads and writes.
///
/// Store and geometry failures pass through transparently, so callers can
/// match on the underlying kind unchanged.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Whether computed environments are cached across repeated reads of the
/// same record id.
///
/// Records are immutable once written, so a cached environment can never go
/// stale; the policy only trades memory for neighbor-list recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Recompute on every read.
    #[default]
    None,
    /// Keep up to this many environments, evicting the oldest.
    Bounded(usize),
}

/// One fetched dataset item: geometry, neighbor data, and decoded
/// properties for a single record.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomsItem {
    pub index: usize,
    pub structure: Structure,
    pub environment: Environment,
    pub properties: PropertyMap,
}

impl AtomsItem {
    /// Looks up a decoded user property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Uniform key/array view over geometry, neighbor data, and user
    /// properties.
    ///
    /// Reserved [`keys`] materialize the corresponding geometry tensor
    /// (positions of an `n`-atom structure have shape `[n, 3]`, a missing
    /// cell materializes as a zero `[3, 3]` matrix); any other key is
    /// looked up among the user properties.
    pub fn tensor(&self, key: &str) -> Option<PropertyValue> {
        let n = self.structure.atom_count();
        let max = self.environment.max_neighbors();
        match key {
            keys::ATOMIC_NUMBERS => Some(PropertyValue::from_parts(
                vec![n],
                PropertyData::I32(self.structure.species.clone()),
            )),
            keys::POSITIONS => Some(PropertyValue::from_parts(
                vec![n, 3],
                PropertyData::F32(
                    self.structure
                        .positions
                        .iter()
                        .flatten()
                        .map(|&c| c as f32)
                        .collect(),
                ),
            )),
            keys::CELL => {
                let cell = self.structure.cell.unwrap_or([[0.0; 3]; 3]);
                Some(PropertyValue::from_parts(
                    vec![3, 3],
                    PropertyData::F32(cell.iter().flatten().map(|&c| c as f32).collect()),
                ))
            }
            keys::INDEX => Some(PropertyValue::from_parts(
                vec![1],
                PropertyData::I32(vec![self.index as i32]),
            )),
            keys::NEIGHBORS => Some(PropertyValue::from_parts(
                vec![n, max],
                PropertyData::I32(
                    self.environment
                        .flat_neighbors()
                        .iter()
                        .map(|&j| j as i32)
                        .collect(),
                ),
            )),
            keys::CELL_OFFSET => Some(PropertyValue::from_parts(
                vec![n, max, 3],
                PropertyData::I32(
                    self.environment
                        .flat_offsets()
                        .iter()
                        .flatten()
                        .copied()
                        .collect(),
                ),
            )),
            _ => self.properties.get(key).cloned(),
        }
    }
}

#[derive(Debug)]
struct EnvironmentCache {
    capacity: usize,
    map: HashMap<usize, Environment>,
    order: VecDeque<usize>,
}

impl EnvironmentCache {
    fn new(policy: CachePolicy) -> Self {
        let capacity = match policy {
            CachePolicy::None => 0,
            CachePolicy::Bounded(n) => n,
        };
        Self {
            capacity,
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, id: usize) -> Option<Environment> {
        self.map.get(&id).cloned()
    }

    fn insert(&mut self, id: usize, environment: Environment) {
        if self.capacity == 0 || self.map.contains_key(&id) {
            return;
        }
        if self.map.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
        self.order.push_back(id);
        self.map.insert(id, environment);
    }
}

/// Dataset accessor combining an [`AtomsStore`] with a neighbor-list
/// strategy.
pub struct AtomsDataset {
    store: AtomsStore,
    provider: Box<dyn EnvironmentProvider>,
    cache: Mutex<EnvironmentCache>,
}

impl std::fmt::Debug for AtomsDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomsDataset")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AtomsDataset {
    /// Wraps a store with the given neighbor-list strategy and no
    /// environment caching.
    pub fn new(store: AtomsStore, provider: impl EnvironmentProvider + 'static) -> Self {
        Self::with_cache(store, provider, CachePolicy::None)
    }

    /// Wraps a store with the given neighbor-list strategy and cache
    /// policy.
    pub fn with_cache(
        store: AtomsStore,
        provider: impl EnvironmentProvider + 'static,
        policy: CachePolicy,
    ) -> Self {
        Self {
            store,
            provider: Box::new(provider),
            cache: Mutex::new(EnvironmentCache::new(policy)),
        }
    }

    /// Number of records in the underlying store.
    #[inline]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// All keys a fetched item answers to: the reserved geometry and
    /// neighbor keys first, then the store's user properties.
    pub fn available_properties(&self) -> Vec<String> {
        keys::ALL
            .iter()
            .map(|&k| k.to_string())
            .chain(self.store.available_properties().iter().cloned())
            .collect()
    }

    /// Fetches the full item for a record: geometry, neighbor data, and
    /// decoded properties.
    ///
    /// The first store, codec, or geometry error is propagated unchanged in
    /// kind.
    pub fn get_item(&self, id: usize) -> Result<AtomsItem, DatasetError> {
        let record = self.store.get(id)?;

        let cached = self.cache.lock().ok().and_then(|cache| cache.get(id));
        let environment = match cached {
            Some(environment) => environment,
            None => {
                let environment = self.provider.environment(&record.structure)?;
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(id, environment.clone());
                }
                environment
            }
        };

        Ok(AtomsItem {
            index: id,
            structure: record.structure,
            environment,
            properties: record.properties,
        })
    }

    /// Fetches only the structure of a record: no property decoding beyond
    /// the record itself and no neighbor computation. The cheap path for
    /// visualization and export.
    pub fn get_structure(&self, id: usize) -> Result<Structure, DatasetError> {
        Ok(self.store.get(id)?.structure)
    }

    /// Ingests a batch of (structure, properties) pairs; returns the number
    /// of records appended. Delegates the atomic-batch guarantee to the
    /// store.
    pub fn add_systems(
        &mut self,
        structures: &[Structure],
        properties: &[PropertyMap],
    ) -> Result<usize, DatasetError> {
        Ok(self.store.append(structures, properties)?)
    }

    /// The underlying store.
    pub fn store(&self) -> &AtomsStore {
        &self.store
    }
}

//! A disk-backed store for atomistic machine-learning datasets, with fast
//! random-access reads and pluggable neighbor-list computation.
//!
//! Structures (species, positions, optional periodic cell) and their
//! reference properties (energies, forces, tensors) are persisted in an
//! append-only, index-addressable binary store; on read, each record is
//! combined with a freshly computed neighbor list so that iterative
//! training can fetch any record id in O(1).
//!
//! # Features
//!
//! - **Compact binary records** — property arrays travel with explicit
//!   shape and dtype metadata and round-trip exactly
//! - **Append-only store** — records are immutable once written; batches
//!   append atomically and ids stay dense
//! - **Neighbor lists** — exhaustive all-pairs or cutoff-pruned search,
//!   with minimum-image-complete shell enumeration under periodic
//!   boundary conditions
//! - **One read API** — [`AtomsDataset`] merges geometry, neighbor data,
//!   and decoded properties into a single typed item per record
//!
//! # Quick Start
//!
//! ```
//! use atomstore::{AtomsDataset, AtomsStore, CutoffProvider, PropertyMap, PropertyValue, Structure};
//!
//! let dir = tempfile::tempdir()?;
//!
//! // A store that guarantees an "energy" property on every record.
//! let store = AtomsStore::create(dir.path().join("water.db"), ["energy"], false)?;
//!
//! // One water molecule with its reference energy.
//! let water = Structure::new(
//!     vec![8, 1, 1],
//!     vec![[0.0, 0.0, 0.0], [0.76, 0.59, 0.0], [-0.76, 0.59, 0.0]],
//! )?;
//! let mut properties = PropertyMap::new();
//! properties.insert("energy".into(), PropertyValue::scalar(-76.4));
//!
//! // Read through a 2 Å cutoff neighbor list.
//! let mut dataset = AtomsDataset::new(store, CutoffProvider::new(2.0)?);
//! dataset.add_systems(&[water], &[properties])?;
//! assert_eq!(dataset.len(), 1);
//!
//! let item = dataset.get_item(0)?;
//! assert_eq!(item.tensor("_positions").unwrap().shape(), &[3, 3]);
//! assert_eq!(item.tensor("energy").unwrap().shape(), &[1]);
//! // Every atom of the molecule sees the other two within 2 Å.
//! assert_eq!(item.environment.neighbor_count(0), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Module Organization
//!
//! - [`store`] — On-disk record store and the property codec
//! - [`environment`] — Neighbor-list strategies ([`AllPairsProvider`],
//!   [`CutoffProvider`])
//! - [`dataset`] — The combined read/write front end and the reserved key
//!   constants
//!
//! # Data Types
//!
//! - [`Structure`] — Atomic configuration with optional periodic cell
//! - [`PropertyValue`] — Shaped, typed reference-property array
//! - [`Record`] — Persisted (structure, properties) pair with its id
//! - [`Environment`] — Padded per-atom neighbor indices and cell offsets
//! - [`AtomsItem`] — Everything [`AtomsDataset::get_item`] returns for one
//!   record

mod model;

pub mod dataset;
pub mod environment;
pub mod store;

pub use model::property::{Dtype, PropertyValue, ShapeMismatchError};
pub use model::structure::{AtomCountMismatch, Structure};

pub use store::{AtomsStore, CodecError, PropertyMap, Record, StoreError};

pub use environment::{
    AllPairsProvider, CutoffProvider, Environment, EnvironmentProvider, GeometryError,
    PAD_NEIGHBOR,
};

pub use dataset::{keys, AtomsDataset, AtomsItem, CachePolicy, DatasetError};

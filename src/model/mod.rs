//! Core data structures shared by the store, the environment providers, and
//! the dataset accessor.
//!
//! - [`structure`] – Atomic configurations: species, positions, optional
//!   periodic cell, per-axis periodicity flags.
//! - [`property`] – Shaped, typed reference-property arrays as they are
//!   persisted next to each structure.

pub mod property;
pub mod structure;

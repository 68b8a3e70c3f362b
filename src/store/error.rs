//! Error types for the record store and the property codec.

use thiserror::Error;

/// Errors raised while encoding or decoding a property array.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The buffer ends before its own metadata says it should.
    #[error("encoded buffer truncated: need at least {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    /// The dtype tag is not one this codec knows.
    #[error("unknown dtype code {0:#04x}")]
    UnknownDtype(u8),

    /// Payload byte length is not a whole number of elements.
    #[error("payload length {actual} is not a multiple of the element stride {stride}")]
    MisalignedPayload { actual: usize, stride: usize },

    /// Declared shape and decoded element count disagree.
    #[error("declared shape {shape:?} implies {expected} elements but payload holds {actual}")]
    LengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

/// Errors that can occur while creating, opening, or operating on an
/// [`AtomsStore`](super::AtomsStore).
///
/// Validation failures on `append` (`UnknownProperty`, `MissingProperty`,
/// `LengthMismatch`, `InvalidStructure`, `Codec`) reject the whole batch
/// before any byte reaches disk, so the store length never changes on error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `create` target already holds a store and overwrite was not requested.
    #[error("a store already exists at '{path}'")]
    Exists { path: String },

    /// `open` target does not hold a store.
    #[error("no store found at '{path}'")]
    NotFound { path: String },

    /// The on-disk index or a record payload is unreadable or inconsistent.
    /// Fatal; the store performs no automatic repair.
    #[error("store is corrupt: {detail}")]
    Corrupt { detail: String },

    /// Record id outside `[0, len)`.
    #[error("record id {id} is out of range for a store of length {len}")]
    OutOfRange { id: usize, len: usize },

    /// An appended record carries a property name the store was not created
    /// with.
    #[error("unknown property '{name}' in record {record}: not in the store's available properties")]
    UnknownProperty { name: String, record: usize },

    /// An appended record is missing one of the store's required properties.
    #[error("required property '{name}' missing from record {record}")]
    MissingProperty { name: String, record: usize },

    /// `append` was called with unpaired structure and property sequences.
    #[error("{structures} structures cannot be paired with {properties} property mappings")]
    LengthMismatch {
        structures: usize,
        properties: usize,
    },

    /// A structure in the batch violates its own invariants.
    #[error("structure {record} is invalid: {source}")]
    InvalidStructure {
        record: usize,
        source: crate::model::structure::AtomCountMismatch,
    },

    /// A property failed to encode or decode.
    #[error("codec failure for property '{name}' of record {record}: {source}")]
    Codec {
        name: String,
        record: usize,
        source: CodecError,
    },

    #[error("I/O operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }

    pub(crate) fn codec(name: &str, record: usize, source: CodecError) -> Self {
        Self::Codec {
            name: name.to_string(),
            record,
            source,
        }
    }
}

//! Append-only, index-addressable record store for atomistic data.
//!
//! An [`AtomsStore`] maps a dense integer id to one [`Record`]: an atomic
//! [`Structure`] plus a mapping of named reference properties. Records are
//! immutable once written; the only mutation is appending new records, which
//! assigns ids sequentially from the current length.
//!
//! The set of available property names is fixed when the store is created
//! and enforced on every append: a batch carrying an unknown or missing
//! property name is rejected as a whole, before any byte reaches disk.
//!
//! A store supports many concurrent readers ([`get`](AtomsStore::get) takes
//! `&self` and opens the files per call), but appends follow a single-writer
//! discipline: callers that append from several threads or processes must
//! serialize externally.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub mod codec;
mod error;
mod format;

pub use error::{CodecError, StoreError};

use crate::model::property::PropertyValue;
use crate::model::structure::Structure;

/// Named property values of one record, keyed by property name.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// One persisted (structure, properties) pair with its assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: usize,
    pub structure: Structure,
    pub properties: PropertyMap,
}

/// Disk-backed store of atomic structures and their reference properties.
///
/// See the [module docs](self) for the on-disk layout and the concurrency
/// contract.
#[derive(Debug)]
pub struct AtomsStore {
    dir: PathBuf,
    available: BTreeSet<String>,
    len: usize,
    /// End of the indexed payload region in `records.dat`.
    data_len: u64,
}

impl AtomsStore {
    /// Initializes a new empty store at `path` (a directory).
    ///
    /// `available_properties` is the set of property names every appended
    /// record must carry; it cannot change for the lifetime of the store.
    /// Fails with [`StoreError::Exists`] if `path` already holds a store and
    /// `overwrite` is `false`.
    pub fn create<P, I, S>(path: P, available_properties: I, overwrite: bool) -> Result<Self, StoreError>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dir = path.as_ref().to_path_buf();
        if dir.join(format::META_FILE).exists() && !overwrite {
            return Err(StoreError::Exists {
                path: dir.display().to_string(),
            });
        }
        fs::create_dir_all(&dir)?;

        let available: BTreeSet<String> = available_properties.into_iter().map(Into::into).collect();
        let meta = format::StoreMeta {
            version: format::FORMAT_VERSION,
            available_properties: available.iter().cloned().collect(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| StoreError::corrupt(format!("failed to serialize store metadata: {e}")))?;
        fs::write(dir.join(format::META_FILE), meta_json)?;
        fs::write(dir.join(format::INDEX_FILE), format::file_header(format::INDEX_MAGIC))?;
        fs::write(dir.join(format::DATA_FILE), format::file_header(format::DATA_MAGIC))?;

        log::debug!(
            "created store at {} with available properties {:?}",
            dir.display(),
            available
        );
        Ok(Self {
            dir,
            available,
            len: 0,
            data_len: format::FILE_HEADER_LEN,
        })
    }

    /// Attaches to an existing store.
    ///
    /// Fails with [`StoreError::NotFound`] if `path` holds no store, or
    /// [`StoreError::Corrupt`] if the metadata or index cannot be read back
    /// consistently.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let dir = path.as_ref().to_path_buf();
        let meta_path = dir.join(format::META_FILE);
        if !meta_path.exists() {
            return Err(StoreError::NotFound {
                path: dir.display().to_string(),
            });
        }

        let meta_json = fs::read(meta_path)?;
        let meta: format::StoreMeta = serde_json::from_slice(&meta_json)
            .map_err(|e| StoreError::corrupt(format!("unreadable store metadata: {e}")))?;
        if meta.version != format::FORMAT_VERSION {
            return Err(StoreError::corrupt(format!(
                "unsupported store format version {} (supported: {})",
                meta.version,
                format::FORMAT_VERSION
            )));
        }

        let index = fs::read(dir.join(format::INDEX_FILE))?;
        format::check_file_header(&index, format::INDEX_MAGIC, "index file")?;
        let entry_bytes = &index[format::FILE_HEADER_LEN as usize..];
        if entry_bytes.len() as u64 % format::INDEX_ENTRY_LEN != 0 {
            return Err(StoreError::corrupt(
                "index file length is not a whole number of entries",
            ));
        }
        let len = entry_bytes.len() / format::INDEX_ENTRY_LEN as usize;

        let mut data = File::open(dir.join(format::DATA_FILE))?;
        let mut data_header = [0u8; format::FILE_HEADER_LEN as usize];
        data.read_exact(&mut data_header)
            .map_err(|_| StoreError::corrupt("data file is shorter than its header"))?;
        format::check_file_header(&data_header, format::DATA_MAGIC, "data file")?;
        let data_file_len = data.metadata()?.len();

        // Entries must tile the payload region contiguously.
        let mut end = format::FILE_HEADER_LEN;
        for entry in entry_bytes.chunks_exact(format::INDEX_ENTRY_LEN as usize) {
            let offset = u64::from_le_bytes([
                entry[0], entry[1], entry[2], entry[3], entry[4], entry[5], entry[6], entry[7],
            ]);
            let length = u64::from_le_bytes([
                entry[8], entry[9], entry[10], entry[11], entry[12], entry[13], entry[14], entry[15],
            ]);
            if offset != end || offset + length > data_file_len {
                return Err(StoreError::corrupt(
                    "index entries do not match the data file layout",
                ));
            }
            end = offset + length;
        }

        log::debug!("opened store at {} with {} records", dir.display(), len);
        Ok(Self {
            dir,
            available: meta.available_properties.into_iter().collect(),
            len,
            data_len: end,
        })
    }

    /// Number of records in the store.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The property names every record in this store carries. Fixed at
    /// creation time.
    #[inline]
    pub fn available_properties(&self) -> &BTreeSet<String> {
        &self.available
    }

    /// The store directory.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Appends a batch of records, assigning ids sequentially from the
    /// current length, and returns the number written.
    ///
    /// The batch is atomic: every structure and property mapping is
    /// validated and encoded in memory before any write, and a mid-write
    /// I/O failure rolls both files back to their pre-call lengths. On any
    /// error the observable store length is unchanged.
    pub fn append(
        &mut self,
        structures: &[Structure],
        properties: &[PropertyMap],
    ) -> Result<usize, StoreError> {
        if structures.len() != properties.len() {
            return Err(StoreError::LengthMismatch {
                structures: structures.len(),
                properties: properties.len(),
            });
        }
        for (i, props) in properties.iter().enumerate() {
            let id = self.len + i;
            for name in props.keys() {
                if !self.available.contains(name) {
                    return Err(StoreError::UnknownProperty {
                        name: name.clone(),
                        record: id,
                    });
                }
            }
            for name in &self.available {
                if !props.contains_key(name) {
                    return Err(StoreError::MissingProperty {
                        name: name.clone(),
                        record: id,
                    });
                }
            }
        }

        let mut blobs = Vec::with_capacity(structures.len());
        for (i, (structure, props)) in structures.iter().zip(properties).enumerate() {
            blobs.push(format::encode_record(self.len + i, structure, props)?);
        }

        let old_data_len = self.data_len;
        let old_index_len = format::FILE_HEADER_LEN + format::INDEX_ENTRY_LEN * self.len as u64;

        let mut entries = Vec::with_capacity(blobs.len() * format::INDEX_ENTRY_LEN as usize);
        let mut offset = old_data_len;
        for blob in &blobs {
            entries.extend_from_slice(&offset.to_le_bytes());
            entries.extend_from_slice(&(blob.len() as u64).to_le_bytes());
            offset += blob.len() as u64;
        }

        if let Err(e) = self.write_batch(&blobs, &entries, old_data_len, old_index_len) {
            // The index is the source of truth for length; restoring both
            // file lengths erases any partially written batch.
            let _ = truncate(&self.dir.join(format::DATA_FILE), old_data_len);
            let _ = truncate(&self.dir.join(format::INDEX_FILE), old_index_len);
            return Err(e.into());
        }

        self.len += blobs.len();
        self.data_len = offset;
        log::debug!(
            "appended {} records to store at {} (new length {})",
            blobs.len(),
            self.dir.display(),
            self.len
        );
        Ok(blobs.len())
    }

    /// Reads the record with the given id.
    ///
    /// Fails with [`StoreError::OutOfRange`] if `id` is not in `[0, len)`.
    pub fn get(&self, id: usize) -> Result<Record, StoreError> {
        if id >= self.len {
            return Err(StoreError::OutOfRange { id, len: self.len });
        }

        let mut index = File::open(self.dir.join(format::INDEX_FILE))?;
        index.seek(SeekFrom::Start(
            format::FILE_HEADER_LEN + id as u64 * format::INDEX_ENTRY_LEN,
        ))?;
        let mut entry = [0u8; format::INDEX_ENTRY_LEN as usize];
        read_exact_or_corrupt(&mut index, &mut entry, || {
            format!("index entry for record {id} is missing")
        })?;
        let offset = u64::from_le_bytes([
            entry[0], entry[1], entry[2], entry[3], entry[4], entry[5], entry[6], entry[7],
        ]);
        let length = u64::from_le_bytes([
            entry[8], entry[9], entry[10], entry[11], entry[12], entry[13], entry[14], entry[15],
        ]);

        let mut data = File::open(self.dir.join(format::DATA_FILE))?;
        data.seek(SeekFrom::Start(offset))?;
        let mut bytes = vec![0u8; length as usize];
        read_exact_or_corrupt(&mut data, &mut bytes, || {
            format!("payload of record {id} is missing from the data file")
        })?;

        let (structure, properties) = format::decode_record(id, &bytes)?;
        Ok(Record {
            id,
            structure,
            properties,
        })
    }

    /// Payloads first, index second: a crash in between leaves the indexed
    /// length unchanged.
    fn write_batch(
        &self,
        blobs: &[Vec<u8>],
        entries: &[u8],
        data_at: u64,
        index_at: u64,
    ) -> std::io::Result<()> {
        let mut data = OpenOptions::new()
            .write(true)
            .open(self.dir.join(format::DATA_FILE))?;
        data.set_len(data_at)?;
        data.seek(SeekFrom::Start(data_at))?;
        for blob in blobs {
            data.write_all(blob)?;
        }
        data.flush()?;

        let mut index = OpenOptions::new()
            .write(true)
            .open(self.dir.join(format::INDEX_FILE))?;
        index.set_len(index_at)?;
        index.seek(SeekFrom::Start(index_at))?;
        index.write_all(entries)?;
        index.flush()?;
        Ok(())
    }
}

fn truncate(path: &Path, len: u64) -> std::io::Result<()> {
    OpenOptions::new().write(true).open(path)?.set_len(len)
}

fn read_exact_or_corrupt(
    file: &mut File,
    buf: &mut [u8],
    detail: impl FnOnce() -> String,
) -> Result<(), StoreError> {
    file.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            StoreError::corrupt(detail())
        } else {
            StoreError::Io { source: e }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn methane() -> Structure {
        Structure::new(
            vec![6, 1, 1, 1, 1],
            vec![
                [0.0, 0.0, 0.0],
                [0.63, 0.63, 0.63],
                [-0.63, -0.63, 0.63],
                [-0.63, 0.63, -0.63],
                [0.63, -0.63, -0.63],
            ],
        )
        .unwrap()
    }

    fn energy_only(value: f32) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert("energy".into(), PropertyValue::scalar(value));
        props
    }

    #[test]
    fn append_then_read_back() {
        let dir = tempdir().unwrap();
        let mut store = AtomsStore::create(dir.path().join("db"), ["energy"], false).unwrap();

        let structures: Vec<_> = (0..4).map(|_| methane()).collect();
        let properties: Vec<_> = (0..4).map(|i| energy_only(-17.8 - i as f32)).collect();
        let written = store.append(&structures, &properties).unwrap();
        assert_eq!(written, 4);
        assert_eq!(store.len(), 4);

        for id in 0..4 {
            let record = store.get(id).unwrap();
            assert_eq!(record.id, id);
            assert_eq!(record.structure, structures[id]);
            assert_eq!(record.properties, properties[id]);
        }
    }

    #[test]
    fn sequential_ids_across_batches() {
        let dir = tempdir().unwrap();
        let mut store = AtomsStore::create(dir.path().join("db"), ["energy"], false).unwrap();
        store.append(&[methane()], &[energy_only(-17.8)]).unwrap();
        store.append(&[methane()], &[energy_only(-18.1)]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get(1).unwrap().properties["energy"],
            PropertyValue::scalar(-18.1)
        );
    }

    #[test]
    fn create_refuses_existing_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        AtomsStore::create(&path, ["energy"], false).unwrap();
        assert!(matches!(
            AtomsStore::create(&path, ["energy"], false).unwrap_err(),
            StoreError::Exists { .. }
        ));
        // Overwrite resets the store.
        let store = AtomsStore::create(&path, ["forces"], true).unwrap();
        assert_eq!(store.len(), 0);
        assert!(store.available_properties().contains("forces"));
    }

    #[test]
    fn open_missing_store() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            AtomsStore::open(dir.path().join("nothing")).unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[test]
    fn reopen_preserves_length_and_properties() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let mut store = AtomsStore::create(&path, ["energy"], false).unwrap();
            store
                .append(&[methane(), methane()], &[energy_only(-1.0), energy_only(-2.0)])
                .unwrap();
        }
        let store = AtomsStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.available_properties().iter().collect::<Vec<_>>(),
            vec!["energy"]
        );
        assert_eq!(
            store.get(0).unwrap().properties["energy"],
            PropertyValue::scalar(-1.0)
        );
    }

    #[test]
    fn open_rejects_damaged_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let mut store = AtomsStore::create(&path, ["energy"], false).unwrap();
            store.append(&[methane()], &[energy_only(-1.0)]).unwrap();
        }
        // Lop 3 bytes off the index: no longer a whole number of entries.
        let index_path = path.join("records.idx");
        let bytes = fs::read(&index_path).unwrap();
        fs::write(&index_path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(
            AtomsStore::open(&path).unwrap_err(),
            StoreError::Corrupt { .. }
        ));
    }

    #[test]
    fn get_out_of_range() {
        let dir = tempdir().unwrap();
        let mut store = AtomsStore::create(dir.path().join("db"), ["energy"], false).unwrap();
        store.append(&[methane()], &[energy_only(-1.0)]).unwrap();
        assert!(matches!(
            store.get(1).unwrap_err(),
            StoreError::OutOfRange { id: 1, len: 1 }
        ));
    }

    #[test]
    fn unknown_property_rejects_whole_batch() {
        let dir = tempdir().unwrap();
        let mut store = AtomsStore::create(dir.path().join("db"), ["energy"], false).unwrap();
        store.append(&[methane()], &[energy_only(-1.0)]).unwrap();

        let mut bad = energy_only(-2.0);
        bad.insert("dipole".into(), PropertyValue::vector(vec![0.0, 0.0, 0.1]));
        let err = store
            .append(&[methane(), methane()], &[energy_only(-3.0), bad])
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownProperty { ref name, record: 2 } if name == "dipole"));
        // Atomic batch: nothing from the failed call is visible.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_property_rejects_whole_batch() {
        let dir = tempdir().unwrap();
        let mut store =
            AtomsStore::create(dir.path().join("db"), ["energy", "forces"], false).unwrap();
        let err = store.append(&[methane()], &[energy_only(-1.0)]).unwrap_err();
        assert!(matches!(err, StoreError::MissingProperty { ref name, record: 0 } if name == "forces"));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn unpaired_batch_is_rejected() {
        let dir = tempdir().unwrap();
        let mut store = AtomsStore::create(dir.path().join("db"), ["energy"], false).unwrap();
        let err = store.append(&[methane(), methane()], &[energy_only(-1.0)]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::LengthMismatch {
                structures: 2,
                properties: 1
            }
        ));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn invalid_structure_rejects_whole_batch() {
        let dir = tempdir().unwrap();
        let mut store = AtomsStore::create(dir.path().join("db"), ["energy"], false).unwrap();
        let broken = Structure {
            species: vec![1],
            positions: vec![],
            cell: None,
            pbc: [false; 3],
        };
        let err = store
            .append(&[methane(), broken], &[energy_only(-1.0), energy_only(-2.0)])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidStructure { record: 1, .. }));
        assert_eq!(store.len(), 0);
    }
}

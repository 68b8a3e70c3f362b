//! On-disk layout of a store directory.
//!
//! A store is a directory holding three files:
//!
//! - `store.json` — format version plus the available property names,
//!   written once at creation time.
//! - `records.idx` — magic/version header followed by one fixed 16-byte
//!   entry per record (`u64` payload offset, `u64` payload length), giving
//!   O(1) random access.
//! - `records.dat` — magic/version header followed by concatenated record
//!   payloads. Appending only ever extends both files.
//!
//! Each record payload starts with a CRC32 of the remaining bytes; the
//! checksum is verified on every read and a mismatch surfaces as
//! [`StoreError::Corrupt`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::codec;
use super::error::StoreError;
use crate::model::property::PropertyValue;
use crate::model::structure::Structure;
use crate::store::PropertyMap;

pub(crate) const META_FILE: &str = "store.json";
pub(crate) const INDEX_FILE: &str = "records.idx";
pub(crate) const DATA_FILE: &str = "records.dat";

pub(crate) const INDEX_MAGIC: [u8; 4] = *b"AIDX";
pub(crate) const DATA_MAGIC: [u8; 4] = *b"ADAT";
pub(crate) const FORMAT_VERSION: u32 = 1;

/// Magic + version.
pub(crate) const FILE_HEADER_LEN: u64 = 8;
/// Offset (u64) + length (u64).
pub(crate) const INDEX_ENTRY_LEN: u64 = 16;

const FLAG_HAS_CELL: u8 = 0b0000_0001;
const FLAG_PBC_A: u8 = 0b0000_0010;
const FLAG_PBC_B: u8 = 0b0000_0100;
const FLAG_PBC_C: u8 = 0b0000_1000;

/// Store-wide metadata persisted once in `store.json`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoreMeta {
    pub version: u32,
    pub available_properties: Vec<String>,
}

pub(crate) fn file_header(magic: [u8; 4]) -> [u8; 8] {
    let mut header = [0u8; 8];
    header[..4].copy_from_slice(&magic);
    header[4..].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    header
}

pub(crate) fn check_file_header(bytes: &[u8], magic: [u8; 4], name: &str) -> Result<(), StoreError> {
    if bytes.len() < FILE_HEADER_LEN as usize {
        return Err(StoreError::corrupt(format!("{name} is shorter than its header")));
    }
    if bytes[..4] != magic {
        return Err(StoreError::corrupt(format!("{name} has a bad magic number")));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(StoreError::corrupt(format!(
            "{name} has unsupported format version {version} (supported: {FORMAT_VERSION})"
        )));
    }
    Ok(())
}

/// Encodes one record (structure + properties) as `crc32 ++ payload`.
///
/// Property names are walked in key order, so the encoding of a given
/// record is deterministic.
pub(crate) fn encode_record(
    id: usize,
    structure: &Structure,
    properties: &PropertyMap,
) -> Result<Vec<u8>, StoreError> {
    structure
        .validate()
        .map_err(|source| StoreError::InvalidStructure { record: id, source })?;

    let mut payload = Vec::new();
    payload.extend_from_slice(&(structure.atom_count() as u32).to_le_bytes());

    let mut flags = 0u8;
    if structure.cell.is_some() {
        flags |= FLAG_HAS_CELL;
    }
    for (bit, &periodic) in [FLAG_PBC_A, FLAG_PBC_B, FLAG_PBC_C].iter().zip(&structure.pbc) {
        if periodic {
            flags |= bit;
        }
    }
    payload.push(flags);

    for &z in &structure.species {
        payload.extend_from_slice(&z.to_le_bytes());
    }
    for position in &structure.positions {
        for coord in position {
            payload.extend_from_slice(&coord.to_le_bytes());
        }
    }
    if let Some(cell) = &structure.cell {
        for row in cell {
            for component in row {
                payload.extend_from_slice(&component.to_le_bytes());
            }
        }
    }

    payload.extend_from_slice(&(properties.len() as u16).to_le_bytes());
    for (name, value) in properties {
        let blob = codec::encode(value);
        payload.extend_from_slice(&(name.len() as u16).to_le_bytes());
        payload.extend_from_slice(name.as_bytes());
        payload.extend_from_slice(&(blob.len() as u32).to_le_bytes());
        payload.extend_from_slice(&blob);
    }

    let mut record = Vec::with_capacity(4 + payload.len());
    record.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    record.extend_from_slice(&payload);
    Ok(record)
}

/// Decodes one record payload, verifying its checksum first.
pub(crate) fn decode_record(
    id: usize,
    bytes: &[u8],
) -> Result<(Structure, PropertyMap), StoreError> {
    if bytes.len() < 4 {
        return Err(StoreError::corrupt(format!("record {id} is shorter than its checksum")));
    }
    let stored_crc = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let payload = &bytes[4..];
    if crc32fast::hash(payload) != stored_crc {
        return Err(StoreError::corrupt(format!("record {id} failed its checksum")));
    }

    let mut reader = Reader::new(id, payload);
    let atom_count = reader.u32()? as usize;
    let flags = reader.u8()?;

    let mut species = Vec::with_capacity(atom_count);
    for _ in 0..atom_count {
        species.push(reader.i32()?);
    }
    let mut positions = Vec::with_capacity(atom_count);
    for _ in 0..atom_count {
        positions.push([reader.f64()?, reader.f64()?, reader.f64()?]);
    }
    let cell = if flags & FLAG_HAS_CELL != 0 {
        let mut cell = [[0.0f64; 3]; 3];
        for row in &mut cell {
            for component in row.iter_mut() {
                *component = reader.f64()?;
            }
        }
        Some(cell)
    } else {
        None
    };
    let pbc = [
        flags & FLAG_PBC_A != 0,
        flags & FLAG_PBC_B != 0,
        flags & FLAG_PBC_C != 0,
    ];

    let property_count = reader.u16()? as usize;
    let mut properties: PropertyMap = BTreeMap::new();
    for _ in 0..property_count {
        let name_len = reader.u16()? as usize;
        let name = String::from_utf8(reader.take(name_len)?.to_vec())
            .map_err(|_| StoreError::corrupt(format!("record {id} holds a non-UTF-8 property name")))?;
        let blob_len = reader.u32()? as usize;
        let blob = reader.take(blob_len)?;
        let value: PropertyValue =
            codec::decode(blob).map_err(|source| StoreError::codec(&name, id, source))?;
        properties.insert(name, value);
    }

    let structure = Structure {
        species,
        positions,
        cell,
        pbc,
    };
    Ok((structure, properties))
}

/// Bounds-checked cursor over a record payload.
struct Reader<'a> {
    record: usize,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(record: usize, buf: &'a [u8]) -> Self {
        Self { record, buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], StoreError> {
        if self.pos + n > self.buf.len() {
            return Err(StoreError::corrupt(format!(
                "record {} payload truncated at byte {}",
                self.record, self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, StoreError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, StoreError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, StoreError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, StoreError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f64(&mut self) -> Result<f64, StoreError> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water() -> (Structure, PropertyMap) {
        let structure = Structure::with_cell(
            vec![8, 1, 1],
            vec![[0.0, 0.0, 0.0], [0.76, 0.59, 0.0], [-0.76, 0.59, 0.0]],
            [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]],
        )
        .unwrap();
        let mut properties: PropertyMap = BTreeMap::new();
        properties.insert("energy".into(), PropertyValue::scalar(-76.4));
        properties.insert(
            "forces".into(),
            PropertyValue::from_f32(vec![0.0; 9], vec![3, 3]).unwrap(),
        );
        (structure, properties)
    }

    #[test]
    fn record_round_trip() {
        let (structure, properties) = water();
        let bytes = encode_record(0, &structure, &properties).unwrap();
        let (decoded_structure, decoded_properties) = decode_record(0, &bytes).unwrap();
        assert_eq!(decoded_structure, structure);
        assert_eq!(decoded_properties, properties);
    }

    #[test]
    fn record_round_trip_without_cell() {
        let structure = Structure::new(vec![1, 1], vec![[0.0; 3], [0.74, 0.0, 0.0]]).unwrap();
        let bytes = encode_record(3, &structure, &BTreeMap::new()).unwrap();
        let (decoded, properties) = decode_record(3, &bytes).unwrap();
        assert_eq!(decoded, structure);
        assert!(decoded.cell.is_none());
        assert_eq!(decoded.pbc, [false; 3]);
        assert!(properties.is_empty());
    }

    #[test]
    fn checksum_detects_corruption() {
        let (structure, properties) = water();
        let mut bytes = encode_record(0, &structure, &properties).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            decode_record(0, &bytes).unwrap_err(),
            StoreError::Corrupt { .. }
        ));
    }

    #[test]
    fn invalid_structure_is_rejected_before_encoding() {
        let broken = Structure {
            species: vec![1, 1],
            positions: vec![[0.0; 3]],
            cell: None,
            pbc: [false; 3],
        };
        assert!(matches!(
            encode_record(7, &broken, &BTreeMap::new()).unwrap_err(),
            StoreError::InvalidStructure { record: 7, .. }
        ));
    }
}

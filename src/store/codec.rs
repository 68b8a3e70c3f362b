//! Binary codec for property arrays.
//!
//! Layout: `[dtype: u8][rank: u8][dims: u32 × rank][payload]`, all
//! little-endian. The shape travels with the payload so that a decoded
//! scalar (shape `[1]`) stays distinguishable from any reshaping of the
//! same elements.

use super::error::CodecError;
use crate::model::property::{Dtype, PropertyData, PropertyValue};

const HEADER_LEN: usize = 2;

/// Serializes a property array to its compact binary form.
pub fn encode(value: &PropertyValue) -> Vec<u8> {
    let stride = value.dtype().stride();
    let mut bytes = Vec::with_capacity(HEADER_LEN + 4 * value.shape().len() + stride * value.len());
    bytes.push(value.dtype() as u8);
    bytes.push(value.shape().len() as u8);
    for &dim in value.shape() {
        bytes.extend_from_slice(&(dim as u32).to_le_bytes());
    }
    match value.data() {
        PropertyData::F32(values) => {
            for v in values {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        PropertyData::I32(values) => {
            for v in values {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    bytes
}

/// Deserializes a property array, restoring both elements and shape.
pub fn decode(bytes: &[u8]) -> Result<PropertyValue, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }
    let dtype = Dtype::from_code(bytes[0]).ok_or(CodecError::UnknownDtype(bytes[0]))?;
    let rank = bytes[1] as usize;

    let dims_end = HEADER_LEN + 4 * rank;
    if bytes.len() < dims_end {
        return Err(CodecError::Truncated {
            expected: dims_end,
            actual: bytes.len(),
        });
    }
    let mut shape = Vec::with_capacity(rank);
    for k in 0..rank {
        let at = HEADER_LEN + 4 * k;
        shape.push(u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize);
    }

    let payload = &bytes[dims_end..];
    let stride = dtype.stride();
    if payload.len() % stride != 0 {
        return Err(CodecError::MisalignedPayload {
            actual: payload.len(),
            stride,
        });
    }
    let actual = payload.len() / stride;
    let expected: usize = shape.iter().product();
    if actual != expected {
        return Err(CodecError::LengthMismatch {
            shape,
            expected,
            actual,
        });
    }

    let data = match dtype {
        Dtype::F32 => PropertyData::F32(
            payload
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        Dtype::I32 => PropertyData::I32(
            payload
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
    };
    Ok(PropertyValue::from_parts(shape, data))
}

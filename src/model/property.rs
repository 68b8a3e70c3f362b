use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shape {shape:?} implies {expected} elements, got {actual}")]
pub struct ShapeMismatchError {
    pub shape: Vec<usize>,
    pub expected: usize,
    pub actual: usize,
}

/// Element type of a stored property array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Dtype {
    F32 = 0,
    I32 = 1,
}

impl Dtype {
    /// Size of one element in bytes.
    #[inline]
    pub fn stride(self) -> usize {
        match self {
            Dtype::F32 | Dtype::I32 => 4,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Dtype::F32),
            1 => Some(Dtype::I32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PropertyData {
    F32(Vec<f32>),
    I32(Vec<i32>),
}

impl PropertyData {
    fn len(&self) -> usize {
        match self {
            PropertyData::F32(v) => v.len(),
            PropertyData::I32(v) => v.len(),
        }
    }
}

/// A named-property payload: a typed numeric array with an explicit shape.
///
/// Scalars are stored with shape `[1]`, never as bare numbers, so a decoded
/// scalar is distinguishable from a length-1 vector only by its declared
/// shape. The element count must always equal the product of the shape.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyValue {
    shape: Vec<usize>,
    data: PropertyData,
}

impl PropertyValue {
    /// A scalar property (shape `[1]`).
    pub fn scalar(value: f32) -> Self {
        Self {
            shape: vec![1],
            data: PropertyData::F32(vec![value]),
        }
    }

    /// A flat vector property (shape `[len]`).
    pub fn vector(values: Vec<f32>) -> Self {
        Self {
            shape: vec![values.len()],
            data: PropertyData::F32(values),
        }
    }

    /// A shaped `f32` array; fails if the shape does not account for every
    /// element.
    pub fn from_f32(values: Vec<f32>, shape: Vec<usize>) -> Result<Self, ShapeMismatchError> {
        check_shape(&shape, values.len())?;
        Ok(Self {
            shape,
            data: PropertyData::F32(values),
        })
    }

    /// A shaped `i32` array; fails if the shape does not account for every
    /// element.
    pub fn from_i32(values: Vec<i32>, shape: Vec<usize>) -> Result<Self, ShapeMismatchError> {
        check_shape(&shape, values.len())?;
        Ok(Self {
            shape,
            data: PropertyData::I32(values),
        })
    }

    /// Internal constructor for callers that have already established the
    /// shape/count invariant (codec decode, tensor views).
    pub(crate) fn from_parts(shape: Vec<usize>, data: PropertyData) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn dtype(&self) -> Dtype {
        match self.data {
            PropertyData::F32(_) => Dtype::F32,
            PropertyData::I32(_) => Dtype::I32,
        }
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            PropertyData::F32(v) => Some(v),
            PropertyData::I32(_) => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match &self.data {
            PropertyData::I32(v) => Some(v),
            PropertyData::F32(_) => None,
        }
    }

    pub(crate) fn data(&self) -> &PropertyData {
        &self.data
    }
}

fn check_shape(shape: &[usize], actual: usize) -> Result<(), ShapeMismatchError> {
    let expected: usize = shape.iter().product();
    if expected != actual {
        return Err(ShapeMismatchError {
            shape: shape.to_vec(),
            expected,
            actual,
        });
    }
    Ok(())
}

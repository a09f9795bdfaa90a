//! Columnar batch containers.
//!
//! A [`TupleBatch`] holds up to a configured number of rows as a group of
//! per-column [`Vector`]s plus a selection bitmap. Operators append whole
//! rows and mask rows out by clearing their selection bit; batches are
//! never compacted in place.

use std::sync::Arc;

use crate::catalog::LogicalType;
use crate::encoding::{Decode, Encode, EncodingError};
use crate::exec::ExecError;

// ------------------------------------------------------------------------------------------------
// Field
// ------------------------------------------------------------------------------------------------

/// One scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int(i64),
    Float(f64),
    Str(Arc<str>),
}

impl Field {
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Arc::from(s.as_ref()))
    }

    pub fn ty(&self) -> LogicalType {
        match self {
            Self::Int(_) => LogicalType::Int,
            Self::Float(_) => LogicalType::Float,
            Self::Str(_) => LogicalType::String,
        }
    }

    pub fn as_int(&self) -> Result<i64, ExecError> {
        match self {
            Self::Int(v) => Ok(*v),
            other => Err(ExecError::Expression(format!(
                "expected integer, found {:?}",
                other.ty()
            ))),
        }
    }

    /// Numeric view; integers coerce to floats.
    pub fn as_f64(&self) -> Result<f64, ExecError> {
        match self {
            Self::Int(v) => Ok(*v as f64),
            Self::Float(v) => Ok(*v),
            Self::Str(_) => Err(ExecError::Expression(
                "expected number, found string".into(),
            )),
        }
    }

    pub fn as_str(&self) -> Result<&str, ExecError> {
        match self {
            Self::Str(s) => Ok(s),
            other => Err(ExecError::Expression(format!(
                "expected string, found {:?}",
                other.ty()
            ))),
        }
    }

    /// Default value of a type, used to pre-fill constant vectors.
    pub fn zero_of(ty: LogicalType) -> Self {
        match ty {
            LogicalType::Int => Self::Int(0),
            LogicalType::Float => Self::Float(0.0),
            LogicalType::String => Self::Str(Arc::from("")),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Row codec — storage representation of tuples
// ------------------------------------------------------------------------------------------------

impl Encode for Field {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        match self {
            Self::Int(v) => v.encode_to(buf),
            Self::Float(v) => v.encode_to(buf),
            Self::Str(s) => s.to_string().encode_to(buf),
        }
    }
}

/// Encodes one row in column order.
pub fn encode_row(row: &[Field]) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    for field in row {
        field.encode_to(&mut buf)?;
    }
    Ok(buf)
}

/// Decodes one row given its column types.
pub fn decode_row(bytes: &[u8], types: &[LogicalType]) -> Result<Vec<Field>, EncodingError> {
    let mut row = Vec::with_capacity(types.len());
    let mut off = 0;
    for ty in types {
        match ty {
            LogicalType::Int => {
                let (v, n) = i64::decode_from(&bytes[off..])?;
                off += n;
                row.push(Field::Int(v));
            }
            LogicalType::Float => {
                let (v, n) = f64::decode_from(&bytes[off..])?;
                off += n;
                row.push(Field::Float(v));
            }
            LogicalType::String => {
                let (v, n) = String::decode_from(&bytes[off..])?;
                off += n;
                row.push(Field::Str(Arc::from(v.as_str())));
            }
        }
    }
    Ok(row)
}

/// Encodes a primary-key field in its natural key form: 8-byte
/// little-endian for numbers, raw bytes for strings.
pub fn encode_key(field: &Field) -> Vec<u8> {
    match field {
        Field::Int(v) => v.to_le_bytes().to_vec(),
        Field::Float(v) => v.to_le_bytes().to_vec(),
        Field::Str(s) => s.as_bytes().to_vec(),
    }
}

// ------------------------------------------------------------------------------------------------
// Vector
// ------------------------------------------------------------------------------------------------

/// One column of values, either flat (one value per row) or constant
/// (one value broadcast over the batch).
#[derive(Debug, Clone)]
pub struct Vector {
    ty: LogicalType,
    constant: bool,
    data: Vec<Field>,
    len: usize,
}

impl Vector {
    /// Empty flat vector.
    pub fn flat(ty: LogicalType, capacity: usize) -> Self {
        Self {
            ty,
            constant: false,
            data: Vec::with_capacity(capacity),
            len: 0,
        }
    }

    /// Flat vector over pre-computed values.
    pub fn from_values(ty: LogicalType, data: Vec<Field>) -> Self {
        let len = data.len();
        Self {
            ty,
            constant: false,
            data,
            len,
        }
    }

    /// Constant vector broadcasting `value` over `len` positions.
    pub fn constant(value: Field, len: usize) -> Self {
        Self {
            ty: value.ty(),
            constant: true,
            data: vec![value],
            len,
        }
    }

    pub fn ty(&self) -> LogicalType {
        self.ty
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, i: usize) -> &Field {
        if self.constant {
            &self.data[0]
        } else {
            &self.data[i]
        }
    }

    pub fn push(&mut self, value: Field) {
        debug_assert!(!self.constant);
        self.data.push(value);
        self.len += 1;
    }
}

// ------------------------------------------------------------------------------------------------
// TupleBatch
// ------------------------------------------------------------------------------------------------

/// A column-oriented group of rows with a selection bitmap.
#[derive(Debug, Clone, Default)]
pub struct TupleBatch {
    cols: Vec<Vector>,
    sel: Vec<bool>,
    size: usize,
    capacity: usize,
}

impl TupleBatch {
    /// Allocates an empty batch for the given column types.
    pub fn init(types: &[LogicalType], capacity: usize) -> Self {
        Self {
            cols: types.iter().map(|ty| Vector::flat(*ty, capacity)).collect(),
            sel: Vec::with_capacity(capacity),
            size: 0,
            capacity,
        }
    }

    /// Builds a batch from pre-computed columns, all rows selected.
    pub fn from_columns(cols: Vec<Vector>) -> Self {
        let size = cols.first().map_or(0, Vector::len);
        Self {
            sel: vec![true; size],
            capacity: size,
            cols,
            size,
        }
    }

    /// Number of rows, selected or not.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cols(&self) -> &[Vector] {
        &self.cols
    }

    /// Appends one logical row, selected.
    pub fn append(&mut self, row: &[Field]) {
        debug_assert_eq!(row.len(), self.cols.len());
        for (col, field) in self.cols.iter_mut().zip(row) {
            col.push(field.clone());
        }
        self.sel.push(true);
        self.size += 1;
    }

    pub fn is_valid(&self, i: usize) -> bool {
        self.sel[i]
    }

    pub fn set_valid(&mut self, i: usize, valid: bool) {
        self.sel[i] = valid;
    }

    /// Copies row `i` out as owned fields.
    pub fn row(&self, i: usize) -> Vec<Field> {
        self.cols.iter().map(|col| col.get(i).clone()).collect()
    }

    /// Number of selected rows.
    pub fn selected_count(&self) -> usize {
        self.sel.iter().filter(|v| **v).count()
    }

    /// Indices of selected rows.
    pub fn selected_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.sel
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.then_some(i))
    }
}

//! Columnar Field Data
//!
//! `FieldData` is the in-memory columnar representation of one field of a
//! write buffer: all values for that field across the buffered rows. It is
//! what the insert codec consumes when turning a buffer into binlog blobs.
//!
//! ## Memory accounting
//! `memory_size` is the same estimate the write path uses for buffer
//! admission, so binlog descriptors report sizes consistent with what the
//! buffer manager accounted for.

use serde::{Deserialize, Serialize};

use crate::schema::DataType;

/// Values of one field across all rows of a buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Bool(Vec<bool>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    VarChar(Vec<String>),
    FloatVector { dim: usize, values: Vec<f32> },
}

impl FieldData {
    pub fn data_type(&self) -> DataType {
        match self {
            FieldData::Bool(_) => DataType::Bool,
            FieldData::Int64(_) => DataType::Int64,
            FieldData::Float(_) => DataType::Float,
            FieldData::Double(_) => DataType::Double,
            FieldData::VarChar(_) => DataType::VarChar,
            FieldData::FloatVector { .. } => DataType::FloatVector,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            FieldData::Bool(v) => v.len(),
            FieldData::Int64(v) => v.len(),
            FieldData::Float(v) => v.len(),
            FieldData::Double(v) => v.len(),
            FieldData::VarChar(v) => v.len(),
            FieldData::FloatVector { dim, values } => {
                if *dim == 0 {
                    0
                } else {
                    values.len() / dim
                }
            }
        }
    }

    /// Estimated in-memory size in bytes.
    pub fn memory_size(&self) -> usize {
        match self {
            FieldData::Bool(v) => v.len(),
            FieldData::Int64(v) => v.len() * 8,
            FieldData::Float(v) => v.len() * 4,
            FieldData::Double(v) => v.len() * 8,
            FieldData::VarChar(v) => v.iter().map(|s| s.len() + 8).sum(),
            FieldData::FloatVector { values, .. } => values.len() * 4,
        }
    }

    /// Primary-key view of this column, if its type can carry keys.
    pub fn primary_keys(&self) -> Option<Vec<PrimaryKey>> {
        match self {
            FieldData::Int64(v) => Some(v.iter().map(|pk| PrimaryKey::Int64(*pk)).collect()),
            FieldData::VarChar(v) => {
                Some(v.iter().map(|pk| PrimaryKey::VarChar(pk.clone())).collect())
            }
            _ => None,
        }
    }
}

/// A primary-key value. Only integer and string keys exist in the model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Int64(i64),
    VarChar(String),
}

impl PrimaryKey {
    pub fn data_type(&self) -> DataType {
        match self {
            PrimaryKey::Int64(_) => DataType::Int64,
            PrimaryKey::VarChar(_) => DataType::VarChar,
        }
    }

    /// Stable byte view used for Bloom filter membership.
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            PrimaryKey::Int64(v) => v.to_le_bytes().to_vec(),
            PrimaryKey::VarChar(v) => v.as_bytes().to_vec(),
        }
    }
}

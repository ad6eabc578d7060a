//! Collection Schemas
//!
//! A collection schema describes the typed columns of one collection. The
//! flush engine needs it for two things: encoding a write buffer into
//! per-field binlog blobs, and locating the primary-key column so it can
//! derive key statistics for each flushed segment.

use serde::{Deserialize, Serialize};

use crate::position::FieldId;

/// Scalar and vector column types supported by the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    Bool = 1,
    Int64 = 2,
    Float = 3,
    Double = 4,
    VarChar = 5,
    FloatVector = 6,
}

impl TryFrom<u8> for DataType {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DataType::Bool),
            2 => Ok(DataType::Int64),
            3 => Ok(DataType::Float),
            4 => Ok(DataType::Double),
            5 => Ok(DataType::VarChar),
            6 => Ok(DataType::FloatVector),
            _ => Err(crate::Error::InvalidDataType(value)),
        }
    }
}

/// One typed column of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub field_id: FieldId,
    pub name: String,
    pub data_type: DataType,
    pub is_primary_key: bool,

    /// Vector dimension; `None` for scalar fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dim: Option<usize>,
}

impl FieldSchema {
    pub fn scalar(field_id: FieldId, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            field_id,
            name: name.into(),
            data_type,
            is_primary_key: false,
            dim: None,
        }
    }

    pub fn primary_key(field_id: FieldId, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            field_id,
            name: name.into(),
            data_type,
            is_primary_key: true,
            dim: None,
        }
    }

    pub fn vector(field_id: FieldId, name: impl Into<String>, dim: usize) -> Self {
        Self {
            field_id,
            name: name.into(),
            data_type: DataType::FloatVector,
            is_primary_key: false,
            dim: Some(dim),
        }
    }
}

/// Schema of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// The primary-key column, if the schema declares one.
    pub fn primary_key_field(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.is_primary_key)
    }

    pub fn field(&self, field_id: FieldId) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.field_id == field_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_lookup() {
        let schema = CollectionSchema::new(
            "docs",
            vec![
                FieldSchema::primary_key(100, "id", DataType::Int64),
                FieldSchema::vector(101, "embedding", 8),
            ],
        );

        let pk = schema.primary_key_field().unwrap();
        assert_eq!(pk.field_id, 100);
        assert_eq!(pk.data_type, DataType::Int64);
    }

    #[test]
    fn test_no_primary_key() {
        let schema = CollectionSchema::new("docs", vec![FieldSchema::vector(101, "embedding", 8)]);
        assert!(schema.primary_key_field().is_none());
    }

    #[test]
    fn test_data_type_roundtrip() {
        for dt in [
            DataType::Bool,
            DataType::Int64,
            DataType::Float,
            DataType::Double,
            DataType::VarChar,
            DataType::FloatVector,
        ] {
            assert_eq!(DataType::try_from(dt as u8).unwrap(), dt);
        }
        assert!(DataType::try_from(0).is_err());
    }
}

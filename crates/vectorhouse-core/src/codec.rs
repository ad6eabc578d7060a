//! Binlog Codecs
//!
//! Encoders that turn write buffers into binlog blobs ready for the object
//! store, and the matching decoders.
//!
//! ## Blob framing
//!
//! Every binary blob shares one frame:
//!
//! ```text
//! [magic "VHBL"(4)] [version(1)] [kind(1)] [header] [payload] [crc32(4)]
//! ```
//!
//! The CRC32 covers everything between the magic and the checksum itself,
//! so a flipped bit anywhere in the header or payload is detected on read.
//! Integers are little-endian; length prefixes are varints.
//!
//! ## Blob kinds
//!
//! - **Insert blobs** (one per field): columnar values of a single field.
//! - **Delta blobs**: `(primary key, timestamp)` deletion pairs.
//! - **Stats blobs**: JSON-encoded [`PrimaryKeyStats`], either a single
//!   record (unflushed sync) or the compound list form (flushed segment).
//!   Stats blobs are self-describing JSON and skip the binary frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::binlog::Blob;
use crate::buffer::{BufferData, DeleteBuffer};
use crate::error::{Error, Result};
use crate::field_data::{FieldData, PrimaryKey};
use crate::position::{CollectionId, FieldId, PartitionId, SegmentId};
use crate::schema::{CollectionSchema, DataType};
use crate::stats::PrimaryKeyStats;
use crate::varint;

/// Magic bytes at the start of every binary binlog blob.
pub const BLOB_MAGIC: [u8; 4] = *b"VHBL";

/// Current blob format version.
pub const BLOB_VERSION: u8 = 1;

const KIND_INSERT: u8 = 1;
const KIND_DELETE: u8 = 2;

/// Synthetic blob key for delta blobs; field blobs use the field ID.
pub const DELTA_BLOB_KEY: &str = "delta";

/// Encodes insert buffers and primary-key stats for one collection.
pub struct InsertCodec {
    collection_id: CollectionId,
    schema: CollectionSchema,
}

impl InsertCodec {
    pub fn new(collection_id: CollectionId, schema: CollectionSchema) -> Self {
        Self {
            collection_id,
            schema,
        }
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// Serialize a buffer into one blob per populated field.
    ///
    /// Fields are emitted in schema order; a field missing from the buffer
    /// is skipped. Every present column must agree with the buffer's row
    /// count.
    pub fn serialize(
        &self,
        partition_id: PartitionId,
        segment_id: SegmentId,
        data: &BufferData,
    ) -> Result<Vec<Blob>> {
        let mut blobs = Vec::new();

        for field in &self.schema.fields {
            let Some(column) = data.fields.get(&field.field_id) else {
                continue;
            };

            if column.row_count() != data.size as usize {
                return Err(Error::RowCountMismatch {
                    field_id: field.field_id,
                    actual: column.row_count(),
                    expected: data.size as usize,
                });
            }

            let mut buf = BytesMut::new();
            buf.put_slice(&BLOB_MAGIC);
            buf.put_u8(BLOB_VERSION);
            buf.put_u8(KIND_INSERT);
            buf.put_i64_le(self.collection_id);
            buf.put_i64_le(partition_id);
            buf.put_i64_le(segment_id);
            buf.put_i64_le(field.field_id);
            buf.put_u8(column.data_type() as u8);
            varint::encode_u64(&mut buf, column.row_count() as u64);
            encode_column(&mut buf, column);
            seal(&mut buf);

            blobs.push(Blob::new(field.field_id.to_string(), buf.freeze()));
        }

        Ok(blobs)
    }

    /// Serialize the stats of one sync's worth of new rows.
    pub fn serialize_pk_stats(&self, stats: &PrimaryKeyStats) -> Result<Blob> {
        let value = stats.to_json()?;
        Ok(Blob::new(stats.field_id.to_string(), value))
    }

    /// Serialize the compound stats form: every historical stats record for
    /// the segment plus the current one, with the combined row count.
    pub fn serialize_pk_stats_list(
        &self,
        stats_list: &[PrimaryKeyStats],
        total_rows: i64,
    ) -> Result<Blob> {
        let field_id = stats_list
            .first()
            .map(|s| s.field_id)
            .or_else(|| self.schema.primary_key_field().map(|f| f.field_id))
            .ok_or(Error::MissingPrimaryKey)?;

        let compound = CompoundStats {
            stats: stats_list.to_vec(),
            row_num: total_rows,
        };
        Ok(Blob::new(field_id.to_string(), serde_json::to_vec(&compound)?))
    }

    /// Decode one insert blob back into its field column.
    pub fn deserialize_field(&self, data: &[u8]) -> Result<(FieldId, FieldData)> {
        let mut buf = open(data, KIND_INSERT)?;

        let _collection_id = buf.get_i64_le();
        let _partition_id = buf.get_i64_le();
        let _segment_id = buf.get_i64_le();
        let field_id = buf.get_i64_le();
        let data_type = DataType::try_from(buf.get_u8())?;
        let row_count = varint::decode_u64(&mut buf)? as usize;
        let column = decode_column(&mut buf, data_type, row_count)?;

        Ok((field_id, column))
    }
}

/// Compound stats-log payload for flushed segments.
#[derive(Serialize, Deserialize)]
pub struct CompoundStats {
    pub stats: Vec<PrimaryKeyStats>,
    pub row_num: i64,
}

impl CompoundStats {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Encodes deletion buffers into delta blobs.
#[derive(Default)]
pub struct DeleteCodec;

impl DeleteCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn serialize(
        &self,
        collection_id: CollectionId,
        partition_id: PartitionId,
        segment_id: SegmentId,
        data: &DeleteBuffer,
    ) -> Result<Blob> {
        if data.primary_keys.len() != data.timestamps.len() {
            return Err(Error::Encode(format!(
                "delete buffer has {} keys but {} timestamps",
                data.primary_keys.len(),
                data.timestamps.len()
            )));
        }

        let mut buf = BytesMut::new();
        buf.put_slice(&BLOB_MAGIC);
        buf.put_u8(BLOB_VERSION);
        buf.put_u8(KIND_DELETE);
        buf.put_i64_le(collection_id);
        buf.put_i64_le(partition_id);
        buf.put_i64_le(segment_id);
        varint::encode_u64(&mut buf, data.primary_keys.len() as u64);

        for (pk, ts) in data.primary_keys.iter().zip(&data.timestamps) {
            match pk {
                PrimaryKey::Int64(v) => {
                    buf.put_u8(DataType::Int64 as u8);
                    buf.put_i64_le(*v);
                }
                PrimaryKey::VarChar(v) => {
                    buf.put_u8(DataType::VarChar as u8);
                    varint::encode_u64(&mut buf, v.len() as u64);
                    buf.put_slice(v.as_bytes());
                }
            }
            buf.put_u64_le(*ts);
        }
        seal(&mut buf);

        Ok(Blob::new(DELTA_BLOB_KEY, buf.freeze()))
    }

    pub fn deserialize(&self, data: &[u8]) -> Result<DeleteBuffer> {
        let mut buf = open(data, KIND_DELETE)?;

        let _collection_id = buf.get_i64_le();
        let _partition_id = buf.get_i64_le();
        let _segment_id = buf.get_i64_le();
        let entries = varint::decode_u64(&mut buf)? as usize;

        let mut primary_keys = Vec::with_capacity(entries);
        let mut timestamps = Vec::with_capacity(entries);
        for _ in 0..entries {
            if buf.remaining() < 1 {
                return Err(Error::Truncated("delta entry".to_string()));
            }
            let pk = match DataType::try_from(buf.get_u8())? {
                DataType::Int64 => {
                    need(&buf, 8, "delta int key")?;
                    PrimaryKey::Int64(buf.get_i64_le())
                }
                DataType::VarChar => {
                    let len = varint::decode_u64(&mut buf)? as usize;
                    need(&buf, len, "delta string key")?;
                    let raw = buf.copy_to_bytes(len);
                    PrimaryKey::VarChar(
                        String::from_utf8(raw.to_vec())
                            .map_err(|e| Error::Encode(e.to_string()))?,
                    )
                }
                other => return Err(Error::InvalidDataType(other as u8)),
            };
            need(&buf, 8, "delta timestamp")?;
            primary_keys.push(pk);
            timestamps.push(buf.get_u64_le());
        }

        Ok(DeleteBuffer::new(primary_keys, timestamps))
    }
}

/// Append the CRC32 of everything after the magic.
fn seal(buf: &mut BytesMut) {
    let crc = crc32fast::hash(&buf[BLOB_MAGIC.len()..]);
    buf.put_u32_le(crc);
}

/// Validate magic, version, kind and CRC; return the body after the kind byte.
fn open(data: &[u8], expected_kind: u8) -> Result<Bytes> {
    if data.len() < BLOB_MAGIC.len() + 2 + 4 {
        return Err(Error::Truncated("blob frame".to_string()));
    }
    if data[..BLOB_MAGIC.len()] != BLOB_MAGIC {
        return Err(Error::InvalidMagic);
    }

    let crc_offset = data.len() - 4;
    let stored = u32::from_le_bytes([
        data[crc_offset],
        data[crc_offset + 1],
        data[crc_offset + 2],
        data[crc_offset + 3],
    ]);
    if crc32fast::hash(&data[BLOB_MAGIC.len()..crc_offset]) != stored {
        return Err(Error::CrcMismatch);
    }

    let version = data[BLOB_MAGIC.len()];
    if version != BLOB_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    let kind = data[BLOB_MAGIC.len() + 1];
    if kind != expected_kind {
        return Err(Error::Encode(format!("unexpected blob kind {kind}")));
    }

    Ok(Bytes::copy_from_slice(&data[BLOB_MAGIC.len() + 2..crc_offset]))
}

fn need(buf: &impl Buf, len: usize, what: &str) -> Result<()> {
    if buf.remaining() < len {
        return Err(Error::Truncated(what.to_string()));
    }
    Ok(())
}

fn encode_column(buf: &mut BytesMut, column: &FieldData) {
    match column {
        FieldData::Bool(values) => {
            for v in values {
                buf.put_u8(*v as u8);
            }
        }
        FieldData::Int64(values) => {
            for v in values {
                buf.put_i64_le(*v);
            }
        }
        FieldData::Float(values) => {
            for v in values {
                buf.put_f32_le(*v);
            }
        }
        FieldData::Double(values) => {
            for v in values {
                buf.put_f64_le(*v);
            }
        }
        FieldData::VarChar(values) => {
            for v in values {
                varint::encode_u64(buf, v.len() as u64);
                buf.put_slice(v.as_bytes());
            }
        }
        FieldData::FloatVector { dim, values } => {
            varint::encode_u64(buf, *dim as u64);
            for v in values {
                buf.put_f32_le(*v);
            }
        }
    }
}

fn decode_column(buf: &mut Bytes, data_type: DataType, row_count: usize) -> Result<FieldData> {
    match data_type {
        DataType::Bool => {
            need(buf, row_count, "bool column")?;
            Ok(FieldData::Bool(
                (0..row_count).map(|_| buf.get_u8() != 0).collect(),
            ))
        }
        DataType::Int64 => {
            need(buf, row_count * 8, "int64 column")?;
            Ok(FieldData::Int64(
                (0..row_count).map(|_| buf.get_i64_le()).collect(),
            ))
        }
        DataType::Float => {
            need(buf, row_count * 4, "float column")?;
            Ok(FieldData::Float(
                (0..row_count).map(|_| buf.get_f32_le()).collect(),
            ))
        }
        DataType::Double => {
            need(buf, row_count * 8, "double column")?;
            Ok(FieldData::Double(
                (0..row_count).map(|_| buf.get_f64_le()).collect(),
            ))
        }
        DataType::VarChar => {
            let mut values = Vec::with_capacity(row_count);
            for _ in 0..row_count {
                let len = varint::decode_u64(buf)? as usize;
                need(buf, len, "varchar value")?;
                let raw = buf.copy_to_bytes(len);
                values.push(
                    String::from_utf8(raw.to_vec()).map_err(|e| Error::Encode(e.to_string()))?,
                );
            }
            Ok(FieldData::VarChar(values))
        }
        DataType::FloatVector => {
            let dim = varint::decode_u64(buf)? as usize;
            need(buf, row_count * dim * 4, "vector column")?;
            let values = (0..row_count * dim).map(|_| buf.get_f32_le()).collect();
            Ok(FieldData::FloatVector { dim, values })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSchema;
    use std::collections::HashMap;

    fn test_schema() -> CollectionSchema {
        CollectionSchema::new(
            "docs",
            vec![
                FieldSchema::primary_key(100, "id", DataType::Int64),
                FieldSchema::vector(101, "embedding", 2),
            ],
        )
    }

    fn test_buffer() -> BufferData {
        let mut fields = HashMap::new();
        fields.insert(100, FieldData::Int64(vec![1, 2, 3]));
        fields.insert(
            101,
            FieldData::FloatVector {
                dim: 2,
                values: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            },
        );
        BufferData::new(fields, 3, 100, 300)
    }

    #[test]
    fn test_serialize_one_blob_per_field() {
        let codec = InsertCodec::new(1, test_schema());
        let blobs = codec.serialize(2, 3, &test_buffer()).unwrap();

        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].key, "100");
        assert_eq!(blobs[1].key, "101");
    }

    #[test]
    fn test_insert_blob_roundtrip() {
        let codec = InsertCodec::new(1, test_schema());
        let blobs = codec.serialize(2, 3, &test_buffer()).unwrap();

        let (field_id, column) = codec.deserialize_field(&blobs[0].value).unwrap();
        assert_eq!(field_id, 100);
        assert_eq!(column, FieldData::Int64(vec![1, 2, 3]));

        let (field_id, column) = codec.deserialize_field(&blobs[1].value).unwrap();
        assert_eq!(field_id, 101);
        assert_eq!(column.row_count(), 3);
    }

    #[test]
    fn test_row_count_mismatch_rejected() {
        let mut buffer = test_buffer();
        buffer.size = 4;
        let codec = InsertCodec::new(1, test_schema());

        let err = codec.serialize(2, 3, &buffer).unwrap_err();
        assert!(matches!(err, Error::RowCountMismatch { field_id: 100, .. }));
    }

    #[test]
    fn test_corrupted_blob_detected() {
        let codec = InsertCodec::new(1, test_schema());
        let blobs = codec.serialize(2, 3, &test_buffer()).unwrap();

        let mut corrupted = blobs[0].value.to_vec();
        let mid = corrupted.len() / 2;
        corrupted[mid] ^= 0xFF;

        assert!(matches!(
            codec.deserialize_field(&corrupted),
            Err(Error::CrcMismatch)
        ));
    }

    #[test]
    fn test_delete_blob_roundtrip() {
        let buf = DeleteBuffer::new(
            vec![PrimaryKey::Int64(7), PrimaryKey::VarChar("k".into())],
            vec![11, 22],
        );
        let codec = DeleteCodec::new();
        let blob = codec.serialize(1, 2, 3, &buf).unwrap();
        assert_eq!(blob.key, DELTA_BLOB_KEY);

        let restored = codec.deserialize(&blob.value).unwrap();
        assert_eq!(restored.primary_keys, buf.primary_keys);
        assert_eq!(restored.timestamps, buf.timestamps);
    }

    #[test]
    fn test_compound_stats_roundtrip() {
        let codec = InsertCodec::new(1, test_schema());
        let mut first = PrimaryKeyStats::new(100, DataType::Int64, 2);
        first.update(&PrimaryKey::Int64(1));
        let mut second = PrimaryKeyStats::new(100, DataType::Int64, 1);
        second.update(&PrimaryKey::Int64(9));

        let blob = codec
            .serialize_pk_stats_list(&[first, second], 3)
            .unwrap();
        assert_eq!(blob.key, "100");

        let compound = CompoundStats::from_json(&blob.value).unwrap();
        assert_eq!(compound.stats.len(), 2);
        assert_eq!(compound.row_num, 3);
    }
}

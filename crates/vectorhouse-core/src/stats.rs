//! Primary-Key Statistics
//!
//! Per-segment statistics over the primary-key column: min/max plus a Bloom
//! filter. Readers use them to skip segments that definitely do not contain
//! a key, so a wrong filter is worse than no filter.
//!
//! ## False positive rate
//! The filter is sized for the row count it is created with, targeting a
//! 0.1% false positive rate:
//! - `might_contain(key) == false` means the key is definitely absent
//! - `might_contain(key) == true` means the key might be present
//!
//! ## Serialized form
//! Stats persist as JSON stats-log blobs. The Bloom filter is carried as its
//! raw bitmap plus the parameters needed to reconstruct it (bit count, hash
//! count, SIP keys).

use bloomfilter::Bloom;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::field_data::{FieldData, PrimaryKey};
use crate::position::FieldId;
use crate::schema::DataType;

/// Target false positive rate for segment key filters.
const BLOOM_FALSE_POSITIVE_RATE: f64 = 0.001;

/// Min/max plus Bloom filter over a segment's primary-key column.
pub struct PrimaryKeyStats {
    pub field_id: FieldId,
    pub pk_type: DataType,
    pub row_num: i64,
    pub min: Option<PrimaryKey>,
    pub max: Option<PrimaryKey>,
    bloom: Bloom<[u8]>,
}

impl PrimaryKeyStats {
    /// Create empty stats sized for `row_num` expected keys.
    pub fn new(field_id: FieldId, pk_type: DataType, row_num: i64) -> Self {
        let expected = row_num.max(1) as usize;
        Self {
            field_id,
            pk_type,
            row_num,
            min: None,
            max: None,
            bloom: Bloom::new_for_fp_rate(expected, BLOOM_FALSE_POSITIVE_RATE),
        }
    }

    /// Fold one key into min/max and the Bloom filter.
    pub fn update(&mut self, pk: &PrimaryKey) {
        self.bloom.set(&pk.as_bytes());

        match &self.min {
            None => self.min = Some(pk.clone()),
            Some(min) if pk < min => self.min = Some(pk.clone()),
            _ => {}
        }
        match &self.max {
            None => self.max = Some(pk.clone()),
            Some(max) if pk > max => self.max = Some(pk.clone()),
            _ => {}
        }
    }

    /// Fold an entire primary-key column into the stats.
    ///
    /// Columns of non-key type are ignored; the schema guarantees the
    /// primary-key field is `Int64` or `VarChar`.
    pub fn update_by_column(&mut self, column: &FieldData) {
        if let Some(pks) = column.primary_keys() {
            for pk in &pks {
                self.update(pk);
            }
        }
    }

    pub fn might_contain(&self, pk: &PrimaryKey) -> bool {
        self.bloom.check(&pk.as_bytes())
    }
}

impl Clone for PrimaryKeyStats {
    fn clone(&self) -> Self {
        Self {
            field_id: self.field_id,
            pk_type: self.pk_type,
            row_num: self.row_num,
            min: self.min.clone(),
            max: self.max.clone(),
            bloom: Bloom::from_existing(
                &self.bloom.bitmap(),
                self.bloom.number_of_bits(),
                self.bloom.number_of_hash_functions(),
                self.bloom.sip_keys(),
            ),
        }
    }
}

impl std::fmt::Debug for PrimaryKeyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryKeyStats")
            .field("field_id", &self.field_id)
            .field("pk_type", &self.pk_type)
            .field("row_num", &self.row_num)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("bloom_bits", &self.bloom.number_of_bits())
            .finish()
    }
}

/// Wire form of [`PrimaryKeyStats`].
#[derive(Serialize, Deserialize)]
struct StatsRecord {
    field_id: FieldId,
    pk_type: DataType,
    row_num: i64,
    min: Option<PrimaryKey>,
    max: Option<PrimaryKey>,
    bloom: BloomRecord,
}

#[derive(Serialize, Deserialize)]
struct BloomRecord {
    bitmap: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
    sip_keys: [(u64, u64); 2],
}

impl Serialize for PrimaryKeyStats {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        StatsRecord {
            field_id: self.field_id,
            pk_type: self.pk_type,
            row_num: self.row_num,
            min: self.min.clone(),
            max: self.max.clone(),
            bloom: BloomRecord {
                bitmap: self.bloom.bitmap(),
                num_bits: self.bloom.number_of_bits(),
                num_hashes: self.bloom.number_of_hash_functions(),
                sip_keys: self.bloom.sip_keys(),
            },
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PrimaryKeyStats {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let record = StatsRecord::deserialize(deserializer)?;
        Ok(Self {
            field_id: record.field_id,
            pk_type: record.pk_type,
            row_num: record.row_num,
            min: record.min,
            max: record.max,
            bloom: Bloom::from_existing(
                &record.bloom.bitmap,
                record.bloom.num_bits,
                record.bloom.num_hashes,
                record.bloom.sip_keys,
            ),
        })
    }
}

impl PrimaryKeyStats {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_tracking() {
        let mut stats = PrimaryKeyStats::new(100, DataType::Int64, 3);
        for pk in [5, 1, 9] {
            stats.update(&PrimaryKey::Int64(pk));
        }
        assert_eq!(stats.min, Some(PrimaryKey::Int64(1)));
        assert_eq!(stats.max, Some(PrimaryKey::Int64(9)));
    }

    #[test]
    fn test_bloom_membership() {
        let mut stats = PrimaryKeyStats::new(100, DataType::Int64, 100);
        for pk in 0..100 {
            stats.update(&PrimaryKey::Int64(pk));
        }
        for pk in 0..100 {
            assert!(stats.might_contain(&PrimaryKey::Int64(pk)));
        }
    }

    #[test]
    fn test_update_by_column() {
        let mut stats = PrimaryKeyStats::new(100, DataType::Int64, 2);
        stats.update_by_column(&FieldData::Int64(vec![3, 7]));
        assert_eq!(stats.min, Some(PrimaryKey::Int64(3)));
        assert_eq!(stats.max, Some(PrimaryKey::Int64(7)));
        assert!(stats.might_contain(&PrimaryKey::Int64(3)));
    }

    #[test]
    fn test_json_roundtrip_preserves_membership() {
        let mut stats = PrimaryKeyStats::new(100, DataType::VarChar, 10);
        for key in ["alpha", "beta", "gamma"] {
            stats.update(&PrimaryKey::VarChar(key.to_string()));
        }

        let bytes = stats.to_json().unwrap();
        let restored = PrimaryKeyStats::from_json(&bytes).unwrap();

        assert_eq!(restored.field_id, 100);
        assert_eq!(restored.min, Some(PrimaryKey::VarChar("alpha".into())));
        assert_eq!(restored.max, Some(PrimaryKey::VarChar("gamma".into())));
        assert!(restored.might_contain(&PrimaryKey::VarChar("beta".into())));
    }
}

//! Content fingerprints of source record sets, used to detect rows that
//! changed since the last sync.

use recsync_types::record::{FieldValue, RecordBatch};
use sha2::{Digest, Sha256};

const UNIT_SEP: u8 = 0x1f;
const RECORD_SEP: u8 = 0x1e;

/// SHA-256 over the header and every cell, in order. Absent and empty
/// values hash differently.
#[must_use]
pub fn fingerprint(batch: &RecordBatch) -> String {
    let mut hasher = Sha256::new();
    for column in &batch.columns {
        hasher.update(column.as_bytes());
        hasher.update([UNIT_SEP]);
    }
    hasher.update([RECORD_SEP]);

    for record in &batch.records {
        for column in &batch.columns {
            match record.get(column) {
                FieldValue::Absent => hasher.update([0]),
                FieldValue::Text(s) => {
                    hasher.update([1]);
                    hasher.update(s.as_bytes());
                }
            }
            hasher.update([UNIT_SEP]);
        }
        hasher.update([RECORD_SEP]);
    }
    format!("{:x}", hasher.finalize())
}

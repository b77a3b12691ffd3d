#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use minka_protocol::Reader;
use uuid::Uuid;

use crate::catalog::{CatalogError, TopicCatalog, TopicMeta};

/// Where KRaft keeps the cluster metadata partition's first segment.
pub const CLUSTER_METADATA_LOG_PATH: &str =
    "/tmp/kraft-combined-logs/__cluster_metadata-0/00000000000000000000.log";

/// Record-batch layout: 8-byte base offset, 4-byte batch length, then the
/// rest of the batch header; records begin 61 bytes into the batch.
const BATCH_LENGTH_OFFSET: usize = 8;
const BATCH_PAYLOAD_OFFSET: usize = 12;
const BATCH_RECORDS_OFFSET: usize = 61;

const TOPIC_RECORD_TYPE: i8 = 2;
const PARTITION_RECORD_TYPE: i8 = 3;

/// Read the metadata log and rebuild the topic catalog from it. Zero
/// recovered topics is an error so the caller can fall back to the
/// properties file.
pub fn load_cluster_metadata(path: &Path) -> Result<TopicCatalog, CatalogError> {
    let data = fs::read(path).map_err(|err| CatalogError::io("read", path, err))?;
    let topics = decode_cluster_metadata(&data);
    if topics.is_empty() {
        return Err(CatalogError::NoTopics);
    }
    Ok(TopicCatalog::from_topics(topics))
}

/// Scan a record-batch log and collect TopicRecord names/UUIDs and
/// per-UUID PartitionRecord counts, merged into one map.
///
/// A batch_length that fails validation advances the scan by a single byte
/// so a file with leading garbage still yields the batches behind it.
pub fn decode_cluster_metadata(data: &[u8]) -> BTreeMap<String, TopicMeta> {
    let mut topics: BTreeMap<String, TopicMeta> = BTreeMap::new();
    let mut partition_counts: BTreeMap<Uuid, u32> = BTreeMap::new();

    let mut offset = 0_usize;
    while offset + 20 < data.len() {
        let mut length_bytes = [0_u8; 4];
        length_bytes
            .copy_from_slice(&data[offset + BATCH_LENGTH_OFFSET..offset + BATCH_PAYLOAD_OFFSET]);
        let batch_length = i32::from_be_bytes(length_bytes);
        let remaining = data.len() - offset - BATCH_PAYLOAD_OFFSET;
        if batch_length <= 0 || batch_length as usize > remaining {
            offset += 1;
            continue;
        }

        let batch_end = offset + BATCH_PAYLOAD_OFFSET + batch_length as usize;
        let records_start = offset + BATCH_RECORDS_OFFSET;
        if records_start < batch_end {
            decode_batch_records(
                &data[records_start..batch_end],
                &mut topics,
                &mut partition_counts,
            );
        }
        offset = batch_end;
    }

    let mut merged = BTreeMap::new();
    for (name, mut meta) in topics {
        match partition_counts.get(&meta.id) {
            Some(&count) if count > 0 => meta.partition_count = count,
            _ => {
                if meta.partition_count == 0 {
                    meta.partition_count = 1;
                }
            }
        }
        merged.insert(name, meta);
    }
    merged
}

/// Walk the records of one batch. Each record is a signed-varint length
/// followed by attributes, timestamp delta, offset delta, key, value, and
/// headers; the next record starts at record_start + record_length, so
/// headers never need decoding.
fn decode_batch_records(
    data: &[u8],
    topics: &mut BTreeMap<String, TopicMeta>,
    partition_counts: &mut BTreeMap<Uuid, u32>,
) {
    let mut reader = Reader::new(data);
    while reader.position() + 5 < data.len() {
        let record_length = reader.read_signed_varint();
        if record_length <= 0 {
            break;
        }
        let record_length = record_length as usize;
        let record_start = reader.position();
        let Some(record_end) = record_start.checked_add(record_length) else {
            break;
        };
        if record_end > data.len() {
            break;
        }

        let _attributes = reader.read_i8();
        let _timestamp_delta = reader.read_signed_varint();
        let _offset_delta = reader.read_signed_varint();
        let key_length = reader.read_signed_varint();
        if key_length > 0 && reader.can_read(key_length as usize) {
            reader.skip(key_length as usize);
        }
        let value_length = reader.read_signed_varint();
        if value_length > 0 && reader.can_read(value_length as usize) {
            let value = reader.peek_bytes(value_length as usize);
            if value.len() >= 2 {
                match value[1] as i8 {
                    TOPIC_RECORD_TYPE => apply_topic_record(value, topics),
                    PARTITION_RECORD_TYPE => apply_partition_record(value, partition_counts),
                    _ => {}
                }
            }
        }

        reader.seek(record_end);
    }
}

/// TopicRecord value: frame_version, record_type, tagged fields, compact
/// topic name, 16-byte topic UUID.
fn apply_topic_record(value: &[u8], topics: &mut BTreeMap<String, TopicMeta>) {
    if value.len() < 20 {
        return;
    }
    let mut reader = Reader::new(value);
    let _frame_version = reader.read_i8();
    let _record_type = reader.read_i8();
    reader.skip_tagged_fields();
    let name = reader.read_compact_string();
    if name.is_empty() {
        return;
    }
    if !reader.can_read(16) {
        return;
    }
    let topic_id = reader.read_uuid();
    topics.insert(
        name,
        TopicMeta {
            id: topic_id,
            partition_count: 0,
        },
    );
}

/// PartitionRecord value: the same three-field prelude, a partition id that
/// is only counted, then the owning topic's UUID.
fn apply_partition_record(value: &[u8], partition_counts: &mut BTreeMap<Uuid, u32>) {
    if value.len() < 20 {
        return;
    }
    let mut reader = Reader::new(value);
    let _frame_version = reader.read_i8();
    let _record_type = reader.read_i8();
    reader.skip_tagged_fields();
    if !reader.can_read(4) {
        return;
    }
    let _partition_id = reader.read_i32();
    if !reader.can_read(16) {
        return;
    }
    let topic_id = reader.read_uuid();
    *partition_counts.entry(topic_id).or_insert(0) += 1;
}

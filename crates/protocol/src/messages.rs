#![forbid(unsafe_code)]

use uuid::Uuid;

use crate::{
    write_compact_bytes, write_compact_i32_array, write_compact_nullable_string,
    write_compact_string, write_empty_tagged_fields, write_i16, write_i32, write_i64,
    write_i8, write_unsigned_varint, write_uuid, Reader,
};

pub const API_KEY_PRODUCE: i16 = 0;
pub const API_KEY_FETCH: i16 = 1;
pub const API_KEY_API_VERSIONS: i16 = 18;
pub const API_KEY_DESCRIBE_TOPIC_PARTITIONS: i16 = 75;

pub const API_VERSIONS_MIN_VERSION: i16 = 0;
pub const API_VERSIONS_MAX_VERSION: i16 = 4;
pub const PRODUCE_API_VERSION: i16 = 11;
pub const FETCH_API_VERSION: i16 = 16;
pub const DESCRIBE_TOPIC_PARTITIONS_API_VERSION: i16 = 0;

/// Null next_cursor marker in DescribeTopicPartitions responses.
const NULL_CURSOR: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersionRange {
    pub api_key: i16,
    pub min_version: i16,
    pub max_version: i16,
}

/// The advertised version ranges. The dispatcher accepts a narrower set:
/// only the single pinned version of Produce, Fetch, and
/// DescribeTopicPartitions is actually served.
pub const SUPPORTED_APIS: [ApiVersionRange; 4] = [
    ApiVersionRange {
        api_key: API_KEY_PRODUCE,
        min_version: 0,
        max_version: 11,
    },
    ApiVersionRange {
        api_key: API_KEY_FETCH,
        min_version: 0,
        max_version: 16,
    },
    ApiVersionRange {
        api_key: API_KEY_API_VERSIONS,
        min_version: API_VERSIONS_MIN_VERSION,
        max_version: API_VERSIONS_MAX_VERSION,
    },
    ApiVersionRange {
        api_key: API_KEY_DESCRIBE_TOPIC_PARTITIONS,
        min_version: 0,
        max_version: 0,
    },
];

// ── ApiVersions ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersionsResponse {
    pub error_code: i16,
    pub api_keys: Vec<ApiVersionRange>,
    pub throttle_time_ms: i32,
}

impl ApiVersionsResponse {
    pub fn supported() -> Self {
        Self {
            error_code: 0,
            api_keys: SUPPORTED_APIS.to_vec(),
            throttle_time_ms: 0,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_i16(&mut out, self.error_code);
        write_unsigned_varint(&mut out, self.api_keys.len() as u32 + 1);
        for api in &self.api_keys {
            write_i16(&mut out, api.api_key);
            write_i16(&mut out, api.min_version);
            write_i16(&mut out, api.max_version);
            write_empty_tagged_fields(&mut out);
        }
        write_i32(&mut out, self.throttle_time_ms);
        write_empty_tagged_fields(&mut out);
        out
    }
}

// ── DescribeTopicPartitions v0 ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescribeTopicPartitionsRequest {
    pub topics: Vec<String>,
    pub response_partition_limit: i32,
}

impl DescribeTopicPartitionsRequest {
    /// The body opens with a tagged-field buffer, then the topics array;
    /// the partition limit is kept, the cursor is ignored.
    pub fn decode(body: &[u8]) -> Self {
        let mut reader = Reader::new(body);
        reader.skip_tagged_fields();
        let count = i64::from(reader.read_unsigned_varint()) - 1;
        let mut topics = Vec::new();
        for _ in 0..count.max(0) {
            if reader.remaining() == 0 {
                break;
            }
            let name = reader.read_compact_string();
            reader.skip_tagged_fields();
            topics.push(name);
        }
        let response_partition_limit = reader.read_i32();
        Self {
            topics,
            response_partition_limit,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_empty_tagged_fields(&mut out);
        write_unsigned_varint(&mut out, self.topics.len() as u32 + 1);
        for name in &self.topics {
            write_compact_string(&mut out, name);
            write_empty_tagged_fields(&mut out);
        }
        write_i32(&mut out, self.response_partition_limit);
        out.push(NULL_CURSOR);
        write_empty_tagged_fields(&mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeTopicPartitionsResponse {
    pub throttle_time_ms: i32,
    pub topics: Vec<DescribeTopicPartitionsResponseTopic>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeTopicPartitionsResponseTopic {
    pub error_code: i16,
    pub name: String,
    pub topic_id: Uuid,
    pub is_internal: bool,
    pub partitions: Vec<DescribeTopicPartitionsResponsePartition>,
    pub authorized_operations: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeTopicPartitionsResponsePartition {
    pub error_code: i16,
    pub partition_index: i32,
    pub leader_id: i32,
    pub leader_epoch: i32,
    pub replica_nodes: Vec<i32>,
    pub isr_nodes: Vec<i32>,
}

impl DescribeTopicPartitionsResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_i32(&mut out, self.throttle_time_ms);
        write_unsigned_varint(&mut out, self.topics.len() as u32 + 1);
        for topic in &self.topics {
            write_i16(&mut out, topic.error_code);
            write_compact_string(&mut out, &topic.name);
            write_uuid(&mut out, &topic.topic_id);
            write_i8(&mut out, topic.is_internal as i8);
            write_unsigned_varint(&mut out, topic.partitions.len() as u32 + 1);
            for partition in &topic.partitions {
                write_i16(&mut out, partition.error_code);
                write_i32(&mut out, partition.partition_index);
                write_i32(&mut out, partition.leader_id);
                write_i32(&mut out, partition.leader_epoch);
                write_compact_i32_array(&mut out, &partition.replica_nodes);
                write_compact_i32_array(&mut out, &partition.isr_nodes);
                write_compact_i32_array(&mut out, &[]); // eligible_leader_replicas
                write_compact_i32_array(&mut out, &[]); // last_known_elr
                write_compact_i32_array(&mut out, &[]); // offline_replicas
                write_empty_tagged_fields(&mut out);
            }
            write_i32(&mut out, topic.authorized_operations);
            write_empty_tagged_fields(&mut out);
        }
        out.push(NULL_CURSOR);
        write_empty_tagged_fields(&mut out);
        out
    }
}

// ── Fetch v16 ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchRequest {
    pub cluster_id: Option<String>,
    pub replica_id: i32,
    pub max_wait_ms: i32,
    pub min_bytes: i32,
    pub max_bytes: i32,
    pub isolation_level: i8,
    pub session_id: i32,
    pub session_epoch: i32,
    pub topics: Vec<FetchRequestTopic>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequestTopic {
    pub topic_id: Uuid,
    pub partitions: Vec<FetchRequestPartition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchRequestPartition {
    pub partition: i32,
    pub current_leader_epoch: i32,
    pub fetch_offset: i64,
    pub last_fetched_epoch: i64,
    pub log_start_offset: i64,
    pub partition_max_bytes: i32,
}

impl FetchRequest {
    pub fn decode(body: &[u8]) -> Self {
        let mut reader = Reader::new(body);
        let cluster_id = reader.read_compact_nullable_string();
        let replica_id = reader.read_i32();
        let max_wait_ms = reader.read_i32();
        let min_bytes = reader.read_i32();
        let max_bytes = reader.read_i32();
        let isolation_level = reader.read_i8();
        let session_id = reader.read_i32();
        let session_epoch = reader.read_i32();

        let count = i64::from(reader.read_unsigned_varint()) - 1;
        let mut topics = Vec::new();
        for _ in 0..count.max(0) {
            if !reader.can_read(16) {
                break;
            }
            let topic_id = reader.read_uuid();
            let partition_count = i64::from(reader.read_unsigned_varint()) - 1;
            let mut partitions = Vec::new();
            for _ in 0..partition_count.max(0) {
                if reader.remaining() == 0 {
                    break;
                }
                let partition = FetchRequestPartition {
                    partition: reader.read_i32(),
                    current_leader_epoch: reader.read_i32(),
                    fetch_offset: reader.read_i64(),
                    last_fetched_epoch: reader.read_i64(),
                    log_start_offset: reader.read_i64(),
                    partition_max_bytes: reader.read_i32(),
                };
                reader.skip_tagged_fields();
                partitions.push(partition);
            }
            reader.skip_tagged_fields();
            topics.push(FetchRequestTopic {
                topic_id,
                partitions,
            });
        }

        Self {
            cluster_id,
            replica_id,
            max_wait_ms,
            min_bytes,
            max_bytes,
            isolation_level,
            session_id,
            session_epoch,
            topics,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_compact_nullable_string(&mut out, self.cluster_id.as_deref());
        write_i32(&mut out, self.replica_id);
        write_i32(&mut out, self.max_wait_ms);
        write_i32(&mut out, self.min_bytes);
        write_i32(&mut out, self.max_bytes);
        write_i8(&mut out, self.isolation_level);
        write_i32(&mut out, self.session_id);
        write_i32(&mut out, self.session_epoch);
        write_unsigned_varint(&mut out, self.topics.len() as u32 + 1);
        for topic in &self.topics {
            write_uuid(&mut out, &topic.topic_id);
            write_unsigned_varint(&mut out, topic.partitions.len() as u32 + 1);
            for partition in &topic.partitions {
                write_i32(&mut out, partition.partition);
                write_i32(&mut out, partition.current_leader_epoch);
                write_i64(&mut out, partition.fetch_offset);
                write_i64(&mut out, partition.last_fetched_epoch);
                write_i64(&mut out, partition.log_start_offset);
                write_i32(&mut out, partition.partition_max_bytes);
                write_empty_tagged_fields(&mut out);
            }
            write_empty_tagged_fields(&mut out);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub throttle_time_ms: i32,
    pub error_code: i16,
    pub session_id: i32,
    pub topics: Vec<FetchResponseTopic>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponseTopic {
    pub topic_id: Uuid,
    pub partitions: Vec<FetchResponsePartition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponsePartition {
    pub partition_index: i32,
    pub error_code: i16,
    pub high_watermark: i64,
    pub last_stable_offset: i64,
    pub log_start_offset: i64,
    pub preferred_read_replica: i32,
    pub records: Vec<u8>,
}

impl FetchResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_i32(&mut out, self.throttle_time_ms);
        write_i16(&mut out, self.error_code);
        write_i32(&mut out, self.session_id);
        write_unsigned_varint(&mut out, self.topics.len() as u32 + 1);
        for topic in &self.topics {
            write_uuid(&mut out, &topic.topic_id);
            write_unsigned_varint(&mut out, topic.partitions.len() as u32 + 1);
            for partition in &topic.partitions {
                write_i32(&mut out, partition.partition_index);
                write_i16(&mut out, partition.error_code);
                write_i64(&mut out, partition.high_watermark);
                write_i64(&mut out, partition.last_stable_offset);
                write_i64(&mut out, partition.log_start_offset);
                write_unsigned_varint(&mut out, 1); // aborted_transactions: always empty
                write_i32(&mut out, partition.preferred_read_replica);
                write_compact_bytes(&mut out, &partition.records);
                write_empty_tagged_fields(&mut out);
            }
            write_empty_tagged_fields(&mut out);
        }
        write_empty_tagged_fields(&mut out);
        out
    }
}

// ── Produce v11 ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProduceRequest {
    pub transactional_id: Option<String>,
    pub acks: i16,
    pub timeout_ms: i32,
    pub topics: Vec<ProduceRequestTopic>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceRequestTopic {
    pub name: String,
    pub partitions: Vec<ProduceRequestPartition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceRequestPartition {
    pub partition_index: i32,
    pub records: Vec<u8>,
}

impl ProduceRequest {
    pub fn decode(body: &[u8]) -> Self {
        let mut reader = Reader::new(body);
        let transactional_id = reader.read_compact_nullable_string();
        let acks = reader.read_i16();
        let timeout_ms = reader.read_i32();

        let count = i64::from(reader.read_unsigned_varint()) - 1;
        let mut topics = Vec::new();
        for _ in 0..count.max(0) {
            if reader.remaining() == 0 {
                break;
            }
            let name = reader.read_compact_string();
            let partition_count = i64::from(reader.read_unsigned_varint()) - 1;
            let mut partitions = Vec::new();
            for _ in 0..partition_count.max(0) {
                if reader.remaining() == 0 {
                    break;
                }
                let partition_index = reader.read_i32();
                let records = reader.read_compact_bytes();
                reader.skip_tagged_fields();
                partitions.push(ProduceRequestPartition {
                    partition_index,
                    records,
                });
            }
            reader.skip_tagged_fields();
            topics.push(ProduceRequestTopic { name, partitions });
        }

        Self {
            transactional_id,
            acks,
            timeout_ms,
            topics,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_compact_nullable_string(&mut out, self.transactional_id.as_deref());
        write_i16(&mut out, self.acks);
        write_i32(&mut out, self.timeout_ms);
        write_unsigned_varint(&mut out, self.topics.len() as u32 + 1);
        for topic in &self.topics {
            write_compact_string(&mut out, &topic.name);
            write_unsigned_varint(&mut out, topic.partitions.len() as u32 + 1);
            for partition in &topic.partitions {
                write_i32(&mut out, partition.partition_index);
                write_compact_bytes(&mut out, &partition.records);
                write_empty_tagged_fields(&mut out);
            }
            write_empty_tagged_fields(&mut out);
        }
        write_empty_tagged_fields(&mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponse {
    pub topics: Vec<ProduceResponseTopic>,
    pub throttle_time_ms: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponseTopic {
    pub name: String,
    pub partitions: Vec<ProduceResponsePartition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponsePartition {
    pub partition_index: i32,
    pub error_code: i16,
    pub base_offset: i64,
    pub log_append_time_ms: i64,
    pub log_start_offset: i64,
}

impl ProduceResponse {
    /// The topic array precedes throttle_time_ms in this body.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_unsigned_varint(&mut out, self.topics.len() as u32 + 1);
        for topic in &self.topics {
            write_compact_string(&mut out, &topic.name);
            write_unsigned_varint(&mut out, topic.partitions.len() as u32 + 1);
            for partition in &topic.partitions {
                write_i32(&mut out, partition.partition_index);
                write_i16(&mut out, partition.error_code);
                write_i64(&mut out, partition.base_offset);
                write_i64(&mut out, partition.log_append_time_ms);
                write_i64(&mut out, partition.log_start_offset);
                write_unsigned_varint(&mut out, 1); // record_errors: always empty
                write_compact_string(&mut out, ""); // error_message
                write_empty_tagged_fields(&mut out);
            }
            write_empty_tagged_fields(&mut out);
        }
        write_i32(&mut out, self.throttle_time_ms);
        write_empty_tagged_fields(&mut out);
        out
    }
}

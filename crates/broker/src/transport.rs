#![forbid(unsafe_code)]

use minka_protocol::messages::{
    ApiVersionsResponse, DescribeTopicPartitionsRequest, DescribeTopicPartitionsResponse,
    DescribeTopicPartitionsResponsePartition, DescribeTopicPartitionsResponseTopic, FetchRequest,
    FetchResponse, FetchResponsePartition, FetchResponseTopic, ProduceRequest, ProduceResponse,
    ProduceResponsePartition, ProduceResponseTopic, API_KEY_API_VERSIONS,
    API_KEY_DESCRIBE_TOPIC_PARTITIONS, API_KEY_FETCH, API_KEY_PRODUCE, API_VERSIONS_MAX_VERSION,
    API_VERSIONS_MIN_VERSION, DESCRIBE_TOPIC_PARTITIONS_API_VERSION, FETCH_API_VERSION,
    PRODUCE_API_VERSION,
};
use minka_protocol::{
    encode_response_frame, parse_request_header, write_i16, ProtocolError, RequestHeader,
    MAX_FRAME_SIZE, RESPONSE_HEADER_V0, RESPONSE_HEADER_V1,
};
use minka_storage::PartitionStore;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::TopicCatalog;

pub(crate) const ERROR_NONE: i16 = 0;
pub(crate) const ERROR_UNKNOWN_TOPIC_OR_PARTITION: i16 = 3;
pub(crate) const ERROR_UNSUPPORTED_VERSION: i16 = 35;
pub(crate) const ERROR_UNKNOWN_TOPIC_ID: i16 = 100;

/// Fixed partition placement advertised by this single-node broker.
const LEADER_ID: i32 = 1;
const LEADER_EPOCH_UNKNOWN: i32 = -1;
const REPLICA_NODES: [i32; 1] = [LEADER_ID];

/// INT32_MIN signals that authorized operations were not computed.
const AUTHORIZED_OPERATIONS_OMITTED: i32 = i32::MIN;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{operation} failed: {message}")]
    Io {
        operation: &'static str,
        message: String,
    },
    #[error("invalid frame size {0}")]
    InvalidFrameSize(i32),
    #[error("frame of {size} bytes exceeds the {max_size} byte limit")]
    FrameTooLarge { size: usize, max_size: usize },
    #[error(transparent)]
    Header(#[from] ProtocolError),
}

impl TransportError {
    pub(crate) fn io(operation: &'static str, err: std::io::Error) -> Self {
        Self::Io {
            operation,
            message: err.to_string(),
        }
    }
}

/// The stateless dispatch core: a read-only catalog plus the partition
/// store. `process_frame` is a pure function of the request bytes and the
/// catalog, so it can run on any connection task without synchronization.
#[derive(Debug)]
pub struct Broker {
    catalog: TopicCatalog,
    store: PartitionStore,
}

impl Broker {
    pub fn new(catalog: TopicCatalog, store: PartitionStore) -> Self {
        Self { catalog, store }
    }

    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    /// Inbound frame sizes must be strictly positive and at most 16 MiB;
    /// anything else is a framing error that closes the connection.
    pub fn validate_frame_size(frame_size: i32) -> Result<usize, TransportError> {
        if frame_size <= 0 {
            return Err(TransportError::InvalidFrameSize(frame_size));
        }
        let size = frame_size as usize;
        if size > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size,
                max_size: MAX_FRAME_SIZE,
            });
        }
        Ok(size)
    }

    /// Turn one request frame (header and body, the length prefix already
    /// stripped) into a complete response frame. Only header-level damage
    /// is an error; every handler-level problem becomes a Kafka error code
    /// in the response body.
    pub fn process_frame(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        let (header, body_offset) = parse_request_header(frame)?;
        let body = &frame[body_offset..];

        let response = match header.api_key {
            API_KEY_API_VERSIONS => self.handle_api_versions(&header),
            API_KEY_DESCRIBE_TOPIC_PARTITIONS => {
                if header.api_version != DESCRIBE_TOPIC_PARTITIONS_API_VERSION {
                    unsupported_version_frame(header.correlation_id, RESPONSE_HEADER_V1)
                } else {
                    self.handle_describe_topic_partitions(&header, body)
                }
            }
            API_KEY_FETCH => {
                if header.api_version != FETCH_API_VERSION {
                    unsupported_version_frame(header.correlation_id, RESPONSE_HEADER_V1)
                } else {
                    self.handle_fetch(&header, body)
                }
            }
            API_KEY_PRODUCE => {
                if header.api_version != PRODUCE_API_VERSION {
                    unsupported_version_frame(header.correlation_id, RESPONSE_HEADER_V1)
                } else {
                    self.handle_produce(&header, body)
                }
            }
            api_key => {
                // Minimal reply that keeps the client's socket alive.
                debug!(api_key, "unrecognized api key");
                encode_response_frame(header.correlation_id, RESPONSE_HEADER_V0, &[])
            }
        };
        Ok(response)
    }

    /// ApiVersions keeps the header v0 shape even though its body is
    /// flexible; the request body is ignored at every supported version.
    fn handle_api_versions(&self, header: &RequestHeader) -> Vec<u8> {
        let supported =
            (API_VERSIONS_MIN_VERSION..=API_VERSIONS_MAX_VERSION).contains(&header.api_version);
        if !supported {
            return unsupported_version_frame(header.correlation_id, RESPONSE_HEADER_V0);
        }
        let body = ApiVersionsResponse::supported().encode();
        encode_response_frame(header.correlation_id, RESPONSE_HEADER_V0, &body)
    }

    fn handle_describe_topic_partitions(&self, header: &RequestHeader, body: &[u8]) -> Vec<u8> {
        let request = DescribeTopicPartitionsRequest::decode(body);
        let mut names = request.topics;
        names.sort();

        let topics = names
            .into_iter()
            .map(|name| match self.catalog.get(&name) {
                None => DescribeTopicPartitionsResponseTopic {
                    error_code: ERROR_UNKNOWN_TOPIC_OR_PARTITION,
                    name,
                    topic_id: Uuid::nil(),
                    is_internal: false,
                    partitions: Vec::new(),
                    authorized_operations: AUTHORIZED_OPERATIONS_OMITTED,
                },
                Some(meta) => {
                    let partitions = (0..meta.effective_partition_count() as i32)
                        .map(|partition_index| DescribeTopicPartitionsResponsePartition {
                            error_code: ERROR_NONE,
                            partition_index,
                            leader_id: LEADER_ID,
                            leader_epoch: LEADER_EPOCH_UNKNOWN,
                            replica_nodes: REPLICA_NODES.to_vec(),
                            isr_nodes: REPLICA_NODES.to_vec(),
                        })
                        .collect();
                    DescribeTopicPartitionsResponseTopic {
                        error_code: ERROR_NONE,
                        name,
                        topic_id: meta.id,
                        is_internal: false,
                        partitions,
                        authorized_operations: AUTHORIZED_OPERATIONS_OMITTED,
                    }
                }
            })
            .collect();

        let body = DescribeTopicPartitionsResponse {
            throttle_time_ms: 0,
            topics,
        }
        .encode();
        encode_response_frame(header.correlation_id, RESPONSE_HEADER_V1, &body)
    }

    /// Topic ids are resolved through the catalog's reverse index; every
    /// response carries a single entry for partition 0.
    fn handle_fetch(&self, header: &RequestHeader, body: &[u8]) -> Vec<u8> {
        let request = FetchRequest::decode(body);

        let topics = request
            .topics
            .into_iter()
            .map(|topic| {
                let partition = match self.catalog.name_by_id(&topic.topic_id) {
                    None => FetchResponsePartition {
                        partition_index: 0,
                        error_code: ERROR_UNKNOWN_TOPIC_ID,
                        high_watermark: 0,
                        last_stable_offset: 0,
                        log_start_offset: 0,
                        preferred_read_replica: 0,
                        records: Vec::new(),
                    },
                    Some(name) => {
                        let records = match self.store.read(name, 0) {
                            Ok(records) => records,
                            Err(err) => {
                                warn!(topic = name, error = %err, "partition read failed");
                                Vec::new()
                            }
                        };
                        FetchResponsePartition {
                            partition_index: 0,
                            error_code: ERROR_NONE,
                            high_watermark: 1,
                            last_stable_offset: 0,
                            log_start_offset: 0,
                            preferred_read_replica: 0,
                            records,
                        }
                    }
                };
                FetchResponseTopic {
                    topic_id: topic.topic_id,
                    partitions: vec![partition],
                }
            })
            .collect();

        let body = FetchResponse {
            throttle_time_ms: 0,
            error_code: ERROR_NONE,
            session_id: 0,
            topics,
        }
        .encode();
        encode_response_frame(header.correlation_id, RESPONSE_HEADER_V1, &body)
    }

    fn handle_produce(&self, header: &RequestHeader, body: &[u8]) -> Vec<u8> {
        let request = ProduceRequest::decode(body);

        let topics = request
            .topics
            .into_iter()
            .map(|topic| {
                let meta = self.catalog.get(&topic.name).copied();
                let partitions = topic
                    .partitions
                    .into_iter()
                    .map(|partition| {
                        self.produce_partition(
                            &topic.name,
                            meta.as_ref(),
                            partition.partition_index,
                            &partition.records,
                        )
                    })
                    .collect();
                ProduceResponseTopic {
                    name: topic.name,
                    partitions,
                }
            })
            .collect();

        let body = ProduceResponse {
            topics,
            throttle_time_ms: 0,
        }
        .encode();
        encode_response_frame(header.correlation_id, RESPONSE_HEADER_V1, &body)
    }

    fn produce_partition(
        &self,
        topic_name: &str,
        meta: Option<&crate::catalog::TopicMeta>,
        partition_index: i32,
        records: &[u8],
    ) -> ProduceResponsePartition {
        let accepted = meta.is_some_and(|meta| {
            let in_range = partition_index >= 0
                && (partition_index as u32) < meta.effective_partition_count();
            in_range
                && match self.store.write(topic_name, partition_index, records) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(topic = topic_name, partition_index, error = %err, "partition write failed");
                        false
                    }
                }
        });

        if accepted {
            ProduceResponsePartition {
                partition_index,
                error_code: ERROR_NONE,
                base_offset: 0,
                log_append_time_ms: -1,
                log_start_offset: 0,
            }
        } else {
            ProduceResponsePartition {
                partition_index,
                error_code: ERROR_UNKNOWN_TOPIC_OR_PARTITION,
                base_offset: -1,
                log_append_time_ms: -1,
                log_start_offset: -1,
            }
        }
    }
}

fn unsupported_version_frame(correlation_id: i32, header_version: i16) -> Vec<u8> {
    let mut body = Vec::new();
    write_i16(&mut body, ERROR_UNSUPPORTED_VERSION);
    encode_response_frame(correlation_id, header_version, &body)
}

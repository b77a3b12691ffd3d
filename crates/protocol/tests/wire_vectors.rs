#![forbid(unsafe_code)]

use minka_protocol::messages::{ApiVersionsResponse, DescribeTopicPartitionsRequest};
use minka_protocol::{
    encode_response_frame, parse_request_header, write_i16, Reader, RESPONSE_HEADER_V0,
    RESPONSE_HEADER_V1,
};

/// ApiVersions v4 request with correlation id 7, null client_id, no tags.
const API_VERSIONS_V4_PAYLOAD: [u8; 10] = [
    0x00, 0x12, 0x00, 0x04, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00,
];

#[test]
fn api_versions_v4_frame_matches_expected_bytes() {
    let (header, body_offset) = parse_request_header(&API_VERSIONS_V4_PAYLOAD).expect("header");
    assert_eq!(header.api_key, 18);
    assert_eq!(header.api_version, 4);
    assert_eq!(header.correlation_id, 7);
    assert_eq!(body_offset, API_VERSIONS_V4_PAYLOAD.len());

    let body = ApiVersionsResponse::supported().encode();
    let frame = encode_response_frame(header.correlation_id, RESPONSE_HEADER_V0, &body);

    let mut expected = Vec::new();
    expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x28]); // 4 header + 36 body
    expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x07]); // correlation id
    expected.extend_from_slice(&[0x00, 0x00]); // error_code
    expected.push(0x05); // four entries
    expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x0b, 0x00]); // Produce 0..11
    expected.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00]); // Fetch 0..16
    expected.extend_from_slice(&[0x00, 0x12, 0x00, 0x00, 0x00, 0x04, 0x00]); // ApiVersions 0..4
    expected.extend_from_slice(&[0x00, 0x4b, 0x00, 0x00, 0x00, 0x00, 0x00]); // DescribeTopicPartitions 0..0
    expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // throttle_time_ms
    expected.push(0x00); // tag buffer
    assert_eq!(frame, expected);
}

#[test]
fn unsupported_api_versions_error_body_is_two_bytes() {
    let mut body = Vec::new();
    write_i16(&mut body, 35);
    let frame = encode_response_frame(7, RESPONSE_HEADER_V0, &body);
    assert_eq!(
        frame,
        vec![0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x07, 0x00, 0x23]
    );
}

#[test]
fn header_v1_frame_carries_empty_tag_buffer() {
    let frame = encode_response_frame(0x33445566, RESPONSE_HEADER_V1, &[0xab]);
    assert_eq!(
        frame,
        vec![0x00, 0x00, 0x00, 0x06, 0x33, 0x44, 0x55, 0x66, 0x00, 0xab]
    );
}

#[test]
fn describe_request_wire_form_matches_flexible_layout() {
    let encoded = DescribeTopicPartitionsRequest {
        topics: vec!["foo".to_string()],
        response_partition_limit: 1,
    }
    .encode();

    let expected = [
        0x00, // request tag buffer
        0x02, // one topic
        0x04, b'f', b'o', b'o', // compact name
        0x00, // topic tag buffer
        0x00, 0x00, 0x00, 0x01, // response_partition_limit
        0xff, // null cursor
        0x00, // body tag buffer
    ];
    assert_eq!(encoded, expected);
}

#[test]
fn frame_length_prefix_always_matches_payload() {
    let bodies: Vec<Vec<u8>> = vec![
        Vec::new(),
        vec![0x00],
        ApiVersionsResponse::supported().encode(),
        vec![0xff; 1_000],
    ];
    for body in bodies {
        for header_version in [RESPONSE_HEADER_V0, RESPONSE_HEADER_V1] {
            let frame = encode_response_frame(-1, header_version, &body);
            let mut reader = Reader::new(&frame);
            let declared = reader.read_i32() as usize;
            assert_eq!(declared, frame.len() - 4);
        }
    }
}

#[test]
fn header_parser_never_panics_on_adversarial_payloads() {
    let mut adversarial: Vec<Vec<u8>> = vec![
        API_VERSIONS_V4_PAYLOAD.to_vec(),
        vec![0xff; 8],
        vec![0xff; 64],
        vec![0x00; 9],
    ];
    // Truncations of a header that declares a long client_id and fat tags.
    let mut fat = vec![0x00, 0x12, 0x00, 0x04, 0x00, 0x00, 0x00, 0x07];
    fat.push(0x20); // client_id declares 31 bytes
    fat.extend_from_slice(&[b'x'; 10]); // but only 10 are present
    adversarial.push(fat.clone());
    for len in 8..fat.len() {
        adversarial.push(fat[..len].to_vec());
    }

    for payload in adversarial {
        if let Ok((_, body_offset)) = parse_request_header(&payload) {
            assert!(body_offset <= payload.len());
        }
    }
}

use super::*;

#[test]
fn test_is_http2_preface() {
    assert!(is_http2_preface(CONNECTION_PREFACE));
    assert!(is_http2_preface(b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\nextra"));
    assert!(!is_http2_preface(b"GET / HTTP/1.1\r\n"));
    assert!(!is_http2_preface(b"PRI"));
}

#[test]
fn test_looks_like_http2_frame() {
    // Valid SETTINGS frame header (type 4, length 0, stream 0)
    let settings_frame = [0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00];
    assert!(looks_like_http2_frame(&settings_frame));

    // Invalid: too short
    assert!(!looks_like_http2_frame(&[0x00, 0x00]));

    // Invalid: unknown frame type (> 9)
    let bad_type = [0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00];
    assert!(!looks_like_http2_frame(&bad_type));

    // Invalid: SETTINGS payload not a multiple of 6
    let bad_settings = [0x00, 0x00, 0x07, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00];
    assert!(!looks_like_http2_frame(&bad_settings));
}

#[test]
fn test_parse_frame_header() {
    // HEADERS frame, length 10, flags 0x04, stream 1
    let data = [0x00, 0x00, 0x0A, 0x01, 0x04, 0x00, 0x00, 0x00, 0x01];
    let header = parse_frame_header(&data);
    assert_eq!(header.length, 10);
    assert_eq!(header.frame_type, FrameType::Headers);
    assert_eq!(header.flags, 0x04);
    assert_eq!(header.stream_id, StreamId(1));
}

#[test]
fn test_parse_frame_header_reserved_bit_ignored() {
    // Stream id with the reserved high bit set decodes to the 31-bit id
    let data = [0x00, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x03];
    let header = parse_frame_header(&data);
    assert_eq!(header.stream_id, StreamId(3));
}

#[test]
fn test_parse_frame_header_zero_length() {
    // SETTINGS ACK: length 0, type 4, ACK flag, stream 0
    let data = [0x00, 0x00, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00];
    let header = parse_frame_header(&data);
    assert_eq!(header.length, 0);
    assert_eq!(header.frame_type, FrameType::Settings);
    assert_eq!(header.flags, FLAG_ACK);
}

#[test]
fn test_frame_type_from_wire_unknown() {
    assert_eq!(FrameType::from_wire(0x0B), FrameType::Unknown(0x0B));
    assert!(FrameType::Unknown(0x0B).is_housekeeping());
}

#[test]
fn test_housekeeping_classification() {
    assert!(FrameType::Settings.is_housekeeping());
    assert!(FrameType::Ping.is_housekeeping());
    assert!(FrameType::Priority.is_housekeeping());
    assert!(FrameType::WindowUpdate.is_housekeeping());
    assert!(FrameType::Goaway.is_housekeeping());
    assert!(!FrameType::Headers.is_housekeeping());
    assert!(!FrameType::Data.is_housekeeping());
    assert!(!FrameType::PushPromise.is_housekeeping());
    assert!(!FrameType::RstStream.is_housekeeping());
    assert!(!FrameType::Continuation.is_housekeeping());
}

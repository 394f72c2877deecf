#![allow(dead_code)]
//! Raw HTTP/2 frame builders and a recording inspector for integration
//! tests. The builders construct wire bytes directly so tests control every
//! field, including invalid combinations.

use h2inspect::{Http1Headers, HttpInspector, InspectError, MessageKind};

/// Frame type constants
pub const FRAME_TYPE_DATA: u8 = 0x00;
pub const FRAME_TYPE_HEADERS: u8 = 0x01;
pub const FRAME_TYPE_PRIORITY: u8 = 0x02;
pub const FRAME_TYPE_RST_STREAM: u8 = 0x03;
pub const FRAME_TYPE_SETTINGS: u8 = 0x04;
pub const FRAME_TYPE_PUSH_PROMISE: u8 = 0x05;
pub const FRAME_TYPE_PING: u8 = 0x06;
pub const FRAME_TYPE_GOAWAY: u8 = 0x07;
pub const FRAME_TYPE_WINDOW_UPDATE: u8 = 0x08;
pub const FRAME_TYPE_CONTINUATION: u8 = 0x09;

/// Frame flags
pub const FLAG_END_STREAM: u8 = 0x01;
pub const FLAG_ACK: u8 = 0x01;
pub const FLAG_END_HEADERS: u8 = 0x04;
pub const FLAG_PADDED: u8 = 0x08;
pub const FLAG_PRIORITY: u8 = 0x20;

/// HTTP/2 connection preface
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Build a raw HTTP/2 frame header (9 bytes)
fn build_frame_header(length: u32, frame_type: u8, flags: u8, stream_id: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(9);
    header.push((length >> 16) as u8);
    header.push((length >> 8) as u8);
    header.push(length as u8);
    header.push(frame_type);
    header.push(flags);
    header.push((stream_id >> 24) as u8 & 0x7F);
    header.push((stream_id >> 16) as u8);
    header.push((stream_id >> 8) as u8);
    header.push(stream_id as u8);
    header
}

/// Build a DATA frame
pub fn build_data_frame(stream_id: u32, data: &[u8], end_stream: bool) -> Vec<u8> {
    let flags = if end_stream { FLAG_END_STREAM } else { 0 };
    let mut frame = build_frame_header(data.len() as u32, FRAME_TYPE_DATA, flags, stream_id);
    frame.extend_from_slice(data);
    frame
}

/// Build a DATA frame with padding
pub fn build_data_frame_padded(
    stream_id: u32,
    data: &[u8],
    padding_len: u8,
    end_stream: bool,
) -> Vec<u8> {
    let mut flags = FLAG_PADDED;
    if end_stream {
        flags |= FLAG_END_STREAM;
    }
    let total_len = 1 + data.len() + padding_len as usize;
    let mut frame = build_frame_header(total_len as u32, FRAME_TYPE_DATA, flags, stream_id);
    frame.push(padding_len);
    frame.extend_from_slice(data);
    frame.extend(std::iter::repeat_n(0u8, padding_len as usize));
    frame
}

/// Build a HEADERS frame with explicit flags
pub fn build_headers_frame(stream_id: u32, hpack_block: &[u8], flags: u8) -> Vec<u8> {
    let mut frame = build_frame_header(
        hpack_block.len() as u32,
        FRAME_TYPE_HEADERS,
        flags,
        stream_id,
    );
    frame.extend_from_slice(hpack_block);
    frame
}

/// Build a HEADERS frame with END_HEADERS and END_STREAM
pub fn build_complete_headers_frame(stream_id: u32, hpack_block: &[u8]) -> Vec<u8> {
    build_headers_frame(stream_id, hpack_block, FLAG_END_HEADERS | FLAG_END_STREAM)
}

/// Build a HEADERS frame with PADDED and PRIORITY fields present
pub fn build_headers_frame_padded_priority(
    stream_id: u32,
    hpack_block: &[u8],
    padding_len: u8,
    stream_dependency: u32,
    weight: u8,
    flags: u8,
) -> Vec<u8> {
    // Layout: [Pad Length (1)] [E + Stream Dep (4)] [Weight (1)] [Block] [Padding]
    let total_len = 1 + 5 + hpack_block.len() + padding_len as usize;
    let mut frame = build_frame_header(
        total_len as u32,
        FRAME_TYPE_HEADERS,
        flags | FLAG_PADDED | FLAG_PRIORITY,
        stream_id,
    );
    frame.push(padding_len);
    frame.extend_from_slice(&stream_dependency.to_be_bytes());
    frame.push(weight);
    frame.extend_from_slice(hpack_block);
    frame.extend(std::iter::repeat_n(0u8, padding_len as usize));
    frame
}

/// Build a CONTINUATION frame
pub fn build_continuation_frame(stream_id: u32, hpack_block: &[u8], end_headers: bool) -> Vec<u8> {
    let flags = if end_headers { FLAG_END_HEADERS } else { 0 };
    let mut frame = build_frame_header(
        hpack_block.len() as u32,
        FRAME_TYPE_CONTINUATION,
        flags,
        stream_id,
    );
    frame.extend_from_slice(hpack_block);
    frame
}

/// Build a PUSH_PROMISE frame carrying `promised` and a header block
pub fn build_push_promise_frame(
    stream_id: u32,
    promised: u32,
    hpack_block: &[u8],
    end_headers: bool,
) -> Vec<u8> {
    let flags = if end_headers { FLAG_END_HEADERS } else { 0 };
    let mut frame = build_frame_header(
        (4 + hpack_block.len()) as u32,
        FRAME_TYPE_PUSH_PROMISE,
        flags,
        stream_id,
    );
    frame.extend_from_slice(&(promised & 0x7FFF_FFFF).to_be_bytes());
    frame.extend_from_slice(hpack_block);
    frame
}

/// Build a SETTINGS frame from (identifier, value) pairs
pub fn build_settings_frame(settings: &[(u16, u32)]) -> Vec<u8> {
    let payload_len = settings.len() * 6;
    let mut frame = build_frame_header(payload_len as u32, FRAME_TYPE_SETTINGS, 0, 0);
    for (id, value) in settings {
        frame.extend_from_slice(&id.to_be_bytes());
        frame.extend_from_slice(&value.to_be_bytes());
    }
    frame
}

/// Build an empty SETTINGS frame (common initial frame)
pub fn build_empty_settings_frame() -> Vec<u8> {
    build_frame_header(0, FRAME_TYPE_SETTINGS, 0, 0)
}

/// Build a SETTINGS ACK frame
pub fn build_settings_ack_frame() -> Vec<u8> {
    build_frame_header(0, FRAME_TYPE_SETTINGS, FLAG_ACK, 0)
}

/// Build a WINDOW_UPDATE frame
pub fn build_window_update_frame(stream_id: u32, increment: u32) -> Vec<u8> {
    let mut frame = build_frame_header(4, FRAME_TYPE_WINDOW_UPDATE, 0, stream_id);
    frame.extend_from_slice(&(increment & 0x7FFFFFFF).to_be_bytes());
    frame
}

/// Build a PING frame
pub fn build_ping_frame(data: &[u8; 8], ack: bool) -> Vec<u8> {
    let flags = if ack { FLAG_ACK } else { 0 };
    let mut frame = build_frame_header(8, FRAME_TYPE_PING, flags, 0);
    frame.extend_from_slice(data);
    frame
}

/// Build a GOAWAY frame
pub fn build_goaway_frame(last_stream_id: u32, error_code: u32) -> Vec<u8> {
    let mut frame = build_frame_header(8, FRAME_TYPE_GOAWAY, 0, 0);
    frame.extend_from_slice(&(last_stream_id & 0x7FFFFFFF).to_be_bytes());
    frame.extend_from_slice(&error_code.to_be_bytes());
    frame
}

/// Build a RST_STREAM frame
pub fn build_rst_stream_frame(stream_id: u32, error_code: u32) -> Vec<u8> {
    let mut frame = build_frame_header(4, FRAME_TYPE_RST_STREAM, 0, stream_id);
    frame.extend_from_slice(&error_code.to_be_bytes());
    frame
}

/// HPACK: literal header with incremental indexing (lands in the dynamic
/// table at index 62)
pub fn hpack_literal_with_indexing(name: &str, value: &str) -> Vec<u8> {
    let mut encoded = Vec::new();
    encoded.push(0x40);
    encoded.push(name.len() as u8);
    encoded.extend_from_slice(name.as_bytes());
    encoded.push(value.len() as u8);
    encoded.extend_from_slice(value.as_bytes());
    encoded
}

/// HPACK: literal header without indexing
pub fn hpack_literal_without_indexing(name: &str, value: &str) -> Vec<u8> {
    let mut encoded = Vec::new();
    encoded.push(0x00);
    encoded.push(name.len() as u8);
    encoded.extend_from_slice(name.as_bytes());
    encoded.push(value.len() as u8);
    encoded.extend_from_slice(value.as_bytes());
    encoded
}

/// HPACK: indexed header field (static or dynamic table)
pub fn hpack_indexed(index: u8) -> Vec<u8> {
    vec![0x80 | index]
}

/// Common static-table entries
pub mod hpack_static {
    /// :method: GET (index 2)
    pub fn method_get() -> Vec<u8> {
        vec![0x82]
    }
    /// :method: POST (index 3)
    pub fn method_post() -> Vec<u8> {
        vec![0x83]
    }
    /// :path: / (index 4)
    pub fn path_root() -> Vec<u8> {
        vec![0x84]
    }
    /// :scheme: https (index 7)
    pub fn scheme_https() -> Vec<u8> {
        vec![0x87]
    }
    /// :status: 200 (index 8)
    pub fn status_200() -> Vec<u8> {
        vec![0x88]
    }
    /// :status: 404 (index 13)
    pub fn status_404() -> Vec<u8> {
        vec![0x8d]
    }
}

/// Minimal HPACK block for a GET request
pub fn hpack_get_request(path: &str, authority: &str) -> Vec<u8> {
    let mut block = Vec::new();
    block.extend(hpack_static::method_get());
    block.extend(hpack_static::scheme_https());
    if path == "/" {
        block.extend(hpack_static::path_root());
    } else {
        block.extend(hpack_literal_without_indexing(":path", path));
    }
    block.extend(hpack_literal_without_indexing(":authority", authority));
    block
}

/// Minimal HPACK block for a 200 response
pub fn hpack_response_200() -> Vec<u8> {
    hpack_static::status_200()
}

/// Pre-computed Huffman encodings (RFC 7541 Appendix B)
pub mod hpack_huffman {
    /// Huffman encoding of "www.example.com"
    pub fn www_example_com() -> Vec<u8> {
        vec![
            0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90, 0xf4, 0xff,
        ]
    }

    /// Literal header with an indexed name and a Huffman-encoded value
    pub fn literal_indexed_name_huffman_value(name_index: u8, value_huffman: &[u8]) -> Vec<u8> {
        let mut encoded = Vec::new();
        encoded.push(name_index & 0x0F);
        encoded.push(0x80 | value_huffman.len() as u8);
        encoded.extend_from_slice(value_huffman);
        encoded
    }
}

/// Connection preface plus an empty SETTINGS frame
pub fn connection_start() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(CONNECTION_PREFACE);
    data.extend(build_empty_settings_frame());
    data
}

// =========================================================================
// Recording inspector
// =========================================================================

/// One downstream call, tagged with the handle it was made against.
#[derive(Debug, Clone, PartialEq)]
pub enum InspectorCall {
    Begin(u32, MessageKind),
    Headers(u32, Http1Headers),
    Body(u32, Vec<u8>),
    End(u32),
}

/// Inspector that records every call for later assertions. Handles are
/// numbered in creation order starting at 1.
#[derive(Debug, Default)]
pub struct RecordingInspector {
    next_handle: u32,
    pub calls: Vec<InspectorCall>,
}

impl RecordingInspector {
    /// Body bytes delivered to `handle`, concatenated in arrival order.
    pub fn body_of(&self, handle: u32) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                InspectorCall::Body(h, bytes) if *h == handle => Some(bytes.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// The headers delivered to `handle`, if any.
    pub fn headers_of(&self, handle: u32) -> Option<&Http1Headers> {
        self.calls.iter().find_map(|c| match c {
            InspectorCall::Headers(h, headers) if *h == handle => Some(headers),
            _ => None,
        })
    }

    /// The call sequence with consecutive same-handle body chunks merged,
    /// for comparisons that must not depend on segmentation.
    pub fn coalesced_calls(&self) -> Vec<InspectorCall> {
        let mut out: Vec<InspectorCall> = Vec::new();
        for call in &self.calls {
            match (out.last_mut(), call) {
                (Some(InspectorCall::Body(last_handle, acc)), InspectorCall::Body(handle, bytes))
                    if *last_handle == *handle =>
                {
                    acc.extend_from_slice(bytes);
                }
                _ => out.push(call.clone()),
            }
        }
        out
    }
}

impl HttpInspector for RecordingInspector {
    type Handle = u32;

    fn new_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn begin_message(&mut self, handle: &mut u32, kind: MessageKind) -> Result<(), InspectError> {
        self.calls.push(InspectorCall::Begin(*handle, kind));
        Ok(())
    }

    fn push_headers(&mut self, handle: &mut u32, headers: &Http1Headers) -> Result<(), InspectError> {
        self.calls.push(InspectorCall::Headers(*handle, headers.clone()));
        Ok(())
    }

    fn push_body(&mut self, handle: &mut u32, chunk: &[u8]) -> Result<(), InspectError> {
        self.calls.push(InspectorCall::Body(*handle, chunk.to_vec()));
        Ok(())
    }

    fn end_message(&mut self, handle: &mut u32) -> Result<(), InspectError> {
        self.calls.push(InspectorCall::End(*handle));
        Ok(())
    }

    fn size_of(&self, _handle: &u32) -> usize {
        size_of::<u32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_data_frame() {
        let frame = build_data_frame(1, b"hello", false);
        assert_eq!(frame.len(), 9 + 5);
        assert_eq!(frame[3], FRAME_TYPE_DATA);
        assert_eq!(frame[4], 0);
        assert_eq!(&frame[9..], b"hello");
    }

    #[test]
    fn test_build_push_promise_frame() {
        let frame = build_push_promise_frame(1, 2, &[0x82], true);
        assert_eq!(frame[3], FRAME_TYPE_PUSH_PROMISE);
        assert_eq!(&frame[9..13], &[0, 0, 0, 2]);
        assert_eq!(frame[13], 0x82);
    }

    #[test]
    fn test_hpack_indexed() {
        assert_eq!(hpack_indexed(2), vec![0x82]); // :method: GET
    }
}

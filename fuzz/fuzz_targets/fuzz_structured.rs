//! Fuzz target: structured frame generation
//!
//! Generates semi-valid HTTP/2 frames via the Arbitrary trait. More
//! effective than raw bytes at reaching the stream table, continuation
//! discipline, and padding logic, since inputs are structurally valid
//! frames with random field values.

#![no_main]

use arbitrary::Arbitrary;
use h2inspect::{FlowContext, InspectConfig, NullInspector, Side};
use libfuzzer_sys::fuzz_target;

/// HTTP/2 connection preface
const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

const FRAME_TYPE_DATA: u8 = 0x00;
const FRAME_TYPE_HEADERS: u8 = 0x01;
const FRAME_TYPE_SETTINGS: u8 = 0x04;
const FRAME_TYPE_PUSH_PROMISE: u8 = 0x05;

const FLAG_PADDED: u8 = 0x08;

/// A structured HTTP/2 frame for fuzzing
#[derive(Debug, Arbitrary)]
struct FuzzFrame {
    frame_type: u8,
    flags: u8,
    stream_id: u32,
    payload: Vec<u8>,
    add_padding: bool,
    padding_len: u8,
    promised_id: u32,
}

impl FuzzFrame {
    fn to_bytes(&self) -> Vec<u8> {
        let frame_type = self.frame_type % 10;
        let stream_id = self.stream_id & 0x7FFFFFFF;

        let mut payload = self.payload.clone();
        let mut flags = self.flags;

        if frame_type == FRAME_TYPE_PUSH_PROMISE {
            let mut new_payload = (self.promised_id & 0x7FFFFFFF).to_be_bytes().to_vec();
            new_payload.extend(&payload);
            payload = new_payload;
        }

        if self.add_padding && (frame_type == FRAME_TYPE_DATA || frame_type == FRAME_TYPE_HEADERS) {
            let pad_len = self.padding_len.min(200);
            if payload.len() + 1 + pad_len as usize <= 16384 {
                flags |= FLAG_PADDED;
                let mut new_payload = vec![pad_len];
                new_payload.extend(&payload);
                new_payload.extend(std::iter::repeat_n(0u8, pad_len as usize));
                payload = new_payload;
            }
        }

        if payload.len() > 16384 {
            payload.truncate(16384);
        }

        let length = payload.len() as u32;
        let mut frame = Vec::with_capacity(9 + payload.len());
        frame.push((length >> 16) as u8);
        frame.push((length >> 8) as u8);
        frame.push(length as u8);
        frame.push(frame_type);
        frame.push(flags);
        frame.push((stream_id >> 24) as u8 & 0x7F);
        frame.push((stream_id >> 16) as u8);
        frame.push((stream_id >> 8) as u8);
        frame.push(stream_id as u8);
        frame.extend(&payload);
        frame
    }
}

/// A two-directional frame sequence for fuzzing
#[derive(Debug, Arbitrary)]
struct FuzzConnection {
    include_preface: bool,
    include_settings: bool,
    frames: Vec<(bool, FuzzFrame)>,
}

impl FuzzConnection {
    fn client_preamble(&self) -> Vec<u8> {
        let mut data = Vec::new();
        if self.include_preface {
            data.extend_from_slice(CONNECTION_PREFACE);
        }
        if self.include_settings {
            data.extend(&[0, 0, 0, FRAME_TYPE_SETTINGS, 0, 0, 0, 0, 0]);
        }
        data
    }
}

fuzz_target!(|conn: FuzzConnection| {
    let mut flow = FlowContext::new(InspectConfig::default(), NullInspector);
    flow.on_segment(Side::Client, &conn.client_preamble());

    for (from_server, frame) in &conn.frames {
        let side = if *from_server { Side::Server } else { Side::Client };
        flow.on_segment(side, &frame.to_bytes());
    }

    // Replay the same frames through odd-sized segments
    let mut wire = conn.client_preamble();
    for (_, frame) in &conn.frames {
        wire.extend(frame.to_bytes());
    }
    let mut flow = FlowContext::new(InspectConfig::default(), NullInspector);
    for chunk in wire.chunks(33) {
        flow.on_segment(Side::Client, chunk);
    }
});

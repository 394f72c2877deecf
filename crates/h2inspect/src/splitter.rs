//! Per-direction frame splitter.
//!
//! Carves a continuous byte stream into length-prefixed frames, preserving
//! partial headers and payloads across arbitrary segment boundaries. The
//! client direction additionally consumes the 24-octet connection preface
//! exactly once at stream start.
//!
//! Non-DATA frames are reassembled in full before they are handed to the
//! classifier, since header blocks and settings are only meaningful whole.
//! DATA payloads are never buffered: each arriving slice is surfaced
//! immediately as a [`SplitEvent::DataPayload`] so the flow's data cutter
//! can de-pad and deliver body bytes while the frame is still in flight.

use crate::Side;
use crate::frame::{
    CONNECTION_PREFACE, FRAME_HEADER_SIZE, FrameHeader, FrameType, parse_frame_header,
};

/// A fully reassembled non-DATA frame ready for classification.
#[derive(Debug, PartialEq)]
pub(crate) struct CompleteFrame {
    pub(crate) header: FrameHeader,
    pub(crate) payload: Vec<u8>,
    /// Set when the advertised length exceeded the effective max frame size.
    /// The payload octets were consumed to keep the stream in sync (and are
    /// discarded for DATA), but the frame must be skipped by the classifier.
    pub(crate) drop: bool,
}

/// One unit of splitter output.
#[derive(Debug, PartialEq)]
pub(crate) enum SplitEvent {
    /// A whole non-DATA frame, or a dropped oversize DATA frame (payload
    /// discarded)
    Frame(CompleteFrame),
    /// A DATA frame header; its payload follows as `DataPayload` events
    DataStart(FrameHeader),
    /// A slice of the current DATA frame's payload, in arrival order
    DataPayload {
        bytes: Vec<u8>,
        /// This slice completes the frame
        last: bool,
    },
}

/// The client side's bytes did not match the connection preface.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PrefaceMismatch;

enum Phase {
    AwaitPreface,
    AwaitHeader,
    AwaitPayload,
}

pub(crate) struct FrameSplitter {
    phase: Phase,
    preface_octets_seen: usize,
    header: [u8; FRAME_HEADER_SIZE],
    header_octets_seen: usize,
    current: Option<FrameHeader>,
    /// Buffered payload for non-DATA frames
    payload: Vec<u8>,
    drop_frame: bool,
    /// Current frame is DATA: payload is surfaced, not buffered
    streaming: bool,
    /// Current frame is oversize DATA: payload octets are skipped
    discard: bool,
    payload_remaining: usize,
}

impl FrameSplitter {
    pub(crate) fn new(side: Side) -> Self {
        Self {
            phase: match side {
                Side::Client => Phase::AwaitPreface,
                Side::Server => Phase::AwaitHeader,
            },
            preface_octets_seen: 0,
            header: [0; FRAME_HEADER_SIZE],
            header_octets_seen: 0,
            current: None,
            payload: Vec::new(),
            drop_frame: false,
            streaming: false,
            discard: false,
            payload_remaining: 0,
        }
    }

    /// Consume one segment, returning every event it produces.
    ///
    /// All input bytes are either surfaced through events, buffered for the
    /// next segment, skipped as tagged-oversize payload, or matched against
    /// the preface; nothing is lost silently.
    pub(crate) fn consume(
        &mut self,
        input: &[u8],
        max_frame_size: u32,
    ) -> Result<Vec<SplitEvent>, PrefaceMismatch> {
        let mut events = Vec::new();
        let mut pos = 0;

        while pos < input.len() {
            match self.phase {
                Phase::AwaitPreface => {
                    let want = CONNECTION_PREFACE.len() - self.preface_octets_seen;
                    let take = want.min(input.len() - pos);
                    let expected = &CONNECTION_PREFACE[self.preface_octets_seen..][..take];
                    if &input[pos..pos + take] != expected {
                        return Err(PrefaceMismatch);
                    }
                    self.preface_octets_seen += take;
                    pos += take;
                    if self.preface_octets_seen == CONNECTION_PREFACE.len() {
                        self.phase = Phase::AwaitHeader;
                    }
                }
                Phase::AwaitHeader => {
                    let want = FRAME_HEADER_SIZE - self.header_octets_seen;
                    let take = want.min(input.len() - pos);
                    self.header[self.header_octets_seen..self.header_octets_seen + take]
                        .copy_from_slice(&input[pos..pos + take]);
                    self.header_octets_seen += take;
                    pos += take;
                    if self.header_octets_seen == FRAME_HEADER_SIZE {
                        let header = parse_frame_header(&self.header);
                        self.header_octets_seen = 0;
                        let oversize = header.length > max_frame_size;
                        if header.frame_type == FrameType::Data {
                            if oversize {
                                events.push(SplitEvent::Frame(CompleteFrame {
                                    header,
                                    payload: Vec::new(),
                                    drop: true,
                                }));
                            } else {
                                events.push(SplitEvent::DataStart(header));
                            }
                            if header.length == 0 {
                                events.push(SplitEvent::DataPayload {
                                    bytes: Vec::new(),
                                    last: true,
                                });
                            } else {
                                self.current = Some(header);
                                self.streaming = true;
                                self.discard = oversize;
                                self.payload_remaining = header.length as usize;
                                self.phase = Phase::AwaitPayload;
                            }
                        } else if header.length == 0 {
                            events.push(SplitEvent::Frame(CompleteFrame {
                                header,
                                payload: Vec::new(),
                                drop: oversize,
                            }));
                        } else {
                            self.current = Some(header);
                            self.drop_frame = oversize;
                            self.payload = Vec::with_capacity(
                                (header.length as usize).min(max_frame_size as usize),
                            );
                            self.phase = Phase::AwaitPayload;
                        }
                    }
                }
                Phase::AwaitPayload if self.streaming => {
                    let take = self.payload_remaining.min(input.len() - pos);
                    self.payload_remaining -= take;
                    let last = self.payload_remaining == 0;
                    if !self.discard {
                        events.push(SplitEvent::DataPayload {
                            bytes: input[pos..pos + take].to_vec(),
                            last,
                        });
                    }
                    pos += take;
                    if last {
                        self.current = None;
                        self.streaming = false;
                        self.discard = false;
                        self.phase = Phase::AwaitHeader;
                    }
                }
                Phase::AwaitPayload => {
                    let header = self.current.expect("payload phase without header");
                    let want = header.length as usize - self.payload.len();
                    let take = want.min(input.len() - pos);
                    self.payload.extend_from_slice(&input[pos..pos + take]);
                    pos += take;
                    if self.payload.len() == header.length as usize {
                        events.push(SplitEvent::Frame(CompleteFrame {
                            header,
                            payload: std::mem::take(&mut self.payload),
                            drop: self.drop_frame,
                        }));
                        self.current = None;
                        self.drop_frame = false;
                        self.phase = Phase::AwaitHeader;
                    }
                }
            }
        }

        Ok(events)
    }

    /// Bytes currently buffered pending frame completion: partial header
    /// octets, or a non-DATA frame's header plus its partial payload.
    /// Streamed DATA bytes count as consumed the moment they are surfaced,
    /// so a mid-flight DATA frame holds nothing here. Consumed bytes plus
    /// this value always equals the input fed so far (preface octets count
    /// as consumed).
    pub(crate) fn buffered(&self) -> usize {
        if self.streaming {
            return self.header_octets_seen;
        }
        let held_header = if self.current.is_some() {
            FRAME_HEADER_SIZE
        } else {
            0
        };
        self.header_octets_seen + held_header + self.payload.len()
    }

    /// True while a frame header or payload is partially buffered or a DATA
    /// payload is still arriving.
    pub(crate) fn mid_frame(&self) -> bool {
        self.header_octets_seen != 0 || self.current.is_some()
    }
}

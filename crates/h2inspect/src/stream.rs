//! Per-stream lifecycle and payload shaping.
//!
//! A [`Stream`] tracks one HTTP/2 stream's RFC 7540 §5.1 state (simplified
//! for passive inspection: no window bookkeeping, no priority reordering),
//! its per-direction header block assembly, and the downstream inspector
//! handle while this stream's message is being delivered.

use crate::Side;
use crate::frame::{FLAG_PADDED, FLAG_PRIORITY};

/// Newtype for HTTP/2 stream identifiers (RFC 7540 §5.1.1: 31-bit unsigned
/// integer). Id 0 is the connection control stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u32);

impl StreamId {
    pub(crate) fn is_connection(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn initiated_by(self) -> Side {
        if self.0 % 2 == 1 {
            Side::Client
        } else {
            Side::Server
        }
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StreamId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<StreamId> for u32 {
    fn from(v: StreamId) -> Self {
        v.0
    }
}

/// Stream lifecycle phase, RFC 7540 §5.1. "Local" is the client side of the
/// observed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)] // variant names are the RFC 7540 state names
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

/// Per-direction delivery progress of the message carried on a stream.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct MessageProgress {
    /// begin_message + push_headers have been driven downstream
    pub(crate) delivered: bool,
    /// END_STREAM observed for this direction
    pub(crate) ended: bool,
    /// end_message has been driven downstream
    pub(crate) finished: bool,
}

pub(crate) struct Stream<H> {
    id: StreamId,
    state: StreamState,
    /// Header block fragments per direction, concatenated until END_HEADERS
    assembly: [Vec<u8>; 2],
    /// Stream-local abort per direction (header list overflow, padding error)
    aborted: [bool; 2],
    pub(crate) msg: [MessageProgress; 2],
    hi_handle: Option<H>,
}

impl<H> Stream<H> {
    pub(crate) fn new(id: StreamId, state: StreamState) -> Self {
        Self {
            id,
            state,
            assembly: [Vec::new(), Vec::new()],
            aborted: [false, false],
            msg: [MessageProgress::default(), MessageProgress::default()],
            hi_handle: None,
        }
    }

    pub(crate) fn id(&self) -> StreamId {
        self.id
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn is_aborted(&self, side: Side) -> bool {
        self.aborted[side.idx()]
    }

    pub(crate) fn abort(&mut self, side: Side) {
        self.aborted[side.idx()] = true;
    }

    /// Whether `side` may still carry message frames on this stream.
    fn sendable_by(&self, side: Side) -> bool {
        match self.state {
            StreamState::Idle | StreamState::Open => true,
            StreamState::ReservedLocal => side == Side::Client,
            StreamState::ReservedRemote => side == Side::Server,
            StreamState::HalfClosedLocal => side == Side::Server,
            StreamState::HalfClosedRemote => side == Side::Client,
            StreamState::Closed => false,
        }
    }

    /// Apply a HEADERS frame from `side`. Returns false when the frame is
    /// illegal in the current state; the caller records the infraction and
    /// keeps going, since frame alignment is intact either way.
    pub(crate) fn on_headers(&mut self, side: Side) -> bool {
        let legal = self.sendable_by(side);
        match (self.state, side) {
            (StreamState::Idle, _) => self.state = StreamState::Open,
            (StreamState::ReservedRemote, Side::Server) => {
                self.state = StreamState::HalfClosedLocal
            }
            (StreamState::ReservedLocal, Side::Client) => {
                self.state = StreamState::HalfClosedRemote
            }
            _ => {}
        }
        legal
    }

    /// Apply a DATA frame from `side`. An idle stream opens silently: a
    /// passive observer that joined mid-connection still has to follow the
    /// bytes it can see.
    pub(crate) fn on_data(&mut self, side: Side) -> bool {
        let legal = self.sendable_by(side);
        if self.state == StreamState::Idle {
            self.state = StreamState::Open;
        }
        legal
    }

    /// Advance the half-close for `side` after END_STREAM.
    pub(crate) fn on_end_stream(&mut self, side: Side) {
        self.msg[side.idx()].ended = true;
        self.state = match (self.state, side) {
            (StreamState::Idle | StreamState::Open, Side::Client) => StreamState::HalfClosedLocal,
            (StreamState::Idle | StreamState::Open, Side::Server) => StreamState::HalfClosedRemote,
            (StreamState::HalfClosedLocal, Side::Server) => StreamState::Closed,
            (StreamState::HalfClosedRemote, Side::Client) => StreamState::Closed,
            (StreamState::ReservedRemote, Side::Server) => StreamState::Closed,
            (StreamState::ReservedLocal, Side::Client) => StreamState::Closed,
            (state, _) => state,
        };
    }

    /// RST_STREAM or teardown: no further frames are expected.
    pub(crate) fn force_close(&mut self) {
        self.state = StreamState::Closed;
        self.assembly[0].clear();
        self.assembly[1].clear();
    }

    /// Append a header block fragment, bounded by `limit`. Returns false on
    /// overflow, in which case the stream is aborted for this direction and
    /// the partial block is discarded.
    pub(crate) fn append_fragment(&mut self, side: Side, fragment: &[u8], limit: usize) -> bool {
        let buf = &mut self.assembly[side.idx()];
        if buf.len() + fragment.len() > limit {
            buf.clear();
            self.aborted[side.idx()] = true;
            return false;
        }
        buf.extend_from_slice(fragment);
        true
    }

    pub(crate) fn take_assembly(&mut self, side: Side) -> Vec<u8> {
        std::mem::take(&mut self.assembly[side.idx()])
    }

    pub(crate) fn assembling(&self, side: Side) -> bool {
        !self.assembly[side.idx()].is_empty()
    }

    /// Closed in both directions with no partial header block: safe to drop.
    pub(crate) fn eligible_for_delete(&self) -> bool {
        self.state == StreamState::Closed
            && !self.assembling(Side::Client)
            && !self.assembling(Side::Server)
    }

    pub(crate) fn hi_handle_mut(&mut self) -> Option<&mut H> {
        self.hi_handle.as_mut()
    }

    pub(crate) fn hi_handle(&self) -> Option<&H> {
        self.hi_handle.as_ref()
    }

    pub(crate) fn set_hi_handle(&mut self, handle: H) {
        self.hi_handle = Some(handle);
    }

    pub(crate) fn take_hi_handle(&mut self) -> Option<H> {
        self.hi_handle.take()
    }
}

/// Strip padding from a fully buffered payload: with PADDED set, the first
/// octet is the pad length and that many trailing octets are padding. The
/// non-padded bytes must satisfy `payload.len() - 1 - pad_len >= 0`.
/// (DATA payloads are not buffered; their padding is cut incrementally by
/// the flow's data cutter.)
pub(crate) fn cut_padded_payload(flags: u8, payload: &[u8]) -> Result<&[u8], ()> {
    if flags & FLAG_PADDED == 0 {
        return Ok(payload);
    }
    let pad_len = *payload.first().ok_or(())? as usize;
    if pad_len > payload.len() - 1 {
        return Err(());
    }
    Ok(&payload[1..payload.len() - pad_len])
}

/// Strip optional padding and priority fields from a HEADERS payload,
/// leaving the header block fragment.
pub(crate) fn cut_headers_fragment(flags: u8, payload: &[u8]) -> Result<&[u8], ()> {
    let body = cut_padded_payload(flags, payload)?;
    if flags & FLAG_PRIORITY == 0 {
        return Ok(body);
    }
    // Exclusive bit + 31-bit dependency + weight
    if body.len() < 5 {
        return Err(());
    }
    Ok(&body[5..])
}

/// Split a PUSH_PROMISE payload into the promised stream id (reserved bit
/// ignored) and the header block fragment.
pub(crate) fn cut_push_promise(flags: u8, payload: &[u8]) -> Result<(StreamId, &[u8]), ()> {
    let body = cut_padded_payload(flags, payload)?;
    if body.len() < 4 {
        return Err(());
    }
    let promised = u32::from_be_bytes([body[0] & 0x7F, body[1], body[2], body[3]]);
    Ok((StreamId(promised), &body[4..]))
}

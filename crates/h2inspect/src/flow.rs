//! Per-connection flow context.
//!
//! [`FlowContext`] owns everything tied to one TCP connection: the two
//! direction substates (splitter, HPACK decoder, infractions, events), the
//! stream table, the processing-stream selection for each frame, and the
//! block-granular stream memory accounting. The enclosing framework
//! serializes callbacks per flow, so nothing here locks; the only shared
//! state is the process-wide peg counters.

use std::collections::VecDeque;

use crate::Side;
use crate::adapter::{self, HttpInspector};
use crate::config::InspectConfig;
use crate::frame::{
    FLAG_ACK, FLAG_END_HEADERS, FLAG_END_STREAM, FLAG_PADDED, FrameHeader, FrameType,
    MAX_FRAME_PAYLOAD_LENGTH,
};
use crate::hpack::{HeaderDecoder, HeaderList};
use crate::infractions::{EventQueue, Infraction, Infractions};
use crate::pegs::pegs;
use crate::splitter::{CompleteFrame, FrameSplitter, SplitEvent};
use crate::stream::{
    Stream, StreamId, StreamState, cut_headers_fragment, cut_push_promise,
};
use crate::trace_warn;

/// Stream memory is charged in blocks of this many streams to amortize
/// accounting cost. The paired release uses the same granularity.
pub const STREAM_MEMORY_TRACKING_INCREMENT: u32 = 25;

/// Per-direction substate: everything that tracks one half of the
/// conversation.
struct DirectionState {
    splitter: FrameSplitter,
    hpack: HeaderDecoder,
    infractions: Infractions,
    events: EventQueue,
    /// Common-header fields of the frame currently being processed
    frame_type: FrameType,
    frame_length: u32,
    current_stream_id: StreamId,
    /// Highest accepted id initiated by this side
    max_stream_id: u32,
    /// A header block is open; the next frame must be CONTINUATION on
    /// `continuation_stream`
    continuation_expected: bool,
    continuation_stream: StreamId,
    /// Stream whose assembly buffer receives the open block's fragments
    /// (differs from `continuation_stream` for PUSH_PROMISE)
    assembly_stream: StreamId,
    /// The open block was started by PUSH_PROMISE: it carries a promised
    /// request even though it travels server-to-client
    assembly_from_promise: bool,
    /// Data cutter state: the stream the in-flight DATA frame acts on.
    /// Persists across segments while the frame's payload is arriving.
    data_stream: Option<StreamId>,
    /// Body bytes of the in-flight DATA frame go downstream
    data_deliver: bool,
    /// END_STREAM was set on the in-flight DATA frame
    data_end_stream: bool,
    /// PADDED was set but the pad-length octet has not arrived yet
    data_pad_expected: bool,
    /// Body octets of the in-flight DATA frame still to deliver
    data_content_remaining: u32,
    /// Trailing pad octets of the in-flight DATA frame still to skip
    remaining_data_padding: u8,
    /// Oversize threshold, updated by the peer's SETTINGS_MAX_FRAME_SIZE
    effective_max_frame_size: u32,
}

impl DirectionState {
    fn new(side: Side, max_table_size: usize, max_frame_size: u32) -> Self {
        Self {
            splitter: FrameSplitter::new(side),
            hpack: HeaderDecoder::new(max_table_size),
            infractions: Infractions::default(),
            events: EventQueue::default(),
            frame_type: FrameType::Unknown(0),
            frame_length: 0,
            current_stream_id: StreamId(0),
            max_stream_id: 0,
            continuation_expected: false,
            continuation_stream: StreamId(0),
            assembly_stream: StreamId(0),
            assembly_from_promise: false,
            data_stream: None,
            data_deliver: false,
            data_end_stream: false,
            data_pad_expected: false,
            data_content_remaining: 0,
            remaining_data_padding: 0,
            effective_max_frame_size: max_frame_size,
        }
    }
}

/// State engine for one observed HTTP/2 connection.
///
/// Feed each direction's bytes with [`on_segment`](Self::on_segment); the
/// reassembled messages are pushed to the owned [`HttpInspector`]. All
/// parsing is non-blocking and robust against adversarial input: malformed
/// frames become infractions and events, never panics.
pub struct FlowContext<I: HttpInspector> {
    config: InspectConfig,
    inspector: I,
    direction: [DirectionState; 2],
    /// Insertion at the front keeps the hot stream near the scan start;
    /// lookup is a linear scan bounded by the concurrency cap.
    streams: VecDeque<Stream<I::Handle>>,
    /// Live non-zero streams
    concurrent_streams: u32,
    /// Transient: the stream the current frame acts on
    processing_stream_id: Option<StreamId>,
    /// The processing stream exists only for a housekeeping frame and is
    /// deleted once the frame has been evaluated
    delete_stream: bool,
    /// Stream currently holding the downstream parser's context
    stream_in_hi: Option<StreamId>,
    /// Sticky per-direction kill switches
    abort_flow: [bool; 2],
    eof: [bool; 2],
    /// Stream slots charged to accounting, always a multiple of the
    /// tracking increment
    stream_memory_allocations_tracked: u32,
    /// Net bytes currently charged to the enclosing framework's accounting
    allocated_bytes: usize,
}

impl<I: HttpInspector> FlowContext<I> {
    /// Create the context for a new flow. Counts against the process-wide
    /// session pegs until dropped.
    pub fn new(config: InspectConfig, inspector: I) -> Self {
        pegs().session_started();
        let table = config.max_hpack_table_size;
        let mfs = config.max_frame_size;
        Self {
            direction: [
                DirectionState::new(Side::Client, table, mfs),
                DirectionState::new(Side::Server, table, mfs),
            ],
            config,
            inspector,
            streams: VecDeque::new(),
            concurrent_streams: 0,
            processing_stream_id: None,
            delete_stream: false,
            stream_in_hi: None,
            abort_flow: [false, false],
            eof: [false, false],
            stream_memory_allocations_tracked: 0,
            allocated_bytes: 0,
        }
    }

    /// Process one segment of bytes observed on `side`. Bytes arriving after
    /// the side has been aborted or closed are discarded.
    pub fn on_segment(&mut self, side: Side, data: &[u8]) {
        let di = side.idx();
        if self.abort_flow[di] || self.eof[di] {
            return;
        }

        let max = self.direction[di].effective_max_frame_size;
        let events = match self.direction[di].splitter.consume(data, max) {
            Ok(events) => events,
            Err(_) => {
                trace_warn!("flow does not start with the HTTP/2 preface");
                self.note(side, Infraction::BadPreface);
                self.abort_flow[di] = true;
                return;
            }
        };

        for event in events {
            if self.abort_flow[di] {
                break;
            }
            match event {
                SplitEvent::Frame(frame) => self.process_frame(side, frame),
                SplitEvent::DataStart(header) => self.start_data_frame(side, header),
                SplitEvent::DataPayload { bytes, last } => {
                    self.process_data_chunk(side, &bytes, last)
                }
            }
        }
    }

    /// The framework saw EOF on `side`; remaining buffered bytes are
    /// discarded and further segments ignored. Flow expiry itself is owned
    /// by the framework.
    pub fn on_eof(&mut self, side: Side) {
        self.eof[side.idx()] = true;
    }

    fn note(&mut self, side: Side, infraction: Infraction) {
        let d = &mut self.direction[side.idx()];
        d.infractions.record(infraction);
        d.events.create_event(infraction);
    }

    fn process_frame(&mut self, side: Side, frame: CompleteFrame) {
        let di = side.idx();
        {
            let d = &mut self.direction[di];
            d.frame_type = frame.header.frame_type;
            d.frame_length = frame.header.length;
            d.current_stream_id = frame.header.stream_id;
        }

        if frame.drop {
            self.note(side, Infraction::OversizeFrame);
            if self.direction[di].continuation_expected {
                // the open header block can no longer be completed
                self.note(side, Infraction::ContinuationExpected);
                self.abort_flow[di] = true;
            }
            return;
        }

        let ft = frame.header.frame_type;
        if self.direction[di].continuation_expected {
            if ft != FrameType::Continuation
                || frame.header.stream_id != self.direction[di].continuation_stream
            {
                trace_warn!("expected CONTINUATION, got {ft:?} on stream {}", frame.header.stream_id);
                self.note(side, Infraction::ContinuationExpected);
                self.abort_flow[di] = true;
                return;
            }
        } else if ft == FrameType::Continuation {
            self.note(side, Infraction::UnexpectedContinuation);
            self.abort_flow[di] = true;
            return;
        }

        self.set_processing_stream_id(side, &frame);

        match ft {
            // Non-dropped DATA frames arrive as DataStart/DataPayload
            // events, never as whole frames
            FrameType::Data => {}
            FrameType::Headers => self.process_headers(side, &frame),
            FrameType::PushPromise => self.process_push_promise(side, &frame),
            FrameType::Continuation => self.process_continuation(side, &frame),
            FrameType::RstStream => self.process_rst_stream(side),
            FrameType::Settings => self.process_settings(side, &frame),
            FrameType::Priority
            | FrameType::Ping
            | FrameType::Goaway
            | FrameType::WindowUpdate
            | FrameType::Unknown(_) => self.process_housekeeping(side),
        }

        if self.delete_stream {
            self.delete_processing_stream();
        }
        self.processing_stream_id = None;
        self.reap_closed_streams();
    }

    /// C6: choose the stream this frame acts on. PUSH_PROMISE redirects to
    /// the promised id when it is well formed; CONTINUATION stays with the
    /// stream whose block is being assembled.
    fn set_processing_stream_id(&mut self, side: Side, frame: &CompleteFrame) {
        debug_assert!(self.processing_stream_id.is_none());
        let di = side.idx();

        match self.direction[di].frame_type {
            FrameType::Continuation => {
                self.processing_stream_id = Some(self.direction[di].assembly_stream);
                return;
            }
            FrameType::PushPromise if self.config.enable_push_promise_tracking => {
                match cut_push_promise(frame.header.flags, &frame.payload) {
                    Ok((promised, _)) => {
                        let server_max = self.direction[Side::Server.idx()].max_stream_id;
                        let valid = !promised.is_connection()
                            && promised.initiated_by() == Side::Server
                            && promised.0 > server_max
                            && self.find_stream(promised).is_none();
                        if valid {
                            self.processing_stream_id = Some(promised);
                            return;
                        }
                        self.note(side, Infraction::BadPushPromise);
                    }
                    Err(()) => self.note(side, Infraction::BadPushPromise),
                }
            }
            _ => {}
        }

        self.processing_stream_id = Some(self.direction[di].current_stream_id);
    }

    fn find_stream(&self, id: StreamId) -> Option<usize> {
        self.streams.iter().position(|s| s.id() == id)
    }

    /// C4: resolve the processing stream, allocating on miss subject to the
    /// concurrency cap and per-side id monotonicity. Housekeeping frames get
    /// a transient entry that is deleted once the frame completes.
    fn get_or_create_processing_stream(&mut self, side: Side) -> Option<usize> {
        let key = self
            .processing_stream_id
            .expect("processing stream id not set");
        if let Some(idx) = self.find_stream(key) {
            return Some(idx);
        }

        let di = side.idx();
        if self.concurrent_streams >= self.config.max_concurrent_streams && !key.is_connection() {
            trace_warn!("stream {key} refused, concurrency cap reached");
            self.note(side, Infraction::TooManyStreams);
            pegs().flow_over_stream_limit();
            self.abort_flow = [true, true];
            return None;
        }

        let ft = self.direction[di].frame_type;
        let mut initial_state = StreamState::Idle;
        if !key.is_connection() {
            let non_housekeeping = matches!(
                ft,
                FrameType::Headers | FrameType::Data | FrameType::PushPromise
            );
            if non_housekeeping {
                // With both directions visible, odd ids are initiated by the
                // client and even ids by the server; ids on the initiating
                // side must be strictly increasing. A frame on the opposite
                // side (a response referencing a client stream) proves
                // nothing about ordering.
                if key.initiated_by() == side {
                    if key.0 <= self.direction[di].max_stream_id {
                        self.note(side, Infraction::InvalidStreamId);
                        return None;
                    }
                    self.direction[di].max_stream_id = key.0;
                }
            } else {
                // Prevents housekeeping frames from resurrecting completed
                // streams and keeping them alive
                self.delete_stream = true;
            }
            if ft == FrameType::PushPromise {
                initial_state = StreamState::ReservedRemote;
            }
        }

        self.streams.push_front(Stream::new(key, initial_state));
        if !key.is_connection() {
            self.concurrent_streams += 1;
            pegs().stream_opened();
            if self.concurrent_streams > self.stream_memory_allocations_tracked {
                self.update_stream_memory_allocations();
            }
        }
        Some(0)
    }

    fn delete_processing_stream(&mut self) {
        let key = self
            .processing_stream_id
            .expect("processing stream id not set");
        if let Some(idx) = self.find_stream(key) {
            self.remove_stream_at(idx);
        }
        self.delete_stream = false;
    }

    fn remove_stream_at(&mut self, idx: usize) {
        let mut stream = self.streams.remove(idx).expect("stream index out of range");
        if let Some(handle) = stream.take_hi_handle() {
            let size = self.inspector.size_of(&handle);
            self.allocated_bytes = self.allocated_bytes.saturating_sub(size);
        }
        if self.stream_in_hi == Some(stream.id()) {
            self.stream_in_hi = None;
        }
        if !stream.id().is_connection() {
            debug_assert!(self.concurrent_streams > 0);
            self.concurrent_streams = self.concurrent_streams.saturating_sub(1);
            pegs().stream_closed();
            self.release_unused_stream_memory();
        }
    }

    fn reap_closed_streams(&mut self) {
        while let Some(idx) = self.streams.iter().position(|s| s.eligible_for_delete()) {
            self.remove_stream_at(idx);
        }
    }

    // C5 dispatch targets ----------------------------------------------------

    fn process_headers(&mut self, side: Side, frame: &CompleteFrame) {
        let di = side.idx();
        let fragment = match cut_headers_fragment(frame.header.flags, &frame.payload) {
            Ok(f) => f,
            Err(()) => {
                self.note(side, Infraction::PaddingOverflow);
                return;
            }
        };

        let Some(idx) = self.get_or_create_processing_stream(side) else {
            return;
        };
        self.direction[di].assembly_from_promise = false;

        if !self.streams[idx].on_headers(side) {
            self.note(side, Infraction::BadFrameSequence);
        }
        if !self.streams[idx].is_aborted(side)
            && !self.streams[idx].append_fragment(side, fragment, self.config.max_header_list_size)
        {
            self.note(side, Infraction::HeaderListTooLarge);
        }
        if frame.header.flags & FLAG_END_STREAM != 0 {
            self.streams[idx].on_end_stream(side);
        }

        if frame.header.flags & FLAG_END_HEADERS != 0 {
            self.finish_header_block(side, idx);
        } else {
            let assembly = self.processing_stream_id.expect("processing stream id not set");
            let d = &mut self.direction[di];
            d.continuation_expected = true;
            d.continuation_stream = frame.header.stream_id;
            d.assembly_stream = assembly;
        }
    }

    fn process_continuation(&mut self, side: Side, frame: &CompleteFrame) {
        let Some(idx) = self.get_or_create_processing_stream(side) else {
            return;
        };
        if !self.streams[idx].is_aborted(side)
            && !self.streams[idx].append_fragment(
                side,
                &frame.payload,
                self.config.max_header_list_size,
            )
        {
            self.note(side, Infraction::HeaderListTooLarge);
        }
        if frame.header.flags & FLAG_END_HEADERS != 0 {
            self.finish_header_block(side, idx);
        }
    }

    fn process_push_promise(&mut self, side: Side, frame: &CompleteFrame) {
        let di = side.idx();
        let fragment = match cut_push_promise(frame.header.flags, &frame.payload) {
            Ok((_, fragment)) => fragment,
            Err(()) => {
                // With tracking enabled the selection step already recorded
                // the malformed promise
                if !self.config.enable_push_promise_tracking {
                    self.note(side, Infraction::BadPushPromise);
                }
                return;
            }
        };

        let Some(idx) = self.get_or_create_processing_stream(side) else {
            return;
        };
        self.direction[di].assembly_from_promise = true;

        if !self.streams[idx].is_aborted(side)
            && !self.streams[idx].append_fragment(side, fragment, self.config.max_header_list_size)
        {
            self.note(side, Infraction::HeaderListTooLarge);
        }

        if frame.header.flags & FLAG_END_HEADERS != 0 {
            self.finish_header_block(side, idx);
        } else {
            let assembly = self.processing_stream_id.expect("processing stream id not set");
            let d = &mut self.direction[di];
            d.continuation_expected = true;
            // CONTINUATION follows on the PUSH_PROMISE's own stream id, not
            // the promised one
            d.continuation_stream = frame.header.stream_id;
            d.assembly_stream = assembly;
        }
    }

    /// A DATA frame header arrived. Classification and stream resolution
    /// happen here; the payload follows as chunks, possibly across many
    /// segments, so the cutter's target and pad state live in the direction
    /// substate rather than in per-frame locals.
    fn start_data_frame(&mut self, side: Side, header: FrameHeader) {
        let di = side.idx();
        {
            let d = &mut self.direction[di];
            d.frame_type = header.frame_type;
            d.frame_length = header.length;
            d.current_stream_id = header.stream_id;
        }

        if self.direction[di].continuation_expected {
            trace_warn!("expected CONTINUATION, got DATA on stream {}", header.stream_id);
            self.note(side, Infraction::ContinuationExpected);
            self.abort_flow[di] = true;
            return;
        }

        self.processing_stream_id = Some(header.stream_id);
        let (stream, deliver) = match self.get_or_create_processing_stream(side) {
            Some(idx) => {
                if !self.streams[idx].on_data(side) {
                    self.note(side, Infraction::BadFrameSequence);
                }
                let s = &self.streams[idx];
                (Some(s.id()), s.msg[di].delivered && !s.is_aborted(side))
            }
            None => (None, false),
        };
        // The cutter owns the frame from here; the other direction may be
        // processed before this frame's payload finishes arriving.
        self.processing_stream_id = None;

        let d = &mut self.direction[di];
        d.data_stream = stream;
        d.data_deliver = deliver;
        d.data_end_stream = header.flags & FLAG_END_STREAM != 0;
        d.data_pad_expected = header.flags & FLAG_PADDED != 0;
        d.data_content_remaining = if d.data_pad_expected { 0 } else { header.length };
        d.remaining_data_padding = 0;
    }

    /// One slice of the in-flight DATA frame's payload: read the pad-length
    /// octet if still owed, stream the body bytes downstream, swallow
    /// trailing padding.
    fn process_data_chunk(&mut self, side: Side, bytes: &[u8], last: bool) {
        let di = side.idx();
        let mut offset = 0;

        if self.direction[di].data_pad_expected && !bytes.is_empty() {
            let pad_len = u32::from(bytes[0]);
            offset = 1;
            let frame_length = self.direction[di].frame_length;
            self.direction[di].data_pad_expected = false;
            if pad_len > frame_length - 1 {
                self.note(side, Infraction::PaddingOverflow);
                if let Some(sid) = self.direction[di].data_stream {
                    if let Some(idx) = self.find_stream(sid) {
                        self.streams[idx].abort(side);
                    }
                }
                let d = &mut self.direction[di];
                d.data_deliver = false;
                d.data_end_stream = false;
                // the rest of the frame is unusable; swallow it as padding
                d.data_content_remaining = 0;
                d.remaining_data_padding = 0;
            } else {
                let d = &mut self.direction[di];
                d.data_content_remaining = frame_length - 1 - pad_len;
                d.remaining_data_padding = pad_len as u8;
            }
        }

        let content = (self.direction[di].data_content_remaining as usize).min(bytes.len() - offset);
        if content > 0 {
            self.direction[di].data_content_remaining -= content as u32;
            if self.direction[di].data_deliver {
                if let Some(sid) = self.direction[di].data_stream {
                    if let Some(idx) = self.find_stream(sid) {
                        self.stream_in_hi = Some(sid);
                        let chunk = &bytes[offset..offset + content];
                        let stream = &mut self.streams[idx];
                        if let Some(handle) = stream.hi_handle_mut() {
                            if self.inspector.push_body(handle, chunk).is_err() {
                                let d = &mut self.direction[di];
                                d.infractions.record(Infraction::DownstreamError);
                                d.events.create_event(Infraction::DownstreamError);
                                d.data_deliver = false;
                                stream.abort(side);
                            }
                        }
                    }
                }
            }
            offset += content;
        }

        // Whatever is left of the slice can only be trailing padding
        let padding = bytes.len() - offset;
        if padding > 0 {
            let d = &mut self.direction[di];
            d.remaining_data_padding = d.remaining_data_padding.saturating_sub(padding as u8);
        }

        if last {
            self.finish_data_frame(side);
        }
    }

    fn finish_data_frame(&mut self, side: Side) {
        let di = side.idx();
        if self.direction[di].data_pad_expected {
            // PADDED with a zero-length payload: no room for the pad-length
            // octet
            self.note(side, Infraction::PaddingOverflow);
            if let Some(sid) = self.direction[di].data_stream {
                if let Some(idx) = self.find_stream(sid) {
                    self.streams[idx].abort(side);
                }
            }
        } else if self.direction[di].data_end_stream {
            if let Some(sid) = self.direction[di].data_stream {
                if let Some(idx) = self.find_stream(sid) {
                    self.streams[idx].on_end_stream(side);
                    self.maybe_finish_message(side, idx);
                }
            }
        }

        let d = &mut self.direction[di];
        d.data_stream = None;
        d.data_deliver = false;
        d.data_end_stream = false;
        d.data_pad_expected = false;
        d.data_content_remaining = 0;
        d.remaining_data_padding = 0;
        self.reap_closed_streams();
    }

    fn process_rst_stream(&mut self, side: Side) {
        let Some(idx) = self.get_or_create_processing_stream(side) else {
            return;
        };
        self.streams[idx].force_close();
        self.direction[side.idx()].hpack.reset();
    }

    fn process_settings(&mut self, side: Side, frame: &CompleteFrame) {
        let _ = self.get_or_create_processing_stream(side);

        if !frame.header.stream_id.is_connection() {
            self.note(side, Infraction::BadSettingsFrame);
            return;
        }
        if frame.header.flags & FLAG_ACK != 0 {
            if !frame.payload.is_empty() {
                self.note(side, Infraction::BadSettingsFrame);
            }
            return;
        }
        if !frame.payload.len().is_multiple_of(6) {
            self.note(side, Infraction::BadSettingsFrame);
            return;
        }

        for entry in frame.payload.chunks_exact(6) {
            let id = u16::from_be_bytes([entry[0], entry[1]]);
            let value = u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]);
            // SETTINGS_MAX_FRAME_SIZE announced by this side bounds the
            // frames its peer may send; values outside the RFC range are
            // ignored. Other settings have no effect on a passive observer.
            if id == 0x05 && (16_384..=MAX_FRAME_PAYLOAD_LENGTH).contains(&value) {
                self.direction[side.other().idx()].effective_max_frame_size = value;
            }
        }
    }

    fn process_housekeeping(&mut self, side: Side) {
        // The transient entry keeps id bookkeeping consistent for
        // stream-targeted housekeeping frames (PRIORITY, WINDOW_UPDATE)
        let _ = self.get_or_create_processing_stream(side);
    }

    /// END_HEADERS: hand the assembled block to the HPACK collaborator and
    /// deliver the decoded list downstream.
    fn finish_header_block(&mut self, side: Side, idx: usize) {
        let di = side.idx();
        let from_promise = self.direction[di].assembly_from_promise;
        self.direction[di].continuation_expected = false;
        self.direction[di].assembly_from_promise = false;
        let block = self.streams[idx].take_assembly(side);

        if self.streams[idx].is_aborted(side) {
            self.direction[di].hpack.reset();
            return;
        }

        match self.direction[di].hpack.feed(&block, true) {
            Err(_e) => {
                trace_warn!("{_e}");
                self.note(side, Infraction::HpackError);
                // the dynamic table is corrupt; nothing later on this side
                // can be decoded reliably
                self.abort_flow[di] = true;
            }
            Ok(()) => {
                let list = self.direction[di].hpack.take_header_list();
                // A promised request travels server-to-client but occupies
                // the stream's request slot, and is complete by definition:
                // no body or trailers may follow it.
                let role = if from_promise { Side::Client } else { side };
                if from_promise && self.streams[idx].state() == StreamState::ReservedRemote {
                    self.streams[idx].on_end_stream(Side::Client);
                }
                self.deliver_headers(side, role, idx, &list);
            }
        }
    }

    /// C7: reshape the decoded list and drive the downstream inspector.
    /// `side` is the wire direction (for infraction attribution); `role` is
    /// the message slot the block fills, which differs for promised
    /// requests.
    fn deliver_headers(&mut self, side: Side, role: Side, idx: usize, list: &HeaderList) {
        let ri = role.idx();
        if self.streams[idx].msg[ri].delivered {
            // trailer block; the message boundary is still END_STREAM
            self.maybe_finish_message(role, idx);
            return;
        }

        let synthesis = adapter::synthesize(list);
        for infraction in &synthesis.infractions {
            self.note(side, *infraction);
        }
        let Some((kind, headers)) = synthesis.message else {
            self.streams[idx].abort(role);
            return;
        };

        self.stream_in_hi = Some(self.streams[idx].id());
        let stream = &mut self.streams[idx];
        if stream.hi_handle().is_none() {
            let handle = self.inspector.new_handle();
            let size = self.inspector.size_of(&handle);
            self.allocated_bytes += size;
            stream.set_hi_handle(handle);
        }
        let handle = stream.hi_handle_mut().expect("handle just ensured");
        let result = self
            .inspector
            .begin_message(handle, kind)
            .and_then(|_| self.inspector.push_headers(handle, &headers));
        match result {
            Ok(()) => stream.msg[ri].delivered = true,
            Err(_) => {
                let d = &mut self.direction[side.idx()];
                d.infractions.record(Infraction::DownstreamError);
                d.events.create_event(Infraction::DownstreamError);
                stream.abort(role);
            }
        }

        self.maybe_finish_message(role, idx);
    }

    fn maybe_finish_message(&mut self, side: Side, idx: usize) {
        let di = side.idx();
        let progress = self.streams[idx].msg[di];
        if !progress.delivered || !progress.ended || progress.finished {
            return;
        }
        let stream = &mut self.streams[idx];
        if let Some(handle) = stream.hi_handle_mut() {
            if self.inspector.end_message(handle).is_err() {
                let d = &mut self.direction[di];
                d.infractions.record(Infraction::DownstreamError);
                d.events.create_event(Infraction::DownstreamError);
            }
        }
        stream.msg[di].finished = true;
    }

    // C9: memory accounting --------------------------------------------------

    fn stream_memory_size() -> usize {
        size_of::<Stream<I::Handle>>()
    }

    fn stream_increment_memory_size() -> usize {
        Self::stream_memory_size() * STREAM_MEMORY_TRACKING_INCREMENT as usize
    }

    fn update_stream_memory_allocations(&mut self) {
        self.allocated_bytes += Self::stream_increment_memory_size();
        self.stream_memory_allocations_tracked += STREAM_MEMORY_TRACKING_INCREMENT;
    }

    fn update_stream_memory_deallocations(&mut self) {
        debug_assert!(self.stream_memory_allocations_tracked >= STREAM_MEMORY_TRACKING_INCREMENT);
        self.allocated_bytes = self
            .allocated_bytes
            .saturating_sub(Self::stream_increment_memory_size());
        self.stream_memory_allocations_tracked -= STREAM_MEMORY_TRACKING_INCREMENT;
    }

    /// Stream memory is allocated in whole blocks, so it is released in
    /// whole blocks: only once an entire increment is unused.
    fn release_unused_stream_memory(&mut self) {
        let needed = self
            .concurrent_streams
            .div_ceil(STREAM_MEMORY_TRACKING_INCREMENT)
            * STREAM_MEMORY_TRACKING_INCREMENT;
        while self.stream_memory_allocations_tracked > needed {
            self.update_stream_memory_deallocations();
        }
    }

    /// Charge the downstream handle's self-reported size.
    pub fn allocate_hi_memory(&mut self, handle: &I::Handle) {
        self.allocated_bytes += self.inspector.size_of(handle);
    }

    /// Release the downstream handle's self-reported size.
    pub fn deallocate_hi_memory(&mut self, handle: &I::Handle) {
        let size = self.inspector.size_of(handle);
        self.allocated_bytes = self.allocated_bytes.saturating_sub(size);
    }

    /// Static baseline footprint: the context itself, one stream-memory
    /// block up front, one extra slot for stream 0, and both directions'
    /// event/infraction accumulators.
    pub fn query_size() -> usize {
        size_of::<Self>()
            + Self::stream_increment_memory_size()
            + Self::stream_memory_size()
            + 2 * size_of::<EventQueue>()
            + 2 * size_of::<Infractions>()
    }

    /// Baseline footprint of this flow, as reported to the framework.
    pub fn size_of(&self) -> usize {
        Self::query_size()
    }

    // Accessors --------------------------------------------------------------

    /// Accumulated infractions for `side`.
    pub fn infractions(&self, side: Side) -> Infractions {
        self.direction[side.idx()].infractions
    }

    /// Drain the event queue for `side` in arrival order.
    pub fn take_events(&mut self, side: Side) -> Vec<Infraction> {
        self.direction[side.idx()].events.drain()
    }

    /// Live non-zero streams in this flow.
    pub fn concurrent_streams(&self) -> u32 {
        self.concurrent_streams
    }

    /// Stream slots currently charged to accounting (multiple of the
    /// tracking increment).
    pub fn stream_memory_allocations_tracked(&self) -> u32 {
        self.stream_memory_allocations_tracked
    }

    /// Net bytes charged to the framework's memory accounting beyond the
    /// static baseline.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// Whether `side` has been aborted.
    pub fn is_aborted(&self, side: Side) -> bool {
        self.abort_flow[side.idx()]
    }

    /// Bytes buffered in the splitter for `side` pending frame completion.
    pub fn buffered_bytes(&self, side: Side) -> usize {
        self.direction[side.idx()].splitter.buffered()
    }

    /// Type and payload length of the frame most recently classified on
    /// `side`.
    pub fn current_frame(&self, side: Side) -> (FrameType, u32) {
        let d = &self.direction[side.idx()];
        (d.frame_type, d.frame_length)
    }

    /// True while the server direction is inside a frame, a DATA cut, or an
    /// open header block; used by frameworks deciding whether the flow can
    /// be paused safely.
    pub fn is_mid_frame(&self) -> bool {
        let d = &self.direction[Side::Server.idx()];
        d.splitter.mid_frame() || d.remaining_data_padding != 0 || d.continuation_expected
    }

    /// The stream currently holding the downstream parser's context.
    pub fn stream_in_hi(&self) -> Option<StreamId> {
        self.stream_in_hi
    }

    /// Lifecycle state of a tracked stream.
    pub fn stream_state(&self, id: StreamId) -> Option<StreamState> {
        self.find_stream(id).map(|idx| self.streams[idx].state())
    }

    /// The downstream inspector.
    pub fn inspector(&self) -> &I {
        &self.inspector
    }

    /// The downstream inspector, mutably.
    pub fn inspector_mut(&mut self) -> &mut I {
        &mut self.inspector
    }

    /// The limits this flow was created with.
    pub fn config(&self) -> &InspectConfig {
        &self.config
    }
}

impl<I: HttpInspector> Drop for FlowContext<I> {
    fn drop(&mut self) {
        pegs().session_ended();
        for stream in &self.streams {
            if !stream.id().is_connection() {
                pegs().stream_closed();
            }
        }
        // Blocks were charged 25 streams at a time, so teardown releases
        // them with the same rounding.
        while self.stream_memory_allocations_tracked >= STREAM_MEMORY_TRACKING_INCREMENT {
            self.update_stream_memory_deallocations();
        }
    }
}

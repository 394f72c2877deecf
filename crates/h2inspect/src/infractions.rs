use std::collections::VecDeque;
use std::fmt;

/// Named protocol violations observed on one direction of a flow.
///
/// Infractions are recorded twice: once in a per-direction bitset (sticky,
/// queried after the fact) and once in a per-direction ordered event queue
/// (drained by the alerting layer). The two channels share codes but are
/// independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Infraction {
    /// Client bytes did not begin with the 24-octet connection preface
    BadPreface            = 0,
    /// Advertised frame length exceeds the effective max frame size
    OversizeFrame         = 1,
    /// Non-housekeeping stream id not strictly greater than all prior ids
    /// initiated by the same side
    InvalidStreamId       = 2,
    /// Stream creation refused because the concurrency cap was reached
    TooManyStreams        = 3,
    /// PUSH_PROMISE promised id is zero, client-parity, stale, or collides
    /// with a live stream
    BadPushPromise        = 4,
    /// Pad length meets or exceeds the remaining payload
    PaddingOverflow       = 5,
    /// Header block fragment failed HPACK decoding
    HpackError            = 6,
    /// A frame other than CONTINUATION (or on another stream) arrived while
    /// a header block was open
    ContinuationExpected  = 7,
    /// CONTINUATION arrived with no header block open
    UnexpectedContinuation = 8,
    /// Assembled header block exceeds the configured limit
    HeaderListTooLarge    = 9,
    /// SETTINGS payload malformed (length not a multiple of 6, non-zero
    /// stream id, or payload on an ACK)
    BadSettingsFrame      = 10,
    /// Frame is illegal in the stream's current lifecycle state
    BadFrameSequence      = 11,
    /// Required pseudo-header absent from a header block
    PseudoHeaderMissing   = 12,
    /// Pseudo-header appeared more than once
    PseudoHeaderDuplicated = 13,
    /// Pseudo-header appeared after a regular header
    PseudoHeaderMisplaced = 14,
    /// Pseudo-header value unusable for start-line synthesis (unknown name,
    /// invalid method token, non-numeric status, or request/response mix)
    BadPseudoHeaderValue  = 15,
    /// The downstream HTTP/1 inspector reported an error for this stream
    DownstreamError       = 16,
}

impl fmt::Display for Infraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BadPreface => "bad connection preface",
            Self::OversizeFrame => "frame exceeds max frame size",
            Self::InvalidStreamId => "stream id not monotonically increasing",
            Self::TooManyStreams => "concurrent stream limit reached",
            Self::BadPushPromise => "invalid promised stream id",
            Self::PaddingOverflow => "pad length exceeds payload",
            Self::HpackError => "HPACK decoding failed",
            Self::ContinuationExpected => "expected CONTINUATION frame",
            Self::UnexpectedContinuation => "CONTINUATION without open header block",
            Self::HeaderListTooLarge => "header block exceeds size limit",
            Self::BadSettingsFrame => "malformed SETTINGS frame",
            Self::BadFrameSequence => "frame illegal in stream state",
            Self::PseudoHeaderMissing => "missing pseudo-header",
            Self::PseudoHeaderDuplicated => "duplicated pseudo-header",
            Self::PseudoHeaderMisplaced => "pseudo-header after regular header",
            Self::BadPseudoHeaderValue => "pseudo-header value unusable",
            Self::DownstreamError => "downstream inspector error",
        };
        f.write_str(name)
    }
}

/// Fixed-size bitset of accumulated infractions for one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Infractions(u64);

impl Infractions {
    pub(crate) fn record(&mut self, infraction: Infraction) {
        self.0 |= 1u64 << (infraction as u8);
    }

    /// Whether the given infraction has been recorded.
    pub fn has(&self, infraction: Infraction) -> bool {
        self.0 & (1u64 << (infraction as u8)) != 0
    }

    /// True when no infraction has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Raw bit representation, one bit per [`Infraction`] discriminant.
    pub fn bits(&self) -> u64 {
        self.0
    }
}

/// Ordered queue of event identifiers surfaced to the alerting layer.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Infraction>,
}

impl EventQueue {
    pub(crate) fn create_event(&mut self, event: Infraction) {
        self.events.push_back(event);
    }

    /// Remove and return all queued events in arrival order.
    pub fn drain(&mut self) -> Vec<Infraction> {
        self.events.drain(..).collect()
    }

    /// Number of events currently queued.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events are queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_record_and_query() {
        let mut inf = Infractions::default();
        assert!(inf.is_empty());

        inf.record(Infraction::OversizeFrame);
        inf.record(Infraction::PaddingOverflow);
        assert!(inf.has(Infraction::OversizeFrame));
        assert!(inf.has(Infraction::PaddingOverflow));
        assert!(!inf.has(Infraction::BadPreface));
        assert!(!inf.is_empty());
    }

    #[test]
    fn test_bitset_record_is_idempotent() {
        let mut inf = Infractions::default();
        inf.record(Infraction::HpackError);
        let bits = inf.bits();
        inf.record(Infraction::HpackError);
        assert_eq!(inf.bits(), bits);
    }

    #[test]
    fn test_event_queue_preserves_order() {
        let mut events = EventQueue::default();
        events.create_event(Infraction::TooManyStreams);
        events.create_event(Infraction::InvalidStreamId);
        events.create_event(Infraction::TooManyStreams);
        assert_eq!(events.len(), 3);

        let drained = events.drain();
        assert_eq!(
            drained,
            vec![
                Infraction::TooManyStreams,
                Infraction::InvalidStreamId,
                Infraction::TooManyStreams
            ]
        );
        assert!(events.is_empty());
    }
}

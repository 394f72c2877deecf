//! HPACK collaborator: header block assembly and decoding for one direction.
//!
//! Literal and Huffman decoding are delegated to `loona-hpack`; this module
//! owns the fragment buffer, the decode-on-END_HEADERS trigger, and the
//! handoff of the decoded header list. The dynamic table lives inside the
//! wrapped decoder and persists across header blocks for the lifetime of the
//! flow direction.

use std::fmt;

/// HPACK decoding failure. The wrapped decoder's own diagnostic is preserved
/// as a string; the dynamic table must be considered corrupt afterwards.
#[derive(Debug, Clone)]
pub struct HpackError {
    detail: String,
}

impl fmt::Display for HpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HPACK decoding error: {}", self.detail)
    }
}

impl std::error::Error for HpackError {}

/// A decoded header list in wire order, names and values as raw octets.
pub type HeaderList = Vec<(Vec<u8>, Vec<u8>)>;

/// Per-direction HPACK decoder state.
pub(crate) struct HeaderDecoder {
    decoder: loona_hpack::Decoder<'static>,
    fragments: Vec<u8>,
    decoded: Option<HeaderList>,
}

impl HeaderDecoder {
    pub(crate) fn new(max_table_size: usize) -> Self {
        let mut decoder = loona_hpack::Decoder::new();
        decoder.set_max_allowed_table_size(max_table_size);
        Self {
            decoder,
            fragments: Vec::new(),
            decoded: None,
        }
    }

    /// Feed one header block fragment. When `is_end_headers` is set the
    /// accumulated block is decoded and the result becomes available via
    /// [`take_header_list`](Self::take_header_list).
    pub(crate) fn feed(&mut self, fragment: &[u8], is_end_headers: bool) -> Result<(), HpackError> {
        self.fragments.extend_from_slice(fragment);
        if !is_end_headers {
            return Ok(());
        }

        let block = std::mem::take(&mut self.fragments);
        let list = self.decoder.decode(&block).map_err(|e| HpackError {
            detail: format!("{e:?}"),
        })?;
        self.decoded = Some(list);
        Ok(())
    }

    /// Retrieve the header list decoded by the last END_HEADERS feed.
    /// Empty if no block has completed since the previous call.
    pub(crate) fn take_header_list(&mut self) -> HeaderList {
        self.decoded.take().unwrap_or_default()
    }

    /// Discard any partial block and pending decode output. Called on
    /// RST_STREAM or when the assembling stream is aborted. The dynamic
    /// table is intentionally preserved: later blocks on this direction may
    /// still reference entries added by earlier ones.
    pub(crate) fn reset(&mut self) {
        self.fragments.clear();
        self.decoded = None;
    }
}

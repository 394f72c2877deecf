//! Downstream adapter: HTTP/1-shaped message delivery.
//!
//! Each completed header block is reshaped into an HTTP/1 start line plus
//! header fields (`:method`/`:scheme`/`:authority`/`:path` for requests,
//! `:status` for responses, `:authority` mapped to `host`) and pushed to the
//! downstream inspector through the [`HttpInspector`] trait, followed by the
//! stream's DATA body in arrival order.

use std::fmt;

use http::{Method, StatusCode};

use crate::hpack::HeaderList;
use crate::infractions::Infraction;

/// Whether a message is a request or a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MessageKind {
    Request,
    Response,
}

/// An HTTP/1-shaped view of one HTTP/2 message's headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http1Headers {
    /// Synthesized start line, e.g. `GET / HTTP/1.1` or `HTTP/1.1 200 OK`
    pub start_line: String,
    /// Remaining header fields in wire order, `host` first when synthesized
    /// from `:authority`
    pub fields: Vec<(String, String)>,
}

/// Error reported by the downstream HTTP/1 inspector. Recorded against the
/// owning stream; never aborts the flow.
#[derive(Debug, Clone)]
pub struct InspectError {
    detail: String,
}

impl InspectError {
    /// Wrap an inspector-side failure description.
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for InspectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "downstream inspector error: {}", self.detail)
    }
}

impl std::error::Error for InspectError {}

/// The downstream HTTP/1 inspector.
///
/// Implement this trait to receive the HTTP/1-shaped messages reassembled
/// from each stream. One handle exists per stream holding the inspector's
/// context; the adapter swaps the active handle as interleaved streams take
/// turns. `size_of` is the handle's self-reported footprint, charged and
/// released through the flow's memory accounting.
pub trait HttpInspector {
    /// Per-stream context owned by the inspector.
    type Handle;

    /// Create the context for a new stream's messages.
    fn new_handle(&mut self) -> Self::Handle;

    /// A message is starting on this handle.
    fn begin_message(
        &mut self,
        handle: &mut Self::Handle,
        kind: MessageKind,
    ) -> Result<(), InspectError>;

    /// The message's synthesized start line and header fields.
    fn push_headers(
        &mut self,
        handle: &mut Self::Handle,
        headers: &Http1Headers,
    ) -> Result<(), InspectError>;

    /// One body chunk, already de-padded, in arrival order.
    fn push_body(&mut self, handle: &mut Self::Handle, chunk: &[u8]) -> Result<(), InspectError>;

    /// The message is complete (END_STREAM observed).
    fn end_message(&mut self, handle: &mut Self::Handle) -> Result<(), InspectError>;

    /// The handle's current memory footprint in bytes.
    fn size_of(&self, handle: &Self::Handle) -> usize;
}

/// Inspector that discards everything. Useful when only the connection-level
/// observability (infractions, events, peg counters) is of interest.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInspector;

impl HttpInspector for NullInspector {
    type Handle = ();

    fn new_handle(&mut self) -> Self::Handle {}

    fn begin_message(
        &mut self,
        _handle: &mut Self::Handle,
        _kind: MessageKind,
    ) -> Result<(), InspectError> {
        Ok(())
    }

    fn push_headers(
        &mut self,
        _handle: &mut Self::Handle,
        _headers: &Http1Headers,
    ) -> Result<(), InspectError> {
        Ok(())
    }

    fn push_body(&mut self, _handle: &mut Self::Handle, _chunk: &[u8]) -> Result<(), InspectError> {
        Ok(())
    }

    fn end_message(&mut self, _handle: &mut Self::Handle) -> Result<(), InspectError> {
        Ok(())
    }

    fn size_of(&self, _handle: &Self::Handle) -> usize {
        0
    }
}

/// Outcome of reshaping a decoded header list.
pub(crate) struct Synthesis {
    /// The message to deliver, absent when no start line could be built
    pub(crate) message: Option<(MessageKind, Http1Headers)>,
    /// Pseudo-header discipline violations found along the way
    pub(crate) infractions: Vec<Infraction>,
}

/// Build an HTTP/1-shaped start line and header list from HTTP/2
/// pseudo-headers. Pseudo-headers must precede regular headers and appear
/// at most once; requests need `:method`, `:scheme` and `:path`, responses
/// a numeric `:status`.
pub(crate) fn synthesize(decoded: &HeaderList) -> Synthesis {
    let mut infractions = Vec::new();

    let mut method: Option<String> = None;
    let mut scheme: Option<String> = None;
    let mut path: Option<String> = None;
    let mut authority: Option<String> = None;
    let mut status: Option<String> = None;
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut regular_seen = false;

    for (name, value) in decoded {
        let name_str = String::from_utf8_lossy(name).to_string();
        let value_str = String::from_utf8_lossy(value).to_string();

        if name_str.starts_with(':') {
            if regular_seen {
                infractions.push(Infraction::PseudoHeaderMisplaced);
                continue;
            }
            let slot = match name_str.as_str() {
                ":method" => &mut method,
                ":scheme" => &mut scheme,
                ":path" => &mut path,
                ":authority" => &mut authority,
                ":status" => &mut status,
                _ => {
                    infractions.push(Infraction::BadPseudoHeaderValue);
                    continue;
                }
            };
            if slot.is_some() {
                infractions.push(Infraction::PseudoHeaderDuplicated);
            } else {
                *slot = Some(value_str);
            }
        } else {
            regular_seen = true;
            fields.push((name_str, value_str));
        }
    }

    let message = build_start_line(method, scheme, path, authority, status, fields, &mut infractions);
    Synthesis {
        message,
        infractions,
    }
}

fn build_start_line(
    method: Option<String>,
    scheme: Option<String>,
    path: Option<String>,
    authority: Option<String>,
    status: Option<String>,
    fields: Vec<(String, String)>,
    infractions: &mut Vec<Infraction>,
) -> Option<(MessageKind, Http1Headers)> {
    match (&method, &status) {
        (Some(_), Some(_)) => {
            // A message cannot be both a request and a response
            infractions.push(Infraction::BadPseudoHeaderValue);
            None
        }
        (Some(m), None) => {
            if Method::from_bytes(m.as_bytes()).is_err() {
                infractions.push(Infraction::BadPseudoHeaderValue);
                return None;
            }
            if scheme.is_none() || path.is_none() {
                infractions.push(Infraction::PseudoHeaderMissing);
                return None;
            }
            let mut out = Vec::with_capacity(fields.len() + 1);
            if let Some(host) = authority {
                out.push(("host".to_string(), host));
            }
            out.extend(fields);
            Some((
                MessageKind::Request,
                Http1Headers {
                    start_line: format!("{} {} HTTP/1.1", m, path.as_deref().unwrap_or("/")),
                    fields: out,
                },
            ))
        }
        (None, Some(s)) => {
            let code = match s.parse::<u16>().ok().and_then(|c| StatusCode::from_u16(c).ok()) {
                Some(code) => code,
                None => {
                    infractions.push(Infraction::BadPseudoHeaderValue);
                    return None;
                }
            };
            let reason = code.canonical_reason().unwrap_or("");
            Some((
                MessageKind::Response,
                Http1Headers {
                    start_line: format!("HTTP/1.1 {} {}", code.as_u16(), reason)
                        .trim_end()
                        .to_string(),
                    fields,
                },
            ))
        }
        (None, None) => {
            infractions.push(Infraction::PseudoHeaderMissing);
            None
        }
    }
}

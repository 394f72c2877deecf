/// Configurable limits for per-flow HTTP/2 inspection.
///
/// These limits defend against resource exhaustion from untrusted input
/// (stream flooding, HPACK decompression bombs, oversized frames).
#[derive(Debug, Clone)]
pub struct InspectConfig {
    /// Maximum concurrent non-zero streams per flow before new streams are
    /// refused (default: 100)
    pub max_concurrent_streams:        u32,
    /// Maximum advertised frame payload length in bytes; larger frames are
    /// consumed for synchronization but dropped (default: 16384, RFC 7540
    /// initial value)
    pub max_frame_size:                u32,
    /// Maximum assembled header block size per stream and direction in bytes
    /// (default: 65536)
    pub max_header_list_size:          usize,
    /// Hard cap for the HPACK dynamic table (default: 65536)
    pub max_hpack_table_size:          usize,
    /// Whether compressed bodies may be passed through to the downstream
    /// HTTP/1 inspector (default: true)
    pub gzip_allowed:                  bool,
    /// Whether PUSH_PROMISE frames pre-create the promised stream (default:
    /// true). When disabled, promised header blocks are attributed to the
    /// parent stream.
    pub enable_push_promise_tracking:  bool,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams:       100,
            max_frame_size:               16_384,
            max_header_list_size:         65_536,
            max_hpack_table_size:         65_536,
            gzip_allowed:                 true,
            enable_push_promise_tracking: true,
        }
    }
}

//! Fuzz target: raw byte segments
//!
//! Feeds completely random bytes to both directions of a flow. The goal is
//! to ensure the inspector never panics on arbitrary input, in any
//! segmentation.

#![no_main]

use h2inspect::{FlowContext, InspectConfig, NullInspector, Side};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Whole buffer, client side
    let mut flow = FlowContext::new(InspectConfig::default(), NullInspector);
    flow.on_segment(Side::Client, data);

    // Same bytes on the server side (no preface expected there)
    let mut flow = FlowContext::new(InspectConfig::default(), NullInspector);
    flow.on_segment(Side::Server, data);

    // Split across segments to exercise partial-frame buffering
    if data.len() > 10 {
        let mut flow = FlowContext::new(InspectConfig::default(), NullInspector);
        let mid = data.len() / 2;
        flow.on_segment(Side::Client, &data[..mid]);
        flow.on_segment(Side::Client, &data[mid..]);
        flow.on_eof(Side::Client);
    }

    // Alternate directions at odd boundaries
    let mut flow = FlowContext::new(InspectConfig::default(), NullInspector);
    for (i, chunk) in data.chunks(7).enumerate() {
        let side = if i % 2 == 0 { Side::Client } else { Side::Server };
        flow.on_segment(side, chunk);
    }
});

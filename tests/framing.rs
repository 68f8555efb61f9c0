// SPDX-License-Identifier: BSD-3-Clause

mod common;

use common::{envelope, MemChannel};
use core_comm::types::D2HMessageType;
use core_comm::Framer;

#[test]
fn resynchronizes_past_leading_garbage_from_a_fresh_connection() {
    let body = b"settled in";
    let mut wire = vec![0xFF, 0x00, 0x5A, 0x5A, 0x00];
    wire.extend(envelope(D2HMessageType::LogReply as u8, body));

    let mut framer = Framer::new(MemChannel::new(wire));
    let ty = framer.read_header().unwrap();
    assert_eq!(ty, D2HMessageType::LogReply);
    assert_eq!(framer.read_chunk(body.len()).unwrap(), body);
}

#[test]
fn session_reset_sentinel_is_followed_by_a_fresh_header() {
    let mut framer = Framer::new(MemChannel::new(envelope(D2HMessageType::LogReply as u8, b"ok")));
    framer.reset_session().unwrap();

    // The sentinel was written to the channel; a subsequent read still
    // parses the queued inbound reply correctly because reset only clears
    // local state, it doesn't touch the wire we're receiving.
    let ty = framer.read_header().unwrap();
    assert_eq!(ty, D2HMessageType::LogReply);
}

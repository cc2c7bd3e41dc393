use crate::error::ProtocolResult;
use crate::wire::{WireReader, WireWriter};
use types::MemberId;

/// Handshake sent by a member when its management service starts.
///
/// The response is a boolean telling the sender whether the responder
/// hosts an MBean server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announce {
    pub member_from: MemberId,
    pub managing_node: bool,
}

impl Announce {
    pub fn encode_body(&self, w: &mut WireWriter) -> ProtocolResult<()> {
        w.put_u32(self.member_from);
        w.put_bool(self.managing_node);
        Ok(())
    }

    pub fn decode_body(r: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            member_from: r.read_u32()?,
            managing_node: r.read_bool()?,
        })
    }
}

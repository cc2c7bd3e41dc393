use crate::error::ProtocolResult;
use crate::wire::{WireReader, WireWriter};
use types::MemberId;

/// Removal of a global model. A name ending in `,*` removes every model
/// matching the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unregister {
    pub member_from: MemberId,
    pub name: String,
}

impl Unregister {
    pub fn encode_body(&self, w: &mut WireWriter) -> ProtocolResult<()> {
        w.put_u32(self.member_from);
        w.put_utf(&self.name);
        Ok(())
    }

    pub fn decode_body(r: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            member_from: r.read_u32()?,
            name: r.read_utf()?,
        })
    }
}

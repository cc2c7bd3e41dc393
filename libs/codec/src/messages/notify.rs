use crate::error::ProtocolResult;
use crate::wire::{WireReader, WireWriter};
use tracing::warn;
use types::{MemberId, Notification};

/// Relay of a notification from the owning member to subscribers.
///
/// A notification that cannot be decoded is logged and left as `None`; the
/// frame itself still decodes so the channel keeps working.
#[derive(Debug, Clone, PartialEq)]
pub struct Notify {
    pub member_from: MemberId,
    pub name: String,
    pub notification: Option<Notification>,
}

impl Notify {
    pub fn encode_body(&self, w: &mut WireWriter) -> ProtocolResult<()> {
        w.put_u32(self.member_from);
        w.put_utf(&self.name);
        w.put_serialized(&self.notification, "notification")
    }

    pub fn decode_body(r: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let member_from = r.read_u32()?;
        let name = r.read_utf()?;
        let notification = match r.read_deferred::<Option<Notification>>("notification")? {
            Ok(n) => n,
            Err(reason) => {
                warn!(model = %name, member_from, %reason, "Dropping undecodable notification");
                None
            }
        };
        Ok(Self {
            member_from,
            name,
            notification,
        })
    }
}

use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::{WireReader, WireWriter};
use types::{MemberId, RemoteHolder};

pub const ACTION_SUBSCRIBE: u8 = 0;
pub const ACTION_UNSUBSCRIBE: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionChange {
    Add(RemoteHolder),
    Remove {
        member_id: MemberId,
        holder_ids: Vec<i64>,
    },
}

/// Listener subscription relay towards the owning member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub member_from: MemberId,
    pub name: String,
    pub change: SubscriptionChange,
}

impl Subscribe {
    pub fn action(&self) -> u8 {
        match self.change {
            SubscriptionChange::Add(_) => ACTION_SUBSCRIBE,
            SubscriptionChange::Remove { .. } => ACTION_UNSUBSCRIBE,
        }
    }

    pub fn encode_body(&self, w: &mut WireWriter) -> ProtocolResult<()> {
        w.put_u32(self.member_from);
        w.put_utf(&self.name);
        w.put_u8(self.action());
        match &self.change {
            SubscriptionChange::Add(holder) => w.put_serialized(holder, "listener holder")?,
            SubscriptionChange::Remove {
                member_id,
                holder_ids,
            } => {
                w.put_u32(*member_id);
                w.put_i32(holder_ids.len() as i32);
                for id in holder_ids {
                    w.put_i64(*id);
                }
            }
        }
        Ok(())
    }

    pub fn decode_body(r: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let member_from = r.read_u32()?;
        let name = r.read_utf()?;
        let offset = r.offset();
        let change = match r.read_u8()? {
            ACTION_SUBSCRIBE => SubscriptionChange::Add(r.read_serialized("listener holder")?),
            ACTION_UNSUBSCRIBE => {
                let member_id = r.read_u32()?;
                let count = r.read_i32()? as i64;
                let holder_ids = r.read_long_array(count, "Unsubscribe holder ids")?;
                SubscriptionChange::Remove {
                    member_id,
                    holder_ids,
                }
            }
            other => {
                return Err(ProtocolError::parse_error(
                    offset,
                    format!("unknown subscription action {}", other),
                    "Subscribe",
                ))
            }
        };
        Ok(Self {
            member_from,
            name,
            change,
        })
    }
}

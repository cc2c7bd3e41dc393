use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::{WireReader, WireWriter};
use std::net::IpAddr;
use types::MemberId;

/// Smallest encoding of one address (length prefix plus one character)
const MIN_ADDRESS_SIZE: usize = 5;

/// The managing member's externally reachable connector endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub member_from: MemberId,
    pub service_url: Option<String>,
    pub listen_addresses: Vec<IpAddr>,
}

impl Publish {
    pub fn encode_body(&self, w: &mut WireWriter) -> ProtocolResult<()> {
        w.put_u32(self.member_from);
        w.put_opt_utf(self.service_url.as_deref());
        w.put_i32(self.listen_addresses.len() as i32);
        for addr in &self.listen_addresses {
            w.put_utf(&addr.to_string());
        }
        Ok(())
    }

    pub fn decode_body(r: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let member_from = r.read_u32()?;
        let service_url = r.read_opt_utf()?;
        let count = r.read_i32()? as i64;
        let listen_addresses =
            r.read_object_array(count, MIN_ADDRESS_SIZE, "Publish addresses", |r| {
                let offset = r.offset();
                let text = r.read_utf()?;
                text.parse::<IpAddr>().map_err(|e| {
                    ProtocolError::parse_error(offset, format!("bad address '{}': {}", text, e), "Publish")
                })
            })?;
        Ok(Self {
            member_from,
            service_url,
            listen_addresses,
        })
    }
}

use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::{WireReader, WireWriter};
use std::collections::BTreeMap;
use types::{MemberId, ModelKind, ModelSnapshot, Value};

/// Smallest possible encoding of one snapshot: name length, kind, flag and
/// attribute blob length.
const MIN_SNAPSHOT_SIZE: usize = 4 + 1 + 1 + 4;

/// Registration of one or more global models with a managing member.
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub member_from: MemberId,
    pub snapshots: Vec<ModelSnapshot>,
}

impl Register {
    pub fn encode_body(&self, w: &mut WireWriter) -> ProtocolResult<()> {
        w.put_u32(self.member_from);
        w.put_i32(self.snapshots.len() as i32);
        for snapshot in &self.snapshots {
            encode_snapshot(w, snapshot)?;
        }
        Ok(())
    }

    pub fn decode_body(r: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let member_from = r.read_u32()?;
        let count = r.read_i32()? as i64;
        let snapshots =
            r.read_object_array(count, MIN_SNAPSHOT_SIZE, "Register snapshots", decode_snapshot)?;
        Ok(Self {
            member_from,
            snapshots,
        })
    }
}

pub(crate) fn encode_snapshot(w: &mut WireWriter, snapshot: &ModelSnapshot) -> ProtocolResult<()> {
    w.put_utf(&snapshot.name);
    w.put_u8(snapshot.kind.code());
    w.put_bool(snapshot.read_only);
    w.put_serialized(&snapshot.attributes, "snapshot attributes")
}

pub(crate) fn decode_snapshot(r: &mut WireReader<'_>) -> ProtocolResult<ModelSnapshot> {
    let name = r.read_utf()?;
    let offset = r.offset();
    let code = r.read_u8()?;
    let kind = ModelKind::from_code(code).ok_or_else(|| {
        ProtocolError::parse_error(offset, format!("unknown model kind {}", code), "snapshot")
    })?;
    let read_only = r.read_bool()?;
    let attributes: BTreeMap<String, Value> = r.read_serialized("snapshot attributes")?;
    Ok(ModelSnapshot {
        name,
        kind,
        read_only,
        attributes,
    })
}

use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::{WireReader, WireWriter};
use types::{MemberId, Value};

/// Operation carried by a [`ModelRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOp {
    Get,
    Invoke,
    Set,
}

impl ModelOp {
    pub fn code(&self) -> u8 {
        match self {
            ModelOp::Get => 1,
            ModelOp::Invoke => 2,
            ModelOp::Set => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ModelOp::Get),
            2 => Some(ModelOp::Invoke),
            3 => Some(ModelOp::Set),
            _ => None,
        }
    }
}

/// Refresh (and optionally operate on) a remote model at its owner.
///
/// `method == None` asks only for a fresh snapshot. The owner replies with
/// its current snapshot plus the operation result, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub member_from: MemberId,
    pub name: String,
    pub op: ModelOp,
    pub method: Option<String>,
    pub params: Vec<Value>,
}

impl ModelRequest {
    pub fn refresh(member_from: MemberId, name: impl Into<String>) -> Self {
        Self {
            member_from,
            name: name.into(),
            op: ModelOp::Get,
            method: None,
            params: Vec::new(),
        }
    }

    pub fn operation(
        member_from: MemberId,
        name: impl Into<String>,
        op: ModelOp,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Self {
        Self {
            member_from,
            name: name.into(),
            op,
            method: Some(method.into()),
            params,
        }
    }

    pub fn encode_body(&self, w: &mut WireWriter) -> ProtocolResult<()> {
        w.put_u32(self.member_from);
        w.put_utf(&self.name);
        w.put_u8(self.op.code());
        w.put_opt_utf(self.method.as_deref());
        w.put_serialized(&self.params, "model parameters")
    }

    pub fn decode_body(r: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let member_from = r.read_u32()?;
        let name = r.read_utf()?;
        let offset = r.offset();
        let code = r.read_u8()?;
        let op = ModelOp::from_code(code).ok_or_else(|| {
            ProtocolError::parse_error(offset, format!("unknown model op {}", code), "ModelRequest")
        })?;
        let method = r.read_opt_utf()?;
        let params = r.read_serialized("model parameters")?;
        Ok(Self {
            member_from,
            name,
            op,
            method,
            params,
        })
    }
}

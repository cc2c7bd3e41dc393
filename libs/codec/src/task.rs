//! Task framing.
//!
//! ```text
//! +--------+---------+------+-------------+----------+-----------+
//! | magic  | version | kind | payload len | crc32    | payload   |
//! | u32 BE | u8      | u8   | u32 BE      | u32 BE   | len bytes |
//! +--------+---------+------+-------------+----------+-----------+
//! ```

use crate::bounds::{check_buffer_bounds, validate_size_bounds, MAX_FIELD_SIZE};
use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::{
    Announce, InvokeRemote, ModelRequest, Notify, Publish, Register, Subscribe, Unregister,
};
use crate::wire::{WireReader, WireWriter};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use types::MemberId;

pub const FRAME_MAGIC: u32 = 0x4D47_4D54;
pub const FRAME_VERSION: u8 = 1;
pub const FRAME_HEADER_SIZE: usize = 4 + 1 + 1 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Announce,
    Register,
    Unregister,
    Notify,
    Subscribe,
    Publish,
    InvokeRemote,
    ModelRequest,
}

impl TaskKind {
    pub fn code(&self) -> u8 {
        match self {
            TaskKind::Announce => 1,
            TaskKind::Register => 2,
            TaskKind::Unregister => 3,
            TaskKind::Notify => 4,
            TaskKind::Subscribe => 5,
            TaskKind::Publish => 6,
            TaskKind::InvokeRemote => 7,
            TaskKind::ModelRequest => 8,
        }
    }

    pub fn from_code(code: u8) -> ProtocolResult<Self> {
        Ok(match code {
            1 => TaskKind::Announce,
            2 => TaskKind::Register,
            3 => TaskKind::Unregister,
            4 => TaskKind::Notify,
            5 => TaskKind::Subscribe,
            6 => TaskKind::Publish,
            7 => TaskKind::InvokeRemote,
            8 => TaskKind::ModelRequest,
            other => return Err(ProtocolError::UnknownTask { code: other }),
        })
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Every task a management service can deliver to a member.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Announce(Announce),
    Register(Register),
    Unregister(Unregister),
    Notify(Notify),
    Subscribe(Subscribe),
    Publish(Publish),
    InvokeRemote(InvokeRemote),
    ModelRequest(ModelRequest),
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::Announce(_) => TaskKind::Announce,
            Task::Register(_) => TaskKind::Register,
            Task::Unregister(_) => TaskKind::Unregister,
            Task::Notify(_) => TaskKind::Notify,
            Task::Subscribe(_) => TaskKind::Subscribe,
            Task::Publish(_) => TaskKind::Publish,
            Task::InvokeRemote(_) => TaskKind::InvokeRemote,
            Task::ModelRequest(_) => TaskKind::ModelRequest,
        }
    }

    pub fn member_from(&self) -> MemberId {
        match self {
            Task::Announce(t) => t.member_from,
            Task::Register(t) => t.member_from,
            Task::Unregister(t) => t.member_from,
            Task::Notify(t) => t.member_from,
            Task::Subscribe(t) => t.member_from,
            Task::Publish(t) => t.member_from,
            Task::InvokeRemote(t) => t.member_from,
            Task::ModelRequest(t) => t.member_from,
        }
    }

    pub fn encode(&self) -> ProtocolResult<Bytes> {
        let mut body = WireWriter::new();
        match self {
            Task::Announce(t) => t.encode_body(&mut body)?,
            Task::Register(t) => t.encode_body(&mut body)?,
            Task::Unregister(t) => t.encode_body(&mut body)?,
            Task::Notify(t) => t.encode_body(&mut body)?,
            Task::Subscribe(t) => t.encode_body(&mut body)?,
            Task::Publish(t) => t.encode_body(&mut body)?,
            Task::InvokeRemote(t) => t.encode_body(&mut body)?,
            Task::ModelRequest(t) => t.encode_body(&mut body)?,
        }
        let payload = body.into_inner();
        validate_size_bounds(payload.len(), u32::MAX as usize, "task payload")?;

        let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.put_u32(FRAME_MAGIC);
        frame.put_u8(FRAME_VERSION);
        frame.put_u8(self.kind().code());
        frame.put_u32(payload.len() as u32);
        frame.put_u32(crc32fast::hash(&payload));
        frame.extend_from_slice(&payload);
        Ok(frame.freeze())
    }

    pub fn decode(frame: &[u8]) -> ProtocolResult<Self> {
        check_buffer_bounds(frame, 0, FRAME_HEADER_SIZE)?;
        let mut header = WireReader::new(&frame[..FRAME_HEADER_SIZE]);
        let magic = header.read_u32()?;
        if magic != FRAME_MAGIC {
            return Err(ProtocolError::invalid_magic(FRAME_MAGIC, magic));
        }
        let version = header.read_u8()?;
        if version != FRAME_VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                version,
                supported_versions: FRAME_VERSION.to_string(),
            });
        }
        let kind = TaskKind::from_code(header.read_u8()?)?;
        let len = header.read_u32()? as usize;
        let expected_crc = header.read_u32()?;

        validate_size_bounds(len, MAX_FIELD_SIZE, "task payload")?;
        check_buffer_bounds(frame, FRAME_HEADER_SIZE, len)?;
        let payload = &frame[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len];
        let calculated = crc32fast::hash(payload);
        if calculated != expected_crc {
            return Err(ProtocolError::ChecksumMismatch {
                expected: expected_crc,
                calculated,
                payload_size: len,
            });
        }

        let mut r = WireReader::new(payload);
        let task = match kind {
            TaskKind::Announce => Task::Announce(Announce::decode_body(&mut r)?),
            TaskKind::Register => Task::Register(Register::decode_body(&mut r)?),
            TaskKind::Unregister => Task::Unregister(Unregister::decode_body(&mut r)?),
            TaskKind::Notify => Task::Notify(Notify::decode_body(&mut r)?),
            TaskKind::Subscribe => Task::Subscribe(Subscribe::decode_body(&mut r)?),
            TaskKind::Publish => Task::Publish(Publish::decode_body(&mut r)?),
            TaskKind::InvokeRemote => Task::InvokeRemote(InvokeRemote::decode_body(&mut r)?),
            TaskKind::ModelRequest => Task::ModelRequest(ModelRequest::decode_body(&mut r)?),
        };
        r.expect_end(&format!("{} task", kind))?;
        Ok(task)
    }
}

impl From<Announce> for Task {
    fn from(t: Announce) -> Self {
        Task::Announce(t)
    }
}

impl From<Register> for Task {
    fn from(t: Register) -> Self {
        Task::Register(t)
    }
}

impl From<Unregister> for Task {
    fn from(t: Unregister) -> Self {
        Task::Unregister(t)
    }
}

impl From<Notify> for Task {
    fn from(t: Notify) -> Self {
        Task::Notify(t)
    }
}

impl From<Subscribe> for Task {
    fn from(t: Subscribe) -> Self {
        Task::Subscribe(t)
    }
}

impl From<Publish> for Task {
    fn from(t: Publish) -> Self {
        Task::Publish(t)
    }
}

impl From<InvokeRemote> for Task {
    fn from(t: InvokeRemote) -> Self {
        Task::InvokeRemote(t)
    }
}

impl From<ModelRequest> for Task {
    fn from(t: ModelRequest) -> Self {
        Task::ModelRequest(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ModelOp, SubscriptionChange};
    use std::net::{IpAddr, Ipv4Addr};
    use types::{Filter, ModelKind, ModelSnapshot, Notification, RemoteHolder, Value};

    fn round_trip(task: Task) -> Task {
        let bytes = task.encode().unwrap();
        Task::decode(&bytes).unwrap()
    }

    #[test]
    fn test_register_carries_snapshots() {
        let snapshots: Vec<ModelSnapshot> = (0..3)
            .map(|i| {
                ModelSnapshot::new(format!("type=Cache,name=c{},nodeId=2", i), ModelKind::Cache)
                    .with_attribute("Size", i as i64)
            })
            .collect();
        let task = Task::Register(Register {
            member_from: 2,
            snapshots: snapshots.clone(),
        });
        match round_trip(task) {
            Task::Register(r) => {
                assert_eq!(r.member_from, 2);
                assert_eq!(r.snapshots, snapshots);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_register_rejects_inflated_count() {
        let mut body = WireWriter::new();
        body.put_u32(2);
        body.put_i32(i32::MAX);
        let payload = body.into_inner();

        let mut frame = BytesMut::new();
        frame.put_u32(FRAME_MAGIC);
        frame.put_u8(FRAME_VERSION);
        frame.put_u8(TaskKind::Register.code());
        frame.put_u32(payload.len() as u32);
        frame.put_u32(crc32fast::hash(&payload));
        frame.extend_from_slice(&payload);

        assert!(matches!(
            Task::decode(&frame),
            Err(ProtocolError::InvalidArrayLength { .. })
        ));
    }

    #[test]
    fn test_unsubscribe_holder_ids() {
        let task = Task::Subscribe(Subscribe {
            member_from: 1,
            name: "type=Node,nodeId=3".into(),
            change: SubscriptionChange::Remove {
                member_id: 1,
                holder_ids: vec![10, 11, 12],
            },
        });
        assert_eq!(round_trip(task.clone()), task);

        let sub = Task::Subscribe(Subscribe {
            member_from: 1,
            name: "type=Node,nodeId=3".into(),
            change: SubscriptionChange::Add(RemoteHolder::new(5, 1, None)),
        });
        assert_eq!(round_trip(sub.clone()), sub);
    }

    #[test]
    fn test_invoke_remote_defers_bad_params() {
        let task = InvokeRemote::invoke(4, "type=Service,nodeId=1", "shutdown", vec![Value::Long(1)], vec!["long".into()]);
        let mut body = WireWriter::new();
        task.encode_body(&mut body).unwrap();
        let mut payload = body.into_inner().to_vec();

        // Corrupt the first byte of the parameter blob: the length prefix
        // stays valid, the content no longer decodes as a value list.
        let blob_start = 4 + 1 + (4 + task.name.len()) + (4 + "shutdown".len()) + 4;
        for b in payload[blob_start..blob_start + 8].iter_mut() {
            *b = 0xFF;
        }

        let mut r = WireReader::new(&payload);
        let decoded = InvokeRemote::decode_body(&mut r).unwrap();
        assert!(decoded.read_error.is_some());
        assert!(decoded.params.is_empty());
        assert_eq!(decoded.signature, vec!["long".to_string()]);
    }

    #[test]
    fn test_frame_validation() {
        let task = Task::Announce(Announce {
            member_from: 1,
            managing_node: true,
        });
        let mut bytes = task.encode().unwrap().to_vec();
        assert!(matches!(Task::decode(&bytes[..5]), Err(ProtocolError::MessageTooSmall { .. })));

        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(Task::decode(&bytes), Err(ProtocolError::ChecksumMismatch { .. })));

        bytes[0] = 0;
        assert!(matches!(Task::decode(&bytes), Err(ProtocolError::InvalidMagic { .. })));
    }

    #[test]
    fn test_other_tasks() {
        let tasks = vec![
            Task::Unregister(Unregister { member_from: 3, name: "type=Cache,nodeId=3,*".into() }),
            Task::Notify(Notify {
                member_from: 3,
                name: "type=Cache,nodeId=3".into(),
                notification: Some(Notification::new("cache.cleared", "type=Cache,nodeId=3", 9, "cleared")),
            }),
            Task::Publish(Publish {
                member_from: 1,
                service_url: Some("service:jmx:rmi://0.0.0.0:9000/jmxrmi".into()),
                listen_addresses: vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))],
            }),
            Task::InvokeRemote(InvokeRemote::query(2, "type=Cache", Some(Filter::Prefix("type".into())))),
            Task::ModelRequest(ModelRequest::operation(2, "type=Node,nodeId=1", ModelOp::Invoke, "resetStatistics", vec![])),
        ];
        for task in tasks {
            assert_eq!(round_trip(task.clone()), task);
        }
    }
}

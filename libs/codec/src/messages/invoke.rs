use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::{WireReader, WireWriter};
use std::fmt;
use types::{Filter, ManagementFunction, MemberId, ProductVersion, Value};

/// Actions a member can ask a managing (or owning) member to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteAction {
    Get,
    Invoke,
    Set,
    Check,
    Query,
    Execute,
    MBeanInfo,
    FindOwner,
}

impl RemoteAction {
    pub fn code(&self) -> u8 {
        match self {
            RemoteAction::Get => 0,
            RemoteAction::Invoke => 1,
            RemoteAction::Set => 2,
            RemoteAction::Check => 3,
            RemoteAction::Query => 4,
            RemoteAction::Execute => 5,
            RemoteAction::MBeanInfo => 6,
            RemoteAction::FindOwner => 7,
        }
    }

    pub fn from_code(code: u8) -> ProtocolResult<Self> {
        Ok(match code {
            0 => RemoteAction::Get,
            1 => RemoteAction::Invoke,
            2 => RemoteAction::Set,
            3 => RemoteAction::Check,
            4 => RemoteAction::Query,
            5 => RemoteAction::Execute,
            6 => RemoteAction::MBeanInfo,
            7 => RemoteAction::FindOwner,
            other => return Err(ProtocolError::UnknownAction { code: other }),
        })
    }
}

impl fmt::Display for RemoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteAction::Get => "GET",
            RemoteAction::Invoke => "INVOKE",
            RemoteAction::Set => "SET",
            RemoteAction::Check => "CHECK",
            RemoteAction::Query => "QUERY",
            RemoteAction::Execute => "EXECUTE",
            RemoteAction::MBeanInfo => "MBEAN_INFO",
            RemoteAction::FindOwner => "FIND_OWNER",
        };
        f.write_str(name)
    }
}

/// Request routed to a managing member on behalf of a member without an
/// MBean server.
///
/// `name` is the MBean name, or the query pattern for [`RemoteAction::Query`].
/// `member` is the attribute or operation name where one applies.
///
/// Payload fields that fail to deserialize do not fail the frame; the
/// failure is kept in `read_error` and reported when the action runs.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeRemote {
    pub member_from: MemberId,
    pub action: RemoteAction,
    pub name: String,
    pub member: Option<String>,
    pub params: Vec<Value>,
    pub signature: Vec<String>,
    pub filter: Option<Filter>,
    pub function: Option<ManagementFunction>,
    pub read_error: Option<String>,
}

impl InvokeRemote {
    fn new(member_from: MemberId, action: RemoteAction, name: impl Into<String>) -> Self {
        Self {
            member_from,
            action,
            name: name.into(),
            member: None,
            params: Vec::new(),
            signature: Vec::new(),
            filter: None,
            function: None,
            read_error: None,
        }
    }

    pub fn get_attribute(from: MemberId, name: impl Into<String>, attribute: impl Into<String>) -> Self {
        let mut task = Self::new(from, RemoteAction::Get, name);
        task.member = Some(attribute.into());
        task
    }

    pub fn get_attributes(from: MemberId, name: impl Into<String>, filter: Option<Filter>) -> Self {
        let mut task = Self::new(from, RemoteAction::Get, name);
        task.filter = filter;
        task
    }

    pub fn set_attribute(
        from: MemberId,
        name: impl Into<String>,
        attribute: impl Into<String>,
        value: Value,
    ) -> Self {
        let mut task = Self::new(from, RemoteAction::Set, name);
        task.member = Some(attribute.into());
        task.params = vec![value];
        task
    }

    pub fn invoke(
        from: MemberId,
        name: impl Into<String>,
        operation: impl Into<String>,
        params: Vec<Value>,
        signature: Vec<String>,
    ) -> Self {
        let mut task = Self::new(from, RemoteAction::Invoke, name);
        task.member = Some(operation.into());
        task.params = params;
        task.signature = signature;
        task
    }

    pub fn check(from: MemberId, name: impl Into<String>) -> Self {
        Self::new(from, RemoteAction::Check, name)
    }

    pub fn query(from: MemberId, pattern: impl Into<String>, filter: Option<Filter>) -> Self {
        let mut task = Self::new(from, RemoteAction::Query, pattern);
        task.filter = filter;
        task
    }

    pub fn execute(from: MemberId, function: ManagementFunction) -> Self {
        let mut task = Self::new(from, RemoteAction::Execute, "");
        task.function = Some(function);
        task
    }

    pub fn mbean_info(from: MemberId, name: impl Into<String>) -> Self {
        Self::new(from, RemoteAction::MBeanInfo, name)
    }

    pub fn find_owner(from: MemberId, name: impl Into<String>) -> Self {
        Self::new(from, RemoteAction::FindOwner, name)
    }

    /// Minimum product version a target needs to decode this request, with
    /// the feature name reported when it does not.
    pub fn required_version(&self) -> Option<(ProductVersion, &'static str)> {
        match self.action {
            RemoteAction::Get if self.member.is_none() && self.filter.is_some() => Some((
                ProductVersion::EXTENDED_ACTIONS_SUPPORT,
                "getAttributes(String, Filter)",
            )),
            RemoteAction::Execute => Some((
                ProductVersion::EXTENDED_ACTIONS_SUPPORT,
                "execute(Function)",
            )),
            RemoteAction::MBeanInfo => Some((
                ProductVersion::EXTENDED_ACTIONS_SUPPORT,
                "getMBeanInfo(String)",
            )),
            RemoteAction::Query => Some((ProductVersion::QUERY_SUPPORT, "queryNames(String, Filter)")),
            RemoteAction::FindOwner => Some((ProductVersion::FIND_OWNER_SUPPORT, "findOwner(String)")),
            _ => None,
        }
    }

    /// Refuse to encode for a member that could not decode the request.
    pub fn ensure_supported_by(&self, version: &ProductVersion) -> ProtocolResult<()> {
        match self.required_version() {
            Some((required, feature)) if !version.is_at_least(&required) => {
                Err(ProtocolError::UnsupportedAction {
                    feature: feature.to_string(),
                    required,
                    actual: *version,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn encode_body(&self, w: &mut WireWriter) -> ProtocolResult<()> {
        w.put_u32(self.member_from);
        w.put_u8(self.action.code());
        w.put_utf(&self.name);
        w.put_opt_utf(self.member.as_deref());
        match self.action {
            RemoteAction::Get | RemoteAction::Query => {
                w.put_bool(self.filter.is_some());
                if let Some(filter) = &self.filter {
                    w.put_serialized(filter, "filter")?;
                }
            }
            RemoteAction::Set => w.put_serialized(&self.params, "attribute value")?,
            RemoteAction::Invoke => {
                w.put_serialized(&self.params, "operation parameters")?;
                w.put_i32(self.signature.len() as i32);
                for sig in &self.signature {
                    w.put_utf(sig);
                }
            }
            RemoteAction::Execute => w.put_serialized(&self.function, "function")?,
            RemoteAction::Check | RemoteAction::MBeanInfo | RemoteAction::FindOwner => {}
        }
        Ok(())
    }

    pub fn decode_body(r: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let member_from = r.read_u32()?;
        let action = RemoteAction::from_code(r.read_u8()?)?;
        let name = r.read_utf()?;
        let mut task = Self::new(member_from, action, name);
        task.member = r.read_opt_utf()?;

        let mut errors: Vec<String> = Vec::new();
        match action {
            RemoteAction::Get | RemoteAction::Query => {
                if r.read_bool()? {
                    match r.read_deferred::<Filter>("filter")? {
                        Ok(filter) => task.filter = Some(filter),
                        Err(e) => errors.push(e),
                    }
                }
            }
            RemoteAction::Set => match r.read_deferred::<Vec<Value>>("attribute value")? {
                Ok(params) => task.params = params,
                Err(e) => errors.push(e),
            },
            RemoteAction::Invoke => {
                match r.read_deferred::<Vec<Value>>("operation parameters")? {
                    Ok(params) => task.params = params,
                    Err(e) => errors.push(e),
                }
                let count = r.read_i32()? as i64;
                task.signature = r.read_object_array(count, 4, "signature", |r| r.read_utf())?;
            }
            RemoteAction::Execute => {
                match r.read_deferred::<Option<ManagementFunction>>("function")? {
                    Ok(function) => task.function = function,
                    Err(e) => errors.push(e),
                }
            }
            RemoteAction::Check | RemoteAction::MBeanInfo | RemoteAction::FindOwner => {}
        }
        if !errors.is_empty() {
            task.read_error = Some(errors.join("; "));
        }
        Ok(task)
    }
}

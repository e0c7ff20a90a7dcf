//! Shared protocol types for driving Automation objects from another process.
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.
//! Objects are referred to by integer handles; handle `1` is the root object
//! the server was started with and `0` is never a valid handle.

use serde::{Deserialize, Serialize};

/// Handle of an object held by the server.
pub type Handle = u64;

/// A command sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    /// The command to execute.
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the client can send to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Map member names to dispatch ids (`GetIDsOfNames`).
    Resolve { object: Handle, names: Vec<String> },

    /// Read a member, optionally one element of it.
    Get {
        object: Handle,
        member: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<i64>,
    },

    /// Replace a member's value, or one element of it.
    Put {
        object: Handle,
        member: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<i64>,
        value: WireValue,
    },

    /// Call a member with arguments in natural order.
    Call {
        object: Handle,
        member: String,
        #[serde(default)]
        args: Vec<WireValue>,
    },

    /// Raw `Invoke` with native `DISPATCH_*` flags. Arguments are in natural
    /// order; for puts the new value is last.
    Invoke {
        object: Handle,
        dispid: i32,
        flags: u16,
        #[serde(default)]
        args: Vec<WireValue>,
    },

    /// Diagnostic name of an object (`__id`).
    Identity { object: Handle },

    /// The object's own value, read from its default member (`__value`).
    ValueOf { object: Handle },

    /// Members listed by the object's type information (`__type`). Answers
    /// without data when the session was started with type information off.
    TypeInfo { object: Handle },

    /// Take another reference on an object.
    AddRef { object: Handle },

    /// Drop a reference. Reaching zero invalidates the handle.
    Release { object: Handle },

    /// Dump the root host object as JSON.
    Snapshot,

    /// Stop serving.
    Shutdown,
}

/// A value on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    String(String),
    Array(Vec<WireValue>),
    /// A dispatch reference, registered under a handle.
    Object {
        #[serde(rename = "$object")]
        handle: Handle,
    },
    /// An explicit `VT_EMPTY`.
    Empty {
        #[serde(rename = "$empty")]
        empty: bool,
    },
}

impl WireValue {
    pub fn empty() -> Self {
        WireValue::Empty { empty: true }
    }

    pub fn object(handle: Handle) -> Self {
        WireValue::Object { handle }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::Int(n) => Some(*n as f64),
            WireValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            WireValue::Object { handle } => Some(*handle),
            _ => None,
        }
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        WireValue::String(s.to_string())
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        WireValue::String(s)
    }
}

impl From<f64> for WireValue {
    fn from(n: f64) -> Self {
        WireValue::Number(n)
    }
}

impl From<i64> for WireValue {
    fn from(n: i64) -> Self {
        WireValue::Int(n)
    }
}

impl From<bool> for WireValue {
    fn from(b: bool) -> Self {
        WireValue::Bool(b)
    }
}

/// A response sent back to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The request ID this response corresponds to.
    pub id: u64,
    /// The result of the command.
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
        /// The HRESULT an Automation caller would have seen.
        code: i32,
    },
}

impl ResponseResult {
    pub fn ok(data: ResponseData) -> Self {
        ResponseResult::Ok { data: Some(data) }
    }

    pub fn done() -> Self {
        ResponseResult::Ok { data: None }
    }

    pub fn error(message: impl Into<String>, code: i32) -> Self {
        ResponseResult::Error {
            message: message.into(),
            code,
        }
    }
}

/// Data returned in successful responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Dispatch ids, one per resolved name.
    Ids { ids: Vec<i32> },
    /// A member value.
    Value { value: WireValue },
    /// Reference count after `AddRef`/`Release`.
    RefCount { refs: u32 },
    /// The root host object.
    Snapshot { snapshot: serde_json::Value },
    /// An object's diagnostic name.
    Identity { identity: String },
    /// Type information listing.
    Members { members: Vec<MemberDescription> },
}

/// One entry of a type information listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub dispid: i32,
    /// `INVOKEKIND` bits: 1 method, 2 getter, 4 setter, 8 reference setter.
    pub invkind: u16,
    pub argcnt: u16,
}

//! Error types for the dispatch bridge.
//!
//! Every failure is reported to the immediate caller. [`DispatchError::hresult`]
//! gives the code an Automation client expects for each kind.

use thiserror::Error;

use crate::host::HostError;
use crate::types::DispId;

/// HRESULT values used on the Automation error channel.
pub mod hresult {
    pub const S_OK: i32 = 0;
    pub const E_NOTIMPL: i32 = 0x8000_4001_u32 as i32;
    pub const E_FAIL: i32 = 0x8000_4005_u32 as i32;
    pub const E_POINTER: i32 = 0x8000_4003_u32 as i32;
    pub const E_INVALIDARG: i32 = 0x8007_0057_u32 as i32;
    pub const DISP_E_UNKNOWNNAME: i32 = 0x8002_0006_u32 as i32;
    pub const DISP_E_MEMBERNOTFOUND: i32 = 0x8002_0003_u32 as i32;
    pub const DISP_E_TYPEMISMATCH: i32 = 0x8002_0005_u32 as i32;
    pub const DISP_E_NONAMEDARGS: i32 = 0x8002_0007_u32 as i32;
    pub const DISP_E_EXCEPTION: i32 = 0x8002_0009_u32 as i32;
    pub const DISP_E_BADINDEX: i32 = 0x8002_000B_u32 as i32;
    pub const DISP_E_BADPARAMCOUNT: i32 = 0x8002_000E_u32 as i32;
    pub const DISP_E_PARAMNOTFOUND: i32 = 0x8002_0004_u32 as i32;
    pub const RPC_E_DISCONNECTED: i32 = 0x8001_0108_u32 as i32;
    pub const REGDB_E_CLASSNOTREG: i32 = 0x8004_0154_u32 as i32;
}

/// Errors raised while resolving, invoking or marshalling.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Unknown member id: {0}")]
    UnknownMemberId(DispId),

    #[error("Index {index} out of bounds (length: {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("Member '{0}' is not indexable")]
    NotIndexable(String),

    #[error("Type mismatch: {0}")]
    Marshal(String),

    #[error("Object has been released")]
    ObjectReleased,

    #[error("Unknown name: {0}")]
    UnknownName(String),

    #[error("Bad parameter count: expected {expected}, got {actual}")]
    BadParamCount { expected: usize, actual: usize },

    #[error("Named arguments are not supported")]
    NoNamedArgs,

    #[error("Invalid invocation flags: {0:#x}")]
    InvalidFlags(u16),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Exception in '{member}': {description}")]
    Exception { member: String, description: String },

    #[error("Class not registered: {0}")]
    ClassNotRegistered(String),

    #[cfg(windows)]
    #[error("COM error: {0}")]
    Com(#[from] windows::core::Error),
}

impl DispatchError {
    /// Create a type-mismatch error with a message
    pub fn marshal<S: Into<String>>(msg: S) -> Self {
        DispatchError::Marshal(msg.into())
    }

    /// Attach the member name to a host-side failure.
    pub fn from_host(member: &str, err: HostError) -> Self {
        match err {
            HostError::OutOfBounds { index, len } => DispatchError::IndexOutOfBounds { index, len },
            HostError::NotIndexable => DispatchError::NotIndexable(member.to_string()),
            other => DispatchError::Exception {
                member: member.to_string(),
                description: other.to_string(),
            },
        }
    }

    /// The HRESULT reported to an Automation caller.
    pub fn hresult(&self) -> i32 {
        use hresult::*;
        match self {
            DispatchError::MemberNotFound(_) | DispatchError::UnknownMemberId(_) => {
                DISP_E_MEMBERNOTFOUND
            }
            DispatchError::IndexOutOfBounds { .. } => DISP_E_BADINDEX,
            DispatchError::NotIndexable(_) | DispatchError::Marshal(_) => DISP_E_TYPEMISMATCH,
            DispatchError::ObjectReleased => RPC_E_DISCONNECTED,
            DispatchError::UnknownName(_) => DISP_E_UNKNOWNNAME,
            DispatchError::BadParamCount { .. } => DISP_E_BADPARAMCOUNT,
            DispatchError::NoNamedArgs => DISP_E_NONAMEDARGS,
            DispatchError::InvalidFlags(_) | DispatchError::InvalidArgument(_) => E_INVALIDARG,
            DispatchError::Exception { .. } => DISP_E_EXCEPTION,
            DispatchError::ClassNotRegistered(_) => REGDB_E_CLASSNOTREG,
            #[cfg(windows)]
            DispatchError::Com(e) => e.code().0,
        }
    }

    /// Text for the `EXCEPINFO` description field.
    pub fn description(&self) -> String {
        match self {
            DispatchError::Exception { description, .. } => description.clone(),
            other => other.to_string(),
        }
    }

    /// Source component for the `EXCEPINFO` source field.
    pub fn source(&self) -> Option<&str> {
        match self {
            DispatchError::Exception { member, .. } => Some(member),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

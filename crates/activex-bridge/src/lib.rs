//! # activex-bridge
//!
//! Exposes a dynamically shaped host object graph as Automation (`IDispatch`)
//! objects, and drives foreign Automation objects through the same contract.
//!
//! ## Quick Start
//!
//! ```rust
//! use activex_bridge::{create_object, ClassRegistry, CreateOptions, Dispatch, HostObject, Variant};
//!
//! let host = HostObject::record()
//!     .with("text", "value")
//!     .with("arr", HostObject::sequence(["a", "b"]));
//!
//! let obj = create_object(host.clone().into(), &CreateOptions::default(), &ClassRegistry::new())?;
//! let proxy = obj.as_dispatch();
//!
//! proxy.put_property("text", "value2".into())?;
//! assert_eq!(host.get("text").and_then(|v| v.as_str().map(String::from)), Some("value2".into()));
//! assert_eq!(proxy.get_indexed("arr", 1)?, Variant::from("b"));
//! # Ok::<(), activex_bridge::DispatchError>(())
//! ```
//!
//! ## Modules
//!
//! - [`host`]: the host object graph
//! - [`types`]: `Variant`, member ids and invocation descriptors
//! - [`marshal`]: host value ⇄ `Variant` conversion
//! - [`proxy`]: the `Dispatch` contract and `DispatchProxy`
//! - [`factory`]: object creation from class ids or host objects
//! - `com` (Windows only): native `VARIANT`s, a real `IDispatch` server and client

pub mod error;
pub mod factory;
pub mod host;
pub mod marshal;
pub mod members;
pub mod proxy;
pub mod types;

#[cfg(windows)]
pub mod com;

pub use error::{hresult, DispatchError, Result};
pub use factory::{
    create_object, platform_activator, ClassActivator, ClassRegistry, CreateOptions, ObjectSource,
    ServerContext,
};
pub use host::{HostError, HostFunction, HostObject, HostValue, WeakHostObject};
pub use members::MemberTable;
pub use proxy::{Dispatch, DispatchProxy};
pub use types::{
    DispId, DispatchRef, Invocation, InvokeKind, MemberInfo, Variant, DISPID_PROPERTYPUT,
    DISPID_UNKNOWN, DISPID_VALUE,
};

//! Two-way conversion between host values and Automation variants.
//!
//! Host → Automation is total. Automation → host fails only for variants with
//! no host counterpart.

use std::rc::Rc;

use crate::error::{hresult, DispatchError, Result};
use crate::host::{HostObject, HostValue};
use crate::proxy::DispatchProxy;
use crate::types::{DispatchRef, Variant};

/// Convert a host value for an Automation caller.
///
/// Objects of every shape (records, sequences, callables) are wrapped in a new
/// [`DispatchProxy`] named `identity`; the wrapper aliases the object, it does
/// not copy it, and does not keep it alive.
pub fn to_automation(value: &HostValue, identity: &str) -> Variant {
    convert(value, |obj| DispatchProxy::new(obj, identity))
}

/// Like [`to_automation`], but an object is owned by its proxy. For values
/// nothing in the host graph refers to, such as call results.
pub fn to_automation_owned(value: HostValue, identity: &str) -> Variant {
    convert(&value, |obj| DispatchProxy::owning(obj.clone(), identity))
}

fn convert(value: &HostValue, wrap: impl FnOnce(&HostObject) -> Rc<DispatchProxy>) -> Variant {
    match value {
        HostValue::Undefined => Variant::Empty,
        HostValue::Null => Variant::Null,
        HostValue::Bool(b) => Variant::Bool(*b),
        HostValue::Number(n) => number_to_variant(*n),
        HostValue::String(s) => Variant::Bstr(s.clone()),
        HostValue::Object(obj) => Variant::Dispatch(DispatchRef::Host(wrap(obj))),
        HostValue::Dispatch(native) => Variant::Dispatch(DispatchRef::Native(Rc::clone(native))),
    }
}

/// Integral numbers that fit become `I4`, everything else `R8`.
fn number_to_variant(n: f64) -> Variant {
    let integral = n.fract() == 0.0 && !(n == 0.0 && n.is_sign_negative());
    if integral && n >= i32::MIN as f64 && n <= i32::MAX as f64 {
        Variant::I4(n as i32)
    } else {
        Variant::R8(n)
    }
}

/// Convert an Automation value for the host.
///
/// A proxy over a host object unwraps to that same object, so identity
/// survives a round trip. Foreign dispatch objects are passed through.
pub fn to_host(value: &Variant) -> Result<HostValue> {
    match value {
        Variant::Empty => Ok(HostValue::Undefined),
        Variant::Null => Ok(HostValue::Null),
        Variant::Bool(b) => Ok(HostValue::Bool(*b)),
        Variant::I4(n) => Ok(HostValue::Number(*n as f64)),
        Variant::R8(d) => Ok(HostValue::Number(*d)),
        Variant::Bstr(s) => Ok(HostValue::String(s.clone())),
        // Omitted optional argument.
        Variant::Error(code) if *code == hresult::DISP_E_PARAMNOTFOUND => Ok(HostValue::Undefined),
        Variant::Error(code) => Err(DispatchError::marshal(format!(
            "VT_ERROR {:#010x} has no host representation",
            *code as u32
        ))),
        Variant::Array(items) => {
            let items = to_host_args(items)?;
            Ok(HostValue::Object(HostObject::sequence(items)))
        }
        Variant::Dispatch(DispatchRef::Host(proxy)) => match proxy.target() {
            Ok(obj) => Ok(HostValue::Object(obj)),
            Err(_) => Err(DispatchError::marshal(format!(
                "dispatch reference '{}' does not resolve to a live object",
                proxy.identity()
            ))),
        },
        Variant::Dispatch(DispatchRef::Native(native)) => {
            Ok(HostValue::Dispatch(Rc::clone(native)))
        }
    }
}

/// Convert an argument list, failing on the first bad argument.
pub fn to_host_args(args: &[Variant]) -> Result<Vec<HostValue>> {
    args.iter().map(to_host).collect()
}

//! Automation value model: `Variant`, member ids and invocation descriptors.
//!
//! This module defines the platform-neutral Rust representation of the values
//! that cross an `IDispatch` boundary. The `com` module converts them to and
//! from native `VARIANT`s on Windows.

use std::fmt;
use std::rc::Rc;

use crate::error::{DispatchError, Result};
use crate::proxy::{Dispatch, DispatchProxy};

/// Identifier of a member on a dispatch object.
pub type DispId = i32;

/// The object's default member: the object itself.
pub const DISPID_VALUE: DispId = 0;
/// Returned for names that could not be resolved.
pub const DISPID_UNKNOWN: DispId = -1;
/// Named-argument id that marks the new value of a property put.
pub const DISPID_PROPERTYPUT: DispId = -3;

/// Native VARTYPE codes.
pub mod vt {
    pub const VT_EMPTY: u16 = 0;
    pub const VT_NULL: u16 = 1;
    pub const VT_I4: u16 = 3;
    pub const VT_R8: u16 = 5;
    pub const VT_BSTR: u16 = 8;
    pub const VT_DISPATCH: u16 = 9;
    pub const VT_ERROR: u16 = 10;
    pub const VT_BOOL: u16 = 11;
    pub const VT_VARIANT: u16 = 12;
    pub const VT_ARRAY: u16 = 0x2000;
}

/// Native `DISPATCH_*` invocation flags.
pub mod flags {
    pub const DISPATCH_METHOD: u16 = 0x1;
    pub const DISPATCH_PROPERTYGET: u16 = 0x2;
    pub const DISPATCH_PROPERTYPUT: u16 = 0x4;
    pub const DISPATCH_PROPERTYPUTREF: u16 = 0x8;
}

/// A reference to something dispatchable.
#[derive(Clone)]
pub enum DispatchRef {
    /// A proxy over a host object.
    Host(Rc<DispatchProxy>),
    /// A native Automation object, passed through untouched.
    Native(Rc<dyn Dispatch>),
}

impl DispatchRef {
    pub fn as_dispatch(&self) -> &dyn Dispatch {
        match self {
            DispatchRef::Host(proxy) => proxy.as_ref(),
            DispatchRef::Native(native) => native.as_ref(),
        }
    }

    pub fn as_proxy(&self) -> Option<&Rc<DispatchProxy>> {
        match self {
            DispatchRef::Host(proxy) => Some(proxy),
            DispatchRef::Native(_) => None,
        }
    }

    fn addr(&self) -> *const () {
        match self {
            DispatchRef::Host(proxy) => Rc::as_ptr(proxy) as *const (),
            DispatchRef::Native(native) => Rc::as_ptr(native) as *const (),
        }
    }
}

impl PartialEq for DispatchRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl fmt::Debug for DispatchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchRef::Host(proxy) => write!(f, "Host({})", proxy.identity()),
            DispatchRef::Native(_) => write!(f, "Native(..)"),
        }
    }
}

/// A tagged Automation value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Empty,
    Null,
    Bool(bool),
    I4(i32),
    R8(f64),
    Bstr(String),
    /// An SCODE, e.g. `DISP_E_PARAMNOTFOUND` for an omitted optional argument.
    Error(i32),
    /// A one-dimensional array of variants.
    Array(Vec<Variant>),
    Dispatch(DispatchRef),
}

impl Variant {
    /// The native VARTYPE for this value.
    pub fn vt(&self) -> u16 {
        match self {
            Variant::Empty => vt::VT_EMPTY,
            Variant::Null => vt::VT_NULL,
            Variant::Bool(_) => vt::VT_BOOL,
            Variant::I4(_) => vt::VT_I4,
            Variant::R8(_) => vt::VT_R8,
            Variant::Bstr(_) => vt::VT_BSTR,
            Variant::Error(_) => vt::VT_ERROR,
            Variant::Array(_) => vt::VT_ARRAY | vt::VT_VARIANT,
            Variant::Dispatch(_) => vt::VT_DISPATCH,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty | Variant::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::Bstr(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric value of an `I4` or `R8`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::I4(n) => Some(*n as f64),
            Variant::R8(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_dispatch(&self) -> Option<&DispatchRef> {
        match self {
            Variant::Dispatch(d) => Some(d),
            _ => None,
        }
    }

    /// Interpret the value as an element index.
    pub fn to_index(&self) -> Result<i64> {
        match self {
            Variant::I4(n) => Ok(*n as i64),
            Variant::R8(d) if d.fract() == 0.0 && d.is_finite() => Ok(*d as i64),
            Variant::Bstr(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| DispatchError::marshal(format!("'{s}' is not a valid index"))),
            other => Err(DispatchError::marshal(format!(
                "VT {:#x} is not a valid index",
                other.vt()
            ))),
        }
    }
}

impl From<bool> for Variant {
    fn from(b: bool) -> Self {
        Variant::Bool(b)
    }
}

impl From<i32> for Variant {
    fn from(n: i32) -> Self {
        Variant::I4(n)
    }
}

impl From<f64> for Variant {
    fn from(d: f64) -> Self {
        Variant::R8(d)
    }
}

impl From<&str> for Variant {
    fn from(s: &str) -> Self {
        Variant::Bstr(s.to_string())
    }
}

impl From<String> for Variant {
    fn from(s: String) -> Self {
        Variant::Bstr(s)
    }
}

impl From<DispatchRef> for Variant {
    fn from(d: DispatchRef) -> Self {
        Variant::Dispatch(d)
    }
}

/// The three things an invocation can ask of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Get,
    Put,
    Call,
}

impl InvokeKind {
    /// Decode a `DISPATCH_*` bit set. Puts win over calls, calls over gets.
    pub fn from_flags(bits: u16) -> Option<InvokeKind> {
        if bits & (flags::DISPATCH_PROPERTYPUT | flags::DISPATCH_PROPERTYPUTREF) != 0 {
            Some(InvokeKind::Put)
        } else if bits & flags::DISPATCH_METHOD != 0 {
            Some(InvokeKind::Call)
        } else if bits & flags::DISPATCH_PROPERTYGET != 0 {
            Some(InvokeKind::Get)
        } else {
            None
        }
    }

    pub fn flags(self) -> u16 {
        match self {
            InvokeKind::Get => flags::DISPATCH_PROPERTYGET,
            InvokeKind::Put => flags::DISPATCH_PROPERTYPUT,
            InvokeKind::Call => flags::DISPATCH_METHOD,
        }
    }
}

/// One member as listed by type information.
///
/// `invkind` uses the `INVOKEKIND` bits, which share their values with
/// [`flags`]: 1 for a method, 2 for a getter, 4 and 8 for setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub name: Option<String>,
    pub dispid: DispId,
    pub invkind: u16,
    pub argcnt: u16,
}

/// Arguments of one invocation.
///
/// For `Put`, `args` holds exactly the new value. For `Get` and `Put`, `index`
/// addresses an element of the (indexed) member.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub kind: InvokeKind,
    pub args: Vec<Variant>,
    pub index: Option<i64>,
}

impl Invocation {
    pub fn get() -> Self {
        Self {
            kind: InvokeKind::Get,
            args: Vec::new(),
            index: None,
        }
    }

    pub fn get_index(index: i64) -> Self {
        Self {
            kind: InvokeKind::Get,
            args: Vec::new(),
            index: Some(index),
        }
    }

    pub fn put(value: impl Into<Variant>) -> Self {
        Self {
            kind: InvokeKind::Put,
            args: vec![value.into()],
            index: None,
        }
    }

    pub fn put_index(index: i64, value: impl Into<Variant>) -> Self {
        Self {
            kind: InvokeKind::Put,
            args: vec![value.into()],
            index: Some(index),
        }
    }

    pub fn call(args: Vec<Variant>) -> Self {
        Self {
            kind: InvokeKind::Call,
            args,
            index: None,
        }
    }

    /// Decode a DISPPARAMS-shaped argument list.
    ///
    /// `args` is in natural (left-to-right) order; for puts the new value is the
    /// last element. `named` lists the named-argument ids the caller supplied.
    pub fn from_params(bits: u16, mut args: Vec<Variant>, named: &[DispId]) -> Result<Self> {
        let kind = InvokeKind::from_flags(bits).ok_or(DispatchError::InvalidFlags(bits))?;

        let named_ok = match kind {
            InvokeKind::Put => named.is_empty() || named == &[DISPID_PROPERTYPUT][..],
            _ => named.is_empty(),
        };
        if !named_ok {
            return Err(DispatchError::NoNamedArgs);
        }

        match kind {
            InvokeKind::Get => match args.len() {
                0 => Ok(Self::get()),
                1 => Ok(Self::get_index(args[0].to_index()?)),
                n => Err(DispatchError::BadParamCount {
                    expected: 1,
                    actual: n,
                }),
            },
            InvokeKind::Put => match args.len() {
                1 => Ok(Self::put(args.remove(0))),
                2 => {
                    let index = args[0].to_index()?;
                    Ok(Self::put_index(index, args.remove(1)))
                }
                n => Err(DispatchError::BadParamCount {
                    expected: if n == 0 { 1 } else { 2 },
                    actual: n,
                }),
            },
            InvokeKind::Call => Ok(Self::call(args)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flags_decode() {
        use flags::*;
        assert_eq!(
            InvokeKind::from_flags(DISPATCH_PROPERTYGET),
            Some(InvokeKind::Get)
        );
        assert_eq!(
            InvokeKind::from_flags(DISPATCH_METHOD | DISPATCH_PROPERTYGET),
            Some(InvokeKind::Call)
        );
        assert_eq!(
            InvokeKind::from_flags(DISPATCH_PROPERTYPUTREF),
            Some(InvokeKind::Put)
        );
        assert_eq!(InvokeKind::from_flags(0), None);
    }

    #[test]
    fn test_from_params_get_with_index() {
        let inv = Invocation::from_params(flags::DISPATCH_PROPERTYGET, vec![Variant::I4(2)], &[])
            .unwrap();
        assert_eq!(inv, Invocation::get_index(2));
    }

    #[test]
    fn test_from_params_put_value_is_last() {
        let inv = Invocation::from_params(
            flags::DISPATCH_PROPERTYPUT,
            vec![Variant::R8(1.0), Variant::from("x")],
            &[DISPID_PROPERTYPUT],
        )
        .unwrap();
        assert_eq!(inv, Invocation::put_index(1, "x"));
    }

    #[test]
    fn test_from_params_rejects_named_args_on_call() {
        let err =
            Invocation::from_params(flags::DISPATCH_METHOD, vec![Variant::I4(1)], &[7]).unwrap_err();
        assert!(matches!(err, DispatchError::NoNamedArgs));
    }

    #[test]
    fn test_from_params_rejects_stray_named_args_on_put() {
        for named in [&[DISPID_PROPERTYPUT, 7][..], &[7][..]] {
            let err = Invocation::from_params(
                flags::DISPATCH_PROPERTYPUT,
                vec![Variant::I4(0), "x".into()],
                named,
            )
            .unwrap_err();
            assert!(matches!(err, DispatchError::NoNamedArgs), "named {named:?}");
        }
    }

    #[test]
    fn test_from_params_bad_counts() {
        let err = Invocation::from_params(flags::DISPATCH_PROPERTYPUT, vec![], &[]).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::BadParamCount {
                expected: 1,
                actual: 0
            }
        ));
        let err = Invocation::from_params(
            flags::DISPATCH_PROPERTYGET,
            vec![Variant::I4(0), Variant::I4(1)],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::BadParamCount { .. }));
    }

    #[test]
    fn test_index_conversion() {
        assert_eq!(Variant::R8(3.0).to_index().unwrap(), 3);
        assert_eq!(Variant::from(" 4 ").to_index().unwrap(), 4);
        assert!(Variant::R8(1.5).to_index().is_err());
        assert!(Variant::Empty.to_index().is_err());
    }

    #[test]
    fn test_vt_codes() {
        assert_eq!(Variant::from("s").vt(), vt::VT_BSTR);
        assert_eq!(Variant::Array(vec![]).vt(), 0x200C);
        assert_eq!(Variant::default().vt(), vt::VT_EMPTY);
    }
}

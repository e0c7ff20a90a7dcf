//! Conversion between [`Variant`] and native `VARIANT`s.
//!
//! The VARIANT struct wraps inner unions in ManuallyDrop, so fields are set
//! with ptr::write to avoid the DerefMut lint.

use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::ptr;
use std::rc::Rc;

use windows::core::{Interface, BSTR};
use windows::Win32::Foundation::VARIANT_BOOL;
use windows::Win32::System::Com::{IDispatch, SAFEARRAY};
use windows::Win32::System::Ole::{
    SafeArrayCreateVector, SafeArrayDestroy, SafeArrayGetDim, SafeArrayGetElement,
    SafeArrayGetLBound, SafeArrayGetUBound, SafeArrayPutElement,
};
use windows::Win32::System::Variant::{
    VariantClear, VARENUM, VARIANT, VT_ARRAY, VT_BOOL, VT_BSTR, VT_BYREF, VT_DATE, VT_DISPATCH,
    VT_EMPTY, VT_ERROR, VT_I2, VT_I4, VT_INT, VT_NULL, VT_R4, VT_R8, VT_UI1, VT_UI2, VT_UI4,
    VT_UINT, VT_UNKNOWN, VT_VARIANT,
};

use super::client::NativeObject;
use super::server::ComDispatch;
use crate::error::{DispatchError, Result};
use crate::types::{DispatchRef, Variant};

/// Convert to a native `VARIANT` owned by the caller.
///
/// A host proxy inside `value` is adopted by a new [`ComDispatch`]: the
/// reference `value` carried now belongs to the COM object.
pub fn to_native(value: Variant) -> Result<VARIANT> {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        match value {
            Variant::Empty => {}
            Variant::Null => ptr::write(&mut inner.vt, VT_NULL),
            Variant::Bool(b) => {
                ptr::write(&mut inner.vt, VT_BOOL);
                ptr::write(
                    &mut inner.Anonymous.boolVal,
                    VARIANT_BOOL(if b { -1 } else { 0 }),
                );
            }
            Variant::I4(n) => {
                ptr::write(&mut inner.vt, VT_I4);
                ptr::write(&mut inner.Anonymous.lVal, n);
            }
            Variant::R8(d) => {
                ptr::write(&mut inner.vt, VT_R8);
                ptr::write(&mut inner.Anonymous.dblVal, d);
            }
            Variant::Bstr(s) => {
                ptr::write(&mut inner.vt, VT_BSTR);
                ptr::write(&mut inner.Anonymous.bstrVal, ManuallyDrop::new(BSTR::from(s)));
            }
            Variant::Error(code) => {
                ptr::write(&mut inner.vt, VT_ERROR);
                ptr::write(&mut inner.Anonymous.scode, code);
            }
            Variant::Array(items) => {
                let psa = to_safearray(items)?;
                ptr::write(&mut inner.vt, VARENUM(VT_ARRAY.0 | VT_VARIANT.0));
                ptr::write(&mut inner.Anonymous.parray, psa);
            }
            Variant::Dispatch(d) => {
                let disp = to_idispatch(d);
                ptr::write(&mut inner.vt, VT_DISPATCH);
                ptr::write(&mut inner.Anonymous.pdispVal, ManuallyDrop::new(Some(disp)));
            }
        }
        Ok(v)
    }
}

fn to_idispatch(d: DispatchRef) -> IDispatch {
    if let DispatchRef::Native(native) = &d {
        if let Some(disp) = native.as_idispatch() {
            return disp;
        }
    }
    ComDispatch::new(d).into()
}

unsafe fn to_safearray(items: Vec<Variant>) -> Result<*mut SAFEARRAY> {
    let len = u32::try_from(items.len())
        .map_err(|_| DispatchError::marshal("array too large for a SAFEARRAY"))?;
    let psa = SafeArrayCreateVector(VT_VARIANT, 0, len);
    if psa.is_null() {
        return Err(DispatchError::marshal("SafeArrayCreateVector failed"));
    }
    for (i, item) in items.into_iter().enumerate() {
        let index = i as i32;
        let filled = to_native(item).and_then(|mut elem| {
            // SafeArrayPutElement copies the element.
            let put = SafeArrayPutElement(psa, &index, &elem as *const VARIANT as *const c_void);
            clear(&mut elem);
            put.map_err(DispatchError::from)
        });
        if let Err(e) = filled {
            let _ = SafeArrayDestroy(psa);
            return Err(e);
        }
    }
    Ok(psa)
}

/// Convert a native `VARIANT` borrowed from the caller.
pub fn from_native(v: &VARIANT) -> Result<Variant> {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt.0;
        let anon = &v.Anonymous.Anonymous.Anonymous;

        if vt & VT_BYREF.0 != 0 {
            return from_byref(v, VARENUM(vt & !VT_BYREF.0));
        }
        if vt & VT_ARRAY.0 != 0 {
            if vt & !VT_ARRAY.0 != VT_VARIANT.0 {
                return Err(DispatchError::marshal(format!(
                    "unsupported SAFEARRAY element type {:#x}",
                    vt & !VT_ARRAY.0
                )));
            }
            return from_safearray(anon.parray);
        }

        let value = match VARENUM(vt) {
            VT_EMPTY => Variant::Empty,
            VT_NULL => Variant::Null,
            VT_BOOL => Variant::Bool(anon.boolVal.0 != 0),
            VT_I2 => Variant::I4(anon.iVal as i32),
            VT_UI1 => Variant::I4(anon.bVal as i32),
            VT_UI2 => Variant::I4(anon.uiVal as i32),
            VT_I4 | VT_INT => Variant::I4(anon.lVal),
            VT_UI4 | VT_UINT => from_u32(anon.ulVal),
            VT_R4 => Variant::R8(anon.fltVal as f64),
            // Dates travel as OLE serial numbers.
            VT_R8 | VT_DATE => Variant::R8(anon.dblVal),
            VT_BSTR => Variant::Bstr(anon.bstrVal.to_string()),
            VT_ERROR => Variant::Error(anon.scode),
            VT_DISPATCH => from_dispatch((*anon.pdispVal).clone()),
            VT_UNKNOWN => match &*anon.punkVal {
                None => Variant::Null,
                Some(unk) => match unk.cast::<IDispatch>() {
                    Ok(disp) => from_dispatch(Some(disp)),
                    Err(_) => {
                        return Err(DispatchError::marshal(
                            "VT_UNKNOWN value does not support IDispatch",
                        ))
                    }
                },
            },
            other => {
                return Err(DispatchError::marshal(format!(
                    "unsupported VARTYPE {:#x}",
                    other.0
                )))
            }
        };
        Ok(value)
    }
}

unsafe fn from_byref(v: &VARIANT, base: VARENUM) -> Result<Variant> {
    let anon = &v.Anonymous.Anonymous.Anonymous;
    if anon.byref.is_null() {
        return Err(DispatchError::marshal("null VT_BYREF pointer"));
    }
    let value = match base {
        VT_VARIANT => return from_native(&*anon.pvarVal),
        VT_BOOL => Variant::Bool((*anon.pboolVal).0 != 0),
        VT_I2 => Variant::I4(*anon.piVal as i32),
        VT_I4 | VT_INT => Variant::I4(*anon.plVal),
        VT_R8 | VT_DATE => Variant::R8(*anon.pdblVal),
        VT_BSTR => Variant::Bstr((*anon.pbstrVal).to_string()),
        VT_DISPATCH => from_dispatch((*anon.ppdispVal).clone()),
        other => {
            return Err(DispatchError::marshal(format!(
                "unsupported VT_BYREF type {:#x}",
                other.0
            )))
        }
    };
    Ok(value)
}

unsafe fn from_safearray(psa: *mut SAFEARRAY) -> Result<Variant> {
    if psa.is_null() {
        return Ok(Variant::Array(Vec::new()));
    }
    let dims = SafeArrayGetDim(psa);
    if dims != 1 {
        return Err(DispatchError::marshal(format!(
            "{dims}-dimensional SAFEARRAY is not supported"
        )));
    }
    let lower = SafeArrayGetLBound(psa, 1)?;
    let upper = SafeArrayGetUBound(psa, 1)?;
    let mut items = Vec::new();
    for index in lower..=upper {
        let mut elem = VARIANT::default();
        SafeArrayGetElement(psa, &index, &mut elem as *mut VARIANT as *mut c_void)?;
        let item = from_native(&elem);
        clear(&mut elem);
        items.push(item?);
    }
    Ok(Variant::Array(items))
}

fn from_dispatch(disp: Option<IDispatch>) -> Variant {
    match disp {
        // `Nothing`
        None => Variant::Null,
        Some(disp) => Variant::Dispatch(DispatchRef::Native(Rc::new(NativeObject::new(disp)))),
    }
}

fn from_u32(n: u32) -> Variant {
    match i32::try_from(n) {
        Ok(n) => Variant::I4(n),
        Err(_) => Variant::R8(n as f64),
    }
}

/// Release whatever `v` owns and reset it to `VT_EMPTY`.
pub fn clear(v: &mut VARIANT) {
    if let Err(e) = unsafe { VariantClear(v) } {
        tracing::warn!("VariantClear failed: {e}");
    }
}

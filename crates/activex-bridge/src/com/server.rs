//! A real `IDispatch` over a [`DispatchRef`].

use std::ptr;
use std::slice;

use windows::core::{implement, BSTR, GUID, HRESULT, PCWSTR};
use windows::Win32::System::Com::{
    IDispatch, IDispatch_Impl, ITypeInfo, DISPATCH_FLAGS, DISPPARAMS, EXCEPINFO,
};
use windows::Win32::System::Variant::VARIANT;

use super::variant;
use crate::error::{hresult, DispatchError, Result};
use crate::types::{DispId, DispatchRef, Invocation, Variant, DISPID_UNKNOWN};

#[implement(IDispatch)]
pub struct ComDispatch {
    inner: DispatchRef,
}

impl ComDispatch {
    /// Wrap `inner`. For a host proxy the COM object takes over the caller's
    /// reference and releases it when the last COM reference goes away.
    pub fn new(inner: DispatchRef) -> Self {
        Self { inner }
    }

    /// Decode DISPPARAMS and run the invocation. On a bad argument, the
    /// returned position is the offending `rgvarg` slot.
    unsafe fn dispatch(
        &self,
        id: DispId,
        flags: u16,
        params: *const DISPPARAMS,
    ) -> std::result::Result<Variant, (DispatchError, Option<u32>)> {
        let (args, named) = if params.is_null() {
            (Vec::new(), Vec::new())
        } else {
            let params = &*params;
            let raw = raw_slice(params.rgvarg, params.cArgs);
            // rgvarg is in reverse order.
            let mut args = Vec::with_capacity(raw.len());
            for (slot, v) in raw.iter().enumerate().rev() {
                let arg = variant::from_native(v).map_err(|e| (e, Some(slot as u32)))?;
                args.push(arg);
            }
            let named = raw_slice(params.rgdispidNamedArgs, params.cNamedArgs).to_vec();
            (args, named)
        };
        let invocation = Invocation::from_params(flags, args, &named).map_err(|e| (e, None))?;
        self.inner
            .as_dispatch()
            .invoke(id, invocation)
            .map_err(|e| (e, None))
    }
}

unsafe fn raw_slice<'a, T>(data: *mut T, len: u32) -> &'a [T] {
    if data.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(data, len as usize)
    }
}

fn com_error(err: &DispatchError) -> windows::core::Error {
    windows::core::Error::new(HRESULT(err.hresult()), err.to_string())
}

impl IDispatch_Impl for ComDispatch_Impl {
    fn GetTypeInfoCount(&self) -> windows::core::Result<u32> {
        Ok(0)
    }

    fn GetTypeInfo(&self, _itinfo: u32, _lcid: u32) -> windows::core::Result<ITypeInfo> {
        Err(HRESULT(hresult::E_NOTIMPL).into())
    }

    fn GetIDsOfNames(
        &self,
        _riid: *const GUID,
        rgsznames: *const PCWSTR,
        cnames: u32,
        _lcid: u32,
        rgdispid: *mut i32,
    ) -> windows::core::Result<()> {
        if rgsznames.is_null() || rgdispid.is_null() {
            return Err(HRESULT(hresult::E_POINTER).into());
        }
        let (names, ids) = unsafe {
            let names = slice::from_raw_parts(rgsznames, cnames as usize)
                .iter()
                .map(|name| name.to_string())
                .collect::<std::result::Result<Vec<String>, _>>()
                .map_err(|_| windows::core::Error::from(HRESULT(hresult::E_INVALIDARG)))?;
            (names, slice::from_raw_parts_mut(rgdispid, cnames as usize))
        };
        ids.fill(DISPID_UNKNOWN);

        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let target = self.inner.as_dispatch();
        match target.get_ids_of_names(&names) {
            Ok(found) => {
                ids[..found.len()].copy_from_slice(&found);
                Ok(())
            }
            Err(err) => {
                // Parameter names fail, but the member itself still resolves.
                if let (DispatchError::UnknownName(_), Some(member)) = (&err, names.first()) {
                    if let Ok(id) = target.resolve(member) {
                        ids[0] = id;
                    }
                }
                Err(com_error(&err))
            }
        }
    }

    fn Invoke(
        &self,
        dispidmember: i32,
        _riid: *const GUID,
        _lcid: u32,
        wflags: DISPATCH_FLAGS,
        pdispparams: *const DISPPARAMS,
        pvarresult: *mut VARIANT,
        pexcepinfo: *mut EXCEPINFO,
        puargerr: *mut u32,
    ) -> windows::core::Result<()> {
        let outcome = unsafe { self.dispatch(dispidmember, wflags.0, pdispparams) };
        let result: Result<()> = match outcome {
            Ok(value) if pvarresult.is_null() => {
                release_unclaimed(value);
                Ok(())
            }
            Ok(value) => variant::to_native(value).map(|native| unsafe {
                ptr::write(pvarresult, native);
            }),
            Err((err, slot)) => {
                if let (Some(slot), false) = (slot, puargerr.is_null()) {
                    unsafe { *puargerr = slot };
                }
                Err(err)
            }
        };

        result.map_err(|err| {
            tracing::debug!("Invoke({dispidmember}) failed: {err}");
            if let (DispatchError::Exception { .. }, false) = (&err, pexcepinfo.is_null()) {
                unsafe {
                    ptr::write(
                        pexcepinfo,
                        EXCEPINFO {
                            bstrSource: BSTR::from(err.source().unwrap_or("activex-bridge")),
                            bstrDescription: BSTR::from(err.description()),
                            scode: hresult::E_FAIL,
                            ..Default::default()
                        },
                    );
                }
            }
            com_error(&err)
        })
    }
}

/// A result nobody asked for still owns one proxy reference.
fn release_unclaimed(value: Variant) {
    if let Variant::Dispatch(DispatchRef::Host(proxy)) = value {
        let _ = proxy.release();
    }
}

impl Drop for ComDispatch {
    fn drop(&mut self) {
        if let Some(proxy) = self.inner.as_proxy() {
            let _ = proxy.release();
        }
    }
}

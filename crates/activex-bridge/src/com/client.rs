//! Late-bound access to foreign Automation objects, and class activation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr;
use std::rc::Rc;

use windows::core::{Interface, BSTR, GUID, HSTRING, PCWSTR};
use windows::Win32::Foundation::DISP_E_EXCEPTION;
use windows::Win32::Globalization::GetSystemDefaultLCID;
use windows::Win32::System::Com::{
    CLSIDFromProgID, CLSIDFromString, CoCreateInstance, IDispatch, CLSCTX, CLSCTX_ALL,
    CLSCTX_INPROC_SERVER, CLSCTX_LOCAL_SERVER, DISPATCH_FLAGS, DISPATCH_METHOD,
    DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS, EXCEPINFO,
};
use windows::Win32::System::Ole::{GetActiveObject, DISPID_PROPERTYPUT};
use windows::Win32::System::Variant::VARIANT;

use super::variant;
use crate::error::{DispatchError, Result};
use crate::factory::{ClassActivator, CreateOptions, ServerContext};
use crate::proxy::Dispatch;
use crate::types::{DispId, DispatchRef, Invocation, InvokeKind, MemberInfo, Variant};

/// A foreign `IDispatch`, driven through the [`Dispatch`] trait.
#[derive(Clone)]
pub struct NativeObject {
    inner: IDispatch,
    name: String,
    names: RefCell<HashMap<DispId, String>>,
}

impl NativeObject {
    pub fn new(inner: IDispatch) -> Self {
        Self::named(inner, "[dispatch]")
    }

    /// Wrap `inner` under a diagnostic name, such as its class id.
    pub fn named(inner: IDispatch, name: impl Into<String>) -> Self {
        Self {
            inner,
            name: name.into(),
            names: RefCell::new(HashMap::new()),
        }
    }

    fn name_of(&self, id: DispId) -> String {
        self.names
            .borrow()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("dispid {id}"))
    }

    /// Objects returned by a member are named after it.
    fn adopt(&self, id: DispId, value: Variant) -> Variant {
        match &value {
            Variant::Dispatch(DispatchRef::Native(obj)) => match obj.as_idispatch() {
                Some(disp) => {
                    let name = format!("{}.{}", self.name, self.name_of(id));
                    Variant::Dispatch(DispatchRef::Native(Rc::new(Self::named(disp, name))))
                }
                None => value,
            },
            _ => value,
        }
    }
}

impl Dispatch for NativeObject {
    fn resolve(&self, name: &str) -> Result<DispId> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let names = [PCWSTR(wide.as_ptr())];
        let mut dispid = 0i32;
        unsafe {
            self.inner.GetIDsOfNames(
                &GUID::zeroed(),
                names.as_ptr(),
                1,
                GetSystemDefaultLCID(),
                &mut dispid,
            )
        }
        .map_err(|e| {
            tracing::debug!("GetIDsOfNames('{name}') failed: {e}");
            DispatchError::UnknownName(name.to_string())
        })?;
        self.names.borrow_mut().insert(dispid, name.to_string());
        Ok(dispid)
    }

    fn invoke(&self, id: DispId, invocation: Invocation) -> Result<Variant> {
        let Invocation { kind, args, index } = invocation;

        // Natural order: the index first, the new value of a put last.
        let mut natural = Vec::with_capacity(args.len() + 1);
        if let Some(index) = index {
            natural.push(match i32::try_from(index) {
                Ok(n) => Variant::I4(n),
                Err(_) => Variant::R8(index as f64),
            });
        }
        natural.extend(args);

        // DISPPARAMS requires arguments in reverse order
        let mut reversed = Vec::with_capacity(natural.len());
        for arg in natural.into_iter().rev() {
            match variant::to_native(arg) {
                Ok(v) => reversed.push(v),
                Err(e) => {
                    reversed.iter_mut().for_each(variant::clear);
                    return Err(e);
                }
            }
        }

        let mut named_args = [DISPID_PROPERTYPUT];
        let (flags, named): (DISPATCH_FLAGS, u32) = match kind {
            InvokeKind::Get => (DISPATCH_PROPERTYGET, 0),
            InvokeKind::Put => (DISPATCH_PROPERTYPUT, 1),
            InvokeKind::Call => (DISPATCH_METHOD | DISPATCH_PROPERTYGET, 0),
        };
        let params = DISPPARAMS {
            rgvarg: if reversed.is_empty() {
                ptr::null_mut()
            } else {
                reversed.as_mut_ptr()
            },
            rgdispidNamedArgs: if named == 0 {
                ptr::null_mut()
            } else {
                named_args.as_mut_ptr()
            },
            cArgs: reversed.len() as u32,
            cNamedArgs: named,
        };

        let mut result = VARIANT::default();
        let mut except = EXCEPINFO::default();
        let outcome = unsafe {
            self.inner.Invoke(
                id,
                &GUID::zeroed(),
                GetSystemDefaultLCID(),
                flags,
                &params,
                Some(&mut result),
                Some(&mut except),
                None,
            )
        };
        reversed.iter_mut().for_each(variant::clear);

        if let Err(err) = outcome {
            return Err(invoke_error(err, &except, &self.name_of(id)));
        }
        let value = variant::from_native(&result);
        variant::clear(&mut result);
        Ok(self.adopt(id, value?))
    }

    fn object_id(&self) -> String {
        self.name.clone()
    }

    /// Functions described by every type info the object exposes.
    fn type_members(&self) -> Result<Vec<MemberInfo>> {
        let count = unsafe { self.inner.GetTypeInfoCount() }.unwrap_or(0);
        let mut members = Vec::new();
        for i in 0..count {
            let Ok(info) = (unsafe { self.inner.GetTypeInfo(i, 0) }) else {
                continue;
            };
            let mut index = 0;
            while let Ok(desc) = unsafe { info.GetFuncDesc(index) } {
                let (dispid, invkind, argcnt) = unsafe {
                    let d = &*desc;
                    (d.memid, d.invkind.0 as u16, d.cParams.max(0) as u16)
                };
                unsafe { info.ReleaseFuncDesc(desc) };

                let mut names = [BSTR::new()];
                let mut found = 0u32;
                let name = match unsafe { info.GetNames(dispid, &mut names, &mut found) } {
                    Ok(()) if found > 0 => Some(names[0].to_string()),
                    _ => None,
                };
                members.push(MemberInfo {
                    name,
                    dispid,
                    invkind,
                    argcnt,
                });
                index += 1;
            }
        }
        Ok(members)
    }

    fn as_idispatch(&self) -> Option<IDispatch> {
        Some(self.inner.clone())
    }
}

/// Turn an Invoke failure into an error, keeping EXCEPINFO text if present.
fn invoke_error(err: windows::core::Error, except: &EXCEPINFO, member: &str) -> DispatchError {
    if err.code() != DISP_E_EXCEPTION {
        return DispatchError::Com(err);
    }
    let description = if !except.bstrDescription.is_empty() {
        except.bstrDescription.to_string()
    } else {
        String::from("(no description)")
    };
    let source = if !except.bstrSource.is_empty() {
        except.bstrSource.to_string()
    } else {
        member.to_string()
    };
    DispatchError::Exception {
        member: source,
        description,
    }
}

/// Resolve a ProgID or a `{CLSID}` string.
fn class_id_to_clsid(class_id: &str) -> Result<GUID> {
    let hstr = HSTRING::from(class_id);
    let clsid = if class_id.starts_with('{') {
        unsafe { CLSIDFromString(&hstr) }
    } else {
        unsafe { CLSIDFromProgID(&hstr) }
    };
    clsid.map_err(|e| {
        tracing::debug!("class id '{class_id}' did not resolve: {e}");
        DispatchError::ClassNotRegistered(class_id.to_string())
    })
}

fn server_context(context: ServerContext) -> CLSCTX {
    match context {
        ServerContext::Any => CLSCTX_ALL,
        ServerContext::InProcess => CLSCTX_INPROC_SERVER,
        ServerContext::LocalServer => CLSCTX_LOCAL_SERVER,
    }
}

/// Activates classes through the COM runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComActivator;

impl ComActivator {
    fn running_instance(clsid: &GUID) -> Option<IDispatch> {
        let mut unknown = None;
        unsafe { GetActiveObject(clsid, None, &mut unknown) }.ok()?;
        unknown?.cast::<IDispatch>().ok()
    }
}

impl ClassActivator for ComActivator {
    fn create(&self, class_id: &str, options: &CreateOptions) -> Result<DispatchRef> {
        let clsid = class_id_to_clsid(class_id)?;

        if options.activate {
            if let Some(disp) = Self::running_instance(&clsid) {
                tracing::debug!("Attached to running instance of {class_id}");
                return Ok(DispatchRef::Native(Rc::new(NativeObject::named(disp, class_id))));
            }
        }

        let disp: IDispatch =
            unsafe { CoCreateInstance(&clsid, None, server_context(options.context))? };
        tracing::debug!("Created instance of {class_id}");
        Ok(DispatchRef::Native(Rc::new(NativeObject::named(disp, class_id))))
    }
}

//! The dispatch contract and the host-object dispatch proxy.
//!
//! A [`DispatchProxy`] presents one [`HostObject`] as an Automation object. It
//! holds the object handle and a [`MemberTable`], nothing else: every read goes
//! to the host object at invocation time, so host-side and proxy-side views
//! never diverge.
//!
//! The handle is normally non-owning. The host graph decides how long an
//! object lives; once it is gone the proxy answers
//! [`DispatchError::ObjectReleased`]. Roots handed out by the factory and
//! values nobody else holds, such as call results, are wrapped with
//! [`DispatchProxy::owning`].

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{DispatchError, Result};
use crate::host::{HostError, HostObject, HostValue, WeakHostObject};
use crate::marshal;
use crate::members::MemberTable;
use crate::types::{flags, DispId, Invocation, InvokeKind, MemberInfo, Variant, DISPID_VALUE};

/// The Automation dynamic-dispatch contract.
///
/// Implemented by [`DispatchProxy`] for host objects and, on Windows, by
/// `com::NativeObject` for foreign `IDispatch` pointers, so callers never need
/// to know which one they hold.
pub trait Dispatch {
    /// Map a member name to its id.
    fn resolve(&self, name: &str) -> Result<DispId>;

    /// Invoke member `id`.
    fn invoke(&self, id: DispId, invocation: Invocation) -> Result<Variant>;

    /// `GetIDsOfNames` semantics: the first name is the member, the rest are
    /// parameter names, which are not supported.
    fn get_ids_of_names(&self, names: &[&str]) -> Result<Vec<DispId>> {
        let (member, params) = names
            .split_first()
            .ok_or_else(|| DispatchError::InvalidArgument("no names supplied".to_string()))?;
        let id = self.resolve(member)?;
        if let Some(param) = params.first() {
            return Err(DispatchError::UnknownName((*param).to_string()));
        }
        Ok(vec![id])
    }

    /// Get a property value. Equivalent to VB's `obj.PropertyName`.
    fn get_property(&self, name: &str) -> Result<Variant> {
        let id = self.resolve(name)?;
        self.invoke(id, Invocation::get())
    }

    /// Set a property value. Equivalent to VB's `obj.PropertyName = value`.
    fn put_property(&self, name: &str, value: Variant) -> Result<()> {
        let id = self.resolve(name)?;
        self.invoke(id, Invocation::put(value)).map(|_| ())
    }

    /// Get an indexed property, e.g. `obj.arr(0)`.
    fn get_indexed(&self, name: &str, index: i64) -> Result<Variant> {
        let id = self.resolve(name)?;
        self.invoke(id, Invocation::get_index(index))
    }

    /// Set an indexed property, e.g. `obj.arr(0) = value`.
    fn put_indexed(&self, name: &str, index: i64, value: Variant) -> Result<()> {
        let id = self.resolve(name)?;
        self.invoke(id, Invocation::put_index(index, value))
            .map(|_| ())
    }

    /// Invoke a method with arguments in natural order.
    fn invoke_method(&self, name: &str, args: Vec<Variant>) -> Result<Variant> {
        let id = self.resolve(name)?;
        self.invoke(id, Invocation::call(args))
    }

    /// Name of the object for diagnostics (`__id`): a path such as `#.obj`,
    /// or the class id an object was created from.
    fn object_id(&self) -> String {
        String::from("[dispatch]")
    }

    /// The object's own value (`__value`): a get of the default member.
    fn value_of(&self) -> Result<Variant> {
        self.invoke(DISPID_VALUE, Invocation::get())
    }

    /// Members known to the object's type information (`__type`). Objects
    /// without type information list nothing.
    fn type_members(&self) -> Result<Vec<MemberInfo>> {
        Ok(Vec::new())
    }

    /// The underlying `IDispatch`, for objects that already are native.
    #[cfg(windows)]
    fn as_idispatch(&self) -> Option<windows::Win32::System::Com::IDispatch> {
        None
    }
}

enum Target {
    Borrowed(WeakHostObject),
    Owned(HostObject),
}

/// Automation proxy over a host object.
///
/// Two states: live (holds the host handle) and released (reference count hit
/// zero, handle dropped). Every operation on a released proxy, or on one whose
/// host object has been torn down, fails with [`DispatchError::ObjectReleased`].
pub struct DispatchProxy {
    identity: String,
    target: RefCell<Option<Target>>,
    members: RefCell<MemberTable>,
    refs: AtomicU32,
}

impl DispatchProxy {
    /// Wrap `target` without keeping it alive. The caller receives the first
    /// reference.
    ///
    /// `identity` names the object for diagnostics: `#` for a root object,
    /// `#.obj` or `#.arr[0]` for values reached through it, `@func` for call
    /// results.
    pub fn new(target: &HostObject, identity: impl Into<String>) -> Rc<Self> {
        Self::with_target(Target::Borrowed(target.downgrade()), target, identity.into())
    }

    /// Wrap `target` and own it until the last reference is released.
    pub fn owning(target: HostObject, identity: impl Into<String>) -> Rc<Self> {
        let identity = identity.into();
        Self::with_target(Target::Owned(target.clone()), &target, identity)
    }

    fn with_target(target: Target, obj: &HostObject, identity: String) -> Rc<Self> {
        tracing::debug!("DispatchProxy '{identity}' created over {obj:?}");
        Rc::new(Self {
            identity,
            target: RefCell::new(Some(target)),
            members: RefCell::new(MemberTable::new()),
            refs: AtomicU32::new(1),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The wrapped host object.
    pub fn target(&self) -> Result<HostObject> {
        match &*self.target.borrow() {
            Some(Target::Owned(obj)) => Ok(obj.clone()),
            Some(Target::Borrowed(weak)) => weak.upgrade().ok_or(DispatchError::ObjectReleased),
            None => Err(DispatchError::ObjectReleased),
        }
    }

    pub fn is_live(&self) -> bool {
        self.target().is_ok()
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Take another reference.
    pub fn add_ref(&self) -> Result<u32> {
        if !self.is_live() {
            return Err(DispatchError::ObjectReleased);
        }
        Ok(self.refs.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Drop a reference. The last one moves the proxy to the released state.
    pub fn release(&self) -> Result<u32> {
        let result = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match result {
            Ok(1) => {
                self.target.borrow_mut().take();
                tracing::debug!("DispatchProxy '{}' released", self.identity);
                Ok(0)
            }
            Ok(n) => Ok(n - 1),
            Err(_) => {
                tracing::warn!("release() on already released proxy '{}'", self.identity);
                Err(DispatchError::ObjectReleased)
            }
        }
    }

    /// Name previously resolved to `id`.
    pub fn member_name(&self, id: DispId) -> Option<String> {
        self.members.borrow().name(id).map(str::to_string)
    }

    /// Resolved members in resolution order.
    pub fn members(&self) -> Vec<(DispId, String)> {
        self.members
            .borrow()
            .iter()
            .map(|(id, name)| (id, name.to_string()))
            .collect()
    }

    fn child_identity(&self, name: &str, index: Option<i64>) -> String {
        match index {
            Some(i) if name.is_empty() => format!("{}[{i}]", self.identity),
            Some(i) => format!("{}.{name}[{i}]", self.identity),
            None => format!("{}.{name}", self.identity),
        }
    }

    fn invoke_member(&self, target: &HostObject, name: &str, inv: Invocation) -> Result<Variant> {
        match inv.kind {
            InvokeKind::Get => self.get_member(target, name, inv.index),
            InvokeKind::Put => {
                let value = single_value(inv.args)?;
                self.put_member(target, name, inv.index, value)
            }
            InvokeKind::Call => self.call_member(target, name, inv.args),
        }
    }

    fn get_member(&self, target: &HostObject, name: &str, index: Option<i64>) -> Result<Variant> {
        let value = read_member(target, name)?;
        match index {
            None => Ok(marshal::to_automation(
                &value,
                &self.child_identity(name, None),
            )),
            Some(i) => {
                let element = value
                    .as_object()
                    .ok_or_else(|| DispatchError::NotIndexable(name.to_string()))?
                    .get_index(i)
                    .map_err(|e| DispatchError::from_host(name, e))?;
                Ok(marshal::to_automation(
                    &element,
                    &self.child_identity(name, Some(i)),
                ))
            }
        }
    }

    fn put_member(
        &self,
        target: &HostObject,
        name: &str,
        index: Option<i64>,
        value: Variant,
    ) -> Result<Variant> {
        let current = read_member(target, name)?;
        let value = marshal::to_host(&value)?;
        match index {
            None => target
                .set(name, value)
                .map_err(|e| DispatchError::from_host(name, e))?,
            Some(i) => current
                .as_object()
                .ok_or_else(|| DispatchError::NotIndexable(name.to_string()))?
                .set_index(i, value)
                .map_err(|e| DispatchError::from_host(name, e))?,
        }
        Ok(Variant::Empty)
    }

    fn call_member(&self, target: &HostObject, name: &str, args: Vec<Variant>) -> Result<Variant> {
        let member = read_member(target, name)?;
        match member.as_object() {
            Some(func) if func.is_callable() => {
                let args = marshal::to_host_args(&args)?;
                let this = HostValue::Object(target.clone());
                let result = func
                    .call(&this, &args)
                    .map_err(|e| DispatchError::from_host(name, e))?;
                Ok(marshal::to_automation_owned(result, &format!("@{name}")))
            }
            // `obj.member(i)` arrives as METHOD|PROPERTYGET from most clients.
            _ if args.len() <= 1 => {
                let index = args.first().map(Variant::to_index).transpose()?;
                self.get_member(target, name, index)
            }
            _ => Err(DispatchError::from_host(
                name,
                HostError::NotCallable(name.to_string()),
            )),
        }
    }

    fn invoke_default(&self, target: &HostObject, inv: Invocation) -> Result<Variant> {
        let this = &self.identity;
        match (inv.kind, inv.index) {
            (InvokeKind::Get, None) => Ok(Variant::Bstr(
                HostValue::Object(target.clone()).to_display_string(),
            )),
            (InvokeKind::Get, Some(i)) => {
                let element = target
                    .get_index(i)
                    .map_err(|e| DispatchError::from_host(this, e))?;
                Ok(marshal::to_automation(
                    &element,
                    &self.child_identity("", Some(i)),
                ))
            }
            (InvokeKind::Put, Some(i)) => {
                let value = marshal::to_host(&single_value(inv.args)?)?;
                target
                    .set_index(i, value)
                    .map_err(|e| DispatchError::from_host(this, e))?;
                Ok(Variant::Empty)
            }
            (InvokeKind::Put, None) => Err(DispatchError::MemberNotFound(format!(
                "{this} (default member is read-only)"
            ))),
            (InvokeKind::Call, _) if target.is_callable() => {
                let args = marshal::to_host_args(&inv.args)?;
                let result = target
                    .call(&HostValue::Undefined, &args)
                    .map_err(|e| DispatchError::from_host(this, e))?;
                Ok(marshal::to_automation_owned(result, &format!("@{this}")))
            }
            (InvokeKind::Call, _) if inv.args.len() <= 1 => {
                let index = inv.args.first().map(Variant::to_index).transpose()?;
                let get = Invocation {
                    kind: InvokeKind::Get,
                    args: Vec::new(),
                    index,
                };
                self.invoke_default(target, get)
            }
            (InvokeKind::Call, _) => Err(DispatchError::from_host(
                this,
                HostError::NotCallable(this.clone()),
            )),
        }
    }
}

impl Dispatch for DispatchProxy {
    fn resolve(&self, name: &str) -> Result<DispId> {
        if !self.is_live() {
            return Err(DispatchError::ObjectReleased);
        }
        let id = self.members.borrow_mut().resolve(name);
        tracing::trace!("DispatchProxy '{}' resolve '{name}' -> {id}", self.identity);
        Ok(id)
    }

    fn invoke(&self, id: DispId, invocation: Invocation) -> Result<Variant> {
        let target = self.target()?;
        tracing::trace!(
            "DispatchProxy '{}' invoke {id} {:?} index={:?} argc={}",
            self.identity,
            invocation.kind,
            invocation.index,
            invocation.args.len()
        );
        if id == DISPID_VALUE {
            return self.invoke_default(&target, invocation);
        }
        let name = self
            .member_name(id)
            .ok_or(DispatchError::UnknownMemberId(id))?;
        self.invoke_member(&target, &name, invocation)
    }

    fn object_id(&self) -> String {
        self.identity.clone()
    }

    /// Lists the members the host object has right now, resolving each one.
    fn type_members(&self) -> Result<Vec<MemberInfo>> {
        let target = self.target()?;
        let names = if target.is_sequence() {
            vec!["length".to_string()]
        } else {
            target.keys()
        };
        names
            .into_iter()
            .map(|name| {
                let value = target.get(&name).unwrap_or_default();
                let (invkind, argcnt) = match value.as_object().and_then(HostObject::arity) {
                    Some(arity) => (flags::DISPATCH_METHOD, arity),
                    None => (flags::DISPATCH_PROPERTYGET | flags::DISPATCH_PROPERTYPUT, 0),
                };
                Ok(MemberInfo {
                    dispid: self.resolve(&name)?,
                    name: Some(name),
                    invkind,
                    argcnt: u16::try_from(argcnt).unwrap_or(u16::MAX),
                })
            })
            .collect()
    }
}

impl Drop for DispatchProxy {
    fn drop(&mut self) {
        tracing::trace!("DispatchProxy '{}' dropped", self.identity);
    }
}

/// Read a member, treating an undefined value as absent.
fn read_member(target: &HostObject, name: &str) -> Result<HostValue> {
    match target.get(name) {
        Some(value) if !value.is_undefined() => Ok(value),
        _ => Err(DispatchError::MemberNotFound(name.to_string())),
    }
}

fn single_value(mut args: Vec<Variant>) -> Result<Variant> {
    match args.len() {
        1 => Ok(args.remove(0)),
        n => Err(DispatchError::BadParamCount {
            expected: 1,
            actual: n,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> HostObject {
        HostObject::record()
            .with("text", "value")
            .with("obj", HostObject::record().with("params", "value"))
            .with("arr", HostObject::sequence(["value", "value", "value"]))
            .with(
                "func",
                HostObject::function("func", |_, args| {
                    let v = args.first().and_then(HostValue::as_f64).unwrap_or(f64::NAN);
                    Ok(HostValue::Number(v * 2.0))
                }),
            )
    }

    #[test]
    fn test_resolve_is_stable() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        let a = proxy.resolve("text").unwrap();
        let b = proxy.resolve("arr").unwrap();
        assert_eq!(proxy.resolve("text").unwrap(), a);
        assert_ne!(a, b);
        assert_ne!(a, DISPID_VALUE);
        assert_eq!(proxy.member_name(b).as_deref(), Some("arr"));
    }

    #[test]
    fn test_resolve_never_fails_for_unknown_names() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        let id = proxy.resolve("nope").unwrap();
        let err = proxy.invoke(id, Invocation::get()).unwrap_err();
        assert!(matches!(err, DispatchError::MemberNotFound(name) if name == "nope"));
    }

    #[test]
    fn test_unknown_id() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        let err = proxy.invoke(42, Invocation::get()).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownMemberId(42)));
    }

    #[test]
    fn test_get_put_scalar() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        assert_eq!(proxy.get_property("text").unwrap(), Variant::from("value"));

        proxy.put_property("text", "value2".into()).unwrap();
        assert_eq!(host.get("text"), Some(HostValue::from("value2")));

        host.set("text", "value3".into()).unwrap();
        assert_eq!(proxy.get_property("text").unwrap(), Variant::from("value3"));
    }

    #[test]
    fn test_put_absent_member_fails() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        let err = proxy.put_property("added", Variant::I4(1)).unwrap_err();
        assert!(matches!(err, DispatchError::MemberNotFound(_)));
        assert_eq!(host.get("added"), None);
    }

    #[test]
    fn test_undefined_member_is_absent() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        let id = proxy.resolve("text").unwrap();
        assert!(proxy.invoke(id, Invocation::get()).is_ok());

        host.set("text", HostValue::Undefined).unwrap();
        let err = proxy.invoke(id, Invocation::get()).unwrap_err();
        assert!(matches!(err, DispatchError::MemberNotFound(_)));
    }

    #[test]
    fn test_indexed_get_put() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        assert_eq!(proxy.get_indexed("arr", 1).unwrap(), Variant::from("value"));

        proxy.put_indexed("arr", 0, "value2".into()).unwrap();
        let arr = host.get("arr").unwrap();
        assert_eq!(
            arr.as_object().unwrap().get_index(0).unwrap(),
            HostValue::from("value2")
        );

        let err = proxy.get_indexed("arr", 3).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::IndexOutOfBounds { index: 3, len: 3 }
        ));
        let err = proxy.get_indexed("text", 0).unwrap_err();
        assert!(matches!(err, DispatchError::NotIndexable(_)));
    }

    #[test]
    fn test_put_replaces_object_identity() {
        let host = sample();
        let original = host.get("obj").unwrap();
        let proxy = DispatchProxy::new(&host, "#");
        proxy.put_property("obj", Variant::I4(5)).unwrap();
        assert_eq!(host.get("obj"), Some(HostValue::Number(5.0)));
        assert_ne!(host.get("obj"), Some(original));
    }

    #[test]
    fn test_call_method() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        let result = proxy.invoke_method("func", vec![Variant::I4(10)]).unwrap();
        assert_eq!(result, Variant::I4(20));
    }

    #[test]
    fn test_call_uses_receiver() {
        let host = sample();
        host.insert(
            "describe",
            HostObject::function("describe", |this, _| {
                let text = this
                    .as_object()
                    .and_then(|o| o.get("text"))
                    .unwrap_or_default();
                Ok(HostValue::String(format!("text={}", text.to_display_string())))
            }),
        );
        let proxy = DispatchProxy::new(&host, "#");
        assert_eq!(
            proxy.invoke_method("describe", vec![]).unwrap(),
            Variant::from("text=value")
        );
    }

    #[test]
    fn test_plain_get_of_callable_wraps_it() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        let func = proxy.get_property("func").unwrap();
        let func = func.as_dispatch().expect("callable is wrapped as dispatch");
        let result = func
            .as_dispatch()
            .invoke(DISPID_VALUE, Invocation::call(vec![Variant::R8(1.5)]))
            .unwrap();
        assert_eq!(result, Variant::I4(3));
    }

    #[test]
    fn test_call_on_sequence_member_reads_element() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        let result = proxy.invoke_method("arr", vec![Variant::I4(2)]).unwrap();
        assert_eq!(result, Variant::from("value"));

        let err = proxy
            .invoke_method("text", vec![Variant::I4(1), Variant::I4(2)])
            .unwrap_err();
        assert!(matches!(err, DispatchError::Exception { .. }));
    }

    #[test]
    fn test_host_exception_is_relayed() {
        let host = HostObject::record().with(
            "fail",
            HostObject::function("fail", |_, _| Err(HostError::Thrown("boom".to_string()))),
        );
        let proxy = DispatchProxy::new(&host, "#");
        let err = proxy.invoke_method("fail", vec![]).unwrap_err();
        assert_eq!(err.description(), "boom");
    }

    #[test]
    fn test_default_member_on_sequence() {
        let arr = HostObject::sequence(["a", "b"]);
        let proxy = DispatchProxy::new(&arr, "#");
        assert_eq!(
            proxy.invoke(DISPID_VALUE, Invocation::get()).unwrap(),
            Variant::from("a,b")
        );
        assert_eq!(
            proxy.invoke(DISPID_VALUE, Invocation::get_index(1)).unwrap(),
            Variant::from("b")
        );
        proxy
            .invoke(DISPID_VALUE, Invocation::put_index(0, "z"))
            .unwrap();
        assert_eq!(arr.get_index(0).unwrap(), HostValue::from("z"));
        assert_eq!(
            proxy
                .invoke(DISPID_VALUE, Invocation::call(vec![Variant::I4(0)]))
                .unwrap(),
            Variant::from("z")
        );
        let length = proxy.get_property("length").unwrap();
        assert_eq!(length, Variant::I4(2));
    }

    #[test]
    fn test_nested_proxy_aliases_host() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        let obj = proxy.get_property("obj").unwrap();
        let obj = obj.as_dispatch().unwrap().clone();
        assert_eq!(obj.as_proxy().unwrap().identity(), "#.obj");

        obj.as_dispatch()
            .put_property("params", "value2".into())
            .unwrap();
        let params = host.get("obj").unwrap().as_object().unwrap().get("params");
        assert_eq!(params, Some(HostValue::from("value2")));
    }

    #[test]
    fn test_release_is_terminal() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        let id = proxy.resolve("text").unwrap();
        assert_eq!(proxy.add_ref().unwrap(), 2);
        assert_eq!(proxy.release().unwrap(), 1);
        assert!(proxy.is_live());
        assert_eq!(proxy.release().unwrap(), 0);
        assert!(!proxy.is_live());

        assert!(matches!(
            proxy.invoke(id, Invocation::get()),
            Err(DispatchError::ObjectReleased)
        ));
        assert!(matches!(
            proxy.resolve("text"),
            Err(DispatchError::ObjectReleased)
        ));
        assert!(matches!(proxy.add_ref(), Err(DispatchError::ObjectReleased)));
        assert!(matches!(proxy.release(), Err(DispatchError::ObjectReleased)));
        // The host object is untouched.
        assert_eq!(host.get("text"), Some(HostValue::from("value")));
    }

    #[test]
    fn test_host_teardown_reads_as_released() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        let id = proxy.resolve("text").unwrap();
        drop(host);
        assert!(!proxy.is_live());
        assert!(matches!(
            proxy.invoke(id, Invocation::get()),
            Err(DispatchError::ObjectReleased)
        ));
    }

    #[test]
    fn test_call_result_is_owned_by_its_proxy() {
        let host = HostObject::record().with(
            "make",
            HostObject::function("make", |_, _| {
                Ok(HostObject::sequence(["fresh"]).into())
            }),
        );
        let proxy = DispatchProxy::new(&host, "#");
        let made = proxy.invoke_method("make", vec![]).unwrap();
        let made = made.as_dispatch().unwrap().as_proxy().unwrap().clone();
        assert_eq!(made.identity(), "@make");
        assert_eq!(
            made.invoke(DISPID_VALUE, Invocation::get_index(0)).unwrap(),
            Variant::from("fresh")
        );
        made.release().unwrap();
        assert!(!made.is_live());
    }

    #[test]
    fn test_introspection() {
        let host = sample();
        host.insert(
            "pair",
            HostObject::function_with_arity("pair", 2, |_, _| Ok(HostValue::Null)),
        );
        let proxy = DispatchProxy::new(&host, "#");
        assert_eq!(proxy.object_id(), "#");
        assert_eq!(proxy.value_of().unwrap(), Variant::from("[object Object]"));

        let text_id = proxy.resolve("text").unwrap();
        let members = proxy.type_members().unwrap();
        let names: Vec<_> = members.iter().filter_map(|m| m.name.as_deref()).collect();
        assert_eq!(names, vec!["text", "obj", "arr", "func", "pair"]);
        assert_eq!(members[0].dispid, text_id);
        assert_eq!(members[0].invkind, 6);
        assert_eq!(members[4].invkind, flags::DISPATCH_METHOD);
        assert_eq!(members[4].argcnt, 2);

        let arr = proxy.get_property("arr").unwrap();
        let arr = arr.as_dispatch().unwrap();
        assert_eq!(arr.as_dispatch().object_id(), "#.arr");
        assert_eq!(arr.as_dispatch().value_of().unwrap(), Variant::from("value,value,value"));
        let members = arr.as_dispatch().type_members().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name.as_deref(), Some("length"));
    }

    #[test]
    fn test_length_put_through_proxy() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        let arr = proxy.get_property("arr").unwrap();
        let arr = arr.as_dispatch().unwrap().as_dispatch();

        arr.put_property("length", Variant::I4(1)).unwrap();
        assert_eq!(host.get("arr").unwrap().as_object().unwrap().len(), Some(1));

        for bad in [Variant::R8(1e18), Variant::R8(-1.0), Variant::from("x")] {
            let err = arr.put_property("length", bad).unwrap_err();
            assert!(matches!(err, DispatchError::Exception { .. }));
        }
        assert_eq!(arr.get_property("length").unwrap(), Variant::I4(1));
    }

    #[test]
    fn test_get_ids_of_names_rejects_parameter_names() {
        let host = sample();
        let proxy = DispatchProxy::new(&host, "#");
        assert_eq!(proxy.get_ids_of_names(&["func"]).unwrap(), vec![1]);
        let err = proxy.get_ids_of_names(&["func", "v"]).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownName(name) if name == "v"));
    }
}

//! Handle table and command execution for one protocol session.

use std::collections::HashMap;

use activex_bridge::{DispatchError, DispatchRef, HostObject, HostValue, Invocation, Result, Variant};
use activex_protocol::{
    Command, Handle, MemberDescription, ResponseData, ResponseResult, WireValue,
};

/// Handle of the object the session was started with.
pub const HANDLE_ROOT: Handle = 1;

/// Objects handed out to one client.
pub struct Session {
    objects: HashMap<Handle, DispatchRef>,
    next_handle: Handle,
    host: Option<HostObject>,
    type_info: bool,
    finished: bool,
}

impl Session {
    /// Start a session over `root`. `host` is the graph behind it, if any,
    /// for `Snapshot`.
    pub fn new(root: DispatchRef, host: Option<HostObject>) -> Self {
        let mut session = Self {
            objects: HashMap::new(),
            next_handle: HANDLE_ROOT, // 0 is null
            host,
            type_info: true,
            finished: false,
        };
        session.register(root);
        session
    }

    /// Whether `TypeInfo` lists members. On by default.
    pub fn with_type_info(mut self, enabled: bool) -> Self {
        self.type_info = enabled;
        self
    }

    pub fn register(&mut self, obj: DispatchRef) -> Handle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(handle, obj);
        handle
    }

    pub fn object(&self, handle: Handle) -> Result<&DispatchRef> {
        self.objects
            .get(&handle)
            .ok_or_else(|| DispatchError::InvalidArgument(format!("unknown handle {handle}")))
    }

    /// Whether `Shutdown` has been received.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Run one command, turning failures into error results.
    pub fn handle(&mut self, command: Command) -> ResponseResult {
        match self.execute(command) {
            Ok(Some(data)) => ResponseResult::ok(data),
            Ok(None) => ResponseResult::done(),
            Err(err) => {
                tracing::debug!("command failed: {err}");
                ResponseResult::error(err.to_string(), err.hresult())
            }
        }
    }

    fn execute(&mut self, command: Command) -> Result<Option<ResponseData>> {
        match command {
            Command::Resolve { object, names } => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                let ids = self.object(object)?.as_dispatch().get_ids_of_names(&names)?;
                Ok(Some(ResponseData::Ids { ids }))
            }
            Command::Get {
                object,
                member,
                index,
            } => {
                let target = self.object(object)?.as_dispatch();
                let value = match index {
                    Some(i) => target.get_indexed(&member, i)?,
                    None => target.get_property(&member)?,
                };
                Ok(Some(self.value(value)))
            }
            Command::Put {
                object,
                member,
                index,
                value,
            } => {
                let value = self.from_wire(value)?;
                let target = self.object(object)?.as_dispatch();
                match index {
                    Some(i) => target.put_indexed(&member, i, value)?,
                    None => target.put_property(&member, value)?,
                }
                Ok(None)
            }
            Command::Call {
                object,
                member,
                args,
            } => {
                let args = self.from_wire_args(args)?;
                let value = self
                    .object(object)?
                    .as_dispatch()
                    .invoke_method(&member, args)?;
                Ok(Some(self.value(value)))
            }
            Command::Invoke {
                object,
                dispid,
                flags,
                args,
            } => {
                let args = self.from_wire_args(args)?;
                let invocation = Invocation::from_params(flags, args, &[])?;
                let value = self.object(object)?.as_dispatch().invoke(dispid, invocation)?;
                Ok(Some(self.value(value)))
            }
            Command::Identity { object } => Ok(Some(ResponseData::Identity {
                identity: self.object(object)?.as_dispatch().object_id(),
            })),
            Command::ValueOf { object } => {
                let value = self.object(object)?.as_dispatch().value_of()?;
                Ok(Some(self.value(value)))
            }
            Command::TypeInfo { object } => {
                let target = self.object(object)?.as_dispatch();
                if !self.type_info {
                    return Ok(None);
                }
                let members = target
                    .type_members()?
                    .into_iter()
                    .map(|m| MemberDescription {
                        name: m.name,
                        dispid: m.dispid,
                        invkind: m.invkind,
                        argcnt: m.argcnt,
                    })
                    .collect();
                Ok(Some(ResponseData::Members { members }))
            }
            Command::AddRef { object } => match self.object(object)?.as_proxy() {
                Some(proxy) => Ok(Some(ResponseData::RefCount {
                    refs: proxy.add_ref()?,
                })),
                None => Err(DispatchError::InvalidArgument(format!(
                    "handle {object} is not reference counted"
                ))),
            },
            Command::Release { object } => {
                let refs = match self.object(object)?.as_proxy() {
                    Some(proxy) => proxy.release()?,
                    None => 0,
                };
                if refs == 0 {
                    self.objects.remove(&object);
                    tracing::debug!("handle {object} evicted");
                }
                Ok(Some(ResponseData::RefCount { refs }))
            }
            Command::Snapshot => match &self.host {
                Some(host) => Ok(Some(ResponseData::Snapshot {
                    snapshot: HostValue::Object(host.clone()).to_json(),
                })),
                None => Err(DispatchError::InvalidArgument(
                    "session has no host object".to_string(),
                )),
            },
            Command::Shutdown => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    fn value(&mut self, value: Variant) -> ResponseData {
        ResponseData::Value {
            value: self.to_wire(value),
        }
    }

    /// Convert for the wire, registering dispatch references as new handles.
    pub fn to_wire(&mut self, value: Variant) -> WireValue {
        match value {
            Variant::Empty => WireValue::empty(),
            Variant::Null => WireValue::Null,
            Variant::Bool(b) => WireValue::Bool(b),
            Variant::I4(n) => WireValue::Int(n as i64),
            Variant::R8(d) => WireValue::Number(d),
            Variant::Bstr(s) => WireValue::String(s),
            Variant::Error(code) => WireValue::Int(code as i64),
            Variant::Array(items) => {
                WireValue::Array(items.into_iter().map(|v| self.to_wire(v)).collect())
            }
            Variant::Dispatch(obj) => WireValue::object(self.register(obj)),
        }
    }

    pub fn from_wire(&self, value: WireValue) -> Result<Variant> {
        Ok(match value {
            WireValue::Null => Variant::Null,
            WireValue::Bool(b) => Variant::Bool(b),
            WireValue::Int(n) => match i32::try_from(n) {
                Ok(n) => Variant::I4(n),
                Err(_) => Variant::R8(n as f64),
            },
            WireValue::Number(d) => Variant::R8(d),
            WireValue::String(s) => Variant::Bstr(s),
            WireValue::Array(items) => Variant::Array(self.from_wire_args(items)?),
            WireValue::Object { handle } => Variant::Dispatch(self.object(handle)?.clone()),
            WireValue::Empty { .. } => Variant::Empty,
        })
    }

    fn from_wire_args(&self, args: Vec<WireValue>) -> Result<Vec<Variant>> {
        args.into_iter().map(|v| self.from_wire(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use activex_bridge::{hresult, DispatchProxy};
    use pretty_assertions::assert_eq;

    fn session() -> (Session, HostObject) {
        let host = HostValue::from_json(serde_json::json!({
            "text": "value",
            "obj": { "params": "value" },
            "arr": ["value", "value", "value"],
        }));
        let host = host.as_object().unwrap().clone();
        let root = DispatchRef::Host(DispatchProxy::new(&host, "#"));
        (Session::new(root, Some(host.clone())), host)
    }

    fn value(result: ResponseResult) -> WireValue {
        match result {
            ResponseResult::Ok {
                data: Some(ResponseData::Value { value }),
            } => value,
            other => panic!("expected a value, got {other:?}"),
        }
    }

    #[test]
    fn test_root_is_handle_one() {
        let (session, _) = session();
        assert!(session.object(HANDLE_ROOT).is_ok());
        assert!(session.object(0).is_err());
        assert!(session.object(2).is_err());
    }

    #[test]
    fn test_get_and_put() {
        let (mut session, host) = session();
        let got = session.handle(Command::Get {
            object: HANDLE_ROOT,
            member: "text".into(),
            index: None,
        });
        assert_eq!(value(got), WireValue::from("value"));

        let put = session.handle(Command::Put {
            object: HANDLE_ROOT,
            member: "arr".into(),
            index: Some(0),
            value: WireValue::from("value2"),
        });
        assert_eq!(put, ResponseResult::done());
        let arr = host.get("arr").unwrap();
        assert_eq!(
            arr.as_object().unwrap().get_index(0).unwrap(),
            HostValue::from("value2")
        );
    }

    #[test]
    fn test_objects_become_handles() {
        let (mut session, _) = session();
        let obj = value(session.handle(Command::Get {
            object: HANDLE_ROOT,
            member: "obj".into(),
            index: None,
        }));
        assert_eq!(obj, WireValue::object(2));

        let params = session.handle(Command::Get {
            object: 2,
            member: "params".into(),
            index: None,
        });
        assert_eq!(value(params), WireValue::from("value"));

        let released = session.handle(Command::Release { object: 2 });
        assert_eq!(
            released,
            ResponseResult::ok(ResponseData::RefCount { refs: 0 })
        );
        assert!(session.object(2).is_err());
    }

    #[test]
    fn test_errors_carry_hresult() {
        let (mut session, _) = session();
        let result = session.handle(Command::Get {
            object: HANDLE_ROOT,
            member: "missing".into(),
            index: None,
        });
        match result {
            ResponseResult::Error { code, .. } => {
                assert_eq!(code, hresult::DISP_E_MEMBERNOTFOUND)
            }
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[test]
    fn test_invoke_with_raw_flags() {
        let (mut session, _) = session();
        let ids = session.handle(Command::Resolve {
            object: HANDLE_ROOT,
            names: vec!["arr".into()],
        });
        let id = match ids {
            ResponseResult::Ok {
                data: Some(ResponseData::Ids { ids }),
            } => ids[0],
            other => panic!("expected ids, got {other:?}"),
        };
        // DISPATCH_METHOD | DISPATCH_PROPERTYGET
        let got = session.handle(Command::Invoke {
            object: HANDLE_ROOT,
            dispid: id,
            flags: 3,
            args: vec![WireValue::Int(1)],
        });
        assert_eq!(value(got), WireValue::from("value"));
    }

    #[test]
    fn test_introspection_commands() {
        let (mut session, _) = session();
        let obj = value(session.handle(Command::Get {
            object: HANDLE_ROOT,
            member: "obj".into(),
            index: None,
        }));
        let handle = obj.as_handle().unwrap();
        assert_eq!(
            session.handle(Command::Identity { object: handle }),
            ResponseResult::ok(ResponseData::Identity {
                identity: "#.obj".into()
            })
        );
        assert_eq!(
            value(session.handle(Command::ValueOf { object: handle })),
            WireValue::from("[object Object]")
        );
        assert_eq!(
            session.handle(Command::TypeInfo { object: handle }),
            ResponseResult::ok(ResponseData::Members {
                members: vec![MemberDescription {
                    name: Some("params".into()),
                    dispid: 1,
                    invkind: 6,
                    argcnt: 0,
                }],
            })
        );
    }

    #[test]
    fn test_type_info_can_be_turned_off() {
        let (session, _) = session();
        let mut session = session.with_type_info(false);
        assert_eq!(
            session.handle(Command::TypeInfo {
                object: HANDLE_ROOT
            }),
            ResponseResult::done()
        );
        let err = session.handle(Command::TypeInfo { object: 9 });
        assert!(matches!(err, ResponseResult::Error { .. }));
    }

    #[test]
    fn test_snapshot_and_shutdown() {
        let (mut session, _) = session();
        session.handle(Command::Put {
            object: HANDLE_ROOT,
            member: "text".into(),
            index: None,
            value: WireValue::Int(5),
        });
        let snapshot = session.handle(Command::Snapshot);
        match snapshot {
            ResponseResult::Ok {
                data: Some(ResponseData::Snapshot { snapshot }),
            } => assert_eq!(snapshot["text"], serde_json::json!(5)),
            other => panic!("expected a snapshot, got {other:?}"),
        }
        assert!(!session.is_finished());
        session.handle(Command::Shutdown);
        assert!(session.is_finished());
    }
}

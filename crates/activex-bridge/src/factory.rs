//! Construction of Automation objects from a class id or a host object.
//!
//! [`create_object`] is the only place that knows whether a caller gets a
//! native object or a host-object proxy; both come back as a [`DispatchRef`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::error::{DispatchError, Result};
use crate::host::{HostObject, HostValue};
use crate::proxy::DispatchProxy;
use crate::types::DispatchRef;

/// Where a new Automation object comes from.
#[derive(Clone)]
pub enum ObjectSource {
    /// A ProgID such as `Excel.Application` or a `{CLSID}` string.
    ClassId(String),
    /// A host value to wrap.
    Host(HostValue),
}

impl fmt::Debug for ObjectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectSource::ClassId(id) => write!(f, "ClassId({id})"),
            ObjectSource::Host(value) => write!(f, "Host({value:?})"),
        }
    }
}

impl From<&str> for ObjectSource {
    fn from(class_id: &str) -> Self {
        ObjectSource::ClassId(class_id.to_string())
    }
}

impl From<HostObject> for ObjectSource {
    fn from(obj: HostObject) -> Self {
        ObjectSource::Host(HostValue::Object(obj))
    }
}

/// Server kinds a class may be activated in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerContext {
    #[default]
    Any,
    InProcess,
    LocalServer,
}

/// Options for class activation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    /// Attach to a running instance first, creating one only if none runs.
    pub activate: bool,
    pub context: ServerContext,
    /// Expose member listings from type information (`__type`).
    #[serde(rename = "type")]
    pub type_info: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            activate: false,
            context: ServerContext::Any,
            type_info: true,
        }
    }
}

/// Turns class ids into live objects.
pub trait ClassActivator {
    fn create(&self, class_id: &str, options: &CreateOptions) -> Result<DispatchRef>;
}

type Constructor = Box<dyn Fn() -> Result<DispatchRef>>;

/// In-process activator keyed by case-insensitive class id.
///
/// Every instance it creates is remembered as running, so `activate` attaches
/// to the most recent one.
#[derive(Default)]
pub struct ClassRegistry {
    classes: HashMap<String, Constructor>,
    running: RefCell<HashMap<String, DispatchRef>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `class_id`, replacing any previous one.
    pub fn register<F>(&mut self, class_id: &str, constructor: F)
    where
        F: Fn() -> Result<DispatchRef> + 'static,
    {
        self.classes
            .insert(class_id.to_ascii_lowercase(), Box::new(constructor));
    }

    /// Register a class whose instances are proxies over fresh host objects.
    pub fn register_host<F>(&mut self, class_id: &str, build: F)
    where
        F: Fn() -> HostObject + 'static,
    {
        let name = class_id.to_string();
        self.register(class_id, move || {
            Ok(DispatchRef::Host(DispatchProxy::owning(build(), name.clone())))
        });
    }

    pub fn is_registered(&self, class_id: &str) -> bool {
        self.classes.contains_key(&class_id.to_ascii_lowercase())
    }

    /// Number of instances currently remembered as running.
    pub fn running_count(&self) -> usize {
        self.running.borrow().len()
    }
}

impl ClassActivator for ClassRegistry {
    fn create(&self, class_id: &str, options: &CreateOptions) -> Result<DispatchRef> {
        let key = class_id.to_ascii_lowercase();
        let constructor = self
            .classes
            .get(&key)
            .ok_or_else(|| DispatchError::ClassNotRegistered(class_id.to_string()))?;

        if options.activate {
            let running = self.running.borrow().get(&key).cloned();
            if let Some(instance) = running.filter(is_usable) {
                // The attaching caller gets a reference of its own.
                if let Some(proxy) = instance.as_proxy() {
                    proxy.add_ref()?;
                }
                tracing::debug!("Attached to running instance of {class_id}");
                return Ok(instance);
            }
        }

        let instance = constructor()?;
        tracing::debug!("Created instance of {class_id}");
        self.running.borrow_mut().insert(key, instance.clone());
        Ok(instance)
    }
}

fn is_usable(instance: &DispatchRef) -> bool {
    instance.as_proxy().map_or(true, |proxy| proxy.is_live())
}

/// Create an Automation object.
///
/// Class ids go to `activator`. Host objects are wrapped in a proxy rooted at
/// `#` that owns them until its last reference is released; members reached
/// through it are not owned. Foreign dispatch values are returned as they are.
pub fn create_object(
    source: ObjectSource,
    options: &CreateOptions,
    activator: &dyn ClassActivator,
) -> Result<DispatchRef> {
    match source {
        ObjectSource::ClassId(class_id) => {
            tracing::debug!("create_object: class {class_id} ({options:?})");
            activator.create(&class_id, options)
        }
        ObjectSource::Host(HostValue::Object(obj)) => {
            tracing::debug!("create_object: host object {obj:?}");
            Ok(DispatchRef::Host(DispatchProxy::owning(obj, "#")))
        }
        ObjectSource::Host(HostValue::Dispatch(native)) => Ok(DispatchRef::Native(native)),
        ObjectSource::Host(other) => Err(DispatchError::InvalidArgument(format!(
            "cannot create an Automation object from {}",
            other.to_display_string()
        ))),
    }
}

/// The activator for the current platform: COM on Windows, an empty
/// [`ClassRegistry`] elsewhere.
pub fn platform_activator() -> Box<dyn ClassActivator> {
    #[cfg(windows)]
    {
        Box::new(crate::com::ComActivator)
    }
    #[cfg(not(windows))]
    {
        Box::new(ClassRegistry::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Dispatch;
    use crate::types::Variant;
    use pretty_assertions::assert_eq;

    fn registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.register_host("Fake.Application", || {
            HostObject::record().with("Name", "Fake")
        });
        registry
    }

    #[test]
    fn test_host_object_becomes_proxy() {
        let host = HostObject::record().with("text", "value");
        let obj = create_object(host.clone().into(), &CreateOptions::default(), &registry()).unwrap();
        let proxy = obj.as_proxy().unwrap();
        assert_eq!(proxy.identity(), "#");
        assert_eq!(
            obj.as_dispatch().get_property("text").unwrap(),
            Variant::from("value")
        );
    }

    #[test]
    fn test_temporary_host_object_stays_usable() {
        let obj = create_object(
            HostObject::record().with("text", "value").into(),
            &CreateOptions::default(),
            &registry(),
        )
        .unwrap();
        let proxy = obj.as_dispatch();
        assert_eq!(proxy.get_property("text").unwrap(), Variant::from("value"));
        let id = proxy.resolve("missing").unwrap();
        assert!(matches!(
            proxy.invoke(id, crate::types::Invocation::get()),
            Err(DispatchError::MemberNotFound(_))
        ));

        obj.as_proxy().unwrap().release().unwrap();
        assert!(!obj.as_proxy().unwrap().is_live());
    }

    #[test]
    fn test_primitive_source_is_rejected() {
        let err = create_object(
            ObjectSource::Host(HostValue::Number(1.0)),
            &CreateOptions::default(),
            &registry(),
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidArgument(_)));
    }

    #[test]
    fn test_class_ids_are_case_insensitive() {
        let registry = registry();
        let obj = create_object(
            "fake.APPLICATION".into(),
            &CreateOptions::default(),
            &registry,
        )
        .unwrap();
        assert_eq!(
            obj.as_dispatch().get_property("Name").unwrap(),
            Variant::from("Fake")
        );
        assert!(registry.is_registered("FAKE.application"));
    }

    #[test]
    fn test_unknown_class() {
        let err = create_object("No.Such".into(), &CreateOptions::default(), &registry())
            .unwrap_err();
        assert!(matches!(err, DispatchError::ClassNotRegistered(id) if id == "No.Such"));
    }

    #[test]
    fn test_activate_attaches_to_running_instance() {
        let registry = registry();
        let first = registry
            .create("Fake.Application", &CreateOptions::default())
            .unwrap();
        let activate = CreateOptions {
            activate: true,
            ..Default::default()
        };
        let attached = registry.create("Fake.Application", &activate).unwrap();
        assert_eq!(attached, first);
        assert_eq!(attached.as_proxy().unwrap().ref_count(), 2);

        // Each holder releases its own reference.
        first.as_proxy().unwrap().release().unwrap();
        assert_eq!(
            attached.as_dispatch().get_property("Name").unwrap(),
            Variant::from("Fake")
        );

        let fresh = registry
            .create("Fake.Application", &CreateOptions::default())
            .unwrap();
        assert_ne!(fresh, first);
        assert_eq!(registry.running_count(), 1);
    }

    #[test]
    fn test_activate_skips_released_instance() {
        let registry = registry();
        let first = registry
            .create("Fake.Application", &CreateOptions::default())
            .unwrap();
        first.as_proxy().unwrap().release().unwrap();
        let activate = CreateOptions {
            activate: true,
            ..Default::default()
        };
        let second = registry.create("Fake.Application", &activate).unwrap();
        assert_ne!(second, first);
        assert!(second.as_proxy().unwrap().is_live());
    }

    #[test]
    fn test_options_from_json() {
        let options: CreateOptions =
            serde_json::from_str(r#"{"activate": true, "context": "local_server"}"#).unwrap();
        assert_eq!(
            options,
            CreateOptions {
                activate: true,
                context: ServerContext::LocalServer,
                type_info: true,
            }
        );
        let options: CreateOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, CreateOptions::default());
        let options: CreateOptions = serde_json::from_str(r#"{"type": false}"#).unwrap();
        assert!(!options.type_info);
    }
}

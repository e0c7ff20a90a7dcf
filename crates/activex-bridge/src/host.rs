//! Host object graph: the dynamically-shaped values a proxy exposes.
//!
//! A [`HostObject`] is a shared handle. Cloning it aliases the same object, so a
//! mutation made through a dispatch proxy is visible to every other holder and
//! the other way round. The proxy layer only ever touches a host object through
//! five operations: [`get`](HostObject::get), [`set`](HostObject::set),
//! [`get_index`](HostObject::get_index), [`set_index`](HostObject::set_index)
//! and [`call`](HostObject::call).

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use thiserror::Error;

use crate::proxy::Dispatch;

/// Failures raised by the host object graph itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("Index {index} out of bounds (length: {len})")]
    OutOfBounds { index: i64, len: usize },

    #[error("Value is not indexable")]
    NotIndexable,

    #[error("{0} is not a function")]
    NotCallable(String),

    #[error("Invalid assignment: {0}")]
    InvalidAssignment(String),

    /// A failure raised by host code during a call.
    #[error("{0}")]
    Thrown(String),
}

/// Signature of a host callable: receiver, then arguments.
pub type NativeFn = dyn Fn(&HostValue, &[HostValue]) -> Result<HostValue, HostError>;

/// Largest length a sequence may be given, the same bound the host language
/// puts on arrays.
pub const MAX_SEQUENCE_LEN: u32 = u32::MAX;

/// A named host callable.
#[derive(Clone)]
pub struct HostFunction {
    name: String,
    arity: usize,
    func: Rc<NativeFn>,
}

impl HostFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of declared parameters.
    pub fn arity(&self) -> usize {
        self.arity
    }
}

enum Shape {
    Record(Vec<(String, HostValue)>),
    Sequence(Vec<HostValue>),
    Function(HostFunction),
}

/// Shared, interior-mutable handle to a record, sequence or callable.
#[derive(Clone)]
pub struct HostObject(Rc<RefCell<Shape>>);

impl HostObject {
    /// Create an empty record.
    pub fn record() -> Self {
        Self::from_shape(Shape::Record(Vec::new()))
    }

    /// Create a record from `(name, value)` pairs, keeping their order.
    pub fn from_members<I, K, V>(members: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<HostValue>,
    {
        let obj = Self::record();
        for (name, value) in members {
            obj.insert(name, value);
        }
        obj
    }

    /// Create a sequence.
    pub fn sequence<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<HostValue>,
    {
        Self::from_shape(Shape::Sequence(items.into_iter().map(Into::into).collect()))
    }

    /// Create a callable. `f` receives the receiver (`Undefined` when called
    /// bare) and the argument list.
    pub fn function<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&HostValue, &[HostValue]) -> Result<HostValue, HostError> + 'static,
    {
        Self::function_with_arity(name, 0, f)
    }

    /// Create a callable that reports `arity` as its `length`.
    pub fn function_with_arity<F>(name: impl Into<String>, arity: usize, f: F) -> Self
    where
        F: Fn(&HostValue, &[HostValue]) -> Result<HostValue, HostError> + 'static,
    {
        Self::from_shape(Shape::Function(HostFunction {
            name: name.into(),
            arity,
            func: Rc::new(f),
        }))
    }

    fn from_shape(shape: Shape) -> Self {
        Self(Rc::new(RefCell::new(shape)))
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(self, name: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add or replace a record member. Host-side assignment: unlike
    /// [`set`](Self::set) through a proxy this may create members.
    ///
    /// On a sequence a numeric name addresses an element, growing the sequence
    /// with undefined holes up to [`MAX_SEQUENCE_LEN`]. Other names, and
    /// anything on a function, are ignored.
    pub fn insert(&self, name: impl Into<String>, value: impl Into<HostValue>) {
        let name = name.into();
        let value = value.into();
        match &mut *self.0.borrow_mut() {
            Shape::Record(members) => match members.iter_mut().find(|(k, _)| *k == name) {
                Some((_, slot)) => *slot = value,
                None => members.push((name, value)),
            },
            Shape::Sequence(items) => {
                let Ok(index) = name.parse::<u32>() else {
                    return;
                };
                // The largest index is one below the largest length.
                let grown = index
                    .checked_add(1)
                    .ok_or_else(|| HostError::InvalidAssignment(format!("index {index} too large")))
                    .and_then(|len| grow(items, len));
                match grown {
                    Ok(()) => items[index as usize] = value,
                    Err(e) => tracing::warn!("insert '{name}' ignored: {e}"),
                }
            }
            Shape::Function(_) => {}
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(&*self.0.borrow(), Shape::Record(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(&*self.0.borrow(), Shape::Sequence(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(&*self.0.borrow(), Shape::Function(_))
    }

    /// Declared parameter count of a callable.
    pub fn arity(&self) -> Option<usize> {
        match &*self.0.borrow() {
            Shape::Function(f) => Some(f.arity),
            _ => None,
        }
    }

    /// Element count of a sequence.
    pub fn len(&self) -> Option<usize> {
        match &*self.0.borrow() {
            Shape::Sequence(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Member names of a record, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        match &*self.0.borrow() {
            Shape::Record(members) => members.iter().map(|(k, _)| k.clone()).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether both handles alias the same object.
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// A handle that does not keep the object alive.
    pub fn downgrade(&self) -> WeakHostObject {
        WeakHostObject(Rc::downgrade(&self.0))
    }

    /// Read a named member. `None` if the object has no such member.
    ///
    /// Sequences answer `length` and numeric names.
    pub fn get(&self, name: &str) -> Option<HostValue> {
        match &*self.0.borrow() {
            Shape::Record(members) => members
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone()),
            Shape::Sequence(items) => {
                if name == "length" {
                    Some(HostValue::Number(items.len() as f64))
                } else {
                    name.parse::<usize>().ok().and_then(|i| items.get(i).cloned())
                }
            }
            Shape::Function(f) => match name {
                "name" => Some(HostValue::String(f.name.clone())),
                "length" => Some(HostValue::Number(f.arity as f64)),
                _ => None,
            },
        }
    }

    /// Replace a named member's value.
    pub fn set(&self, name: &str, value: HostValue) -> Result<(), HostError> {
        if let Ok(index) = name.parse::<i64>() {
            if self.is_sequence() {
                return self.set_index(index, value);
            }
        }
        match &mut *self.0.borrow_mut() {
            Shape::Record(members) => {
                match members.iter_mut().find(|(k, _)| k == name) {
                    Some((_, slot)) => *slot = value,
                    None => members.push((name.to_string(), value)),
                }
                Ok(())
            }
            Shape::Sequence(items) if name == "length" => {
                // The value may alias this sequence, so it is not rendered.
                let len = value.as_f64().and_then(sequence_len).ok_or_else(|| {
                    HostError::InvalidAssignment(format!(
                        "sequence length must be an integer in 0..={MAX_SEQUENCE_LEN}"
                    ))
                })?;
                if len <= items.len() as u64 {
                    items.truncate(len as usize);
                    Ok(())
                } else {
                    let len = u32::try_from(len).map_err(|_| {
                        HostError::InvalidAssignment(format!("invalid sequence length {len}"))
                    })?;
                    grow(items, len)
                }
            }
            Shape::Sequence(_) => Err(HostError::InvalidAssignment(format!(
                "cannot add named member '{name}' to a sequence"
            ))),
            Shape::Function(f) => Err(HostError::InvalidAssignment(format!(
                "cannot assign '{name}' on function {}",
                f.name
            ))),
        }
    }

    /// Read the element at `index`.
    pub fn get_index(&self, index: i64) -> Result<HostValue, HostError> {
        match &*self.0.borrow() {
            Shape::Sequence(items) => usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .ok_or(HostError::OutOfBounds {
                    index,
                    len: items.len(),
                }),
            _ => Err(HostError::NotIndexable),
        }
    }

    /// Write the element at `index`. `index == len` appends.
    pub fn set_index(&self, index: i64, value: HostValue) -> Result<(), HostError> {
        match &mut *self.0.borrow_mut() {
            Shape::Sequence(items) => {
                let len = items.len();
                match usize::try_from(index) {
                    Ok(i) if i < len => {
                        items[i] = value;
                        Ok(())
                    }
                    Ok(i) if i == len => {
                        items.push(value);
                        Ok(())
                    }
                    _ => Err(HostError::OutOfBounds { index, len }),
                }
            }
            _ => Err(HostError::NotIndexable),
        }
    }

    /// Call the object with `this` as receiver.
    pub fn call(&self, this: &HostValue, args: &[HostValue]) -> Result<HostValue, HostError> {
        // The borrow must end before the call: the callee may touch `this`.
        let func = match &*self.0.borrow() {
            Shape::Function(f) => Rc::clone(&f.func),
            _ => return Err(HostError::NotCallable(self.describe())),
        };
        func(this, args)
    }

    fn describe(&self) -> String {
        match &*self.0.borrow() {
            Shape::Record(_) => "[object Object]".to_string(),
            Shape::Sequence(_) => "[object Array]".to_string(),
            Shape::Function(f) => format!("function {}", f.name),
        }
    }

    fn display_string(&self, visited: &mut Vec<*const RefCell<Shape>>) -> String {
        let ptr = Rc::as_ptr(&self.0);
        if visited.contains(&ptr) {
            return String::new();
        }
        match &*self.0.borrow() {
            Shape::Record(_) => "[object Object]".to_string(),
            Shape::Function(f) => format!("function {}() {{ [native code] }}", f.name),
            Shape::Sequence(items) => {
                visited.push(ptr);
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        HostValue::Undefined | HostValue::Null => String::new(),
                        HostValue::Object(obj) => obj.display_string(visited),
                        other => other.to_display_string(),
                    })
                    .collect();
                visited.pop();
                parts.join(",")
            }
        }
    }

    fn json(&self, visited: &mut Vec<*const RefCell<Shape>>) -> serde_json::Value {
        let ptr = Rc::as_ptr(&self.0);
        if visited.contains(&ptr) {
            return serde_json::Value::Null;
        }
        visited.push(ptr);
        let value = match &*self.0.borrow() {
            Shape::Record(members) => serde_json::Value::Object(
                members
                    .iter()
                    .map(|(k, v)| (k.clone(), v.json(visited)))
                    .collect(),
            ),
            Shape::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.json(visited)).collect())
            }
            Shape::Function(_) => serde_json::Value::Null,
        };
        visited.pop();
        value
    }
}

/// A valid sequence length, or `None` for negative, fractional, non-finite or
/// oversized numbers.
fn sequence_len(n: f64) -> Option<u64> {
    let valid = n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= MAX_SEQUENCE_LEN as f64;
    valid.then_some(n as u64)
}

/// Extend `items` with undefined holes to `len` elements. Allocation failure is
/// reported instead of aborting.
fn grow(items: &mut Vec<HostValue>, len: u32) -> Result<(), HostError> {
    let len = usize::try_from(len)
        .map_err(|_| HostError::InvalidAssignment(format!("sequence length {len} too large")))?;
    if let Some(extra) = len.checked_sub(items.len()) {
        items.try_reserve_exact(extra).map_err(|e| {
            HostError::InvalidAssignment(format!("cannot grow sequence to {len} elements: {e}"))
        })?;
        items.resize(len, HostValue::Undefined);
    }
    Ok(())
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.borrow() {
            Shape::Record(members) => {
                let keys: Vec<&str> = members.iter().map(|(k, _)| k.as_str()).collect();
                write!(f, "HostObject(Record {keys:?})")
            }
            Shape::Sequence(items) => write!(f, "HostObject(Sequence len={})", items.len()),
            Shape::Function(func) => write!(f, "HostObject(Function {})", func.name),
        }
    }
}

/// Non-owning handle to a [`HostObject`].
#[derive(Clone)]
pub struct WeakHostObject(Weak<RefCell<Shape>>);

impl WeakHostObject {
    /// The object, if something still owns it.
    pub fn upgrade(&self) -> Option<HostObject> {
        self.0.upgrade().map(HostObject)
    }
}

/// A value in the host object graph.
#[derive(Clone, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(HostObject),
    /// A foreign Automation object handed to the host.
    Dispatch(Rc<dyn Dispatch>),
}

impl HostValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, HostValue::Undefined)
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            HostValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The host's default string form of the value.
    pub fn to_display_string(&self) -> String {
        match self {
            HostValue::Undefined => "undefined".to_string(),
            HostValue::Null => "null".to_string(),
            HostValue::Bool(b) => b.to_string(),
            HostValue::Number(n) => format_number(*n),
            HostValue::String(s) => s.clone(),
            HostValue::Object(obj) => obj.display_string(&mut Vec::new()),
            HostValue::Dispatch(_) => "[object Dispatch]".to_string(),
        }
    }

    /// Build a fresh host graph from JSON.
    pub fn from_json(value: serde_json::Value) -> HostValue {
        match value {
            serde_json::Value::Null => HostValue::Null,
            serde_json::Value::Bool(b) => HostValue::Bool(b),
            serde_json::Value::Number(n) => HostValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => HostValue::String(s),
            serde_json::Value::Array(items) => {
                HostValue::Object(HostObject::sequence(items.into_iter().map(HostValue::from_json)))
            }
            serde_json::Value::Object(map) => HostValue::Object(HostObject::from_members(
                map.into_iter().map(|(k, v)| (k, HostValue::from_json(v))),
            )),
        }
    }

    /// Snapshot the graph as JSON. Callables, foreign objects and cycles
    /// render as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        self.json(&mut Vec::new())
    }

    fn json(&self, visited: &mut Vec<*const RefCell<Shape>>) -> serde_json::Value {
        match self {
            HostValue::Undefined | HostValue::Null | HostValue::Dispatch(_) => {
                serde_json::Value::Null
            }
            HostValue::Bool(b) => serde_json::Value::Bool(*b),
            HostValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            HostValue::String(s) => serde_json::Value::String(s.clone()),
            HostValue::Object(obj) => obj.json(visited),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Undefined, HostValue::Undefined) => true,
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Number(a), HostValue::Number(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => a.ptr_eq(b),
            (HostValue::Dispatch(a), HostValue::Dispatch(b)) => {
                Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => write!(f, "Undefined"),
            HostValue::Null => write!(f, "Null"),
            HostValue::Bool(b) => write!(f, "Bool({b})"),
            HostValue::Number(n) => write!(f, "Number({n})"),
            HostValue::String(s) => write!(f, "String({s:?})"),
            HostValue::Object(obj) => write!(f, "{obj:?}"),
            HostValue::Dispatch(_) => write!(f, "Dispatch(..)"),
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        HostValue::Number(n as f64)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl From<HostObject> for HostValue {
    fn from(obj: HostObject) -> Self {
        HostValue::Object(obj)
    }
}

use std::{
    cell::{Ref, RefCell, RefMut},
    collections::HashMap,
    fmt,
    rc::Rc,
};

use crate::{bytecode::call_site::CallSite, class::ClassId, error::Fault};

/// A value on the operand stack, in a local variable or in a field.
///
/// `boolean`, `byte`, `char` and `short` are represented as `Int`. Longs
/// and doubles are a single value, even though they take two slots in the
/// local variable layout.
#[derive(Clone)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Instance of an interpreted class
    Object(Rc<Instance>),
    /// Object implemented by the host
    Native(Rc<NativeObject>),
    Array(Rc<Array>),
}

impl Value {
    /// Zero value for a field of type `descriptor`.
    pub fn default_for(descriptor: &str) -> Value {
        match descriptor.as_bytes().first() {
            Some(b'B' | b'C' | b'I' | b'S' | b'Z') => Value::Int(0),
            Some(b'J') => Value::Long(0),
            Some(b'F') => Value::Float(0.0),
            Some(b'D') => Value::Double(0.0),
            _ => Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Longs and doubles count twice for `pop2`, `dup2` and friends.
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_owned(),
            Value::Int(_) => "int".to_owned(),
            Value::Long(_) => "long".to_owned(),
            Value::Float(_) => "float".to_owned(),
            Value::Double(_) => "double".to_owned(),
            Value::Object(o) => o.class_name.to_string(),
            Value::Native(n) => n.class_name.to_string(),
            Value::Array(a) => format!("[{}", a.component),
        }
    }

    pub fn as_int(&self) -> Result<i32, Fault> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(other.mismatch("int")),
        }
    }

    pub fn as_long(&self) -> Result<i64, Fault> {
        match self {
            Value::Long(l) => Ok(*l),
            other => Err(other.mismatch("long")),
        }
    }

    pub fn as_float(&self) -> Result<f32, Fault> {
        match self {
            Value::Float(f) => Ok(*f),
            other => Err(other.mismatch("float")),
        }
    }

    pub fn as_double(&self) -> Result<f64, Fault> {
        match self {
            Value::Double(d) => Ok(*d),
            other => Err(other.mismatch("double")),
        }
    }

    pub fn as_array(&self) -> Result<&Rc<Array>, Fault> {
        match self {
            Value::Array(a) => Ok(a),
            Value::Null => Err(Fault::NullPointer("array is null".to_owned())),
            other => Err(other.mismatch("array")),
        }
    }

    /// Contents of a host string.
    pub fn as_str(&self) -> Option<Rc<str>> {
        match self {
            Value::Native(n) => match &*n.payload() {
                NativePayload::String(s) => Some(s.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Reference equality, as `if_acmpeq` sees it. Boxed primitives compare
    /// by value since boxing is transparent.
    pub fn same_reference(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }

    /// Identity hash, stable for the lifetime of the object.
    pub fn identity_hash(&self) -> i32 {
        let address = match self {
            Value::Object(o) => Rc::as_ptr(o) as *const u8 as usize,
            Value::Native(n) => Rc::as_ptr(n) as *const u8 as usize,
            Value::Array(a) => Rc::as_ptr(a) as *const u8 as usize,
            Value::Int(i) => return *i,
            Value::Long(l) => return (*l ^ (*l >> 32)) as i32,
            _ => 0,
        };
        (address >> 3) as i32
    }

    fn mismatch(&self, expected: &'static str) -> Fault {
        Fault::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Long(l) => write!(f, "Long({})", l),
            Value::Float(x) => write!(f, "Float({:?})", x),
            Value::Double(x) => write!(f, "Double({:?})", x),
            Value::Native(n) => match &*n.payload() {
                NativePayload::String(s) => write!(f, "String({:?})", s),
                _ => write!(f, "Native({})", self),
            },
            Value::Object(_) => write!(f, "Object({})", self),
            Value::Array(a) => write!(f, "Array({}, {} elements)", self, a.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}", l),
            Value::Float(x) => write!(f, "{}", x),
            Value::Double(x) => write!(f, "{}", x),
            Value::Native(n) => match &*n.payload() {
                NativePayload::String(s) => write!(f, "{}", s),
                _ => write!(f, "{}@{:x}", n.class_name, self.identity_hash()),
            },
            Value::Object(o) => write!(f, "{}@{:x}", o.class_name, self.identity_hash()),
            Value::Array(a) => write!(f, "[{}@{:x}", a.component, self.identity_hash()),
        }
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Int(b as i32)
    }
}

/// Instance of an interpreted class.
pub struct Instance {
    pub class: ClassId,
    pub class_name: Rc<str>,
    fields: RefCell<HashMap<Rc<str>, Value>>,
}

impl Instance {
    pub fn new(class: ClassId, class_name: Rc<str>, fields: HashMap<Rc<str>, Value>) -> Self {
        Self {
            class,
            class_name,
            fields: RefCell::new(fields),
        }
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    /// Returns `false` when the instance has no field `name`.
    pub fn set_field(&self, name: &str, value: Value) -> bool {
        match self.fields.borrow_mut().get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn field_names(&self) -> Vec<Rc<str>> {
        let mut names = self.fields.borrow().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

/// Host state attached to a [`NativeObject`].
#[derive(Debug, Clone)]
pub enum NativePayload {
    None,
    String(Rc<str>),
    Builder(String),
    /// `java/lang/Class` instance, holding the described class name
    ClassLiteral(Rc<str>),
    CallSite(Rc<CallSite>),
    PrintStream(Stream),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Out,
    Err,
}

/// Object whose behavior is implemented by host functions.
///
/// Besides its payload it carries a free-form attribute map, which
/// `getfield`/`putfield` fall back to.
pub struct NativeObject {
    pub class: ClassId,
    pub class_name: Rc<str>,
    fields: RefCell<HashMap<Rc<str>, Value>>,
    payload: RefCell<NativePayload>,
}

impl NativeObject {
    pub fn new(class: ClassId, class_name: Rc<str>, payload: NativePayload) -> Self {
        Self {
            class,
            class_name,
            fields: RefCell::new(HashMap::new()),
            payload: RefCell::new(payload),
        }
    }

    pub fn payload(&self) -> Ref<NativePayload> {
        self.payload.borrow()
    }

    pub fn payload_mut(&self) -> RefMut<NativePayload> {
        self.payload.borrow_mut()
    }

    pub fn set_payload(&self, payload: NativePayload) {
        *self.payload.borrow_mut() = payload;
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(Rc::from(name), value);
    }
}

pub struct Array {
    /// Descriptor of the element type, eg. `I` or `Ljava/lang/String;`
    pub component: Rc<str>,
    values: RefCell<Vec<Value>>,
}

impl Array {
    pub fn new(component: Rc<str>, values: Vec<Value>) -> Self {
        Self {
            component,
            values: RefCell::new(values),
        }
    }

    /// Array of `length` default values.
    pub fn filled(component: Rc<str>, length: usize) -> Self {
        let value = Value::default_for(&component);
        Self::new(component, vec![value; length])
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: i32) -> Result<Value, Fault> {
        let values = self.values.borrow();
        usize::try_from(index)
            .ok()
            .and_then(|i| values.get(i))
            .cloned()
            .ok_or(Fault::ArrayIndexOutOfBounds {
                index,
                length: values.len(),
            })
    }

    pub fn set(&self, index: i32, value: Value) -> Result<(), Fault> {
        let mut values = self.values.borrow_mut();
        let length = values.len();
        match usize::try_from(index).ok().and_then(|i| values.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Fault::ArrayIndexOutOfBounds { index, length }),
        }
    }

    pub fn values(&self) -> Ref<Vec<Value>> {
        self.values.borrow()
    }
}

#[cfg(test)]
mod array_tests {
    use super::*;

    #[test]
    fn it_should_fill_with_defaults() {
        let array = Array::filled("J".into(), 3);
        assert_eq!(array.len(), 3);
        assert!(matches!(array.get(2), Ok(Value::Long(0))));
    }

    #[test]
    fn it_should_check_bounds() {
        let array = Array::filled("I".into(), 2);
        assert_eq!(
            array.get(-1).unwrap_err(),
            Fault::ArrayIndexOutOfBounds {
                index: -1,
                length: 2
            }
        );
        assert!(array.set(2, Value::Int(1)).is_err());
        array.set(1, Value::Int(7)).unwrap();
        assert!(matches!(array.get(1), Ok(Value::Int(7))));
    }
}

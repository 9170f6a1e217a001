mod io;
mod lang;

use std::{collections::HashMap, fmt, rc::Rc};

use just_class_file::AccessFlags;

use crate::{error::Fault, value::Value, vm::Vm, Result};

/// Host implementation of a method. Receives the receiver first for
/// instance methods, followed by the arguments in declaration order.
pub type NativeFn = Rc<dyn Fn(&Vm, &[Value]) -> Result<Option<Value>>>;

pub(crate) type NativeInit = Rc<dyn Fn(&Vm) -> Result<Value>>;

pub(crate) struct NativeMethod {
    pub name: Rc<str>,
    pub descriptor: Rc<str>,
    pub flags: AccessFlags,
    pub function: NativeFn,
}

pub(crate) struct NativeStatic {
    pub name: Rc<str>,
    pub descriptor: Rc<str>,
    pub init: NativeInit,
}

/// A class implemented by the host.
pub struct NativeClass {
    pub name: Rc<str>,
    pub parent: Option<Rc<str>>,
    pub flags: AccessFlags,
    pub(crate) interfaces: Vec<Rc<str>>,
    pub(crate) fields: Vec<(Rc<str>, Rc<str>)>,
    pub(crate) methods: Vec<NativeMethod>,
    pub(crate) statics: Vec<NativeStatic>,
}

impl NativeClass {
    /// A public class extending `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            parent: (name != "java/lang/Object").then(|| Rc::from("java/lang/Object")),
            flags: AccessFlags::PUBLIC | AccessFlags::SUPER,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            statics: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: &str) -> Self {
        self.parent = Some(Rc::from(parent));
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(Rc::from(interface));
        self
    }

    pub fn interface(mut self) -> Self {
        self.flags = AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT;
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.flags |= AccessFlags::ABSTRACT;
        self
    }

    /// Instance field carried by every object of the class and its
    /// subclasses.
    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push((Rc::from(name), Rc::from(descriptor)));
        self
    }

    pub fn method<F>(self, name: &str, descriptor: &str, function: F) -> Self
    where
        F: Fn(&Vm, &[Value]) -> Result<Option<Value>> + 'static,
    {
        self.add_method(name, descriptor, AccessFlags::PUBLIC, Rc::new(function))
    }

    pub fn static_method<F>(self, name: &str, descriptor: &str, function: F) -> Self
    where
        F: Fn(&Vm, &[Value]) -> Result<Option<Value>> + 'static,
    {
        self.add_method(
            name,
            descriptor,
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            Rc::new(function),
        )
    }

    /// Static field whose value is computed when the class is baked.
    pub fn static_field<F>(mut self, name: &str, descriptor: &str, init: F) -> Self
    where
        F: Fn(&Vm) -> Result<Value> + 'static,
    {
        self.statics.push(NativeStatic {
            name: Rc::from(name),
            descriptor: Rc::from(descriptor),
            init: Rc::new(init),
        });
        self
    }

    fn add_method(
        mut self,
        name: &str,
        descriptor: &str,
        flags: AccessFlags,
        function: NativeFn,
    ) -> Self {
        self.methods.push(NativeMethod {
            name: Rc::from(name),
            descriptor: Rc::from(descriptor),
            flags: flags | AccessFlags::NATIVE,
            function,
        });
        self
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<NativeFn> {
        self.methods
            .iter()
            .find(|m| &*m.name == name && &*m.descriptor == descriptor)
            .map(|m| m.function.clone())
    }
}

impl fmt::Debug for NativeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClass")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// Host classes, keyed by internal class name.
#[derive(Default, Debug)]
pub struct NativeRegistry {
    classes: HashMap<Rc<str>, Rc<NativeClass>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the small set of `java/lang` and `java/io` classes
    /// every program needs.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        lang::register(&mut registry);
        io::register(&mut registry);
        registry
    }

    /// Add a class, replacing any previous class with the same name.
    pub fn register(&mut self, class: NativeClass) {
        self.classes.insert(class.name.clone(), Rc::new(class));
    }

    pub fn get(&self, name: &str) -> Option<Rc<NativeClass>> {
        self.classes.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn find_method(&self, class: &str, name: &str, descriptor: &str) -> Option<NativeFn> {
        self.classes.get(class)?.find_method(name, descriptor)
    }
}

pub(crate) fn arg(args: &[Value], index: usize) -> Result<&Value> {
    args.get(index).ok_or_else(|| Fault::StackUnderflow.into())
}

pub(crate) fn int_arg(args: &[Value], index: usize) -> Result<i32> {
    Ok(arg(args, index)?.as_int()?)
}

pub(crate) fn long_arg(args: &[Value], index: usize) -> Result<i64> {
    Ok(arg(args, index)?.as_long()?)
}

pub(crate) fn str_arg(args: &[Value], index: usize) -> Result<Rc<str>> {
    let value = arg(args, index)?;
    match value.as_str() {
        Some(s) => Ok(s),
        None if value.is_null() => Err(Fault::NullPointer("string is null".to_owned()).into()),
        None => Err(Fault::TypeMismatch {
            expected: "java/lang/String",
            found: value.type_name(),
        }
        .into()),
    }
}

/// Format a float the way `Float.toString`/`Double.toString` do for the
/// common cases.
pub(crate) fn java_float(x: f64) -> String {
    if x.is_nan() {
        "NaN".to_owned()
    } else if x.is_infinite() && x > 0.0 {
        "Infinity".to_owned()
    } else if x.is_infinite() {
        "-Infinity".to_owned()
    } else if x.fract() == 0.0 && x.abs() < 1e7 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

/// Render a value of static type `descriptor` (`None` when unknown) the way
/// `String.valueOf` does.
pub(crate) fn to_java_string(vm: &Vm, value: &Value, descriptor: Option<&str>) -> Result<String> {
    Ok(match (value, descriptor) {
        (Value::Int(i), Some("Z")) => (*i != 0).to_string(),
        (Value::Int(i), Some("C")) => char::from_u32(*i as u32 & 0xffff)
            .unwrap_or(char::REPLACEMENT_CHARACTER)
            .to_string(),
        (Value::Int(i), _) => i.to_string(),
        (Value::Long(l), _) => l.to_string(),
        (Value::Float(f), _) => java_float(*f as f64),
        (Value::Double(d), _) => java_float(*d),
        (Value::Null, _) => "null".to_owned(),
        (value, _) => match value.as_str() {
            Some(s) => s.to_string(),
            None => {
                let s = vm.invoke_virtual(value.clone(), "toString", "()Ljava/lang/String;", &[])?;
                match s.as_ref().and_then(Value::as_str) {
                    Some(s) => s.to_string(),
                    None => "null".to_owned(),
                }
            }
        },
    })
}

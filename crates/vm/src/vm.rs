use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    io::{self, Write},
    rc::Rc,
};

use just_class_file::{
    attributes::{Annotation, ElementValuePair},
    constant_pool::Constant,
};
use log::{debug, trace, warn};

use crate::{
    class::{lazy::LazyClass, member::Method, Class, ClassId},
    class_source::{normalize_class_name, ClassSource},
    error::{Fault, LinkError},
    natives::{NativeClass, NativeFn, NativeRegistry},
    runtime::Runtime,
    value::{Array, NativePayload, Stream, Value},
    Context, Result,
};

/// Scope in which class names are resolved. Every loader has its own
/// registry and source; host classes live in a registry shared by all of
/// them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LoaderId(pub(crate) u32);

impl LoaderId {
    /// Loader created with the VM
    pub const DEFAULT: LoaderId = LoaderId(0);
    /// Loader owning the host classes; it has no source of its own
    pub const SHARED: LoaderId = LoaderId(u32::MAX);
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == LoaderId::SHARED {
            write!(f, "shared")
        } else {
            write!(f, "loader#{}", self.0)
        }
    }
}

#[derive(Clone, Debug)]
pub struct VmOptions {
    /// Run `<clinit>` methods when a class is first used
    pub run_static_init: bool,
    /// Deepest allowed nesting of interpreted calls
    pub max_call_depth: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            run_static_init: true,
            max_call_depth: 64,
        }
    }
}

/// Element an annotation was found on.
#[derive(Clone, Copy)]
pub enum AnnotationTarget<'a> {
    Class(&'a Class),
    Method(&'a Rc<Method>),
}

impl fmt::Display for AnnotationTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationTarget::Class(class) => write!(f, "class {}", class.name),
            AnnotationTarget::Method(method) => write!(f, "method {}", method),
        }
    }
}

/// Hook run when a class carrying a given annotation is baked.
pub trait AnnotationHandler {
    fn on_annotate(
        &self,
        vm: &Vm,
        target: AnnotationTarget<'_>,
        elements: &[ElementValuePair],
    ) -> Result<()>;
}

struct Loader {
    source: Box<dyn ClassSource>,
    registry: HashMap<Rc<str>, ClassId>,
}

/// The virtual machine: class arena, loaders, host classes and the
/// interpreter.
pub struct Vm {
    options: VmOptions,
    classes: RefCell<Vec<Rc<Class>>>,
    loaders: RefCell<Vec<Loader>>,
    shared: RefCell<HashMap<Rc<str>, ClassId>>,
    natives: RefCell<NativeRegistry>,
    pending: RefCell<Vec<(LoaderId, Rc<str>)>>,
    strings: RefCell<HashMap<Rc<str>, Value>>,
    class_literals: RefCell<HashMap<Rc<str>, Value>>,
    out: RefCell<Box<dyn Write>>,
    err: RefCell<Box<dyn Write>>,
    annotation_handlers: RefCell<HashMap<Rc<str>, Rc<dyn AnnotationHandler>>>,
    runtime: Runtime,
}

impl Vm {
    pub fn new(source: impl ClassSource + 'static) -> Self {
        Self::with_options(source, VmOptions::default())
    }

    pub fn with_options(source: impl ClassSource + 'static, options: VmOptions) -> Self {
        Self {
            options,
            classes: RefCell::new(Vec::new()),
            loaders: RefCell::new(vec![Loader {
                source: Box::new(source),
                registry: HashMap::new(),
            }]),
            shared: RefCell::new(HashMap::new()),
            natives: RefCell::new(NativeRegistry::with_builtins()),
            pending: RefCell::new(Vec::new()),
            strings: RefCell::new(HashMap::new()),
            class_literals: RefCell::new(HashMap::new()),
            out: RefCell::new(Box::new(io::stdout())),
            err: RefCell::new(Box::new(io::stderr())),
            annotation_handlers: RefCell::new(HashMap::new()),
            runtime: Runtime::new(),
        }
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Redirect what `System.out` prints.
    pub fn set_output(&self, out: impl Write + 'static) {
        *self.out.borrow_mut() = Box::new(out);
    }

    /// Redirect what `System.err` prints.
    pub fn set_error_output(&self, err: impl Write + 'static) {
        *self.err.borrow_mut() = Box::new(err);
    }

    pub(crate) fn write_output(&self, stream: Stream, text: &str) -> Result<()> {
        let sink = match stream {
            Stream::Out => &self.out,
            Stream::Err => &self.err,
        };
        let mut sink = sink.borrow_mut();
        sink.write_all(text.as_bytes())?;
        sink.flush()?;
        Ok(())
    }

    /// Add a host class. Classes already loaded under that name are not
    /// affected.
    pub fn register_native(&self, class: NativeClass) {
        self.natives.borrow_mut().register(class);
    }

    /// Host implementation of a method declared `native` in a class file.
    pub fn native_method(&self, class: &str, name: &str, descriptor: &str) -> Option<NativeFn> {
        self.natives.borrow().find_method(class, name, descriptor)
    }

    pub fn register_annotation_handler<H>(&self, annotation_class: &str, handler: H)
    where
        H: AnnotationHandler + 'static,
    {
        self.annotation_handlers
            .borrow_mut()
            .insert(Rc::from(normalize_class_name(annotation_class)), Rc::new(handler));
    }

    /// New loader scope reading classes from `source`.
    pub fn add_loader(&self, source: impl ClassSource + 'static) -> LoaderId {
        let mut loaders = self.loaders.borrow_mut();
        loaders.push(Loader {
            source: Box::new(source),
            registry: HashMap::new(),
        });
        LoaderId(loaders.len() as u32 - 1)
    }

    pub fn class(&self, id: ClassId) -> Rc<Class> {
        self.classes.borrow()[id.0].clone()
    }

    pub fn class_count(&self) -> usize {
        self.classes.borrow().len()
    }

    /// Load `name` with the default loader.
    pub fn load_class(&self, name: &str) -> Result<Rc<Class>> {
        self.load_class_in(LoaderId::DEFAULT, name)
    }

    /// Load `name` in the scope of `loader`, reading, validating and baking
    /// it on first request.
    pub fn load_class_in(&self, loader: LoaderId, name: &str) -> Result<Rc<Class>> {
        let name: Rc<str> = Rc::from(normalize_class_name(name));
        if let Some(id) = self.lookup(loader, &name)? {
            return Ok(self.class(id));
        }

        let native = self.natives.borrow().get(&name);
        if let Some(native) = native {
            return self.define_native(native);
        }

        let bytes = self
            .read_class_bytes(loader, &name)?
            .ok_or_else(|| LinkError::ClassNotFound(name.to_string()))?;
        debug!("loading {} ({} bytes) in {}", name, bytes.len(), loader);

        let class = {
            let mut classes = self.classes.borrow_mut();
            let class = Class::from_bytes(&bytes, ClassId(classes.len()), loader)?;
            if class.name != name {
                return Err(LinkError::ClassNotFound(format!(
                    "{} (file defines {})",
                    name, class.name
                ))
                .into());
            }
            class.validate_class_file()?;
            let class = Rc::new(class);
            classes.push(class.clone());
            class
        };
        if let Some(loader) = self.loaders.borrow_mut().get_mut(loader.0 as usize) {
            loader.registry.insert(name, class.id);
        }

        self.finish_load(&class)?;
        Ok(class)
    }

    fn define_native(&self, native: Rc<NativeClass>) -> Result<Rc<Class>> {
        debug!("defining host class {}", native.name);
        let class = {
            let mut classes = self.classes.borrow_mut();
            let class = Rc::new(Class::from_native(
                native,
                ClassId(classes.len()),
                LoaderId::SHARED,
            )?);
            classes.push(class.clone());
            class
        };
        self.shared
            .borrow_mut()
            .insert(class.name.clone(), class.id);

        self.finish_load(&class)?;
        Ok(class)
    }

    fn finish_load(&self, class: &Class) -> Result<()> {
        {
            let mut pending = self.pending.borrow_mut();
            // Shared classes satisfy the queue of every loader
            let shared = class.loader == LoaderId::SHARED;
            pending.retain(|(loader, name)| {
                *name != class.name || !(shared || *loader == class.loader)
            });
            for ancestor in class.parent.iter().chain(&class.interfaces) {
                if !ancestor.is_resolved() {
                    pending.push((class.loader, ancestor.name().clone()));
                }
            }
        }
        class.bake(self)
    }

    fn lookup(&self, loader: LoaderId, name: &str) -> Result<Option<ClassId>> {
        if let Some(&id) = self.shared.borrow().get(name) {
            return Ok(Some(id));
        }
        if loader == LoaderId::SHARED {
            return Ok(None);
        }
        match self.loaders.borrow().get(loader.0 as usize) {
            Some(l) => Ok(l.registry.get(name).copied()),
            None => Err(LinkError::UnknownLoader(loader.0).into()),
        }
    }

    fn read_class_bytes(&self, loader: LoaderId, name: &str) -> Result<Option<Vec<u8>>> {
        if loader == LoaderId::SHARED {
            return Ok(None);
        }
        match self.loaders.borrow().get(loader.0 as usize) {
            Some(l) => Ok(l.source.read_class(name)),
            None => Err(LinkError::UnknownLoader(loader.0).into()),
        }
    }

    pub fn is_loaded(&self, loader: LoaderId, name: &str) -> bool {
        matches!(self.lookup(loader, &normalize_class_name(name)), Ok(Some(_)))
    }

    /// Reference to `name` that is resolved now if the class is already
    /// loaded, and otherwise queued for [`Vm::load_all_pending`].
    pub fn load_lazy(&self, loader: LoaderId, name: &str) -> Result<LazyClass> {
        let name: Rc<str> = Rc::from(normalize_class_name(name));
        if let Some(id) = self.lookup(loader, &name)? {
            return Ok(LazyClass::resolved(&self.class(id)));
        }
        let mut pending = self.pending.borrow_mut();
        if !pending.iter().any(|(l, n)| *l == loader && *n == name) {
            pending.push((loader, name.clone()));
        }
        Ok(LazyClass::pending(loader, name))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Load every queued class, including the ancestors those classes
    /// queue in turn. Returns how many classes were loaded.
    pub fn load_all_pending(&self) -> Result<usize> {
        let mut loaded = 0;
        loop {
            let next = self.pending.borrow_mut().pop();
            let (loader, name) = match next {
                Some(next) => next,
                None => return Ok(loaded),
            };
            if self.lookup(loader, &name)?.is_none() {
                self.load_class_in(loader, &name)
                    .with_context(|| format!("loading pending class {}", name))?;
                loaded += 1;
            }
        }
    }

    pub(crate) fn annotate(&self, target: AnnotationTarget<'_>, annotation: &Annotation) {
        let loader = match target {
            AnnotationTarget::Class(class) => class.loader,
            AnnotationTarget::Method(method) => self.class(method.class).loader,
        };
        let class = LazyClass::pending(loader, Rc::from(annotation.class_name()));
        match class.try_get(self) {
            Ok(Some(_)) => {}
            Ok(None) => trace!("annotation class {} is not available", annotation.class_name()),
            Err(e) => warn!(
                "cannot resolve annotation {} on {}: {}",
                annotation.class_name(),
                target,
                e
            ),
        }

        let handler = self
            .annotation_handlers
            .borrow()
            .get(annotation.class_name())
            .cloned();
        match handler {
            Some(handler) => {
                debug!("annotation {} on {}", annotation.class_name(), target);
                if let Err(e) = handler.on_annotate(self, target, &annotation.elements) {
                    warn!(
                        "annotation {} on {} failed, skipping: {}",
                        annotation.class_name(),
                        target,
                        e
                    );
                }
            }
            None => trace!("no handler for annotation {}", annotation.class_name()),
        }
    }

    /// Value of a loadable constant.
    pub fn constant_value(&self, constant: &Constant) -> Result<Value> {
        Ok(match constant {
            Constant::Integer(i) => Value::Int(*i),
            Constant::Float(f) => Value::Float(*f),
            Constant::Long(l) => Value::Long(*l),
            Constant::Double(d) => Value::Double(*d),
            Constant::String(s) => self.intern(s)?,
            Constant::Class(name) => self.class_literal(name)?,
            other => {
                return Err(Fault::Unsupported(format!("loading {} constants", other.kind())).into())
            }
        })
    }

    /// New host object of the host class `class_name`.
    pub fn new_native(&self, class_name: &str, payload: NativePayload) -> Result<Value> {
        let class = self.load_class_in(LoaderId::SHARED, class_name)?;
        match class.create_instance(self)? {
            Value::Native(object) => {
                object.set_payload(payload);
                Ok(Value::Native(object))
            }
            other => Err(Fault::TypeMismatch {
                expected: "host class",
                found: other.type_name(),
            }
            .into()),
        }
    }

    pub fn new_string(&self, s: &str) -> Result<Value> {
        self.new_native("java/lang/String", NativePayload::String(Rc::from(s)))
    }

    /// The canonical string with contents `s`.
    pub fn intern(&self, s: &str) -> Result<Value> {
        if let Some(value) = self.strings.borrow().get(s) {
            return Ok(value.clone());
        }
        let value = self.new_string(s)?;
        self.strings
            .borrow_mut()
            .insert(Rc::from(s), value.clone());
        Ok(value)
    }

    /// The `java/lang/Class` object standing for `name`.
    pub fn class_literal(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.class_literals.borrow().get(name) {
            return Ok(value.clone());
        }
        let value = self.new_native(
            "java/lang/Class",
            NativePayload::ClassLiteral(Rc::from(name)),
        )?;
        self.class_literals
            .borrow_mut()
            .insert(Rc::from(name), value.clone());
        Ok(value)
    }

    /// Runtime class of a reference. Arrays report `java/lang/Object`, boxed
    /// ints and longs their wrapper class.
    pub fn class_of(&self, value: &Value) -> Result<Rc<Class>> {
        match value {
            Value::Object(instance) => Ok(self.class(instance.class)),
            Value::Native(object) => Ok(self.class(object.class)),
            Value::Array(_) => self.load_class_in(LoaderId::SHARED, "java/lang/Object"),
            Value::Int(_) => self.load_class_in(LoaderId::SHARED, "java/lang/Integer"),
            Value::Long(_) => self.load_class_in(LoaderId::SHARED, "java/lang/Long"),
            Value::Null => Err(Fault::NullPointer("class of null".to_owned()).into()),
            other => Err(Fault::TypeMismatch {
                expected: "reference",
                found: other.type_name(),
            }
            .into()),
        }
    }

    /// `instanceof` test. `type_name` is an internal class name or an array
    /// descriptor.
    pub fn is_instance_of(&self, value: &Value, type_name: &str) -> Result<bool> {
        match value {
            Value::Null => Ok(false),
            Value::Array(array) => Ok(type_name == "java/lang/Object"
                || type_name
                    .strip_prefix('[')
                    .map_or(false, |component| array_component_matches(array, component))),
            value => self.class_of(value)?.is_subclass_of(self, type_name),
        }
    }

    /// Call `name` on the runtime class of `receiver`.
    pub fn invoke_virtual(
        &self,
        receiver: Value,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        let method = self.class_of(&receiver)?.get_method(self, name, descriptor)?;
        let mut values = Vec::with_capacity(args.len() + 1);
        values.push(receiver);
        values.extend_from_slice(args);
        self.runtime.run_method(self, &method, values)
    }

    pub fn invoke_static(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        let class = self.load_class(class_name)?;
        class.prepare_use(self)?;
        let method = class.get_method(self, name, descriptor)?;
        self.runtime.run_method(self, &method, args)
    }

    /// Run `public static void main(String[])` of `class_name`.
    pub fn run_main(&self, class_name: &str, args: &[String]) -> Result<()> {
        let args = args
            .iter()
            .map(|arg| self.new_string(arg))
            .collect::<Result<Vec<_>>>()?;
        let args = Value::Array(Rc::new(Array::new(
            Rc::from("Ljava/lang/String;"),
            args,
        )));
        self.invoke_static(class_name, "main", "([Ljava/lang/String;)V", vec![args])
            .with_context(|| format!("running {}.main", class_name))?;
        Ok(())
    }
}

fn array_component_matches(array: &Array, component: &str) -> bool {
    &*array.component == component
        || (component == "Ljava/lang/Object;" && array.component.starts_with(['L', '[']))
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("options", &self.options)
            .field("classes", &self.classes.borrow().len())
            .field("loaders", &self.loaders.borrow().len())
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

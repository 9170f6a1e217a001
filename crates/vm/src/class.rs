pub mod lazy;
pub mod member;

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::Rc,
};

use just_class_file::{
    attributes::{Annotation, AttributeInfo, BootstrapMethod},
    descriptor::FieldType,
    AccessFlags, ClassFile, ConstantPool,
};
use log::debug;

use self::{
    lazy::LazyClass,
    member::{Field, Method, MethodBody},
};
use crate::{
    error::{Fault, LinkError, ValidationError},
    natives::NativeClass,
    value::{Instance, NativeObject, NativePayload, Value},
    vm::{AnnotationTarget, LoaderId, Vm},
    Context, Result,
};

/// Index of a class in the VM's class arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) usize);

impl ClassId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Static initialization progress of a class.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitState {
    /// Loaded but not baked yet
    Unbaked,
    /// Baked, `<clinit>` not run yet
    Pending,
    /// `<clinit>` is on the call stack
    Running,
    Done,
}

/// A loaded class, either parsed from a class file or provided by the host.
pub struct Class {
    pub id: ClassId,
    pub name: Rc<str>,
    pub loader: LoaderId,
    pub flags: AccessFlags,
    pub parent: Option<LazyClass>,
    pub interfaces: Vec<LazyClass>,
    /// `(major, minor)`; `(0, 0)` for host classes
    pub version: (u16, u16),
    constant_pool: Rc<ConstantPool>,
    fields: Vec<Field>,
    methods: Vec<Rc<Method>>,
    method_index: HashMap<Rc<str>, HashMap<Rc<str>, usize>>,
    static_values: RefCell<HashMap<Rc<str>, Value>>,
    /// Name and descriptor of every instance field declared here
    dynamic_fields: Vec<(Rc<str>, Rc<str>)>,
    attributes: Vec<AttributeInfo>,
    native: Option<Rc<NativeClass>>,
    baked: Cell<bool>,
    init: Cell<InitState>,
}

impl Class {
    pub fn from_bytes(bytes: &[u8], id: ClassId, loader: LoaderId) -> Result<Class> {
        let class_file = ClassFile::parse(bytes)?;
        let name = class_file.class_name()?;
        Self::from_class_file(class_file, name.clone(), id, loader)
            .with_context(|| format!("loading class {}", name))
    }

    fn from_class_file(
        class_file: ClassFile,
        name: Rc<str>,
        id: ClassId,
        loader: LoaderId,
    ) -> Result<Class> {
        let parent = class_file
            .super_class()?
            .map(|parent| LazyClass::pending(loader, parent));
        let interfaces = class_file
            .interface_names()?
            .into_iter()
            .map(|interface| LazyClass::pending(loader, interface))
            .collect();

        let mut fields = Vec::with_capacity(class_file.fields.len());
        let mut static_values = HashMap::new();
        let mut dynamic_fields = Vec::new();
        for info in &class_file.fields {
            let field_name = class_file.field_name(info)?;
            let descriptor = class_file.field_descriptor(info)?;
            FieldType::parse(&descriptor)
                .with_context(|| format!("in field {}.{}", name, field_name))?;
            if info.access_flags.is_static() {
                static_values.insert(field_name.clone(), Value::default_for(&descriptor));
            } else {
                dynamic_fields.push((field_name.clone(), descriptor.clone()));
            }
            fields.push(Field {
                class: id,
                name: field_name,
                descriptor,
                flags: info.access_flags,
                attributes: info.attributes.parse(&class_file.constant_pool)?,
            });
        }

        let mut methods = Vec::with_capacity(class_file.methods.len());
        for info in &class_file.methods {
            let method_name = class_file.method_name(info)?;
            let descriptor = class_file.method_descriptor(info)?;
            let attributes = info.attributes.parse(&class_file.constant_pool)?;
            let body = if info.access_flags.is_native() {
                MethodBody::ExternNative
            } else if info.access_flags.is_abstract() {
                MethodBody::Abstract
            } else {
                let code = attributes.iter().find_map(|a| match a {
                    AttributeInfo::Code(code) => Some(code.clone()),
                    _ => None,
                });
                match code {
                    Some(code) => MethodBody::Bytecode(code),
                    None => {
                        return Err(LinkError::NoSuchAttribute {
                            class: name.to_string(),
                            name: format!("Code of {}{}", method_name, descriptor),
                        }
                        .into())
                    }
                }
            };
            methods.push(Rc::new(Method::new(
                id,
                name.clone(),
                method_name,
                descriptor,
                info.access_flags,
                attributes,
                body,
            )?));
        }

        let attributes = class_file.class_attributes()?;
        let ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            ..
        } = class_file;

        debug!(
            "parsed {} ({} fields, {} methods, version {}.{})",
            name,
            fields.len(),
            methods.len(),
            major_version,
            minor_version
        );

        Ok(Class {
            id,
            name,
            loader,
            flags: access_flags,
            parent,
            interfaces,
            version: (major_version, minor_version),
            constant_pool: Rc::new(constant_pool),
            fields,
            method_index: index_methods(&methods),
            methods,
            static_values: RefCell::new(static_values),
            dynamic_fields,
            attributes,
            native: None,
            baked: Cell::new(false),
            init: Cell::new(InitState::Unbaked),
        })
    }

    pub fn from_native(native: Rc<NativeClass>, id: ClassId, loader: LoaderId) -> Result<Class> {
        let parent = native
            .parent
            .as_ref()
            .map(|parent| LazyClass::pending(loader, parent.clone()));
        let interfaces = native
            .interfaces
            .iter()
            .map(|interface| LazyClass::pending(loader, interface.clone()))
            .collect();

        let mut methods = Vec::with_capacity(native.methods.len());
        for method in &native.methods {
            methods.push(Rc::new(Method::new(
                id,
                native.name.clone(),
                method.name.clone(),
                method.descriptor.clone(),
                method.flags,
                Vec::new(),
                MethodBody::Native(method.function.clone()),
            )?));
        }

        let static_values = native
            .statics
            .iter()
            .map(|s| (s.name.clone(), Value::default_for(&s.descriptor)))
            .collect();

        Ok(Class {
            id,
            name: native.name.clone(),
            loader,
            flags: native.flags,
            parent,
            interfaces,
            version: (0, 0),
            constant_pool: Rc::new(ConstantPool::default()),
            fields: Vec::new(),
            method_index: index_methods(&methods),
            methods,
            static_values: RefCell::new(static_values),
            dynamic_fields: native.fields.clone(),
            attributes: Vec::new(),
            native: Some(native),
            baked: Cell::new(false),
            init: Cell::new(InitState::Unbaked),
        })
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.constant_pool
    }

    pub fn is_native(&self) -> bool {
        self.native.is_some()
    }

    pub fn is_interface(&self) -> bool {
        self.flags.is_interface()
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.is_abstract()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| &*f.name == name)
    }

    pub fn methods(&self) -> &[Rc<Method>] {
        &self.methods
    }

    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        self.attributes
            .iter()
            .find_map(|a| match a {
                AttributeInfo::BootstrapMethods(methods) => Some(methods.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.attributes
            .iter()
            .filter_map(|a| match a {
                AttributeInfo::RuntimeVisibleAnnotations(v)
                | AttributeInfo::RuntimeInvisibleAnnotations(v) => Some(v),
                _ => None,
            })
            .flatten()
    }

    pub fn init_state(&self) -> InitState {
        self.init.get()
    }

    pub fn is_baked(&self) -> bool {
        self.baked.get()
    }

    /// Method declared by this class itself.
    pub fn declared_method(&self, name: &str, descriptor: &str) -> Option<Rc<Method>> {
        let index = *self.method_index.get(name)?.get(descriptor)?;
        self.methods.get(index).cloned()
    }

    /// Look a method up in this class, then its parents, then its interfaces
    /// in declaration order.
    pub fn find_method(&self, vm: &Vm, name: &str, descriptor: &str) -> Result<Option<Rc<Method>>> {
        if let Some(method) = self.declared_method(name, descriptor) {
            return Ok(Some(method));
        }
        if let Some(parent) = &self.parent {
            if let Some(method) = parent.get(vm)?.find_method(vm, name, descriptor)? {
                return Ok(Some(method));
            }
        }
        for interface in &self.interfaces {
            if let Some(interface) = interface.try_get(vm)? {
                if let Some(method) = interface.find_method(vm, name, descriptor)? {
                    return Ok(Some(method));
                }
            }
        }
        Ok(None)
    }

    pub fn get_method(&self, vm: &Vm, name: &str, descriptor: &str) -> Result<Rc<Method>> {
        self.find_method(vm, name, descriptor)?.ok_or_else(|| {
            LinkError::MethodNotFound {
                class: self.name.to_string(),
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
            }
            .into()
        })
    }

    /// Class in the hierarchy that holds static field `name`.
    fn static_owner(&self, vm: &Vm, name: &str) -> Result<Option<Rc<Class>>> {
        if self.static_values.borrow().contains_key(name) {
            return Ok(Some(vm.class(self.id)));
        }
        if let Some(parent) = &self.parent {
            if let Some(owner) = parent.get(vm)?.static_owner(vm, name)? {
                return Ok(Some(owner));
            }
        }
        for interface in &self.interfaces {
            if let Some(interface) = interface.try_get(vm)? {
                if let Some(owner) = interface.static_owner(vm, name)? {
                    return Ok(Some(owner));
                }
            }
        }
        Ok(None)
    }

    pub fn get_static_attribute(&self, vm: &Vm, name: &str) -> Result<Value> {
        if let Some(value) = self.static_values.borrow().get(name) {
            return Ok(value.clone());
        }
        match self.static_owner(vm, name)? {
            Some(owner) => owner.get_static_attribute(vm, name),
            None => Err(self.no_such_attribute(name)),
        }
    }

    pub fn set_static_attribute(&self, vm: &Vm, name: &str, value: Value) -> Result<()> {
        if let Some(slot) = self.static_values.borrow_mut().get_mut(name) {
            *slot = value;
            return Ok(());
        }
        match self.static_owner(vm, name)? {
            Some(owner) => owner.set_static_attribute(vm, name, value),
            None => Err(self.no_such_attribute(name)),
        }
    }

    fn no_such_attribute(&self, name: &str) -> crate::VmError {
        LinkError::NoSuchAttribute {
            class: self.name.to_string(),
            name: name.to_owned(),
        }
        .into()
    }

    /// One-shot finalization after loading: constant values, host statics,
    /// annotation hooks, and scheduling of `<clinit>`.
    pub fn bake(&self, vm: &Vm) -> Result<()> {
        if self.baked.replace(true) {
            return Ok(());
        }
        debug!("baking {}", self.name);

        for field in self.fields.iter().filter(|f| f.is_static()) {
            if let Some(constant) = field.constant_value() {
                let value = vm
                    .constant_value(constant)
                    .with_context(|| format!("constant value of {}.{}", self.name, field.name))?;
                self.static_values
                    .borrow_mut()
                    .insert(field.name.clone(), value);
            }
        }

        if let Some(native) = &self.native {
            for field in &native.statics {
                let value = (field.init)(vm)
                    .with_context(|| format!("initializing {}.{}", self.name, field.name))?;
                self.static_values
                    .borrow_mut()
                    .insert(field.name.clone(), value);
            }
        }

        for annotation in self.annotations() {
            vm.annotate(AnnotationTarget::Class(self), annotation);
        }
        for method in &self.methods {
            for annotation in method.annotations() {
                vm.annotate(AnnotationTarget::Method(method), annotation);
            }
        }

        self.init.set(InitState::Pending);
        if self.declared_method("<clinit>", "()V").is_some() {
            debug!("scheduled static init of {}", self.name);
        }
        Ok(())
    }

    /// Make the class ready for use by bytecode, running `<clinit>` (parents
    /// first) the first time. Calls made while `<clinit>` runs return
    /// immediately.
    pub fn prepare_use(&self, vm: &Vm) -> Result<()> {
        match self.init.get() {
            InitState::Running | InitState::Done => return Ok(()),
            InitState::Unbaked => self.bake(vm)?,
            InitState::Pending => {}
        }

        self.init.set(InitState::Running);
        let result = self.run_static_init(vm);
        self.init.set(InitState::Done);
        result
    }

    fn run_static_init(&self, vm: &Vm) -> Result<()> {
        if let Some(parent) = &self.parent {
            parent.get(vm)?.prepare_use(vm)?;
        }

        if let Some(clinit) = self.declared_method("<clinit>", "()V") {
            if vm.options().run_static_init {
                debug!("running static init of {}", self.name);
                vm.runtime()
                    .run_method(vm, &clinit, Vec::new())
                    .with_context(|| format!("static init of {}", self.name))?;
            } else {
                debug!("static init of {} skipped", self.name);
            }
        }
        Ok(())
    }

    /// New object of this class with every instance field of the hierarchy
    /// set to its default value.
    pub fn create_instance(&self, vm: &Vm) -> Result<Value> {
        if self.is_abstract() || self.is_interface() {
            return Err(Fault::AbstractClass(self.name.to_string()).into());
        }

        let mut fields = HashMap::new();
        self.collect_dynamic_fields(vm, &mut fields)?;

        if self.is_native() {
            let object = NativeObject::new(self.id, self.name.clone(), NativePayload::None);
            for (name, value) in fields {
                object.set_field(&name, value);
            }
            return Ok(Value::Native(Rc::new(object)));
        }
        Ok(Value::Object(Rc::new(Instance::new(
            self.id,
            self.name.clone(),
            fields,
        ))))
    }

    fn collect_dynamic_fields(&self, vm: &Vm, fields: &mut HashMap<Rc<str>, Value>) -> Result<()> {
        if let Some(parent) = &self.parent {
            parent.get(vm)?.collect_dynamic_fields(vm, fields)?;
        }
        for (name, descriptor) in &self.dynamic_fields {
            fields.insert(name.clone(), Value::default_for(descriptor));
        }
        Ok(())
    }

    /// Whether this class is `name` or extends/implements it, directly or
    /// not. Missing ancestors are skipped.
    pub fn is_subclass_of(&self, vm: &Vm, name: &str) -> Result<bool> {
        if &*self.name == name {
            return Ok(true);
        }
        for ancestor in self.parent.iter().chain(&self.interfaces) {
            if &**ancestor.name() == name {
                return Ok(true);
            }
            if let Some(ancestor) = ancestor.try_get(vm)? {
                if ancestor.is_subclass_of(vm, name)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Reject illegal combinations of class access flags.
    pub fn validate_class_file(&self) -> Result<()> {
        let flags = self.flags;
        let reason = if flags.is_module() && flags != AccessFlags::MODULE {
            "module-info cannot have other access flags"
        } else if flags.is_interface() && !flags.is_abstract() {
            "interface must be abstract"
        } else if flags.is_interface() && flags.is_final() {
            "interface cannot be final"
        } else if flags.is_abstract() && flags.is_final() {
            "class cannot be both abstract and final"
        } else if flags.is_annotation() && !flags.is_interface() {
            "annotation must be an interface"
        } else {
            return Ok(());
        };
        Err(ValidationError::IllegalAccessFlags {
            class: self.name.to_string(),
            reason,
        }
        .into())
    }
}

fn index_methods(methods: &[Rc<Method>]) -> HashMap<Rc<str>, HashMap<Rc<str>, usize>> {
    let mut index: HashMap<Rc<str>, HashMap<Rc<str>, usize>> = HashMap::new();
    for (i, method) in methods.iter().enumerate() {
        index
            .entry(method.name.clone())
            .or_default()
            .insert(method.descriptor.clone(), i);
    }
    index
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("parent", &self.parent)
            .field("interfaces", &self.interfaces)
            .field("methods", &self.methods.len())
            .field("init", &self.init.get())
            .finish()
    }
}

use std::{fmt, rc::Rc};

use just_class_file::{
    attributes::BootstrapMethod,
    constant_pool::{Constant, DynamicRef, MemberRef, ReferenceKind},
    descriptor::{FieldType, MethodDescriptor},
};

use crate::{
    error::{Fault, ValidationError},
    natives::to_java_string,
    value::Value,
    vm::{LoaderId, Vm},
    Result,
};

/// How a lambda call site reaches its target.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CallSiteKind {
    /// Call the target as is (static and private methods)
    Plain,
    /// Allocate an instance of the target's class and run the constructor
    Constructor,
    /// Look the target up on the runtime class of the first argument
    AroundAbstract,
}

/// A materialized lambda factory: which interface method the produced
/// object implements and what it calls.
#[derive(Clone, Debug, PartialEq)]
pub struct LambdaSite {
    /// Functional interface implemented by the produced object
    pub interface: Rc<str>,
    /// Name of the interface method
    pub method_name: Rc<str>,
    /// Erased descriptor of the interface method
    pub method_descriptor: Rc<str>,
    pub target: Rc<MemberRef>,
    pub kind: CallSiteKind,
    /// Values taken from the operand stack when the object is created
    pub captured: usize,
    pub loader: LoaderId,
}

impl LambdaSite {
    /// Build the site for a `LambdaMetafactory` bootstrap.
    ///
    /// The target must take exactly the captured values followed by the
    /// interface method's arguments, counting the receiver of an instance
    /// target.
    pub fn from_bootstrap(
        dynamic: &DynamicRef,
        bootstrap: &BootstrapMethod,
        loader: LoaderId,
    ) -> Result<Self> {
        let site = MethodDescriptor::parse(&dynamic.descriptor)?;
        let interface = match &site.return_type {
            Some(FieldType::Object(name)) => Rc::from(name.as_str()),
            _ => return Err(bad_bootstrap(dynamic, "does not produce an object")),
        };

        let (method_descriptor, handle) = match bootstrap.arguments.as_slice() {
            [Constant::MethodType(descriptor), Constant::MethodHandle(handle), ..] => {
                (descriptor.clone(), handle.clone())
            }
            _ => return Err(bad_bootstrap(dynamic, "has unexpected arguments")),
        };
        let sam = MethodDescriptor::parse(&method_descriptor)?;
        let target = MethodDescriptor::parse(&handle.reference.descriptor)?;

        let (kind, receiver) = match handle.kind {
            ReferenceKind::InvokeStatic => (CallSiteKind::Plain, 0),
            ReferenceKind::InvokeSpecial => (CallSiteKind::Plain, 1),
            ReferenceKind::NewInvokeSpecial => (CallSiteKind::Constructor, 0),
            ReferenceKind::InvokeVirtual | ReferenceKind::InvokeInterface => {
                (CallSiteKind::AroundAbstract, 1)
            }
            other => {
                return Err(bad_bootstrap(
                    dynamic,
                    &format!("targets a {:?} handle", other),
                ))
            }
        };

        let captured = site.parameters.len();
        if target.parameters.len() + receiver != captured + sam.parameters.len() {
            return Err(bad_bootstrap(
                dynamic,
                &format!(
                    "captures {} and passes {} values to {} which takes {}",
                    captured,
                    sam.parameters.len(),
                    handle.reference,
                    target.parameters.len() + receiver
                ),
            ));
        }

        Ok(Self {
            interface,
            method_name: dynamic.name.clone(),
            method_descriptor,
            target: handle.reference.clone(),
            kind,
            captured,
            loader,
        })
    }

    /// Call the target with the captured values followed by `args`.
    pub fn call(&self, vm: &Vm, mut values: Vec<Value>) -> Result<Option<Value>> {
        let target = &self.target;
        match self.kind {
            CallSiteKind::Plain => {
                let class = vm.load_class_in(self.loader, &target.class)?;
                class.prepare_use(vm)?;
                let method = class.get_method(vm, &target.name, &target.descriptor)?;
                vm.runtime().run_method(vm, &method, values)
            }
            CallSiteKind::Constructor => {
                let class = vm.load_class_in(self.loader, &target.class)?;
                class.prepare_use(vm)?;
                let instance = class.create_instance(vm)?;
                let constructor = class.get_method(vm, &target.name, &target.descriptor)?;
                values.insert(0, instance.clone());
                vm.runtime().run_method(vm, &constructor, values)?;
                Ok(Some(instance))
            }
            CallSiteKind::AroundAbstract => {
                let receiver = values.first().ok_or(Fault::StackUnderflow)?;
                if receiver.is_null() {
                    return Err(Fault::NullPointer(format!("calling {}", target)).into());
                }
                let method = match vm
                    .class_of(receiver)?
                    .find_method(vm, &target.name, &target.descriptor)?
                {
                    Some(method) => method,
                    None => vm.load_class_in(self.loader, &target.class)?.get_method(
                        vm,
                        &target.name,
                        &target.descriptor,
                    )?,
                };
                vm.runtime().run_method(vm, &method, values)
            }
        }
    }
}

impl fmt::Display for LambdaSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}{} -> {} ({:?}, {} captured)",
            self.interface,
            self.method_name,
            self.method_descriptor,
            self.target,
            self.kind,
            self.captured
        )
    }
}

fn bad_bootstrap(dynamic: &DynamicRef, reason: &str) -> crate::VmError {
    ValidationError::BadConstant(format!(
        "lambda factory {}{} {}",
        dynamic.name, dynamic.descriptor, reason
    ))
    .into()
}

/// The object produced by a lambda factory.
#[derive(Debug)]
pub struct CallSite {
    pub site: Rc<LambdaSite>,
    /// In the order they were pushed
    pub captured: Vec<Value>,
}

impl CallSite {
    pub fn new(site: Rc<LambdaSite>, captured: Vec<Value>) -> Self {
        Self { site, captured }
    }

    /// Whether a call to `name` on this object means the interface method.
    pub fn implements(&self, name: &str) -> bool {
        &*self.site.method_name == name
    }

    pub fn invoke(&self, vm: &Vm, args: &[Value]) -> Result<Option<Value>> {
        let mut values = Vec::with_capacity(self.captured.len() + args.len());
        values.extend_from_slice(&self.captured);
        values.extend_from_slice(args);
        self.site.call(vm, values)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConcatPart {
    Text(Rc<str>),
    /// Index into the site's arguments
    Argument(usize),
}

/// A materialized `StringConcatFactory` call site.
#[derive(Clone, Debug, PartialEq)]
pub struct ConcatSite {
    pub parts: Vec<ConcatPart>,
    /// Descriptor of each argument taken from the stack
    pub arguments: Vec<Rc<str>>,
}

const ARGUMENT_TAG: char = '\u{1}';
const CONSTANT_TAG: char = '\u{2}';

impl ConcatSite {
    /// Site for `makeConcatWithConstants`: `recipe` holds literal text, one
    /// `\1` per argument and one `\2` per entry of `constants`.
    pub fn with_recipe(
        descriptor: &str,
        recipe: &str,
        constants: &[Constant],
    ) -> Result<Self> {
        let arguments = argument_descriptors(descriptor)?;
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut next_argument = 0;
        let mut constants = constants.iter();

        for c in recipe.chars() {
            match c {
                ARGUMENT_TAG => {
                    if !text.is_empty() {
                        parts.push(ConcatPart::Text(Rc::from(std::mem::take(&mut text))));
                    }
                    parts.push(ConcatPart::Argument(next_argument));
                    next_argument += 1;
                }
                CONSTANT_TAG => match constants.next() {
                    Some(constant) => text.push_str(&constant_text(constant)?),
                    None => {
                        return Err(ValidationError::BadConstant(format!(
                            "concat recipe {:?} needs more constants",
                            recipe
                        ))
                        .into())
                    }
                },
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            parts.push(ConcatPart::Text(Rc::from(text)));
        }

        if next_argument != arguments.len() {
            return Err(ValidationError::BadConstant(format!(
                "concat recipe {:?} uses {} of {} arguments",
                recipe,
                next_argument,
                arguments.len()
            ))
            .into());
        }
        Ok(Self { parts, arguments })
    }

    /// Site for `makeConcat`: every argument in order.
    pub fn plain(descriptor: &str) -> Result<Self> {
        let arguments = argument_descriptors(descriptor)?;
        Ok(Self {
            parts: (0..arguments.len()).map(ConcatPart::Argument).collect(),
            arguments,
        })
    }

    pub fn render(&self, vm: &Vm, args: &[Value]) -> Result<String> {
        let mut s = String::new();
        for part in &self.parts {
            match part {
                ConcatPart::Text(text) => s.push_str(text),
                ConcatPart::Argument(i) => {
                    let value = args.get(*i).ok_or(Fault::StackUnderflow)?;
                    s.push_str(&to_java_string(vm, value, Some(&self.arguments[*i]))?);
                }
            }
        }
        Ok(s)
    }
}

impl fmt::Display for ConcatSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                ConcatPart::Text(text) => write!(f, "{:?}", text)?,
                ConcatPart::Argument(i) => write!(f, "<{}>", self.arguments[*i])?,
            }
        }
        Ok(())
    }
}

fn argument_descriptors(descriptor: &str) -> Result<Vec<Rc<str>>> {
    Ok(MethodDescriptor::parse(descriptor)?
        .parameters
        .iter()
        .map(|p| Rc::from(p.to_string()))
        .collect())
}

fn constant_text(constant: &Constant) -> Result<String> {
    Ok(match constant {
        Constant::String(s) | Constant::Utf8(s) => s.to_string(),
        Constant::Integer(i) => i.to_string(),
        Constant::Long(l) => l.to_string(),
        Constant::Float(f) => crate::natives::java_float(*f as f64),
        Constant::Double(d) => crate::natives::java_float(*d),
        other => {
            return Err(ValidationError::BadConstant(format!(
                "{} constant in a concat recipe",
                other.kind()
            ))
            .into())
        }
    })
}

use std::{cell::OnceCell, fmt, rc::Rc};

use just_class_file::{
    attributes::{Annotation, AttributeInfo, CodeAttribute},
    constant_pool::Constant,
    descriptor::MethodDescriptor,
    AccessFlags,
};

use super::ClassId;
use crate::{
    bytecode::BytecodeContainer, error::Fault, natives::NativeFn, vm::Vm, Context, Result,
};

#[derive(Debug)]
pub struct Field {
    pub class: ClassId,
    pub name: Rc<str>,
    pub descriptor: Rc<str>,
    pub flags: AccessFlags,
    pub attributes: Vec<AttributeInfo>,
}

impl Field {
    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }

    pub fn constant_value(&self) -> Option<&Constant> {
        self.attributes.iter().find_map(|a| match a {
            AttributeInfo::ConstantValue(c) => Some(c),
            _ => None,
        })
    }
}

/// What runs when a method is invoked.
pub enum MethodBody {
    Bytecode(CodeAttribute),
    /// Implemented by the host
    Native(NativeFn),
    /// Declared `native` in a class file; bound through the VM's native
    /// registry when called
    ExternNative,
    Abstract,
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodBody::Bytecode(code) => write!(f, "Bytecode({} bytes)", code.code.len()),
            MethodBody::Native(_) => write!(f, "Native"),
            MethodBody::ExternNative => write!(f, "ExternNative"),
            MethodBody::Abstract => write!(f, "Abstract"),
        }
    }
}

/// A method, identified within its class by name and descriptor.
#[derive(Debug)]
pub struct Method {
    pub class: ClassId,
    pub class_name: Rc<str>,
    pub name: Rc<str>,
    pub descriptor: Rc<str>,
    pub signature: MethodDescriptor,
    pub flags: AccessFlags,
    pub attributes: Vec<AttributeInfo>,
    pub body: MethodBody,
    container: OnceCell<Rc<BytecodeContainer>>,
}

impl Method {
    pub fn new(
        class: ClassId,
        class_name: Rc<str>,
        name: Rc<str>,
        descriptor: Rc<str>,
        flags: AccessFlags,
        attributes: Vec<AttributeInfo>,
        body: MethodBody,
    ) -> Result<Self> {
        let signature = MethodDescriptor::parse(&descriptor)
            .with_context(|| format!("in {}.{}{}", class_name, name, descriptor))?;
        Ok(Self {
            class,
            class_name,
            name,
            descriptor,
            signature,
            flags,
            attributes,
            body,
            container: OnceCell::new(),
        })
    }

    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.body, MethodBody::Abstract)
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

    /// Decoded, optimized and validated body. Built on first use.
    pub fn container(&self, vm: &Vm) -> Result<Rc<BytecodeContainer>> {
        if let Some(container) = self.container.get() {
            return Ok(container.clone());
        }

        let code = match &self.body {
            MethodBody::Bytecode(code) => code,
            _ => return Err(Fault::Unsupported(format!("{} has no bytecode", self)).into()),
        };
        let class = vm.class(self.class);
        let mut container = BytecodeContainer::decode(code, class.constant_pool())
            .with_context(|| format!("decoding {}", self))?;
        container
            .optimize(&class)
            .with_context(|| format!("optimizing {}", self))?;
        container
            .validate()
            .with_context(|| format!("validating {}", self))?;

        let container = Rc::new(container);
        let _ = self.container.set(container.clone());
        Ok(container)
    }

    pub fn has_container(&self) -> bool {
        self.container.get().is_some()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class_name, self.name, self.descriptor)
    }
}

//! Assembles class files from scratch.
//!
//! Used by the test suites of the other crates to produce the class files
//! they load, so that no compiled binaries have to be checked in. Opcodes
//! and access flags are passed as raw numbers.

mod code;
mod constant_pool;

use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};

pub use code::{Code, Label};
pub use constant_pool::ConstantPoolBuilder;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_ANNOTATION: u16 = 0x2000;

/// Constant value of an annotation element.
#[derive(Clone, Debug)]
pub enum ElementConst {
    Int(i32),
    String(String),
}

/// Annotation whose constants have already been added to the pool.
#[derive(Clone, Debug)]
pub struct Annotation {
    type_index: u16,
    elements: Vec<(u16, u8, u16)>,
}

/// A field or method record.
#[derive(Debug)]
pub struct Member {
    access_flags: u16,
    name_index: u16,
    descriptor_index: u16,
    /// Pool index of the `ConstantValue` of a field
    pub constant_value: Option<u16>,
    pub code: Option<Code>,
    pub annotations: Vec<Annotation>,
    /// Extra attributes as (name index, body) pairs
    pub attributes: Vec<(u16, Vec<u8>)>,
}

pub struct ClassAssembler {
    pool: ConstantPoolBuilder,
    major_version: u16,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Member>,
    methods: Vec<Member>,
    annotations: Vec<Annotation>,
    bootstrap_methods: Vec<(u16, Vec<u16>)>,
    attributes: Vec<(u16, Vec<u8>)>,
}

impl ClassAssembler {
    /// Start a class extending `super_class` (`None` only for `java/lang/Object`).
    pub fn new(name: &str, super_class: Option<&str>, access_flags: u16) -> Self {
        let mut pool = ConstantPoolBuilder::default();
        let this_class = pool.class(name);
        let super_class = super_class.map_or(0, |s| pool.class(s));
        Self {
            pool,
            major_version: 61,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            bootstrap_methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn pool(&mut self) -> &mut ConstantPoolBuilder {
        &mut self.pool
    }

    pub fn interface(&mut self, name: &str) -> &mut Self {
        let index = self.pool.class(name);
        self.interfaces.push(index);
        self
    }

    pub fn field(&mut self, access_flags: u16, name: &str, descriptor: &str) -> &mut Member {
        let member = self.member(access_flags, name, descriptor);
        self.fields.push(member);
        let last = self.fields.len() - 1;
        &mut self.fields[last]
    }

    pub fn method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        code: Option<Code>,
    ) -> &mut Member {
        let mut member = self.member(access_flags, name, descriptor);
        member.code = code;
        self.methods.push(member);
        let last = self.methods.len() - 1;
        &mut self.methods[last]
    }

    /// Build an annotation of type `type_descriptor` (eg. `Lmy/Marker;`).
    pub fn annotation(
        &mut self,
        type_descriptor: &str,
        elements: &[(&str, ElementConst)],
    ) -> Annotation {
        let type_index = self.pool.utf8(type_descriptor);
        let elements = elements
            .iter()
            .map(|(name, value)| {
                let name_index = self.pool.utf8(name);
                match value {
                    ElementConst::Int(i) => (name_index, b'I', self.pool.integer(*i)),
                    ElementConst::String(s) => (name_index, b's', self.pool.utf8(s)),
                }
            })
            .collect();
        Annotation {
            type_index,
            elements,
        }
    }

    /// Attach a runtime-visible annotation to the class.
    pub fn annotate(&mut self, annotation: Annotation) -> &mut Self {
        self.annotations.push(annotation);
        self
    }

    /// Add a `BootstrapMethods` entry and return its index.
    pub fn bootstrap_method(&mut self, method_handle: u16, arguments: Vec<u16>) -> u16 {
        self.bootstrap_methods.push((method_handle, arguments));
        self.bootstrap_methods.len() as u16 - 1
    }

    /// Add a raw class-level attribute.
    pub fn attribute(&mut self, name: &str, body: Vec<u8>) -> &mut Self {
        let name_index = self.pool.utf8(name);
        self.attributes.push((name_index, body));
        self
    }

    pub fn assemble(mut self) -> io::Result<Vec<u8>> {
        let mut members = Vec::new();
        for member in self.fields.iter().chain(self.methods.iter()) {
            members.push(Self::member_attributes(&mut self.pool, member)?);
        }

        let mut class_attributes = self.attributes.clone();
        if !self.annotations.is_empty() {
            let name_index = self.pool.utf8("RuntimeVisibleAnnotations");
            class_attributes.push((name_index, annotations_body(&self.annotations)?));
        }
        if !self.bootstrap_methods.is_empty() {
            let name_index = self.pool.utf8("BootstrapMethods");
            let mut body = Vec::new();
            body.write_u16::<BigEndian>(self.bootstrap_methods.len() as u16)?;
            for (handle, arguments) in &self.bootstrap_methods {
                body.write_u16::<BigEndian>(*handle)?;
                body.write_u16::<BigEndian>(arguments.len() as u16)?;
                for argument in arguments {
                    body.write_u16::<BigEndian>(*argument)?;
                }
            }
            class_attributes.push((name_index, body));
        }

        let mut out = Vec::new();
        out.write_u32::<BigEndian>(0xCAFEBABE)?;
        out.write_u16::<BigEndian>(0)?;
        out.write_u16::<BigEndian>(self.major_version)?;
        self.pool.serialize(&mut out)?;
        out.write_u16::<BigEndian>(self.access_flags)?;
        out.write_u16::<BigEndian>(self.this_class)?;
        out.write_u16::<BigEndian>(self.super_class)?;
        out.write_u16::<BigEndian>(self.interfaces.len() as u16)?;
        for interface in &self.interfaces {
            out.write_u16::<BigEndian>(*interface)?;
        }

        let (fields, methods) = members.split_at(self.fields.len());
        for (list, attributes) in [(&self.fields, fields), (&self.methods, methods)] {
            out.write_u16::<BigEndian>(list.len() as u16)?;
            for (member, attributes) in list.iter().zip(attributes) {
                out.write_u16::<BigEndian>(member.access_flags)?;
                out.write_u16::<BigEndian>(member.name_index)?;
                out.write_u16::<BigEndian>(member.descriptor_index)?;
                write_attributes(&mut out, attributes)?;
            }
        }

        write_attributes(&mut out, &class_attributes)?;
        Ok(out)
    }

    fn member(&mut self, access_flags: u16, name: &str, descriptor: &str) -> Member {
        Member {
            access_flags,
            name_index: self.pool.utf8(name),
            descriptor_index: self.pool.utf8(descriptor),
            constant_value: None,
            code: None,
            annotations: Vec::new(),
            attributes: Vec::new(),
        }
    }

    fn member_attributes(
        pool: &mut ConstantPoolBuilder,
        member: &Member,
    ) -> io::Result<Vec<(u16, Vec<u8>)>> {
        let mut attributes = member.attributes.clone();
        if let Some(value) = member.constant_value {
            let mut body = Vec::new();
            body.write_u16::<BigEndian>(value)?;
            attributes.push((pool.utf8("ConstantValue"), body));
        }
        if let Some(code) = &member.code {
            attributes.push((pool.utf8("Code"), code.to_bytes()?));
        }
        if !member.annotations.is_empty() {
            attributes.push((
                pool.utf8("RuntimeVisibleAnnotations"),
                annotations_body(&member.annotations)?,
            ));
        }
        Ok(attributes)
    }
}

fn annotations_body(annotations: &[Annotation]) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    body.write_u16::<BigEndian>(annotations.len() as u16)?;
    for annotation in annotations {
        body.write_u16::<BigEndian>(annotation.type_index)?;
        body.write_u16::<BigEndian>(annotation.elements.len() as u16)?;
        for (name_index, tag, value_index) in &annotation.elements {
            body.write_u16::<BigEndian>(*name_index)?;
            body.write_u8(*tag)?;
            body.write_u16::<BigEndian>(*value_index)?;
        }
    }
    Ok(body)
}

fn write_attributes<W: Write>(out: &mut W, attributes: &[(u16, Vec<u8>)]) -> io::Result<()> {
    out.write_u16::<BigEndian>(attributes.len() as u16)?;
    for (name_index, body) in attributes {
        out.write_u16::<BigEndian>(*name_index)?;
        out.write_u32::<BigEndian>(body.len() as u32)?;
        out.write_all(body)?;
    }
    Ok(())
}

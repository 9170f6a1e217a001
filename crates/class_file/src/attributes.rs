mod parser;

use std::rc::Rc;

use crate::{
    constant_pool::{Constant, MethodHandle, NameAndType},
    AccessFlags, Attribute, ConstantPool, Result,
};

pub use self::parser::parse_attribute;

/// Attributes are required when the class cannot be executed without them.
/// Failing to parse one of these is a hard error; every other attribute is
/// kept as an opaque blob when it cannot be parsed.
pub const REQUIRED_ATTRIBUTES: [&str; 3] = ["ConstantValue", "Code", "BootstrapMethods"];

#[derive(Debug, Default)]
pub struct Attributes(pub Vec<Attribute>);
impl Attributes {
    pub fn find_by_name(&self, name: &str, constant_pool: &ConstantPool) -> Option<&Attribute> {
        self.0.iter().find(|a| {
            constant_pool
                .utf8(a.attribute_name_index)
                .map_or(false, |s| &*s == name)
        })
    }

    pub fn code_attribute(&self, constant_pool: &ConstantPool) -> Result<Option<CodeAttribute>> {
        match self.find_by_name("Code", constant_pool) {
            Some(a) => match parse_attribute(a, constant_pool)? {
                AttributeInfo::Code(code) => Ok(Some(code)),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Decode every attribute of the table into its typed form.
    pub fn parse(&self, constant_pool: &ConstantPool) -> Result<Vec<AttributeInfo>> {
        self.0
            .iter()
            .map(|a| parse_attribute(a, constant_pool))
            .collect()
    }
}

/// A decoded attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeInfo {
    ConstantValue(Constant),
    Code(CodeAttribute),
    StackMapTable(Vec<StackMapFrame>),
    Exceptions(Vec<Rc<str>>),
    InnerClasses(Vec<InnerClass>),
    EnclosingMethod(EnclosingMethod),
    Synthetic,
    Deprecated,
    Signature(Rc<str>),
    SourceFile(Rc<str>),
    LineNumberTable(Vec<LineNumber>),
    LocalVariableTable(Vec<LocalVariable>),
    RuntimeVisibleAnnotations(Vec<Annotation>),
    RuntimeInvisibleAnnotations(Vec<Annotation>),
    BootstrapMethods(Vec<BootstrapMethod>),
    NestHost(Rc<str>),
    NestMembers(Vec<Rc<str>>),
    /// Attribute this parser does not understand (or an optional one that
    /// failed to parse), kept as-is.
    Unknown { name: Rc<str>, info: Vec<u8> },
}

impl AttributeInfo {
    pub fn name(&self) -> &str {
        match self {
            AttributeInfo::ConstantValue(_) => "ConstantValue",
            AttributeInfo::Code(_) => "Code",
            AttributeInfo::StackMapTable(_) => "StackMapTable",
            AttributeInfo::Exceptions(_) => "Exceptions",
            AttributeInfo::InnerClasses(_) => "InnerClasses",
            AttributeInfo::EnclosingMethod(_) => "EnclosingMethod",
            AttributeInfo::Synthetic => "Synthetic",
            AttributeInfo::Deprecated => "Deprecated",
            AttributeInfo::Signature(_) => "Signature",
            AttributeInfo::SourceFile(_) => "SourceFile",
            AttributeInfo::LineNumberTable(_) => "LineNumberTable",
            AttributeInfo::LocalVariableTable(_) => "LocalVariableTable",
            AttributeInfo::RuntimeVisibleAnnotations(_) => "RuntimeVisibleAnnotations",
            AttributeInfo::RuntimeInvisibleAnnotations(_) => "RuntimeInvisibleAnnotations",
            AttributeInfo::BootstrapMethods(_) => "BootstrapMethods",
            AttributeInfo::NestHost(_) => "NestHost",
            AttributeInfo::NestMembers(_) => "NestMembers",
            AttributeInfo::Unknown { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// `None` catches everything (`finally` blocks)
    pub catch_type: Option<Rc<str>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(Rc<str>),
    /// Offset of the `new` instruction that created the object
    Uninitialized(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StackMapFrame {
    Same {
        offset_delta: u16,
    },
    SameLocals1StackItem {
        offset_delta: u16,
        stack: VerificationType,
    },
    Chop {
        offset_delta: u16,
        chopped: u8,
    },
    Append {
        offset_delta: u16,
        locals: Vec<VerificationType>,
    },
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerClass {
    pub inner_class: Rc<str>,
    pub outer_class: Option<Rc<str>>,
    pub inner_name: Option<Rc<str>>,
    pub access_flags: AccessFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnclosingMethod {
    pub class: Rc<str>,
    pub method: Option<Rc<NameAndType>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name: Rc<str>,
    pub descriptor: Rc<str>,
    pub index: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface, eg. `Lmy/Marker;`
    pub type_name: Rc<str>,
    pub elements: Vec<ElementValuePair>,
}

impl Annotation {
    /// Internal name of the annotation interface.
    pub fn class_name(&self) -> &str {
        self.type_name
            .strip_prefix('L')
            .and_then(|s| s.strip_suffix(';'))
            .unwrap_or(&self.type_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementValuePair {
    pub name: Rc<str>,
    pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// Primitive or string constant, with the tag character (`B`, `C`, `D`,
    /// `F`, `I`, `J`, `S`, `Z` or `s`)
    Const(char, Constant),
    Enum {
        type_name: Rc<str>,
        const_name: Rc<str>,
    },
    /// Return descriptor of the class literal
    Class(Rc<str>),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapMethod {
    pub method: Rc<MethodHandle>,
    pub arguments: Vec<Constant>,
}

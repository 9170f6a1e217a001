use std::fmt;

use just_class_file::ClassFileError;
use thiserror::Error;

use crate::value::Value;

pub type Result<T, E = VmError> = std::result::Result<T, E>;

/// Error raised anywhere in the VM.
///
/// Carries the kind of failure and an ordered list of context lines, one per
/// enclosing stage that saw the error go by (innermost first).
#[derive(Debug)]
pub struct VmError {
    kind: Box<ErrorKind>,
    trace: Vec<String>,
}

impl VmError {
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        Self {
            kind: Box::new(kind.into()),
            trace: Vec::new(),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.kind
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn push_trace(&mut self, line: impl Into<String>) {
        self.trace.push(line.into());
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self.kind() {
            ErrorKind::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    /// Value thrown by `athrow`, if that is what this error is.
    pub fn thrown(&self) -> Option<&Value> {
        match self.kind() {
            ErrorKind::Throw(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for line in &self.trace {
            write!(f, "\n    {}", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for VmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.kind)
    }
}

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("decode error: {0}")]
    Decode(#[from] ClassFileError),
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("runtime fault: {0}")]
    Fault(#[from] Fault),
    #[error("uncaught throw of {0}")]
    Throw(Value),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, PartialEq)]
pub enum LinkError {
    #[error("class {0} not found")]
    ClassNotFound(String),
    #[error("method {class}.{name}{descriptor} not found")]
    MethodNotFound {
        class: String,
        name: String,
        descriptor: String,
    },
    #[error("{class} has no attribute {name}")]
    NoSuchAttribute { class: String, name: String },
    #[error("unknown class loader {0}")]
    UnknownLoader(u32),
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("illegal access flags on {class}: {reason}")]
    IllegalAccessFlags { class: String, reason: &'static str },
    #[error("instruction at {offset} jumps to {target}, which is not an instruction")]
    BadJumpTarget { offset: usize, target: isize },
    #[error("instruction at {offset} uses local {index}, but the method only has {max_locals}")]
    LocalOutOfRange {
        offset: usize,
        index: u16,
        max_locals: u16,
    },
    #[error("bad constant: {0}")]
    BadConstant(String),
    #[error("program counter {0} is not at an instruction")]
    NotAnInstruction(isize),
}

/// Failure of an instruction at run time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Fault {
    #[error("NullPointerException: {0}")]
    NullPointer(String),
    #[error("ArrayIndexOutOfBoundsException: index {index} out of bounds for length {length}")]
    ArrayIndexOutOfBounds { index: i32, length: usize },
    #[error("NegativeArraySizeException: {0}")]
    NegativeArraySize(i32),
    #[error("ArithmeticException: {0}")]
    Arithmetic(&'static str),
    #[error("NumberFormatException: for input string {0:?}")]
    NumberFormat(String),
    #[error("ClassCastException: {from} cannot be cast to {to}")]
    ClassCast { from: String, to: String },
    #[error("class {0} is abstract")]
    AbstractClass(String),
    #[error("method {0} is abstract")]
    AbstractMethod(String),
    #[error("no field {0}")]
    NoSuchField(String),
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("local {0} read before being written")]
    UninitializedLocal(u16),
    #[error("call depth exceeded {0}")]
    StackOverflow(usize),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<ErrorKind> for VmError {
    fn from(kind: ErrorKind) -> Self {
        VmError::new(kind)
    }
}

impl From<ClassFileError> for VmError {
    fn from(e: ClassFileError) -> Self {
        VmError::new(e)
    }
}

impl From<LinkError> for VmError {
    fn from(e: LinkError) -> Self {
        VmError::new(e)
    }
}

impl From<ValidationError> for VmError {
    fn from(e: ValidationError) -> Self {
        VmError::new(e)
    }
}

impl From<Fault> for VmError {
    fn from(e: Fault) -> Self {
        VmError::new(e)
    }
}

impl From<std::io::Error> for VmError {
    fn from(e: std::io::Error) -> Self {
        VmError::new(e)
    }
}

/// Adds a line of context to a failing result.
pub trait Context<T> {
    fn context<C: fmt::Display>(self, context: C) -> Result<T>;

    fn with_context<C: fmt::Display, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T, E: Into<VmError>> Context<T> for std::result::Result<T, E> {
    fn context<C: fmt::Display>(self, context: C) -> Result<T> {
        self.map_err(|e| {
            let mut e: VmError = e.into();
            e.push_trace(context.to_string());
            e
        })
    }

    fn with_context<C: fmt::Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let mut e: VmError = e.into();
            e.push_trace(f().to_string());
            e
        })
    }
}

#[cfg(test)]
mod context_tests {
    use super::*;

    #[test]
    fn it_should_append_one_line_per_stage() {
        let result: Result<()> = Err(Fault::StackUnderflow)
            .context("at 3: iadd")
            .context("in my/A.m()I");
        let e = result.unwrap_err();
        assert_eq!(e.trace(), ["at 3: iadd", "in my/A.m()I"]);
        assert_eq!(
            e.to_string(),
            "runtime fault: operand stack underflow\n    at 3: iadd\n    in my/A.m()I"
        );
        assert_eq!(e.fault(), Some(&Fault::StackUnderflow));
    }
}

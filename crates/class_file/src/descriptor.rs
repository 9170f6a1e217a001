use std::{fmt, iter::Peekable, str::Chars};

use crate::{ClassFileError, Result};

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    pub fn from_char(c: char) -> Option<BaseType> {
        let typ = match c {
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'D' => BaseType::Double,
            'F' => BaseType::Float,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'S' => BaseType::Short,
            'Z' => BaseType::Boolean,
            _ => return None,
        };
        Some(typ)
    }

    pub fn as_char(&self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    /// `long` and `double` take two local variable slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, BaseType::Long | BaseType::Double)
    }
}

/// Type of a field, parameter or array element
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    /// Internal class name, without the `L` and `;` wrapper
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn parse(source: &str) -> Result<FieldType> {
        let mut chars = source.chars().peekable();
        let typ = Self::parse_from(&mut chars, source)?;
        match chars.next() {
            None => Ok(typ),
            Some(c) => Err(invalid(source, format!("unexpected leftover input '{}'", c))),
        }
    }

    fn parse_from(chars: &mut Peekable<Chars>, source: &str) -> Result<FieldType> {
        match chars.next() {
            Some('L') => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(';') => break,
                        Some(c) => name.push(c),
                        None => return Err(invalid(source, "unterminated class name")),
                    }
                }
                if name.is_empty() {
                    return Err(invalid(source, "empty class name"));
                }
                Ok(FieldType::Object(name))
            }
            Some('[') => Ok(FieldType::Array(Box::new(Self::parse_from(chars, source)?))),
            Some(c) => BaseType::from_char(c)
                .map(FieldType::Base)
                .ok_or_else(|| invalid(source, format!("invalid type character '{}'", c))),
            None => Err(invalid(source, "missing type")),
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, FieldType::Base(b) if b.is_wide())
    }

    pub fn is_reference(&self) -> bool {
        !matches!(self, FieldType::Base(_))
    }

    /// Name used for class lookups: internal name for objects, descriptor
    /// for arrays and primitives.
    pub fn class_name(&self) -> String {
        match self {
            FieldType::Object(name) => name.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(b) => write!(f, "{}", b.as_char()),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(element) => write!(f, "[{}", element),
        }
    }
}

/// One parameter of a method, as seen by the local variable layout.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParameterPart {
    pub typ: FieldType,
    /// Whether the parameter occupies a second (padding) local slot.
    pub wide: bool,
}

/// Method descriptor, eg. `(IJLjava/lang/String;)V`
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    /// `None` for `void`
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(source: &str) -> Result<MethodDescriptor> {
        let mut chars = source.chars().peekable();
        if chars.next() != Some('(') {
            return Err(invalid(source, "missing '('"));
        }

        let mut parameters = Vec::new();
        loop {
            match chars.peek() {
                Some(')') => {
                    chars.next();
                    break;
                }
                Some(_) => parameters.push(FieldType::parse_from(&mut chars, source)?),
                None => return Err(invalid(source, "missing ')'")),
            }
        }

        let return_type = match chars.peek() {
            Some('V') => {
                chars.next();
                None
            }
            _ => Some(FieldType::parse_from(&mut chars, source)?),
        };

        match chars.next() {
            None => Ok(MethodDescriptor {
                parameters,
                return_type,
            }),
            Some(c) => Err(invalid(source, format!("unexpected leftover input '{}'", c))),
        }
    }

    pub fn parameter_parts(&self) -> Vec<ParameterPart> {
        self.parameters
            .iter()
            .map(|typ| ParameterPart {
                typ: typ.clone(),
                wide: typ.is_wide(),
            })
            .collect()
    }

    /// Number of local variable slots taken by the parameters (not counting
    /// the receiver).
    pub fn parameter_slots(&self) -> usize {
        self.parameters
            .iter()
            .map(|p| if p.is_wide() { 2 } else { 1 })
            .sum()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for parameter in &self.parameters {
            write!(f, "{}", parameter)?;
        }
        write!(f, ")")?;
        match &self.return_type {
            Some(typ) => write!(f, "{}", typ),
            None => write!(f, "V"),
        }
    }
}

fn invalid(descriptor: &str, reason: impl Into<String>) -> ClassFileError {
    ClassFileError::InvalidDescriptor {
        descriptor: descriptor.to_owned(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod field_type_tests {
    use super::*;

    #[test]
    fn it_should_parse_nested_arrays() {
        assert_eq!(
            FieldType::parse("[[Ljava/lang/String;").unwrap(),
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Object(
                "java/lang/String".into()
            )))))
        );
    }

    #[test]
    fn it_should_render_back_to_a_descriptor() {
        for d in ["I", "[J", "Ljava/lang/Object;", "[[Z"] {
            assert_eq!(FieldType::parse(d).unwrap().to_string(), d);
        }
    }

    #[test]
    fn it_should_reject_garbage() {
        assert!(FieldType::parse("Q").is_err());
        assert!(FieldType::parse("Ljava/lang/Object").is_err());
        assert!(FieldType::parse("II").is_err());
    }
}

#[cfg(test)]
mod method_descriptor_tests {
    use super::*;

    #[test]
    fn it_should_parse_parameters_and_return_type() {
        let d = MethodDescriptor::parse("(IJLjava/lang/String;[D)V").unwrap();
        assert_eq!(d.parameters.len(), 4);
        assert_eq!(d.return_type, None);
        assert_eq!(d.parameter_slots(), 5);
        assert_eq!(
            d.parameter_parts()
                .iter()
                .map(|p| p.wide)
                .collect::<Vec<_>>(),
            vec![false, true, false, false]
        );
    }

    #[test]
    fn it_should_parse_a_return_type() {
        let d = MethodDescriptor::parse("()Ljava/lang/Object;").unwrap();
        assert_eq!(
            d.return_type,
            Some(FieldType::Object("java/lang/Object".into()))
        );
        assert_eq!(d.to_string(), "()Ljava/lang/Object;");
    }

    #[test]
    fn it_should_reject_unterminated_parameter_lists() {
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("()VV").is_err());
    }
}

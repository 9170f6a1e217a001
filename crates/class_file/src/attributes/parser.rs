use std::rc::Rc;

use log::{trace, warn};

use crate::{
    attributes::*,
    codec::Reader,
    constant_pool::{Constant, MethodHandle},
    AccessFlags, Attribute, ClassFileError, ConstantPool, Result,
};

/// Decode one raw attribute into its typed form.
///
/// Unknown attributes are returned as [`AttributeInfo::Unknown`]. Known
/// attributes that fail to parse are a hard error when listed in
/// [`REQUIRED_ATTRIBUTES`], and are otherwise kept as `Unknown`.
pub fn parse_attribute(attribute: &Attribute, pool: &ConstantPool) -> Result<AttributeInfo> {
    let name = pool.utf8(attribute.attribute_name_index)?;
    let mut parser = AttributeParser {
        r: Reader::new(&attribute.info),
        pool,
    };

    let parsed = match parser.parse_named(&name) {
        Some(parsed) => parsed.and_then(|info| parser.finish(info)),
        None => {
            trace!("Keeping unknown attribute {}", name);
            return Ok(AttributeInfo::Unknown {
                name,
                info: attribute.info.clone(),
            });
        }
    };

    match parsed {
        Ok(info) => Ok(info),
        Err(e) if REQUIRED_ATTRIBUTES.contains(&&*name) => Err(ClassFileError::RequiredAttribute {
            name: name.to_string(),
            source: Box::new(e),
        }),
        Err(e) => {
            warn!("Keeping unparseable {} attribute as raw bytes: {}", name, e);
            Ok(AttributeInfo::Unknown {
                name,
                info: attribute.info.clone(),
            })
        }
    }
}

struct AttributeParser<'a> {
    r: Reader<'a>,
    pool: &'a ConstantPool,
}

impl<'a> AttributeParser<'a> {
    fn parse_named(&mut self, name: &str) -> Option<Result<AttributeInfo>> {
        let parsed = match name {
            "ConstantValue" => self.parse_constant_value(),
            "Code" => self.parse_code().map(AttributeInfo::Code),
            "StackMapTable" => self.parse_stack_map_table(),
            "Exceptions" => self.parse_class_list().map(AttributeInfo::Exceptions),
            "InnerClasses" => self.parse_inner_classes(),
            "EnclosingMethod" => self.parse_enclosing_method(),
            "Synthetic" => Ok(AttributeInfo::Synthetic),
            "Deprecated" => Ok(AttributeInfo::Deprecated),
            "Signature" => self.read_utf8().map(AttributeInfo::Signature),
            "SourceFile" => self.read_utf8().map(AttributeInfo::SourceFile),
            "LineNumberTable" => self.parse_line_numbers(),
            "LocalVariableTable" => self.parse_local_variables(),
            "RuntimeVisibleAnnotations" => self
                .parse_annotations()
                .map(AttributeInfo::RuntimeVisibleAnnotations),
            "RuntimeInvisibleAnnotations" => self
                .parse_annotations()
                .map(AttributeInfo::RuntimeInvisibleAnnotations),
            "BootstrapMethods" => self.parse_bootstrap_methods(),
            "NestHost" => self.read_class().map(AttributeInfo::NestHost),
            "NestMembers" => self.parse_class_list().map(AttributeInfo::NestMembers),
            _ => return None,
        };
        Some(parsed)
    }

    fn finish(&self, info: AttributeInfo) -> Result<AttributeInfo> {
        if !self.r.is_empty() {
            return Err(ClassFileError::InvalidAttribute {
                name: "attribute",
                reason: format!("{} unread bytes", self.r.remaining()),
            });
        }
        Ok(info)
    }

    fn parse_constant_value(&mut self) -> Result<AttributeInfo> {
        let index = self.r.read_u2()?;
        match self.pool.get(index)? {
            c @ (Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_)
            | Constant::String(_)) => Ok(AttributeInfo::ConstantValue(c.clone())),
            c => Err(ClassFileError::InvalidAttribute {
                name: "ConstantValue",
                reason: format!("{} entry is not a field constant", c.kind()),
            }),
        }
    }

    fn parse_code(&mut self) -> Result<CodeAttribute> {
        let max_stack = self.r.read_u2()?;
        let max_locals = self.r.read_u2()?;
        let code_length = self.r.read_u4()? as usize;
        if code_length == 0 {
            return Err(ClassFileError::InvalidAttribute {
                name: "Code",
                reason: "empty code array".into(),
            });
        }
        let code = self.r.read_bytes(code_length)?;
        let exception_table_length = self.r.read_u2()?;
        let exception_table = (0..exception_table_length)
            .map(|_| self.parse_exception_table_entry())
            .collect::<Result<Vec<_>>>()?;
        let attributes = self.parse_nested_attributes()?;

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    fn parse_exception_table_entry(&mut self) -> Result<ExceptionTableEntry> {
        let start_pc = self.r.read_u2()?;
        let end_pc = self.r.read_u2()?;
        let handler_pc = self.r.read_u2()?;
        let catch_type = self.read_optional_class()?;

        Ok(ExceptionTableEntry {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        })
    }

    fn parse_nested_attributes(&mut self) -> Result<Vec<AttributeInfo>> {
        let count = self.r.read_u2()?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let attribute_name_index = self.r.read_u2()?;
            let length = self.r.read_u4()? as usize;
            let info = self.r.read_bytes(length)?;
            attributes.push(parse_attribute(
                &Attribute {
                    attribute_name_index,
                    info,
                },
                self.pool,
            )?);
        }
        Ok(attributes)
    }

    fn parse_stack_map_table(&mut self) -> Result<AttributeInfo> {
        let count = self.r.read_u2()?;
        let frames = (0..count)
            .map(|_| self.parse_stack_map_frame())
            .collect::<Result<Vec<_>>>()?;
        Ok(AttributeInfo::StackMapTable(frames))
    }

    fn parse_stack_map_frame(&mut self) -> Result<StackMapFrame> {
        let frame_type = self.r.read_u1()?;
        let frame = match frame_type {
            0..=63 => StackMapFrame::Same {
                offset_delta: frame_type as u16,
            },
            64..=127 => StackMapFrame::SameLocals1StackItem {
                offset_delta: frame_type as u16 - 64,
                stack: self.parse_verification_type()?,
            },
            247 => StackMapFrame::SameLocals1StackItem {
                offset_delta: self.r.read_u2()?,
                stack: self.parse_verification_type()?,
            },
            248..=250 => StackMapFrame::Chop {
                offset_delta: self.r.read_u2()?,
                chopped: 251 - frame_type,
            },
            251 => StackMapFrame::Same {
                offset_delta: self.r.read_u2()?,
            },
            252..=254 => {
                let offset_delta = self.r.read_u2()?;
                let locals = (0..frame_type - 251)
                    .map(|_| self.parse_verification_type())
                    .collect::<Result<Vec<_>>>()?;
                StackMapFrame::Append {
                    offset_delta,
                    locals,
                }
            }
            255 => {
                let offset_delta = self.r.read_u2()?;
                let locals_count = self.r.read_u2()?;
                let locals = (0..locals_count)
                    .map(|_| self.parse_verification_type())
                    .collect::<Result<Vec<_>>>()?;
                let stack_count = self.r.read_u2()?;
                let stack = (0..stack_count)
                    .map(|_| self.parse_verification_type())
                    .collect::<Result<Vec<_>>>()?;
                StackMapFrame::Full {
                    offset_delta,
                    locals,
                    stack,
                }
            }
            _ => return Err(ClassFileError::InvalidFrameType(frame_type)),
        };
        Ok(frame)
    }

    fn parse_verification_type(&mut self) -> Result<VerificationType> {
        let tag = self.r.read_u1()?;
        let typ = match tag {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(self.read_class()?),
            8 => VerificationType::Uninitialized(self.r.read_u2()?),
            _ => return Err(ClassFileError::InvalidVerificationType(tag)),
        };
        Ok(typ)
    }

    fn parse_class_list(&mut self) -> Result<Vec<Rc<str>>> {
        let count = self.r.read_u2()?;
        (0..count).map(|_| self.read_class()).collect()
    }

    fn parse_inner_classes(&mut self) -> Result<AttributeInfo> {
        let count = self.r.read_u2()?;
        let mut classes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let inner_class = self.read_class()?;
            let outer_class = self.read_optional_class()?;
            let inner_name = match self.r.read_u2()? {
                0 => None,
                index => Some(self.pool.utf8(index)?),
            };
            let access_flags = AccessFlags::from_bits_truncate(self.r.read_u2()?);
            classes.push(InnerClass {
                inner_class,
                outer_class,
                inner_name,
                access_flags,
            });
        }
        Ok(AttributeInfo::InnerClasses(classes))
    }

    fn parse_enclosing_method(&mut self) -> Result<AttributeInfo> {
        let class = self.read_class()?;
        let method = match self.r.read_u2()? {
            0 => None,
            index => match self.pool.get(index)? {
                Constant::NameAndType(nat) => Some(nat.clone()),
                c => {
                    return Err(ClassFileError::InvalidAttribute {
                        name: "EnclosingMethod",
                        reason: format!("expected NameAndType, found {}", c.kind()),
                    })
                }
            },
        };
        Ok(AttributeInfo::EnclosingMethod(EnclosingMethod { class, method }))
    }

    fn parse_line_numbers(&mut self) -> Result<AttributeInfo> {
        let count = self.r.read_u2()?;
        let mut lines = Vec::with_capacity(count as usize);
        for _ in 0..count {
            lines.push(LineNumber {
                start_pc: self.r.read_u2()?,
                line_number: self.r.read_u2()?,
            });
        }
        Ok(AttributeInfo::LineNumberTable(lines))
    }

    fn parse_local_variables(&mut self) -> Result<AttributeInfo> {
        let count = self.r.read_u2()?;
        let mut variables = Vec::with_capacity(count as usize);
        for _ in 0..count {
            variables.push(LocalVariable {
                start_pc: self.r.read_u2()?,
                length: self.r.read_u2()?,
                name: self.read_utf8()?,
                descriptor: self.read_utf8()?,
                index: self.r.read_u2()?,
            });
        }
        Ok(AttributeInfo::LocalVariableTable(variables))
    }

    fn parse_annotations(&mut self) -> Result<Vec<Annotation>> {
        let count = self.r.read_u2()?;
        (0..count).map(|_| self.parse_annotation()).collect()
    }

    fn parse_annotation(&mut self) -> Result<Annotation> {
        let type_name = self.read_utf8()?;
        let count = self.r.read_u2()?;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = self.read_utf8()?;
            let value = self.parse_element_value()?;
            elements.push(ElementValuePair { name, value });
        }
        Ok(Annotation {
            type_name,
            elements,
        })
    }

    fn parse_element_value(&mut self) -> Result<ElementValue> {
        let tag = self.r.read_u1()? as char;
        let value = match tag {
            'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => {
                let index = self.r.read_u2()?;
                ElementValue::Const(tag, self.pool.get(index)?.clone())
            }
            's' => {
                // String element values point straight at a Utf8 entry
                let index = self.r.read_u2()?;
                ElementValue::Const(tag, Constant::String(self.pool.utf8(index)?))
            }
            'e' => ElementValue::Enum {
                type_name: self.read_utf8()?,
                const_name: self.read_utf8()?,
            },
            'c' => ElementValue::Class(self.read_utf8()?),
            '@' => ElementValue::Annotation(self.parse_annotation()?),
            '[' => {
                let count = self.r.read_u2()?;
                ElementValue::Array(
                    (0..count)
                        .map(|_| self.parse_element_value())
                        .collect::<Result<Vec<_>>>()?,
                )
            }
            _ => return Err(ClassFileError::InvalidElementValueTag(tag)),
        };
        Ok(value)
    }

    fn parse_bootstrap_methods(&mut self) -> Result<AttributeInfo> {
        let count = self.r.read_u2()?;
        let mut methods = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let method = self.read_method_handle()?;
            let argument_count = self.r.read_u2()?;
            let arguments = (0..argument_count)
                .map(|_| -> Result<Constant> {
                    let index = self.r.read_u2()?;
                    let argument = self.pool.get(index)?;
                    if !argument.is_loadable() {
                        return Err(ClassFileError::InvalidAttribute {
                            name: "BootstrapMethods",
                            reason: format!("{} entry is not a loadable constant", argument.kind()),
                        });
                    }
                    Ok(argument.clone())
                })
                .collect::<Result<Vec<_>>>()?;
            methods.push(BootstrapMethod { method, arguments });
        }
        Ok(AttributeInfo::BootstrapMethods(methods))
    }

    fn read_method_handle(&mut self) -> Result<Rc<MethodHandle>> {
        let index = self.r.read_u2()?;
        match self.pool.get(index)? {
            Constant::MethodHandle(handle) => Ok(handle.clone()),
            c => Err(ClassFileError::InvalidAttribute {
                name: "BootstrapMethods",
                reason: format!("expected MethodHandle, found {}", c.kind()),
            }),
        }
    }

    fn read_utf8(&mut self) -> Result<Rc<str>> {
        let index = self.r.read_u2()?;
        self.pool.utf8(index)
    }

    fn read_class(&mut self) -> Result<Rc<str>> {
        let index = self.r.read_u2()?;
        self.pool.class_name(index)
    }

    fn read_optional_class(&mut self) -> Result<Option<Rc<str>>> {
        match self.r.read_u2()? {
            0 => Ok(None),
            index => self.pool.class_name(index).map(Some),
        }
    }
}

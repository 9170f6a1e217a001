use crate::{
    attributes::Attributes,
    class_file::{FieldInfo, MethodInfo},
    codec::{self, Reader},
    constant_pool::{self, CpInfo},
    *,
};

pub struct Parser<'a> {
    r: Reader<'a>,
}
impl<'a> Parser<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            r: Reader::new(bytes),
        }
    }

    pub fn parse(&mut self) -> Result<ClassFile> {
        self.parse_magic_identifier()?;
        let (major_version, minor_version) = self.parse_version()?;

        let constant_pool = self.parse_constant_pool()?;
        let access_flags = AccessFlags::from_bits_truncate(self.r.read_u2()?);
        let this_class = self.r.read_u2()?;
        let super_class = self.r.read_u2()?;
        let interfaces_count = self.r.read_u2()?;
        let interfaces = self.r.read_u2_vec(interfaces_count as usize)?;

        let fields_count = self.r.read_u2()?;
        let fields = (0..fields_count)
            .map(|_| self.parse_field_info())
            .collect::<Result<Vec<_>>>()?;

        let methods_count = self.r.read_u2()?;
        let methods = (0..methods_count)
            .map(|_| self.parse_method_info())
            .collect::<Result<Vec<_>>>()?;

        let attributes = self.parse_attributes()?;

        if !self.r.is_empty() {
            return Err(ClassFileError::TrailingBytes(self.r.remaining()));
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn parse_field_info(&mut self) -> Result<FieldInfo> {
        let access_flags = AccessFlags::from_bits_truncate(self.r.read_u2()?);
        let name_index = self.r.read_u2()?;
        let descriptor_index = self.r.read_u2()?;
        let attributes = self.parse_attributes()?;

        Ok(FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    fn parse_method_info(&mut self) -> Result<MethodInfo> {
        let access_flags = AccessFlags::from_bits_truncate(self.r.read_u2()?);
        let name_index = self.r.read_u2()?;
        let descriptor_index = self.r.read_u2()?;
        let attributes = self.parse_attributes()?;

        Ok(MethodInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    fn parse_magic_identifier(&mut self) -> Result<()> {
        match self.r.read_u4()? {
            0xCAFEBABE => Ok(()),
            magic_identifier => Err(ClassFileError::InvalidMagicIdentifier(magic_identifier)),
        }
    }

    fn parse_version(&mut self) -> Result<(u16, u16)> {
        let minor = self.r.read_u2()?;
        let major = self.r.read_u2()?;
        Ok((major, minor))
    }

    fn parse_constant_pool(&mut self) -> Result<ConstantPool> {
        let constant_pool_count = self.r.read_u2()?;

        let mut count = (constant_pool_count as usize).saturating_sub(1);
        let mut res = Vec::with_capacity(count);
        while count > 0 {
            let index = res.len() as u16 + 1;
            let (cp_info, slot_size) = self.parse_cp_info(index)?;
            if slot_size > count {
                // A long or double in the last slot would spill past the pool
                return Err(ClassFileError::InvalidConstantPoolIndex {
                    index: index + 1,
                    len: constant_pool_count as usize - 1,
                });
            }
            res.push(cp_info);
            (0..slot_size - 1).for_each(|_| res.push(CpInfo::Unusable));

            count -= slot_size;
        }
        ConstantPool::new(res)
    }

    fn parse_cp_info(&mut self, index: u16) -> Result<(CpInfo, usize)> {
        let tag = self.r.read_u1()?;
        let (cp_info, slot_size) = match tag {
            1 => (self.parse_utf8()?, 1),
            3 => (CpInfo::Integer(self.r.read_i4()?), 1),
            4 => (CpInfo::Float(self.r.read_f4()?), 1),
            5 => (CpInfo::Long(self.r.read_i8()?), 2),
            6 => (CpInfo::Double(self.r.read_f8()?), 2),
            7 => (self.parse_class_info()?, 1),
            8 => (self.parse_string()?, 1),
            9 => (CpInfo::FieldRef(self.parse_ref_info()?), 1),
            10 => (CpInfo::MethodRef(self.parse_ref_info()?), 1),
            11 => (CpInfo::InterfaceMethodRef(self.parse_ref_info()?), 1),
            12 => (self.parse_name_and_type_info()?, 1),
            15 => (self.parse_method_handle()?, 1),
            16 => (self.parse_method_type_info()?, 1),
            17 => (CpInfo::Dynamic(self.parse_invoke_dynamic_info()?), 1),
            18 => (CpInfo::InvokeDynamic(self.parse_invoke_dynamic_info()?), 1),
            19 => (
                CpInfo::Module {
                    name_index: self.r.read_u2()?,
                },
                1,
            ),
            20 => (
                CpInfo::Package {
                    name_index: self.r.read_u2()?,
                },
                1,
            ),
            _ => return Err(ClassFileError::InvalidCpInfoTag { tag, index }),
        };

        Ok((cp_info, slot_size))
    }

    fn parse_utf8(&mut self) -> Result<CpInfo> {
        let length = self.r.read_u2()?;
        let bytes = self.r.read_bytes(length as usize)?;

        Ok(CpInfo::Utf8(codec::decode_modified_utf8(&bytes)))
    }

    fn parse_class_info(&mut self) -> Result<CpInfo> {
        let name_index = self.r.read_u2()?;

        Ok(CpInfo::Class(constant_pool::ClassInfo { name_index }))
    }

    fn parse_string(&mut self) -> Result<CpInfo> {
        let string_index = self.r.read_u2()?;

        Ok(CpInfo::String { string_index })
    }

    fn parse_name_and_type_info(&mut self) -> Result<CpInfo> {
        let name_index = self.r.read_u2()?;
        let descriptor_index = self.r.read_u2()?;

        Ok(CpInfo::NameAndType(constant_pool::NameAndTypeInfo {
            name_index,
            descriptor_index,
        }))
    }

    fn parse_method_handle(&mut self) -> Result<CpInfo> {
        let reference_kind = self.r.read_u1()?;
        let reference_index = self.r.read_u2()?;

        Ok(CpInfo::MethodHandle(constant_pool::MethodHandleInfo {
            reference_kind,
            reference_index,
        }))
    }

    fn parse_method_type_info(&mut self) -> Result<CpInfo> {
        let descriptor_index = self.r.read_u2()?;

        Ok(CpInfo::MethodType(constant_pool::MethodTypeInfo {
            descriptor_index,
        }))
    }

    fn parse_invoke_dynamic_info(&mut self) -> Result<constant_pool::InvokeDynamicInfo> {
        let bootstrap_method_attr_index = self.r.read_u2()?;
        let name_and_type_index = self.r.read_u2()?;

        Ok(constant_pool::InvokeDynamicInfo {
            bootstrap_method_attr_index,
            name_and_type_index,
        })
    }

    fn parse_ref_info(&mut self) -> Result<constant_pool::RefInfo> {
        let class_index = self.r.read_u2()?;
        let name_and_type_index = self.r.read_u2()?;

        Ok(constant_pool::RefInfo {
            class_index,
            name_and_type_index,
        })
    }

    fn parse_attribute(&mut self) -> Result<Attribute> {
        let attribute_name_index = self.r.read_u2()?;
        let attribute_length = self.r.read_u4()?;
        let info = self.r.read_bytes(attribute_length as usize)?;

        Ok(Attribute {
            attribute_name_index,
            info,
        })
    }

    fn parse_attributes(&mut self) -> Result<Attributes> {
        let attributes_count = self.r.read_u2()?;
        (0..attributes_count)
            .map(|_| self.parse_attribute())
            .collect::<Result<Vec<_>>>()
            .map(Attributes)
    }
}

#[cfg(test)]
mod parse_magic_identifier_tests {
    use super::*;

    #[test]
    fn it_should_be_able_to_parse_the_correct_identifier() {
        assert!(Parser::new(&[0xca, 0xfe, 0xba, 0xbe])
            .parse_magic_identifier()
            .is_ok());
    }

    #[test]
    fn it_should_fail_if_there_is_not_enough_data() {
        assert!(Parser::new(&[0xca, 0xfe, 0xba])
            .parse_magic_identifier()
            .is_err());
    }

    #[test]
    fn it_should_fail_if_the_magic_identifier_is_incorrect() {
        assert!(matches!(
            Parser::new(&[0xca, 0xfe, 0xda, 0xda]).parse_magic_identifier(),
            Err(ClassFileError::InvalidMagicIdentifier(0xCAFEDADA))
        ));
    }
}

#[cfg(test)]
mod parse_version_tests {
    use super::*;

    #[test]
    fn it_should_be_able_to_parse_a_version() {
        assert_eq!(
            Parser::new(&[0x00, 0x03, 0x00, 0x34]).parse_version().unwrap(),
            (0x34, 0x03)
        );
    }
}

#[cfg(test)]
mod parse_constant_pool_tests {
    use super::*;

    #[test]
    fn it_should_give_wide_entries_two_slots() {
        let bytes = [
            0x00, 0x05, // count = 4 slots + 1
            0x05, 0, 0, 0, 0, 0, 0, 0, 9, // long 9
            0x06, 0x3f, 0xf0, 0, 0, 0, 0, 0, 0, // double 1.0
        ];
        let pool = Parser::new(&bytes).parse_constant_pool().unwrap();
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.get(1).unwrap(), &constant_pool::Constant::Long(9));
        assert_eq!(pool.info(2).unwrap(), &CpInfo::Unusable);
        assert_eq!(pool.get(3).unwrap(), &constant_pool::Constant::Double(1.0));
    }

    #[test]
    fn it_should_reject_unknown_tags() {
        let bytes = [0x00, 0x02, 0x02, 0x00];
        assert!(matches!(
            Parser::new(&bytes).parse_constant_pool(),
            Err(ClassFileError::InvalidCpInfoTag { tag: 2, index: 1 })
        ));
    }

    #[test]
    fn it_should_reject_a_wide_entry_in_the_last_slot() {
        let bytes = [0x00, 0x02, 0x05, 0, 0, 0, 0, 0, 0, 0, 9];
        assert!(Parser::new(&bytes).parse_constant_pool().is_err());
    }
}

use std::{fmt, rc::Rc};

use crate::{ClassFileError, Result};

/// The constant pool of a class file.
///
/// Entries are kept twice: as the raw [`CpInfo`] records read from the file
/// (index chains) and as linked [`Constant`] trees in which every index has
/// been replaced by the entry it points to. Indices are 1-based; `Long` and
/// `Double` entries are followed by an [`CpInfo::Unusable`] tombstone.
#[derive(Debug, Default)]
pub struct ConstantPool {
    cp_infos: Vec<CpInfo>,
    linked: Vec<Option<Constant>>,
    is_linked: bool,
}
impl ConstantPool {
    /// Build a pool from raw entries and link it.
    pub fn new(cp_infos: Vec<CpInfo>) -> Result<Self> {
        let mut pool = Self {
            cp_infos,
            linked: Vec::new(),
            is_linked: false,
        };
        pool.link()?;
        Ok(pool)
    }

    /// Number of slots, tombstones included. Valid indices are `1..=len()`.
    pub fn len(&self) -> usize {
        self.cp_infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cp_infos.is_empty()
    }

    /// Raw entry at `index`.
    pub fn info(&self, index: u16) -> Result<&CpInfo> {
        if index == 0 || index as usize > self.cp_infos.len() {
            return Err(ClassFileError::InvalidConstantPoolIndex {
                index,
                len: self.cp_infos.len(),
            });
        }
        Ok(&self.cp_infos[index as usize - 1])
    }

    /// Linked entry at `index`.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        let info = self.info(index)?;
        self.linked
            .get(index as usize - 1)
            .and_then(Option::as_ref)
            .ok_or_else(|| ClassFileError::UnexpectedConstantPoolEntry("linked entry", info.clone()))
    }

    pub fn utf8(&self, index: u16) -> Result<Rc<str>> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s.clone()),
            _ => Err(self.unexpected("Utf8", index)),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<Rc<str>> {
        match self.get(index)? {
            Constant::Class(s) => Ok(s.clone()),
            _ => Err(self.unexpected("Class", index)),
        }
    }

    pub fn member_ref(&self, index: u16) -> Result<Rc<MemberRef>> {
        match self.get(index)? {
            Constant::FieldRef(r) | Constant::MethodRef(r) | Constant::InterfaceMethodRef(r) => {
                Ok(r.clone())
            }
            _ => Err(self.unexpected("member reference", index)),
        }
    }

    /// Iterate over the linked entries together with their 1-based index,
    /// skipping tombstones.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.linked
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i as u16 + 1, c)))
    }

    /// Replace every raw index with a reference to the linked entry it
    /// points at. Running this again on a linked pool does nothing.
    pub fn link(&mut self) -> Result<()> {
        if self.is_linked {
            return Ok(());
        }

        let mut linker = Linker {
            pool: self,
            linked: vec![None; self.cp_infos.len()],
            visiting: vec![false; self.cp_infos.len()],
        };
        for index in 1..=self.cp_infos.len() as u16 {
            if !matches!(self.cp_infos[index as usize - 1], CpInfo::Unusable) {
                linker.link_entry(index)?;
            }
        }

        let linked = linker.linked;
        self.linked = linked;
        self.is_linked = true;
        Ok(())
    }

    fn unexpected(&self, expected: &'static str, index: u16) -> ClassFileError {
        match self.info(index) {
            Ok(info) => ClassFileError::UnexpectedConstantPoolEntry(expected, info.clone()),
            Err(e) => e,
        }
    }
}

struct Linker<'a> {
    pool: &'a ConstantPool,
    linked: Vec<Option<Constant>>,
    visiting: Vec<bool>,
}

impl Linker<'_> {
    fn link_entry(&mut self, index: u16) -> Result<Constant> {
        let pool = self.pool;
        let info = pool.info(index)?;
        let slot = index as usize - 1;
        if let Some(constant) = &self.linked[slot] {
            return Ok(constant.clone());
        }
        if self.visiting[slot] {
            return Err(ClassFileError::ConstantPoolCycle(index));
        }
        self.visiting[slot] = true;

        let constant = match info {
            CpInfo::Utf8(s) => Constant::Utf8(Rc::from(s.as_str())),
            CpInfo::Integer(i) => Constant::Integer(*i),
            CpInfo::Float(f) => Constant::Float(*f),
            CpInfo::Long(l) => Constant::Long(*l),
            CpInfo::Double(d) => Constant::Double(*d),
            CpInfo::Class(ClassInfo { name_index }) => Constant::Class(self.utf8(*name_index)?),
            CpInfo::String { string_index } => Constant::String(self.utf8(*string_index)?),
            CpInfo::FieldRef(r) => Constant::FieldRef(self.member_ref(r)?),
            CpInfo::MethodRef(r) => Constant::MethodRef(self.member_ref(r)?),
            CpInfo::InterfaceMethodRef(r) => Constant::InterfaceMethodRef(self.member_ref(r)?),
            CpInfo::NameAndType(nat) => Constant::NameAndType(Rc::new(NameAndType {
                name: self.utf8(nat.name_index)?,
                descriptor: self.utf8(nat.descriptor_index)?,
            })),
            CpInfo::MethodHandle(MethodHandleInfo {
                reference_kind,
                reference_index,
            }) => {
                let kind = ReferenceKind::try_from(*reference_kind).map_err(|_| {
                    ClassFileError::UnexpectedConstantPoolEntry("reference kind", info.clone())
                })?;
                let (reference, is_interface) = match self.link_entry(*reference_index)? {
                    Constant::FieldRef(r) | Constant::MethodRef(r) => (r, false),
                    Constant::InterfaceMethodRef(r) => (r, true),
                    _ => {
                        return Err(self.unexpected("member reference", *reference_index));
                    }
                };
                Constant::MethodHandle(Rc::new(MethodHandle {
                    kind,
                    reference,
                    is_interface,
                }))
            }
            CpInfo::MethodType(MethodTypeInfo { descriptor_index }) => {
                Constant::MethodType(self.utf8(*descriptor_index)?)
            }
            CpInfo::Dynamic(info) => Constant::Dynamic(self.dynamic_ref(info)?),
            CpInfo::InvokeDynamic(info) => Constant::InvokeDynamic(self.dynamic_ref(info)?),
            CpInfo::Module { name_index } => Constant::Module(self.utf8(*name_index)?),
            CpInfo::Package { name_index } => Constant::Package(self.utf8(*name_index)?),
            CpInfo::Unusable => {
                return Err(ClassFileError::UnexpectedConstantPoolEntry(
                    "usable entry",
                    CpInfo::Unusable,
                ))
            }
        };

        self.visiting[slot] = false;
        self.linked[slot] = Some(constant.clone());
        Ok(constant)
    }

    fn utf8(&mut self, index: u16) -> Result<Rc<str>> {
        match self.link_entry(index)? {
            Constant::Utf8(s) => Ok(s),
            _ => Err(self.unexpected("Utf8", index)),
        }
    }

    fn name_and_type(&mut self, index: u16) -> Result<Rc<NameAndType>> {
        match self.link_entry(index)? {
            Constant::NameAndType(nat) => Ok(nat),
            _ => Err(self.unexpected("NameAndType", index)),
        }
    }

    fn member_ref(&mut self, r: &RefInfo) -> Result<Rc<MemberRef>> {
        let class = match self.link_entry(r.class_index)? {
            Constant::Class(name) => name,
            _ => return Err(self.unexpected("Class", r.class_index)),
        };
        let nat = self.name_and_type(r.name_and_type_index)?;

        Ok(Rc::new(MemberRef {
            class,
            name: nat.name.clone(),
            descriptor: nat.descriptor.clone(),
        }))
    }

    fn dynamic_ref(&mut self, info: &InvokeDynamicInfo) -> Result<Rc<DynamicRef>> {
        let nat = self.name_and_type(info.name_and_type_index)?;

        Ok(Rc::new(DynamicRef {
            bootstrap_method_attr_index: info.bootstrap_method_attr_index,
            name: nat.name.clone(),
            descriptor: nat.descriptor.clone(),
        }))
    }

    fn unexpected(&self, expected: &'static str, index: u16) -> ClassFileError {
        self.pool.unexpected(expected, index)
    }
}

#[macro_export]
macro_rules! matches_cp_info {
    ($cp:expr, $index:expr, $i:ident) => {
        match $cp.info($index)? {
            $crate::constant_pool::CpInfo::$i(ref n) => Ok(n),
            c => Err($crate::ClassFileError::UnexpectedConstantPoolEntry(
                stringify!($i),
                c.clone(),
            )),
        }
    };
}

#[derive(Debug, PartialEq, Clone)]
pub enum CpInfo {
    MethodRef(RefInfo),
    FieldRef(RefInfo),
    Float(f32),
    InterfaceMethodRef(RefInfo),
    Class(ClassInfo),
    NameAndType(NameAndTypeInfo),
    Utf8(String),
    String { string_index: u16 },
    Dynamic(InvokeDynamicInfo),
    InvokeDynamic(InvokeDynamicInfo),
    Integer(i32),
    MethodHandle(MethodHandleInfo),
    MethodType(MethodTypeInfo),
    Long(i64),
    Double(f64),
    Module { name_index: u16 },
    Package { name_index: u16 },
    Unusable,
}

#[derive(Debug, PartialEq, Clone)]
pub struct RefInfo {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ClassInfo {
    // The constant_pool entry at name_index must be a CONSTANT_Utf8_info structure
    // representing a valid binary class or interface name encoded in internal form.
    pub name_index: u16,
}

#[derive(Debug, PartialEq, Clone)]
pub struct NameAndTypeInfo {
    pub name_index: u16,
    pub descriptor_index: u16,
}

#[derive(Debug, PartialEq, Clone)]
pub struct InvokeDynamicInfo {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Debug, PartialEq, Clone)]
pub struct MethodHandleInfo {
    pub reference_kind: u8,
    pub reference_index: u16,
}

#[derive(Debug, PartialEq, Clone)]
pub struct MethodTypeInfo {
    pub descriptor_index: u16,
}

/// A linked constant-pool entry.
#[derive(Debug, PartialEq, Clone)]
pub enum Constant {
    Utf8(Rc<str>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    /// Class reference, holding the internal (slash separated) name.
    Class(Rc<str>),
    String(Rc<str>),
    FieldRef(Rc<MemberRef>),
    MethodRef(Rc<MemberRef>),
    InterfaceMethodRef(Rc<MemberRef>),
    NameAndType(Rc<NameAndType>),
    MethodHandle(Rc<MethodHandle>),
    /// Method type, holding the method descriptor.
    MethodType(Rc<str>),
    Dynamic(Rc<DynamicRef>),
    InvokeDynamic(Rc<DynamicRef>),
    Module(Rc<str>),
    Package(Rc<str>),
}

impl Constant {
    /// Entries that `ldc`, `ldc_w` and `ldc2_w` may push.
    pub fn is_loadable(&self) -> bool {
        matches!(
            self,
            Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_)
                | Constant::Class(_)
                | Constant::String(_)
                | Constant::MethodHandle(_)
                | Constant::MethodType(_)
                | Constant::Dynamic(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Constant::Utf8(_) => "Utf8",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::Class(_) => "Class",
            Constant::String(_) => "String",
            Constant::FieldRef(_) => "Fieldref",
            Constant::MethodRef(_) => "Methodref",
            Constant::InterfaceMethodRef(_) => "InterfaceMethodref",
            Constant::NameAndType(_) => "NameAndType",
            Constant::MethodHandle(_) => "MethodHandle",
            Constant::MethodType(_) => "MethodType",
            Constant::Dynamic(_) => "Dynamic",
            Constant::InvokeDynamic(_) => "InvokeDynamic",
            Constant::Module(_) => "Module",
            Constant::Package(_) => "Package",
        }
    }
}

/// Field or method reference with every index resolved.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct MemberRef {
    pub class: Rc<str>,
    pub name: Rc<str>,
    pub descriptor: Rc<str>,
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descriptor.starts_with('(') {
            write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
        } else {
            write!(f, "{}.{}:{}", self.class, self.name, self.descriptor)
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NameAndType {
    pub name: Rc<str>,
    pub descriptor: Rc<str>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReferenceKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl TryFrom<u8> for ReferenceKind {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(ReferenceKind::GetField),
            2 => Ok(ReferenceKind::GetStatic),
            3 => Ok(ReferenceKind::PutField),
            4 => Ok(ReferenceKind::PutStatic),
            5 => Ok(ReferenceKind::InvokeVirtual),
            6 => Ok(ReferenceKind::InvokeStatic),
            7 => Ok(ReferenceKind::InvokeSpecial),
            8 => Ok(ReferenceKind::NewInvokeSpecial),
            9 => Ok(ReferenceKind::InvokeInterface),
            _ => Err(value),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MethodHandle {
    pub kind: ReferenceKind,
    pub reference: Rc<MemberRef>,
    pub is_interface: bool,
}

/// `CONSTANT_Dynamic` / `CONSTANT_InvokeDynamic` with the name and type
/// resolved. The bootstrap method stays an index into the class's
/// `BootstrapMethods` attribute.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DynamicRef {
    pub bootstrap_method_attr_index: u16,
    pub name: Rc<str>,
    pub descriptor: Rc<str>,
}

#[cfg(test)]
mod link_tests {
    use super::*;

    fn method_pool() -> Vec<CpInfo> {
        vec![
            // 1: Methodref -> 2, 4 (forward references)
            CpInfo::MethodRef(RefInfo {
                class_index: 2,
                name_and_type_index: 4,
            }),
            CpInfo::Class(ClassInfo { name_index: 3 }),
            CpInfo::Utf8("my/MyClass".into()),
            CpInfo::NameAndType(NameAndTypeInfo {
                name_index: 5,
                descriptor_index: 6,
            }),
            CpInfo::Utf8("add".into()),
            CpInfo::Utf8("(I)F".into()),
            CpInfo::Long(1 << 40),
            CpInfo::Unusable,
            CpInfo::Integer(7),
        ]
    }

    #[test]
    fn it_should_link_member_refs_into_trees() {
        let pool = ConstantPool::new(method_pool()).unwrap();
        assert_eq!(
            pool.member_ref(1).unwrap().as_ref(),
            &MemberRef {
                class: "my/MyClass".into(),
                name: "add".into(),
                descriptor: "(I)F".into(),
            }
        );
        assert_eq!(pool.class_name(2).unwrap().as_ref(), "my/MyClass");
    }

    #[test]
    fn it_should_keep_wide_entries_in_two_slots() {
        let pool = ConstantPool::new(method_pool()).unwrap();
        assert_eq!(pool.len(), 9);
        assert_eq!(pool.get(7).unwrap(), &Constant::Long(1 << 40));
        assert!(pool.get(8).is_err());
        assert_eq!(pool.get(9).unwrap(), &Constant::Integer(7));
        assert_eq!(pool.iter().count(), 8);
    }

    #[test]
    fn it_should_be_idempotent() {
        let mut pool = ConstantPool::new(method_pool()).unwrap();
        let before = pool.iter().map(|(i, c)| (i, c.clone())).collect::<Vec<_>>();
        pool.link().unwrap();
        let after = pool.iter().map(|(i, c)| (i, c.clone())).collect::<Vec<_>>();
        assert_eq!(before, after);
    }

    #[test]
    fn it_should_fail_on_out_of_range_indices() {
        let result = ConstantPool::new(vec![CpInfo::Class(ClassInfo { name_index: 9 })]);
        assert!(matches!(
            result,
            Err(ClassFileError::InvalidConstantPoolIndex { index: 9, len: 1 })
        ));
    }

    #[test]
    fn it_should_fail_on_wrong_entry_kinds() {
        let result = ConstantPool::new(vec![
            CpInfo::Class(ClassInfo { name_index: 2 }),
            CpInfo::Integer(3),
        ]);
        assert!(matches!(
            result,
            Err(ClassFileError::UnexpectedConstantPoolEntry("Utf8", CpInfo::Integer(3)))
        ));
    }

    #[test]
    fn it_should_detect_cycles() {
        let result = ConstantPool::new(vec![CpInfo::MethodHandle(MethodHandleInfo {
            reference_kind: 6,
            reference_index: 1,
        })]);
        assert!(matches!(result, Err(ClassFileError::ConstantPoolCycle(1))));
    }

    #[test]
    fn it_should_reject_index_zero() {
        let pool = ConstantPool::new(method_pool()).unwrap();
        assert!(pool.get(0).is_err());
    }
}

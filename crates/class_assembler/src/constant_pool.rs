use std::{collections::HashMap, io};

use byteorder::{BigEndian, WriteBytesExt};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum Entry {
    Utf8(String),
    Integer(i32),
    /// Stored as bits so entries can be hashed
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    InvokeDynamic(u16, u16),
}

impl Entry {
    fn is_wide(&self) -> bool {
        matches!(self, Entry::Long(_) | Entry::Double(_))
    }
}

/// Constant pool under construction. Equal entries are only added once.
#[derive(Default, Debug)]
pub struct ConstantPoolBuilder {
    entries: Vec<Entry>,
    indices: HashMap<Entry, u16>,
    next_index: u16,
}

impl ConstantPoolBuilder {
    fn push(&mut self, entry: Entry) -> u16 {
        if let Some(index) = self.indices.get(&entry) {
            return *index;
        }
        if self.next_index == 0 {
            self.next_index = 1;
        }
        let index = self.next_index;
        self.next_index += if entry.is_wide() { 2 } else { 1 };
        self.indices.insert(entry.clone(), index);
        self.entries.push(entry);
        index
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        self.push(Entry::Utf8(s.to_owned()))
    }

    pub fn integer(&mut self, i: i32) -> u16 {
        self.push(Entry::Integer(i))
    }

    pub fn float(&mut self, f: f32) -> u16 {
        self.push(Entry::Float(f.to_bits()))
    }

    pub fn long(&mut self, l: i64) -> u16 {
        self.push(Entry::Long(l))
    }

    pub fn double(&mut self, d: f64) -> u16 {
        self.push(Entry::Double(d.to_bits()))
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.push(Entry::Class(name))
    }

    pub fn string(&mut self, s: &str) -> u16 {
        let s = self.utf8(s);
        self.push(Entry::String(s))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.push(Entry::NameAndType(name, descriptor))
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.push(Entry::FieldRef(class, nat))
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.push(Entry::MethodRef(class, nat))
    }

    pub fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.push(Entry::InterfaceMethodRef(class, nat))
    }

    /// `reference_index` must point at a field, method or interface method
    /// reference matching `kind` (1 to 9).
    pub fn method_handle(&mut self, kind: u8, reference_index: u16) -> u16 {
        self.push(Entry::MethodHandle(kind, reference_index))
    }

    pub fn method_type(&mut self, descriptor: &str) -> u16 {
        let descriptor = self.utf8(descriptor);
        self.push(Entry::MethodType(descriptor))
    }

    pub fn invoke_dynamic(&mut self, bootstrap_method: u16, name: &str, descriptor: &str) -> u16 {
        let nat = self.name_and_type(name, descriptor);
        self.push(Entry::InvokeDynamic(bootstrap_method, nat))
    }

    /// Value of `constant_pool_count`.
    pub fn count(&self) -> u16 {
        self.next_index.max(1)
    }

    pub(crate) fn serialize<W: WriteBytesExt>(&self, out: &mut W) -> io::Result<()> {
        out.write_u16::<BigEndian>(self.count())?;
        for entry in &self.entries {
            match entry {
                Entry::Utf8(s) => {
                    out.write_u8(1)?;
                    out.write_u16::<BigEndian>(s.len() as u16)?;
                    out.write_all(s.as_bytes())?;
                }
                Entry::Integer(i) => {
                    out.write_u8(3)?;
                    out.write_i32::<BigEndian>(*i)?;
                }
                Entry::Float(bits) => {
                    out.write_u8(4)?;
                    out.write_u32::<BigEndian>(*bits)?;
                }
                Entry::Long(l) => {
                    out.write_u8(5)?;
                    out.write_i64::<BigEndian>(*l)?;
                }
                Entry::Double(bits) => {
                    out.write_u8(6)?;
                    out.write_u64::<BigEndian>(*bits)?;
                }
                Entry::Class(name) => {
                    out.write_u8(7)?;
                    out.write_u16::<BigEndian>(*name)?;
                }
                Entry::String(s) => {
                    out.write_u8(8)?;
                    out.write_u16::<BigEndian>(*s)?;
                }
                Entry::FieldRef(class, nat) => {
                    out.write_u8(9)?;
                    out.write_u16::<BigEndian>(*class)?;
                    out.write_u16::<BigEndian>(*nat)?;
                }
                Entry::MethodRef(class, nat) => {
                    out.write_u8(10)?;
                    out.write_u16::<BigEndian>(*class)?;
                    out.write_u16::<BigEndian>(*nat)?;
                }
                Entry::InterfaceMethodRef(class, nat) => {
                    out.write_u8(11)?;
                    out.write_u16::<BigEndian>(*class)?;
                    out.write_u16::<BigEndian>(*nat)?;
                }
                Entry::NameAndType(name, descriptor) => {
                    out.write_u8(12)?;
                    out.write_u16::<BigEndian>(*name)?;
                    out.write_u16::<BigEndian>(*descriptor)?;
                }
                Entry::MethodHandle(kind, reference) => {
                    out.write_u8(15)?;
                    out.write_u8(*kind)?;
                    out.write_u16::<BigEndian>(*reference)?;
                }
                Entry::MethodType(descriptor) => {
                    out.write_u8(16)?;
                    out.write_u16::<BigEndian>(*descriptor)?;
                }
                Entry::InvokeDynamic(bootstrap_method, nat) => {
                    out.write_u8(18)?;
                    out.write_u16::<BigEndian>(*bootstrap_method)?;
                    out.write_u16::<BigEndian>(*nat)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod constant_pool_builder_tests {
    use super::*;

    #[test]
    fn it_should_deduplicate_entries() {
        let mut pool = ConstantPoolBuilder::default();
        let a = pool.method_ref("my/A", "m", "()V");
        let b = pool.method_ref("my/A", "m", "()V");
        assert_eq!(a, b);
        assert_eq!(pool.class("my/A"), pool.class("my/A"));
    }

    #[test]
    fn it_should_skip_a_slot_after_wide_entries() {
        let mut pool = ConstantPoolBuilder::default();
        assert_eq!(pool.long(1), 1);
        assert_eq!(pool.integer(2), 3);
        assert_eq!(pool.count(), 4);
    }
}

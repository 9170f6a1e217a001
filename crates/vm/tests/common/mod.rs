#![allow(dead_code)]

use std::{
    cell::RefCell,
    io::{self, Write},
    rc::Rc,
};

use just_class_assembler::{ClassAssembler, Code, ACC_PUBLIC, ACC_STATIC, ACC_SUPER};
use just_class_file::opcodes::*;
use just_vm::{MemorySource, Result, Value, Vm, VmOptions};

/// Output sink that stays readable after being handed to the VM.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn source(classes: Vec<(&str, Vec<u8>)>) -> MemorySource {
    let mut source = MemorySource::new();
    for (name, bytes) in classes {
        source.insert_class(name, bytes);
    }
    source
}

pub fn vm_with(classes: Vec<(&str, Vec<u8>)>) -> Vm {
    Vm::new(source(classes))
}

pub fn vm_with_options(classes: Vec<(&str, Vec<u8>)>, options: VmOptions) -> Vm {
    Vm::with_options(source(classes), options)
}

/// Public class extending `java/lang/Object` with a no-argument constructor.
pub fn class(name: &str) -> ClassAssembler {
    subclass(name, "java/lang/Object", ACC_PUBLIC | ACC_SUPER)
}

/// Class extending `parent` with a no-argument constructor calling the
/// parent's.
pub fn subclass(name: &str, parent: &str, access_flags: u16) -> ClassAssembler {
    let mut class = ClassAssembler::new(name, Some(parent), access_flags);
    let init = class.pool().method_ref(parent, "<init>", "()V");
    let mut code = Code::new(1, 1);
    code.op(ALOAD_0).op_u2(INVOKESPECIAL, init).op(RETURN);
    class.method(ACC_PUBLIC, "<init>", "()V", Some(code));
    class
}

/// Class `name` holding a single static method `run`.
pub fn runner(name: &str, descriptor: &str, code: Code) -> Vec<u8> {
    let mut class = class(name);
    class.method(ACC_PUBLIC | ACC_STATIC, "run", descriptor, Some(code));
    class.assemble().unwrap()
}

pub fn run(vm: &Vm, class: &str, descriptor: &str, args: Vec<Value>) -> Result<Option<Value>> {
    vm.invoke_static(class, "run", descriptor, args)
}

pub fn int(value: Option<Value>) -> i32 {
    match value {
        Some(Value::Int(i)) => i,
        other => panic!("expected an int, got {:?}", other),
    }
}

pub fn long(value: Option<Value>) -> i64 {
    match value {
        Some(Value::Long(l)) => l,
        other => panic!("expected a long, got {:?}", other),
    }
}

pub fn string(value: Option<Value>) -> String {
    match value.as_ref().and_then(Value::as_str) {
        Some(s) => s.to_string(),
        None => panic!("expected a string, got {:?}", value),
    }
}

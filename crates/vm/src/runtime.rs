pub mod frame;

use std::{cell::RefCell, rc::Rc};

use just_class_file::descriptor::MethodDescriptor;
use log::trace;

use self::frame::Frame;
use crate::{
    class::member::{Method, MethodBody},
    error::{Fault, LinkError},
    natives::NativeFn,
    value::Value,
    vm::Vm,
    Context, Result,
};

/// Runs methods and keeps track of the calls in progress.
#[derive(Debug, Default)]
pub struct Runtime {
    frames: RefCell<Vec<String>>,
}

/// Pops the frame it was created for when dropped, also when unwinding
/// through an error.
struct ActiveFrame<'a>(&'a Runtime);

impl Drop for ActiveFrame<'_> {
    fn drop(&mut self) {
        self.0.frames.borrow_mut().pop();
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of interpreted calls in progress.
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Methods being executed, innermost last.
    pub fn backtrace(&self) -> Vec<String> {
        self.frames.borrow().clone()
    }

    fn enter(&self, method: &Method) -> ActiveFrame<'_> {
        self.frames.borrow_mut().push(method.to_string());
        ActiveFrame(self)
    }

    /// Call `method` with `args`, receiver first for instance methods.
    pub fn run_method(&self, vm: &Vm, method: &Rc<Method>, args: Vec<Value>) -> Result<Option<Value>> {
        match &method.body {
            MethodBody::Native(function) => self.call_native(vm, method, function, &args),
            MethodBody::ExternNative => {
                let function = vm
                    .native_method(&method.class_name, &method.name, &method.descriptor)
                    .ok_or_else(|| LinkError::MethodNotFound {
                        class: method.class_name.to_string(),
                        name: method.name.to_string(),
                        descriptor: method.descriptor.to_string(),
                    })
                    .with_context(|| format!("binding native {}", method))?;
                self.call_native(vm, method, &function, &args)
            }
            MethodBody::Abstract => Err(Fault::AbstractMethod(method.to_string()).into()),
            MethodBody::Bytecode(_) => self.run_bytecode(vm, method, args),
        }
    }

    fn call_native(
        &self,
        vm: &Vm,
        method: &Method,
        function: &NativeFn,
        args: &[Value],
    ) -> Result<Option<Value>> {
        trace!("native {} {:?}", method, args);
        function(vm, args).with_context(|| {
            let args = args
                .iter()
                .map(|a| format!("{:?}", a))
                .collect::<Vec<_>>()
                .join(", ");
            format!("in native {} with ({})", method, args)
        })
    }

    fn run_bytecode(&self, vm: &Vm, method: &Rc<Method>, args: Vec<Value>) -> Result<Option<Value>> {
        let max_depth = vm.options().max_call_depth;
        if self.depth() >= max_depth {
            return Err(Fault::StackOverflow(max_depth)).with_context(|| format!("calling {}", method));
        }

        let container = method.container(vm)?;
        let loader = vm.class(method.class).loader;
        let _active = self.enter(method);
        trace!("enter {}", method);

        let mut frame = Frame::new(method.clone(), container, loader, args);
        let result = frame.run(vm).with_context(|| format!("in {}", method));
        trace!("leave {}", method);
        result
    }

    /// Pop the arguments of a call to a method with `descriptor` off
    /// `stack`, plus the receiver when `has_receiver`. Returned in
    /// declaration order, receiver first.
    pub fn parse_args_from_stack(
        descriptor: &MethodDescriptor,
        has_receiver: bool,
        stack: &mut Vec<Value>,
    ) -> Result<Vec<Value>, Fault> {
        let count = descriptor.parameters.len() + usize::from(has_receiver);
        if stack.len() < count {
            return Err(Fault::StackUnderflow);
        }
        Ok(stack.split_off(stack.len() - count))
    }
}

use std::{cmp::Ordering, rc::Rc};

use just_class_file::{constant_pool::MemberRef, descriptor::MethodDescriptor};
use log::trace;

use super::Runtime;
use crate::{
    bytecode::{
        call_site::CallSite,
        instruction::{
            ArithOp, ArrayKind, BitOp, Instruction, InvokeKind, Kind, Literal, Narrowing, ShiftOp,
        },
        BytecodeContainer,
    },
    class::{member::Method, Class},
    error::{ErrorKind, Fault, ValidationError},
    value::{Array, NativeObject, NativePayload, Value},
    vm::{LoaderId, Vm},
    Context, Result, VmError,
};

/// Activation of one interpreted method.
pub struct Frame {
    method: Rc<Method>,
    container: Rc<BytecodeContainer>,
    loader: LoaderId,
    stack: Vec<Value>,
    locals: Vec<Option<Value>>,
    /// Offset of the current instruction; `-1` once the method returned
    pc: isize,
    return_value: Option<Value>,
}

impl Frame {
    /// Frame with `args` laid out in the locals. Longs and doubles are
    /// followed by an empty padding slot.
    pub fn new(
        method: Rc<Method>,
        container: Rc<BytecodeContainer>,
        loader: LoaderId,
        args: Vec<Value>,
    ) -> Self {
        let receiver = usize::from(!method.is_static());
        let mut locals = Vec::with_capacity(container.max_locals as usize);
        for (i, arg) in args.into_iter().enumerate() {
            let wide = i >= receiver
                && method
                    .signature
                    .parameters
                    .get(i - receiver)
                    .map_or(false, |p| p.is_wide());
            locals.push(Some(arg));
            if wide {
                locals.push(None);
            }
        }
        if locals.len() < container.max_locals as usize {
            locals.resize(container.max_locals as usize, None);
        }

        Self {
            method,
            stack: Vec::with_capacity(container.max_stack as usize),
            container,
            loader,
            locals,
            pc: 0,
            return_value: None,
        }
    }

    pub fn pc(&self) -> isize {
        self.pc
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn locals(&self) -> &[Option<Value>] {
        &self.locals
    }

    pub fn is_finished(&self) -> bool {
        self.pc == -1
    }

    /// Run until the method returns.
    pub fn run(&mut self, vm: &Vm) -> Result<Option<Value>> {
        let container = self.container.clone();
        while self.pc != -1 {
            let slot = container
                .get(self.pc)
                .ok_or(ValidationError::NotAnInstruction(self.pc))?;
            trace!("{} {:>5}: {}", self.method, self.pc, slot.instruction);
            // Calls bypass `execute` to keep its frame off the host stack
            // of every nested call
            let branched = match &slot.instruction {
                Instruction::Invoke(kind, target) => {
                    self.invoke(vm, *kind, target).map(|()| false)
                }
                instruction => self.execute(vm, instruction),
            }
            .with_context(|| format!("at {}: {}", self.pc, slot.instruction))?;
            if !branched {
                self.pc += slot.length as isize;
            }
        }
        Ok(self.return_value.take())
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<Value, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow)
    }

    fn pop_int(&mut self) -> Result<i32, Fault> {
        self.pop()?.as_int()
    }

    fn pop_long(&mut self) -> Result<i64, Fault> {
        self.pop()?.as_long()
    }

    fn pop_float(&mut self) -> Result<f32, Fault> {
        self.pop()?.as_float()
    }

    fn pop_double(&mut self) -> Result<f64, Fault> {
        self.pop()?.as_double()
    }

    fn pop_array(&mut self, action: &str) -> Result<Rc<Array>, Fault> {
        match self.pop()? {
            Value::Array(array) => Ok(array),
            Value::Null => Err(Fault::NullPointer(format!("{} on a null array", action))),
            other => Err(Fault::TypeMismatch {
                expected: "array",
                found: other.type_name(),
            }),
        }
    }

    fn load_class(&self, vm: &Vm, name: &str) -> Result<Rc<Class>> {
        vm.load_class_in(self.loader, name)
    }

    /// Execute one instruction. Returns whether it moved the program
    /// counter itself.
    #[inline(never)]
    pub fn execute(&mut self, vm: &Vm, instruction: &Instruction) -> Result<bool> {
        use Instruction::*;

        if let Some((pops, _)) = instruction.stack_effect() {
            if self.stack.len() < pops {
                return Err(Fault::StackUnderflow.into());
            }
        }

        match instruction {
            Nop => {}
            Push(literal) => self.push(match literal {
                Literal::Null => Value::Null,
                Literal::Int(i) => Value::Int(*i),
                Literal::Long(l) => Value::Long(*l),
                Literal::Float(f) => Value::Float(*f),
                Literal::Double(d) => Value::Double(*d),
            }),
            Ldc(constant) => {
                let value = vm.constant_value(constant)?;
                self.push(value);
            }
            Load(_, index) => {
                let value = self
                    .locals
                    .get(*index as usize)
                    .cloned()
                    .flatten()
                    .ok_or(Fault::UninitializedLocal(*index))?;
                self.push(value);
            }
            Store(kind, index) => {
                let value = self.pop()?;
                let index = *index as usize;
                let needed = index + if kind.is_wide() { 2 } else { 1 };
                if self.locals.len() < needed {
                    self.locals.resize(needed, None);
                }
                self.locals[index] = Some(value);
                if kind.is_wide() {
                    self.locals[index + 1] = None;
                }
            }
            ArrayLoad(_) => {
                let index = self.pop_int()?;
                let array = self.pop_array("load")?;
                self.push(array.get(index)?);
            }
            ArrayStore(kind) => {
                let value = self.pop()?;
                let index = self.pop_int()?;
                let array = self.pop_array("store")?;
                let value = match (kind, value) {
                    (ArrayKind::Byte, Value::Int(i)) => Value::Int(i as i8 as i32),
                    (ArrayKind::Char, Value::Int(i)) => Value::Int(i as u16 as i32),
                    (ArrayKind::Short, Value::Int(i)) => Value::Int(i as i16 as i32),
                    (_, value) => value,
                };
                array.set(index, value)?;
            }
            Pop => {
                self.pop()?;
            }
            Pop2 => {
                if !self.pop()?.is_wide() {
                    self.pop()?;
                }
            }
            Dup => {
                let value = self.pop()?;
                self.push(value.clone());
                self.push(value);
            }
            DupX1 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                self.push_all([v1.clone(), v2, v1]);
            }
            DupX2 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                if v2.is_wide() {
                    self.push_all([v1.clone(), v2, v1]);
                } else {
                    let v3 = self.pop()?;
                    self.push_all([v1.clone(), v3, v2, v1]);
                }
            }
            Dup2 => {
                let v1 = self.pop()?;
                if v1.is_wide() {
                    self.push_all([v1.clone(), v1]);
                } else {
                    let v2 = self.pop()?;
                    self.push_all([v2.clone(), v1.clone(), v2, v1]);
                }
            }
            Dup2X1 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                if v1.is_wide() {
                    self.push_all([v1.clone(), v2, v1]);
                } else {
                    let v3 = self.pop()?;
                    self.push_all([v2.clone(), v1.clone(), v3, v2, v1]);
                }
            }
            Dup2X2 => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                match (v1.is_wide(), v2.is_wide()) {
                    (true, true) => self.push_all([v1.clone(), v2, v1]),
                    (true, false) => {
                        let v3 = self.pop()?;
                        self.push_all([v1.clone(), v3, v2, v1]);
                    }
                    (false, _) => {
                        let v3 = self.pop()?;
                        if v3.is_wide() {
                            self.push_all([v2.clone(), v1.clone(), v3, v2, v1]);
                        } else {
                            let v4 = self.pop()?;
                            self.push_all([v2.clone(), v1.clone(), v4, v3, v2, v1]);
                        }
                    }
                }
            }
            Swap => {
                let v1 = self.pop()?;
                let v2 = self.pop()?;
                self.push_all([v1, v2]);
            }
            Arith(kind, op) => self.arith(*kind, *op)?,
            Neg(kind) => {
                let value = match kind {
                    Kind::Int => Value::Int(self.pop_int()?.wrapping_neg()),
                    Kind::Long => Value::Long(self.pop_long()?.wrapping_neg()),
                    Kind::Float => Value::Float(-self.pop_float()?),
                    _ => Value::Double(-self.pop_double()?),
                };
                self.push(value);
            }
            Shift(kind, op) => {
                let amount = self.pop_int()? as u32;
                let value = match kind {
                    Kind::Long => {
                        let value = self.pop_long()?;
                        Value::Long(match op {
                            ShiftOp::Shl => value.wrapping_shl(amount),
                            ShiftOp::Shr => value.wrapping_shr(amount),
                            ShiftOp::Ushr => (value as u64).wrapping_shr(amount) as i64,
                        })
                    }
                    _ => {
                        let value = self.pop_int()?;
                        Value::Int(match op {
                            ShiftOp::Shl => value.wrapping_shl(amount),
                            ShiftOp::Shr => value.wrapping_shr(amount),
                            ShiftOp::Ushr => (value as u32).wrapping_shr(amount) as i32,
                        })
                    }
                };
                self.push(value);
            }
            Bitwise(kind, op) => {
                let value = match kind {
                    Kind::Long => {
                        let b = self.pop_long()?;
                        let a = self.pop_long()?;
                        Value::Long(match op {
                            BitOp::And => a & b,
                            BitOp::Or => a | b,
                            BitOp::Xor => a ^ b,
                        })
                    }
                    _ => {
                        let b = self.pop_int()?;
                        let a = self.pop_int()?;
                        Value::Int(match op {
                            BitOp::And => a & b,
                            BitOp::Or => a | b,
                            BitOp::Xor => a ^ b,
                        })
                    }
                };
                self.push(value);
            }
            IInc { index, delta } => {
                let slot = self
                    .locals
                    .get_mut(*index as usize)
                    .ok_or(Fault::UninitializedLocal(*index))?;
                let value = slot
                    .as_ref()
                    .ok_or(Fault::UninitializedLocal(*index))?
                    .as_int()?;
                *slot = Some(Value::Int(value.wrapping_add(*delta as i32)));
            }
            Convert { from, to } => {
                let value = self.pop()?;
                self.push(convert(value, *from, *to)?);
            }
            Narrow(narrowing) => {
                let value = match self.pop()? {
                    Value::Null => Value::Null,
                    value => {
                        let i = value.as_int()?;
                        Value::Int(match narrowing {
                            Narrowing::Byte => i as i8 as i32,
                            Narrowing::Char => i as u16 as i32,
                            Narrowing::Short => i as i16 as i32,
                        })
                    }
                };
                self.push(value);
            }
            Compare { kind, nan } => {
                let ordering = match kind {
                    Kind::Long => {
                        let b = self.pop_long()?;
                        let a = self.pop_long()?;
                        Some(a.cmp(&b))
                    }
                    Kind::Float => {
                        let b = self.pop_float()?;
                        let a = self.pop_float()?;
                        a.partial_cmp(&b)
                    }
                    _ => {
                        let b = self.pop_double()?;
                        let a = self.pop_double()?;
                        a.partial_cmp(&b)
                    }
                };
                self.push(Value::Int(match ordering {
                    Some(Ordering::Less) => -1,
                    Some(Ordering::Equal) => 0,
                    Some(Ordering::Greater) => 1,
                    None => *nan,
                }));
            }
            If { condition, target } => {
                let value = self.pop_int()?;
                return Ok(self.branch_if(condition.holds(value, 0), *target));
            }
            IfICmp { condition, target } => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                return Ok(self.branch_if(condition.holds(a, b), *target));
            }
            IfACmp { equal, target } => {
                let b = self.pop()?;
                let a = self.pop()?;
                return Ok(self.branch_if(a.same_reference(&b) == *equal, *target));
            }
            IfNull { null, target } => {
                let value = self.pop()?;
                return Ok(self.branch_if(value.is_null() == *null, *target));
            }
            Goto(target) => return Ok(self.branch_if(true, *target)),
            TableSwitch {
                default,
                low,
                targets,
            } => {
                let key = self.pop_int()?;
                let target = usize::try_from(key as i64 - *low as i64)
                    .ok()
                    .and_then(|i| targets.get(i))
                    .unwrap_or(default);
                return Ok(self.branch_if(true, *target));
            }
            LookupSwitch { default, pairs } => {
                let key = self.pop_int()?;
                let target = pairs
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map_or(*default, |(_, target)| *target);
                return Ok(self.branch_if(true, target));
            }
            Return(kind) => {
                if kind.is_some() {
                    self.return_value = Some(self.pop()?);
                }
                self.pc = -1;
                return Ok(true);
            }
            GetStatic(field) => {
                let class = self.load_class(vm, &field.class)?;
                class.prepare_use(vm)?;
                let value = class.get_static_attribute(vm, &field.name)?;
                self.push(value);
            }
            PutStatic(field) => {
                let value = self.pop()?;
                let class = self.load_class(vm, &field.class)?;
                class.prepare_use(vm)?;
                class.set_static_attribute(vm, &field.name, value)?;
            }
            GetField(field) => {
                let object = self.pop()?;
                let value = get_field(&object, field)?;
                self.push(value);
            }
            PutField(field) => {
                let value = self.pop()?;
                let object = self.pop()?;
                put_field(&object, field, value)?;
            }
            Invoke(kind, method) => self.invoke(vm, *kind, method)?,
            InvokeDynamic(dynamic) => {
                return Err(Fault::Unsupported(format!(
                    "invokedynamic {}{} with bootstrap method {}",
                    dynamic.name, dynamic.descriptor, dynamic.bootstrap_method_attr_index
                ))
                .into())
            }
            LambdaFactory(site) => {
                let mut captured = Vec::with_capacity(site.captured);
                for _ in 0..site.captured {
                    captured.push(self.pop()?);
                }
                captured.reverse();

                let interface = self.load_class(vm, &site.interface)?;
                let object = NativeObject::new(
                    interface.id,
                    interface.name.clone(),
                    NativePayload::CallSite(Rc::new(CallSite::new(site.clone(), captured))),
                );
                self.push(Value::Native(Rc::new(object)));
            }
            StringConcat(site) => {
                let count = site.arguments.len();
                let args = self.stack.split_off(self.stack.len() - count);
                let s = site.render(vm, &args)?;
                let value = vm.new_string(&s)?;
                self.push(value);
            }
            New(name) => {
                let class = self.load_class(vm, name)?;
                class.prepare_use(vm)?;
                let instance = class.create_instance(vm)?;
                self.push(instance);
            }
            NewArray(base) => {
                let length = array_length(self.pop_int()?)?;
                let array = Array::filled(Rc::from(base.as_char().to_string()), length);
                self.push(Value::Array(Rc::new(array)));
            }
            ANewArray(component) => {
                let length = array_length(self.pop_int()?)?;
                let array = Array::filled(component.clone(), length);
                self.push(Value::Array(Rc::new(array)));
            }
            MultiANewArray {
                descriptor,
                dimensions,
            } => {
                let mut lengths = Vec::with_capacity(*dimensions as usize);
                for _ in 0..*dimensions {
                    lengths.push(self.pop_int()?);
                }
                lengths.reverse();
                let array = multi_array(descriptor, &lengths)?;
                self.push(array);
            }
            ArrayLength => {
                let array = self.pop_array("arraylength")?;
                self.push(Value::Int(array.len() as i32));
            }
            AThrow => {
                let thrown = self.pop()?;
                if thrown.is_null() {
                    return Err(Fault::NullPointer("throwing null".to_owned()).into());
                }
                self.stack.clear();
                self.push(thrown.clone());
                return Err(VmError::new(ErrorKind::Throw(thrown)));
            }
            CheckCast(class) => {
                let value = self.stack.last().cloned().ok_or(Fault::StackUnderflow)?;
                if !value.is_null() && !vm.is_instance_of(&value, class)? {
                    return Err(Fault::ClassCast {
                        from: value.type_name(),
                        to: class.to_string(),
                    }
                    .into());
                }
            }
            InstanceOf(class) => {
                let value = self.pop()?;
                let result = vm.is_instance_of(&value, class)?;
                self.push(Value::from(result));
            }
            MonitorEnter | MonitorExit => {
                if self.pop()?.is_null() {
                    return Err(Fault::NullPointer("monitor of null".to_owned()).into());
                }
            }
        }
        Ok(false)
    }

    fn push_all<const N: usize>(&mut self, values: [Value; N]) {
        self.stack.extend(values);
    }

    fn branch_if(&mut self, condition: bool, target: isize) -> bool {
        if condition {
            self.pc = target;
        }
        condition
    }

    fn arith(&mut self, kind: Kind, op: ArithOp) -> Result<(), Fault> {
        let value = match kind {
            Kind::Int => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                Value::Int(match op {
                    ArithOp::Add => a.wrapping_add(b),
                    ArithOp::Sub => a.wrapping_sub(b),
                    ArithOp::Mul => a.wrapping_mul(b),
                    ArithOp::Div | ArithOp::Rem if b == 0 => {
                        return Err(Fault::Arithmetic("/ by zero"))
                    }
                    ArithOp::Div => a.wrapping_div(b),
                    ArithOp::Rem => a.wrapping_rem(b),
                })
            }
            Kind::Long => {
                let b = self.pop_long()?;
                let a = self.pop_long()?;
                Value::Long(match op {
                    ArithOp::Add => a.wrapping_add(b),
                    ArithOp::Sub => a.wrapping_sub(b),
                    ArithOp::Mul => a.wrapping_mul(b),
                    ArithOp::Div | ArithOp::Rem if b == 0 => {
                        return Err(Fault::Arithmetic("/ by zero"))
                    }
                    ArithOp::Div => a.wrapping_div(b),
                    ArithOp::Rem => a.wrapping_rem(b),
                })
            }
            Kind::Float => {
                let b = self.pop_float()?;
                let a = self.pop_float()?;
                Value::Float(match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                    ArithOp::Rem => a % b,
                })
            }
            _ => {
                let b = self.pop_double()?;
                let a = self.pop_double()?;
                Value::Double(match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                    ArithOp::Rem => a % b,
                })
            }
        };
        self.push(value);
        Ok(())
    }

    #[inline(never)]
    fn invoke(&mut self, vm: &Vm, kind: InvokeKind, target: &MemberRef) -> Result<()> {
        let descriptor = MethodDescriptor::parse(&target.descriptor)?;
        let args = Runtime::parse_args_from_stack(
            &descriptor,
            kind != InvokeKind::Static,
            &mut self.stack,
        )?;

        let result = match kind {
            InvokeKind::Static => {
                let class = self.load_class(vm, &target.class)?;
                class.prepare_use(vm)?;
                let method = class.get_method(vm, &target.name, &target.descriptor)?;
                vm.runtime().run_method(vm, &method, args)?
            }
            InvokeKind::Special => {
                check_receiver(&args, target)?;
                let class = self.load_class(vm, &target.class)?;
                let method = class.get_method(vm, &target.name, &target.descriptor)?;
                vm.runtime().run_method(vm, &method, args)?
            }
            InvokeKind::Virtual | InvokeKind::Interface => {
                check_receiver(&args, target)?;
                match call_site(&args[0], &target.name) {
                    Some(site) => site.invoke(vm, &args[1..])?,
                    None => {
                        let method = self.resolve_virtual(vm, &args[0], target)?;
                        vm.runtime().run_method(vm, &method, args)?
                    }
                }
            }
        };

        if descriptor.return_type.is_some() {
            self.push(result.unwrap_or(Value::Null));
        }
        Ok(())
    }

    /// Method `target` as overridden by the runtime class of `receiver`.
    fn resolve_virtual(&self, vm: &Vm, receiver: &Value, target: &MemberRef) -> Result<Rc<Method>> {
        if let Some(method) =
            vm.class_of(receiver)?
                .find_method(vm, &target.name, &target.descriptor)?
        {
            return Ok(method);
        }
        self.load_class(vm, &target.class)?
            .get_method(vm, &target.name, &target.descriptor)
    }
}

fn check_receiver(args: &[Value], target: &MemberRef) -> Result<(), Fault> {
    match args.first() {
        Some(Value::Null) => Err(Fault::NullPointer(format!("calling {} on null", target))),
        Some(_) => Ok(()),
        None => Err(Fault::StackUnderflow),
    }
}

fn call_site(receiver: &Value, name: &str) -> Option<Rc<CallSite>> {
    match receiver {
        Value::Native(object) => match &*object.payload() {
            NativePayload::CallSite(site) if site.implements(name) => Some(site.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn get_field(object: &Value, field: &MemberRef) -> Result<Value, Fault> {
    match object {
        Value::Object(instance) => instance
            .get_field(&field.name)
            .ok_or_else(|| Fault::NoSuchField(field.to_string())),
        Value::Native(object) => Ok(object
            .get_field(&field.name)
            .unwrap_or_else(|| Value::default_for(&field.descriptor))),
        Value::Null => Err(Fault::NullPointer(format!("reading {}", field))),
        other => Err(Fault::TypeMismatch {
            expected: "object",
            found: other.type_name(),
        }),
    }
}

fn put_field(object: &Value, field: &MemberRef, value: Value) -> Result<(), Fault> {
    match object {
        Value::Object(instance) => {
            if instance.set_field(&field.name, value) {
                Ok(())
            } else {
                Err(Fault::NoSuchField(field.to_string()))
            }
        }
        Value::Native(object) => {
            object.set_field(&field.name, value);
            Ok(())
        }
        Value::Null => Err(Fault::NullPointer(format!("writing {}", field))),
        other => Err(Fault::TypeMismatch {
            expected: "object",
            found: other.type_name(),
        }),
    }
}

/// Numeric conversion; `null` passes through unchanged.
fn convert(value: Value, from: Kind, to: Kind) -> Result<Value, Fault> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let value = match from {
        Kind::Int => {
            let i = value.as_int()?;
            match to {
                Kind::Long => Value::Long(i as i64),
                Kind::Float => Value::Float(i as f32),
                Kind::Double => Value::Double(i as f64),
                _ => Value::Int(i),
            }
        }
        Kind::Long => {
            let l = value.as_long()?;
            match to {
                Kind::Int => Value::Int(l as i32),
                Kind::Float => Value::Float(l as f32),
                Kind::Double => Value::Double(l as f64),
                _ => Value::Long(l),
            }
        }
        Kind::Float => {
            let f = value.as_float()?;
            match to {
                Kind::Int => Value::Int(f as i32),
                Kind::Long => Value::Long(f as i64),
                Kind::Double => Value::Double(f as f64),
                _ => Value::Float(f),
            }
        }
        _ => {
            let d = value.as_double()?;
            match to {
                Kind::Int => Value::Int(d as i32),
                Kind::Long => Value::Long(d as i64),
                Kind::Float => Value::Float(d as f32),
                _ => Value::Double(d),
            }
        }
    };
    Ok(value)
}

fn array_length(length: i32) -> Result<usize, Fault> {
    usize::try_from(length).map_err(|_| Fault::NegativeArraySize(length))
}

fn multi_array(descriptor: &str, lengths: &[i32]) -> Result<Value, Fault> {
    let component = descriptor.strip_prefix('[').unwrap_or(descriptor);
    let (length, rest) = match lengths.split_first() {
        Some(split) => split,
        None => return Ok(Value::default_for(descriptor)),
    };
    let length = array_length(*length)?;
    let array = if rest.is_empty() {
        Array::filled(Rc::from(component), length)
    } else {
        let values = (0..length)
            .map(|_| multi_array(component, rest))
            .collect::<Result<Vec<_>, _>>()?;
        Array::new(Rc::from(component), values)
    };
    Ok(Value::Array(Rc::new(array)))
}

#[cfg(test)]
mod convert_tests {
    use super::*;

    #[test]
    fn it_should_pass_null_through() {
        assert!(convert(Value::Null, Kind::Int, Kind::Long).unwrap().is_null());
    }

    #[test]
    fn it_should_saturate_floats_like_the_jvm() {
        assert!(matches!(
            convert(Value::Double(1e20), Kind::Double, Kind::Int),
            Ok(Value::Int(i32::MAX))
        ));
        assert!(matches!(
            convert(Value::Float(f32::NAN), Kind::Float, Kind::Long),
            Ok(Value::Long(0))
        ));
        assert!(matches!(
            convert(Value::Long(0x1_0000_0001), Kind::Long, Kind::Int),
            Ok(Value::Int(1))
        ));
    }

    #[test]
    fn it_should_build_nested_arrays() {
        let value = multi_array("[[I", &[2, 3]).unwrap();
        let outer = value.as_array().unwrap();
        assert_eq!(outer.len(), 2);
        let inner = outer.get(1).unwrap();
        assert_eq!(inner.as_array().unwrap().len(), 3);
        assert_eq!(&*inner.as_array().unwrap().component, "I");
        assert!(matches!(
            multi_array("[[I", &[2, -1]),
            Err(Fault::NegativeArraySize(-1))
        ));
    }
}

use std::{fmt, rc::Rc};

use just_class_file::{
    codec::Reader,
    constant_pool::{Constant, DynamicRef, MemberRef},
    descriptor::{BaseType, MethodDescriptor},
    opcodes::{self, *},
    ClassFileError, ConstantPool, Result,
};

use super::call_site::{ConcatSite, LambdaSite};

/// Computational type of a value on the operand stack or in a local.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl Kind {
    fn prefix(&self) -> char {
        match self {
            Kind::Int => 'i',
            Kind::Long => 'l',
            Kind::Float => 'f',
            Kind::Double => 'd',
            Kind::Reference => 'a',
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, Kind::Long | Kind::Double)
    }
}

/// Element type accessed by `*aload`/`*astore`. `Byte` covers `boolean`
/// arrays too.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte,
    Char,
    Short,
}

impl ArrayKind {
    fn prefix(&self) -> char {
        match self {
            ArrayKind::Int => 'i',
            ArrayKind::Long => 'l',
            ArrayKind::Float => 'f',
            ArrayKind::Double => 'd',
            ArrayKind::Reference => 'a',
            ArrayKind::Byte => 'b',
            ArrayKind::Char => 'c',
            ArrayKind::Short => 's',
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Long(l) => write!(f, "{}L", l),
            Literal::Float(x) => write!(f, "{:?}f", x),
            Literal::Double(x) => write!(f, "{:?}d", x),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    Shl,
    Shr,
    Ushr,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Narrowing {
    Byte,
    Char,
    Short,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Condition {
    pub fn holds(&self, a: i32, b: i32) -> bool {
        match self {
            Condition::Eq => a == b,
            Condition::Ne => a != b,
            Condition::Lt => a < b,
            Condition::Ge => a >= b,
            Condition::Gt => a > b,
            Condition::Le => a <= b,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Condition::Eq => "eq",
            Condition::Ne => "ne",
            Condition::Lt => "lt",
            Condition::Ge => "ge",
            Condition::Gt => "gt",
            Condition::Le => "le",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// A decoded instruction. Branch targets are absolute byte offsets into the
/// method's code.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    Push(Literal),
    /// `ldc` family; always a loadable constant
    Ldc(Constant),
    Load(Kind, u16),
    Store(Kind, u16),
    ArrayLoad(ArrayKind),
    ArrayStore(ArrayKind),
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    Arith(Kind, ArithOp),
    Neg(Kind),
    Shift(Kind, ShiftOp),
    Bitwise(Kind, BitOp),
    IInc {
        index: u16,
        delta: i16,
    },
    Convert {
        from: Kind,
        to: Kind,
    },
    Narrow(Narrowing),
    /// `lcmp`, `fcmp<op>`, `dcmp<op>`; `nan` is pushed when an operand is NaN
    Compare {
        kind: Kind,
        nan: i32,
    },
    /// Compare an int against zero
    If {
        condition: Condition,
        target: isize,
    },
    IfICmp {
        condition: Condition,
        target: isize,
    },
    IfACmp {
        equal: bool,
        target: isize,
    },
    IfNull {
        null: bool,
        target: isize,
    },
    Goto(isize),
    TableSwitch {
        default: isize,
        low: i32,
        targets: Vec<isize>,
    },
    LookupSwitch {
        default: isize,
        pairs: Vec<(i32, isize)>,
    },
    Return(Option<Kind>),
    GetStatic(Rc<MemberRef>),
    PutStatic(Rc<MemberRef>),
    GetField(Rc<MemberRef>),
    PutField(Rc<MemberRef>),
    Invoke(InvokeKind, Rc<MemberRef>),
    /// `invokedynamic` whose bootstrap method is not understood
    InvokeDynamic(Rc<DynamicRef>),
    /// `invokedynamic` of a lambda factory, materialized
    LambdaFactory(Rc<LambdaSite>),
    /// `invokedynamic` of a string concatenation, materialized
    StringConcat(Rc<ConcatSite>),
    New(Rc<str>),
    NewArray(BaseType),
    /// Component descriptor, eg. `Ljava/lang/String;` or `[I`
    ANewArray(Rc<str>),
    MultiANewArray {
        descriptor: Rc<str>,
        dimensions: u8,
    },
    ArrayLength,
    AThrow,
    CheckCast(Rc<str>),
    InstanceOf(Rc<str>),
    MonitorEnter,
    MonitorExit,
}

const KINDS: [Kind; 5] = [Kind::Int, Kind::Long, Kind::Float, Kind::Double, Kind::Reference];
const NUMERIC: [Kind; 4] = [Kind::Int, Kind::Long, Kind::Float, Kind::Double];
const INTEGRAL: [Kind; 2] = [Kind::Int, Kind::Long];
const ARRAY_KINDS: [ArrayKind; 8] = [
    ArrayKind::Int,
    ArrayKind::Long,
    ArrayKind::Float,
    ArrayKind::Double,
    ArrayKind::Reference,
    ArrayKind::Byte,
    ArrayKind::Char,
    ArrayKind::Short,
];
const ARITH_OPS: [ArithOp; 5] = [
    ArithOp::Add,
    ArithOp::Sub,
    ArithOp::Mul,
    ArithOp::Div,
    ArithOp::Rem,
];
const SHIFT_OPS: [ShiftOp; 3] = [ShiftOp::Shl, ShiftOp::Shr, ShiftOp::Ushr];
const BIT_OPS: [BitOp; 3] = [BitOp::And, BitOp::Or, BitOp::Xor];
const CONDITIONS: [Condition; 6] = [
    Condition::Eq,
    Condition::Ne,
    Condition::Lt,
    Condition::Ge,
    Condition::Gt,
    Condition::Le,
];

/// Bytes of padding after a switch opcode at `offset`, so that the operands
/// start on a multiple of four.
pub fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

impl Instruction {
    /// Decode the instruction starting at `offset`. Returns it with its
    /// length in bytes.
    pub fn decode(code: &[u8], offset: usize, pool: &ConstantPool) -> Result<(Instruction, usize)> {
        use Instruction::*;

        let mut r = Reader::at(code, offset);
        let opcode = r.read_u1()?;
        let here = offset as isize;

        let instruction = match opcode {
            NOP => Nop,
            ACONST_NULL => Push(Literal::Null),
            ICONST_M1..=ICONST_5 => Push(Literal::Int(opcode as i32 - ICONST_0 as i32)),
            LCONST_0 | LCONST_1 => Push(Literal::Long((opcode - LCONST_0) as i64)),
            FCONST_0..=FCONST_2 => Push(Literal::Float((opcode - FCONST_0) as f32)),
            DCONST_0 | DCONST_1 => Push(Literal::Double((opcode - DCONST_0) as f64)),
            BIPUSH => Push(Literal::Int(r.read_s1()? as i32)),
            SIPUSH => Push(Literal::Int(r.read_s2()? as i32)),
            LDC => {
                let index = r.read_u1()? as u16;
                ldc(pool, index, offset, false)?
            }
            LDC_W => ldc(pool, r.read_u2()?, offset, false)?,
            LDC2_W => ldc(pool, r.read_u2()?, offset, true)?,
            ILOAD..=ALOAD => Load(KINDS[(opcode - ILOAD) as usize], r.read_u1()? as u16),
            ILOAD_0..=ALOAD_3 => {
                let n = opcode - ILOAD_0;
                Load(KINDS[(n / 4) as usize], (n % 4) as u16)
            }
            IALOAD..=SALOAD => ArrayLoad(ARRAY_KINDS[(opcode - IALOAD) as usize]),
            ISTORE..=ASTORE => Store(KINDS[(opcode - ISTORE) as usize], r.read_u1()? as u16),
            ISTORE_0..=ASTORE_3 => {
                let n = opcode - ISTORE_0;
                Store(KINDS[(n / 4) as usize], (n % 4) as u16)
            }
            IASTORE..=SASTORE => ArrayStore(ARRAY_KINDS[(opcode - IASTORE) as usize]),
            POP => Pop,
            POP2 => Pop2,
            DUP => Dup,
            DUP_X1 => DupX1,
            DUP_X2 => DupX2,
            DUP2 => Dup2,
            DUP2_X1 => Dup2X1,
            DUP2_X2 => Dup2X2,
            SWAP => Swap,
            IADD..=DREM => {
                let n = (opcode - IADD) as usize;
                Arith(NUMERIC[n % 4], ARITH_OPS[n / 4])
            }
            INEG..=DNEG => Neg(NUMERIC[(opcode - INEG) as usize]),
            ISHL..=LUSHR => {
                let n = (opcode - ISHL) as usize;
                Shift(INTEGRAL[n % 2], SHIFT_OPS[n / 2])
            }
            IAND..=LXOR => {
                let n = (opcode - IAND) as usize;
                Bitwise(INTEGRAL[n % 2], BIT_OPS[n / 2])
            }
            IINC => IInc {
                index: r.read_u1()? as u16,
                delta: r.read_s1()? as i16,
            },
            I2L..=D2F => {
                let n = (opcode - I2L) as usize;
                let from = NUMERIC[n / 3];
                // Each source kind converts to the three other numeric kinds
                let to = NUMERIC
                    .iter()
                    .copied()
                    .filter(|k| *k != from)
                    .nth(n % 3)
                    .unwrap_or(from);
                Convert { from, to }
            }
            I2B => Narrow(Narrowing::Byte),
            I2C => Narrow(Narrowing::Char),
            I2S => Narrow(Narrowing::Short),
            LCMP => Compare {
                kind: Kind::Long,
                nan: 0,
            },
            FCMPL | FCMPG => Compare {
                kind: Kind::Float,
                nan: if opcode == FCMPL { -1 } else { 1 },
            },
            DCMPL | DCMPG => Compare {
                kind: Kind::Double,
                nan: if opcode == DCMPL { -1 } else { 1 },
            },
            IFEQ..=IFLE => If {
                condition: CONDITIONS[(opcode - IFEQ) as usize],
                target: here + r.read_s2()? as isize,
            },
            IF_ICMPEQ..=IF_ICMPLE => IfICmp {
                condition: CONDITIONS[(opcode - IF_ICMPEQ) as usize],
                target: here + r.read_s2()? as isize,
            },
            IF_ACMPEQ | IF_ACMPNE => IfACmp {
                equal: opcode == IF_ACMPEQ,
                target: here + r.read_s2()? as isize,
            },
            IFNULL | IFNONNULL => IfNull {
                null: opcode == IFNULL,
                target: here + r.read_s2()? as isize,
            },
            GOTO => Goto(here + r.read_s2()? as isize),
            GOTO_W => Goto(here + r.read_i4()? as isize),
            JSR | RET | JSR_W => return Err(unsupported(opcode, offset)),
            TABLESWITCH => {
                r.skip(switch_padding(offset))?;
                let default = here + r.read_i4()? as isize;
                let low = r.read_i4()?;
                let high = r.read_i4()?;
                if high < low {
                    return Err(ClassFileError::InvalidOperand {
                        offset,
                        reason: format!("tableswitch range {}..={} is empty", low, high),
                    });
                }
                let count = (high as i64 - low as i64 + 1) as usize;
                let targets = (0..count)
                    .map(|_| r.read_i4().map(|o| here + o as isize))
                    .collect::<Result<Vec<_>>>()?;
                TableSwitch {
                    default,
                    low,
                    targets,
                }
            }
            LOOKUPSWITCH => {
                r.skip(switch_padding(offset))?;
                let default = here + r.read_i4()? as isize;
                let npairs = r.read_i4()?;
                if npairs < 0 {
                    return Err(ClassFileError::InvalidOperand {
                        offset,
                        reason: format!("lookupswitch with {} pairs", npairs),
                    });
                }
                let pairs = (0..npairs)
                    .map(|_| Ok((r.read_i4()?, here + r.read_i4()? as isize)))
                    .collect::<Result<Vec<_>>>()?;
                LookupSwitch { default, pairs }
            }
            IRETURN..=ARETURN => Return(Some(KINDS[(opcode - IRETURN) as usize])),
            RETURN => Return(None),
            GETSTATIC => GetStatic(pool.member_ref(r.read_u2()?)?),
            PUTSTATIC => PutStatic(pool.member_ref(r.read_u2()?)?),
            GETFIELD => GetField(pool.member_ref(r.read_u2()?)?),
            PUTFIELD => PutField(pool.member_ref(r.read_u2()?)?),
            INVOKEVIRTUAL => Invoke(InvokeKind::Virtual, pool.member_ref(r.read_u2()?)?),
            INVOKESPECIAL => Invoke(InvokeKind::Special, pool.member_ref(r.read_u2()?)?),
            INVOKESTATIC => Invoke(InvokeKind::Static, pool.member_ref(r.read_u2()?)?),
            INVOKEINTERFACE => {
                let method = pool.member_ref(r.read_u2()?)?;
                // count and a zero byte, both redundant
                r.skip(2)?;
                Invoke(InvokeKind::Interface, method)
            }
            INVOKEDYNAMIC => {
                let index = r.read_u2()?;
                r.skip(2)?;
                match pool.get(index)? {
                    Constant::InvokeDynamic(dynamic) => InvokeDynamic(dynamic.clone()),
                    other => {
                        return Err(ClassFileError::InvalidOperand {
                            offset,
                            reason: format!("invokedynamic of a {} constant", other.kind()),
                        })
                    }
                }
            }
            NEW => New(pool.class_name(r.read_u2()?)?),
            NEWARRAY => {
                let atype = r.read_u1()?;
                NewArray(array_type(atype).ok_or_else(|| ClassFileError::InvalidOperand {
                    offset,
                    reason: format!("newarray of type {}", atype),
                })?)
            }
            ANEWARRAY => {
                let class = pool.class_name(r.read_u2()?)?;
                if class.starts_with('[') {
                    ANewArray(class)
                } else {
                    ANewArray(Rc::from(format!("L{};", class)))
                }
            }
            MULTIANEWARRAY => {
                let descriptor = pool.class_name(r.read_u2()?)?;
                let dimensions = r.read_u1()?;
                let depth = descriptor.chars().take_while(|c| *c == '[').count();
                if dimensions == 0 || depth < dimensions as usize {
                    return Err(ClassFileError::InvalidOperand {
                        offset,
                        reason: format!("{} dimensions of {}", dimensions, descriptor),
                    });
                }
                MultiANewArray {
                    descriptor,
                    dimensions,
                }
            }
            ARRAYLENGTH => ArrayLength,
            ATHROW => AThrow,
            CHECKCAST => CheckCast(pool.class_name(r.read_u2()?)?),
            INSTANCEOF => InstanceOf(pool.class_name(r.read_u2()?)?),
            MONITORENTER => MonitorEnter,
            MONITOREXIT => MonitorExit,
            WIDE => {
                let widened = r.read_u1()?;
                match widened {
                    IINC => IInc {
                        index: r.read_u2()?,
                        delta: r.read_s2()?,
                    },
                    ILOAD..=ALOAD => Load(KINDS[(widened - ILOAD) as usize], r.read_u2()?),
                    ISTORE..=ASTORE => Store(KINDS[(widened - ISTORE) as usize], r.read_u2()?),
                    RET => return Err(unsupported(widened, offset)),
                    _ => {
                        return Err(ClassFileError::InvalidOperand {
                            offset,
                            reason: format!("wide applied to opcode 0x{:02x}", widened),
                        })
                    }
                }
            }
            _ => return Err(ClassFileError::InvalidOpcode { opcode, offset }),
        };

        Ok((instruction, r.position() - offset))
    }

    /// Every absolute offset this instruction may transfer control to.
    pub fn targets(&self) -> Vec<isize> {
        match self {
            Instruction::If { target, .. }
            | Instruction::IfICmp { target, .. }
            | Instruction::IfACmp { target, .. }
            | Instruction::IfNull { target, .. }
            | Instruction::Goto(target) => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            Instruction::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, target)| *target))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Apply `f` to every branch target.
    pub fn remap_targets(&mut self, f: &mut impl FnMut(isize) -> isize) {
        match self {
            Instruction::If { target, .. }
            | Instruction::IfICmp { target, .. }
            | Instruction::IfACmp { target, .. }
            | Instruction::IfNull { target, .. }
            | Instruction::Goto(target) => *target = f(*target),
            Instruction::TableSwitch {
                default, targets, ..
            } => {
                *default = f(*default);
                for target in targets {
                    *target = f(*target);
                }
            }
            Instruction::LookupSwitch { default, pairs } => {
                *default = f(*default);
                for (_, target) in pairs {
                    *target = f(*target);
                }
            }
            _ => {}
        }
    }

    /// Local variable accessed, with whether it spans two slots.
    pub fn local(&self) -> Option<(u16, bool)> {
        match self {
            Instruction::Load(kind, index) | Instruction::Store(kind, index) => {
                Some((*index, kind.is_wide()))
            }
            Instruction::IInc { index, .. } => Some((*index, false)),
            _ => None,
        }
    }

    /// Number of values popped and pushed, when it does not depend on the
    /// category of the operands.
    pub fn stack_effect(&self) -> Option<(usize, usize)> {
        use Instruction::*;

        let effect = match self {
            Nop | IInc { .. } | Goto(_) | Return(None) => (0, 0),
            Push(_) | Ldc(_) | Load(..) | GetStatic(_) | New(_) => (0, 1),
            Store(..) | Pop | If { .. } | IfNull { .. } | PutStatic(_) => (1, 0),
            TableSwitch { .. } | LookupSwitch { .. } | Return(Some(_)) => (1, 0),
            MonitorEnter | MonitorExit => (1, 0),
            ArrayLoad(_) => (2, 1),
            ArrayStore(_) => (3, 0),
            Dup => (1, 2),
            DupX1 => (2, 3),
            Swap => (2, 2),
            Arith(..) | Shift(..) | Bitwise(..) | Compare { .. } => (2, 1),
            Neg(_) | Convert { .. } | Narrow(_) | GetField(_) => (1, 1),
            NewArray(_) | ANewArray(_) | ArrayLength | CheckCast(_) | InstanceOf(_) => (1, 1),
            IfICmp { .. } | IfACmp { .. } | PutField(_) => (2, 0),
            MultiANewArray { dimensions, .. } => (*dimensions as usize, 1),
            Invoke(kind, method) => {
                let descriptor = MethodDescriptor::parse(&method.descriptor).ok()?;
                let receiver = usize::from(*kind != InvokeKind::Static);
                (
                    descriptor.parameters.len() + receiver,
                    usize::from(descriptor.return_type.is_some()),
                )
            }
            InvokeDynamic(dynamic) => {
                let descriptor = MethodDescriptor::parse(&dynamic.descriptor).ok()?;
                (
                    descriptor.parameters.len(),
                    usize::from(descriptor.return_type.is_some()),
                )
            }
            LambdaFactory(site) => (site.captured, 1),
            StringConcat(site) => (site.arguments.len(), 1),
            Pop2 | DupX2 | Dup2 | Dup2X1 | Dup2X2 | AThrow => return None,
        };
        Some(effect)
    }
}

fn ldc(pool: &ConstantPool, index: u16, offset: usize, wide: bool) -> Result<Instruction> {
    let constant = pool.get(index)?;
    let is_wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
    if !constant.is_loadable() || is_wide != wide {
        return Err(ClassFileError::InvalidOperand {
            offset,
            reason: format!(
                "{} cannot load a {} constant",
                if wide { "ldc2_w" } else { "ldc" },
                constant.kind()
            ),
        });
    }
    Ok(Instruction::Ldc(constant.clone()))
}

fn array_type(atype: u8) -> Option<BaseType> {
    Some(match atype {
        4 => BaseType::Boolean,
        5 => BaseType::Char,
        6 => BaseType::Float,
        7 => BaseType::Double,
        8 => BaseType::Byte,
        9 => BaseType::Short,
        10 => BaseType::Int,
        11 => BaseType::Long,
        _ => return None,
    })
}

fn unsupported(opcode: u8, offset: usize) -> ClassFileError {
    ClassFileError::UnsupportedOpcode {
        mnemonic: opcodes::mnemonic(opcode).unwrap_or("?"),
        offset,
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match self {
            Nop => write!(f, "nop"),
            Push(literal) => write!(f, "push {}", literal),
            Ldc(constant) => write!(f, "ldc {:?}", constant),
            Load(kind, index) => write!(f, "{}load {}", kind.prefix(), index),
            Store(kind, index) => write!(f, "{}store {}", kind.prefix(), index),
            ArrayLoad(kind) => write!(f, "{}aload", kind.prefix()),
            ArrayStore(kind) => write!(f, "{}astore", kind.prefix()),
            Pop => write!(f, "pop"),
            Pop2 => write!(f, "pop2"),
            Dup => write!(f, "dup"),
            DupX1 => write!(f, "dup_x1"),
            DupX2 => write!(f, "dup_x2"),
            Dup2 => write!(f, "dup2"),
            Dup2X1 => write!(f, "dup2_x1"),
            Dup2X2 => write!(f, "dup2_x2"),
            Swap => write!(f, "swap"),
            Arith(kind, op) => {
                let op = match op {
                    ArithOp::Add => "add",
                    ArithOp::Sub => "sub",
                    ArithOp::Mul => "mul",
                    ArithOp::Div => "div",
                    ArithOp::Rem => "rem",
                };
                write!(f, "{}{}", kind.prefix(), op)
            }
            Neg(kind) => write!(f, "{}neg", kind.prefix()),
            Shift(kind, op) => {
                let op = match op {
                    ShiftOp::Shl => "shl",
                    ShiftOp::Shr => "shr",
                    ShiftOp::Ushr => "ushr",
                };
                write!(f, "{}{}", kind.prefix(), op)
            }
            Bitwise(kind, op) => {
                let op = match op {
                    BitOp::And => "and",
                    BitOp::Or => "or",
                    BitOp::Xor => "xor",
                };
                write!(f, "{}{}", kind.prefix(), op)
            }
            IInc { index, delta } => write!(f, "iinc {} {}", index, delta),
            Convert { from, to } => write!(f, "{}2{}", from.prefix(), to.prefix()),
            Narrow(Narrowing::Byte) => write!(f, "i2b"),
            Narrow(Narrowing::Char) => write!(f, "i2c"),
            Narrow(Narrowing::Short) => write!(f, "i2s"),
            Compare { kind: Kind::Long, .. } => write!(f, "lcmp"),
            Compare { kind, nan } => {
                write!(f, "{}cmp{}", kind.prefix(), if *nan < 0 { 'l' } else { 'g' })
            }
            If { condition, target } => write!(f, "if{} {}", condition.suffix(), target),
            IfICmp { condition, target } => {
                write!(f, "if_icmp{} {}", condition.suffix(), target)
            }
            IfACmp { equal, target } => {
                write!(f, "if_acmp{} {}", if *equal { "eq" } else { "ne" }, target)
            }
            IfNull { null, target } => {
                write!(f, "if{} {}", if *null { "null" } else { "nonnull" }, target)
            }
            Goto(target) => write!(f, "goto {}", target),
            TableSwitch {
                default,
                low,
                targets,
            } => write!(
                f,
                "tableswitch {}..={} {:?} default {}",
                low,
                *low as i64 + targets.len() as i64 - 1,
                targets,
                default
            ),
            LookupSwitch { default, pairs } => {
                write!(f, "lookupswitch {:?} default {}", pairs, default)
            }
            Return(Some(kind)) => write!(f, "{}return", kind.prefix()),
            Return(None) => write!(f, "return"),
            GetStatic(field) => write!(f, "getstatic {}", field),
            PutStatic(field) => write!(f, "putstatic {}", field),
            GetField(field) => write!(f, "getfield {}", field),
            PutField(field) => write!(f, "putfield {}", field),
            Invoke(kind, method) => {
                let kind = match kind {
                    InvokeKind::Virtual => "invokevirtual",
                    InvokeKind::Special => "invokespecial",
                    InvokeKind::Static => "invokestatic",
                    InvokeKind::Interface => "invokeinterface",
                };
                write!(f, "{} {}", kind, method)
            }
            InvokeDynamic(dynamic) => write!(
                f,
                "invokedynamic #{} {}{}",
                dynamic.bootstrap_method_attr_index, dynamic.name, dynamic.descriptor
            ),
            LambdaFactory(site) => write!(f, "lambda {}", site),
            StringConcat(site) => write!(f, "concat {}", site),
            New(class) => write!(f, "new {}", class),
            NewArray(base) => write!(f, "newarray {}", base.as_char()),
            ANewArray(component) => write!(f, "anewarray {}", component),
            MultiANewArray {
                descriptor,
                dimensions,
            } => write!(f, "multianewarray {} {}", descriptor, dimensions),
            ArrayLength => write!(f, "arraylength"),
            AThrow => write!(f, "athrow"),
            CheckCast(class) => write!(f, "checkcast {}", class),
            InstanceOf(class) => write!(f, "instanceof {}", class),
            MonitorEnter => write!(f, "monitorenter"),
            MonitorExit => write!(f, "monitorexit"),
        }
    }
}

#[cfg(test)]
mod decode_tests {
    use super::*;

    fn decode(code: &[u8]) -> (Instruction, usize) {
        Instruction::decode(code, 0, &ConstantPool::default()).unwrap()
    }

    #[test]
    fn it_should_decode_fast_path_locals() {
        assert_eq!(decode(&[ILOAD_3]), (Instruction::Load(Kind::Int, 3), 1));
        assert_eq!(decode(&[DSTORE_1]), (Instruction::Store(Kind::Double, 1), 1));
        assert_eq!(decode(&[ALOAD_0]), (Instruction::Load(Kind::Reference, 0), 1));
        assert_eq!(decode(&[LLOAD, 7]), (Instruction::Load(Kind::Long, 7), 2));
    }

    #[test]
    fn it_should_decode_arithmetic_families() {
        assert_eq!(
            decode(&[LDIV]).0,
            Instruction::Arith(Kind::Long, ArithOp::Div)
        );
        assert_eq!(
            decode(&[DREM]).0,
            Instruction::Arith(Kind::Double, ArithOp::Rem)
        );
        assert_eq!(decode(&[LUSHR]).0, Instruction::Shift(Kind::Long, ShiftOp::Ushr));
        assert_eq!(decode(&[IXOR]).0, Instruction::Bitwise(Kind::Int, BitOp::Xor));
    }

    #[test]
    fn it_should_decode_every_conversion() {
        let expected = [
            (I2L, Kind::Int, Kind::Long),
            (I2F, Kind::Int, Kind::Float),
            (I2D, Kind::Int, Kind::Double),
            (L2I, Kind::Long, Kind::Int),
            (L2F, Kind::Long, Kind::Float),
            (L2D, Kind::Long, Kind::Double),
            (F2I, Kind::Float, Kind::Int),
            (F2L, Kind::Float, Kind::Long),
            (F2D, Kind::Float, Kind::Double),
            (D2I, Kind::Double, Kind::Int),
            (D2L, Kind::Double, Kind::Long),
            (D2F, Kind::Double, Kind::Float),
        ];
        for (opcode, from, to) in expected {
            assert_eq!(decode(&[opcode]).0, Instruction::Convert { from, to });
        }
    }

    #[test]
    fn it_should_resolve_branches_relative_to_the_head() {
        let code = [NOP, NOP, IFLE, 0xff, 0xfe];
        let (instruction, length) =
            Instruction::decode(&code, 2, &ConstantPool::default()).unwrap();
        assert_eq!(length, 3);
        assert_eq!(
            instruction,
            Instruction::If {
                condition: Condition::Le,
                target: 0
            }
        );
    }

    #[test]
    fn it_should_align_switch_operands() {
        // tableswitch at offset 1: two bytes of padding
        let mut code = vec![NOP, TABLESWITCH, 0, 0];
        for value in [20i32, 0, 1, 10, 14] {
            code.extend_from_slice(&value.to_be_bytes());
        }
        let (instruction, length) =
            Instruction::decode(&code, 1, &ConstantPool::default()).unwrap();
        assert_eq!(length, 3 + 20);
        assert_eq!(
            instruction,
            Instruction::TableSwitch {
                default: 21,
                low: 0,
                targets: vec![11, 15]
            }
        );
    }

    #[test]
    fn it_should_decode_wide_locals() {
        assert_eq!(
            decode(&[WIDE, ILOAD, 0x01, 0x00]),
            (Instruction::Load(Kind::Int, 256), 4)
        );
        assert_eq!(
            decode(&[WIDE, IINC, 0x00, 0x02, 0xff, 0x00]),
            (
                Instruction::IInc {
                    index: 2,
                    delta: -256
                },
                6
            )
        );
    }

    #[test]
    fn it_should_reject_unknown_and_subroutine_opcodes() {
        let pool = ConstantPool::default();
        assert!(matches!(
            Instruction::decode(&[0xcb], 0, &pool),
            Err(ClassFileError::InvalidOpcode {
                opcode: 0xcb,
                offset: 0
            })
        ));
        assert!(matches!(
            Instruction::decode(&[JSR, 0, 3], 0, &pool),
            Err(ClassFileError::UnsupportedOpcode { mnemonic: "jsr", .. })
        ));
        assert!(matches!(
            Instruction::decode(&[SIPUSH, 1], 0, &pool),
            Err(ClassFileError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn it_should_remap_every_target() {
        let mut instruction = Instruction::LookupSwitch {
            default: 30,
            pairs: vec![(1, 10), (5, 20)],
        };
        instruction.remap_targets(&mut |t| t + 3);
        assert_eq!(instruction.targets(), vec![33, 13, 23]);
    }

    #[test]
    fn it_should_display_like_a_disassembler() {
        assert_eq!(decode(&[ICONST_M1]).0.to_string(), "push -1");
        assert_eq!(decode(&[FCMPG]).0.to_string(), "fcmpg");
        assert_eq!(decode(&[ASTORE_2]).0.to_string(), "astore 2");
        assert_eq!(decode(&[L2D]).0.to_string(), "l2d");
    }
}

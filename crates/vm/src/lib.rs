mod bytecode;
mod class;
mod class_source;
mod error;
mod natives;
mod runtime;
mod value;
mod vm;

pub use self::bytecode::{
    call_site::{CallSite, CallSiteKind, ConcatPart, ConcatSite, LambdaSite},
    instruction::{
        ArithOp, ArrayKind, BitOp, Condition, Instruction, InvokeKind, Kind, Literal, Narrowing,
        ShiftOp,
    },
    BytecodeContainer, Slot,
};
pub use self::class::{
    lazy::LazyClass,
    member::{Field, Method, MethodBody},
    Class, ClassId, InitState,
};
pub use self::class_source::{
    normalize_class_name, CachingSource, ChainedSource, ClassSource, DirectorySource, MemorySource,
};
pub use self::error::{Context, ErrorKind, Fault, LinkError, Result, ValidationError, VmError};
pub use self::natives::{NativeClass, NativeFn, NativeRegistry};
pub use self::runtime::{frame::Frame, Runtime};
pub use self::value::{Array, Instance, NativeObject, NativePayload, Stream, Value};
pub use self::vm::{AnnotationHandler, AnnotationTarget, LoaderId, Vm, VmOptions};

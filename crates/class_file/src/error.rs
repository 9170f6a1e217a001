use thiserror::Error;

use crate::constant_pool;

#[derive(Error, Debug)]
pub enum ClassFileError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("Unexpected end of data at offset {offset}: wanted {wanted} bytes, {remaining} left")]
    UnexpectedEof {
        offset: usize,
        wanted: usize,
        remaining: usize,
    },
    #[error("Invalid magic identifier: 0x{0:X}")]
    InvalidMagicIdentifier(u32),
    #[error("Invalid cp info tag {tag} at constant pool index {index}")]
    InvalidCpInfoTag { tag: u8, index: u16 },
    #[error("Constant pool index {index} out of range (pool has {len} slots)")]
    InvalidConstantPoolIndex { index: u16, len: usize },
    #[error("Expected {0}, found {1:?}")]
    UnexpectedConstantPoolEntry(&'static str, constant_pool::CpInfo),
    #[error("Constant pool entry {0} refers back to itself")]
    ConstantPoolCycle(u16),
    #[error("Required attribute {name} unparseable: {source}")]
    RequiredAttribute {
        name: String,
        #[source]
        source: Box<ClassFileError>,
    },
    #[error("Malformed {name} attribute: {reason}")]
    InvalidAttribute { name: &'static str, reason: String },
    #[error("Invalid descriptor {descriptor:?}: {reason}")]
    InvalidDescriptor { descriptor: String, reason: String },
    #[error("Invalid stack map frame type {0}")]
    InvalidFrameType(u8),
    #[error("Invalid verification type tag {0}")]
    InvalidVerificationType(u8),
    #[error("Invalid element value tag {0:?}")]
    InvalidElementValueTag(char),
    #[error("{0} trailing bytes after class file")]
    TrailingBytes(usize),
    #[error("Invalid opcode 0x{opcode:02x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("Unsupported instruction {mnemonic} at offset {offset}")]
    UnsupportedOpcode {
        mnemonic: &'static str,
        offset: usize,
    },
    #[error("Invalid operand at offset {offset}: {reason}")]
    InvalidOperand { offset: usize, reason: String },
}

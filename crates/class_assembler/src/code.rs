use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};

/// Jump target inside a [`Code`] body.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Label(usize);

#[derive(Debug, Clone)]
struct Fixup {
    /// Where the offset is written
    at: usize,
    /// Offset of the instruction the jump is relative to
    base: usize,
    label: Label,
    wide: bool,
}

/// Body of a `Code` attribute.
///
/// Branch offsets are written as placeholders and patched once every label
/// has been placed.
#[derive(Debug, Clone)]
pub struct Code {
    max_stack: u16,
    max_locals: u16,
    bytes: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    exception_table: Vec<(u16, u16, u16, u16)>,
    attributes: Vec<(u16, Vec<u8>)>,
}

impl Code {
    pub fn new(max_stack: u16, max_locals: u16) -> Self {
        Self {
            max_stack,
            max_locals,
            bytes: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Offset of the next instruction.
    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.bytes.push(opcode);
        self
    }

    pub fn op_u1(&mut self, opcode: u8, operand: u8) -> &mut Self {
        self.bytes.extend([opcode, operand]);
        self
    }

    pub fn op_i1(&mut self, opcode: u8, operand: i8) -> &mut Self {
        self.op_u1(opcode, operand as u8)
    }

    pub fn op_u2(&mut self, opcode: u8, operand: u16) -> &mut Self {
        self.bytes.push(opcode);
        self.bytes.extend(operand.to_be_bytes());
        self
    }

    pub fn op_i2(&mut self, opcode: u8, operand: i16) -> &mut Self {
        self.op_u2(opcode, operand as u16)
    }

    /// Append raw bytes.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current position.
    pub fn place(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.bytes.len());
        self
    }

    /// Branch instruction with a 2-byte offset (`if*`, `goto`, ...).
    pub fn branch(&mut self, opcode: u8, label: Label) -> &mut Self {
        let base = self.bytes.len();
        self.bytes.extend([opcode, 0, 0]);
        self.fixups.push(Fixup {
            at: base + 1,
            base,
            label,
            wide: false,
        });
        self
    }

    /// Branch instruction with a 4-byte offset (`goto_w`).
    pub fn branch_w(&mut self, opcode: u8, label: Label) -> &mut Self {
        let base = self.bytes.len();
        self.bytes.extend([opcode, 0, 0, 0, 0]);
        self.fixups.push(Fixup {
            at: base + 1,
            base,
            label,
            wide: true,
        });
        self
    }

    pub fn table_switch(&mut self, default: Label, low: i32, targets: &[Label]) -> &mut Self {
        let base = self.switch_header(0xaa, default);
        self.bytes.extend(low.to_be_bytes());
        let high = low + targets.len() as i32 - 1;
        self.bytes.extend(high.to_be_bytes());
        for target in targets {
            self.wide_offset(base, *target);
        }
        self
    }

    pub fn lookup_switch(&mut self, default: Label, pairs: &[(i32, Label)]) -> &mut Self {
        let base = self.switch_header(0xab, default);
        self.bytes.extend((pairs.len() as i32).to_be_bytes());
        for (key, target) in pairs {
            self.bytes.extend(key.to_be_bytes());
            self.wide_offset(base, *target);
        }
        self
    }

    pub fn invoke_interface(&mut self, index: u16, count: u8) -> &mut Self {
        self.op_u2(0xb9, index);
        self.bytes.extend([count, 0]);
        self
    }

    pub fn invoke_dynamic(&mut self, index: u16) -> &mut Self {
        self.op_u2(0xba, index);
        self.bytes.extend([0, 0]);
        self
    }

    pub fn exception_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: u16,
    ) -> &mut Self {
        // Label ids, resolved in to_bytes
        self.exception_table
            .push((start.0 as u16, end.0 as u16, handler.0 as u16, catch_type));
        self
    }

    /// Nested attribute of the code, eg. a `LineNumberTable`.
    pub fn attribute(&mut self, name_index: u16, body: Vec<u8>) -> &mut Self {
        self.attributes.push((name_index, body));
        self
    }

    /// Instruction bytes with every branch offset patched.
    pub fn code_bytes(&self) -> io::Result<Vec<u8>> {
        let mut bytes = self.bytes.clone();
        for fixup in &self.fixups {
            let target = self.resolve(fixup.label)?;
            let offset = target as i64 - fixup.base as i64;
            if fixup.wide {
                bytes[fixup.at..fixup.at + 4].copy_from_slice(&(offset as i32).to_be_bytes());
            } else {
                let offset = i16::try_from(offset).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "branch offset out of range")
                })?;
                bytes[fixup.at..fixup.at + 2].copy_from_slice(&offset.to_be_bytes());
            }
        }
        Ok(bytes)
    }

    /// Body of the `Code` attribute.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let code = self.code_bytes()?;
        let mut out = Vec::new();
        out.write_u16::<BigEndian>(self.max_stack)?;
        out.write_u16::<BigEndian>(self.max_locals)?;
        out.write_u32::<BigEndian>(code.len() as u32)?;
        out.write_all(&code)?;
        out.write_u16::<BigEndian>(self.exception_table.len() as u16)?;
        for (start, end, handler, catch_type) in &self.exception_table {
            for label in [start, end, handler] {
                out.write_u16::<BigEndian>(self.resolve(Label(*label as usize))? as u16)?;
            }
            out.write_u16::<BigEndian>(*catch_type)?;
        }
        out.write_u16::<BigEndian>(self.attributes.len() as u16)?;
        for (name_index, body) in &self.attributes {
            out.write_u16::<BigEndian>(*name_index)?;
            out.write_u32::<BigEndian>(body.len() as u32)?;
            out.write_all(body)?;
        }
        Ok(out)
    }

    fn switch_header(&mut self, opcode: u8, default: Label) -> usize {
        let base = self.bytes.len();
        self.bytes.push(opcode);
        while self.bytes.len() % 4 != 0 {
            self.bytes.push(0);
        }
        self.wide_offset(base, default);
        base
    }

    fn wide_offset(&mut self, base: usize, label: Label) {
        self.fixups.push(Fixup {
            at: self.bytes.len(),
            base,
            label,
            wide: true,
        });
        self.bytes.extend([0, 0, 0, 0]);
    }

    fn resolve(&self, label: Label) -> io::Result<usize> {
        self.labels
            .get(label.0)
            .copied()
            .flatten()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "label was never placed"))
    }
}

pub mod call_site;
pub mod instruction;

use std::rc::Rc;

use just_class_file::{attributes::CodeAttribute, constant_pool::Constant, ConstantPool};
use log::{debug, trace};

use self::{
    call_site::{ConcatSite, LambdaSite},
    instruction::Instruction,
};
use crate::{class::Class, error::ValidationError, Context, Result};

const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";
const STRING_CONCAT_FACTORY: &str = "java/lang/invoke/StringConcatFactory";

/// Instruction stored at the offset of its first byte.
#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub opcode: u8,
    pub instruction: Instruction,
    /// Length in bytes
    pub length: usize,
}

/// Decoded body of a method, indexed by byte offset. Only offsets where an
/// instruction starts hold a slot.
#[derive(Debug)]
pub struct BytecodeContainer {
    slots: Vec<Option<Slot>>,
    pub max_stack: u16,
    pub max_locals: u16,
    optimized: bool,
    validated: bool,
}

impl BytecodeContainer {
    pub fn decode(code: &CodeAttribute, pool: &ConstantPool) -> Result<Self> {
        let bytes = &code.code;
        let mut slots = vec![None; bytes.len()];
        let mut offset = 0;
        while offset < bytes.len() {
            let (instruction, length) = Instruction::decode(bytes, offset, pool)?;
            trace!("{:>5}: {}", offset, instruction);
            slots[offset] = Some(Slot {
                opcode: bytes[offset],
                instruction,
                length,
            });
            offset += length;
        }

        Ok(Self {
            slots,
            max_stack: code.max_stack,
            max_locals: code.max_locals,
            optimized: false,
            validated: false,
        })
    }

    /// Length of the code in bytes.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Instruction starting at `offset`.
    pub fn get(&self, offset: isize) -> Option<&Slot> {
        usize::try_from(offset)
            .ok()
            .and_then(|offset| self.slots.get(offset))
            .and_then(Option::as_ref)
    }

    /// Instructions with their offsets, in code order.
    pub fn instructions(&self) -> impl Iterator<Item = (usize, &Slot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(offset, slot)| slot.as_ref().map(|slot| (offset, slot)))
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Replace `invokedynamic` instructions whose bootstrap method is a
    /// known factory with the call site it would produce. Offsets do not
    /// move. Running it again does nothing.
    pub fn optimize(&mut self, class: &Class) -> Result<()> {
        if self.optimized {
            return Ok(());
        }

        for (offset, slot) in self.slots.iter_mut().enumerate() {
            let slot = match slot {
                Some(slot) => slot,
                None => continue,
            };
            if let Some(replacement) = materialize(&slot.instruction, class)
                .with_context(|| format!("at {}: {}", offset, slot.instruction))?
            {
                debug!("{}: {} becomes {}", offset, slot.instruction, replacement);
                slot.instruction = replacement;
            }
        }

        self.optimized = true;
        Ok(())
    }

    /// Check that every branch lands on an instruction and every local is
    /// within `max_locals`. Running it again does nothing.
    pub fn validate(&mut self) -> Result<()> {
        if self.validated {
            return Ok(());
        }

        for (offset, slot) in self.instructions() {
            for target in slot.instruction.targets() {
                if self.get(target).is_none() {
                    return Err(ValidationError::BadJumpTarget { offset, target }.into());
                }
            }
            if let Some((index, wide)) = slot.instruction.local() {
                let needed = index as u32 + if wide { 2 } else { 1 };
                if needed > self.max_locals as u32 {
                    return Err(ValidationError::LocalOutOfRange {
                        offset,
                        index,
                        max_locals: self.max_locals,
                    }
                    .into());
                }
            }
        }

        self.validated = true;
        Ok(())
    }

    /// Replace the instruction at `offset` with `replacement`, laid out one
    /// after the other. Later instructions move by the difference in length
    /// and every branch target past `offset` follows them.
    pub fn rewrite(&mut self, offset: usize, replacement: Vec<Slot>) -> Result<()> {
        let old_length = match self.get(offset as isize) {
            Some(slot) => slot.length,
            None => return Err(ValidationError::NotAnInstruction(offset as isize).into()),
        };
        let new_length: usize = replacement.iter().map(|slot| slot.length).sum();
        let delta = new_length as isize - old_length as isize;

        let tail = self.slots.split_off(offset + old_length);
        self.slots.truncate(offset);
        for slot in replacement {
            let length = slot.length;
            self.slots.push(Some(slot));
            self.slots
                .extend(std::iter::repeat(None).take(length.saturating_sub(1)));
        }
        self.slots.extend(tail);

        let boundary = offset as isize;
        let replaced = offset..offset + new_length;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if replaced.contains(&i) {
                continue;
            }
            if let Some(slot) = slot {
                slot.instruction
                    .remap_targets(&mut |t| if t > boundary { t + delta } else { t });
            }
        }

        self.validated = false;
        Ok(())
    }
}

fn materialize(instruction: &Instruction, class: &Class) -> Result<Option<Instruction>> {
    let dynamic = match instruction {
        Instruction::InvokeDynamic(dynamic) => dynamic,
        _ => return Ok(None),
    };
    let bootstrap = class
        .bootstrap_methods()
        .get(dynamic.bootstrap_method_attr_index as usize)
        .ok_or_else(|| {
            ValidationError::BadConstant(format!(
                "bootstrap method {} of {} does not exist",
                dynamic.bootstrap_method_attr_index, class.name
            ))
        })?;
    let factory = &bootstrap.method.reference;

    let replacement = match (&*factory.class, &*factory.name) {
        (LAMBDA_METAFACTORY, "metafactory" | "altMetafactory") => Instruction::LambdaFactory(
            Rc::new(LambdaSite::from_bootstrap(dynamic, bootstrap, class.loader)?),
        ),
        (STRING_CONCAT_FACTORY, "makeConcatWithConstants") => {
            let recipe = match bootstrap.arguments.first() {
                Some(Constant::String(recipe)) => recipe,
                _ => {
                    return Err(ValidationError::BadConstant(
                        "makeConcatWithConstants without a recipe".to_owned(),
                    )
                    .into())
                }
            };
            Instruction::StringConcat(Rc::new(ConcatSite::with_recipe(
                &dynamic.descriptor,
                recipe,
                &bootstrap.arguments[1..],
            )?))
        }
        (STRING_CONCAT_FACTORY, "makeConcat") => {
            Instruction::StringConcat(Rc::new(ConcatSite::plain(&dynamic.descriptor)?))
        }
        _ => {
            debug!("leaving invokedynamic through {} as is", factory);
            return Ok(None);
        }
    };
    Ok(Some(replacement))
}

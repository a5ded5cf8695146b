//! §4.F: serializes classes, functions, the string pool and the package
//! manifest into the byte-exact big-endian format of §6.
use std::io::{self, Write as IoWrite};

use byteorder::{BigEndian, WriteBytesExt};
use log::debug;

use super::opcode::{tag_of, PrimitiveKind};
use super::{BytecodeFile, CompiledClass, CompiledFunction, FORMAT_VERSION, Instruction};

pub struct Writer;

impl Writer {
    pub fn write(file: &BytecodeFile) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        out.write_u8(FORMAT_VERSION)?;

        out.write_u16::<BigEndian>(file.classes.len() as u16)?;

        out.write_u8(file.packages.len() as u8)?;
        for package in &file.packages {
            if package.standard {
                out.write_u8(0)?;
                continue;
            }
            out.write_u8(package.name.len() as u8)?;
            out.write_all(package.name.as_bytes())?;
            out.write_u16::<BigEndian>(package.major)?;
            out.write_u16::<BigEndian>(package.minor)?;
            out.write_u8(package.requires_native_binary as u8)?;
        }

        for class in &file.classes {
            Self::write_class(&mut out, class)?;
        }

        out.write_u16::<BigEndian>(file.string_pool.len() as u16)?;
        for string in &file.string_pool {
            let code_points: Vec<u32> = string.chars().map(|c| c as u32).collect();
            out.write_u16::<BigEndian>(code_points.len() as u16)?;
            for cp in code_points {
                out.write_u32::<BigEndian>(cp)?;
            }
        }

        out.write_u16::<BigEndian>(file.startup_class_index)?;
        out.write_u16::<BigEndian>(file.startup_type_method_vti)?;

        debug!("wrote bytecode file ({} bytes)", out.len());

        Ok(out)
    }

    fn write_class(out: &mut Vec<u8>, class: &CompiledClass) -> io::Result<()> {
        out.write_u32::<BigEndian>(class.name)?;
        out.write_u16::<BigEndian>(class.superclass_index)?;
        out.write_u16::<BigEndian>(class.instance_variable_count)?;
        out.write_u16::<BigEndian>(class.method_vtable_size)?;
        out.write_u16::<BigEndian>(class.type_method_vtable_size)?;
        out.write_u8(class.inherits_initializers as u8)?;
        out.write_u16::<BigEndian>(class.initializer_vtable_size)?;

        out.write_u16::<BigEndian>(class.methods.len() as u16)?;
        out.write_u16::<BigEndian>(class.initializers.len() as u16)?;
        out.write_u16::<BigEndian>(class.type_methods.len() as u16)?;

        for function in class
            .methods
            .iter()
            .chain(class.initializers.iter())
            .chain(class.type_methods.iter())
        {
            Self::write_function(out, function)?;
        }

        match &class.protocol_table {
            Some(table) if !table.entries.is_empty() => {
                out.write_u16::<BigEndian>(table.entries.len() as u16)?;
                out.write_u16::<BigEndian>(table.max_index)?;
                out.write_u16::<BigEndian>(table.min_index)?;
                for entry in &table.entries {
                    out.write_u16::<BigEndian>(entry.protocol_index)?;
                    out.write_u16::<BigEndian>(entry.method_vtis.len() as u16)?;
                    for vti in &entry.method_vtis {
                        out.write_u16::<BigEndian>(*vti)?;
                    }
                }
            }
            _ => {
                out.write_u16::<BigEndian>(0)?;
            }
        }

        match &class.deinitializer {
            Some(function) => {
                out.write_u8(1)?;
                Self::write_function(out, function)?;
            }
            None => out.write_u8(0)?,
        }

        Ok(())
    }

    fn write_function(out: &mut Vec<u8>, function: &CompiledFunction) -> io::Result<()> {
        out.write_u32::<BigEndian>(function.name)?;
        out.write_u16::<BigEndian>(function.vti)?;
        out.write_u8(function.argument_count)?;
        out.write_u8(function.native as u8)?;

        if !function.native {
            let variable_count = function.variable_count.unwrap_or(0);
            out.write_u8(variable_count)?;

            let words = encode_instructions(&function.instructions);
            out.write_u32::<BigEndian>(words.len() as u32)?;
            for word in words {
                out.write_u32::<BigEndian>(word)?;
            }
        }

        Ok(())
    }
}

/// Computes the word-position of every instruction in `instrs` (the
/// opcode word plus its fixed operand words; nested closure bodies are
/// just more instructions in the same flat stream) and returns the fully
/// encoded word stream with every jump/skip target patched from an
/// instruction index to `(target - placeholder - 1)`, per §4.E.
fn encode_instructions(instrs: &[Instruction]) -> Vec<u32> {
    let mut positions = Vec::with_capacity(instrs.len() + 1);
    let mut pos = 0usize;
    for instr in instrs {
        positions.push(pos);
        pos += 1 + instr.fixed_operand_words();
    }
    positions.push(pos);

    let mut words = Vec::with_capacity(pos);
    for instr in instrs {
        encode_one(instr, &positions, &mut words);
    }
    words
}

fn patch(placeholder_pos: usize, target_index: usize, positions: &[usize]) -> u32 {
    let target_pos = positions[target_index] as i64;
    let placeholder_pos = placeholder_pos as i64;
    (target_pos - placeholder_pos - 1) as u32
}

fn primitive_kind_tag(kind: PrimitiveKind) -> u32 {
    match kind {
        PrimitiveKind::Integer => 0,
        PrimitiveKind::Double => 1,
        PrimitiveKind::Boolean => 2,
        PrimitiveKind::Symbol => 3,
    }
}

fn encode_one(instr: &Instruction, positions: &[usize], words: &mut Vec<u32>) {
    let this_pos = words.len();
    words.push(tag_of(instr));

    match instr {
        Instruction::PushInteger(v) => {
            words.push((*v as u64 >> 32) as u32);
            words.push(*v as u64 as u32);
        }
        Instruction::PushDouble(v) => {
            let bits = v.to_bits();
            words.push((bits >> 32) as u32);
            words.push(bits as u32);
        }
        Instruction::PushBoolean(b) => words.push(*b as u32),
        Instruction::PushSymbol(c) => words.push(*c as u32),
        Instruction::PushStringFromPool(i) => words.push(*i),
        Instruction::BuildInterpolatedString(n) => words.push(*n),
        Instruction::LoadLocal(slot) | Instruction::StoreLocal(slot) => words.push(*slot as u32),
        Instruction::LoadInstanceVariable(slot) | Instruction::StoreInstanceVariable(slot) => {
            words.push(*slot as u32)
        }
        Instruction::LoadSelf => {}
        Instruction::Dispatch { vti, argument_count } => {
            words.push(*vti as u32);
            words.push(*argument_count as u32);
        }
        Instruction::DispatchTypeMethod { class_index, vti } => {
            words.push(*class_index as u32);
            words.push(*vti as u32);
        }
        Instruction::DispatchProtocol {
            protocol_index,
            vti,
            argument_count,
        } => {
            words.push(*protocol_index as u32);
            words.push(*vti as u32);
            words.push(*argument_count as u32);
        }
        Instruction::SafeDispatch {
            vti,
            argument_count,
            skip_to,
        } => {
            words.push(*vti as u32);
            words.push(*argument_count as u32);
            let placeholder_pos = words.len();
            words.push(patch(placeholder_pos, *skip_to, positions));
        }
        Instruction::CallInitializer { class_index, vti } => {
            words.push(*class_index as u32);
            words.push(*vti as u32);
        }
        Instruction::SuperInitializerCall { vti } => words.push(*vti as u32),
        Instruction::CastClass(idx) | Instruction::CastProtocol(idx) => words.push(*idx as u32),
        Instruction::CastPrimitive(kind) | Instruction::CastDynamic(kind) => {
            words.push(primitive_kind_tag(*kind))
        }
        Instruction::OptionalUnwrap => {}
        Instruction::BuildList(n) | Instruction::BuildDictionary(n) => words.push(*n),
        Instruction::BuildRange { with_step, inclusive } => {
            words.push(*with_step as u32 | ((*inclusive as u32) << 1))
        }
        Instruction::Jump(target) => {
            let placeholder_pos = words.len();
            words.push(patch(placeholder_pos, *target, positions));
        }
        Instruction::JumpIfFalse(target) => {
            let placeholder_pos = words.len();
            words.push(patch(placeholder_pos, *target, positions));
        }
        Instruction::ForEachListNext { body_end }
        | Instruction::ForEachEnumerableNext { body_end }
        | Instruction::ForEachRangeNext { body_end } => {
            let placeholder_pos = words.len();
            words.push(patch(placeholder_pos, *body_end, positions));
        }
        Instruction::BuildClosure {
            variable_count,
            argument_count,
            captures_self,
            captured_slots,
            body_end,
        } => {
            words.push(*variable_count as u32);
            words.push(((*argument_count as u32) << 1) | (*captures_self as u32));
            words.push(captured_slots.len() as u32);
            for slot in captured_slots {
                words.push(*slot as u32);
            }
            let placeholder_pos = words.len();
            words.push(patch(placeholder_pos, *body_end, positions));
        }
        Instruction::BuildCapturedMethod { vti, protocol_index } => {
            words.push(*vti as u32);
            words.push(*protocol_index as u32);
        }
        Instruction::Primitive(op) => words.push(super::opcode::primitive_op_tag(*op)),
        Instruction::GetStringFromPool(i) => words.push(*i),
        Instruction::GetClassByIndex(i) => words.push(*i as u32),
        Instruction::Pop | Instruction::Return => {}
    }

    debug_assert_eq!(words.len(), this_pos + 1 + instr.fixed_operand_words());
}

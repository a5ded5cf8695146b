//! §4.G: the inverse of [`super::Writer`] — parses the byte-exact format
//! of §6 back into the in-memory [`super::BytecodeFile`] shape. Resolving
//! a native function's symbol against a loaded package is the loader's
//! job (`crate::packages`), not the reader's: a `CompiledFunction` with
//! `native == true` decodes with an empty instruction stream and is
//! linked later.
use std::collections::HashMap;
use std::fmt;

use byteorder::{BigEndian, ReadBytesExt};

use super::opcode::{primitive_kind_from_tag, primitive_op_from_tag};
use super::{
    BytecodeFile, ClassProtocolTable, CompiledClass, CompiledFunction, Instruction,
    PackageSection, ProtocolTableEntry, FORMAT_VERSION,
};

#[derive(Debug)]
pub enum ReadError {
    UnexpectedEof,
    UnsupportedVersion(u8),
    UnknownOpcode(u32),
    UnknownPrimitiveOp(u32),
    UnknownPrimitiveKind(u32),
    BadJumpTarget(usize),
    InvalidUtf8Codepoint(u32),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::UnexpectedEof => write!(f, "unexpected end of bytecode file"),
            ReadError::UnsupportedVersion(v) => {
                write!(f, "unsupported bytecode format version {v}, expected {FORMAT_VERSION}")
            }
            ReadError::UnknownOpcode(tag) => write!(f, "unknown opcode tag {tag}"),
            ReadError::UnknownPrimitiveOp(tag) => write!(f, "unknown primitive operation tag {tag}"),
            ReadError::UnknownPrimitiveKind(tag) => write!(f, "unknown primitive kind tag {tag}"),
            ReadError::BadJumpTarget(pos) => {
                write!(f, "jump target does not land on an instruction boundary (word {pos})")
            }
            ReadError::InvalidUtf8Codepoint(cp) => write!(f, "invalid code point {cp:#x} in string pool"),
        }
    }
}

impl std::error::Error for ReadError {}

impl From<std::io::Error> for ReadError {
    fn from(_: std::io::Error) -> Self {
        ReadError::UnexpectedEof
    }
}

pub struct Reader;

impl Reader {
    pub fn read(bytes: &[u8]) -> Result<BytecodeFile, ReadError> {
        let mut cursor = std::io::Cursor::new(bytes);

        let version = cursor.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(ReadError::UnsupportedVersion(version));
        }

        let class_count = cursor.read_u16::<BigEndian>()?;

        let package_count = cursor.read_u8()?;
        let mut packages = Vec::with_capacity(package_count as usize);
        for _ in 0..package_count {
            let name_len = cursor.read_u8()?;
            if name_len == 0 {
                packages.push(PackageSection {
                    standard: true,
                    name: String::new(),
                    major: 0,
                    minor: 0,
                    requires_native_binary: false,
                });
                continue;
            }
            let mut name_bytes = vec![0u8; name_len as usize];
            std::io::Read::read_exact(&mut cursor, &mut name_bytes)?;
            let name = String::from_utf8_lossy(&name_bytes).into_owned();
            let major = cursor.read_u16::<BigEndian>()?;
            let minor = cursor.read_u16::<BigEndian>()?;
            let requires_native_binary = cursor.read_u8()? != 0;
            packages.push(PackageSection {
                standard: false,
                name,
                major,
                minor,
                requires_native_binary,
            });
        }

        let mut classes = Vec::with_capacity(class_count as usize);
        for _ in 0..class_count {
            classes.push(Self::read_class(&mut cursor)?);
        }

        let string_pool_count = cursor.read_u16::<BigEndian>()?;
        let mut string_pool = Vec::with_capacity(string_pool_count as usize);
        for _ in 0..string_pool_count {
            let len = cursor.read_u16::<BigEndian>()?;
            let mut s = String::with_capacity(len as usize);
            for _ in 0..len {
                let cp = cursor.read_u32::<BigEndian>()?;
                s.push(char::from_u32(cp).ok_or(ReadError::InvalidUtf8Codepoint(cp))?);
            }
            string_pool.push(s);
        }

        let startup_class_index = cursor.read_u16::<BigEndian>()?;
        let startup_type_method_vti = cursor.read_u16::<BigEndian>()?;

        Ok(BytecodeFile {
            version,
            packages,
            classes,
            string_pool,
            startup_class_index,
            startup_type_method_vti,
        })
    }

    fn read_class(cursor: &mut std::io::Cursor<&[u8]>) -> Result<CompiledClass, ReadError> {
        let name = cursor.read_u32::<BigEndian>()?;
        let superclass_index = cursor.read_u16::<BigEndian>()?;
        let instance_variable_count = cursor.read_u16::<BigEndian>()?;
        let method_vtable_size = cursor.read_u16::<BigEndian>()?;
        let type_method_vtable_size = cursor.read_u16::<BigEndian>()?;
        let inherits_initializers = cursor.read_u8()? != 0;
        let initializer_vtable_size = cursor.read_u16::<BigEndian>()?;

        let method_count = cursor.read_u16::<BigEndian>()?;
        let initializer_count = cursor.read_u16::<BigEndian>()?;
        let type_method_count = cursor.read_u16::<BigEndian>()?;

        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(Self::read_function(cursor)?);
        }
        let mut initializers = Vec::with_capacity(initializer_count as usize);
        for _ in 0..initializer_count {
            initializers.push(Self::read_function(cursor)?);
        }
        let mut type_methods = Vec::with_capacity(type_method_count as usize);
        for _ in 0..type_method_count {
            type_methods.push(Self::read_function(cursor)?);
        }

        let entry_count = cursor.read_u16::<BigEndian>()?;
        let protocol_table = if entry_count == 0 {
            None
        } else {
            let max_index = cursor.read_u16::<BigEndian>()?;
            let min_index = cursor.read_u16::<BigEndian>()?;
            let mut entries = Vec::with_capacity(entry_count as usize);
            for _ in 0..entry_count {
                let protocol_index = cursor.read_u16::<BigEndian>()?;
                let vti_count = cursor.read_u16::<BigEndian>()?;
                let mut method_vtis = Vec::with_capacity(vti_count as usize);
                for _ in 0..vti_count {
                    method_vtis.push(cursor.read_u16::<BigEndian>()?);
                }
                entries.push(ProtocolTableEntry {
                    protocol_index,
                    method_vtis,
                });
            }
            Some(ClassProtocolTable {
                min_index,
                max_index,
                entries,
            })
        };

        let deinitializer = if cursor.read_u8()? != 0 {
            Some(Self::read_function(cursor)?)
        } else {
            None
        };

        Ok(CompiledClass {
            name,
            superclass_index,
            instance_variable_count,
            method_vtable_size,
            type_method_vtable_size,
            inherits_initializers,
            initializer_vtable_size,
            methods,
            initializers,
            type_methods,
            protocol_table,
            deinitializer,
        })
    }

    fn read_function(cursor: &mut std::io::Cursor<&[u8]>) -> Result<CompiledFunction, ReadError> {
        let name = cursor.read_u32::<BigEndian>()?;
        let vti = cursor.read_u16::<BigEndian>()?;
        let argument_count = cursor.read_u8()?;
        let native = cursor.read_u8()? != 0;

        if native {
            return Ok(CompiledFunction {
                name,
                vti,
                argument_count,
                native,
                variable_count: None,
                instructions: Vec::new(),
            });
        }

        let variable_count = cursor.read_u8()?;
        let word_count = cursor.read_u32::<BigEndian>()?;
        let mut words = Vec::with_capacity(word_count as usize);
        for _ in 0..word_count {
            words.push(cursor.read_u32::<BigEndian>()?);
        }
        let instructions = decode_instructions(&words)?;

        Ok(CompiledFunction {
            name,
            vti,
            argument_count,
            native,
            variable_count: Some(variable_count),
            instructions,
        })
    }
}

/// A jump/skip field awaiting resolution from a raw word position (read
/// eagerly from the patched offset) to an instruction index, once every
/// instruction's starting word position is known.
enum Pending {
    Jump(usize),
    JumpIfFalse(usize),
    SafeDispatchSkip(usize),
    ForEachListBody(usize),
    ForEachEnumerableBody(usize),
    ForEachRangeBody(usize),
    ClosureBody(usize),
}

fn decode_instructions(words: &[u32]) -> Result<Vec<Instruction>, ReadError> {
    let mut instructions = Vec::new();
    let mut positions = Vec::new();
    let mut pending: Vec<(usize, Pending)> = Vec::new();

    let mut pos = 0usize;
    while pos < words.len() {
        positions.push(pos);
        let index = instructions.len();
        let tag = read_word(words, pos)?;
        pos += 1;
        let instr = decode_one(tag, words, &mut pos, index, &mut pending)?;
        instructions.push(instr);
    }

    let mut pos_to_index: HashMap<usize, usize> = HashMap::with_capacity(positions.len() + 1);
    for (index, p) in positions.iter().enumerate() {
        pos_to_index.insert(*p, index);
    }
    pos_to_index.insert(words.len(), instructions.len());

    for (index, field) in pending {
        let target_word_pos = match &field {
            Pending::Jump(p)
            | Pending::JumpIfFalse(p)
            | Pending::SafeDispatchSkip(p)
            | Pending::ForEachListBody(p)
            | Pending::ForEachEnumerableBody(p)
            | Pending::ForEachRangeBody(p)
            | Pending::ClosureBody(p) => *p,
        };
        let resolved = *pos_to_index
            .get(&target_word_pos)
            .ok_or(ReadError::BadJumpTarget(target_word_pos))?;
        match field {
            Pending::Jump(_) => instructions[index] = Instruction::Jump(resolved),
            Pending::JumpIfFalse(_) => instructions[index] = Instruction::JumpIfFalse(resolved),
            Pending::SafeDispatchSkip(_) => {
                if let Instruction::SafeDispatch { vti, argument_count, .. } = instructions[index] {
                    instructions[index] = Instruction::SafeDispatch {
                        vti,
                        argument_count,
                        skip_to: resolved,
                    };
                }
            }
            Pending::ForEachListBody(_) => {
                instructions[index] = Instruction::ForEachListNext { body_end: resolved }
            }
            Pending::ForEachEnumerableBody(_) => {
                instructions[index] = Instruction::ForEachEnumerableNext { body_end: resolved }
            }
            Pending::ForEachRangeBody(_) => {
                instructions[index] = Instruction::ForEachRangeNext { body_end: resolved }
            }
            Pending::ClosureBody(_) => {
                if let Instruction::BuildClosure {
                    variable_count,
                    argument_count,
                    captures_self,
                    captured_slots,
                    ..
                } = instructions[index].clone()
                {
                    instructions[index] = Instruction::BuildClosure {
                        variable_count,
                        argument_count,
                        captures_self,
                        captured_slots,
                        body_end: resolved,
                    };
                }
            }
        }
    }

    Ok(instructions)
}

fn read_word(words: &[u32], pos: usize) -> Result<u32, ReadError> {
    words.get(pos).copied().ok_or(ReadError::UnexpectedEof)
}

/// Resolves a patched offset (written as `target - placeholder - 1`) back
/// into the absolute word position it targets: `placeholder + value + 1`.
fn resolve_patch(placeholder_pos: usize, value: u32) -> usize {
    placeholder_pos + value as usize + 1
}

fn decode_one(
    tag: u32,
    words: &[u32],
    pos: &mut usize,
    index: usize,
    pending: &mut Vec<(usize, Pending)>,
) -> Result<Instruction, ReadError> {
    let mut next = || -> Result<u32, ReadError> {
        let w = read_word(words, *pos)?;
        *pos += 1;
        Ok(w)
    };

    Ok(match tag {
        0 => {
            let hi = next()? as u64;
            let lo = next()? as u64;
            Instruction::PushInteger(((hi << 32) | lo) as i64)
        }
        1 => {
            let hi = next()? as u64;
            let lo = next()? as u64;
            Instruction::PushDouble(f64::from_bits((hi << 32) | lo))
        }
        2 => Instruction::PushBoolean(next()? != 0),
        3 => Instruction::PushSymbol(char::from_u32(next()?).unwrap_or('\u{fffd}')),
        4 => Instruction::PushStringFromPool(next()?),
        5 => Instruction::BuildInterpolatedString(next()?),
        6 => Instruction::LoadLocal(next()? as u16),
        7 => Instruction::StoreLocal(next()? as u16),
        8 => Instruction::LoadInstanceVariable(next()? as u16),
        9 => Instruction::StoreInstanceVariable(next()? as u16),
        10 => Instruction::LoadSelf,
        11 => Instruction::Dispatch {
            vti: next()? as u16,
            argument_count: next()? as u8,
        },
        12 => Instruction::DispatchTypeMethod {
            class_index: next()? as u16,
            vti: next()? as u16,
        },
        13 => Instruction::DispatchProtocol {
            protocol_index: next()? as u16,
            vti: next()? as u16,
            argument_count: next()? as u8,
        },
        14 => {
            let vti = next()? as u16;
            let argument_count = next()? as u8;
            let placeholder_pos = *pos;
            let value = next()?;
            pending.push((
                index,
                Pending::SafeDispatchSkip(resolve_patch(placeholder_pos, value)),
            ));
            Instruction::SafeDispatch {
                vti,
                argument_count,
                skip_to: 0,
            }
        }
        15 => Instruction::CallInitializer {
            class_index: next()? as u16,
            vti: next()? as u16,
        },
        16 => Instruction::SuperInitializerCall { vti: next()? as u16 },
        17 => Instruction::CastClass(next()? as u16),
        18 => Instruction::CastProtocol(next()? as u16),
        19 => {
            let kind_tag = next()?;
            Instruction::CastPrimitive(
                primitive_kind_from_tag(kind_tag).ok_or(ReadError::UnknownPrimitiveKind(kind_tag))?,
            )
        }
        20 => {
            let kind_tag = next()?;
            Instruction::CastDynamic(
                primitive_kind_from_tag(kind_tag).ok_or(ReadError::UnknownPrimitiveKind(kind_tag))?,
            )
        }
        21 => Instruction::OptionalUnwrap,
        22 => Instruction::BuildList(next()?),
        23 => Instruction::BuildDictionary(next()?),
        24 => {
            let flags = next()?;
            Instruction::BuildRange {
                with_step: flags & 0b01 != 0,
                inclusive: flags & 0b10 != 0,
            }
        }
        25 => {
            let placeholder_pos = *pos;
            let value = next()?;
            pending.push((index, Pending::Jump(resolve_patch(placeholder_pos, value))));
            Instruction::Jump(0)
        }
        26 => {
            let placeholder_pos = *pos;
            let value = next()?;
            pending.push((
                index,
                Pending::JumpIfFalse(resolve_patch(placeholder_pos, value)),
            ));
            Instruction::JumpIfFalse(0)
        }
        27 => {
            let placeholder_pos = *pos;
            let value = next()?;
            pending.push((
                index,
                Pending::ForEachListBody(resolve_patch(placeholder_pos, value)),
            ));
            Instruction::ForEachListNext { body_end: 0 }
        }
        28 => {
            let placeholder_pos = *pos;
            let value = next()?;
            pending.push((
                index,
                Pending::ForEachEnumerableBody(resolve_patch(placeholder_pos, value)),
            ));
            Instruction::ForEachEnumerableNext { body_end: 0 }
        }
        29 => {
            let placeholder_pos = *pos;
            let value = next()?;
            pending.push((
                index,
                Pending::ForEachRangeBody(resolve_patch(placeholder_pos, value)),
            ));
            Instruction::ForEachRangeNext { body_end: 0 }
        }
        30 => {
            let variable_count = next()? as u16;
            let packed = next()?;
            let argument_count = (packed >> 1) as u8;
            let captures_self = (packed & 1) != 0;
            let captured_count = next()?;
            let mut captured_slots = Vec::with_capacity(captured_count as usize);
            for _ in 0..captured_count {
                captured_slots.push(next()? as u16);
            }
            let placeholder_pos = *pos;
            let value = next()?;
            pending.push((
                index,
                Pending::ClosureBody(resolve_patch(placeholder_pos, value)),
            ));
            Instruction::BuildClosure {
                variable_count,
                argument_count,
                captures_self,
                captured_slots,
                body_end: 0,
            }
        }
        31 => Instruction::BuildCapturedMethod {
            vti: next()? as u16,
            protocol_index: next()? as u16,
        },
        32 => {
            let op_tag = next()?;
            Instruction::Primitive(
                primitive_op_from_tag(op_tag).ok_or(ReadError::UnknownPrimitiveOp(op_tag))?,
            )
        }
        33 => Instruction::GetStringFromPool(next()?),
        34 => Instruction::GetClassByIndex(next()? as u16),
        35 => Instruction::Pop,
        36 => Instruction::Return,
        other => return Err(ReadError::UnknownOpcode(other)),
    })
}

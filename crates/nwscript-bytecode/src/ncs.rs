//! Binary NCS encoding.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! "NCS V1.0"  8 bytes signature
//! 0x42        program marker
//! u32         total file length, header included
//! ...         instructions: opcode u8, qualifier u8, operands
//! ```
//!
//! Jump operands are signed 32-bit byte offsets measured from the start of
//! the instruction stream (the byte after the header).

use crate::instruction::{BinaryOpcode, Constant, Instruction, JumpKind, UnaryOpcode};
use crate::opcode::{
    Opcode, PairCode, TypeCode, QUALIFIER_COPY, QUALIFIER_INT, QUALIFIER_NONE, QUALIFIER_STORE_STATE,
};
use crate::stream::{Position, Program};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};
use thiserror::Error;

pub const SIGNATURE: &[u8; 8] = b"NCS V1.0";
pub const PROGRAM_MARKER: u8 = 0x42;
/// Signature, marker and length.
pub const HEADER_LEN: u32 = 13;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("string constant of {0} bytes exceeds the u16 length field")]
    StringTooLong(usize),

    #[error("jump at {at} targets {target}, outside the program")]
    TargetOutOfRange { at: Position, target: Position },

    #[error("program of {0} bytes exceeds the u32 length field")]
    ProgramTooLarge(u64),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("not an NCS program: bad signature")]
    BadSignature,

    #[error("header declares {declared} bytes but the file has {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("unknown opcode {opcode:#04x} at byte {offset:#x}")]
    UnknownOpcode { offset: u32, opcode: u8 },

    #[error("opcode {opcode:?} has invalid qualifier {qualifier:#04x} at byte {offset:#x}")]
    BadQualifier {
        offset: u32,
        opcode: Opcode,
        qualifier: u8,
    },

    #[error("jump at byte {offset:#x} lands mid-instruction at {target:#x}")]
    MisalignedJump { offset: u32, target: i64 },

    #[error("truncated instruction at byte {offset:#x}")]
    Truncated { offset: u32 },
}

/// Encode a program to NCS bytes.
pub fn encode(program: &Program) -> Result<Vec<u8>, EncodeError> {
    let offsets = program.byte_offsets();
    let code_len = offsets.last().copied().unwrap_or(0) as u64;
    let total = code_len + HEADER_LEN as u64;
    let total = u32::try_from(total).map_err(|_| EncodeError::ProgramTooLarge(total))?;

    let mut out = Vec::with_capacity(total as usize);
    out.write_all(SIGNATURE)?;
    out.write_u8(PROGRAM_MARKER)?;
    out.write_u32::<BigEndian>(total)?;

    for (index, instruction) in program.instructions().iter().enumerate() {
        let at = Position(index as u32);
        write_instruction(&mut out, instruction, |target| {
            offsets
                .get(target.index())
                .map(|&offset| offset as i32)
                .ok_or(EncodeError::TargetOutOfRange { at, target })
        })?;
    }
    debug_assert_eq!(out.len(), total as usize);
    Ok(out)
}

fn write_instruction<W: Write>(
    out: &mut W,
    instruction: &Instruction,
    resolve: impl Fn(Position) -> Result<i32, EncodeError>,
) -> Result<(), EncodeError> {
    out.write_u8(instruction.opcode().byte())?;
    out.write_u8(instruction.qualifier())?;
    match instruction {
        Instruction::CpDownSp { offset, size }
        | Instruction::CpTopSp { offset, size }
        | Instruction::CpDownBp { offset, size }
        | Instruction::CpTopBp { offset, size } => {
            out.write_i32::<BigEndian>(*offset)?;
            out.write_u16::<BigEndian>(*size)?;
        }
        Instruction::Const(Constant::Int(value)) => out.write_i32::<BigEndian>(*value)?,
        Instruction::Const(Constant::Float(value)) => out.write_f32::<BigEndian>(*value)?,
        Instruction::Const(Constant::Object(value)) => out.write_u32::<BigEndian>(*value)?,
        Instruction::Const(Constant::String(value)) => {
            let len = u16::try_from(value.len()).map_err(|_| EncodeError::StringTooLong(value.len()))?;
            out.write_u16::<BigEndian>(len)?;
            out.write_all(value.as_bytes())?;
        }
        Instruction::Action { routine, argc } => {
            out.write_u16::<BigEndian>(*routine)?;
            out.write_u8(*argc)?;
        }
        Instruction::Binary {
            operands: PairCode::StructStruct(size),
            ..
        } => out.write_u16::<BigEndian>(*size)?,
        Instruction::MovSp { offset }
        | Instruction::DecISp { offset }
        | Instruction::IncISp { offset }
        | Instruction::DecIBp { offset }
        | Instruction::IncIBp { offset } => out.write_i32::<BigEndian>(*offset)?,
        Instruction::Jump { target, .. } => out.write_i32::<BigEndian>(resolve(*target)?)?,
        Instruction::Destruct {
            size,
            keep_offset,
            keep_size,
        } => {
            out.write_u16::<BigEndian>(*size)?;
            out.write_u16::<BigEndian>(*keep_offset)?;
            out.write_u16::<BigEndian>(*keep_size)?;
        }
        Instruction::StoreState { bp_size, sp_size } => {
            out.write_u32::<BigEndian>(*bp_size)?;
            out.write_u32::<BigEndian>(*sp_size)?;
        }
        Instruction::RsAdd(_)
        | Instruction::Binary { .. }
        | Instruction::Unary { .. }
        | Instruction::Retn
        | Instruction::SaveBp
        | Instruction::RestoreBp
        | Instruction::Nop => {}
    }
    Ok(())
}

/// Decode NCS bytes into a program.
///
/// Instructions are stepped using only the opcode and qualifier; jump byte
/// offsets are mapped back to instruction positions afterwards.
pub fn decode(bytes: &[u8]) -> Result<Program, DecodeError> {
    if bytes.len() < HEADER_LEN as usize || &bytes[..8] != SIGNATURE || bytes[8] != PROGRAM_MARKER {
        return Err(DecodeError::BadSignature);
    }
    let declared = u32::from_be_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);
    if declared as usize != bytes.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }

    let code = &bytes[HEADER_LEN as usize..];
    let mut cursor = Cursor::new(code);
    let mut offsets = Vec::new();
    // Raw jump operands, resolved once every instruction boundary is known.
    let mut raw_jumps = Vec::new();
    let mut instructions = Vec::new();

    while (cursor.position() as usize) < code.len() {
        let offset = cursor.position() as u32;
        let truncated = |_: io::Error| DecodeError::Truncated { offset };
        let opcode_byte = cursor.read_u8().map_err(truncated)?;
        let opcode = Opcode::from_byte(opcode_byte).ok_or(DecodeError::UnknownOpcode {
            offset,
            opcode: opcode_byte,
        })?;
        let qualifier = cursor.read_u8().map_err(truncated)?;
        let bad_qualifier = DecodeError::BadQualifier {
            offset,
            opcode,
            qualifier,
        };

        let instruction = read_operands(&mut cursor, opcode, qualifier)
            .map_err(truncated)?
            .ok_or(bad_qualifier)?;
        let instruction = match instruction {
            Decoded::Ready(instruction) => instruction,
            Decoded::Jump(kind, raw) => {
                raw_jumps.push((instructions.len(), offset, raw));
                Instruction::Jump {
                    kind,
                    target: Position::UNRESOLVED,
                }
            }
        };
        offsets.push(offset);
        instructions.push(instruction);
    }
    offsets.push(code.len() as u32);

    for (index, offset, raw) in raw_jumps {
        let target = u32::try_from(raw)
            .ok()
            .and_then(|raw| offsets.binary_search(&raw).ok())
            .ok_or(DecodeError::MisalignedJump {
                offset,
                target: raw as i64,
            })?;
        if let Instruction::Jump { target: slot, .. } = &mut instructions[index] {
            *slot = Position(target as u32);
        }
    }

    Ok(Program::from_instructions(instructions))
}

enum Decoded {
    Ready(Instruction),
    Jump(JumpKind, i32),
}

/// Read the operands of `opcode`. `Ok(None)` means the qualifier is invalid.
fn read_operands(
    cursor: &mut Cursor<&[u8]>,
    opcode: Opcode,
    qualifier: u8,
) -> io::Result<Option<Decoded>> {
    let ready = |instruction| Ok(Some(Decoded::Ready(instruction)));
    let fixed = |expected: u8| qualifier == expected;

    match opcode {
        Opcode::CpDownSp | Opcode::CpTopSp | Opcode::CpDownBp | Opcode::CpTopBp if fixed(QUALIFIER_COPY) => {
            let offset = cursor.read_i32::<BigEndian>()?;
            let size = cursor.read_u16::<BigEndian>()?;
            ready(match opcode {
                Opcode::CpDownSp => Instruction::CpDownSp { offset, size },
                Opcode::CpTopSp => Instruction::CpTopSp { offset, size },
                Opcode::CpDownBp => Instruction::CpDownBp { offset, size },
                _ => Instruction::CpTopBp { offset, size },
            })
        }
        Opcode::RsAdd => match TypeCode::from_byte(qualifier) {
            Some(code) => ready(Instruction::RsAdd(code)),
            None => Ok(None),
        },
        Opcode::Const => match TypeCode::from_byte(qualifier) {
            Some(TypeCode::Int) => ready(Instruction::Const(Constant::Int(cursor.read_i32::<BigEndian>()?))),
            Some(TypeCode::Float) => ready(Instruction::Const(Constant::Float(cursor.read_f32::<BigEndian>()?))),
            Some(TypeCode::Object) => ready(Instruction::Const(Constant::Object(cursor.read_u32::<BigEndian>()?))),
            Some(TypeCode::String) => {
                let len = cursor.read_u16::<BigEndian>()? as usize;
                let mut buf = vec![0u8; len];
                cursor.read_exact(&mut buf)?;
                // game strings are often Windows-1252, not UTF-8
                let value = match String::from_utf8(buf) {
                    Ok(value) => value,
                    Err(err) => {
                        let value = String::from_utf8_lossy(err.as_bytes()).into_owned();
                        tracing::warn!(text = %value, "string constant is not UTF-8, decoded lossily");
                        value
                    }
                };
                ready(Instruction::Const(Constant::String(value)))
            }
            _ => Ok(None),
        },
        Opcode::Action if fixed(QUALIFIER_NONE) => {
            let routine = cursor.read_u16::<BigEndian>()?;
            let argc = cursor.read_u8()?;
            ready(Instruction::Action { routine, argc })
        }
        Opcode::Neg | Opcode::Comp | Opcode::Not => {
            let op = match opcode {
                Opcode::Neg => UnaryOpcode::Neg,
                Opcode::Comp => UnaryOpcode::Comp,
                _ => UnaryOpcode::Not,
            };
            match TypeCode::from_byte(qualifier) {
                Some(operand) => ready(Instruction::Unary { op, operand }),
                None => Ok(None),
            }
        }
        Opcode::MovSp if fixed(QUALIFIER_NONE) => ready(Instruction::MovSp {
            offset: cursor.read_i32::<BigEndian>()?,
        }),
        Opcode::Jmp | Opcode::Jsr | Opcode::Jz | Opcode::Jnz if fixed(QUALIFIER_NONE) => {
            let kind = match opcode {
                Opcode::Jmp => JumpKind::Jmp,
                Opcode::Jsr => JumpKind::Jsr,
                Opcode::Jz => JumpKind::Jz,
                _ => JumpKind::Jnz,
            };
            Ok(Some(Decoded::Jump(kind, cursor.read_i32::<BigEndian>()?)))
        }
        Opcode::Retn if fixed(QUALIFIER_NONE) => ready(Instruction::Retn),
        Opcode::Destruct if fixed(QUALIFIER_COPY) => {
            let size = cursor.read_u16::<BigEndian>()?;
            let keep_offset = cursor.read_u16::<BigEndian>()?;
            let keep_size = cursor.read_u16::<BigEndian>()?;
            ready(Instruction::Destruct {
                size,
                keep_offset,
                keep_size,
            })
        }
        Opcode::DecISp | Opcode::IncISp | Opcode::DecIBp | Opcode::IncIBp if fixed(QUALIFIER_INT) => {
            let offset = cursor.read_i32::<BigEndian>()?;
            ready(match opcode {
                Opcode::DecISp => Instruction::DecISp { offset },
                Opcode::IncISp => Instruction::IncISp { offset },
                Opcode::DecIBp => Instruction::DecIBp { offset },
                _ => Instruction::IncIBp { offset },
            })
        }
        Opcode::SaveBp if fixed(QUALIFIER_NONE) => ready(Instruction::SaveBp),
        Opcode::RestoreBp if fixed(QUALIFIER_NONE) => ready(Instruction::RestoreBp),
        Opcode::StoreState if fixed(QUALIFIER_STORE_STATE) => {
            let bp_size = cursor.read_u32::<BigEndian>()?;
            let sp_size = cursor.read_u32::<BigEndian>()?;
            ready(Instruction::StoreState { bp_size, sp_size })
        }
        Opcode::Nop if fixed(QUALIFIER_NONE) => ready(Instruction::Nop),
        _ => match BinaryOpcode::from_opcode(opcode) {
            Some(op) => match PairCode::from_byte(qualifier) {
                Some(PairCode::StructStruct(_)) => ready(Instruction::Binary {
                    op,
                    operands: PairCode::StructStruct(cursor.read_u16::<BigEndian>()?),
                }),
                Some(operands) => ready(Instruction::Binary { op, operands }),
                None => Ok(None),
            },
            None => Ok(None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::InstructionStream;

    fn sample() -> Program {
        let mut stream = InstructionStream::new();
        stream.append(Instruction::Const(Constant::Int(7)));
        let jz = stream.reserve(JumpKind::Jz);
        stream.append(Instruction::Const(Constant::String("hi".into())));
        stream.append(Instruction::Action { routine: 1, argc: 1 });
        let end = stream.next_position();
        stream.patch(jz, end);
        stream.append(Instruction::Retn);
        stream.finalize().unwrap()
    }

    #[test]
    fn test_header_and_length() {
        let bytes = encode(&sample()).unwrap();
        assert_eq!(&bytes[..8], b"NCS V1.0");
        assert_eq!(bytes[8], 0x42);
        let declared = u32::from_be_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);
        assert_eq!(declared as usize, bytes.len());
        // CONSTI(6) JZ(6) CONSTS(4+2) ACTION(5) RETN(2)
        assert_eq!(bytes.len(), 13 + 6 + 6 + 6 + 5 + 2);
    }

    #[test]
    fn test_jump_operand_is_absolute_byte_offset() {
        let bytes = encode(&sample()).unwrap();
        let jz = &bytes[13 + 6..13 + 12];
        assert_eq!(jz[0], 0x1F);
        assert_eq!(jz[1], 0x00);
        // RETN starts after CONSTI, JZ, CONSTS and ACTION
        assert_eq!(i32::from_be_bytes([jz[2], jz[3], jz[4], jz[5]]), 6 + 6 + 6 + 5);
    }

    #[test]
    fn test_decode_restores_positions() {
        let program = sample();
        let decoded = decode(&encode(&program).unwrap()).unwrap();
        assert_eq!(decoded, program);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(decode(b"NCS V2.0"), Err(DecodeError::BadSignature)));

        let mut bytes = encode(&sample()).unwrap();
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(DecodeError::LengthMismatch { .. })));

        let mut bytes = encode(&sample()).unwrap();
        bytes[13] = 0x1C;
        assert!(matches!(decode(&bytes), Err(DecodeError::UnknownOpcode { opcode: 0x1C, .. })));

        let mut bytes = encode(&sample()).unwrap();
        bytes[13 + 1] = 0x07;
        assert!(matches!(decode(&bytes), Err(DecodeError::BadQualifier { .. })));
    }

    #[test]
    fn test_decode_rejects_misaligned_jump() {
        let mut bytes = encode(&sample()).unwrap();
        // point the JZ into the middle of CONSTI
        bytes[13 + 6 + 5] = 3;
        bytes[13 + 6 + 4] = 0;
        bytes[13 + 6 + 3] = 0;
        bytes[13 + 6 + 2] = 0;
        assert!(matches!(decode(&bytes), Err(DecodeError::MisalignedJump { .. })));
    }
}

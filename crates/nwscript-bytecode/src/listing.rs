//! Human-readable program listings.

use crate::instruction::Instruction;
use crate::ncs::HEADER_LEN;
use crate::stream::Program;
use std::fmt::Write;

/// Render one line per instruction: file byte offset, mnemonic, operands.
///
/// Jump targets are shown as file byte offsets, matching what a hex dump of
/// the encoded program shows.
///
/// ```text
/// 0000000d  RSADDI
/// 0000000f  JSR 00000015
/// ```
pub fn listing(program: &Program) -> String {
    let offsets = program.byte_offsets();
    let mut out = String::new();
    for (index, instruction) in program.instructions().iter().enumerate() {
        let address = offsets[index] + HEADER_LEN;
        let _ = match instruction {
            Instruction::Jump { target, .. } => {
                let target = offsets
                    .get(target.index())
                    .map(|offset| format!("{:08x}", offset + HEADER_LEN))
                    .unwrap_or_else(|| target.to_string());
                writeln!(out, "{address:08x}  {} {target}", instruction.mnemonic())
            }
            _ => writeln!(out, "{address:08x}  {instruction}"),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Constant, JumpKind};
    use crate::opcode::TypeCode;
    use crate::stream::InstructionStream;

    #[test]
    fn test_listing_lines() {
        let mut stream = InstructionStream::new();
        stream.append(Instruction::RsAdd(TypeCode::Int));
        let jsr = stream.reserve(JumpKind::Jsr);
        stream.append(Instruction::Retn);
        let entry = stream.append(Instruction::Const(Constant::Int(2)));
        stream.patch(jsr, entry);
        stream.append(Instruction::Retn);

        let text = listing(&stream.finalize().unwrap());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "0000000d  RSADDI",
                "0000000f  JSR 00000017",
                "00000015  RETN",
                "00000017  CONSTI 2",
                "0000001d  RETN",
            ]
        );
    }
}

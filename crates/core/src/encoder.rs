//! Module for encoding NeoVM instructions back into script bytes.

use crate::decoder::Instruction;
use crate::opcode::OperandSize;
use crate::result::{Error, Result};

/// Encodes a sequence of instructions into a script.
///
/// The `pc` fields are ignored; bytes are emitted in slice order. Operands are checked
/// against the opcode layout so that `decode_script(encode(x)) == x` for any sequence that
/// encodes successfully.
///
/// # Examples
/// ```rust
/// use nefopt_core::Opcode;
/// use nefopt_core::decoder::Instruction;
/// use nefopt_core::encoder::encode;
///
/// let ins = Instruction::new(Opcode::PUSHINT8, vec![0x2a]);
/// let bytes = encode(&[ins, Instruction::simple(Opcode::RET)]).unwrap();
/// assert_eq!(bytes, vec![0x00, 0x2a, 0x40]);
/// ```
pub fn encode(instructions: &[Instruction]) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(instructions.iter().map(Instruction::byte_size).sum());

    for ins in instructions {
        encode_into(ins, &mut bytes)?;
    }

    tracing::debug!(
        "Successfully encoded {} instructions into {} bytes",
        instructions.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Appends a single instruction to `out`.
pub fn encode_into(ins: &Instruction, out: &mut Vec<u8>) -> Result<()> {
    out.push(ins.op.to_byte());
    match ins.op.operand_size() {
        OperandSize::Empty => {
            if !ins.operand.is_empty() {
                return Err(Error::InvalidOperand {
                    pc: ins.pc,
                    op: ins.op,
                    reason: format!("expected no operand, got {} bytes", ins.operand.len()),
                });
            }
        }
        OperandSize::Fixed(n) => {
            if ins.operand.len() != n {
                tracing::error!(
                    "Invalid operand length for {}: expected {} bytes, got {} bytes",
                    ins.op,
                    n,
                    ins.operand.len()
                );
                return Err(Error::InvalidOperand {
                    pc: ins.pc,
                    op: ins.op,
                    reason: format!("expected {n} operand bytes, got {}", ins.operand.len()),
                });
            }
            out.extend_from_slice(&ins.operand);
        }
        OperandSize::Prefix(width) => {
            let len = ins.operand.len();
            let fits = match width {
                1 => len <= u8::MAX as usize,
                2 => len <= u16::MAX as usize,
                _ => len <= u32::MAX as usize,
            };
            if !fits {
                return Err(Error::InvalidOperand {
                    pc: ins.pc,
                    op: ins.op,
                    reason: format!("{len} payload bytes exceed a {width}-byte length prefix"),
                });
            }
            out.extend_from_slice(&(len as u64).to_le_bytes()[..width]);
            out.extend_from_slice(&ins.operand);
        }
    }
    Ok(())
}

/// Builds the minimal instruction that pushes `data` (`PUSHDATA1/2/4` by length).
pub fn push_data(data: &[u8]) -> Instruction {
    let op = match data.len() {
        n if n <= u8::MAX as usize => crate::Opcode::PUSHDATA1,
        n if n <= u16::MAX as usize => crate::Opcode::PUSHDATA2,
        _ => crate::Opcode::PUSHDATA4,
    };
    Instruction::new(op, data.to_vec())
}

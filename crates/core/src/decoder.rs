//! Single entry-point for turning NeoVM script bytes into an instruction stream.

use crate::Opcode;
use crate::opcode::OperandSize;
use crate::result::{Error, Result};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Single decoded NeoVM instruction with address, opcode and operand bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Byte offset of the opcode within the script
    pub pc: usize,
    /// Parsed opcode
    pub op: Opcode,
    /// Operand bytes. For `PUSHDATA*` this is the payload without its length prefix.
    pub operand: Vec<u8>,
}

impl Instruction {
    /// Creates an instruction that has not been placed in a script yet.
    pub fn new(op: Opcode, operand: Vec<u8>) -> Self {
        Self { pc: 0, op, operand }
    }

    /// Creates an operand-less instruction.
    pub fn simple(op: Opcode) -> Self {
        Self::new(op, Vec::new())
    }

    /// Returns the encoded size: opcode byte, length prefix (if any) and operand.
    #[inline]
    pub fn byte_size(&self) -> usize {
        match self.op.operand_size() {
            OperandSize::Empty => 1,
            OperandSize::Fixed(n) => 1 + n,
            OperandSize::Prefix(width) => 1 + width + self.operand.len(),
        }
    }

    /// Signed offset of jumps, calls, `ENDTRY` and `PUSHA`, relative to `pc`.
    pub fn jump_offset(&self) -> Option<i32> {
        if !self.op.has_single_target() {
            return None;
        }
        if self.op.is_long_form() {
            self.read_i32(0)
        } else {
            self.operand.first().map(|b| *b as i8 as i32)
        }
    }

    /// Catch and finally offsets of `TRY`/`TRY_L`. Zero means the handler is absent.
    pub fn try_offsets(&self) -> Option<(i32, i32)> {
        match self.op {
            Opcode::TRY => Some((
                *self.operand.first()? as i8 as i32,
                *self.operand.get(1)? as i8 as i32,
            )),
            Opcode::TRY_L => Some((self.read_i32(0)?, self.read_i32(4)?)),
            _ => None,
        }
    }

    pub fn token_u8(&self) -> Option<u8> {
        self.operand.first().copied()
    }

    pub fn token_u8_1(&self) -> Option<u8> {
        self.operand.get(1).copied()
    }

    pub fn token_u16(&self) -> Option<u16> {
        let bytes: [u8; 2] = self.operand.get(..2)?.try_into().ok()?;
        Some(u16::from_le_bytes(bytes))
    }

    pub fn token_u32(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.operand.get(..4)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }

    /// Integer pushed by this instruction, if it is an integer constant push.
    ///
    /// `PUSHINT*` operands are little-endian two's complement; `PUSHM1` and `PUSH0..PUSH16`
    /// carry their value in the opcode.
    pub fn push_integer(&self) -> Option<BigInt> {
        match self.op {
            Opcode::PUSHM1 => Some(BigInt::from(-1)),
            op if op >= Opcode::PUSH0 && op <= Opcode::PUSH16 => {
                Some(BigInt::from(op.to_byte() - Opcode::PUSH0.to_byte()))
            }
            op if op.is_int_push() => Some(BigInt::from_signed_bytes_le(&self.operand)),
            _ => None,
        }
    }

    fn read_i32(&self, at: usize) -> Option<i32> {
        let bytes: [u8; 4] = self.operand.get(at..at + 4)?.try_into().ok()?;
        Some(i32::from_le_bytes(bytes))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pc: six-digit decimal, opcode left-padded to 10 chars, then optional operand hex
        if self.operand.is_empty() {
            write!(f, "{:06}  {}", self.pc, self.op)
        } else {
            write!(
                f,
                "{:06}  {:<10} {}",
                self.pc,
                self.op,
                hex::encode(&self.operand)
            )
        }
    }
}

/// Decoded script with address lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
    by_pc: HashMap<usize, usize>,
    script_len: usize,
}

impl InstructionStream {
    /// Wraps instructions whose `pc` fields are already contiguous.
    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        let by_pc = instructions
            .iter()
            .enumerate()
            .map(|(idx, ins)| (ins.pc, idx))
            .collect();
        let script_len = instructions
            .last()
            .map(|ins| ins.pc + ins.byte_size())
            .unwrap_or(0);
        Self {
            instructions,
            by_pc,
            script_len,
        }
    }

    /// Instruction starting at `pc`, if any.
    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.by_pc.get(&pc).map(|idx| &self.instructions[*idx])
    }

    /// Position of the instruction starting at `pc` within the stream.
    pub fn index_of(&self, pc: usize) -> Option<usize> {
        self.by_pc.get(&pc).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Length in bytes of the script the stream was decoded from.
    pub fn script_len(&self) -> usize {
        self.script_len
    }

    /// True when `pc` is the first byte of an instruction.
    pub fn is_boundary(&self, pc: usize) -> bool {
        self.by_pc.contains_key(&pc)
    }
}

impl<'a> IntoIterator for &'a InstructionStream {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

/// Decodes a whole script.
pub fn decode_script(script: &[u8]) -> Result<InstructionStream> {
    let mut instructions = Vec::new();
    let mut pc = 0;
    while pc < script.len() {
        let ins = decode_instruction(script, pc)?;
        tracing::trace!(pc, op = %ins.op, size = ins.byte_size(), "decoded instruction");
        pc += ins.byte_size();
        instructions.push(ins);
    }
    tracing::debug!(
        "Decoded {} instructions from {} script bytes",
        instructions.len(),
        script.len()
    );
    Ok(InstructionStream::from_instructions(instructions))
}

/// Decodes the instruction that starts at `pc`.
pub fn decode_instruction(script: &[u8], pc: usize) -> Result<Instruction> {
    let byte = *script.get(pc).ok_or(Error::TruncatedOperand {
        pc,
        op: Opcode::NOP,
        needed: 1,
        remaining: 0,
    })?;
    let op = Opcode::from_byte(byte).ok_or(Error::UnknownOpcode { pc, byte })?;
    let rest = &script[pc + 1..];

    let operand = match op.operand_size() {
        OperandSize::Empty => Vec::new(),
        OperandSize::Fixed(n) => take(rest, n, pc, op)?.to_vec(),
        OperandSize::Prefix(width) => {
            let prefix = take(rest, width, pc, op)?;
            let mut len_bytes = [0u8; 8];
            len_bytes[..width].copy_from_slice(prefix);
            let len = usize::try_from(u64::from_le_bytes(len_bytes)).map_err(|_| {
                Error::InvalidOperand {
                    pc,
                    op,
                    reason: "length prefix does not fit in memory".into(),
                }
            })?;
            let payload = take(&rest[width..], len, pc, op).map_err(|_| {
                Error::TruncatedOperand {
                    pc,
                    op,
                    needed: width + len,
                    remaining: rest.len(),
                }
            })?;
            payload.to_vec()
        }
    };

    Ok(Instruction { pc, op, operand })
}

fn take(bytes: &[u8], n: usize, pc: usize, op: Opcode) -> Result<&[u8]> {
    bytes.get(..n).ok_or(Error::TruncatedOperand {
        pc,
        op,
        needed: n,
        remaining: bytes.len(),
    })
}

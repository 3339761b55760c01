//! Compile-time evaluation of integer arithmetic on constant operands.
//!
//! `PUSH a; PUSH b; OP` collapses to a single push of `a OP b` when the result is exactly
//! what NeoVM would compute. Faulting cases (division by zero, shift counts outside
//! `0..=256`, results outside the 32-byte integer range under a trapping policy) are left
//! alone so the fault still happens at run time.

use crate::{Result, Rewrite, Strategy, rewrite_blocks};
use nefopt_core::Opcode;
use nefopt_core::cfg_ir::{CfgIrBundle, InstrId};
use nefopt_core::decoder::Instruction;
use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Largest shift count NeoVM accepts for `SHL`/`SHR`.
pub const MAX_SHIFT: u32 = 256;

/// Opcodes the folder evaluates.
pub const FOLDABLE: [Opcode; 10] = [
    Opcode::ADD,
    Opcode::SUB,
    Opcode::MUL,
    Opcode::DIV,
    Opcode::MOD,
    Opcode::SHL,
    Opcode::SHR,
    Opcode::AND,
    Opcode::OR,
    Opcode::XOR,
];

static INT_MIN: LazyLock<BigInt> = LazyLock::new(|| -(BigInt::one() << 255u32));
static INT_MAX: LazyLock<BigInt> = LazyLock::new(|| (BigInt::one() << 255u32) - 1);
static MODULUS: LazyLock<BigInt> = LazyLock::new(|| BigInt::one() << 256u32);

/// What happens when a result leaves `[-2^255, 2^255)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// The VM faults; the fold is skipped.
    Trap,
    /// The result wraps to 256-bit two's complement.
    Wrap,
}

/// Per-opcode overflow behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArithmeticPolicy {
    pub overflow: BTreeMap<Opcode, OverflowPolicy>,
}

impl ArithmeticPolicy {
    /// NeoVM: every arithmetic opcode faults on overflow.
    pub fn neo_vm() -> Self {
        Self::uniform(OverflowPolicy::Trap)
    }

    pub fn uniform(policy: OverflowPolicy) -> Self {
        Self {
            overflow: FOLDABLE.iter().map(|op| (*op, policy)).collect(),
        }
    }

    /// Opcodes missing from the table trap.
    pub fn policy_for(&self, op: Opcode) -> OverflowPolicy {
        self.overflow
            .get(&op)
            .copied()
            .unwrap_or(OverflowPolicy::Trap)
    }
}

impl Default for ArithmeticPolicy {
    fn default() -> Self {
        Self::neo_vm()
    }
}

/// True when `value` fits a NeoVM integer.
pub fn in_range(value: &BigInt) -> bool {
    *value >= *INT_MIN && *value <= *INT_MAX
}

/// Reduces `value` to 256-bit two's complement.
pub fn wrap(value: &BigInt) -> BigInt {
    let mut wrapped = value % &*MODULUS;
    if wrapped.is_negative() {
        wrapped += &*MODULUS;
    }
    if wrapped > *INT_MAX {
        wrapped -= &*MODULUS;
    }
    wrapped
}

/// Evaluates `a op b` the way NeoVM does, or `None` when the VM would fault (or `op` is not
/// foldable).
pub fn evaluate(op: Opcode, a: &BigInt, b: &BigInt, policy: &ArithmeticPolicy) -> Option<BigInt> {
    let raw = match op {
        Opcode::ADD => a + b,
        Opcode::SUB => a - b,
        Opcode::MUL => a * b,
        // num-bigint division truncates toward zero and the remainder takes the sign of
        // the dividend, as in NeoVM.
        Opcode::DIV if !b.is_zero() => a / b,
        Opcode::MOD if !b.is_zero() => a % b,
        Opcode::SHL => a << shift_count(b)?,
        // Arithmetic shift: rounds toward negative infinity.
        Opcode::SHR => a >> shift_count(b)?,
        Opcode::AND => a & b,
        Opcode::OR => a | b,
        Opcode::XOR => a ^ b,
        _ => return None,
    };
    if in_range(&raw) {
        return Some(raw);
    }
    match policy.policy_for(op) {
        OverflowPolicy::Trap => None,
        OverflowPolicy::Wrap => Some(wrap(&raw)),
    }
}

fn shift_count(b: &BigInt) -> Option<u32> {
    b.to_u32().filter(|count| *count <= MAX_SHIFT)
}

/// Smallest instruction that pushes `value`: `PUSHM1`, `PUSH0..PUSH16`, or the narrowest
/// `PUSHINT*` holding its sign-extended little-endian bytes. Values wider than 32 bytes
/// yield `None`.
pub fn minimal_push(value: &BigInt) -> Option<Instruction> {
    if value == &BigInt::from(-1) {
        return Some(Instruction::simple(Opcode::PUSHM1));
    }
    if let Some(small) = value.to_u8().and_then(Opcode::small_push) {
        return Some(Instruction::simple(small));
    }
    let mut bytes = value.to_signed_bytes_le();
    let (op, width) = match bytes.len() {
        1 => (Opcode::PUSHINT8, 1),
        2 => (Opcode::PUSHINT16, 2),
        3..=4 => (Opcode::PUSHINT32, 4),
        5..=8 => (Opcode::PUSHINT64, 8),
        9..=16 => (Opcode::PUSHINT128, 16),
        17..=32 => (Opcode::PUSHINT256, 32),
        _ => return None,
    };
    let fill = if value.is_negative() { 0xFF } else { 0x00 };
    bytes.resize(width, fill);
    Some(Instruction::new(op, bytes))
}

/// Folds constant integer arithmetic inside basic blocks.
#[derive(Debug, Clone, Default)]
pub struct ConstantArithmetic {
    pub policy: ArithmeticPolicy,
}

impl ConstantArithmetic {
    pub fn new(policy: ArithmeticPolicy) -> Self {
        Self { policy }
    }

    /// Shift-reduce over one block: every instruction is pushed onto `out`, and whenever the
    /// top three entries form `PUSH a; PUSH b; OP` they are replaced by the folded push.
    /// Because the replacement is itself a constant push, folds cascade within the run.
    fn fold_block(&self, block: &[InstrId], rewrite: &mut Rewrite) -> Result<(Vec<InstrId>, usize)> {
        let mut out: Vec<InstrId> = Vec::with_capacity(block.len());
        let mut folds = 0;
        for id in block {
            out.push(*id);
            while let Some(folded) = self.try_fold(&out, rewrite) {
                let first = out[out.len() - 3];
                out.truncate(out.len() - 3);
                let push = rewrite.stand_in(folded, first);
                out.push(push);
                folds += 1;
            }
        }
        Ok((out, folds))
    }

    fn try_fold(&self, out: &[InstrId], rewrite: &Rewrite) -> Option<Instruction> {
        let [a_id, b_id, op_id] = out.get(out.len().checked_sub(3)?..)? else {
            return None;
        };
        let op = rewrite.instruction(*op_id)?;
        if !FOLDABLE.contains(&op.op) {
            return None;
        }
        let a = rewrite.instruction(*a_id)?;
        let b = rewrite.instruction(*b_id)?;
        let (x, y) = (a.push_integer()?, b.push_integer()?);
        let Some(value) = evaluate(op.op, &x, &y, &self.policy) else {
            tracing::trace!(
                pc = ?rewrite.arena.origin_pc(*op_id),
                "not folding {} {} {}: the VM would fault",
                x,
                op.op,
                y
            );
            return None;
        };
        let push = minimal_push(&value)?;
        tracing::debug!(
            pc = ?rewrite.arena.origin_pc(*a_id),
            "folded {} {} {} = {} as {}",
            x,
            op.op,
            y,
            value,
            push.op
        );
        Some(push)
    }
}

impl Strategy for ConstantArithmetic {
    fn name(&self) -> &'static str {
        "ConstantFold"
    }

    fn rewrite(&self, ir: &CfgIrBundle) -> Result<Rewrite> {
        let mut total = 0;
        let mut rewrite = rewrite_blocks(ir, |block, rewrite| {
            let (ids, folds) = self.fold_block(block, rewrite)?;
            total += folds;
            Ok(ids)
        })?;
        rewrite.changed = total > 0;
        tracing::debug!("{} constant folds", total);
        Ok(rewrite)
    }
}

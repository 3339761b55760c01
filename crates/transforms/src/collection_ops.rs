//! Collection-construction fusion.
//!
//! Arrays built element by element are rewritten into a single allocation. The rewrite runs
//! in two stages over each block:
//!
//! 1. `NEWARRAY0` followed by `DUP, <value>, APPEND` triples is lowered to a sized
//!    `NEWARRAY` followed by `DUP, PUSH index, <value>, SETITEM` groups.
//! 2. A sized `NEWARRAY`/`NEWARRAY_T` whose every slot is written by such a group is
//!    replaced by pushing the values in reverse index order and a single `PACK`.
//!
//! Stage 2 picks up the output of stage 1, so append chains end up packed in one run.
//!
//! Only constant values take part. `APPEND` and `SETITEM` store a copy of a `Struct` while
//! `PACK` stores the item itself, so a value loaded from a slot could end up aliased.

use crate::constant_arithmetic::minimal_push;
use crate::{Result, Rewrite, Strategy, rewrite_blocks};
use nefopt_core::Opcode;
use nefopt_core::cfg_ir::{CfgIrBundle, InstrId};
use nefopt_core::decoder::Instruction;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

/// Smallest element count worth fusing.
pub const DEFAULT_THRESHOLD: usize = 3;

/// `PACK` leaves all elements on the evaluation stack at once; larger arrays stay as they are.
pub const MAX_PACKED_ELEMENTS: usize = 1024;

/// True for a single instruction that pushes a constant primitive.
pub fn is_constant_value(ins: &Instruction) -> bool {
    ins.op.is_int_push()
        || ins.op.is_push_data()
        || matches!(ins.op, Opcode::PUSHNULL | Opcode::PUSHT | Opcode::PUSHF)
}

fn push_count(n: usize) -> Option<Instruction> {
    minimal_push(&BigInt::from(n))
}

#[derive(Debug, Clone)]
pub struct CollectionOps {
    pub threshold: usize,
}

impl Default for CollectionOps {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl CollectionOps {
    /// Thresholds below [`DEFAULT_THRESHOLD`] are raised to it; two appends are never fused.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(DEFAULT_THRESHOLD),
        }
    }

    fn op(rewrite: &Rewrite, id: Option<&InstrId>) -> Option<Opcode> {
        rewrite.instruction(*id?).map(|ins| ins.op)
    }

    /// Length of the `DUP, <value>, APPEND` run starting at `at`.
    fn append_run(rewrite: &Rewrite, block: &[InstrId], at: usize) -> usize {
        let mut count = 0;
        loop {
            let base = at + count * 3;
            let is_triple = Self::op(rewrite, block.get(base)) == Some(Opcode::DUP)
                && block
                    .get(base + 1)
                    .and_then(|id| rewrite.instruction(*id))
                    .is_some_and(is_constant_value)
                && Self::op(rewrite, block.get(base + 2)) == Some(Opcode::APPEND);
            if !is_triple {
                return count;
            }
            count += 1;
        }
    }

    fn lower_appends(&self, block: &[InstrId], rewrite: &mut Rewrite) -> (Vec<InstrId>, usize) {
        let mut out = Vec::with_capacity(block.len());
        let mut lowered = 0;
        let mut i = 0;
        while i < block.len() {
            let id = block[i];
            if Self::op(rewrite, Some(&id)) != Some(Opcode::NEWARRAY0) {
                out.push(id);
                i += 1;
                continue;
            }
            let n = Self::append_run(rewrite, block, i + 1);
            let fuses = (self.threshold..=MAX_PACKED_ELEMENTS).contains(&n);
            let Some(count) = push_count(n).filter(|_| fuses) else {
                out.push(id);
                i += 1;
                continue;
            };

            tracing::debug!(
                pc = ?rewrite.arena.origin_pc(id),
                "lowering {} appends to indexed stores",
                n
            );
            out.push(rewrite.stand_in(count, id));
            out.push(rewrite.fresh(Instruction::simple(Opcode::NEWARRAY)));
            for (k, triple) in block[i + 1..i + 1 + n * 3].chunks_exact(3).enumerate() {
                let Some(index) = push_count(k) else {
                    break;
                };
                out.push(triple[0]);
                out.push(rewrite.fresh(index));
                out.push(triple[1]);
                out.push(rewrite.stand_in(Instruction::simple(Opcode::SETITEM), triple[2]));
            }
            lowered += 1;
            i += 1 + n * 3;
        }
        (out, lowered)
    }

    /// Values of the `n` indexed stores following a sized allocation at `at`, ordered by
    /// index. `None` unless the indices cover `0..n` exactly once each.
    fn indexed_stores(
        rewrite: &Rewrite,
        block: &[InstrId],
        at: usize,
        n: usize,
    ) -> Option<Vec<InstrId>> {
        let groups = block.get(at..at + n * 4)?;
        let mut slots: Vec<Option<InstrId>> = vec![None; n];
        for group in groups.chunks_exact(4) {
            let [dup, index, value, store] = group else {
                return None;
            };
            if Self::op(rewrite, Some(dup)) != Some(Opcode::DUP)
                || Self::op(rewrite, Some(store)) != Some(Opcode::SETITEM)
                || !rewrite.instruction(*value).is_some_and(is_constant_value)
            {
                return None;
            }
            let index = rewrite.instruction(*index)?.push_integer()?.to_usize()?;
            let slot = slots.get_mut(index)?;
            if slot.is_some() {
                return None;
            }
            *slot = Some(*value);
        }
        slots.into_iter().collect()
    }

    fn pack_indexed_stores(
        &self,
        block: &[InstrId],
        rewrite: &mut Rewrite,
    ) -> (Vec<InstrId>, usize) {
        let mut out = Vec::with_capacity(block.len());
        let mut packed = 0;
        let mut i = 0;
        while i < block.len() {
            let id = block[i];
            let size = rewrite
                .instruction(id)
                .and_then(Instruction::push_integer)
                .and_then(|n| n.to_usize())
                .filter(|n| (self.threshold..=MAX_PACKED_ELEMENTS).contains(n));
            let allocates = matches!(
                Self::op(rewrite, block.get(i + 1)),
                Some(Opcode::NEWARRAY | Opcode::NEWARRAY_T)
            );
            let values = size
                .filter(|_| allocates)
                .and_then(|n| Some((n, Self::indexed_stores(rewrite, block, i + 2, n)?)));
            let Some((n, values)) = values else {
                out.push(id);
                i += 1;
                continue;
            };
            let (Some(count), Some(first)) =
                (push_count(n), values.last().and_then(|v| rewrite.instruction(*v)))
            else {
                out.push(id);
                i += 1;
                continue;
            };

            tracing::debug!(
                pc = ?rewrite.arena.origin_pc(id),
                "packing {} indexed stores",
                n
            );
            let first = first.clone();
            out.push(rewrite.stand_in(first, id));
            for value in values.iter().rev().skip(1) {
                if let Some(ins) = rewrite.instruction(*value).cloned() {
                    out.push(rewrite.fresh(ins));
                }
            }
            out.push(rewrite.fresh(count));
            out.push(rewrite.fresh(Instruction::simple(Opcode::PACK)));
            packed += 1;
            i += 2 + n * 4;
        }
        (out, packed)
    }
}

impl Strategy for CollectionOps {
    fn name(&self) -> &'static str {
        "CollectionFusion"
    }

    fn rewrite(&self, ir: &CfgIrBundle) -> Result<Rewrite> {
        let mut total = 0;
        let mut rewrite = rewrite_blocks(ir, |block, rewrite| {
            let (lowered, appends) = self.lower_appends(block, rewrite);
            let (packed, packs) = self.pack_indexed_stores(&lowered, rewrite);
            total += appends + packs;
            Ok(packed)
        })?;
        rewrite.changed = total > 0;
        tracing::debug!("{} collection fusions", total);
        Ok(rewrite)
    }
}

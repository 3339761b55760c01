//! Assigns concrete addresses to a rewritten program.
//!
//! Every address-valued operand is regenerated from the id-keyed edges of the [`Rewrite`].
//! Short jumps whose distance no longer fits a signed byte are widened to their `_L` form;
//! since widening moves later instructions, layout repeats until no instruction changes
//! size. Instructions are never narrowed, so the loop terminates.

use crate::{Result, Rewrite};
use nefopt_core::cfg_ir::{InstrId, TryTargets};
use nefopt_core::decoder::Instruction;
use nefopt_core::result::Error;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Old-address to new-address translation produced by relocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddressMap {
    /// Exact entries, including the old script end mapped to the new script end.
    entries: BTreeMap<usize, usize>,
    old_len: usize,
    new_len: usize,
}

impl AddressMap {
    /// New address of `old`. Addresses of removed instructions resolve to their nearest
    /// surviving successor.
    pub fn resolve(&self, old: usize) -> nefopt_core::result::Result<usize> {
        self.entries
            .range(old..)
            .next()
            .map(|(_, new)| *new)
            .ok_or(Error::MissingAddressMapping(old))
    }

    /// New address of `old` only if an instruction from `old` survived.
    pub fn exact(&self, old: usize) -> Option<usize> {
        self.entries.get(&old).copied()
    }

    pub fn entries(&self) -> &BTreeMap<usize, usize> {
        &self.entries
    }

    pub fn old_len(&self) -> usize {
        self.old_len
    }

    pub fn new_len(&self) -> usize {
        self.new_len
    }

    /// Entries whose address changed, for tracing.
    pub fn moved(&self) -> BTreeMap<usize, usize> {
        self.entries
            .iter()
            .filter(|(old, new)| old != new)
            .map(|(old, new)| (*old, *new))
            .collect()
    }
}

/// Output of [`relocate`].
#[derive(Debug, Clone)]
pub struct Relocation {
    /// Instructions with final `pc` fields and operands.
    pub instructions: Vec<Instruction>,
    pub address_map: AddressMap,
    /// Number of short forms widened.
    pub upgraded: usize,
}

impl Relocation {
    pub fn script_len(&self) -> usize {
        self.address_map.new_len
    }
}

enum Reference {
    Single(InstrId),
    Try(TryTargets),
}

/// Lays out `rewrite` and regenerates every address-valued operand.
pub fn relocate(rewrite: &Rewrite) -> Result<Relocation> {
    let mut program: Vec<Instruction> = Vec::with_capacity(rewrite.order.len());
    let mut position: HashMap<InstrId, usize> = HashMap::with_capacity(rewrite.order.len());
    for (idx, id) in rewrite.order.iter().enumerate() {
        let ins = rewrite.instruction(*id).ok_or(Error::DanglingTarget(id.0))?;
        program.push(ins.clone());
        position.insert(*id, idx);
    }

    let references = collect_references(rewrite, &program, &position)?;

    let mut upgraded = 0;
    let pcs = loop {
        let pcs = layout(&program);
        let mut widened = false;
        for (idx, reference) in &references {
            let ins = &program[*idx];
            if ins.op.is_long_form() || ins.op.long_form() == ins.op {
                continue;
            }
            let fits = distances(reference, *idx, &pcs, &position)?
                .iter()
                .all(|d| i8::try_from(*d).is_ok());
            if !fits {
                tracing::debug!(
                    pc = pcs[*idx],
                    "widening {} to {}",
                    ins.op,
                    ins.op.long_form()
                );
                let long = ins.op.long_form();
                program[*idx].op = long;
                upgraded += 1;
                widened = true;
            }
        }
        if !widened {
            break pcs;
        }
    };

    for (ins, pc) in program.iter_mut().zip(&pcs) {
        ins.pc = *pc;
    }
    for (idx, reference) in &references {
        let ds = distances(reference, *idx, &pcs, &position)?;
        let ins = &mut program[*idx];
        ins.operand = encode_distances(ins, &ds)?;
    }

    let new_len = program.last().map(|ins| ins.pc + ins.byte_size()).unwrap_or(0);
    let mut entries = BTreeMap::new();
    for (id, pc) in rewrite.order.iter().zip(&pcs) {
        if let Some(origin) = rewrite.arena.origin_pc(*id) {
            entries.entry(origin).or_insert(*pc);
        }
    }
    entries.insert(rewrite.script_len, new_len);

    tracing::debug!(
        "Relocated {} instructions into {} bytes ({} widened)",
        program.len(),
        new_len,
        upgraded
    );
    Ok(Relocation {
        instructions: program,
        address_map: AddressMap {
            entries,
            old_len: rewrite.script_len,
            new_len,
        },
        upgraded,
    })
}

/// Address-carrying instructions by position, checked against the ordering.
fn collect_references(
    rewrite: &Rewrite,
    program: &[Instruction],
    position: &HashMap<InstrId, usize>,
) -> Result<Vec<(usize, Reference)>> {
    let mut references = Vec::new();
    for (idx, id) in rewrite.order.iter().enumerate() {
        let op = program[idx].op;
        let reference = if op.has_single_target() {
            let target = rewrite
                .edges
                .jumps
                .get(id)
                .copied()
                .ok_or(Error::DanglingTarget(id.0))?;
            Reference::Single(target)
        } else if op.is_try() {
            Reference::Try(rewrite.edges.tries.get(id).copied().unwrap_or_default())
        } else {
            continue;
        };
        let targets = match &reference {
            Reference::Single(target) => vec![*target],
            Reference::Try(t) => [t.catch, t.finally].into_iter().flatten().collect(),
        };
        if let Some(missing) = targets.iter().find(|t| !position.contains_key(*t)) {
            return Err(Error::DanglingTarget(missing.0).into());
        }
        references.push((idx, reference));
    }
    Ok(references)
}

fn layout(program: &[Instruction]) -> Vec<usize> {
    let mut pc = 0;
    program
        .iter()
        .map(|ins| {
            let at = pc;
            pc += ins.byte_size();
            at
        })
        .collect()
}

/// Signed distances from the instruction at `idx` to its targets. An absent try handler
/// has distance zero.
fn distances(
    reference: &Reference,
    idx: usize,
    pcs: &[usize],
    position: &HashMap<InstrId, usize>,
) -> Result<Vec<i64>> {
    let from = pcs[idx] as i64;
    let to = |target: InstrId| -> Result<i64> {
        let at = position
            .get(&target)
            .ok_or(Error::DanglingTarget(target.0))?;
        Ok(pcs[*at] as i64 - from)
    };
    Ok(match reference {
        Reference::Single(target) => vec![to(*target)?],
        Reference::Try(targets) => vec![
            targets.catch.map(to).transpose()?.unwrap_or(0),
            targets.finally.map(to).transpose()?.unwrap_or(0),
        ],
    })
}

fn encode_distances(ins: &Instruction, distances: &[i64]) -> Result<Vec<u8>> {
    let mut operand = Vec::with_capacity(8);
    for d in distances {
        if ins.op.is_long_form() {
            let d = i32::try_from(*d).map_err(|_| out_of_range(ins, *d))?;
            operand.extend_from_slice(&d.to_le_bytes());
        } else {
            let d = i8::try_from(*d).map_err(|_| out_of_range(ins, *d))?;
            operand.push(d as u8);
        }
    }
    Ok(operand)
}

fn out_of_range(ins: &Instruction, distance: i64) -> Error {
    Error::InvalidBlockStructure(format!(
        "{} at {} cannot encode distance {}",
        ins.op, ins.pc, distance
    ))
}

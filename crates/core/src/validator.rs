//! Validate that every address a script or its companion artifacts mention lands on an
//! instruction boundary.
//!
//! The optimizer runs these checks on its own output as well as on input: a rewritten
//! script that fails here points at a relocation bug, not at a malformed artifact.

use crate::{
    decoder::{Instruction, InstructionStream, decode_script},
    debug_info::DebugInfo,
    manifest::ContractManifest,
    result::{Error, Result},
};

/// A reference that does not resolve to an instruction start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTarget {
    pub pc: usize,
    pub op: crate::Opcode,
    pub target: i64,
}

/// Lists every jump, call, `ENDTRY`, `PUSHA` or try handler whose target is outside the
/// script or inside another instruction.
pub fn find_invalid_targets(stream: &InstructionStream) -> Vec<InvalidTarget> {
    let mut invalid = Vec::new();
    for ins in stream {
        for offset in relative_targets(ins) {
            let target = ins.pc as i64 + offset as i64;
            let valid = usize::try_from(target)
                .is_ok_and(|pc| pc < stream.script_len() && stream.is_boundary(pc));
            if !valid {
                tracing::debug!(
                    pc = ins.pc,
                    op = %ins.op,
                    target,
                    "address operand does not land on an instruction"
                );
                invalid.push(InvalidTarget {
                    pc: ins.pc,
                    op: ins.op,
                    target,
                });
            }
        }
    }
    invalid
}

/// Decodes `script` and rejects it on the first invalid target.
pub fn validate_script(script: &[u8]) -> Result<InstructionStream> {
    let stream = decode_script(script)?;
    let invalid = find_invalid_targets(&stream);
    if let Some(first) = invalid.first() {
        tracing::warn!("Found {} invalid address operand(s)", invalid.len());
        return Err(Error::InvalidJumpTarget {
            pc: first.pc,
            op: first.op,
            target: first.target,
        });
    }
    Ok(stream)
}

/// Checks that manifest method offsets and debug ranges/sequence points are boundaries.
///
/// Method range ends may also equal the script length (the implicit final `RET`).
pub fn validate_addresses(
    stream: &InstructionStream,
    manifest: Option<&ContractManifest>,
    debug_info: Option<&DebugInfo>,
) -> Result<()> {
    if let Some(manifest) = manifest {
        for offset in manifest.method_offsets() {
            if !stream.is_boundary(offset) {
                return Err(Error::InvalidEntryPoint(offset));
            }
        }
    }
    if let Some(debug_info) = debug_info {
        let at_boundary =
            |pc: usize| stream.is_boundary(pc) || pc == stream.script_len();
        for method in &debug_info.methods {
            if !stream.is_boundary(method.range.start) {
                return Err(Error::InvalidEntryPoint(method.range.start));
            }
            if !at_boundary(method.range.end) {
                return Err(Error::InvalidDebugInfo(format!(
                    "method {} ends at {}, which is not an instruction",
                    method.id, method.range.end
                )));
            }
            if let Some(point) = method
                .sequence_points
                .iter()
                .find(|point| !at_boundary(point.address))
            {
                return Err(Error::InvalidDebugInfo(format!(
                    "sequence point {point} of {} is not an instruction",
                    method.id
                )));
            }
        }
    }
    Ok(())
}

fn relative_targets(ins: &Instruction) -> Vec<i32> {
    if let Some(offset) = ins.jump_offset() {
        return vec![offset];
    }
    match ins.try_offsets() {
        Some((catch, finally)) => [catch, finally].into_iter().filter(|o| *o != 0).collect(),
        None => Vec::new(),
    }
}

pub mod cfg_ir;
pub mod debug_info;
pub mod decoder;
pub mod dump;
pub mod encoder;
pub mod interop;
pub mod manifest;
pub mod nef;
pub mod opcode;
pub mod result;
pub mod validator;

pub use opcode::Opcode;

use debug_info::DebugInfo;
use manifest::ContractManifest;
use nef::NefFile;

/// Returns true if the opcode ends the current invocation.
///
/// Terminal opcodes return to the caller or fault: RET, THROW, ABORT and ABORTMSG.
#[inline]
pub fn is_terminal_opcode(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::RET | Opcode::THROW | Opcode::ABORT | Opcode::ABORTMSG
    )
}

/// Returns true if the opcode ends a basic block.
///
/// Block-ending opcodes include terminal opcodes as well as every instruction that transfers
/// control elsewhere: jumps, calls, `TRY`, `ENDTRY` and `ENDFINALLY`. `PUSHA` refers to an
/// address but does not end a block.
#[inline]
pub fn is_block_ending_opcode(opcode: Opcode) -> bool {
    is_terminal_opcode(opcode)
        || opcode.is_jump()
        || opcode.is_call()
        || opcode.is_try()
        || opcode.is_endtry()
        || matches!(opcode, Opcode::CALLA | Opcode::ENDFINALLY)
}

/// The three artifacts a compiled contract consists of.
///
/// Every pass consumes one snapshot and produces a new one; none of them is mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractAssets {
    pub nef: NefFile,
    pub manifest: ContractManifest,
    pub debug_info: Option<DebugInfo>,
}

impl ContractAssets {
    /// Method entry addresses: manifest offsets plus debug method starts, deduplicated.
    pub fn entry_points(&self) -> Vec<usize> {
        let mut points = self.manifest.method_offsets();
        if let Some(debug_info) = &self.debug_info {
            points.extend(debug_info.method_starts());
        }
        points.sort_unstable();
        points.dedup();
        points
    }
}

/// High-level convenience function to turn contract assets into a CFG-IR bundle.
///
/// Decodes the script, collects method entry points from the manifest and debug info and
/// builds the block graph.
///
/// # Example
/// ```rust,ignore
/// let assets = ContractAssets { nef, manifest, debug_info: None };
/// let (bundle, stream) = process_assets_to_cfg(&assets)?;
/// assert_eq!(bundle.ordered_instructions().len(), stream.len());
/// ```
pub fn process_assets_to_cfg(
    assets: &ContractAssets,
) -> result::Result<(cfg_ir::CfgIrBundle, decoder::InstructionStream)> {
    let stream = decoder::decode_script(&assets.nef.script)?;
    let bundle = cfg_ir::build_cfg_ir(&stream, &assets.entry_points())?;
    Ok((bundle, stream))
}

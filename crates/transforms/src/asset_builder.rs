//! Rebuilds NEF, manifest and debug info around a relocated script.

use crate::Result;
use crate::relocate::Relocation;
use nefopt_core::ContractAssets;
use nefopt_core::encoder::encode;
use nefopt_core::result::Error;
use nefopt_core::validator::{validate_addresses, validate_script};

/// Produces the next asset snapshot from `assets` and a relocated program.
///
/// The NEF keeps its header and tokens and gets a fresh checksum; manifest method offsets,
/// debug method ranges and sequence points are translated through the address map.
pub fn build_optimized_assets(
    assets: &ContractAssets,
    relocation: &Relocation,
) -> Result<ContractAssets> {
    let map = &relocation.address_map;
    let script = encode(&relocation.instructions)?;
    let nef = assets.nef.with_script(script)?;

    let mut manifest = assets.manifest.clone();
    for method in &mut manifest.abi.methods {
        let moved = map.resolve(method.offset)?;
        if moved != method.offset {
            tracing::debug!(
                "method {} moved from {} to {}",
                method.name,
                method.offset,
                moved
            );
        }
        method.offset = moved;
    }

    let debug_info = assets
        .debug_info
        .as_ref()
        .map(|info| info.map_addresses(|addr| map.resolve(addr)))
        .transpose()?;

    Ok(ContractAssets {
        nef,
        manifest,
        debug_info,
    })
}

/// Re-checks a snapshot the way a loader would: the checksum matches, every operand
/// targets an instruction and every recorded address is an instruction boundary.
pub fn verify_assets(assets: &ContractAssets) -> Result<()> {
    let computed = assets.nef.compute_checksum()?;
    if computed != assets.nef.checksum {
        return Err(Error::ChecksumMismatch {
            embedded: assets.nef.checksum,
            computed,
        }
        .into());
    }
    let stream = validate_script(&assets.nef.script)?;
    validate_addresses(
        &stream,
        Some(&assets.manifest),
        assets.debug_info.as_ref(),
    )?;
    Ok(())
}

//! Shared support for the nefopt test targets.
//!
//! - [`asm`] assembles NeoVM scripts with symbolic labels, so tests never hand-compute
//!   jump offsets.
//! - [`vm`] runs scripts on a small NeoVM interpreter, enough to compare the observable
//!   behavior of a contract before and after optimization.
//!
//! The helpers below wrap a script into [`ContractAssets`] with a manifest (and optionally
//! debug info) whose methods start at the given labels.


use nefopt_core::ContractAssets;
use nefopt_core::debug_info::DebugInfo;
use nefopt_core::manifest::ContractManifest;
use nefopt_core::nef::NefFile;

/// Compiler string stamped into every test NEF.
pub const TEST_COMPILER: &str = "nefopt-tests";

/// Manifest JSON declaring `methods` as `(name, offset)` pairs.
pub fn manifest_json(name: &str, methods: &[(&str, usize)]) -> String {
    let methods = methods
        .iter()
        .map(|(method, offset)| {
            format!(
                r#"{{"name":"{method}","parameters":[],"returntype":"Any","offset":{offset},"safe":false}}"#
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"{{"name":"{name}","groups":[],"features":{{}},"supportedstandards":[],"abi":{{"methods":[{methods}],"events":[]}},"permissions":[],"trusts":[],"extra":null}}"#
    )
}

/// Debug info JSON with one document and one method per `(name, start, end)` triple.
/// Every method carries a sequence point at its first and last address.
pub fn debug_json(contract: &str, methods: &[(&str, usize, usize)]) -> String {
    let methods = methods
        .iter()
        .enumerate()
        .map(|(line, (method, start, end))| {
            let line = line * 10 + 1;
            format!(
                r#"{{"id":"{contract}.{method}","name":"{contract},{method}","range":"{start}-{end}","params":[],"return":"Any","variables":[],"sequence-points":["{start}[0]{line}:5-{line}:20","{end}[0]{}:5-{}:6"]}}"#,
                line + 1,
                line + 1
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"{{"hash":"0x0000000000000000000000000000000000000000","documents":["{contract}.cs"],"methods":[{methods}],"events":[],"static-variables":[]}}"#
    )
}

/// Wraps `script` into assets whose manifest exposes `methods`.
pub fn contract(script: Vec<u8>, methods: &[(&str, usize)]) -> ContractAssets {
    let manifest = ContractManifest::from_json(&manifest_json("Sample", methods))
        .unwrap_or_else(|err| panic!("test manifest must parse: {err}"));
    let nef = NefFile::new(TEST_COMPILER, "", Vec::new(), script)
        .unwrap_or_else(|err| panic!("test NEF must build: {err}"));
    ContractAssets {
        nef,
        manifest,
        debug_info: None,
    }
}

/// Like [`contract`], plus debug info with one method per `(name, start, end)` triple.
/// The manifest exposes the same methods at their start addresses.
pub fn contract_with_debug(script: Vec<u8>, methods: &[(&str, usize, usize)]) -> ContractAssets {
    let offsets: Vec<(&str, usize)> = methods.iter().map(|(name, start, _)| (*name, *start)).collect();
    let mut assets = contract(script, &offsets);
    let debug_info = DebugInfo::from_json(&debug_json("Sample", methods))
        .unwrap_or_else(|err| panic!("test debug info must parse: {err}"));
    assets.debug_info = Some(debug_info);
    assets
}

/// Source document of the `Counter` fixture contract.
pub const COUNTER_SOURCE: &str = include_str!("../fixtures/Counter.cs");
pub const COUNTER_DEBUG_JSON: &str = include_str!("../fixtures/counter.debug.json");
pub const COUNTER_MANIFEST_JSON: &str = include_str!("../fixtures/counter.manifest.json");

/// Script of the `Counter` fixture: `main` stores 1 + 2 in a local and returns "hi" unless it
/// is zero; `helper` returns 1000.
pub const COUNTER_SCRIPT: [u8; 19] = [
    0x57, 0x01, 0x00, // INITSLOT 1 local, 0 args
    0x11, 0x12, 0x9E, // PUSH1 PUSH2 ADD
    0x70, 0x68, // STLOC0 LDLOC0
    0x26, 0x06, // JMPIFNOT -> 14
    0x0C, 0x02, b'h', b'i', // PUSHDATA1 "hi"
    0x40, // RET
    0x01, 0xE8, 0x03, // PUSHINT16 1000
    0x40, // RET
];

/// The `Counter` fixture with manifest and debug info.
pub fn counter() -> ContractAssets {
    let nef = NefFile::new(TEST_COMPILER, "", Vec::new(), COUNTER_SCRIPT.to_vec())
        .unwrap_or_else(|err| panic!("fixture NEF must build: {err}"));
    let manifest = ContractManifest::from_json(COUNTER_MANIFEST_JSON)
        .unwrap_or_else(|err| panic!("fixture manifest must parse: {err}"));
    let debug_info = DebugInfo::from_json(COUNTER_DEBUG_JSON)
        .unwrap_or_else(|err| panic!("fixture debug info must parse: {err}"));
    ContractAssets {
        nef,
        manifest,
        debug_info: Some(debug_info),
    }
}

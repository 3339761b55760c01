//! Human-readable disassembly of a NEF script (`DumpNef` text format).
//!
//! Every instruction is printed on its own line as
//! `<address> <MNEMONIC>[ <OPERAND-HEX>][ # <comment>]`, preceded by method and source
//! annotations when debug info or a manifest is supplied:
//!
//! ```text
//! # Method Start Sample.Main
//! # Code Contract.cs line 10: "return 1 + 2;"
//! 0 PUSH3
//! 1 RET
//! ```

use crate::Opcode;
use crate::debug_info::{AddressRange, DebugInfo, SequencePoint};
use crate::decoder::{Instruction, decode_script};
use crate::interop::InteropRegistry;
use crate::manifest::ContractManifest;
use crate::nef::{MethodToken, NefFile, script_hash_string};
use crate::opcode::StackItemType;
use crate::result::Result;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Source text lookup for `# Code` annotations.
pub trait SourceProvider {
    /// Lines of the document at `path`, or `None` when it cannot be read.
    fn lines(&self, path: &Path) -> Option<&[String]>;
}

/// Provider that knows no documents; `# Code` lines carry no quoted text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSources;

impl SourceProvider for NoSources {
    fn lines(&self, _path: &Path) -> Option<&[String]> {
        None
    }
}

/// Documents preloaded by the caller, keyed by the path the debug info resolves to.
#[derive(Debug, Clone, Default)]
pub struct MemorySources {
    documents: HashMap<PathBuf, Vec<String>>,
}

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, text: &str) {
        self.documents
            .insert(path.into(), text.lines().map(str::to_string).collect());
    }
}

impl SourceProvider for MemorySources {
    fn lines(&self, path: &Path) -> Option<&[String]> {
        self.documents.get(path).map(Vec::as_slice)
    }
}

/// Path a sequence point's document resolves to, honoring `document-root`.
pub fn document_path(debug_info: &DebugInfo, document: usize) -> Option<PathBuf> {
    let doc = debug_info.documents.get(document)?;
    Some(match &debug_info.document_root {
        Some(root) => Path::new(root).join(doc),
        None => PathBuf::from(doc),
    })
}

/// Decodes `script` and appends the implicit `RET` at `script.len()` when the last
/// instruction is not a `RET`.
pub fn enumerate_instructions(script: &[u8]) -> Result<Vec<Instruction>> {
    let mut instructions = decode_script(script)?.into_instructions();
    if instructions.last().map(|ins| ins.op) != Some(Opcode::RET) {
        instructions.push(Instruction {
            pc: script.len(),
            op: Opcode::RET,
            operand: Vec::new(),
        });
    }
    Ok(instructions)
}

/// Renders the full disassembly with annotations.
pub fn dump_nef(
    nef: &NefFile,
    debug_info: Option<&DebugInfo>,
    manifest: Option<&ContractManifest>,
    registry: &InteropRegistry,
    sources: &dyn SourceProvider,
) -> Result<String> {
    let instructions = enumerate_instructions(&nef.script)?;
    let width = instructions
        .last()
        .map(|ins| digit_count(ins.pc))
        .unwrap_or(1);

    let mut method_starts: HashMap<usize, String> = HashMap::new();
    let mut method_ends: HashMap<usize, String> = HashMap::new();
    let mut points: BTreeMap<usize, Vec<SequencePoint>> = BTreeMap::new();
    if let Some(debug_info) = debug_info {
        for method in &debug_info.methods {
            method_starts
                .entry(method.range.start)
                .or_insert_with(|| method.id.clone());
            method_ends
                .entry(method.range.end)
                .or_insert_with(|| method.id.clone());
            for point in &method.sequence_points {
                points.entry(point.address).or_default().push(*point);
            }
        }
    }
    if let Some(manifest) = manifest {
        for method in &manifest.abi.methods {
            method_starts
                .entry(method.offset)
                .or_insert_with(|| method.name.clone());
        }
    }

    let mut out = String::new();
    for ins in &instructions {
        if let Some(id) = method_starts.get(&ins.pc) {
            let _ = writeln!(out, "# Method Start {id}");
        }
        if let Some(id) = method_ends.get(&ins.pc) {
            let _ = writeln!(out, "# Method End {id}");
        }
        if let (Some(debug_info), Some(list)) = (debug_info, points.get(&ins.pc)) {
            for point in list {
                write_code_annotation(&mut out, debug_info, point, sources);
            }
        }
        if ins.pc < nef.script.len() {
            out.push_str(&write_instruction(ins, width, &nef.tokens, registry));
            out.push('\n');
        }
    }
    tracing::debug!(
        "Dumped {} instructions ({} bytes of text)",
        instructions.len(),
        out.len()
    );
    Ok(out)
}

/// One disassembly line without a trailing newline.
pub fn write_instruction(
    ins: &Instruction,
    width: usize,
    tokens: &[MethodToken],
    registry: &InteropRegistry,
) -> String {
    let mut line = format!("{:0width$} {}", ins.pc, ins.op.mnemonic());
    if !ins.operand.is_empty() {
        line.push(' ');
        line.push_str(&operand_string(&ins.operand));
    }
    if let Some(comment) = comment(ins, tokens, registry) {
        line.push_str(" # ");
        line.push_str(&comment);
    }
    line
}

/// Operand bytes as upper-case hex pairs joined by dashes.
pub fn operand_string(operand: &[u8]) -> String {
    operand
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join("-")
}

/// Explanatory comment for an instruction, if its opcode has one.
pub fn comment(
    ins: &Instruction,
    tokens: &[MethodToken],
    registry: &InteropRegistry,
) -> Option<String> {
    let ip = ins.pc as i64;
    let position = |offset: i32| format!("pos: {} (offset: {offset})", ip + offset as i64);

    let text = match ins.op {
        op if op.is_int_push() && !ins.operand.is_empty() => ins.push_integer()?.to_string(),
        Opcode::PUSHA => (ip + ins.jump_offset()? as i64).to_string(),
        op if op.is_push_data() => {
            let text = String::from_utf8_lossy(&ins.operand)
                .replace('\r', "\"\\r\"")
                .replace('\n', "\"\\n\"");
            if ins.operand.len() == 20 {
                format!(
                    "as script hash: {}, as text: \"{text}\"",
                    script_hash_string(&ins.operand)
                )
            } else {
                format!("as text: \"{text}\"")
            }
        }
        op if op.is_jump() || op.is_call() || op.is_endtry() => position(ins.jump_offset()?),
        Opcode::CALLT => {
            let index = ins.token_u16()?;
            match tokens.get(index as usize) {
                Some(token) => {
                    let contract = registry
                        .contract_name(&token.hash)
                        .map(str::to_string)
                        .unwrap_or_else(|| token.hash_string());
                    format!("{contract}.{} token call", token.method)
                }
                None => format!("Unknown token {index}"),
            }
        }
        op if op.is_try() => {
            let (catch, finally) = ins.try_offsets()?;
            let mut text = if catch == 0 {
                "no catch block, ".to_string()
            } else {
                format!("catch {}, ", position(catch))
            };
            if finally == 0 {
                text.push_str("no finally block");
            } else {
                text.push_str(&format!("finally {}", position(finally)));
            }
            text
        }
        Opcode::SYSCALL => {
            let hash = ins.token_u32()?;
            match registry.syscall_name(hash) {
                Some(name) => format!("{name} SysCall"),
                None => format!("Unknown SysCall {hash}"),
            }
        }
        Opcode::INITSSLOT => format!("{} static variables", ins.token_u8()?),
        Opcode::INITSLOT => format!(
            "{} local variables, {} arguments",
            ins.token_u8()?,
            ins.token_u8_1()?
        ),
        op if op.is_indexed_slot_access() => format!("Slot index {}", ins.token_u8()?),
        Opcode::NEWARRAY_T | Opcode::ISTYPE | Opcode::CONVERT => {
            let byte = ins.token_u8()?;
            match StackItemType::from_byte(byte) {
                Some(ty) => format!("{ty} type"),
                None => format!("{byte} type"),
            }
        }
        _ => return None,
    };
    Some(text)
}

fn write_code_annotation(
    out: &mut String,
    debug_info: &DebugInfo,
    point: &SequencePoint,
    sources: &dyn SourceProvider,
) {
    let path = document_path(debug_info, point.document);
    let file_name = path
        .as_deref()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("document {}", point.document));
    let lines = path.as_deref().and_then(|path| sources.lines(path));

    if point.start_line == point.end_line {
        let text = lines.and_then(|lines| {
            let line = lines.get(point.start_line.checked_sub(1)?)?;
            Some(columns(line, point.start_column, Some(point.end_column)))
        });
        code_line(out, &file_name, point.start_line, text.as_deref());
        return;
    }

    for line_no in point.start_line..=point.end_line {
        let text = lines.and_then(|lines| {
            let line = lines.get(line_no.checked_sub(1)?)?;
            let text = if line_no == point.start_line {
                columns(line, point.start_column, None)
            } else if line_no == point.end_line {
                columns(line, 1, Some(point.end_column))
            } else {
                line.clone()
            };
            Some(text.trim().to_string())
        });
        code_line(out, &file_name, line_no, text.as_deref());
    }
}

fn code_line(out: &mut String, file_name: &str, line: usize, text: Option<&str>) {
    match text {
        Some(text) => {
            let _ = writeln!(out, "# Code {file_name} line {line}: \"{text}\"");
        }
        None => {
            let _ = writeln!(out, "# Code {file_name} line {line}");
        }
    }
}

/// Characters from 1-based column `start` up to, not including, 1-based column `end`.
/// Columns past the end of the line are clamped.
fn columns(line: &str, start: usize, end: Option<usize>) -> String {
    let chars: Vec<char> = line.chars().collect();
    let from = start.saturating_sub(1).min(chars.len());
    let to = end
        .map(|end| end.saturating_sub(1).min(chars.len()))
        .unwrap_or(chars.len())
        .max(from);
    chars[from..to].iter().collect()
}

fn digit_count(value: usize) -> usize {
    value.checked_ilog10().map(|log| log as usize + 1).unwrap_or(1)
}

/// Address range of the debug method whose name (the part after the comma) equals `name`
/// with its first letter upper-cased. The last matching method wins.
pub fn method_range(debug_info: &DebugInfo, name: &str) -> Option<AddressRange> {
    let mut chars = name.chars();
    let wanted: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    debug_info
        .methods
        .iter()
        .rev()
        .find(|method| method.method_name() == wanted)
        .map(|method| method.range)
}

/// Addresses of every `opcode` inside the range of `method`, implicit `RET` included.
pub fn opcode_addresses_in_method(
    nef: &NefFile,
    debug_info: &DebugInfo,
    method: &str,
    opcode: Opcode,
) -> Result<Vec<usize>> {
    let Some(range) = method_range(debug_info, method) else {
        return Ok(Vec::new());
    };
    Ok(enumerate_instructions(&nef.script)?
        .into_iter()
        .filter(|ins| ins.op == opcode && ins.pc >= range.start && ins.pc <= range.end)
        .map(|ins| ins.pc)
        .collect())
}

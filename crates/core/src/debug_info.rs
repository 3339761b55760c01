//! Debug information emitted next to a NEF (`.nefdbgnfo`).
//!
//! The JSON payload maps script addresses back to source documents. On disk it usually
//! sits inside a zip archive holding a single `<name>.debug.json` entry.

use crate::result::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::str::FromStr;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    #[serde(default)]
    pub documents: Vec<String>,
    #[serde(
        rename = "document-root",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub document_root: Option<String>,
    #[serde(default)]
    pub methods: Vec<DebugMethod>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugMethod {
    pub id: String,
    /// `Namespace,Method`
    pub name: String,
    pub range: AddressRange,
    #[serde(rename = "sequence-points", default)]
    pub sequence_points: Vec<SequencePoint>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DebugMethod {
    /// Method part of `Namespace,Method`.
    pub fn method_name(&self) -> &str {
        self.name
            .split_once(',')
            .map(|(_, method)| method)
            .unwrap_or(&self.name)
    }
}

/// Inclusive address range `start-end` of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AddressRange {
    pub start: usize,
    pub end: usize,
}

/// `address[document]startLine:startColumn-endLine:endColumn`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SequencePoint {
    pub address: usize,
    pub document: usize,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl DebugInfo {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reads the first entry of a `.nefdbgnfo` zip archive.
    pub fn from_archive(bytes: &[u8]) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        if archive.is_empty() {
            return Err(Error::InvalidDebugInfo("archive contains no entries".into()));
        }
        let mut entry = archive.by_index(0)?;
        tracing::debug!(entry = entry.name(), "reading debug info from archive");
        let mut text = String::new();
        entry.read_to_string(&mut text)?;
        Self::from_json(&text)
    }

    /// Accepts either a zip archive or bare JSON.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(ZIP_MAGIC) {
            Self::from_archive(bytes)
        } else {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| Error::InvalidDebugInfo("debug info is not UTF-8".into()))?;
            Self::from_json(text)
        }
    }

    /// Packs the JSON into a deflated zip archive with a single entry.
    pub fn to_archive(&self, entry_name: &str) -> Result<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        writer.start_file(entry_name, options)?;
        writer.write_all(self.to_json()?.as_bytes())?;
        Ok(writer.finish()?.into_inner())
    }

    /// Method starts, in ascending order.
    pub fn method_starts(&self) -> Vec<usize> {
        let mut starts: Vec<usize> = self.methods.iter().map(|m| m.range.start).collect();
        starts.sort_unstable();
        starts.dedup();
        starts
    }

    /// Rewrites every address with `map`, keeping sequence point order and dropping exact
    /// duplicates produced when several old addresses land on the same new one.
    pub fn map_addresses<F>(&self, mut map: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<usize>,
    {
        let mut out = self.clone();
        for method in &mut out.methods {
            method.range = AddressRange {
                start: map(method.range.start)?,
                end: map(method.range.end)?,
            };
            let mut points: Vec<SequencePoint> = Vec::with_capacity(method.sequence_points.len());
            for point in &method.sequence_points {
                let moved = SequencePoint {
                    address: map(point.address)?,
                    ..*point
                };
                if !points.contains(&moved) {
                    points.push(moved);
                }
            }
            method.sequence_points = points;
        }
        Ok(out)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for AddressRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidDebugInfo(format!("range '{s}' has no '-'")))?;
        Ok(Self {
            start: number(start, s)?,
            end: number(end, s)?,
        })
    }
}

impl TryFrom<String> for AddressRange {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AddressRange> for String {
    fn from(value: AddressRange) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SequencePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]{}:{}-{}:{}",
            self.address,
            self.document,
            self.start_line,
            self.start_column,
            self.end_line,
            self.end_column
        )
    }
}

impl FromStr for SequencePoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::InvalidDebugInfo(format!("malformed sequence point '{s}'"));
        let (address, rest) = s.split_once('[').ok_or_else(malformed)?;
        let (document, span) = rest.split_once(']').ok_or_else(malformed)?;
        let (start, end) = span.split_once('-').ok_or_else(malformed)?;
        let (start_line, start_column) = start.split_once(':').ok_or_else(malformed)?;
        let (end_line, end_column) = end.split_once(':').ok_or_else(malformed)?;
        Ok(Self {
            address: number(address, s)?,
            document: number(document, s)?,
            start_line: number(start_line, s)?,
            start_column: number(start_column, s)?,
            end_line: number(end_line, s)?,
            end_column: number(end_column, s)?,
        })
    }
}

impl TryFrom<String> for SequencePoint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SequencePoint> for String {
    fn from(value: SequencePoint) -> Self {
        value.to_string()
    }
}

fn number(part: &str, whole: &str) -> Result<usize> {
    part.trim()
        .parse()
        .map_err(|_| Error::InvalidDebugInfo(format!("'{part}' is not a number in '{whole}'")))
}

//! NEF3 container: header, method tokens, script and checksum.

use crate::result::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `"NEF3"` read as a little-endian `u32`.
pub const NEF_MAGIC: u32 = 0x3346_454E;
/// Size of the fixed, null-padded compiler field.
pub const COMPILER_FIELD_LEN: usize = 64;
pub const MAX_SOURCE_LEN: usize = 256;
pub const MAX_TOKENS: usize = 128;
pub const MAX_METHOD_NAME_LEN: usize = 32;
/// Largest script a NEF may carry (`MaxItemSize` of the default engine limits).
pub const MAX_SCRIPT_LEN: usize = u16::MAX as usize * 2;
/// Valid call flag bits (`CallFlags.All`).
const CALL_FLAGS_ALL: u8 = 0x0F;

/// Static reference to a method of another contract, called through `CALLT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodToken {
    /// Script hash of the called contract, in serialization (little-endian) order.
    pub hash: [u8; 20],
    pub method: String,
    pub parameters_count: u16,
    pub has_return_value: bool,
    pub call_flags: u8,
}

impl MethodToken {
    /// Hash in the conventional `0x`-prefixed big-endian notation.
    pub fn hash_string(&self) -> String {
        script_hash_string(&self.hash)
    }
}

/// Formats a 20-byte script hash the way Neo prints `UInt160` values.
pub fn script_hash_string(hash: &[u8]) -> String {
    let mut reversed = hash.to_vec();
    reversed.reverse();
    format!("0x{}", hex::encode(reversed))
}

/// A parsed NEF file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NefFile {
    /// Compiler name and version, at most 64 bytes of UTF-8.
    pub compiler: String,
    /// Source code URL or other free-form text.
    pub source: String,
    pub tokens: Vec<MethodToken>,
    pub script: Vec<u8>,
    pub checksum: u32,
}

impl NefFile {
    /// Builds a NEF around `script` and computes its checksum.
    pub fn new(
        compiler: impl Into<String>,
        source: impl Into<String>,
        tokens: Vec<MethodToken>,
        script: Vec<u8>,
    ) -> Result<Self> {
        let mut nef = Self {
            compiler: compiler.into(),
            source: source.into(),
            tokens,
            script,
            checksum: 0,
        };
        nef.checksum = nef.compute_checksum()?;
        Ok(nef)
    }

    /// Parses a NEF file and verifies its checksum.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let nef = Self::parse_unchecked(bytes)?;
        let computed = nef.compute_checksum()?;
        if computed != nef.checksum {
            return Err(Error::ChecksumMismatch {
                embedded: nef.checksum,
                computed,
            });
        }
        Ok(nef)
    }

    /// Parses a NEF file without checking the embedded checksum.
    pub fn parse_unchecked(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.u32()?;
        if magic != NEF_MAGIC {
            return Err(Error::InvalidNef(format!("bad magic 0x{magic:08x}")));
        }
        let compiler_field = reader.bytes(COMPILER_FIELD_LEN)?;
        let end = compiler_field
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(COMPILER_FIELD_LEN);
        let compiler = utf8(&compiler_field[..end], "compiler")?;
        let source = reader.var_string(MAX_SOURCE_LEN, "source")?;
        if reader.u8()? != 0 {
            return Err(Error::InvalidNef("reserved byte must be zero".into()));
        }

        let token_count = reader.var_int()?;
        if token_count > MAX_TOKENS as u64 {
            return Err(Error::InvalidNef(format!(
                "{token_count} method tokens exceed the limit of {MAX_TOKENS}"
            )));
        }
        let mut tokens = Vec::with_capacity(token_count as usize);
        for _ in 0..token_count {
            tokens.push(read_token(&mut reader)?);
        }

        if reader.u16()? != 0 {
            return Err(Error::InvalidNef("reserved field must be zero".into()));
        }
        let script_len = reader.var_int()?;
        if script_len == 0 || script_len > MAX_SCRIPT_LEN as u64 {
            return Err(Error::InvalidNef(format!(
                "script length {script_len} outside 1..={MAX_SCRIPT_LEN}"
            )));
        }
        let script = reader.bytes(script_len as usize)?.to_vec();
        let checksum = reader.u32()?;
        if !reader.is_empty() {
            return Err(Error::InvalidNef(format!(
                "{} trailing bytes after checksum",
                reader.remaining()
            )));
        }

        Ok(Self {
            compiler,
            source,
            tokens,
            script,
            checksum,
        })
    }

    /// Serializes the full file including the stored checksum.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = self.header_and_script()?;
        out.extend_from_slice(&self.checksum.to_le_bytes());
        Ok(out)
    }

    /// Checksum over everything that precedes the checksum field.
    pub fn compute_checksum(&self) -> Result<u32> {
        Ok(checksum_of(&self.header_and_script()?))
    }

    /// True when the stored checksum matches the content.
    pub fn verify_checksum(&self) -> Result<bool> {
        Ok(self.compute_checksum()? == self.checksum)
    }

    /// Replaces the script and recomputes the checksum.
    pub fn with_script(&self, script: Vec<u8>) -> Result<Self> {
        Self::new(
            self.compiler.clone(),
            self.source.clone(),
            self.tokens.clone(),
            script,
        )
    }

    fn header_and_script(&self) -> Result<Vec<u8>> {
        if self.compiler.len() > COMPILER_FIELD_LEN {
            return Err(Error::InvalidNef(format!(
                "compiler name is {} bytes, limit is {COMPILER_FIELD_LEN}",
                self.compiler.len()
            )));
        }
        if self.source.len() > MAX_SOURCE_LEN {
            return Err(Error::InvalidNef("source exceeds 256 bytes".into()));
        }
        if self.tokens.len() > MAX_TOKENS {
            return Err(Error::InvalidNef("too many method tokens".into()));
        }
        if self.script.is_empty() || self.script.len() > MAX_SCRIPT_LEN {
            return Err(Error::InvalidNef(format!(
                "script length {} outside 1..={MAX_SCRIPT_LEN}",
                self.script.len()
            )));
        }

        let mut out = Vec::with_capacity(80 + self.script.len());
        out.extend_from_slice(&NEF_MAGIC.to_le_bytes());
        let mut compiler = [0u8; COMPILER_FIELD_LEN];
        compiler[..self.compiler.len()].copy_from_slice(self.compiler.as_bytes());
        out.extend_from_slice(&compiler);
        write_var_bytes(&mut out, self.source.as_bytes());
        out.push(0);
        write_var_int(&mut out, self.tokens.len() as u64);
        for token in &self.tokens {
            write_token(&mut out, token)?;
        }
        out.extend_from_slice(&0u16.to_le_bytes());
        write_var_bytes(&mut out, &self.script);
        Ok(out)
    }
}

/// First four bytes of `SHA256(SHA256(data))` as a little-endian `u32`.
pub fn checksum_of(data: &[u8]) -> u32 {
    let once = Sha256::digest(data);
    let twice = Sha256::digest(once);
    u32::from_le_bytes([twice[0], twice[1], twice[2], twice[3]])
}

fn read_token(reader: &mut Reader<'_>) -> Result<MethodToken> {
    let hash: [u8; 20] = reader
        .bytes(20)?
        .try_into()
        .map_err(|_| Error::InvalidNef("short token hash".into()))?;
    let method = reader.var_string(MAX_METHOD_NAME_LEN, "token method")?;
    if method.starts_with('_') {
        return Err(Error::InvalidNef(format!(
            "token method '{method}' must not start with '_'"
        )));
    }
    let parameters_count = reader.u16()?;
    let has_return_value = match reader.u8()? {
        0 => false,
        1 => true,
        other => {
            return Err(Error::InvalidNef(format!(
                "invalid boolean 0x{other:02x} in method token"
            )));
        }
    };
    let call_flags = reader.u8()?;
    if call_flags & !CALL_FLAGS_ALL != 0 {
        return Err(Error::InvalidNef(format!(
            "invalid call flags 0x{call_flags:02x}"
        )));
    }
    Ok(MethodToken {
        hash,
        method,
        parameters_count,
        has_return_value,
        call_flags,
    })
}

fn write_token(out: &mut Vec<u8>, token: &MethodToken) -> Result<()> {
    if token.method.len() > MAX_METHOD_NAME_LEN {
        return Err(Error::InvalidNef(format!(
            "token method '{}' exceeds {MAX_METHOD_NAME_LEN} bytes",
            token.method
        )));
    }
    out.extend_from_slice(&token.hash);
    write_var_bytes(out, token.method.as_bytes());
    out.extend_from_slice(&token.parameters_count.to_le_bytes());
    out.push(token.has_return_value as u8);
    out.push(token.call_flags);
    Ok(())
}

/// Writes a Neo variable-length integer.
pub fn write_var_int(out: &mut Vec<u8>, value: u64) {
    match value {
        v if v < 0xFD => out.push(v as u8),
        v if v <= u16::MAX as u64 => {
            out.push(0xFD);
            out.extend_from_slice(&(v as u16).to_le_bytes());
        }
        v if v <= u32::MAX as u64 => {
            out.push(0xFE);
            out.extend_from_slice(&(v as u32).to_le_bytes());
        }
        v => {
            out.push(0xFF);
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_var_int(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn utf8(bytes: &[u8], field: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::InvalidNef(format!("{field} is not valid UTF-8")))
}

/// Little-endian cursor over the NEF bytes.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = self
            .bytes
            .get(self.pos..self.pos.saturating_add(n))
            .ok_or_else(|| {
                Error::InvalidNef(format!(
                    "unexpected end of file at offset {} (need {n} bytes)",
                    self.pos
                ))
            })?;
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.bytes(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn var_int(&mut self) -> Result<u64> {
        Ok(match self.u8()? {
            0xFD => self.u16()? as u64,
            0xFE => self.u32()? as u64,
            0xFF => u64::from_le_bytes(self.array()?),
            b => b as u64,
        })
    }

    fn var_string(&mut self, max: usize, field: &str) -> Result<String> {
        let len = self.var_int()?;
        if len > max as u64 {
            return Err(Error::InvalidNef(format!(
                "{field} is {len} bytes, limit is {max}"
            )));
        }
        let bytes = self.bytes(len as usize)?;
        utf8(bytes, field)
    }
}

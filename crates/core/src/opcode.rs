//! NeoVM opcode table.
//!
//! Every opcode carries three static facts used throughout the workspace: its byte value,
//! the layout of its operand and its base execution fee (in datoshi units before the
//! execution fee factor is applied).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operand layout that follows an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandSize {
    /// No operand.
    Empty,
    /// Operand of a fixed number of bytes.
    Fixed(usize),
    /// Little-endian length prefix of the given width followed by that many bytes.
    Prefix(usize),
}

const EMPTY: OperandSize = OperandSize::Empty;

const fn fixed(n: usize) -> OperandSize {
    OperandSize::Fixed(n)
}

const fn prefix(n: usize) -> OperandSize {
    OperandSize::Prefix(n)
}

macro_rules! opcodes {
    ($( $name:ident = $byte:literal, $operand:expr, $price:expr; )*) => {
        /// A NeoVM instruction opcode.
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Opcode {
            $( $name = $byte, )*
        }

        impl Opcode {
            /// Parses an opcode byte. Returns `None` for bytes NeoVM does not define.
            pub const fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $( $byte => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Upper-case mnemonic as printed by the disassembler.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => stringify!($name), )*
                }
            }

            /// Operand layout of this opcode.
            pub const fn operand_size(self) -> OperandSize {
                match self {
                    $( Opcode::$name => $operand, )*
                }
            }

            /// Base fee charged by the VM for executing this opcode once.
            pub const fn base_price(self) -> u64 {
                match self {
                    $( Opcode::$name => $price, )*
                }
            }

            /// Iterates over every defined opcode in byte order.
            pub fn all() -> impl Iterator<Item = Opcode> {
                [$( Opcode::$name, )*].into_iter()
            }
        }
    };
}

opcodes! {
    PUSHINT8 = 0x00, fixed(1), 1 << 0;
    PUSHINT16 = 0x01, fixed(2), 1 << 0;
    PUSHINT32 = 0x02, fixed(4), 1 << 0;
    PUSHINT64 = 0x03, fixed(8), 1 << 0;
    PUSHINT128 = 0x04, fixed(16), 1 << 2;
    PUSHINT256 = 0x05, fixed(32), 1 << 2;
    PUSHT = 0x08, EMPTY, 1 << 0;
    PUSHF = 0x09, EMPTY, 1 << 0;
    PUSHA = 0x0A, fixed(4), 1 << 2;
    PUSHNULL = 0x0B, EMPTY, 1 << 0;
    PUSHDATA1 = 0x0C, prefix(1), 1 << 3;
    PUSHDATA2 = 0x0D, prefix(2), 1 << 9;
    PUSHDATA4 = 0x0E, prefix(4), 1 << 12;
    PUSHM1 = 0x0F, EMPTY, 1 << 0;
    PUSH0 = 0x10, EMPTY, 1 << 0;
    PUSH1 = 0x11, EMPTY, 1 << 0;
    PUSH2 = 0x12, EMPTY, 1 << 0;
    PUSH3 = 0x13, EMPTY, 1 << 0;
    PUSH4 = 0x14, EMPTY, 1 << 0;
    PUSH5 = 0x15, EMPTY, 1 << 0;
    PUSH6 = 0x16, EMPTY, 1 << 0;
    PUSH7 = 0x17, EMPTY, 1 << 0;
    PUSH8 = 0x18, EMPTY, 1 << 0;
    PUSH9 = 0x19, EMPTY, 1 << 0;
    PUSH10 = 0x1A, EMPTY, 1 << 0;
    PUSH11 = 0x1B, EMPTY, 1 << 0;
    PUSH12 = 0x1C, EMPTY, 1 << 0;
    PUSH13 = 0x1D, EMPTY, 1 << 0;
    PUSH14 = 0x1E, EMPTY, 1 << 0;
    PUSH15 = 0x1F, EMPTY, 1 << 0;
    PUSH16 = 0x20, EMPTY, 1 << 0;
    NOP = 0x21, EMPTY, 1 << 0;
    JMP = 0x22, fixed(1), 1 << 1;
    JMP_L = 0x23, fixed(4), 1 << 1;
    JMPIF = 0x24, fixed(1), 1 << 1;
    JMPIF_L = 0x25, fixed(4), 1 << 1;
    JMPIFNOT = 0x26, fixed(1), 1 << 1;
    JMPIFNOT_L = 0x27, fixed(4), 1 << 1;
    JMPEQ = 0x28, fixed(1), 1 << 1;
    JMPEQ_L = 0x29, fixed(4), 1 << 1;
    JMPNE = 0x2A, fixed(1), 1 << 1;
    JMPNE_L = 0x2B, fixed(4), 1 << 1;
    JMPGT = 0x2C, fixed(1), 1 << 1;
    JMPGT_L = 0x2D, fixed(4), 1 << 1;
    JMPGE = 0x2E, fixed(1), 1 << 1;
    JMPGE_L = 0x2F, fixed(4), 1 << 1;
    JMPLT = 0x30, fixed(1), 1 << 1;
    JMPLT_L = 0x31, fixed(4), 1 << 1;
    JMPLE = 0x32, fixed(1), 1 << 1;
    JMPLE_L = 0x33, fixed(4), 1 << 1;
    CALL = 0x34, fixed(1), 1 << 9;
    CALL_L = 0x35, fixed(4), 1 << 9;
    CALLA = 0x36, EMPTY, 1 << 9;
    CALLT = 0x37, fixed(2), 1 << 15;
    ABORT = 0x38, EMPTY, 0;
    ASSERT = 0x39, EMPTY, 1 << 0;
    THROW = 0x3A, EMPTY, 1 << 9;
    TRY = 0x3B, fixed(2), 1 << 2;
    TRY_L = 0x3C, fixed(8), 1 << 2;
    ENDTRY = 0x3D, fixed(1), 1 << 2;
    ENDTRY_L = 0x3E, fixed(4), 1 << 2;
    ENDFINALLY = 0x3F, EMPTY, 1 << 2;
    RET = 0x40, EMPTY, 0;
    SYSCALL = 0x41, fixed(4), 0;
    DEPTH = 0x43, EMPTY, 1 << 1;
    DROP = 0x45, EMPTY, 1 << 1;
    NIP = 0x46, EMPTY, 1 << 1;
    XDROP = 0x48, EMPTY, 1 << 4;
    CLEAR = 0x49, EMPTY, 1 << 4;
    DUP = 0x4A, EMPTY, 1 << 1;
    OVER = 0x4B, EMPTY, 1 << 1;
    PICK = 0x4D, EMPTY, 1 << 1;
    TUCK = 0x4E, EMPTY, 1 << 1;
    SWAP = 0x50, EMPTY, 1 << 1;
    ROT = 0x51, EMPTY, 1 << 1;
    ROLL = 0x52, EMPTY, 1 << 4;
    REVERSE3 = 0x53, EMPTY, 1 << 1;
    REVERSE4 = 0x54, EMPTY, 1 << 1;
    REVERSEN = 0x55, EMPTY, 1 << 4;
    INITSSLOT = 0x56, fixed(1), 1 << 4;
    INITSLOT = 0x57, fixed(2), 1 << 6;
    LDSFLD0 = 0x58, EMPTY, 1 << 1;
    LDSFLD1 = 0x59, EMPTY, 1 << 1;
    LDSFLD2 = 0x5A, EMPTY, 1 << 1;
    LDSFLD3 = 0x5B, EMPTY, 1 << 1;
    LDSFLD4 = 0x5C, EMPTY, 1 << 1;
    LDSFLD5 = 0x5D, EMPTY, 1 << 1;
    LDSFLD6 = 0x5E, EMPTY, 1 << 1;
    LDSFLD = 0x5F, fixed(1), 1 << 1;
    STSFLD0 = 0x60, EMPTY, 1 << 1;
    STSFLD1 = 0x61, EMPTY, 1 << 1;
    STSFLD2 = 0x62, EMPTY, 1 << 1;
    STSFLD3 = 0x63, EMPTY, 1 << 1;
    STSFLD4 = 0x64, EMPTY, 1 << 1;
    STSFLD5 = 0x65, EMPTY, 1 << 1;
    STSFLD6 = 0x66, EMPTY, 1 << 1;
    STSFLD = 0x67, fixed(1), 1 << 1;
    LDLOC0 = 0x68, EMPTY, 1 << 1;
    LDLOC1 = 0x69, EMPTY, 1 << 1;
    LDLOC2 = 0x6A, EMPTY, 1 << 1;
    LDLOC3 = 0x6B, EMPTY, 1 << 1;
    LDLOC4 = 0x6C, EMPTY, 1 << 1;
    LDLOC5 = 0x6D, EMPTY, 1 << 1;
    LDLOC6 = 0x6E, EMPTY, 1 << 1;
    LDLOC = 0x6F, fixed(1), 1 << 1;
    STLOC0 = 0x70, EMPTY, 1 << 1;
    STLOC1 = 0x71, EMPTY, 1 << 1;
    STLOC2 = 0x72, EMPTY, 1 << 1;
    STLOC3 = 0x73, EMPTY, 1 << 1;
    STLOC4 = 0x74, EMPTY, 1 << 1;
    STLOC5 = 0x75, EMPTY, 1 << 1;
    STLOC6 = 0x76, EMPTY, 1 << 1;
    STLOC = 0x77, fixed(1), 1 << 1;
    LDARG0 = 0x78, EMPTY, 1 << 1;
    LDARG1 = 0x79, EMPTY, 1 << 1;
    LDARG2 = 0x7A, EMPTY, 1 << 1;
    LDARG3 = 0x7B, EMPTY, 1 << 1;
    LDARG4 = 0x7C, EMPTY, 1 << 1;
    LDARG5 = 0x7D, EMPTY, 1 << 1;
    LDARG6 = 0x7E, EMPTY, 1 << 1;
    LDARG = 0x7F, fixed(1), 1 << 1;
    STARG0 = 0x80, EMPTY, 1 << 1;
    STARG1 = 0x81, EMPTY, 1 << 1;
    STARG2 = 0x82, EMPTY, 1 << 1;
    STARG3 = 0x83, EMPTY, 1 << 1;
    STARG4 = 0x84, EMPTY, 1 << 1;
    STARG5 = 0x85, EMPTY, 1 << 1;
    STARG6 = 0x86, EMPTY, 1 << 1;
    STARG = 0x87, fixed(1), 1 << 1;
    NEWBUFFER = 0x88, EMPTY, 1 << 8;
    MEMCPY = 0x89, EMPTY, 1 << 11;
    CAT = 0x8B, EMPTY, 1 << 11;
    SUBSTR = 0x8C, EMPTY, 1 << 11;
    LEFT = 0x8D, EMPTY, 1 << 11;
    RIGHT = 0x8E, EMPTY, 1 << 11;
    INVERT = 0x90, EMPTY, 1 << 2;
    AND = 0x91, EMPTY, 1 << 3;
    OR = 0x92, EMPTY, 1 << 3;
    XOR = 0x93, EMPTY, 1 << 3;
    EQUAL = 0x97, EMPTY, 1 << 5;
    NOTEQUAL = 0x98, EMPTY, 1 << 5;
    SIGN = 0x99, EMPTY, 1 << 2;
    ABS = 0x9A, EMPTY, 1 << 2;
    NEGATE = 0x9B, EMPTY, 1 << 2;
    INC = 0x9C, EMPTY, 1 << 2;
    DEC = 0x9D, EMPTY, 1 << 2;
    ADD = 0x9E, EMPTY, 1 << 3;
    SUB = 0x9F, EMPTY, 1 << 3;
    MUL = 0xA0, EMPTY, 1 << 3;
    DIV = 0xA1, EMPTY, 1 << 3;
    MOD = 0xA2, EMPTY, 1 << 3;
    POW = 0xA3, EMPTY, 1 << 6;
    SQRT = 0xA4, EMPTY, 1 << 6;
    MODMUL = 0xA5, EMPTY, 1 << 5;
    MODPOW = 0xA6, EMPTY, 1 << 11;
    SHL = 0xA8, EMPTY, 1 << 3;
    SHR = 0xA9, EMPTY, 1 << 3;
    NOT = 0xAA, EMPTY, 1 << 2;
    BOOLAND = 0xAB, EMPTY, 1 << 3;
    BOOLOR = 0xAC, EMPTY, 1 << 3;
    NZ = 0xB1, EMPTY, 1 << 2;
    NUMEQUAL = 0xB3, EMPTY, 1 << 3;
    NUMNOTEQUAL = 0xB4, EMPTY, 1 << 3;
    LT = 0xB5, EMPTY, 1 << 3;
    LE = 0xB6, EMPTY, 1 << 3;
    GT = 0xB7, EMPTY, 1 << 3;
    GE = 0xB8, EMPTY, 1 << 3;
    MIN = 0xB9, EMPTY, 1 << 3;
    MAX = 0xBA, EMPTY, 1 << 3;
    WITHIN = 0xBB, EMPTY, 1 << 3;
    PACKMAP = 0xBE, EMPTY, 1 << 11;
    PACKSTRUCT = 0xBF, EMPTY, 1 << 11;
    PACK = 0xC0, EMPTY, 1 << 11;
    UNPACK = 0xC1, EMPTY, 1 << 11;
    NEWARRAY0 = 0xC2, EMPTY, 1 << 4;
    NEWARRAY = 0xC3, EMPTY, 1 << 9;
    NEWARRAY_T = 0xC4, fixed(1), 1 << 9;
    NEWSTRUCT0 = 0xC5, EMPTY, 1 << 4;
    NEWSTRUCT = 0xC6, EMPTY, 1 << 9;
    NEWMAP = 0xC8, EMPTY, 1 << 3;
    SIZE = 0xCA, EMPTY, 1 << 2;
    HASKEY = 0xCB, EMPTY, 1 << 6;
    KEYS = 0xCC, EMPTY, 1 << 4;
    VALUES = 0xCD, EMPTY, 1 << 13;
    PICKITEM = 0xCE, EMPTY, 1 << 6;
    APPEND = 0xCF, EMPTY, 1 << 13;
    SETITEM = 0xD0, EMPTY, 1 << 13;
    REVERSEITEMS = 0xD1, EMPTY, 1 << 13;
    REMOVE = 0xD2, EMPTY, 1 << 4;
    CLEARITEMS = 0xD3, EMPTY, 1 << 4;
    POPITEM = 0xD4, EMPTY, 1 << 4;
    ISNULL = 0xD8, EMPTY, 1 << 1;
    ISTYPE = 0xD9, fixed(1), 1 << 1;
    CONVERT = 0xDB, fixed(1), 1 << 13;
    ABORTMSG = 0xE0, EMPTY, 0;
    ASSERTMSG = 0xE1, EMPTY, 1 << 0;
}

impl Opcode {
    /// Raw byte value.
    #[inline]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    /// True for conditional and unconditional jumps in both widths.
    pub const fn is_jump(self) -> bool {
        let b = self as u8;
        b >= Opcode::JMP as u8 && b <= Opcode::JMPLE_L as u8
    }

    /// True for jumps other than `JMP`/`JMP_L`.
    pub const fn is_conditional_jump(self) -> bool {
        self.is_jump() && !matches!(self, Opcode::JMP | Opcode::JMP_L)
    }

    /// True for `CALL` and `CALL_L`, the calls with a static target.
    pub const fn is_call(self) -> bool {
        matches!(self, Opcode::CALL | Opcode::CALL_L)
    }

    pub const fn is_try(self) -> bool {
        matches!(self, Opcode::TRY | Opcode::TRY_L)
    }

    pub const fn is_endtry(self) -> bool {
        matches!(self, Opcode::ENDTRY | Opcode::ENDTRY_L)
    }

    /// Opcodes whose operand is a single address relative to the instruction itself.
    pub const fn has_single_target(self) -> bool {
        self.is_jump() || self.is_call() || self.is_endtry() || matches!(self, Opcode::PUSHA)
    }

    /// True for the wide member of a short/long opcode pair, and for `PUSHA`, whose offset
    /// is always four bytes.
    pub const fn is_long_form(self) -> bool {
        match self {
            Opcode::PUSHA | Opcode::TRY_L | Opcode::ENDTRY_L | Opcode::CALL_L => true,
            op if op.is_jump() => (op as u8 - Opcode::JMP as u8) % 2 == 1,
            _ => false,
        }
    }

    /// Wide counterpart of a short address-carrying opcode (`JMP` → `JMP_L`, `TRY` → `TRY_L`).
    /// Wide opcodes and opcodes without a pair return themselves.
    pub const fn long_form(self) -> Opcode {
        match self {
            Opcode::JMP => Opcode::JMP_L,
            Opcode::JMPIF => Opcode::JMPIF_L,
            Opcode::JMPIFNOT => Opcode::JMPIFNOT_L,
            Opcode::JMPEQ => Opcode::JMPEQ_L,
            Opcode::JMPNE => Opcode::JMPNE_L,
            Opcode::JMPGT => Opcode::JMPGT_L,
            Opcode::JMPGE => Opcode::JMPGE_L,
            Opcode::JMPLT => Opcode::JMPLT_L,
            Opcode::JMPLE => Opcode::JMPLE_L,
            Opcode::CALL => Opcode::CALL_L,
            Opcode::TRY => Opcode::TRY_L,
            Opcode::ENDTRY => Opcode::ENDTRY_L,
            other => other,
        }
    }

    /// Opcodes that push an integer constant.
    pub const fn is_int_push(self) -> bool {
        let b = self as u8;
        b <= Opcode::PUSHINT256 as u8 || (b >= Opcode::PUSHM1 as u8 && b <= Opcode::PUSH16 as u8)
    }

    /// `PUSHDATA1`, `PUSHDATA2` or `PUSHDATA4`.
    pub const fn is_push_data(self) -> bool {
        matches!(self, Opcode::PUSHDATA1 | Opcode::PUSHDATA2 | Opcode::PUSHDATA4)
    }

    /// Slot load/store opcodes that take their index from a one-byte operand.
    pub const fn is_indexed_slot_access(self) -> bool {
        matches!(
            self,
            Opcode::LDSFLD
                | Opcode::STSFLD
                | Opcode::LDLOC
                | Opcode::STLOC
                | Opcode::LDARG
                | Opcode::STARG
        )
    }

    /// `PUSH0..=PUSH16` for small non-negative values.
    pub const fn small_push(value: u8) -> Option<Opcode> {
        if value > 16 {
            return None;
        }
        Opcode::from_byte(Opcode::PUSH0 as u8 + value)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.mnemonic())
    }
}

impl std::str::FromStr for Opcode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::all()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown opcode mnemonic '{s}'"))
    }
}

/// NeoVM stack item type tags as used by `NEWARRAY_T`, `ISTYPE` and `CONVERT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackItemType {
    Any = 0x00,
    Pointer = 0x10,
    Boolean = 0x20,
    Integer = 0x21,
    ByteString = 0x28,
    Buffer = 0x30,
    Array = 0x40,
    Struct = 0x41,
    Map = 0x48,
    InteropInterface = 0x60,
}

impl StackItemType {
    pub const fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => StackItemType::Any,
            0x10 => StackItemType::Pointer,
            0x20 => StackItemType::Boolean,
            0x21 => StackItemType::Integer,
            0x28 => StackItemType::ByteString,
            0x30 => StackItemType::Buffer,
            0x40 => StackItemType::Array,
            0x41 => StackItemType::Struct,
            0x48 => StackItemType::Map,
            0x60 => StackItemType::InteropInterface,
            _ => return None,
        })
    }
}

impl fmt::Display for StackItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

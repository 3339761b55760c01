use nefopt_core::Opcode;
use nefopt_core::decoder::{Instruction, decode_script};
use nefopt_core::encoder::encode;
use nefopt_core::opcode::OperandSize;
use nefopt_core::result::Error;
use nefopt_tests::asm::Asm;
use num_bigint::BigInt;
use proptest::prelude::*;

fn any_instruction() -> impl Strategy<Value = Instruction> {
    let opcodes: Vec<Opcode> = Opcode::all().collect();
    prop::sample::select(opcodes).prop_flat_map(|op| {
        let operand = match op.operand_size() {
            OperandSize::Empty => prop::collection::vec(any::<u8>(), 0..=0).boxed(),
            OperandSize::Fixed(n) => prop::collection::vec(any::<u8>(), n..=n).boxed(),
            OperandSize::Prefix(_) => prop::collection::vec(any::<u8>(), 0..48).boxed(),
        };
        operand.prop_map(move |operand| Instruction::new(op, operand))
    })
}

proptest! {
    /// Any encodable instruction sequence decodes back to itself, with addresses equal to
    /// the running byte offsets, and re-encodes to the same bytes.
    #[test]
    fn decode_inverts_encode(instructions in prop::collection::vec(any_instruction(), 1..40)) {
        let bytes = encode(&instructions).unwrap();
        let stream = decode_script(&bytes).unwrap();
        prop_assert_eq!(stream.len(), instructions.len());
        prop_assert_eq!(stream.script_len(), bytes.len());

        let mut pc = 0;
        for (decoded, original) in stream.iter().zip(&instructions) {
            prop_assert_eq!(decoded.pc, pc);
            prop_assert_eq!(decoded.op, original.op);
            prop_assert_eq!(&decoded.operand, &original.operand);
            prop_assert!(stream.is_boundary(pc));
            pc += decoded.byte_size();
        }
        prop_assert_eq!(encode(stream.as_slice()).unwrap(), bytes);
    }
}

#[test]
fn operands_are_interpreted_per_opcode() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .try_init();

    let script = Asm::new()
        .int(-300)
        .try_block(Opcode::TRY_L, Some("catch"), None)
        .jump(Opcode::JMP, "catch")
        .label("catch")
        .jump(Opcode::PUSHA, "catch")
        .op(Opcode::RET)
        .script();
    let stream = decode_script(&script).unwrap();
    let ops: Vec<Opcode> = stream.iter().map(|ins| ins.op).collect();
    assert_eq!(
        ops,
        vec![Opcode::PUSHINT16, Opcode::TRY_L, Opcode::JMP, Opcode::PUSHA, Opcode::RET]
    );

    let push = stream.get(0).unwrap();
    assert_eq!(push.push_integer(), Some(BigInt::from(-300)));

    // PUSHINT16 (3 bytes) then TRY_L (9 bytes) then JMP (2 bytes): catch lands at 14.
    let try_l = stream.get(3).unwrap();
    assert_eq!(try_l.try_offsets(), Some((11, 0)));
    let jmp = stream.get(12).unwrap();
    assert_eq!(jmp.jump_offset(), Some(2));
    let pusha = stream.get(14).unwrap();
    assert_eq!(pusha.jump_offset(), Some(0), "PUSHA points at itself");
    assert!(stream.is_boundary(19), "RET follows the 5-byte PUSHA");
}

#[test]
fn malformed_scripts_are_format_errors() {
    // 0x06 is not an opcode.
    let err = decode_script(&[0x11, 0x06]).unwrap_err();
    assert!(matches!(err, Error::UnknownOpcode { pc: 1, byte: 0x06 }));
    assert!(err.is_format_error());

    // PUSHDATA1 announces five bytes but only two follow.
    let err = decode_script(&[0x0C, 0x05, 0x61, 0x62]).unwrap_err();
    assert!(matches!(
        err,
        Error::TruncatedOperand {
            pc: 0,
            op: Opcode::PUSHDATA1,
            ..
        }
    ));

    // JMP with its operand missing.
    let err = decode_script(&[0x40, 0x22]).unwrap_err();
    assert!(matches!(err, Error::TruncatedOperand { pc: 1, .. }));
}

#[test]
fn encoder_rejects_operands_that_do_not_match_the_layout() {
    let err = encode(&[Instruction::new(Opcode::JMP, vec![1, 2])]).unwrap_err();
    assert!(matches!(err, Error::InvalidOperand { op: Opcode::JMP, .. }));

    let err = encode(&[Instruction::new(Opcode::RET, vec![0])]).unwrap_err();
    assert!(matches!(err, Error::InvalidOperand { op: Opcode::RET, .. }));
}

use super::{assert_same_behavior, opcodes, optimized};
use nefopt_core::Opcode;
use nefopt_core::cfg_ir::build_cfg_ir;
use nefopt_core::decoder::{Instruction, decode_script};
use nefopt_core::encoder::encode;
use nefopt_tests::asm::Asm;
use nefopt_tests::vm::{self, Outcome, Value};
use nefopt_transform::constant_arithmetic::{ArithmeticPolicy, ConstantArithmetic};
use nefopt_transform::optimizer::OptimizerConfig;
use nefopt_transform::relocate::relocate;
use nefopt_transform::{Rewrite, Strategy};

#[test]
fn short_jump_is_widened_when_the_distance_grows() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .try_init();

    let script = (0..125)
        .fold(Asm::new().jump(Opcode::JMP, "end"), |asm, _| asm.op(Opcode::NOP))
        .label("end")
        .int(1)
        .op(Opcode::RET)
        .script();
    assert_eq!(script[..2], [0x22, 127]);

    let stream = decode_script(&script).unwrap();
    let ir = build_cfg_ir(&stream, &[]).unwrap();
    let mut rewrite = Rewrite::identity(&ir);
    let padding = rewrite
        .arena
        .alloc(Instruction::simple(Opcode::NOP), None);
    rewrite.order.insert(1, padding);
    rewrite.changed = true;

    let relocation = relocate(&rewrite).unwrap();
    assert_eq!(relocation.upgraded, 1);
    let jmp = &relocation.instructions[0];
    assert_eq!(jmp.op, Opcode::JMP_L);
    assert_eq!(jmp.jump_offset(), Some(131));

    let map = &relocation.address_map;
    assert_eq!(map.exact(0), Some(0));
    assert_eq!(map.exact(2), Some(6), "the inserted NOP sits between");
    assert_eq!(map.exact(127), Some(131));
    assert_eq!(map.resolve(129).unwrap(), 133, "old end maps to new end");
    assert_eq!(relocation.script_len(), 133);

    let relocated = encode(&relocation.instructions).unwrap();
    assert_eq!(relocated.len(), 133);
    assert_eq!(
        vm::run(&relocated, 0, vec![]),
        Outcome::Halt(vec![Value::int(1)])
    );
}

#[test]
fn removed_addresses_resolve_to_the_next_survivor() {
    // PUSH1 PUSH2 ADD RET
    let stream = decode_script(&[0x11, 0x12, 0x9E, 0x40]).unwrap();
    let ir = build_cfg_ir(&stream, &[]).unwrap();
    let rewrite = ConstantArithmetic::new(ArithmeticPolicy::neo_vm())
        .rewrite(&ir)
        .unwrap();
    assert!(rewrite.changed);

    let relocation = relocate(&rewrite).unwrap();
    let map = &relocation.address_map;
    assert_eq!(map.exact(0), Some(0), "the fold stands in for PUSH1");
    assert_eq!(map.exact(1), None);
    assert_eq!(map.resolve(1).unwrap(), 1);
    assert_eq!(map.resolve(2).unwrap(), 1);
    assert_eq!(map.exact(3), Some(1));
    assert_eq!((map.old_len(), map.new_len()), (4, 2));
    assert!(map.resolve(5).is_err());
    assert_eq!(map.moved().get(&3), Some(&1));
}

#[test]
fn long_jumps_are_never_narrowed() {
    let script = Asm::new()
        .jump(Opcode::JMP_L, "end")
        .int(1)
        .int(2)
        .op(Opcode::ADD)
        .op(Opcode::DROP)
        .label("end")
        .op(Opcode::RET)
        .script();
    let result = optimized(&script, &OptimizerConfig::default());
    let stream = decode_script(&result.assets.nef.script).unwrap();
    let jmp = stream.get(0).unwrap();
    assert_eq!(jmp.op, Opcode::JMP_L);
    assert_eq!(jmp.jump_offset(), Some(7));
    assert_eq!(
        opcodes(&result.assets.nef.script),
        vec![Opcode::JMP_L, Opcode::PUSH3, Opcode::DROP, Opcode::RET]
    );
}

#[test]
fn try_handlers_follow_folded_blocks() {
    let program = Asm::new()
        .try_block(Opcode::TRY, Some("catch"), Some("finally"))
        .int(1)
        .int(2)
        .op(Opcode::ADD)
        .data(b"boom")
        .op(Opcode::THROW)
        .jump(Opcode::ENDTRY, "end")
        .label("catch")
        .int(4)
        .int(5)
        .op(Opcode::ADD)
        .jump(Opcode::ENDTRY, "end")
        .label("finally")
        .int(6)
        .int(7)
        .op(Opcode::ADD)
        .op(Opcode::ENDFINALLY)
        .label("end")
        .op(Opcode::RET)
        .assemble()
        .unwrap();
    assert_eq!((program.at("catch"), program.at("finally")), (15, 20));

    let result = optimized(&program.script, &OptimizerConfig::default());
    let stream = decode_script(&result.assets.nef.script).unwrap();
    assert_eq!(stream.get(0).unwrap().try_offsets(), Some((13, 16)));
    assert_eq!(stream.get(13).unwrap().op, Opcode::PUSH9);
    assert_eq!(stream.get(16).unwrap().op, Opcode::PUSH13);
    assert_eq!(stream.get(14).unwrap().jump_offset(), Some(4), "ENDTRY lands on RET");

    let outcome = assert_same_behavior(&program.script, &result.assets.nef.script, &[]);
    assert!(outcome.is_halt());
}

#[test]
fn pointers_are_regenerated() {
    let program = Asm::new()
        .jump(Opcode::PUSHA, "f")
        .op(Opcode::CALLA)
        .int(1)
        .int(2)
        .op(Opcode::ADD)
        .op(Opcode::RET)
        .label("f")
        .int(5)
        .op(Opcode::RET)
        .assemble()
        .unwrap();
    assert_eq!(program.at("f"), 10);

    let result = optimized(&program.script, &OptimizerConfig::default());
    let stream = decode_script(&result.assets.nef.script).unwrap();
    assert_eq!(stream.get(0).unwrap().jump_offset(), Some(8));
    assert_eq!(stream.get(8).unwrap().op, Opcode::PUSH5);
    assert_eq!(
        assert_same_behavior(&program.script, &result.assets.nef.script, &[]),
        Outcome::Halt(vec![Value::int(5), Value::int(3)])
    );
}

use super::{assert_same_behavior, opcodes, optimized};
use nefopt_core::Opcode;
use nefopt_tests::asm::Asm;
use nefopt_tests::vm::{Outcome, Value};
use nefopt_transform::optimizer::{OptimizationLevel, OptimizerConfig};

/// `NEWARRAY0` followed by one `DUP, value, APPEND` triple per value.
fn append_chain(values: &[i64]) -> Asm {
    values.iter().fold(Asm::new().op(Opcode::NEWARRAY0), |asm, v| {
        asm.op(Opcode::DUP).int(*v).op(Opcode::APPEND)
    })
}

#[test]
fn append_chain_is_packed() {
    let script = Asm::new()
        .with(Opcode::INITSLOT, vec![0, 1])
        .op(Opcode::NEWARRAY0)
        .op(Opcode::DUP)
        .data(b"a")
        .op(Opcode::APPEND)
        .op(Opcode::DUP)
        .int(9)
        .op(Opcode::APPEND)
        .op(Opcode::DUP)
        .op(Opcode::PUSHT)
        .op(Opcode::APPEND)
        .op(Opcode::DUP)
        .int(-5)
        .op(Opcode::APPEND)
        .op(Opcode::RET)
        .script();
    let result = optimized(&script, &OptimizerConfig::default());

    assert_eq!(
        opcodes(&result.assets.nef.script),
        vec![
            Opcode::INITSLOT,
            Opcode::PUSHINT8,
            Opcode::PUSHT,
            Opcode::PUSH9,
            Opcode::PUSHDATA1,
            Opcode::PUSH4,
            Opcode::PACK,
            Opcode::RET
        ]
    );
    assert_eq!(result.report.strategies_applied, vec!["CollectionFusion"]);
    assert_eq!(
        assert_same_behavior(&script, &result.assets.nef.script, &[Value::int(9)]),
        Outcome::Halt(vec![Value::array(vec![
            Value::Bytes(b"a".to_vec()),
            Value::int(9),
            Value::Bool(true),
            Value::int(-5),
        ])])
    );
}

#[test]
fn three_appends_shrink_the_program() {
    let script = append_chain(&[5, 6, 7]).op(Opcode::RET).script();
    let result = optimized(&script, &OptimizerConfig::default());
    assert!(result.report.optimized_instructions < result.report.original_instructions);
    assert!(result.report.optimized_size < result.report.original_size);
    assert_same_behavior(&script, &result.assets.nef.script, &[]);
}

#[test]
fn threshold_decides_what_is_fused() {
    let pair = append_chain(&[1, 2]).op(Opcode::RET).script();
    let result = optimized(&pair, &OptimizerConfig::default());
    assert_eq!(result.assets.nef.script, pair);

    // Lower thresholds are raised to three: a pair is never fused, even when asked for.
    for threshold in [0, 1, 2] {
        let low = OptimizerConfig {
            fusion_threshold: threshold,
            ..OptimizerConfig::default()
        };
        assert_eq!(optimized(&pair, &low).assets.nef.script, pair);
    }

    let triple = append_chain(&[1, 2, 3]).op(Opcode::RET).script();
    let high = OptimizerConfig {
        fusion_threshold: 4,
        ..OptimizerConfig::default()
    };
    assert_eq!(optimized(&triple, &high).assets.nef.script, triple);
    let result = optimized(&triple, &OptimizerConfig::default());
    assert_eq!(
        opcodes(&result.assets.nef.script),
        vec![Opcode::PUSH3, Opcode::PUSH2, Opcode::PUSH1, Opcode::PUSH3, Opcode::PACK, Opcode::RET]
    );
}

#[test]
fn appended_locals_keep_their_copies() {
    // The array holds three copies of the struct in local 0, which changes afterwards.
    let script = Asm::new()
        .with(Opcode::INITSLOT, vec![1, 0])
        .op(Opcode::NEWSTRUCT0)
        .op(Opcode::STLOC0)
        .op(Opcode::NEWARRAY0)
        .op(Opcode::DUP)
        .op(Opcode::LDLOC0)
        .op(Opcode::APPEND)
        .op(Opcode::DUP)
        .op(Opcode::LDLOC0)
        .op(Opcode::APPEND)
        .op(Opcode::DUP)
        .op(Opcode::LDLOC0)
        .op(Opcode::APPEND)
        .op(Opcode::LDLOC0)
        .int(1)
        .op(Opcode::APPEND)
        .op(Opcode::RET)
        .script();
    let result = optimized(&script, &OptimizerConfig::default());
    assert_eq!(result.assets.nef.script, script);
    assert!(result.report.runs.is_empty());

    let empty = Value::structure(vec![]);
    assert_eq!(
        assert_same_behavior(&script, &result.assets.nef.script, &[]),
        Outcome::Halt(vec![Value::array(vec![empty.clone(), empty.clone(), empty])])
    );
}

#[test]
fn indexed_stores_of_arguments_are_not_packed() {
    let script = Asm::new()
        .with(Opcode::INITSLOT, vec![0, 1])
        .int(3)
        .op(Opcode::NEWARRAY)
        .op(Opcode::DUP)
        .int(0)
        .op(Opcode::LDARG0)
        .op(Opcode::SETITEM)
        .op(Opcode::DUP)
        .int(1)
        .op(Opcode::LDARG0)
        .op(Opcode::SETITEM)
        .op(Opcode::DUP)
        .int(2)
        .op(Opcode::LDARG0)
        .op(Opcode::SETITEM)
        .op(Opcode::RET)
        .script();
    let result = optimized(&script, &OptimizerConfig::default());
    assert_eq!(result.assets.nef.script, script);
}

#[test]
fn typed_allocation_with_every_slot_written_is_packed() {
    // PUSH3 NEWARRAY_T Integer, then [1] = 20, [2] = 30, [0] = 10.
    let script = Asm::new()
        .int(3)
        .with(Opcode::NEWARRAY_T, vec![0x21])
        .op(Opcode::DUP)
        .int(1)
        .int(20)
        .op(Opcode::SETITEM)
        .op(Opcode::DUP)
        .int(2)
        .int(30)
        .op(Opcode::SETITEM)
        .op(Opcode::DUP)
        .int(0)
        .int(10)
        .op(Opcode::SETITEM)
        .op(Opcode::RET)
        .script();
    let result = optimized(&script, &OptimizerConfig::default());
    assert_eq!(
        opcodes(&result.assets.nef.script),
        vec![
            Opcode::PUSHINT8,
            Opcode::PUSHINT8,
            Opcode::PUSH10,
            Opcode::PUSH3,
            Opcode::PACK,
            Opcode::RET
        ]
    );
    assert_eq!(
        assert_same_behavior(&script, &result.assets.nef.script, &[]),
        Outcome::Halt(vec![Value::array(vec![
            Value::int(10),
            Value::int(20),
            Value::int(30),
        ])])
    );
}

#[test]
fn partially_written_allocation_is_kept() {
    // Slot 2 is never written, so it must stay null.
    let script = Asm::new()
        .int(3)
        .op(Opcode::NEWARRAY)
        .op(Opcode::DUP)
        .int(0)
        .int(10)
        .op(Opcode::SETITEM)
        .op(Opcode::DUP)
        .int(1)
        .int(20)
        .op(Opcode::SETITEM)
        .op(Opcode::RET)
        .script();
    let result = optimized(&script, &OptimizerConfig::default());
    assert_eq!(result.assets.nef.script, script);
}

#[test]
fn jump_into_the_chain_prevents_fusion() {
    let script = append_chain(&[1])
        .label("mid")
        .op(Opcode::DUP)
        .int(2)
        .op(Opcode::APPEND)
        .op(Opcode::DUP)
        .int(3)
        .op(Opcode::APPEND)
        .op(Opcode::RET)
        .jump(Opcode::JMP, "mid")
        .script();
    let result = optimized(&script, &OptimizerConfig::default());
    assert_eq!(result.assets.nef.script, script);
}

#[test]
fn long_chains_use_a_wider_count() {
    let values: Vec<i64> = (0..20).map(|v| v * 7 - 50).collect();
    let script = append_chain(&values).op(Opcode::RET).script();
    let result = optimized(&script, &OptimizerConfig::default());

    let ops = opcodes(&result.assets.nef.script);
    assert_eq!(ops.len(), 23);
    assert_eq!(ops[20], Opcode::PUSHINT8, "20 does not fit a PUSHn");
    assert_eq!(ops[21], Opcode::PACK);

    let expected = Value::array(values.iter().copied().map(Value::int).collect());
    assert_eq!(
        assert_same_behavior(&script, &result.assets.nef.script, &[]),
        Outcome::Halt(vec![expected])
    );
}

#[test]
fn folding_feeds_fusion_within_one_round() {
    // Each element is 1 + 2 until folded.
    let script = (0..3)
        .fold(Asm::new().op(Opcode::NEWARRAY0), |asm, _| {
            asm.op(Opcode::DUP)
                .int(1)
                .int(2)
                .op(Opcode::ADD)
                .op(Opcode::APPEND)
        })
        .op(Opcode::RET)
        .script();

    let basic = optimized(&script, &OptimizerConfig::with_level(OptimizationLevel::Basic));
    assert_eq!(basic.report.strategies_applied, vec!["ConstantFold"]);
    assert!(opcodes(&basic.assets.nef.script).contains(&Opcode::APPEND));

    let all = optimized(&script, &OptimizerConfig::default());
    assert_eq!(all.report.rounds, 1);
    assert_eq!(
        all.report.strategies_applied,
        vec!["ConstantFold", "CollectionFusion"]
    );
    assert_eq!(
        opcodes(&all.assets.nef.script),
        vec![Opcode::PUSH3, Opcode::PUSH3, Opcode::PUSH3, Opcode::PUSH3, Opcode::PACK, Opcode::RET]
    );
    assert_same_behavior(&script, &all.assets.nef.script, &[]);
}

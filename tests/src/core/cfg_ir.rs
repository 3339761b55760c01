use nefopt_core::Opcode;
use nefopt_core::cfg_ir::{BlockControl, CfgIrBundle, EdgeType, OperationKind, build_cfg_ir};
use nefopt_core::decoder::decode_script;
use nefopt_core::process_assets_to_cfg;
use nefopt_core::result::Error;
use nefopt_tests::asm::Asm;
use nefopt_tests::contract;

fn build(script: &[u8], entries: &[usize]) -> CfgIrBundle {
    let stream = decode_script(script).unwrap();
    build_cfg_ir(&stream, entries).unwrap()
}

fn control_at(ir: &CfgIrBundle, pc: usize) -> BlockControl {
    let node = ir.pc_to_block[&pc];
    ir.block_control(node).cloned().unwrap()
}

#[test]
fn branches_split_blocks_at_targets_and_after_terminators() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .try_init();

    let program = Asm::new()
        .int(1)
        .jump(Opcode::JMPIF, "else")
        .int(2)
        .jump(Opcode::JMP, "end")
        .label("else")
        .int(3)
        .label("end")
        .op(Opcode::RET)
        .assemble()
        .unwrap();
    let ir = build(&program.script, &[]);

    assert_eq!(ir.block_starts(), vec![0, 3, 6, 7]);
    let block = |pc: usize| ir.pc_to_block[&pc];
    assert_eq!(
        control_at(&ir, 0),
        BlockControl::Branch {
            true_target: block(program.at("else")),
            false_target: Some(block(3)),
        }
    );
    assert_eq!(control_at(&ir, 3), BlockControl::Jump { target: block(7) });
    assert_eq!(control_at(&ir, 6), BlockControl::Fallthrough { next: Some(block(7)) });
    assert_eq!(control_at(&ir, 7), BlockControl::Terminal);

    let branch_edges: Vec<EdgeType> = ir
        .cfg
        .edge_indices()
        .filter(|edge| ir.cfg.edge_endpoints(*edge).map(|(from, _)| from) == Some(block(0)))
        .map(|edge| ir.cfg[edge])
        .collect();
    assert!(branch_edges.contains(&EdgeType::BranchTrue));
    assert!(branch_edges.contains(&EdgeType::BranchFalse));

    assert!(
        matches!(
            ir.trace.first().map(|event| &event.kind),
            Some(OperationKind::Build { body_blocks: 4, .. })
        ),
        "building records a trace event"
    );
}

#[test]
fn every_instruction_keeps_its_origin_address() {
    let script = Asm::new()
        .data(b"neo")
        .int(1000)
        .op(Opcode::DROP)
        .op(Opcode::RET)
        .script();
    let stream = decode_script(&script).unwrap();
    let ir = build_cfg_ir(&stream, &[]).unwrap();

    let ids = ir.ordered_instructions();
    assert_eq!(ids.len(), stream.len());
    for (id, ins) in ids.iter().zip(stream.iter()) {
        assert_eq!(ir.arena.origin_pc(*id), Some(ins.pc));
        assert_eq!(ir.instruction(*id), Some(ins));
    }
}

#[test]
fn manifest_entry_points_open_blocks() {
    // main: NOP RET | helper: PUSH5 RET
    let assets = contract(vec![0x21, 0x40, 0x15, 0x40], &[("main", 0), ("helper", 2)]);
    let (ir, stream) = process_assets_to_cfg(&assets).unwrap();
    assert_eq!(stream.len(), 4);
    assert_eq!(ir.entry_points, vec![0, 2]);
    assert_eq!(ir.block_starts(), vec![0, 2]);

    let entry = ir.entry_node().unwrap();
    let helper = ir.pc_to_block[&2];
    assert!(
        ir.cfg.find_edge(entry, helper).is_some(),
        "method entries hang off the entry node"
    );
}

#[test]
fn try_blocks_expose_their_handlers() {
    let program = Asm::new()
        .try_block(Opcode::TRY, Some("catch"), Some("finally"))
        .op(Opcode::NOP)
        .jump(Opcode::ENDTRY, "end")
        .label("catch")
        .op(Opcode::DROP)
        .jump(Opcode::ENDTRY, "end")
        .label("finally")
        .op(Opcode::ENDFINALLY)
        .label("end")
        .op(Opcode::RET)
        .assemble()
        .unwrap();
    let ir = build(&program.script, &[]);
    let block = |label: &str| ir.pc_to_block[&program.at(label)];

    assert_eq!(
        control_at(&ir, 0),
        BlockControl::Try {
            body: Some(ir.pc_to_block[&3]),
            catch: Some(block("catch")),
            finally: Some(block("finally")),
        }
    );
    assert_eq!(control_at(&ir, 3), BlockControl::EndTry { target: block("end") });
    assert_eq!(control_at(&ir, program.at("finally")), BlockControl::Dynamic);

    let try_id = ir.ordered_instructions()[0];
    let targets = ir.edges.tries[&try_id];
    assert!(targets.catch.is_some() && targets.finally.is_some());
}

#[test]
fn targets_inside_operands_are_rejected() {
    // JMP +3 lands on the operand byte of PUSHINT8.
    let stream = decode_script(&[0x22, 0x03, 0x00, 0x05, 0x40]).unwrap();
    let err = build_cfg_ir(&stream, &[]).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidJumpTarget {
            pc: 0,
            op: Opcode::JMP,
            target: 3
        }
    ));

    let stream = decode_script(&[0x00, 0x05, 0x40]).unwrap();
    assert!(matches!(
        build_cfg_ir(&stream, &[1]).unwrap_err(),
        Error::InvalidEntryPoint(1)
    ));
}

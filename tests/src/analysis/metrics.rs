use nefopt_analysis::{collect_metrics, compare, size_delta};
use nefopt_core::Opcode;
use nefopt_core::cfg_ir::build_cfg_ir;
use nefopt_core::decoder::decode_script;
use nefopt_core::process_assets_to_cfg;
use nefopt_tests::asm::Asm;
use nefopt_tests::counter;
use nefopt_transform::optimizer::{OptimizerConfig, optimize};

/// Tests metrics of the two-method fixture contract.
#[test]
fn test_collect_metrics_counter() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .try_init();

    let (ir, stream) = process_assets_to_cfg(&counter()).unwrap();
    let metrics = collect_metrics(&ir).expect("Metrics computation failed");

    assert_eq!(metrics.byte_len, 19, "Byte length mismatch");
    assert_eq!(metrics.instruction_count, stream.len());
    assert_eq!(metrics.instruction_count, 11);
    // Entry, fall-through, branch target and helper.
    assert_eq!(ir.block_starts(), vec![0, 10, 14, 15]);
    assert_eq!(metrics.block_cnt, 4, "Block count mismatch");
    assert_eq!(metrics.unreachable_blocks, 0, "helper is reached as a method");
    assert!(metrics.edge_cnt >= metrics.block_cnt);

    let fee: u64 = stream.iter().map(|ins| ins.op.base_price()).sum();
    assert_eq!(metrics.static_fee, fee);
    assert_eq!(metrics.static_fee, 89);
}

/// Tests that folding shows up as a smaller script and a lower fee.
#[test]
fn test_metrics_after_folding() {
    let input = counter();
    let (before_ir, _) = process_assets_to_cfg(&input).unwrap();
    let before = collect_metrics(&before_ir).unwrap();

    let result = optimize(input, &OptimizerConfig::default()).unwrap();
    let (after_ir, _) = process_assets_to_cfg(&result.assets).unwrap();
    let after = collect_metrics(&after_ir).unwrap();

    assert_eq!(size_delta(&before, &after), -2);
    assert_eq!(after.static_fee, 80);
    let change = compare(&before, &after);
    assert!((change - (-900.0 / 89.0)).abs() < 1e-9, "got {change}");

    assert_eq!(result.report.original_fee, before.static_fee);
    assert_eq!(result.report.optimized_fee, after.static_fee);
    assert_eq!(after.block_cnt, before.block_cnt);
}

/// Tests that code after an unconditional jump counts as unreachable.
#[test]
fn test_unreachable_blocks() {
    let script = Asm::new()
        .jump(Opcode::JMP, "end")
        .int(1)
        .op(Opcode::DROP)
        .label("end")
        .op(Opcode::RET)
        .script();
    let stream = decode_script(&script).unwrap();
    let ir = build_cfg_ir(&stream, &[]).unwrap();
    let metrics = collect_metrics(&ir).unwrap();
    assert_eq!(metrics.block_cnt, 3);
    assert_eq!(metrics.unreachable_blocks, 1);
}

/// Tests the JSON shape written by the CLI.
#[test]
fn test_metrics_serialize() {
    let (ir, _) = process_assets_to_cfg(&counter()).unwrap();
    let metrics = collect_metrics(&ir).unwrap();
    let json = serde_json::to_value(&metrics).unwrap();
    for key in [
        "byte_len",
        "instruction_count",
        "block_cnt",
        "edge_cnt",
        "unreachable_blocks",
        "static_fee",
    ] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
    let back: nefopt_analysis::Metrics = serde_json::from_value(json).unwrap();
    assert_eq!(back, metrics);
}

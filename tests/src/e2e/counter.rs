use super::{assert_methods_agree, run_method};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use nefopt_core::debug_info::DebugInfo;
use nefopt_core::dump::{MemorySources, dump_nef};
use nefopt_core::interop::InteropRegistry;
use nefopt_core::nef::NefFile;
use nefopt_tests::vm::{Outcome, Value};
use nefopt_tests::{COUNTER_SOURCE, TEST_COMPILER, counter};
use nefopt_transform::optimizer::{OptimizerConfig, optimize};

const OPTIMIZED_DUMP: &str = include_str!("../../fixtures/counter.optimized.nef.txt");

#[test]
fn test_optimized_counter_matches_golden_dump() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .try_init();

    let result = optimize(counter(), &OptimizerConfig::default())?;
    let mut sources = MemorySources::new();
    sources.insert("Counter.cs", COUNTER_SOURCE);

    let dump = dump_nef(
        &result.assets.nef,
        result.assets.debug_info.as_ref(),
        Some(&result.assets.manifest),
        &InteropRegistry::neo_n3(),
        &sources,
    )?;
    assert_eq!(dump, OPTIMIZED_DUMP);
    Ok(())
}

#[test]
fn test_optimized_counter_behaves_the_same() -> Result<()> {
    let original = counter();
    let result = optimize(original.clone(), &OptimizerConfig::default())?;

    assert_methods_agree(&original, &result.assets, &[])?;
    assert_eq!(
        run_method(&result.assets, "main", vec![])?,
        Outcome::Halt(vec![Value::Bytes(b"hi".to_vec())])
    );
    assert_eq!(
        run_method(&result.assets, "helper", vec![])?,
        Outcome::Halt(vec![Value::int(1000)])
    );
    Ok(())
}

#[test]
fn test_optimized_counter_metadata_is_remapped() -> Result<()> {
    let original = counter();
    let result = optimize(original.clone(), &OptimizerConfig::default())?;
    let assets = &result.assets;

    assert_eq!(assets.manifest.method_offsets(), vec![0, 13]);
    assert_eq!(assets.manifest.name, original.manifest.name);
    assert_eq!(assets.manifest.extra, original.manifest.extra);

    let debug = assets
        .debug_info
        .as_ref()
        .ok_or_else(|| eyre!("debug info was dropped"))?;
    let ranges: Vec<(usize, usize)> = debug
        .methods
        .iter()
        .map(|m| (m.range.start, m.range.end))
        .collect();
    assert_eq!(ranges, vec![(0, 12), (13, 16)]);

    let points: Vec<Vec<usize>> = debug
        .methods
        .iter()
        .map(|m| m.sequence_points.iter().map(|p| p.address).collect())
        .collect();
    assert_eq!(points, vec![vec![0, 3, 5, 12], vec![13, 16]]);

    let lines: Vec<usize> = debug.methods[0]
        .sequence_points
        .iter()
        .map(|p| p.start_line)
        .collect();
    assert_eq!(lines, vec![5, 6, 7, 8], "source positions are untouched");
    Ok(())
}

#[test]
fn test_optimized_counter_serializes() -> Result<()> {
    let original = counter();
    let result = optimize(original.clone(), &OptimizerConfig::default())?;
    let nef = &result.assets.nef;

    assert_eq!(nef.compiler, TEST_COMPILER);
    assert_eq!(nef.tokens, original.nef.tokens);
    assert_ne!(nef.checksum, original.nef.checksum);

    let parsed = NefFile::parse(&nef.to_bytes()?)?;
    assert_eq!(&parsed, nef);

    let debug = result
        .assets
        .debug_info
        .as_ref()
        .ok_or_else(|| eyre!("debug info was dropped"))?;
    let archive = debug.to_archive("Counter.debug.json")?;
    assert_eq!(&DebugInfo::load(&archive)?, debug);

    let report = &result.report;
    assert_eq!((report.original_size, report.optimized_size), (19, 17));
    assert_eq!(report.rounds, 1);
    assert_eq!(report.strategies_applied, vec!["ConstantFold"]);
    assert!((report.size_reduction_percentage - 200.0 / 19.0).abs() < 1e-9);
    Ok(())
}

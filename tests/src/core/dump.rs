use nefopt_core::dump::{MemorySources, NoSources, dump_nef};
use nefopt_core::interop::InteropRegistry;
use nefopt_core::nef::NefFile;
use nefopt_tests::{COUNTER_SOURCE, counter};

const EXPECTED: &str = include_str!("../../fixtures/counter.nef.txt");

#[test]
fn dump_matches_golden_file() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .try_init();

    let assets = counter();
    let mut sources = MemorySources::new();
    sources.insert("Counter.cs", COUNTER_SOURCE);

    let dump = dump_nef(
        &assets.nef,
        assets.debug_info.as_ref(),
        Some(&assets.manifest),
        &InteropRegistry::neo_n3(),
        &sources,
    )
    .unwrap();
    assert_eq!(dump, EXPECTED);
}

#[test]
fn manifest_names_methods_without_debug_info() {
    let assets = counter();
    let dump = dump_nef(
        &assets.nef,
        None,
        Some(&assets.manifest),
        &InteropRegistry::empty(),
        &NoSources,
    )
    .unwrap();
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines[0], "# Method Start main");
    assert_eq!(lines[1], "00 INITSLOT 01-00 # 1 local variables, 0 arguments");
    let helper = lines
        .iter()
        .position(|line| *line == "# Method Start helper")
        .expect("helper is annotated");
    assert_eq!(lines[helper + 1], "15 PUSHINT16 E8-03 # 1000");
    assert!(!dump.contains("# Code"), "no debug info, no code lines");
}

#[test]
fn missing_sources_still_name_the_line() {
    let assets = counter();
    let dump = dump_nef(
        &assets.nef,
        assets.debug_info.as_ref(),
        None,
        &InteropRegistry::empty(),
        &NoSources,
    )
    .unwrap();
    assert!(dump.contains("# Code Counter.cs line 6\n03 PUSH1\n"));
    assert!(dump.contains("# Code Counter.cs line 10\n# Code Counter.cs line 11\n"));
}

#[test]
fn implicit_ret_is_not_printed() {
    // PUSH1 PUSH2 ADD, no RET.
    let nef = NefFile::new("nefopt-tests", "", vec![], vec![0x11, 0x12, 0x9E]).unwrap();
    let dump = dump_nef(&nef, None, None, &InteropRegistry::empty(), &NoSources).unwrap();
    assert_eq!(dump, "0 PUSH1\n1 PUSH2\n2 ADD\n");
}

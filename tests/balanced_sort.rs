use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use rstest::*;

use kway_sort::{BalancedSorter, BalancedSorterBuilder, SortError};

#[fixture]
fn tmp_dir() -> tempfile::TempDir {
    tempfile::tempdir_in("./").unwrap()
}

fn write_lines(path: &Path, lines: &[String]) {
    let content: String = lines.iter().map(|line| format!("{}\n", line)).collect();
    fs::write(path, content).unwrap();
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path).unwrap().lines().map(String::from).collect()
}

fn sorter(heap_size: usize, fan_in: usize, tmp_dir: &Path) -> BalancedSorter {
    BalancedSorterBuilder::new()
        .with_heap_size(heap_size)
        .with_fan_in(fan_in)
        .with_tmp_dir(tmp_dir)
        .with_rw_buf_size(64)
        .build::<String>()
        .unwrap()
}

/// A run file made of `runs` runs of random length.
fn run_file(runs: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut lines = Vec::new();
    for run in 0..runs {
        let len = rng.gen_range(1..6);
        // every run starts below the end of the previous one
        let base = (runs - run) * 10;
        for offset in 0..len {
            lines.push(format!("{:06}", base + offset));
        }
    }
    lines
}

#[rstest]
fn test_convergence(tmp_dir: tempfile::TempDir) {
    for fan_in in 2..7 {
        for runs in 0..40 {
            let lines = run_file(runs);
            let input = tmp_dir.path().join(format!("k{}-r{}.runs", fan_in, runs));
            write_lines(&input, &lines);

            let report = sorter(4, fan_in, tmp_dir.path()).merge_runs::<String>(&input).unwrap();

            assert_eq!(report.runs, runs, "k={}, runs={}", fan_in, runs);
            let mut expected = lines.clone();
            expected.sort();
            assert_eq!(read_lines(&report.path), expected, "k={}, runs={}", fan_in, runs);
            if runs <= 1 {
                assert_eq!(report.rounds, 0);
            }
        }
    }
}

#[rstest]
#[case(1, 2)]
#[case(2, 3)]
#[case(7, 2)]
#[case(32, 5)]
fn test_both_phases(tmp_dir: tempfile::TempDir, #[case] heap_size: usize, #[case] fan_in: usize) {
    let mut lines = Vec::from_iter((0..2_000).map(|item| format!("{}", item * 7919 % 1_000)));
    lines.shuffle(&mut rand::thread_rng());
    let input = tmp_dir.path().join("data.txt");
    write_lines(&input, &lines);

    let sorter = sorter(heap_size, fan_in, tmp_dir.path());
    let runs = sorter.create_runs::<String>(&input).unwrap();
    assert_eq!(runs.records, lines.len() as u64);

    let merged = sorter.merge_runs::<String>(&runs.path).unwrap();
    assert_eq!(merged.path, tmp_dir.path().join("data.txt.sorted"));
    // equal adjacent keys inside a generated run are split by the distributor
    assert!(merged.runs >= runs.runs);
    assert!(merged.passes >= merged.rounds);

    lines.sort();
    assert_eq!(read_lines(&merged.path), lines);
}

#[rstest]
fn test_small_scenario(tmp_dir: tempfile::TempDir) {
    let lines = Vec::from_iter(["5", "3", "8", "1", "9", "2"].map(String::from));
    let input = tmp_dir.path().join("six");
    write_lines(&input, &lines);

    let sorter = sorter(2, 2, tmp_dir.path());
    let runs = sorter.create_runs::<String>(&input).unwrap();
    assert!(runs.runs >= 2);

    let merged = sorter.merge_runs::<String>(&runs.path).unwrap();
    assert_eq!(read_lines(&merged.path), vec!["1", "2", "3", "5", "8", "9"]);
}

#[rstest]
fn test_non_utf8_lines(tmp_dir: tempfile::TempDir) {
    let input = tmp_dir.path().join("bytes.txt");
    fs::write(&input, b"b\n\xff\xfe\na\n").unwrap();

    let sorter = BalancedSorterBuilder::new()
        .with_heap_size(2)
        .with_fan_in(2)
        .with_tmp_dir(tmp_dir.path())
        .build::<Vec<u8>>()
        .unwrap();
    let report = sorter.sort_file::<Vec<u8>>(&input).unwrap();

    assert_eq!(fs::read(&report.path).unwrap(), b"a\nb\n\xff\xfe\n");

    let result = sorter.create_runs::<String>(&input);
    assert!(matches!(result, Err(SortError::DeserializationError(_))));
}

#[rstest]
fn test_zero_heap_size(tmp_dir: tempfile::TempDir) {
    let input = tmp_dir.path().join("data.txt");
    write_lines(&input, &["b".to_string(), "a".to_string()]);

    let result = BalancedSorterBuilder::new().with_heap_size(0).build::<String>();

    assert!(matches!(result, Err(SortError::InvalidHeapSize(0))));
    assert!(!tmp_dir.path().join("data.txt.runs").exists());
}

#[rstest]
fn test_missing_input(tmp_dir: tempfile::TempDir) {
    let input = tmp_dir.path().join("missing.txt");

    let result = sorter(2, 2, tmp_dir.path()).create_runs::<String>(&input);

    assert!(matches!(result, Err(SortError::IO(_))));
    assert!(!tmp_dir.path().join("missing.txt.runs").exists());
}

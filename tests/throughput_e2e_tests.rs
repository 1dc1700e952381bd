//! End-to-end throughput runs through the binary: short deterministic
//! runs that must produce real files and a well-formed result log.

use assert_cmd::Command;
use serial_test::serial;
use std::path::{Path, PathBuf};

fn filestress() -> Command {
    Command::cargo_bin("filestress").unwrap()
}

/// The result file name carries a time stamp, so find it by prefix.
fn find_result_log(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir).ok()?.flatten().find_map(|entry| {
        let name = entry.file_name().to_string_lossy().into_owned();
        (name.starts_with("Througput_") && name.ends_with(".csv")).then(|| entry.path())
    })
}

#[test]
#[serial]
fn test_short_run_writes_result_log_and_cleans_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    filestress()
        .args([
            "throughput",
            "--minutes",
            "0.01",
            "--threads",
            "1",
            "--file-size-mb",
            "1",
            "--no-random",
            dir.path().to_str().unwrap(),
        ])
        .assert()
        .success();

    // Result log next to the (now cleaned) output folder.
    let log_path = find_result_log(dir.path()).expect("result log missing");
    let log = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert!(lines.len() >= 2, "expected at least one measurement row");
    assert!(lines[0].starts_with("FileNr;Time;"));
    for row in &lines[1..] {
        assert_eq!(row.split(';').count(), 12);
    }

    // Default run deletes the benchmark files afterwards.
    assert!(!dir.path().join("TempFilePerformanceTest").exists());
}

#[test]
#[serial]
fn test_keep_files_preserves_one_mib_pattern_files() {
    let dir = tempfile::tempdir().unwrap();
    filestress()
        .args([
            "throughput",
            "--minutes",
            "0.01",
            "--threads",
            "1",
            "--file-size-mb",
            "1",
            "--no-random",
            "--keep-files",
            dir.path().to_str().unwrap(),
        ])
        .assert()
        .success();

    let out = dir.path().join("TempFilePerformanceTest");
    let files: Vec<_> = std::fs::read_dir(&out).unwrap().flatten().collect();
    assert!(!files.is_empty());
    for entry in files {
        let data = std::fs::read(entry.path()).unwrap();
        assert_eq!(data.len(), 1024 * 1024);
        assert!(data.iter().all(|&b| b == b'A'));
    }

    // Row count matches file count: one measurement per completed write.
    let log = std::fs::read_to_string(find_result_log(dir.path()).unwrap()).unwrap();
    let rows = log.lines().count() - 1;
    assert_eq!(rows, std::fs::read_dir(&out).unwrap().count());
}

#[test]
#[serial]
fn test_multiple_threads_cumulative_column_is_non_decreasing() {
    let dir = tempfile::tempdir().unwrap();
    filestress()
        .args([
            "throughput",
            "--minutes",
            "0.02",
            "--threads",
            "4",
            "--file-size-mb",
            "1",
            "--no-random",
            dir.path().to_str().unwrap(),
        ])
        .assert()
        .success();

    let log = std::fs::read_to_string(find_result_log(dir.path()).unwrap()).unwrap();
    let totals: Vec<u64> = log
        .lines()
        .skip(1)
        .map(|row| row.split(';').nth(7).unwrap().parse().unwrap())
        .collect();
    assert!(!totals.is_empty());
    assert!(totals.windows(2).all(|w| w[0] <= w[1]));
    // Final value equals successful writes x 1 MB.
    assert_eq!(*totals.last().unwrap(), totals.len() as u64);
}

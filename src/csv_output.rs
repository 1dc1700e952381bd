//! Result-log serialization for the throughput benchmark
//!
//! One `;`-separated row per completed write, preceded by a header row.
//! The log is formatted by hand (no csv crate) and written in one shot at
//! shutdown. The result file lands next to the output folder, never inside
//! it, so the end-of-run temp cleanup cannot delete the results.

use crate::stats::WriteMeasurement;
use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};

/// Timestamp format for the per-measurement time column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Hostname embedded in the result file name; "unknown" when the OS will
/// not say.
pub fn machine_name() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Root of the filesystem tree the folder lives on, recorded in the
/// "Drive" column. On Unix this is the path's root component. Relative
/// folders are resolved against the current directory first; a folder
/// that cannot be resolved still reports `/`.
pub fn volume_root(folder: &Path) -> PathBuf {
    let absolute = if folder.is_absolute() {
        folder.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(folder))
            .unwrap_or_else(|_| PathBuf::from("/"))
    };
    absolute
        .ancestors()
        .last()
        .filter(|root| !root.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Directory the result file is written to: the parent of the output
/// folder (the output folder itself gets cleaned on exit).
pub fn report_dir(folder: &Path) -> PathBuf {
    folder
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Result file name, e.g.
/// `Througput_myhost_10MB_5minutes_14_03_59.csv`. The spelling is part of
/// the established format.
pub fn result_file_path(
    dir: &Path,
    machine: &str,
    file_size_mb: f32,
    runtime_minutes: f32,
    stamp: DateTime<Local>,
) -> PathBuf {
    dir.join(format!(
        "Througput_{}_{:.0}MB_{}minutes_{}.csv",
        machine,
        file_size_mb,
        runtime_minutes,
        stamp.format("%H_%M_%S")
    ))
}

fn header(file_size_mb: f32) -> String {
    format!(
        "FileNr;Time;Time since Start in s;Open in s;Write in s;Close in s;\
         Total duration for {file_size_mb} MB file in s;MB Written so far;\
         MB/s Averaged over last 10s;Drive;Threads;FileName"
    )
}

fn format_row(
    seq: usize,
    m: &WriteMeasurement,
    drive: &Path,
    thread_count: usize,
) -> String {
    format!(
        "{};{};{};{:.6};{:.6};{:.6};{:.6};{};{};{};{};{}",
        seq,
        m.complete_time.format(TIMESTAMP_FORMAT),
        m.elapsed_secs,
        m.create_secs,
        m.write_secs,
        m.close_secs,
        m.total_secs,
        m.total_mb_written,
        m.mb_per_sec_10s,
        drive.display(),
        thread_count,
        m.file_name
    )
}

/// Serialize the full measurement log: header row plus one row per write.
pub fn format_result_log(
    measurements: &[WriteMeasurement],
    file_size_mb: f32,
    drive: &Path,
    thread_count: usize,
) -> String {
    let mut out = String::new();
    out.push_str(&header(file_size_mb));
    out.push('\n');
    for (i, m) in measurements.iter().enumerate() {
        out.push_str(&format_row(i + 1, m, drive, thread_count));
        out.push('\n');
    }
    out
}

/// Write the result log for a finished run; returns the file's path.
pub fn save_results(
    folder: &Path,
    runtime_minutes: f32,
    file_size_mb: f32,
    thread_count: usize,
    measurements: &[WriteMeasurement],
) -> io::Result<PathBuf> {
    let drive = volume_root(folder);
    let path = result_file_path(
        &report_dir(folder),
        &machine_name(),
        file_size_mb,
        runtime_minutes,
        Local::now(),
    );
    let log = format_result_log(measurements, file_size_mb, &drive, thread_count);
    std::fs::write(&path, log)?;
    Ok(path)
}

//! File-creation latency benchmark
//!
//! Creates a large number of files with deliberately long, nearly
//! identical names (the expensive case for directory indexes) from two
//! worker threads pulling names off a shared queue, timing each
//! create/write/close individually. Timings land in a tab-separated
//! `FileCreation.csv` next to the output folder.

use crate::csv_output::{report_dir, TIMESTAMP_FORMAT};
use chrono::Local;
use rand::Rng;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::info;

/// Worker threads pulling from the shared name queue.
const WORKERS: usize = 2;

const LONG_NAME_STEM: &str = "this is a very long file name which contains many characters \
to make it expensive for the file system to index many similar names ";

#[derive(Debug, Clone)]
pub struct CreationConfig {
    pub folder: PathBuf,
    pub file_count: usize,
    /// Bytes written into each file; zero measures pure create/close.
    pub file_size_bytes: usize,
    /// Stat each file after closing it (adds a metadata round trip).
    pub read_len_back: bool,
}

/// Run the benchmark; returns the path of the written report.
pub fn run(cfg: &CreationConfig) -> io::Result<PathBuf> {
    std::fs::create_dir_all(&cfg.folder)?;
    let existing = std::fs::read_dir(&cfg.folder)?.count();
    info!(
        files = cfg.file_count,
        size = cfg.file_size_bytes,
        folder = %cfg.folder.display(),
        existing,
        "creating files"
    );

    let mut rng = rand::thread_rng();
    let names: VecDeque<PathBuf> = (0..cfg.file_count)
        .map(|_| {
            cfg.folder.join(format!(
                "{LONG_NAME_STEM}{}{}{}",
                rng.gen::<u32>(),
                rng.gen::<u32>(),
                rng.gen::<u32>()
            ))
        })
        .collect();
    let names = Mutex::new(names);
    let rows: Mutex<Vec<(String, String)>> = Mutex::new(Vec::with_capacity(cfg.file_count));

    let pattern = vec![b'A'; cfg.file_size_bytes];
    let started = Instant::now();
    std::thread::scope(|s| {
        for _ in 0..WORKERS {
            s.spawn(|| create_worker(cfg, &names, &rows, &pattern));
        }
    });
    let elapsed = started.elapsed();

    let report = report_dir(&cfg.folder).join("FileCreation.csv");
    info!(
        files = cfg.file_count,
        elapsed_s = elapsed.as_secs_f64(),
        report = %report.display(),
        "file creation finished"
    );

    let column = if cfg.file_size_bytes > 0 {
        format!(
            "File Create/Write {} MB/Close in ms",
            cfg.file_size_bytes / (1024 * 1024)
        )
    } else {
        "File Create/Close in ms".to_string()
    };
    let mut out = String::new();
    out.push_str(&format!("FileNr\tTime\t{column}\n"));
    for (i, (time, duration)) in rows.into_inner().expect("row lock poisoned").iter().enumerate() {
        out.push_str(&format!("{}\t{}\t{}\n", i + 1, time, duration));
    }
    std::fs::write(&report, out)?;
    Ok(report)
}

fn create_worker(
    cfg: &CreationConfig,
    names: &Mutex<VecDeque<PathBuf>>,
    rows: &Mutex<Vec<(String, String)>>,
    pattern: &[u8],
) {
    loop {
        let Some(path) = names.lock().expect("name queue poisoned").pop_front() else {
            break;
        };
        if let Ok(ms) = create_one(cfg, &path, pattern) {
            rows.lock()
                .expect("row lock poisoned")
                .push((Local::now().format(TIMESTAMP_FORMAT).to_string(), ms.to_string()));
        }
    }
}

fn create_one(cfg: &CreationConfig, path: &Path, pattern: &[u8]) -> io::Result<u64> {
    let sw = Instant::now();
    {
        let mut file = File::options().write(true).create_new(true).open(path)?;
        if !pattern.is_empty() {
            file.write_all(pattern)?;
        }
    }
    if cfg.read_len_back {
        let _ = std::fs::metadata(path)?.len();
    }
    Ok(sw.elapsed().as_millis() as u64)
}

//! CLI argument parsing for FileStress

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Folder created inside the target directory for temporary benchmark
/// files.
pub const FOLDER_NAME: &str = "TempFilePerformanceTest";

#[derive(Parser, Debug)]
#[command(name = "filestress")]
#[command(version)]
#[command(about = "Storage and virtual-memory stress tool", long_about = None)]
pub struct Cli {
    /// Enable verbose internal tracing
    #[arg(long, global = true)]
    pub debug: bool,

    /// Do not delete created temporary files on exit
    #[arg(long = "keep-files", global = true)]
    pub keep_files: bool,

    /// Commit and touch N GiB of memory before the selected mode starts
    #[arg(long = "touch-gb", global = true, value_name = "GB")]
    pub touch_gb: Option<usize>,

    /// Commit but do not touch N GiB of memory before the selected mode starts
    #[arg(long = "commit-gb", global = true, value_name = "GB")]
    pub commit_gb: Option<usize>,

    /// Wait for an enter press before exiting (keeps allocations alive
    /// until released interactively)
    #[arg(long = "wait-for-enter", global = true)]
    pub wait_for_enter: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write throughput test: N threads continuously create, write, and
    /// close files while per-operation timings are recorded
    Throughput {
        /// Runtime in minutes; fractions work for short runs (e.g. 0.1)
        #[arg(long, default_value = "5")]
        minutes: f32,

        /// Number of concurrent writer threads
        #[arg(long, default_value = "2")]
        threads: usize,

        /// Size of each written file in MB
        #[arg(long = "file-size-mb", default_value = "10")]
        file_size_mb: f32,

        /// Write a constant pattern instead of continuously re-randomized
        /// data
        #[arg(long = "no-random")]
        no_random: bool,

        /// Target directory; benchmark files go into a
        /// TempFilePerformanceTest folder inside it
        #[arg(value_name = "DIR")]
        target: Option<PathBuf>,
    },

    /// Mapped-region pipeline: create shared-memory regions at a fixed
    /// rate and drain them to files from a second thread
    Map {
        /// Regions created per second
        #[arg(long, default_value = "30")]
        rate: u32,

        /// Size of each region (and written file) in MB
        #[arg(long = "file-size-mb", default_value = "10")]
        file_size_mb: f32,

        /// Keep regions mapped until they are written, holding their pages
        /// in the process working set
        #[arg(long = "no-unmap")]
        no_unmap: bool,

        /// Never drain; the backlog of mapped regions grows until exit,
        /// modeling a memory leak
        #[arg(long = "no-write")]
        no_write: bool,

        /// Target directory; region files go into a
        /// TempFilePerformanceTest folder inside it
        #[arg(value_name = "DIR")]
        target: Option<PathBuf>,
    },

    /// File creation benchmark: many files with long, similar names
    Filecreate {
        /// Number of files to create
        #[arg(long, default_value = "20000")]
        count: usize,

        /// Bytes written per file; zero measures pure create/close
        #[arg(long = "file-size-bytes", default_value = "0")]
        file_size_bytes: usize,

        /// Stat each file after closing it
        #[arg(long = "read-len")]
        read_len: bool,

        /// Target directory; files go into a TempFilePerformanceTest
        /// folder inside it
        #[arg(value_name = "DIR")]
        target: Option<PathBuf>,
    },

    /// Sequential read throughput over all files in a directory
    Readperf {
        /// Directory the files are read from
        #[arg(long = "read-dir", value_name = "DIR")]
        read_dir: PathBuf,

        /// Read buffer size in KB
        #[arg(long = "buffer-kb", default_value = "65535")]
        buffer_kb: usize,
    },

    /// Drop the file system cache for a file or all files in a folder
    Flush {
        /// File or directory to flush
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Also flush files in all subdirectories
        #[arg(long)]
        recursive: bool,
    },
}

/// Resolve the benchmark output folder for a target directory argument;
/// defaults to the system temp directory.
pub fn output_folder(target: Option<&PathBuf>) -> PathBuf {
    target
        .cloned()
        .unwrap_or_else(std::env::temp_dir)
        .join(FOLDER_NAME)
}

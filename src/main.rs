use anyhow::Result;
use clap::{CommandFactory, Parser};
use filestress::cancel::CancelToken;
use filestress::cli::{output_folder, Cli, Command};
use filestress::pipeline::{MappedPipeline, PipelineConfig};
use filestress::throughput::{ThroughputConfig, ThroughputHarness};
use filestress::{alloc_stress, cache_flush, file_create, read_perf};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const MB: f64 = 1024.0 * 1024.0;

/// Initialize the tracing subscriber; `--debug` turns on trace-level
/// internals, otherwise progress lines come out at info level.
fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();
}

/// Delete the benchmark's temporary files (and the folder itself when it
/// ends up empty). Every step is best-effort; files being deleted by a
/// concurrent cleanup are not an error.
fn clean_files(folder: &Path) {
    let Ok(entries) = std::fs::read_dir(folder) else {
        return;
    };
    let files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    if !files.is_empty() {
        info!(count = files.len(), folder = %folder.display(), "cleaning temp files");
        for file in files {
            let _ = std::fs::remove_file(file);
        }
    }
    let _ = std::fs::remove_dir(folder);
}

fn run_throughput(
    token: CancelToken,
    minutes: f32,
    threads: usize,
    file_size_mb: f32,
    no_random: bool,
    target: Option<PathBuf>,
) -> Result<()> {
    let folder = output_folder(target.as_ref());
    let cfg = ThroughputConfig {
        folder: folder.clone(),
        runtime_minutes: minutes,
        file_size_mb,
        thread_count: threads,
        use_random_data: !no_random,
    };
    let cleanup_folder = folder.clone();
    let harness = ThroughputHarness::new(cfg, token, move || clean_files(&cleanup_folder));
    harness.run()?;
    Ok(())
}

fn run_map(
    token: CancelToken,
    rate: u32,
    file_size_mb: f32,
    no_unmap: bool,
    no_write: bool,
    target: Option<PathBuf>,
) -> Result<()> {
    let folder = output_folder(target.as_ref());
    // Regions are filled in 8-byte words; align the configured size.
    let region_len = ((file_size_mb as f64 * MB) as usize / 8).max(1) * 8;
    let pipeline = MappedPipeline::new(
        PipelineConfig {
            region_len,
            unmap_after_fill: !no_unmap,
            write_files: !no_write,
        },
        token,
    );
    let producer = pipeline.start(rate);
    pipeline.write(&folder)?;
    match producer.join() {
        Ok(result) => result?,
        Err(_) => warn!("region producer panicked"),
    }
    info!(produced = pipeline.produced(), "mapped pipeline finished");
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let token = CancelToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || token.cancel())?;
    }

    // Memory commitment happens before any selected mode starts and is
    // held until process exit.
    let mut allocated = None;
    if let Some(gb) = args.touch_gb {
        allocated = Some(alloc_stress::allocate_memory(gb, true)?);
    } else if let Some(gb) = args.commit_gb {
        allocated = Some(alloc_stress::allocate_memory(gb, false)?);
    }

    let keep_files = args.keep_files;
    let cleanup_after = |folder: &Path| {
        if !keep_files {
            clean_files(folder);
        }
    };

    match args.command {
        Some(Command::Throughput {
            minutes,
            threads,
            file_size_mb,
            no_random,
            target,
        }) => {
            let folder = output_folder(target.as_ref());
            run_throughput(token, minutes, threads, file_size_mb, no_random, target)?;
            cleanup_after(&folder);
        }
        Some(Command::Map {
            rate,
            file_size_mb,
            no_unmap,
            no_write,
            target,
        }) => {
            let folder = output_folder(target.as_ref());
            run_map(token, rate, file_size_mb, no_unmap, no_write, target)?;
            cleanup_after(&folder);
        }
        Some(Command::Filecreate {
            count,
            file_size_bytes,
            read_len,
            target,
        }) => {
            let folder = output_folder(target.as_ref());
            file_create::run(&file_create::CreationConfig {
                folder: folder.clone(),
                file_count: count,
                file_size_bytes,
                read_len_back: read_len,
            })?;
            cleanup_after(&folder);
        }
        Some(Command::Readperf { read_dir, buffer_kb }) => {
            read_perf::ReadPerf::new(&read_dir, buffer_kb)?.run()?;
        }
        Some(Command::Flush { path, recursive }) => {
            cache_flush::CacheFlush::new(&path, recursive)?.flush();
        }
        None => {
            if allocated.is_some() {
                info!("allocation test completed");
            } else {
                Cli::command().print_help()?;
            }
        }
    }

    if args.wait_for_enter {
        println!("Press enter to exit");
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
    }
    drop(allocated);

    Ok(())
}

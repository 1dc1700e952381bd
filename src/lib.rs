//! FileStress - storage and virtual-memory stress tool
//!
//! This library provides the core machinery for stressing a machine's
//! storage and virtual-memory subsystems while measuring what happens:
//! a rate-controlled memory-mapped region pipeline that drains to disk,
//! and a multi-threaded file-write throughput benchmark with per-operation
//! latency capture and a rolling throughput average.

pub mod alloc_stress;
pub mod buffer;
pub mod cache_flush;
pub mod cancel;
pub mod cli;
pub mod csv_output;
pub mod error;
pub mod file_create;
pub mod handoff;
pub mod pipeline;
pub mod read_perf;
pub mod region;
pub mod stats;
pub mod throughput;

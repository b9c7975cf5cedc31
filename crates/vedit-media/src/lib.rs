//! FFmpeg CLI wrapper for media jobs.
//!
//! This crate provides:
//! - Deterministic FFmpeg command building from a `JobRequest`
//! - Process execution with bounded output capture
//! - Cancellation and timeout support via tokio
//! - Output path resolution for single files and frame sequences

pub mod command;
pub mod error;
pub mod output;
pub mod runner;

pub use command::{split_options, BuiltCommand, CommandBuilder};
pub use error::{BuildError, BuildResult, MediaError, MediaResult, RunError, RunResult};
pub use output::{collect_outputs, resolve_output_path, FramePattern, OutputSnapshot};
pub use runner::{locate_ffmpeg, ProcessOutput, ProcessRunner, DEFAULT_CAPTURE_LIMIT};

//! Output path resolution.
//!
//! A file pattern is either a plain file name or an image-sequence name with
//! a printf-style frame number (`frame_%03d.jpg`), in which case FFmpeg
//! writes one file per frame.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::Regex;
use tracing::debug;

use crate::error::MediaResult;

/// Join a file pattern onto the output directory.
///
/// Absolute patterns are returned unchanged.
pub fn resolve_output_path(output_dir: &Path, file_pattern: &str) -> PathBuf {
    let pattern = Path::new(file_pattern);
    if pattern.is_absolute() {
        pattern.to_path_buf()
    } else {
        output_dir.join(pattern)
    }
}

/// File name matcher for a frame-sequence pattern.
#[derive(Debug, Clone)]
pub struct FramePattern {
    regex: Regex,
}

impl FramePattern {
    /// Parse a file name. Returns `None` if it has no frame placeholder.
    ///
    /// Supported placeholders are `%d` and `%0Nd`; `%%` is a literal percent.
    pub fn parse(file_name: &str) -> Option<Self> {
        let mut expr = String::from("^");
        let mut literal = String::new();
        let mut has_placeholder = false;
        let mut chars = file_name.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }

            match chars.peek() {
                Some('%') => {
                    chars.next();
                    literal.push('%');
                }
                Some('0'..='9') | Some('d') => {
                    let mut width = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        width.push(d);
                        chars.next();
                    }
                    if chars.peek() != Some(&'d') {
                        // Not a frame number, keep it verbatim.
                        literal.push('%');
                        literal.push_str(&width);
                        continue;
                    }
                    chars.next();

                    expr.push_str(&regex::escape(&literal));
                    literal.clear();
                    match width.trim_start_matches('0').parse::<usize>() {
                        Ok(w) if w > 1 => expr.push_str(&format!(r"\d{{{},}}", w)),
                        _ => expr.push_str(r"\d+"),
                    }
                    has_placeholder = true;
                }
                _ => literal.push('%'),
            }
        }

        if !has_placeholder {
            return None;
        }

        expr.push_str(&regex::escape(&literal));
        expr.push('$');
        Regex::new(&expr).ok().map(|regex| Self { regex })
    }

    /// Whether a concrete file name belongs to this sequence.
    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }
}

/// List the files currently matching `output_path`.
///
/// Frame sequences are expanded by scanning the parent directory and sorted
/// by name. A plain path is returned if it exists. Missing outputs produce an
/// empty list rather than an error.
pub async fn collect_outputs(output_path: &Path) -> MediaResult<Vec<PathBuf>> {
    let file_name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let Some(pattern) = FramePattern::parse(&file_name) else {
        return Ok(if tokio::fs::try_exists(output_path).await? {
            vec![output_path.to_path_buf()]
        } else {
            Vec::new()
        });
    };

    let dir = match output_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if pattern.matches(&name.to_string_lossy()) && entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    debug!("Resolved {} output files for {}", files.len(), output_path.display());
    Ok(files)
}

/// Matches of an output path taken before a run.
///
/// The output directory is shared between jobs, so whatever already matched
/// before the run is only counted again if the run rewrote it.
#[derive(Debug, Clone)]
pub struct OutputSnapshot {
    output_path: PathBuf,
    before: HashMap<PathBuf, Option<SystemTime>>,
}

impl OutputSnapshot {
    /// Record the files matching `output_path` and their modification times.
    pub async fn capture(output_path: &Path) -> MediaResult<Self> {
        let mut before = HashMap::new();
        for path in collect_outputs(output_path).await? {
            let modified = modified_time(&path).await;
            before.insert(path, modified);
        }

        Ok(Self {
            output_path: output_path.to_path_buf(),
            before,
        })
    }

    /// Matches that are new or were modified since the snapshot.
    pub async fn produced(&self) -> MediaResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut unchanged = 0;
        for path in collect_outputs(&self.output_path).await? {
            let changed = match self.before.get(&path) {
                None => true,
                Some(previous) => {
                    let modified = modified_time(&path).await;
                    modified.is_none() || modified != *previous
                }
            };
            if changed {
                files.push(path);
            } else {
                unchanged += 1;
            }
        }

        if unchanged > 0 {
            debug!(
                "Ignoring {} unchanged files matching {}",
                unchanged,
                self.output_path.display()
            );
        }
        Ok(files)
    }
}

async fn modified_time(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

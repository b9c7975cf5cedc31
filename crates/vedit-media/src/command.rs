//! FFmpeg command builder.
//!
//! Arguments are always emitted in the same order:
//!
//! 1. `-y`
//! 2. `-ss <start>` (before the input, so FFmpeg seeks on the demuxer)
//! 3. `-i <input>`
//! 4. `-vf <graph>`, filters joined with `,` in ascending name order
//! 5. `-frames:v <n>`
//! 6. extra options, tokenized by [`split_options`]
//! 7. the resolved output path

use std::path::{Path, PathBuf};

use vedit_models::JobRequest;

use crate::error::{BuildError, BuildResult};
use crate::output::resolve_output_path;

const FILTER_SEPARATOR: &str = ",";

/// A ready-to-run FFmpeg invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCommand {
    program: PathBuf,
    args: Vec<String>,
    output: PathBuf,
}

impl BuiltCommand {
    /// Create a command from parts.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            output: output.into(),
        }
    }

    /// Executable to run.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments, excluding the program name.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Resolved output path (may be a frame-sequence pattern).
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Render for logs, quoting each argument so spaces stay unambiguous.
    pub fn display(&self) -> String {
        std::iter::once(format!("{:?}", self.program))
            .chain(self.args.iter().map(|arg| format!("{:?}", arg)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Translates job requests into FFmpeg command lines.
///
/// The executable and output directory come from configuration and are
/// never taken from the request.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    ffmpeg_path: PathBuf,
    output_dir: PathBuf,
}

impl CommandBuilder {
    /// Create a builder.
    pub fn new(ffmpeg_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Configured executable.
    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Build the command for a request.
    pub fn build(&self, request: &JobRequest) -> BuildResult<BuiltCommand> {
        let input = request.input.file_path.trim();
        if input.is_empty() {
            return Err(BuildError::EmptyInput);
        }

        let pattern = request.output.file_pattern.trim();
        if pattern.is_empty() {
            return Err(BuildError::EmptyOutputPattern);
        }

        let mut args = vec!["-y".to_string()];

        if let Some(start) = request.start_time() {
            if !is_valid_timestamp(start) {
                return Err(BuildError::InvalidStartTime(start.to_string()));
            }
            args.push("-ss".to_string());
            args.push(start.to_string());
        }

        args.push("-i".to_string());
        args.push(input.to_string());

        if let Some(graph) = filter_graph(request) {
            args.push("-vf".to_string());
            args.push(graph);
        }

        if let Some(frames) = request.frame_count() {
            if frames.parse::<u64>().is_err() {
                return Err(BuildError::InvalidFrameCount(frames.to_string()));
            }
            args.push("-frames:v".to_string());
            args.push(frames.to_string());
        }

        if let Some(extra) = request.extra_options() {
            args.extend(split_options(extra));
        }

        let output = resolve_output_path(&self.output_dir, pattern);
        args.push(output.to_string_lossy().to_string());

        Ok(BuiltCommand::new(&self.ffmpeg_path, args, output))
    }
}

/// Render the filter graph, `name=value` or bare `name`, sorted by name.
fn filter_graph(request: &JobRequest) -> Option<String> {
    if request.filters.is_empty() {
        return None;
    }

    // BTreeMap iterates in ascending key order.
    let parts: Vec<String> = request
        .filters
        .iter()
        .map(|(name, value)| {
            if value.is_empty() {
                name.clone()
            } else {
                format!("{}={}", name, value)
            }
        })
        .collect();

    Some(parts.join(FILTER_SEPARATOR))
}

/// Split an options string on whitespace, keeping double-quoted runs together.
///
/// The quotes themselves are removed since the arguments go straight to the
/// process, not through a shell. Inside quotes `\"` is a literal quote. An
/// unterminated quote runs to the end of the input.
pub fn split_options(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            '\\' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        tokens.push(current);
    }

    tokens
}

/// `HH:MM:SS` with an optional fraction of up to six digits.
fn is_valid_timestamp(value: &str) -> bool {
    let (hms, fraction) = match value.split_once('.') {
        Some((hms, fraction)) => (hms, Some(fraction)),
        None => (value, None),
    };

    if let Some(fraction) = fraction {
        if fraction.is_empty() || fraction.len() > 6 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }

    let parts: Vec<&str> = hms.split(':').collect();
    let &[hours, minutes, seconds] = parts.as_slice() else {
        return false;
    };

    let two_digit_below_60 = |s: &str| s.len() == 2 && s.parse::<u8>().is_ok_and(|n| n < 60);

    !hours.is_empty()
        && hours.bytes().all(|b| b.is_ascii_digit())
        && two_digit_below_60(minutes)
        && two_digit_below_60(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> CommandBuilder {
        CommandBuilder::new("/usr/bin/ffmpeg", "/srv/out")
    }

    #[test]
    fn test_minimal_command() {
        let cmd = builder().build(&JobRequest::new("in.mp4", "out.mp4")).unwrap();

        assert_eq!(cmd.program(), Path::new("/usr/bin/ffmpeg"));
        assert_eq!(cmd.args(), ["-y", "-i", "in.mp4", "/srv/out/out.mp4"]);
        assert_eq!(cmd.output(), Path::new("/srv/out/out.mp4"));
    }

    #[test]
    fn test_full_command_order() {
        let req = JobRequest::new("in.mp4", "thumbnail.jpg")
            .with_start_time("00:00:05.0")
            .with_filter("scale", "-1:100")
            .with_frame_count("1")
            .with_extra_options("-q:v 2");

        let cmd = builder().build(&req).unwrap();
        assert_eq!(
            cmd.args(),
            [
                "-y", "-ss", "00:00:05.0", "-i", "in.mp4", "-vf", "scale=-1:100", "-frames:v", "1",
                "-q:v", "2", "/srv/out/thumbnail.jpg",
            ]
        );
    }

    #[test]
    fn test_display_quotes_each_argument() {
        let req = JobRequest::new("my clip.mp4", "out.jpg")
            .with_filter("drawtext", "text='a b'");

        let cmd = builder().build(&req).unwrap();
        assert_eq!(
            cmd.display(),
            r#""/usr/bin/ffmpeg" "-y" "-i" "my clip.mp4" "-vf" "drawtext=text='a b'" "/srv/out/out.jpg""#
        );
    }

    #[test]
    fn test_overwrite_flag_first() {
        let req = JobRequest::new("in.mp4", "out.jpg")
            .with_start_time("00:01:00")
            .with_extra_options("-an");

        let cmd = builder().build(&req).unwrap();
        assert_eq!(cmd.args()[0], "-y");
    }

    #[test]
    fn test_seek_precedes_input() {
        let req = JobRequest::new("in.mp4", "out.jpg").with_start_time("01:02:03.456");
        let cmd = builder().build(&req).unwrap();
        let args = cmd.args();

        let seek = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(seek < input);
        assert_eq!(args[seek + 1], "01:02:03.456");
    }

    #[test]
    fn test_filters_sorted_regardless_of_insertion_order() {
        let forward = JobRequest::new("in.mp4", "out.jpg")
            .with_filter("hflip", "")
            .with_filter("scale", "-1:720")
            .with_filter("vflip", "");
        let reverse = JobRequest::new("in.mp4", "out.jpg")
            .with_filter("vflip", "")
            .with_filter("scale", "-1:720")
            .with_filter("hflip", "");

        let a = builder().build(&forward).unwrap();
        let b = builder().build(&reverse).unwrap();

        assert_eq!(a, b);
        let vf = a.args().iter().position(|s| s == "-vf").unwrap();
        assert_eq!(a.args()[vf + 1], "hflip,scale=-1:720,vflip");
    }

    #[test]
    fn test_quoted_extra_options() {
        let req = JobRequest::new("../../input.mp4", "thumbnail.jpg")
            .with_extra_options(r#"-vf "thumbnail,scale=640:480" -frames:v 1"#);

        let cmd = builder().build(&req).unwrap();
        assert_eq!(
            cmd.args(),
            [
                "-y", "-i", "../../input.mp4", "-vf", "thumbnail,scale=640:480", "-frames:v", "1",
                "/srv/out/thumbnail.jpg",
            ]
        );
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = builder().build(&JobRequest::new("", "out.jpg")).unwrap_err();
        assert_eq!(err, BuildError::EmptyInput);

        let err = builder().build(&JobRequest::new("   ", "out.jpg")).unwrap_err();
        assert_eq!(err, BuildError::EmptyInput);
    }

    #[test]
    fn test_empty_output_pattern_rejected() {
        let err = builder().build(&JobRequest::new("in.mp4", "")).unwrap_err();
        assert_eq!(err, BuildError::EmptyOutputPattern);
    }

    #[test]
    fn test_blank_optionals_are_omitted() {
        let req = JobRequest::new("in.mp4", "out.jpg")
            .with_start_time("")
            .with_frame_count("")
            .with_extra_options("   ");

        let cmd = builder().build(&req).unwrap();
        assert_eq!(cmd.args(), ["-y", "-i", "in.mp4", "/srv/out/out.jpg"]);
    }

    #[test]
    fn test_invalid_start_time() {
        for bad in ["5", "00:5:00", "00:00:60", "aa:00:00", "00:00:05.", "00:00:05.1234567"] {
            let req = JobRequest::new("in.mp4", "out.jpg").with_start_time(bad);
            assert_eq!(
                builder().build(&req).unwrap_err(),
                BuildError::InvalidStartTime(bad.to_string()),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_invalid_frame_count() {
        let req = JobRequest::new("in.mp4", "out.jpg").with_frame_count("-1");
        assert_eq!(
            builder().build(&req).unwrap_err(),
            BuildError::InvalidFrameCount("-1".to_string())
        );
    }

    #[test]
    fn test_split_options() {
        assert_eq!(split_options("  -a   b\t-c "), ["-a", "b", "-c"]);
        assert_eq!(split_options(r#"-metadata "title=My Clip""#), ["-metadata", "title=My Clip"]);
        assert_eq!(split_options(r#"-x "say \"hi\"""#), ["-x", r#"say "hi""#]);
        assert_eq!(split_options(r#"-x "unterminated value"#), ["-x", "unterminated value"]);
        assert_eq!(split_options(r#"-x """#), ["-x", ""]);
        assert!(split_options("").is_empty());
    }
}

//! Job request definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::JobId;

/// Source media for a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
    /// Path or locator of the source file
    pub file_path: String,
}

/// Where the job writes its results and who to tell about them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    /// Output file name, optionally with a frame placeholder such as `%03d`
    pub file_pattern: String,
    /// Callback URL notified once the job finishes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// A media transformation request.
///
/// Optional fields left empty are treated exactly like absent ones: the
/// corresponding argument is omitted from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub input: JobInput,
    pub output: JobOutput,
    /// Seek offset into the input, `HH:MM:SS.ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// Maximum number of video frames to write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<String>,
    /// Filter name to argument. Kept sorted by name so the filter graph is
    /// always rendered in the same order.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,
    /// Additional arguments, shell-quoted, appended after the filters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_options: Option<String>,
}

impl JobRequest {
    /// Create a request for an input file and an output pattern.
    pub fn new(input: impl Into<String>, file_pattern: impl Into<String>) -> Self {
        Self {
            input: JobInput {
                file_path: input.into(),
            },
            output: JobOutput {
                file_pattern: file_pattern.into(),
                webhook_url: None,
            },
            ..Default::default()
        }
    }

    /// Set the seek offset.
    pub fn with_start_time(mut self, start_time: impl Into<String>) -> Self {
        self.start_time = Some(start_time.into());
        self
    }

    /// Set the frame limit.
    pub fn with_frame_count(mut self, frame_count: impl Into<String>) -> Self {
        self.frame_count = Some(frame_count.into());
        self
    }

    /// Add a filter. An empty value renders the filter as a bare name.
    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    /// Set the raw extra options string.
    pub fn with_extra_options(mut self, options: impl Into<String>) -> Self {
        self.extra_options = Some(options.into());
        self
    }

    /// Set the webhook URL.
    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.output.webhook_url = Some(url.into());
        self
    }

    /// Seek offset, if present and non-empty.
    pub fn start_time(&self) -> Option<&str> {
        non_empty(self.start_time.as_deref())
    }

    /// Frame limit, if present and non-empty.
    pub fn frame_count(&self) -> Option<&str> {
        non_empty(self.frame_count.as_deref())
    }

    /// Extra options, if present and not blank.
    pub fn extra_options(&self) -> Option<&str> {
        non_empty(self.extra_options.as_deref())
    }

    /// Webhook URL, if present and not blank.
    pub fn webhook_url(&self) -> Option<&str> {
        non_empty(self.output.webhook_url.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Envelope carried on the job stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    /// Job ID chosen by the producer
    #[serde(default)]
    pub id: Option<JobId>,
    pub request: JobRequest,
}

impl JobEvent {
    /// Wrap a request in an envelope with a fresh job ID.
    pub fn new(request: JobRequest) -> Self {
        Self {
            id: Some(JobId::new()),
            request,
        }
    }

    /// Decode a stream payload.
    ///
    /// Accepts either the envelope or a bare request.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Envelope(JobEvent),
            Bare(JobRequest),
        }

        match serde_json::from_slice::<Wire>(payload)? {
            Wire::Envelope(event) => Ok(event),
            Wire::Bare(request) => Ok(Self { id: None, request }),
        }
    }

    /// Job ID from the envelope, or a fresh one.
    pub fn job_id(&self) -> JobId {
        self.id.clone().unwrap_or_default()
    }
}

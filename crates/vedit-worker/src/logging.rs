//! Structured logging.
//!
//! `init_tracing` installs the process-wide subscriber; `job_span` tags
//! every line logged while a job runs with the job it belongs to.

use tracing::Span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vedit_models::{JobId, JobRequest};

/// Install the global subscriber.
///
/// `LOG_FORMAT=json` selects JSON lines; anything else gets colored text.
/// `RUST_LOG` directives are applied on top of `default_directive`.
pub fn init_tracing(default_directive: &str) {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = default_directive.parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Span attached to everything logged while a job runs.
pub fn job_span(job_id: &JobId, request: &JobRequest) -> Span {
    tracing::info_span!(
        "job",
        job_id = %job_id,
        input = %request.input.file_path,
        output = %request.output.file_pattern
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use tracing::field::{Field, Visit};
    use tracing::span::{Attributes, Id};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Records the fields of every span opened under it.
    #[derive(Clone, Default)]
    struct SpanFields(Arc<Mutex<Vec<(String, String)>>>);

    impl Visit for SpanFields {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0
                .lock()
                .unwrap()
                .push((field.name().to_string(), format!("{:?}", value)));
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for SpanFields {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            attrs.record(&mut self.clone());
        }
    }

    #[test]
    fn test_job_span_carries_job_fields() {
        let fields = SpanFields::default();
        let subscriber = tracing_subscriber::registry().with(fields.clone());

        tracing::subscriber::with_default(subscriber, || {
            let span = job_span(
                &JobId::from_string("job-42"),
                &JobRequest::new("in.mp4", "thumb_%03d.jpg"),
            );
            assert_eq!(span.metadata().map(|m| m.name()), Some("job"));
        });

        let recorded = fields.0.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec![
                ("job_id".to_string(), "job-42".to_string()),
                ("input".to_string(), "in.mp4".to_string()),
                ("output".to_string(), "thumb_%03d.jpg".to_string()),
            ]
        );
    }
}

use tracing::{Span, field};

use super::TraceId;

/// Create a root span for one loading run.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id,
        session_id = field::Empty,
        stage = field::Empty
    )
}

/// Create a child span (inherits trace_id from the parent).
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!(
        "child",
        name = %name,
        session_id = field::Empty,
        stage = field::Empty
    )
}

/// Fill in the correlation fields of the current span.
pub fn annotate_span(session_id: &str, stage: Option<&str>) {
    let span = Span::current();
    span.record("session_id", field::display(session_id));
    if let Some(stage) = stage {
        span.record("stage", field::display(stage));
    }
}

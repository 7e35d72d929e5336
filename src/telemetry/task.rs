//! Task execution span helpers.

use tracing::Span;
use uuid::Uuid;

/// Start a span for one task execution.
///
/// The `task.outcome` field is declared empty and filled by
/// [`record_task_outcome`].
pub fn start_task_span(kind: &str, subject: &Uuid, worker: usize) -> Span {
    tracing::info_span!(
        "task.execute",
        "task.kind" = kind,
        "task.subject" = %subject,
        "task.worker" = worker,
        "task.outcome" = tracing::field::Empty,
    )
}

pub fn record_task_outcome(span: &Span, outcome: &str) {
    span.record("task.outcome", outcome);
}

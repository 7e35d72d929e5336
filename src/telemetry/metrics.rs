//! Metric instrument factories for koala-user.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"koala-user"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for koala-user instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("koala-user")
}

/// Counter: tasks placed on the pipeline queue.
/// Labels: `kind`.
pub fn tasks_submitted() -> Counter<u64> {
    meter()
        .u64_counter("koala.tasks.submitted")
        .with_description("Number of tasks submitted to the worker pool")
        .build()
}

/// Counter: task executions that finished.
/// Labels: `kind`, `result` ("success" | "failure").
pub fn tasks_completed() -> Counter<u64> {
    meter()
        .u64_counter("koala.tasks.completed")
        .with_description("Number of task executions by result")
        .build()
}

/// Counter: tasks taken from the recovery store and re-submitted.
/// Labels: `kind`.
pub fn recovery_resubmitted() -> Counter<u64> {
    meter()
        .u64_counter("koala.recovery.resubmitted")
        .with_description("Number of failed tasks re-submitted by the retry sweeper")
        .build()
}

/// Counter: transactional publish results.
/// Labels: `outcome` ("delivered" | "rejected" | "connection_poisoned").
pub fn publish_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("koala.publish.outcomes")
        .with_description("Number of publish attempts by outcome")
        .build()
}

/// Counter: store queries.
/// Labels: `operation`.
pub fn store_operations() -> Counter<u64> {
    meter()
        .u64_counter("koala.store.operations")
        .with_description("Number of user store operations")
        .build()
}

/// Histogram: task execution time in milliseconds.
/// Labels: `kind`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("koala.task.duration_ms")
        .with_description("Task execution duration in milliseconds")
        .with_unit("ms")
        .build()
}

//! Oracles turning remote evidence into verdicts
//!
//! Everything in here is synchronous and free of remote I/O: callers fetch
//! logs and metrics first, then hand the text or file over.

pub mod expect;
pub mod log;
pub mod metrics;

pub use expect::{validate_body, ExpectationTable, MetricExpectation};
pub use log::{search_occurrences, SearchOutcome};
pub use metrics::{
    compare_diff, compare_fields, format_metrics_table, parse_metrics, DiffReport, FieldDiff,
    MetricsSnapshot,
};

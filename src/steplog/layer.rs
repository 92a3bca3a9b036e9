//! Tracing layer feeding the step log

use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::Local;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use super::StepLog;

/// Formats every event as `YYYY-MM-DD HH:MM:SS,mmm - LEVEL - message k=v`
/// and appends it to the current step of a [`StepLog`]
pub struct StepLogLayer {
    log: Arc<StepLog>,
}

impl StepLogLayer {
    pub fn new(log: Arc<StepLog>) -> Self {
        Self { log }
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        let _ = write!(self.fields, " {name}={value}");
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

/// Render one record in the shape the HTML report parses back
pub fn format_line(level: &tracing::Level, message: &str) -> String {
    format!(
        "{} - {} - {}",
        Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
        level,
        message
    )
}

impl<S> Layer<S> for StepLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        visitor.message.push_str(&visitor.fields);

        self.log
            .append_line(format_line(event.metadata().level(), &visitor.message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Verdict;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_events_reach_current_step() {
        let log = StepLog::new();
        let subscriber = tracing_subscriber::registry().with(StepLogLayer::new(Arc::clone(&log)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("outside any test");
            log.start_test_case("L-1", "layer");
            let guard = log.begin_step("Collect metrics");
            tracing::info!(count = 3, "Established connections");
            tracing::warn!("slow response");
            guard.pass();
            log.end_test_case("L-1", Verdict::Pass);
        });

        let cases = log.snapshot();
        let lines = &cases[0].steps[0].lines;
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - INFO - Established connections count=3"));
        assert!(lines[1].ends_with(" - WARN - slow response"));
    }

    #[test]
    fn test_line_shape() {
        let line = format_line(&tracing::Level::ERROR, "boom");
        let (stamp, rest) = line.split_at(23);
        assert_eq!(rest, " - ERROR - boom");
        assert_eq!(&stamp[19..20], ",");
    }
}

//! Metrics exposition parsing and snapshot comparison

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{error, info, warn};

use super::expect::{ExpectationTable, MetricExpectation};
use crate::common::{Result, Verdict};

/// `name{labels} value`; labels are kept verbatim
static SAMPLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+)(\{.*?\})?\s+([\d.\-eE]+)$").expect("sample pattern is valid")
});

static LABEL_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w+)=["'](.*?)["']"#).expect("label pattern is valid")
});

const FIELD_WIDTH: usize = 100;
const VALUE_WIDTH: usize = 20;

/// Parsed exposition keyed by `name{labels}`; values stay textual
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    samples: BTreeMap<String, String>,
}

impl MetricsSnapshot {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.samples.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.samples.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parse an exposition document. Comments, blank and malformed lines are skipped.
pub fn parse_metrics(text: &str) -> MetricsSnapshot {
    let samples = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| SAMPLE_LINE.captures(line))
        .map(|caps| {
            let labels = caps.get(2).map_or("", |m| m.as_str());
            (format!("{}{}", &caps[1], labels), caps[3].to_string())
        })
        .collect();
    MetricsSnapshot { samples }
}

/// Outcome for one compared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: String,
    pub actual: Option<i64>,
    pub expected: Option<i64>,
    pub verdict: Verdict,
}

/// Outcome of a snapshot comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    pub verdict: Verdict,
    pub fields: Vec<FieldDiff>,
}

/// Compare two snapshots against the expectations registered for `test_id`.
///
/// A test without expectations passes with a warning.
pub fn compare_diff(
    initial: &MetricsSnapshot,
    final_: &MetricsSnapshot,
    test_id: &str,
    table: &ExpectationTable,
) -> Result<DiffReport> {
    let expectations = table.metric_expectations(test_id)?;
    if expectations.is_empty() {
        warn!("No metrics to validate for {}", test_id);
    }
    Ok(compare_fields(initial, final_, &expectations))
}

/// Check `final - initial` for every expectation; integer-truncated values
pub fn compare_fields(
    initial: &MetricsSnapshot,
    final_: &MetricsSnapshot,
    expectations: &[MetricExpectation],
) -> DiffReport {
    let fields: Vec<FieldDiff> = expectations
        .iter()
        .map(|expectation| compare_field(initial, final_, expectation))
        .collect();
    let verdict = Verdict::from_bool(fields.iter().all(|f| f.verdict.is_pass()));
    DiffReport { verdict, fields }
}

fn compare_field(
    initial: &MetricsSnapshot,
    final_: &MetricsSnapshot,
    expectation: &MetricExpectation,
) -> FieldDiff {
    let field = expectation.field.as_str();
    let expected = expected_diff(&expectation.expected_diff);
    let mut diff = FieldDiff {
        field: field.to_string(),
        actual: None,
        expected,
        verdict: Verdict::Fail,
    };

    let (Some(before), Some(after)) = (initial.get(field), final_.get(field)) else {
        error!("Metric field '{}' missing from snapshot", field);
        return diff;
    };
    let (Some(before), Some(after)) = (truncate(before), truncate(after)) else {
        error!("Could not parse values for field '{}'", field);
        return diff;
    };
    let Some(actual) = after.checked_sub(before) else {
        error!(
            "Metric diff for '{}' out of range: Initial={} Final={}",
            field, before, after
        );
        return diff;
    };
    diff.actual = Some(actual);
    info!(
        "Comparing field: {} Initial={} Final={} Diff={}",
        field, before, after, actual
    );

    let Some(expected) = expected else {
        error!("Could not parse expected diff for field '{}'", field);
        return diff;
    };
    if actual == expected {
        info!("Metric diff for '{}' matches: {}", field, actual);
        diff.verdict = Verdict::Pass;
    } else {
        error!(
            "Metric diff for '{}' does not match: actual={}, expected={}",
            field, actual, expected
        );
    }
    diff
}

/// Float first so `12.0` and `1e3` are accepted, then toward zero
fn truncate(value: &str) -> Option<i64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
}

fn expected_diff(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Render a snapshot as a two-column grid (Field, Value)
pub fn format_metrics_table(snapshot: &MetricsSnapshot) -> String {
    let rows: Vec<(Vec<String>, Vec<String>)> = snapshot
        .iter()
        .map(|(key, value)| (wrap(&display_field(key), FIELD_WIDTH), wrap(value, VALUE_WIDTH)))
        .collect();

    let field_width = column_width(rows.iter().flat_map(|r| r.0.iter()), "Field");
    let value_width = column_width(rows.iter().flat_map(|r| r.1.iter()), "Value");

    let rule = |fill: char| {
        format!(
            "+{}+{}+",
            fill.to_string().repeat(field_width + 2),
            fill.to_string().repeat(value_width + 2)
        )
    };
    let row = |field: &str, value: &str| {
        format!(
            "| {:<fw$} | {:<vw$} |",
            field,
            value,
            fw = field_width,
            vw = value_width
        )
    };

    let mut out = vec![rule('-'), row("Field", "Value"), rule('=')];
    for (fields, values) in &rows {
        for i in 0..fields.len().max(values.len()) {
            out.push(row(
                fields.get(i).map_or("", String::as_str),
                values.get(i).map_or("", String::as_str),
            ));
        }
        out.push(rule('-'));
    }
    if rows.is_empty() {
        out.push(rule('-'));
    }
    out.join("\n")
}

fn column_width<'a>(cells: impl Iterator<Item = &'a String>, header: &str) -> usize {
    cells
        .map(|c| c.chars().count())
        .max()
        .unwrap_or(0)
        .max(header.len())
}

/// `name{a="1",b="2"}` → `name [a=1, b=2]`
fn display_field(key: &str) -> String {
    let Some(open) = key.find('{') else {
        return key.to_string();
    };
    let (name, labels) = key.split_at(open);
    let pairs: Vec<String> = LABEL_PAIR
        .captures_iter(labels)
        .map(|caps| format!("{}={}", &caps[1], &caps[2]))
        .collect();
    if pairs.is_empty() {
        name.to_string()
    } else {
        format!("{} [{}]", name, pairs.join(", "))
    }
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(width).map(|c| c.iter().collect()).collect()
}

//! Nested collapsible HTML report
//!
//! Rendered once at the end of a run from a snapshot of the step log and
//! the ledger. Rendering never touches either of them beyond that read.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::common::{format_elapsed, Error, Result, Verdict};
use crate::steplog::{Step, StepLog, TestCaseRecord};
use crate::testing::{LedgerEntry, RunSummary};

/// Head, styles and the opening `<body>` used when no template is configured
pub const BUILTIN_TEMPLATE: &str = include_str!("template.html");

static LOG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(?P<time>[\d\-:, ]+) - (?P<level>[A-Z]+) - (?P<message>.*)$")
        .expect("log line pattern is valid")
});

const SCRIPT: &str = r#"
    <script>
        document.querySelectorAll(".header").forEach(header => {
            header.addEventListener("click", (e) => {
                if (e.target.classList.contains("chip")) return;
                const content = header.nextElementSibling;
                header.classList.toggle("active");
                content.style.display = content.style.display === "block" ? "none" : "block";
            });
        });

        document.querySelectorAll(".testcase-link").forEach(link => {
            link.addEventListener("click", function (e) {
                e.preventDefault();
                const tcDiv = document.getElementById(this.getAttribute("href").substring(1));
                if (!tcDiv) return;
                document.querySelectorAll(".collapsible").forEach(div => {
                    const header = div.querySelector(".header");
                    header.classList.remove("active");
                    header.nextElementSibling.style.display = "none";
                });
                const header = tcDiv.querySelector(".header");
                header.classList.add("active");
                header.nextElementSibling.style.display = "block";
                tcDiv.scrollIntoView({ behavior: "smooth", block: "start" });
            });
        });
    </script>
</body>
</html>
"#;

/// Renders the report from a point-in-time copy of the run state
#[derive(Debug)]
pub struct ReportSynthesizer<'a> {
    cases: Vec<TestCaseRecord>,
    entries: &'a [LedgerEntry],
    summary: RunSummary,
}

impl<'a> ReportSynthesizer<'a> {
    pub fn new(step_log: &StepLog, entries: &'a [LedgerEntry], summary: RunSummary) -> Self {
        Self {
            cases: step_log.snapshot(),
            entries,
            summary,
        }
    }

    /// Base document to render into: the configured template when it can be
    /// read, the built-in one otherwise
    pub fn load_template(path: Option<&Path>) -> String {
        let Some(path) = path else {
            return BUILTIN_TEMPLATE.to_string();
        };
        match std::fs::read_to_string(path) {
            Ok(template) => template,
            Err(e) => {
                warn!(
                    "HTML template {} not usable ({}), using the built-in one",
                    path.display(),
                    e
                );
                BUILTIN_TEMPLATE.to_string()
            }
        }
    }

    /// Full document: template, summary, statistics, logs and script
    pub fn render(&self, template: &str) -> String {
        let mut html = String::with_capacity(template.len() + 16 * 1024);
        html.push_str(template);
        self.write_summary(&mut html);
        self.write_statistics(&mut html);
        self.write_test_logs(&mut html);
        html.push_str(SCRIPT);
        html
    }

    /// Materialize the template and write the rendered report to `dest`
    pub fn write(&self, dest: &Path, template: Option<&Path>) -> Result<()> {
        let document = self.render(&Self::load_template(template));
        std::fs::write(dest, document).map_err(|e| {
            Error::Internal(format!("Failed to write HTML report {}: {}", dest.display(), e))
        })?;
        info!("HTML report written to {}", dest.display());
        Ok(())
    }

    fn description(&self, id: &str) -> &str {
        self.cases
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.description.as_str())
            .unwrap_or_default()
    }

    fn write_summary(&self, html: &mut String) {
        let s = &self.summary;
        let _ = write!(
            html,
            r#"
    <div class="heading"><h2>Summary Information</h2></div>
    <table class="equal-cols">
        <thead><tr><th>Total</th><th>Pass</th><th>Fail</th><th>Time Elapsed</th></tr></thead>
        <tbody>
            <tr><td>{}</td><td class="pass">{}</td><td class="fail">{}</td><td>{:.2}s</td></tr>
        </tbody>
    </table>
"#,
            s.total,
            s.passed,
            s.failed,
            s.elapsed.as_secs_f64()
        );
    }

    fn write_statistics(&self, html: &mut String) {
        html.push_str(
            r#"
    <div class="heading"><h2>Test Statistics</h2></div>
    <table>
        <thead>
            <tr>
                <th style="width:1%">Test ID</th>
                <th>Description</th>
                <th style="width:1%">Result</th>
                <th style="width:1%">Execution Time (s)</th>
            </tr>
        </thead>
        <tbody>
"#,
        );
        for entry in self.entries {
            let _ = writeln!(
                html,
                r##"            <tr><td><a href="#testcase-{}" class="testcase-link">{}</a></td><td>{}</td><td class="{}">{}</td><td>{:.2}</td></tr>"##,
                anchor(&entry.id),
                escape(&entry.id),
                escape(self.description(&entry.id)),
                entry.verdict.css_class(),
                entry.verdict,
                entry.elapsed.as_secs_f64()
            );
        }
        html.push_str("        </tbody>\n    </table>\n");
    }

    fn write_test_logs(&self, html: &mut String) {
        html.push_str(
            "\n    <div class=\"heading\"><h2>Test Logs</h2></div>\n    <div class=\"collapsible-container\">\n",
        );
        for case in &self.cases {
            let verdict = case.status.unwrap_or(Verdict::Fail);
            let _ = writeln!(
                html,
                r#"    <div class="collapsible" id="testcase-{}">
        <div class="header">
            <span class="arrow">&#9654;</span>
            <span class="title">Testcase: {} - {} <span class="chip {}">{}</span></span>
        </div>
        <div class="content">
            <p>Execution Time: {}</p>"#,
                anchor(&case.id),
                escape(&case.id),
                escape(&case.description),
                verdict.css_class(),
                verdict,
                format_elapsed(case.elapsed())
            );
            for step in &case.steps {
                write_step(html, step);
            }
            html.push_str("        </div>\n    </div>\n");
        }
        html.push_str("    </div>\n");
    }
}

fn write_step(html: &mut String, step: &Step) {
    // A step still open at render time never finished.
    let verdict = step.status.unwrap_or(Verdict::Fail);
    let _ = writeln!(
        html,
        r#"        <div class="collapsible">
            <div class="header">
                <span class="arrow">&#9654;</span>
                <span class="title">{} <span class="chip {}">{}</span></span>
            </div>
            <div class="content">
                <p>Execution Time: {}</p>
                <div class="logs">"#,
        escape(&step.title),
        verdict.css_class(),
        verdict,
        format_elapsed(step.elapsed())
    );
    for line in &step.lines {
        html.push_str(&render_log_line(line));
        html.push('\n');
    }
    html.push_str("                </div>\n            </div>\n        </div>\n");
}

/// `time - LEVEL - message` becomes three styled parts; anything else is
/// kept verbatim
pub fn render_log_line(line: &str) -> String {
    match LOG_LINE.captures(line) {
        Some(caps) => {
            let level = escape(&caps["level"]);
            format!(
                r#"<div><span class="time">{}</span><span class="level {level}">{level}</span>{}</div>"#,
                escape(&caps["time"]),
                escape(&caps["message"])
            )
        }
        None => format!("<div>{}</div>", escape(line)),
    }
}

/// Element id suffix for a test case; ASCII alphanumerics, `-` and `_` are
/// kept and every other byte is percent-encoded
fn anchor(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
    }
    out
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_log() -> std::sync::Arc<StepLog> {
        let log = StepLog::new();
        log.start_test_case("TC_1", "NE connects through <ALG>");
        let guard = log.begin_step("Start NE simulator");
        log.append_line("2026-03-09 14:05:07,120 - INFO - NE simulator started".into());
        log.append_line("raw console line & more".into());
        guard.pass();
        let guard = log.begin_step("Search ALG log");
        log.append_line("2026-03-09 14:05:17,001 - ERROR - pattern missing".into());
        guard.fail();
        log.end_test_case("TC_1", Verdict::Fail);
        log
    }

    fn entries() -> Vec<LedgerEntry> {
        vec![LedgerEntry {
            id: "TC_1".into(),
            verdict: Verdict::Fail,
            elapsed: Duration::from_millis(10_250),
        }]
    }

    fn summary() -> RunSummary {
        RunSummary {
            total: 1,
            passed: 0,
            failed: 1,
            elapsed: Duration::from_millis(11_000),
        }
    }

    #[test]
    fn test_render_log_line() {
        assert_eq!(
            render_log_line("2026-03-09 14:05:07,120 - WARN - a < b"),
            r#"<div><span class="time">2026-03-09 14:05:07,120</span><span class="level WARN">WARN</span>a &lt; b</div>"#
        );
        assert_eq!(render_log_line("no structure here"), "<div>no structure here</div>");
    }

    #[test]
    fn test_render_multiline_log_message() {
        assert_eq!(
            render_log_line("2026-03-09 14:05:09,002 - ERROR - Traceback:\n  frame <1>"),
            "<div><span class=\"time\">2026-03-09 14:05:09,002</span><span class=\"level ERROR\">ERROR</span>Traceback:\n  frame &lt;1&gt;</div>"
        );
    }

    #[test]
    fn test_anchor_ids_match_on_both_ends() {
        assert_eq!(anchor("TC_004-b"), "TC_004-b");
        assert_eq!(anchor("TC 1#a"), "TC%201%23a");
        assert_eq!(anchor("TC\"é"), "TC%22%C3%A9");

        let log = StepLog::new();
        log.start_test_case("TC 1#a", "odd id");
        log.end_test_case("TC 1#a", Verdict::Pass);
        let entries = vec![LedgerEntry {
            id: "TC 1#a".into(),
            verdict: Verdict::Pass,
            elapsed: Duration::from_millis(5),
        }];
        let html = ReportSynthesizer::new(&log, &entries, summary()).render(BUILTIN_TEMPLATE);

        assert!(html.contains(r##"<a href="#testcase-TC%201%23a" class="testcase-link">TC 1#a</a>"##));
        assert!(html.contains(r#"id="testcase-TC%201%23a""#));
        assert!(html.contains("Testcase: TC 1#a - odd id"));
    }

    #[test]
    fn test_render_sections() {
        let log = sample_log();
        let entries = entries();
        let html = ReportSynthesizer::new(&log, &entries, summary()).render(BUILTIN_TEMPLATE);

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"<td class="pass">0</td><td class="fail">1</td><td>11.00s</td>"#));
        assert!(html.contains(r##"<a href="#testcase-TC_1" class="testcase-link">TC_1</a>"##));
        assert!(html.contains("<td>NE connects through &lt;ALG&gt;</td>"));
        assert!(html.contains(r#"<td class="fail">FAIL</td><td>10.25</td>"#));
        assert!(html.contains(r#"id="testcase-TC_1""#));
        assert!(html.contains(r#"Start NE simulator <span class="chip pass">PASS</span>"#));
        assert!(html.contains(r#"Search ALG log <span class="chip fail">FAIL</span>"#));
        assert!(html.contains(r#"<span class="level INFO">INFO</span>NE simulator started"#));
        assert!(html.contains("<div>raw console line &amp; more</div>"));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[test]
    fn test_render_leaves_state_untouched() {
        let log = sample_log();
        let before = log.snapshot();
        let entries = entries();
        let _ = ReportSynthesizer::new(&log, &entries, summary()).render(BUILTIN_TEMPLATE);
        let after = log.snapshot();
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].steps.len(), after[0].steps.len());
        assert_eq!(before[0].steps[0].lines, after[0].steps[0].lines);
    }

    #[test]
    fn test_write_with_missing_and_custom_template() {
        let dir = tempfile::tempdir().unwrap();
        let log = sample_log();
        let entries = entries();
        let report = ReportSynthesizer::new(&log, &entries, summary());

        let dest = dir.path().join("Automation.html");
        report
            .write(&dest, Some(&dir.path().join("missing.html")))
            .unwrap();
        let html = std::fs::read_to_string(&dest).unwrap();
        assert!(html.contains("<h1>ALG Automation Report</h1>"));

        let custom = dir.path().join("custom.html");
        std::fs::write(&custom, "<html><body><h1>Nightly</h1>\n").unwrap();
        report.write(&dest, Some(&custom)).unwrap();
        let html = std::fs::read_to_string(&dest).unwrap();
        assert!(html.starts_with("<html><body><h1>Nightly</h1>"));
        assert!(html.contains("Summary Information"));
    }
}

//! Hierarchical step log
//!
//! Attributes every log line to the test case and step that produced it.
//! A [`StepLog`] is an owned context object: the orchestrator holds one
//! `Arc<StepLog>` and hands clones to the tracing layer and to test bodies.
//!
//! All mutation goes through a single mutex whose critical sections only
//! touch indices and vectors. Nothing in here emits tracing events while the
//! lock is held, since the [`StepLogLayer`] re-enters [`StepLog::append_line`].

mod layer;

pub use layer::StepLogLayer;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::common::Verdict;

/// One executed test case and its steps
#[derive(Debug, Clone)]
pub struct TestCaseRecord {
    pub id: String,
    pub description: String,
    pub steps: Vec<Step>,
    /// Set exactly once by [`StepLog::end_test_case`]
    pub status: Option<Verdict>,
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
}

impl TestCaseRecord {
    pub fn elapsed(&self) -> Duration {
        span(self.started_at, self.ended_at)
    }
}

/// Smallest attributable unit of test activity
#[derive(Debug, Clone)]
pub struct Step {
    pub title: String,
    /// Id of the owning test case
    pub case_id: String,
    pub status: Option<Verdict>,
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    /// Formatted log lines in emission order
    pub lines: Vec<String>,
}

impl Step {
    pub fn elapsed(&self) -> Duration {
        span(self.started_at, self.ended_at)
    }
}

fn span(start: DateTime<Local>, end: Option<DateTime<Local>>) -> Duration {
    end.and_then(|end| (end - start).to_std().ok())
        .unwrap_or_default()
}

/// (test case index, step index)
type StepSlot = (usize, usize);

#[derive(Debug, Default)]
struct Inner {
    current_case: Option<usize>,
    current_step: Option<StepSlot>,
    cases: Vec<TestCaseRecord>,
}

/// Process-wide step log shared by the orchestrator, test bodies and the
/// tracing layer
#[derive(Debug, Default)]
pub struct StepLog {
    inner: Mutex<Inner>,
}

impl StepLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the indices dangling,
        // so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `id` as the active test case with an empty step list.
    ///
    /// Running the same id twice replaces the earlier record.
    pub fn start_test_case(&self, id: &str, description: &str) {
        let record = TestCaseRecord {
            id: id.to_string(),
            description: description.to_string(),
            steps: Vec::new(),
            status: None,
            started_at: Local::now(),
            ended_at: None,
        };

        let mut inner = self.lock();
        let index = match inner.cases.iter().position(|c| c.id == id) {
            Some(index) => {
                inner.cases[index] = record;
                index
            }
            None => {
                inner.cases.push(record);
                inner.cases.len() - 1
            }
        };
        inner.current_case = Some(index);
        inner.current_step = None;
    }

    /// Close the active test case with its final verdict
    pub fn end_test_case(&self, id: &str, verdict: Verdict) {
        let mut inner = self.lock();
        if let Some(case) = inner.cases.iter_mut().find(|c| c.id == id) {
            case.status = Some(verdict);
            case.ended_at = Some(Local::now());
        }
        if inner
            .current_case
            .is_some_and(|index| inner.cases[index].id == id)
        {
            inner.current_case = None;
            inner.current_step = None;
        }
    }

    /// Open a step under the active test case and make it current.
    ///
    /// The returned guard finalizes the step when dropped: FAIL unless
    /// [`StepGuard::pass`] was called first. The previously current step
    /// becomes current again, so nested steps keep attributing lines to the
    /// enclosing one once they close. Outside a test case the guard is inert.
    pub fn begin_step(self: &Arc<Self>, title: impl Into<String>) -> StepGuard {
        let title = title.into();
        let mut inner = self.lock();
        let previous = inner.current_step;
        let current_case = inner.current_case;

        let slot = current_case.map(|case_index| {
            let case = &mut inner.cases[case_index];
            case.steps.push(Step {
                title,
                case_id: case.id.clone(),
                status: None,
                started_at: Local::now(),
                ended_at: None,
                lines: Vec::new(),
            });
            (case_index, case.steps.len() - 1)
        });
        if slot.is_some() {
            inner.current_step = slot;
        }

        StepGuard {
            log: Arc::clone(self),
            slot,
            previous,
            verdict: Verdict::Fail,
        }
    }

    /// Run `fut` inside a step scope.
    ///
    /// `Ok` marks the step PASS; an `Err` marks it FAIL and is returned
    /// unchanged. A future dropped before completion also leaves FAIL.
    pub async fn step<T, E, F>(self: &Arc<Self>, title: impl Into<String>, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let guard = self.begin_step(title);
        let result = fut.await;
        if result.is_ok() {
            guard.pass();
        }
        result
    }

    /// Synchronous counterpart of [`StepLog::step`]
    pub fn with_step<T, E>(
        self: &Arc<Self>,
        title: impl Into<String>,
        body: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let guard = self.begin_step(title);
        let result = body();
        if result.is_ok() {
            guard.pass();
        }
        result
    }

    /// Append a formatted line to the current step; dropped when no step is
    /// active.
    pub fn append_line(&self, line: String) {
        let mut inner = self.lock();
        if let Some((case, step)) = inner.current_step {
            inner.cases[case].steps[step].lines.push(line);
        }
    }

    fn close_step(&self, slot: StepSlot, verdict: Verdict, previous: Option<StepSlot>) {
        let mut inner = self.lock();
        let (case, index) = slot;
        if let Some(step) = inner
            .cases
            .get_mut(case)
            .and_then(|c| c.steps.get_mut(index))
        {
            if step.status.is_none() {
                step.status = Some(verdict);
                step.ended_at = Some(Local::now());
            }
        }
        if inner.current_step == Some(slot) {
            // The enclosing step is only restored while its test case is
            // still the active one and the step itself is still open.
            let current_case = inner.current_case;
            let restored = previous.filter(|&(c, s)| {
                current_case == Some(c)
                    && inner.cases[c].steps.get(s).is_some_and(|step| step.status.is_none())
            });
            inner.current_step = restored;
        }
    }

    /// Copy of every recorded test case, for report rendering outside the lock
    pub fn snapshot(&self) -> Vec<TestCaseRecord> {
        self.lock().cases.clone()
    }

    /// Description registered for a test case
    pub fn description(&self, id: &str) -> Option<String> {
        self.lock()
            .cases
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.description.clone())
    }

    /// Title of the step currently receiving lines
    pub fn current_step_title(&self) -> Option<String> {
        let inner = self.lock();
        inner
            .current_step
            .map(|(case, step)| inner.cases[case].steps[step].title.clone())
    }
}

/// Scope of one open step; see [`StepLog::begin_step`]
#[must_use = "the step closes as soon as the guard is dropped"]
pub struct StepGuard {
    log: Arc<StepLog>,
    slot: Option<StepSlot>,
    previous: Option<StepSlot>,
    verdict: Verdict,
}

impl StepGuard {
    /// Close the step as PASS
    pub fn pass(mut self) {
        self.verdict = Verdict::Pass;
    }

    /// Close the step as FAIL
    pub fn fail(mut self) {
        self.verdict = Verdict::Fail;
    }
}

impl Drop for StepGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.slot {
            self.log.close_step(slot, self.verdict, self.previous);
        }
    }
}

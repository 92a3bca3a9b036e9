//! Common utilities shared by the harness modules

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

use std::fmt;
use std::time::Duration;

use serde::Serialize;

pub use error::{Error, Result};

/// Terminal outcome of a step or a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn from_bool(passed: bool) -> Self {
        if passed {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    pub fn is_pass(self) -> bool {
        self == Self::Pass
    }

    /// Turn a FAIL into an assertion error carrying `message`
    pub fn into_result(self, message: impl Into<String>) -> Result<()> {
        match self {
            Self::Pass => Ok(()),
            Self::Fail => Err(Error::assertion(message)),
        }
    }

    /// Lower-case form used for CSS classes in the HTML report
    pub fn css_class(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::Fail => f.write_str("FAIL"),
        }
    }
}

/// Human-readable duration: `2m 5.3s` at or above a minute, `5.3s` below
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let minutes = (total / 60.0).floor();
    let seconds = total - minutes * 60.0;
    if minutes >= 1.0 {
        format!("{}m {:.1}s", minutes as u64, seconds)
    } else {
        format!("{:.1}s", seconds)
    }
}

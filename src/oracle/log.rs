//! Pattern-occurrence search over text artifacts

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::common::{Error, Result, Verdict};

/// What a line is matched against
#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(String),
    Regex(Regex),
}

impl Pattern {
    pub fn new(pattern: &str, use_regex: bool) -> Result<Self> {
        if use_regex {
            Ok(Self::Regex(Regex::new(pattern)?))
        } else {
            Ok(Self::Literal(pattern.to_string()))
        }
    }

    pub fn is_match(&self, line: &str) -> bool {
        match self {
            Self::Literal(needle) => line.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(line),
        }
    }
}

/// Verdict of a search plus the observed count for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOutcome {
    pub verdict: Verdict,
    pub count: usize,
}

/// Number of lines matching `pattern`; invalid UTF-8 is replaced, not an error
pub fn count_matches(reader: impl BufRead, pattern: &Pattern) -> io::Result<usize> {
    let mut count = 0;
    for line in reader.split(b'\n') {
        let line = line?;
        let line = line.strip_suffix(b"\r").unwrap_or(&line);
        if pattern.is_match(&String::from_utf8_lossy(line)) {
            count += 1;
        }
    }
    Ok(count)
}

/// Search `path` line by line.
///
/// With `expected` set the verdict is PASS only for exactly that many
/// matching lines; without it, PASS means at least one.
pub fn search_occurrences(
    path: &Path,
    pattern: &str,
    expected: Option<usize>,
    use_regex: bool,
) -> Result<SearchOutcome> {
    let matcher = Pattern::new(pattern, use_regex)?;
    let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
    let count = count_matches(BufReader::new(file), &matcher)?;
    let file = path.display();

    debug!("{} - found {} times in - {}", pattern, count, file);

    let verdict = match expected {
        Some(expected) if count == expected => {
            info!("Success - [{pattern}] - {count} times in {file} (expected {expected})");
            Verdict::Pass
        }
        Some(expected) => {
            warn!("Failed - [{pattern}] - {count} times in {file} (expected {expected})");
            Verdict::Fail
        }
        None if count > 0 => {
            info!("Success - [{pattern}] available in {file}");
            Verdict::Pass
        }
        None => {
            info!("Failed - [{pattern}] not available in {file}");
            Verdict::Fail
        }
    };

    Ok(SearchOutcome { verdict, count })
}

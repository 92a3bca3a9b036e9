//! Addressing into nested config trees with paths like `whitelisted_ips[0].ports`

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::common::{Error, Result};

/// One accessor of a tree path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Parsed `a.b[2].c`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePath {
    segments: Vec<Segment>,
}

impl TreePath {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for TreePath {
    type Err = Error;

    fn from_str(path: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidTreePath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        for part in path.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(open) => part.split_at(open),
                None => (part, ""),
            };
            if key.is_empty() && rest.is_empty() {
                return Err(invalid("empty segment"));
            }
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }
            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(|| invalid("unclosed '['"))?;
                let index = rest[1..close]
                    .parse::<usize>()
                    .map_err(|_| invalid("index must be a non-negative integer"))?;
                segments.push(Segment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(invalid("unexpected text after ']'"));
                }
            }
        }
        Ok(Self { segments })
    }
}

fn container_for(next: &Segment) -> Value {
    match next {
        Segment::Key(_) => Value::Object(Map::new()),
        Segment::Index(_) => Value::Array(Vec::new()),
    }
}

/// Set `value` at `path`, creating missing maps and sequences on the way.
///
/// Sequences are padded with empty containers on the way down and with
/// nulls at the final index. A scalar in the way is replaced.
pub fn set_path(root: &mut Value, path: &TreePath, value: Value) -> Result<()> {
    let Some((last, parents)) = path.segments.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut node = root;
    for (i, segment) in parents.iter().enumerate() {
        let next = parents.get(i + 1).unwrap_or(last);
        node = match segment {
            Segment::Key(key) => {
                if !node.is_object() {
                    *node = Value::Object(Map::new());
                }
                let map = node.as_object_mut().ok_or_else(|| unreachable_shape(path))?;
                let child = map.entry(key.clone()).or_insert_with(|| container_for(next));
                if !(child.is_object() || child.is_array()) {
                    *child = container_for(next);
                }
                child
            }
            Segment::Index(index) => {
                if !node.is_array() {
                    *node = Value::Array(Vec::new());
                }
                let items = node.as_array_mut().ok_or_else(|| unreachable_shape(path))?;
                while items.len() <= *index {
                    items.push(container_for(next));
                }
                &mut items[*index]
            }
        };
    }

    match last {
        Segment::Key(key) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let map = node.as_object_mut().ok_or_else(|| unreachable_shape(path))?;
            map.insert(key.clone(), value);
        }
        Segment::Index(index) => {
            if !node.is_array() {
                *node = Value::Array(Vec::new());
            }
            let items = node.as_array_mut().ok_or_else(|| unreachable_shape(path))?;
            while items.len() <= *index {
                items.push(Value::Null);
            }
            items[*index] = value;
        }
    }
    Ok(())
}

fn unreachable_shape(path: &TreePath) -> Error {
    Error::Internal(format!("container expected while setting '{path}'"))
}

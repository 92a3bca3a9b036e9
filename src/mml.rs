//! MML command frames
//!
//! A frame is a fixed 24-byte header followed by the ASCII command body
//! `/*comment*/OP OBJ:k=v,k=v;`. Frames are exchanged as lowercase hex.

use std::fmt::Write as _;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::common::{Error, Result};

const HEADER_LEN: usize = 24;
/// The size field counts the body plus the header minus tag and size fields
const SIZE_OVERHEAD: usize = HEADER_LEN - 4;

/// Start tag of every frame
const START_TAG: u16 = 0xf634;
/// Service tag for MML
const SERVICE_MML: u8 = 0x01;
const VERSION_V2: u8 = 0x02;
/// Frame tag for a single, unfragmented frame
const SINGLE_FRAME: u8 = 0x03;

/// One MML command as written in test data
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MmlCommand {
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub operation_object: String,
    /// Parameters in declaration order
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl MmlCommand {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Command text without the frame header
    pub fn body(&self) -> String {
        let comment = self.comment.trim();
        let operation = self.operation.trim();
        let object = self.operation_object.trim();

        let mut body = String::new();
        if !comment.is_empty() {
            let _ = write!(body, "/*{comment}*/");
        }
        body.push_str(operation);
        if !object.is_empty() {
            let _ = write!(body, " {object}");
        }
        body.push(':');
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|(key, value)| format!("{key}={}", parameter_text(value)))
            .collect();
        body.push_str(&params.join(","));
        body.push(';');
        body
    }

    /// Full frame as raw bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = self.body();
        if !body.is_ascii() {
            return Err(Error::Config(format!("MML command must be ASCII: {body}")));
        }
        let size = u16::try_from(body.len() + SIZE_OVERHEAD)
            .map_err(|_| Error::Config(format!("MML command too long ({} bytes)", body.len())))?;

        let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
        frame.extend_from_slice(&START_TAG.to_be_bytes());
        frame.extend_from_slice(&size.to_be_bytes());
        frame.push(SERVICE_MML);
        frame.extend_from_slice(&[0, 0]); // session handle
        frame.push(VERSION_V2);
        frame.extend_from_slice(&[0, 0, 0, 0]); // uiid
        frame.push(SINGLE_FRAME);
        frame.push(0); // product id
        frame.extend_from_slice(&[0, 0]); // reserved
        frame.extend_from_slice(&[0, 0]); // frame number
        frame.extend_from_slice(&[0, 0, 0, 0]); // reserved
        frame.extend_from_slice(&[0, 0]); // extended length
        frame.extend_from_slice(body.as_bytes());
        Ok(frame)
    }

    /// Full frame as lowercase hex
    pub fn to_hex(&self) -> Result<String> {
        let frame = self.encode()?;
        let mut hex = String::with_capacity(frame.len() * 2);
        for byte in frame {
            let _ = write!(hex, "{byte:02x}");
        }
        Ok(hex)
    }
}

/// Strings are written bare, everything else in its JSON form
fn parameter_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

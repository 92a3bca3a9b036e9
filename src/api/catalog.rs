//! Declarative REST call table

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::common::{Error, Result};

/// One REST call as declared in the API file
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ApiSpec {
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub api_path: String,

    /// Request body, sent as JSON when present and non-empty
    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())])
}

impl ApiSpec {
    /// Serialized request body; empty values send no body
    pub fn body(&self) -> Option<String> {
        let data = self.data.as_ref()?;
        let empty = match data {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::String(text) => text.is_empty(),
            _ => false,
        };
        (!empty).then(|| data.to_string())
    }
}

/// API definitions keyed by API identifier
#[derive(Debug, Clone, Default)]
pub struct ApiCatalog {
    source: String,
    entries: HashMap<String, ApiSpec>,
}

impl ApiCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::parse(&content, &path.display().to_string())
    }

    /// `source` names the table in errors
    pub fn parse(content: &str, source: &str) -> Result<Self> {
        Ok(Self {
            source: source.to_string(),
            entries: serde_json::from_str(content)?,
        })
    }

    pub fn get(&self, key: &str) -> Result<&ApiSpec> {
        self.entries.get(key).ok_or_else(|| Error::UnknownApi {
            key: key.to_string(),
            file: self.source.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_and_lookup() {
        let catalog = ApiCatalog::parse(
            r#"{
                "get_metrics": {"method": "GET", "api_path": "/metrics"},
                "add_rule": {"api_path": "/v1/rules", "data": {"ip": "10.0.0.6"},
                             "headers": {"X-Trace": "1"}}
            }"#,
            "api.json",
        )
        .unwrap();

        let metrics = catalog.get("get_metrics").unwrap();
        assert_eq!(metrics.method, "GET");
        assert_eq!(metrics.headers["Content-Type"], "application/json");
        assert_eq!(metrics.body(), None);

        let rule = catalog.get("add_rule").unwrap();
        assert_eq!(rule.method, "POST");
        assert_eq!(rule.headers.len(), 1);
        assert_eq!(rule.body().as_deref(), Some(r#"{"ip":"10.0.0.6"}"#));

        let err = catalog.get("delete_rule").unwrap_err();
        assert_eq!(err.to_string(), "API key 'delete_rule' not found in api.json");
    }

    #[test]
    fn test_empty_data_sends_no_body() {
        let mut spec = ApiSpec {
            method: "POST".into(),
            api_path: "/x".into(),
            data: Some(json!({})),
            headers: default_headers(),
        };
        assert_eq!(spec.body(), None);
        spec.data = Some(json!([1]));
        assert_eq!(spec.body().as_deref(), Some("[1]"));
    }
}

//! Simulator config files: path-addressed updates and per-address-family profiles

mod path;

pub use path::{set_path, Segment, TreePath};

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::info;

use crate::common::config::Config;
use crate::common::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

fn format_of(path: &Path) -> Result<Format> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("yaml") | Some("yml") => Ok(Format::Yaml),
        Some("json") => Ok(Format::Json),
        _ => Err(Error::Config(format!(
            "Unsupported config file type '{}'. Use .yaml, .yml, or .json",
            path.display()
        ))),
    }
}

/// Load `src`, apply `updates` (tree path → value) and write to `dest`,
/// or back to `src` when no destination is given
pub fn update_config_file(src: &Path, dest: Option<&Path>, updates: &Map<String, Value>) -> Result<()> {
    let format = format_of(src)?;
    let content = std::fs::read_to_string(src).map_err(|e| Error::file_read(src, e))?;
    let mut tree: Value = match format {
        Format::Yaml => serde_yaml::from_str(&content)?,
        Format::Json => serde_json::from_str(&content)?,
    };
    if tree.is_null() {
        tree = Value::Object(Map::new());
    }

    for (path, value) in updates {
        set_path(&mut tree, &path.parse()?, value.clone())?;
    }

    let rendered = match format {
        Format::Yaml => serde_yaml::to_string(&tree)?,
        Format::Json => serde_json::to_string_pretty(&tree)?,
    };
    let dest = dest.unwrap_or(src);
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, rendered)?;
    Ok(())
}

/// Address family of a generated profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    fn label(self) -> &'static str {
        match self {
            Self::V4 => "ipv4",
            Self::V6 => "ipv6",
        }
    }
}

/// Path updates for the NE (server side of the simulated traffic)
fn ne_updates(config: &Config, family: IpFamily) -> Map<String, Value> {
    let ne = &config.ne;
    let mut updates = Map::new();
    updates.insert("certificate_paths.server_crt_path".into(), json!(ne.cert));
    updates.insert("certificate_paths.server_key_path".into(), json!(ne.key));
    updates.insert("certificate_paths.rootca_crt_path".into(), json!(ne.ca));
    if let Some(upload) = &ne.ftp_upload_file {
        updates.insert("ftp_config.upload_from_path".into(), json!(upload));
    }
    whitelist(config, family, &mut updates);
    updates
}

/// Path updates for the NEM (client side, verifies the gateway certificate)
fn nem_updates(config: &Config, family: IpFamily) -> Map<String, Value> {
    let nem = &config.nem;
    let server_name = nem
        .tls_server_name
        .clone()
        .unwrap_or_else(|| config.alg.domain_name.clone());
    let mut updates = Map::new();
    updates.insert("certificate_paths.client_crt_path".into(), json!(nem.cert));
    updates.insert("certificate_paths.client_key_path".into(), json!(nem.key));
    updates.insert("certificate_paths.rootca_crt_path".into(), json!(nem.ca));
    updates.insert("tls_config.tls_server_name".into(), json!(server_name));
    whitelist(config, family, &mut updates);
    updates
}

/// Both simulators whitelist the NE address and ports
fn whitelist(config: &Config, family: IpFamily, updates: &mut Map<String, Value>) {
    let ip = match family {
        IpFamily::V4 => &config.ne.ipv4_address,
        IpFamily::V6 => &config.ne.ipv6_address,
    };
    updates.insert("whitelisted_ips[0].ip".into(), json!(ip));
    updates.insert("whitelisted_ips[0].ports".into(), json!(config.ne.ports));
}

/// Write `NE_<family>_config.yaml` and `NEM_<family>_config.yaml` for both
/// families from `NE_config.yaml` / `NEM_config.yaml` in `template_dir`
pub fn generate_profiles(config: &Config, template_dir: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;
    let ne_template = template_dir.join("NE_config.yaml");
    let nem_template = template_dir.join("NEM_config.yaml");

    let mut written = Vec::new();
    for family in [IpFamily::V4, IpFamily::V6] {
        let ne_out = out_dir.join(format!("NE_{}_config.yaml", family.label()));
        update_config_file(&ne_template, Some(&ne_out), &ne_updates(config, family))?;
        written.push(ne_out);

        let nem_out = out_dir.join(format!("NEM_{}_config.yaml", family.label()));
        update_config_file(&nem_template, Some(&nem_out), &nem_updates(config, family))?;
        written.push(nem_out);
    }

    info!("Generated {} simulator configs in {}", written.len(), out_dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NE_TEMPLATE: &str = "\
certificate_paths:
  server_crt_path: /old/ne.crt
  server_key_path: /old/ne.key
  rootca_crt_path: /old/ca.crt
ftp_config:
  upload_from_path: /old/upload.bin
whitelisted_ips:
  - ip: 0.0.0.0
    ports: [1]
log_level: info
";

    const NEM_TEMPLATE: &str = "\
certificate_paths:
  client_crt_path: /old/nem.crt
tls_config:
  tls_server_name: old.example
";

    fn sample_config() -> Config {
        Config::parse(
            r#"
[alg]
domain_name = "alg.example.net"

[ne]
cert = "/certs/ne.crt"
key = "/certs/ne.key"
ca = "/certs/ca.crt"
ipv4_address = "10.0.0.6"
ipv6_address = "fd00::6"
ports = [3000, 3001]
ftp_upload_file = "/data/upload.bin"

[nem]
cert = "/certs/nem.crt"
key = "/certs/nem.key"
ca = "/certs/ca.crt"
"#,
        )
        .unwrap()
    }

    fn read_yaml(path: &Path) -> Value {
        serde_yaml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_update_yaml_to_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("NE_config.yaml");
        std::fs::write(&src, NE_TEMPLATE).unwrap();
        let dest = dir.path().join("out/NE_custom.yaml");

        let mut updates = Map::new();
        updates.insert("whitelisted_ips[0].ip".into(), json!("10.1.1.1"));
        updates.insert("log_level".into(), json!("debug"));
        update_config_file(&src, Some(&dest), &updates).unwrap();

        let tree = read_yaml(&dest);
        assert_eq!(tree["whitelisted_ips"][0]["ip"], json!("10.1.1.1"));
        assert_eq!(tree["whitelisted_ips"][0]["ports"], json!([1]));
        assert_eq!(tree["log_level"], json!("debug"));
        // source untouched
        assert_eq!(std::fs::read_to_string(&src).unwrap(), NE_TEMPLATE);
    }

    #[test]
    fn test_update_json_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("alg.json");
        std::fs::write(&src, r#"{"rules": []}"#).unwrap();

        let mut updates = Map::new();
        updates.insert("rules[0].action".into(), json!("allow"));
        update_config_file(&src, None, &updates).unwrap();

        let tree: Value = serde_json::from_str(&std::fs::read_to_string(&src).unwrap()).unwrap();
        assert_eq!(tree, json!({"rules": [{"action": "allow"}]}));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("config.ini");
        std::fs::write(&src, "a=1").unwrap();
        assert!(matches!(
            update_config_file(&src, None, &Map::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_generate_profiles() {
        let templates = tempfile::tempdir().unwrap();
        std::fs::write(templates.path().join("NE_config.yaml"), NE_TEMPLATE).unwrap();
        std::fs::write(templates.path().join("NEM_config.yaml"), NEM_TEMPLATE).unwrap();
        let out = templates.path().join("generated");

        let written = generate_profiles(&sample_config(), templates.path(), &out).unwrap();
        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            [
                "NE_ipv4_config.yaml",
                "NEM_ipv4_config.yaml",
                "NE_ipv6_config.yaml",
                "NEM_ipv6_config.yaml"
            ]
        );

        let ne_v6 = read_yaml(&out.join("NE_ipv6_config.yaml"));
        assert_eq!(ne_v6["whitelisted_ips"][0]["ip"], json!("fd00::6"));
        assert_eq!(ne_v6["whitelisted_ips"][0]["ports"], json!([3000, 3001]));
        assert_eq!(ne_v6["ftp_config"]["upload_from_path"], json!("/data/upload.bin"));
        assert_eq!(ne_v6["certificate_paths"]["server_crt_path"], json!("/certs/ne.crt"));

        let nem_v4 = read_yaml(&out.join("NEM_ipv4_config.yaml"));
        assert_eq!(nem_v4["tls_config"]["tls_server_name"], json!("alg.example.net"));
        assert_eq!(nem_v4["whitelisted_ips"][0]["ip"], json!("10.0.0.6"));
        assert_eq!(nem_v4["certificate_paths"]["client_key_path"], json!("/certs/nem.key"));
    }
}

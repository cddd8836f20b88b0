use std::collections::HashMap;
use std::path::Path;

use serde_yaml::Value as Yaml;

use super::value::ConfigValue;
use super::{normalize_key, ConfigError};

type Values = HashMap<String, ConfigValue>;

/// Merge the YAML file at `path` into `values`. A missing file is skipped.
pub(crate) fn load_yaml_file(path: &Path, values: &mut Values) -> Result<(), ConfigError> {
    if !path.is_file() {
        return Ok(());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    merge(&content, values).map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))
}

pub(crate) fn load_yaml_str(content: &str, values: &mut Values) -> Result<(), ConfigError> {
    merge(content, values).map_err(|e| ConfigError::Load(e.to_string()))
}

fn merge(content: &str, values: &mut Values) -> Result<(), serde_yaml::Error> {
    let doc: Yaml = serde_yaml::from_str(content)?;
    walk(None, &doc, values);
    Ok(())
}

/// Store every leaf of `node` under its dot path. Sequences are kept whole.
fn walk(path: Option<&str>, node: &Yaml, out: &mut Values) {
    match (node, path) {
        (Yaml::Mapping(map), _) => {
            for (segment, child) in map.iter().filter_map(|(k, v)| Some((key_segment(k)?, v))) {
                let child_path = match path {
                    Some(parent) => format!("{parent}.{segment}"),
                    None => segment,
                };
                walk(Some(&child_path), child, out);
            }
        }
        (Yaml::Tagged(tagged), _) => walk(path, &tagged.value, out),
        (_, None) => {}
        (Yaml::Sequence(items), Some(path)) => {
            let list = items.iter().map(ConfigValue::from_yaml).collect();
            out.insert(normalize_key(path), ConfigValue::List(list));
        }
        (leaf, Some(path)) => {
            out.insert(normalize_key(path), ConfigValue::from_yaml(leaf));
        }
    }
}

fn key_segment(key: &Yaml) -> Option<String> {
    match key {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

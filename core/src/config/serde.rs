use crate::config::ConfigError;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Reads a YAML document, returning `None` when the file does not exist.
/// An empty file reads as an empty mapping.
pub fn read_document(path: &Path) -> Result<Option<Mapping>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if content.trim().is_empty() {
        return Ok(Some(Mapping::new()));
    }

    match serde_yaml::from_str::<Value>(&content) {
        Ok(Value::Mapping(mapping)) => Ok(Some(mapping)),
        Ok(Value::Null) => Ok(Some(Mapping::new())),
        Ok(_) => Err(ConfigError::NotAMapping(path.to_path_buf())),
        Err(source) => Err(ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Reads the named mapping stored under `key` in a catalog file.
pub fn read_category<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<BTreeMap<String, T>, ConfigError> {
    let Some(mut document) = read_document(path)? else {
        return Ok(BTreeMap::new());
    };

    match document.remove(key) {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(value) => serde_yaml::from_value(value).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Deserializes one field of an already-read document.
pub fn take_field<T: DeserializeOwned>(
    document: &mut Mapping,
    key: &str,
    path: &Path,
) -> Result<Option<T>, ConfigError> {
    match document.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_yaml::from_value(value)
            .map(Some)
            .map_err(|source| ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_document_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(read_document(&dir.path().join("absent.yaml")).unwrap().is_none());
    }

    #[test]
    fn test_read_document_rejects_scalars() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scalar.yaml");
        fs::write(&path, "just a string").unwrap();
        assert!(matches!(
            read_document(&path),
            Err(ConfigError::NotAMapping(_))
        ));
    }

    #[test]
    fn test_read_document_reports_syntax_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "key: [unterminated").unwrap();
        assert!(matches!(
            read_document(&path),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn test_take_field_removes_key() {
        let dir = TempDir::new().unwrap();
        let mut document: Mapping = serde_yaml::from_str("replicas: 3\nother: x").unwrap();
        let replicas: Option<u32> = take_field(&mut document, "replicas", dir.path()).unwrap();
        assert_eq!(replicas, Some(3));
        assert!(!document.contains_key("replicas"));
        assert!(document.contains_key("other"));
    }
}

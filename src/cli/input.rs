//! Loading connector definitions from files, folders or inline JSON.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::connect::types::CreateConnectorRequest;
use crate::error::AppError;

/// `$VAR` or `${VAR}`.
static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(\w+)\}|\$(\w+)").expect("env reference pattern is valid")
});

/// Names never substituted, so class names like `TimestampConverter$Value` survive.
const RESERVED_NAMES: [&str; 2] = ["Key", "Value"];

/// Where connector definitions come from.
#[derive(Debug, Clone)]
pub enum DefinitionSource {
    /// A definition file, or a folder of definition files.
    Path(PathBuf),
    /// One definition as a JSON string.
    Inline(String),
}

impl DefinitionSource {
    pub fn from_flags(path: Option<PathBuf>, string: Option<String>) -> Result<Self, AppError> {
        match (path, string) {
            (Some(path), None) => Ok(Self::Path(path)),
            (None, Some(string)) => Ok(Self::Inline(string)),
            (Some(_), Some(_)) => Err(AppError::Validation(
                "only one of --path and --string may be given".into(),
            )),
            (None, None) => Err(AppError::Validation(
                "neither --path nor --string was supplied".into(),
            )),
        }
    }
}

pub fn load_definitions(
    source: &DefinitionSource,
    expand_env: bool,
) -> Result<Vec<CreateConnectorRequest>, AppError> {
    match source {
        DefinitionSource::Inline(raw) => Ok(vec![parse_definition(raw, expand_env)?]),
        DefinitionSource::Path(path) if path.is_dir() => load_folder(path, expand_env),
        DefinitionSource::Path(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                AppError::Validation(format!("cannot read {}: {}", path.display(), e))
            })?;
            Ok(vec![parse_definition(&raw, expand_env)?])
        }
    }
}

/// Every regular file of `dir`, sorted by name. Unparsable files are skipped.
fn load_folder(dir: &Path, expand_env: bool) -> Result<Vec<CreateConnectorRequest>, AppError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            if path.is_dir() {
                tracing::warn!(path = %path.display(), "Skipping sub-folder");
                false
            } else {
                true
            }
        })
        .collect();
    files.sort();

    let mut definitions = Vec::with_capacity(files.len());
    for file in files {
        let raw = match std::fs::read_to_string(&file) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "Skipping unreadable file");
                continue;
            }
        };
        match parse_definition(&raw, expand_env) {
            Ok(definition) => definitions.push(definition),
            Err(AppError::Serde(e)) => {
                tracing::warn!(path = %file.display(), error = %e, "Skipping file that is not a connector definition");
            }
            Err(e) => return Err(e),
        }
    }

    tracing::debug!(folder = %dir.display(), count = definitions.len(), "Connector definitions loaded");
    Ok(definitions)
}

fn parse_definition(raw: &str, expand: bool) -> Result<CreateConnectorRequest, AppError> {
    let definition: CreateConnectorRequest = if expand {
        serde_json::from_str(&expand_env(raw))?
    } else {
        serde_json::from_str(raw)?
    };
    if definition.name.trim().is_empty() {
        return Err(AppError::Validation(
            "connector definition has an empty name".into(),
        ));
    }
    Ok(definition)
}

/// Substitute environment variables into `raw`.
pub fn expand_env(raw: &str) -> String {
    expand_with(raw, |name| std::env::var(name).ok())
}

/// Substitute `$VAR` / `${VAR}` using `lookup`. Unknown and reserved names
/// are left as `$NAME`.
pub fn expand_with<F>(raw: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = ENV_REFERENCE.replace_all(raw, |caps: &Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if RESERVED_NAMES.contains(&name) {
            return format!("${}", name);
        }
        lookup(name).unwrap_or_else(|| format!("${}", name))
    });
    expanded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "TOPIC" => Some("orders".into()),
            "Value" => Some("should-not-be-used".into()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_both_forms() {
        let out = expand_with(r#"{"topics": "$TOPIC", "dlq": "${TOPIC}-dlq"}"#, lookup);
        assert_eq!(out, r#"{"topics": "orders", "dlq": "orders-dlq"}"#);
    }

    #[test]
    fn test_expand_keeps_reserved_and_unknown() {
        let out = expand_with(
            "org.apache.kafka.connect.transforms.TimestampConverter$Value $MISSING ${ALSO_MISSING}",
            lookup,
        );
        assert_eq!(
            out,
            "org.apache.kafka.connect.transforms.TimestampConverter$Value $MISSING $ALSO_MISSING"
        );
    }

    #[test]
    fn test_load_inline() {
        let source = DefinitionSource::Inline(r#"{"name": "sink-a", "config": {"tasks.max": "1"}}"#.into());
        let defs = load_definitions(&source, false).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "sink-a");
        assert_eq!(defs[0].config["tasks.max"], "1");
    }

    #[test]
    fn test_load_rejects_empty_name() {
        let source = DefinitionSource::Inline(r#"{"name": "", "config": {}}"#.into());
        assert!(matches!(
            load_definitions(&source, false),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_load_single_file_parse_error_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();

        let result = load_definitions(&DefinitionSource::Path(path), false);
        assert!(matches!(result, Err(AppError::Serde(_))));
    }

    #[test]
    fn test_load_missing_path() {
        let result = load_definitions(
            &DefinitionSource::Path(PathBuf::from("/definitely/not/here.json")),
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_folder_sorted_and_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.json"), r#"{"name": "b", "config": {}}"#).unwrap();
        fs::write(dir.path().join("a.json"), r#"{"name": "a", "config": {}}"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "not a connector").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(
            dir.path().join("nested").join("c.json"),
            r#"{"name": "c", "config": {}}"#,
        )
        .unwrap();

        let defs = load_definitions(&DefinitionSource::Path(dir.path().to_path_buf()), false).unwrap();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_source_from_flags() {
        assert!(DefinitionSource::from_flags(None, None).is_err());
        assert!(DefinitionSource::from_flags(Some("a".into()), Some("{}".into())).is_err());
        assert!(matches!(
            DefinitionSource::from_flags(None, Some("{}".into())),
            Ok(DefinitionSource::Inline(_))
        ));
    }
}

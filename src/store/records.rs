use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::Glob;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::{Document, Metadata};

pub const DEFAULT_PATTERN: &str = "*.{json,csv}";

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}: expected a JSON array of objects")]
    NotArray(PathBuf),

    #[error("invalid CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid glob pattern: {0}")]
    InvalidPattern(#[from] globset::Error),
}

/// Reads every file in `data_dir` whose name matches `pattern`, in name order,
/// and turns each record into one document.
pub fn load_documents(data_dir: &Path, pattern: &str) -> Result<Vec<Document>, RecordError> {
    let matcher = Glob::new(pattern)?.compile_matcher();

    let entries = fs::read_dir(data_dir).map_err(|source| RecordError::Io {
        path: data_dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.file_name().is_some_and(|name| matcher.is_match(name)))
        .collect();
    files.sort();

    let mut documents = Vec::new();
    for path in files {
        let loaded = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => json_documents(&path)?,
            Some("csv") => csv_documents(&path)?,
            _ => {
                warn!(path = %path.display(), "skipping file with unsupported extension");
                continue;
            }
        };
        info!(path = %path.display(), records = loaded.len(), "loaded records");
        documents.extend(loaded);
    }
    Ok(documents)
}

/// Parses a JSON file holding an array of flat objects.
pub fn read_json_entries(path: &Path) -> Result<Vec<Map<String, Value>>, RecordError> {
    let bytes = fs::read(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|source| RecordError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let Value::Array(items) = value else {
        return Err(RecordError::NotArray(path.to_path_buf()));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            _ => Err(RecordError::NotArray(path.to_path_buf())),
        })
        .collect()
}

fn json_documents(path: &Path) -> Result<Vec<Document>, RecordError> {
    let source = file_label(path);
    Ok(read_json_entries(path)?
        .iter()
        .map(|entry| json_entry_document(entry, &source))
        .collect())
}

/// One `"Key: value"` line per non-empty string field, in file order.
pub fn json_entry_document(entry: &Map<String, Value>, source: &str) -> Document {
    let content = entry
        .iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) if !s.is_empty() => Some(format!("{key}: {s}")),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    let field = |key: &str| entry.get(key).and_then(Value::as_str);
    Document {
        content,
        metadata: Metadata {
            name: field("Name").unwrap_or("Unknown").to_string(),
            kind: field("Type").unwrap_or_default().to_string(),
            source: source.to_string(),
        },
    }
}

fn csv_documents(path: &Path) -> Result<Vec<Document>, RecordError> {
    let csv_err = |source| RecordError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();
    let column = |wanted: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(wanted))
    };
    let name_col = column("name");
    let type_col = column("type");
    let source = file_label(path);

    let mut documents = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let content = record
            .iter()
            .filter(|cell| !cell.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if content.is_empty() {
            continue;
        }
        let cell = |col: Option<usize>| {
            col.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        documents.push(Document {
            content,
            metadata: Metadata {
                name: cell(name_col).unwrap_or("Unknown").to_string(),
                kind: cell(type_col).unwrap_or_default().to_string(),
                source: source.clone(),
            },
        });
    }
    Ok(documents)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

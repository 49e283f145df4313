//! Offline dataset tooling: evaluation query sets and bilingual CSV export.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::store::records::{RecordError, read_json_entries};
use crate::text::normalize_whitespace;
use crate::translate::{Translator, translate_or_original};

pub const DEFAULT_TOTAL: usize = 100;

pub const DEFAULT_COLUMNS: [&str; 6] = [
    "generic name",
    "indication description",
    "dosage description",
    "side effects description",
    "precautions description",
    "pregnancy and lactation description",
];

/// Concurrent translation requests per column.
const TRANSLATE_CONCURRENCY: usize = 4;

const ENGLISH_PATTERNS: [&str; 5] = [
    "What is {name}?",
    "Tell me about {name}",
    "What are the uses of {name}?",
    "Explain {name}",
    "Give me information about {name}",
];

const BANGLA_PATTERNS: [&str; 5] = [
    "{name} কী?",
    "{name} সম্পর্কে বলুন",
    "{name} এর ব্যবহার কী?",
    "{name} ব্যাখ্যা করুন",
    "{name} এর তথ্য দিন",
];

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error(transparent)]
    Records(#[from] RecordError),

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("column '{0}' not found in CSV header")]
    MissingColumn(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestQuery {
    pub query: String,
    pub reference: String,
}

fn field<'a>(entry: &'a Map<String, Value>, key: &str) -> &'a str {
    entry.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Ten questions (five per language) for every generic entry that has a
/// name and a reference answer. Order follows the input.
pub fn build_test_queries(entries: &[Map<String, Value>]) -> Vec<TestQuery> {
    let mut queries = Vec::new();
    for entry in entries {
        if !field(entry, "Type").eq_ignore_ascii_case("generic") {
            continue;
        }
        let name = field(entry, "Name").trim();
        let reference = match field(entry, "Indication Description") {
            "" => field(entry, "Description"),
            indication => indication,
        };
        if name.is_empty() || reference.is_empty() {
            continue;
        }

        for pattern in ENGLISH_PATTERNS.iter().chain(BANGLA_PATTERNS.iter()) {
            queries.push(TestQuery {
                query: pattern.replace("{name}", name),
                reference: reference.to_string(),
            });
        }
    }
    queries
}

/// Writes a shuffled sample of at most `total` test queries as pretty JSON.
/// Returns the number written.
pub fn generate_test_queries(
    input: &Path,
    output: &Path,
    total: usize,
) -> Result<usize, DatasetError> {
    let entries = read_json_entries(input)?;
    let mut queries = build_test_queries(&entries);
    fastrand::shuffle(&mut queries);
    queries.truncate(total);

    let json = serde_json::to_string_pretty(&queries)?;
    fs::write(output, json).map_err(|source| DatasetError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    info!(count = queries.len(), path = %output.display(), "test queries written");
    Ok(queries.len())
}

/// Copies `input` to `output`, appending a `"<column> (bn)"` column with the
/// Bangla translation of each listed column. Translation is best effort:
/// failed cells keep the English text.
pub async fn translate_dataset(
    translator: &impl Translator,
    input: &Path,
    output: &Path,
    columns: &[String],
) -> Result<usize, DatasetError> {
    let csv_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| DatasetError::Csv { path, source }
    };

    let mut reader = csv::Reader::from_path(input).map_err(csv_err(input))?;
    let headers = reader.headers().map_err(csv_err(input))?.clone();
    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_err(input))?;

    let indices = columns
        .iter()
        .map(|col| {
            headers
                .iter()
                .position(|h| h == col)
                .ok_or_else(|| DatasetError::MissingColumn(col.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut translated: Vec<Vec<String>> = Vec::with_capacity(columns.len());
    for (col, &idx) in columns.iter().zip(&indices) {
        info!(column = %col, rows = records.len(), "translating column");
        let cells: Vec<String> = stream::iter(&records)
            .map(|record| async move {
                let text = normalize_whitespace(record.get(idx).unwrap_or(""));
                translate_or_original(translator, &text, "en", "bn").await
            })
            .buffered(TRANSLATE_CONCURRENCY)
            .collect()
            .await;
        translated.push(cells);
    }

    let mut writer = csv::Writer::from_path(output).map_err(csv_err(output))?;
    let mut header_row: Vec<String> = headers.iter().map(String::from).collect();
    header_row.extend(columns.iter().map(|c| format!("{c} (bn)")));
    writer.write_record(&header_row).map_err(csv_err(output))?;

    for (row, record) in records.iter().enumerate() {
        let mut fields: Vec<&str> = record.iter().collect();
        fields.extend(translated.iter().map(|cells| cells[row].as_str()));
        writer.write_record(&fields).map_err(csv_err(output))?;
    }
    writer.flush().map_err(|source| DatasetError::Io {
        path: output.to_path_buf(),
        source,
    })?;

    info!(rows = records.len(), path = %output.display(), "bilingual CSV written");
    Ok(records.len())
}

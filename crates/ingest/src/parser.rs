use englishy_common::{EnglishyError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

use crate::record::{MaterialRecord, QuestionMetadata, QuestionRecord, Record, TextRecord};

/// Source file parser, dispatching on file extension
#[derive(Debug, Clone, Default)]
pub struct RecordParser;

impl RecordParser {
    /// Extensions understood by [`RecordParser::parse`]
    pub const SUPPORTED_FORMATS: &'static [&'static str] = &["csv", "json", "txt"];

    /// Create new parser
    pub fn new() -> Self {
        Self
    }

    /// Parse a source file into records
    pub fn parse(&self, path: &Path) -> Result<Vec<Record>> {
        if !path.exists() {
            return Err(EnglishyError::not_found(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if !Self::SUPPORTED_FORMATS.contains(&extension.as_str()) {
            return Err(EnglishyError::unsupported_format(format!(
                "Unsupported file format '.{}' for {} (expected one of: {})",
                extension,
                path.display(),
                Self::SUPPORTED_FORMATS.join(", ")
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let records = match extension.as_str() {
            "csv" => parse_csv_str(&content),
            "json" => parse_json_str(&content),
            _ => Ok(parse_text_str(&content)),
        }
        .map_err(|e| match e {
            EnglishyError::Parse(msg) => {
                EnglishyError::parse(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;

        info!("Parsed {} records from {}", records.len(), path.display());
        Ok(records)
    }
}

/// One tabular row, keyed by the source column headers
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuestionRow {
    #[serde(rename = "TALK:A")]
    talk_a: String,
    #[serde(rename = "TALK:B")]
    talk_b: String,
    #[serde(rename = "TALK:C")]
    talk_c: String,
    #[serde(rename = "Answer")]
    answer: String,
    #[serde(rename = "GRAMMER")]
    grammar: String,
    #[serde(rename = "NOTE")]
    note: String,
    prefecture: String,
    year: String,
    #[serde(rename = "questionNo")]
    question_no: String,
    condition: String,
    #[serde(rename = "SUBJECT")]
    subject: String,
    #[serde(rename = "VERB")]
    verb: String,
    #[serde(rename = "NOT USING")]
    not_using: String,
}

impl QuestionRow {
    fn into_record(self, row_num: usize) -> QuestionRecord {
        let question = [&self.talk_a, &self.talk_b, &self.talk_c]
            .into_iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let metadata = QuestionMetadata {
            prefecture: self.prefecture,
            year: self.year,
            question_no: self.question_no,
            condition: self.condition,
            subject: self.subject,
            verb: self.verb,
            not_using: self.not_using,
        };

        QuestionRecord::new(
            format!("q_{}", row_num),
            question,
            self.answer,
            self.grammar,
            self.note,
            metadata,
        )
    }
}

/// Parse delimited tabular content with a header row
///
/// Rows whose cells are all empty are skipped.
pub fn parse_csv_str(content: &str) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| EnglishyError::parse(format!("Invalid CSV header: {}", e)))?
        .clone();

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row_num = idx + 1;
        let row = row.map_err(|e| EnglishyError::parse(format!("Invalid CSV row {}: {}", row_num, e)))?;

        if row.iter().all(|cell| cell.trim().is_empty()) {
            debug!("Skipping empty CSV row {}", row_num);
            continue;
        }

        let parsed: QuestionRow = row
            .deserialize(Some(&headers))
            .map_err(|e| EnglishyError::parse(format!("Invalid CSV row {}: {}", row_num, e)))?;
        records.push(Record::Question(parsed.into_record(row_num)));
    }

    Ok(records)
}

/// Parse a JSON array (one record per element) or a single JSON object
pub fn parse_json_str(content: &str) -> Result<Vec<Record>> {
    let data: Value = serde_json::from_str(content)
        .map_err(|e| EnglishyError::parse(format!("Invalid JSON: {}", e)))?;

    let items = match data {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(EnglishyError::parse(format!(
                "Unexpected JSON structure: expected array or object, got {}",
                json_type_name(&other)
            )))
        }
    };

    let records = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let search_text = json_search_text(&item);
            Record::Material(MaterialRecord {
                id: format!("item_{}", i + 1),
                content: item,
                search_text,
            })
        })
        .collect();

    Ok(records)
}

/// Parse plain text; blank lines separate blocks, each block becomes one record
pub fn parse_text_str(content: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in content.lines().map(str::trim) {
        if line.is_empty() {
            if !current.is_empty() {
                let id = format!("text_{}", records.len() + 1);
                records.push(Record::Text(TextRecord::from_lines(id, std::mem::take(&mut current))));
            }
            continue;
        }
        current.push(line.to_string());
    }

    if !current.is_empty() {
        let id = format!("text_{}", records.len() + 1);
        records.push(Record::Text(TextRecord::from_lines(id, current)));
    }

    records
}

/// Join every scalar inside `value` with single spaces, in document order
fn json_search_text(value: &Value) -> String {
    let mut parts = Vec::new();
    collect_scalars(value, &mut parts);
    parts.join(" ")
}

fn collect_scalars(value: &Value, parts: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() {
                parts.push(s.to_string());
            }
        }
        Value::Bool(b) => parts.push(b.to_string()),
        Value::Number(n) => parts.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_scalars(v, parts)),
        Value::Object(map) => map.values().for_each(|v| collect_scalars(v, parts)),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordKind;

    const HEADER: &str = "TALK:A,TALK:B,TALK:C,Answer,GRAMMER,NOTE,prefecture,year,questionNo,condition,SUBJECT,VERB,NOT USING";

    #[test]
    fn test_csv_question_row() {
        let content = format!("{}\nHello,world,,Hi,,,Tokyo,2023,3,,I,go,\n", HEADER);
        let records = parse_csv_str(&content).unwrap();
        assert_eq!(records.len(), 1);

        let Record::Question(q) = &records[0] else {
            panic!("expected question record");
        };
        assert_eq!(q.id, "q_1");
        assert_eq!(q.question, "Hello world");
        assert_eq!(q.answer, "Hi");
        assert_eq!(q.search_text, "Hello world Hi");
        assert_eq!(q.metadata.prefecture, "Tokyo");
        assert_eq!(q.metadata.question_no, "3");
        assert_eq!(q.metadata.verb, "go");
    }

    #[test]
    fn test_csv_skips_empty_rows() {
        let content = format!("{}\n,,,,,,,,,,,,\nA,B,,C,,,,,,,,,\n  , ,,,,,,,,,,,\n", HEADER);
        let records = parse_csv_str(&content).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), "q_2");
    }

    #[test]
    fn test_csv_missing_columns_read_as_empty() {
        let content = "TALK:A,Answer\nHow are you?,Fine\n";
        let records = parse_csv_str(content).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].search_text(), "How are you? Fine");
    }

    #[test]
    fn test_json_array_and_object() {
        let records = parse_json_str(r#"[{"word": "apple", "level": 1}, {"word": "pear", "tags": ["fruit", "noun"]}]"#).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id(), "item_1");
        assert_eq!(records[0].kind(), RecordKind::Material);
        assert_eq!(records[0].search_text(), "apple 1");
        assert_eq!(records[1].search_text(), "pear fruit noun");

        let records = parse_json_str(r#"{"title": "Past tense", "body": {"text": "I went.", "empty": ""}}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].search_text(), "Past tense I went.");
    }

    #[test]
    fn test_json_rejects_scalar_root() {
        assert!(matches!(parse_json_str("42"), Err(EnglishyError::Parse(_))));
        assert!(matches!(parse_json_str("{not json"), Err(EnglishyError::Parse(_))));
    }

    #[test]
    fn test_text_blocks() {
        let records = parse_text_str("first line\n  second line  \n\n\nthird block\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id(), "text_1");
        assert_eq!(records[0].search_text(), "first line second line");
        assert_eq!(records[1].search_text(), "third block");

        assert!(parse_text_str("\n\n  \n").is_empty());
    }

    #[test]
    fn test_parse_dispatch_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let parser = RecordParser::new();

        let missing = dir.path().join("missing.csv");
        assert!(matches!(parser.parse(&missing), Err(EnglishyError::NotFound(_))));

        let unsupported = dir.path().join("notes.pdf");
        std::fs::write(&unsupported, "binary").unwrap();
        assert!(matches!(
            parser.parse(&unsupported),
            Err(EnglishyError::UnsupportedFormat(_))
        ));

        let text = dir.path().join("NOTES.TXT");
        std::fs::write(&text, "one\n\ntwo").unwrap();
        assert_eq!(parser.parse(&text).unwrap().len(), 2);
    }
}

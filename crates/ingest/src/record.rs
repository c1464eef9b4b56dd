use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Record variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Question,
    Material,
    Text,
    Generic,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Question => "question",
            Self::Material => "material",
            Self::Text => "text",
            Self::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// One parsed unit of source material
///
/// Serialized with a `kind` tag so record artifacts written by
/// `parse-data` can be fed back into `chunk-data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    /// Tabular Q&A row
    Question(QuestionRecord),
    /// JSON collection element
    Material(MaterialRecord),
    /// Blank-line delimited text block
    Text(TextRecord),
    /// Anything else that only carries search text
    Generic(GenericRecord),
}

impl Record {
    /// Record identifier
    pub fn id(&self) -> &str {
        match self {
            Self::Question(r) => &r.id,
            Self::Material(r) => &r.id,
            Self::Text(r) => &r.id,
            Self::Generic(r) => &r.id,
        }
    }

    /// Variant tag
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Question(_) => RecordKind::Question,
            Self::Material(_) => RecordKind::Material,
            Self::Text(_) => RecordKind::Text,
            Self::Generic(_) => RecordKind::Generic,
        }
    }

    /// Text used for retrieval
    pub fn search_text(&self) -> &str {
        match self {
            Self::Question(r) => &r.search_text,
            Self::Material(r) => &r.search_text,
            Self::Text(r) => &r.text,
            Self::Generic(r) => &r.search_text,
        }
    }

    /// Flat string view of the record's fields
    pub fn fields(&self) -> BTreeMap<String, String> {
        match self {
            Self::Question(r) => {
                let mut fields = BTreeMap::new();
                fields.insert("question".to_string(), r.question.clone());
                fields.insert("answer".to_string(), r.answer.clone());
                fields.insert("grammar".to_string(), r.grammar.clone());
                fields.insert("note".to_string(), r.note.clone());
                fields
            }
            Self::Material(r) => match &r.content {
                Value::Object(map) => map
                    .iter()
                    .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                    .collect(),
                other => BTreeMap::from([("value".to_string(), scalar_to_string(other))]),
            },
            Self::Text(r) => BTreeMap::from([("text".to_string(), r.text.clone())]),
            Self::Generic(r) => r.fields.clone(),
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Exam question metadata carried through to chunks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionMetadata {
    pub prefecture: String,
    pub year: String,
    pub question_no: String,
    pub condition: String,
    pub subject: String,
    pub verb: String,
    pub not_using: String,
}

/// Tabular Q&A record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: String,

    /// Conversational turns joined with single spaces
    #[serde(default)]
    pub question: String,

    #[serde(default)]
    pub answer: String,

    /// Grammar explanation
    #[serde(default)]
    pub grammar: String,

    /// Free-text learning note
    #[serde(default)]
    pub note: String,

    #[serde(default)]
    pub metadata: QuestionMetadata,

    #[serde(default)]
    pub search_text: String,
}

impl QuestionRecord {
    /// Create a question record; `search_text` joins the non-empty parts
    pub fn new(
        id: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
        grammar: impl Into<String>,
        note: impl Into<String>,
        metadata: QuestionMetadata,
    ) -> Self {
        let question = question.into().trim().to_string();
        let answer = answer.into().trim().to_string();
        let grammar = grammar.into().trim().to_string();
        let note = note.into().trim().to_string();
        let search_text = [&question, &answer, &grammar, &note]
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            id: id.into(),
            question,
            answer,
            grammar,
            note,
            metadata,
            search_text,
        }
    }
}

/// JSON collection element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRecord {
    pub id: String,

    /// The element as it appeared in the source document
    pub content: Value,

    #[serde(default)]
    pub search_text: String,
}

/// Plain-text block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRecord {
    pub id: String,

    /// Block lines joined with single spaces
    pub text: String,

    /// Original trimmed lines
    #[serde(default)]
    pub lines: Vec<String>,
}

impl TextRecord {
    /// Create a text record from trimmed, non-empty lines
    pub fn from_lines(id: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            id: id.into(),
            text: lines.join(" "),
            lines,
        }
    }
}

/// Free-form record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericRecord {
    pub id: String,

    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    pub search_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_search_text() {
        let record = QuestionRecord::new("q_1", "Hello world", " Hi ", "", "", QuestionMetadata::default());
        assert_eq!(record.search_text, "Hello world Hi");
        assert_eq!(record.answer, "Hi");
    }

    #[test]
    fn test_record_tagged_serialization() {
        let record = Record::Text(TextRecord::from_lines(
            "text_1",
            vec!["first line".to_string(), "second line".to_string()],
        ));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["text"], "first line second line");

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), RecordKind::Text);
        assert_eq!(back.search_text(), "first line second line");
    }

    #[test]
    fn test_material_fields() {
        let record = Record::Material(MaterialRecord {
            id: "item_1".to_string(),
            content: serde_json::json!({"word": "apple", "level": 2, "extra": null}),
            search_text: "apple 2".to_string(),
        });
        let fields = record.fields();
        assert_eq!(fields["word"], "apple");
        assert_eq!(fields["level"], "2");
        assert_eq!(fields["extra"], "");
    }
}

/// Structured generation adapter.
///
/// Wraps the chat client behind a schema-constrained interface: the caller
/// supplies a prompt plus a closed set of named primitive fields, and gets back
/// a record whose values conform to that schema, or an error. The model is
/// instructed to reply with a single JSON object; the reply is parsed and
/// validated field by field, so schema violations surface as errors here
/// rather than leaking malformed values upward.
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::llm::{ChatCompletionRequest, LlmClient, LlmClientError, Message};

/// Primitive type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
}

/// A named field in a generation schema.
#[derive(Debug, Clone)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
}

impl SchemaField {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
        }
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Number,
        }
    }
}

/// A generated value conforming to a `SchemaField`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }
}

/// Field name -> value, in schema order.
pub type GeneratedRecord = IndexMap<String, FieldValue>;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("llm client error: {0}")]
    Client(#[from] LlmClientError),

    #[error("model response contained no content")]
    NoContent,

    #[error("model response was not valid JSON: {0}")]
    MalformedJson(String),

    #[error("model response missing required field: {0}")]
    MissingField(String),

    #[error("field {field} has wrong type, expected {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("document content unavailable: {0}")]
    Source(String),
}

/// Schema-constrained single-shot generation.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        schema: &[SchemaField],
    ) -> Result<GeneratedRecord, GenerationError>;
}

/// Production generator backed by the OpenAI-compatible chat client.
pub struct LlmGenerator {
    client: Arc<LlmClient>,
}

impl LlmGenerator {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StructuredGenerator for LlmGenerator {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        schema: &[SchemaField],
    ) -> Result<GeneratedRecord, GenerationError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: format!("{prompt}\n\n{}", schema_instruction(schema)),
            }],
            temperature: Some(0.0),
            max_tokens: None,
        };

        let response = self.client.chat_completions(request, None).await?;
        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or(GenerationError::NoContent)?;

        parse_record(content, schema)
    }
}

/// Build the JSON-output instruction appended to every structured prompt.
fn schema_instruction(schema: &[SchemaField]) -> String {
    let fields: Vec<String> = schema
        .iter()
        .map(|f| {
            let kind = match f.kind {
                FieldKind::Text => "string",
                FieldKind::Number => "number",
            };
            format!("  \"{}\": <{kind}>", f.name)
        })
        .collect();
    format!(
        "Respond with a single JSON object and nothing else, using exactly these fields:\n{{\n{}\n}}",
        fields.join(",\n")
    )
}

/// Parse model output into a record validated against the schema.
///
/// Tolerates prose or code fences around the JSON object by extracting the
/// outermost `{...}` span before parsing.
pub fn parse_record(content: &str, schema: &[SchemaField]) -> Result<GeneratedRecord, GenerationError> {
    let json_span = extract_json_object(content)
        .ok_or_else(|| GenerationError::MalformedJson("no JSON object found".to_string()))?;
    let value: serde_json::Value = serde_json::from_str(json_span)
        .map_err(|e| GenerationError::MalformedJson(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| GenerationError::MalformedJson("top-level value is not an object".to_string()))?;

    let mut record = GeneratedRecord::new();
    for field in schema {
        let raw = object
            .get(&field.name)
            .ok_or_else(|| GenerationError::MissingField(field.name.clone()))?;
        let parsed = match field.kind {
            FieldKind::Text => match raw {
                serde_json::Value::String(s) => FieldValue::Text(s.clone()),
                serde_json::Value::Null => FieldValue::Text(String::new()),
                _ => {
                    return Err(GenerationError::WrongType {
                        field: field.name.clone(),
                        expected: "string",
                    })
                }
            },
            FieldKind::Number => match raw {
                serde_json::Value::Number(n) => {
                    FieldValue::Number(n.as_f64().unwrap_or(0.0))
                }
                // Models occasionally quote numeric scores.
                serde_json::Value::String(s) => match s.trim().parse::<f64>() {
                    Ok(n) => FieldValue::Number(n),
                    Err(_) => {
                        return Err(GenerationError::WrongType {
                            field: field.name.clone(),
                            expected: "number",
                        })
                    }
                },
                _ => {
                    return Err(GenerationError::WrongType {
                        field: field.name.clone(),
                        expected: "number",
                    })
                }
            },
        };
        record.insert(field.name.clone(), parsed);
    }
    Ok(record)
}

/// Return the outermost `{...}` span of the content, if any.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&content[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer_schema() -> Vec<SchemaField> {
        vec![SchemaField::text("answer")]
    }

    fn eval_schema() -> Vec<SchemaField> {
        vec![
            SchemaField::number("evaluation_score"),
            SchemaField::text("evaluation_explanation"),
        ]
    }

    #[test]
    fn parses_plain_json() {
        let record = parse_record(r#"{"answer": "Net 45 days"}"#, &answer_schema()).unwrap();
        assert_eq!(record["answer"].as_text(), Some("Net 45 days"));
    }

    #[test]
    fn parses_fenced_json() {
        let content = "Here you go:\n```json\n{\"answer\": \"60 days notice\"}\n```";
        let record = parse_record(content, &answer_schema()).unwrap();
        assert_eq!(record["answer"].as_text(), Some("60 days notice"));
    }

    #[test]
    fn missing_field_is_an_error() {
        let err = parse_record(r#"{"other": 1}"#, &answer_schema()).unwrap_err();
        assert!(matches!(err, GenerationError::MissingField(f) if f == "answer"));
    }

    #[test]
    fn quoted_number_is_coerced() {
        let content = r#"{"evaluation_score": "0.75", "evaluation_explanation": "minor gaps"}"#;
        let record = parse_record(content, &eval_schema()).unwrap();
        assert_eq!(record["evaluation_score"].as_number(), Some(0.75));
    }

    #[test]
    fn non_numeric_score_is_rejected() {
        let content = r#"{"evaluation_score": "high", "evaluation_explanation": "x"}"#;
        let err = parse_record(content, &eval_schema()).unwrap_err();
        assert!(matches!(err, GenerationError::WrongType { field, .. } if field == "evaluation_score"));
    }

    #[test]
    fn null_text_becomes_empty() {
        let record = parse_record(r#"{"answer": null}"#, &answer_schema()).unwrap();
        assert_eq!(record["answer"].as_text(), Some(""));
    }

    #[test]
    fn no_json_object_is_malformed() {
        let err = parse_record("I cannot answer that.", &answer_schema()).unwrap_err();
        assert!(matches!(err, GenerationError::MalformedJson(_)));
    }

    #[test]
    fn instruction_lists_all_fields() {
        let text = schema_instruction(&eval_schema());
        assert!(text.contains("\"evaluation_score\": <number>"));
        assert!(text.contains("\"evaluation_explanation\": <string>"));
    }
}

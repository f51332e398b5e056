//! access log line parser - tokens to typed records

pub mod schema;
pub mod tokenizer;

pub use schema::{Schema, SchemaChoice, SchemaVariant};
pub use tokenizer::{tokenize, TokenizeError};

use crate::classifier::ServiceClassifier;
use crate::{LogRecord, ProcessingTimes};
use serde::{Deserialize, Serialize};
use std::fmt;

// why a line did not produce a record. none of these are failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Blank,
    Comment,
    Unbalanced,      // unterminated quote
    TooFewFields(usize),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Blank => write!(f, "blank line"),
            SkipReason::Comment => write!(f, "comment line"),
            SkipReason::Unbalanced => write!(f, "unbalanced quote"),
            SkipReason::TooFewFields(n) => write!(f, "only {} fields", n),
        }
    }
}

/// Maps tokens to a `LogRecord` with one schema and classifies the request.
pub struct LineParser {
    schema: Schema,
    classifier: ServiceClassifier,
}

impl LineParser {
    pub fn new(schema: Schema, classifier: ServiceClassifier) -> Self {
        Self { schema, classifier }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn classifier(&self) -> &ServiceClassifier {
        &self.classifier
    }

    /// Tokenize and parse one raw line
    pub fn parse_line(&self, line: &str) -> Result<LogRecord, SkipReason> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(SkipReason::Blank);
        }
        if trimmed.starts_with('#') {
            return Err(SkipReason::Comment);
        }
        let tokens = tokenize(trimmed).map_err(|_| SkipReason::Unbalanced)?;
        self.parse(&tokens)
            .ok_or(SkipReason::TooFewFields(tokens.len()))
    }

    /// Build a record from tokens. `None` when the line is too short for
    /// the schema.
    pub fn parse<S: AsRef<str>>(&self, tokens: &[S]) -> Option<LogRecord> {
        let s = &self.schema;
        if tokens.len() < s.min_fields || tokens.len() <= s.max_required_index() {
            return None;
        }
        let field = |idx: usize| tokens.get(idx).map(|t| t.as_ref()).unwrap_or("");

        let [req_idx, backend_idx, resp_idx] = s.processing;
        let request = field(s.request).to_string();
        let url = ServiceClassifier::extract_url(&request).to_string();
        let service = self.classifier.classify_url(&url);

        Some(LogRecord {
            timestamp: field(s.timestamp).to_string(),
            client: s.client.map(|idx| field(idx).to_string()).unwrap_or_default(),
            processing: ProcessingTimes {
                request: parse_seconds(field(req_idx)),
                backend: parse_seconds(field(backend_idx)),
                response: parse_seconds(field(resp_idx)),
            },
            elb_status: field(s.elb_status).to_string(),
            backend_status: field(s.backend_status).to_string(),
            received_bytes: parse_bytes(field(s.received_bytes)),
            sent_bytes: parse_bytes(field(s.sent_bytes)),
            request,
            url,
            service,
        })
    }
}

// timing column: "-1" and garbage mean "not measured"
fn parse_seconds(raw: &str) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn parse_bytes(raw: &str) -> u64 {
    raw.parse().unwrap_or(0)
}

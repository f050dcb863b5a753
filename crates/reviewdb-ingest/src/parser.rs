//! Line parser for review files
//!
//! Each line is one JSON object. A line that cannot produce a review row
//! (bad encoding, bad JSON, or a missing required key) is rejected. Optional
//! fields with an unexpected shape are dropped and reported as issues, and
//! the line is still used.

use chrono::NaiveDate;
use reviewdb_common::normalize::normalize_review_date;
use reviewdb_common::DocumentFields;
use serde_json::{Map, Value};
use thiserror::Error;

pub const KEY_REVIEWER_ID: &str = "reviewerID";
pub const KEY_ASIN: &str = "asin";
pub const KEY_REVIEWER_NAME: &str = "reviewerName";
pub const KEY_HELPFUL: &str = "helpful";
pub const KEY_REVIEW_TEXT: &str = "reviewText";
pub const KEY_OVERALL: &str = "overall";
pub const KEY_SUMMARY: &str = "summary";
pub const KEY_UNIX_REVIEW_TIME: &str = "unixReviewTime";
pub const KEY_REVIEW_TIME: &str = "reviewTime";

/// Something wrong with a single input line
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordIssue {
    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("line is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("line is not a JSON object")]
    NotAnObject,

    #[error("required key '{0}' is missing or null")]
    MissingField(&'static str),

    #[error("key '{field}' has an unexpected shape, expected {expected}")]
    WrongShape {
        field: &'static str,
        expected: &'static str,
    },

    #[error("unparseable review date '{0}'")]
    BadDate(String),
}

/// Review fields extracted from one line
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReview {
    pub reviewer_id: String,
    pub asin: String,
    pub reviewer_name: Option<String>,
    pub rating: f64,
    pub unix_time: Option<i64>,
    pub review_date: Option<NaiveDate>,
    pub document: DocumentFields,
}

/// Result of parsing one line
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Whitespace only, not a record
    Blank,
    Rejected(RecordIssue),
    Parsed {
        review: ParsedReview,
        issues: Vec<RecordIssue>,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewParser;

impl ReviewParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw: &[u8]) -> ParseOutcome {
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text.trim(),
            Err(_) => return ParseOutcome::Rejected(RecordIssue::InvalidUtf8),
        };
        if text.is_empty() {
            return ParseOutcome::Blank;
        }

        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return ParseOutcome::Rejected(RecordIssue::InvalidJson(e.to_string())),
        };
        let object = match value {
            Value::Object(object) => object,
            _ => return ParseOutcome::Rejected(RecordIssue::NotAnObject),
        };

        match Self::extract(&object) {
            Ok((review, issues)) => ParseOutcome::Parsed { review, issues },
            Err(issue) => ParseOutcome::Rejected(issue),
        }
    }

    fn extract(
        object: &Map<String, Value>,
    ) -> std::result::Result<(ParsedReview, Vec<RecordIssue>), RecordIssue> {
        let reviewer_id = required_string(object, KEY_REVIEWER_ID)?;
        let asin = required_string(object, KEY_ASIN)?;
        let rating = match present(object, KEY_OVERALL) {
            None => return Err(RecordIssue::MissingField(KEY_OVERALL)),
            Some(value) => value.as_f64().ok_or(RecordIssue::WrongShape {
                field: KEY_OVERALL,
                expected: "a number",
            })?,
        };

        let mut issues = Vec::new();

        let reviewer_name = optional_string(object, KEY_REVIEWER_NAME, &mut issues);
        let body = optional_string(object, KEY_REVIEW_TEXT, &mut issues);
        let summary = optional_string(object, KEY_SUMMARY, &mut issues);

        let unix_time = present(object, KEY_UNIX_REVIEW_TIME).and_then(|value| {
            let parsed = value.as_i64();
            if parsed.is_none() {
                issues.push(RecordIssue::WrongShape {
                    field: KEY_UNIX_REVIEW_TIME,
                    expected: "an integer",
                });
            }
            parsed
        });

        let helpfulness = present(object, KEY_HELPFUL).and_then(|value| {
            let parsed = helpful_pair(value);
            if parsed.is_none() {
                issues.push(RecordIssue::WrongShape {
                    field: KEY_HELPFUL,
                    expected: "a two-integer array",
                });
            }
            parsed
        });

        let review_date = match optional_string(object, KEY_REVIEW_TIME, &mut issues) {
            None => None,
            Some(raw) => match normalize_review_date(Some(&raw)) {
                Ok(date) => date,
                Err(_) => {
                    issues.push(RecordIssue::BadDate(raw));
                    None
                },
            },
        };

        let review = ParsedReview {
            reviewer_id,
            asin,
            reviewer_name,
            rating,
            unix_time,
            review_date,
            document: DocumentFields {
                helpfulness,
                body,
                summary,
            },
        };
        Ok((review, issues))
    }
}

/// Value for `key`, treating JSON `null` as absent
fn present<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|value| !value.is_null())
}

fn required_string(
    object: &Map<String, Value>,
    key: &'static str,
) -> std::result::Result<String, RecordIssue> {
    match present(object, key) {
        None => Err(RecordIssue::MissingField(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(RecordIssue::WrongShape {
            field: key,
            expected: "a string",
        }),
    }
}

fn optional_string(
    object: &Map<String, Value>,
    key: &'static str,
    issues: &mut Vec<RecordIssue>,
) -> Option<String> {
    match present(object, key)? {
        Value::String(s) => Some(s.clone()),
        _ => {
            issues.push(RecordIssue::WrongShape {
                field: key,
                expected: "a string",
            });
            None
        },
    }
}

fn helpful_pair(value: &Value) -> Option<[i64; 2]> {
    match value.as_array()?.as_slice() {
        [up, total] => Some([up.as_i64()?, total.as_i64()?]),
        _ => None,
    }
}

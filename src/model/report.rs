//! Fixed output document types
//!
//! These serde types mirror `schemas/t3c_output_schema.json` exactly. Every
//! struct denies unknown fields and emits no extra keys; the top-level
//! `data` member serializes as the `["v0.2", {...}]` pair the downstream
//! visualization tools expect.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SCHEMA_VERSION: &str = "v0.2";

/// Root document: `{"data": ["v0.2", {...report...}]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputDocument {
    pub data: (String, ReportBody),
}

impl OutputDocument {
    pub fn new(body: ReportBody) -> Self {
        Self {
            data: (SCHEMA_VERSION.to_string(), body),
        }
    }

    pub fn body(&self) -> &ReportBody {
        &self.data.1
    }

    pub fn version(&self) -> &str {
        &self.data.0
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ReportBody {
    pub title: String,
    pub description: String,
    pub add_ons: AddOns,
    pub topics: Vec<ReportTopic>,
}

/// Reserved extension point; always serialized as an empty object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddOns {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportTopic {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub subtopics: Vec<ReportSubtopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportSubtopic {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub claims: Vec<ReportClaim>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ReportClaim {
    pub id: Uuid,
    pub title: String,
    pub quotes: Vec<ReportQuote>,
    pub number: u32,
    pub similar_claims: Vec<ReportSimilarClaim>,
}

/// Nested near-duplicate; carries no further nesting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportSimilarClaim {
    pub id: Uuid,
    pub title: String,
    pub quotes: Vec<ReportQuote>,
    pub number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportQuote {
    pub id: Uuid,
    pub text: String,
    pub reference: ReportReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ReportReference {
    pub id: Uuid,
    pub source_id: Uuid,
    /// Display label of the source, e.g. "Anonymous #2"
    pub interview: String,
    /// `["text", {"startIdx": ..., "endIdx": ...}]`
    pub data: (String, SpanIndices),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SpanIndices {
    pub start_idx: usize,
    pub end_idx: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> OutputDocument {
        OutputDocument::new(ReportBody {
            title: "pets_run".to_string(),
            description: "Analysis results".to_string(),
            add_ons: AddOns::default(),
            topics: vec![ReportTopic {
                id: Uuid::new_v4(),
                title: "Pets".to_string(),
                description: "Opinions about pets".to_string(),
                subtopics: vec![ReportSubtopic {
                    id: Uuid::new_v4(),
                    title: "Cats".to_string(),
                    description: "Cat views".to_string(),
                    claims: vec![ReportClaim {
                        id: Uuid::new_v4(),
                        title: "Cats make good pets".to_string(),
                        quotes: vec![ReportQuote {
                            id: Uuid::new_v4(),
                            text: "I love cats".to_string(),
                            reference: ReportReference {
                                id: Uuid::new_v4(),
                                source_id: Uuid::new_v4(),
                                interview: "Anonymous #1".to_string(),
                                data: (
                                    "text".to_string(),
                                    SpanIndices {
                                        start_idx: 0,
                                        end_idx: 11,
                                    },
                                ),
                            },
                        }],
                        number: 1,
                        similar_claims: vec![],
                    }],
                }],
            }],
        })
    }

    #[test]
    fn test_data_serializes_as_versioned_pair() {
        let doc = sample_document();
        let value = serde_json::to_value(&doc).unwrap();
        let data = value["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0], "v0.2");
        assert!(data[1]["topics"].is_array());
        assert_eq!(data[1]["addOns"], serde_json::json!({}));
    }

    #[test]
    fn test_reference_span_uses_camel_case_keys() {
        let doc = sample_document();
        let value = serde_json::to_value(&doc).unwrap();
        let reference = &value["data"][1]["topics"][0]["subtopics"][0]["claims"][0]["quotes"][0]
            ["reference"];
        assert!(reference["sourceId"].is_string());
        assert_eq!(reference["data"][0], "text");
        assert_eq!(reference["data"][1]["startIdx"], 0);
        assert_eq!(reference["data"][1]["endIdx"], 11);
    }

    #[test]
    fn test_round_trip_and_unknown_field_rejection() {
        let doc = sample_document();
        let json = doc.to_json_pretty().unwrap();
        let parsed: OutputDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.version(), SCHEMA_VERSION);
        assert_eq!(parsed.body().topics.len(), 1);

        let mut value = serde_json::to_value(&doc).unwrap();
        value["data"][1]["extraKey"] = serde_json::json!(true);
        let rejected: Result<OutputDocument, _> = serde_json::from_value(value);
        assert!(rejected.is_err());
    }
}

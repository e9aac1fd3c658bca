//! Claim, quote and model-response types
//!
//! `Claim`/`Quote`/`SimilarClaim` are the in-memory entities threaded
//! through the pipeline. The serde+schemars types below them mirror the
//! JSON returned by the model during claim extraction and deduplication.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::source::QuoteRef;

/// A verbatim quote, owned by exactly one claim or similar claim.
#[derive(Debug, Clone)]
pub struct Quote {
    pub id: Uuid,
    pub text: String,
    pub reference: QuoteRef,
}

/// A distinct assertion extracted from a comment, grounded in quotes.
///
/// `number` is 0 until the ranking stage assigns the 1-based rank.
#[derive(Debug, Clone)]
pub struct Claim {
    pub id: Uuid,
    pub title: String,
    pub quotes: Vec<Quote>,
    pub number: u32,
    pub similar_claims: Vec<SimilarClaim>,
}

impl Claim {
    pub fn new(title: impl Into<String>, quotes: Vec<Quote>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            quotes,
            number: 0,
            similar_claims: Vec::new(),
        }
    }
}

/// A near-duplicate nested under a canonical claim.
///
/// Deliberately has no `similar_claims` field: nesting is capped at depth 1
/// by construction.
#[derive(Debug, Clone)]
pub struct SimilarClaim {
    pub id: Uuid,
    pub title: String,
    pub quotes: Vec<Quote>,
    pub number: u32,
}

impl From<Claim> for SimilarClaim {
    /// Demote a claim to a similar claim. The claim's own nested similar
    /// claims are NOT carried over; callers must flatten them separately.
    fn from(claim: Claim) -> Self {
        Self {
            id: claim.id,
            title: claim.title,
            quotes: claim.quotes,
            number: 0,
        }
    }
}

/// Claims returned by the model for a single comment.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClaimsResponse {
    pub claims: Vec<ExtractedClaim>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedClaim {
    /// Concise claim statement
    pub claim: String,
    /// Verbatim supporting quotes from the comment
    pub quotes: Vec<ExtractedQuote>,
    #[serde(rename = "topicName")]
    pub topic_name: String,
    #[serde(rename = "subtopicName")]
    pub subtopic_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedQuote {
    /// Exact text copied from the comment
    pub quote: String,
    /// Model-reported character offsets; treated as hints and re-verified
    #[serde(rename = "startIdx")]
    pub start_idx: Option<u32>,
    #[serde(rename = "endIdx")]
    pub end_idx: Option<u32>,
}

/// Duplicate-nesting assignments returned by the model for one subtopic.
///
/// Keys and values are `claimId<N>` labels referring to the 0-based order
/// in which the claims were listed in the prompt.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NestingResponse {
    pub nesting: BTreeMap<String, Vec<String>>,
}

impl NestingResponse {
    pub fn has_duplicates(&self) -> bool {
        self.nesting.values().any(|nested| !nested.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_response_deserializes_model_field_names() {
        let json = r#"{
            "claims": [{
                "claim": "AI development should be regulated",
                "quotes": [{"quote": "AI is scary", "startIdx": 0, "endIdx": 11}],
                "topicName": "Technology",
                "subtopicName": "AI"
            }]
        }"#;
        let parsed: ClaimsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.claims.len(), 1);
        assert_eq!(parsed.claims[0].quotes[0].start_idx, Some(0));
        assert_eq!(parsed.claims[0].subtopic_name, "AI");
    }

    #[test]
    fn test_quote_offsets_are_optional() {
        let json = r#"{"claims": [{
            "claim": "c",
            "quotes": [{"quote": "q", "startIdx": null, "endIdx": null}],
            "topicName": "t",
            "subtopicName": "s"
        }]}"#;
        let parsed: ClaimsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.claims[0].quotes[0].start_idx, None);
    }

    #[test]
    fn test_nesting_response_duplicate_detection() {
        let empty: NestingResponse =
            serde_json::from_str(r#"{"nesting": {"claimId0": [], "claimId1": []}}"#).unwrap();
        assert!(!empty.has_duplicates());

        let nested: NestingResponse =
            serde_json::from_str(r#"{"nesting": {"claimId0": ["claimId1"]}}"#).unwrap();
        assert!(nested.has_duplicates());
    }

    #[test]
    fn test_similar_claim_demotion_keeps_identity() {
        let claim = Claim::new("Dogs are great", vec![]);
        let id = claim.id;
        let similar = SimilarClaim::from(claim);
        assert_eq!(similar.id, id);
        assert_eq!(similar.number, 0);
    }
}

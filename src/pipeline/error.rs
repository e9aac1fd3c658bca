//! Pipeline stages and failure taxonomy

use std::fmt;

use crate::gateway::GatewayError;
use crate::telemetry::CostReport;

/// Linear run states. A run advances strictly forward; failures capture the
/// stage that was being entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    TaxonomyBuilt,
    ClaimsExtracted,
    Ranked,
    Deduplicated,
    Formatted,
    Done,
}

impl Stage {
    /// The next state in the fixed sequence.
    pub fn next(&self) -> Stage {
        match self {
            Stage::Init => Stage::TaxonomyBuilt,
            Stage::TaxonomyBuilt => Stage::ClaimsExtracted,
            Stage::ClaimsExtracted => Stage::Ranked,
            Stage::Ranked => Stage::Deduplicated,
            Stage::Deduplicated => Stage::Formatted,
            Stage::Formatted | Stage::Done => Stage::Done,
        }
    }

    /// Human name of the work that produces this state.
    pub fn task_name(&self) -> &'static str {
        match self {
            Stage::Init => "initialization",
            Stage::TaxonomyBuilt => "taxonomy generation",
            Stage::ClaimsExtracted => "claims extraction",
            Stage::Ranked => "ranking",
            Stage::Deduplicated => "deduplication",
            Stage::Formatted => "output formatting",
            Stage::Done => "completion",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.task_name())
    }
}

/// Every violation found during final document validation.
#[derive(Debug, Clone)]
pub struct SchemaViolations(pub Vec<String>);

impl fmt::Display for SchemaViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s): {}", self.0.len(), self.0.join("; "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The taxonomy call failed validation twice; nothing downstream can run.
    #[error("taxonomy generation failed: {0}")]
    TaxonomyGeneration(String),

    #[error("{stage} failed: {source}")]
    Gateway {
        stage: Stage,
        #[source]
        source: GatewayError,
    },

    /// Final document validation failed; all violations enumerated.
    #[error("output failed schema validation: {0}")]
    SchemaValidation(SchemaViolations),

    #[error("run cancelled during {0}")]
    Cancelled(Stage),
}

impl PipelineError {
    /// The stage this error terminates.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::TaxonomyGeneration(_) => Stage::TaxonomyBuilt,
            PipelineError::Gateway { stage, .. } => *stage,
            PipelineError::SchemaValidation(_) => Stage::Formatted,
            PipelineError::Cancelled(stage) => *stage,
        }
    }
}

/// Terminal failure report: the failing stage, the cause, and the cost
/// incurred up to that point.
#[derive(Debug)]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: PipelineError,
    pub costs: CostReport,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pipeline failed during {} ({}); partial cost ${:.4} across {} call(s)",
            self.stage, self.error, self.costs.estimated_cost, self.costs.total_calls
        )
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_sequence_is_linear() {
        let mut stage = Stage::Init;
        let expected = [
            Stage::TaxonomyBuilt,
            Stage::ClaimsExtracted,
            Stage::Ranked,
            Stage::Deduplicated,
            Stage::Formatted,
            Stage::Done,
        ];
        for want in expected {
            stage = stage.next();
            assert_eq!(stage, want);
        }
        // Terminal state is absorbing
        assert_eq!(Stage::Done.next(), Stage::Done);
    }

    #[test]
    fn test_schema_violations_display_enumerates_all() {
        let violations = SchemaViolations(vec![
            "duplicate id abc".to_string(),
            "dangling sourceId def".to_string(),
        ]);
        let rendered = violations.to_string();
        assert!(rendered.contains("2 violation(s)"));
        assert!(rendered.contains("duplicate id abc"));
        assert!(rendered.contains("dangling sourceId def"));
    }
}

//! Pipeline orchestration
//!
//! One run walks the fixed stage sequence taxonomy → claims → sort → dedup →
//! format, threading the source index, cost counters and accumulated
//! warnings through every stage. Failures capture the stage, the cause and
//! the cost incurred so far; the telemetry sink hears about every run either
//! way.

pub mod claims;
pub mod dedup;
pub mod error;
pub mod output;
pub mod prompts;
pub mod ranking;
pub mod taxonomy;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub use error::{PipelineError, PipelineFailure, Stage};

use crate::gateway::{ModelGateway, RetryPolicy};
use crate::ingest::CommentRecord;
use crate::model::config::RunConfig;
use crate::model::report::OutputDocument;
use crate::model::source::SourceIndex;
use crate::pipeline::claims::ClaimsExtractor;
use crate::pipeline::dedup::ClaimDeduplicator;
use crate::pipeline::output::OutputFormatter;
use crate::pipeline::taxonomy::TaxonomyBuilder;
use crate::telemetry::{CostReport, CostTracker, TelemetrySink, TracingSink};

const RUN_DESCRIPTION: &str = "T3C Pipeline Analysis Results";

/// Cooperative cancellation shared between the orchestrator and callers.
/// Checked at stage boundaries and before dispatching extraction calls;
/// in-flight calls finish or time out on their own.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct RunStats {
    pub comments: usize,
    pub topics: usize,
    pub subtopics: usize,
    /// Canonical claims in the final document
    pub claims: usize,
    /// Claims demoted under a canonical claim during dedup
    pub merged_claims: usize,
    pub claims_dropped: usize,
    pub quotes_dropped: usize,
    pub processing_time: Duration,
}

#[derive(Debug)]
pub struct PipelineReport {
    pub document: OutputDocument,
    pub costs: CostReport,
    pub stats: RunStats,
    pub warnings: Vec<String>,
}

pub struct PipelineOrchestrator {
    gateway: Arc<dyn ModelGateway>,
    config: RunConfig,
    costs: Arc<CostTracker>,
    sink: Arc<dyn TelemetrySink>,
    cancel: CancelFlag,
}

impl PipelineOrchestrator {
    pub fn new(gateway: Arc<dyn ModelGateway>, config: RunConfig) -> Self {
        let costs = Arc::new(CostTracker::new(config.provider.pricing()));
        Self {
            gateway,
            config,
            costs,
            sink: Arc::new(TracingSink),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Handle for aborting the run from another task.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Execute the full pipeline. The telemetry sink receives the cost
    /// report whether the run succeeds or fails.
    pub async fn run(
        &self,
        records: Vec<CommentRecord>,
        run_name: &str,
    ) -> Result<PipelineReport, PipelineFailure> {
        match self.run_inner(records, run_name).await {
            Ok(report) => {
                self.sink.record_run(&report.costs);
                Ok(report)
            }
            Err(error) => {
                let costs = self.costs.snapshot();
                self.sink.record_run(&costs);
                let failure = PipelineFailure {
                    stage: error.stage(),
                    error,
                    costs,
                };
                tracing::error!(stage = %failure.stage, error = %failure.error, "Pipeline failed");
                Err(failure)
            }
        }
    }

    async fn run_inner(
        &self,
        records: Vec<CommentRecord>,
        run_name: &str,
    ) -> Result<PipelineReport, PipelineError> {
        let start_time = Instant::now();
        let retry = RetryPolicy::from_config(&self.config);
        let mut warnings = Vec::new();

        let mut index = SourceIndex::new();
        for record in records {
            index.register(record.text, record.label);
        }

        tracing::info!(
            run_name = run_name,
            comments = index.len(),
            total_chars = index.total_chars(),
            provider = self.gateway.provider(),
            model = self.gateway.model(),
            "Pipeline started"
        );

        let mut stage = Stage::Init;
        self.checkpoint(stage)?;

        // Stage 1: taxonomy
        let builder = TaxonomyBuilder::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.costs),
            retry,
            self.config.taxonomy_char_budget,
            self.config.temperature,
        );
        let taxonomy_outcome = builder.build(&index).await?;
        let mut topics = taxonomy_outcome.topics;
        warnings.extend(taxonomy_outcome.warnings);
        stage = self.advance(stage)?;

        // Stage 2: claims
        let extractor = ClaimsExtractor::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.costs),
            retry,
            self.config.claims_concurrency,
            self.config.temperature,
        );
        let extraction = extractor.extract(&mut topics, &index, &self.cancel).await?;
        warnings.extend(extraction.warnings);
        stage = self.advance(stage)?;

        // Stage 3: sort
        ranking::rank(&mut topics);
        tracing::info!(
            total_claims = topics.iter().map(|t| t.claim_count()).sum::<usize>(),
            "Taxonomy sorted"
        );
        stage = self.advance(stage)?;

        // Stage 4: dedup
        let dedup_gateway = self
            .config
            .use_llm_dedup
            .then(|| Arc::clone(&self.gateway));
        let deduplicator = ClaimDeduplicator::new(
            dedup_gateway,
            Arc::clone(&self.costs),
            retry,
            self.config.similarity_threshold,
            self.config.temperature,
        );
        let dedup_outcome = deduplicator.dedup(&mut topics).await;
        warnings.extend(dedup_outcome.warnings);
        stage = self.advance(stage)?;

        // Stage 5: format
        let document = OutputFormatter::format(run_name, RUN_DESCRIPTION, &topics, &index)?;
        stage = self.advance(stage)?;
        debug_assert_eq!(stage.next(), Stage::Done);

        let stats = RunStats {
            comments: index.len(),
            topics: topics.len(),
            subtopics: topics.iter().map(|t| t.subtopics.len()).sum(),
            claims: topics.iter().map(|t| t.claim_count()).sum(),
            merged_claims: dedup_outcome.merges,
            claims_dropped: extraction.claims_dropped,
            quotes_dropped: extraction.quotes_dropped,
            processing_time: start_time.elapsed(),
        };

        tracing::info!(
            topics = stats.topics,
            subtopics = stats.subtopics,
            claims = stats.claims,
            merged_claims = stats.merged_claims,
            elapsed_ms = stats.processing_time.as_millis(),
            "Pipeline complete"
        );

        Ok(PipelineReport {
            document,
            costs: self.costs.snapshot(),
            stats,
            warnings,
        })
    }

    /// Move to the next stage, honoring cancellation at the boundary.
    fn advance(&self, stage: Stage) -> Result<Stage, PipelineError> {
        let next = stage.next();
        tracing::debug!(stage = %next, "Stage boundary reached");
        self.checkpoint(next)?;
        Ok(next)
    }

    fn checkpoint(&self, stage: Stage) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(stage));
        }
        Ok(())
    }
}

//! Cost and telemetry accounting
//!
//! Every gateway-calling stage records its token usage here. Counters are
//! atomics so concurrent extraction tasks can update them without locking;
//! cost is held in micro-dollars to stay in integer space.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::gateway::TokenUsage;
use crate::model::config::Pricing;

/// The gateway-calling pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostStage {
    Taxonomy,
    Claims,
    Dedup,
}

impl CostStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostStage::Taxonomy => "taxonomy",
            CostStage::Claims => "claims",
            CostStage::Dedup => "deduplication",
        }
    }

    const ALL: [CostStage; 3] = [CostStage::Taxonomy, CostStage::Claims, CostStage::Dedup];

    fn index(&self) -> usize {
        match self {
            CostStage::Taxonomy => 0,
            CostStage::Claims => 1,
            CostStage::Dedup => 2,
        }
    }
}

#[derive(Default)]
struct StageCounters {
    calls: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    cost_micros: AtomicU64,
}

/// Append-only usage counters for one run.
pub struct CostTracker {
    pricing: Pricing,
    stages: [StageCounters; 3],
}

impl CostTracker {
    pub fn new(pricing: Pricing) -> Self {
        Self {
            pricing,
            stages: Default::default(),
        }
    }

    /// Record one completed gateway call.
    pub fn record(&self, stage: CostStage, usage: &TokenUsage) {
        let counters = &self.stages[stage.index()];
        counters.calls.fetch_add(1, Ordering::Relaxed);
        counters
            .prompt_tokens
            .fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        counters
            .completion_tokens
            .fetch_add(usage.completion_tokens, Ordering::Relaxed);
        let cost = self.pricing.cost(usage.prompt_tokens, usage.completion_tokens);
        counters
            .cost_micros
            .fetch_add((cost * 1_000_000.0) as u64, Ordering::Relaxed);
    }

    /// Snapshot the counters into a report; valid at any point in the run.
    pub fn snapshot(&self) -> CostReport {
        let stages: Vec<StageCost> = CostStage::ALL
            .iter()
            .map(|stage| {
                let counters = &self.stages[stage.index()];
                StageCost {
                    stage: stage.as_str(),
                    calls: counters.calls.load(Ordering::Relaxed),
                    prompt_tokens: counters.prompt_tokens.load(Ordering::Relaxed),
                    completion_tokens: counters.completion_tokens.load(Ordering::Relaxed),
                    estimated_cost: counters.cost_micros.load(Ordering::Relaxed) as f64
                        / 1_000_000.0,
                }
            })
            .collect();

        CostReport {
            total_calls: stages.iter().map(|s| s.calls).sum(),
            total_prompt_tokens: stages.iter().map(|s| s.prompt_tokens).sum(),
            total_completion_tokens: stages.iter().map(|s| s.completion_tokens).sum(),
            estimated_cost: stages.iter().map(|s| s.estimated_cost).sum(),
            stages,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageCost {
    pub stage: &'static str,
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostReport {
    pub stages: Vec<StageCost>,
    pub total_calls: u64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub estimated_cost: f64,
}

impl CostReport {
    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens
    }
}

/// Write-only reporting interface for run telemetry.
pub trait TelemetrySink: Send + Sync {
    fn record_run(&self, report: &CostReport);
}

/// Default sink: structured log lines.
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record_run(&self, report: &CostReport) {
        for stage in &report.stages {
            if stage.calls == 0 {
                continue;
            }
            tracing::info!(
                stage = stage.stage,
                calls = stage.calls,
                prompt_tokens = stage.prompt_tokens,
                completion_tokens = stage.completion_tokens,
                cost_usd = format!("{:.4}", stage.estimated_cost),
                "Stage cost"
            );
        }
        tracing::info!(
            total_calls = report.total_calls,
            total_tokens = report.total_tokens(),
            cost_usd = format!("{:.4}", report.estimated_cost),
            "Run cost"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn usage(prompt: u64, completion: u64) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    #[test]
    fn test_record_and_snapshot() {
        let tracker = CostTracker::new(Pricing {
            input_per_10k: 0.1,
            output_per_10k: 0.3,
        });
        tracker.record(CostStage::Taxonomy, &usage(10_000, 0));
        tracker.record(CostStage::Claims, &usage(0, 10_000));
        tracker.record(CostStage::Claims, &usage(0, 10_000));

        let report = tracker.snapshot();
        assert_eq!(report.total_calls, 3);
        assert_eq!(report.total_prompt_tokens, 10_000);
        assert_eq!(report.total_completion_tokens, 20_000);
        assert!((report.estimated_cost - 0.7).abs() < 1e-6);

        let claims = report.stages.iter().find(|s| s.stage == "claims").unwrap();
        assert_eq!(claims.calls, 2);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_complete() {
        let tracker = Arc::new(CostTracker::new(Pricing {
            input_per_10k: 0.1,
            output_per_10k: 0.1,
        }));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    tracker.record(CostStage::Claims, &usage(5, 3));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let report = tracker.snapshot();
        assert_eq!(report.total_calls, 1600);
        assert_eq!(report.total_prompt_tokens, 8000);
        assert_eq!(report.total_completion_tokens, 4800);
    }
}

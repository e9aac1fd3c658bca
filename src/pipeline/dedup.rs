//! Claim deduplication stage
//!
//! Within each subtopic, near-duplicate claims collapse into one canonical
//! claim carrying the rest as similar claims. A model call proposes
//! clusters when enabled; a deterministic token-overlap pass always runs so
//! the sibling-dissimilarity invariant holds even when the model under-merges.
//! Both signals feed one union-find, making merges transitive. This stage is
//! never pipeline-fatal: model failures degrade to the heuristic.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::gateway::{
    self, CompletionRequest, ModelGateway, NamedSchema, RetryPolicy, strip_code_fences,
};
use crate::model::claims::{Claim, NestingResponse, SimilarClaim};
use crate::model::taxonomy::{Subtopic, Topic};
use crate::pipeline::prompts;
use crate::pipeline::ranking;
use crate::telemetry::{CostStage, CostTracker};

pub struct ClaimDeduplicator {
    gateway: Option<Arc<dyn ModelGateway>>,
    costs: Arc<CostTracker>,
    retry: RetryPolicy,
    threshold: f64,
    temperature: f32,
}

#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// Claims demoted under a canonical claim
    pub merges: usize,
    pub llm_calls: usize,
    pub heuristic_fallbacks: usize,
    pub warnings: Vec<String>,
}

impl DedupOutcome {
    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

impl ClaimDeduplicator {
    pub fn new(
        gateway: Option<Arc<dyn ModelGateway>>,
        costs: Arc<CostTracker>,
        retry: RetryPolicy,
        threshold: f64,
        temperature: f32,
    ) -> Self {
        Self {
            gateway,
            costs,
            retry,
            threshold,
            temperature,
        }
    }

    pub async fn dedup(&self, topics: &mut [Topic]) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();

        for topic in topics.iter_mut() {
            for subtopic in topic.subtopics.iter_mut() {
                self.dedup_subtopic(subtopic, &mut outcome).await;
            }
        }

        tracing::info!(
            merges = outcome.merges,
            llm_calls = outcome.llm_calls,
            heuristic_fallbacks = outcome.heuristic_fallbacks,
            "Deduplication complete"
        );
        outcome
    }

    async fn dedup_subtopic(&self, subtopic: &mut Subtopic, outcome: &mut DedupOutcome) {
        let n = subtopic.claims.len();
        if n < 2 {
            return;
        }

        let mut clusters = DisjointSet::new(n);

        if let Some(gateway) = &self.gateway {
            match self
                .cluster_with_model(gateway.as_ref(), &subtopic.claims, outcome)
                .await
            {
                Ok(pairs) => {
                    outcome.llm_calls += 1;
                    for (a, b) in pairs {
                        clusters.union(a, b);
                    }
                }
                Err(e) => {
                    outcome.heuristic_fallbacks += 1;
                    outcome.warn(format!(
                        "duplicate clustering call failed for subtopic '{}', using heuristic only: {}",
                        subtopic.title, e
                    ));
                }
            }
        }

        // Deterministic pass: guarantees no two surviving siblings stay at or
        // above the threshold regardless of what the model returned.
        for i in 0..n {
            for j in (i + 1)..n {
                if similarity(&subtopic.claims[i], &subtopic.claims[j]) >= self.threshold {
                    clusters.union(i, j);
                }
            }
        }

        let claims = std::mem::take(&mut subtopic.claims);
        let (merged, merges) = merge_clusters(claims, &mut clusters);
        subtopic.claims = merged;
        outcome.merges += merges;

        if merges > 0 {
            tracing::debug!(
                subtopic = %subtopic.title,
                merges = merges,
                remaining = subtopic.claims.len(),
                "Merged duplicate claims"
            );
            ranking::number_claims(subtopic);
        }
    }

    /// Ask the model for nesting assignments over the subtopic's claims.
    async fn cluster_with_model(
        &self,
        gateway: &dyn ModelGateway,
        claims: &[Claim],
        outcome: &mut DedupOutcome,
    ) -> Result<Vec<(usize, usize)>, String> {
        let titles: Vec<String> = claims.iter().map(|c| c.title.clone()).collect();
        let request = CompletionRequest::new(
            prompts::SYSTEM_PROMPT,
            prompts::build_dedup_prompt(&titles),
        )
        .with_schema(NamedSchema::of::<NestingResponse>("nesting"))
        .with_temperature(self.temperature);

        let completion = gateway::complete_with_retry(gateway, request, &self.retry)
            .await
            .map_err(|e| e.to_string())?;
        self.costs.record(CostStage::Dedup, &completion.usage);

        let response: NestingResponse =
            serde_json::from_str(strip_code_fences(&completion.content))
                .map_err(|e| format!("response is not valid nesting JSON: {}", e))?;

        if !response.has_duplicates() {
            return Ok(Vec::new());
        }

        let mut pairs = Vec::new();
        for (canonical_key, nested_keys) in &response.nesting {
            let Some(canonical) = parse_claim_id(canonical_key, claims.len()) else {
                outcome.warn(format!(
                    "ignoring unrecognized claim id '{}' in nesting response",
                    canonical_key
                ));
                continue;
            };
            for nested_key in nested_keys {
                let Some(nested) = parse_claim_id(nested_key, claims.len()) else {
                    outcome.warn(format!(
                        "ignoring unrecognized claim id '{}' in nesting response",
                        nested_key
                    ));
                    continue;
                };
                pairs.push((canonical, nested));
            }
        }
        Ok(pairs)
    }
}

/// Token-overlap (Jaccard) similarity over a claim's title and quote texts.
pub(crate) fn similarity(a: &Claim, b: &Claim) -> f64 {
    let tokens_a = claim_tokens(a);
    let tokens_b = claim_tokens(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    intersection as f64 / union as f64
}

fn claim_tokens(claim: &Claim) -> HashSet<String> {
    let mut text = claim.title.clone();
    for quote in &claim.quotes {
        text.push(' ');
        text.push_str(&quote.text);
    }
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// `claimId<N>` labels refer to 0-based prompt order.
fn parse_claim_id(key: &str, claim_count: usize) -> Option<usize> {
    let index: usize = key.trim().strip_prefix("claimId")?.parse().ok()?;
    (index < claim_count).then_some(index)
}

/// Collapse each union-find cluster into its canonical claim. Canonical
/// choice: most quotes, ties by earliest pre-merge rank. Returns the reduced
/// claim list (canonical claims in their original relative order) and how
/// many claims were demoted.
fn merge_clusters(claims: Vec<Claim>, clusters: &mut DisjointSet) -> (Vec<Claim>, usize) {
    let n = claims.len();
    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        members.entry(clusters.find(i)).or_default().push(i);
    }

    let mut canonical_of_cluster: BTreeMap<usize, usize> = BTreeMap::new();
    for (&root, indices) in &members {
        let canonical = indices
            .iter()
            .copied()
            .max_by(|&a, &b| {
                claims[a]
                    .quotes
                    .len()
                    .cmp(&claims[b].quotes.len())
                    // Earlier rank wins ties; indices are in rank order
                    .then(b.cmp(&a))
            })
            .unwrap_or(root);
        canonical_of_cluster.insert(root, canonical);
    }

    let mut slots: Vec<Option<Claim>> = claims.into_iter().map(Some).collect();
    let mut merged = Vec::new();
    let mut merges = 0;

    for i in 0..n {
        let root = clusters.find(i);
        let canonical = canonical_of_cluster[&root];
        if i != canonical {
            continue;
        }

        let Some(mut claim) = slots[canonical].take() else {
            continue;
        };
        for &member_idx in &members[&root] {
            if member_idx == canonical {
                continue;
            }
            let Some(mut member) = slots[member_idx].take() else {
                continue;
            };
            // Flatten any nesting the member already carried (depth-1 cap)
            claim.similar_claims.append(&mut member.similar_claims);
            claim.similar_claims.push(SimilarClaim::from(member));
            merges += 1;
        }
        for (position, similar) in claim.similar_claims.iter_mut().enumerate() {
            similar.number = (position + 1) as u32;
        }
        merged.push(claim);
    }

    (merged, merges)
}

/// Union-find with path halving; just enough for per-subtopic clustering.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Attach the larger root under the smaller to keep cluster roots
            // at the earliest member
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high] = low;
        }
    }
}

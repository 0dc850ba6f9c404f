use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::Negotiation;

/// Pipeline totals derived from a snapshot of negotiations.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub total: usize,
    pub by_stage: BTreeMap<String, usize>,
    pub total_value: f64,
    /// Mean probability; 0 for an empty snapshot.
    pub average_probability: f64,
    /// Sum of `estimated_value * probability / 100`.
    pub weighted_value: f64,
}

/// Single pass over `negotiations`. Nothing is cached between calls.
pub fn compute_stats(negotiations: &[Negotiation]) -> PipelineStats {
    let mut stats = PipelineStats::default();
    let mut probability_sum = 0_u64;
    for negotiation in negotiations {
        stats.total += 1;
        *stats
            .by_stage
            .entry(negotiation.current_stage.clone())
            .or_default() += 1;
        stats.total_value += negotiation.estimated_value;
        stats.weighted_value +=
            negotiation.estimated_value * f64::from(negotiation.probability) / 100.0;
        probability_sum += u64::from(negotiation.probability);
    }
    if stats.total > 0 {
        stats.average_probability = probability_sum as f64 / stats.total as f64;
    }
    stats
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-phase cost/token accounting, pulled out of a `result` chunk and
//! accumulated across a task's worker/verifier/summarizer phases
//! (`SPEC_FULL.md` §4.6).

use crate::event::ResultChunk;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenStats {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_creation: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub duration_api_ms: u64,
    pub num_turns: u64,
    pub session_id: String,
    pub is_error: bool,
    pub tokens: TokenStats,
    pub model_usage: HashMap<String, ModelStats>,
}

/// Normalizes a `result` chunk's raw field names into `PhaseStats`. Every
/// field defaults rather than failing if the chunk omits it.
pub fn extract_phase_stats(chunk: &ResultChunk) -> PhaseStats {
    PhaseStats {
        cost_usd: chunk.total_cost_usd,
        duration_ms: chunk.duration_ms,
        duration_api_ms: chunk.duration_api_ms,
        num_turns: chunk.num_turns,
        session_id: chunk.session_id.clone(),
        is_error: chunk.is_error,
        tokens: TokenStats {
            input: chunk.usage.input_tokens,
            output: chunk.usage.output_tokens,
            cache_read: chunk.usage.cache_read_input_tokens,
            cache_creation: chunk.usage.cache_creation_input_tokens,
        },
        model_usage: chunk
            .model_usage
            .iter()
            .map(|(model, usage)| {
                (
                    model.clone(),
                    ModelStats {
                        cost_usd: usage.cost_usd,
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                    },
                )
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccumulatedStats {
    pub total_cost_usd: f64,
    pub total_duration_ms: u64,
    pub total_api_duration_ms: u64,
    pub total_turns: u64,
    pub tokens: TokenStats,
    pub model_usage: HashMap<String, ModelStats>,
}

/// Folds one phase's stats into the running total across a task's iterations.
pub fn merge_phase_stats(accumulated: &mut AccumulatedStats, stats: &PhaseStats) {
    accumulated.total_cost_usd += stats.cost_usd;
    accumulated.total_duration_ms += stats.duration_ms;
    accumulated.total_api_duration_ms += stats.duration_api_ms;
    accumulated.total_turns += stats.num_turns;
    accumulated.tokens.input += stats.tokens.input;
    accumulated.tokens.output += stats.tokens.output;
    accumulated.tokens.cache_read += stats.tokens.cache_read;
    accumulated.tokens.cache_creation += stats.tokens.cache_creation;

    for (model, usage) in &stats.model_usage {
        let entry = accumulated.model_usage.entry(model.clone()).or_default();
        entry.cost_usd += usage.cost_usd;
        entry.input_tokens += usage.input_tokens;
        entry.output_tokens += usage.output_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ModelUsage, Usage};

    fn chunk() -> ResultChunk {
        ResultChunk {
            is_error: false,
            result: "done".to_string(),
            session_id: "s1".to_string(),
            total_cost_usd: 0.25,
            duration_ms: 1000,
            duration_api_ms: 800,
            num_turns: 2,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 20,
                cache_read_input_tokens: 5,
                cache_creation_input_tokens: 1,
            },
            model_usage: HashMap::from([(
                "model-a".to_string(),
                ModelUsage {
                    cost_usd: 0.25,
                    input_tokens: 10,
                    output_tokens: 20,
                },
            )]),
        }
    }

    #[test]
    fn extracts_flat_fields_from_a_result_chunk() {
        let stats = extract_phase_stats(&chunk());
        assert_eq!(stats.cost_usd, 0.25);
        assert_eq!(stats.tokens.input, 10);
        assert_eq!(stats.model_usage.len(), 1);
    }

    #[test]
    fn merge_sums_across_two_phases() {
        let mut acc = AccumulatedStats::default();
        let stats = extract_phase_stats(&chunk());
        merge_phase_stats(&mut acc, &stats);
        merge_phase_stats(&mut acc, &stats);
        assert_eq!(acc.total_cost_usd, 0.5);
        assert_eq!(acc.total_turns, 4);
        assert_eq!(acc.tokens.input, 20);
        assert_eq!(acc.model_usage["model-a"].input_tokens, 20);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let stats = extract_phase_stats(&ResultChunk::default());
        assert_eq!(stats.cost_usd, 0.0);
        assert_eq!(stats.tokens.input, 0);
        assert!(stats.model_usage.is_empty());
    }
}

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use healthlog_kernel_contracts::parse::Intent;

use crate::understand::{AcceptanceTier, FallbackUse, Understanding};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentConfidence {
    pub count: u64,
    pub mean_confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub messages: u64,
    pub strict: u64,
    pub lenient: u64,
    pub rescued: u64,
    pub clarify: u64,
    pub fallback_requested: u64,
    pub fallback_cache_hits: u64,
    pub fallback_model_calls: u64,
    pub fallback_no_result: u64,
    pub tokens_dropped: u64,
    pub tokens_unknown: u64,
    pub per_intent: BTreeMap<Intent, IntentConfidence>,
}

impl MetricsSnapshot {
    /// Share of messages for which the gate asked for the model.
    pub fn fallback_rate(&self) -> f64 {
        if self.messages == 0 {
            return 0.0;
        }
        self.fallback_requested as f64 / self.messages as f64
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ConfidenceSum {
    count: u64,
    total: f64,
}

/// Cumulative counters, safe to update from concurrent pipeline calls. Reported
/// externally, never read back by the pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    messages: AtomicU64,
    strict: AtomicU64,
    lenient: AtomicU64,
    rescued: AtomicU64,
    clarify: AtomicU64,
    fallback_requested: AtomicU64,
    fallback_cache_hits: AtomicU64,
    fallback_model_calls: AtomicU64,
    fallback_no_result: AtomicU64,
    tokens_dropped: AtomicU64,
    tokens_unknown: AtomicU64,
    per_intent: Mutex<BTreeMap<Intent, ConfidenceSum>>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, u: &Understanding) {
        bump(&self.messages, 1);
        bump(
            match u.tier {
                AcceptanceTier::Strict => &self.strict,
                AcceptanceTier::Lenient => &self.lenient,
                AcceptanceTier::Rescued => &self.rescued,
                AcceptanceTier::Clarify => &self.clarify,
            },
            1,
        );
        if u.fallback != FallbackUse::NotNeeded {
            bump(&self.fallback_requested, 1);
        }
        match u.fallback {
            FallbackUse::CacheHit => bump(&self.fallback_cache_hits, 1),
            FallbackUse::ModelCall => bump(&self.fallback_model_calls, 1),
            FallbackUse::NoResult => bump(&self.fallback_no_result, 1),
            FallbackUse::NotNeeded | FallbackUse::Disabled => {}
        }
        bump(&self.tokens_dropped, u.notes.dropped.len() as u64);
        bump(&self.tokens_unknown, u.notes.unknown.len() as u64);

        let mut per_intent = self.per_intent.lock();
        let stats = per_intent.entry(u.result.intent).or_default();
        stats.count += 1;
        stats.total += f64::from(u.result.confidence);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let per_intent = self
            .per_intent
            .lock()
            .iter()
            .map(|(intent, s)| {
                let mean = if s.count == 0 {
                    0.0
                } else {
                    s.total / s.count as f64
                };
                (
                    *intent,
                    IntentConfidence {
                        count: s.count,
                        mean_confidence: mean,
                    },
                )
            })
            .collect();
        MetricsSnapshot {
            messages: load(&self.messages),
            strict: load(&self.strict),
            lenient: load(&self.lenient),
            rescued: load(&self.rescued),
            clarify: load(&self.clarify),
            fallback_requested: load(&self.fallback_requested),
            fallback_cache_hits: load(&self.fallback_cache_hits),
            fallback_model_calls: load(&self.fallback_model_calls),
            fallback_no_result: load(&self.fallback_no_result),
            tokens_dropped: load(&self.tokens_dropped),
            tokens_unknown: load(&self.tokens_unknown),
            per_intent,
        }
    }
}

fn bump(counter: &AtomicU64, n: u64) {
    if n > 0 {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_metrics_01_empty_snapshot() {
        let m = PipelineMetrics::new();
        let s = m.snapshot();
        assert_eq!(s, MetricsSnapshot::default());
        assert_eq!(s.fallback_rate(), 0.0);
    }

    #[test]
    fn at_metrics_02_snapshot_serializes_intents_as_keys() {
        let mut s = MetricsSnapshot {
            messages: 4,
            fallback_requested: 1,
            ..MetricsSnapshot::default()
        };
        s.per_intent.insert(
            Intent::Food,
            IntentConfidence {
                count: 2,
                mean_confidence: 0.65,
            },
        );
        assert_eq!(s.fallback_rate(), 0.25);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["per_intent"]["food"]["count"], 2);
    }
}

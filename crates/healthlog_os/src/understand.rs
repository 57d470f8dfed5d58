#![forbid(unsafe_code)]

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use healthlog_engines::cache::ExtractionCache;
use healthlog_engines::canon::{canonicalize, CanonicalNotes};
use healthlog_engines::disambig::Disambiguator;
use healthlog_engines::gate::{FallbackDecision, FallbackGate};
use healthlog_engines::merge::merge;
use healthlog_engines::model_adapter::{
    ModelAdapter, ModelErrorKind, ModelOutcome, OpenAiChatTransport,
};
use healthlog_engines::ontology::normalize_text;
use healthlog_engines::rules::RulesParser;
use healthlog_kernel_contracts::parse::{Intent, ParseContext, ParseResult};

use crate::config::PipelineConfig;
use crate::learned::{apply_learned, LearnedPhraseLookup, NoLearnedPhrases};
use crate::metrics::PipelineMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceTier {
    /// Rules alone, gate not triggered.
    Strict,
    /// Gate triggered but nothing came back; the rules result stands.
    Lenient,
    /// The model or intent re-resolution decided the outcome.
    Rescued,
    /// Final intent is `other`; the caller asks a clarifying question.
    Clarify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackUse {
    NotNeeded,
    Disabled,
    CacheHit,
    ModelCall,
    NoResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Understanding {
    pub result: ParseResult,
    pub notes: CanonicalNotes,
    pub tier: AcceptanceTier,
    pub fallback: FallbackUse,
    pub learned_applied: bool,
}

impl Understanding {
    pub fn needs_clarification(&self) -> bool {
        self.tier == AcceptanceTier::Clarify
    }
}

/// The bounded external extraction step, as seen by the pipeline.
pub trait ModelExtractor: Send + Sync {
    fn extract(&self, normalized_text: &str) -> ModelOutcome;
}

impl ModelExtractor for ModelAdapter {
    fn extract(&self, normalized_text: &str) -> ModelOutcome {
        ModelAdapter::extract(self, normalized_text)
    }
}

/// Stand-in used when no model is configured. Always answers no result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModel;

impl ModelExtractor for NoModel {
    fn extract(&self, _normalized_text: &str) -> ModelOutcome {
        ModelOutcome::NoResult(ModelErrorKind::Config)
    }
}

#[derive(Debug)]
pub struct UnderstandingPipeline<M, L>
where
    M: ModelExtractor,
    L: LearnedPhraseLookup,
{
    config: PipelineConfig,
    rules: RulesParser,
    disambiguator: Disambiguator,
    gate: FallbackGate,
    model: M,
    learned: L,
    metrics: PipelineMetrics,
}

impl UnderstandingPipeline<ModelAdapter, NoLearnedPhrases> {
    /// Pipeline backed by the chat-completions transport described by `config.provider`.
    pub fn with_provider(config: PipelineConfig) -> Self {
        let transport = Arc::new(OpenAiChatTransport::new(config.provider.clone()));
        let cache = Arc::new(ExtractionCache::new(config.cache));
        let adapter = ModelAdapter::new(config.adapter, transport, cache);
        Self::new(config, adapter, NoLearnedPhrases)
    }
}

impl<M, L> UnderstandingPipeline<M, L>
where
    M: ModelExtractor,
    L: LearnedPhraseLookup,
{
    pub fn new(config: PipelineConfig, model: M, learned: L) -> Self {
        Self {
            rules: RulesParser::new(config.rules),
            disambiguator: Disambiguator::new(config.disambiguator),
            gate: FallbackGate::new(config.gate),
            config,
            model,
            learned,
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Rules, learned override, gate, optional model, merge, disambiguation, notes.
    /// Never fails; the worst outcome is a clarification request.
    pub fn understand(&self, text: &str, ctx: &ParseContext) -> Understanding {
        let normalized = normalize_text(text);
        let mut current = self.rules.parse(text, ctx);

        let mut learned_applied = false;
        if let Some(user_id) = ctx.user_id.as_deref() {
            if let Some(phrase) = self.learned.lookup(user_id, &normalized) {
                current = apply_learned(&current, &phrase);
                learned_applied = true;
            }
        }

        let decision = self.gate.decide(&current);
        let (merged, fallback, model_contributed) = match &decision {
            FallbackDecision::NotNeeded(_) => (current, FallbackUse::NotNeeded, false),
            FallbackDecision::Escalate(_) if !self.config.fallback_enabled => {
                (current, FallbackUse::Disabled, false)
            }
            FallbackDecision::Escalate(_) => {
                let outcome = self.model.extract(&normalized);
                let fallback = match &outcome {
                    ModelOutcome::CacheHit(_) => FallbackUse::CacheHit,
                    ModelOutcome::Fresh(_) => FallbackUse::ModelCall,
                    ModelOutcome::NoResult(_) => FallbackUse::NoResult,
                };
                let merged = merge(&current, outcome.extraction());
                (merged.result, fallback, merged.model_contributed)
            }
        };

        let disambiguated = self.disambiguator.disambiguate(&merged, &normalized, ctx);
        let result = disambiguated.result;
        let notes = canonicalize(&result);

        let tier = if result.intent == Intent::Other {
            AcceptanceTier::Clarify
        } else if model_contributed || disambiguated.rescued {
            AcceptanceTier::Rescued
        } else if decision.should_escalate() {
            AcceptanceTier::Lenient
        } else {
            AcceptanceTier::Strict
        };

        debug!(
            input_chars = text.chars().count(),
            intent = %result.intent,
            confidence = result.confidence,
            tier = ?tier,
            fallback = ?fallback,
            learned_applied,
            "message understood"
        );

        let understanding = Understanding {
            result,
            notes,
            tier,
            fallback,
            learned_applied,
        };
        self.metrics.record(&understanding);
        understanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::NaiveDate;
    use healthlog_kernel_contracts::model::ModelExtraction;
    use healthlog_kernel_contracts::parse::{SlotKey, SlotValue};

    struct StubModel {
        outcome: ModelOutcome,
        calls: AtomicUsize,
    }

    impl StubModel {
        fn new(outcome: ModelOutcome) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ModelExtractor for StubModel {
        fn extract(&self, _normalized_text: &str) -> ModelOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn ctx() -> ParseContext {
        ParseContext::at(
            NaiveDate::from_ymd_opt(2026, 3, 14)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        )
    }

    fn pipeline(model: StubModel) -> UnderstandingPipeline<StubModel, NoLearnedPhrases> {
        UnderstandingPipeline::new(PipelineConfig::mvp_v1(true), model, NoLearnedPhrases)
    }

    #[test]
    fn at_understand_01_confident_rules_skip_the_model() {
        let p = pipeline(StubModel::new(ModelOutcome::NoResult(ModelErrorKind::Timeout)));
        let u = p.understand("bm bristol 4", &ctx());
        assert_eq!(u.tier, AcceptanceTier::Strict);
        assert_eq!(u.fallback, FallbackUse::NotNeeded);
        assert_eq!(p.model.calls.load(Ordering::SeqCst), 0);
        assert_eq!(u.notes.rendered, "notes_v=1; intent=bm; bristol=4");
    }

    #[test]
    fn at_understand_02_model_failure_is_lenient() {
        let p = pipeline(StubModel::new(ModelOutcome::NoResult(ModelErrorKind::Timeout)));
        let u = p.understand("stomach pain", &ctx());
        assert_eq!(u.fallback, FallbackUse::NoResult);
        assert_eq!(u.tier, AcceptanceTier::Lenient);
        assert_eq!(u.result.intent, Intent::Symptom);
        assert_eq!(u.result.missing, vec![SlotKey::Severity]);
    }

    #[test]
    fn at_understand_03_model_rescues_gibberish() {
        let extraction = ModelExtraction {
            intent: Intent::Food,
            slots: BTreeMap::from([(SlotKey::Item, SlotValue::text("pho"))]),
            confidence: Some(0.7),
            missing: vec![],
        };
        let p = pipeline(StubModel::new(ModelOutcome::Fresh(extraction)));
        let u = p.understand("fo bo", &ctx());
        assert_eq!(u.fallback, FallbackUse::ModelCall);
        assert_eq!(u.tier, AcceptanceTier::Rescued);
        assert_eq!(u.result.intent, Intent::Food);
        assert!(u.notes.line.get("via_model").is_some());
    }

    #[test]
    fn at_understand_04_disabled_fallback_never_calls_model() {
        let p = UnderstandingPipeline::new(
            PipelineConfig::mvp_v1(false),
            StubModel::new(ModelOutcome::NoResult(ModelErrorKind::Config)),
            NoLearnedPhrases,
        );
        let u = p.understand("asdkj qwe", &ctx());
        assert_eq!(u.fallback, FallbackUse::Disabled);
        assert_eq!(u.tier, AcceptanceTier::Clarify);
        assert!(u.needs_clarification());
        assert_eq!(p.model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn at_understand_05_metrics_follow_outcomes() {
        let p = pipeline(StubModel::new(ModelOutcome::NoResult(ModelErrorKind::Schema)));
        p.understand("bm bristol 4", &ctx());
        p.understand("stomach pain", &ctx());
        p.understand("asdkj qwe", &ctx());
        let s = p.metrics().snapshot();
        assert_eq!(s.messages, 3);
        assert_eq!(s.strict, 1);
        assert_eq!(s.lenient, 1);
        assert_eq!(s.clarify, 1);
        assert_eq!(s.fallback_requested, 2);
        assert_eq!(s.fallback_no_result, 2);
        assert_eq!(s.per_intent[&Intent::Bm].count, 1);
        assert!((s.fallback_rate() - 2.0 / 3.0).abs() < 1e-9);
    }
}

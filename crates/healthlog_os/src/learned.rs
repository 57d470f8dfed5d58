#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use healthlog_engines::disambig::resolve_conflicts;
use healthlog_engines::merge::reconcile_missing;
use healthlog_engines::ontology::normalize_text;
use healthlog_kernel_contracts::parse::{
    clamp_bristol, clamp_severity, Intent, ParseResult, Provenance, Slot, SlotKey, SlotMap,
    SlotValue,
};

/// A per-user phrase the user has taught the system, e.g. "the usual".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPhrase {
    pub intent: Intent,
    pub slots: BTreeMap<SlotKey, SlotValue>,
    pub confidence: f32,
}

pub trait LearnedPhraseLookup: Send + Sync {
    fn lookup(&self, user_id: &str, normalized_text: &str) -> Option<LearnedPhrase>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoLearnedPhrases;

impl LearnedPhraseLookup for NoLearnedPhrases {
    fn lookup(&self, _user_id: &str, _normalized_text: &str) -> Option<LearnedPhrase> {
        None
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLearnedPhrases {
    entries: DashMap<(String, String), LearnedPhrase>,
}

impl InMemoryLearnedPhrases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn learn(&self, user_id: &str, text: &str, phrase: LearnedPhrase) {
        self.entries
            .insert((user_id.to_string(), normalize_text(text)), phrase);
    }

    pub fn forget(&self, user_id: &str, text: &str) -> bool {
        self.entries
            .remove(&(user_id.to_string(), normalize_text(text)))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LearnedPhraseLookup for InMemoryLearnedPhrases {
    fn lookup(&self, user_id: &str, normalized_text: &str) -> Option<LearnedPhrase> {
        self.entries
            .get(&(user_id.to_string(), normalized_text.to_string()))
            .map(|e| e.value().clone())
    }
}

impl<T: LearnedPhraseLookup + ?Sized> LearnedPhraseLookup for std::sync::Arc<T> {
    fn lookup(&self, user_id: &str, normalized_text: &str) -> Option<LearnedPhrase> {
        (**self).lookup(user_id, normalized_text)
    }
}

/// Learned phrase as a candidate parse. Slots carry `learned` provenance and numeric
/// ranges are clamped; `None` if the phrase cannot form a valid result.
pub fn learned_candidate(phrase: &LearnedPhrase) -> Option<ParseResult> {
    let mut slots = SlotMap::new();
    for (key, value) in &phrase.slots {
        if *key == SlotKey::ClarificationNeeded || value.is_blank() {
            continue;
        }
        let value = match (key, value) {
            (SlotKey::Severity, SlotValue::Int(v)) => SlotValue::Int(clamp_severity(*v)),
            (SlotKey::Bristol, SlotValue::Int(v)) => SlotValue::Int(clamp_bristol(*v)),
            _ => value.clone(),
        };
        slots.insert(key.clone(), Slot::new(value, Provenance::Learned));
    }
    let confidence = if phrase.confidence.is_finite() {
        phrase.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let missing = reconcile_missing(phrase.intent, &slots, &[]);
    ParseResult::v1(phrase.intent, confidence, slots, missing).ok()
}

/// Rules result and learned phrase compete; the winner keeps every slot of the loser
/// it lacks and takes the higher confidence of the two.
pub fn apply_learned(rules: &ParseResult, phrase: &LearnedPhrase) -> ParseResult {
    let Some(learned) = learned_candidate(phrase) else {
        debug!("learned phrase unusable, keeping rules result");
        return rules.clone();
    };
    let confidence = rules.confidence.max(learned.confidence);
    let Some(winner) = resolve_conflicts(vec![rules.clone(), learned.clone()]) else {
        return rules.clone();
    };
    let loser = if winner == learned { rules } else { &learned };

    let mut slots = winner.slots.clone();
    for (key, slot) in &loser.slots {
        slots.entry(key.clone()).or_insert_with(|| slot.clone());
    }
    let prior: Vec<SlotKey> = winner.missing.clone();
    let missing = reconcile_missing(winner.intent, &slots, &prior);
    match ParseResult::v1(winner.intent, confidence, slots, missing) {
        Ok(r) => {
            debug!(intent = %r.intent, confidence = r.confidence, "learned phrase applied");
            r
        }
        Err(violation) => {
            debug!(%violation, "learned merge invalid, keeping winner");
            winner
        }
    }
}

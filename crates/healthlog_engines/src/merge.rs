#![forbid(unsafe_code)]

use tracing::debug;

use healthlog_kernel_contracts::model::ModelExtraction;
use healthlog_kernel_contracts::parse::{
    clamp_bristol, clamp_severity, Intent, ParseResult, Provenance, Slot, SlotKey, SlotMap,
    SlotValue,
};

/// Floor applied when the model filled a critical slot of the final intent.
pub const CRITICAL_FILL_CONFIDENCE: f32 = 0.85;
/// Used when the model supplies the intent but no confidence of its own.
pub const MODEL_DEFAULT_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub result: ParseResult,
    /// True when the model supplied the intent or a critical slot.
    pub model_contributed: bool,
}

/// Combines the rules result with an optional model extraction. Rules win every slot
/// conflict; confidence never drops below the rules confidence.
pub fn merge(rules: &ParseResult, model: Option<&ModelExtraction>) -> MergeOutcome {
    let Some(model) = model else {
        return MergeOutcome {
            result: rules.clone(),
            model_contributed: false,
        };
    };

    let intent_from_model = rules.intent == Intent::Other && model.intent != Intent::Other;
    let intent = if intent_from_model {
        model.intent
    } else {
        rules.intent
    };

    let mut slots = SlotMap::new();
    for (key, value) in &model.slots {
        if *key == SlotKey::ClarificationNeeded || value.is_blank() {
            continue;
        }
        let value = match (key, value) {
            (SlotKey::Severity, SlotValue::Int(v)) => SlotValue::Int(clamp_severity(*v)),
            (SlotKey::Bristol, SlotValue::Int(v)) => SlotValue::Int(clamp_bristol(*v)),
            _ => value.clone(),
        };
        slots.insert(key.clone(), Slot::new(value, Provenance::Model));
    }
    for (key, slot) in &rules.slots {
        if !slot.value.is_blank() {
            slots.insert(key.clone(), slot.clone());
        }
    }

    let mut confidence = rules.confidence;
    if intent_from_model {
        let model_conf = model.confidence.unwrap_or(MODEL_DEFAULT_CONFIDENCE);
        confidence = confidence.max(model_conf);
    }

    let filled_critical = intent.critical_slots().iter().any(|k| {
        slots
            .get(k)
            .is_some_and(|s| s.provenance == Provenance::Model)
    });
    if filled_critical {
        confidence = confidence.max(CRITICAL_FILL_CONFIDENCE);
    }

    let prior: Vec<SlotKey> = rules
        .missing
        .iter()
        .chain(model.missing.iter())
        .cloned()
        .collect();
    let missing = reconcile_missing(intent, &slots, &prior);

    let merged = ParseResult::v1(intent, confidence.clamp(0.0, 1.0), slots, missing);
    match merged {
        Ok(result) => {
            debug!(
                intent = %result.intent,
                confidence = result.confidence,
                intent_from_model,
                filled_critical,
                "merged rules and model extraction"
            );
            MergeOutcome {
                result,
                model_contributed: intent_from_model || filled_critical,
            }
        }
        Err(violation) => {
            debug!(%violation, "merged result invalid, keeping rules result");
            MergeOutcome {
                result: rules.clone(),
                model_contributed: false,
            }
        }
    }
}

/// Missing set for `intent` given the slots now filled: prior entries still absent,
/// plus absent critical slots. `clarification_needed` survives only on `other`.
pub fn reconcile_missing(intent: Intent, slots: &SlotMap, prior: &[SlotKey]) -> Vec<SlotKey> {
    let filled = |k: &SlotKey| slots.get(k).is_some_and(|s| !s.value.is_blank());
    let mut missing: Vec<SlotKey> = Vec::new();
    for key in prior.iter().chain(intent.critical_slots().iter()) {
        if filled(key) || missing.contains(key) {
            continue;
        }
        if *key == SlotKey::ClarificationNeeded && intent != Intent::Other {
            continue;
        }
        missing.push(key.clone());
    }
    if intent == Intent::Other && !missing.contains(&SlotKey::ClarificationNeeded) {
        missing.push(SlotKey::ClarificationNeeded);
    }
    missing
}

#![forbid(unsafe_code)]

use std::cmp::Ordering;

use tracing::debug;

use healthlog_kernel_contracts::parse::{
    clamp_bristol, clamp_severity, Intent, ParseContext, ParseResult, Provenance, Slot, SlotKey,
    SlotMap, SlotValue,
};

use crate::merge::reconcile_missing;
use crate::ontology::{
    bristol_for_descriptor, contains_any, contains_phrase, extract_severity_from_adjectives,
    find_synonym_group, is_drink_word, is_food_word, mentions_drink, mentions_food,
    normalize_text, BOWEL_DESCRIPTORS, MEAL_WINDOWS, REFLUX_KEYWORDS,
};
use crate::timeparse::meal_window_for_hour;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisambiguatorConfig {
    /// Intent is re-resolved from slot evidence below this confidence.
    pub reresolve_below: f32,
    /// Confidence floor given to a re-resolved intent.
    pub rescued_floor: f32,
    /// Severity assumed when a severity slot carries no usable signal.
    pub default_severity: i64,
}

impl DisambiguatorConfig {
    pub fn mvp_v1() -> Self {
        Self {
            reresolve_below: 0.7,
            rescued_floor: 0.6,
            default_severity: 5,
        }
    }
}

/// Tie-break policy for items that are routinely logged as either food or drink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbiguousItemPolicy {
    pub item: &'static str,
    pub default: Intent,
    pub alternate: Intent,
    pub alternate_when: &'static [&'static str],
    pub consult_recent: bool,
}

pub const AMBIGUOUS_ITEMS: &[AmbiguousItemPolicy] = &[
    // Coffee stays a drink whatever surrounds it.
    AmbiguousItemPolicy {
        item: "coffee",
        default: Intent::Drink,
        alternate: Intent::Drink,
        alternate_when: &[],
        consult_recent: false,
    },
    AmbiguousItemPolicy {
        item: "soup",
        default: Intent::Food,
        alternate: Intent::Drink,
        alternate_when: &["sipped", "cup of", "mug of", "broth"],
        consult_recent: true,
    },
    AmbiguousItemPolicy {
        item: "smoothie",
        default: Intent::Drink,
        alternate: Intent::Food,
        alternate_when: &["bowl"],
        consult_recent: true,
    },
    AmbiguousItemPolicy {
        item: "milk",
        default: Intent::Drink,
        alternate: Intent::Food,
        alternate_when: &["cereal", "oats", "porridge", "granola"],
        consult_recent: true,
    },
];

/// Loose meal phrases, checked in order. `brunch` is resolved by hour separately.
const MEAL_PHRASES: &[(&str, &str)] = &[
    ("late night", "snack"),
    ("midnight", "snack"),
    ("morning", "breakfast"),
    ("early", "breakfast"),
    ("midday", "lunch"),
    ("noon", "lunch"),
    ("afternoon", "lunch"),
    ("evening", "dinner"),
    ("tonight", "dinner"),
    ("night", "dinner"),
];

const BRUNCH_CUTOFF_HOUR: u32 = 11;

#[derive(Debug, Clone, PartialEq)]
pub struct Disambiguation {
    pub result: ParseResult,
    /// True when the intent was re-resolved away from the incoming one.
    pub rescued: bool,
}

#[derive(Debug, Clone)]
pub struct Disambiguator {
    config: DisambiguatorConfig,
}

impl Disambiguator {
    pub fn new(config: DisambiguatorConfig) -> Self {
        Self { config }
    }

    pub fn needs_intent_resolution(&self, result: &ParseResult) -> bool {
        result.intent == Intent::Other || result.confidence < self.config.reresolve_below
    }

    /// Slot normalization always runs. Item reclassification runs for food and drink.
    /// Intent re-resolution runs only for `other` or low-confidence results. The
    /// returned confidence is never below the incoming one.
    pub fn disambiguate(
        &self,
        result: &ParseResult,
        normalized_text: &str,
        ctx: &ParseContext,
    ) -> Disambiguation {
        let slots = self.normalize_slots(&result.slots, ctx.hour());
        let mut intent = result.intent;
        let mut confidence = result.confidence;
        let mut rescued = false;

        if intent.is_intake() {
            if let Some(item) = slots.get(&SlotKey::Item).and_then(|s| s.value.as_text()) {
                if let Some(resolved) = resolve_item_intent(item, normalized_text, ctx) {
                    if resolved != intent {
                        debug!(from = %intent, to = %resolved, "item reclassified intent");
                        intent = resolved;
                    }
                }
            }
        }

        if self.needs_intent_resolution(result) {
            if let Some(resolved) = resolve_intent(&slots, normalized_text, ctx) {
                if resolved != intent {
                    debug!(from = %intent, to = %resolved, "intent re-resolved from slots");
                    intent = resolved;
                    confidence = confidence.max(self.config.rescued_floor);
                    rescued = true;
                }
            }
        }

        let missing = reconcile_missing(intent, &slots, &result.missing);
        match ParseResult::v1(intent, confidence.max(result.confidence), slots, missing) {
            Ok(result) => Disambiguation { result, rescued },
            Err(violation) => {
                debug!(%violation, "disambiguated result invalid, keeping input");
                Disambiguation {
                    result: result.clone(),
                    rescued: false,
                }
            }
        }
    }

    /// Word table first, then the first number in the text, then the configured default.
    pub fn normalize_severity(&self, value: &SlotValue) -> i64 {
        match value {
            SlotValue::Int(v) => clamp_severity(*v),
            SlotValue::Text(t) => {
                let t = normalize_text(t);
                extract_severity_from_adjectives(&t)
                    .or_else(|| first_integer(&t))
                    .map(clamp_severity)
                    .unwrap_or(self.config.default_severity)
            }
        }
    }

    fn normalize_slots(&self, slots: &SlotMap, hour: u32) -> SlotMap {
        let mut out = SlotMap::new();
        for (key, slot) in slots {
            if slot.value.is_blank() {
                continue;
            }
            let normalized = match key {
                SlotKey::Severity => Some(Slot::new(
                    SlotValue::Int(self.normalize_severity(&slot.value)),
                    slot.provenance,
                )),
                SlotKey::Bristol => normalize_bristol(slot),
                SlotKey::MealTime => {
                    let phrase = slot.value.render();
                    let (label, from_phrase) = normalize_meal_time(&phrase, hour);
                    let provenance = if from_phrase {
                        slot.provenance
                    } else {
                        Provenance::Inferred
                    };
                    Some(Slot::new(SlotValue::text(label), provenance))
                }
                _ => Some(slot.clone()),
            };
            if let Some(s) = normalized {
                out.insert(key.clone(), s);
            }
        }
        out
    }
}

/// Maps a meal phrase to one of the four canonical windows. The flag is false when
/// the phrase carried no meal signal and the hour decided.
pub fn normalize_meal_time(phrase: &str, hour: u32) -> (&'static str, bool) {
    let phrase = normalize_text(phrase);
    if contains_phrase(&phrase, "brunch") {
        let label = if hour < BRUNCH_CUTOFF_HOUR {
            "breakfast"
        } else {
            "lunch"
        };
        return (label, true);
    }
    if let Some(label) = find_synonym_group(&phrase, MEAL_WINDOWS) {
        return (label, true);
    }
    if let Some((_, label)) = MEAL_PHRASES
        .iter()
        .find(|(p, _)| contains_phrase(&phrase, p))
    {
        return (label, true);
    }
    (meal_window_for_hour(hour), false)
}

/// Food or drink for an extracted item. The head word (last recognised word) decides;
/// ambiguous items go through [`AMBIGUOUS_ITEMS`].
pub fn resolve_item_intent(
    item: &str,
    normalized_text: &str,
    ctx: &ParseContext,
) -> Option<Intent> {
    let item = normalize_text(item);
    let words: Vec<&str> = item
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
        .filter(|w| !w.is_empty())
        .collect();

    for word in words.iter().rev() {
        if let Some(policy) = AMBIGUOUS_ITEMS.iter().find(|p| p.item == *word) {
            return Some(apply_policy(policy, normalized_text, ctx));
        }
        if is_food_word(word) {
            return Some(Intent::Food);
        }
        if is_drink_word(word) {
            return Some(Intent::Drink);
        }
    }
    if mentions_drink(&item) {
        return Some(Intent::Drink);
    }
    if mentions_food(&item) {
        return Some(Intent::Food);
    }
    None
}

fn apply_policy(
    policy: &AmbiguousItemPolicy,
    normalized_text: &str,
    ctx: &ParseContext,
) -> Intent {
    if contains_any(normalized_text, policy.alternate_when) {
        return policy.alternate;
    }
    if policy.consult_recent {
        let recent = ctx.recent_items.iter().find(|r| {
            r.intent.is_intake() && contains_phrase(&normalize_text(&r.item), policy.item)
        });
        if let Some(r) = recent {
            return r.intent;
        }
    }
    policy.default
}

/// Intent implied by slot evidence, checked food, drink, symptom, bm.
fn resolve_intent(slots: &SlotMap, normalized_text: &str, ctx: &ParseContext) -> Option<Intent> {
    let item_intent = slots
        .get(&SlotKey::Item)
        .and_then(|s| s.value.as_text())
        .and_then(|item| resolve_item_intent(item, normalized_text, ctx));
    if item_intent == Some(Intent::Food) {
        return Some(Intent::Food);
    }
    if item_intent == Some(Intent::Drink) {
        return Some(Intent::Drink);
    }
    if let Some(symptom) = slots.get(&SlotKey::SymptomType).map(|s| s.value.render()) {
        if contains_any(&normalize_text(&symptom), REFLUX_KEYWORDS) {
            return Some(Intent::Reflux);
        }
        return Some(Intent::Symptom);
    }
    if slots.contains_key(&SlotKey::Severity) {
        return Some(Intent::Symptom);
    }
    if slots.contains_key(&SlotKey::Bristol) {
        return Some(Intent::Bm);
    }
    None
}

fn normalize_bristol(slot: &Slot) -> Option<Slot> {
    match &slot.value {
        SlotValue::Int(v) => Some(Slot::new(SlotValue::Int(clamp_bristol(*v)), slot.provenance)),
        SlotValue::Text(t) => {
            let t = normalize_text(t);
            if let Some(n) = first_integer(&t) {
                return Some(Slot::new(SlotValue::Int(clamp_bristol(n)), slot.provenance));
            }
            find_synonym_group(&t, BOWEL_DESCRIPTORS)
                .and_then(bristol_for_descriptor)
                .map(|n| Slot::new(SlotValue::Int(n), Provenance::Estimated))
        }
    }
}

/// First integer in `text`. A `-` directly before the digits counts as a sign unless
/// it joins two words ("7-8").
fn first_integer(text: &str) -> Option<i64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .take(6)
        .collect();
    let n: i64 = digits.parse().ok()?;
    let before = &text[..start];
    let negative = before.strip_suffix('-').is_some_and(|rest| {
        !rest
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric())
    });
    Some(if negative { -n } else { n })
}

/// Rank used to break exact confidence ties. `mood` holds rank 5 but is not an intent.
pub fn intent_priority(intent: Intent) -> u8 {
    match intent {
        Intent::Food => 0,
        Intent::Drink => 1,
        Intent::Symptom => 2,
        Intent::Reflux => 3,
        Intent::Bm => 4,
        Intent::Checkin => 6,
        Intent::Other => 7,
    }
}

/// Picks one result from competing candidate parses: highest confidence, then
/// non-empty slots, then intent priority. Earlier candidates win complete ties.
pub fn resolve_conflicts(mut candidates: Vec<ParseResult>) -> Option<ParseResult> {
    candidates.sort_by(compare_candidates);
    candidates.into_iter().next()
}

fn compare_candidates(a: &ParseResult, b: &ParseResult) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.slots.is_empty().cmp(&b.slots.is_empty()))
        .then_with(|| intent_priority(a.intent).cmp(&intent_priority(b.intent)))
}

#![forbid(unsafe_code)]

use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{NaiveTime, Timelike};
use tracing::{debug, warn};

use healthlog_kernel_contracts::parse::{
    clamp_bristol, clamp_severity, Intent, ParseContext, ParseResult, Provenance, Slot, SlotKey,
    SlotMap, SlotValue, DEFAULT_CONFIDENCE,
};
use healthlog_kernel_contracts::ContractViolation;

use crate::ontology::{
    bristol_for_descriptor, contains_any, extract_severity_from_adjectives, find_synonym_group,
    first_match, is_drink_word, is_food_word, is_phrase_breaker, mentions_drink, normalize_text,
    number_word_value, BM_KEYWORDS, BOWEL_DESCRIPTORS, DRINK_GROUPS, DRINK_VERBS,
    FEELING_KEYWORDS, FOOD_VERBS, FOOD_WORDS, KNOWN_BRANDS, MEAL_WINDOWS, QUANTITY_UNITS,
    REFLUX_KEYWORDS, SYMPTOM_GROUPS,
};
use crate::timeparse::{extract_time, format_clock, meal_window_for_hour};

/// Confidence per tier as (all critical slots filled, some critical slot missing).
pub mod confidence {
    pub const REFLUX: (f32, f32) = (0.9, 0.8);
    pub const BM: (f32, f32) = (0.85, 0.75);
    pub const SYMPTOM: (f32, f32) = (0.8, 0.7);
    pub const DRINK: (f32, f32) = (0.75, 0.65);
    pub const FOOD: (f32, f32) = (0.7, 0.6);
    pub const FEELING: (f32, f32) = (0.6, 0.5);
}

pub const GENERAL_SYMPTOM: &str = "general";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulesConfig {
    pub max_input_chars: usize,
}

impl RulesConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_input_chars: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RulesTier {
    Bm,
    Reflux,
    Symptom,
    Feeling,
    Drink,
    Food,
}

struct TierRule {
    tier: RulesTier,
    matches: fn(&Scan) -> bool,
    build: fn(&Scan) -> Draft,
}

/// Evaluated top to bottom, first match wins. Broader tiers sit below the specific
/// ones they would otherwise swallow.
const CASCADE: &[TierRule] = &[
    TierRule {
        tier: RulesTier::Bm,
        matches: matches_bm,
        build: build_bm,
    },
    TierRule {
        tier: RulesTier::Reflux,
        matches: matches_reflux,
        build: build_reflux,
    },
    TierRule {
        tier: RulesTier::Symptom,
        matches: matches_symptom,
        build: build_symptom,
    },
    TierRule {
        tier: RulesTier::Feeling,
        matches: matches_feeling,
        build: build_feeling,
    },
    TierRule {
        tier: RulesTier::Drink,
        matches: matches_drink,
        build: build_drink,
    },
    TierRule {
        tier: RulesTier::Food,
        matches: matches_food,
        build: build_food,
    },
];

#[derive(Debug, Clone)]
pub struct RulesParser {
    config: RulesConfig,
}

impl RulesParser {
    pub fn new(config: RulesConfig) -> Self {
        Self { config }
    }

    /// Never fails: any internal failure, including a panic during extraction,
    /// degrades to the clarification-needed result.
    pub fn parse(&self, text: &str, ctx: &ParseContext) -> ParseResult {
        match catch_unwind(AssertUnwindSafe(|| self.try_parse(text, ctx))) {
            Ok(Ok(result)) => result,
            Ok(Err(violation)) => {
                debug!(%violation, "rules result failed validation");
                ParseResult::needs_clarification()
            }
            Err(_) => {
                warn!(input_chars = text.chars().count(), "rules parser panicked");
                ParseResult::needs_clarification()
            }
        }
    }

    /// The tier that would classify `text`, if any.
    pub fn classify(&self, text: &str, ctx: &ParseContext) -> Option<RulesTier> {
        let normalized = normalize_text(text);
        let scan = Scan::new(&normalized, ctx);
        CASCADE
            .iter()
            .find(|rule| (rule.matches)(&scan))
            .map(|rule| rule.tier)
    }

    fn try_parse(&self, text: &str, ctx: &ParseContext) -> Result<ParseResult, ContractViolation> {
        if text.chars().count() > self.config.max_input_chars {
            debug!(input_chars = text.chars().count(), "input over rules limit");
            return Ok(ParseResult::needs_clarification());
        }
        let normalized = normalize_text(text);
        let scan = Scan::new(&normalized, ctx);

        let Some(rule) = CASCADE.iter().find(|rule| (rule.matches)(&scan)) else {
            debug!("no rules tier matched");
            let mut slots = scan.base_slots();
            slots.retain(|_, s| !s.value.is_blank());
            return ParseResult::v1(
                Intent::Other,
                DEFAULT_CONFIDENCE,
                slots,
                vec![SlotKey::ClarificationNeeded],
            );
        };

        let draft = (rule.build)(&scan);
        debug!(tier = ?rule.tier, intent = %draft.intent, "rules tier matched");
        draft.finish()
    }
}

struct Draft {
    intent: Intent,
    tier_confidence: (f32, f32),
    slots: SlotMap,
}

impl Draft {
    fn finish(self) -> Result<ParseResult, ContractViolation> {
        let missing: Vec<SlotKey> = self
            .intent
            .critical_slots()
            .iter()
            .filter(|k| !self.slots.contains_key(*k))
            .cloned()
            .collect();
        let confidence = if missing.is_empty() {
            self.tier_confidence.0
        } else {
            self.tier_confidence.1
        };
        ParseResult::v1(self.intent, confidence, self.slots, missing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ItemPhrase {
    text: String,
    count: Option<String>,
}

/// Everything extracted up front; tiers only read it.
struct Scan<'a> {
    text: &'a str,
    hour: u32,
    time: Option<NaiveTime>,
    meal: Option<&'static str>,
    item: Option<ItemPhrase>,
    quantity: Option<String>,
    brand: Option<&'static str>,
    has_food_verb: bool,
    has_drink_verb: bool,
}

impl<'a> Scan<'a> {
    fn new(text: &'a str, ctx: &ParseContext) -> Self {
        let tokens = tokenize(text);
        let item = extract_item(text, &tokens);
        let quantity = extract_quantity(&tokens)
            .or_else(|| item.as_ref().and_then(|i| i.count.clone()));
        Self {
            text,
            hour: ctx.hour(),
            time: extract_time(text, ctx.now),
            meal: find_synonym_group(text, MEAL_WINDOWS),
            item,
            quantity,
            brand: first_match(text, KNOWN_BRANDS),
            has_food_verb: contains_any(text, FOOD_VERBS),
            has_drink_verb: contains_any(text, DRINK_VERBS),
        }
    }

    fn base_slots(&self) -> SlotMap {
        let mut slots = SlotMap::new();
        if let Some(t) = self.time {
            slots.insert(SlotKey::Time, Slot::explicit(SlotValue::text(format_clock(t))));
        }
        if let Some(meal) = self.meal {
            slots.insert(SlotKey::MealTime, Slot::explicit(SlotValue::text(meal)));
        }
        slots
    }

    fn intake_slots(&self, fallback_item: Option<&str>) -> SlotMap {
        let mut slots = self.base_slots();
        if !slots.contains_key(&SlotKey::MealTime) {
            // Inferred windows are never authoritative.
            let hour = self.time.map(|t| t.hour()).unwrap_or(self.hour);
            slots.insert(
                SlotKey::MealTime,
                Slot::inferred(SlotValue::text(meal_window_for_hour(hour))),
            );
        }
        let item = self
            .item
            .as_ref()
            .map(|i| i.text.clone())
            .or_else(|| fallback_item.map(str::to_string));
        if let Some(item) = item {
            slots.insert(SlotKey::Item, Slot::explicit(SlotValue::Text(item)));
        }
        if let Some(q) = &self.quantity {
            slots.insert(SlotKey::Quantity, Slot::explicit(SlotValue::text(q.clone())));
        }
        if let Some(b) = self.brand {
            slots.insert(SlotKey::Brand, Slot::explicit(SlotValue::text(b)));
        }
        slots
    }

    fn symptom_slots(&self, symptom_type: &str) -> SlotMap {
        let mut slots = self.base_slots();
        slots.insert(
            SlotKey::SymptomType,
            Slot::explicit(SlotValue::text(symptom_type)),
        );
        if let Some(sev) = extract_severity(self.text) {
            slots.insert(SlotKey::Severity, Slot::explicit(SlotValue::Int(sev)));
        }
        slots
    }
}

fn matches_bm(scan: &Scan) -> bool {
    contains_any(scan.text, BM_KEYWORDS)
}

fn build_bm(scan: &Scan) -> Draft {
    let mut slots = scan.base_slots();
    if let Some(n) = extract_explicit_bristol(scan.text) {
        slots.insert(SlotKey::Bristol, Slot::explicit(SlotValue::Int(n)));
    } else if let Some(n) =
        find_synonym_group(scan.text, BOWEL_DESCRIPTORS).and_then(bristol_for_descriptor)
    {
        slots.insert(
            SlotKey::Bristol,
            Slot::new(SlotValue::Int(n), Provenance::Estimated),
        );
    }
    Draft {
        intent: Intent::Bm,
        tier_confidence: confidence::BM,
        slots,
    }
}

fn matches_reflux(scan: &Scan) -> bool {
    contains_any(scan.text, REFLUX_KEYWORDS)
}

fn build_reflux(scan: &Scan) -> Draft {
    Draft {
        intent: Intent::Reflux,
        tier_confidence: confidence::REFLUX,
        slots: scan.symptom_slots("reflux"),
    }
}

fn matches_symptom(scan: &Scan) -> bool {
    find_synonym_group(scan.text, SYMPTOM_GROUPS).is_some()
}

fn build_symptom(scan: &Scan) -> Draft {
    let label = find_synonym_group(scan.text, SYMPTOM_GROUPS).unwrap_or(GENERAL_SYMPTOM);
    Draft {
        intent: Intent::Symptom,
        tier_confidence: confidence::SYMPTOM,
        slots: scan.symptom_slots(label),
    }
}

fn matches_feeling(scan: &Scan) -> bool {
    contains_any(scan.text, FEELING_KEYWORDS)
}

fn build_feeling(scan: &Scan) -> Draft {
    Draft {
        intent: Intent::Symptom,
        tier_confidence: confidence::FEELING,
        slots: scan.symptom_slots(GENERAL_SYMPTOM),
    }
}

fn matches_drink(scan: &Scan) -> bool {
    mentions_drink(scan.text) || (scan.has_drink_verb && !scan.has_food_verb)
}

fn build_drink(scan: &Scan) -> Draft {
    let surface = DRINK_GROUPS
        .iter()
        .find_map(|g| first_match(scan.text, g.synonyms));
    Draft {
        intent: Intent::Drink,
        tier_confidence: confidence::DRINK,
        slots: scan.intake_slots(surface),
    }
}

fn matches_food(scan: &Scan) -> bool {
    scan.item.is_some() || scan.has_food_verb
}

fn build_food(scan: &Scan) -> Draft {
    let surface = first_match(scan.text, FOOD_WORDS);
    Draft {
        intent: Intent::Food,
        tier_confidence: confidence::FOOD,
        slots: scan.intake_slots(surface),
    }
}

/// Numeric ratings win over adjectives because they are the more specific signal.
pub fn extract_severity(text: &str) -> Option<i64> {
    extract_numeric_severity(text)
        .or_else(|| extract_severity_from_adjectives(text))
        .map(clamp_severity)
}

fn extract_numeric_severity(text: &str) -> Option<i64> {
    let words: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ':' | '!' | '?' | '.'))
        .filter(|w| !w.is_empty())
        .collect();
    for (i, w) in words.iter().enumerate() {
        if let Some((n, d)) = w.split_once('/') {
            if d == "10" {
                if let Ok(n) = n.parse::<i64>() {
                    return Some(n);
                }
            }
        }
        if let Ok(n) = w.parse::<i64>() {
            if words.get(i + 1) == Some(&"out") && words.get(i + 3) == Some(&"10") {
                return Some(n);
            }
        }
        if matches!(*w, "severity" | "sev" | "level" | "pain" | "rated") {
            if let Some(n) = words.get(i + 1).and_then(|next| next.parse::<i64>().ok()) {
                return Some(n);
            }
        }
    }
    None
}

pub fn extract_explicit_bristol(text: &str) -> Option<i64> {
    let words: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ':' | '#' | '!' | '?' | '.'))
        .filter(|w| !w.is_empty())
        .collect();
    for (i, w) in words.iter().enumerate() {
        if !matches!(*w, "bristol" | "type") {
            continue;
        }
        let mut j = i + 1;
        if words.get(j) == Some(&"type") {
            j += 1;
        }
        if let Some(n) = words.get(j).and_then(|next| parse_count(next)) {
            return Some(clamp_bristol(n));
        }
    }
    None
}

fn parse_count(word: &str) -> Option<i64> {
    word.parse::<i64>()
        .ok()
        .or_else(|| number_word_value(word).map(i64::from))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    Joiner,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    start: usize,
    end: usize,
    kind: TokenKind,
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        let is_word_char = c.is_alphanumeric() || matches!(c, '\'' | '-' | '.' | ':');
        if is_word_char {
            if word_start.is_none() {
                word_start = Some(i);
            }
            continue;
        }
        if let Some(s) = word_start.take() {
            push_word(&mut tokens, text, s, i);
        }
        if matches!(c, ',' | '&' | '+') {
            tokens.push(Token {
                text: &text[i..i + c.len_utf8()],
                start: i,
                end: i + c.len_utf8(),
                kind: TokenKind::Joiner,
            });
        }
    }
    if let Some(s) = word_start {
        push_word(&mut tokens, text, s, text.len());
    }
    tokens
}

fn push_word<'a>(tokens: &mut Vec<Token<'a>>, text: &'a str, start: usize, end: usize) {
    let raw = &text[start..end];
    let trimmed = raw.trim_end_matches(['.', ':', '-']);
    if trimmed.is_empty() {
        return;
    }
    tokens.push(Token {
        text: trimmed,
        start,
        end: start + trimmed.len(),
        kind: TokenKind::Word,
    });
}

fn is_verb(word: &str) -> bool {
    FOOD_VERBS.contains(&word) || DRINK_VERBS.contains(&word)
}

fn is_joiner(tok: &Token) -> bool {
    tok.kind == TokenKind::Joiner || tok.text == "and"
}

fn is_run_word(tok: &Token) -> bool {
    tok.kind == TokenKind::Word && !is_phrase_breaker(tok.text)
}

/// Longest valid noun phrase: a run of non-breaker words that names a known food or
/// drink, or that follows an eating/drinking verb. Runs separated only by list joiners
/// ("toast, eggs and bacon") are kept together.
fn extract_item(text: &str, tokens: &[Token]) -> Option<ItemPhrase> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut i = 0usize;
    while i < tokens.len() {
        if !is_run_word(&tokens[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < tokens.len() && is_run_word(&tokens[i]) {
            i += 1;
        }
        runs.push((start, i));
    }

    let mut merged: Vec<(usize, usize)> = Vec::new();
    for run in runs {
        if let Some(last) = merged.last_mut() {
            let gap = &tokens[last.1..run.0];
            if !gap.is_empty() && gap.len() <= 2 && gap.iter().all(is_joiner) {
                last.1 = run.1;
                continue;
            }
        }
        merged.push(run);
    }

    let mut best: Option<(usize, usize, usize)> = None;
    for (start, end) in merged {
        let words = &tokens[start..end];
        let names_known = words
            .iter()
            .any(|t| is_food_word(t.text) || is_drink_word(t.text))
            || contains_any(
                &text[words[0].start..words[words.len() - 1].end],
                &["ice cream", "peanut butter"],
            );
        if !names_known && !follows_verb(tokens, start) {
            continue;
        }
        let len = words.iter().filter(|t| t.kind == TokenKind::Word).count();
        if best.map_or(true, |(_, _, best_len)| len > best_len) {
            best = Some((start, end, len));
        }
    }

    let (start, end, _) = best?;
    let phrase = text[tokens[start].start..tokens[end - 1].end].trim().to_string();
    let count = start
        .checked_sub(1)
        .and_then(|p| tokens.get(p))
        .filter(|t| t.kind == TokenKind::Word)
        .and_then(|t| parse_count(t.text))
        .filter(|n| *n > 0)
        .map(|n| n.to_string());
    Some(ItemPhrase {
        text: phrase,
        count,
    })
}

fn follows_verb(tokens: &[Token], run_start: usize) -> bool {
    for tok in tokens[..run_start].iter().rev() {
        if tok.kind == TokenKind::Joiner {
            return false;
        }
        if is_verb(tok.text) {
            return true;
        }
        if !is_phrase_breaker(tok.text) {
            return false;
        }
    }
    false
}

fn extract_quantity(tokens: &[Token]) -> Option<String> {
    for pair in tokens.windows(2) {
        let (num, unit) = (&pair[0], &pair[1]);
        if num.kind != TokenKind::Word || !QUANTITY_UNITS.contains(&unit.text) {
            continue;
        }
        let amount = match num.text {
            "a" | "an" => Some("1".to_string()),
            "half" => Some("0.5".to_string()),
            t if t.parse::<f64>().is_ok_and(|v| v > 0.0 && v.is_finite()) => Some(t.to_string()),
            t => number_word_value(t).map(|n| n.to_string()),
        };
        if let Some(amount) = amount {
            return Some(format!("{amount} {}", unit.text));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(hour: u32) -> ParseContext {
        let now: NaiveDateTime = NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(hour, 15, 0)
            .unwrap();
        ParseContext::at(now)
    }

    fn parse(text: &str) -> ParseResult {
        RulesParser::new(RulesConfig::mvp_v1()).parse(text, &at(12))
    }

    #[test]
    fn at_rules_01_bm_with_explicit_bristol() {
        let r = parse("bm bristol 4");
        assert_eq!(r.intent, Intent::Bm);
        assert_eq!(r.slot_int(&SlotKey::Bristol), Some(4));
        assert!(r.missing.is_empty());
        assert_eq!(r.confidence, confidence::BM.0);
    }

    #[test]
    fn at_rules_02_bm_descriptor_is_estimated() {
        let r = parse("pretty loose stool this morning");
        assert_eq!(r.intent, Intent::Bm);
        let slot = r.slot(&SlotKey::Bristol).unwrap();
        assert_eq!(slot.value, SlotValue::Int(6));
        assert_eq!(slot.provenance, Provenance::Estimated);
    }

    #[test]
    fn at_rules_03_bm_without_descriptor_is_missing_bristol() {
        let r = parse("had a bowel movement");
        assert_eq!(r.intent, Intent::Bm);
        assert_eq!(r.missing, vec![SlotKey::Bristol]);
        assert_eq!(r.confidence, confidence::BM.1);
    }

    #[test]
    fn at_rules_04_bristol_clamped() {
        let r = parse("poop type 9");
        assert_eq!(r.slot_int(&SlotKey::Bristol), Some(7));
    }

    #[test]
    fn at_rules_05_mild_reflux() {
        let r = parse("mild reflux");
        assert_eq!(r.intent, Intent::Reflux);
        assert_eq!(r.slot_int(&SlotKey::Severity), Some(3));
        assert_eq!(r.confidence, confidence::REFLUX.0);
    }

    #[test]
    fn at_rules_06_symptom_without_severity() {
        let r = parse("stomach pain");
        assert_eq!(r.intent, Intent::Symptom);
        assert_eq!(r.slot_text(&SlotKey::SymptomType), Some("stomach pain"));
        assert_eq!(r.missing, vec![SlotKey::Severity]);
        assert!(r.confidence < 0.8);
    }

    #[test]
    fn at_rules_07_numeric_severity_clamped() {
        let r = parse("cramps 15/10");
        assert_eq!(r.slot_int(&SlotKey::Severity), Some(10));
        let r = parse("nausea 6 out of 10");
        assert_eq!(r.slot_int(&SlotKey::Severity), Some(6));
    }

    #[test]
    fn at_rules_08_feeling_is_general_symptom() {
        let r = parse("feeling kind of rough");
        assert_eq!(r.intent, Intent::Symptom);
        assert_eq!(r.slot_text(&SlotKey::SymptomType), Some(GENERAL_SYMPTOM));
        assert_eq!(r.slot_int(&SlotKey::Severity), Some(4));
        assert_eq!(r.confidence, confidence::FEELING.0);
    }

    #[test]
    fn at_rules_09_food_with_inferred_meal() {
        let r = RulesParser::new(RulesConfig::mvp_v1()).parse("I had chicken salad", &at(19));
        assert_eq!(r.intent, Intent::Food);
        assert_eq!(r.slot_text(&SlotKey::Item), Some("chicken salad"));
        let meal = r.slot(&SlotKey::MealTime).unwrap();
        assert_eq!(meal.value, SlotValue::text("dinner"));
        assert_eq!(meal.provenance, Provenance::Inferred);
    }

    #[test]
    fn at_rules_10_explicit_meal_and_time() {
        let r = parse("toast and eggs for breakfast at 7:30am");
        assert_eq!(r.intent, Intent::Food);
        assert_eq!(r.slot_text(&SlotKey::Item), Some("toast and eggs"));
        let meal = r.slot(&SlotKey::MealTime).unwrap();
        assert_eq!(meal.provenance, Provenance::Explicit);
        assert_eq!(r.slot_text(&SlotKey::Time), Some("07:30"));
    }

    #[test]
    fn at_rules_11_drink_and_quantity() {
        let r = parse("2 cups of green tea");
        assert_eq!(r.intent, Intent::Drink);
        assert_eq!(r.slot_text(&SlotKey::Item), Some("green tea"));
        assert_eq!(r.slot_text(&SlotKey::Quantity), Some("2 cups"));
    }

    #[test]
    fn at_rules_12_drink_verb_without_food_verb() {
        let r = parse("drank something fizzy");
        assert_eq!(r.intent, Intent::Drink);
        assert_eq!(r.slot_text(&SlotKey::Item), Some("something fizzy"));
    }

    #[test]
    fn at_rules_13_brand_and_count() {
        let r = parse("ate 3 dumplings from chipotle");
        assert_eq!(r.intent, Intent::Food);
        assert_eq!(r.slot_text(&SlotKey::Quantity), Some("3"));
        assert_eq!(r.slot_text(&SlotKey::Brand), Some("chipotle"));
    }

    #[test]
    fn at_rules_14_gibberish_needs_clarification() {
        let r = parse("asdkj qwe");
        assert_eq!(r.intent, Intent::Other);
        assert_eq!(r.missing, vec![SlotKey::ClarificationNeeded]);
        assert_eq!(r.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn at_rules_15_degenerate_inputs() {
        for text in ["", "   ", "?!...", "日本語のテキスト", "🍕🍕🍕"] {
            let r = parse(text);
            assert_eq!(r.intent, Intent::Other, "{text}");
        }
    }

    #[test]
    fn at_rules_16_over_long_input_clarifies() {
        let long = "toast ".repeat(400);
        assert_eq!(parse(&long).intent, Intent::Other);
    }

    #[test]
    fn at_rules_17_cascade_order_per_tier() {
        let p = RulesParser::new(RulesConfig::mvp_v1());
        let ctx = at(9);
        assert_eq!(p.classify("diarrhea and cramps", &ctx), Some(RulesTier::Bm));
        assert_eq!(p.classify("heartburn and bloating", &ctx), Some(RulesTier::Reflux));
        assert_eq!(p.classify("bloated after pizza", &ctx), Some(RulesTier::Symptom));
        assert_eq!(p.classify("feeling off after coffee", &ctx), Some(RulesTier::Feeling));
        assert_eq!(p.classify("coffee with toast", &ctx), Some(RulesTier::Drink));
        assert_eq!(p.classify("ate a burrito", &ctx), Some(RulesTier::Food));
        assert_eq!(p.classify("hello there", &ctx), None);
    }

    #[test]
    fn at_rules_18_huge_relative_time_keeps_intent() {
        let r = parse("ate toast 999999999999999999 hours ago");
        assert_eq!(r.intent, Intent::Food);
        assert_eq!(r.slot_text(&SlotKey::Item), Some("toast"));
        assert!(r.slot(&SlotKey::Time).is_none());
        let p = RulesParser::new(RulesConfig::mvp_v1());
        assert_eq!(
            p.classify("ate toast 999999999999999999 hours ago", &at(12)),
            Some(RulesTier::Food)
        );
    }

    #[test]
    fn at_rules_19_generic_pain_is_a_symptom() {
        let r = parse("back pain 6");
        assert_eq!(r.intent, Intent::Symptom);
        assert_eq!(r.slot_text(&SlotKey::SymptomType), Some("pain"));
        assert_eq!(r.slot_int(&SlotKey::Severity), Some(6));

        let r = parse("my knee hurts, pain 7");
        assert_eq!(r.intent, Intent::Symptom);
        assert_eq!(r.slot_text(&SlotKey::SymptomType), Some("pain"));
        assert_eq!(r.slot_int(&SlotKey::Severity), Some(7));

        assert_eq!(
            parse("stomach pain").slot_text(&SlotKey::SymptomType),
            Some("stomach pain")
        );
    }

    #[test]
    fn at_rules_20_bare_off_does_not_make_a_feeling() {
        let r = parse("finished off the pizza");
        assert_eq!(r.intent, Intent::Food);
        assert_eq!(r.slot_text(&SlotKey::Item), Some("pizza"));

        let r = parse("feeling off");
        assert_eq!(r.intent, Intent::Symptom);
        assert_eq!(r.slot_text(&SlotKey::SymptomType), Some(GENERAL_SYMPTOM));
    }
}

#![forbid(unsafe_code)]

//! Canonical notes line: the single artifact handed to storage.

use serde::Serialize;
use tracing::{debug, warn};

use healthlog_kernel_contracts::notes::{NotesLine, NotesToken, NOTES_VERSION};
use healthlog_kernel_contracts::parse::{
    clamp_bristol, clamp_severity, ParseResult, Provenance, SlotKey, SlotValue,
};

use crate::ontology::{canonical_position, is_valid_value, MEAL_CONTEXT_PHRASES};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalNotes {
    pub line: NotesLine,
    pub rendered: String,
    /// Keys whose value failed validation and were left out.
    pub dropped: Vec<String>,
    /// Keys outside the canonical vocabulary that were kept.
    pub unknown: Vec<String>,
}

/// Notes key a slot is stored under. `None` for slots that never reach storage.
pub fn notes_key(slot: &SlotKey) -> Option<&str> {
    match slot {
        SlotKey::Item => Some("item"),
        SlotKey::MealTime => Some("meal"),
        SlotKey::Quantity => Some("qty"),
        SlotKey::Brand => Some("brand"),
        SlotKey::Time => Some("time"),
        SlotKey::SymptomType => Some("symptom"),
        SlotKey::Severity => Some("severity"),
        SlotKey::Bristol => Some("bristol"),
        SlotKey::ClarificationNeeded => None,
        SlotKey::Custom(name) => Some(name.as_str()),
    }
}

pub fn canonicalize(result: &ParseResult) -> CanonicalNotes {
    let mut candidates = vec![NotesToken::pair("intent", result.intent.as_str())];
    let mut via_model = false;

    for (slot_key, slot) in &result.slots {
        let Some(key) = notes_key(slot_key) else {
            continue;
        };
        via_model |= slot.provenance == Provenance::Model;
        let value = match slot_key {
            SlotKey::Severity => clamp_numeric(&slot.value, clamp_severity),
            SlotKey::Bristol => clamp_numeric(&slot.value, clamp_bristol),
            SlotKey::Item | SlotKey::Brand | SlotKey::Quantity | SlotKey::SymptomType => {
                clean_free_text(&slot.value.render())
            }
            _ => sanitize_value(&slot.value.render()),
        };
        candidates.push(NotesToken::pair(key, value));

        match (slot_key, slot.provenance) {
            (SlotKey::MealTime, Provenance::Inferred) => {
                candidates.push(NotesToken::flag("meal_inferred"))
            }
            (SlotKey::Bristol, Provenance::Estimated) => {
                candidates.push(NotesToken::flag("bristol_est"))
            }
            _ => {}
        }
    }
    if via_model {
        candidates.push(NotesToken::flag("via_model"));
    }

    let mut dropped = Vec::new();
    let mut kept = Vec::new();
    for token in candidates {
        if is_valid_value(&token.key, token.value.as_deref()) {
            kept.push(token);
        } else {
            warn!(key = %token.key, "dropping canonical token that failed validation");
            dropped.push(token.key);
        }
    }

    let tokens = order_tokens(kept);
    let unknown: Vec<String> = tokens
        .iter()
        .filter(|t| canonical_position(&t.key).is_none())
        .map(|t| t.key.clone())
        .collect();
    if !unknown.is_empty() {
        debug!(count = unknown.len(), "notes carry keys outside the vocabulary");
    }

    let line = NotesLine::v1(tokens).unwrap_or_else(|violation| {
        warn!(%violation, "canonical notes failed validation, emitting intent only");
        NotesLine {
            version: NOTES_VERSION,
            tokens: vec![NotesToken::pair("intent", result.intent.as_str())],
        }
    });
    CanonicalNotes {
        rendered: line.render(),
        line,
        dropped,
        unknown,
    }
}

/// Canonical order first, then unknown keys lexicographically. Duplicate keys keep
/// their first occurrence.
pub fn order_tokens(tokens: Vec<NotesToken>) -> Vec<NotesToken> {
    let mut unique: Vec<NotesToken> = Vec::with_capacity(tokens.len());
    for t in tokens {
        if !unique.iter().any(|u| u.key == t.key) {
            unique.push(t);
        }
    }
    unique.sort_by(|a, b| {
        let pa = canonical_position(&a.key).unwrap_or(usize::MAX);
        let pb = canonical_position(&b.key).unwrap_or(usize::MAX);
        pa.cmp(&pb).then_with(|| a.key.cmp(&b.key))
    });
    unique
}

/// Replaces characters the line format reserves and collapses whitespace.
pub fn sanitize_value(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            ';' | '=' | '\n' | '\r' | '\t' => ' ',
            c => c,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Removes trailing meal-context phrases ("for breakfast", "this morning"). Text that
/// is nothing but such a phrase is kept.
pub fn strip_meal_context(text: &str) -> String {
    let mut words: Vec<&str> = text.split_whitespace().collect();
    loop {
        let hit = MEAL_CONTEXT_PHRASES.iter().find_map(|phrase| {
            let phrase_words: Vec<&str> = phrase.split(' ').collect();
            let n = phrase_words.len();
            if words.len() <= n {
                return None;
            }
            let tail = &words[words.len() - n..];
            tail.iter()
                .zip(&phrase_words)
                .all(|(w, p)| w.trim_end_matches(['.', '!', ',']).eq_ignore_ascii_case(p))
                .then_some(n)
        });
        match hit {
            Some(n) => words.truncate(words.len() - n),
            None => break,
        }
    }
    words.join(" ").trim_end_matches(',').trim_end().to_string()
}

/// "a, b and c" and "a & b" become "a, b, c" and "a, b". Only the last " and "
/// after the final comma joins list entries, so dish names like "mac and cheese"
/// survive both alone and inside a list.
pub fn normalize_delimiters(text: &str) -> String {
    let mut s = text.replace(['&', '+'], ",");
    if let Some(comma) = s.rfind(',') {
        if let Some(offset) = s[comma..].rfind(" and ") {
            let at = comma + offset;
            s.replace_range(at..at + " and ".len(), ", ");
        }
    }
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn clean_free_text(raw: &str) -> String {
    let collapsed = sanitize_value(raw);
    normalize_delimiters(&strip_meal_context(&collapsed))
}

fn clamp_numeric(value: &SlotValue, clamp: fn(i64) -> i64) -> String {
    match value {
        SlotValue::Int(v) => clamp(*v).to_string(),
        SlotValue::Text(t) => match t.trim().parse::<i64>() {
            Ok(v) => clamp(v).to_string(),
            Err(_) => sanitize_value(t),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use healthlog_kernel_contracts::notes::parse_notes_line;
    use healthlog_kernel_contracts::parse::{Intent, Slot, SlotMap};

    fn result(intent: Intent, slots: Vec<(SlotKey, Slot)>) -> ParseResult {
        let slots: SlotMap = slots.into_iter().collect();
        let missing = if intent == Intent::Other {
            vec![SlotKey::ClarificationNeeded]
        } else {
            vec![]
        };
        ParseResult::v1(intent, 0.8, slots, missing).unwrap()
    }

    #[test]
    fn at_canon_01_orders_tokens_and_flags() {
        let r = result(
            Intent::Food,
            vec![
                (SlotKey::Time, Slot::explicit(SlotValue::text("12:30"))),
                (SlotKey::MealTime, Slot::inferred(SlotValue::text("lunch"))),
                (
                    SlotKey::Item,
                    Slot::explicit(SlotValue::text("chicken salad for lunch")),
                ),
                (
                    SlotKey::Brand,
                    Slot::new(SlotValue::text("pret"), Provenance::Model),
                ),
            ],
        );
        let notes = canonicalize(&r);
        assert_eq!(
            notes.rendered,
            "notes_v=1; intent=food; item=chicken salad; brand=pret; meal=lunch; meal_inferred; time=12:30; via_model"
        );
        assert!(notes.dropped.is_empty());
        assert!(notes.unknown.is_empty());
    }

    #[test]
    fn at_canon_02_bm_estimate_flag_and_clamp() {
        let r = result(
            Intent::Bm,
            vec![(
                SlotKey::Bristol,
                Slot::new(SlotValue::Int(6), Provenance::Estimated),
            )],
        );
        assert_eq!(
            canonicalize(&r).rendered,
            "notes_v=1; intent=bm; bristol=6; bristol_est"
        );

        let text_bristol = result(
            Intent::Bm,
            vec![(SlotKey::Bristol, Slot::explicit(SlotValue::text("9")))],
        );
        // The result contract only range-checks integers; text is clamped here.
        assert_eq!(
            canonicalize(&text_bristol).line.get("bristol").unwrap().value.as_deref(),
            Some("7")
        );
    }

    #[test]
    fn at_canon_03_invalid_values_dropped_and_counted() {
        let r = result(
            Intent::Food,
            vec![
                (SlotKey::Item, Slot::explicit(SlotValue::text("toast"))),
                (SlotKey::MealTime, Slot::explicit(SlotValue::text("elevenses"))),
                (SlotKey::Time, Slot::explicit(SlotValue::text("25:99"))),
            ],
        );
        let notes = canonicalize(&r);
        assert_eq!(notes.rendered, "notes_v=1; intent=food; item=toast");
        assert_eq!(notes.dropped, vec!["meal".to_string(), "time".to_string()]);
    }

    #[test]
    fn at_canon_04_unknown_keys_sorted_last() {
        let r = result(
            Intent::Drink,
            vec![
                (SlotKey::Item, Slot::explicit(SlotValue::text("tea"))),
                (
                    SlotKey::Custom("temp".to_string()),
                    Slot::explicit(SlotValue::text("hot")),
                ),
                (
                    SlotKey::Custom("caffeine".to_string()),
                    Slot::explicit(SlotValue::text("yes")),
                ),
                (
                    SlotKey::Custom("Bad Key".to_string()),
                    Slot::explicit(SlotValue::text("x")),
                ),
            ],
        );
        let notes = canonicalize(&r);
        assert_eq!(
            notes.rendered,
            "notes_v=1; intent=drink; item=tea; caffeine=yes; temp=hot"
        );
        assert_eq!(notes.unknown, vec!["caffeine".to_string(), "temp".to_string()]);
        assert_eq!(notes.dropped, vec!["Bad Key".to_string()]);
    }

    #[test]
    fn at_canon_05_free_text_cleanup() {
        assert_eq!(strip_meal_context("oatmeal for breakfast"), "oatmeal");
        assert_eq!(strip_meal_context("eggs, toast this morning"), "eggs, toast");
        assert_eq!(strip_meal_context("breakfast burrito"), "breakfast burrito");
        assert_eq!(normalize_delimiters("rice, beans and salsa"), "rice, beans, salsa");
        assert_eq!(normalize_delimiters("mac and cheese"), "mac and cheese");
        assert_eq!(normalize_delimiters("chips & dip"), "chips, dip");
        assert_eq!(
            normalize_delimiters("mac and cheese, toast"),
            "mac and cheese, toast"
        );
        assert_eq!(
            normalize_delimiters("mac and cheese, toast and jam"),
            "mac and cheese, toast, jam"
        );
        assert_eq!(sanitize_value(" a;b=c\n d "), "a b c d");
    }

    #[test]
    fn at_canon_06_canonical_line_round_trips() {
        let r = result(
            Intent::Symptom,
            vec![
                (
                    SlotKey::SymptomType,
                    Slot::explicit(SlotValue::text("stomach pain")),
                ),
                (SlotKey::Severity, Slot::explicit(SlotValue::Int(7))),
            ],
        );
        let notes = canonicalize(&r);
        let parsed = parse_notes_line(&notes.rendered).unwrap();
        assert_eq!(parsed, notes.line);
        assert_eq!(canonicalize(&r).rendered, notes.rendered);
    }
}

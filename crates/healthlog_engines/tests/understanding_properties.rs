use std::collections::BTreeMap;

use chrono::NaiveDate;
use proptest::prelude::*;

use healthlog_engines::canon::canonicalize;
use healthlog_engines::disambig::{resolve_conflicts, Disambiguator, DisambiguatorConfig};
use healthlog_engines::merge::merge;
use healthlog_engines::ontology::normalize_text;
use healthlog_engines::rules::{RulesConfig, RulesParser};
use healthlog_kernel_contracts::model::ModelExtraction;
use healthlog_kernel_contracts::notes::parse_notes_line;
use healthlog_kernel_contracts::parse::{
    Intent, ParseContext, ParseResult, SlotKey, SlotValue, BRISTOL_MAX, BRISTOL_MIN,
    SEVERITY_MAX, SEVERITY_MIN,
};
use healthlog_kernel_contracts::Validate;

const WORDS: &[&str] = &[
    "bm", "bristol", "4", "9", "loose", "mild", "severe", "reflux", "heartburn", "stomach",
    "pain", "cramps", "feeling", "off", "coffee", "soup", "milk", "cereal", "smoothie", "bowl",
    "ate", "drank", "had", "chicken", "salad", "and", ",", "2", "cups", "of", "green", "tea",
    "at", "3pm", "7:45", "am", "noon", "2", "hours", "ago", "for", "breakfast", "lunch", "7/10",
    "out", "10", "type", "asdkj", "qwe", "!!", "é", "日本", "",
];

fn ctx(hour: u32) -> ParseContext {
    ParseContext::at(
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap(),
    )
}

fn vocab_text() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(WORDS), 0..10).prop_map(|w| w.join(" "))
}

fn any_text() -> impl Strategy<Value = String> {
    prop_oneof![vocab_text(), any::<String>()]
}

fn intent() -> impl Strategy<Value = Intent> {
    prop::sample::select(Intent::ALL.to_vec())
}

fn extraction() -> impl Strategy<Value = ModelExtraction> {
    (
        intent(),
        prop::option::of(0.0f32..=1.0),
        prop::option::of(-5i64..20),
        prop::option::of(prop::sample::select(vec!["toast", "tea", "cramps", "soup"])),
    )
        .prop_map(|(intent, confidence, severity, item)| {
            let mut slots = BTreeMap::new();
            if let Some(s) = severity {
                slots.insert(SlotKey::Severity, SlotValue::Int(s.clamp(1, 10)));
            }
            if let Some(i) = item {
                slots.insert(SlotKey::Item, SlotValue::text(i));
            }
            ModelExtraction {
                intent,
                slots,
                confidence,
                missing: vec![SlotKey::Time],
            }
        })
}

fn assert_well_formed(r: &ParseResult) {
    assert!(r.validate().is_ok(), "{r:?}");
    for key in &r.missing {
        assert!(!r.has_slot(key), "{key} both filled and missing");
    }
    if let Some(v) = r.slot_int(&SlotKey::Severity) {
        assert!((SEVERITY_MIN..=SEVERITY_MAX).contains(&v));
    }
    if let Some(v) = r.slot_int(&SlotKey::Bristol) {
        assert!((BRISTOL_MIN..=BRISTOL_MAX).contains(&v));
    }
}

proptest! {
    #[test]
    fn rules_parse_is_total_and_well_formed(text in any_text(), hour in 0u32..24) {
        let r = RulesParser::new(RulesConfig::mvp_v1()).parse(&text, &ctx(hour));
        assert_well_formed(&r);
        if r.intent == Intent::Other {
            prop_assert!(r.missing.contains(&SlotKey::ClarificationNeeded));
        }
    }

    #[test]
    fn confidence_never_drops_through_merge_and_disambiguation(
        text in vocab_text(),
        model in prop::option::of(extraction()),
        hour in 0u32..24,
    ) {
        let c = ctx(hour);
        let rules = RulesParser::new(RulesConfig::mvp_v1()).parse(&text, &c);
        let merged = merge(&rules, model.as_ref());
        assert_well_formed(&merged.result);
        prop_assert!(merged.result.confidence >= rules.confidence);

        let d = Disambiguator::new(DisambiguatorConfig::mvp_v1())
            .disambiguate(&merged.result, &normalize_text(&text), &c);
        assert_well_formed(&d.result);
        prop_assert!(d.result.confidence >= merged.result.confidence);
    }

    #[test]
    fn canonical_notes_are_deterministic_and_round_trip(text in vocab_text(), hour in 0u32..24) {
        let r = RulesParser::new(RulesConfig::mvp_v1()).parse(&text, &ctx(hour));
        let first = canonicalize(&r);
        let second = canonicalize(&r);
        prop_assert_eq!(&first.rendered, &second.rendered);
        let parsed = parse_notes_line(&first.rendered).unwrap();
        prop_assert_eq!(parsed, first.line);
    }

    #[test]
    fn conflict_winner_has_top_confidence(texts in prop::collection::vec(vocab_text(), 1..5)) {
        let parser = RulesParser::new(RulesConfig::mvp_v1());
        let candidates: Vec<ParseResult> =
            texts.iter().map(|t| parser.parse(t, &ctx(12))).collect();
        let top = candidates
            .iter()
            .map(|r| r.confidence)
            .fold(f32::MIN, f32::max);
        let winner = resolve_conflicts(candidates).unwrap();
        prop_assert_eq!(winner.confidence, top);
    }
}

#![forbid(unsafe_code)]

//! Controlled vocabulary for the understanding pipeline.
//!
//! Every table here is static and read-only. Derived indexes are built once on first
//! use, so all lookups are safe for unsynchronized concurrent reads.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use healthlog_kernel_contracts::notes::{is_valid_token_key, NOTES_VERSION_KEY};
use healthlog_kernel_contracts::parse::{BRISTOL_MAX, BRISTOL_MIN, SEVERITY_MAX, SEVERITY_MIN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynonymGroup {
    pub label: &'static str,
    pub synonyms: &'static [&'static str],
}

const fn group(label: &'static str, synonyms: &'static [&'static str]) -> SynonymGroup {
    SynonymGroup { label, synonyms }
}

pub const MEAL_WINDOWS: &[SynonymGroup] = &[
    group("breakfast", &["breakfast", "brekkie", "brekky", "morning meal"]),
    group("lunch", &["lunch", "luncheon", "midday meal"]),
    group("dinner", &["dinner", "supper", "evening meal"]),
    group("snack", &["snack", "snacks", "snacked", "snacking"]),
];

pub const BM_KEYWORDS: &[&str] = &[
    "bowel movement",
    "number two",
    "bm",
    "bowel",
    "bowels",
    "poop",
    "pooped",
    "pooping",
    "poo",
    "stool",
    "stools",
    "bristol",
    "diarrhea",
    "diarrhoea",
    "constipated",
    "constipation",
];

/// Descriptor groups mapped to a Bristol-scale estimate by [`bristol_for_descriptor`].
pub const BOWEL_DESCRIPTORS: &[SynonymGroup] = &[
    group(
        "loose",
        &["loose", "watery", "runny", "diarrhea", "diarrhoea", "mushy", "soft"],
    ),
    group(
        "hard",
        &["hard", "lumpy", "pellets", "pellet", "constipated", "constipation", "straining"],
    ),
    group(
        "normal",
        &["normal", "smooth", "regular", "well formed", "well-formed", "healthy"],
    ),
];

pub const REFLUX_KEYWORDS: &[&str] = &[
    "acid reflux",
    "reflux",
    "heartburn",
    "heart burn",
    "gerd",
    "regurgitation",
    "regurgitated",
    "burning throat",
    "sour taste",
    "indigestion",
    "acid",
];

pub const SYMPTOM_GROUPS: &[SynonymGroup] = &[
    group(
        "stomach pain",
        &[
            "stomach pain",
            "stomach ache",
            "stomachache",
            "tummy ache",
            "tummy pain",
            "abdominal pain",
            "belly ache",
            "belly pain",
            "stomach cramps",
            "cramps",
            "cramping",
        ],
    ),
    group("bloating", &["bloating", "bloated", "distended"]),
    group("gas", &["gassy", "gas", "flatulence", "farting"]),
    group("nausea", &["nausea", "nauseous", "nauseated", "queasy"]),
    group("vomiting", &["vomiting", "vomited", "threw up", "throwing up"]),
    group("burping", &["burping", "burps", "burp", "belching"]),
    group("headache", &["headache", "migraine"]),
    group("fatigue", &["fatigue", "fatigued", "exhausted", "drained"]),
    group("dizziness", &["dizzy", "dizziness", "lightheaded"]),
    group("skin reaction", &["itchy", "itching", "hives", "rash"]),
    // Catch-all; must stay after every more specific group.
    group("pain", &["pain", "painful", "ache", "aching", "aches", "hurts", "hurting", "sore"]),
];

pub const FEELING_KEYWORDS: &[&str] = &[
    "not great",
    "not good",
    "feel",
    "feeling",
    "felt",
    "feel off",
    "feeling off",
    "felt off",
    "unwell",
    "sick",
    "meh",
    "rough",
    "lousy",
];

pub const DRINK_GROUPS: &[SynonymGroup] = &[
    group(
        "coffee",
        &[
            "coffee",
            "latte",
            "espresso",
            "cappuccino",
            "americano",
            "flat white",
            "mocha",
            "cold brew",
            "macchiato",
        ],
    ),
    group(
        "tea",
        &[
            "green tea",
            "black tea",
            "herbal tea",
            "peppermint tea",
            "tea",
            "chai",
            "matcha",
            "chamomile",
        ],
    ),
    group("water", &["sparkling water", "water", "seltzer"]),
    group("juice", &["orange juice", "apple juice", "juice", "lemonade"]),
    group("milk", &["oat milk", "almond milk", "soy milk", "milk"]),
    group("smoothie", &["smoothie", "protein shake", "milkshake", "shake"]),
    group(
        "soda",
        &["diet coke", "soft drink", "soda", "coke", "pepsi", "sprite", "cola", "pop"],
    ),
    group(
        "alcohol",
        &["beer", "wine", "cocktail", "whiskey", "vodka", "gin", "cider", "prosecco", "champagne"],
    ),
    group("fermented", &["kombucha", "kefir"]),
    group("energy drink", &["energy drink", "red bull", "monster"]),
];

pub const FOOD_WORDS: &[&str] = &[
    "chicken", "beef", "pork", "lamb", "fish", "salmon", "tuna", "shrimp", "prawns", "egg",
    "eggs", "omelette", "bacon", "sausage", "ham", "turkey", "tofu", "rice", "pasta", "noodles",
    "spaghetti", "ramen", "bread", "toast", "bagel", "croissant", "sandwich", "wrap", "burrito",
    "taco", "tacos", "pizza", "burger", "fries", "chips", "salad", "soup", "broth", "oatmeal",
    "oats", "porridge", "cereal", "granola", "yogurt", "yoghurt", "cheese", "butter", "apple",
    "banana", "berries", "orange", "grapes", "avocado", "potato", "potatoes", "beans",
    "lentils", "broccoli", "spinach", "carrots", "vegetables", "veggies", "fruit", "nuts",
    "almonds", "peanut", "chocolate", "cake", "cookie", "cookies", "muffin", "pancakes",
    "waffles", "curry", "sushi", "steak", "hummus", "crackers", "popcorn", "dessert",
    "pie", "donut", "doughnut", "quinoa", "stew", "chili", "dumplings", "ice cream",
];

pub const FOOD_VERBS: &[&str] = &[
    "ate", "eat", "eating", "eaten", "had", "have", "having", "munched", "snacked", "finished",
    "grabbed", "cooked",
];

pub const DRINK_VERBS: &[&str] = &[
    "drank", "drink", "drinking", "drunk", "sipped", "sipping", "sip", "chugged",
];

/// Ordered longest phrase first so "very bad" wins over "bad".
pub const SEVERITY_ADJECTIVES: &[(&str, i64)] = &[
    ("extremely bad", 9),
    ("really bad", 8),
    ("very bad", 8),
    ("not too bad", 3),
    ("not bad", 3),
    ("a little", 3),
    ("a bit", 3),
    ("kind of", 4),
    ("unbearable", 10),
    ("excruciating", 10),
    ("worst", 10),
    ("terrible", 9),
    ("horrible", 9),
    ("awful", 9),
    ("intense", 8),
    ("severe", 8),
    ("strong", 7),
    ("sharp", 7),
    ("bad", 7),
    ("moderate", 5),
    ("medium", 5),
    ("noticeable", 4),
    ("mild", 3),
    ("slightly", 2),
    ("slight", 2),
    ("minor", 2),
    ("light", 2),
    ("faint", 1),
];

pub const QUANTITY_UNITS: &[&str] = &[
    "cup", "cups", "glass", "glasses", "bowl", "bowls", "slice", "slices", "piece", "pieces",
    "plate", "plates", "serving", "servings", "can", "cans", "bottle", "bottles", "mug", "mugs",
    "handful", "handfuls", "tbsp", "tsp", "g", "grams", "ml", "oz", "pint", "pints", "shot",
    "shots", "scoop", "scoops",
];

pub const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
];

pub const KNOWN_BRANDS: &[&str] = &[
    "starbucks",
    "dunkin",
    "mcdonald's",
    "mcdonalds",
    "chipotle",
    "subway",
    "oatly",
    "chobani",
    "nespresso",
    "costa",
    "pret",
    "kfc",
    "domino's",
    "dominos",
    "red bull",
];

pub const STOP_WORDS: &[&str] = &[
    "i", "i'm", "im", "i've", "ive", "me", "my", "we", "a", "an", "the", "some", "of", "for",
    "with", "and", "or", "at", "in", "on", "to", "this", "that", "these", "those", "just",
    "also", "then", "today", "tonight", "yesterday", "morning", "afternoon", "evening", "night",
    "ago", "hour", "hours", "minute", "minutes", "min", "mins", "am", "pm", "noon", "midnight",
    "was", "were", "is", "it", "it's", "its", "really", "very", "bit", "little", "lot", "plus",
    "after", "before", "around", "about", "like", "from", "so", "too", "again", "more", "less",
    "now", "earlier", "later", "half", "couple", "big", "small", "large", "quick", "not",
    "no", "yes", "ok", "okay", "up", "out", "got", "get", "went", "did", "do", "time", "type",
    "level", "pain", "but", "off",
];

/// Trailing meal-context phrases the canonicalizer strips from free-text fields.
pub const MEAL_CONTEXT_PHRASES: &[&str] = &[
    "for breakfast",
    "for brekkie",
    "for lunch",
    "for dinner",
    "for supper",
    "for a snack",
    "as a snack",
    "at breakfast",
    "at lunch",
    "at dinner",
    "with breakfast",
    "with lunch",
    "with dinner",
    "this morning",
    "this afternoon",
    "this evening",
    "tonight",
    "today",
];

pub const MEAL_LABELS: &[&str] = &["breakfast", "lunch", "dinner", "snack"];

const INTENT_LABELS: &[&str] = &[
    "food", "drink", "symptom", "reflux", "bm", "checkin", "other",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRule {
    OneOf(&'static [&'static str]),
    IntRange { min: i64, max: i64 },
    /// `HH:MM`, 24h.
    ClockTime,
    FreeText { max_chars: usize },
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalKey {
    pub key: &'static str,
    pub rule: ValueRule,
}

const fn canonical(key: &'static str, rule: ValueRule) -> CanonicalKey {
    CanonicalKey { key, rule }
}

pub const CANONICAL_ORDER: &[CanonicalKey] = &[
    canonical(NOTES_VERSION_KEY, ValueRule::IntRange { min: 1, max: 1 }),
    canonical("intent", ValueRule::OneOf(INTENT_LABELS)),
    canonical("item", ValueRule::FreeText { max_chars: 80 }),
    canonical("brand", ValueRule::FreeText { max_chars: 40 }),
    canonical("qty", ValueRule::FreeText { max_chars: 40 }),
    canonical("meal", ValueRule::OneOf(MEAL_LABELS)),
    canonical("meal_inferred", ValueRule::Flag),
    canonical("time", ValueRule::ClockTime),
    canonical("symptom", ValueRule::FreeText { max_chars: 60 }),
    canonical(
        "severity",
        ValueRule::IntRange {
            min: SEVERITY_MIN,
            max: SEVERITY_MAX,
        },
    ),
    canonical(
        "bristol",
        ValueRule::IntRange {
            min: BRISTOL_MIN,
            max: BRISTOL_MAX,
        },
    ),
    canonical("bristol_est", ValueRule::Flag),
    canonical("via_model", ValueRule::Flag),
];

struct Indexes {
    canonical_position: HashMap<&'static str, usize>,
    food_words: HashSet<&'static str>,
    drink_words: HashSet<&'static str>,
    breakers: HashSet<&'static str>,
}

fn indexes() -> &'static Indexes {
    static INDEXES: OnceLock<Indexes> = OnceLock::new();
    INDEXES.get_or_init(|| {
        let canonical_position = CANONICAL_ORDER
            .iter()
            .enumerate()
            .map(|(i, c)| (c.key, i))
            .collect();
        let food_words = FOOD_WORDS.iter().copied().collect();
        let drink_words = DRINK_GROUPS
            .iter()
            .flat_map(|g| g.synonyms.iter().copied())
            .collect();
        let mut breakers: HashSet<&'static str> = STOP_WORDS.iter().copied().collect();
        breakers.extend(FOOD_VERBS.iter().copied());
        breakers.extend(DRINK_VERBS.iter().copied());
        breakers.extend(QUANTITY_UNITS.iter().copied());
        breakers.extend(NUMBER_WORDS.iter().map(|(w, _)| *w));
        breakers.extend(
            MEAL_WINDOWS
                .iter()
                .flat_map(|g| g.synonyms.iter().copied())
                .filter(|s| !s.contains(' ')),
        );
        breakers.extend(
            SEVERITY_ADJECTIVES
                .iter()
                .map(|(w, _)| *w)
                .filter(|s| !s.contains(' ')),
        );
        Indexes {
            canonical_position,
            food_words,
            drink_words,
            breakers,
        }
    })
}

/// Lower-case, whitespace-collapsed form used for matching and as the cache key.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Word-boundary phrase search over already-normalized text.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    find_phrase(haystack, needle).is_some()
}

/// Byte offset of the first word-bounded occurrence of `needle`.
pub fn find_phrase(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    let bytes = haystack.as_bytes();
    let n = needle.as_bytes();
    let mut i = 0usize;
    while i + n.len() <= bytes.len() {
        if &bytes[i..i + n.len()] == n {
            let left_ok = i == 0 || !is_word_byte(bytes[i - 1]);
            let right_ok = i + n.len() == bytes.len() || !is_word_byte(bytes[i + n.len()]);
            if left_ok && right_ok {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'\''
}

pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(text, p))
}

/// First phrase from `phrases` (in table order) present in `text`.
pub fn first_match<'a>(text: &str, phrases: &[&'a str]) -> Option<&'a str> {
    phrases.iter().copied().find(|p| contains_phrase(text, p))
}

pub fn contains_synonym(text: &str, group: &SynonymGroup) -> bool {
    contains_any(text, group.synonyms)
}

/// Canonical label of the first group (in table order) with a synonym present in `text`.
pub fn find_synonym_group(text: &str, groups: &[SynonymGroup]) -> Option<&'static str> {
    groups
        .iter()
        .find(|g| contains_synonym(text, g))
        .map(|g| g.label)
}

pub fn extract_severity_from_adjectives(text: &str) -> Option<i64> {
    SEVERITY_ADJECTIVES
        .iter()
        .find(|(phrase, _)| contains_phrase(text, phrase))
        .map(|(_, v)| *v)
}

pub fn bristol_for_descriptor(label: &str) -> Option<i64> {
    match label {
        "loose" => Some(6),
        "hard" => Some(2),
        "normal" => Some(4),
        _ => None,
    }
}

pub fn number_word_value(word: &str) -> Option<u32> {
    NUMBER_WORDS
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, v)| *v)
}

pub fn is_food_word(word: &str) -> bool {
    indexes().food_words.contains(word)
}

pub fn is_drink_word(word: &str) -> bool {
    indexes().drink_words.contains(word)
}

/// True when `word` can never be part of an item noun phrase.
pub fn is_phrase_breaker(word: &str) -> bool {
    indexes().breakers.contains(word) || word.chars().any(|c| c.is_ascii_digit())
}

pub fn mentions_food(text: &str) -> bool {
    contains_any(text, FOOD_WORDS)
}

pub fn mentions_drink(text: &str) -> bool {
    DRINK_GROUPS.iter().any(|g| contains_synonym(text, g))
}

pub fn canonical_rule(key: &str) -> Option<ValueRule> {
    canonical_position(key).map(|i| CANONICAL_ORDER[i].rule)
}

pub fn canonical_position(key: &str) -> Option<usize> {
    indexes().canonical_position.get(key).copied()
}

/// Checks a token value against the controlled vocabulary. `None` means a flag token.
/// Keys outside the vocabulary accept any non-empty value.
pub fn is_valid_value(key: &str, value: Option<&str>) -> bool {
    if !is_valid_token_key(key) {
        return false;
    }
    let Some(rule) = canonical_rule(key) else {
        return value.map_or(true, |v| !v.trim().is_empty());
    };
    match (rule, value) {
        (ValueRule::Flag, None) => true,
        (ValueRule::Flag, Some(_)) | (_, None) => false,
        (ValueRule::OneOf(allowed), Some(v)) => allowed.contains(&v),
        (ValueRule::IntRange { min, max }, Some(v)) => v
            .parse::<i64>()
            .map(|n| (min..=max).contains(&n))
            .unwrap_or(false),
        (ValueRule::ClockTime, Some(v)) => is_clock_time(v),
        (ValueRule::FreeText { max_chars }, Some(v)) => {
            let n = v.chars().count();
            n > 0 && n <= max_chars && v.trim() == v
        }
    }
}

fn is_clock_time(v: &str) -> bool {
    let Some((h, m)) = v.split_once(':') else {
        return false;
    };
    if h.len() != 2 || m.len() != 2 {
        return false;
    }
    matches!((h.parse::<u32>(), m.parse::<u32>()), (Ok(h), Ok(m)) if h < 24 && m < 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_ontology_01_phrase_match_respects_word_boundaries() {
        assert!(contains_phrase("i had tea", "tea"));
        assert!(!contains_phrase("i had steak", "tea"));
        assert!(contains_phrase("mild stomach pain.", "stomach pain"));
        assert!(!contains_phrase("", "tea"));
    }

    #[test]
    fn at_ontology_02_synonym_group_returns_canonical_label() {
        assert_eq!(find_synonym_group("a flat white", DRINK_GROUPS), Some("coffee"));
        assert_eq!(find_synonym_group("for supper", MEAL_WINDOWS), Some("dinner"));
        assert_eq!(find_synonym_group("asdkj qwe", SYMPTOM_GROUPS), None);
        assert_eq!(find_synonym_group("tummy ache", SYMPTOM_GROUPS), Some("stomach pain"));
        assert_eq!(find_synonym_group("sore knee", SYMPTOM_GROUPS), Some("pain"));
    }

    #[test]
    fn at_ontology_03_severity_adjectives_longest_first() {
        assert_eq!(extract_severity_from_adjectives("mild reflux"), Some(3));
        assert_eq!(extract_severity_from_adjectives("severe cramps"), Some(8));
        assert_eq!(extract_severity_from_adjectives("very bad gas"), Some(8));
        assert_eq!(extract_severity_from_adjectives("not bad"), Some(3));
        assert_eq!(extract_severity_from_adjectives("reflux"), None);
    }

    #[test]
    fn at_ontology_04_value_validators() {
        assert!(is_valid_value("severity", Some("10")));
        assert!(!is_valid_value("severity", Some("11")));
        assert!(!is_valid_value("bristol", Some("0")));
        assert!(is_valid_value("meal", Some("lunch")));
        assert!(!is_valid_value("meal", Some("brunch")));
        assert!(is_valid_value("time", Some("07:05")));
        assert!(!is_valid_value("time", Some("7:05")));
        assert!(is_valid_value("meal_inferred", None));
        assert!(!is_valid_value("meal_inferred", Some("yes")));
        assert!(is_valid_value("spice_level", Some("hot")));
        assert!(!is_valid_value("Spice", Some("hot")));
    }

    #[test]
    fn at_ontology_05_canonical_positions() {
        assert_eq!(canonical_position(NOTES_VERSION_KEY), Some(0));
        assert!(canonical_position("intent") < canonical_position("item"));
        assert_eq!(canonical_position("spice_level"), None);
    }

    #[test]
    fn at_ontology_06_normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  BM   Bristol\t4 "), "bm bristol 4");
        assert_eq!(normalize_text(""), "");
    }
}

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::{ContractViolation, SchemaVersion, Validate};

pub const PARSE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Confidence assigned to a result nothing could be extracted from.
pub const DEFAULT_CONFIDENCE: f32 = 0.3;

pub const SEVERITY_MIN: i64 = 1;
pub const SEVERITY_MAX: i64 = 10;
pub const BRISTOL_MIN: i64 = 1;
pub const BRISTOL_MAX: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Food,
    Drink,
    Symptom,
    Reflux,
    Bm,
    Checkin,
    Other,
}

static FOOD_CRITICAL: [SlotKey; 1] = [SlotKey::Item];
static DRINK_CRITICAL: [SlotKey; 1] = [SlotKey::Item];
static SYMPTOM_CRITICAL: [SlotKey; 2] = [SlotKey::SymptomType, SlotKey::Severity];
static REFLUX_CRITICAL: [SlotKey; 1] = [SlotKey::Severity];
static BM_CRITICAL: [SlotKey; 1] = [SlotKey::Bristol];

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::Food,
        Intent::Drink,
        Intent::Symptom,
        Intent::Reflux,
        Intent::Bm,
        Intent::Checkin,
        Intent::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Food => "food",
            Intent::Drink => "drink",
            Intent::Symptom => "symptom",
            Intent::Reflux => "reflux",
            Intent::Bm => "bm",
            Intent::Checkin => "checkin",
            Intent::Other => "other",
        }
    }

    /// Lenient label decoding for external sources. Unknown labels become `Other`.
    pub fn from_label(label: &str) -> Intent {
        match label.trim().to_ascii_lowercase().as_str() {
            "food" | "meal" => Intent::Food,
            "drink" | "beverage" => Intent::Drink,
            "symptom" => Intent::Symptom,
            "reflux" => Intent::Reflux,
            "bm" | "bowel_movement" | "bowel" => Intent::Bm,
            "checkin" | "check_in" | "check-in" => Intent::Checkin,
            _ => Intent::Other,
        }
    }

    /// Slots that must be filled for a result with this intent to be complete.
    pub fn critical_slots(self) -> &'static [SlotKey] {
        match self {
            Intent::Food => &FOOD_CRITICAL,
            Intent::Drink => &DRINK_CRITICAL,
            Intent::Symptom => &SYMPTOM_CRITICAL,
            Intent::Reflux => &REFLUX_CRITICAL,
            Intent::Bm => &BM_CRITICAL,
            Intent::Checkin | Intent::Other => &[],
        }
    }

    pub fn is_intake(self) -> bool {
        matches!(self, Intent::Food | Intent::Drink)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SlotKey {
    Item,
    MealTime,
    Quantity,
    Brand,
    /// Clock time of the event, `HH:MM` (24h).
    Time,
    SymptomType,
    Severity,
    Bristol,
    /// Only ever appears in `missing`: nothing usable was extracted.
    ClarificationNeeded,
    Custom(String),
}

impl SlotKey {
    pub fn as_str(&self) -> &str {
        match self {
            SlotKey::Item => "item",
            SlotKey::MealTime => "meal_time",
            SlotKey::Quantity => "quantity",
            SlotKey::Brand => "brand",
            SlotKey::Time => "time",
            SlotKey::SymptomType => "symptom_type",
            SlotKey::Severity => "severity",
            SlotKey::Bristol => "bristol",
            SlotKey::ClarificationNeeded => "clarification_needed",
            SlotKey::Custom(name) => name.as_str(),
        }
    }

    pub fn from_name(name: &str) -> SlotKey {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "item" => SlotKey::Item,
            "meal_time" => SlotKey::MealTime,
            "quantity" => SlotKey::Quantity,
            "brand" => SlotKey::Brand,
            "time" => SlotKey::Time,
            "symptom_type" => SlotKey::SymptomType,
            "severity" => SlotKey::Severity,
            "bristol" => SlotKey::Bristol,
            "clarification_needed" => SlotKey::ClarificationNeeded,
            _ => SlotKey::Custom(name),
        }
    }
}

impl From<String> for SlotKey {
    fn from(value: String) -> Self {
        SlotKey::from_name(&value)
    }
}

impl From<SlotKey> for String {
    fn from(value: SlotKey) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    Int(i64),
    Text(String),
}

impl SlotValue {
    pub fn text(value: impl Into<String>) -> Self {
        SlotValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SlotValue::Text(t) => Some(t.as_str()),
            SlotValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SlotValue::Int(v) => Some(*v),
            SlotValue::Text(_) => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            SlotValue::Text(t) => t.trim().is_empty(),
            SlotValue::Int(_) => false,
        }
    }

    pub fn render(&self) -> String {
        match self {
            SlotValue::Text(t) => t.clone(),
            SlotValue::Int(v) => v.to_string(),
        }
    }
}

/// Where a slot value came from. Only `Explicit` values are authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Explicit,
    Inferred,
    Estimated,
    Model,
    Learned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub value: SlotValue,
    pub provenance: Provenance,
}

impl Slot {
    pub fn new(value: SlotValue, provenance: Provenance) -> Self {
        Self { value, provenance }
    }

    pub fn explicit(value: SlotValue) -> Self {
        Self::new(value, Provenance::Explicit)
    }

    pub fn inferred(value: SlotValue) -> Self {
        Self::new(value, Provenance::Inferred)
    }
}

pub type SlotMap = BTreeMap<SlotKey, Slot>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub schema_version: SchemaVersion,
    pub intent: Intent,
    pub confidence: f32,
    pub slots: SlotMap,
    pub missing: Vec<SlotKey>,
}

impl ParseResult {
    pub fn v1(
        intent: Intent,
        confidence: f32,
        slots: SlotMap,
        missing: Vec<SlotKey>,
    ) -> Result<Self, ContractViolation> {
        let mut deduped: Vec<SlotKey> = Vec::with_capacity(missing.len());
        for key in missing {
            if !deduped.contains(&key) {
                deduped.push(key);
            }
        }
        let r = Self {
            schema_version: PARSE_CONTRACT_VERSION,
            intent,
            confidence,
            slots,
            missing: deduped,
        };
        r.validate()?;
        Ok(r)
    }

    /// The fail-closed result: intent other, low confidence, clarification needed.
    pub fn needs_clarification() -> Self {
        Self {
            schema_version: PARSE_CONTRACT_VERSION,
            intent: Intent::Other,
            confidence: DEFAULT_CONFIDENCE,
            slots: SlotMap::new(),
            missing: vec![SlotKey::ClarificationNeeded],
        }
    }

    pub fn slot(&self, key: &SlotKey) -> Option<&Slot> {
        self.slots.get(key)
    }

    pub fn slot_text(&self, key: &SlotKey) -> Option<&str> {
        self.slots.get(key).and_then(|s| s.value.as_text())
    }

    pub fn slot_int(&self, key: &SlotKey) -> Option<i64> {
        self.slots.get(key).and_then(|s| s.value.as_int())
    }

    pub fn has_slot(&self, key: &SlotKey) -> bool {
        self.slots.get(key).is_some_and(|s| !s.value.is_blank())
    }

    pub fn missing_critical(&self) -> Vec<SlotKey> {
        self.intent
            .critical_slots()
            .iter()
            .filter(|k| !self.has_slot(k))
            .cloned()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.missing_critical().is_empty()
    }
}

impl Validate for ParseResult {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != PARSE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "parse_result.schema_version",
                reason: "must match PARSE_CONTRACT_VERSION",
            });
        }
        if !self.confidence.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "parse_result.confidence",
            });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ContractViolation::InvalidRange {
                field: "parse_result.confidence",
                min: 0.0,
                max: 1.0,
                got: f64::from(self.confidence),
            });
        }
        if self.slots.contains_key(&SlotKey::ClarificationNeeded) {
            return Err(ContractViolation::InvalidValue {
                field: "parse_result.slots",
                reason: "clarification_needed is not a fillable slot",
            });
        }
        for key in &self.missing {
            if self.has_slot(key) {
                return Err(ContractViolation::InvalidValue {
                    field: "parse_result.missing",
                    reason: "must not contain a filled slot",
                });
            }
        }
        if let Some(v) = self.slot_int(&SlotKey::Severity) {
            check_range("parse_result.slots.severity", v, SEVERITY_MIN, SEVERITY_MAX)?;
        }
        if let Some(v) = self.slot_int(&SlotKey::Bristol) {
            check_range("parse_result.slots.bristol", v, BRISTOL_MIN, BRISTOL_MAX)?;
        }
        Ok(())
    }
}

fn check_range(field: &'static str, v: i64, min: i64, max: i64) -> Result<(), ContractViolation> {
    if v < min || v > max {
        return Err(ContractViolation::InvalidRange {
            field,
            min: min as f64,
            max: max as f64,
            got: v as f64,
        });
    }
    Ok(())
}

pub fn clamp_severity(v: i64) -> i64 {
    v.clamp(SEVERITY_MIN, SEVERITY_MAX)
}

pub fn clamp_bristol(v: i64) -> i64 {
    v.clamp(BRISTOL_MIN, BRISTOL_MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentItem {
    pub item: String,
    pub intent: Intent,
}

/// Caller-supplied context for one message. Engines never read the wall clock themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseContext {
    pub user_id: Option<String>,
    pub now: NaiveDateTime,
    /// Most recent first.
    pub recent_items: Vec<RecentItem>,
}

impl ParseContext {
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            user_id: None,
            now,
            recent_items: Vec::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_recent_items(mut self, recent_items: Vec<RecentItem>) -> Self {
        self.recent_items = recent_items;
        self
    }

    pub fn hour(&self) -> u32 {
        self.now.hour()
    }
}

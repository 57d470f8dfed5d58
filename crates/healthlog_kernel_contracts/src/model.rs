#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::parse::{Intent, SlotKey, SlotValue};
use crate::{ContractViolation, SchemaVersion, Validate};

pub const MODEL_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const MODEL_MAX_USER_TEXT_CHARS: usize = 2_048;
pub const MODEL_MAX_OUTPUT_TOKENS: u16 = 1_024;
pub const MODEL_MAX_TIMEOUT_MS: u32 = 10_000;

/// One bounded extraction request to the external model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCallRequest {
    pub schema_version: SchemaVersion,
    pub system_instruction: String,
    pub user_text: String,
    pub temperature: f32,
    pub max_output_tokens: u16,
    pub timeout_ms: u32,
}

impl ModelCallRequest {
    pub fn v1(
        system_instruction: String,
        user_text: String,
        max_output_tokens: u16,
        timeout_ms: u32,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: MODEL_CONTRACT_VERSION,
            system_instruction,
            user_text,
            temperature: 0.0,
            max_output_tokens,
            timeout_ms,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for ModelCallRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.system_instruction.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "model_call_request.system_instruction",
                reason: "must not be empty",
            });
        }
        if self.user_text.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "model_call_request.user_text",
                reason: "must not be empty",
            });
        }
        if self.user_text.chars().count() > MODEL_MAX_USER_TEXT_CHARS {
            return Err(ContractViolation::InvalidValue {
                field: "model_call_request.user_text",
                reason: "must be <= 2048 chars",
            });
        }
        if self.temperature != 0.0 {
            return Err(ContractViolation::InvalidValue {
                field: "model_call_request.temperature",
                reason: "must be 0",
            });
        }
        if self.max_output_tokens == 0 || self.max_output_tokens > MODEL_MAX_OUTPUT_TOKENS {
            return Err(ContractViolation::InvalidRange {
                field: "model_call_request.max_output_tokens",
                min: 1.0,
                max: f64::from(MODEL_MAX_OUTPUT_TOKENS),
                got: f64::from(self.max_output_tokens),
            });
        }
        if self.timeout_ms == 0 || self.timeout_ms > MODEL_MAX_TIMEOUT_MS {
            return Err(ContractViolation::InvalidRange {
                field: "model_call_request.timeout_ms",
                min: 1.0,
                max: f64::from(MODEL_MAX_TIMEOUT_MS),
                got: f64::from(self.timeout_ms),
            });
        }
        Ok(())
    }
}

/// Raw extraction returned by the model, before merging with the rules result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelExtraction {
    pub intent: Intent,
    pub slots: BTreeMap<SlotKey, SlotValue>,
    pub confidence: Option<f32>,
    pub missing: Vec<SlotKey>,
}

pub fn decode_model_extraction_json(json_text: &str) -> Result<ModelExtraction, ContractViolation> {
    let value: Value = serde_json::from_str(strip_code_fence(json_text)).map_err(|_| {
        ContractViolation::InvalidValue {
            field: "model_extraction_json",
            reason: "must be valid JSON object",
        }
    })?;
    let obj = value.as_object().ok_or(ContractViolation::InvalidValue {
        field: "model_extraction_json",
        reason: "must be a JSON object",
    })?;

    let intent_label = obj.get("intent").and_then(|v| v.as_str()).ok_or(
        ContractViolation::InvalidValue {
            field: "model_extraction_json.intent",
            reason: "must be present",
        },
    )?;
    if intent_label.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field: "model_extraction_json.intent",
            reason: "must not be empty",
        });
    }
    let intent = Intent::from_label(intent_label);

    let mut slots = BTreeMap::new();
    match obj.get("slots") {
        None | Some(Value::Null) => {}
        Some(Value::Object(raw)) => {
            for (name, v) in raw {
                let key = SlotKey::from_name(name);
                if key == SlotKey::ClarificationNeeded || key.as_str().is_empty() {
                    continue;
                }
                if let Some(sv) = slot_value_from_json(v) {
                    slots.insert(key, sv);
                }
            }
        }
        Some(_) => {
            return Err(ContractViolation::InvalidValue {
                field: "model_extraction_json.slots",
                reason: "must be a JSON object",
            })
        }
    }

    let confidence = match obj.get("confidence") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let c = v.as_f64().ok_or(ContractViolation::InvalidValue {
                field: "model_extraction_json.confidence",
                reason: "must be a number",
            })?;
            if !(0.0..=1.0).contains(&c) {
                return Err(ContractViolation::InvalidRange {
                    field: "model_extraction_json.confidence",
                    min: 0.0,
                    max: 1.0,
                    got: c,
                });
            }
            Some(c as f32)
        }
    };

    let mut missing = Vec::new();
    if let Some(raw) = obj.get("missing").and_then(|v| v.as_array()) {
        for name in raw.iter().filter_map(|v| v.as_str()) {
            let key = SlotKey::from_name(name);
            if key.as_str().is_empty() || slots.contains_key(&key) || missing.contains(&key) {
                continue;
            }
            missing.push(key);
        }
    }

    Ok(ModelExtraction {
        intent,
        slots,
        confidence,
        missing,
    })
}

fn slot_value_from_json(v: &Value) -> Option<SlotValue> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(SlotValue::Text(t.to_string()))
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(SlotValue::Int(i))
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| SlotValue::Int(f.round() as i64))
            }
        }
        _ => None,
    }
}

// Some providers wrap JSON-only answers in a markdown fence anyway.
fn strip_code_fence(raw: &str) -> &str {
    let t = raw.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ContractViolation, Validate};

pub const NOTES_VERSION: u32 = 1;
pub const NOTES_VERSION_KEY: &str = "notes_v";
pub const NOTES_SEPARATOR: &str = "; ";

/// A canonical `key=value` pair, or a bare `key` flag when `value` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotesToken {
    pub key: String,
    pub value: Option<String>,
}

impl NotesToken {
    pub fn pair(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn flag(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn is_flag(&self) -> bool {
        self.value.is_none()
    }
}

impl fmt::Display for NotesToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.key, v),
            None => f.write_str(&self.key),
        }
    }
}

pub fn is_valid_token_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

impl Validate for NotesToken {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !is_valid_token_key(&self.key) {
            return Err(ContractViolation::InvalidValue {
                field: "notes_token.key",
                reason: "must match [a-z0-9_]+",
            });
        }
        if let Some(v) = &self.value {
            if v.trim().is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "notes_token.value",
                    reason: "must not be empty",
                });
            }
            if v != v.trim() || v.contains([';', '=', '\n', '\r']) {
                return Err(ContractViolation::InvalidValue {
                    field: "notes_token.value",
                    reason: "must be trimmed and free of ';', '=' and newlines",
                });
            }
        }
        Ok(())
    }
}

/// The version-tagged canonical notes string stored as a flat text field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesLine {
    pub version: u32,
    /// Ordered tokens, excluding the version token.
    pub tokens: Vec<NotesToken>,
}

impl NotesLine {
    pub fn v1(tokens: Vec<NotesToken>) -> Result<Self, ContractViolation> {
        let line = Self {
            version: NOTES_VERSION,
            tokens,
        };
        line.validate()?;
        Ok(line)
    }

    pub fn get(&self, key: &str) -> Option<&NotesToken> {
        self.tokens.iter().find(|t| t.key == key)
    }

    pub fn render(&self) -> String {
        let mut out = format!("{NOTES_VERSION_KEY}={}", self.version);
        for t in &self.tokens {
            out.push_str(NOTES_SEPARATOR);
            out.push_str(&t.to_string());
        }
        out
    }
}

impl fmt::Display for NotesLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl Validate for NotesLine {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.version != NOTES_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "notes_line.version",
                reason: "unsupported notes version",
            });
        }
        for (i, t) in self.tokens.iter().enumerate() {
            t.validate()?;
            if t.key == NOTES_VERSION_KEY {
                return Err(ContractViolation::InvalidValue {
                    field: "notes_line.tokens",
                    reason: "version token must only appear first",
                });
            }
            if self.tokens[..i].iter().any(|prev| prev.key == t.key) {
                return Err(ContractViolation::InvalidValue {
                    field: "notes_line.tokens",
                    reason: "keys must be unique",
                });
            }
        }
        Ok(())
    }
}

pub fn parse_notes_line(line: &str) -> Result<NotesLine, ContractViolation> {
    let mut parts = line.trim().split(';').map(str::trim);
    let head = parts.next().unwrap_or("");
    let version = match head.split_once('=') {
        Some((k, v)) if k.trim() == NOTES_VERSION_KEY => {
            v.trim()
                .parse::<u32>()
                .map_err(|_| ContractViolation::InvalidValue {
                    field: "notes_line.version",
                    reason: "must be an integer",
                })?
        }
        _ => {
            return Err(ContractViolation::InvalidValue {
                field: "notes_line.version",
                reason: "version token must come first",
            })
        }
    };

    let mut tokens = Vec::new();
    for part in parts {
        if part.is_empty() {
            continue;
        }
        let token = match part.split_once('=') {
            Some((k, v)) => NotesToken::pair(k.trim(), v.trim()),
            None => NotesToken::flag(part),
        };
        tokens.push(token);
    }

    let parsed = NotesLine { version, tokens };
    parsed.validate()?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn at_notes_01_renders_version_first() {
        let line = NotesLine::v1(vec![
            NotesToken::pair("intent", "bm"),
            NotesToken::pair("bristol", "4"),
            NotesToken::flag("bristol_est"),
        ])
        .unwrap();
        assert_eq!(line.render(), "notes_v=1; intent=bm; bristol=4; bristol_est");
    }

    #[test]
    fn at_notes_02_parse_requires_version_head() {
        assert!(parse_notes_line("intent=food; notes_v=1").is_err());
        assert!(parse_notes_line("notes_v=9; intent=food").is_err());
        let parsed = parse_notes_line("notes_v=1; intent=food; meal_inferred").unwrap();
        assert_eq!(parsed.tokens.len(), 2);
        assert!(parsed.get("meal_inferred").unwrap().is_flag());
    }

    #[test]
    fn at_notes_03_rejects_duplicate_and_bad_keys() {
        assert!(parse_notes_line("notes_v=1; item=a; item=b").is_err());
        assert!(NotesLine::v1(vec![NotesToken::pair("Item", "x")]).is_err());
        assert!(NotesLine::v1(vec![NotesToken::pair("item", "a=b")]).is_err());
    }

    proptest! {
        #[test]
        fn rendered_lines_parse_back(values in proptest::collection::vec("[a-z][a-z ]{0,10}[a-z]", 1..5)) {
            let tokens: Vec<NotesToken> = values
                .iter()
                .enumerate()
                .map(|(i, v)| NotesToken::pair(format!("k{i}"), v.clone()))
                .collect();
            let line = NotesLine::v1(tokens).unwrap();
            let back = parse_notes_line(&line.render()).unwrap();
            prop_assert_eq!(back, line);
        }
    }
}

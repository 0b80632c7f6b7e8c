//! The uniform result envelope returned by every roll, attack and save.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::AdMode;

pub const MAX_EXTENSIONS: usize = 16;
pub const MAX_EXTENSION_KEY_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CalcValue {
    Number(i64),
    Text(String),
}

impl CalcValue {
    pub fn as_number(&self) -> Option<i64> {
        match self {
            CalcValue::Number(n) => Some(*n),
            CalcValue::Text(_) => None,
        }
    }
}

impl From<i64> for CalcValue {
    fn from(n: i64) -> Self {
        CalcValue::Number(n)
    }
}

impl From<i32> for CalcValue {
    fn from(n: i32) -> Self {
        CalcValue::Number(i64::from(n))
    }
}

impl From<String> for CalcValue {
    fn from(s: String) -> Self {
        CalcValue::Text(s)
    }
}

impl From<&str> for CalcValue {
    fn from(s: &str) -> Self {
        CalcValue::Text(s.to_string())
    }
}

/// Scalar values allowed in the extension side channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Rule-specific extras, capped in size and restricted to scalars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extensions(IndexMap<String, ExtValue>);

impl Extensions {
    pub fn insert(&mut self, key: impl Into<String>, value: ExtValue) -> Result<()> {
        let key = key.into();
        if key.is_empty() || key.len() > MAX_EXTENSION_KEY_LEN {
            return Err(EngineError::validation(
                "extensions",
                format!("key must be 1..={} bytes", MAX_EXTENSION_KEY_LEN),
            ));
        }
        if !self.0.contains_key(&key) && self.0.len() >= MAX_EXTENSIONS {
            return Err(EngineError::validation(
                "extensions",
                format!("at most {} entries", MAX_EXTENSIONS),
            ));
        }
        self.0.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ExtValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Crit,
    Hit,
    Miss,
    Success,
    Failure,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalcMetadata {
    /// Die faces actually drawn. With advantage/disadvantage, index 0 is the kept die.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rolls: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<AdMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub input: String,
    pub result: CalcValue,
    pub steps: Vec<String>,
    #[serde(default)]
    pub metadata: CalcMetadata,
    pub timestamp: DateTime<Utc>,
}

impl CalculationResult {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            result: CalcValue::Number(0),
            steps: Vec::new(),
            metadata: CalcMetadata::default(),
            timestamp: Utc::now(),
        }
    }

    /// Steps are append-only.
    pub fn step(&mut self, text: impl Into<String>) {
        self.steps.push(text.into());
    }

    pub fn with_result(mut self, value: impl Into<CalcValue>) -> Self {
        self.result = value.into();
        self
    }

    pub fn total(&self) -> Option<i64> {
        self.result.as_number()
    }

    /// Fold another result's trace into this one, keeping order.
    pub fn absorb(&mut self, other: &CalculationResult) {
        self.steps.extend(other.steps.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_bounded() {
        let mut ext = Extensions::default();
        for i in 0..MAX_EXTENSIONS {
            ext.insert(format!("k{i}"), ExtValue::Int(i as i64)).unwrap();
        }
        assert!(ext.insert("overflow", ExtValue::Bool(true)).is_err());
        // overwriting an existing key is still allowed at the cap
        assert!(ext.insert("k0", ExtValue::Bool(true)).is_ok());
        assert!(ext.insert("x".repeat(65), ExtValue::Bool(true)).is_err());
    }

    #[test]
    fn result_serializes_number_or_text() {
        let num = CalculationResult::new("1d4").with_result(3);
        let json = serde_json::to_value(&num).unwrap();
        assert_eq!(json["result"], 3);
        let text = CalculationResult::new("move").with_result("moved");
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json["result"], "moved");
    }
}

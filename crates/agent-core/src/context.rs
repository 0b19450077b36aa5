//! Accumulated Medical Context
//!
//! Facts extracted over a conversation. Merging is monotonic: list fields are
//! unioned, scalar fields are only replaced by non-empty values, so a later,
//! sparser update can never erase what an earlier turn recorded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Facts collected about the patient's complaint
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalContext {
    #[serde(default)]
    pub symptoms: Vec<String>,

    #[serde(default)]
    pub severity: String,

    #[serde(default)]
    pub duration: String,

    #[serde(default)]
    pub triggers: Vec<String>,

    /// Relevant medical history (conditions, medication, allergies)
    #[serde(default)]
    pub history: Vec<String>,

    /// Other scalar facts such as age or sex
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Partial update proposed by the reasoning step
///
/// Every field is optional; absent and empty fields are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalContextUpdate {
    #[serde(default, deserialize_with = "lenient_list")]
    pub symptoms: Option<Vec<String>>,

    #[serde(default, deserialize_with = "lenient_scalar")]
    pub severity: Option<String>,

    #[serde(default, deserialize_with = "lenient_scalar")]
    pub duration: Option<String>,

    #[serde(default, deserialize_with = "lenient_list")]
    pub triggers: Option<Vec<String>>,

    #[serde(default, deserialize_with = "lenient_list")]
    pub history: Option<Vec<String>>,

    #[serde(default)]
    pub attributes: Option<BTreeMap<String, serde_json::Value>>,
}

impl MedicalContext {
    /// Merge an update into the context
    ///
    /// Returns `true` when anything changed.
    pub fn merge(&mut self, update: &MedicalContextUpdate) -> bool {
        let mut changed = false;

        if let Some(items) = &update.symptoms {
            changed |= union_into(&mut self.symptoms, items);
        }
        if let Some(items) = &update.triggers {
            changed |= union_into(&mut self.triggers, items);
        }
        if let Some(items) = &update.history {
            changed |= union_into(&mut self.history, items);
        }
        if let Some(value) = &update.severity {
            changed |= overwrite_if_nonempty(&mut self.severity, value);
        }
        if let Some(value) = &update.duration {
            changed |= overwrite_if_nonempty(&mut self.duration, value);
        }
        if let Some(attributes) = &update.attributes {
            for (key, value) in attributes {
                let Some(text) = scalar_text(value) else {
                    continue;
                };
                let slot = self.attributes.entry(key.clone()).or_default();
                changed |= overwrite_if_nonempty(slot, &text);
            }
            self.attributes.retain(|_, v| !v.is_empty());
        }

        changed
    }

    /// Whether no fact has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty()
            && self.severity.is_empty()
            && self.duration.is_empty()
            && self.triggers.is_empty()
            && self.history.is_empty()
            && self.attributes.is_empty()
    }
}

fn union_into(target: &mut Vec<String>, items: &[String]) -> bool {
    let mut changed = false;
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if !target.iter().any(|existing| existing.eq_ignore_ascii_case(item)) {
            target.push(item.to_string());
            changed = true;
        }
    }
    changed
}

fn overwrite_if_nonempty(target: &mut String, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || target == value {
        return false;
    }
    *target = value.to_string();
    true
}

fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Accept a list, a single string, or null
fn lenient_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => {
            Some(items.iter().filter_map(scalar_text).collect())
        }
        Some(serde_json::Value::String(s)) => Some(vec![s]),
        _ => None,
    })
}

/// Accept a string or number, or null
fn lenient_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_text))
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Current value of one field. The shape follows the field kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Text(String),
    Set(Vec<String>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::Set(values.into_iter().map(Into::into).collect())
    }

    /// True for `""` (after trimming), `false` and `[]`.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Flag(checked) => !checked,
            FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::Set(values) => values.is_empty(),
        }
    }

    /// Scalar view: the text itself, the first member of a set, `"true"` for a checked flag.
    pub fn first_text(&self) -> &str {
        match self {
            FieldValue::Text(text) => text,
            FieldValue::Set(values) => values.first().map(String::as_str).unwrap_or(""),
            FieldValue::Flag(true) => "true",
            FieldValue::Flag(false) => "",
        }
    }

    pub fn contains(&self, needle: &str) -> bool {
        match self {
            FieldValue::Text(text) => text == needle,
            FieldValue::Set(values) => values.iter().any(|value| value == needle),
            FieldValue::Flag(_) => false,
        }
    }

    /// Members as a list; scalars become a one-element list unless empty.
    pub fn members(&self) -> Vec<String> {
        match self {
            FieldValue::Set(values) => values.clone(),
            FieldValue::Text(text) if !text.is_empty() => vec![text.clone()],
            FieldValue::Flag(true) => vec!["true".into()],
            _ => Vec::new(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        FieldValue::Set(values)
    }
}

/// The single source of truth: answered values plus range display outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormState {
    values: BTreeMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, String>,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Scalar text of a field, `""` when absent.
    pub fn text(&self, name: &str) -> &str {
        self.values
            .get(name)
            .map(FieldValue::first_text)
            .unwrap_or("")
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    pub fn output(&self, id: &str) -> Option<&str> {
        self.outputs.get(id).map(String::as_str)
    }

    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    /// Names with a non-empty value.
    pub fn answered(&self) -> impl Iterator<Item = &str> {
        self.values
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, _)| name.as_str())
    }

    pub(crate) fn put(&mut self, name: &str, value: FieldValue) -> bool {
        match self.values.get(name) {
            Some(current) if *current == value => false,
            _ => {
                self.values.insert(name.to_string(), value);
                true
            }
        }
    }

    pub(crate) fn put_output(&mut self, id: &str, text: String) {
        self.outputs.insert(id.to_string(), text);
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.outputs.clear();
    }
}

use std::collections::BTreeMap;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::Condition;
use crate::spec::derived::DerivedSpec;
use crate::spec::field::{ChoiceSpec, FieldKind, FieldSpec};
use crate::spec::payload::PayloadSpec;

pub const DEFAULT_STORAGE_KEY: &str = "physio-questionnaire-v1";

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("form '{0}' has no sections")]
    NoSections(String),
    #[error("group '{0}' contains a field without a name")]
    UnnamedField(String),
    #[error("field '{name}' is declared as both {first} and {second}")]
    ConflictingKind {
        name: String,
        first: &'static str,
        second: &'static str,
    },
    #[error("field '{name}' has an invalid pattern: {message}")]
    InvalidPattern { name: String, message: String },
    #[error("field '{0}' has min greater than max")]
    InvalidBounds(String),
    #[error("derived binding refers to unknown field '{0}'")]
    UnknownDerivedField(String),
    #[error("group id '{0}' is used more than once")]
    DuplicateGroup(String),
}

/// A block of fields that is shown or hidden as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GroupSpec {
    pub id: String,
    /// Group heading (legend of the fieldset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,
    /// Question text shown above the controls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub visible_if: Option<Condition>,
    pub fields: Vec<FieldSpec>,
}

/// One step of the questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SectionSpec {
    pub id: String,
    pub heading: String,
    pub groups: Vec<GroupSpec>,
}

/// Top-level questionnaire definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormSpec {
    pub id: String,
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    pub sections: Vec<SectionSpec>,
    #[serde(default)]
    pub derived: DerivedSpec,
    #[serde(default)]
    pub payload: PayloadSpec,
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.into()
}

impl FormSpec {
    /// Every field descriptor with its section index and group, in document order.
    pub fn fields(&self) -> impl Iterator<Item = (usize, &GroupSpec, &FieldSpec)> {
        self.sections
            .iter()
            .enumerate()
            .flat_map(|(index, section)| {
                section
                    .groups
                    .iter()
                    .flat_map(move |group| group.fields.iter().map(move |field| (index, group, field)))
            })
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupSpec> {
        self.sections.iter().flat_map(|section| section.groups.iter())
    }

    pub fn group(&self, id: &str) -> Option<&GroupSpec> {
        self.groups().find(|group| group.id == id)
    }

    /// First descriptor carrying `name`.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields()
            .map(|(_, _, field)| field)
            .find(|field| field.name == name)
    }

    pub fn descriptors<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = (usize, &'a GroupSpec, &'a FieldSpec)> + use<'a, 'n> {
        self.fields().filter(move |(_, _, field)| field.name == name)
    }

    /// Distinct field names in document order.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (_, _, field) in self.fields() {
            if !names.contains(&field.name.as_str()) {
                names.push(field.name.as_str());
            }
        }
        names
    }

    /// Union of the options of every descriptor sharing `name`, first occurrence wins.
    pub fn options_of(&self, name: &str) -> Vec<&ChoiceSpec> {
        let mut options: Vec<&ChoiceSpec> = Vec::new();
        for (_, _, field) in self.descriptors(name) {
            for choice in &field.options {
                if !options.iter().any(|known| known.value == choice.value) {
                    options.push(choice);
                }
            }
        }
        options
    }

    pub fn is_exclusive_option(&self, name: &str, value: &str) -> bool {
        self.options_of(name)
            .iter()
            .any(|choice| choice.value == value && choice.exclusive)
    }

    /// Field names that have at least one exclusive option.
    pub fn exclusive_names(&self) -> Vec<&str> {
        self.field_names()
            .into_iter()
            .filter(|name| self.options_of(name).iter().any(|choice| choice.exclusive))
            .collect()
    }

    pub fn is_derived_target(&self, name: &str) -> bool {
        self.derived.targets().contains(&name)
    }

    /// Structural checks run before a controller accepts the schema.
    pub fn check(&self) -> Result<(), SchemaError> {
        if self.sections.is_empty() {
            return Err(SchemaError::NoSections(self.id.clone()));
        }

        let mut group_ids = Vec::new();
        for group in self.groups() {
            if group_ids.contains(&group.id.as_str()) {
                return Err(SchemaError::DuplicateGroup(group.id.clone()));
            }
            group_ids.push(group.id.as_str());
        }

        let mut kinds: BTreeMap<&str, FieldKind> = BTreeMap::new();
        for (_, group, field) in self.fields() {
            if field.name.trim().is_empty() {
                return Err(SchemaError::UnnamedField(group.id.clone()));
            }
            if let Some(known) = kinds.get(field.name.as_str())
                && *known != field.kind
            {
                return Err(SchemaError::ConflictingKind {
                    name: field.name.clone(),
                    first: known.as_str(),
                    second: field.kind.as_str(),
                });
            }
            kinds.insert(field.name.as_str(), field.kind);

            if let Some(pattern) = &field.pattern
                && let Err(err) = Regex::new(&format!("^(?:{pattern})$"))
            {
                return Err(SchemaError::InvalidPattern {
                    name: field.name.clone(),
                    message: err.to_string(),
                });
            }
            if let (Some(min), Some(max)) = (field.min, field.max)
                && min > max
            {
                return Err(SchemaError::InvalidBounds(field.name.clone()));
            }
        }

        for name in self.derived.referenced_fields() {
            if !kinds.contains_key(name) {
                return Err(SchemaError::UnknownDerivedField(name.to_string()));
            }
        }

        Ok(())
    }
}

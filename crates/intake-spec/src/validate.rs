use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

use crate::accessor;
use crate::spec::field::{FieldKind, FieldSpec};
use crate::spec::form::FormSpec;
use crate::state::FormState;
use crate::visibility::{VisibilityMap, is_group_visible};

pub const REQUIRED_MESSAGE: &str = "この項目は必須です。";
pub const PATTERN_MESSAGE: &str = "形式が正しくありません。";
pub const BAD_NUMBER_MESSAGE: &str = "数値を入力してください。";

/// Per-field messages set by the engine (e.g. a malformed birthdate).
pub type CustomValidity = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub name: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<FieldIssue>,
}

impl ValidationResult {
    /// The field a host should focus.
    pub fn first_issue(&self) -> Option<&FieldIssue> {
        self.issues.first()
    }
}

/// Checks the visible fields of one section.
pub fn validate_section(
    spec: &FormSpec,
    state: &FormState,
    visibility: &VisibilityMap,
    validity: &CustomValidity,
    section: usize,
) -> ValidationResult {
    collect(spec, state, visibility, validity, Some(section))
}

/// Checks every visible field of the form.
pub fn validate_form(
    spec: &FormSpec,
    state: &FormState,
    visibility: &VisibilityMap,
    validity: &CustomValidity,
) -> ValidationResult {
    collect(spec, state, visibility, validity, None)
}

fn collect(
    spec: &FormSpec,
    state: &FormState,
    visibility: &VisibilityMap,
    validity: &CustomValidity,
    section: Option<usize>,
) -> ValidationResult {
    let mut seen: Vec<&str> = Vec::new();
    let mut issues = Vec::new();

    for (index, group, field) in spec.fields() {
        if section.is_some_and(|section| section != index) {
            continue;
        }
        if !is_group_visible(visibility, &group.id) || seen.contains(&field.name.as_str()) {
            continue;
        }
        seen.push(field.name.as_str());
        if field.disabled || field.readonly || spec.is_derived_target(&field.name) {
            continue;
        }
        if let Some(issue) = check_field(spec, state, validity, field) {
            issues.push(issue);
        }
    }

    ValidationResult {
        valid: issues.is_empty(),
        issues,
    }
}

fn check_field(
    spec: &FormSpec,
    state: &FormState,
    validity: &CustomValidity,
    field: &FieldSpec,
) -> Option<FieldIssue> {
    let value = accessor::read(spec, state, &field.name);

    if field.required && value.is_empty() {
        return Some(issue(field, "required", REQUIRED_MESSAGE));
    }

    if field.kind == FieldKind::Text && !value.is_empty() {
        let text = value.first_text().trim();
        if let Some(pattern) = &field.pattern
            && let Ok(regex) = Regex::new(&format!("^(?:{pattern})$"))
            && !regex.is_match(text)
        {
            return Some(issue(field, "pattern_mismatch", PATTERN_MESSAGE));
        }

        if field.min.is_some() || field.max.is_some() {
            let Ok(number) = text.parse::<f64>() else {
                return Some(issue(field, "bad_number", BAD_NUMBER_MESSAGE));
            };
            if let Some(min) = field.min
                && number < min
            {
                let message = format!("{}以上の値を入力してください。", accessor::format_number(min));
                return Some(issue(field, "min", &message));
            }
            if let Some(max) = field.max
                && number > max
            {
                let message = format!("{}以下の値を入力してください。", accessor::format_number(max));
                return Some(issue(field, "max", &message));
            }
        }
    }

    if let Some(message) = validity.get(&field.name)
        && !message.is_empty()
    {
        return Some(issue(field, "custom", message));
    }

    None
}

fn issue(field: &FieldSpec, code: &str, message: &str) -> FieldIssue {
    FieldIssue {
        name: field.name.clone(),
        code: code.into(),
        message: message.into(),
    }
}

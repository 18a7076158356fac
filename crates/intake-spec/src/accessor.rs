//! Uniform read/write over the heterogeneous control kinds.
//!
//! The schema decides how a value is interpreted; the shape of the incoming
//! value is only coerced, never trusted.

use crate::spec::field::{FieldKind, FieldSpec};
use crate::spec::form::{FormSpec, GroupSpec};
use crate::state::{FieldValue, FormState};

/// Current value of `name`, or the kind's initial value when unset.
/// Unknown names read as empty text.
pub fn read(spec: &FormSpec, state: &FormState, name: &str) -> FieldValue {
    match (state.get(name), spec.field(name)) {
        (Some(value), _) => value.clone(),
        (None, Some(field)) => initial_value(spec, field),
        (None, None) => FieldValue::Text(String::new()),
    }
}

/// Coerces `value` to the field's kind and stores it. Returns whether the
/// stored value changed. Writes to unknown names are dropped.
pub fn write(spec: &FormSpec, state: &mut FormState, name: &str, value: FieldValue) -> bool {
    let Some(field) = spec.field(name) else {
        tracing::debug!(field = name, "ignoring write to unknown field");
        return false;
    };
    let coerced = coerce(spec, field, value);
    store(spec, state, name, coerced)
}

/// Clears the controls of one group. For names shared with other groups only
/// this group's options are unchecked.
pub fn clear_group(spec: &FormSpec, state: &mut FormState, group: &GroupSpec) -> bool {
    let mut changed = false;
    for field in &group.fields {
        let next = match field.kind {
            FieldKind::CheckboxGroup | FieldKind::MultiSelect => {
                match read(spec, state, &field.name) {
                    FieldValue::Set(values) => FieldValue::Set(
                        values
                            .into_iter()
                            .filter(|value| !field.has_option(value))
                            .collect(),
                    ),
                    _ => FieldValue::Set(Vec::new()),
                }
            }
            FieldKind::Checkbox => FieldValue::Flag(false),
            FieldKind::Text => FieldValue::Text(String::new()),
            FieldKind::RadioGroup => FieldValue::Text(String::new()),
            FieldKind::Select | FieldKind::Range => initial_value(spec, field),
        };
        changed |= store(spec, state, &field.name, next);
    }
    changed
}

/// Restores every field to its initial value, like a native form reset.
pub fn reset(spec: &FormSpec, state: &mut FormState) {
    state.clear();
    for name in spec.field_names() {
        if let Some(field) = spec.field(name) {
            let value = initial_value(spec, field);
            store(spec, state, name, value);
        }
    }
}

/// Initial (reset) value of a field.
pub fn initial_value(spec: &FormSpec, field: &FieldSpec) -> FieldValue {
    match field.kind {
        FieldKind::Text => FieldValue::Text(field.default_value.clone().unwrap_or_default()),
        FieldKind::Checkbox => FieldValue::Flag(false),
        FieldKind::CheckboxGroup | FieldKind::MultiSelect => FieldValue::Set(Vec::new()),
        FieldKind::RadioGroup => FieldValue::Text(String::new()),
        FieldKind::Select => {
            let options = spec.options_of(&field.name);
            let selected = field
                .default_value
                .clone()
                .filter(|value| options.iter().any(|choice| &choice.value == value))
                .or_else(|| options.first().map(|choice| choice.value.clone()))
                .unwrap_or_default();
            FieldValue::Text(selected)
        }
        FieldKind::Range => {
            FieldValue::Text(normalize_range(field, field.default_value.as_deref().unwrap_or("0")))
        }
    }
}

/// Value as the host would display or submit it: checked flags become the
/// checkbox value, empty values yield nothing.
pub fn display_members(spec: &FormSpec, name: &str, value: &FieldValue) -> Vec<String> {
    match value {
        FieldValue::Flag(true) => spec
            .field(name)
            .map(|field| vec![field.checkbox_value().to_string()])
            .unwrap_or_default(),
        FieldValue::Flag(false) => Vec::new(),
        other => other.members(),
    }
}

fn store(spec: &FormSpec, state: &mut FormState, name: &str, value: FieldValue) -> bool {
    let changed = state.put(name, value);
    for (_, _, field) in spec.descriptors(name) {
        if field.kind == FieldKind::Range
            && let Some(output) = &field.output
        {
            let shown = state.text(name).to_string();
            state.put_output(output, shown);
        }
    }
    changed
}

fn coerce(spec: &FormSpec, field: &FieldSpec, value: FieldValue) -> FieldValue {
    match field.kind {
        FieldKind::Text => FieldValue::Text(value.first_text().to_string()),
        FieldKind::Checkbox => {
            let checkbox_value = field.checkbox_value();
            FieldValue::Flag(match &value {
                FieldValue::Flag(checked) => *checked,
                FieldValue::Text(text) => text == checkbox_value,
                FieldValue::Set(values) => values.iter().any(|value| value == checkbox_value),
            })
        }
        FieldKind::CheckboxGroup | FieldKind::MultiSelect => {
            let requested = value.members();
            FieldValue::Set(
                spec.options_of(&field.name)
                    .into_iter()
                    .filter(|choice| requested.contains(&choice.value))
                    .map(|choice| choice.value.clone())
                    .collect(),
            )
        }
        FieldKind::RadioGroup | FieldKind::Select => {
            let selected = value.first_text();
            let options = spec.options_of(&field.name);
            if options.is_empty() || options.iter().any(|choice| choice.value == selected) {
                FieldValue::Text(selected.to_string())
            } else {
                FieldValue::Text(String::new())
            }
        }
        FieldKind::Range => FieldValue::Text(normalize_range(field, value.first_text())),
    }
}

/// Clamps a range value to its bounds and step. Unparsable input falls back
/// to the field default.
pub fn normalize_range(field: &FieldSpec, raw: &str) -> String {
    let (min, max) = field.range_bounds();
    let fallback = field
        .default_value
        .as_deref()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    let mut value = raw
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(fallback);
    if min <= max {
        value = value.clamp(min, max);
        if let Some(step) = field.step.filter(|step| *step > 0.0) {
            value = (min + ((value - min) / step).round() * step).clamp(min, max);
            let places = decimal_places(step).max(decimal_places(min));
            value = format!("{value:.places$}").parse().unwrap_or(value);
        }
    }
    format_number(value)
}

fn decimal_places(value: f64) -> usize {
    format_number(value)
        .split_once('.')
        .map_or(0, |(_, fraction)| fraction.len())
}

/// Shortest decimal form: `3`, `2.5`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".into();
    }
    format!("{}", value)
}

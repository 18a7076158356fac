//! "None of the above" handling for choice groups.

use crate::accessor;
use crate::spec::field::FieldKind;
use crate::spec::form::FormSpec;
use crate::state::{FieldValue, FormState};

/// Applies the precedence rule: when an exclusive option is selected, every
/// non-exclusive option of the same name is dropped. `None` checks every
/// name that has exclusive options.
pub fn enforce(spec: &FormSpec, state: &mut FormState, name: Option<&str>) -> bool {
    let names: Vec<String> = match name {
        Some(name) => vec![name.to_string()],
        None => spec
            .exclusive_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };

    let mut changed = false;
    for name in &names {
        let FieldValue::Set(values) = accessor::read(spec, state, name) else {
            continue;
        };
        if !values
            .iter()
            .any(|value| spec.is_exclusive_option(name, value))
        {
            continue;
        }
        let kept: Vec<String> = values
            .into_iter()
            .filter(|value| spec.is_exclusive_option(name, value))
            .collect();
        changed |= accessor::write(spec, state, name, FieldValue::Set(kept));
    }
    changed
}

/// Checks or unchecks one option the way a user click would. Checking an
/// exclusive option clears the other side, and the reverse.
pub fn toggle(spec: &FormSpec, state: &mut FormState, name: &str, value: &str, checked: bool) -> bool {
    let Some(field) = spec.field(name) else {
        tracing::debug!(field = name, "ignoring toggle of unknown field");
        return false;
    };

    let next = match field.kind {
        FieldKind::CheckboxGroup | FieldKind::MultiSelect => {
            let current = accessor::read(spec, state, name).members();
            let exclusive = spec.is_exclusive_option(name, value);
            let mut next: Vec<String> = if checked {
                current
                    .into_iter()
                    .filter(|member| spec.is_exclusive_option(name, member) == exclusive)
                    .collect()
            } else {
                current.into_iter().filter(|member| member != value).collect()
            };
            if checked && !next.iter().any(|member| member == value) {
                next.push(value.to_string());
            }
            FieldValue::Set(next)
        }
        FieldKind::Checkbox => FieldValue::Flag(checked && value == field.checkbox_value()),
        FieldKind::RadioGroup | FieldKind::Select => {
            if checked {
                FieldValue::text(value)
            } else if accessor::read(spec, state, name).contains(value) {
                FieldValue::text("")
            } else {
                return false;
            }
        }
        FieldKind::Text | FieldKind::Range => FieldValue::text(if checked { value } else { "" }),
    };
    accessor::write(spec, state, name, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> FormSpec {
        serde_json::from_value(json!({
            "id": "f", "title": "F", "version": "1",
            "sections": [{ "id": "s", "heading": "S", "groups": [
                { "id": "conditions", "fields": [
                    { "name": "conditions", "type": "checkbox_group", "options": [
                        { "value": "高血圧" }, { "value": "糖尿病" },
                        { "value": "なし", "exclusive": true }
                    ] }
                ] },
                { "id": "aids", "fields": [
                    { "name": "aids", "type": "checkbox_group", "options": [
                        { "value": "杖" }, { "value": "使用していない", "exclusive": true }
                    ] }
                ] }
            ] }]
        }))
        .expect("spec")
    }

    fn selected(spec: &FormSpec, state: &FormState, name: &str) -> Vec<String> {
        accessor::read(spec, state, name).members()
    }

    #[test]
    fn checking_exclusive_clears_the_rest() {
        let spec = spec();
        let mut state = FormState::new();
        toggle(&spec, &mut state, "conditions", "高血圧", true);
        toggle(&spec, &mut state, "conditions", "糖尿病", true);
        toggle(&spec, &mut state, "conditions", "なし", true);
        assert_eq!(selected(&spec, &state, "conditions"), vec!["なし"]);
    }

    #[test]
    fn checking_a_regular_option_clears_exclusive() {
        let spec = spec();
        let mut state = FormState::new();
        toggle(&spec, &mut state, "conditions", "なし", true);
        toggle(&spec, &mut state, "conditions", "糖尿病", true);
        assert_eq!(selected(&spec, &state, "conditions"), vec!["糖尿病"]);
    }

    #[test]
    fn groups_do_not_interact() {
        let spec = spec();
        let mut state = FormState::new();
        toggle(&spec, &mut state, "aids", "杖", true);
        toggle(&spec, &mut state, "conditions", "なし", true);
        assert_eq!(selected(&spec, &state, "aids"), vec!["杖"]);
    }

    #[test]
    fn any_click_sequence_leaves_one_side() {
        let spec = spec();
        let mut state = FormState::new();
        let clicks = [
            ("高血圧", true),
            ("なし", true),
            ("糖尿病", true),
            ("高血圧", true),
            ("糖尿病", false),
            ("なし", true),
            ("なし", false),
            ("糖尿病", true),
        ];
        for (value, checked) in clicks {
            toggle(&spec, &mut state, "conditions", value, checked);
            let values = selected(&spec, &state, "conditions");
            let exclusive = values
                .iter()
                .filter(|value| spec.is_exclusive_option("conditions", value))
                .count();
            assert!(exclusive == 0 || exclusive == values.len(), "{values:?}");
        }
        assert_eq!(selected(&spec, &state, "conditions"), vec!["糖尿病"]);
    }

    #[test]
    fn enforce_prefers_the_exclusive_option() {
        let spec = spec();
        let mut state = FormState::new();
        accessor::write(&spec, &mut state, "conditions", FieldValue::set(["高血圧", "なし"]));
        assert!(enforce(&spec, &mut state, None));
        assert_eq!(selected(&spec, &state, "conditions"), vec!["なし"]);
        assert!(!enforce(&spec, &mut state, Some("conditions")));
    }
}

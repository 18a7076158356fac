use std::fmt;

use serde::{Deserialize, Serialize};

use crate::spec::form::FormSpec;
use crate::state::{FieldValue, FormState};

/// One `name:value` equality test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub field: String,
    pub expected: String,
}

/// Visibility rule in its stored form: `"name:value, name:value"`.
///
/// Clauses are OR-ed. There is no AND; a group that needs two answers at
/// once cannot be expressed. The expected value ends at the next `:`, so
/// `a:b:c` compares `a` against `b`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Condition {
    source: String,
    clauses: Vec<Clause>,
}

impl Condition {
    pub fn parse(source: &str) -> Self {
        let clauses = source
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .filter_map(|item| {
                let mut parts = item.split(':');
                let field = parts.next()?.trim();
                let expected = parts.next()?;
                if field.is_empty() {
                    return None;
                }
                Some(Clause {
                    field: field.to_string(),
                    expected: expected.trim().to_string(),
                })
            })
            .collect();
        Self {
            source: source.to_string(),
            clauses,
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// True when any clause matches. An expression without clauses is false.
    pub fn evaluate(&self, spec: &FormSpec, state: &FormState) -> bool {
        self.clauses
            .iter()
            .any(|clause| clause_matches(clause, spec, state))
    }
}

fn clause_matches(clause: &Clause, spec: &FormSpec, state: &FormState) -> bool {
    match state.get(&clause.field) {
        Some(FieldValue::Flag(checked)) => {
            *checked
                && spec
                    .field(&clause.field)
                    .map(|field| field.checkbox_value() == clause.expected)
                    .unwrap_or(false)
        }
        Some(value) => value.contains(&clause.expected),
        None => false,
    }
}

impl From<String> for Condition {
    fn from(source: String) -> Self {
        Condition::parse(&source)
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.source
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor;
    use serde_json::json;

    fn spec() -> FormSpec {
        serde_json::from_value(json!({
            "id": "f", "title": "F", "version": "1",
            "sections": [{ "id": "s", "heading": "S", "groups": [{ "id": "g", "fields": [
                { "name": "onset", "type": "radio_group",
                  "options": [{ "value": "けが" }, { "value": "徐々に" }] },
                { "name": "conditions", "type": "checkbox_group",
                  "options": [{ "value": "糖尿病" }, { "value": "その他" }] },
                { "name": "agree", "type": "checkbox", "options": [{ "value": "同意する" }] }
            ] }] }]
        }))
        .expect("spec")
    }

    #[test]
    fn parses_comma_separated_clauses() {
        let condition = Condition::parse(" onset:けが , conditions : その他,broken,");
        assert_eq!(condition.clauses().len(), 2);
        assert_eq!(condition.clauses()[1].field, "conditions");
        assert_eq!(condition.clauses()[1].expected, "その他");
    }

    #[test]
    fn extra_colons_end_the_expected_value() {
        let condition = Condition::parse("onset:けが:詳細");
        assert_eq!(condition.clauses()[0].expected, "けが");

        let spec = spec();
        let mut state = FormState::new();
        accessor::write(&spec, &mut state, "onset", "けが".into());
        assert!(condition.evaluate(&spec, &state));
    }

    #[test]
    fn evaluates_as_disjunction() {
        let spec = spec();
        let mut state = FormState::new();
        let condition = Condition::parse("onset:けが, conditions:その他");
        assert!(!condition.evaluate(&spec, &state));

        accessor::write(&spec, &mut state, "conditions", FieldValue::set(["その他"]));
        assert!(condition.evaluate(&spec, &state));

        accessor::write(&spec, &mut state, "conditions", FieldValue::Set(vec![]));
        accessor::write(&spec, &mut state, "onset", "けが".into());
        assert!(condition.evaluate(&spec, &state));
    }

    #[test]
    fn unknown_fields_and_empty_expressions_are_false() {
        let spec = spec();
        let state = FormState::new();
        assert!(!Condition::parse("missing:x").evaluate(&spec, &state));
        assert!(!Condition::parse("").evaluate(&spec, &state));
    }

    #[test]
    fn checked_checkbox_matches_its_value() {
        let spec = spec();
        let mut state = FormState::new();
        accessor::write(&spec, &mut state, "agree", FieldValue::Flag(true));
        assert!(Condition::parse("agree:同意する").evaluate(&spec, &state));
        assert!(!Condition::parse("agree:true").evaluate(&spec, &state));
    }

    #[test]
    fn round_trips_through_its_stored_form() {
        let condition: Condition = serde_json::from_str(r#""onset:けが""#).expect("json");
        assert_eq!(serde_json::to_string(&condition).expect("json"), r#""onset:けが""#);
    }
}

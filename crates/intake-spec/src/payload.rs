//! Submission bodies: the direct field map and the fixed-header row.

use std::sync::LazyLock;

use jiff::Timestamp;
use jiff::civil::Date;
use regex::Regex;
use serde_json::{Map, Value};

use crate::accessor;
use crate::derived::{age_on, bmi_text, fall_risk_label, parse_birthdate};
use crate::spec::field::FieldKind;
use crate::spec::form::FormSpec;
use crate::spec::payload::{ColumnRule, PayloadSpec};
use crate::state::{FieldValue, FormState};
use crate::visibility::{VisibilityMap, is_field_visible};

const FLAG_TEXT: &str = "はい";
const SET_SEPARATOR: &str = "、";

static YEAR_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})\s*(?:年|/|-|\.)?\s*(\d{1,2})").expect("static regex")
});

/// Free-text date formats tried after the numeric ones.
const DATE_FORMATS: [&str; 2] = ["%B %d, %Y", "%d %B %Y"];

/// Builds the JSON body for the form's payload format, stamped with `now`.
pub fn build_payload(
    spec: &FormSpec,
    state: &FormState,
    visibility: &VisibilityMap,
    now: Timestamp,
    today: Date,
) -> Value {
    let mut body = match &spec.payload {
        PayloadSpec::Direct => direct_fields(spec, state, visibility),
        PayloadSpec::FixedHeader { columns } => columns
            .iter()
            .map(|column| {
                (
                    column.header.clone(),
                    Value::String(column.rule.evaluate(state, today)),
                )
            })
            .collect(),
    };
    body.insert("timestamp".into(), Value::String(now.to_string()));
    Value::Object(body)
}

fn direct_fields(spec: &FormSpec, state: &FormState, visibility: &VisibilityMap) -> Map<String, Value> {
    let mut body = Map::new();
    for name in spec.field_names() {
        let Some(field) = spec.field(name) else {
            continue;
        };
        if field.disabled || !is_field_visible(spec, visibility, name) {
            continue;
        }
        let value = accessor::read(spec, state, name);
        if field.kind == FieldKind::Text {
            body.insert(name.to_string(), Value::String(value.first_text().to_string()));
            continue;
        }
        let mut members = accessor::display_members(spec, name, &value);
        match members.len() {
            0 => {}
            1 => {
                body.insert(name.to_string(), Value::String(members.remove(0)));
            }
            _ => {
                body.insert(
                    name.to_string(),
                    Value::Array(members.into_iter().map(Value::String).collect()),
                );
            }
        }
    }
    body
}

impl ColumnRule {
    /// Cell text for this column. Pure over the state and the date.
    pub fn evaluate(&self, state: &FormState, today: Date) -> String {
        match self {
            ColumnRule::Field { name } => cell_text(state, name),
            ColumnRule::Join { fields, separator } => fields
                .iter()
                .map(|name| cell_text(state, name))
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join(separator),
            ColumnRule::Month { name } => to_year_month(&cell_text(state, name)),
            ColumnRule::Age { birthdate } => parse_birthdate(state.text(birthdate))
                .ok()
                .and_then(|birth| age_on(birth, today))
                .map(|age| age.to_string())
                .unwrap_or_default(),
            ColumnRule::Bmi { height, weight } => bmi_text(state, height, weight),
            ColumnRule::FallRisk(binding) => fall_risk_label(binding, state),
            ColumnRule::Constant { value } => value.clone(),
        }
    }
}

/// Trimmed, whitespace-collapsed display text of one field.
fn cell_text(state: &FormState, name: &str) -> String {
    let raw = match state.get(name) {
        Some(FieldValue::Flag(true)) => FLAG_TEXT.to_string(),
        Some(FieldValue::Flag(false)) | None => String::new(),
        Some(FieldValue::Text(text)) => text.clone(),
        Some(FieldValue::Set(values)) => values.join(SET_SEPARATOR),
    };
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalizes a date-like answer to `YYYY-MM`. Unrecognized input comes
/// back trimmed.
pub fn to_year_month(raw: &str) -> String {
    let text = raw.trim();
    if text.is_empty() {
        return String::new();
    }
    if let Ok(date) = text.parse::<Date>() {
        return format!("{:04}-{:02}", date.year(), date.month());
    }
    if let Some(captures) = YEAR_MONTH.captures(text)
        && let (Some(year), Some(month)) = (captures.get(1), captures.get(2))
        && let Ok(month) = month.as_str().parse::<u8>()
        && (1..=12).contains(&month)
    {
        return format!("{}-{:02}", year.as_str(), month);
    }
    for format in DATE_FORMATS {
        if let Ok(date) = Date::strptime(format, text) {
            return format!("{:04}-{:02}", date.year(), date.month());
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_and_free_text_dates_become_months() {
        assert_eq!(to_year_month("2024-03-15"), "2024-03");
        assert_eq!(to_year_month("2024-3"), "2024-03");
        assert_eq!(to_year_month("2023年 11月頃"), "2023-11");
        assert_eq!(to_year_month("昨年 2022/7 に転倒"), "2022-07");
        assert_eq!(to_year_month("March 15, 2021"), "2021-03");
        assert_eq!(to_year_month("  先月  "), "先月");
        assert_eq!(to_year_month(""), "");
    }

    #[test]
    fn out_of_range_months_are_not_extracted() {
        assert_eq!(to_year_month("2024年13月"), "2024年13月");
    }

    #[test]
    fn column_rules_read_the_state() {
        let mut state = FormState::new();
        state.put("a", FieldValue::text("  東京都   新宿区 "));
        state.put("b", FieldValue::set(["首", "腰"]));
        state.put("c", FieldValue::Flag(true));
        let today = jiff::civil::date(2026, 4, 15);

        let field = ColumnRule::Field { name: "a".into() };
        assert_eq!(field.evaluate(&state, today), "東京都 新宿区");

        let join = ColumnRule::Join {
            fields: vec!["b".into(), "missing".into(), "c".into()],
            separator: " / ".into(),
        };
        assert_eq!(join.evaluate(&state, today), "首、腰 / はい");

        state.put("birth", FieldValue::text("1980-04-16"));
        let age = ColumnRule::Age { birthdate: "birth".into() };
        assert_eq!(age.evaluate(&state, today), "45");

        let constant = ColumnRule::Constant { value: "3KQ".into() };
        assert_eq!(constant.evaluate(&state, today), "3KQ");
    }
}

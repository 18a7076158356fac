//! Age, BMI and fall-risk fields computed from other answers.

use std::sync::LazyLock;

use jiff::civil::Date;
use regex::Regex;
use thiserror::Error;

use crate::accessor::{self, format_number};
use crate::spec::derived::{AgeBinding, BmiBinding, FallRiskBinding};
use crate::spec::form::FormSpec;
use crate::state::{FieldValue, FormState};
use crate::validate::CustomValidity;

pub const BIRTHDATE_FORMAT_MESSAGE: &str = "生年月日はYYYYMMDD形式で入力してください。";
pub const BIRTHDATE_INVALID_MESSAGE: &str = "生年月日が正しくありません。";

static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)").expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BirthdateError {
    #[error("{}", BIRTHDATE_FORMAT_MESSAGE)]
    Incomplete,
    #[error("{}", BIRTHDATE_INVALID_MESSAGE)]
    Invalid,
}

/// What caused an age recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeTrigger {
    /// Keystroke: never reports, never reformats.
    Input,
    /// Focus left the birthdate: reports and reformats.
    Blur,
    /// Snapshot restore: reformats silently.
    Restore,
}

/// First eight digits of the raw input; separators are dropped.
pub fn birthdate_digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).take(8).collect()
}

pub fn parse_birthdate(raw: &str) -> Result<Date, BirthdateError> {
    let digits = birthdate_digits(raw);
    if digits.len() != 8 {
        return Err(BirthdateError::Incomplete);
    }
    let year: i16 = digits[0..4].parse().map_err(|_| BirthdateError::Invalid)?;
    let month: i8 = digits[4..6].parse().map_err(|_| BirthdateError::Invalid)?;
    let day: i8 = digits[6..8].parse().map_err(|_| BirthdateError::Invalid)?;
    // Date::new refuses day/month overflow instead of rolling over.
    Date::new(year, month, day).map_err(|_| BirthdateError::Invalid)
}

/// Canonical `YYYY-MM-DD` spelling of a valid birthdate.
pub fn format_birthdate(raw: &str) -> Option<String> {
    parse_birthdate(raw).ok()?;
    let digits = birthdate_digits(raw);
    Some(format!("{}-{}-{}", &digits[0..4], &digits[4..6], &digits[6..8]))
}

/// Full years elapsed between `birth` and `today`; `None` for future dates.
pub fn age_on(birth: Date, today: Date) -> Option<u32> {
    let mut age = i32::from(today.year()) - i32::from(birth.year());
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

pub fn update_age(
    spec: &FormSpec,
    binding: &AgeBinding,
    state: &mut FormState,
    validity: &mut CustomValidity,
    trigger: AgeTrigger,
    today: Date,
) {
    let raw = state.text(&binding.birthdate).to_string();
    if raw.trim().is_empty() {
        accessor::write(spec, state, &binding.age, FieldValue::Text(String::new()));
        validity.remove(&binding.birthdate);
        return;
    }

    match parse_birthdate(&raw) {
        Ok(birth) => {
            validity.remove(&binding.birthdate);
            if trigger != AgeTrigger::Input
                && let Some(formatted) = format_birthdate(&raw)
            {
                accessor::write(spec, state, &binding.birthdate, FieldValue::Text(formatted));
            }
            let age = age_on(birth, today)
                .map(|age| age.to_string())
                .unwrap_or_default();
            accessor::write(spec, state, &binding.age, FieldValue::Text(age));
        }
        Err(err) => {
            accessor::write(spec, state, &binding.age, FieldValue::Text(String::new()));
            if trigger == AgeTrigger::Blur {
                validity.insert(binding.birthdate.clone(), err.to_string());
            } else {
                validity.remove(&binding.birthdate);
            }
        }
    }
}

/// Leading decimal number of a free-text measurement (`"170cm"` is 170).
pub fn parse_measure(raw: &str) -> Option<f64> {
    LEADING_NUMBER
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .and_then(|number| number.as_str().parse::<f64>().ok())
}

/// Body mass index rounded to one decimal place.
pub fn bmi(height_cm: Option<f64>, weight_kg: Option<f64>) -> Option<f64> {
    let (height_cm, weight_kg) = (height_cm?, weight_kg?);
    if !height_cm.is_finite() || !weight_kg.is_finite() || height_cm <= 0.0 || weight_kg <= 0.0 {
        return None;
    }
    let meters = height_cm / 100.0;
    let value = weight_kg / (meters * meters);
    if !value.is_finite() {
        return None;
    }
    Some((value * 10.0).round() / 10.0)
}

pub fn bmi_text(state: &FormState, height: &str, weight: &str) -> String {
    bmi(
        parse_measure(state.text(height)),
        parse_measure(state.text(weight)),
    )
    .filter(|value| *value > 0.0)
    .map(format_number)
    .unwrap_or_default()
}

pub fn update_bmi(spec: &FormSpec, binding: &BmiBinding, state: &mut FormState) {
    let value = bmi_text(state, &binding.height, &binding.weight);
    accessor::write(spec, state, &binding.bmi, FieldValue::Text(value));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallRisk {
    Present,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Unanswered,
    Positive,
    Negative,
}

fn flag_signal(value: Option<&FieldValue>, positive_values: &[String]) -> Signal {
    match value {
        None => Signal::Unanswered,
        Some(value) if value.is_empty() => Signal::Unanswered,
        Some(FieldValue::Flag(_)) => Signal::Positive,
        Some(value) => {
            let positive = positive_values
                .iter()
                .any(|positive| value.contains(positive) || value.first_text().trim() == positive);
            if positive {
                Signal::Positive
            } else {
                Signal::Negative
            }
        }
    }
}

fn count_signal(value: Option<&FieldValue>) -> Signal {
    match value {
        None => Signal::Unanswered,
        Some(value) if value.is_empty() => Signal::Unanswered,
        Some(value) => match parse_measure(value.first_text()) {
            Some(count) if count > 0.0 => Signal::Positive,
            _ => Signal::Negative,
        },
    }
}

/// Union over the five signals: any positive answer means risk. `None`
/// while every signal is unanswered.
pub fn classify_fall_risk(binding: &FallRiskBinding, state: &FormState) -> Option<FallRisk> {
    let positives = &binding.positive_values;
    let signals = [
        flag_signal(state.get(&binding.history), positives),
        flag_signal(state.get(&binding.unsteady), positives),
        flag_signal(state.get(&binding.fear), positives),
        count_signal(state.get(&binding.count)),
        flag_signal(state.get(&binding.injury), positives),
    ];
    if signals.iter().all(|signal| *signal == Signal::Unanswered) {
        return None;
    }
    if signals.contains(&Signal::Positive) {
        Some(FallRisk::Present)
    } else {
        Some(FallRisk::Low)
    }
}

pub fn fall_risk_label(binding: &FallRiskBinding, state: &FormState) -> String {
    match classify_fall_risk(binding, state) {
        Some(FallRisk::Present) => binding.present_label.clone(),
        Some(FallRisk::Low) => binding.low_label.clone(),
        None => String::new(),
    }
}

pub fn update_fall_risk(spec: &FormSpec, binding: &FallRiskBinding, state: &mut FormState) {
    if let Some(output) = &binding.output {
        let label = fall_risk_label(binding, state);
        accessor::write(spec, state, output, FieldValue::Text(label));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::civil::date;
    use serde_json::json;

    fn risk_binding() -> FallRiskBinding {
        serde_json::from_value(json!({
            "history": "fall_history",
            "unsteady": "unsteady_gait",
            "fear": "fear_of_falling",
            "count": "fall_count",
            "injury": "fall_injury"
        }))
        .expect("binding")
    }

    fn state_with(values: &[(&str, &str)]) -> FormState {
        let spec: FormSpec = serde_json::from_value(json!({
            "id": "f", "title": "F", "version": "1",
            "sections": [{ "id": "s", "heading": "S", "groups": [{ "id": "g", "fields": [
                { "name": "fall_history", "type": "text" },
                { "name": "unsteady_gait", "type": "text" },
                { "name": "fear_of_falling", "type": "text" },
                { "name": "fall_count", "type": "text" },
                { "name": "fall_injury", "type": "text" }
            ] }] }]
        }))
        .expect("spec");
        let mut state = FormState::new();
        for (name, value) in values {
            accessor::write(&spec, &mut state, name, (*value).into());
        }
        state
    }

    #[test]
    fn birthdate_accepts_separators() {
        assert_eq!(parse_birthdate("1980/04/15"), Ok(date(1980, 4, 15)));
        assert_eq!(format_birthdate("1980.4.15x").as_deref(), None);
        assert_eq!(format_birthdate("19800415").as_deref(), Some("1980-04-15"));
    }

    #[test]
    fn birthdate_rejects_short_and_impossible_dates() {
        assert_eq!(parse_birthdate("1980041"), Err(BirthdateError::Incomplete));
        assert_eq!(parse_birthdate("19800431"), Err(BirthdateError::Invalid));
        assert_eq!(parse_birthdate("19810229"), Err(BirthdateError::Invalid));
        assert_eq!(parse_birthdate("19800230"), Err(BirthdateError::Invalid));
        assert_eq!(parse_birthdate("19801301"), Err(BirthdateError::Invalid));
    }

    #[test]
    fn age_counts_full_years_only() {
        let birth = date(1980, 4, 15);
        assert_eq!(age_on(birth, date(2026, 4, 14)), Some(45));
        assert_eq!(age_on(birth, date(2026, 4, 15)), Some(46));
        assert_eq!(age_on(birth, date(2026, 12, 1)), Some(46));
        assert_eq!(age_on(date(2027, 1, 1), date(2026, 4, 15)), None);
    }

    #[test]
    fn age_on_leap_day_birthdays() {
        let birth = date(2000, 2, 29);
        assert_eq!(age_on(birth, date(2025, 2, 28)), Some(24));
        assert_eq!(age_on(birth, date(2025, 3, 1)), Some(25));
    }

    #[test]
    fn bmi_rounds_to_one_decimal() {
        assert_eq!(bmi(Some(170.0), Some(65.0)), Some(22.5));
        assert_eq!(bmi(Some(160.0), Some(50.0)), Some(19.5));
        assert_eq!(bmi(Some(180.0), Some(81.0)), Some(25.0));
        assert_eq!(format_number(25.0), "25");
    }

    #[test]
    fn bmi_is_undefined_for_missing_or_non_positive_inputs() {
        assert_eq!(bmi(None, Some(60.0)), None);
        assert_eq!(bmi(Some(0.0), Some(60.0)), None);
        assert_eq!(bmi(Some(170.0), Some(-1.0)), None);
        assert_eq!(bmi(Some(f64::INFINITY), Some(60.0)), None);
    }

    #[test]
    fn measurements_parse_leading_numbers() {
        assert_eq!(parse_measure("170cm"), Some(170.0));
        assert_eq!(parse_measure(" 65.5 "), Some(65.5));
        assert_eq!(parse_measure("abc"), None);
    }

    #[test]
    fn fall_risk_is_undetermined_until_something_is_answered() {
        assert_eq!(classify_fall_risk(&risk_binding(), &state_with(&[])), None);
        assert_eq!(fall_risk_label(&risk_binding(), &state_with(&[])), "");
    }

    #[test]
    fn any_single_signal_marks_risk() {
        let binding = risk_binding();
        let state = state_with(&[("fall_history", "はい")]);
        assert_eq!(classify_fall_risk(&binding, &state), Some(FallRisk::Present));
        assert_eq!(fall_risk_label(&binding, &state), "転倒リスクあり");

        let state = state_with(&[("fall_history", "いいえ"), ("fall_count", "2")]);
        assert_eq!(classify_fall_risk(&binding, &state), Some(FallRisk::Present));

        let state = state_with(&[("fall_injury", "あり")]);
        assert_eq!(classify_fall_risk(&binding, &state), Some(FallRisk::Present));
    }

    #[test]
    fn all_negative_answers_mean_low_risk() {
        let binding = risk_binding();
        let state = state_with(&[
            ("fall_history", "いいえ"),
            ("unsteady_gait", "いいえ"),
            ("fear_of_falling", "いいえ"),
            ("fall_count", "0"),
            ("fall_injury", "なし"),
        ]);
        assert_eq!(classify_fall_risk(&binding, &state), Some(FallRisk::Low));
        assert_eq!(fall_risk_label(&binding, &state), "転倒リスク低");
    }
}

use std::sync::Arc;

use intake_spec::{
    ColumnRule, EngineOptions, FormController, FormSpec, ManualClock, MemoryStore, PayloadSpec,
    to_year_month,
};
use jiff::civil::date;
use serde_json::{Value, json};

const SCREENING: &str = include_str!("fixtures/fall_screening_form.json");

fn screening() -> FormController {
    let spec: FormSpec = serde_json::from_str(SCREENING).expect("fixture");
    let clock = Arc::new(ManualClock::new("2026-04-15T09:00:00Z".parse().expect("ts")));
    FormController::new(spec, Box::new(MemoryStore::new()), clock, EngineOptions::default())
        .expect("controller")
}

#[test]
fn fixed_header_row_keeps_column_order() {
    let mut form = screening();
    form.input("3kq_name", "  佐藤   一郎 ");
    form.input("3kq_birthdate", "1950/10/03");
    form.input("3kq_height", "158cm");
    form.input("3kq_weight", "52");
    form.change("3kq_fall_history", "はい");
    form.input("3kq_last_fall", "2025年 12月ごろ");
    form.toggle("3kq_walking_aid", "使用", true);
    form.input("3kq_notes_extra", "杖を使用");

    let payload = form.payload();
    let object = payload.as_object().expect("object");
    let headers: Vec<&str> = object.keys().map(String::as_str).collect();
    assert_eq!(
        headers,
        vec![
            "調査票",
            "氏名",
            "年齢",
            "BMI",
            "転倒歴",
            "最終転倒月",
            "歩行補助具",
            "転倒リスク",
            "備考",
            "timestamp"
        ]
    );
    assert_eq!(
        payload,
        json!({
            "調査票": "3KQ",
            "氏名": "佐藤 一郎",
            "年齢": "75",
            "BMI": "20.8",
            "転倒歴": "はい",
            "最終転倒月": "2025-12",
            "歩行補助具": "はい",
            "転倒リスク": "転倒リスクあり",
            "備考": "杖を使用",
            "timestamp": "2026-04-15T09:00:00Z"
        })
    );
}

#[test]
fn empty_screening_produces_blank_cells() {
    let form = screening();
    let payload = form.payload();
    assert_eq!(payload["調査票"], "3KQ");
    for header in ["氏名", "年齢", "BMI", "最終転倒月", "転倒リスク", "備考"] {
        assert_eq!(payload[header], Value::String(String::new()), "{header}");
    }
}

#[test]
fn each_column_is_testable_on_its_own() {
    let form = screening();
    let PayloadSpec::FixedHeader { columns } = &form.spec().payload else {
        panic!("fixed header expected");
    };
    let risk = columns
        .iter()
        .find(|column| column.header == "転倒リスク")
        .expect("risk column");
    assert!(matches!(risk.rule, ColumnRule::FallRisk(_)));

    let mut form = screening();
    form.change("3kq_fall_history", "いいえ");
    form.change("3kq_unsteady", "いいえ");
    form.change("3kq_fear", "いいえ");
    form.input("3kq_fall_count", "0");
    form.change("3kq_fall_injury", "なし");
    assert_eq!(risk.rule.evaluate(form.state(), date(2026, 4, 15)), "転倒リスク低");
}

#[test]
fn month_normalization_falls_back_to_the_original_text() {
    assert_eq!(to_year_month("2025-12-24"), "2025-12");
    assert_eq!(to_year_month("2019.4"), "2019-04");
    assert_eq!(to_year_month("15 March 2021"), "2021-03");
    assert_eq!(to_year_month(" 覚えていない "), "覚えていない");
}

//! Read-only confirmation view of the answered fields.

use handlebars::{Handlebars, RenderError};
use serde::Serialize;

use crate::accessor;
use crate::spec::field::FieldSpec;
use crate::spec::form::{FormSpec, GroupSpec};
use crate::state::FormState;
use crate::visibility::{VisibilityMap, is_group_visible};

pub const PREVIEW_EMPTY_MESSAGE: &str =
    "入力済みの項目がありません。フォームに情報を入力してください。";
pub const NO_CONCERN_MESSAGE: &str = "特に気になる部位はありません。";
pub const NOTHING_SELECTED_MESSAGE: &str = "選択された部位はありません。";

const VALUE_SEPARATOR: &str = "、";

const PREVIEW_TEMPLATE: &str = r#"<div class="preview">
{{#if empty}}<p class="preview-empty">{{message}}</p>
{{else}}{{#each sections}}<section class="preview-section">
  <h3>{{title}}</h3>
  <dl>
{{#each items}}    <dt>{{label}}</dt><dd>{{value}}</dd>
{{/each}}  </dl>
</section>
{{/each}}{{/if}}</div>
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewItem {
    pub name: String,
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewSection {
    pub title: String,
    pub items: Vec<PreviewItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub sections: Vec<PreviewSection>,
}

impl Preview {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

type LabelResolver = fn(&GroupSpec, &FieldSpec) -> Option<String>;

/// Tried in order; the first non-empty answer wins.
const LABEL_RESOLVERS: [LabelResolver; 5] = [
    explicit_label,
    aria_label,
    caption,
    group_question,
    group_legend,
];

fn explicit_label(_: &GroupSpec, field: &FieldSpec) -> Option<String> {
    field.label.clone()
}

fn aria_label(_: &GroupSpec, field: &FieldSpec) -> Option<String> {
    field.aria_label.clone()
}

fn caption(_: &GroupSpec, field: &FieldSpec) -> Option<String> {
    field.caption.clone()
}

fn group_question(group: &GroupSpec, _: &FieldSpec) -> Option<String> {
    group.question.clone()
}

fn group_legend(group: &GroupSpec, _: &FieldSpec) -> Option<String> {
    group.legend.clone()
}

pub fn resolve_label(group: &GroupSpec, field: &FieldSpec) -> String {
    LABEL_RESOLVERS
        .iter()
        .filter_map(|resolver| resolver(group, field))
        .map(|label| label.trim().to_string())
        .find(|label| !label.is_empty())
        .unwrap_or_else(|| field.name.clone())
}

pub fn build_preview(spec: &FormSpec, state: &FormState, visibility: &VisibilityMap) -> Preview {
    let mut emitted: Vec<&str> = Vec::new();
    let mut sections = Vec::new();

    for section in &spec.sections {
        let title = section.heading.trim();
        if title.is_empty() {
            continue;
        }
        let mut items = Vec::new();
        for group in &section.groups {
            if !is_group_visible(visibility, &group.id) {
                continue;
            }
            for field in &group.fields {
                if field.disabled || emitted.contains(&field.name.as_str()) {
                    continue;
                }
                let Some(value) = display_value(spec, state, field) else {
                    continue;
                };
                emitted.push(field.name.as_str());
                items.push(PreviewItem {
                    name: field.name.clone(),
                    label: resolve_label(group, field),
                    value,
                });
            }
        }
        if !items.is_empty() {
            sections.push(PreviewSection {
                title: title.to_string(),
                items,
            });
        }
    }

    Preview { sections }
}

fn display_value(spec: &FormSpec, state: &FormState, field: &FieldSpec) -> Option<String> {
    let value = accessor::read(spec, state, &field.name);
    let options = spec.options_of(&field.name);
    let shown: Vec<String> = accessor::display_members(spec, &field.name, &value)
        .into_iter()
        .map(|member| member.trim().to_string())
        .filter(|member| !member.is_empty())
        .map(|member| {
            options
                .iter()
                .find(|choice| choice.value == member)
                .map(|choice| choice.display().to_string())
                .unwrap_or(member)
        })
        .collect();
    (!shown.is_empty()).then(|| shown.join(VALUE_SEPARATOR))
}

pub fn render_text(preview: &Preview) -> String {
    if preview.is_empty() {
        return PREVIEW_EMPTY_MESSAGE.to_string();
    }
    let mut lines = Vec::new();
    for section in &preview.sections {
        lines.push(format!("■ {}", section.title));
        for item in &section.items {
            lines.push(format!("  {}: {}", item.label, item.value));
        }
    }
    lines.join("\n")
}

/// HTML fragment for the confirmation dialog; values are escaped.
pub fn render_html(preview: &Preview) -> Result<String, RenderError> {
    let handlebars = Handlebars::new();
    let data = serde_json::json!({
        "empty": preview.is_empty(),
        "message": PREVIEW_EMPTY_MESSAGE,
        "sections": preview.sections,
    });
    handlebars.render_template(PREVIEW_TEMPLATE, &data)
}

/// One-line summary of a body-map style checkbox field. The exclusive
/// option is never listed; picking it alone reads as "no concern".
pub fn selection_summary(spec: &FormSpec, state: &FormState, name: &str) -> String {
    let selected = accessor::read(spec, state, name).members();
    let (exclusive, regular): (Vec<_>, Vec<_>) = selected
        .into_iter()
        .partition(|value| spec.is_exclusive_option(name, value));
    if !regular.is_empty() {
        return regular.join(VALUE_SEPARATOR);
    }
    if exclusive.is_empty() {
        NOTHING_SELECTED_MESSAGE.to_string()
    } else {
        NO_CONCERN_MESSAGE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusive;
    use crate::visibility::resolve_visibility;
    use serde_json::json;

    fn spec() -> FormSpec {
        serde_json::from_value(json!({
            "id": "f", "title": "F", "version": "1",
            "sections": [
                { "id": "a", "heading": "基本情報", "groups": [{ "id": "who", "legend": "氏名欄", "fields": [
                    { "name": "name", "type": "text", "label": "氏名", "aria_label": "お名前" },
                    { "name": "kana", "type": "text", "aria_label": "ふりがな" },
                    { "name": "note", "type": "text" }
                ] }] },
                { "id": "b", "heading": "", "groups": [{ "id": "hidden_heading", "fields": [
                    { "name": "memo", "type": "text" }
                ] }] },
                { "id": "c", "heading": "症状", "groups": [
                    { "id": "map", "question": "気になる部位", "fields": [
                        { "name": "areas", "type": "checkbox_group",
                          "options": [{ "value": "首" }, { "value": "腰" }] }
                    ] },
                    { "id": "list", "fields": [
                        { "name": "areas", "type": "checkbox_group", "caption": "部位一覧",
                          "options": [{ "value": "腰" }, { "value": "特に気になる部位はない", "exclusive": true }] }
                    ] }
                ] }
            ]
        }))
        .expect("spec")
    }

    #[test]
    fn labels_follow_the_resolver_chain() {
        let spec = spec();
        let mut state = FormState::new();
        for (name, value) in [("name", "山田 花子"), ("kana", "やまだ"), ("note", "x"), ("memo", "m")] {
            accessor::write(&spec, &mut state, name, value.into());
        }
        let preview = build_preview(&spec, &state, &resolve_visibility(&spec, &state));
        assert_eq!(preview.sections.len(), 1);
        let labels: Vec<_> = preview.sections[0]
            .items
            .iter()
            .map(|item| item.label.as_str())
            .collect();
        assert_eq!(labels, vec!["氏名", "ふりがな", "氏名欄"]);
    }

    #[test]
    fn shared_names_appear_once_with_joined_values() {
        let spec = spec();
        let mut state = FormState::new();
        accessor::write(&spec, &mut state, "areas", crate::FieldValue::set(["首", "腰"]));
        let preview = build_preview(&spec, &state, &resolve_visibility(&spec, &state));
        let items = &preview.sections[0].items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "気になる部位");
        assert_eq!(items[0].value, "首、腰");
    }

    #[test]
    fn empty_state_renders_the_placeholder() {
        let spec = spec();
        let state = FormState::new();
        let preview = build_preview(&spec, &state, &resolve_visibility(&spec, &state));
        assert!(preview.is_empty());
        assert_eq!(render_text(&preview), PREVIEW_EMPTY_MESSAGE);
        let html = render_html(&preview).expect("html");
        assert!(html.contains(PREVIEW_EMPTY_MESSAGE));
    }

    #[test]
    fn html_escapes_answers() {
        let spec = spec();
        let mut state = FormState::new();
        accessor::write(&spec, &mut state, "note", "<b>痛い</b>".into());
        let preview = build_preview(&spec, &state, &resolve_visibility(&spec, &state));
        let html = render_html(&preview).expect("html");
        assert!(html.contains("&lt;b&gt;痛い&lt;/b&gt;"));
        assert!(html.contains("<h3>基本情報</h3>"));
    }

    #[test]
    fn selection_summary_hides_the_exclusive_option() {
        let spec = spec();
        let mut state = FormState::new();
        assert_eq!(selection_summary(&spec, &state, "areas"), NOTHING_SELECTED_MESSAGE);
        exclusive::toggle(&spec, &mut state, "areas", "特に気になる部位はない", true);
        assert_eq!(selection_summary(&spec, &state, "areas"), NO_CONCERN_MESSAGE);
        exclusive::toggle(&spec, &mut state, "areas", "腰", true);
        assert_eq!(selection_summary(&spec, &state, "areas"), "腰");
    }
}

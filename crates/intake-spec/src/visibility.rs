use std::collections::BTreeMap;

use crate::accessor;
use crate::spec::form::FormSpec;
use crate::state::FormState;

/// Group id to visibility.
pub type VisibilityMap = BTreeMap<String, bool>;

pub fn resolve_visibility(spec: &FormSpec, state: &FormState) -> VisibilityMap {
    let mut map = VisibilityMap::new();
    for group in spec.groups() {
        let visible = group
            .visible_if
            .as_ref()
            .map(|condition| condition.evaluate(spec, state))
            .unwrap_or(true);
        map.insert(group.id.clone(), visible);
    }
    map
}

/// Resolves visibility and clears every hidden group. Clearing can hide
/// further groups, so this repeats until nothing changes.
pub fn apply_visibility(spec: &FormSpec, state: &mut FormState) -> VisibilityMap {
    let limit = spec.groups().count() + 1;
    let mut map = resolve_visibility(spec, state);
    for _ in 0..limit {
        let mut changed = false;
        for group in spec.groups() {
            if !map.get(&group.id).copied().unwrap_or(true) {
                changed |= accessor::clear_group(spec, state, group);
            }
        }
        if !changed {
            break;
        }
        map = resolve_visibility(spec, state);
    }
    map
}

pub fn is_group_visible(map: &VisibilityMap, group_id: &str) -> bool {
    map.get(group_id).copied().unwrap_or(true)
}

/// A field is visible when any group declaring it is visible.
pub fn is_field_visible(spec: &FormSpec, map: &VisibilityMap, name: &str) -> bool {
    spec.descriptors(name)
        .any(|(_, group, _)| is_group_visible(map, &group.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{read, write};
    use crate::state::FieldValue;
    use serde_json::json;

    fn spec() -> FormSpec {
        serde_json::from_value(json!({
            "id": "f", "title": "F", "version": "1",
            "sections": [{ "id": "s", "heading": "S", "groups": [
                { "id": "base", "fields": [
                    { "name": "fall_history", "type": "radio_group",
                      "options": [{ "value": "はい" }, { "value": "いいえ" }] }
                ] },
                { "id": "details", "visible_if": "fall_history:はい", "fields": [
                    { "name": "fall_count", "type": "text" },
                    { "name": "fall_injury", "type": "radio_group",
                      "options": [{ "value": "あり" }, { "value": "なし" }] }
                ] },
                { "id": "injury_detail", "visible_if": "fall_injury:あり", "fields": [
                    { "name": "injury_note", "type": "text" }
                ] }
            ] }]
        }))
        .expect("spec")
    }

    #[test]
    fn groups_without_conditions_are_visible() {
        let spec = spec();
        let map = resolve_visibility(&spec, &FormState::new());
        assert!(map["base"]);
        assert!(!map["details"]);
    }

    #[test]
    fn hiding_a_group_clears_its_inputs() {
        let spec = spec();
        let mut state = FormState::new();
        write(&spec, &mut state, "fall_history", "はい".into());
        write(&spec, &mut state, "fall_count", "2".into());
        write(&spec, &mut state, "fall_injury", "なし".into());
        let map = apply_visibility(&spec, &mut state);
        assert!(map["details"]);
        assert_eq!(state.text("fall_count"), "2");

        write(&spec, &mut state, "fall_history", "いいえ".into());
        let map = apply_visibility(&spec, &mut state);
        assert!(!map["details"]);
        assert_eq!(read(&spec, &state, "fall_count"), FieldValue::text(""));
        assert_eq!(read(&spec, &state, "fall_injury"), FieldValue::text(""));
    }

    #[test]
    fn clearing_cascades_to_dependent_groups() {
        let spec = spec();
        let mut state = FormState::new();
        write(&spec, &mut state, "fall_history", "はい".into());
        write(&spec, &mut state, "fall_injury", "あり".into());
        write(&spec, &mut state, "injury_note", "膝を打った".into());
        let map = apply_visibility(&spec, &mut state);
        assert!(map["injury_detail"]);

        write(&spec, &mut state, "fall_history", "いいえ".into());
        let map = apply_visibility(&spec, &mut state);
        assert!(!map["injury_detail"]);
        assert_eq!(state.text("injury_note"), "");
        assert!(!is_field_visible(&spec, &map, "injury_note"));
        assert!(is_field_visible(&spec, &map, "fall_history"));
    }
}

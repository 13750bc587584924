use log::warn;
use serde_json::{Map, Value};

use crate::constants::VOLATILE_FIELDS;
use crate::errors::FlowHistoryError;
use crate::models::change::{ChangeRecord, ChangeSet, ObjectType};
use crate::models::traits::{GroupById, Pluck};
use crate::models::workflow::{EntityType, WorkflowDefinition};

/// Computes the changes needed to bring `target` back to `source`.
///
/// An absent snapshot (not loaded yet) yields an empty change set. A malformed one is absorbed into an empty change
/// set carrying a warning.
pub fn diff(target: Option<&WorkflowDefinition>, source: Option<&WorkflowDefinition>) -> ChangeSet {
    let (target, source) = match (target, source) {
        (Some(target), Some(source)) => (target, source),
        _ => return ChangeSet::default(),
    };

    match try_diff(target, source) {
        Ok(records) => ChangeSet::new(records),
        Err(e) => {
            warn!("Diff::treating diff of workflow {} as empty: {}", target.id, e);

            ChangeSet::with_warning(e.to_string())
        }
    }
}

fn try_diff(target: &WorkflowDefinition, source: &WorkflowDefinition) -> Result<Vec<ChangeRecord>, FlowHistoryError> {
    let mut records = Vec::new();

    let target_root = target.root_state();
    let source_root = source.root_state();

    if !structurally_equal(Some(&target_root), Some(&source_root)) {
        let mut record = ChangeRecord::new(
            ObjectType::Workflow,
            target.id.clone(),
            Some(target_root),
            Some(source_root),
        );
        record.display_name = display_root_name(target, source);
        records.push(record);
    }

    for entity_type in EntityType::DIFF_ORDER {
        let target_entities = target.required_collection(entity_type)?;
        let source_entities = source.required_collection(entity_type)?;
        let source_by_id = source_entities.group_by_id();
        let target_ids = target_entities.pluck_id_set();
        let mut seen = std::collections::HashSet::new();

        for target_entity in target_entities {
            if !seen.insert(target_entity.id.as_str()) {
                continue;
            }

            let source_payload = source_by_id.get(target_entity.id.as_str()).map(|e| &e.payload);

            if source_payload.is_some() && structurally_equal(Some(&target_entity.payload), source_payload) {
                continue;
            }

            records.push(ChangeRecord::new(
                entity_type.into(),
                target_entity.id.clone(),
                Some(target_entity.payload.clone()),
                source_payload.cloned(),
            ));
        }

        for source_entity in source_entities {
            if target_ids.contains(source_entity.id.as_str()) || !seen.insert(source_entity.id.as_str()) {
                continue;
            }

            records.push(ChangeRecord::new(
                entity_type.into(),
                source_entity.id.clone(),
                None,
                Some(source_entity.payload.clone()),
            ));
        }
    }

    Ok(records)
}

fn display_root_name(target: &WorkflowDefinition, source: &WorkflowDefinition) -> String {
    [&source.name, &target.name, &target.id]
        .into_iter()
        .find(|name| !name.is_empty())
        .cloned()
        .unwrap_or_default()
}

/// Deep comparison ignoring volatile timestamp fields. `null`, absent values and missing keys are equivalent and
/// object key order doesn't matter. Array order does.
pub fn structurally_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    let a = a.map(normalize).unwrap_or(Value::Null);
    let b = b.map(normalize).unwrap_or(Value::Null);

    a == b
}

/// Strips volatile fields and null members from every object, recursively.
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let normalized: Map<String, Value> = object
                .iter()
                .filter(|(key, _)| !VOLATILE_FIELDS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), normalize(value)))
                .filter(|(_, value)| !value.is_null())
                .collect();

            Value::Object(normalized)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::workflow::SubEntity;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::{BTreeSet, HashMap};

    fn entity(entity_type: EntityType, id: &str, payload: Value) -> SubEntity {
        SubEntity {
            id: id.to_string(),
            entity_type,
            payload,
        }
    }

    fn definition(tasks: Vec<SubEntity>, gateways: Vec<SubEntity>, events: Vec<SubEntity>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf-1".to_string(),
            name: "Onboarding".to_string(),
            schema: json!({"nodes": []}),
            tasks: Some(tasks),
            gateways: Some(gateways),
            events: Some(events),
            attributes: Map::new(),
        }
    }

    #[test]
    fn reverting_renamed_and_deleted_task() {
        let target = definition(vec![entity(EntityType::Task, "T1", json!({"name": "A"}))], vec![], vec![]);
        let source = definition(
            vec![
                entity(EntityType::Task, "T1", json!({"name": "B"})),
                entity(EntityType::Task, "T2", json!({"name": "C"})),
            ],
            vec![],
            vec![],
        );

        let change_set = diff(Some(&target), Some(&source));

        assert_eq!(change_set.len(), 2);

        let t1 = &change_set.records[0];
        assert_eq!(t1.object_type, ObjectType::Task);
        assert_eq!(t1.id, "T1");
        assert_eq!(t1.target_state, Some(json!({"name": "A"})));
        assert_eq!(t1.source_state, Some(json!({"name": "B"})));

        let t2 = &change_set.records[1];
        assert_eq!(t2.id, "T2");
        assert_eq!(t2.target_state, None);
        assert_eq!(t2.source_state, Some(json!({"name": "C"})));
        assert_eq!(t2.display_name, "C");
    }

    #[test]
    fn absent_snapshot_yields_empty_change_set() {
        let target = definition(vec![entity(EntityType::Task, "T1", json!({}))], vec![], vec![]);

        assert!(diff(Some(&target), None).is_empty());
        assert!(diff(None, Some(&target)).is_empty());
        assert!(diff(Some(&target), None).warning.is_none());
    }

    #[test]
    fn malformed_snapshot_is_absorbed_with_warning() {
        let target = definition(vec![], vec![], vec![]);
        let mut source = definition(vec![], vec![], vec![]);
        source.gateways = None;

        let change_set = diff(Some(&target), Some(&source));

        assert!(change_set.is_empty());
        assert!(change_set.warning.unwrap().contains("gateways"));
    }

    #[test]
    fn volatile_fields_and_nulls_are_ignored() {
        let target = definition(
            vec![entity(
                EntityType::Task,
                "T1",
                json!({"name": "A", "createdAtData": "2024-01-01", "note": null, "nested": {"updatedAtData": 1}}),
            )],
            vec![],
            vec![],
        );
        let source = definition(
            vec![entity(
                EntityType::Task,
                "T1",
                json!({"nested": {}, "name": "A", "updatedAtData": "2024-02-02"}),
            )],
            vec![],
            vec![],
        );

        assert!(diff(Some(&target), Some(&source)).is_empty());
    }

    #[test]
    fn root_change_comes_first() {
        let mut target = definition(vec![entity(EntityType::Task, "T1", json!({"name": "A"}))], vec![], vec![]);
        target.name = "Renamed".to_string();
        let source = definition(
            vec![entity(EntityType::Task, "T1", json!({"name": "B"}))],
            vec![],
            vec![entity(EntityType::Event, "E1", json!({"name": "Start"}))],
        );

        let change_set = diff(Some(&target), Some(&source));
        let types: Vec<ObjectType> = change_set.iter().map(|record| record.object_type).collect();

        assert_eq!(types, vec![ObjectType::Workflow, ObjectType::Event, ObjectType::Task]);
        assert_eq!(change_set.records[0].display_name, "Onboarding");
        assert_eq!(change_set.records[0].source_state.as_ref().unwrap()["name"], json!("Onboarding"));
    }

    #[test]
    fn duplicate_ids_are_reported_once() {
        let target = definition(
            vec![
                entity(EntityType::Task, "T1", json!({"name": "A"})),
                entity(EntityType::Task, "T1", json!({"name": "A2"})),
            ],
            vec![],
            vec![],
        );
        let source = definition(vec![], vec![], vec![]);

        let change_set = diff(Some(&target), Some(&source));

        assert_eq!(change_set.len(), 1);
        assert_eq!(change_set.records[0].target_state, Some(json!({"name": "A"})));
    }

    fn group_index(object_type: ObjectType) -> usize {
        match object_type {
            ObjectType::Workflow => 0,
            ObjectType::Event => 1,
            ObjectType::Gateway => 2,
            ObjectType::Task => 3,
        }
    }

    fn entities_strategy(entity_type: EntityType, prefix: &'static str) -> impl Strategy<Value = Vec<SubEntity>> {
        prop::collection::btree_map(0..6u8, (0..3u8, any::<u32>()), 0..6)
            .prop_map(move |entities| {
                entities
                    .into_iter()
                    .map(|(id, (name, stamp))| SubEntity {
                        id: format!("{}{}", prefix, id),
                        entity_type,
                        payload: json!({"name": format!("n{}", name), "createdAtData": stamp}),
                    })
                    .collect::<Vec<SubEntity>>()
            })
            .prop_shuffle()
    }

    fn definition_strategy() -> impl Strategy<Value = WorkflowDefinition> {
        (
            entities_strategy(EntityType::Task, "t"),
            entities_strategy(EntityType::Gateway, "g"),
            entities_strategy(EntityType::Event, "e"),
            0..2u8,
        )
            .prop_map(|(tasks, gateways, events, name)| {
                let mut workflow = definition(tasks, gateways, events);
                workflow.name = format!("workflow-{}", name);
                workflow
            })
    }

    fn names_by_id(definition: &WorkflowDefinition) -> HashMap<String, Value> {
        definition
            .sub_entities()
            .map(|entity| (entity.id.clone(), entity.payload["name"].clone()))
            .collect()
    }

    proptest! {
        #[test]
        fn diff_of_identical_snapshots_is_empty(a in definition_strategy()) {
            prop_assert!(diff(Some(&a), Some(&a)).is_empty());
        }

        #[test]
        fn diff_is_complete(a in definition_strategy(), b in definition_strategy()) {
            let change_set = diff(Some(&a), Some(&b));
            let a_names = names_by_id(&a);
            let b_names = names_by_id(&b);

            let expected: BTreeSet<String> = a_names
                .keys()
                .chain(b_names.keys())
                .filter(|id| a_names.get(*id) != b_names.get(*id))
                .cloned()
                .collect();
            let actual: Vec<String> = change_set
                .iter()
                .filter(|record| record.object_type != ObjectType::Workflow)
                .map(|record| record.id.clone())
                .collect();
            let actual_set: BTreeSet<String> = actual.iter().cloned().collect();

            prop_assert_eq!(actual.len(), actual_set.len());
            prop_assert_eq!(actual_set, expected);

            for id in b_names.keys().filter(|id| !a_names.contains_key(*id)) {
                let record = change_set.iter().find(|record| &record.id == id).unwrap();
                prop_assert!(record.target_state.is_none());
            }
        }

        #[test]
        fn diff_groups_are_ordered(a in definition_strategy(), b in definition_strategy()) {
            let change_set = diff(Some(&a), Some(&b));
            let groups: Vec<usize> = change_set.iter().map(|record| group_index(record.object_type)).collect();

            prop_assert!(groups.windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }
}

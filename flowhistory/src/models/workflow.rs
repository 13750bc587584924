use macros::Id;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::FlowHistoryError;

#[derive(Serialize, Deserialize, strum_macros::Display, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityType {
    Task,
    Gateway,
    Event,
}

impl EntityType {
    /// Application order of sub-entity groups within a change set.
    pub const DIFF_ORDER: [EntityType; 3] = [EntityType::Event, EntityType::Gateway, EntityType::Task];

    /// Name of the backend collection, also used as the REST path segment.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityType::Task => "tasks",
            EntityType::Gateway => "gateways",
            EntityType::Event => "events",
        }
    }
}

/// Task, gateway or event of a workflow. `id` is stable across versions.
#[derive(Id, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SubEntity {
    pub id: String,

    #[serde(rename = "type")]
    pub entity_type: EntityType,

    #[serde(default)]
    pub payload: Value,
}

/// Workflow definition
///
/// Root aggregate of a version snapshot. Besides `id`, `name` and `schema` any other root attribute sent by the
/// backend is kept in `attributes` so it takes part in the root comparison and survives a revert.
///
/// Collections are optional on the wire. A definition missing one of them can't be diffed.
#[derive(Id, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct WorkflowDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub schema: Value,

    pub tasks: Option<Vec<SubEntity>>,
    pub gateways: Option<Vec<SubEntity>>,
    pub events: Option<Vec<SubEntity>>,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl WorkflowDefinition {
    pub fn collection(&self, entity_type: EntityType) -> Option<&Vec<SubEntity>> {
        match entity_type {
            EntityType::Task => self.tasks.as_ref(),
            EntityType::Gateway => self.gateways.as_ref(),
            EntityType::Event => self.events.as_ref(),
        }
    }

    pub fn collection_mut(&mut self, entity_type: EntityType) -> &mut Vec<SubEntity> {
        let collection = match entity_type {
            EntityType::Task => &mut self.tasks,
            EntityType::Gateway => &mut self.gateways,
            EntityType::Event => &mut self.events,
        };

        collection.get_or_insert_with(Vec::new)
    }

    /// Returns the collection or `DiffComputationError` when the snapshot doesn't carry it.
    pub fn required_collection(&self, entity_type: EntityType) -> Result<&Vec<SubEntity>, FlowHistoryError> {
        self.collection(entity_type).ok_or_else(|| {
            FlowHistoryError::DiffComputationError(format!(
                "workflow {} is missing the `{}` collection",
                self.id,
                entity_type.collection()
            ))
        })
    }

    /// Iterates over all sub-entities in diff order.
    pub fn sub_entities(&self) -> impl Iterator<Item = &SubEntity> {
        EntityType::DIFF_ORDER
            .into_iter()
            .filter_map(move |entity_type| self.collection(entity_type))
            .flatten()
    }

    /// Root fields without the sub-entity collections.
    pub fn root_state(&self) -> Value {
        let mut state = self.attributes.clone();

        state.insert("id".to_string(), Value::String(self.id.clone()));
        state.insert("name".to_string(), Value::String(self.name.clone()));
        state.insert("schema".to_string(), self.schema.clone());

        Value::Object(state)
    }

    /// Applies root fields written by a revert. Collections in `fields` are ignored and `id` never changes.
    pub fn apply_root_state(&mut self, fields: &Value) -> Result<(), FlowHistoryError> {
        let fields = fields
            .as_object()
            .ok_or_else(|| FlowHistoryError::BadRequest("workflow fields must be a JSON object".to_string()))?;

        let name = match fields.get("name") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(FlowHistoryError::BadRequest(format!(
                    "workflow name must be a string, got {}",
                    other
                )))
            }
        };

        let mut attributes = Map::new();

        for (key, value) in fields {
            match key.as_str() {
                "id" | "tasks" | "gateways" | "events" => {}
                "name" => self.name = name.clone(),
                "schema" => self.schema = value.clone(),
                _ => {
                    attributes.insert(key.clone(), value.clone());
                }
            }
        }

        self.attributes = attributes;

        Ok(())
    }
}

use macros::Id;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FlowHistoryError;
use crate::models::workflow::EntityType;

#[derive(Serialize, Deserialize, strum_macros::Display, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ObjectType {
    Workflow,
    Task,
    Gateway,
    Event,
}

impl From<EntityType> for ObjectType {
    fn from(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Task => ObjectType::Task,
            EntityType::Gateway => ObjectType::Gateway,
            EntityType::Event => ObjectType::Event,
        }
    }
}

impl TryFrom<ObjectType> for EntityType {
    type Error = FlowHistoryError;

    fn try_from(object_type: ObjectType) -> Result<Self, Self::Error> {
        match object_type {
            ObjectType::Task => Ok(EntityType::Task),
            ObjectType::Gateway => Ok(EntityType::Gateway),
            ObjectType::Event => Ok(EntityType::Event),
            ObjectType::Workflow => Err(FlowHistoryError::BadRequest(
                "workflow is not a sub-entity type".to_string(),
            )),
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

/// One difference between two snapshots for a single entity or the workflow root.
///
/// `target_state` is the payload in the target (newer) snapshot, `source_state` the payload in the snapshot being
/// reverted to. `None` means the entity doesn't exist on that side.
#[derive(Id, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChangeRecord {
    #[serde(rename = "type")]
    pub object_type: ObjectType,

    pub id: String,

    #[serde(rename = "displayName")]
    pub display_name: String,

    #[serde(rename = "targetState")]
    pub target_state: Option<Value>,

    #[serde(rename = "sourceState")]
    pub source_state: Option<Value>,

    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl ChangeRecord {
    pub fn new(
        object_type: ObjectType,
        id: String,
        target_state: Option<Value>,
        source_state: Option<Value>,
    ) -> Self {
        let display_name = source_state
            .as_ref()
            .or(target_state.as_ref())
            .and_then(display_name_of)
            .unwrap_or_else(|| id.clone());

        Self {
            object_type,
            id,
            display_name,
            target_state,
            source_state,
            enabled: true,
        }
    }
}

fn display_name_of(state: &Value) -> Option<String> {
    ["name", "displayName"]
        .iter()
        .find_map(|key| state.get(key).and_then(Value::as_str))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Ordered result of a diff: workflow root first, then events, gateways and tasks.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    pub records: Vec<ChangeRecord>,

    /// Set when the diff was absorbed as empty because a snapshot was malformed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ChangeSet {
    pub fn new(records: Vec<ChangeRecord>) -> Self {
        Self { records, warning: None }
    }

    pub fn with_warning(warning: String) -> Self {
        Self {
            records: Vec::new(),
            warning: Some(warning),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRecord> {
        self.records.iter()
    }
}

impl IntoIterator for ChangeSet {
    type Item = ChangeRecord;
    type IntoIter = std::vec::IntoIter<ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

use log::debug;
use serde_json::Value;

use crate::errors::FlowHistoryError;
use crate::models::change::{ChangeRecord, ObjectType};
use crate::models::workflow::EntityType;
use crate::resources::concurrency_guard::LastVersionToken;
use crate::resources::workflow_api::WorkflowApi;

/// Backend write that brings one entity back to its source state.
#[derive(Clone, Debug, PartialEq)]
pub enum RevertOperation {
    UpdateWorkflow {
        fields: Value,
    },
    Upsert {
        entity_type: EntityType,
        entity_id: String,
        payload: Value,
    },
    Create {
        entity_type: EntityType,
        entity_id: String,
        payload: Value,
    },
    Delete {
        entity_type: EntityType,
        entity_id: String,
    },
}

impl RevertOperation {
    pub fn resolve(change: &ChangeRecord) -> Result<Self, FlowHistoryError> {
        if change.object_type == ObjectType::Workflow {
            // the root is only ever updated
            let fields = change.source_state.clone().ok_or_else(|| {
                FlowHistoryError::BadRequest(format!("workflow change {} has no source state", change.id))
            })?;

            return Ok(RevertOperation::UpdateWorkflow { fields });
        }

        let entity_type = EntityType::try_from(change.object_type)?;
        let entity_id = change.id.clone();

        match (&change.target_state, &change.source_state) {
            (Some(_), Some(payload)) => Ok(RevertOperation::Upsert {
                entity_type,
                entity_id,
                payload: payload.clone(),
            }),
            (None, Some(payload)) => Ok(RevertOperation::Create {
                entity_type,
                entity_id,
                payload: payload.clone(),
            }),
            (Some(_), None) => Ok(RevertOperation::Delete { entity_type, entity_id }),
            (None, None) => Err(FlowHistoryError::BadRequest(format!(
                "{} change {} has neither a target nor a source state",
                change.object_type, change.id
            ))),
        }
    }

    pub async fn apply(
        &self,
        api: &dyn WorkflowApi,
        workflow_id: &str,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError> {
        debug!("RevertOperation::{} on workflow {} with version {}", self, workflow_id, token);

        match self {
            RevertOperation::UpdateWorkflow { fields } => api.update_workflow(workflow_id, fields, token).await,
            RevertOperation::Upsert {
                entity_type,
                entity_id,
                payload,
            } => {
                api.upsert_entity(workflow_id, *entity_type, entity_id, payload, token)
                    .await
            }
            RevertOperation::Create {
                entity_type,
                entity_id,
                payload,
            } => {
                api.create_entity(workflow_id, *entity_type, entity_id, payload, token)
                    .await
            }
            RevertOperation::Delete { entity_type, entity_id } => {
                api.delete_entity(workflow_id, *entity_type, entity_id, token).await
            }
        }
    }
}

impl std::fmt::Display for RevertOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RevertOperation::UpdateWorkflow { .. } => write!(f, "update workflow"),
            RevertOperation::Upsert {
                entity_type, entity_id, ..
            } => write!(f, "upsert {} {}", entity_type, entity_id),
            RevertOperation::Create {
                entity_type, entity_id, ..
            } => write!(f, "create {} {}", entity_type, entity_id),
            RevertOperation::Delete { entity_type, entity_id } => write!(f, "delete {} {}", entity_type, entity_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::workflow::{SubEntity, WorkflowDefinition};
    use crate::resources::memory_store::MemoryWorkflowStore;
    use serde_json::json;

    fn record(object_type: ObjectType, target: Option<Value>, source: Option<Value>) -> ChangeRecord {
        ChangeRecord::new(object_type, "X1".to_string(), target, source)
    }

    #[test]
    fn resolves_each_kind_of_change() {
        assert_eq!(
            RevertOperation::resolve(&record(ObjectType::Task, Some(json!({"n": 1})), Some(json!({"n": 2})))).unwrap(),
            RevertOperation::Upsert {
                entity_type: EntityType::Task,
                entity_id: "X1".to_string(),
                payload: json!({"n": 2}),
            }
        );
        assert_eq!(
            RevertOperation::resolve(&record(ObjectType::Event, None, Some(json!({"n": 2})))).unwrap(),
            RevertOperation::Create {
                entity_type: EntityType::Event,
                entity_id: "X1".to_string(),
                payload: json!({"n": 2}),
            }
        );
        assert_eq!(
            RevertOperation::resolve(&record(ObjectType::Gateway, Some(json!({"n": 1})), None)).unwrap(),
            RevertOperation::Delete {
                entity_type: EntityType::Gateway,
                entity_id: "X1".to_string(),
            }
        );
        assert_eq!(
            RevertOperation::resolve(&record(
                ObjectType::Workflow,
                Some(json!({"name": "A"})),
                Some(json!({"name": "B"}))
            ))
            .unwrap(),
            RevertOperation::UpdateWorkflow {
                fields: json!({"name": "B"})
            }
        );
    }

    #[test]
    fn rejects_change_without_states() {
        assert!(matches!(
            RevertOperation::resolve(&record(ObjectType::Task, None, None)),
            Err(FlowHistoryError::BadRequest(_))
        ));
        assert!(RevertOperation::resolve(&record(ObjectType::Workflow, Some(json!({})), None)).is_err());
    }

    #[tokio::test]
    async fn applies_against_the_store() {
        let store = MemoryWorkflowStore::seeded(
            1,
            vec![WorkflowDefinition {
                id: "wf-1".to_string(),
                name: "Old".to_string(),
                tasks: Some(vec![SubEntity {
                    id: "X1".to_string(),
                    entity_type: EntityType::Task,
                    payload: json!({"n": 1}),
                }]),
                gateways: Some(vec![]),
                events: Some(vec![]),
                ..Default::default()
            }],
        );
        let token = LastVersionToken::new(1);

        let operations = [
            RevertOperation::UpdateWorkflow {
                fields: json!({"id": "wf-1", "name": "New"}),
            },
            RevertOperation::Delete {
                entity_type: EntityType::Task,
                entity_id: "X1".to_string(),
            },
            RevertOperation::Create {
                entity_type: EntityType::Event,
                entity_id: "E1".to_string(),
                payload: json!({"name": "Start"}),
            },
        ];

        for operation in &operations {
            operation.apply(&store, "wf-1", &token).await.unwrap();
        }

        let draft = store.draft("wf-1").unwrap();
        assert_eq!(draft.name, "New");
        assert_eq!(draft.tasks, Some(vec![]));
        assert_eq!(draft.events.unwrap()[0].id, "E1");
        assert_eq!(
            store.journal(),
            vec!["update workflow", "delete tasks/X1", "create events/E1"]
        );
    }
}

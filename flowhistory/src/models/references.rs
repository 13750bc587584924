use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::models::workflow::WorkflowDefinition;

/// References between sub-entities of one definition.
///
/// A sub-entity references another one when any string value in its payload equals the other's id, e.g. a gateway
/// whose outgoing flow targets a task id.
pub struct ReferenceGraph {
    edges: HashMap<String, Vec<String>>,
}

/// Accumulated state of a chase. Every fold step returns a new one.
#[derive(Default)]
struct Visited {
    ids: HashSet<String>,
    order: Vec<String>,
}

impl Visited {
    fn with(mut self, id: &str) -> Self {
        self.ids.insert(id.to_string());
        self.order.push(id.to_string());
        self
    }
}

impl ReferenceGraph {
    pub fn from_definition(definition: &WorkflowDefinition) -> Self {
        let known_ids: HashSet<&str> = definition.sub_entities().map(|entity| entity.id.as_str()).collect();

        let edges = definition
            .sub_entities()
            .map(|entity| {
                let references = collect_references(&entity.payload, &known_ids, Vec::new())
                    .into_iter()
                    .filter(|id| *id != entity.id)
                    .map(str::to_string)
                    .collect::<Vec<String>>();

                (entity.id.clone(), references)
            })
            .collect();

        Self { edges }
    }

    pub fn references(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every sub-entity reachable from `start`, in discovery order, without `start` itself. Cycles terminate because
    /// a visited id is never expanded twice.
    pub fn chase(&self, start: &str) -> Vec<String> {
        let visited = self.fold_reachable(start, Visited::default());

        visited.order.into_iter().filter(|id| id != start).collect()
    }

    fn fold_reachable(&self, id: &str, visited: Visited) -> Visited {
        if visited.ids.contains(id) {
            return visited;
        }

        self.references(id)
            .iter()
            .fold(visited.with(id), |acc, referenced| self.fold_reachable(referenced, acc))
    }
}

/// Folds every string in `value` that is a known id into `acc`, without duplicates.
fn collect_references<'a>(value: &Value, known_ids: &HashSet<&'a str>, acc: Vec<&'a str>) -> Vec<&'a str> {
    match value {
        Value::String(candidate) => match known_ids.get(candidate.as_str()) {
            Some(id) if !acc.contains(id) => {
                let mut acc = acc;
                acc.push(*id);
                acc
            }
            _ => acc,
        },
        Value::Array(items) => items
            .iter()
            .fold(acc, |acc, item| collect_references(item, known_ids, acc)),
        Value::Object(object) => object
            .values()
            .fold(acc, |acc, item| collect_references(item, known_ids, acc)),
        _ => acc,
    }
}

//! Per-run pipeline context
//!
//! The orchestrator owns the shared data dictionary; sibling contract layers
//! and phase handlers write into it freely. The engine's write domain is
//! limited to its two reserved slots (`propagation` and `lineage`) plus the
//! defaults the boundary validator applies to declared fields.
//!
//! A context belongs to exactly one run. Nothing in it is shared across runs.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::boundary::PropagationState;
use crate::tracker::LineageState;
use crate::types::FieldPath;

#[derive(Debug, Clone)]
pub struct PipelineContext {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    data: Map<String, Value>,
    propagation: PropagationState,
    lineage: LineageState,
}

impl PipelineContext {
    /// Fresh context with an empty data dictionary and a new run id.
    pub fn new() -> Self {
        Self::with_data(Map::new())
    }

    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            data,
            propagation: PropagationState::default(),
            lineage: LineageState::default(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Read a value by dot path.
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        let mut segments = path.segments();
        let first = segments.next()?;
        let mut current = self.data.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Write a value by dot path, creating intermediate objects.
    ///
    /// A non-object intermediate is replaced by an object.
    pub fn set(&mut self, path: &FieldPath, value: Value) {
        let segments: Vec<&str> = path.segments().collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut current = &mut self.data;
        for segment in parents {
            let slot = current
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                tracing::debug!(
                    field = %path,
                    segment = *segment,
                    "Replacing non-object intermediate while setting context value"
                );
                *slot = Value::Object(Map::new());
            }
            let Value::Object(next) = slot else {
                return;
            };
            current = next;
        }
        current.insert((*last).to_string(), value);
    }

    /// Remove a value by dot path, returning it.
    pub fn remove(&mut self, path: &FieldPath) -> Option<Value> {
        let segments: Vec<&str> = path.segments().collect();
        let (last, parents) = segments.split_last()?;
        let mut current = &mut self.data;
        for segment in parents {
            current = current.get_mut(*segment)?.as_object_mut()?;
        }
        current.remove(*last)
    }

    pub fn contains(&self, path: &FieldPath) -> bool {
        self.get(path).is_some()
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_data(self) -> Map<String, Value> {
        self.data
    }

    pub fn propagation(&self) -> &PropagationState {
        &self.propagation
    }

    pub fn lineage(&self) -> &LineageState {
        &self.lineage
    }

    pub(crate) fn propagation_mut(&mut self) -> &mut PropagationState {
        &mut self.propagation
    }

    pub(crate) fn lineage_mut(&mut self) -> &mut LineageState {
        &mut self.lineage
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}

//! Cross-field lineage graph
//!
//! Nodes are field paths; an edge `a -> b` exists for every record that read
//! `a` and wrote `b` with `a != b`. The graph stays acyclic: an edge that
//! would close a cycle is dropped with a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::tracker::{LineageState, TransformationRecord};
use crate::types::{FieldPath, Operation};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub source_field: FieldPath,
    pub dest_field: FieldPath,
    pub phase: String,
    pub operation: Operation,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

#[derive(Clone, Debug, Default)]
pub struct LineageGraph {
    fields: BTreeSet<FieldPath>,
    edges: Vec<LineageEdge>,
    records: Vec<TransformationRecord>,
    outgoing: BTreeMap<FieldPath, Vec<usize>>,
    incoming: BTreeMap<FieldPath, Vec<usize>>,
}

impl LineageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from every record of a run, in sequence order.
    pub fn from_state(state: &LineageState) -> Self {
        let mut graph = Self::new();
        for record in state.all_records() {
            graph.add_record(record);
        }
        graph
    }

    /// Add one record; returns whether it produced an edge.
    pub fn add_record(&mut self, record: &TransformationRecord) -> bool {
        let source = &record.input_field_path;
        let dest = &record.output_field_path;
        self.fields.insert(source.clone());
        self.fields.insert(dest.clone());

        if !record.crosses_fields() {
            return false;
        }
        if self.reaches(dest, source) {
            tracing::warn!(
                source = %source,
                dest = %dest,
                phase = %record.phase,
                "Dropping lineage edge that would close a cycle"
            );
            return false;
        }

        let index = self.edges.len();
        self.edges.push(LineageEdge {
            source_field: source.clone(),
            dest_field: dest.clone(),
            phase: record.phase.clone(),
            operation: record.operation,
            timestamp: record.timestamp,
            sequence: record.sequence,
        });
        self.records.push(record.clone());
        self.outgoing.entry(source.clone()).or_default().push(index);
        self.incoming.entry(dest.clone()).or_default().push(index);
        true
    }

    pub fn edges(&self) -> &[LineageEdge] {
        &self.edges
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldPath> {
        self.fields.iter()
    }

    /// Direct parents of `field`.
    pub fn derived_from(&self, field: &FieldPath) -> BTreeSet<&FieldPath> {
        self.incoming
            .get(field)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i].source_field)
            .collect()
    }

    /// Every field `field` was transitively derived from.
    pub fn ancestors(&self, field: &FieldPath) -> BTreeSet<FieldPath> {
        self.closure(field, |graph, f| {
            graph
                .incoming
                .get(f)
                .into_iter()
                .flatten()
                .map(|&i| &graph.edges[i].source_field)
                .collect()
        })
    }

    /// Every field transitively derived from `field`.
    pub fn descendants(&self, field: &FieldPath) -> BTreeSet<FieldPath> {
        self.closure(field, |graph, f| {
            graph
                .outgoing
                .get(f)
                .into_iter()
                .flatten()
                .map(|&i| &graph.edges[i].dest_field)
                .collect()
        })
    }

    /// Shortest chain of records leading from `from` to `to`.
    ///
    /// `Some(vec![])` when both are the same field.
    pub fn path_between(&self, from: &FieldPath, to: &FieldPath) -> Option<Vec<TransformationRecord>> {
        if from == to {
            return Some(Vec::new());
        }

        let mut came_by: HashMap<&FieldPath, usize> = HashMap::new();
        let mut queue = VecDeque::from([from]);

        while let Some(field) = queue.pop_front() {
            for &edge_index in self.outgoing.get(field).into_iter().flatten() {
                let next = &self.edges[edge_index].dest_field;
                if next == from || came_by.contains_key(next) {
                    continue;
                }
                came_by.insert(next, edge_index);
                if next == to {
                    return Some(self.unwind(&came_by, from, to));
                }
                queue.push_back(next);
            }
        }
        None
    }

    fn unwind<'a>(
        &'a self,
        came_by: &HashMap<&'a FieldPath, usize>,
        from: &'a FieldPath,
        to: &'a FieldPath,
    ) -> Vec<TransformationRecord> {
        let mut path = Vec::new();
        let mut cursor = to;
        while cursor != from {
            let Some(&edge_index) = came_by.get(cursor) else {
                break;
            };
            path.push(self.records[edge_index].clone());
            cursor = &self.edges[edge_index].source_field;
        }
        path.reverse();
        path
    }

    fn reaches(&self, from: &FieldPath, to: &FieldPath) -> bool {
        from == to || self.descendants(from).contains(to)
    }

    fn closure<'a, F>(&'a self, start: &FieldPath, neighbours: F) -> BTreeSet<FieldPath>
    where
        F: Fn(&'a Self, &FieldPath) -> Vec<&'a FieldPath>,
    {
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<&FieldPath> = neighbours(self, start).into();

        while let Some(field) = queue.pop_front() {
            if field == start || !visited.insert(field.clone()) {
                continue;
            }
            queue.extend(neighbours(self, field));
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use pretty_assertions::assert_eq;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).expect("valid path")
    }

    fn edge_record(seq: u64, phase: &str, from: &str, to: &str) -> TransformationRecord {
        TransformationRecord::new(
            seq,
            phase,
            Operation::Derive,
            path(from),
            path(to),
            Some(fingerprint(from)),
            fingerprint(to),
        )
    }

    fn set(fields: &[&str]) -> BTreeSet<FieldPath> {
        fields.iter().map(|f| path(f)).collect()
    }

    fn diamond() -> LineageGraph {
        let mut graph = LineageGraph::new();
        graph.add_record(&edge_record(0, "plan", "domain", "constraints"));
        graph.add_record(&edge_record(1, "plan", "domain", "stack"));
        graph.add_record(&edge_record(2, "design", "constraints", "layout"));
        graph.add_record(&edge_record(3, "design", "stack", "layout"));
        graph.add_record(&edge_record(4, "implement", "layout", "code"));
        graph
    }

    #[test]
    fn ancestors_and_descendants() {
        let graph = diamond();
        assert_eq!(graph.ancestors(&path("code")), set(&["domain", "constraints", "stack", "layout"]));
        assert_eq!(graph.descendants(&path("domain")), set(&["constraints", "stack", "layout", "code"]));
        assert!(graph.ancestors(&path("domain")).is_empty());
        assert_eq!(graph.derived_from(&path("layout")).len(), 2);
    }

    #[test]
    fn same_field_records_add_nodes_not_edges() {
        let mut graph = LineageGraph::new();
        let record = TransformationRecord::new(
            0,
            "scaffold",
            Operation::Passthrough,
            path("domain"),
            path("domain"),
            Some(fingerprint("x")),
            fingerprint("x"),
        );
        assert!(!graph.add_record(&record));
        assert!(graph.edges().is_empty());
        assert_eq!(graph.fields().count(), 1);
    }

    #[test]
    fn shortest_path_between_fields() {
        let graph = diamond();
        let route = graph
            .path_between(&path("domain"), &path("code"))
            .expect("path exists");
        let phases: Vec<&str> = route.iter().map(|r| r.phase.as_str()).collect();
        assert_eq!(phases, vec!["plan", "design", "implement"]);
        assert_eq!(route[0].output_field_path, path("constraints"));

        assert_eq!(graph.path_between(&path("code"), &path("code")), Some(vec![]));
        assert_eq!(graph.path_between(&path("code"), &path("domain")), None);
    }

    #[test]
    fn cycle_closing_edge_is_dropped() {
        let mut graph = diamond();
        assert!(!graph.add_record(&edge_record(5, "review", "code", "domain")));
        assert!(!graph.ancestors(&path("domain")).contains(&path("code")));
        assert_eq!(graph.edges().len(), 5);
    }
}

//! Shared graphs for unit tests.

use std::sync::Arc;

use crate::form::{Answer, FormTraversal};
use crate::questions::QuestionGraph;
use crate::storage::{Edge, GraphSnapshot, MemoryGraphStore, SharedGraphStore, Vertex};

/// The questionnaire used across the test suite.
pub(crate) fn fixture_snapshot() -> GraphSnapshot {
    serde_json::from_str(include_str!("../tests/fixtures/question_graph.json"))
        .expect("fixture graph parses")
}

pub(crate) fn fixture_store() -> SharedGraphStore {
    Arc::new(MemoryGraphStore::from_snapshot(fixture_snapshot()))
}

pub(crate) fn traversal_over(store: SharedGraphStore) -> FormTraversal {
    FormTraversal::new(QuestionGraph::new(store, "1"), "Yes")
}

pub(crate) fn fixture_traversal() -> FormTraversal {
    traversal_over(fixture_store())
}

/// A complete, ungated run through the fixture.
pub(crate) fn fixture_history() -> Vec<Answer> {
    vec![
        Answer::single("Canary"),
        Answer::single("No"),
        Answer::single("DataSet, CSV or Data Base"),
        Answer::single("Predict a numerical value"),
        Answer::many(["Higher speed", "Higher accuracy"]),
        Answer::single("Internal User"),
    ]
}

/// Node "1" is open with a single edge to "2"; "2" picks between "3" and "4".
pub(crate) fn yes_no_store() -> SharedGraphStore {
    let snapshot = GraphSnapshot {
        vertices: vec![
            Vertex::new("1", "Q_Open").with_property("text", "Anything to add?"),
            Vertex::new("2", "Q_QCM").with_property("text", "Continue?"),
            Vertex::new("3", "end"),
            Vertex::new("4", "end"),
        ],
        edges: vec![
            Edge::new("Proposition", "1", "2").with_property("text", ""),
            Edge::new("Proposition", "2", "3").with_property("text", "Yes"),
            Edge::new("Proposition", "2", "4").with_property("text", "No"),
        ],
    };
    Arc::new(MemoryGraphStore::from_snapshot(snapshot))
}

//! Answer histories and their traversal over the question graph.
//!
//! A history is the caller-supplied ordered list of [`Answer`]s. Nothing is
//! cached between calls: [`FormTraversal`] derives the current question from
//! the full history every time, and [`HistoryReplay`] layers the pre-fill logic
//! used to edit a previously recorded form on top of it.

pub mod replay;
pub mod traversal;

pub use replay::{DivergenceTracker, HistoryReplay, ReplayState, ReplayStep, ReviewEntry};
pub use traversal::{FormTraversal, TraversalCursor};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::questions::{AnswerOption, QuestionKind};

/// The values given for one question.
///
/// Free text for an open question, option labels otherwise. A multi-select
/// answer may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answer(pub Vec<String>);

impl Answer {
    /// An answer holding one value.
    pub fn single(value: impl Into<String>) -> Self {
        Self(vec![value.into()])
    }

    /// An answer holding several values.
    pub fn many<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }

    /// The raw values.
    pub fn values(&self) -> &[String] {
        &self.0
    }

    /// First value, if any.
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Whether both answers hold the same values, in any order.
    pub fn same_selection(&self, other: &Answer) -> bool {
        let mine: BTreeSet<&str> = self.0.iter().map(String::as_str).collect();
        let theirs: BTreeSet<&str> = other.0.iter().map(String::as_str).collect();
        mine == theirs
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no value was given.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl From<&str> for Answer {
    fn from(value: &str) -> Self {
        Self::single(value)
    }
}

impl From<String> for Answer {
    fn from(value: String) -> Self {
        Self::single(value)
    }
}

impl From<Vec<String>> for Answer {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

impl From<Vec<&str>> for Answer {
    fn from(values: Vec<&str>) -> Self {
        Self::many(values)
    }
}

/// One resolved step of a traversal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerEvent {
    /// Zero-based position in the history.
    pub position: usize,
    /// Id of the answered question.
    pub question_id: String,
    /// Question text at the time it was answered.
    pub question_text: String,
    /// Kind of the answered question.
    pub kind: QuestionKind,
    /// Options taken: the single outgoing option for an open question, the
    /// selected ones otherwise.
    pub chosen: Vec<AnswerOption>,
    /// Free text of an open question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_text: Option<String>,
}

impl AnswerEvent {
    /// Text recorded on the persisted path for each chosen option.
    ///
    /// Open questions record the free text in place of the option label.
    pub fn recorded_texts(&self) -> Vec<String> {
        match (&self.free_text, self.kind) {
            (Some(text), QuestionKind::Open) => vec![text.clone(); self.chosen.len().max(1)],
            _ => self.chosen.iter().map(|o| o.text.clone()).collect(),
        }
    }

    /// The answer that reproduces this event.
    pub fn to_answer(&self) -> Answer {
        match &self.free_text {
            Some(text) => Answer::single(text.clone()),
            None => Answer(self.chosen.iter().map(|o| o.text.clone()).collect()),
        }
    }
}

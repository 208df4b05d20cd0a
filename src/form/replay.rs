use serde::Serialize;
use tracing::debug;

use super::{Answer, FormTraversal};
use crate::error::FormResult;
use crate::questions::{QuestionKind, QuestionNode};

/// Tracks whether a live history still agrees with a recorded one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DivergenceTracker {
    diverged_at: Option<usize>,
}

impl DivergenceTracker {
    /// Answer to suggest at `position`.
    ///
    /// Nothing is suggested after a divergence, nor for open or terminal questions.
    pub fn prefill(&self, position: usize, kind: QuestionKind, previous: &[Answer]) -> Option<Answer> {
        match kind {
            QuestionKind::Open | QuestionKind::End => None,
            _ if self.diverged_at.is_some() => None,
            _ => previous.get(position).cloned(),
        }
    }

    /// Record the answer given at `position`. Open questions never count as a
    /// change, and multi-select choices compare regardless of order.
    pub fn observe(&mut self, position: usize, kind: QuestionKind, answer: &Answer, previous: &[Answer]) {
        if self.diverged_at.is_some() || matches!(kind, QuestionKind::Open | QuestionKind::End) {
            return;
        }
        let unchanged = match (kind, previous.get(position)) {
            (QuestionKind::MultiSelect, Some(recorded)) => recorded.same_selection(answer),
            (_, recorded) => recorded == Some(answer),
        };
        if !unchanged {
            debug!(position, "History diverged from recorded answers");
            self.diverged_at = Some(position);
        }
    }

    /// Position of the first changed answer.
    pub fn divergence(&self) -> Option<usize> {
        self.diverged_at
    }

    /// Whether the live history edits the recorded one.
    pub fn is_editing(&self) -> bool {
        self.diverged_at.is_some()
    }
}

/// One step of a replayed session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayStep {
    /// Position in the history.
    pub position: usize,
    /// Question shown at this step.
    pub question: QuestionNode,
    /// Recorded answer suggested for this step.
    pub prefill: Option<Answer>,
    /// Answer actually given, absent for the current step.
    pub answer: Option<Answer>,
}

/// Outcome of replaying a live history against a recorded one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayState {
    /// Answered steps followed by the current one.
    pub steps: Vec<ReplayStep>,
    /// Raised once any non-open answer differs from the recorded one.
    pub editing: bool,
    /// Position of the first differing answer.
    pub divergence: Option<usize>,
    /// Whether the live history reached the end of the questionnaire.
    pub complete: bool,
}

impl ReplayState {
    /// The step awaiting an answer.
    pub fn current(&self) -> Option<&ReplayStep> {
        self.steps.last()
    }

    /// Suggestion for the step awaiting an answer.
    pub fn next_prefill(&self) -> Option<&Answer> {
        self.current().and_then(|s| s.prefill.as_ref())
    }
}

/// A recorded answer paired with its question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewEntry {
    /// The question as the recorded answers reach it.
    pub question: QuestionNode,
    /// The recorded answer.
    pub answer: Answer,
}

/// Replays a live session over a previously recorded answer sequence.
#[derive(Debug, Clone, Default)]
pub struct HistoryReplay {
    previous: Vec<Answer>,
}

impl HistoryReplay {
    /// Create a replay over the recorded answers.
    pub fn new(previous: Vec<Answer>) -> Self {
        Self { previous }
    }

    /// The recorded answers.
    pub fn previous(&self) -> &[Answer] {
        &self.previous
    }

    /// Walk `history` and compute what to suggest at each step.
    pub async fn replay(&self, traversal: &FormTraversal, history: &[Answer]) -> FormResult<ReplayState> {
        let cursor = traversal.resolve(history).await?;
        let mut tracker = DivergenceTracker::default();
        let mut steps = Vec::with_capacity(cursor.len());

        for (position, question) in cursor.visited().iter().enumerate() {
            let prefill = tracker.prefill(position, question.kind, &self.previous);
            let answer = history.get(position).cloned();
            if let Some(given) = &answer {
                tracker.observe(position, question.kind, given, &self.previous);
            }
            steps.push(ReplayStep {
                position,
                question: question.clone(),
                prefill,
                answer,
            });
        }

        Ok(ReplayState {
            steps,
            editing: tracker.is_editing(),
            divergence: tracker.divergence(),
            complete: cursor.is_complete(),
        })
    }

    /// Pair every recorded answer with the question it answers.
    pub async fn review(&self, traversal: &FormTraversal) -> FormResult<Vec<ReviewEntry>> {
        let cursor = traversal.resolve(&self.previous).await?;
        Ok(cursor
            .visited()
            .iter()
            .zip(cursor.answers())
            .map(|(question, answer)| ReviewEntry {
                question: question.clone(),
                answer: answer.clone(),
            })
            .collect())
    }
}

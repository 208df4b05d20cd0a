use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use super::{Answer, AnswerEvent};
use crate::error::{FormError, FormResult};
use crate::questions::{AnswerOption, QuestionGraph, QuestionKind, QuestionNode};

/// Traversal state derived from a history.
///
/// `visited` always holds one more node than `answers` once the first question
/// has been loaded: the last entry is the current question.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraversalCursor {
    visited: Vec<QuestionNode>,
    events: Vec<AnswerEvent>,
    answers: Vec<Answer>,
    gate_position: Option<usize>,
}

impl TraversalCursor {
    /// Number of visited questions, the current one included.
    pub fn len(&self) -> usize {
        self.visited.len()
    }

    /// Whether nothing has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }

    /// The current question.
    pub fn current(&self) -> Option<&QuestionNode> {
        self.visited.last()
    }

    /// Every visited question, in order.
    pub fn visited(&self) -> &[QuestionNode] {
        &self.visited
    }

    /// Resolved answer events, in order.
    pub fn events(&self) -> &[AnswerEvent] {
        &self.events
    }

    /// Consume the cursor, keeping its events.
    pub fn into_events(self) -> Vec<AnswerEvent> {
        self.events
    }

    /// Answers consumed so far.
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    /// Position of the affirmative gate answer, if any.
    pub fn gate_position(&self) -> Option<usize> {
        self.gate_position
    }

    /// Whether restricted options are hidden.
    pub fn is_gated(&self) -> bool {
        self.gate_position.is_some()
    }

    /// Whether the current question is the terminal one.
    pub fn is_complete(&self) -> bool {
        self.current().is_some_and(QuestionNode::is_end)
    }

    /// Keep the first `answered` answers and drop everything derived from the rest.
    pub fn truncate(&mut self, answered: usize) {
        self.answers.truncate(answered);
        self.events.truncate(answered);
        self.visited.truncate(answered + 1);
        if self.gate_position.is_some_and(|p| p >= answered) {
            self.gate_position = None;
        }
    }
}

/// Maps an answer history to the question it leads to.
#[derive(Clone)]
pub struct FormTraversal {
    graph: QuestionGraph,
    gate_affirmative: String,
}

impl FormTraversal {
    /// Create a traversal over `graph`. A gate answered with `gate_affirmative`
    /// hides restricted options for the rest of the run.
    pub fn new(graph: QuestionGraph, gate_affirmative: impl Into<String>) -> Self {
        Self {
            graph,
            gate_affirmative: gate_affirmative.into(),
        }
    }

    /// The question graph being traversed.
    pub fn graph(&self) -> &QuestionGraph {
        &self.graph
    }

    /// The question reached after answering `history`.
    pub async fn next_question(&self, history: &[Answer]) -> FormResult<QuestionNode> {
        let mut cursor = self.resolve(history).await?;
        cursor
            .visited
            .pop()
            .ok_or_else(|| FormError::not_found("question", self.graph.first_question_id()))
    }

    /// Resolve the whole history from scratch.
    pub async fn resolve(&self, history: &[Answer]) -> FormResult<TraversalCursor> {
        let mut cursor = TraversalCursor::default();
        self.advance(&mut cursor, history).await?;
        Ok(cursor)
    }

    /// Bring `cursor` in line with `history`.
    ///
    /// The longest prefix the cursor already agrees on is kept and everything
    /// after it is recomputed. On error the cursor holds the last consistent
    /// prefix.
    pub async fn advance(&self, cursor: &mut TraversalCursor, history: &[Answer]) -> FormResult<()> {
        let common = cursor
            .answers
            .iter()
            .zip(history)
            .take_while(|(known, given)| known == given)
            .count();
        cursor.truncate(common);

        if cursor.visited.is_empty() {
            let first = self
                .graph
                .question(self.graph.first_question_id(), false)
                .await?;
            cursor.visited.push(first);
        }

        for answer in &history[common..] {
            self.step(cursor, answer).await?;
        }

        debug!(
            answered = cursor.answers.len(),
            reused = common,
            gated = cursor.is_gated(),
            "Traversal resolved"
        );
        Ok(())
    }

    async fn step(&self, cursor: &mut TraversalCursor, answer: &Answer) -> FormResult<()> {
        let current = cursor
            .visited
            .last()
            .ok_or_else(|| FormError::not_found("question", self.graph.first_question_id()))?;
        let position = cursor.answers.len();
        let question_id = current.id.clone();
        let question_text = current.text.clone();
        let kind = current.kind;

        let (chosen, free_text, opens_gate) = match kind {
            QuestionKind::Open => {
                let text = match answer.values() {
                    [text] if !text.trim().is_empty() => text.clone(),
                    _ => return Err(FormError::invalid_selection(&question_id, answer.to_string())),
                };
                let [option] = current.options.as_slice() else {
                    return Err(FormError::malformed(
                        &question_id,
                        "open question must have exactly one option",
                    ));
                };
                (vec![option.clone()], Some(text), false)
            }
            QuestionKind::SingleSelect | QuestionKind::BooleanGate => {
                let option = match answer.values() {
                    [value] => current.option_by_text(value),
                    _ => None,
                }
                .ok_or_else(|| FormError::invalid_selection(&question_id, answer.to_string()))?;
                let opens_gate =
                    kind == QuestionKind::BooleanGate && option.text == self.gate_affirmative;
                (vec![option.clone()], None, opens_gate)
            }
            QuestionKind::MultiSelect => (select_many(current, answer)?, None, false),
            QuestionKind::End => {
                return Err(FormError::invalid_selection(&question_id, answer.to_string()));
            }
        };

        let target = chosen
            .first()
            .or_else(|| current.options.first())
            .map(|o| o.target.clone())
            .ok_or_else(|| FormError::malformed(&question_id, "no visible option"))?;

        let gated = cursor.is_gated() || opens_gate;
        let next = self.graph.question(&target, gated).await?;

        if opens_gate && cursor.gate_position.is_none() {
            debug!(question_id = %question_id, position, "Gate opened");
            cursor.gate_position = Some(position);
        }
        cursor.events.push(AnswerEvent {
            position,
            question_id,
            question_text,
            kind,
            chosen,
            free_text,
        });
        cursor.answers.push(answer.clone());
        cursor.visited.push(next);
        Ok(())
    }
}

fn select_many(question: &QuestionNode, answer: &Answer) -> FormResult<Vec<AnswerOption>> {
    let mut seen = HashSet::new();
    answer
        .values()
        .iter()
        .map(|value| {
            if !seen.insert(value.as_str()) {
                return Err(FormError::invalid_selection(&question.id, value.clone()));
            }
            question
                .option_by_text(value)
                .cloned()
                .ok_or_else(|| FormError::invalid_selection(&question.id, value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture_history, fixture_traversal, traversal_over, yes_no_store};
    use pretty_assertions::assert_eq;

    fn answers(values: &[&[&str]]) -> Vec<Answer> {
        values.iter().map(|v| Answer::many(v.iter().copied())).collect()
    }

    #[tokio::test]
    async fn test_empty_history_returns_first_question() {
        let traversal = fixture_traversal();
        let question = traversal.next_question(&[]).await.unwrap();
        assert_eq!(question.id, "1");
        assert_eq!(question.kind, QuestionKind::Open);
    }

    #[tokio::test]
    async fn test_open_then_single_select_end_to_end() {
        let traversal = traversal_over(yes_no_store());

        let second = traversal.next_question(&answers(&[&["yes"]])).await.unwrap();
        assert_eq!(second.id, "2");
        assert_eq!(second.option_texts(), vec!["Yes", "No"]);

        let third = traversal
            .next_question(&answers(&[&["yes"], &["Yes"]]))
            .await
            .unwrap();
        assert_eq!(third.id, "3");
        assert!(third.is_end());
    }

    #[tokio::test]
    async fn test_next_question_is_deterministic() {
        let traversal = fixture_traversal();
        let history = fixture_history();

        for n in 0..=history.len() {
            let first = traversal.next_question(&history[..n]).await.unwrap();
            let second = traversal.next_question(&history[..n]).await.unwrap();
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_full_history_reaches_end() {
        let traversal = fixture_traversal();
        let cursor = traversal.resolve(&fixture_history()).await.unwrap();

        assert!(cursor.is_complete());
        assert!(!cursor.is_gated());
        assert_eq!(cursor.events().len(), 6);
        assert_eq!(cursor.len(), 7);
        assert_eq!(cursor.events()[4].chosen.len(), 2);
        assert_eq!(cursor.events()[0].free_text.as_deref(), Some("Canary"));
    }

    #[tokio::test]
    async fn test_single_select_rejects_unknown_label() {
        let traversal = fixture_traversal();
        let err = traversal
            .next_question(&answers(&[&["Canary"], &["Maybe"]]))
            .await
            .unwrap_err();

        assert!(matches!(err, FormError::InvalidSelection { question_id, .. } if question_id == "2"));
    }

    #[tokio::test]
    async fn test_open_requires_text() {
        let traversal = fixture_traversal();
        let err = traversal.next_question(&answers(&[&["  "]])).await.unwrap_err();
        assert!(matches!(err, FormError::InvalidSelection { .. }));
    }

    #[tokio::test]
    async fn test_branching_follows_selected_option() {
        let traversal = fixture_traversal();
        let question = traversal
            .next_question(&answers(&[&["Canary"], &["No"], &["Text"], &["Group similar items"]]))
            .await
            .unwrap();
        assert_eq!(question.id, "6");
    }

    #[tokio::test]
    async fn test_multi_select_accepts_zero_selections() {
        let traversal = fixture_traversal();
        let history = answers(&[
            &["Canary"],
            &["No"],
            &["Text"],
            &["Predict a numerical value"],
            &[],
        ]);

        let question = traversal.next_question(&history).await.unwrap();
        assert_eq!(question.id, "6");
    }

    #[tokio::test]
    async fn test_multi_select_rejects_duplicates() {
        let traversal = fixture_traversal();
        let history = answers(&[
            &["Canary"],
            &["No"],
            &["Text"],
            &["Predict a numerical value"],
            &["Higher speed", "Higher speed"],
        ]);

        let err = traversal.next_question(&history).await.unwrap_err();
        assert!(matches!(err, FormError::InvalidSelection { .. }));
    }

    #[tokio::test]
    async fn test_gate_hides_restricted_options_permanently() {
        let traversal = fixture_traversal();
        let history = answers(&[
            &["Canary"],
            &["Yes"],
            &["Text"],
            &["Predict a numerical value"],
            &["Higher speed"],
        ]);

        let cursor = traversal.resolve(&history).await.unwrap();
        assert_eq!(cursor.gate_position(), Some(1));

        let visited = cursor.visited();
        assert_eq!(visited[2].option_texts(), vec!["DataSet, CSV or Data Base", "Text"]);
        assert_eq!(visited[4].option_texts(), vec!["Higher speed", "Higher accuracy"]);
        assert_eq!(visited[5].option_texts(), vec!["Internal User"]);
    }

    #[tokio::test]
    async fn test_gated_run_rejects_restricted_option() {
        let traversal = fixture_traversal();
        let err = traversal
            .next_question(&answers(&[&["Canary"], &["Yes"], &["Images"]]))
            .await
            .unwrap_err();
        assert!(matches!(err, FormError::InvalidSelection { question_id, .. } if question_id == "3"));
    }

    #[tokio::test]
    async fn test_answer_after_end_is_rejected() {
        let traversal = fixture_traversal();
        let mut history = fixture_history();
        history.push(Answer::single("extra"));

        let err = traversal.next_question(&history).await.unwrap_err();
        assert!(matches!(err, FormError::InvalidSelection { question_id, .. } if question_id == "end"));
    }

    #[tokio::test]
    async fn test_advance_matches_independent_prefix_resolution() {
        let traversal = fixture_traversal();
        let history = fixture_history();
        let mut cursor = TraversalCursor::default();

        traversal.advance(&mut cursor, &history).await.unwrap();
        assert_eq!(cursor.len(), history.len() + 1);

        for m in (0..history.len()).rev() {
            traversal.advance(&mut cursor, &history[..m]).await.unwrap();
            assert!(cursor.len() <= m + 1);
            assert_eq!(cursor, traversal.resolve(&history[..m]).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_advance_resets_gate_when_gate_answer_changes() {
        let traversal = fixture_traversal();
        let mut cursor = TraversalCursor::default();

        traversal
            .advance(&mut cursor, &answers(&[&["Canary"], &["Yes"], &["Text"]]))
            .await
            .unwrap();
        assert!(cursor.is_gated());

        traversal
            .advance(&mut cursor, &answers(&[&["Canary"], &["No"], &["Images"]]))
            .await
            .unwrap();
        assert!(!cursor.is_gated());
        assert_eq!(cursor.current().map(|q| q.id.as_str()), Some("4"));
    }

    #[tokio::test]
    async fn test_truncate_keeps_gate_before_cut() {
        let traversal = fixture_traversal();
        let mut cursor = traversal
            .resolve(&answers(&[&["Canary"], &["Yes"], &["Text"]]))
            .await
            .unwrap();

        cursor.truncate(2);
        assert!(cursor.is_gated());
        assert_eq!(cursor.len(), 3);

        cursor.truncate(1);
        assert!(!cursor.is_gated());
        assert_eq!(cursor.current().map(|q| q.id.as_str()), Some("2"));
    }
}

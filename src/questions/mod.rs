//! Read-only access to the question graph.
//!
//! Question vertices are labelled by kind (`Q_Open`, `Q_QCM`, `Q_QRM`,
//! `Q_QCM_Bool`, `end`); their outgoing `Proposition` edges are the answer options. This
//! module turns those raw vertices and edges into [`QuestionNode`] and
//! [`AnswerOption`] records and never writes to the store.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{FormError, FormResult};
use crate::storage::{Edge, SharedGraphStore, Vertex};

/// Label of the edges that are answer options.
pub const OPTION_LABEL: &str = "Proposition";
/// Vertex property holding the prompt text.
pub const TEXT_PROPERTY: &str = "text";
/// Vertex/edge property holding help text.
pub const HELP_TEXT_PROPERTY: &str = "help_text";
/// Edge property marking an option hidden once the gate is closed.
pub const RESTRICTED_PROPERTY: &str = "restricted";
/// Edge property holding one weight per candidate model.
pub const WEIGHTS_PROPERTY: &str = "weights";
/// Edge property holding metric tags.
pub const METRICS_PROPERTY: &str = "metrics";
/// First-question property holding the candidate model catalogue.
pub const MODELS_PROPERTY: &str = "models";

/// Kind of a question, one per vertex label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Free-text question with a single outgoing option.
    Open,
    /// Exactly one option, each option may lead elsewhere.
    SingleSelect,
    /// Any number of options, all leading to the same question.
    MultiSelect,
    /// Single select whose affirmative answer narrows later options.
    BooleanGate,
    /// Terminal vertex.
    End,
}

impl QuestionKind {
    /// The vertex label used in the graph store.
    pub fn label(&self) -> &'static str {
        match self {
            QuestionKind::Open => "Q_Open",
            QuestionKind::SingleSelect => "Q_QCM",
            QuestionKind::MultiSelect => "Q_QRM",
            QuestionKind::BooleanGate => "Q_QCM_Bool",
            QuestionKind::End => "end",
        }
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Q_Open" => Ok(QuestionKind::Open),
            "Q_QCM" => Ok(QuestionKind::SingleSelect),
            "Q_QRM" => Ok(QuestionKind::MultiSelect),
            "Q_QCM_Bool" => Ok(QuestionKind::BooleanGate),
            "end" => Ok(QuestionKind::End),
            _ => Err(format!("Unknown question kind: {}", s)),
        }
    }
}

/// An answer option, i.e. one outgoing edge of a question.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerOption {
    /// Edge id.
    pub id: String,
    /// Option label shown to the respondent.
    pub text: String,
    /// Help fragment for this option.
    pub help_text: String,
    /// Hidden once the traversal is gated.
    pub restricted_to_ungated: bool,
    /// One coefficient per candidate model; NaN marks an undefined weight.
    #[serde(skip_serializing)]
    pub weights: Vec<f64>,
    /// Metric tags relevant when this option is chosen.
    pub metrics: Vec<String>,
    /// Id of the question this option leads to.
    pub target: String,
}

impl AnswerOption {
    /// Build an option from its graph edge.
    pub fn from_edge(edge: &Edge) -> Self {
        Self {
            id: edge.id.clone(),
            text: edge.str_property(TEXT_PROPERTY).unwrap_or_default().to_string(),
            help_text: edge
                .str_property(HELP_TEXT_PROPERTY)
                .unwrap_or_default()
                .to_string(),
            restricted_to_ungated: edge.property(RESTRICTED_PROPERTY).is_some_and(parse_flag),
            weights: edge
                .property(WEIGHTS_PROPERTY)
                .map(parse_weights)
                .unwrap_or_default(),
            metrics: edge
                .property(METRICS_PROPERTY)
                .map(parse_list)
                .unwrap_or_default(),
            target: edge.to.clone(),
        }
    }

    /// Weight for the candidate at `index`; missing entries are undefined (NaN).
    pub fn weight_for(&self, index: usize) -> f64 {
        self.weights.get(index).copied().unwrap_or(f64::NAN)
    }
}

// Undefined weights compare equal to each other.
impl PartialEq for AnswerOption {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.text == other.text
            && self.help_text == other.help_text
            && self.restricted_to_ungated == other.restricted_to_ungated
            && self.metrics == other.metrics
            && self.target == other.target
            && self.weights.len() == other.weights.len()
            && self
                .weights
                .iter()
                .zip(&other.weights)
                .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
    }
}

/// A question with the options visible at this point of the traversal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionNode {
    /// Vertex id.
    pub id: String,
    /// Question kind.
    pub kind: QuestionKind,
    /// Prompt text.
    pub text: String,
    /// Help text of the question itself.
    pub help_text: String,
    /// Visible options, in graph order.
    pub options: Vec<AnswerOption>,
}

impl QuestionNode {
    /// The terminal sentinel.
    pub fn end(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: QuestionKind::End,
            text: String::new(),
            help_text: String::new(),
            options: Vec::new(),
        }
    }

    /// Whether this is the terminal sentinel.
    pub fn is_end(&self) -> bool {
        self.kind == QuestionKind::End
    }

    /// Find a visible option by its exact label.
    pub fn option_by_text(&self, text: &str) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.text == text)
    }

    /// Labels of the visible options.
    pub fn option_texts(&self) -> Vec<&str> {
        self.options.iter().map(|o| o.text.as_str()).collect()
    }

    /// Question help text followed by one `label: help` fragment per visible option.
    pub fn full_help_text(&self) -> String {
        let mut help = self.help_text.clone();
        for option in self.options.iter().filter(|o| !o.help_text.is_empty()) {
            if !help.is_empty() {
                help.push('\n');
            }
            help.push_str(&format!("{}: {}", option.text, option.help_text));
        }
        help
    }
}

/// Typed reader over the question graph.
#[derive(Clone)]
pub struct QuestionGraph {
    store: SharedGraphStore,
    first_question_id: String,
}

impl QuestionGraph {
    /// Create a reader rooted at `first_question_id`.
    pub fn new(store: SharedGraphStore, first_question_id: impl Into<String>) -> Self {
        Self {
            store,
            first_question_id: first_question_id.into(),
        }
    }

    /// Id of the designated first question.
    pub fn first_question_id(&self) -> &str {
        &self.first_question_id
    }

    /// Underlying store.
    pub fn store(&self) -> &SharedGraphStore {
        &self.store
    }

    /// Read a question and the options visible under `gated`.
    pub async fn question(&self, id: &str, gated: bool) -> FormResult<QuestionNode> {
        let vertex = self
            .store
            .get_vertex(id)
            .await?
            .ok_or_else(|| FormError::not_found("question", id))?;
        let kind = question_kind(&vertex)?;

        if kind == QuestionKind::End {
            return Ok(QuestionNode::end(vertex.id));
        }

        let options = self.options(id, gated).await?;
        debug!(question_id = %id, kind = %kind, options = options.len(), gated, "Question loaded");

        Ok(QuestionNode {
            text: vertex.str_property(TEXT_PROPERTY).unwrap_or_default().to_string(),
            help_text: vertex
                .str_property(HELP_TEXT_PROPERTY)
                .unwrap_or_default()
                .to_string(),
            id: vertex.id,
            kind,
            options,
        })
    }

    /// Read the options of a question. When `gated`, restricted options are left out.
    ///
    /// Graph invariants are checked on the full option set so that the answer
    /// does not depend on gating.
    pub async fn options(&self, id: &str, gated: bool) -> FormResult<Vec<AnswerOption>> {
        let vertex = self
            .store
            .get_vertex(id)
            .await?
            .ok_or_else(|| FormError::not_found("question", id))?;
        let kind = question_kind(&vertex)?;

        let all: Vec<AnswerOption> = self
            .store
            .outgoing_edges(id)
            .await?
            .iter()
            .filter(|e| e.label == OPTION_LABEL)
            .map(AnswerOption::from_edge)
            .collect();

        match kind {
            QuestionKind::End => return Ok(Vec::new()),
            _ if all.is_empty() => {
                return Err(FormError::malformed(id, "question has no outgoing option"));
            }
            QuestionKind::MultiSelect => {
                if all.iter().any(|o| o.target != all[0].target) {
                    return Err(FormError::malformed(
                        id,
                        "multi-select options lead to different questions",
                    ));
                }
            }
            QuestionKind::Open | QuestionKind::SingleSelect | QuestionKind::BooleanGate => {}
        }

        Ok(all
            .into_iter()
            .filter(|o| !(gated && o.restricted_to_ungated))
            .collect())
    }

    /// The candidate model catalogue stored on the first question.
    pub async fn model_catalogue(&self) -> FormResult<Vec<String>> {
        let vertex = self
            .store
            .get_vertex(&self.first_question_id)
            .await?
            .ok_or_else(|| FormError::not_found("question", &self.first_question_id))?;

        Ok(vertex
            .property(MODELS_PROPERTY)
            .map(parse_list)
            .unwrap_or_default())
    }
}

fn question_kind(vertex: &Vertex) -> FormResult<QuestionKind> {
    vertex
        .label
        .parse()
        .map_err(|message: String| FormError::malformed(&vertex.id, message))
}

/// Parse a weight vector: a JSON array (`null` = undefined) or a
/// comma-separated string (`nan` = undefined). Unreadable entries are undefined.
pub(crate) fn parse_weights(value: &Value) -> Vec<f64> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
                Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
                _ => f64::NAN,
            })
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(|part| part.trim().parse().unwrap_or(f64::NAN))
            .collect(),
        _ => Vec::new(),
    }
}

/// Parse a list of names: a JSON array of strings or a comma-separated string.
pub(crate) fn parse_list(value: &Value) -> Vec<String> {
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}
